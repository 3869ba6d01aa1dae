//! HTTP boundary to the sync server.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use wenbun_core::{ProfileData, ProfileInfo, ReviewLogEntry, UploadMode};

use crate::error::SyncError;

type Result<T> = std::result::Result<T, SyncError>;

/// The five logical operations on the remote profile resource.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Identity of the signed-in account, or `None` when not signed in.
    async fn profile_info(&self) -> Result<Option<ProfileInfo>>;
    async fn get_profile_data(&self) -> Result<Option<ProfileData>>;
    async fn update_profile_data(&self, profile: &ProfileData, mode: UploadMode) -> Result<()>;
    async fn latest_review_log(&self) -> Result<Option<ReviewLogEntry>>;
    /// Append entries, or replace the remote history when `force` is set.
    async fn push_review_logs(&self, entries: &[ReviewLogEntry], force: bool) -> Result<usize>;
    /// Entries strictly after `from`, or the whole history.
    async fn review_logs_since(&self, from: Option<DateTime<Utc>>) -> Result<Vec<ReviewLogEntry>>;
    fn set_token(&self, token: Option<String>);
}

// === API Request/Response Types ===

#[derive(Debug, Serialize)]
struct DeviceRegisterRequest<'a> {
    name: Option<&'a str>,
    email: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DeviceRegisterResponse {
    token: String,
    profile: ProfileInfo,
}

#[derive(Debug, Deserialize)]
struct ReviewLogPushResponse {
    synced_count: usize,
}

/// `reqwest` implementation of [`SyncApi`].
pub struct HttpSyncApi {
    client: Client,
    server_url: String,
    token: RwLock<Option<String>>,
}

impl HttpSyncApi {
    pub fn new(server_url: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            token: RwLock::new(token),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    /// Register a new account and adopt its session token.
    pub async fn register(&self, name: Option<&str>, email: Option<&str>) -> Result<ProfileInfo> {
        let resp = self
            .client
            .post(self.url("/api/device/register"))
            .json(&DeviceRegisterRequest { name, email })
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let response: DeviceRegisterResponse = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Parse(e.to_string()))?;

        self.set_token(Some(response.token));
        Ok(response.profile)
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.server_url, route)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.authorized(request)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))
    }

    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SyncError::NotAuthenticated);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SyncError::Backend {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp)
    }

    /// Decode a 200 body, mapping 204 to `None`.
    async fn optional_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<Option<T>> {
        let resp = Self::check(resp).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        resp.json()
            .await
            .map(Some)
            .map_err(|e| SyncError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn profile_info(&self) -> Result<Option<ProfileInfo>> {
        let resp = self.send(self.client.get(self.url("/profile"))).await?;
        match Self::optional_json(resp).await {
            Err(SyncError::NotAuthenticated) => Ok(None),
            other => other,
        }
    }

    async fn get_profile_data(&self) -> Result<Option<ProfileData>> {
        let resp = self.send(self.client.get(self.url("/profiledata"))).await?;
        Self::optional_json(resp).await
    }

    async fn update_profile_data(&self, profile: &ProfileData, mode: UploadMode) -> Result<()> {
        let request = self
            .client
            .post(self.url("/profiledata"))
            .query(&[("decision", mode.as_str())])
            .json(profile);
        Self::check(self.send(request).await?).await?;
        Ok(())
    }

    async fn latest_review_log(&self) -> Result<Option<ReviewLogEntry>> {
        let resp = self
            .send(self.client.get(self.url("/reviewlog/mostrecent")))
            .await?;
        Self::optional_json(resp).await
    }

    async fn push_review_logs(&self, entries: &[ReviewLogEntry], force: bool) -> Result<usize> {
        let request = self
            .client
            .post(self.url("/reviewlog"))
            .query(&[("force", force)])
            .json(entries);
        let response: ReviewLogPushResponse = Self::check(self.send(request).await?)
            .await?
            .json()
            .await
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        Ok(response.synced_count)
    }

    async fn review_logs_since(&self, from: Option<DateTime<Utc>>) -> Result<Vec<ReviewLogEntry>> {
        let mut request = self.client.get(self.url("/reviewlog"));
        if let Some(from) = from {
            request = request.query(&[("from", from.to_rfc3339_opts(SecondsFormat::AutoSi, true))]);
        }
        let resp = self.send(request).await?;
        Ok(Self::optional_json(resp).await?.unwrap_or_default())
    }

    fn set_token(&self, token: Option<String>) {
        if let Ok(mut current) = self.token.write() {
            *current = token;
        }
    }
}
