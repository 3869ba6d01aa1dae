//! Profile identity and snapshot endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::error::{ApiError, Result};
use crate::models::{ProfileData, ProfileDataQuery, ProfileInfo};
use crate::routes::auth::AuthenticatedAccount;
use crate::AppState;

/// GET /profile
/// Identity of the signed-in account; 401 when not signed in
pub async fn info(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAccount>,
) -> Result<Json<ProfileInfo>> {
    let account = state
        .db
        .get_account_by_token(&auth.token)
        .await
        .ok_or_else(|| ApiError::NotFound("Account not found".to_string()))?;

    Ok(Json(account.info()))
}

/// GET /profiledata
/// Current snapshot, or 204 when nothing has been uploaded yet
pub async fn get_data(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAccount>,
) -> Result<Response> {
    match state.db.get_profile(auth.account_id).await? {
        Some(profile) => Ok(Json(profile).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /profiledata?decision=
/// Store an uploaded snapshot
pub async fn upload_data(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAccount>,
    Query(query): Query<ProfileDataQuery>,
    Json(profile): Json<ProfileData>,
) -> Result<StatusCode> {
    profile.validate()?;

    let mode = query.decision.unwrap_or_default();
    state.db.store_profile(auth.account_id, profile, mode).await?;

    tracing::info!(
        "Stored profile snapshot for {} (decision={})",
        auth.account_id,
        mode.as_str()
    );

    Ok(StatusCode::OK)
}
