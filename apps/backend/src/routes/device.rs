//! Device registration endpoint

use axum::{extract::State, Json};

use crate::error::Result;
use crate::models::{DeviceRegisterRequest, DeviceRegisterResponse};
use crate::AppState;

/// POST /api/device/register
/// Creates a new account and returns its session token
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Option<DeviceRegisterRequest>>,
) -> Result<Json<DeviceRegisterResponse>> {
    let payload = payload.unwrap_or_default();
    let account = state
        .db
        .create_account(payload.name.as_deref(), payload.email.as_deref())
        .await;

    tracing::info!("Registered new account: {}", account.id);

    Ok(Json(DeviceRegisterResponse {
        token: account.token.clone(),
        profile: account.info(),
    }))
}
