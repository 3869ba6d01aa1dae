//! Review log endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::error::Result;
use crate::models::{ReviewLogEntry, ReviewLogPushQuery, ReviewLogPushResponse, ReviewLogQuery};
use crate::routes::auth::AuthenticatedAccount;
use crate::AppState;

/// GET /reviewlog/mostrecent
/// Newest entry, or 204 when the history is empty
pub async fn most_recent(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAccount>,
) -> Result<Response> {
    match state.db.get_most_recent_review(auth.account_id).await? {
        Some(entry) => Ok(Json(entry).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

/// POST /reviewlog?force=
/// Append entries; `force=true` replaces the whole history
pub async fn push(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAccount>,
    Query(query): Query<ReviewLogPushQuery>,
    Json(entries): Json<Vec<ReviewLogEntry>>,
) -> Result<Json<ReviewLogPushResponse>> {
    let force = query.force.unwrap_or(false);
    let synced_count = state
        .db
        .insert_reviews(auth.account_id, entries, force)
        .await?;

    tracing::info!(
        "Stored {} review log entries for {} (force={})",
        synced_count,
        auth.account_id,
        force
    );

    Ok(Json(ReviewLogPushResponse { synced_count }))
}

/// GET /reviewlog?from=
/// Entries strictly after `from`, or 204 when there are none
pub async fn since(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedAccount>,
    Query(query): Query<ReviewLogQuery>,
) -> Result<Response> {
    let entries = state
        .db
        .get_reviews_since(auth.account_id, query.from)
        .await?;

    if entries.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    Ok(Json(entries).into_response())
}
