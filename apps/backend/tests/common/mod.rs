//! Common test utilities and fixtures for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - TestContext wrapping a fresh in-memory store and the full router
//! - Authentication helpers

pub mod fixtures;

use std::sync::Arc;

use axum::Router;

use wenbun_backend::db::Database;
use wenbun_backend::{router, AppState};

/// Test context holding the store and router of one isolated server.
pub struct TestContext {
    pub db: Arc<Database>,
    app: Router,
}

impl TestContext {
    pub fn new() -> Self {
        let state = AppState::new(Database::new());
        let db = state.db.clone();
        let app = router(state);
        Self { db, app }
    }

    /// Get the router for use with axum-test.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Create a test account and return its token.
    pub async fn create_test_account(&self, name: Option<&str>) -> String {
        self.db
            .create_account(name, Some("learner@example.com"))
            .await
            .token
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> String {
        format!("Bearer {}", token)
    }
}
