//! HTTP route handlers

pub mod auth;
pub mod device;
pub mod profile;
pub mod review_log;
