//! Runtime settings read from the environment.

use std::path::PathBuf;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";
pub const DEFAULT_CONTENT_DIR: &str = "./decks";
const STORE_FILENAME: &str = "profile.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub token: Option<String>,
    pub store_path: PathBuf,
    pub content_dir: PathBuf,
}

impl ClientSettings {
    /// Read `WENBUN_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        Self {
            server_url: non_empty("WENBUN_SERVER_URL")
                .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            token: non_empty("WENBUN_TOKEN"),
            store_path: non_empty("WENBUN_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_store_path),
            content_dir: non_empty("WENBUN_CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR)),
        }
    }
}

fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wenbun")
        .join(STORE_FILENAME)
}
