//! WenBun client: local profile, deck loading and sync with the profile server.
//!
//! Provides:
//! - `Wenbun`, the application object driving study sessions
//! - Key/value profile storage (SQLite or in-memory)
//! - Deck content sources
//! - The sync coordinator and its HTTP transport

pub mod api;
pub mod app;
pub mod content;
pub mod error;
pub mod settings;
pub mod storage;
pub mod sync;
#[cfg(test)]
mod testing;

pub use api::{HttpSyncApi, SyncApi};
pub use app::{SaveSync, Wenbun, CLIENT_VERSION};
pub use content::{ContentSource, DeckContent, DirectoryContentSource, MemoryContentSource};
pub use error::{AppError, ContentError, Result, StorageError, SyncError};
pub use settings::ClientSettings;
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use sync::{
    BackgroundSync, ReviewLogUpdate, SyncCoordinator, SyncOutcome, SyncReport, SyncState,
    SyncStatus,
};
