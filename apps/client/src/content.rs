//! Deck content sources.
//!
//! A deck file is plain text with one item per line. Blank lines are
//! skipped, `#` starts a comment and a `#tags:` line lists the deck's tags.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ContentError;

const TAGS_PREFIX: &str = "#tags:";

/// Raw items and tags of a deck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckContent {
    pub items: Vec<String>,
    pub tags: Vec<String>,
}

impl DeckContent {
    pub fn parse(text: &str) -> Self {
        let mut content = Self::default();
        for line in text.lines().map(str::trim) {
            if let Some(tags) = line.strip_prefix(TAGS_PREFIX) {
                content.tags.extend(
                    tags.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from),
                );
            } else if !line.is_empty() && !line.starts_with('#') {
                content.items.push(line.to_string());
            }
        }
        content
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn load_deck(&self, deck_id: &str) -> Result<DeckContent, ContentError>;
}

/// Reads `<root>/<deck_id>.txt`.
pub struct DirectoryContentSource {
    root: PathBuf,
}

impl DirectoryContentSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn deck_path(&self, deck_id: &str) -> Option<PathBuf> {
        // Ids are bare file stems
        let valid = !deck_id.is_empty()
            && deck_id
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.root.join(format!("{deck_id}.txt")))
    }
}

#[async_trait]
impl ContentSource for DirectoryContentSource {
    async fn load_deck(&self, deck_id: &str) -> Result<DeckContent, ContentError> {
        let path = self
            .deck_path(deck_id)
            .ok_or_else(|| ContentError::NotFound(deck_id.to_string()))?;

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ContentError::NotFound(deck_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let content = DeckContent::parse(&text);
        if content.items.is_empty() {
            return Err(ContentError::NotFound(deck_id.to_string()));
        }
        tracing::debug!("Loaded deck {} ({} items)", deck_id, content.items.len());
        Ok(content)
    }
}

/// Fixed in-memory decks.
#[derive(Default)]
pub struct MemoryContentSource {
    decks: HashMap<String, DeckContent>,
}

impl MemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deck(mut self, deck_id: &str, items: &[&str]) -> Self {
        self.decks.insert(
            deck_id.to_string(),
            DeckContent {
                items: items.iter().map(|s| s.to_string()).collect(),
                tags: Vec::new(),
            },
        );
        self
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn load_deck(&self, deck_id: &str) -> Result<DeckContent, ContentError> {
        self.decks
            .get(deck_id)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(deck_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let content = DeckContent::parse("#tags: zh-yue, extra-dict\n一\n\n  二  \n# note\n三\n");
        assert_eq!(content.items, vec!["一", "二", "三"]);
        assert_eq!(content.tags, vec!["zh-yue", "extra-dict"]);
    }

    #[tokio::test]
    async fn test_directory_source() {
        let dir = std::env::temp_dir().join(format!("wenbun-decks-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("hsk1.txt"), "爱\n八\n爸爸\n").unwrap();
        let source = DirectoryContentSource::new(&dir);

        let deck = source.load_deck("hsk1").await.unwrap();
        assert_eq!(deck.items.len(), 3);

        assert!(matches!(
            source.load_deck("hsk9").await,
            Err(ContentError::NotFound(_))
        ));
        assert!(matches!(
            source.load_deck("../hsk1").await,
            Err(ContentError::NotFound(_))
        ));

        std::fs::remove_dir_all(dir).ok();
    }
}
