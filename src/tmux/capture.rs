//! Captured pane content
//!
//! Wraps a capture with a hash so pollers can skip work when nothing changed.

use xxhash_rust::xxh3::xxh3_64;

/// Captured pane content with metadata
#[derive(Debug, Clone)]
pub struct CapturedContent {
    /// The captured text content
    pub content: String,
    /// Content hash for change detection
    pub hash: u64,
}

impl CapturedContent {
    /// Create a new captured content
    pub fn new(content: String) -> Self {
        let hash = content_hash(&content);

        Self { content, hash }
    }

    /// Check if content has changed from another capture
    pub fn has_changed(&self, other: &Self) -> bool {
        self.hash != other.hash
    }

    /// Whether the content differs from a previously seen hash
    pub fn differs_from(&self, previous: Option<u64>) -> bool {
        previous != Some(self.hash)
    }
}

/// Stable hash used to deduplicate text blocks
pub fn content_hash(text: &str) -> u64 {
    xxh3_64(text.as_bytes())
}
