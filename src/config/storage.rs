//! Persistent state storage
//!
//! Manages the bot owner record (JSON) and the bot credential

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

use super::{Config, TOKEN_ENV_VAR};

/// Chat identifier on the remote transport
pub type ChatId = i64;

/// The single chat allowed to drive the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Chat that issued the claim command
    pub chat_id: ChatId,
    /// When the claim happened
    pub claimed_at: DateTime<Utc>,
}

impl Owner {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            claimed_at: Utc::now(),
        }
    }
}

/// File-backed owner record
#[derive(Debug, Clone)]
pub struct OwnerStore {
    path: PathBuf,
}

impl OwnerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Owner store at the configured location
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.owner_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the owner, `None` if the bot was never claimed
    pub fn load(&self) -> Result<Option<Owner>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read owner file: {}", e)))?;

        let owner: Owner = serde_json::from_str(&content)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to parse owner file: {}", e)))?;

        Ok(Some(owner))
    }

    /// Persist the owner
    pub fn save(&self, owner: &Owner) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create owner directory: {}", e))
            })?;
        }

        let content = serde_json::to_string_pretty(owner)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize owner: {}", e)))?;

        std::fs::write(&self.path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write owner file: {}", e)))?;

        Ok(())
    }
}

/// Resolve the bot token: environment variable first, then the token file
pub fn resolve_token(config: &Config) -> Option<String> {
    if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
        let token = token.trim().to_string();
        if !token.is_empty() {
            return Some(token);
        }
    }

    let path = config.token_file().ok()?;
    read_token_file(&path)
}

/// Read a token file, ignoring surrounding whitespace
pub fn read_token_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let token = content.trim();
            (!token.is_empty()).then(|| token.to_string())
        }
        Err(e) => {
            debug!("No token file at {:?}: {}", path, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_owner_file_is_unclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let store = OwnerStore::new(temp_dir.path().join("owner.json"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_load_owner() {
        let temp_dir = TempDir::new().unwrap();
        let store = OwnerStore::new(temp_dir.path().join("nested").join("owner.json"));

        let owner = Owner::new(4242);
        store.save(&owner).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.chat_id, 4242);
        assert_eq!(loaded, owner);
    }

    #[test]
    fn test_corrupt_owner_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("owner.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(OwnerStore::new(path).load().is_err());
    }

    #[test]
    fn test_read_token_file_trims() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("token");
        std::fs::write(&path, "  123:abc\n").unwrap();
        assert_eq!(read_token_file(&path), Some("123:abc".to_string()));

        std::fs::write(&path, "\n").unwrap();
        assert_eq!(read_token_file(&path), None);

        assert_eq!(read_token_file(&temp_dir.path().join("missing")), None);
    }
}
