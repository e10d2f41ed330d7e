//! Configuration and persistence module
//!
//! Handles:
//! - User configuration (`~/.config/shell-bot/config.toml`)
//! - The owner record and bot credential

mod settings;
mod storage;

pub use settings::*;
pub use storage::*;
