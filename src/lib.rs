//! shell-bot - run a terminal program in tmux and drive it from a chat
//!
//! The wrapped program runs in a dedicated tmux session that the operator
//! is attached to. Alongside it, background daemons:
//! - type lines appended to an input file into the pane
//! - keep an output file updated with the filtered screen
//! - mirror the screen to the bot owner's chat and relay their messages back
//!
//! # Modules
//!
//! - [`session`] - Orchestrator, session backends and side-channel daemons
//! - [`bot`] - Remote control bot and the Telegram transport
//! - [`classifier`] - Screen state detection and output filtering
//! - [`tmux`] - Async tmux integration
//! - [`config`] - Configuration and owner persistence
//! - [`error`] - Error types

pub mod bot;
pub mod classifier;
pub mod config;
pub mod error;
pub mod session;
pub mod tmux;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{LaunchOptions, RunOutcome, SessionOrchestrator, run_single_shot};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Exit code asking an external relaunch loop to start shell-bot again
pub const RESTART_EXIT_CODE: i32 = 75;
