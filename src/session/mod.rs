//! Session module
//!
//! - `Session` / `OutputBuffer` - core session types
//! - `SessionBackend` - what the bot and daemons drive (tmux pane or child process)
//! - `SessionOrchestrator` - tmux-hosted runs with side-channel daemons
//! - `run_single_shot` - plain child process runs without tmux

mod backend;
mod orchestrator;
mod process;
pub(crate) mod relay;
mod standalone;
mod types;

pub use backend::*;
pub use orchestrator::*;
pub use process::*;
pub use relay::{InputRelay, OutputCapture};
pub use standalone::*;
pub use types::*;
