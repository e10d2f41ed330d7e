//! Async tmux integration module
//!
//! Provides non-blocking tmux operations:
//! - `TmuxExecutor` - Semaphore-controlled async command execution
//! - `CapturedContent` - Hashed pane captures for change detection
//! - `InputEvent` - Keyboard input mapped onto `send-keys`
//! - `attach_to_session` - Foreground attach for the operator

mod attach;
mod capture;
mod executor;
mod input;

pub use attach::*;
pub use capture::*;
pub use executor::*;
pub use input::*;
