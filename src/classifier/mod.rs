//! Output classification
//!
//! Turns raw pane text into display lines and notification decisions.
//! A classifier is selected once per session from an explicit registry by
//! asking each candidate whether it handles the launched command.

mod ansi;
mod claude;
mod tracker;

pub use ansi::*;
pub use claude::*;
pub use tracker::*;

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Maximum number of display lines produced from one capture
pub const DISPLAY_LINES: usize = 10;

/// Semantic state of the program on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    #[default]
    Unknown,
    Busy,
    WaitingForInput,
    NeedsApproval,
}

impl fmt::Display for ScreenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Busy => write!(f, "busy"),
            Self::WaitingForInput => write!(f, "waiting"),
            Self::NeedsApproval => write!(f, "needs approval"),
        }
    }
}

/// Notification a classifier can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    WaitingForInput,
    NeedsApproval,
}

impl NotificationKind {
    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WaitingForInput => "waiting_for_input",
            Self::NeedsApproval => "needs_approval",
        }
    }

    /// Text shown to the operator
    pub fn message(&self) -> &'static str {
        match self {
            Self::WaitingForInput => "⏳ The program is waiting for your input.",
            Self::NeedsApproval => "⚠️ The program is asking for approval.",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pluggable output classifier
pub trait OutputClassifier: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether this classifier understands the program launched by `command_line`
    fn matches(&self, command_line: &str) -> bool;

    /// The operator sent input; treat the program as busy again
    fn on_user_input(&mut self);

    /// Display lines for the operator, at most [`DISPLAY_LINES`]
    fn filter_output(&self, raw: &str) -> Vec<String>;

    /// Classify `raw` at `now` and return the notifications to send
    fn check_for_notifications_at(
        &mut self,
        raw: &str,
        idle_threshold: Duration,
        now: Instant,
    ) -> Vec<NotificationKind>;

    /// Classify `raw` now and return the notifications to send
    fn check_for_notifications(
        &mut self,
        raw: &str,
        idle_threshold: Duration,
    ) -> Vec<NotificationKind> {
        self.check_for_notifications_at(raw, idle_threshold, Instant::now())
    }

    /// Turn a received file into a command to type, if the program accepts files
    fn translate_attachment(&self, _path: &Path) -> Option<String> {
        None
    }
}

/// Classifier shared between the output daemons and the bot's command handlers
pub type SharedClassifier = Arc<Mutex<Box<dyn OutputClassifier>>>;

/// Explicit list of known classifiers
pub struct ClassifierRegistry {
    candidates: Vec<Box<dyn OutputClassifier>>,
}

impl ClassifierRegistry {
    pub fn empty() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    /// Add a candidate; earlier registrations win ties
    pub fn register(mut self, classifier: Box<dyn OutputClassifier>) -> Self {
        self.candidates.push(classifier);
        self
    }

    /// Pick the classifier for `command_line`, if any applies
    pub fn select(self, command_line: &str) -> Option<Box<dyn OutputClassifier>> {
        self.candidates
            .into_iter()
            .find(|candidate| candidate.matches(command_line))
    }

    /// Pick and wrap for sharing
    pub fn select_shared(self, command_line: &str) -> Option<SharedClassifier> {
        self.select(command_line)
            .map(|classifier| Arc::new(Mutex::new(classifier)))
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::empty().register(Box::new(ClaudeClassifier::new()))
    }
}

/// Display lines when no classifier applies: stripped, trailing blanks
/// dropped, last [`DISPLAY_LINES`] lines
pub fn fallback_display_lines(raw: &str) -> Vec<String> {
    let lines = clean_lines(&strip_control_sequences(raw));
    last_lines(trim_trailing_blank(lines), DISPLAY_LINES)
}

/// Display lines from an optional classifier
pub async fn display_lines(classifier: Option<&SharedClassifier>, raw: &str) -> Vec<String> {
    match classifier {
        Some(classifier) => classifier.lock().await.filter_output(raw),
        None => fallback_display_lines(raw),
    }
}

pub(crate) fn trim_trailing_blank(mut lines: Vec<String>) -> Vec<String> {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    lines
}

pub(crate) fn last_lines(lines: Vec<String>, count: usize) -> Vec<String> {
    let start = lines.len().saturating_sub(count);
    lines.into_iter().skip(start).collect()
}
