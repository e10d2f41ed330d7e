//! Classifier for interactive coding agents such as Claude Code
//!
//! Detects the agent state from the tail of the screen:
//! - Prompt glyph on the last line (waiting for input)
//! - Approval question near the bottom (needs approval)
//! - Anything else (busy)

use std::path::Path;
use std::time::{Duration, Instant};

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use super::{
    DISPLAY_LINES, NotificationKind, OutputClassifier, ScreenState, StateTracker, clean_lines,
    last_lines, strip_control_sequences, trim_trailing_blank,
};

/// How many trailing non-blank lines are searched for an approval question
pub const APPROVAL_WINDOW: usize = 5;

/// Prompt glyph alone on a line, optionally inside a box border and
/// optionally followed by placeholder text
static PROMPT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[│|]?\s*[>❯›$](?:\s.*)?$").unwrap());

/// Selection cursor on a numbered menu entry, e.g. `❯ 3. No`
static MENU_CURSOR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[│|]?\s*[>❯›]\s+\d+[.)]\s").unwrap());

/// Phrases an agent uses when it blocks on a permission decision
static APPROVAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)\bdo you want to\b").unwrap(),
        Regex::new(r"(?i)\ballow\b").unwrap(),
        Regex::new(r"(?i)\bapprove\b").unwrap(),
        Regex::new(r"(?i)\bproceed\?").unwrap(),
        Regex::new(r"(?i)\(y/n\)|\[y/n\]").unwrap(),
        Regex::new(r"(?i)don't ask again").unwrap(),
    ]
});

/// Status-bar and hint lines that carry no program output
static CHROME_MARKERS: &[&str] = &[
    "? for shortcuts",
    "auto-accept edits",
    "shift+tab to cycle",
    "bypass permissions",
    "ctrl+t to show",
    "⏵⏵",
];

/// Classifier for `claude` sessions
#[derive(Debug, Clone, Default)]
pub struct ClaudeClassifier {
    tracker: StateTracker,
}

impl ClaudeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tracked state
    pub fn state(&self) -> ScreenState {
        self.tracker.state()
    }

    /// Stripped lines without decoration or trailing blanks
    fn content_lines(raw: &str) -> Vec<String> {
        let lines = clean_lines(&strip_control_sequences(raw))
            .into_iter()
            .filter(|line| !is_decorative(line))
            .collect();
        trim_trailing_blank(lines)
    }

    /// Detect the state shown by `raw` without touching the tracker
    pub fn detect(raw: &str) -> ScreenState {
        let lines = Self::content_lines(raw);
        let non_blank: Vec<&str> = lines
            .iter()
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
            .collect();

        let Some(last) = non_blank.last() else {
            return ScreenState::Busy;
        };

        if PROMPT_LINE.is_match(last) && !MENU_CURSOR_LINE.is_match(last) {
            return ScreenState::WaitingForInput;
        }

        let window_start = non_blank.len().saturating_sub(APPROVAL_WINDOW);
        let asks_approval = non_blank[window_start..]
            .iter()
            .any(|line| APPROVAL_PATTERNS.iter().any(|p| p.is_match(line)));

        if asks_approval {
            ScreenState::NeedsApproval
        } else {
            ScreenState::Busy
        }
    }
}

impl OutputClassifier for ClaudeClassifier {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn matches(&self, command_line: &str) -> bool {
        command_line
            .split_whitespace()
            .next()
            .and_then(|program| Path::new(program).file_name())
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == "claude")
    }

    fn on_user_input(&mut self) {
        self.tracker.force_busy();
    }

    fn filter_output(&self, raw: &str) -> Vec<String> {
        last_lines(Self::content_lines(raw), DISPLAY_LINES)
    }

    fn check_for_notifications_at(
        &mut self,
        raw: &str,
        idle_threshold: Duration,
        now: Instant,
    ) -> Vec<NotificationKind> {
        let detected = Self::detect(raw);
        let notifications = self.tracker.observe(detected, idle_threshold, now);
        if !notifications.is_empty() {
            debug!("Classifier {} raised {:?}", self.name(), notifications);
        }
        notifications
    }

    fn translate_attachment(&self, path: &Path) -> Option<String> {
        // The agent reads files referenced by path in the prompt
        path.to_str().map(|p| p.to_string())
    }
}

/// Box-drawing/block-only lines and known status-bar lines
fn is_decorative(line: &str) -> bool {
    let meaningful = line
        .chars()
        .any(|c| !c.is_whitespace() && !is_box_glyph(c));
    if !meaningful {
        return !line.trim().is_empty();
    }

    let lower = line.to_lowercase();
    CHROME_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn is_box_glyph(c: char) -> bool {
    matches!(c, '\u{2500}'..='\u{257f}' | '\u{2580}'..='\u{259f}')
}
