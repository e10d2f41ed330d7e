//! Screen state bookkeeping and notification policy
//!
//! The tracker remembers the previous state, when the program went idle and
//! when it last produced an idle notification. Given a freshly detected
//! state it decides which notifications fire:
//!
//! - threshold mode (`idle_threshold > 0`): needs-approval fires on every
//!   observation; waiting-for-input fires once it has lasted the threshold,
//!   then re-arms one full threshold after the last notification.
//! - immediate mode (`idle_threshold == 0`): fires on every transition into
//!   waiting-for-input or needs-approval.

use std::time::{Duration, Instant};

use tracing::debug;

use super::{NotificationKind, ScreenState};

#[derive(Debug, Clone, Default)]
pub struct StateTracker {
    state: ScreenState,
    idle_since: Option<Instant>,
    last_notified: Option<Instant>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ScreenState {
        self.state
    }

    pub fn idle_since(&self) -> Option<Instant> {
        self.idle_since
    }

    /// Operator input: the program is about to work again
    pub fn force_busy(&mut self) {
        self.state = ScreenState::Busy;
        self.idle_since = None;
    }

    /// Record a detected state and return the notifications it triggers
    pub fn observe(
        &mut self,
        detected: ScreenState,
        idle_threshold: Duration,
        now: Instant,
    ) -> Vec<NotificationKind> {
        let previous = self.state;
        let entered = detected != previous;

        if entered {
            debug!("Screen state {} -> {}", previous, detected);
        }
        if detected == ScreenState::WaitingForInput && entered {
            self.idle_since = Some(now);
        }
        if detected != ScreenState::WaitingForInput {
            self.idle_since = None;
        }
        self.state = detected;

        if idle_threshold.is_zero() {
            return match detected {
                ScreenState::WaitingForInput if entered => vec![NotificationKind::WaitingForInput],
                ScreenState::NeedsApproval if entered => vec![NotificationKind::NeedsApproval],
                _ => Vec::new(),
            };
        }

        match detected {
            ScreenState::NeedsApproval => vec![NotificationKind::NeedsApproval],
            ScreenState::WaitingForInput => {
                let in_state = self
                    .idle_since
                    .map(|since| now.saturating_duration_since(since))
                    .unwrap_or_default();
                let rearmed = self
                    .last_notified
                    .is_none_or(|at| now.saturating_duration_since(at) > idle_threshold);

                if in_state >= idle_threshold && rearmed {
                    self.last_notified = Some(now);
                    vec![NotificationKind::WaitingForInput]
                } else {
                    Vec::new()
                }
            }
            _ => Vec::new(),
        }
    }
}
