//! Keyboard input for tmux panes
//!
//! Maps operator intents (text, Enter, Ctrl-C) onto `send-keys` arguments.

/// Input event to send to a tmux session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Regular text input, sent literally
    Text(String),
    /// Special key (Enter, Tab, etc.)
    Key(SpecialKey),
    /// Control character (Ctrl+C, Ctrl+D, etc.)
    Control(char),
}

/// Special keys that can be sent to tmux
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKey {
    Enter,
    Tab,
    Escape,
    Backspace,
    Up,
    Down,
}

impl SpecialKey {
    /// Convert to tmux key sequence
    pub fn to_tmux_keys(&self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Tab => "Tab",
            Self::Escape => "Escape",
            Self::Backspace => "BSpace",
            Self::Up => "Up",
            Self::Down => "Down",
        }
    }
}

impl InputEvent {
    /// Text followed by Enter, as a line typed by the operator
    pub fn line(text: &str) -> [InputEvent; 2] {
        [
            InputEvent::Text(text.to_string()),
            InputEvent::Key(SpecialKey::Enter),
        ]
    }

    /// Ctrl-C
    pub fn interrupt() -> Self {
        InputEvent::Control('c')
    }

    /// Convert to tmux send-keys argument
    pub fn to_tmux_arg(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Key(k) => k.to_tmux_keys().to_string(),
            Self::Control(c) => format!("C-{}", c),
        }
    }

    /// Whether send-keys must not interpret the argument as a key name
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_key_conversion() {
        assert_eq!(SpecialKey::Enter.to_tmux_keys(), "Enter");
        assert_eq!(SpecialKey::Tab.to_tmux_keys(), "Tab");
        assert_eq!(SpecialKey::Backspace.to_tmux_keys(), "BSpace");
    }

    #[test]
    fn test_input_event_conversion() {
        assert_eq!(InputEvent::Text("Enter".to_string()).to_tmux_arg(), "Enter");
        assert!(InputEvent::Text("Enter".to_string()).is_literal());
        assert_eq!(InputEvent::Key(SpecialKey::Enter).to_tmux_arg(), "Enter");
        assert!(!InputEvent::Key(SpecialKey::Enter).is_literal());
        assert_eq!(InputEvent::interrupt().to_tmux_arg(), "C-c");
    }

    #[test]
    fn test_line_appends_enter() {
        let [text, enter] = InputEvent::line("ls -la");
        assert_eq!(text, InputEvent::Text("ls -la".to_string()));
        assert_eq!(enter, InputEvent::Key(SpecialKey::Enter));
    }
}
