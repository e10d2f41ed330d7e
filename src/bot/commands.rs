//! Operator command grammar

/// A parsed operator message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start`
    Claim,
    /// `/output`, `/o`
    Output,
    /// `/enter`, `/e`
    Enter,
    /// `/kill`
    Kill,
    /// `/help`
    Help,
    /// `/restart`
    Restart,
    /// Slash-prefixed text that is not a known command
    Unknown(String),
    /// Anything else, typed into the program
    Input(String),
}

impl BotCommand {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let Some(body) = trimmed.strip_prefix('/') else {
            return Self::Input(text.to_string());
        };

        // Group chats address commands as `/cmd@botname`
        let token = body.split_whitespace().next().unwrap_or("");
        let name = token.split('@').next().unwrap_or("");

        match name {
            "start" => Self::Claim,
            "output" | "o" => Self::Output,
            "enter" | "e" => Self::Enter,
            "kill" => Self::Kill,
            "help" => Self::Help,
            "restart" => Self::Restart,
            _ => Self::Unknown(format!("/{token}")),
        }
    }
}
