//! Remote control over a chat transport
//!
//! The owner watches the program's screen and types into it from a chat.

mod commands;
mod control;
mod format;
mod slots;
mod telegram;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::*;
pub use control::*;
pub use format::*;
pub use slots::*;
pub use telegram::*;
pub use transport::*;

use std::sync::Arc;

use tracing::{info, warn};

use crate::classifier::SharedClassifier;
use crate::config::{Config, OwnerStore, TOKEN_ENV_VAR, resolve_token};
use crate::error::Result;
use crate::session::SessionBackend;

/// Build the Telegram bot for `backend`, or `None` when no token is configured
pub fn build_bot(
    config: &Config,
    backend: Arc<dyn SessionBackend>,
    classifier: Option<SharedClassifier>,
) -> Result<Option<Arc<RemoteControlBot>>> {
    let Some(token) = resolve_token(config) else {
        warn!(
            "No bot token: set {} or write it to {:?}; remote control disabled",
            TOKEN_ENV_VAR,
            config.token_file().ok()
        );
        return Ok(None);
    };

    let transport = TelegramClient::new(token, config.api_base_url.clone())?;
    let bot = RemoteControlBot::new(
        Arc::new(transport),
        backend,
        classifier,
        OwnerStore::from_config(config)?,
        BotSettings::from_config(config)?,
    )?;
    info!("Remote control bot ready");
    Ok(Some(Arc::new(bot)))
}
