//! User configuration settings
//!
//! Layered configuration: environment variables → config file → CLI args

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Error, Result};

/// Environment variable holding the remote transport credential
pub const TOKEN_ENV_VAR: &str = "TELEGRAM_BOT_TOKEN";

/// Default Telegram Bot API endpoint
pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Application configuration
///
/// Built once at startup and shared (by reference or `Arc`) with the
/// orchestrator and the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the tmux session hosting the wrapped program
    pub session_name: String,

    /// Seconds without new output before an idle notice is sent (0 = notify on every transition)
    pub idle_threshold_secs: u64,

    /// Scrollback lines kept by the tmux pane
    pub history_limit: u32,

    /// tmux status bar placement ("top" or "bottom")
    pub status_position: String,

    /// Input relay polling interval in milliseconds
    pub input_relay_interval_ms: u64,

    /// Output capture polling interval in milliseconds
    pub output_capture_interval_ms: u64,

    /// Interval between the bot's pane checks in milliseconds
    pub notification_interval_ms: u64,

    /// Delay after session start before probing whether the program already exited
    pub settle_delay_ms: u64,

    /// Long-poll timeout for the remote transport in seconds
    pub poll_timeout_secs: u64,

    /// Timeout for a single tmux command in seconds
    pub tmux_timeout_secs: u64,

    /// Maximum concurrent tmux commands
    pub max_concurrent_tmux: usize,

    /// Base URL of the Bot API
    pub api_base_url: String,

    /// Bot token file, read when the environment variable is absent
    pub token_file: Option<PathBuf>,

    /// File recording the chat that claimed the bot
    pub owner_file: Option<PathBuf>,

    /// Append-only file whose lines are injected as keyboard input
    pub input_file: Option<PathBuf>,

    /// File overwritten with the latest filtered output
    pub output_file: Option<PathBuf>,

    /// Directory where received attachments are saved
    pub download_dir: Option<PathBuf>,

    /// Enable debug logging
    pub debug: bool,

    /// Log file path (defaults to the data dir when attached to tmux)
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_name: "shell-bot".to_string(),
            idle_threshold_secs: 15,
            history_limit: 50_000,
            status_position: "bottom".to_string(),
            input_relay_interval_ms: 200,
            output_capture_interval_ms: 500,
            notification_interval_ms: 2_000,
            settle_delay_ms: 500,
            poll_timeout_secs: 30,
            tmux_timeout_secs: 5,
            max_concurrent_tmux: 16,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token_file: None,
            owner_file: None,
            input_file: None,
            output_file: None,
            download_dir: None,
            debug: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration layering a specific TOML file over the defaults
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config: Config = Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Config::default()))
            // Layer config file if it exists
            .merge(Toml::file(config_path))
            // Layer environment variables (SHELL_BOT_IDLE_THRESHOLD_SECS, etc.)
            .merge(Env::prefixed("SHELL_BOT_"))
            .extract()
            .map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemons cannot run with
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("input_relay_interval_ms", self.input_relay_interval_ms),
            ("output_capture_interval_ms", self.output_capture_interval_ms),
            ("notification_interval_ms", self.notification_interval_ms),
            ("tmux_timeout_secs", self.tmux_timeout_secs),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }
        if !matches!(self.status_position.as_str(), "top" | "bottom") {
            return Err(ConfigError::InvalidValue {
                key: "status_position".to_string(),
                reason: format!("expected \"top\" or \"bottom\", got \"{}\"", self.status_position),
            }
            .into());
        }
        if self.max_concurrent_tmux == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrent_tmux".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = Self::project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn input_relay_interval(&self) -> Duration {
        Duration::from_millis(self.input_relay_interval_ms)
    }

    pub fn output_capture_interval(&self) -> Duration {
        Duration::from_millis(self.output_capture_interval_ms)
    }

    pub fn notification_interval(&self) -> Duration {
        Duration::from_millis(self.notification_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn tmux_timeout(&self) -> Duration {
        Duration::from_secs(self.tmux_timeout_secs)
    }

    /// Get the token file path
    pub fn token_file(&self) -> Result<PathBuf> {
        self.path_or_data(&self.token_file, "token")
    }

    /// Get the owner file path
    pub fn owner_file(&self) -> Result<PathBuf> {
        self.path_or_data(&self.owner_file, "owner.json")
    }

    /// Get the input injection file path
    pub fn input_file(&self) -> Result<PathBuf> {
        self.path_or_data(&self.input_file, "input.txt")
    }

    /// Get the output snapshot file path
    pub fn output_file(&self) -> Result<PathBuf> {
        self.path_or_data(&self.output_file, "output.txt")
    }

    /// Get the attachment download directory
    pub fn download_dir(&self) -> Result<PathBuf> {
        self.path_or_data(&self.download_dir, "downloads")
    }

    /// Get the log file path
    pub fn log_file(&self) -> Result<PathBuf> {
        self.path_or_data(&self.log_file, "shell-bot.log")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        let dirs = Self::project_dirs()?;

        std::fs::create_dir_all(dirs.config_dir()).map_err(|_e| {
            Error::Config(ConfigError::DirectoryCreationFailed(
                dirs.config_dir().to_path_buf(),
            ))
        })?;

        std::fs::create_dir_all(dirs.data_dir()).map_err(|_e| {
            Error::Config(ConfigError::DirectoryCreationFailed(
                dirs.data_dir().to_path_buf(),
            ))
        })?;

        let download_dir = self.download_dir()?;
        std::fs::create_dir_all(&download_dir)
            .map_err(|_| Error::Config(ConfigError::DirectoryCreationFailed(download_dir)))?;

        Ok(())
    }

    /// Save current configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|_e| {
                Error::Config(ConfigError::DirectoryCreationFailed(parent.to_path_buf()))
            })?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        std::fs::write(config_path, toml).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        Ok(())
    }

    fn path_or_data(&self, configured: &Option<PathBuf>, file_name: &str) -> Result<PathBuf> {
        match configured {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join(file_name)),
        }
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "shell-bot", "shell-bot").ok_or_else(|| {
            Error::Config(ConfigError::LoadFailed(
                "Could not determine home directory".to_string(),
            ))
        })
    }
}
