//! Server configuration: TOML file, environment overrides, defaults.

use std::path::Path;
use std::time::Duration;

use dustlobby_lobby::{GameConfig, LobbyConfig};
use dustlobby_protocol::Mode;
use dustlobby_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Overrides the admin password.
pub const ENV_ADMIN_PASSWORD: &str = "DUSTLOBBY_ADMIN_PASSWORD";
/// Overrides the feed URL. An empty value disables the feed.
pub const ENV_FEED_URL: &str = "DUSTLOBBY_FEED_URL";

/// Everything the server reads at startup. Every field has a default, so
/// an empty file (or no file) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket listener for clients.
    pub ws_addr: String,
    /// HTTP listener for the admin API.
    pub admin_addr: String,
    /// Shared secret for admin commands. Generated at startup when unset.
    pub admin_password: Option<String>,

    pub heartbeat_timeout_secs: u64,
    pub roster_grace_secs: u64,
    pub empty_grace_secs: u64,
    pub max_lobbies: usize,
    pub lobby_queue_size: usize,

    /// The run-completion feed. `None` runs without scores.
    pub feed_url: Option<String>,
    pub name_lookup_url: String,
    pub level_lookup_url: String,

    pub warmup_secs: u64,
    pub round_secs: u64,
    pub break_secs: u64,
    pub mode: Mode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_addr: "127.0.0.1:8765".into(),
            admin_addr: "127.0.0.1:8001".into(),
            admin_password: None,
            heartbeat_timeout_secs: 15,
            roster_grace_secs: 30,
            empty_grace_secs: 30,
            max_lobbies: 100,
            lobby_queue_size: 64,
            feed_url: Some("http://dustkid.com/backend/events.php".into()),
            name_lookup_url: "https://df.hitboxteam.com/backend6/userSearch.php".into(),
            level_lookup_url: "https://atlas.dustforce.com/gi/downloader.php".into(),
            warmup_secs: 10,
            round_secs: 600,
            break_secs: 30,
            mode: Mode::Any,
        }
    }
}

impl ServerConfig {
    /// Reads `path` if given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies `DUSTLOBBY_*` overrides looked up through `var`.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(password) = var(ENV_ADMIN_PASSWORD) {
            self.admin_password = Some(password);
        }
        if let Some(url) = var(ENV_FEED_URL) {
            self.feed_url = Some(url).filter(|u| !u.is_empty());
        }
        self
    }

    /// Fills in a random admin password if none is set. Returns `true`
    /// when one was generated.
    pub fn ensure_admin_password(&mut self) -> bool {
        if self.admin_password.as_deref().is_some_and(|p| !p.is_empty()) {
            return false;
        }
        let bytes: [u8; 16] = rand::random();
        self.admin_password = Some(bytes.iter().map(|b| format!("{b:02x}")).collect());
        true
    }

    /// Phase durations and mode used when an admin command omits them.
    pub fn default_game(&self) -> GameConfig {
        GameConfig {
            mode: self.mode,
            warmup_time: Duration::from_secs(self.warmup_secs),
            round_time: Duration::from_secs(self.round_secs),
            break_time: Duration::from_secs(self.break_secs),
            rounds: None,
        }
    }

    pub fn lobby_config(&self) -> LobbyConfig {
        LobbyConfig {
            roster_grace: Duration::from_secs(self.roster_grace_secs),
            empty_grace: Duration::from_secs(self.empty_grace_secs),
            channel_size: self.lobby_queue_size,
            max_lobbies: self.max_lobbies,
            default_game: self.default_game(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        }
    }

    /// Rejects values the server can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_game()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.heartbeat_timeout_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat_timeout_secs must be positive".into()));
        }
        if self.lobby_queue_size == 0 {
            return Err(ConfigError::Invalid("lobby_queue_size must be positive".into()));
        }
        Ok(())
    }
}
