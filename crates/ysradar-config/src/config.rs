//! Configuration structs with defaults and RON persistence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Protocol version codes of released simulator builds, newest first.
pub const KNOWN_VERSIONS: [u32; 7] = [
    20181124, 20180930, 20150425, 20130817, 20130805, 20120701, 20110207,
];

/// Platform config directory for the client, e.g. `~/.config/ysradar`.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("ysradar"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Server to connect to and the identity to log in with.
    pub server: ServerConfig,
    /// Protocol timing and map filtering.
    pub radar: RadarConfig,
    /// Logging and diagnostics.
    pub debug: DebugConfig,
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Username shown to other players (at most 15 bytes).
    pub username: String,
    /// Protocol version code sent in the login packet.
    pub version: u32,
    /// Version codes offered as choices to the user.
    pub known_versions: Vec<u32>,
}

/// Radar behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadarConfig {
    /// Seconds between keepalive roster requests.
    pub keepalive_secs: u64,
    /// Seconds without a roster update before a user is dropped.
    pub user_timeout_secs: u64,
    /// Ground-object names shown as navigation aids.
    pub nav_types: Vec<String>,
    /// Scenery object name -> navigation type, for custom templates.
    pub ground_features: BTreeMap<String, String>,
    /// Largest accepted frame payload in bytes.
    pub max_frame_payload: u32,
    /// Status messages kept for late subscribers.
    pub notification_history: usize,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Seconds between traffic summaries in the log (0 disables them).
    pub summary_secs: u64,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 7915,
            username: "radar".to_string(),
            version: 20180930,
            known_versions: KNOWN_VERSIONS.to_vec(),
        }
    }
}

impl Default for RadarConfig {
    fn default() -> Self {
        let ground_features = [
            ("ILS[CJAP]", "ILS"),
            ("ILS2[CJAP]", "ILS"),
            ("LDA[CJAP]", "NDB"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            keepalive_secs: 5,
            user_timeout_secs: 15,
            nav_types: vec!["ILS".to_string(), "VORDME".to_string(), "NDB".to_string()],
            ground_features,
            max_frame_payload: 1024 * 1024,
            notification_history: 100,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            summary_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Whether the configured version is one of the known release codes.
    pub fn is_known_version(&self) -> bool {
        self.known_versions.contains(&self.version)
    }
}

impl RadarConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs.max(1))
    }

    pub fn user_timeout(&self) -> Duration {
        Duration::from_secs(self.user_timeout_secs)
    }
}

impl DebugConfig {
    /// Summary period, or `None` when summaries are disabled.
    pub fn summary_interval(&self) -> Option<Duration> {
        (self.summary_secs > 0).then(|| Duration::from_secs(self.summary_secs))
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            if !config.server.is_known_version() {
                log::warn!(
                    "Version {} is not a known release; the server may reject it",
                    config.server.version
                );
            }
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
