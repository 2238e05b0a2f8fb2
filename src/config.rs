//! Configuration file and environment overrides.
//!
//! Lookup order: explicit path, `$POSEBRIDGE_CONFIG`,
//! `~/.config/posebridge/config.toml`, `/etc/posebridge/config.toml`, defaults.
//! `POSEBRIDGE_CHANNEL` and `POSEBRIDGE_BIND` override the file.

use crate::channel::{self, Channel};
use crate::engine::EngineConfig;
use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_CONFIG: &str = "POSEBRIDGE_CONFIG";
pub const ENV_CHANNEL: &str = "POSEBRIDGE_CHANNEL";
pub const ENV_BIND: &str = "POSEBRIDGE_BIND";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub channel: ChannelConfig,
    pub ingest: IngestConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Name both processes agree on.
    pub name: String,
    /// Directory for the backing file. `None` uses `/dev/shm` or the temp dir.
    pub directory: Option<PathBuf>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "posebridge".into(),
            directory: None,
        }
    }
}

impl ChannelConfig {
    pub fn open(&self) -> Result<Channel> {
        match &self.directory {
            Some(dir) => Channel::open_in(dir, &self.name),
            None => Channel::open(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// TCP address the phone app connects to.
    pub bind: String,
    /// Bytes read per receive call.
    pub recv_buffer: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:27015".into(),
            recv_buffer: 1024,
        }
    }
}

impl BridgeConfig {
    /// Parse a TOML document. Missing sections and keys take defaults.
    pub fn from_toml_str(text: &str) -> Result<BridgeConfig> {
        let config: BridgeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or search the default locations when `None`.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<BridgeConfig> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::read_file(&path)?,
            None => match config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::read_file(&path)?,
                None => {
                    log::info!("No config found, using defaults");
                    BridgeConfig::default()
                }
            },
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<BridgeConfig> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(name) = read_env_string(ENV_CHANNEL) {
            self.channel.name = name;
        }
        if let Some(bind) = read_env_string(ENV_BIND) {
            self.ingest.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        channel::validate_name(&self.channel.name).map_err(|_| {
            BridgeError::Config(format!("invalid channel name '{}'", self.channel.name))
        })?;
        if self.ingest.recv_buffer == 0 {
            return Err(BridgeError::Config("ingest.recv_buffer must be > 0".into()));
        }
        let period = self.engine.rotation_period_deg;
        if !(period.is_finite() && period > 0.0) {
            return Err(BridgeError::Config(format!(
                "engine.rotation_period_deg must be > 0, got {}",
                period
            )));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Config(e.to_string()))
    }
}

fn config_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(PathBuf::from) {
        out.push(home.join(".config/posebridge/config.toml"));
    }
    out.push(PathBuf::from("/etc/posebridge/config.toml"));
    out
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = BridgeConfig::from_toml_str("").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.ingest.bind, "0.0.0.0:27015");
        assert_eq!(config.ingest.recv_buffer, 1024);
        assert_eq!(config.channel.name, "posebridge");
        assert_eq!(config.engine.rotation_period_deg, 90.0);
        assert!(config.engine.tracking_active_at_start);
    }

    #[test]
    fn test_partial_sections() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [channel]
            name = "phone-pipe"

            [engine]
            hand_rest_offset = [0.2, -0.3, -0.3]
            pointer_gain = 0.02
            "#,
        )
        .unwrap();
        assert_eq!(config.channel.name, "phone-pipe");
        assert_eq!(config.channel.directory, None);
        assert_eq!(config.engine.hand_rest_offset, [0.2, -0.3, -0.3]);
        assert_eq!(config.engine.pointer_gain, 0.02);
        assert_eq!(config.engine.move_step, 0.01);
        assert_eq!(config.ingest, IngestConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "[channel]\nname = \"a/b\"",
            "[channel]\nname = \"\"",
            "[ingest]\nrecv_buffer = 0",
            "[engine]\nrotation_period_deg = 0.0",
            "[engine]\nrotation_period_deg = -90.0",
        ] {
            match BridgeConfig::from_toml_str(text) {
                Err(BridgeError::Config(_)) => {}
                other => panic!("expected Config error for {:?}, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(
            BridgeConfig::from_toml_str("[channel\nname="),
            Err(BridgeError::Toml(_))
        ));
    }

    #[test]
    fn test_round_trip_through_file() {
        let path = std::env::temp_dir()
            .join(format!("posebridge-config-{}.toml", std::process::id()));
        let mut config = BridgeConfig::default();
        config.ingest.bind = "127.0.0.1:4000".into();
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = BridgeConfig::read_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let path = std::env::temp_dir().join("posebridge-does-not-exist.toml");
        assert!(matches!(BridgeConfig::load(Some(&path)), Err(BridgeError::Io(_))));
    }
}
