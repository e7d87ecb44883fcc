//! Configuration for UoT streams.
//!
//! Loaded from YAML, for example:
//!
//! ```yaml
//! max_payload_size: 65507
//! short_buffer_policy: retain
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, UotError};
use crate::uot::MAX_PAYLOAD_SIZE;

/// What `read_packet` does with a record that does not fit the caller's buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortBufferPolicy {
    /// Drop the record and keep reading from the next one.
    #[default]
    Discard,
    /// Keep the record buffered so a retry with a bigger buffer gets it.
    Retain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UotConfig {
    /// Largest payload `write_packet` accepts.
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    #[serde(default)]
    pub short_buffer_policy: ShortBufferPolicy,
}

fn default_max_payload_size() -> usize {
    MAX_PAYLOAD_SIZE
}

impl Default for UotConfig {
    fn default() -> Self {
        Self {
            max_payload_size: default_max_payload_size(),
            short_buffer_policy: ShortBufferPolicy::default(),
        }
    }
}

impl UotConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: UotConfig = serde_yaml::from_str(s)
            .map_err(|e| UotError::Config(format!("could not parse config YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_payload_size > MAX_PAYLOAD_SIZE {
            return Err(UotError::Config(format!(
                "max_payload_size {} exceeds {MAX_PAYLOAD_SIZE}",
                self.max_payload_size
            )));
        }
        Ok(())
    }
}

/// Reads and validates a config file.
pub async fn load_config(path: impl AsRef<std::path::Path>) -> Result<UotConfig> {
    let path = path.as_ref();
    let config_bytes = tokio::fs::read(path).await.map_err(|e| {
        UotError::Config(format!("could not read config file {}: {e}", path.display()))
    })?;

    let config_str = String::from_utf8(config_bytes).map_err(|e| {
        UotError::Config(format!(
            "could not parse config file {} as UTF8: {e}",
            path.display()
        ))
    })?;

    UotConfig::from_yaml_str(&config_str)
}
