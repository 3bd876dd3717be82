//! Engine configuration loaded from TOML.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use varflow_stream::StreamSettings;

/// Settings shared by every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace for persisted values when a snapshot names no session.
    pub session_scope: String,
    /// Channel id placed in backend requests.
    pub ws_channel: String,
    pub stream: StreamSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_scope: "default".to_string(),
            ws_channel: "varflow-cli".to_string(),
            stream: StreamSettings::default(),
        }
    }
}

/// Load configuration from `path`, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            session_scope = "alice"

            [stream]
            max_reconnect_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.session_scope, "alice");
        assert_eq!(config.ws_channel, "varflow-cli");
        assert_eq!(config.stream.backoff_base_ms, 1000);
        assert_eq!(config.stream.max_reconnect_attempts, Some(5));
    }

    #[test]
    fn test_missing_path_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }
}
