// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates the endpoint scheme and provides sensible defaults elsewhere

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

/// Connection settings for the agent bridge. Any change takes effect through
/// a full restart of the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// ws:// or wss:// endpoint of the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Bearer token attached to the connection handshake, passed through
    /// as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace roots; the first anchors relative edit URIs.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Shell program backing the injection terminal.
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_enabled() -> bool {
    true
}

fn default_shell() -> String {
    "bash".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: None,
            auth_token: None,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file (when present) with environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new("gantry.toml"));
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("GANTRY_ENABLED") {
            self.bridge.enabled = val
                .parse()
                .with_context(|| format!("GANTRY_ENABLED must be true or false, got: {}", val))?;
        }
        if let Ok(val) = std::env::var("GANTRY_ENDPOINT") {
            self.bridge.endpoint = Some(val);
        }
        if let Ok(val) = std::env::var("GANTRY_AUTH_TOKEN") {
            self.bridge.auth_token = Some(val);
        }
        if let Ok(val) = std::env::var("GANTRY_WORKSPACE_ROOTS") {
            self.workspace.roots = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Ok(val) = std::env::var("GANTRY_TERMINAL_SHELL") {
            self.terminal.shell = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if let Some(endpoint) = self.bridge.endpoint.as_deref() {
            let endpoint = endpoint.trim();
            if !endpoint.is_empty()
                && !endpoint.starts_with("ws://")
                && !endpoint.starts_with("wss://")
            {
                bail!("bridge.endpoint must start with ws:// or wss://, got: {endpoint}");
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.bridge.enabled);
        assert!(config.bridge.endpoint.is_none());
        assert!(config.workspace.roots.is_empty());
        assert_eq!(config.terminal.shell, "bash");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [bridge]
            enabled = true
            endpoint = "ws://127.0.0.1:8700"
            auth_token = "secret"

            [workspace]
            roots = ["/work/project"]

            [terminal]
            shell = "zsh"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.bridge.endpoint.as_deref(), Some("ws://127.0.0.1:8700"));
        assert_eq!(config.bridge.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.workspace.roots, vec![PathBuf::from("/work/project")]);
        assert_eq!(config.terminal.shell, "zsh");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str("[bridge]\nendpoint = \"wss://agent.example\"\n").unwrap();
        assert!(config.bridge.enabled);
        assert_eq!(config.terminal.shell, "bash");
    }

    #[test]
    fn test_validate_rejects_http_endpoint() {
        let config: Config =
            toml::from_str("[bridge]\nendpoint = \"http://agent.example\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_wss() {
        let config: Config =
            toml::from_str("[bridge]\nendpoint = \"wss://agent.example\"\n").unwrap();
        assert!(config.validate().is_ok());
    }
}
