//! Container configuration
//!
//! Loaded from TOML, YAML or JSON (chosen by file extension) and optionally
//! overridden from environment variables:
//! - `<PREFIX>_NAME`
//! - `<PREFIX>_VALIDATE_GRAPH`
//! - `<PREFIX>_WARN_HIDDEN`
//! - `<PREFIX>_HOOK_TIMEOUT_MS`

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, env, fs, path::Path, time::Duration};
use tracing::debug;

/// Prefix for environment overrides, e.g. `CONTAINER_HOOK_TIMEOUT_MS`
pub const DEFAULT_ENV_PREFIX: &str = "CONTAINER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Name used in logs and debug output
    pub name: String,
    /// Enumerate graph cycles before initialization and fail on the first one
    pub validate_graph_on_init: bool,
    /// Log module providers whose dependencies are not visible through imports
    pub warn_on_hidden_dependencies: bool,
    /// Upper bound for a single onInit/onDestroy hook; `None` waits forever
    pub hook_timeout_ms: Option<u64>,
    /// Literal values registered as `Value` providers at construction
    pub values: BTreeMap<String, Value>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            validate_graph_on_init: true,
            warn_on_hidden_dependencies: true,
            hook_timeout_ms: None,
            values: BTreeMap::new(),
        }
    }
}

impl ContainerConfig {
    /// Default settings under a custom container name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse TOML. Env overrides are applied separately by [`ContainerConfig::apply_env`].
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML container configuration")
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse YAML container configuration")
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON container configuration")
    }

    /// Load by extension: `.toml`, `.yaml`/`.yml` or `.json`
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let config = match extension.as_deref() {
            Some("toml") => Self::from_toml_str(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content)?,
            Some("json") => Self::from_json_str(&content)?,
            other => {
                return Err(anyhow!(
                    "Unsupported configuration format {:?} for {}",
                    other,
                    path.display()
                ))
            }
        };
        debug!("Loaded container configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `<PREFIX>_*` environment overrides
    pub fn apply_env(&mut self, prefix: &str) -> Result<()> {
        if let Ok(name) = env::var(format!("{prefix}_NAME")) {
            self.name = name;
        }
        if let Some(flag) = read_bool(&format!("{prefix}_VALIDATE_GRAPH"))? {
            self.validate_graph_on_init = flag;
        }
        if let Some(flag) = read_bool(&format!("{prefix}_WARN_HIDDEN"))? {
            self.warn_on_hidden_dependencies = flag;
        }
        if let Ok(raw) = env::var(format!("{prefix}_HOOK_TIMEOUT_MS")) {
            let ms = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{prefix}_HOOK_TIMEOUT_MS must be an integer"))?;
            self.hook_timeout_ms = Some(ms);
        }
        Ok(())
    }

    /// `hook_timeout_ms` as a [`Duration`]; `None` means hooks may run forever
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_ms.map(Duration::from_millis)
    }
}

fn read_bool(key: &str) -> Result<Option<bool>> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(anyhow!("{key} must be a boolean, got '{other}'")),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert_eq!(config.name, "default");
        assert!(config.validate_graph_on_init);
        assert!(config.hook_timeout().is_none());
        assert!(config.values.is_empty());
    }

    #[test]
    fn test_toml_with_values() {
        let config = ContainerConfig::from_toml_str(
            r#"
            name = "arena"
            hook_timeout_ms = 250

            [values]
            max_players = 8
            map = "dust"
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "arena");
        assert_eq!(config.hook_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.values["max_players"], Value::from(8));
        assert_eq!(config.values["map"], Value::from("dust"));
        assert!(config.warn_on_hidden_dependencies);
    }

    #[test]
    fn test_from_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "name: yaml-container\nvalidate_graph_on_init: false").unwrap();

        let config = ContainerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.name, "yaml-container");
        assert!(!config.validate_graph_on_init);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(ContainerConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let prefix = "CONTAINER_CFG_TEST";
        env::set_var(format!("{prefix}_NAME"), "from-env");
        env::set_var(format!("{prefix}_VALIDATE_GRAPH"), "off");
        env::set_var(format!("{prefix}_HOOK_TIMEOUT_MS"), "40");

        let mut config = ContainerConfig::default();
        config.apply_env(prefix).unwrap();
        assert_eq!(config.name, "from-env");
        assert!(!config.validate_graph_on_init);
        assert_eq!(config.hook_timeout_ms, Some(40));

        env::set_var(format!("{prefix}_WARN_HIDDEN"), "maybe");
        assert!(config.apply_env(prefix).is_err());
    }
}
