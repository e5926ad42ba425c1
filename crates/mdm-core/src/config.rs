use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per artifact (including the first).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::retry::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// libcurl transfer tuning (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// A transfer slower than this many bytes/sec for `low_speed_time_secs` is a timeout.
    pub low_speed_limit_bytes: u32,
    pub low_speed_time_secs: u64,
    /// Redirects followed before giving up.
    pub max_redirections: u32,
    /// Optional User-Agent header.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
            max_redirections: 10,
            user_agent: None,
        }
    }
}

/// Global configuration loaded from `~/.config/mdm/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdmConfig {
    /// Directory holding installed models. Defaults to `~/.local/share/mdm/models`.
    #[serde(default)]
    pub models_dir: Option<PathBuf>,
    /// Base URL artifacts are fetched from; the model filename is joined onto it.
    pub base_url: String,
    /// URL of the JSON release manifest.
    pub manifest_url: String,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional transport tuning; if missing, built-in defaults are used.
    #[serde(default)]
    pub transport: Option<TransportConfig>,
}

impl Default for MdmConfig {
    fn default() -> Self {
        Self {
            models_dir: None,
            base_url: "https://models.mdm.invalid/artifacts/".to_string(),
            manifest_url: "https://models.mdm.invalid/release.json".to_string(),
            retry: None,
            transport: None,
        }
    }
}

impl MdmConfig {
    /// Retry ceiling after applying defaults.
    pub fn max_attempts(&self) -> u32 {
        self.retry.clone().unwrap_or_default().max_attempts
    }

    pub fn transport_or_default(&self) -> TransportConfig {
        self.transport.clone().unwrap_or_default()
    }

    /// Configured model directory, or the XDG data default.
    pub fn resolved_models_dir(&self) -> Result<PathBuf> {
        match &self.models_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_models_dir(),
        }
    }
}

/// `~/.local/share/mdm/models`.
pub fn default_models_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.get_data_home().join("mdm").join("models"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MdmConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = MdmConfig::default();
        assert!(cfg.models_dir.is_none());
        assert!(cfg.base_url.ends_with('/'));
        assert_eq!(cfg.max_attempts(), 3);
        assert_eq!(cfg.transport_or_default().connect_timeout_secs, 30);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = MdmConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MdmConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.base_url, cfg.base_url);
        assert_eq!(parsed.manifest_url, cfg.manifest_url);
        assert!(parsed.retry.is_none());
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            models_dir = "/srv/models"
            base_url = "https://cdn.test/models/"
            manifest_url = "https://cdn.test/release.json"

            [retry]
            max_attempts = 2

            [transport]
            connect_timeout_secs = 5
            low_speed_limit_bytes = 10
            low_speed_time_secs = 20
            max_redirections = 3
            user_agent = "mdm-test"
        "#;
        let cfg: MdmConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.resolved_models_dir().unwrap(), PathBuf::from("/srv/models"));
        assert_eq!(cfg.max_attempts(), 2);
        let t = cfg.transport_or_default();
        assert_eq!(t.connect_timeout_secs, 5);
        assert_eq!(t.max_redirections, 3);
        assert_eq!(t.user_agent.as_deref(), Some("mdm-test"));
    }

    #[test]
    fn config_toml_minimal_uses_defaults_for_sections() {
        let toml = r#"
            base_url = "https://cdn.test/"
            manifest_url = "https://cdn.test/release.json"
        "#;
        let cfg: MdmConfig = toml::from_str(toml).unwrap();
        assert!(cfg.models_dir.is_none());
        assert!(cfg.transport.is_none());
        assert_eq!(cfg.max_attempts(), crate::retry::DEFAULT_MAX_ATTEMPTS);
    }
}
