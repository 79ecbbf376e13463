use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::env;
use crate::rules::PolicySettings;

pub const DEFAULT_API_BASE: &str = "https://api.socket.dev/v0";
pub const DEFAULT_SCAN_PATH: &str = "/scan/batch";
pub const PUBLIC_REGISTRY: &str = "https://registry.npmjs.org";
pub const DEFAULT_WALK_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub registry: RegistryConfig,
    pub shadow: ShadowConfig,
    pub gate: GateConfig,
    pub policy: PolicySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub scan_path: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Origin treated as the public registry; only diffs touching it are scanned.
    pub public_origin: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub shim_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub prefetch: bool,
    pub walk_limit: usize,
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub shim_dir: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            scan_path: DEFAULT_SCAN_PATH.to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            public_origin: PUBLIC_REGISTRY.to_string(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            prefetch: true,
            walk_limit: DEFAULT_WALK_LIMIT,
        }
    }
}

impl ApiConfig {
    pub fn scan_endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.scan_path.trim_start_matches('/')
        )
    }

    /// Environment wins over the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        env::non_empty(env::API_KEY).or_else(|| self.api_key.clone().filter(|key| !key.is_empty()))
    }
}

impl Config {
    pub fn default_config() -> Self {
        Self::default()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("parse config TOML")?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        let output = toml::to_string_pretty(self).context("render config TOML")?;
        Ok(output)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read config at {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    /// Loads an explicit path strictly; the default location falls back to defaults when absent.
    pub fn load_or_default(explicit: Option<&Path>, paths: &ConfigPaths) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if paths.config_path.exists() => {
                tracing::debug!(path = %paths.config_path.display(), "loading config");
                Self::load(&paths.config_path)
            }
            None => {
                tracing::debug!(
                    path = %paths.config_path.display(),
                    "no config file; using defaults"
                );
                Ok(Self::default_config())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create config dir {}", parent.display()))?;
        }
        let contents = self.to_toml_string()?;
        fs::write(path, contents).with_context(|| format!("write config at {}", path.display()))?;
        Ok(())
    }

    pub fn shim_dir(&self, paths: &ConfigPaths) -> PathBuf {
        env::non_empty(env::SHIM_DIR)
            .map(PathBuf::from)
            .or_else(|| self.shadow.shim_dir.clone())
            .unwrap_or_else(|| paths.shim_dir.clone())
    }
}

impl ConfigPaths {
    pub fn resolve() -> Result<Self> {
        let project_dirs = ProjectDirs::from("dev", "sockwarden", "sockwarden")
            .ok_or_else(|| anyhow::anyhow!("unable to determine project directories"))?;
        let config_dir = project_dirs.config_dir();
        let data_dir = project_dirs.data_dir();
        Ok(Self {
            config_path: config_dir.join("config.toml"),
            data_dir: data_dir.to_path_buf(),
            shim_dir: data_dir.join("shims"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Rule, RuleAction};

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.api.scan_endpoint(), "https://api.socket.dev/v0/scan/batch");
        assert_eq!(config.registry.public_origin, PUBLIC_REGISTRY);
        assert_eq!(config.gate.walk_limit, DEFAULT_WALK_LIMIT);
        assert!(config.gate.prefetch);
    }

    #[test]
    fn parses_policy_overlay() {
        let toml = r#"
            [gate]
            prefetch = false

            [policy.defaults.issue_rules]
            malware = true
            installScripts = { action = "warn" }

            [[policy.entries]]
            start = "user"

            [policy.entries.settings.user.issue_rules]
            didYouMean = { action = "ignore" }
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert!(!config.gate.prefetch);
        assert_eq!(config.policy.defaults.issue_rules["malware"], Rule::Enabled(true));
        let user = &config.policy.entries[0].settings["user"];
        assert_eq!(user.issue_rules["didYouMean"], Rule::action(RuleAction::Ignore));
        assert!(user.defer_to.is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default_config();
        config.api.base_url = "https://example.test/v0".to_string();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.api.base_url, "https://example.test/v0");
    }

    #[test]
    fn missing_default_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ConfigPaths {
            config_path: dir.path().join("absent.toml"),
            data_dir: dir.path().to_path_buf(),
            shim_dir: dir.path().join("shims"),
        };
        assert!(Config::load_or_default(None, &paths).is_ok());
        assert!(Config::load_or_default(Some(&paths.config_path), &paths).is_err());
    }
}
