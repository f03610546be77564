// src/config.rs

//! Tool configuration, read from an optional TOML file and overridden by
//! command-line flags.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "accurev2git.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the AccuRev client executable
    pub accurev_path: PathBuf,
    pub accurev_principal: Option<String>,
    /// Source user whose identity authors the initial commit
    pub default_git_user: Option<String>,
    pub users_file: PathBuf,
    /// Where history cache files are kept
    pub cache_dir: PathBuf,
    /// Domain for placeholder emails of unmapped users
    pub fallback_email_domain: String,
    /// Extra AccuRev error substrings to treat as harmless
    pub benign_errors: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accurev_path: PathBuf::from("accurev"),
            accurev_principal: None,
            default_git_user: None,
            users_file: PathBuf::from("users.txt"),
            cache_dir: PathBuf::from("."),
            fallback_email_domain: "localhost".to_string(),
            benign_errors: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Loads `path` if given, else the default file if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(Path::new(DEFAULT_CONFIG_FILE)),
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.accurev_path.as_os_str().is_empty() {
            return Err(Error::Config("accurev_path must not be empty".to_string()));
        }
        if self.fallback_email_domain.trim().is_empty() {
            return Err(Error::Config("fallback_email_domain must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.accurev_path, PathBuf::from("accurev"));
        assert_eq!(config.users_file, PathBuf::from("users.txt"));
        assert!(config.default_git_user.is_none());
    }

    #[test]
    fn test_full_config() {
        let toml_str = r#"
accurev_path = "/opt/accurev/bin/accurev"
accurev_principal = "builder"
default_git_user = "admin"
users_file = "/etc/users.txt"
cache_dir = "/var/cache/a2g"
fallback_email_domain = "corp.invalid"
benign_errors = ["is locked"]
"#;
        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.accurev_principal.as_deref(), Some("builder"));
        assert_eq!(config.default_git_user.as_deref(), Some("admin"));
        assert_eq!(config.benign_errors, vec!["is locked"]);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_toml("git_path = \"git\"").is_err());
    }

    #[test]
    fn test_empty_domain_rejected() {
        assert!(Config::from_toml("fallback_email_domain = \" \"").is_err());
    }
}
