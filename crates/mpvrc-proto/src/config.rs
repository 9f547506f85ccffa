use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub file_system: FileSystemConfig,
}

/// Where the daemon listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where the terminal client finds the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    /// Explicit mpv path; searched for when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,
    #[serde(default)]
    pub extra_args: Vec<String>,
    #[serde(default = "default_force_window")]
    pub force_window: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSystemConfig {
    #[serde(default)]
    pub show_hidden: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            binary: None,
            extra_args: Vec::new(),
            force_window: default_force_window(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_force_window() -> bool {
    true
}

impl Config {
    /// Load from the default location, writing defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.bind_address, "0.0.0.0");
        assert_eq!(config.client.backend_url, "http://127.0.0.1:8080");
        assert!(config.mpv.force_window);
        assert!(config.mpv.binary.is_none());
        assert!(!config.file_system.show_hidden);
    }

    #[test]
    fn first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.http.port, 8080);
        assert!(path.exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http]\nport = 9000\n\n[file_system]\nshow_hidden = true\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.bind_address, "0.0.0.0");
        assert!(config.file_system.show_hidden);
        assert_eq!(config.client.backend_url, "http://127.0.0.1:8080");
    }
}
