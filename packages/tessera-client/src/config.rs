//! Configuration for the Tessera client.
//! Reads client.json from ~/.config/tessera/client.json (or platform equivalent).

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tessera_core::config::SessionConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_push_url")]
    pub push_url: String,
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Bearer token sent to both the REST API and the push channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_push_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            push_url: default_push_url(),
            board_id: String::new(),
            user_id: String::new(),
            token: None,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// A session needs to know which board to mirror and who is asking.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board_id.trim().is_empty() {
            return Err(ConfigError::Missing("boardId"));
        }
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::Missing("userId"));
        }
        Ok(())
    }
}

/// Default config path: ~/.config/tessera/client.json
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
        .join("client.json")
}

/// Load config from path. Returns defaults if the file doesn't exist.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::info!("[tessera.config] No config at {}, using defaults", path.display());
            return Ok(ClientConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
