//! Server configuration, read from `/etc/msgpush/<name>.toml`.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/msgpush"
//!
//! [cache]
//! base_ttl_secs = 86400
//! latest_ttl_secs = 3600
//!
//! [edit]
//! timeout_ms = 3000
//! ```

use std::path::{Path, PathBuf};

use message::editor::EditConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub edit: EditSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Overrides `{data_dir}/cache.redb`.
    #[serde(default)]
    pub cache_path: Option<String>,
    /// Overrides `{data_dir}/messages.sqlite`.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

/// Cache lifetimes in seconds; `<= 0` disables expiry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub base_ttl_secs: i64,
    pub latest_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EditSection {
    pub timeout_ms: u64,
}

impl Default for EditSection {
    fn default() -> Self {
        Self {
            timeout_ms: EditConfig::default().timeout_ms,
        }
    }
}

impl ServerConfig {
    /// Resolve a context name or path to a config file.
    ///
    /// Anything containing `/` or `.` is taken as a path; a bare name maps
    /// to `/etc/msgpush/<name>.toml`.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from(format!("/etc/msgpush/{name_or_path}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Ok(toml::from_str(&content)?)
    }

    pub fn edit_config(&self) -> EditConfig {
        EditConfig {
            base_ttl_secs: self.cache.base_ttl_secs,
            latest_ttl_secs: self.cache.latest_ttl_secs,
            timeout_ms: self.edit.timeout_ms,
        }
    }

    pub fn service_config(&self, listen: &str) -> msgpush_core::ServiceConfig {
        msgpush_core::ServiceConfig {
            data_dir: Some(PathBuf::from(&self.storage.data_dir)),
            cache_path: self.storage.cache_path.as_ref().map(PathBuf::from),
            sqlite_path: self.storage.sqlite_path.as_ref().map(PathBuf::from),
            listen: listen.to_string(),
        }
    }
}
