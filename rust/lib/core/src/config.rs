use std::path::PathBuf;

/// Common storage configuration shared by all services.
///
/// The server binary fills this from its config file and command line,
/// then passes it to storage layer initialization.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Directory holding the embedded databases.
    pub data_dir: Option<PathBuf>,

    /// Path to the redb file backing the message cache.
    /// Defaults to `{data_dir}/cache.redb` if not specified.
    pub cache_path: Option<PathBuf>,

    /// Path to the SQLite database file holding message rows.
    /// Defaults to `{data_dir}/messages.sqlite` if not specified.
    pub sqlite_path: Option<PathBuf>,

    /// Listen address for the HTTP server.
    pub listen: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_path: None,
            sqlite_path: None,
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Resolve the cache path, falling back to `{data_dir}/cache.redb`.
    pub fn resolve_cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("cache.redb"))
    }

    /// Resolve the SQLite database path, falling back to `{data_dir}/messages.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("messages.sqlite"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}
