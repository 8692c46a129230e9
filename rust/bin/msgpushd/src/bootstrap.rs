//! Startup checks run before any store is opened.

use crate::config::ServerConfig;

/// Refuse to start on a configuration that cannot serve edits.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.data_dir.trim().is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    if config.edit.timeout_ms == 0 {
        anyhow::bail!("edit.timeout_ms must be greater than zero.");
    }
    Ok(())
}
