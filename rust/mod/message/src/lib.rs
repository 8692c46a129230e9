//! Message module: edits to queued Email, WeChat and SMS messages.

pub mod api;
pub mod cache;
pub mod editor;
pub mod model;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::Router;
use msgpush_core::{Module, ServiceError};
use msgpush_kv::KVStore;
use msgpush_sql::SQLStore;

use cache::MsgCache;
use editor::{EditConfig, Editor};
use store::MsgStore;

pub struct MessageModule {
    editor: Arc<Editor>,
}

impl MessageModule {
    /// Wire the module onto shared stores. Creates the message tables if missing.
    pub fn new(
        sql: Arc<dyn SQLStore>,
        kv: Arc<dyn KVStore>,
        config: EditConfig,
    ) -> Result<Self, ServiceError> {
        let store = MsgStore::new(sql).map_err(|e| ServiceError::internal(e.to_string()))?;
        let cache = MsgCache::new(kv);
        Ok(Self {
            editor: Arc::new(Editor::new(Arc::new(cache), Arc::new(store), config)),
        })
    }

    pub fn editor(&self) -> Arc<Editor> {
        Arc::clone(&self.editor)
    }
}

impl Module for MessageModule {
    fn name(&self) -> &str {
        "message"
    }

    fn routes(&self) -> Router {
        api::router(self.editor())
    }
}
