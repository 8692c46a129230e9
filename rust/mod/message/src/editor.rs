use std::sync::Arc;
use std::time::Duration;

use msgpush_core::{Context, ServiceError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::cache::{CacheError, MsgCache};
use crate::model::{EditFields, EditRequest, Email, MsgStatus, Record, Sms, WeChat};
use crate::store::{MsgStore, StoreError};

/// Cache lifetimes and call budget for edits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EditConfig {
    /// TTL of base snapshots, seconds. `<= 0` keeps them until overwritten.
    pub base_ttl_secs: i64,
    /// TTL of latest snapshots, seconds. `<= 0` keeps them until overwritten.
    pub latest_ttl_secs: i64,
    /// Deadline applied to each HTTP-initiated edit.
    pub timeout_ms: u64,
}

impl Default for EditConfig {
    fn default() -> Self {
        Self {
            base_ttl_secs: 0,
            latest_ttl_secs: 0,
            timeout_ms: 3_000,
        }
    }
}

impl EditConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Everything that can stop an edit before it is normalized for the caller.
#[derive(Error, Debug)]
enum Fault {
    #[error(transparent)]
    Rejected(#[from] ServiceError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("snapshot codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Map a fault onto the public taxonomy. Anything unrecognised is logged
/// with the method name and wrapped as `Internal`.
fn normalize(method: &'static str, fault: Fault) -> ServiceError {
    match fault {
        Fault::Rejected(e) => e,
        Fault::Cache(CacheError::Miss) => ServiceError::MsgNotFound,
        Fault::Store(StoreError::NoRowsEffected) => ServiceError::NoRowsEffected,
        Fault::Store(StoreError::UniqueKeyExists) => ServiceError::UniqueKeyExists,
        other => {
            error!(method, error = %other, "data operation failed");
            ServiceError::internal(other.to_string())
        }
    }
}

/// Applies edits to queued messages, keeping storage and the base cache in step.
///
/// Per edit:
///
/// ```text
/// base cache ─read─▶ status check ─▶ BEGIN; UPDATE ─▶ base cache ─write─▶ COMMIT ─▶ latest cache (best effort)
/// ```
///
/// Any failure after BEGIN rolls the transaction back before returning.
pub struct Editor {
    cache: Arc<MsgCache>,
    store: Arc<MsgStore>,
    config: EditConfig,
}

impl Editor {
    pub fn new(cache: Arc<MsgCache>, store: Arc<MsgStore>, config: EditConfig) -> Self {
        Self {
            cache,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EditConfig {
        &self.config
    }

    /// Edit a queued message.
    pub fn edit(&self, ctx: &Context, req: EditRequest) -> Result<(), ServiceError> {
        let req = req.normalize();
        self.dispatch(ctx, req).map_err(|f| normalize("Edit", f))
    }

    /// Current view of a message: the latest snapshot, falling back to base.
    pub fn detail(&self, ctx: &Context, id: &str) -> Result<serde_json::Value, ServiceError> {
        let lookup = || -> Result<serde_json::Value, Fault> {
            let bytes = match self.cache.latest_detail(ctx, id) {
                Ok(bytes) => bytes,
                Err(CacheError::Miss) => self.cache.base_detail(ctx, id)?,
                Err(e) => return Err(e.into()),
            };
            Ok(serde_json::from_slice(&bytes)?)
        };
        lookup().map_err(|f| normalize("Detail", f))
    }

    fn dispatch(&self, ctx: &Context, req: EditRequest) -> Result<(), Fault> {
        match req {
            EditRequest::Email(e) => self.edit_record::<Email>(ctx, e.into()),
            EditRequest::WeChat(w) => self.edit_record::<WeChat>(ctx, w.into()),
            EditRequest::Sms(s) => self.edit_record::<Sms>(ctx, s.into()),
            EditRequest::Unknown => Err(ServiceError::MsgTypeNotFound.into()),
        }
    }

    fn edit_record<T: Record>(&self, ctx: &Context, edit: EditFields) -> Result<(), Fault> {
        let (mut snapshot, previous) = self.check_status::<T>(ctx, &edit.id)?;
        snapshot.apply(&edit);

        let mut tx = self.store.update_edit::<T>(ctx, &edit)?;

        // The row's version may have moved past the cached one through batch
        // upserts; the snapshot takes whatever the update produced.
        match tx.row_version::<T>(ctx, &edit.id) {
            Ok(version) => snapshot.set_version(version),
            Err(e) => {
                tx.rollback();
                return Err(e.into());
            }
        }

        let bytes = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                tx.rollback();
                return Err(e.into());
            }
        };
        if let Err(e) = self
            .cache
            .put_base(ctx, &edit.id, &bytes, self.config.base_ttl_secs)
        {
            tx.rollback();
            return Err(e.into());
        }

        if let Err(e) = tx.commit(ctx) {
            // Storage kept the old row; put the old snapshot back so the
            // base tier does not advertise an edit that never landed.
            if let Err(restore) =
                self.cache
                    .put_base(&Context::background(), &edit.id, &previous, self.config.base_ttl_secs)
            {
                error!(id = %edit.id, error = %restore, "failed to restore base snapshot after commit failure");
            }
            return Err(e.into());
        }

        if let Err(e) = self
            .cache
            .put_latest(ctx, &edit.id, &bytes, self.config.latest_ttl_secs)
        {
            warn!(id = %edit.id, table = T::TABLE, error = %e, "latest cache write failed");
        }

        debug!(id = %edit.id, table = T::TABLE, version = snapshot.version(), "message edited");
        Ok(())
    }

    /// Load the base snapshot and make sure it may still be edited.
    /// Returns the decoded snapshot and its raw bytes.
    fn check_status<T: Record>(&self, ctx: &Context, id: &str) -> Result<(T, Vec<u8>), Fault> {
        let bytes = self.cache.base_detail(ctx, id)?;
        let msg: T = serde_json::from_slice(&bytes)?;
        match msg.status() {
            MsgStatus::Cancelled => Err(ServiceError::MsgHasCancelled.into()),
            MsgStatus::Final => Err(ServiceError::MsgCantEdit.into()),
            MsgStatus::Pending => Ok((msg, bytes)),
        }
    }
}
