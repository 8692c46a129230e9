//! Two-tier message cache over a flat KV store.
//!
//! Per message id there are two entries, told apart by key prefix:
//!
//! - `base<id>`: the last committed snapshot. Status checks and edit
//!   merges read from here.
//! - `lastest<id>`: best-effort freshest view for readers; may lag.
//!
//! The prefixes are concatenated with the id without a separator and must
//! stay byte-identical for compatibility with other writers of the cache.
//! `detail`/`store_detail` address the raw id for callers outside the
//! two-tier scheme.

use std::sync::Arc;
use std::time::Duration;

use msgpush_core::{Context, ContextError};
use msgpush_kv::{KVError, KVStore};
use thiserror::Error;

pub const BASE_PREFIX: &str = "base";
pub const LATEST_PREFIX: &str = "lastest";

#[derive(Error, Debug)]
pub enum CacheError {
    /// The key is absent or expired.
    #[error("cache miss")]
    Miss,

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("cache: {0}")]
    Storage(#[from] KVError),
}

pub fn base_key(id: &str) -> String {
    format!("{BASE_PREFIX}{id}")
}

pub fn latest_key(id: &str) -> String {
    format!("{LATEST_PREFIX}{id}")
}

/// Convert a ttl in seconds into a KV expiry.
///
/// Zero or negative means "no expiry": a negative ttl never produces an
/// entry that is already expired when written.
pub fn expiry(ttl_secs: i64) -> Option<Duration> {
    if ttl_secs <= 0 {
        None
    } else {
        Some(Duration::from_secs(ttl_secs as u64))
    }
}

/// Namespaced access to message snapshots.
pub struct MsgCache {
    kv: Arc<dyn KVStore>,
}

impl MsgCache {
    pub fn new(kv: Arc<dyn KVStore>) -> Self {
        Self { kv }
    }

    /// Read a key. A miss is [`CacheError::Miss`], never an empty value.
    pub fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>, CacheError> {
        ctx.check()?;
        self.kv.get(key)?.ok_or(CacheError::Miss)
    }

    /// Write a key. `ttl_secs <= 0` stores without expiry.
    pub fn put(
        &self,
        ctx: &Context,
        key: &str,
        value: &[u8],
        ttl_secs: i64,
    ) -> Result<(), CacheError> {
        ctx.check()?;
        self.kv.put(key, value, expiry(ttl_secs))?;
        Ok(())
    }

    pub fn base_detail(&self, ctx: &Context, id: &str) -> Result<Vec<u8>, CacheError> {
        self.get(ctx, &base_key(id))
    }

    pub fn latest_detail(&self, ctx: &Context, id: &str) -> Result<Vec<u8>, CacheError> {
        self.get(ctx, &latest_key(id))
    }

    pub fn put_base(
        &self,
        ctx: &Context,
        id: &str,
        value: &[u8],
        ttl_secs: i64,
    ) -> Result<(), CacheError> {
        self.put(ctx, &base_key(id), value, ttl_secs)
    }

    pub fn put_latest(
        &self,
        ctx: &Context,
        id: &str,
        value: &[u8],
        ttl_secs: i64,
    ) -> Result<(), CacheError> {
        self.put(ctx, &latest_key(id), value, ttl_secs)
    }

    /// Raw read by id, bypassing the two-tier prefixes.
    pub fn detail(&self, ctx: &Context, id: &str) -> Result<Vec<u8>, CacheError> {
        self.get(ctx, id)
    }

    /// Raw write by id, bypassing the two-tier prefixes.
    pub fn store_detail(
        &self,
        ctx: &Context,
        id: &str,
        value: &[u8],
        ttl_secs: i64,
    ) -> Result<(), CacheError> {
        self.put(ctx, id, value, ttl_secs)
    }
}
