//! Test doubles shared by the module's unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use msgpush_core::Context;
use msgpush_kv::{KVError, KVStore, RedbStore};
use msgpush_sql::{Dialect, Row, SQLError, SQLStore, SQLTx, SqliteStore, Value};

use crate::model::Record;
use crate::store::MsgStore;

/// Insert and commit a record.
pub fn seed_store<T: Record>(store: &MsgStore, record: &T) {
    let ctx = Context::background();
    store
        .insert_record(&ctx, record)
        .unwrap_or_else(|e| panic!("seed {}: {e}", record.id()))
        .commit(&ctx)
        .unwrap();
}

pub fn temp_kv() -> (Arc<RedbStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let kv = Arc::new(RedbStore::open(&dir.path().join("cache.redb")).unwrap());
    (kv, dir)
}

// ---------------------------------------------------------------------------
// KV doubles
// ---------------------------------------------------------------------------

/// Fails every write whose key starts with `fail_prefix`; counts all calls.
pub struct FlakyKV {
    inner: Arc<RedbStore>,
    fail_prefix: Option<&'static str>,
    calls: AtomicUsize,
}

impl FlakyKV {
    pub fn new(inner: Arc<RedbStore>, fail_prefix: Option<&'static str>) -> Self {
        Self {
            inner,
            fail_prefix,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KVStore for FlakyKV {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KVError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_prefix.is_some_and(|p| key.starts_with(p)) {
            return Err(KVError::Storage(format!("{key}: connection refused")));
        }
        self.inner.put(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), KVError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key)
    }
}

// ---------------------------------------------------------------------------
// SQL doubles
// ---------------------------------------------------------------------------

/// Counts statements sent to the wrapped store.
pub struct CountingSql {
    inner: SqliteStore,
    statements: AtomicUsize,
}

impl CountingSql {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            statements: AtomicUsize::new(0),
        }
    }

    pub fn statements(&self) -> usize {
        self.statements.load(Ordering::SeqCst)
    }
}

impl SQLStore for CountingSql {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.query(sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.exec(sql, params)
    }

    fn begin(&self) -> Result<Box<dyn SQLTx + '_>, SQLError> {
        self.statements.fetch_add(1, Ordering::SeqCst);
        self.inner.begin()
    }

    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }
}

/// Shares a SQLite store; while `broken` is set, statements executed
/// inside transactions fail as if the connection dropped, and commits fail
/// when `fail_commit` is set.
pub struct BrokenTxSql {
    inner: Arc<SqliteStore>,
    pub broken: AtomicBool,
    pub fail_commit: AtomicBool,
}

impl BrokenTxSql {
    pub fn new(inner: Arc<SqliteStore>) -> Self {
        Self {
            inner,
            broken: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
        }
    }
}

impl SQLStore for BrokenTxSql {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        self.inner.query(sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        self.inner.exec(sql, params)
    }

    fn begin(&self) -> Result<Box<dyn SQLTx + '_>, SQLError> {
        Ok(Box::new(BrokenTx {
            inner: self.inner.begin()?,
            broken: self.broken.load(Ordering::SeqCst),
            fail_commit: self.fail_commit.load(Ordering::SeqCst),
        }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

struct BrokenTx<'a> {
    inner: Box<dyn SQLTx + 'a>,
    broken: bool,
    fail_commit: bool,
}

impl SQLTx for BrokenTx<'_> {
    fn exec(&mut self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        if self.broken {
            return Err(SQLError::Connection("connection reset by peer".into()));
        }
        self.inner.exec(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        self.inner.query(sql, params)
    }

    fn commit(self: Box<Self>) -> Result<(), SQLError> {
        if self.fail_commit {
            // The wrapped transaction is dropped here, which rolls it back.
            return Err(SQLError::Transaction("commit: connection lost".into()));
        }
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), SQLError> {
        self.inner.rollback()
    }
}
