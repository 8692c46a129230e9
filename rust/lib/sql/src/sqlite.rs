use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, ffi};
use tracing::warn;

use crate::error::SQLError;
use crate::traits::{Dialect, Row, SQLStore, SQLTx, Value};

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// A single connection is shared behind a mutex; an open transaction holds
/// the lock until it finishes, so other callers queue behind it.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| SQLError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SQLError> {
        self.conn
            .lock()
            .map_err(|e| SQLError::Connection(e.to_string()))
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
                Value::Blob(b) => Box::new(b.as_slice()),
            }
        })
        .collect()
}

/// Map a write failure, singling out primary-key/unique violations.
fn exec_err(e: rusqlite::Error) -> SQLError {
    if let rusqlite::Error::SqliteFailure(err, _) = &e {
        if err.code == ErrorCode::ConstraintViolation
            && matches!(
                err.extended_code,
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
            )
        {
            return SQLError::UniqueViolation(e.to_string());
        }
    }
    SQLError::Execution(e.to_string())
}

fn exec_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SQLError::Query(e.to_string()))?;
    let affected = stmt.execute(param_refs.as_slice()).map_err(exec_err)?;

    Ok(affected as u64)
}

fn query_on(conn: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
    let bound = bind_params(params);
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        bound.iter().map(|b| b.as_ref()).collect();

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            let mut columns = Vec::new();
            for (i, name) in column_names.iter().enumerate() {
                let val = row_value_at(row, i);
                columns.push((name.clone(), val));
            }
            Ok(Row { columns })
        })
        .map_err(|e| SQLError::Query(e.to_string()))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
    }
    Ok(result)
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self.lock()?;
        query_on(&conn, sql, params)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self.lock()?;
        exec_on(&conn, sql, params)
    }

    fn begin(&self) -> Result<Box<dyn SQLTx + '_>, SQLError> {
        let conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so the update inside the
        // transaction cannot fail later with SQLITE_BUSY on lock upgrade.
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| SQLError::Transaction(e.to_string()))?;
        Ok(Box::new(SqliteTx { conn, done: false }))
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

/// Transaction handle holding the store's connection lock.
struct SqliteTx<'a> {
    conn: MutexGuard<'a, Connection>,
    done: bool,
}

impl SQLTx for SqliteTx<'_> {
    fn exec(&mut self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        exec_on(&self.conn, sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        query_on(&self.conn, sql, params)
    }

    fn commit(mut self: Box<Self>) -> Result<(), SQLError> {
        // On failure `done` stays false and Drop rolls back.
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| SQLError::Transaction(e.to_string()))?;
        self.done = true;
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<(), SQLError> {
        self.done = true;
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| SQLError::Transaction(e.to_string()))
    }
}

impl Drop for SqliteTx<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!("SqliteTx: rollback on drop failed: {}", e);
        }
    }
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Value {
    // Try integer first, then real, then text, then blob, then null.
    if let Ok(i) = row.get::<_, i64>(idx) {
        return Value::Integer(i);
    }
    if let Ok(f) = row.get::<_, f64>(idx) {
        return Value::Real(f);
    }
    if let Ok(s) = row.get::<_, String>(idx) {
        return Value::Text(s);
    }
    if let Ok(b) = row.get::<_, Vec<u8>>(idx) {
        return Value::Blob(b);
    }
    Value::Null
}
