use crate::error::SQLError;

/// A dynamically-typed SQL parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map(Value::Text).unwrap_or(Value::Null)
    }
}

/// A row returned from a SQL query, as column name to value pairs.
#[derive(Debug, Clone)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a text column value by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get an integer column value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }
}

/// SQL flavour spoken by a backend. Statement builders that need
/// non-portable syntax (upserts) render per dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
}

/// SQLStore provides a SQL execution interface backed by a relational database.
pub trait SQLStore: Send + Sync {
    /// Execute a query and return rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    /// Execute a statement (INSERT/UPDATE/DELETE) and return affected row count.
    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError>;

    /// Begin a transaction. The returned handle holds the connection until
    /// it is committed, rolled back or dropped; dropping an open handle
    /// rolls it back.
    fn begin(&self) -> Result<Box<dyn SQLTx + '_>, SQLError>;

    /// Dialect used to render backend-specific statements.
    fn dialect(&self) -> Dialect;
}

/// An open transaction. Owned by exactly one caller.
pub trait SQLTx {
    /// Prepare and execute a statement inside the transaction, returning
    /// the affected row count.
    fn exec(&mut self, sql: &str, params: &[Value]) -> Result<u64, SQLError>;

    /// Execute a query inside the transaction.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    fn commit(self: Box<Self>) -> Result<(), SQLError>;

    fn rollback(self: Box<Self>) -> Result<(), SQLError>;
}
