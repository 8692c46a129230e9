use std::sync::Arc;

use msgpush_core::{Context, ContextError};
use msgpush_sql::{Dialect, Row, SQLError, SQLStore, SQLTx, Value, build_batch_upsert};
use thiserror::Error;
use tracing::{Span, info_span, warn};

use crate::model::{EditFields, MsgStatus, Record};

/// SQL schema for the three message tables.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS email (
        id          TEXT PRIMARY KEY,
        content     TEXT NOT NULL,
        send_time   TEXT NOT NULL,
        destination TEXT NOT NULL,
        status      TEXT NOT NULL,
        version     INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS wechat (
        id          TEXT PRIMARY KEY,
        content     TEXT NOT NULL,
        send_time   TEXT NOT NULL,
        touser      TEXT NOT NULL,
        status      TEXT NOT NULL,
        version     INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS sms (
        id          TEXT PRIMARY KEY,
        content     TEXT NOT NULL,
        send_time   TEXT NOT NULL,
        mobile      TEXT NOT NULL,
        status      TEXT NOT NULL,
        version     INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS idx_email_status ON email(status)",
    "CREATE INDEX IF NOT EXISTS idx_wechat_status ON wechat(status)",
    "CREATE INDEX IF NOT EXISTS idx_sms_status ON sms(status)",
];

#[derive(Error, Debug)]
pub enum StoreError {
    /// The statement matched no row. A business failure, not a connectivity one.
    #[error("no rows effected")]
    NoRowsEffected,

    #[error("unique key exists")]
    UniqueKeyExists,

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("sql: {0}")]
    Sql(SQLError),

    #[error("bad row in {0}")]
    Decode(&'static str),
}

impl From<SQLError> for StoreError {
    fn from(e: SQLError) -> Self {
        match e {
            SQLError::UniqueViolation(_) => StoreError::UniqueKeyExists,
            other => StoreError::Sql(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction: scoped handle returned by update/insert
// ---------------------------------------------------------------------------

/// An open write transaction, owned by one caller.
///
/// Finish it with [`Transaction::commit`] or [`Transaction::rollback`].
/// Rolling back twice, or after commit, does nothing; dropping an
/// unfinished transaction rolls it back.
pub struct Transaction<'a> {
    inner: Option<Box<dyn SQLTx + 'a>>,
    tag: &'static str,
}

impl<'a> Transaction<'a> {
    fn new(inner: Box<dyn SQLTx + 'a>, tag: &'static str) -> Self {
        Self {
            inner: Some(inner),
            tag,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn exec(&mut self, ctx: &Context, sql: &str, args: &[Value]) -> Result<u64, StoreError> {
        ctx.check()?;
        let tag = self.tag;
        let tx = self
            .inner
            .as_mut()
            .ok_or_else(|| SQLError::Transaction(format!("{tag}: already finished")))?;
        Ok(tx.exec(sql, args)?)
    }

    fn query(&mut self, ctx: &Context, sql: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        ctx.check()?;
        let tag = self.tag;
        let tx = self
            .inner
            .as_mut()
            .ok_or_else(|| SQLError::Transaction(format!("{tag}: already finished")))?;
        Ok(tx.query(sql, args)?)
    }

    /// Stored `version` of row `id` as this transaction sees it.
    pub fn row_version<T: Record>(&mut self, ctx: &Context, id: &str) -> Result<i64, StoreError> {
        let sql = format!("SELECT version FROM {} WHERE id = ?1", T::TABLE);
        self.query(ctx, &sql, &[Value::from(id)])?
            .first()
            .and_then(|row| row.get_i64("version"))
            .ok_or(StoreError::Decode(T::TABLE))
    }

    /// Commit. A dead context aborts the commit and rolls back instead.
    pub fn commit(mut self, ctx: &Context) -> Result<(), StoreError> {
        if let Err(e) = ctx.check() {
            self.rollback();
            return Err(e.into());
        }
        match self.inner.take() {
            Some(tx) => Ok(tx.commit()?),
            None => Err(SQLError::Transaction(format!("{}: already finished", self.tag)).into()),
        }
    }

    /// Roll back if still open. Failures are logged; the connection is
    /// released either way.
    pub fn rollback(&mut self) {
        if let Some(tx) = self.inner.take() {
            if let Err(e) = tx.rollback() {
                warn!(table = self.tag, "rollback failed: {}", e);
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

/// Roll back a transaction that may not exist.
pub fn rollback(tx: Option<Transaction<'_>>) {
    if let Some(mut tx) = tx {
        tx.rollback();
    }
}

// ---------------------------------------------------------------------------
// MsgStore
// ---------------------------------------------------------------------------

/// Durable storage for queued messages.
pub struct MsgStore {
    db: Arc<dyn SQLStore>,
}

impl MsgStore {
    /// Create a new MsgStore and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, StoreError> {
        for stmt in SCHEMA {
            db.exec(stmt, &[])?;
        }
        Ok(Self { db })
    }

    /// Child span of the caller's span, if the context carries one.
    fn span(&self, ctx: &Context, op: &'static str, tag: &str, sql: &str, args: &[Value]) -> Option<Span> {
        let system = match self.db.dialect() {
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
        };
        ctx.span().map(|parent| {
            info_span!(
                parent: parent,
                "sql",
                otel.kind = "client",
                db.system = system,
                db.operation = op,
                db.table = tag,
                sql.statement = %sql,
                sql.param = ?args,
            )
        })
    }

    // -----------------------------------------------------------------------
    // Write primitives
    // -----------------------------------------------------------------------

    /// Begin a transaction and execute an UPDATE in it.
    ///
    /// Zero affected rows is [`StoreError::NoRowsEffected`]. On any error the
    /// transaction is rolled back before returning.
    pub fn update(
        &self,
        ctx: &Context,
        tag: &'static str,
        sql: &str,
        args: &[Value],
    ) -> Result<Transaction<'_>, StoreError> {
        let span = self.span(ctx, "update", tag, sql, args);
        let _enter = span.as_ref().map(Span::enter);

        ctx.check()?;
        let mut tx = Transaction::new(self.db.begin()?, tag);
        match tx.exec(ctx, sql, args) {
            Ok(0) => {
                tx.rollback();
                Err(StoreError::NoRowsEffected)
            }
            Ok(_) => Ok(tx),
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// Begin a transaction and execute an INSERT in it.
    ///
    /// A primary-key or unique index conflict is [`StoreError::UniqueKeyExists`].
    /// On any error the transaction is rolled back before returning.
    pub fn insert(
        &self,
        ctx: &Context,
        tag: &'static str,
        sql: &str,
        args: &[Value],
    ) -> Result<Transaction<'_>, StoreError> {
        let span = self.span(ctx, "insert", tag, sql, args);
        let _enter = span.as_ref().map(Span::enter);

        ctx.check()?;
        let mut tx = Transaction::new(self.db.begin()?, tag);
        if let Err(e) = tx.exec(ctx, sql, args) {
            tx.rollback();
            return Err(e);
        }
        Ok(tx)
    }

    /// Multi-row, version-gated upsert of `args` laid out row by row in
    /// `columns` order. Each stored column keeps its value unless the
    /// incoming row's version is at least the stored one.
    ///
    /// No columns (or no rows) is a no-op: nothing is sent to the database.
    pub fn batch_upsert(
        &self,
        ctx: &Context,
        table: &'static str,
        columns: &[&str],
        args: &[Value],
    ) -> Result<(), StoreError> {
        let Some(sql) = build_batch_upsert(self.db.dialect(), table, columns, args.len())? else {
            return Ok(());
        };
        let span = self.span(ctx, "batch_upsert", table, &sql, args);
        let _enter = span.as_ref().map(Span::enter);

        ctx.check()?;
        self.db.exec(&sql, args)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read primitives
    // -----------------------------------------------------------------------

    /// Fetch at most one row, bypassing the cache.
    pub fn query_one(
        &self,
        ctx: &Context,
        tag: &'static str,
        sql: &str,
        args: &[Value],
    ) -> Result<Option<Row>, StoreError> {
        let span = self.span(ctx, "query_one", tag, sql, args);
        let _enter = span.as_ref().map(Span::enter);

        ctx.check()?;
        Ok(self.db.query(sql, args)?.into_iter().next())
    }

    pub fn list(
        &self,
        ctx: &Context,
        tag: &'static str,
        sql: &str,
        args: &[Value],
    ) -> Result<Vec<Row>, StoreError> {
        let span = self.span(ctx, "list", tag, sql, args);
        let _enter = span.as_ref().map(Span::enter);

        ctx.check()?;
        Ok(self.db.query(sql, args)?)
    }

    // -----------------------------------------------------------------------
    // Typed helpers
    // -----------------------------------------------------------------------

    /// Apply an edit to a PENDING row and bump its version. The recipient
    /// column is only written when the edit carries one.
    pub fn update_edit<T: Record>(
        &self,
        ctx: &Context,
        edit: &EditFields,
    ) -> Result<Transaction<'_>, StoreError> {
        let sql = format!(
            "UPDATE {table} SET content = ?1, send_time = ?2, {dest} = COALESCE(?3, {dest}), \
             version = version + 1 WHERE id = ?4 AND status = ?5",
            table = T::TABLE,
            dest = T::DESTINATION,
        );
        self.update(
            ctx,
            T::TABLE,
            &sql,
            &[
                Value::from(edit.content.as_str()),
                Value::from(edit.send_time.as_str()),
                Value::from(edit.destination.clone()),
                Value::from(edit.id.as_str()),
                Value::from(MsgStatus::Pending.as_str()),
            ],
        )
    }

    /// Insert a full record inside a new transaction.
    pub fn insert_record<T: Record>(
        &self,
        ctx: &Context,
        record: &T,
    ) -> Result<Transaction<'_>, StoreError> {
        let placeholders: Vec<String> = (1..=T::COLUMNS.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            T::TABLE,
            T::COLUMNS.join(", "),
            placeholders.join(", ")
        );
        self.insert(ctx, T::TABLE, &sql, &record.to_values())
    }

    /// Reconcile a batch of records, keeping the highest version per id.
    pub fn upsert_records<T: Record>(&self, ctx: &Context, records: &[T]) -> Result<(), StoreError> {
        let args: Vec<Value> = records.iter().flat_map(T::to_values).collect();
        self.batch_upsert(ctx, T::TABLE, T::COLUMNS, &args)
    }

    /// Read a row directly, bypassing the cache.
    pub fn get_record<T: Record>(&self, ctx: &Context, id: &str) -> Result<Option<T>, StoreError> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", T::COLUMNS.join(", "), T::TABLE);
        match self.query_one(ctx, T::TABLE, &sql, &[Value::from(id)])? {
            Some(row) => T::from_row(&row).map(Some).ok_or(StoreError::Decode(T::TABLE)),
            None => Ok(None),
        }
    }

    /// All rows of a kind in the given status, ordered by send time.
    pub fn list_records<T: Record>(
        &self,
        ctx: &Context,
        status: MsgStatus,
    ) -> Result<Vec<T>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE status = ?1 ORDER BY send_time ASC",
            T::COLUMNS.join(", "),
            T::TABLE
        );
        self.list(ctx, T::TABLE, &sql, &[Value::from(status.as_str())])?
            .iter()
            .map(|row| T::from_row(row).ok_or(StoreError::Decode(T::TABLE)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Email, Sms, WeChat};
    use crate::testing::{CountingSql, seed_store};
    use msgpush_sql::SqliteStore;

    fn sms(id: &str, content: &str, status: MsgStatus, version: i64) -> Sms {
        Sms {
            id: id.into(),
            content: content.into(),
            send_time: "2026-03-01T09:00:00Z".into(),
            mobile: "13800000000".into(),
            status,
            version,
        }
    }

    fn test_store() -> MsgStore {
        MsgStore::new(Arc::new(SqliteStore::open_in_memory().unwrap())).unwrap()
    }

    #[test]
    fn insert_commit_and_get() {
        let store = test_store();
        let ctx = Context::background();
        let tx = store
            .insert_record(&ctx, &sms("s1", "hi", MsgStatus::Pending, 1))
            .unwrap();
        tx.commit(&ctx).unwrap();

        let got: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
        assert_eq!(got, sms("s1", "hi", MsgStatus::Pending, 1));
    }

    #[test]
    fn insert_duplicate_is_unique_key_exists() {
        let store = test_store();
        let ctx = Context::background();
        seed_store(&store, &sms("s1", "hi", MsgStatus::Pending, 1));

        let err = store
            .insert_record(&ctx, &sms("s1", "again", MsgStatus::Pending, 1))
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::UniqueKeyExists), "got {err:?}");

        // The failed insert released its transaction.
        seed_store(&store, &sms("s2", "next", MsgStatus::Pending, 1));
    }

    #[test]
    fn update_without_match_is_no_rows_effected() {
        let store = test_store();
        let ctx = Context::background();
        let edit = EditFields {
            id: "ghost".into(),
            content: "c".into(),
            send_time: "t".into(),
            destination: None,
        };
        let err = store.update_edit::<Email>(&ctx, &edit).err().unwrap();
        assert!(matches!(err, StoreError::NoRowsEffected), "got {err:?}");

        // Connection is free again.
        let tx = store
            .insert_record(&ctx, &sms("s1", "hi", MsgStatus::Pending, 1))
            .unwrap();
        tx.commit(&ctx).unwrap();
    }

    #[test]
    fn update_edit_only_touches_pending_rows() {
        let store = test_store();
        let ctx = Context::background();
        seed_store(&store, &sms("s1", "hi", MsgStatus::Final, 1));

        let edit = EditFields {
            id: "s1".into(),
            content: "changed".into(),
            send_time: "t".into(),
            destination: None,
        };
        let err = store.update_edit::<Sms>(&ctx, &edit).err().unwrap();
        assert!(matches!(err, StoreError::NoRowsEffected));
        let got: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
        assert_eq!(got.content, "hi");
    }

    #[test]
    fn update_edit_keeps_destination_and_bumps_version() {
        let store = test_store();
        let ctx = Context::background();
        seed_store(&store, &sms("s1", "hi", MsgStatus::Pending, 4));

        let edit = EditFields {
            id: "s1".into(),
            content: "hi v2".into(),
            send_time: "2026-03-02T09:00:00Z".into(),
            destination: None,
        };
        store.update_edit::<Sms>(&ctx, &edit).unwrap().commit(&ctx).unwrap();

        let got: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
        assert_eq!(got.content, "hi v2");
        assert_eq!(got.mobile, "13800000000");
        assert_eq!(got.version, 5);
    }

    #[test]
    fn row_version_sees_uncommitted_update() {
        let store = test_store();
        let ctx = Context::background();
        store
            .upsert_records(&ctx, &[sms("s1", "hi", MsgStatus::Pending, 9)])
            .unwrap();

        let edit = EditFields {
            id: "s1".into(),
            content: "edited".into(),
            send_time: "t".into(),
            destination: None,
        };
        let mut tx = store.update_edit::<Sms>(&ctx, &edit).unwrap();
        assert_eq!(tx.row_version::<Sms>(&ctx, "s1").unwrap(), 10);
        tx.rollback();

        assert!(matches!(
            tx.row_version::<Sms>(&ctx, "s1"),
            Err(StoreError::Sql(SQLError::Transaction(_)))
        ));
        let got: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
        assert_eq!(got.version, 9);
    }

    #[test]
    fn rollback_is_idempotent_and_discards() {
        let store = test_store();
        let ctx = Context::background();
        seed_store(&store, &sms("s1", "hi", MsgStatus::Pending, 1));

        let edit = EditFields {
            id: "s1".into(),
            content: "never".into(),
            send_time: "t".into(),
            destination: None,
        };
        let mut tx = store.update_edit::<Sms>(&ctx, &edit).unwrap();
        tx.rollback();
        assert!(!tx.is_open());
        tx.rollback();
        drop(tx);
        rollback(None);

        let got: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
        assert_eq!(got.content, "hi");
    }

    #[test]
    fn commit_with_cancelled_context_rolls_back() {
        let store = test_store();
        let ctx = Context::background();
        seed_store(&store, &sms("s1", "hi", MsgStatus::Pending, 1));

        let edit = EditFields {
            id: "s1".into(),
            content: "late".into(),
            send_time: "t".into(),
            destination: None,
        };
        let tx = store.update_edit::<Sms>(&ctx, &edit).unwrap();
        ctx.cancel();
        let err = tx.commit(&ctx).unwrap_err();
        assert!(matches!(err, StoreError::Context(ContextError::Canceled)));

        let live = Context::background();
        let got: Sms = store.get_record(&live, "s1").unwrap().unwrap();
        assert_eq!(got.content, "hi");
    }

    #[test]
    fn batch_replay_is_idempotent() {
        let store = test_store();
        let ctx = Context::background();
        let batch = vec![
            sms("s1", "one", MsgStatus::Pending, 2),
            sms("s2", "two", MsgStatus::Pending, 1),
        ];
        store.upsert_records(&ctx, &batch).unwrap();
        store.upsert_records(&ctx, &batch).unwrap();

        let s1: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
        let s2: Sms = store.get_record(&ctx, "s2").unwrap().unwrap();
        assert_eq!(s1, batch[0]);
        assert_eq!(s2, batch[1]);
    }

    #[test]
    fn batch_highest_version_wins_in_any_order() {
        let v1 = sms("s1", "old", MsgStatus::Pending, 1);
        let v2 = sms("s1", "new", MsgStatus::Final, 2);

        for order in [[&v1, &v2], [&v2, &v1]] {
            let store = test_store();
            let ctx = Context::background();
            for rec in order {
                store.upsert_records(&ctx, std::slice::from_ref(rec)).unwrap();
            }
            let got: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
            assert_eq!(got, v2);
        }
    }

    #[test]
    fn batch_same_id_twice_in_one_statement() {
        let store = test_store();
        let ctx = Context::background();
        let v2 = WeChat {
            id: "w1".into(),
            content: "{\"v\":2}".into(),
            send_time: "t".into(),
            touser: "openid-2".into(),
            status: MsgStatus::Pending,
            version: 2,
        };
        let v1 = WeChat {
            content: "{\"v\":1}".into(),
            touser: "openid-1".into(),
            version: 1,
            ..v2.clone()
        };
        store.upsert_records(&ctx, &[v2.clone(), v1]).unwrap();
        let got: WeChat = store.get_record(&ctx, "w1").unwrap().unwrap();
        assert_eq!(got, v2);
    }

    #[test]
    fn batch_equal_version_overwrites() {
        let store = test_store();
        let ctx = Context::background();
        store
            .upsert_records(&ctx, &[sms("s1", "first", MsgStatus::Pending, 3)])
            .unwrap();
        store
            .upsert_records(&ctx, &[sms("s1", "replay", MsgStatus::Pending, 3)])
            .unwrap();
        let got: Sms = store.get_record(&ctx, "s1").unwrap().unwrap();
        assert_eq!(got.content, "replay");
    }

    #[test]
    fn batch_without_columns_issues_nothing() {
        let sql = Arc::new(CountingSql::new(SqliteStore::open_in_memory().unwrap()));
        let store = MsgStore::new(sql.clone()).unwrap();
        let before = sql.statements();

        let ctx = Context::background();
        store
            .batch_upsert(&ctx, "sms", &[], &[Value::from("x")])
            .unwrap();
        store.upsert_records::<Sms>(&ctx, &[]).unwrap();
        assert_eq!(sql.statements(), before);
    }

    #[test]
    fn batch_rejects_ragged_args() {
        let store = test_store();
        let ctx = Context::background();
        let err = store
            .batch_upsert(&ctx, "sms", &["id", "version"], &[Value::from("x")])
            .unwrap_err();
        assert!(matches!(err, StoreError::Sql(SQLError::Query(_))));
    }

    #[test]
    fn list_records_by_status() {
        let store = test_store();
        let ctx = Context::background();
        seed_store(&store, &sms("a", "1", MsgStatus::Pending, 1));
        seed_store(&store, &sms("b", "2", MsgStatus::Cancelled, 1));
        seed_store(&store, &sms("c", "3", MsgStatus::Pending, 1));

        let pending: Vec<Sms> = store.list_records(&ctx, MsgStatus::Pending).unwrap();
        assert_eq!(pending.len(), 2);
        let cancelled: Vec<Sms> = store.list_records(&ctx, MsgStatus::Cancelled).unwrap();
        assert_eq!(cancelled[0].id, "b");
    }

    #[test]
    fn spans_do_not_change_results() {
        let store = test_store();
        let root = info_span!("edit_request");
        let ctx = Context::background().with_span(root);
        seed_store(&store, &sms("s1", "hi", MsgStatus::Pending, 1));
        let got: Option<Sms> = store.get_record(&ctx, "s1").unwrap();
        assert!(got.is_some());
    }
}
