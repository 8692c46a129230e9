//! Version-gated multi-row upsert.
//!
//! Every column of a conflicting row is resolved as "take the incoming value
//! if the stored `version` is not newer", so replaying a batch or applying
//! batches for the same key in any order converges on the highest version.
//! Equal versions overwrite (idempotent replay).
//!
//! MySQL rendering:
//!
//! ```text
//! INSERT INTO sms (id,content,version) VALUES (?,?,?),(?,?,?) ON DUPLICATE KEY UPDATE
//! id=IF(version<=VALUES(version),VALUES(id),id),content=IF(...),version=IF(...)
//! ```
//!
//! The SQLite rendering uses `ON CONFLICT DO UPDATE SET` with `excluded.`.
//! In both dialects the right-hand `version` is the stored one.

use crate::error::SQLError;
use crate::traits::Dialect;

/// Build the batch upsert statement for `arg_count` positional arguments.
///
/// Returns `Ok(None)` when there is nothing to write (no columns or no
/// arguments). Fails if `arg_count` is not a multiple of `columns.len()`.
pub fn build_batch_upsert(
    dialect: Dialect,
    table: &str,
    columns: &[&str],
    arg_count: usize,
) -> Result<Option<String>, SQLError> {
    let pn = columns.len();
    if pn == 0 {
        return Ok(None);
    }
    if arg_count % pn != 0 {
        return Err(SQLError::Query(format!(
            "batch upsert into {table}: {arg_count} args is not a multiple of {pn} columns"
        )));
    }
    let rows = arg_count / pn;
    if rows == 0 {
        return Ok(None);
    }

    let placeholder = format!("({})", vec!["?"; pn].join(","));
    let values = vec![placeholder.as_str(); rows].join(",");

    let mut sql = format!("INSERT INTO {} ({}) VALUES {}", table, columns.join(","), values);
    match dialect {
        Dialect::MySql => {
            let assignments: Vec<String> = columns
                .iter()
                .map(|c| format!("{c}=IF(version<=VALUES(version),VALUES({c}),{c})"))
                .collect();
            sql.push_str(" ON DUPLICATE KEY UPDATE ");
            sql.push_str(&assignments.join(","));
        }
        Dialect::Sqlite => {
            let assignments: Vec<String> = columns
                .iter()
                .map(|c| {
                    format!("{c}=CASE WHEN version<=excluded.version THEN excluded.{c} ELSE {c} END")
                })
                .collect();
            sql.push_str(" ON CONFLICT DO UPDATE SET ");
            sql.push_str(&assignments.join(","));
        }
    }
    Ok(Some(sql))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_shape_is_exact() {
        let sql = build_batch_upsert(Dialect::MySql, "sms", &["id", "content", "version"], 6)
            .unwrap()
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO sms (id,content,version) VALUES (?,?,?),(?,?,?) \
             ON DUPLICATE KEY UPDATE \
             id=IF(version<=VALUES(version),VALUES(id),id),\
             content=IF(version<=VALUES(version),VALUES(content),content),\
             version=IF(version<=VALUES(version),VALUES(version),version)"
        );
    }

    #[test]
    fn sqlite_shape() {
        let sql = build_batch_upsert(Dialect::Sqlite, "sms", &["id", "version"], 2)
            .unwrap()
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO sms (id,version) VALUES (?,?) \
             ON CONFLICT DO UPDATE SET \
             id=CASE WHEN version<=excluded.version THEN excluded.id ELSE id END,\
             version=CASE WHEN version<=excluded.version THEN excluded.version ELSE version END"
        );
    }

    #[test]
    fn zero_columns_is_noop() {
        assert!(build_batch_upsert(Dialect::MySql, "sms", &[], 5).unwrap().is_none());
    }

    #[test]
    fn zero_args_is_noop() {
        assert!(build_batch_upsert(Dialect::Sqlite, "sms", &["id"], 0).unwrap().is_none());
    }

    #[test]
    fn ragged_args_rejected() {
        let err = build_batch_upsert(Dialect::MySql, "sms", &["id", "version"], 3).unwrap_err();
        assert!(err.to_string().contains("not a multiple"));
    }
}
