pub mod error;
pub mod sqlite;
pub mod traits;
pub mod upsert;

pub use error::SQLError;
pub use sqlite::SqliteStore;
pub use traits::{Dialect, Row, SQLStore, SQLTx, Value};
pub use upsert::build_batch_upsert;
