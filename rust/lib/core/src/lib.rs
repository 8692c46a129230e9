pub mod config;
pub mod context;
pub mod error;
pub mod module;

pub use config::ServiceConfig;
pub use context::{Context, ContextError};
pub use error::{INTERNAL_CODE, ServiceError};
pub use module::Module;
