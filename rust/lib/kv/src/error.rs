use thiserror::Error;

#[derive(Error, Debug)]
pub enum KVError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt entry: {0}")]
    Corrupt(String),
}
