use std::time::Duration;

use crate::error::KVError;

/// KVStore provides a flat key-value storage interface with optional expiry.
///
/// Keys are plain strings; callers namespace them by prefix
/// (`base<id>`, `lastest<id>`, ...). A missing or expired key reads as `None`.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist or has expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Store a value. `ttl = None` keeps the entry until it is overwritten or deleted.
    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), KVError>;

    /// Store a value without expiry.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError> {
        self.put(key, value, None)
    }

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), KVError>;
}
