use crate::error::KVError;

/// KVStore is the durable storage interface behind every persisted piece of
/// console state.
///
/// Keys are plain strings (`token`, `user`, `darkMode`). Values are raw
/// bytes; structured values are JSON-encoded by the caller.
pub trait KVStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KVError>;

    /// Set a key-value pair, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KVError>;

    /// Delete a key. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<(), KVError>;

    /// Delete several keys atomically.
    fn batch_delete(&self, keys: &[&str]) -> Result<(), KVError>;

    /// Check whether a key is present.
    fn contains(&self, key: &str) -> Result<bool, KVError> {
        Ok(self.get(key)?.is_some())
    }
}
