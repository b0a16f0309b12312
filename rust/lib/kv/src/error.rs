use thiserror::Error;

#[derive(Error, Debug)]
pub enum KVError {
    /// The backing database failed to open, read or commit.
    #[error("local storage: {0}")]
    Storage(String),

    /// A value could not be encoded for storage.
    #[error("encode stored value: {0}")]
    Serialization(String),
}
