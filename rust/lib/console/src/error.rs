use ims_client::ApiError;
use ims_kv::KVError;

/// Console-level error.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] KVError),

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("not signed in")]
    NotAuthenticated,
}

impl ConsoleError {
    /// True when the API rejected the session's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ConsoleError::Api(e) if e.is_unauthorized())
    }
}
