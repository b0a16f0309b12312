/// Client-side API error.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Server { status: u16, message: String },

    #[error("network: {0}")]
    Network(#[from] reqwest::Error),

    #[error("encode: {0}")]
    Encode(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("push channel: {0}")]
    Channel(String),
}

impl ApiError {
    /// HTTP status of a server-side failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the server rejected the credentials. By the time the caller
    /// sees this, the gateway has already run its `on_unauthorized` hook.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}
