use crate::error::ApiError;

/// Pluggable token provider. Called before every gateway request.
///
/// Returns `Ok(None)` to send the request without an Authorization header.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn token(&self) -> Result<Option<String>, ApiError>;

    /// Receives a token obtained through the gateway's refresh endpoint.
    /// Sources that cannot store one ignore it.
    async fn refreshed(&self, _token: String) {}
}

/// No authentication; requests go out anonymously.
pub struct NoAuth;

#[async_trait::async_trait]
impl TokenSource for NoAuth {
    async fn token(&self) -> Result<Option<String>, ApiError> {
        Ok(None)
    }
}

/// Static bearer token (already obtained externally).
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<Option<String>, ApiError> {
        Ok(Some(self.0.clone()))
    }
}
