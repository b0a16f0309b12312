use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::token::{NoAuth, TokenSource};

/// Callback run when the API answers `401` and no refresh rescued the call.
pub type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Standard `{ "data": ... }` response wrapper used by the IMS API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Everything that differs between gateway instances.
#[derive(Clone)]
pub struct GatewayConfig {
    /// API root, e.g. `http://localhost:5000/api`.
    pub base_url: String,
    pub token_provider: Arc<dyn TokenSource>,
    pub on_unauthorized: Option<UnauthorizedHook>,
    /// Endpoint that trades the current token for a fresh one. When set,
    /// a `401` triggers one refresh and one retry before giving up.
    pub refresh_path: Option<String>,
    pub timeout: Option<Duration>,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token_provider: Arc::new(NoAuth),
            on_unauthorized: None,
            refresh_path: None,
            timeout: None,
        }
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenSource>) -> Self {
        self.token_provider = provider;
        self
    }

    pub fn on_unauthorized<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// One outbound request, kept around so it can be replayed after a refresh.
struct Call<'a> {
    method: Method,
    path: &'a str,
    query: &'a [(&'a str, String)],
    body: Option<serde_json::Value>,
}

/// The single HTTP client every service talks to the API through.
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    token_provider: Arc<dyn TokenSource>,
    on_unauthorized: Option<UnauthorizedHook>,
    refresh_path: Option<String>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url,
            token_provider: config.token_provider,
            on_unauthorized: config.on_unauthorized,
            refresh_path: config.refresh_path,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API-relative path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get_json<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<R, ApiError> {
        self.execute(Call { method: Method::GET, path, query, body: None }).await
    }

    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = encode(body)?;
        self.execute(Call { method: Method::POST, path, query: &[], body: Some(body) }).await
    }

    pub async fn patch_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = encode(body)?;
        self.execute(Call { method: Method::PATCH, path, query: &[], body: Some(body) }).await
    }

    pub async fn delete_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, ApiError> {
        self.execute(Call { method: Method::DELETE, path, query: &[], body: None }).await
    }

    async fn execute<R: DeserializeOwned>(&self, call: Call<'_>) -> Result<R, ApiError> {
        let resp = self.send(&call).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return parse(resp).await;
        }

        if let Some(refresh_path) = self.refresh_path.as_deref() {
            if refresh_path != call.path && self.refresh(refresh_path).await {
                let retried = self.send(&call).await?;
                if retried.status() != StatusCode::UNAUTHORIZED {
                    return parse(retried).await;
                }
                return Err(self.unauthorized(call.path, retried).await);
            }
        }
        Err(self.unauthorized(call.path, resp).await)
    }

    async fn send(&self, call: &Call<'_>) -> Result<reqwest::Response, ApiError> {
        let mut builder = self.http.request(call.method.clone(), self.url(call.path));
        if !call.query.is_empty() {
            builder = builder.query(call.query);
        }
        if let Some(body) = &call.body {
            builder = builder.json(body);
        }
        if let Some(token) = self.token_provider.token().await? {
            builder = builder.bearer_auth(token);
        }
        debug!(method = %call.method, path = call.path, "api request");
        Ok(builder.send().await?)
    }

    /// Ask the API for a fresh token. Returns true when one was obtained and
    /// handed to the token provider.
    async fn refresh(&self, refresh_path: &str) -> bool {
        let call = Call {
            method: Method::POST,
            path: refresh_path,
            query: &[],
            body: Some(serde_json::json!({})),
        };
        let body: serde_json::Value = match self.send(&call).await {
            Ok(resp) if resp.status().is_success() => match parse(resp).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("token refresh returned an unreadable body: {}", e);
                    return false;
                }
            },
            Ok(resp) => {
                debug!("token refresh rejected with {}", resp.status());
                return false;
            }
            Err(e) => {
                warn!("token refresh failed: {}", e);
                return false;
            }
        };

        let token = body
            .get("token")
            .or_else(|| body.get("data").and_then(|d| d.get("token")))
            .and_then(|t| t.as_str());
        match token {
            Some(token) => {
                self.token_provider.refreshed(token.to_string()).await;
                true
            }
            None => {
                warn!("token refresh response carried no token");
                false
            }
        }
    }

    async fn unauthorized(&self, path: &str, resp: reqwest::Response) -> ApiError {
        warn!(path, "API rejected credentials (401)");
        if let Some(hook) = &self.on_unauthorized {
            hook();
        }
        server_error(resp).await
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Encode(format!("request body: {}", e)))
}

/// Parse an API response, mapping HTTP errors to `ApiError`.
///
/// An empty success body decodes as JSON `null`, so `()` and
/// `serde_json::Value` both work for endpoints that return nothing.
async fn parse<R: DeserializeOwned>(resp: reqwest::Response) -> Result<R, ApiError> {
    if !resp.status().is_success() {
        return Err(server_error(resp).await);
    }
    let text = resp.text().await?;
    let text = if text.trim().is_empty() { "null" } else { text.as_str() };
    serde_json::from_str(text).map_err(|e| ApiError::Decode(format!("response body: {}", e)))
}

async fn server_error(resp: reqwest::Response) -> ApiError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);
    ApiError::Server { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};

    // =====================================================================
    // Test server
    // =====================================================================

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn start_server(refresh_ok: bool) -> String {
        let app = Router::new()
            .route(
                "/api/whoami",
                get(|headers: HeaderMap| async move {
                    Json(serde_json::json!({ "authorization": bearer(&headers) }))
                }),
            )
            .route(
                "/api/notifications",
                get(|axum::extract::RawQuery(q): axum::extract::RawQuery| async move {
                    Json(serde_json::json!({ "data": { "query": q } }))
                }),
            )
            .route(
                "/api/secret",
                get(|headers: HeaderMap| async move {
                    if bearer(&headers).as_deref() == Some("Bearer fresh") {
                        (AxumStatus::OK, Json(serde_json::json!({ "data": "granted" })))
                    } else {
                        (AxumStatus::UNAUTHORIZED, Json(serde_json::json!({ "message": "jwt expired" })))
                    }
                }),
            )
            .route(
                "/api/auth/refresh-token",
                post(move || async move {
                    if refresh_ok {
                        (AxumStatus::OK, Json(serde_json::json!({ "token": "fresh" })))
                    } else {
                        (AxumStatus::UNAUTHORIZED, Json(serde_json::json!({ "message": "no" })))
                    }
                }),
            )
            .route(
                "/api/broken",
                get(|| async {
                    (AxumStatus::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "message": "db down" })))
                }),
            )
            .route("/api/empty", delete(|| async { AxumStatus::NO_CONTENT }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    /// Token source that remembers refreshed tokens.
    struct SwapToken(Mutex<Option<String>>);

    #[async_trait::async_trait]
    impl TokenSource for SwapToken {
        async fn token(&self) -> Result<Option<String>, ApiError> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn refreshed(&self, token: String) {
            *self.0.lock().unwrap() = Some(token);
        }
    }

    fn counting_hook(config: GatewayConfig) -> (GatewayConfig, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let config = config.on_unauthorized(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (config, count)
    }

    // =====================================================================
    // Auth header injection
    // =====================================================================

    #[tokio::test]
    async fn attaches_bearer_token_when_present() {
        let base = start_server(true).await;
        let gw = Gateway::new(
            GatewayConfig::new(&base).with_token_provider(Arc::new(crate::StaticToken::new("abc"))),
        )
        .unwrap();

        let body: serde_json::Value = gw.get_json("whoami", &[]).await.unwrap();
        assert_eq!(body["authorization"], "Bearer abc");
    }

    #[tokio::test]
    async fn anonymous_requests_have_no_header() {
        let base = start_server(true).await;
        let gw = Gateway::new(GatewayConfig::new(&base)).unwrap();

        let body: serde_json::Value = gw.get_json("/whoami", &[]).await.unwrap();
        assert!(body["authorization"].is_null());
    }

    #[tokio::test]
    async fn query_parameters_are_encoded() {
        let base = start_server(true).await;
        let gw = Gateway::new(GatewayConfig::new(&base)).unwrap();

        let body: Envelope<serde_json::Value> =
            gw.get_json("notifications", &[("limit", "10".to_string())]).await.unwrap();
        assert_eq!(body.data["query"], "limit=10");
    }

    // =====================================================================
    // 401 handling
    // =====================================================================

    #[tokio::test]
    async fn unauthorized_runs_hook_and_propagates() {
        let base = start_server(true).await;
        let (config, count) = counting_hook(
            GatewayConfig::new(&base).with_token_provider(Arc::new(crate::StaticToken::new("stale"))),
        );
        let gw = Gateway::new(config).unwrap();

        let err = gw.get_json::<serde_json::Value>("secret", &[]).await.unwrap_err();
        assert!(err.is_unauthorized(), "got: {:?}", err);
        match err {
            ApiError::Server { message, .. } => assert_eq!(message, "jwt expired"),
            other => panic!("expected Server error, got: {:?}", other),
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_then_retry_succeeds_without_hook() {
        let base = start_server(true).await;
        let tokens = Arc::new(SwapToken(Mutex::new(Some("stale".into()))));
        let (config, count) = counting_hook(
            GatewayConfig::new(&base)
                .with_token_provider(tokens.clone())
                .with_refresh_path("auth/refresh-token"),
        );
        let gw = Gateway::new(config).unwrap();

        let body: Envelope<String> = gw.get_json("secret", &[]).await.unwrap();
        assert_eq!(body.data, "granted");
        assert_eq!(tokens.token().await.unwrap().as_deref(), Some("fresh"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_hook() {
        let base = start_server(false).await;
        let (config, count) = counting_hook(
            GatewayConfig::new(&base)
                .with_token_provider(Arc::new(SwapToken(Mutex::new(Some("stale".into())))))
                .with_refresh_path("auth/refresh-token"),
        );
        let gw = Gateway::new(config).unwrap();

        let err = gw.get_json::<serde_json::Value>("secret", &[]).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    // =====================================================================
    // Other failures
    // =====================================================================

    #[tokio::test]
    async fn server_error_does_not_run_hook() {
        let base = start_server(true).await;
        let (config, count) = counting_hook(GatewayConfig::new(&base));
        let gw = Gateway::new(config).unwrap();

        let err = gw.get_json::<serde_json::Value>("broken", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "HTTP 500: db down");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_body_decodes_as_unit() {
        let base = start_server(true).await;
        let gw = Gateway::new(GatewayConfig::new(&base)).unwrap();
        gw.delete_json::<()>("empty").await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let gw = Gateway::new(
            GatewayConfig::new("http://127.0.0.1:1/api").with_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = gw.get_json::<serde_json::Value>("whoami", &[]).await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)), "got: {:?}", err);
    }

    #[test]
    fn url_joins_cleanly() {
        let gw = Gateway::new(GatewayConfig::new("http://host/api/")).unwrap();
        assert_eq!(gw.base_url(), "http://host/api");
        assert_eq!(gw.url("/auth/me"), "http://host/api/auth/me");
        assert_eq!(gw.url("notifications"), "http://host/api/notifications");
    }
}
