//! IMS API client.
//!
//! Two transports to the inventory backend:
//!
//! - [`Gateway`]: every REST call goes through here. It attaches the bearer
//!   token from a pluggable [`TokenSource`], reacts to `401` (optional
//!   refresh-and-retry, then the `on_unauthorized` hook), and maps failures
//!   onto [`ApiError`].
//! - [`push`]: the server push channel. [`WsConnector`] keeps a websocket
//!   open, authenticates it with the user id, and yields [`PushEvent`]s.
//!
//! # Usage
//!
//! ```ignore
//! use ims_client::{Gateway, GatewayConfig, StaticToken};
//!
//! let gateway = Gateway::new(
//!     GatewayConfig::new("http://localhost:5000/api")
//!         .with_token_provider(Arc::new(StaticToken::new("jwt")))
//!         .on_unauthorized(|| eprintln!("session expired")),
//! )?;
//! let page: serde_json::Value = gateway.get_json("notifications", &[("limit", "10".into())]).await?;
//! ```

pub mod error;
pub mod gateway;
pub mod push;
pub mod token;

pub use error::ApiError;
pub use gateway::{Envelope, Gateway, GatewayConfig, UnauthorizedHook};
pub use push::{PushConfig, PushConnector, PushEvent, PushSubscription, WsConnector};
pub use token::{NoAuth, StaticToken, TokenSource};
