//! Client core of the IMS admin console.
//!
//! Owns everything the dashboard decides on the client side:
//!
//! - [`SessionStore`]: token, profile, derived permissions and the
//!   role/permission predicates.
//! - [`NotificationService`]: live notification mirror fed by REST and the
//!   push channel, with alert sounds via [`SoundController`].
//! - [`RouteGuard`]: sign-in gating, optional role/permission enforcement
//!   and document titles.
//! - [`visibility`]: one-shot permission/role filters for UI elements.
//! - [`DarkModeStore`] / [`SidebarStore`]: persisted preferences.
//!
//! Services publish their state to a shared [`StateHub`]; [`Console`]
//! builds and wires them from a [`ConsoleConfig`].

pub mod app;
pub mod config;
pub mod error;
pub mod guard;
pub mod hub;
pub mod notification;
pub mod prefs;
pub mod role;
pub mod session;
pub mod sound;
pub mod state;
pub mod storage;
pub mod visibility;

pub use app::Console;
pub use config::ConsoleConfig;
pub use error::ConsoleError;
pub use guard::{HubNavigator, Navigation, Navigator, RouteDef, RouteGuard, RouteTable};
pub use hub::StateHub;
pub use notification::{Notification, NotificationService, Severity, SoundDirective};
pub use prefs::{DarkModeStore, SidebarStore};
pub use role::Role;
pub use session::{Credentials, Session, SessionStore, User};
pub use sound::{AudioBackend, SoundController, TracingAudio};
pub use storage::LocalStorage;
