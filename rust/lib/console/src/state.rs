//! State published to the [`StateHub`](crate::hub::StateHub). Each type
//! carries the path it lives at.

use serde::{Deserialize, Serialize};

use crate::notification::Notification;
use crate::session::User;

/// Authentication state: the UI reads this to decide what to show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub phase: AuthPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl AuthState {
    pub const PATH: &'static str = "auth/state";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthPhase {
    Unauthenticated,
    Authenticated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationPhase {
    #[default]
    Uninitialized,
    Initializing,
    Initialized,
}

/// Mirror of the user's recent notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub phase: NotificationPhase,
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
    pub loading: bool,
}

impl NotificationSnapshot {
    pub const PATH: &'static str = "notification/state";
}

/// Current route path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRoute(pub String);

impl AppRoute {
    pub const PATH: &'static str = "app/route";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTitle(pub String);

impl DocumentTitle {
    pub const PATH: &'static str = "app/title";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DarkMode(pub bool);

impl DarkMode {
    pub const PATH: &'static str = "prefs/dark-mode";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarState {
    pub selected: String,
    pub page: String,
    pub is_open: bool,
    pub is_full_screen: bool,
}

impl SidebarState {
    pub const PATH: &'static str = "prefs/sidebar";
}
