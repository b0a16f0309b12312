//! Session store: token, user profile and the permission set derived from
//! it. The in-memory copy is authoritative; local storage is a cache used
//! to survive restarts.

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ims_client::{ApiError, Gateway, TokenSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::ConsoleError;
use crate::hub::StateHub;
use crate::role::{self, Role};
use crate::state::{AuthPhase, AuthState};
use crate::storage::{keys, LocalStorage};

pub const LOGIN_PATH: &str = "auth/login";
pub const PROFILE_PATH: &str = "auth/me";

/// Grants every permission check.
pub const ALL_PERMISSIONS: &str = "all";

const FALLBACK_NAME: &str = "User";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id", default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    /// Profile fields the console does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl User {
    /// "First Last", falling back to the email, then to "User".
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
        match self.email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => email.to_string(),
            _ => FALLBACK_NAME.to_string(),
        }
    }

    /// Permissions the profile grants: the role's bundle first, then the
    /// user's own list.
    pub fn granted_permissions(&self) -> Option<&[String]> {
        self.role
            .as_ref()
            .and_then(Role::permissions)
            .or(self.permissions.as_deref())
    }
}

/// Sign-in request body.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Snapshot of the session.
///
/// Without a token the session is unauthenticated whatever `user` holds.
/// Role and permission predicates need both a token and a loaded user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<User>,
    pub permissions: BTreeSet<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn role(&self) -> Option<&Role> {
        self.user.as_ref()?.role.as_ref()
    }

    pub fn role_name(&self) -> Option<&str> {
        self.role().map(Role::name)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn full_name(&self) -> String {
        self.user
            .as_ref()
            .map(User::full_name)
            .unwrap_or_else(|| FALLBACK_NAME.to_string())
    }

    pub fn display_name(&self) -> String {
        self.full_name()
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    /// A token and a loaded user; every predicate requires both.
    fn is_signed_in(&self) -> bool {
        self.is_authenticated() && self.user.is_some()
    }

    fn grants_all(&self) -> bool {
        self.permissions.contains(ALL_PERMISSIONS)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_signed_in() && (self.grants_all() || self.permissions.contains(permission))
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        if !self.is_signed_in() {
            return false;
        }
        self.grants_all() || permissions.iter().any(|p| self.permissions.contains(p.as_ref()))
    }

    /// True for an empty list once signed in.
    pub fn has_all_permissions<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        if !self.is_signed_in() {
            return false;
        }
        self.grants_all() || permissions.iter().all(|p| self.permissions.contains(p.as_ref()))
    }

    // ========================================================================
    // Roles
    // ========================================================================

    pub fn has_role(&self, role: &str) -> bool {
        self.is_signed_in() && self.role().is_some_and(|r| r.is(role))
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        roles.iter().any(|r| self.has_role(r.as_ref()))
    }

    pub fn is_superadmin(&self) -> bool {
        self.has_role(role::SUPERADMIN)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(role::ADMIN)
    }

    pub fn is_admin_or_above(&self) -> bool {
        self.has_any_role(&[role::SUPERADMIN, role::ADMIN])
    }

    pub fn is_staff_or_above(&self) -> bool {
        self.has_any_role(&[role::SUPERADMIN, role::ADMIN, role::STAFF])
    }

    pub fn is_customer(&self) -> bool {
        self.has_role(role::CUSTOMER)
    }
}

/// Owns the [`Session`] and keeps local storage and the hub's `auth/state`
/// in step with it.
pub struct SessionStore {
    session: RwLock<Session>,
    storage: LocalStorage,
    hub: Arc<StateHub>,
}

impl SessionStore {
    /// An empty, unauthenticated store. Nothing is read from storage.
    pub fn new(storage: LocalStorage, hub: Arc<StateHub>) -> Self {
        let store = Self {
            session: RwLock::new(Session::default()),
            storage,
            hub,
        };
        store.publish();
        store
    }

    /// Rebuild the session persisted by an earlier run. Corrupt entries are
    /// dropped.
    pub fn restore(storage: LocalStorage, hub: Arc<StateHub>) -> Self {
        let token = storage.get_string(keys::TOKEN).filter(|t| !t.is_empty());
        let user: Option<User> = storage.get_json(keys::USER);
        let permissions = storage
            .get_json::<Vec<String>>(keys::PERMISSIONS)
            .or_else(|| user.as_ref()?.granted_permissions().map(<[String]>::to_vec))
            .unwrap_or_default();
        debug!(
            authenticated = token.is_some(),
            user = user.is_some(),
            "restored session"
        );

        let store = Self {
            session: RwLock::new(Session {
                token,
                user,
                permissions: permissions.into_iter().collect(),
            }),
            storage,
            hub,
        };
        store.publish();
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> Session {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub fn permissions(&self) -> BTreeSet<String> {
        self.read().permissions.clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        let token = token.into();
        if let Err(e) = self.storage.set_string(keys::TOKEN, &token) {
            error!("failed to persist token: {}", e);
        }
        self.write().token = Some(token);
        self.publish();
    }

    /// Store the profile and re-derive permissions from it. A profile that
    /// grants none leaves the current set alone.
    pub fn set_user(&self, user: User) {
        if let Err(e) = self.storage.set_json(keys::USER, &user) {
            error!("failed to persist user: {}", e);
        }
        let derived = user.granted_permissions().map(<[String]>::to_vec);
        if let Some(perms) = &derived {
            if let Err(e) = self.storage.set_json(keys::PERMISSIONS, perms) {
                error!("failed to persist permissions: {}", e);
            }
        }
        {
            let mut session = self.write();
            if let Some(perms) = derived {
                session.permissions = perms.into_iter().collect();
            }
            session.user = Some(user);
        }
        self.publish();
    }

    /// Clear the session from memory and storage.
    ///
    /// Returns true when there was something to tear down, so concurrent
    /// callers can tell which one ended the session.
    pub fn logout(&self) -> bool {
        let had_session = {
            let mut session = self.write();
            let had = session.token.is_some() || session.user.is_some();
            *session = Session::default();
            had
        };
        if let Err(e) = self
            .storage
            .remove(&[keys::TOKEN, keys::USER, keys::PERMISSIONS])
        {
            error!("failed to clear stored session: {}", e);
        }
        if had_session {
            info!("session ended");
            self.publish();
        }
        had_session
    }

    /// Post credentials to the login endpoint and start a session from the
    /// response.
    pub async fn sign_in(
        &self,
        gateway: &Gateway,
        credentials: &Credentials,
    ) -> Result<User, ConsoleError> {
        let body: Value = gateway.post_json(LOGIN_PATH, credentials).await?;
        let payload = unwrap_data(body);
        let token = payload
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Decode("login response carried no token".into()))?
            .to_string();
        let user = payload
            .get("user")
            .cloned()
            .map(serde_json::from_value::<User>)
            .transpose()
            .map_err(|e| ApiError::Decode(format!("login user: {}", e)))?;

        self.set_token(token);
        let user = match user {
            Some(user) => user,
            None => match self.fetch_current_user(gateway).await {
                Some(user) => user,
                None => {
                    self.logout();
                    return Err(ConsoleError::NotAuthenticated);
                }
            },
        };
        self.set_user(user.clone());
        info!(user = %user.id, "signed in");
        Ok(user)
    }

    /// Refresh the profile from the API.
    ///
    /// Without a token no request is made. A 401 ends the session; other
    /// failures are logged and leave the session as it was.
    pub async fn fetch_current_user(&self, gateway: &Gateway) -> Option<User> {
        if !self.is_authenticated() {
            return None;
        }
        match gateway.get_json::<Value>(PROFILE_PATH, &[]).await {
            Ok(body) => {
                let payload = unwrap_data(body);
                let payload = match payload.get("user") {
                    Some(user) => user.clone(),
                    None => payload,
                };
                match serde_json::from_value::<User>(payload) {
                    Ok(user) => {
                        self.set_user(user.clone());
                        Some(user)
                    }
                    Err(e) => {
                        warn!("unreadable profile response: {}", e);
                        None
                    }
                }
            }
            Err(e) if e.is_unauthorized() => {
                self.logout();
                None
            }
            Err(e) => {
                warn!("failed to fetch current user: {}", e);
                None
            }
        }
    }

    // ========================================================================
    // Predicates (delegate to the current snapshot)
    // ========================================================================

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.read().has_permission(permission)
    }

    pub fn has_any_permission<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.read().has_any_permission(permissions)
    }

    pub fn has_all_permissions<S: AsRef<str>>(&self, permissions: &[S]) -> bool {
        self.read().has_all_permissions(permissions)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.read().has_role(role)
    }

    pub fn has_any_role<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        self.read().has_any_role(roles)
    }

    pub fn is_superadmin(&self) -> bool {
        self.read().is_superadmin()
    }

    pub fn is_admin(&self) -> bool {
        self.read().is_admin()
    }

    pub fn is_admin_or_above(&self) -> bool {
        self.read().is_admin_or_above()
    }

    pub fn is_staff_or_above(&self) -> bool {
        self.read().is_staff_or_above()
    }

    pub fn is_customer(&self) -> bool {
        self.read().is_customer()
    }

    pub fn role_name(&self) -> Option<String> {
        self.read().role_name().map(str::to_string)
    }

    pub fn user_id(&self) -> Option<String> {
        self.read().user_id().map(str::to_string)
    }

    pub fn full_name(&self) -> String {
        self.read().full_name()
    }

    pub fn display_name(&self) -> String {
        self.read().display_name()
    }

    fn publish(&self) {
        let state = {
            let session = self.read();
            AuthState {
                phase: if session.is_authenticated() {
                    AuthPhase::Authenticated
                } else {
                    AuthPhase::Unauthenticated
                },
                user: session.user.clone(),
            }
        };
        self.hub.set(AuthState::PATH, state);
    }
}

#[async_trait::async_trait]
impl TokenSource for SessionStore {
    async fn token(&self) -> Result<Option<String>, ApiError> {
        Ok(SessionStore::token(self))
    }

    async fn refreshed(&self, token: String) {
        debug!("storing refreshed token");
        self.set_token(token);
    }
}

/// `{ "data": X }` → `X`; anything else is returned as is.
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
