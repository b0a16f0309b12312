//! Navigation: the dashboard's route table, the guard consulted before each
//! transition, and the navigator that publishes where the console is.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::hub::StateHub;
use crate::session::{Session, SessionStore};
use crate::state::{AppRoute, DocumentTitle};

pub const SIGNIN: &str = "signin";
pub const SIGNUP: &str = "signup";
/// Default page for authenticated users.
pub const LANDING: &str = "eCommerce";

pub const APP_TITLE: &str = "MIS - Inventory System";

/// Document title for a route title.
pub fn document_title(title: Option<&str>) -> String {
    match title {
        Some(t) if !t.is_empty() => format!("{} | {}", t, APP_TITLE),
        _ => APP_TITLE.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDef {
    pub name: String,
    /// Path pattern; `:name` segments capture parameters.
    pub path: String,
    pub title: Option<String>,
    pub requires_auth: bool,
    /// Any-of role requirement. Advisory unless enforcement is on.
    pub roles: Vec<String>,
    /// Any-of permission requirement. Advisory unless enforcement is on.
    pub permissions: Vec<String>,
}

impl RouteDef {
    /// An authenticated route.
    pub fn new(name: &str, path: &str) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            title: None,
            requires_auth: true,
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Match a concrete path, returning captured parameters.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let pattern: Vec<&str> = split_path(&self.path);
        let concrete: Vec<&str> = split_path(path);
        if pattern.len() != concrete.len() {
            return None;
        }
        let mut params = BTreeMap::new();
        for (p, c) in pattern.iter().zip(concrete.iter()) {
            match p.strip_prefix(':') {
                Some(name) => {
                    params.insert(name.to_string(), c.to_string());
                }
                None if p == c => {}
                None => return None,
            }
        }
        Some(params)
    }

    /// Fill `:param` segments.
    pub fn href(&self, params: &BTreeMap<String, String>) -> String {
        let segments: Vec<String> = split_path(&self.path)
            .into_iter()
            .map(|s| match s.strip_prefix(':') {
                Some(name) => params.get(name).cloned().unwrap_or_else(|| s.to_string()),
                None => s.to_string(),
            })
            .collect();
        format!("/{}", segments.join("/"))
    }

    pub fn has_params(&self) -> bool {
        self.path.split('/').any(|s| s.starts_with(':'))
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoute<'a> {
    pub route: &'a RouteDef,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteDef>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteDef>) -> Self {
        Self { routes }
    }

    /// Routes of the inventory admin dashboard.
    pub fn dashboard() -> Self {
        Self::new(vec![
            RouteDef::new(SIGNIN, "/").title("Signin").public(),
            RouteDef::new(SIGNUP, "/auth/signup").title("Signup").public(),
            RouteDef::new("forgot-password", "/forgot-password").title("Forgot Password").public(),
            RouteDef::new("reset-password", "/reset-password/:token").title("Reset Password").public(),
            RouteDef::new("departments", "/departments").title("Departments"),
            RouteDef::new(LANDING, "/eCommerce").title("eCommerce Dashboard"),
            RouteDef::new("Inventory Counts", "/inventory-counts")
                .title("Inventory Counts")
                .roles(&["superadmin", "admin", "staff"])
                .permissions(&["view_inventory"]),
            RouteDef::new("StockAdjustments", "/inventory/stock-adjustments"),
            RouteDef::new("brand", "/brand")
                .title("Brand Management")
                .roles(&["superadmin", "admin"])
                .permissions(&["view_brands", "manage_brands"]),
            RouteDef::new("Stock Adjustments", "/stock-adjustments").title("Stock Adjustments"),
            RouteDef::new("users", "/users")
                .title("User Management")
                .roles(&["superadmin", "admin"])
                .permissions(&["view_users", "manage_users"]),
            RouteDef::new("activity-logs", "/activity-logs")
                .title("Activity Logs")
                .roles(&["superadmin"])
                .permissions(&["view_activity_logs"]),
            RouteDef::new("employee", "/employee")
                .title("Employee")
                .roles(&["superadmin", "admin", "staff"])
                .permissions(&["view_customers", "manage_customers"]),
            RouteDef::new("ris-list", "/inventory/ris").title("Requisition Issue Slips"),
            RouteDef::new("ris-create", "/inventory/ris/create").title("Create Requisition Issue Slip"),
            RouteDef::new("ris-detail", "/inventory/ris/:id").title("RIS Details"),
            RouteDef::new("ris-print", "/inventory/ris/:id/print").title("Print RIS"),
            RouteDef::new("InventoryRecord", "/inventory/record").title("Inventory Records"),
            RouteDef::new("InventoryRecordCreate", "/inventory/record/create").title("Create Inventory Record"),
            RouteDef::new("InventoryList", "/inventory/list").title("Inventory List"),
            RouteDef::new("supplier", "/supplier")
                .title("Supplier Management")
                .roles(&["superadmin"])
                .permissions(&["view_suppliers", "manage_suppliers"]),
            RouteDef::new("main-category", "/main-category")
                .title("Category Management")
                .roles(&["superadmin", "admin"])
                .permissions(&["view_categories", "manage_categories"]),
            RouteDef::new("sub-category", "/sub-category")
                .title("Sub Category Management")
                .roles(&["superadmin", "admin"])
                .permissions(&["view_categories", "manage_categories"]),
            RouteDef::new("reorder-point", "/settings/reorder-point")
                .title("Reorder Point")
                .roles(&["superadmin"])
                .permissions(&["manage_settings"]),
            RouteDef::new("product", "/product")
                .title("Product Management")
                .roles(&["superadmin", "admin", "staff"])
                .permissions(&["view_products"]),
            RouteDef::new("reorder", "/reorder")
                .title("Reorder Management")
                .roles(&["superadmin", "admin"])
                .permissions(&["view_orders", "manage_orders"]),
            RouteDef::new("barcodes", "/barcodes")
                .title("Barcode Management")
                .roles(&["superadmin", "admin"])
                .permissions(&["view_barcodes", "manage_barcodes"]),
            RouteDef::new("acn", "/acn")
                .title("ACN Management")
                .roles(&["superadmin", "admin"])
                .permissions(&["view_barcodes", "manage_barcodes"]),
            RouteDef::new("calendar", "/calendar").title("Calendar"),
            RouteDef::new("profile", "/profile").title("Profile"),
            RouteDef::new("formElements", "/forms/form-elements").title("Form Elements"),
            RouteDef::new("formLayout", "/forms/form-layout").title("Form Layout"),
            RouteDef::new("tables", "/tables").title("Tables"),
            RouteDef::new("settings", "/pages/settings").title("Settings"),
            RouteDef::new("basicChart", "/charts/basic-chart").title("Basic Chart"),
            RouteDef::new("alerts", "/ui-elements/alerts").title("Alerts"),
            RouteDef::new("buttons", "/ui-elements/buttons").title("Buttons"),
            RouteDef::new("account-settings", "/settings/account").title("Account Settings"),
        ])
    }

    pub fn routes(&self) -> &[RouteDef] {
        &self.routes
    }

    pub fn by_name(&self, name: &str) -> Option<&RouteDef> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// First route matching `path`. Literal routes win over parameterized
    /// ones (`/inventory/ris/create` is not `ris-detail`).
    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute<'_>> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let literal = self
            .routes
            .iter()
            .filter(|r| !r.has_params())
            .find_map(|r| r.matches(path).map(|params| ResolvedRoute { route: r, params }));
        literal.or_else(|| {
            self.routes
                .iter()
                .filter(|r| r.has_params())
                .find_map(|r| r.matches(path).map(|params| ResolvedRoute { route: r, params }))
        })
    }
}

/// Where a navigation attempt ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allowed { route: String, path: String },
    Redirected { from: String, to: String, path: String },
    NotFound { path: String },
}

/// Applies the outcome of a navigation: shows `path` with the route's
/// title (`None` for untitled or unknown routes).
pub trait Navigator: Send + Sync {
    fn show(&self, path: &str, title: Option<&str>);
}

/// Navigator that publishes route and document title to the hub.
pub struct HubNavigator {
    hub: Arc<StateHub>,
}

impl HubNavigator {
    pub fn new(hub: Arc<StateHub>) -> Self {
        Self { hub }
    }
}

impl Navigator for HubNavigator {
    fn show(&self, path: &str, title: Option<&str>) {
        self.hub.set(DocumentTitle::PATH, DocumentTitle(document_title(title)));
        self.hub.set(AppRoute::PATH, AppRoute(path.to_string()));
    }
}

/// Consulted before every transition.
pub struct RouteGuard {
    table: Arc<RouteTable>,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    enforce_route_access: bool,
    landing_route: String,
}

impl RouteGuard {
    pub fn new(
        table: Arc<RouteTable>,
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        enforce_route_access: bool,
        landing_route: impl Into<String>,
    ) -> Self {
        Self {
            navigator,
            table,
            session,
            enforce_route_access,
            landing_route: landing_route.into(),
        }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    /// Decide a transition to `route` for `session`. `None` allows it,
    /// `Some(name)` redirects there.
    pub fn check(&self, route: &RouteDef, session: &Session) -> Option<String> {
        let authenticated = session.is_authenticated();
        if authenticated && (route.name == SIGNIN || route.name == SIGNUP) {
            return Some(self.landing_route.clone());
        }
        if route.requires_auth && !authenticated {
            return Some(SIGNIN.to_string());
        }
        if self.enforce_route_access && route.requires_auth && !self.may_access(route, session) {
            warn!(
                route = %route.name,
                role = session.role_name().unwrap_or("-"),
                "route access denied"
            );
            if route.name != self.landing_route {
                return Some(self.landing_route.clone());
            }
        }
        None
    }

    fn may_access(&self, route: &RouteDef, session: &Session) -> bool {
        (route.roles.is_empty() || session.has_any_role(route.roles.as_slice()))
            && (route.permissions.is_empty() || session.has_any_permission(route.permissions.as_slice()))
    }

    /// Navigate to `path`, following at most one redirect, and publish the
    /// resulting route and title.
    pub fn navigate(&self, path: &str) -> Navigation {
        let Some(resolved) = self.table.resolve(path) else {
            debug!(path, "no route");
            self.navigator.show(path, None);
            return Navigation::NotFound { path: path.to_string() };
        };
        let session = self.session.snapshot();
        match self.check(resolved.route, &session) {
            None => {
                let href = resolved.route.href(&resolved.params);
                self.navigator.show(&href, resolved.route.title.as_deref());
                Navigation::Allowed { route: resolved.route.name.clone(), path: href }
            }
            Some(to) => {
                debug!(from = %resolved.route.name, to = %to, "guard redirect");
                let path = self.redirect(&to).unwrap_or_default();
                Navigation::Redirected { from: resolved.route.name.clone(), to, path }
            }
        }
    }

    /// Move to the named route without a guard check. Returns its path, or
    /// `None` (and changes nothing) for an unknown name.
    pub fn redirect(&self, route_name: &str) -> Option<String> {
        let Some(route) = self.table.by_name(route_name) else {
            warn!(route = route_name, "redirect to unknown route");
            return None;
        };
        debug!(route = route_name, "redirect");
        self.navigator.show(&route.path, route.title.as_deref());
        Some(route.path.clone())
    }
}
