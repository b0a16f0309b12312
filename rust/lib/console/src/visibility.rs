//! Permission- and role-gated visibility.
//!
//! Elements carry zero or more [`Requirement`]s; each requirement is an
//! any-of match. Filtering is a one-shot decision against the session at
//! call time: later session changes do not bring removed items back.

use crate::guard::{RouteDef, RouteTable};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// At least one of the listed permissions.
    Permissions(Vec<String>),
    /// At least one of the listed roles.
    Roles(Vec<String>),
}

impl Requirement {
    pub fn permission(permission: &str) -> Self {
        Requirement::Permissions(vec![permission.to_string()])
    }

    pub fn any_permission(permissions: &[&str]) -> Self {
        Requirement::Permissions(permissions.iter().map(|p| p.to_string()).collect())
    }

    pub fn role(role: &str) -> Self {
        Requirement::Roles(vec![role.to_string()])
    }

    pub fn any_role(roles: &[&str]) -> Self {
        Requirement::Roles(roles.iter().map(|r| r.to_string()).collect())
    }
}

pub fn is_visible(session: &Session, requirement: &Requirement) -> bool {
    match requirement {
        Requirement::Permissions(list) => session.has_any_permission(list.as_slice()),
        Requirement::Roles(list) => session.has_any_role(list.as_slice()),
    }
}

/// An item shown only when every requirement passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Gated<T> {
    pub item: T,
    pub requires: Vec<Requirement>,
}

impl<T> Gated<T> {
    pub fn open(item: T) -> Self {
        Self { item, requires: Vec::new() }
    }

    pub fn requiring(item: T, requirement: Requirement) -> Self {
        Self { item, requires: vec![requirement] }
    }

    pub fn and(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn is_visible(&self, session: &Session) -> bool {
        self.requires.iter().all(|r| is_visible(session, r))
    }
}

/// Drop the items `session` may not see.
pub fn retain_visible<T>(session: &Session, items: Vec<Gated<T>>) -> Vec<T> {
    items
        .into_iter()
        .filter(|g| g.is_visible(session))
        .map(|g| g.item)
        .collect()
}

/// Sidebar entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub label: String,
    pub route: String,
    pub path: String,
}

/// Sidebar menu derived from the route table: every titled, authenticated,
/// parameterless route, gated by the roles and permissions it declares.
pub fn sidebar_menu(table: &RouteTable) -> Vec<Gated<MenuEntry>> {
    table
        .routes()
        .iter()
        .filter(|r| r.requires_auth && r.title.is_some() && !r.has_params())
        .map(gate_route)
        .collect()
}

fn gate_route(route: &RouteDef) -> Gated<MenuEntry> {
    let mut gated = Gated::open(MenuEntry {
        label: route.title.clone().unwrap_or_default(),
        route: route.name.clone(),
        path: route.path.clone(),
    });
    if !route.roles.is_empty() {
        gated = gated.and(Requirement::Roles(route.roles.clone()));
    }
    if !route.permissions.is_empty() {
        gated = gated.and(Requirement::Permissions(route.permissions.clone()));
    }
    gated
}
