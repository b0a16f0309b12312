use serde::{Deserialize, Serialize};

pub const SUPERADMIN: &str = "superadmin";
pub const ADMIN: &str = "admin";
pub const STAFF: &str = "staff";
pub const CUSTOMER: &str = "customer";

/// A user's role as the API sends it: either a bare name or an object
/// carrying the name and the permissions the role grants.
///
/// ```json
/// "admin"
/// { "name": "staff", "permissions": ["view_inventory"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Role {
    Named(String),
    Detailed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        permissions: Option<Vec<String>>,
    },
}

impl Role {
    pub fn named(name: impl Into<String>) -> Self {
        Role::Named(name.into())
    }

    /// Normalized role name.
    pub fn name(&self) -> &str {
        match self {
            Role::Named(name) => name.trim(),
            Role::Detailed { name, .. } => name.trim(),
        }
    }

    /// Permissions bundled with the role, when the API sent them.
    pub fn permissions(&self) -> Option<&[String]> {
        match self {
            Role::Named(_) => None,
            Role::Detailed { permissions, .. } => permissions.as_deref(),
        }
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name().eq_ignore_ascii_case(name.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_shapes() {
        let role: Role = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(role, Role::named("admin"));
        assert_eq!(role.permissions(), None);

        let role: Role =
            serde_json::from_str(r#"{"name":"staff","permissions":["view_inventory"]}"#).unwrap();
        assert_eq!(role.name(), "staff");
        assert_eq!(role.permissions(), Some(&["view_inventory".to_string()][..]));

        let role: Role = serde_json::from_str(r#"{"name":"admin"}"#).unwrap();
        assert_eq!(role.name(), "admin");
        assert_eq!(role.permissions(), None);
    }

    #[test]
    fn name_comparison_ignores_case_and_padding() {
        assert!(Role::named(" Admin ").is(ADMIN));
        assert!(!Role::named("admin").is(SUPERADMIN));
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let json = serde_json::to_value(Role::named("customer")).unwrap();
        assert_eq!(json, serde_json::json!("customer"));

        let role = Role::Detailed { name: "staff".into(), permissions: None };
        assert_eq!(serde_json::to_value(role).unwrap(), serde_json::json!({"name": "staff"}));
    }
}
