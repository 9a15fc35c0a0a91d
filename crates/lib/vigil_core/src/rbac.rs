//! Role-based access control.
//!
//! Roles map to a static table of permission strings (`resource:action`,
//! `resource:*`, or the global `*`). Checks go through the typed
//! [`Capability`] enum so call sites cannot misspell a permission; the
//! wildcard matching itself stays string-based for compatibility with the
//! stored grant format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Account role, least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Analyst,
    Admin,
    Superadmin,
}

impl Role {
    /// Parse a stored role string.
    ///
    /// Unknown values fall back to the least privileged role, never an
    /// elevated one.
    pub fn parse(s: &str) -> Role {
        match s {
            "analyst" => Role::Analyst,
            "admin" => Role::Admin,
            "superadmin" => Role::Superadmin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Analyst => "analyst",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete operation a caller may be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    MetricsView,
    MetricsExport,
    DashboardsView,
    DashboardsManage,
    LogsView,
    AlertsManage,
    AiQuery,
    AiManage,
    UsersManage,
    EventsView,
}

impl Capability {
    /// The `resource:action` string this capability matches against.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Capability::MetricsView => "metrics:view",
            Capability::MetricsExport => "metrics:export",
            Capability::DashboardsView => "dashboards:view",
            Capability::DashboardsManage => "dashboards:manage",
            Capability::LogsView => "logs:view",
            Capability::AlertsManage => "alerts:manage",
            Capability::AiQuery => "ai:query",
            Capability::AiManage => "ai:manage",
            Capability::UsersManage => "users:manage",
            Capability::EventsView => "events:view",
        }
    }
}

/// Permissions granted to a role. Static and immutable; not per-user.
pub fn permissions_for(role: Role) -> &'static [&'static str] {
    match role {
        Role::User => &["metrics:view", "dashboards:view", "ai:query"],
        Role::Analyst => &[
            "metrics:view",
            "metrics:export",
            "dashboards:*",
            "logs:view",
            "alerts:manage",
            "ai:query",
        ],
        Role::Admin => &[
            "metrics:*",
            "dashboards:*",
            "logs:*",
            "alerts:*",
            "ai:*",
            "users:manage",
            "events:view",
        ],
        Role::Superadmin => &["*"],
    }
}

/// Check a capability against a granted set.
pub fn allows(capability: Capability, granted: &[&str]) -> bool {
    allows_str(capability.as_str(), granted)
}

/// Wildcard permission check: exact match, resource-level `resource:*`,
/// or the global `*`. Case-sensitive; no prefix matching beyond the
/// `:`-delimited wildcard rule.
pub fn allows_str(permission: &str, granted: &[&str]) -> bool {
    if granted.contains(&"*") || granted.contains(&permission) {
        return true;
    }
    if let Some((resource, _action)) = permission.split_once(':') {
        let wildcard = format!("{resource}:*");
        if granted.iter().any(|p| *p == wildcard) {
            return true;
        }
    }
    false
}

/// AND semantics: every capability must individually pass [`allows`].
pub fn require_all(capabilities: &[Capability], granted: &[&str]) -> bool {
    capabilities.iter().all(|c| allows(*c, granted))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_wildcard_matches_action() {
        assert!(allows_str("metrics:view", &["metrics:*"]));
    }

    #[test]
    fn resource_wildcard_does_not_cross_resources() {
        assert!(!allows_str("users:manage", &["metrics:*"]));
    }

    #[test]
    fn global_wildcard_matches_anything() {
        assert!(allows_str("anything:anything", &["*"]));
    }

    #[test]
    fn exact_match() {
        assert!(allows_str("logs:view", &["logs:view"]));
        assert!(!allows_str("logs:view", &["logs:viewer"]));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!allows_str("Metrics:view", &["metrics:*"]));
    }

    #[test]
    fn unknown_role_downgrades_to_user() {
        assert_eq!(Role::parse("root"), Role::User);
        assert_eq!(Role::parse(""), Role::User);
        assert_eq!(Role::parse("superadmin"), Role::Superadmin);
    }

    #[test]
    fn require_all_is_and_semantics() {
        let granted = permissions_for(Role::Analyst);
        assert!(require_all(
            &[Capability::MetricsView, Capability::LogsView],
            granted
        ));
        assert!(!require_all(
            &[Capability::MetricsView, Capability::UsersManage],
            granted
        ));
    }

    #[test]
    fn user_cannot_manage_users() {
        assert!(!allows(Capability::UsersManage, permissions_for(Role::User)));
    }

    #[test]
    fn superadmin_can_do_anything() {
        let granted = permissions_for(Role::Superadmin);
        assert!(allows(Capability::UsersManage, granted));
        assert!(allows(Capability::AiManage, granted));
    }
}
