//! Static route configuration: which roles may see which destination.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use rollcall_core::ValueObject;

use crate::Role;

/// Roles permitted to view a protected destination. Not mutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteRequirement {
    roles: BTreeSet<Role>,
}

impl RouteRequirement {
    pub fn only(role: Role) -> Self {
        Self {
            roles: BTreeSet::from([role]),
        }
    }

    pub fn any_of(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            roles: roles.into_iter().collect(),
        }
    }

    pub fn permits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.iter().copied()
    }
}

impl ValueObject for RouteRequirement {}

/// Destinations of the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Unguarded landing page.
    Entry,
    AdminDashboard,
    TeacherDashboard,
    StudentDashboard,
    NotFound,
}

impl Destination {
    pub fn path(&self) -> &'static str {
        match self {
            Destination::Entry => "/",
            Destination::AdminDashboard => "/admin",
            Destination::TeacherDashboard => "/teacher",
            Destination::StudentDashboard => "/student",
            Destination::NotFound => "/404",
        }
    }

    /// Resolve a location path. Trailing slashes are ignored; anything unknown
    /// is `NotFound`.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Destination::Entry,
            "/admin" => Destination::AdminDashboard,
            "/teacher" => Destination::TeacherDashboard,
            "/student" => Destination::StudentDashboard,
            _ => Destination::NotFound,
        }
    }

    /// `None` for unguarded destinations.
    pub fn requirement(&self) -> Option<RouteRequirement> {
        match self {
            Destination::AdminDashboard => Some(RouteRequirement::only(Role::Admin)),
            Destination::TeacherDashboard => Some(RouteRequirement::only(Role::Teacher)),
            Destination::StudentDashboard => Some(RouteRequirement::only(Role::Student)),
            Destination::Entry | Destination::NotFound => None,
        }
    }

    pub fn dashboard_for(role: Role) -> Self {
        match role {
            Role::Admin => Destination::AdminDashboard,
            Role::Teacher => Destination::TeacherDashboard,
            Role::Student => Destination::StudentDashboard,
        }
    }
}

impl core::fmt::Display for Destination {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_to_destinations() {
        assert_eq!(Destination::from_path("/"), Destination::Entry);
        assert_eq!(Destination::from_path(""), Destination::Entry);
        assert_eq!(Destination::from_path("/teacher/"), Destination::TeacherDashboard);
        assert_eq!(Destination::from_path("/teachers"), Destination::NotFound);
    }

    #[test]
    fn every_dashboard_requires_exactly_its_role() {
        for role in Role::ALL {
            let dest = Destination::dashboard_for(role);
            let requirement = dest.requirement().unwrap();
            assert_eq!(requirement.roles().collect::<Vec<_>>(), vec![role]);
            assert_eq!(Destination::from_path(dest.path()), dest);
        }
        assert!(Destination::Entry.requirement().is_none());
    }

    #[test]
    fn requirement_may_name_several_roles() {
        let staff = RouteRequirement::any_of([Role::Admin, Role::Teacher]);
        assert!(staff.permits(Role::Teacher));
        assert!(!staff.permits(Role::Student));
    }
}
