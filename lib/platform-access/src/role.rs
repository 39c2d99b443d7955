//! Role types for gateway access control.
//!
//! Roles are stored on the user record and copied into every session token.
//! New accounts start with the `user` role; `admin` is granted out of band.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Access role held by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Standard user.
    User,
    /// Administrator with access to user management.
    Admin,
}

impl Role {
    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// Returns true if this role has admin privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(()),
        }
    }
}

/// Set of roles held by a user.
///
/// Serialized as a JSON array of role names. Unknown names are dropped on
/// deserialization, so a role added later cannot break existing records or
/// sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    /// Creates an empty role set.
    #[must_use]
    pub fn none() -> Self {
        Self { roles: Vec::new() }
    }

    /// The default role set for newly created accounts.
    #[must_use]
    pub fn user() -> Self {
        Self {
            roles: vec![Role::User],
        }
    }

    /// Creates a role set with admin access (implies user access).
    #[must_use]
    pub fn admin() -> Self {
        Self {
            roles: vec![Role::User, Role::Admin],
        }
    }

    /// Builds a role set from role names, ignoring unknown names and duplicates.
    #[must_use]
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut roles: Vec<Role> = names
            .iter()
            .filter_map(|name| name.as_ref().parse().ok())
            .collect();
        roles.sort();
        roles.dedup();
        Self { roles }
    }

    /// Returns the role names in a stable order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }

    /// Returns true if the set holds the user role.
    #[must_use]
    pub fn has_access(&self) -> bool {
        self.roles.contains(&Role::User)
    }

    /// Returns true if the user has admin access.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Returns true if the set holds no roles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Returns the roles as a slice.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<String>> for RoleSet {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(&names)
    }
}

impl From<RoleSet> for Vec<String> {
    fn from(set: RoleSet) -> Self {
        set.names()
    }
}
