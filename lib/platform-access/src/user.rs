//! User domain type.
//!
//! A user is bound to exactly one provider identity, the pair
//! (provider, provider subject ID), for its whole lifetime. The email is
//! unique across all users, compared case-insensitively, and is stored
//! normalized (trimmed, lower-cased).

use chrono::{DateTime, Utc};
use gatehouse_core::UserId;
use serde::{Deserialize, Serialize};

use crate::provider::ProviderId;
use crate::role::RoleSet;

/// A user of the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal user ID, carried as the session subject.
    id: UserId,
    /// Normalized email address.
    email: String,
    /// Display name, if the provider supplied one.
    display_name: Option<String>,
    /// The provider this account is bound to.
    provider: ProviderId,
    /// The provider's subject identifier for this user.
    provider_subject_id: String,
    /// Roles copied into every session.
    roles: RoleSet,
    /// Inactive users cannot authenticate.
    active: bool,
    /// When the user record was created.
    created_at: DateTime<Utc>,
    /// When the user record was last updated.
    updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new active user with the default role set.
    #[must_use]
    pub fn new(
        provider: ProviderId,
        provider_subject_id: String,
        email: &str,
        display_name: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            email: normalize_email(email),
            display_name: normalize_display_name(display_name.as_deref()),
            provider,
            provider_subject_id,
            roles: RoleSet::user(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a user with all fields specified.
    ///
    /// Use this when reconstituting a user from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: UserId,
        email: String,
        display_name: Option<String>,
        provider: ProviderId,
        provider_subject_id: String,
        roles: RoleSet,
        active: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            display_name,
            provider,
            provider_subject_id,
            roles,
            active,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    #[must_use]
    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    #[must_use]
    pub fn provider_subject_id(&self) -> &str {
        &self.provider_subject_id
    }

    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if this user is bound to the given provider identity.
    #[must_use]
    pub fn is_bound_to(&self, provider: ProviderId, provider_subject_id: &str) -> bool {
        self.provider == provider && self.provider_subject_id == provider_subject_id
    }

    /// Records a login: refreshes the email, fills a blank display name and
    /// bumps `updated_at`. A non-blank display name is never overwritten.
    pub fn record_login(&mut self, email: &str, display_name: Option<&str>) {
        self.email = normalize_email(email);
        if self.display_name.is_none() {
            self.display_name = normalize_display_name(display_name);
        }
        self.updated_at = Utc::now();
    }

    /// Replaces the user's roles.
    pub fn set_roles(&mut self, roles: RoleSet) {
        self.roles = roles;
        self.updated_at = Utc::now();
    }

    /// Activates or deactivates the user.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.updated_at = Utc::now();
    }
}

/// Trims and lower-cases an email address for storage and comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn normalize_display_name(display_name: Option<&str>) -> Option<String> {
    display_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}
