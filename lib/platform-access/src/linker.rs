//! Account linking: binding a provider identity to a user record.
//!
//! The linker never merges accounts. An email already bound to another
//! provider, or to another subject at the same provider, is a conflict.

use async_trait::async_trait;
use gatehouse_core::UserId;
use tracing::{debug, info, warn};

use crate::error::{ConflictKind, LinkError, StoreError};
use crate::identity::NormalizedIdentity;
use crate::provider::ProviderId;
use crate::role::RoleSet;
use crate::user::{User, normalize_email};

/// Persistence for user records.
///
/// Implementations must enforce uniqueness of (provider, provider subject ID)
/// and of the lower-cased email, and report violations as
/// [`StoreError::UniqueViolation`].
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Finds the user bound to a provider identity.
    async fn find_by_provider_subject(
        &self,
        provider: ProviderId,
        provider_subject_id: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Finds a user by email, case-insensitively.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Finds a user by internal ID.
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Inserts a new user.
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    /// Persists a user's email, display name and `updated_at`.
    async fn update_profile(&self, user: &User) -> Result<(), StoreError>;
}

/// The account a login resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedAccount {
    pub user_id: UserId,
    pub roles: RoleSet,
    /// True if this login created the record.
    pub created: bool,
}

impl LinkedAccount {
    fn existing(user: &User) -> Self {
        Self {
            user_id: user.id(),
            roles: user.roles().clone(),
            created: false,
        }
    }
}

/// Finds or creates the user for a verified identity.
pub struct AccountLinker<'a> {
    store: &'a dyn UserStore,
}

impl<'a> AccountLinker<'a> {
    /// Creates a linker over a user store.
    #[must_use]
    pub fn new(store: &'a dyn UserStore) -> Self {
        Self { store }
    }

    /// Resolves `identity` at `provider` to a user, creating one on first login.
    ///
    /// Performs at most one insert or one update. Failure paths write nothing.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the email is bound to a different provider identity,
    ///   or a concurrent insert left a conflicting record.
    /// - `Store` for any other storage failure.
    pub async fn link_or_create(
        &self,
        identity: &NormalizedIdentity,
        provider: ProviderId,
    ) -> Result<LinkedAccount, LinkError> {
        if let Some(account) = self.link_existing(identity, provider).await? {
            return Ok(account);
        }

        let user = User::new(
            provider,
            identity.provider_subject_id.clone(),
            &identity.email,
            identity.display_name.clone(),
        );
        match self.store.insert(&user).await {
            Ok(()) => {
                info!(user_id = %user.id(), %provider, "created user on first login");
                Ok(LinkedAccount {
                    user_id: user.id(),
                    roles: user.roles().clone(),
                    created: true,
                })
            }
            Err(StoreError::UniqueViolation { constraint }) => {
                // A concurrent login inserted first. Re-query once.
                debug!(?constraint, %provider, "insert raced with a concurrent login");
                self.link_existing(identity, provider)
                    .await?
                    .ok_or(LinkError::Conflict(ConflictKind::EmailTaken))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn link_existing(
        &self,
        identity: &NormalizedIdentity,
        provider: ProviderId,
    ) -> Result<Option<LinkedAccount>, LinkError> {
        if let Some(mut user) = self
            .store
            .find_by_provider_subject(provider, &identity.provider_subject_id)
            .await?
        {
            user.record_login(&identity.email, identity.display_name.as_deref());
            self.update(&user).await?;
            return Ok(Some(LinkedAccount::existing(&user)));
        }

        let email = normalize_email(&identity.email);
        let Some(mut user) = self.store.find_by_email(&email).await? else {
            return Ok(None);
        };

        if user.provider() != provider {
            warn!(
                user_id = %user.id(),
                bound_provider = %user.provider(),
                %provider,
                "email already linked to a different provider"
            );
            return Err(LinkError::Conflict(ConflictKind::DifferentProvider));
        }
        if user.provider_subject_id() != identity.provider_subject_id {
            warn!(
                user_id = %user.id(),
                %provider,
                "email already linked to a different provider account"
            );
            return Err(LinkError::Conflict(ConflictKind::DifferentProviderAccount));
        }

        user.record_login(&identity.email, identity.display_name.as_deref());
        self.update(&user).await?;
        Ok(Some(LinkedAccount::existing(&user)))
    }

    async fn update(&self, user: &User) -> Result<(), LinkError> {
        match self.store.update_profile(user).await {
            Ok(()) => Ok(()),
            // The refreshed email now collides with another record.
            Err(StoreError::UniqueViolation { .. }) => {
                Err(LinkError::Conflict(ConflictKind::EmailTaken))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryUserStore;

    fn identity(email: &str, subject: &str) -> NormalizedIdentity {
        NormalizedIdentity {
            email: email.to_string(),
            email_verified: true,
            provider_subject_id: subject.to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn first_login_creates_user_with_default_roles() {
        let store = MemoryUserStore::new();
        let linker = AccountLinker::new(&store);

        let account = linker
            .link_or_create(&identity(" Foo@X.com ", "u1"), ProviderId::Google)
            .await
            .expect("linked");

        assert!(account.created);
        assert_eq!(account.roles, RoleSet::user());
        let user = store.get(account.user_id).expect("stored");
        assert_eq!(user.email(), "foo@x.com");
        assert_eq!(user.provider_subject_id(), "u1");
        assert_eq!(store.insert_count(), 1);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn repeat_login_returns_same_user() {
        let store = MemoryUserStore::new();
        let linker = AccountLinker::new(&store);

        let first = linker
            .link_or_create(&identity("foo@x.com", "u1"), ProviderId::Google)
            .await
            .expect("first");
        for _ in 0..3 {
            let again = linker
                .link_or_create(&identity("foo@x.com", "u1"), ProviderId::Google)
                .await
                .expect("again");
            assert_eq!(again.user_id, first.user_id);
            assert!(!again.created);
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test]
    async fn repeat_login_refreshes_email_and_fills_display_name() {
        let store = MemoryUserStore::new();
        let linker = AccountLinker::new(&store);
        let first = linker
            .link_or_create(&identity("old@x.com", "u1"), ProviderId::Google)
            .await
            .expect("first");

        let mut next = identity("New@X.com", "u1");
        next.display_name = Some("Foo".to_string());
        linker
            .link_or_create(&next, ProviderId::Google)
            .await
            .expect("second");

        let user = store.get(first.user_id).expect("stored");
        assert_eq!(user.email(), "new@x.com");
        assert_eq!(user.display_name(), Some("Foo"));
    }

    #[tokio::test]
    async fn returns_stored_roles_for_existing_user() {
        let store = MemoryUserStore::new();
        let mut admin = User::new(ProviderId::Google, "g1".to_string(), "root@x.com", None);
        admin.set_roles(RoleSet::admin());
        store.seed(admin.clone());

        let account = AccountLinker::new(&store)
            .link_or_create(&identity("root@x.com", "g1"), ProviderId::Google)
            .await
            .expect("linked");
        assert_eq!(account.user_id, admin.id());
        assert!(account.roles.is_admin());
    }

    #[tokio::test]
    async fn email_bound_to_other_provider_conflicts() {
        let store = MemoryUserStore::new();
        let existing = User::new(
            ProviderId::Google,
            "g1".to_string(),
            "foo@x.com",
            Some("Foo".to_string()),
        );
        store.seed(existing.clone());

        let err = AccountLinker::new(&store)
            .link_or_create(&identity("FOO@x.com", "m1"), ProviderId::Microsoft)
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::Conflict(ConflictKind::DifferentProvider));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(existing.id()), Some(existing));
        assert_eq!(store.insert_count(), 0);
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn email_bound_to_other_subject_conflicts() {
        let store = MemoryUserStore::new();
        store.seed(User::new(
            ProviderId::Google,
            "g1".to_string(),
            "foo@x.com",
            None,
        ));

        let err = AccountLinker::new(&store)
            .link_or_create(&identity("foo@x.com", "g2"), ProviderId::Google)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LinkError::Conflict(ConflictKind::DifferentProviderAccount)
        );
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn insert_race_with_same_identity_resolves_to_winner() {
        let store = MemoryUserStore::new();
        let winner = User::new(ProviderId::Google, "u1".to_string(), "foo@x.com", None);
        store.inject_concurrent_insert(winner.clone());

        let account = AccountLinker::new(&store)
            .link_or_create(&identity("foo@x.com", "u1"), ProviderId::Google)
            .await
            .expect("linked");

        assert_eq!(account.user_id, winner.id());
        assert!(!account.created);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn insert_race_with_conflicting_identity_fails() {
        let store = MemoryUserStore::new();
        store.inject_concurrent_insert(User::new(
            ProviderId::Microsoft,
            "m1".to_string(),
            "foo@x.com",
            None,
        ));

        let err = AccountLinker::new(&store)
            .link_or_create(&identity("foo@x.com", "u1"), ProviderId::Google)
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::Conflict(ConflictKind::DifferentProvider));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn backend_failure_is_not_a_conflict() {
        let store = MemoryUserStore::new();
        store.fail_with(StoreError::Backend {
            details: "disk full".to_string(),
        });

        let err = AccountLinker::new(&store)
            .link_or_create(&identity("foo@x.com", "u1"), ProviderId::Google)
            .await
            .unwrap_err();

        assert!(matches!(err, LinkError::Store(StoreError::Backend { .. })));
    }
}
