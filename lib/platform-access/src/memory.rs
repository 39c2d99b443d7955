//! In-memory [`UserStore`] for tests.
//!
//! Enforces the same uniqueness rules as the database schema and can
//! simulate a concurrent insert or a backend outage.

use async_trait::async_trait;
use gatehouse_core::UserId;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::linker::UserStore;
use crate::provider::ProviderId;
use crate::user::{User, normalize_email};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    inserts: usize,
    updates: usize,
    concurrent_insert: Option<User>,
    failure: Option<StoreError>,
}

/// A user store backed by a vector.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a user directly, bypassing counters and constraints.
    pub fn seed(&self, user: User) {
        self.lock().users.push(user);
    }

    /// Returns a stored user by ID.
    #[must_use]
    pub fn get(&self, id: UserId) -> Option<User> {
        self.lock().users.iter().find(|u| u.id() == id).cloned()
    }

    /// Number of stored users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful inserts.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.lock().inserts
    }

    /// Number of successful profile updates.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.lock().updates
    }

    /// Makes the next insert lose a race: `winner` is stored immediately
    /// before the caller's insert is attempted.
    pub fn inject_concurrent_insert(&self, winner: User) {
        self.lock().concurrent_insert = Some(winner);
    }

    /// Makes every subsequent call fail with `err`.
    pub fn fail_with(&self, err: StoreError) {
        self.lock().failure = Some(err);
    }
}

fn check(inner: &Inner) -> Result<(), StoreError> {
    match &inner.failure {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

fn violation(users: &[User], candidate: &User) -> Option<&'static str> {
    users
        .iter()
        .filter(|u| u.id() != candidate.id())
        .find_map(|u| {
            if u.is_bound_to(candidate.provider(), candidate.provider_subject_id()) {
                Some("users_provider_subject_key")
            } else if normalize_email(u.email()) == normalize_email(candidate.email()) {
                Some("users_email_lower_key")
            } else {
                None
            }
        })
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_provider_subject(
        &self,
        provider: ProviderId,
        provider_subject_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.lock();
        check(&inner)?;
        Ok(inner
            .users
            .iter()
            .find(|u| u.is_bound_to(provider, provider_subject_id))
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.lock();
        check(&inner)?;
        let email = normalize_email(email);
        Ok(inner
            .users
            .iter()
            .find(|u| normalize_email(u.email()) == email)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let inner = self.lock();
        check(&inner)?;
        Ok(inner.users.iter().find(|u| u.id() == id).cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.lock();
        check(&inner)?;
        if let Some(winner) = inner.concurrent_insert.take() {
            inner.users.push(winner);
        }
        if let Some(constraint) = violation(&inner.users, user) {
            return Err(StoreError::UniqueViolation {
                constraint: Some(constraint.to_string()),
            });
        }
        inner.users.push(user.clone());
        inner.inserts += 1;
        Ok(())
    }

    async fn update_profile(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.lock();
        check(&inner)?;
        if let Some(constraint) = violation(&inner.users, user) {
            return Err(StoreError::UniqueViolation {
                constraint: Some(constraint.to_string()),
            });
        }
        let Some(stored) = inner.users.iter_mut().find(|u| u.id() == user.id()) else {
            return Err(StoreError::Backend {
                details: format!("user {} does not exist", user.id()),
            });
        };
        *stored = user.clone();
        inner.updates += 1;
        Ok(())
    }
}
