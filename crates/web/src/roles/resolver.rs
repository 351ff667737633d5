//! Role resolution with a per-identity cache.
//!
//! Roles live on the backend. The resolver asks once per identity, shares
//! the answer between concurrent callers, and keeps it until the entry is
//! invalidated or expires. Failed lookups are not cached.
//!
//! Entries are keyed by email and a per-email generation. Invalidating bumps
//! the generation, so a lookup still in flight from before a role change
//! stores its answer under a key nobody reads again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tracing::instrument;

use market_pulse_core::{Email, Role};

use super::RoleState;
use crate::api::{ApiClient, ApiError, Credentials};

/// Upper bound on cached identities.
const MAX_CACHED_ROLES: u64 = 10_000;

/// Errors that can occur while resolving a role.
#[derive(Debug, Clone, Error)]
pub enum RoleError {
    /// The backend lookup failed.
    #[error("role lookup failed: {0}")]
    Lookup(#[from] Arc<ApiError>),
}

/// Where roles come from.
pub trait RoleSource: Send + Sync + 'static {
    /// Fetch the role of the identity behind `credentials`.
    fn fetch_role(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Role, ApiError>> + Send;
}

impl RoleSource for ApiClient {
    async fn fetch_role(&self, credentials: &Credentials) -> Result<Role, ApiError> {
        self.user_role(credentials).await
    }
}

/// Resolves and caches identity roles.
///
/// Cheaply cloneable; clones share one cache.
pub struct RoleResolver<S = ApiClient> {
    source: Arc<S>,
    cache: Cache<(Email, u64), Role>,
    /// Invalidation count per email. Absent means zero.
    generations: Arc<Mutex<HashMap<Email, u64>>>,
}

impl<S> Clone for RoleResolver<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            cache: self.cache.clone(),
            generations: Arc::clone(&self.generations),
        }
    }
}

impl<S: RoleSource> RoleResolver<S> {
    /// Create a resolver whose entries live for `ttl`.
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source: Arc::new(source),
            cache: Cache::builder()
                .max_capacity(MAX_CACHED_ROLES)
                .time_to_live(ttl)
                .build(),
            generations: Arc::default(),
        }
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<Email, u64>> {
        self.generations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache key for the current generation of `email`.
    fn key(&self, email: &Email) -> (Email, u64) {
        let generation = self.generations().get(email).copied().unwrap_or(0);
        (email.clone(), generation)
    }

    /// Resolve the role for `credentials`.
    ///
    /// Concurrent calls for one identity share a single backend request.
    ///
    /// # Errors
    ///
    /// Returns `RoleError::Lookup` if the backend request fails. The failure
    /// is not cached; the next call asks again.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn resolve(&self, credentials: &Credentials) -> Result<Role, RoleError> {
        let source = Arc::clone(&self.source);
        let role = self
            .cache
            .try_get_with(self.key(&credentials.email), async move {
                tracing::debug!("Fetching role from backend");
                source.fetch_role(credentials).await
            })
            .await?;
        Ok(role)
    }

    /// The cached role, if any.
    pub async fn cached(&self, email: &Email) -> Option<Role> {
        self.cache.get(&self.key(email)).await
    }

    /// Forget the cached role for `email`.
    ///
    /// A lookup already in flight for `email` no longer counts: its answer
    /// is not returned to later callers.
    pub async fn invalidate(&self, email: &Email) {
        tracing::debug!(email = %email, "Invalidating cached role");
        let previous = {
            let mut generations = self.generations();
            let generation = generations.entry(email.clone()).or_insert(0);
            let previous = *generation;
            *generation += 1;
            previous
        };
        self.cache.invalidate(&(email.clone(), previous)).await;
    }

    /// Resolve, waiting at most `wait`.
    ///
    /// The lookup runs on its own task, so a lookup that outlasts the wait
    /// still completes and fills the cache for the next request.
    pub async fn resolve_within(&self, credentials: &Credentials, wait: Duration) -> RoleState {
        if let Some(role) = self.cached(&credentials.email).await {
            return RoleState::Resolved(role);
        }

        let lookup = self.spawn_resolve(credentials.clone());
        match tokio::time::timeout(wait, lookup).await {
            Ok(Ok(Ok(role))) => RoleState::Resolved(role),
            Ok(Ok(Err(e))) => {
                tracing::warn!(email = %credentials.email, error = %e, "Role lookup failed");
                RoleState::Failed
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Role lookup task failed");
                RoleState::Failed
            }
            Err(_) => RoleState::Pending,
        }
    }

    /// Start resolving on a background task.
    pub fn spawn_resolve(
        &self,
        credentials: Credentials,
    ) -> tokio::task::JoinHandle<Result<Role, RoleError>> {
        let resolver = self.clone();
        tokio::spawn(async move { resolver.resolve(&credentials).await })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use secrecy::SecretString;

    /// Counts lookups; answers after `delay`, or fails while `failing`.
    struct FakeSource {
        role: Mutex<Role>,
        calls: AtomicUsize,
        delay: Duration,
        failing: AtomicBool,
    }

    impl FakeSource {
        fn new(role: Role) -> Self {
            Self {
                role: Mutex::new(role),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                failing: AtomicBool::new(false),
            }
        }

        fn slow(role: Role, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(role)
            }
        }
    }

    impl RoleSource for FakeSource {
        async fn fetch_role(&self, _credentials: &Credentials) -> Result<Role, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.failing.load(Ordering::SeqCst) {
                Err(ApiError::Status {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(*self.role.lock().unwrap())
            }
        }
    }

    fn credentials(email: &str) -> Credentials {
        Credentials {
            email: Email::parse(email).unwrap(),
            token: SecretString::from("id-token"),
        }
    }

    fn resolver(source: FakeSource) -> RoleResolver<FakeSource> {
        RoleResolver::new(source, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_resolve_is_cached_per_identity() {
        let resolver = resolver(FakeSource::new(Role::Vendor));
        let vendor = credentials("vendor@market.example");

        assert_eq!(resolver.resolve(&vendor).await.unwrap(), Role::Vendor);
        assert_eq!(resolver.resolve(&vendor).await.unwrap(), Role::Vendor);
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 1);

        resolver
            .resolve(&credentials("other@market.example"))
            .await
            .unwrap();
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_request() {
        let resolver = resolver(FakeSource::slow(Role::Admin, Duration::from_millis(50)));
        let admin = credentials("admin@market.example");

        let (a, b, c) = tokio::join!(
            resolver.resolve(&admin),
            resolver.resolve(&admin),
            resolver.resolve(&admin)
        );
        assert_eq!(a.unwrap(), Role::Admin);
        assert_eq!(b.unwrap(), Role::Admin);
        assert_eq!(c.unwrap(), Role::Admin);
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let resolver = resolver(FakeSource::new(Role::User));
        let user = credentials("user@market.example");

        resolver.source.failing.store(true, Ordering::SeqCst);
        assert!(resolver.resolve(&user).await.is_err());
        assert_eq!(resolver.cached(&user.email).await, None);

        resolver.source.failing.store(false, Ordering::SeqCst);
        assert_eq!(resolver.resolve(&user).await.unwrap(), Role::User);
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_a_new_lookup() {
        let resolver = resolver(FakeSource::new(Role::User));
        let user = credentials("user@market.example");

        resolver.resolve(&user).await.unwrap();
        resolver.invalidate(&user.email).await;
        assert_eq!(resolver.cached(&user.email).await, None);

        resolver.resolve(&user).await.unwrap();
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_within_reports_pending_then_completes() {
        let resolver = resolver(FakeSource::slow(Role::Vendor, Duration::from_millis(200)));
        let vendor = credentials("vendor@market.example");

        let state = resolver
            .resolve_within(&vendor, Duration::from_millis(10))
            .await;
        assert_eq!(state, RoleState::Pending);

        // The lookup keeps running and fills the cache.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(resolver.cached(&vendor.email).await, Some(Role::Vendor));
        assert_eq!(
            resolver
                .resolve_within(&vendor, Duration::from_millis(10))
                .await,
            RoleState::Resolved(Role::Vendor)
        );
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_within_reports_failure() {
        let resolver = resolver(FakeSource::new(Role::User));
        resolver.source.failing.store(true, Ordering::SeqCst);

        let state = resolver
            .resolve_within(&credentials("user@market.example"), Duration::from_secs(1))
            .await;
        assert_eq!(state, RoleState::Failed);
    }

    #[tokio::test]
    async fn test_invalidate_discards_lookup_in_flight() {
        let resolver = resolver(FakeSource::slow(Role::User, Duration::from_millis(100)));
        let applicant = credentials("applicant@market.example");

        let stale_lookup = resolver.spawn_resolve(applicant.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;

        *resolver.source.role.lock().unwrap() = Role::Vendor;
        resolver.invalidate(&applicant.email).await;

        assert_eq!(stale_lookup.await.unwrap().unwrap(), Role::User);
        assert_eq!(resolver.cached(&applicant.email).await, None);
        assert_eq!(resolver.resolve(&applicant).await.unwrap(), Role::Vendor);
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 2);
    }
}
