use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use relgate_core::{Claims, TenantId};
use relgate_storage::{KeySpace, RevocationStore, StorageError};

use crate::audit;
use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationKind {
    Credential,
    Subject,
}

impl fmt::Display for RevocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Credential => f.write_str("credential"),
            Self::Subject => f.write_str("subject"),
        }
    }
}

/// Fast-path blacklist of revoked credentials and subjects.
///
/// Lookups fail open: a store error or timeout is logged, counted, and
/// treated as "not revoked". Admin writes propagate their errors.
pub struct RevocationGuard<S> {
    store: Arc<S>,
    keys: KeySpace,
    timeout: Duration,
    max_credential_lifetime: Duration,
    metrics: Arc<Metrics>,
}

impl<S> Clone for RevocationGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            timeout: self.timeout,
            max_credential_lifetime: self.max_credential_lifetime,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<S: RevocationStore> RevocationGuard<S> {
    pub fn new(
        store: Arc<S>,
        keys: KeySpace,
        timeout: Duration,
        max_credential_lifetime: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            keys,
            timeout,
            max_credential_lifetime,
            metrics,
        }
    }

    /// Checks the credential marker, then the subject marker. A subject
    /// marker blocks credentials issued at or before the revoke time, and
    /// credentials with no `iat` at all.
    pub async fn check(&self, tenant: &TenantId, claims: &Claims) -> Option<RevocationKind> {
        if let Some(ref credential_id) = claims.credential_id
            && self
                .lookup(&self.keys.credential_revocation(tenant, credential_id))
                .await
                .is_some()
        {
            return Some(RevocationKind::Credential);
        }

        if let Some(ref subject) = claims.subject
            && let Some(revoked_at) = self
                .lookup(&self.keys.subject_revocation(tenant, subject))
                .await
            && claims.issued_at.is_none_or(|iat| iat <= revoked_at)
        {
            return Some(RevocationKind::Subject);
        }

        None
    }

    pub async fn is_revoked(&self, tenant: &TenantId, kind: RevocationKind, id: &str) -> bool {
        let key = match kind {
            RevocationKind::Credential => self.keys.credential_revocation(tenant, id),
            RevocationKind::Subject => self.keys.subject_revocation(tenant, id),
        };
        self.lookup(&key).await.is_some()
    }

    /// Writes a credential marker that lives exactly as long as the
    /// credential. Returns `None` without writing when `expires_at` has
    /// already passed.
    pub async fn revoke_credential(
        &self,
        tenant: &TenantId,
        credential_id: &str,
        expires_at: i64,
    ) -> Result<Option<Duration>, StorageError> {
        let remaining = expires_at - unix_now();
        if remaining <= 0 {
            tracing::debug!(
                tenant = %tenant,
                credential_id,
                expires_at,
                "credential already expired; nothing to revoke"
            );
            return Ok(None);
        }

        let ttl = Duration::from_secs(remaining as u64);
        let key = self.keys.credential_revocation(tenant, credential_id);
        self.bounded(self.store.put_marker(&key, expires_at, ttl))
            .await?;
        audit::audit_credential_revoked(tenant, credential_id, ttl.as_secs());
        Ok(Some(ttl))
    }

    /// Blocks every credential issued to the subject up to now. The marker
    /// outlives any credential issued before it.
    pub async fn revoke_subject(
        &self,
        tenant: &TenantId,
        subject_id: &str,
    ) -> Result<Duration, StorageError> {
        let ttl = self.max_credential_lifetime;
        let key = self.keys.subject_revocation(tenant, subject_id);
        self.bounded(self.store.put_marker(&key, unix_now(), ttl))
            .await?;
        audit::audit_subject_revoked(tenant, subject_id, ttl.as_secs());
        Ok(ttl)
    }

    pub async fn unrevoke_subject(
        &self,
        tenant: &TenantId,
        subject_id: &str,
    ) -> Result<bool, StorageError> {
        let key = self.keys.subject_revocation(tenant, subject_id);
        let removed = self.bounded(self.store.delete_marker(&key)).await?;
        audit::audit_subject_unrevoked(tenant, subject_id, removed);
        Ok(removed)
    }

    async fn lookup(&self, key: &str) -> Option<i64> {
        match self.bounded(self.store.get_marker(key)).await {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_revocation_store_failure();
                tracing::warn!(key, error = %e, "revocation lookup failed; failing open");
                None
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StorageError>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout))?
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgate_storage::InMemoryStore;

    fn guard(store: &InMemoryStore) -> (RevocationGuard<InMemoryStore>, Arc<Metrics>) {
        let metrics = Arc::new(Metrics::new());
        let guard = RevocationGuard::new(
            Arc::new(store.clone()),
            KeySpace::default(),
            Duration::from_millis(200),
            Duration::from_secs(3600),
            Arc::clone(&metrics),
        );
        (guard, metrics)
    }

    fn claims(subject: &str, credential_id: &str, issued_at: Option<i64>) -> Claims {
        Claims {
            subject: Some(subject.to_string()),
            issuer: Some("https://idp/realms/acme".to_string()),
            credential_id: Some(credential_id.to_string()),
            issued_at,
            expires_at: None,
        }
    }

    fn acme() -> TenantId {
        TenantId::new("acme")
    }

    // --- Credential revocation ---

    #[tokio::test(start_paused = true)]
    async fn revoked_credential_is_blocked_until_natural_expiry() {
        let store = InMemoryStore::new();
        let (guard, _) = guard(&store);
        let c = claims("alice", "jti-1", Some(unix_now()));

        let ttl = guard
            .revoke_credential(&acme(), "jti-1", unix_now() + 60)
            .await
            .unwrap()
            .unwrap();
        assert!(ttl <= Duration::from_secs(60));
        assert_eq!(guard.check(&acme(), &c).await, Some(RevocationKind::Credential));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(guard.check(&acme(), &c).await, None);
    }

    #[tokio::test]
    async fn revoking_an_expired_credential_writes_nothing() {
        let store = InMemoryStore::new();
        let (guard, _) = guard(&store);

        let ttl = guard
            .revoke_credential(&acme(), "jti-old", unix_now() - 5)
            .await
            .unwrap();

        assert_eq!(ttl, None);
        assert!(!guard.is_revoked(&acme(), RevocationKind::Credential, "jti-old").await);
    }

    #[tokio::test]
    async fn credential_revocation_is_tenant_scoped() {
        let store = InMemoryStore::new();
        let (guard, _) = guard(&store);
        guard
            .revoke_credential(&acme(), "jti-1", unix_now() + 600)
            .await
            .unwrap();

        let other = TenantId::new("other");
        assert!(guard.is_revoked(&acme(), RevocationKind::Credential, "jti-1").await);
        assert!(!guard.is_revoked(&other, RevocationKind::Credential, "jti-1").await);
    }

    // --- Subject revocation ---

    #[tokio::test]
    async fn subject_revocation_blocks_earlier_credentials_only() {
        let store = InMemoryStore::new();
        let (guard, _) = guard(&store);
        guard.revoke_subject(&acme(), "alice").await.unwrap();

        let before = claims("alice", "jti-a", Some(unix_now() - 10));
        let after = claims("alice", "jti-b", Some(unix_now() + 10));
        let no_iat = claims("alice", "jti-c", None);

        assert_eq!(guard.check(&acme(), &before).await, Some(RevocationKind::Subject));
        assert_eq!(guard.check(&acme(), &after).await, None);
        assert_eq!(guard.check(&acme(), &no_iat).await, Some(RevocationKind::Subject));
    }

    #[tokio::test(start_paused = true)]
    async fn subject_marker_lives_for_max_credential_lifetime() {
        let store = InMemoryStore::new();
        let (guard, _) = guard(&store);

        let ttl = guard.revoke_subject(&acme(), "alice").await.unwrap();
        assert_eq!(ttl, Duration::from_secs(3600));

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(guard.is_revoked(&acme(), RevocationKind::Subject, "alice").await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!guard.is_revoked(&acme(), RevocationKind::Subject, "alice").await);
    }

    #[tokio::test]
    async fn unrevoke_subject_lifts_the_block() {
        let store = InMemoryStore::new();
        let (guard, _) = guard(&store);
        guard.revoke_subject(&acme(), "alice").await.unwrap();

        assert!(guard.unrevoke_subject(&acme(), "alice").await.unwrap());
        assert!(!guard.unrevoke_subject(&acme(), "alice").await.unwrap());
        assert_eq!(guard.check(&acme(), &claims("alice", "j", None)).await, None);
    }

    // --- Failure handling ---

    #[tokio::test]
    async fn store_outage_fails_open_and_counts() {
        let store = InMemoryStore::new();
        let (guard, metrics) = guard(&store);
        guard
            .revoke_credential(&acme(), "jti-1", unix_now() + 600)
            .await
            .unwrap();

        store.set_unavailable(true);
        let result = guard.check(&acme(), &claims("alice", "jti-1", None)).await;

        assert_eq!(result, None);
        assert_eq!(metrics.revocation_store_failures(), 2);
    }

    #[tokio::test]
    async fn admin_writes_propagate_store_errors() {
        let store = InMemoryStore::new();
        let (guard, _) = guard(&store);
        store.set_unavailable(true);

        assert!(guard.revoke_subject(&acme(), "alice").await.is_err());
        assert!(guard.unrevoke_subject(&acme(), "alice").await.is_err());
    }

    struct HangingStore;

    impl RevocationStore for HangingStore {
        async fn put_marker(&self, _: &str, _: i64, _: Duration) -> Result<(), StorageError> {
            std::future::pending().await
        }

        async fn get_marker(&self, _: &str) -> Result<Option<i64>, StorageError> {
            std::future::pending().await
        }

        async fn delete_marker(&self, _: &str) -> Result<bool, StorageError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_and_fails_open() {
        let metrics = Arc::new(Metrics::new());
        let guard = RevocationGuard::new(
            Arc::new(HangingStore),
            KeySpace::default(),
            Duration::from_millis(50),
            Duration::from_secs(3600),
            Arc::clone(&metrics),
        );

        let result = guard.is_revoked(&acme(), RevocationKind::Credential, "jti").await;

        assert!(!result);
        assert_eq!(metrics.revocation_store_failures(), 1);
        assert!(matches!(
            guard.revoke_subject(&acme(), "alice").await,
            Err(StorageError::Timeout(_))
        ));
    }
}
