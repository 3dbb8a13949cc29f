use std::sync::Arc;
use std::time::Duration;

use relgate_core::{Decision, DecisionContext, TenantId};
use relgate_storage::{InvalidationMarker, KeySpace, RevocationStore, SnapshotSource};

use crate::cache::{CacheCoordinator, CacheStatus, ReloadError};
use crate::config::AppConfig;
use crate::engine::{DecisionEngine, EngineOptions};
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::revocation::RevocationGuard;
use crate::shadow::ShadowRecorder;

/// A store that can back a whole relgate instance.
pub trait Backend: SnapshotSource + InvalidationMarker + RevocationStore + 'static {}

impl<T> Backend for T where T: SnapshotSource + InvalidationMarker + RevocationStore + 'static {}

/// Everything the transport adapters call into: the decision path plus the
/// administrative operations.
pub struct RelgateService<B> {
    engine: DecisionEngine<B>,
    coordinator: Arc<CacheCoordinator<B>>,
    revocations: RevocationGuard<B>,
    metrics: Arc<Metrics>,
}

impl<B: Backend> RelgateService<B> {
    /// Loads the initial snapshot and wires the components from `config`.
    pub async fn from_config(
        config: &AppConfig,
        backend: Arc<B>,
        metrics: Arc<Metrics>,
        shadow: Option<ShadowRecorder>,
    ) -> Result<Self, ReloadError> {
        let coordinator = CacheCoordinator::initialize(
            Arc::clone(&backend),
            Arc::clone(&metrics),
            config.poll_interval(),
            config.store_timeout(),
        )
        .await?;

        let revocations = RevocationGuard::new(
            backend,
            KeySpace::new(config.store.key_prefix.clone()),
            config.store_timeout(),
            config.max_credential_lifetime(),
            Arc::clone(&metrics),
        );

        let options = EngineOptions {
            extractor: config.to_extractor_config(),
            acl_strategy: config.decision.acl_strategy,
            default_policy: config.decision.default_policy,
        };
        let mut engine =
            DecisionEngine::new(coordinator.snapshots(), Arc::clone(&metrics), options);
        if config.decision.revocation_check_enabled {
            engine = engine.with_revocation_guard(revocations.clone());
        } else {
            tracing::warn!("revocation check disabled");
        }
        if let Some(recorder) = shadow {
            engine = engine.with_shadow(recorder);
        }

        Ok(Self {
            engine,
            coordinator: Arc::new(coordinator),
            revocations,
            metrics,
        })
    }

    pub fn coordinator(&self) -> Arc<CacheCoordinator<B>> {
        Arc::clone(&self.coordinator)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub async fn check(&self, ctx: &DecisionContext) -> Decision {
        self.engine.decide(ctx).await
    }

    pub async fn revoke_credential(
        &self,
        tenant: &str,
        credential_id: &str,
        expires_at: i64,
    ) -> Result<Option<Duration>, ApiError> {
        let tenant = parse_tenant(tenant)?;
        require("credential id", credential_id)?;
        Ok(self
            .revocations
            .revoke_credential(&tenant, credential_id, expires_at)
            .await?)
    }

    pub async fn revoke_subject(
        &self,
        tenant: &str,
        subject_id: &str,
    ) -> Result<Duration, ApiError> {
        let tenant = parse_tenant(tenant)?;
        require("subject id", subject_id)?;
        Ok(self.revocations.revoke_subject(&tenant, subject_id).await?)
    }

    pub async fn unrevoke_subject(&self, tenant: &str, subject_id: &str) -> Result<bool, ApiError> {
        let tenant = parse_tenant(tenant)?;
        require("subject id", subject_id)?;
        Ok(self.revocations.unrevoke_subject(&tenant, subject_id).await?)
    }

    /// Bumps the fleet-wide marker. Returns the new marker value.
    pub async fn refresh_cache(&self) -> Result<u64, ApiError> {
        Ok(self.coordinator.trigger_refresh().await?)
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.coordinator.status()
    }
}

fn parse_tenant(raw: &str) -> Result<TenantId, ApiError> {
    require("tenant", raw)?;
    Ok(TenantId::new(raw))
}

fn require(what: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidRequest(format!("{what} must not be empty")));
    }
    Ok(())
}
