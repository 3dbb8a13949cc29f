use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use relgate_core::mapping::{self, request_path};
use relgate_core::{
    AclEvaluator, AclStrategy, CacheSnapshot, Claims, CredentialExtractor, Decision,
    DecisionContext, DecisionStatus, EvaluationError, ExtractorConfig, events,
};
use relgate_storage::RevocationStore;
use serde::{Deserialize, Serialize};

use crate::cache::SnapshotStore;
use crate::metrics::Metrics;
use crate::revocation::RevocationGuard;
use crate::shadow::ShadowRecorder;

/// Verdict for requests that match no mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    #[default]
    Deny,
    Allow,
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub extractor: ExtractorConfig,
    pub acl_strategy: AclStrategy,
    pub default_policy: DefaultPolicy,
}

/// Turns a [`DecisionContext`] into a [`Decision`]. Never fails: every
/// error and panic inside evaluation becomes a deny carrying diagnostics.
pub struct DecisionEngine<R> {
    snapshots: Arc<SnapshotStore>,
    revocations: Option<RevocationGuard<R>>,
    extractor: CredentialExtractor,
    acl: AclEvaluator,
    default_policy: DefaultPolicy,
    shadow: Option<ShadowRecorder>,
    metrics: Arc<Metrics>,
}

impl<R: RevocationStore> DecisionEngine<R> {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        metrics: Arc<Metrics>,
        options: EngineOptions,
    ) -> Self {
        Self {
            snapshots,
            revocations: None,
            extractor: CredentialExtractor::new(options.extractor),
            acl: AclEvaluator::new(options.acl_strategy),
            default_policy: options.default_policy,
            shadow: None,
            metrics,
        }
    }

    pub fn with_revocation_guard(mut self, guard: RevocationGuard<R>) -> Self {
        self.revocations = Some(guard);
        self
    }

    pub fn with_shadow(mut self, recorder: ShadowRecorder) -> Self {
        self.shadow = Some(recorder);
        self
    }

    pub async fn decide(&self, ctx: &DecisionContext) -> Decision {
        let snapshot = self.snapshots.current();
        let claims = self.extractor.claims(ctx);

        let mut decision = match self.revoked(ctx, claims.as_ref()).await {
            Some(revoked) => revoked,
            None => self.contain(ctx, || self.evaluate(ctx, &snapshot, claims.as_ref())),
        };
        decision.trace_id = ctx.trace_id.clone();

        self.metrics.record_decision(decision.status);
        tracing::info!(
            method = %ctx.method,
            path = %request_path(&ctx.path),
            tenant = ?decision.tenant,
            trace_id = ?decision.trace_id,
            snapshot = %snapshot.version(),
            status = %decision.status,
            allowed_tags = %decision.allowed_tags_header(),
            events = ?decision.events,
            "decision"
        );

        if let Some(ref shadow) = self.shadow {
            shadow.submit(ctx, &decision);
        }
        decision
    }

    async fn revoked(&self, ctx: &DecisionContext, claims: Option<&Claims>) -> Option<Decision> {
        let guard = self.revocations.as_ref()?;
        let claims = claims?;
        let tenant = ctx.tenant.clone().or_else(|| claims.tenant())?;

        let kind = guard.check(&tenant, claims).await?;
        self.metrics.record_revocation_hit();

        let mut decision = Decision::deny(DecisionStatus::Unauthorized)
            .with_event(events::REVOKED, kind.to_string());
        decision.tenant = Some(tenant);
        Some(decision)
    }

    /// Runs one evaluation step, turning an error or a panic into a deny.
    fn contain<F>(&self, ctx: &DecisionContext, eval: F) -> Decision
    where
        F: FnOnce() -> Result<Decision, EvaluationError>,
    {
        let outcome = panic::catch_unwind(AssertUnwindSafe(eval));
        let err = match outcome {
            Ok(Ok(decision)) => return decision,
            Ok(Err(err)) => err,
            Err(payload) => EvaluationError::Panicked(panic_message(payload.as_ref())),
        };

        self.metrics.record_evaluation_failure();
        tracing::error!(
            method = %ctx.method,
            path = %ctx.path,
            error = %err,
            "evaluation failed; denying"
        );
        Decision::deny(DecisionStatus::PermissionDenied)
            .with_event(events::EXCEPTION, err.to_string())
            .with_event(events::TRACE, format!("{err:?}"))
    }

    fn evaluate(
        &self,
        ctx: &DecisionContext,
        snapshot: &CacheSnapshot,
        claims: Option<&Claims>,
    ) -> Result<Decision, EvaluationError> {
        if ctx.method.trim().is_empty() {
            return Err(EvaluationError::InvalidRequest("empty method".to_string()));
        }
        if !ctx.path.starts_with('/') {
            return Err(EvaluationError::InvalidRequest(format!(
                "path must be absolute: '{}'",
                ctx.path
            )));
        }

        let tenant = ctx.tenant.clone().or_else(|| claims.and_then(Claims::tenant));
        let subject = ctx
            .subject
            .clone()
            .or_else(|| claims.and_then(|c| c.subject.clone()));
        let (Some(tenant), Some(subject)) = (tenant.clone(), subject) else {
            let mut decision = Decision::deny(DecisionStatus::Unauthorized)
                .with_event(events::JWT_PRESENT, claims.is_some().to_string());
            decision.tenant = tenant;
            return Ok(decision);
        };

        let Some(mapping) = mapping::resolve(snapshot, Some(&tenant), &ctx.method, &ctx.path) else {
            self.metrics.record_unmapped();
            let mut decision = match self.default_policy {
                DefaultPolicy::Deny => Decision::deny(DecisionStatus::PermissionDenied),
                DefaultPolicy::Allow => Decision::allow(Vec::new()),
            };
            decision.mappings_present = false;
            decision.tenant = Some(tenant);
            decision.record(
                events::NO_MAPPINGS,
                format!("{} {}", ctx.method, request_path(&ctx.path)),
            );
            return Ok(decision);
        };

        let check = self
            .acl
            .check(snapshot, &tenant, &subject, &mapping.required_tags);
        let mut decision = if check.allowed {
            Decision::allow(check.matched_tags.into_iter().collect())
        } else {
            let mut denied = Decision::deny(DecisionStatus::PermissionDenied)
                .with_event(events::REJECTED_BY_MAPPING, mapping.id.clone());
            denied.mappings_present = true;
            denied.rejected_mapping_id = Some(mapping.id.clone());
            denied
        };
        decision.tenant = Some(tenant);
        Ok(decision)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
