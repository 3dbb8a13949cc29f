use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use relgate_core::DecisionStatus;

#[derive(Debug, Default)]
pub struct Metrics {
    decisions_total: AtomicU64,
    decisions_allowed: AtomicU64,
    decisions_permission_denied: AtomicU64,
    decisions_unauthorized: AtomicU64,
    evaluation_failures: AtomicU64,
    unmapped_requests: AtomicU64,
    revocation_hits: AtomicU64,
    revocation_store_failures: AtomicU64,
    snapshot_reloads: AtomicU64,
    snapshot_reload_failures: AtomicU64,
    snapshot_version: AtomicU64,
    shadow_submitted: AtomicU64,
    shadow_dropped: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decision(&self, status: DecisionStatus) {
        self.decisions_total.fetch_add(1, Ordering::Relaxed);
        let counter = match status {
            DecisionStatus::Ok => &self.decisions_allowed,
            DecisionStatus::PermissionDenied => &self.decisions_permission_denied,
            DecisionStatus::Unauthorized => &self.decisions_unauthorized,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evaluation_failure(&self) {
        self.evaluation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unmapped(&self) {
        self.unmapped_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revocation_hit(&self) {
        self.revocation_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revocation_store_failure(&self) {
        self.revocation_store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_reload(&self, version: u64) {
        self.snapshot_reloads.fetch_add(1, Ordering::Relaxed);
        self.snapshot_version.store(version, Ordering::Relaxed);
    }

    pub fn record_snapshot_reload_failure(&self) {
        self.snapshot_reload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shadow_submitted(&self) {
        self.shadow_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_shadow_dropped(&self) {
        self.shadow_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decisions_total(&self) -> u64 {
        self.decisions_total.load(Ordering::Relaxed)
    }

    pub fn decisions_allowed(&self) -> u64 {
        self.decisions_allowed.load(Ordering::Relaxed)
    }

    pub fn decisions_permission_denied(&self) -> u64 {
        self.decisions_permission_denied.load(Ordering::Relaxed)
    }

    pub fn decisions_unauthorized(&self) -> u64 {
        self.decisions_unauthorized.load(Ordering::Relaxed)
    }

    pub fn evaluation_failures(&self) -> u64 {
        self.evaluation_failures.load(Ordering::Relaxed)
    }

    pub fn unmapped_requests(&self) -> u64 {
        self.unmapped_requests.load(Ordering::Relaxed)
    }

    pub fn revocation_hits(&self) -> u64 {
        self.revocation_hits.load(Ordering::Relaxed)
    }

    pub fn revocation_store_failures(&self) -> u64 {
        self.revocation_store_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot_reloads(&self) -> u64 {
        self.snapshot_reloads.load(Ordering::Relaxed)
    }

    pub fn snapshot_reload_failures(&self) -> u64 {
        self.snapshot_reload_failures.load(Ordering::Relaxed)
    }

    pub fn snapshot_version(&self) -> u64 {
        self.snapshot_version.load(Ordering::Relaxed)
    }

    pub fn shadow_submitted(&self) -> u64 {
        self.shadow_submitted.load(Ordering::Relaxed)
    }

    pub fn shadow_dropped(&self) -> u64 {
        self.shadow_dropped.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        let counters = [
            ("relgate_decisions_total", "Total decisions returned.", self.decisions_total()),
            (
                "relgate_decisions_allowed_total",
                "Decisions with status OK.",
                self.decisions_allowed(),
            ),
            (
                "relgate_decisions_permission_denied_total",
                "Decisions with status PERMISSION_DENIED.",
                self.decisions_permission_denied(),
            ),
            (
                "relgate_decisions_unauthorized_total",
                "Decisions with status UNAUTHORIZED.",
                self.decisions_unauthorized(),
            ),
            (
                "relgate_evaluation_failures_total",
                "Evaluations converted to deny after an unexpected failure.",
                self.evaluation_failures(),
            ),
            (
                "relgate_unmapped_requests_total",
                "Requests matching no mapping.",
                self.unmapped_requests(),
            ),
            (
                "relgate_revocation_hits_total",
                "Requests rejected by a revocation marker.",
                self.revocation_hits(),
            ),
            (
                "relgate_revocation_store_failures_total",
                "Revocation lookups that failed open.",
                self.revocation_store_failures(),
            ),
            (
                "relgate_snapshot_reloads_total",
                "Snapshot reloads published.",
                self.snapshot_reloads(),
            ),
            (
                "relgate_snapshot_reload_failures_total",
                "Snapshot reloads that failed; prior snapshot kept.",
                self.snapshot_reload_failures(),
            ),
            (
                "relgate_shadow_submitted_total",
                "Decisions queued for shadow recording.",
                self.shadow_submitted(),
            ),
            (
                "relgate_shadow_dropped_total",
                "Shadow records dropped on a full queue.",
                self.shadow_dropped(),
            ),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {name} {help}");
            let _ = writeln!(output, "# TYPE {name} counter");
            let _ = writeln!(output, "{name} {value}");
        }

        output.push_str("# HELP relgate_snapshot_version Version of the published snapshot.\n");
        output.push_str("# TYPE relgate_snapshot_version gauge\n");
        let _ = writeln!(output, "relgate_snapshot_version {}", self.snapshot_version());
        output
    }
}

pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        metrics.render_prometheus(),
    )
}
