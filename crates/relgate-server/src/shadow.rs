use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use relgate_core::{Decision, DecisionContext, Headers};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::metrics::Metrics;

/// Headers that may carry a credential and never leave the process.
const REDACTED_HEADERS: &[&str] = &["authorization", "cookie"];

#[derive(Debug, Clone, Serialize)]
pub struct ShadowRecord {
    pub id: Uuid,
    pub recorded_at_ms: u64,
    pub context: DecisionContext,
    pub decision: Decision,
}

impl ShadowRecord {
    fn new(ctx: &DecisionContext, decision: &Decision) -> Self {
        let headers: Headers = ctx
            .headers
            .iter()
            .filter(|(name, _)| !REDACTED_HEADERS.contains(name))
            .collect();
        let mut context = ctx.clone();
        context.headers = headers;

        Self {
            id: Uuid::new_v4(),
            recorded_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            context,
            decision: decision.clone(),
        }
    }
}

/// Destination for shadow records, drained by a single background worker.
pub trait ShadowSink: Send + Sync + 'static {
    fn record(&self, record: ShadowRecord) -> impl Future<Output = ()> + Send;
}

/// Emits each record as a structured event under the `shadow` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ShadowSink for LogSink {
    async fn record(&self, record: ShadowRecord) {
        tracing::info!(
            target: "shadow",
            id = %record.id,
            recorded_at_ms = record.recorded_at_ms,
            method = %record.context.method,
            path = %record.context.path,
            tenant = ?record.decision.tenant,
            trace_id = ?record.context.trace_id,
            allowed = record.decision.allowed,
            status = %record.decision.status,
            allowed_tags = %record.decision.allowed_tags_header(),
            "shadow decision"
        );
    }
}

/// Fire-and-forget handoff of decisions to a [`ShadowSink`]. `submit` never
/// waits: when the queue is full the new record is dropped and counted.
#[derive(Debug, Clone)]
pub struct ShadowRecorder {
    tx: mpsc::Sender<ShadowRecord>,
    metrics: Arc<Metrics>,
}

impl ShadowRecorder {
    pub fn spawn<K: ShadowSink>(
        capacity: usize,
        sink: K,
        metrics: Arc<Metrics>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let worker = tokio::spawn(drain(rx, sink));
        (Self { tx, metrics }, worker)
    }

    /// Returns whether the record was queued.
    pub fn submit(&self, ctx: &DecisionContext, decision: &Decision) -> bool {
        match self.tx.try_send(ShadowRecord::new(ctx, decision)) {
            Ok(()) => {
                self.metrics.record_shadow_submitted();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.metrics.record_shadow_dropped();
                tracing::debug!("shadow queue full; dropping record");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.record_shadow_dropped();
                tracing::warn!("shadow worker stopped; dropping record");
                false
            }
        }
    }
}

async fn drain<K: ShadowSink>(mut rx: mpsc::Receiver<ShadowRecord>, sink: K) {
    while let Some(record) = rx.recv().await {
        sink.record(record).await;
    }
    tracing::debug!("shadow worker finished");
}
