//! End-to-end handling of one replication event.
//!
//! `Received → Normalized → { Skipped | Transferring → { Succeeded | Failed } }`
//!
//! The orchestrator is the only place internal failures are turned into a
//! [`TransferOutcome`]. It keeps no per-request state between calls; the
//! counters below are process-wide statistics only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::ReplConfig;
use crate::credentials::CredentialProvider;
use crate::error::ReplError;
use crate::event::{normalize, parse_event, ReplicationRequest};
use crate::gate::should_skip;
use crate::outcome::TransferOutcome;
use crate::retry::RetryController;
use crate::store::SourceStore;
use crate::transfer::TransferEngine;

/// Lifecycle stage of one invocation, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Raw event accepted.
    Received,
    /// Event converted to a request.
    Normalized,
    /// Destination already up to date.
    Skipped,
    /// Transfer under way.
    Transferring,
    /// Transfer committed.
    Succeeded,
    /// Terminal failure.
    Failed,
}

#[derive(Debug, Default)]
struct StatsInner {
    handled: AtomicU64,
    skipped: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    bytes_written: AtomicU64,
}

/// Snapshot of orchestrator counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Events handled.
    pub handled: u64,
    /// Events skipped by the idempotency gate.
    pub skipped: u64,
    /// Events replicated successfully.
    pub succeeded: u64,
    /// Events that failed.
    pub failed: u64,
    /// Total bytes written across successful transfers.
    pub bytes_written: u64,
}

/// Composes normalization, the idempotency gate, and retried transfers.
pub struct Orchestrator {
    config: Arc<ReplConfig>,
    source: Arc<dyn SourceStore>,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryController,
    engine: TransferEngine,
    stats: StatsInner,
}

impl Orchestrator {
    /// Create an orchestrator from resolved configuration and collaborators.
    pub fn new(
        config: Arc<ReplConfig>,
        source: Arc<dyn SourceStore>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let retry = RetryController::new(config.retry);
        let engine = TransferEngine::new(config.chunk_size);
        Self {
            config,
            source,
            credentials,
            retry,
            engine,
            stats: StatsInner::default(),
        }
    }

    /// Handle one raw event and report its outcome.
    ///
    /// Emits exactly one summary log line per call.
    pub async fn handle(&self, raw: &Value) -> TransferOutcome {
        debug!(stage = ?Stage::Received, event = %raw, "received event");
        let (request, outcome) = self.run(raw).await;
        self.finish(request.as_ref(), outcome)
    }

    /// Handle an event given as JSON text. Text that is not JSON is reported
    /// as a malformed event without touching either store.
    pub async fn handle_payload(&self, text: &str) -> TransferOutcome {
        match parse_event(text) {
            Ok(raw) => self.handle(&raw).await,
            Err(error) => self.finish(None, TransferOutcome::Failed { error, attempts: 0 }),
        }
    }

    fn finish(&self, request: Option<&ReplicationRequest>, outcome: TransferOutcome) -> TransferOutcome {
        self.record(&outcome);

        let container = request.map(|r| r.source_container.as_str()).unwrap_or("");
        let key = request.map(|r| r.object_key.as_str()).unwrap_or("");
        match &outcome {
            TransferOutcome::Skipped { reason } => info!(
                source_container = container,
                object_key = key,
                outcome = outcome.label(),
                reason = %reason,
                "replication finished"
            ),
            TransferOutcome::Succeeded { bytes_written } => info!(
                source_container = container,
                object_key = key,
                destination = %self.config.destination_container,
                outcome = outcome.label(),
                bytes_written = *bytes_written,
                "replication finished"
            ),
            TransferOutcome::Failed { error: err, attempts } => error!(
                source_container = container,
                object_key = key,
                outcome = outcome.label(),
                attempts = *attempts,
                error = %err,
                "replication finished"
            ),
        }
        outcome
    }

    /// Get a snapshot of current statistics.
    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            handled: self.stats.handled.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            succeeded: self.stats.succeeded.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            bytes_written: self.stats.bytes_written.load(Ordering::Relaxed),
        }
    }

    async fn run(&self, raw: &Value) -> (Option<ReplicationRequest>, TransferOutcome) {
        let request = match normalize(raw) {
            Ok(request) => request,
            Err(e) => return (None, TransferOutcome::Failed { error: e, attempts: 0 }),
        };
        debug!(stage = ?Stage::Normalized, key = %request.object_key, "event normalized");

        let request = self.resolve_size_hint(request).await;

        let destination = match self
            .credentials
            .destination(&self.config.destination_container)
            .await
        {
            Ok(handle) => handle,
            Err(e) => return (Some(request), TransferOutcome::Failed { error: e, attempts: 0 }),
        };

        if should_skip(&request, destination.as_ref()).await {
            debug!(stage = ?Stage::Skipped, key = %request.object_key, "destination up to date");
            let reason = format!(
                "{} already exists in {} with size {}",
                request.object_key,
                self.config.destination_container,
                request.size_hint.unwrap_or_default()
            );
            return (Some(request), TransferOutcome::Skipped { reason });
        }

        debug!(stage = ?Stage::Transferring, key = %request.object_key, "starting transfer");
        let engine = &self.engine;
        let source = self.source.as_ref();
        let dest = destination.as_ref();
        let req = &request;
        let result = self
            .retry
            .run_with_retry(|attempt| async move {
                debug!(attempt, key = %req.object_key, "transfer attempt");
                engine.transfer(req, source, dest).await
            })
            .await;

        let outcome = match result {
            Ok(bytes_written) => {
                debug!(stage = ?Stage::Succeeded, key = %request.object_key, bytes_written);
                TransferOutcome::Succeeded { bytes_written }
            }
            Err(exhausted) => {
                debug!(stage = ?Stage::Failed, key = %request.object_key, attempts = exhausted.attempts);
                TransferOutcome::Failed {
                    attempts: exhausted.attempts,
                    error: ReplError::RetriesExhausted {
                        attempts: exhausted.attempts,
                        last_error: exhausted.last_error,
                    },
                }
            }
        };
        (Some(request), outcome)
    }

    /// Fill in a missing size hint from source metadata. Failures leave it unset.
    async fn resolve_size_hint(&self, request: ReplicationRequest) -> ReplicationRequest {
        if request.size_hint.is_some() {
            return request;
        }
        match self
            .source
            .stat(&request.source_container, &request.object_key)
            .await
        {
            Ok(Some(stat)) => request.with_size_hint(Some(stat.size)),
            Ok(None) => request,
            Err(e) => {
                warn!(key = %request.object_key, error = %e, "source size lookup failed");
                request
            }
        }
    }

    fn record(&self, outcome: &TransferOutcome) {
        self.stats.handled.fetch_add(1, Ordering::Relaxed);
        match outcome {
            TransferOutcome::Skipped { .. } => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
            }
            TransferOutcome::Succeeded { bytes_written } => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
                self.stats.bytes_written.fetch_add(*bytes_written, Ordering::Relaxed);
            }
            TransferOutcome::Failed { .. } => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
