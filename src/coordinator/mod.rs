//! Pull-merge coordination.
//!
//! Pulls from one or two subscriptions, merges the results by broker
//! identity and acknowledges them as one batch. Every acknowledgment wait is
//! bounded by the configured ack timeout; running out of time counts as a
//! failed batch. Messages of a failed batch stay leased and are redelivered
//! once their lease expires.

mod merge;

pub use merge::MergedPullResult;

use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::broker::SharedBroker;
use crate::config::PullConfig;
use crate::metrics::get_metrics;
use crate::types::validation::{validate_max_messages, validate_subscription_name};
use crate::types::{AckHandle, DocumentPayload, LeasedMessage};
use crate::{Error, Result};

/// Status reported when a merged pull found nothing.
pub const NO_MESSAGES_STATUS: &str = "No messages available for retrieval.";

/// Status reported when a merged pull could not be acknowledged.
pub const ACK_FAILED_STATUS: &str = "Acking failed";

/// Why a merged pull failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A subscription name was rejected before contacting the broker.
    InvalidRequest,
    /// One of the pulls failed.
    PullFailed,
    /// The broker could not be reached while acknowledging.
    BrokerUnavailable,
    /// The broker refused part or all of the batch.
    AckRejected,
    /// Acknowledgment confirmation did not arrive in time.
    AckTimeout,
}

impl FailureKind {
    /// Classify an acknowledgment error.
    pub fn from_ack_error(err: &Error) -> Self {
        match err {
            Error::AckTimeout(_) => FailureKind::AckTimeout,
            Error::AckRejected { .. } | Error::InvalidAckHandle => FailureKind::AckRejected,
            _ => FailureKind::BrokerUnavailable,
        }
    }

    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::PullFailed => "pull_failed",
            FailureKind::BrokerUnavailable => "broker_unavailable",
            FailureKind::AckRejected => "ack_rejected",
            FailureKind::AckTimeout => "ack_timeout",
        }
    }
}

/// Result of a merged pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullMergeOutcome {
    /// Both subscriptions were empty; nothing was acknowledged.
    NoMessages,
    /// The merged set was acknowledged.
    Acked {
        /// Distinct messages acknowledged.
        count: usize,
        /// Duplicate leases collapsed while merging.
        collapsed: usize,
    },
    /// The batch was not (or not provably) acknowledged.
    Failed {
        /// Failure classification.
        kind: FailureKind,
        /// Underlying error text.
        detail: String,
    },
}

impl PullMergeOutcome {
    /// Human-readable status for HTTP callers.
    pub fn status_message(&self) -> String {
        match self {
            PullMergeOutcome::NoMessages => NO_MESSAGES_STATUS.to_string(),
            PullMergeOutcome::Acked { count, .. } => {
                format!("Pulled and acked {} message(s)", count)
            }
            PullMergeOutcome::Failed {
                kind: FailureKind::InvalidRequest,
                detail,
            } => format!("Invalid request: {}", detail),
            PullMergeOutcome::Failed { .. } => ACK_FAILED_STATUS.to_string(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            PullMergeOutcome::NoMessages => "empty",
            PullMergeOutcome::Acked { .. } => "acked",
            PullMergeOutcome::Failed { .. } => "failed",
        }
    }
}

/// Coordinates pulls and batch acknowledgment against a broker.
#[derive(Clone)]
pub struct PullMergeCoordinator {
    broker: SharedBroker,
    config: PullConfig,
}

impl PullMergeCoordinator {
    /// Create a new coordinator.
    pub fn new(broker: SharedBroker, config: PullConfig) -> Self {
        Self { broker, config }
    }

    /// Pull up to the configured batch size from one subscription,
    /// acknowledge it and return the document projections.
    pub async fn pull_single(&self, subscription: &str) -> Result<Vec<DocumentPayload>> {
        self.pull_single_with(subscription, self.config.single_max_messages)
            .await
    }

    /// Like [`pull_single`](Self::pull_single) with an explicit batch size.
    ///
    /// Fails without a payload if the pull or the acknowledgment fails; the
    /// messages then remain leased.
    pub async fn pull_single_with(
        &self,
        subscription: &str,
        max_messages: u32,
    ) -> Result<Vec<DocumentPayload>> {
        validate_subscription_name(subscription)?;
        validate_max_messages(max_messages)?;

        let metrics = get_metrics();
        let messages = match self.broker.pull(subscription, max_messages, true).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(subscription = %subscription, "Pull failed: {}", e);
                metrics
                    .pull_requests_total
                    .with_label_values(&["pull", "failed"])
                    .inc();
                return Err(e);
            }
        };
        metrics
            .messages_pulled_total
            .with_label_values(&[subscription])
            .inc_by(messages.len() as u64);

        if messages.is_empty() {
            debug!(subscription = %subscription, "Pull returned no messages");
            metrics
                .pull_requests_total
                .with_label_values(&["pull", "empty"])
                .inc();
            return Ok(Vec::new());
        }

        let handles: Vec<AckHandle> = messages.iter().map(|m| m.ack_handle.clone()).collect();
        if let Err(e) = self.acknowledge(&handles, "pull").await {
            metrics
                .pull_requests_total
                .with_label_values(&["pull", "failed"])
                .inc();
            return Err(e);
        }

        metrics
            .pull_requests_total
            .with_label_values(&["pull", "acked"])
            .inc();
        info!(subscription = %subscription, count = messages.len(), "Pulled and acked messages");

        Ok(messages.iter().map(LeasedMessage::to_document).collect())
    }

    /// Pull from two subscriptions, merge by broker identity and acknowledge
    /// the merged set as one batch. Never fails; the outcome says what happened.
    pub async fn pull_merge(&self, subscription1: &str, subscription2: &str) -> PullMergeOutcome {
        let outcome = self.run_pull_merge(subscription1, subscription2).await;

        get_metrics()
            .pull_requests_total
            .with_label_values(&["multipull", outcome.label()])
            .inc();
        match &outcome {
            PullMergeOutcome::Failed { kind, detail } => warn!(
                subscription1 = %subscription1,
                subscription2 = %subscription2,
                kind = kind.as_str(),
                "Merged pull failed: {}", detail
            ),
            other => info!(
                subscription1 = %subscription1,
                subscription2 = %subscription2,
                "{}", other.status_message()
            ),
        }
        outcome
    }

    async fn run_pull_merge(&self, subscription1: &str, subscription2: &str) -> PullMergeOutcome {
        for name in [subscription1, subscription2] {
            if let Err(e) = validate_subscription_name(name) {
                return PullMergeOutcome::Failed {
                    kind: FailureKind::InvalidRequest,
                    detail: e.to_string(),
                };
            }
        }

        let merged = match self.pull_merged(&[subscription1, subscription2]).await {
            Ok(merged) => merged,
            Err(e) => {
                return PullMergeOutcome::Failed {
                    kind: FailureKind::PullFailed,
                    detail: e.to_string(),
                }
            }
        };

        if merged.is_empty() {
            return PullMergeOutcome::NoMessages;
        }

        if merged.collapsed() > 0 {
            get_metrics()
                .duplicates_collapsed_total
                .with_label_values(&["multipull"])
                .inc_by(merged.collapsed() as u64);
        }

        match self.acknowledge(&merged.ack_handles(), "multipull").await {
            Ok(()) => PullMergeOutcome::Acked {
                count: merged.len(),
                collapsed: merged.collapsed(),
            },
            Err(e) => PullMergeOutcome::Failed {
                kind: FailureKind::from_ack_error(&e),
                detail: e.to_string(),
            },
        }
    }

    /// Pull from every subscription concurrently and merge the results.
    ///
    /// If any pull fails, the leases obtained by the others are released and
    /// the first error is returned.
    pub async fn pull_merged(&self, subscriptions: &[&str]) -> Result<MergedPullResult> {
        let max = self.config.merge_max_messages;
        let pulls = subscriptions.iter().map(|sub| async move {
            let result = self.broker.pull(sub, max, true).await;
            if let Ok(messages) = &result {
                get_metrics()
                    .messages_pulled_total
                    .with_label_values(&[*sub])
                    .inc_by(messages.len() as u64);
            }
            result
        });
        let results = join_all(pulls).await;

        let mut batches = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(err) = first_error {
            let leases: Vec<AckHandle> = batches
                .iter()
                .flatten()
                .map(|m| m.ack_handle.clone())
                .collect();
            if !leases.is_empty() {
                if let Err(e) = self.broker.modify_ack_deadline(&leases, 0).await {
                    debug!("Failed to release leases after pull error: {}", e);
                }
            }
            return Err(err);
        }

        let mut merged = MergedPullResult::new();
        for batch in batches {
            merged.extend(batch);
        }
        Ok(merged)
    }

    /// Acknowledge a batch, bounded by the configured timeout.
    async fn acknowledge(&self, handles: &[AckHandle], operation: &str) -> Result<()> {
        let metrics = get_metrics();
        let timeout = self.config.ack_timeout();
        let started = Instant::now();

        let result = match tokio::time::timeout(timeout, self.broker.acknowledge(handles)).await {
            Ok(result) => result,
            Err(_) => Err(Error::AckTimeout(timeout)),
        };

        metrics
            .ack_latency_seconds
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(()) => {
                metrics
                    .messages_acked_total
                    .with_label_values(&[operation])
                    .inc_by(handles.len() as u64);
            }
            Err(e) => {
                let kind = FailureKind::from_ack_error(e);
                metrics
                    .ack_failures_total
                    .with_label_values(&[operation, kind.as_str()])
                    .inc();
                warn!(operation, count = handles.len(), "Acknowledgment failed: {}", e);
            }
        }
        result
    }
}
