//! Concurrent record resolution
//!
//! The orchestrator drains the record list through a bounded worker pool.
//! Every record ends in exactly one [`FetchOutcome`], written into a slot
//! array index-aligned with the input, so outcome order never depends on
//! worker completion order. Rate limiting, per-call timeouts and the retry
//! policy are all applied here, uniformly around every client call.

use crate::client::{ClientError, IcrtClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::{RetryError, with_retry};
use crate::types::{FetchOutcome, FetchSession, IdentifierRecord, PipelineEvent};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs the fetch phase for one pipeline invocation
pub struct FetchOrchestrator {
    config: Config,
    cancel: CancellationToken,
    events: broadcast::Sender<PipelineEvent>,
}

impl FetchOrchestrator {
    /// Create an orchestrator for one run
    #[must_use]
    pub fn new(
        config: Config,
        cancel: CancellationToken,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        Self {
            config,
            cancel,
            events,
        }
    }

    /// Resolve every record to a terminal outcome
    ///
    /// Returns a session whose `outcomes` vector is index-aligned with
    /// `records`. Blank or malformed identifiers are classified without
    /// contacting the API. An authentication rejection cancels the run and
    /// surfaces as [`Error::FatalClient`], since no further record could
    /// succeed with the same credentials.
    pub async fn run(
        &self,
        records: Vec<IdentifierRecord>,
        client: Arc<dyn IcrtClient>,
    ) -> Result<FetchSession> {
        let started_at = Utc::now();
        let total = records.len();
        tracing::info!(records = total, "starting fetch run");

        let slots: Arc<Mutex<Vec<Option<FetchOutcome>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));
        let fatal: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let limiter = RateLimiter::new(&self.config.rate_limit);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit));
        let mut workers = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            let record = record.clone();

            if self.cancel.is_cancelled() {
                self.settle(&slots, index, FetchOutcome::Cancelled { record })
                    .await;
                continue;
            }

            if let Some(reason) = validate_identifier(&record) {
                self.settle(&slots, index, FetchOutcome::Invalid { record, reason })
                    .await;
                continue;
            }

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.settle(&slots, index, FetchOutcome::Cancelled { record })
                        .await;
                    continue;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    match permit {
                        Ok(permit) => permit,
                        // The semaphore is never closed while the run is alive
                        Err(_) => break,
                    }
                }
            };

            let client = Arc::clone(&client);
            let limiter = limiter.clone();
            let slots = Arc::clone(&slots);
            let fatal = Arc::clone(&fatal);
            let cancel = self.cancel.clone();
            let events = self.events.clone();
            let retry = self.config.retry.clone();
            let timeout = self.config.per_call_timeout;

            workers.spawn(async move {
                let _permit = permit;
                let (outcome, auth_failure) =
                    resolve_record(&*client, &limiter, &retry, timeout, &record).await;

                if let Some(message) = auth_failure {
                    let mut fatal = fatal.lock().await;
                    if fatal.is_none() {
                        *fatal = Some(message);
                    }
                    drop(fatal);
                    cancel.cancel();
                }

                let _ = events.send(PipelineEvent::RecordCompleted {
                    row_index: outcome.record().row_index,
                    identifier: outcome.record().identifier.clone(),
                    status: outcome.status(),
                });
                slots.lock().await[index] = Some(outcome);
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "worker task failed");
            }
        }

        if let Some(message) = fatal.lock().await.take() {
            return Err(Error::FatalClient(message));
        }

        let slots = Arc::try_unwrap(slots)
            .map_err(|_| Error::Archive("outcome slots still shared after join".to_string()))?
            .into_inner();

        // A panicked worker leaves its slot empty; the report must still
        // cover every row.
        let outcomes: Vec<FetchOutcome> = slots
            .into_iter()
            .zip(records.iter())
            .map(|(slot, record)| {
                slot.unwrap_or_else(|| FetchOutcome::TransientFailure {
                    record: record.clone(),
                    reason: "worker task failed before producing an outcome".to_string(),
                    attempts: 0,
                })
            })
            .collect();

        let session = FetchSession {
            records,
            outcomes,
            started_at,
            completed_at: Utc::now(),
        };
        tracing::info!(
            ok = session.count(crate::types::RowStatus::Ok),
            total,
            "fetch run finished"
        );
        Ok(session)
    }

    async fn settle(
        &self,
        slots: &Mutex<Vec<Option<FetchOutcome>>>,
        index: usize,
        outcome: FetchOutcome,
    ) {
        let _ = self.events.send(PipelineEvent::RecordCompleted {
            row_index: outcome.record().row_index,
            identifier: outcome.record().identifier.clone(),
            status: outcome.status(),
        });
        slots.lock().await[index] = Some(outcome);
    }
}

/// Classify identifiers the API would never resolve
///
/// Returns the rejection reason, or `None` when the record should be sent
/// to the catalog.
fn validate_identifier(record: &IdentifierRecord) -> Option<String> {
    if record.is_blank() {
        return Some("identifier cell is blank".to_string());
    }
    if !record.identifier.chars().any(|c| c.is_ascii_digit()) {
        return Some(format!(
            "'{}' does not look like a product code",
            record.identifier
        ));
    }
    None
}

/// Resolve one record: rate-limited lookup plus fetch under one retry budget
///
/// The second element of the returned pair carries the message of an
/// authentication rejection, which the caller escalates to a run abort.
async fn resolve_record(
    client: &dyn IcrtClient,
    limiter: &RateLimiter,
    retry: &crate::config::RetryConfig,
    timeout: Duration,
    record: &IdentifierRecord,
) -> (FetchOutcome, Option<String>) {
    let identifier = record.identifier.clone();

    let result = with_retry(retry, || {
        let identifier = identifier.clone();
        async move {
            limiter.acquire().await;
            let reference = bounded(timeout, client.lookup(&identifier)).await?;
            limiter.acquire().await;
            bounded(timeout, client.fetch(&reference)).await
        }
    })
    .await;

    match result {
        Ok((image_bytes, content_type)) => (
            FetchOutcome::Success {
                record: record.clone(),
                image_bytes,
                content_type,
            },
            None,
        ),
        Err(RetryError {
            error: ClientError::NotFound { alternatives, .. },
            ..
        }) => (
            FetchOutcome::NotFound {
                record: record.clone(),
                reason: format!("no image in the catalog matches {identifier}"),
                alternatives,
            },
            None,
        ),
        Err(RetryError { error, attempts }) => {
            let auth_failure = match &error {
                ClientError::Auth(message) => Some(message.clone()),
                _ => None,
            };
            (
                FetchOutcome::TransientFailure {
                    record: record.clone(),
                    reason: error.to_string(),
                    attempts,
                },
                auth_failure,
            )
        }
    }
}

/// Bound a client call by the per-call timeout
async fn bounded<T, F>(timeout: Duration, call: F) -> std::result::Result<T, ClientError>
where
    F: Future<Output = std::result::Result<T, ClientError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Transient(format!(
            "call exceeded the {timeout:?} timeout"
        ))),
    }
}
