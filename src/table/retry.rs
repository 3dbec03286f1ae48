//! Partial-failure retry loop
//!
//! One logical batch call moves through `Submitting -> Evaluating` and then to
//! `Retrying`, `Succeeded` or `Failed`. Rounds are strictly sequential: round
//! `n + 1` is never submitted before round `n` has been evaluated, and a retry
//! round carries exactly the subset the previous round left unprocessed.

use aws_sdk_dynamodb::types::{ConsumedCapacity, WriteRequest};
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::error::{Error, ProviderError};
use crate::table::types::{BatchMetrics, Key, KeySchema};

/// A request element that can be resubmitted and reported back to the caller
pub(crate) trait Pending: Clone {
    /// Key identity reported in [`Error::unprocessed`]
    fn identity(&self, schema: &KeySchema) -> Key;
}

impl Pending for WriteRequest {
    fn identity(&self, schema: &KeySchema) -> Key {
        if let Some(put) = &self.put_request {
            return schema.project_lossy(&put.item);
        }
        self.delete_request
            .as_ref()
            .map(|delete| delete.key.clone())
            .unwrap_or_default()
    }
}

impl Pending for Key {
    fn identity(&self, _schema: &KeySchema) -> Key {
        self.clone()
    }
}

/// What one provider round produced
pub(crate) struct Submitted<R, O> {
    /// Elements the provider did not process
    pub(crate) unprocessed: Vec<R>,
    /// Data handed to the accept step, e.g. records read
    pub(crate) output: O,
    pub(crate) consumed_capacity: Vec<ConsumedCapacity>,
}

enum State<R, O> {
    Submitting(Vec<R>),
    Evaluating {
        sent: Vec<R>,
        response: Result<Submitted<R, O>, ProviderError>,
    },
    Retrying {
        pending: Vec<R>,
        cause: Option<ProviderError>,
    },
    Succeeded,
    Failed(Error),
}

/// Drive one logical batch call to a terminal state
///
/// `submit` performs a single provider round. `accept` consumes the output of
/// every successful round before its remainder is evaluated; an error from it
/// fails the call and must list every identity still pending, since the
/// round's remainder is not resubmitted. On success the backoff is reset for the next logical call.
pub(crate) async fn run<R, O, S, Fut, A>(
    schema: &KeySchema,
    initial: Vec<R>,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
    mut submit: S,
    mut accept: A,
) -> Result<BatchMetrics, Error>
where
    R: Pending,
    S: FnMut(Vec<R>) -> Fut,
    Fut: Future<Output = Result<Submitted<R, O>, ProviderError>>,
    A: FnMut(O) -> Result<(), Error>,
{
    let started = Instant::now();
    let mut metrics = BatchMetrics::default();

    let mut state = if initial.is_empty() {
        State::Succeeded
    } else {
        State::Submitting(initial)
    };

    loop {
        state = match state {
            State::Submitting(pending) => {
                if cancel.is_cancelled() {
                    State::Failed(Error::Cancelled {
                        unprocessed: identities(schema, &pending),
                    })
                } else {
                    metrics.submissions += 1;
                    tracing::debug!(
                        submission = metrics.submissions,
                        items = pending.len(),
                        "submitting batch"
                    );
                    let response = submit(pending.clone()).await;
                    State::Evaluating {
                        sent: pending,
                        response,
                    }
                }
            }
            State::Evaluating { sent, response } => match response {
                Ok(submitted) => {
                    metrics
                        .consumed_capacity
                        .extend(submitted.consumed_capacity);

                    match accept(submitted.output) {
                        Err(e) => State::Failed(e),
                        Ok(()) if submitted.unprocessed.is_empty() => State::Succeeded,
                        Ok(()) => State::Retrying {
                            pending: submitted.unprocessed,
                            cause: None,
                        },
                    }
                }
                // no response came back, so nothing in the round is known to be applied
                Err(source) if source.is_retryable() => {
                    tracing::debug!(error = %source, "transient provider error");
                    State::Retrying {
                        pending: sent,
                        cause: Some(source),
                    }
                }
                Err(source) => State::Failed(Error::Provider {
                    unprocessed: identities(schema, &sent),
                    source,
                }),
            },
            State::Retrying { pending, cause } => {
                let advanced = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    waited = backoff.advance() => Some(waited),
                };

                match advanced {
                    None => State::Failed(Error::Cancelled {
                        unprocessed: identities(schema, &pending),
                    }),
                    Some(Ok(wait)) => {
                        metrics.retry_count += 1;
                        metrics.waited += wait;
                        tracing::warn!(
                            attempt = backoff.attempt(),
                            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                            pending = pending.len(),
                            "retrying unprocessed items"
                        );
                        State::Submitting(pending)
                    }
                    Some(Err(exhausted)) => State::Failed(Error::RetriesExhausted {
                        attempts: exhausted.attempts,
                        waited: exhausted.elapsed,
                        source: cause,
                        unprocessed: identities(schema, &pending),
                    }),
                }
            }
            State::Succeeded => {
                backoff.reset();
                metrics.total_duration = started.elapsed();
                return Ok(metrics);
            }
            State::Failed(err) => {
                tracing::warn!(
                    error = %err,
                    unprocessed = err.unprocessed().len(),
                    submissions = metrics.submissions,
                    "batch call failed"
                );
                return Err(err);
            }
        };
    }
}

fn identities<R: Pending>(schema: &KeySchema, pending: &[R]) -> Vec<Key> {
    pending.iter().map(|p| p.identity(schema)).collect()
}
