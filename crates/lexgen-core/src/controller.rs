//! Query lifecycle: optimistic history insert, fixed-delay retry, result
//! merge.
//!
//! The controller is the only writer of the chat log and the current query
//! state. Both live inside a `watch` channel so front ends can hold a
//! receiver and redraw from read-only [`Snapshot`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::QueryBackend;
use crate::error::QueryError;
use crate::query::{Category, Query, QueryResult};
use crate::state::{EntryId, QueryState, Snapshot};

pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Linear retry: a fixed number of retries separated by a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

/// Retry bookkeeping for one in-flight query. `attempt` counts retries
/// already issued and never exceeds `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max: u32,
}

impl RetryState {
    pub fn new(max: u32) -> Self {
        Self { attempt: 0, max }
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max
    }

    /// Count one more retry. Returns false once the budget is spent.
    pub fn advance(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.attempt += 1;
        true
    }
}

pub struct QueryController {
    backend: Arc<dyn QueryBackend>,
    policy: RetryPolicy,
    next_entry: AtomicU64,
    state: watch::Sender<Snapshot>,
}

impl QueryController {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self::with_policy(backend, RetryPolicy::default())
    }

    pub fn with_policy(backend: Arc<dyn QueryBackend>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(Snapshot::default());
        Self {
            backend,
            policy,
            next_entry: AtomicU64::new(1),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    pub fn backend(&self) -> Arc<dyn QueryBackend> {
        self.backend.clone()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one query to completion.
    ///
    /// Callers serialize submissions; nothing here guards against a second
    /// submit while one is still retrying. Blank text is rejected without
    /// touching state or the network.
    pub async fn submit(
        &self,
        text: &str,
        category: Category,
        use_web: bool,
    ) -> Result<QueryResult, QueryError> {
        let query = Query::new(text, category, use_web)?;
        let entry = EntryId(self.next_entry.fetch_add(1, Ordering::Relaxed));

        self.state.send_modify(|snapshot| {
            snapshot.chat_log.push_pending(entry, query.clone());
            snapshot.state = QueryState::Pending { entry, attempt: 0 };
        });
        info!(%entry, category = category.as_str(), use_web, "query submitted");

        let mut retry = RetryState::new(self.policy.max_retries);
        loop {
            let outcome = self.backend.query(&query).await;
            let err = match outcome.and_then(|payload| payload.validate()) {
                Ok(result) => {
                    self.state.send_modify(|snapshot| {
                        snapshot.chat_log.resolve(entry, result.clone());
                        snapshot.state = QueryState::Succeeded(result.clone());
                    });
                    info!(%entry, retries = retry.attempt, "query answered");
                    return Ok(result);
                }
                Err(err) => err,
            };

            if err.is_retryable() && retry.can_retry() {
                warn!(%entry, attempt = retry.attempt, error = %err, "query failed, retrying");
                tokio::time::sleep(self.policy.delay).await;
                retry.advance();
                self.state.send_modify(|snapshot| {
                    snapshot.state = QueryState::Pending {
                        entry,
                        attempt: retry.attempt,
                    };
                });
                continue;
            }

            error!(%entry, retries = retry.attempt, error = %err, "query failed");
            self.state.send_modify(|snapshot| {
                snapshot.state = QueryState::Failed {
                    error: err.clone(),
                    attempts: retry.attempt,
                };
            });
            return Err(err);
        }
    }
}
