//! PO fan-out
//!
//! Resolves every PO of one stop concurrently. Each PO runs in its own task
//! on a private copy; a semaphore bounds how many resolve at once. The
//! executor joins on all tasks before merging, so the returned map always
//! has exactly one entry per input PO, and the aggregated escalation reason
//! follows input order rather than completion order.

use crate::config::EngineConfig;
use crate::error::{PoFailure, StopError};
use crate::model::{PoState, PurchaseOrder};
use crate::po::{PoOutcome, PoResolver};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stop reason used when POs escalated without leaving any message
pub const FALLBACK_ESCALATION_REASON: &str = "One or more POs escalated";

/// Merged result of one fan-out batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutResult {
    /// `po_num` -> result label
    pub results: BTreeMap<String, PoState>,
    /// Per-PO outcomes in input order
    pub outcomes: Vec<PoOutcome>,
    pub is_escalated: bool,
    pub escalation_reason: Option<String>,
}

impl FanOutResult {
    /// Merge outcomes that are already in input order
    pub fn aggregate(outcomes: Vec<PoOutcome>) -> Self {
        let results = outcomes
            .iter()
            .map(|outcome| (outcome.po.po_num.clone(), outcome.result))
            .collect();

        let is_escalated = outcomes.iter().any(PoOutcome::is_escalated);
        let escalation_reason = is_escalated.then(|| {
            let messages: Vec<&str> = outcomes
                .iter()
                .filter_map(|outcome| outcome.escalation_message.as_deref())
                .filter(|message| !message.is_empty())
                .collect();
            if messages.is_empty() {
                FALLBACK_ESCALATION_REASON.to_string()
            } else {
                messages.join("; ")
            }
        });

        Self {
            results,
            outcomes,
            is_escalated,
            escalation_reason,
        }
    }

    /// Updated POs in input order
    pub fn pos(&self) -> Vec<PurchaseOrder> {
        self.outcomes.iter().map(|outcome| outcome.po.clone()).collect()
    }
}

/// Concurrent executor of [`PoResolver`] runs
#[derive(Debug, Clone)]
pub struct PoFanOut {
    resolver: PoResolver,
    max_concurrency: usize,
    stop_timeout: Option<Duration>,
}

impl PoFanOut {
    pub fn new(resolver: PoResolver, config: &EngineConfig) -> Self {
        Self {
            resolver,
            max_concurrency: config.max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
            stop_timeout: config.stop_timeout(),
        }
    }

    /// Resolve all `pos` of stop `stop_id`
    ///
    /// A failing PO is reported in its own outcome and never affects its
    /// siblings. The batch as a whole fails only when `cancel` fires or the
    /// stop deadline passes; outstanding PO tasks are aborted in both cases.
    pub async fn run(
        &self,
        stop_id: i64,
        pos: Vec<PurchaseOrder>,
        cancel: &CancellationToken,
    ) -> Result<FanOutResult, StopError> {
        if pos.is_empty() {
            debug!(stop_id, "No POs to resolve");
            return Ok(FanOutResult::default());
        }

        info!(
            stop_id,
            po_count = pos.len(),
            max_concurrency = self.max_concurrency,
            "Resolving POs"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let batch = cancel.child_token();

        let mut inputs = Vec::with_capacity(pos.len());
        let mut handles = Vec::with_capacity(pos.len());
        for po in pos {
            let semaphore = semaphore.clone();
            let resolver = self.resolver.clone();
            let token = batch.clone();
            let input = po.clone();

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return PoOutcome::failed(input, PoFailure::Cancelled),
                };
                resolver.resolve(input, token).await
            }));
            inputs.push(po);
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let abort_all = || {
            batch.cancel();
            semaphore.close();
            for handle in &aborts {
                handle.abort();
            }
        };

        let deadline = async {
            match self.stop_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(stop_id, "Stop cancelled, aborting PO tasks");
                abort_all();
                return Err(StopError::Cancelled { stop_id });
            }
            _ = deadline => {
                let after = self.stop_timeout.unwrap_or_default();
                warn!(stop_id, ?after, "Stop deadline exceeded, aborting PO tasks");
                abort_all();
                return Err(StopError::Timeout { stop_id, after });
            }
            joined = join_all(handles) => joined,
        };

        let outcomes = inputs
            .into_iter()
            .zip(joined)
            .map(|(input, joined)| match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(stop_id, po = %input.po_num, error = %err, "PO task failed");
                    PoOutcome::failed(
                        input,
                        PoFailure::Unexpected {
                            message: describe_join_error(&err),
                        },
                    )
                }
            })
            .collect();

        let result = FanOutResult::aggregate(outcomes);
        debug!(stop_id, escalated = result.is_escalated, "PO batch joined");
        Ok(result)
    }
}

fn describe_join_error(err: &JoinError) -> String {
    if err.is_panic() {
        "PO task panicked".to_string()
    } else {
        err.to_string()
    }
}
