//! PO resolver
//!
//! Lowest level of the hierarchy. Each purchase order runs through a small
//! state graph of its own:
//!
//! ```text
//! START ──► po_processor ──┬── "complete" ───────────────► END
//!                          ├── "needs_review" ──► po_review ◄─┐
//!                          │                        │         │
//!                          │                        ├── "needs_review"
//!                          │                        ├── "complete" ──► END
//!                          │                        ├── "exhausted" ─► END
//!                          │                        └── "failed" ────► END
//! ```
//!
//! `po_processor` applies the deterministic transition for the PO's state.
//! Escalated POs then loop through `po_review`, asking the [`Reviewer`] until
//! a reply is acceptable, the attempt budget runs out, or the reviewer fails.

use crate::config::EngineConfig;
use crate::error::{PoFailure, ReviewError};
use crate::model::{PoState, PurchaseOrder};
use crate::reviewer::{is_acceptable, ReviewRequest, Reviewer};
use hubflow_graph::{CompiledGraph, StateGraph, END, START};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Node names of the PO graph
pub const PO_PROCESSOR: &str = "po_processor";
pub const PO_REVIEW: &str = "po_review";

/// Reason given to escalated POs that arrive without one
pub const DEFAULT_ESCALATION_REASON: &str = "PO requires manual review";

/// Run state threaded through the PO graph
#[derive(Debug, Clone, Serialize)]
pub struct PoRunState {
    pub po: PurchaseOrder,
    pub processing_result: PoState,
    pub needs_review: bool,
    pub escalation_message: Option<String>,
    pub review_attempts: u32,
    pub failure: Option<PoFailure>,
    #[serde(skip)]
    cancel: CancellationToken,
}

impl PoRunState {
    pub fn new(po: PurchaseOrder, cancel: CancellationToken) -> Self {
        Self {
            processing_result: po.po_state,
            po,
            needs_review: false,
            escalation_message: None,
            review_attempts: 0,
            failure: None,
            cancel,
        }
    }
}

/// Final result of resolving one PO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoOutcome {
    /// The PO after processing
    pub po: PurchaseOrder,
    /// Result label recorded in the stop's result map
    pub result: PoState,
    pub needs_review: bool,
    pub escalation_message: Option<String>,
    pub review_attempts: u32,
    /// Set when the PO could not be resolved normally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<PoFailure>,
}

impl PoOutcome {
    /// True if this PO keeps its stop escalated
    pub fn is_escalated(&self) -> bool {
        self.needs_review || self.result == PoState::Escalated
    }

    /// Outcome for a PO whose resolution failed outside the graph
    ///
    /// The label stays at the PO's last known state and the PO is flagged
    /// for review.
    pub fn failed(mut po: PurchaseOrder, failure: PoFailure) -> Self {
        po.is_escalated = po.po_state == PoState::Escalated;
        if po.is_escalated && po.escalation_reason.is_none() {
            po.escalation_reason = Some(DEFAULT_ESCALATION_REASON.to_string());
        }
        Self {
            result: po.po_state,
            needs_review: true,
            escalation_message: Some(format!("PO {}: {}", po.po_num, failure)),
            review_attempts: 0,
            failure: Some(failure),
            po,
        }
    }
}

impl From<PoRunState> for PoOutcome {
    fn from(state: PoRunState) -> Self {
        Self {
            po: state.po,
            result: state.processing_result,
            needs_review: state.needs_review,
            escalation_message: state.escalation_message,
            review_attempts: state.review_attempts,
            failure: state.failure,
        }
    }
}

/// Deterministic transition on the PO's state
pub fn process_po(mut state: PoRunState) -> PoRunState {
    let po = &mut state.po;
    debug!(po = %po.po_num, state = %po.po_state, "Processing PO");

    match po.po_state {
        PoState::Escalated => {
            po.is_escalated = true;
            let reason = po
                .escalation_reason
                .get_or_insert_with(|| DEFAULT_ESCALATION_REASON.to_string())
                .clone();
            warn!(po = %po.po_num, reason = %reason, "PO is escalated");

            state.escalation_message = Some(format!("PO {}: {}", po.po_num, reason));
            state.processing_result = PoState::Escalated;
            state.needs_review = true;
        }
        PoState::Pending | PoState::Scheduled => {
            po.is_escalated = false;
            po.escalation_reason = None;

            state.processing_result = po.po_state;
            state.needs_review = false;
            state.escalation_message = None;
        }
    }

    state
}

/// Route after either PO node
pub fn route_po(state: &PoRunState, max_review_attempts: u32) -> String {
    let label = if state.failure.is_some() {
        "failed"
    } else if !state.needs_review {
        "complete"
    } else if state.review_attempts >= max_review_attempts {
        "exhausted"
    } else {
        "needs_review"
    };
    label.to_string()
}

/// Call the reviewer, bounded by the optional deadline and the run's token
async fn request_review(
    reviewer: &dyn Reviewer,
    request: &ReviewRequest,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<String, ReviewError> {
    let call = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, reviewer.review(request)).await {
                Ok(result) => result,
                Err(_elapsed) => Err(ReviewError::Timeout(limit)),
            },
            None => reviewer.review(request).await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ReviewError::Cancelled),
        result = call => result,
    }
}

/// Settings the review loop needs
#[derive(Debug, Clone, Copy)]
struct ReviewPolicy {
    max_attempts: u32,
    timeout: Option<Duration>,
}

async fn review_po(
    mut state: PoRunState,
    reviewer: Arc<dyn Reviewer>,
    policy: ReviewPolicy,
) -> PoRunState {
    state.review_attempts += 1;
    let request = ReviewRequest {
        po_num: state.po.po_num.clone(),
        po_state: state.po.po_state,
        escalation_reason: state.po.escalation_reason.clone(),
        attempt: state.review_attempts,
    };
    info!(
        po = %request.po_num,
        attempt = request.attempt,
        reason = request.escalation_reason.as_deref().unwrap_or_default(),
        "Requesting review for escalated PO"
    );

    match request_review(reviewer.as_ref(), &request, policy.timeout, &state.cancel).await {
        Ok(response) if is_acceptable(&response) => {
            info!(po = %state.po.po_num, "Review accepted, escalation resolved");
            if state.po.po_state == PoState::Escalated {
                state.po.po_state = PoState::Scheduled;
            }
            state.po.is_escalated = false;
            state.po.escalation_reason = None;
            state.processing_result = PoState::Scheduled;
            state.needs_review = false;
            state.escalation_message = None;
        }
        Ok(response) => {
            let response = response.trim();
            state.processing_result = PoState::Escalated;
            state.needs_review = true;
            state.escalation_message = if state.review_attempts >= policy.max_attempts {
                warn!(
                    po = %state.po.po_num,
                    attempts = state.review_attempts,
                    "Review attempts exhausted"
                );
                Some(format!(
                    "PO {} unresolved after {} review attempts. Last reviewer response: {}",
                    state.po.po_num, state.review_attempts, response
                ))
            } else {
                debug!(po = %state.po.po_num, "Review not acceptable, asking again");
                Some(format!(
                    "PO {} requires additional review. Reviewer response: {}",
                    state.po.po_num, response
                ))
            };
        }
        Err(err) => {
            warn!(po = %state.po.po_num, error = %err, "Review failed");
            let failure = PoFailure::from(err);
            state.processing_result = PoState::Escalated;
            state.needs_review = true;
            state.escalation_message = Some(format!("PO {}: {}", state.po.po_num, failure));
            state.failure = Some(failure);
        }
    }

    state
}

/// Runs the PO graph for one purchase order at a time
#[derive(Clone)]
pub struct PoResolver {
    graph: CompiledGraph<PoRunState>,
}

impl std::fmt::Debug for PoResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoResolver")
            .field("graph", &self.graph.name())
            .finish()
    }
}

impl PoResolver {
    /// Compile the PO graph around `reviewer`
    pub fn new(reviewer: Arc<dyn Reviewer>, config: &EngineConfig) -> hubflow_graph::Result<Self> {
        let policy = ReviewPolicy {
            max_attempts: config.max_review_attempts,
            timeout: config.review_timeout(),
        };
        let max_attempts = policy.max_attempts;

        let mut graph = StateGraph::<PoRunState>::new("po");
        graph.add_node(PO_PROCESSOR, |state: PoRunState| async move { Ok(process_po(state)) });
        graph.add_node(PO_REVIEW, move |state: PoRunState| {
            let reviewer = reviewer.clone();
            async move { Ok(review_po(state, reviewer, policy).await) }
        });

        let branches = |review: &'static str| {
            [
                ("needs_review", review),
                ("complete", END),
                ("exhausted", END),
                ("failed", END),
            ]
        };

        graph.add_edge(START, PO_PROCESSOR);
        graph.add_conditional_edge(
            PO_PROCESSOR,
            move |state: &PoRunState| route_po(state, max_attempts),
            branches(PO_REVIEW),
        );
        graph.add_conditional_edge(
            PO_REVIEW,
            move |state: &PoRunState| route_po(state, max_attempts),
            branches(PO_REVIEW),
        );

        Ok(Self {
            graph: graph.compile()?,
        })
    }

    pub fn graph(&self) -> &CompiledGraph<PoRunState> {
        &self.graph
    }

    /// Resolve one PO. Never fails: problems are reported in the outcome.
    pub async fn resolve(&self, po: PurchaseOrder, cancel: CancellationToken) -> PoOutcome {
        let fallback = po.clone();
        match self.graph.invoke(PoRunState::new(po, cancel)).await {
            Ok(state) => PoOutcome::from(state),
            Err(err) => {
                warn!(po = %fallback.po_num, error = %err, "PO graph failed");
                PoOutcome::failed(
                    fallback,
                    PoFailure::Unexpected {
                        message: err.to_string(),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviewer::{ScriptedReviewer, StaticReviewer};
    use async_trait::async_trait;

    fn resolver(reviewer: Arc<dyn Reviewer>, config: EngineConfig) -> PoResolver {
        PoResolver::new(reviewer, &config).unwrap()
    }

    #[test]
    fn test_scheduled_and_pending_clear_escalation() {
        for po_state in [PoState::Scheduled, PoState::Pending] {
            let mut po = PurchaseOrder::new("PO-1", po_state).with_reason("stale");
            po.is_escalated = true;

            let state = process_po(PoRunState::new(po, CancellationToken::new()));
            assert_eq!(state.processing_result, po_state);
            assert!(!state.needs_review);
            assert!(!state.po.is_escalated);
            assert!(state.po.escalation_reason.is_none());
            assert!(state.escalation_message.is_none());
        }
    }

    #[test]
    fn test_escalated_without_reason_gets_default() {
        let po = PurchaseOrder::new("PO-9", PoState::Escalated);
        let state = process_po(PoRunState::new(po, CancellationToken::new()));

        assert!(state.needs_review);
        assert!(state.po.is_escalated);
        assert_eq!(
            state.po.escalation_reason.as_deref(),
            Some(DEFAULT_ESCALATION_REASON)
        );
        assert_eq!(
            state.escalation_message.as_deref(),
            Some("PO PO-9: PO requires manual review")
        );
    }

    #[tokio::test]
    async fn test_approval_resolves_after_one_call() {
        let reviewer = Arc::new(ScriptedReviewer::new(["approve"], "reject"));
        let outcome = resolver(reviewer.clone(), EngineConfig::default())
            .resolve(
                PurchaseOrder::new("PO-D", PoState::Escalated).with_reason("Late"),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(reviewer.call_count(), 1);
        assert_eq!(outcome.result, PoState::Scheduled);
        assert_eq!(outcome.po.po_state, PoState::Scheduled);
        assert!(!outcome.po.is_escalated);
        assert!(outcome.po.escalation_reason.is_none());
        assert!(!outcome.is_escalated());
    }

    #[tokio::test]
    async fn test_rejection_loops_until_approval() {
        let reviewer = Arc::new(ScriptedReviewer::new(["reject", "reject", "ok"], "reject"));
        let outcome = resolver(reviewer.clone(), EngineConfig::default())
            .resolve(
                PurchaseOrder::new("PO-D", PoState::Escalated),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(reviewer.call_count(), 3);
        assert_eq!(outcome.review_attempts, 3);
        assert_eq!(outcome.result, PoState::Scheduled);
        let attempts: Vec<u32> = reviewer.requests().iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_attempt_budget_leaves_po_escalated() {
        let reviewer = Arc::new(StaticReviewer::rejecting());
        let outcome = resolver(
            reviewer,
            EngineConfig::default().with_max_review_attempts(2),
        )
        .resolve(
            PurchaseOrder::new("PO-X", PoState::Escalated),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.review_attempts, 2);
        assert_eq!(outcome.result, PoState::Escalated);
        assert!(outcome.po.is_escalated);
        assert!(outcome.failure.is_none());
        let message = outcome.escalation_message.unwrap();
        assert!(message.contains("unresolved after 2 review attempts"));
        assert!(message.ends_with("reject"));
    }

    #[tokio::test]
    async fn test_reviewer_error_is_reported_not_raised() {
        let reviewer = Arc::new(ScriptedReviewer::with_results(
            [Err(ReviewError::Unavailable("inbox offline".to_string()))],
            Ok("approve".to_string()),
        ));
        let outcome = resolver(reviewer.clone(), EngineConfig::default())
            .resolve(
                PurchaseOrder::new("PO-E", PoState::Escalated),
                CancellationToken::new(),
            )
            .await;

        assert_eq!(reviewer.call_count(), 1);
        assert_eq!(outcome.result, PoState::Escalated);
        assert!(outcome.is_escalated());
        assert_eq!(
            outcome.failure,
            Some(PoFailure::ReviewerUnavailable {
                message: "inbox offline".to_string()
            })
        );
    }

    struct NeverAnswers;

    #[async_trait]
    impl Reviewer for NeverAnswers {
        async fn review(&self, _request: &ReviewRequest) -> Result<String, ReviewError> {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
            Ok("approve".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_timeout_marks_po_unresolved() {
        let outcome = resolver(
            Arc::new(NeverAnswers),
            EngineConfig::default().with_review_timeout(Duration::from_secs(5)),
        )
        .resolve(
            PurchaseOrder::new("PO-T", PoState::Escalated),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(outcome.result, PoState::Escalated);
        assert_eq!(outcome.failure, Some(PoFailure::ReviewTimeout { after_ms: 5000 }));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_review_wait() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = resolver(Arc::new(NeverAnswers), EngineConfig::default())
            .resolve(PurchaseOrder::new("PO-C", PoState::Escalated), cancel)
            .await;

        assert_eq!(outcome.failure, Some(PoFailure::Cancelled));
        assert_eq!(outcome.result, PoState::Escalated);
    }

    #[tokio::test]
    async fn test_non_escalated_po_never_calls_reviewer() {
        let reviewer = Arc::new(ScriptedReviewer::new(Vec::<String>::new(), "approve"));
        let resolver = resolver(reviewer.clone(), EngineConfig::default());

        for po_state in [PoState::Scheduled, PoState::Pending] {
            let outcome = resolver
                .resolve(PurchaseOrder::new("PO-1", po_state), CancellationToken::new())
                .await;
            assert_eq!(outcome.result, po_state);
        }
        assert_eq!(reviewer.call_count(), 0);
    }

    #[test]
    fn test_failed_outcome_preserves_label() {
        let outcome = PoOutcome::failed(
            PurchaseOrder::new("PO-P", PoState::Pending),
            PoFailure::Unexpected {
                message: "worker panicked".to_string(),
            },
        );
        assert_eq!(outcome.result, PoState::Pending);
        assert!(outcome.is_escalated());
        assert!(!outcome.po.is_escalated);
    }
}
