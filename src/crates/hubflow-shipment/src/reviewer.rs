//! Reviewer capability
//!
//! Escalated POs are resolved by asking an external party for a decision.
//! The engine only sees the [`Reviewer`] trait: a human at a console, an
//! automated classifier and a test stub all look the same. Replies are free
//! text; [`is_acceptable`] decides whether a reply approves the PO.

use crate::error::ReviewError;
use crate::model::PoState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Terms that mark a reviewer reply as an approval
pub const APPROVAL_TERMS: [&str; 8] = [
    "approve",
    "accept",
    "schedule",
    "looks good",
    "ok",
    "yes",
    "proceed",
    "continue",
];

/// Returns true if `response` contains any approval term, ignoring case
///
/// ```rust
/// use hubflow_shipment::reviewer::is_acceptable;
///
/// assert!(is_acceptable("Approved by dock manager"));
/// assert!(is_acceptable("LOOKS GOOD to me"));
/// assert!(!is_acceptable("reject"));
/// ```
pub fn is_acceptable(response: &str) -> bool {
    let normalized = response.to_lowercase();
    APPROVAL_TERMS.iter().any(|term| normalized.contains(term))
}

/// What the reviewer is asked about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub po_num: String,
    pub po_state: PoState,
    pub escalation_reason: Option<String>,
    /// 1 for the first review of this PO, 2 for the retry after a rejection, ...
    pub attempt: u32,
}

/// External decision capability for escalated POs
///
/// Implementations may block for as long as a human takes to answer. The
/// engine bounds the wait with `review_timeout_secs` and cancels it when the
/// run is cancelled.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Ask for a decision on one escalated PO
    async fn review(&self, request: &ReviewRequest) -> Result<String, ReviewError>;
}

/// Reviewer that always gives the same reply
#[derive(Debug, Clone)]
pub struct StaticReviewer {
    reply: String,
}

impl StaticReviewer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }

    /// Approves every PO
    pub fn approving() -> Self {
        Self::new("approve")
    }

    /// Rejects every PO
    pub fn rejecting() -> Self {
        Self::new("reject")
    }
}

#[async_trait]
impl Reviewer for StaticReviewer {
    async fn review(&self, _request: &ReviewRequest) -> Result<String, ReviewError> {
        Ok(self.reply.clone())
    }
}

/// Reviewer that replays a fixed script of replies
///
/// Once the script runs out every further call gets `fallback`. Every
/// request is recorded, so tests can count and inspect reviewer calls.
#[derive(Debug)]
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<Result<String, ReviewError>>>,
    fallback: Result<String, ReviewError>,
    requests: Mutex<Vec<ReviewRequest>>,
}

impl ScriptedReviewer {
    pub fn new<I, T>(replies: I, fallback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: Ok(fallback.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script whose entries may also be errors
    pub fn with_results<I>(replies: I, fallback: Result<String, ReviewError>) -> Self
    where
        I: IntoIterator<Item = Result<String, ReviewError>>,
    {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<ReviewRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Number of reviewer calls so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(&self, request: &ReviewRequest) -> Result<String, ReviewError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());

        next.unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn request(attempt: u32) -> ReviewRequest {
        ReviewRequest {
            po_num: "PO-1".to_string(),
            po_state: PoState::Escalated,
            escalation_reason: Some("Dock closed".to_string()),
            attempt,
        }
    }

    #[test]
    fn test_vocabulary() {
        for reply in [
            "approve",
            "Accepted",
            "please schedule it",
            "ok",
            "Yes",
            "proceed",
            "Continue",
        ] {
            assert!(is_acceptable(reply), "{} should be acceptable", reply);
        }
        for reply in ["reject", "no", "denied", ""] {
            assert!(!is_acceptable(reply), "{} should not be acceptable", reply);
        }
    }

    #[tokio::test]
    async fn test_scripted_reviewer_replays_then_falls_back() {
        let reviewer = ScriptedReviewer::new(["reject", "approve"], "reject");

        assert_eq!(reviewer.review(&request(1)).await.unwrap(), "reject");
        assert_eq!(reviewer.review(&request(2)).await.unwrap(), "approve");
        assert_eq!(reviewer.review(&request(3)).await.unwrap(), "reject");

        let attempts: Vec<u32> = reviewer.requests().iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_scripted_reviewer_errors() {
        let reviewer = ScriptedReviewer::with_results(
            [Err(ReviewError::Unavailable("mailbox down".to_string()))],
            Ok("yes".to_string()),
        );

        assert!(reviewer.review(&request(1)).await.is_err());
        assert_eq!(reviewer.review(&request(2)).await.unwrap(), "yes");
        assert_eq!(reviewer.call_count(), 2);
    }

    proptest! {
        #[test]
        fn prop_embedded_term_is_acceptable(
            prefix in "[a-z ]{0,12}",
            suffix in "[a-z ]{0,12}",
            idx in 0usize..8,
        ) {
            let reply = format!("{}{}{}", prefix, APPROVAL_TERMS[idx].to_uppercase(), suffix);
            prop_assert!(is_acceptable(&reply));
        }

        #[test]
        fn prop_digits_only_never_acceptable(reply in "[0-9 ]{0,24}") {
            prop_assert!(!is_acceptable(&reply));
        }
    }
}
