//! Ephemeral per-request decision state and the attach/detach discipline.
//!
//! NoScript smuggled its decision context between the content-policy
//! check and the channel callbacks as expando properties on the host
//! request object. Here the same context lives in an explicit side
//! table, moving through an explicit machine:
//!
//! `Checking` (decision running) -> `Decided` (parked for the channel,
//! keyed by target URI) -> `Attached` (owned by a live request, keyed by
//! request id) -> detached.
//!
//! A `Checking` entry that survives to the next start of the same target
//! means the decision never resolved; the coordinator treats that as a
//! stuck check and aborts the request.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::warn;
use url::Url;

use crate::request::descriptor::{ContentKind, ContentRequest, ContextId, RequestId};

/// Marker carried by a decision that must be repeated as a frame check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StateExtra {
    #[default]
    None,
    /// Re-run the subdocument decision against the frame-context rule.
    FrameCheck,
}

/// Decision context that follows a request across redirect hops.
#[derive(Debug, Clone)]
pub struct PolicyState {
    pub kind: ContentKind,
    pub content_location: Url,
    pub request_origin: Option<Url>,
    pub context: Option<ContextId>,
    pub mime: Option<String>,
    pub extra: StateExtra,
}

impl PolicyState {
    pub fn new(kind: ContentKind, content_location: Url) -> Self {
        PolicyState {
            kind,
            content_location,
            request_origin: None,
            context: None,
            mime: None,
            extra: StateExtra::None,
        }
    }

    /// The decision-function view of this state, used when a hop must be
    /// re-validated.
    pub fn to_request(&self) -> ContentRequest {
        ContentRequest {
            kind: self.kind,
            url: self.content_location.clone(),
            origin: self.request_origin.clone(),
            context: self.context,
            mime: self.mime.clone(),
        }
    }
}

impl From<&ContentRequest> for PolicyState {
    fn from(request: &ContentRequest) -> Self {
        PolicyState {
            kind: request.kind,
            content_location: request.url.clone(),
            request_origin: request.origin.clone(),
            context: request.context,
            mime: request.mime.clone(),
            extra: StateExtra::None,
        }
    }
}

/// Where a request currently stands in the check machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPhase {
    /// The decision function is running for this target.
    Checking,
    /// A decision was made but no channel has claimed it yet.
    Decided,
    /// The decision context is attached to a live request.
    Attached,
}

/// Result of claiming decided state for a started request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached,
    /// No decision was parked for that URI; the load never went through
    /// the content gate (non-policy load) and carries no state.
    NoPending,
}

/// Side table mapping in-flight requests to their [`PolicyState`].
///
/// Attach and detach counters are kept so callers can assert the leak
/// invariant: after all requests resolve, every attach has a matching
/// detach and no state remains live.
#[derive(Debug, Default)]
pub struct PolicyStateTable {
    checking: DashMap<String, PolicyState>,
    decided: DashMap<String, PolicyState>,
    attached: DashMap<u64, PolicyState>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl PolicyStateTable {
    pub fn new() -> Self {
        PolicyStateTable::default()
    }

    /// Marks a decision as running for `uri`.
    pub fn begin_check(&self, uri: &Url, state: PolicyState) {
        self.checking.insert(uri.as_str().to_owned(), state);
    }

    /// True while a decision for `uri` has started and not resolved.
    pub fn is_checking(&self, uri: &Url) -> bool {
        self.checking.contains_key(uri.as_str())
    }

    /// Force-removes an unresolved decision, returning it when present.
    pub fn remove_check(&self, uri: &Url) -> Option<PolicyState> {
        self.checking.remove(uri.as_str()).map(|(_, state)| state)
    }

    /// Resolves the running decision for `uri` as allowed, parking its
    /// state for the channel that is about to start.
    pub fn finish_check(&self, uri: &Url) -> bool {
        match self.checking.remove(uri.as_str()) {
            Some((key, state)) => {
                self.decided.insert(key, state);
                true
            }
            None => false,
        }
    }

    /// Moves the parked decision for `uri` onto request `id`.
    pub fn attach(&self, id: RequestId, uri: &Url) -> AttachOutcome {
        let Some((_, state)) = self.decided.remove(uri.as_str()) else {
            return AttachOutcome::NoPending;
        };
        if self.attached.insert(id.0, state).is_some() {
            // Attach-once per hop is the contract; a duplicate means the
            // adapter reused an id without an intervening detach.
            debug_assert!(false, "re-attach for live request {}", id.0);
            warn!(id = id.0, "policy state re-attached for a live request");
        } else {
            self.attaches.fetch_add(1, Ordering::Relaxed);
        }
        AttachOutcome::Attached
    }

    /// Parks redirect-carried state under the new hop's URI.
    pub fn restore_pending(&self, uri: &Url, state: PolicyState) {
        self.decided.insert(uri.as_str().to_owned(), state);
    }

    /// Peeks at the state attached to `id` without consuming it.
    pub fn extract(&self, id: RequestId) -> Option<PolicyState> {
        self.attached.get(&id.0).map(|entry| entry.value().clone())
    }

    /// Removes and returns the state attached to `id`. Idempotent: a
    /// second detach for the same id returns `None` and counts nothing.
    pub fn detach(&self, id: RequestId) -> Option<PolicyState> {
        let removed = self.attached.remove(&id.0).map(|(_, state)| state);
        if removed.is_some() {
            self.detaches.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn phase_of(&self, id: RequestId, uri: &Url) -> Option<CheckPhase> {
        if self.attached.contains_key(&id.0) {
            Some(CheckPhase::Attached)
        } else if self.decided.contains_key(uri.as_str()) {
            Some(CheckPhase::Decided)
        } else if self.checking.contains_key(uri.as_str()) {
            Some(CheckPhase::Checking)
        } else {
            None
        }
    }

    /// Number of requests currently holding attached state.
    pub fn live(&self) -> usize {
        self.attached.len()
    }

    /// Number of decisions parked and waiting for their channel.
    pub fn pending_len(&self) -> usize {
        self.decided.len()
    }

    pub fn checking_len(&self) -> usize {
        self.checking.len()
    }

    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::Relaxed)
    }

    pub fn detach_count(&self) -> usize {
        self.detaches.load(Ordering::Relaxed)
    }

    /// Clears unresolved checks, as at the end of a callback turn.
    pub fn reset(&self) {
        self.checking.clear();
    }

    /// Clears everything not attached to a live request.
    pub fn clear_parked(&self) {
        self.checking.clear();
        self.decided.clear();
    }
}
