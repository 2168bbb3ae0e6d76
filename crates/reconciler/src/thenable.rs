//! Indexed tracking of deferred children within one reconciliation attempt.
//!
//! The N-th unwrap of an attempt is answered from the deferred tracked at
//! position N, even when the caller passes a different (recreated) deferred.
//! Replaying a suspended attempt therefore observes the same values in the same
//! order. Tracking is cleared once an attempt completes, and when an attempt
//! starts for a different parent than the one that suspended.

use crate::deferred::{Deferred, DeferredStatus};
use crate::error::{ReconcileError, Unwind};
use crate::tree::NodeId;
use std::any::Any;

#[derive(Default)]
pub(crate) struct ThenableState {
    tracked: Vec<Box<dyn Any>>,
    index: usize,
    owner: Option<NodeId>,
}

impl ThenableState {
    pub(crate) fn begin_attempt(&mut self, owner: NodeId) {
        if self.owner != Some(owner) {
            self.tracked.clear();
            self.owner = Some(owner);
        }
        self.index = 0;
    }

    pub(crate) fn clear(&mut self) {
        self.tracked.clear();
        self.index = 0;
        self.owner = None;
    }

    pub(crate) fn tracked_len(&self) -> usize {
        self.tracked.len()
    }

    pub(crate) fn unwrap<T: Clone + 'static>(&mut self, deferred: &Deferred<T>) -> Result<T, Unwind> {
        let slot = self.index;
        self.index += 1;

        let previous = self
            .tracked
            .get(slot)
            .and_then(|entry| entry.downcast_ref::<Deferred<T>>())
            .cloned();
        let tracked = match previous {
            Some(previous) => {
                if !previous.ptr_eq(deferred) {
                    log::trace!(
                        target: "reconciler.children",
                        "deferred at slot {slot} was recreated; reusing the tracked one"
                    );
                }
                previous
            }
            None => {
                let entry: Box<dyn Any> = Box::new(deferred.clone());
                if slot < self.tracked.len() {
                    self.tracked[slot] = entry;
                } else {
                    self.tracked.push(entry);
                }
                deferred.clone()
            }
        };

        match tracked.status() {
            DeferredStatus::Fulfilled(value) => Ok(value),
            DeferredStatus::Rejected(reason) => Err(ReconcileError::Rejected(reason).into()),
            DeferredStatus::Pending => Err(Unwind::Suspend(tracked.wakeable())),
        }
    }
}

impl std::fmt::Debug for ThenableState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThenableState")
            .field("tracked", &self.tracked.len())
            .field("index", &self.index)
            .field("owner", &self.owner)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeTag, PendingProps, RenderNode};
    use crate::tree::RenderTree;

    fn owners() -> (NodeId, NodeId) {
        let mut tree = RenderTree::new();
        let a = tree.alloc(RenderNode::new(NodeTag::Host, None, PendingProps::Empty));
        let b = tree.alloc(RenderNode::new(NodeTag::Host, None, PendingProps::Empty));
        (a, b)
    }

    #[test]
    fn replay_reuses_deferred_by_position() {
        let (owner, _) = owners();
        let mut state = ThenableState::default();
        let first = Deferred::<u32>::pending();
        state.begin_attempt(owner);
        assert!(matches!(state.unwrap(&first), Err(Unwind::Suspend(_))));

        first.resolve(7);
        let recreated = Deferred::<u32>::pending();
        state.begin_attempt(owner);
        assert_eq!(state.unwrap(&recreated).ok(), Some(7));
        assert_eq!(state.tracked_len(), 1);
    }

    #[test]
    fn rejection_is_an_error_not_a_suspension() {
        let (owner, _) = owners();
        let mut state = ThenableState::default();
        state.begin_attempt(owner);
        let rejected = Deferred::<u32>::rejected("boom");
        assert!(matches!(
            state.unwrap(&rejected),
            Err(Unwind::Error(ReconcileError::Rejected(reason))) if &*reason == "boom"
        ));
    }

    #[test]
    fn clear_forgets_tracked_values() {
        let (owner, _) = owners();
        let mut state = ThenableState::default();
        state.begin_attempt(owner);
        let _ = state.unwrap(&Deferred::fulfilled(1u32));
        state.clear();
        state.begin_attempt(owner);
        assert_eq!(state.unwrap(&Deferred::fulfilled(2u32)).ok(), Some(2));
    }

    #[test]
    fn attempt_for_another_parent_starts_fresh() {
        let (a, b) = owners();
        let mut state = ThenableState::default();
        state.begin_attempt(a);
        assert!(state.unwrap(&Deferred::<u32>::pending()).is_err());
        state.begin_attempt(b);
        assert_eq!(state.tracked_len(), 0);
        assert_eq!(state.unwrap(&Deferred::fulfilled(3u32)).ok(), Some(3));
    }
}
