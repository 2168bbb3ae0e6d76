//! Incremental reconciliation of a render tree against logical child
//! descriptions.
//!
//! A pass builds a work-in-progress version of the tree next to the committed
//! one, reusing committed nodes where keys and types allow, and records the
//! structural effects a commit must apply. Component state is folded from
//! prioritized update queues, and a first pass can adopt existing external
//! markup instead of creating nodes (hydration).

pub mod config;
pub mod debug;
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

mod child_reconciler;
mod context;
mod deferred;
mod error;
mod flags;
mod host;
mod hydration;
mod node;
mod thenable;
mod tree;
mod types;
mod update_queue;

pub use crate::child_reconciler::{ReconcileOutcome, mount_children, reconcile, reconcile_children};
pub use crate::config::{HydrationConfig, MismatchRetry, ReconcilerConfig};
pub use crate::context::{Counters, PassContext};
pub use crate::deferred::{Deferred, DeferredStatus, Wakeable};
pub use crate::error::{Diagnostic, HydrationMismatch, InvariantViolation, ReconcileError};
pub use crate::flags::Flags;
pub use crate::host::{DefaultHost, HostConfig};
pub use crate::hydration::{ClaimRequest, ExternalMarkup, HydrationState, MarkupParent, is_fully_matched};
pub use crate::node::{NodePayload, NodeTag, PendingProps, RenderNode};
pub use crate::tree::{Children, NodeId, RenderTree, RootId, StructuralEffects};
pub use crate::types::{
    AsyncChildIter, AsyncChildSource, Child, ChildIter, ContextId, ContextRead, Element, ElementType,
    Key, Lazy, Portal, Props,
};
pub use crate::update_queue::{
    Callback, Mergeable, Payload, ProcessResult, Reducer, Update, UpdateKind, UpdateQueue,
    commit_update_queue, enqueue_captured_update, enqueue_update, process_update_queue,
};
pub use core_types::{ContainerId, Lanes, MarkupHandle};

#[cfg(feature = "internal-api")]
pub mod internal {
    pub use super::child_reconciler::clone_child_nodes;
    pub use super::update_queue::{NodeQueue, clone_update_queue, initialize_update_queue};
}
