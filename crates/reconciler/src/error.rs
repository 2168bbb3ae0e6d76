//! Error taxonomy for reconciliation.
//!
//! - `ReconcileError` is fatal to the subtree being reconciled and is surfaced
//!   as a `Throw` placeholder node in place of the intended children.
//! - Suspension is not an error. It travels as `Unwind::Suspend` and never
//!   becomes a `ReconcileError`.
//! - `Diagnostic`s are non-fatal and only reported.

use crate::deferred::Wakeable;
use crate::tree::{NodeId, RootId};
use crate::types::Key;
use core_types::MarkupHandle;
use std::fmt;
use std::sync::Arc;

/// Caller contract violations. These indicate a bug in the caller, not bad input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantViolation {
    StaleNode(NodeId),
    AlternateMismatch(NodeId),
    MissingUpdateQueue(NodeId),
    /// The work-in-progress child chain no longer mirrors the current chain.
    ChildChainMismatch { parent: NodeId },
    DetachedNode(NodeId),
    UnknownRoot(RootId),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::StaleNode(id) => write!(f, "node {id:?} is not live"),
            InvariantViolation::AlternateMismatch(id) => {
                write!(f, "alternate of {id:?} does not point back to it")
            }
            InvariantViolation::MissingUpdateQueue(id) => {
                write!(f, "node {id:?} has no update queue")
            }
            InvariantViolation::ChildChainMismatch { parent } => {
                write!(f, "children of {parent:?} diverged from the current tree")
            }
            InvariantViolation::DetachedNode(id) => {
                write!(f, "node {id:?} is not attached to a root")
            }
            InvariantViolation::UnknownRoot(root) => write!(f, "root {root:?} does not exist"),
        }
    }
}

/// External markup did not match the expected structure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HydrationMismatch {
    /// Cursor exhausted while nodes still needed markup.
    MissingMarkup { node: NodeId },
    /// Neither the markup at the cursor nor its next sibling could be claimed.
    UnmatchedMarkup { node: NodeId, handle: MarkupHandle },
    /// Markup left over after a level finished matching.
    ExcessMarkup { parent: NodeId, handle: MarkupHandle },
    TextContent {
        node: NodeId,
        expected: Arc<str>,
        found: Option<String>,
    },
}

impl fmt::Display for HydrationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrationMismatch::MissingMarkup { node } => {
                write!(f, "no external markup left for {node:?}")
            }
            HydrationMismatch::UnmatchedMarkup { node, handle } => {
                write!(f, "external markup {handle:?} does not match {node:?}")
            }
            HydrationMismatch::ExcessMarkup { parent, handle } => {
                write!(f, "unclaimed external markup {handle:?} under {parent:?}")
            }
            HydrationMismatch::TextContent {
                node,
                expected,
                found,
            } => write!(
                f,
                "text of {node:?} differs from external markup: expected {expected:?}, found {found:?}"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    /// A child description of unsupported shape.
    InvalidChild { found: Arc<str> },
    /// A deferred child settled with a rejection.
    Rejected(Arc<str>),
    Invariant(InvariantViolation),
    Hydration(HydrationMismatch),
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::InvalidChild { found } => write!(
                f,
                "objects are not valid as a child (found: {found}); use a list to render a collection"
            ),
            ReconcileError::Rejected(reason) => write!(f, "deferred child rejected: {reason}"),
            ReconcileError::Invariant(violation) => write!(f, "invariant violated: {violation}"),
            ReconcileError::Hydration(mismatch) => write!(f, "hydration failed: {mismatch}"),
        }
    }
}

impl std::error::Error for ReconcileError {}

impl From<InvariantViolation> for ReconcileError {
    fn from(value: InvariantViolation) -> Self {
        ReconcileError::Invariant(value)
    }
}

impl From<HydrationMismatch> for ReconcileError {
    fn from(value: HydrationMismatch) -> Self {
        ReconcileError::Hydration(value)
    }
}

/// Internal control flow out of a reconciliation attempt.
#[derive(Clone, Debug)]
pub(crate) enum Unwind {
    Suspend(Wakeable),
    Error(ReconcileError),
}

impl From<ReconcileError> for Unwind {
    fn from(value: ReconcileError) -> Self {
        Unwind::Error(value)
    }
}

impl From<InvariantViolation> for Unwind {
    fn from(value: InvariantViolation) -> Self {
        Unwind::Error(ReconcileError::Invariant(value))
    }
}

/// Non-fatal findings collected on the pass context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Two siblings share an explicit key; the later one keeps positional precedence.
    DuplicateKey { parent: NodeId, key: Key },
    /// A list item element without an explicit key.
    MissingKey { parent: NodeId, index: usize },
    /// A function value was passed where a child was expected.
    CallableChild { parent: NodeId, name: Arc<str> },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DuplicateKey { parent, key } => write!(
                f,
                "encountered two children with the same key `{key}` under {parent:?}"
            ),
            Diagnostic::MissingKey { parent, index } => write!(
                f,
                "list child at index {index} under {parent:?} has no key"
            ),
            Diagnostic::CallableChild { parent, name } => write!(
                f,
                "function `{name}` is not valid as a child of {parent:?}"
            ),
        }
    }
}
