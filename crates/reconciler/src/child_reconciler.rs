//! Keyed child list reconciliation.
//!
//! Turns a `Child` description plus the previous sibling chain into the next
//! sibling chain, reusing previous nodes by key (or position when unkeyed) and
//! recording structural effects:
//! - `PLACEMENT` on nodes that are new or must move forward,
//! - the parent's `deletions` for previous nodes without a match,
//! - `UPDATE` on reused text/host nodes whose content changed.
//!
//! Invariants:
//! - The previous (current) tree is read, never written, except for linking a
//!   freshly allocated alternate.
//! - Every unmatched previous sibling is listed in `deletions` exactly once.
//! - Sequences are walked once; lists and pull-based iterators share one
//!   state machine.
//! - A failed attempt (suspension or error) leaves the parent with a single
//!   placeholder child; nodes created by the attempt are released.

use crate::context::PassContext;
use crate::deferred::{DeferredStatus, Wakeable};
use crate::error::{Diagnostic, InvariantViolation, ReconcileError, Unwind};
use crate::flags::Flags;
use crate::host::HostConfig;
use crate::node::{NodePayload, NodeTag, PendingProps, RenderNode};
use crate::tree::{NodeId, RenderTree};
use crate::types::{AsyncChildIter, Child, Element, ElementType, Key, Lazy, Portal};
use crate::update_queue::initialize_update_queue;
use core_types::Lanes;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

/// Result of reconciling one children description.
#[derive(Clone, Debug)]
pub enum ReconcileOutcome {
    Ready(Option<NodeId>),
    /// A deferred child was still pending; `placeholder` stands in for the
    /// children until `wakeable` settles and the parent is reconciled again.
    Suspended {
        placeholder: NodeId,
        wakeable: Wakeable,
    },
    /// The description could not be reconciled; `placeholder` carries the error
    /// for an ancestor boundary to handle.
    Errored {
        placeholder: NodeId,
        error: ReconcileError,
    },
}

impl ReconcileOutcome {
    /// First node of the new sibling chain, placeholder included.
    pub fn first_child(&self) -> Option<NodeId> {
        match self {
            ReconcileOutcome::Ready(first) => *first,
            ReconcileOutcome::Suspended { placeholder, .. }
            | ReconcileOutcome::Errored { placeholder, .. } => Some(*placeholder),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ReconcileOutcome::Ready(_))
    }
}

/// Reconciles `new_children` against the chain starting at `previous_first`,
/// tracking side effects.
///
/// Returns `Err` only when `parent` itself is not live; every other failure is
/// reported through the outcome's placeholder.
pub fn reconcile(
    tree: &mut RenderTree,
    host: &dyn HostConfig,
    pass: &mut PassContext,
    parent: NodeId,
    previous_first: Option<NodeId>,
    new_children: &Child,
    lanes: Lanes,
) -> Result<ReconcileOutcome, ReconcileError> {
    tree.require(parent)?;
    ChildReconciler::new(tree, host, pass, lanes, true).run(parent, previous_first, new_children)
}

/// First-mount variant: nothing to delete, positions are marked `FORKED`
/// instead of `PLACEMENT`.
pub fn mount_children(
    tree: &mut RenderTree,
    host: &dyn HostConfig,
    pass: &mut PassContext,
    parent: NodeId,
    new_children: &Child,
    lanes: Lanes,
) -> Result<ReconcileOutcome, ReconcileError> {
    tree.require(parent)?;
    ChildReconciler::new(tree, host, pass, lanes, false).run(parent, None, new_children)
}

/// Reconciles the children of a work-in-progress node and stores the new first
/// child on it. Mounts when the node has no current counterpart.
pub fn reconcile_children(
    tree: &mut RenderTree,
    host: &dyn HostConfig,
    pass: &mut PassContext,
    wip: NodeId,
    new_children: &Child,
    lanes: Lanes,
) -> Result<ReconcileOutcome, ReconcileError> {
    let node = tree.require(wip)?;
    let current_first = node
        .alternate
        .and_then(|alt| tree.get(alt))
        .map(|current| current.child);
    let outcome = match current_first {
        Some(previous_first) => reconcile(tree, host, pass, wip, previous_first, new_children, lanes)?,
        None => mount_children(tree, host, pass, wip, new_children, lanes)?,
    };
    tree[wip].child = outcome.first_child();
    Ok(outcome)
}

/// Replaces the children of a bailed-out work-in-progress node with
/// work-in-progress copies of the current children.
pub fn clone_child_nodes(tree: &mut RenderTree, wip: NodeId) -> Result<(), ReconcileError> {
    let node = tree.require(wip)?;
    let first = node.child;
    if let Some(current) = node.alternate.and_then(|alt| tree.get(alt)) {
        if current.child != first {
            debug_assert!(false, "bailout with children that differ from current");
            return Err(InvariantViolation::ChildChainMismatch { parent: wip }.into());
        }
    }
    let Some(first) = first else {
        return Ok(());
    };

    let pending = tree.require(first)?.pending_props.clone();
    let mut new_child = tree.create_work_in_progress(first, pending)?;
    tree[wip].child = Some(new_child);
    tree[new_child].parent = Some(wip);
    let mut current_child = first;
    while let Some(next) = tree.require(current_child)?.sibling {
        let pending = tree.require(next)?.pending_props.clone();
        let cloned = tree.create_work_in_progress(next, pending)?;
        tree[cloned].parent = Some(wip);
        tree[new_child].sibling = Some(cloned);
        new_child = cloned;
        current_child = next;
    }
    tree[new_child].sibling = None;
    log::trace!(target: "reconciler.children", "cloned children of {wip:?}");
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum SlotKey {
    Key(Key),
    Index(usize),
}

/// Cursor over a children sequence.
enum Sequence<'c> {
    Slice(std::slice::Iter<'c, Child>),
    Iter(Box<dyn Iterator<Item = Child>>),
    Async { source: AsyncChildIter, index: usize },
}

impl<'c> Sequence<'c> {
    fn next_item(&mut self, pass: &mut PassContext) -> Result<Option<Cow<'c, Child>>, Unwind> {
        match self {
            Sequence::Slice(items) => Ok(items.next().map(Cow::Borrowed)),
            Sequence::Iter(iter) => Ok(iter.next().map(Cow::Owned)),
            Sequence::Async { source, index } => {
                let step = source.step(*index);
                *index += 1;
                Ok(pass.thenables.unwrap(&step)?.map(Cow::Owned))
            }
        }
    }
}

struct ChildReconciler<'a> {
    tree: &'a mut RenderTree,
    host: &'a dyn HostConfig,
    pass: &'a mut PassContext,
    lanes: Lanes,
    track: bool,
    created: Vec<NodeId>,
}

impl<'a> ChildReconciler<'a> {
    fn new(
        tree: &'a mut RenderTree,
        host: &'a dyn HostConfig,
        pass: &'a mut PassContext,
        lanes: Lanes,
        track: bool,
    ) -> Self {
        Self {
            tree,
            host,
            pass,
            lanes,
            track,
            created: Vec::new(),
        }
    }

    fn run(
        mut self,
        parent: NodeId,
        previous_first: Option<NodeId>,
        children: &Child,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let deletions_before = self.tree[parent].deletions.len();
        let flags_before = self.tree[parent].flags;
        self.pass.thenables.begin_attempt(parent);

        let unwind = match self.reconcile_impl(parent, previous_first, children) {
            Ok(first) => {
                self.pass.thenables.clear();
                #[cfg(feature = "reconcile-invariants")]
                self.check_chain(parent, first)?;
                log::trace!(
                    target: "reconciler.children",
                    "reconciled {parent:?}: first={first:?} track={}",
                    self.track
                );
                return Ok(ReconcileOutcome::Ready(first));
            }
            Err(unwind) => unwind,
        };

        let released = self.created.len();
        for id in self.created.drain(..) {
            self.tree.release(id);
        }
        {
            let counters = self.pass.counters_mut();
            counters.nodes_created = counters.nodes_created.saturating_sub(released as u64);
        }
        let parent_node = &mut self.tree[parent];
        parent_node.deletions.truncate(deletions_before);
        parent_node.flags = flags_before;
        self.delete_remaining(parent, previous_first);

        let (tag, payload) = match unwind {
            Unwind::Suspend(wakeable) => {
                self.pass.counters_mut().suspensions += 1;
                log::debug!(target: "reconciler.children", "children of {parent:?} suspended");
                (NodeTag::Pending, NodePayload::Suspended(wakeable))
            }
            Unwind::Error(error) => {
                self.pass.thenables.clear();
                log::debug!(target: "reconciler.children", "children of {parent:?} failed: {error}");
                (NodeTag::Throw, NodePayload::Error(error))
            }
        };
        let mut node = RenderNode::new(tag, None, PendingProps::Empty);
        node.payload = payload.clone();
        let placeholder = self.fresh(parent, node);
        self.place_single_child(placeholder);

        Ok(match payload {
            NodePayload::Suspended(wakeable) => ReconcileOutcome::Suspended {
                placeholder,
                wakeable,
            },
            NodePayload::Error(error) => ReconcileOutcome::Errored { placeholder, error },
            NodePayload::None | NodePayload::Container(_) => ReconcileOutcome::Ready(Some(placeholder)),
        })
    }

    fn reconcile_impl(
        &mut self,
        parent: NodeId,
        first: Option<NodeId>,
        children: &Child,
    ) -> Result<Option<NodeId>, Unwind> {
        let empty = Child::Empty;
        let children = match children {
            Child::Element(element) if element.ty == ElementType::Fragment && element.key.is_none() => {
                element.props.children().unwrap_or(&empty)
            }
            other => other,
        };

        match children {
            Child::Element(element) => {
                let node = self.reconcile_single_element(parent, first, element)?;
                Ok(Some(self.place_single_child(node)))
            }
            Child::Portal(portal) => {
                let node = self.reconcile_single_portal(parent, first, portal)?;
                Ok(Some(self.place_single_child(node)))
            }
            Child::Lazy(lazy) => {
                let resolved = resolve_lazy(lazy)?;
                self.reconcile_impl(parent, first, &resolved)
            }
            Child::List(items) => self.reconcile_sequence(parent, first, Sequence::Slice(items.iter())),
            Child::Iter(iter) => self.reconcile_sequence(parent, first, Sequence::Iter(iter.cursor())),
            Child::AsyncIter(source) => self.reconcile_sequence(
                parent,
                first,
                Sequence::Async {
                    source: source.clone(),
                    index: 0,
                },
            ),
            Child::Deferred(deferred) => {
                let resolved = self.pass.thenables.unwrap(deferred)?;
                self.reconcile_impl(parent, first, &resolved)
            }
            Child::Context(read) => {
                let value = self.pass.read_context(read);
                self.reconcile_impl(parent, first, &value)
            }
            Child::Text(_) | Child::Number(_) if !children.is_empty_text() => {
                let text = children.as_text().unwrap_or_default();
                let node = self.reconcile_single_text(parent, first, text)?;
                Ok(Some(self.place_single_child(node)))
            }
            Child::Callable(name) => {
                self.report_callable(parent, name);
                self.delete_remaining(parent, first);
                Ok(None)
            }
            Child::Opaque(found) => Err(ReconcileError::InvalidChild {
                found: Arc::clone(found),
            }
            .into()),
            Child::Empty | Child::Text(_) | Child::Number(_) => {
                self.delete_remaining(parent, first);
                Ok(None)
            }
        }
    }

    fn reconcile_single_element(
        &mut self,
        parent: NodeId,
        first: Option<NodeId>,
        element: &Element,
    ) -> Result<NodeId, Unwind> {
        let mut child = first;
        while let Some(c) = child {
            let node = self.tree.require(c)?;
            let sibling = node.sibling;
            if node.key == element.key {
                let reusable = if element.ty == ElementType::Fragment {
                    node.tag == NodeTag::Fragment
                } else {
                    self.host.can_reuse(node, element)
                };
                if reusable {
                    self.delete_remaining(parent, sibling);
                    return self.reuse_for_element(parent, c, element);
                }
                // Key matched but type did not: nothing from here on can be reused.
                self.delete_remaining(parent, Some(c));
                break;
            }
            self.delete_child(parent, c);
            child = sibling;
        }
        self.create_element(parent, element)
    }

    fn reconcile_single_portal(
        &mut self,
        parent: NodeId,
        first: Option<NodeId>,
        portal: &Portal,
    ) -> Result<NodeId, Unwind> {
        let mut child = first;
        while let Some(c) = child {
            let node = self.tree.require(c)?;
            let sibling = node.sibling;
            if node.key == portal.key {
                if node.tag == NodeTag::Portal && node.container() == Some(portal.container) {
                    self.delete_remaining(parent, sibling);
                    let reused = self.use_node(c, PendingProps::Children(Rc::clone(&portal.children)))?;
                    self.tree[reused].parent = Some(parent);
                    return Ok(reused);
                }
                self.delete_remaining(parent, Some(c));
                break;
            }
            self.delete_child(parent, c);
            child = sibling;
        }
        Ok(self.create_portal(parent, portal))
    }

    fn reconcile_single_text(
        &mut self,
        parent: NodeId,
        first: Option<NodeId>,
        text: Arc<str>,
    ) -> Result<NodeId, Unwind> {
        if let Some(f) = first {
            let node = self.tree.require(f)?;
            if node.tag == NodeTag::Text {
                let sibling = node.sibling;
                self.delete_remaining(parent, sibling);
                return self.update_text(parent, Some(f), text);
            }
        }
        self.delete_remaining(parent, first);
        Ok(self.create_text(parent, text))
    }

    fn reconcile_sequence(
        &mut self,
        parent: NodeId,
        first: Option<NodeId>,
        mut sequence: Sequence<'_>,
    ) -> Result<Option<NodeId>, Unwind> {
        let mut seen_keys: HashSet<Key> = HashSet::new();
        let mut result_first: Option<NodeId> = None;
        let mut previous_new: Option<NodeId> = None;
        let mut old = first;
        let mut last_placed = 0usize;
        let mut new_idx = 0usize;

        let mut step = sequence.next_item(self.pass)?;
        if let Some(item) = step.as_deref() {
            self.check_key(&mut seen_keys, parent, item, new_idx);
        }

        // Forward scan while positions line up.
        loop {
            let Some(o) = old else {
                break;
            };
            let Some(item) = step.as_deref() else {
                break;
            };
            let old_node = self.tree.require(o)?;
            let (slot_old, next_old) = if old_node.index > new_idx {
                (None, Some(o))
            } else {
                (Some(o), old_node.sibling)
            };

            let Some(new_node) = self.update_slot(parent, slot_old, item)? else {
                break;
            };
            if let Some(matched) = slot_old {
                if self.track && self.tree[new_node].alternate.is_none() {
                    self.delete_child(parent, matched);
                }
            }
            last_placed = self.place_child(new_node, last_placed, new_idx);
            self.link(&mut result_first, &mut previous_new, new_node);
            old = next_old;

            new_idx += 1;
            step = sequence.next_item(self.pass)?;
            if let Some(item) = step.as_deref() {
                self.check_key(&mut seen_keys, parent, item, new_idx);
            }
        }

        if step.is_none() {
            self.delete_remaining(parent, old);
            return Ok(result_first);
        }

        if old.is_none() {
            while let Some(item) = step.as_deref() {
                if let Some(new_node) = self.create_child(parent, item)? {
                    last_placed = self.place_child(new_node, last_placed, new_idx);
                    self.link(&mut result_first, &mut previous_new, new_node);
                }
                new_idx += 1;
                step = sequence.next_item(self.pass)?;
                if let Some(item) = step.as_deref() {
                    self.check_key(&mut seen_keys, parent, item, new_idx);
                }
            }
            return Ok(result_first);
        }

        let (mut existing, displaced) = self.map_remaining_children(old)?;
        while let Some(item) = step.as_deref() {
            if let Some(new_node) = self.update_from_map(&mut existing, parent, new_idx, item)? {
                last_placed = self.place_child(new_node, last_placed, new_idx);
                self.link(&mut result_first, &mut previous_new, new_node);
            }
            new_idx += 1;
            step = sequence.next_item(self.pass)?;
            if let Some(item) = step.as_deref() {
                self.check_key(&mut seen_keys, parent, item, new_idx);
            }
        }

        if self.track {
            let mut leftovers: Vec<NodeId> = existing.into_values().chain(displaced).collect();
            leftovers.sort_by_key(|id| (self.tree.get(*id).map_or(usize::MAX, |n| n.index), *id));
            for leftover in leftovers {
                self.delete_child(parent, leftover);
            }
        }
        Ok(result_first)
    }

    /// Reuse-or-create for the position-aligned scan. `None` means the keys do
    /// not line up and the scan must stop.
    fn update_slot(
        &mut self,
        parent: NodeId,
        old: Option<NodeId>,
        item: &Child,
    ) -> Result<Option<NodeId>, Unwind> {
        let old_key = match old {
            Some(o) => self.tree.require(o)?.key.clone(),
            None => None,
        };
        match item {
            Child::Text(_) | Child::Number(_) if !item.is_empty_text() => {
                if old_key.is_some() {
                    return Ok(None);
                }
                let text = item.as_text().unwrap_or_default();
                Ok(Some(self.update_text(parent, old, text)?))
            }
            Child::Element(element) => {
                if element.key != old_key {
                    return Ok(None);
                }
                Ok(Some(self.update_element(parent, old, element)?))
            }
            Child::Portal(portal) => {
                if portal.key != old_key {
                    return Ok(None);
                }
                Ok(Some(self.update_portal(parent, old, portal)?))
            }
            Child::Lazy(lazy) => {
                let resolved = resolve_lazy(lazy)?;
                self.update_slot(parent, old, &resolved)
            }
            Child::List(_) | Child::Iter(_) | Child::AsyncIter(_) => {
                if old_key.is_some() {
                    return Ok(None);
                }
                let children = Rc::new(item.clone());
                Ok(Some(self.update_fragment(parent, old, children, None)?))
            }
            Child::Deferred(deferred) => {
                let resolved = self.pass.thenables.unwrap(deferred)?;
                self.update_slot(parent, old, &resolved)
            }
            Child::Context(read) => {
                let value = self.pass.read_context(read);
                self.update_slot(parent, old, &value)
            }
            // Reported once the item reaches the key map.
            Child::Callable(_) => Ok(None),
            Child::Opaque(found) => Err(ReconcileError::InvalidChild {
                found: Arc::clone(found),
            }
            .into()),
            Child::Empty | Child::Text(_) | Child::Number(_) => Ok(None),
        }
    }

    fn update_from_map(
        &mut self,
        existing: &mut HashMap<SlotKey, NodeId>,
        parent: NodeId,
        new_idx: usize,
        item: &Child,
    ) -> Result<Option<NodeId>, Unwind> {
        let slot = |key: &Option<Key>| match key {
            Some(key) => SlotKey::Key(key.clone()),
            None => SlotKey::Index(new_idx),
        };
        let (lookup, new_node) = match item {
            Child::Text(_) | Child::Number(_) if !item.is_empty_text() => {
                let lookup = SlotKey::Index(new_idx);
                let matched = existing.get(&lookup).copied();
                let text = item.as_text().unwrap_or_default();
                (lookup, self.update_text(parent, matched, text)?)
            }
            Child::Element(element) => {
                let lookup = slot(&element.key);
                let matched = existing.get(&lookup).copied();
                (lookup, self.update_element(parent, matched, element)?)
            }
            Child::Portal(portal) => {
                let lookup = slot(&portal.key);
                let matched = existing.get(&lookup).copied();
                (lookup, self.update_portal(parent, matched, portal)?)
            }
            Child::Lazy(lazy) => {
                let resolved = resolve_lazy(lazy)?;
                return self.update_from_map(existing, parent, new_idx, &resolved);
            }
            Child::List(_) | Child::Iter(_) | Child::AsyncIter(_) => {
                let lookup = SlotKey::Index(new_idx);
                let matched = existing.get(&lookup).copied();
                let children = Rc::new(item.clone());
                (lookup, self.update_fragment(parent, matched, children, None)?)
            }
            Child::Deferred(deferred) => {
                let resolved = self.pass.thenables.unwrap(deferred)?;
                return self.update_from_map(existing, parent, new_idx, &resolved);
            }
            Child::Context(read) => {
                let value = self.pass.read_context(read);
                return self.update_from_map(existing, parent, new_idx, &value);
            }
            Child::Callable(name) => {
                self.report_callable(parent, name);
                return Ok(None);
            }
            Child::Opaque(found) => {
                return Err(ReconcileError::InvalidChild {
                    found: Arc::clone(found),
                }
                .into());
            }
            Child::Empty | Child::Text(_) | Child::Number(_) => return Ok(None),
        };

        let reused_from = self.tree[new_node].alternate;
        if reused_from.is_some() && existing.get(&lookup).copied() == reused_from {
            existing.remove(&lookup);
        }
        Ok(Some(new_node))
    }

    fn create_child(&mut self, parent: NodeId, item: &Child) -> Result<Option<NodeId>, Unwind> {
        match item {
            Child::Text(_) | Child::Number(_) if !item.is_empty_text() => {
                let text = item.as_text().unwrap_or_default();
                Ok(Some(self.create_text(parent, text)))
            }
            Child::Element(element) => Ok(Some(self.create_element(parent, element)?)),
            Child::Portal(portal) => Ok(Some(self.create_portal(parent, portal))),
            Child::Lazy(lazy) => {
                let resolved = resolve_lazy(lazy)?;
                self.create_child(parent, &resolved)
            }
            Child::List(_) | Child::Iter(_) | Child::AsyncIter(_) => {
                Ok(Some(self.create_fragment(parent, Rc::new(item.clone()), None)))
            }
            Child::Deferred(deferred) => {
                let resolved = self.pass.thenables.unwrap(deferred)?;
                self.create_child(parent, &resolved)
            }
            Child::Context(read) => {
                let value = self.pass.read_context(read);
                self.create_child(parent, &value)
            }
            Child::Callable(name) => {
                self.report_callable(parent, name);
                Ok(None)
            }
            Child::Opaque(found) => Err(ReconcileError::InvalidChild {
                found: Arc::clone(found),
            }
            .into()),
            Child::Empty | Child::Text(_) | Child::Number(_) => Ok(None),
        }
    }

    fn update_text(
        &mut self,
        parent: NodeId,
        old: Option<NodeId>,
        text: Arc<str>,
    ) -> Result<NodeId, Unwind> {
        let reusable = match old {
            Some(o) => self.tree.require(o)?.tag == NodeTag::Text,
            None => false,
        };
        let Some(o) = old.filter(|_| reusable) else {
            return Ok(self.create_text(parent, text));
        };
        let changed = self.tree[o].pending_props.text() != Some(&*text);
        let reused = self.use_node(o, PendingProps::Text(text))?;
        let node = &mut self.tree[reused];
        node.parent = Some(parent);
        if changed {
            node.flags |= Flags::UPDATE;
        }
        Ok(reused)
    }

    fn update_element(
        &mut self,
        parent: NodeId,
        old: Option<NodeId>,
        element: &Element,
    ) -> Result<NodeId, Unwind> {
        if element.ty == ElementType::Fragment {
            return self.update_fragment(parent, old, element.props.children_rc(), element.key.clone());
        }
        if let Some(o) = old {
            if self.host.can_reuse(self.tree.require(o)?, element) {
                return self.reuse_for_element(parent, o, element);
            }
        }
        self.create_element(parent, element)
    }

    fn update_fragment(
        &mut self,
        parent: NodeId,
        old: Option<NodeId>,
        children: Rc<Child>,
        key: Option<Key>,
    ) -> Result<NodeId, Unwind> {
        let reusable = match old {
            Some(o) => self.tree.require(o)?.tag == NodeTag::Fragment,
            None => false,
        };
        match old.filter(|_| reusable) {
            Some(o) => {
                let reused = self.use_node(o, PendingProps::Children(children))?;
                self.tree[reused].parent = Some(parent);
                Ok(reused)
            }
            None => Ok(self.create_fragment(parent, children, key)),
        }
    }

    fn update_portal(
        &mut self,
        parent: NodeId,
        old: Option<NodeId>,
        portal: &Portal,
    ) -> Result<NodeId, Unwind> {
        let reusable = match old {
            Some(o) => {
                let node = self.tree.require(o)?;
                node.tag == NodeTag::Portal && node.container() == Some(portal.container)
            }
            None => false,
        };
        match old.filter(|_| reusable) {
            Some(o) => {
                let reused = self.use_node(o, PendingProps::Children(Rc::clone(&portal.children)))?;
                self.tree[reused].parent = Some(parent);
                Ok(reused)
            }
            None => Ok(self.create_portal(parent, portal)),
        }
    }

    fn reuse_for_element(
        &mut self,
        parent: NodeId,
        old: NodeId,
        element: &Element,
    ) -> Result<NodeId, Unwind> {
        let pending = if element.ty == ElementType::Fragment {
            PendingProps::Children(element.props.children_rc())
        } else {
            PendingProps::Props(element.props.clone())
        };
        let reused = self.use_node(old, pending)?;
        let needs_update =
            element.ty != ElementType::Fragment && self.host.apply_props(&self.tree[reused], &element.props);
        let node = &mut self.tree[reused];
        node.parent = Some(parent);
        if needs_update {
            node.flags |= Flags::UPDATE;
        }
        Ok(reused)
    }

    fn use_node(&mut self, old: NodeId, pending: PendingProps) -> Result<NodeId, Unwind> {
        let reused = self.tree.create_work_in_progress(old, pending)?;
        let node = &mut self.tree[reused];
        node.index = 0;
        node.sibling = None;
        self.pass.counters_mut().nodes_reused += 1;
        log::trace!(target: "reconciler.children", "reused {old:?} as {reused:?}");
        Ok(reused)
    }

    fn fresh(&mut self, parent: NodeId, mut node: RenderNode) -> NodeId {
        node.parent = Some(parent);
        node.lanes = self.lanes;
        let id = self.tree.alloc(node);
        self.pass.counters_mut().nodes_created += 1;
        log::trace!(target: "reconciler.children", "created {id:?} under {parent:?}");
        id
    }

    fn create_text(&mut self, parent: NodeId, text: Arc<str>) -> NodeId {
        let node = RenderNode::new(NodeTag::Text, None, PendingProps::Text(text));
        let id = self.fresh(parent, node);
        self.created.push(id);
        id
    }

    fn create_element(&mut self, parent: NodeId, element: &Element) -> Result<NodeId, Unwind> {
        if element.ty == ElementType::Fragment {
            return Ok(self.create_fragment(parent, element.props.children_rc(), element.key.clone()));
        }
        let node = self.host.create_node(element);
        let needs_queue = node.tag == NodeTag::Component && node.update_queue.is_none();
        let id = self.fresh(parent, node);
        self.created.push(id);
        if needs_queue {
            initialize_update_queue(self.tree, id, self.host.initial_state(element))?;
        }
        Ok(id)
    }

    fn create_fragment(&mut self, parent: NodeId, children: Rc<Child>, key: Option<Key>) -> NodeId {
        let mut node = RenderNode::new(NodeTag::Fragment, key, PendingProps::Children(children));
        node.element_type = Some(ElementType::Fragment);
        let id = self.fresh(parent, node);
        self.created.push(id);
        id
    }

    fn create_portal(&mut self, parent: NodeId, portal: &Portal) -> NodeId {
        let mut node = RenderNode::new(
            NodeTag::Portal,
            portal.key.clone(),
            PendingProps::Children(Rc::clone(&portal.children)),
        );
        node.payload = NodePayload::Container(portal.container);
        let id = self.fresh(parent, node);
        self.created.push(id);
        id
    }

    fn link(&mut self, first: &mut Option<NodeId>, previous: &mut Option<NodeId>, node: NodeId) {
        match previous {
            Some(prev) => self.tree[*prev].sibling = Some(node),
            None => *first = Some(node),
        }
        *previous = Some(node);
    }

    /// Assigns the new index and decides placement from the high-water mark of
    /// previous positions kept in place so far.
    fn place_child(&mut self, node: NodeId, last_placed: usize, new_idx: usize) -> usize {
        self.tree[node].index = new_idx;
        if !self.track {
            self.tree[node].flags |= Flags::FORKED;
            return last_placed;
        }
        let old_index = self.tree[node]
            .alternate
            .and_then(|alt| self.tree.get(alt))
            .map(|current| current.index);
        match old_index {
            Some(old_index) if old_index >= last_placed => old_index,
            Some(_) | None => {
                self.tree[node].flags |= Flags::PLACEMENT;
                self.pass.counters_mut().placements += 1;
                last_placed
            }
        }
    }

    fn place_single_child(&mut self, node: NodeId) -> NodeId {
        if self.track && self.tree[node].alternate.is_none() {
            self.tree[node].flags |= Flags::PLACEMENT;
            self.pass.counters_mut().placements += 1;
        }
        node
    }

    fn delete_child(&mut self, parent: NodeId, child: NodeId) {
        if !self.track {
            return;
        }
        let parent_node = &mut self.tree[parent];
        if parent_node.deletions.contains(&child) {
            debug_assert!(false, "child scheduled for deletion twice");
            return;
        }
        parent_node.deletions.push(child);
        parent_node.flags |= Flags::CHILD_DELETION;
        self.pass.counters_mut().deletions += 1;
        log::trace!(target: "reconciler.children", "deleting {child:?} from {parent:?}");
    }

    fn delete_remaining(&mut self, parent: NodeId, first: Option<NodeId>) {
        if !self.track {
            return;
        }
        let mut child = first;
        while let Some(c) = child {
            child = self.tree.get(c).and_then(|node| node.sibling);
            self.delete_child(parent, c);
        }
    }

    /// Lookup of the remaining previous siblings by key, or by index when
    /// unkeyed. A later duplicate key takes the slot; the displaced nodes are
    /// returned so they can be deleted.
    fn map_remaining_children(
        &self,
        first: Option<NodeId>,
    ) -> Result<(HashMap<SlotKey, NodeId>, Vec<NodeId>), Unwind> {
        let mut existing = HashMap::new();
        let mut displaced = Vec::new();
        let mut child = first;
        while let Some(c) = child {
            let node = self.tree.require(c)?;
            let slot = match &node.key {
                Some(key) => SlotKey::Key(key.clone()),
                None => SlotKey::Index(node.index),
            };
            if let Some(previous) = existing.insert(slot, c) {
                displaced.push(previous);
            }
            child = node.sibling;
        }
        Ok((existing, displaced))
    }

    fn check_key(&mut self, seen: &mut HashSet<Key>, parent: NodeId, item: &Child, index: usize) {
        let key = match item {
            Child::Element(element) => element.key.as_ref(),
            Child::Portal(portal) => portal.key.as_ref(),
            _ => return,
        };
        match key {
            Some(key) => {
                if !seen.insert(key.clone()) && self.pass.config.warn_on_duplicate_keys {
                    self.pass.report(Diagnostic::DuplicateKey {
                        parent,
                        key: key.clone(),
                    });
                }
            }
            None => {
                if self.pass.config.warn_on_missing_keys {
                    self.pass.report(Diagnostic::MissingKey { parent, index });
                }
            }
        }
    }

    fn report_callable(&mut self, parent: NodeId, name: &Arc<str>) {
        self.pass.report(Diagnostic::CallableChild {
            parent,
            name: Arc::clone(name),
        });
    }

    #[cfg(feature = "reconcile-invariants")]
    fn check_chain(&self, parent: NodeId, first: Option<NodeId>) -> Result<(), ReconcileError> {
        let mut seen = HashSet::new();
        let mut expected_index = 0usize;
        let mut child = first;
        while let Some(c) = child {
            let node = self.tree.require(c)?;
            let ok = seen.insert(c)
                && node.parent == Some(parent)
                && node.index >= expected_index
                && self.tree.alternates_consistent(c);
            if !ok {
                debug_assert!(false, "child chain of {parent:?} is inconsistent at {c:?}");
                return Err(InvariantViolation::ChildChainMismatch { parent }.into());
            }
            expected_index = node.index + 1;
            child = node.sibling;
        }
        Ok(())
    }
}

/// Lazy payloads are not indexed: every read observes the settled value.
fn resolve_lazy(lazy: &Lazy) -> Result<Child, Unwind> {
    match lazy.payload.status() {
        DeferredStatus::Fulfilled(child) => Ok(child),
        DeferredStatus::Rejected(reason) => Err(ReconcileError::Rejected(reason).into()),
        DeferredStatus::Pending => Err(Unwind::Suspend(lazy.payload.wakeable())),
    }
}
