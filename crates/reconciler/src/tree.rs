//! Generation-tagged arena holding both versions of every render node.
//!
//! Contract:
//! - `child`/`sibling` are the owning edges; `parent`/`alternate` are plain
//!   handles and never keep a node alive.
//! - Each live node has at most one alternate, and `alternate(alternate(n)) == n`.
//! - A root's `current` is replaced in one assignment at commit; nodes that were
//!   scheduled for deletion are released at that point, together with their
//!   alternates.
//! - Released slots bump their generation, so stale `NodeId`s never alias a
//!   newer node.

use crate::error::{InvariantViolation, ReconcileError};
use crate::flags::Flags;
use crate::node::{NodePayload, NodeTag, PendingProps, RenderNode};
use core_types::ContainerId;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RootId(u32);

/// Structural effects readout consumed by a commit phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StructuralEffects {
    pub needs_placement: bool,
    pub needs_update: bool,
    pub deletions: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<RenderNode>,
}

#[derive(Debug)]
struct RootRecord {
    container: ContainerId,
    current: NodeId,
}

#[derive(Debug, Default)]
pub struct RenderTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    roots: Vec<RootRecord>,
    live: usize,
}

impl RenderTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes across both versions.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn alloc(&mut self, node: RenderNode) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none(), "free list slot still occupied");
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    pub(crate) fn release(&mut self, id: NodeId) -> Option<RenderNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&RenderNode> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut RenderNode> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn require(&self, id: NodeId) -> Result<&RenderNode, InvariantViolation> {
        self.get(id).ok_or(InvariantViolation::StaleNode(id))
    }

    /// Creates a root whose current version has no children yet.
    pub fn create_root(&mut self, container: ContainerId) -> RootId {
        let mut node = RenderNode::new(NodeTag::Root, None, PendingProps::Empty);
        node.payload = NodePayload::Container(container);
        node.memoized_props = Some(PendingProps::Empty);
        let current = self.alloc(node);
        let id = RootId(self.roots.len() as u32);
        self.roots.push(RootRecord { container, current });
        id
    }

    pub fn root_current(&self, root: RootId) -> Option<NodeId> {
        self.roots.get(root.0 as usize).map(|record| record.current)
    }

    pub fn root_container(&self, root: RootId) -> Option<ContainerId> {
        self.roots.get(root.0 as usize).map(|record| record.container)
    }

    /// Returns the work-in-progress counterpart of `current`, reusing the
    /// alternate slot when one exists.
    ///
    /// `current` itself is only touched to link a freshly allocated alternate.
    pub fn create_work_in_progress(
        &mut self,
        current: NodeId,
        pending_props: PendingProps,
    ) -> Result<NodeId, InvariantViolation> {
        let cur = self.require(current)?;
        let tag = cur.tag;
        let key = cur.key.clone();
        let element_type = cur.element_type.clone();
        let payload = cur.payload.clone();
        let markup = cur.markup;
        let index = cur.index;
        let parent = cur.parent;
        let child = cur.child;
        let sibling = cur.sibling;
        let memoized_props = cur.memoized_props.clone();
        let memoized_state = cur.memoized_state.clone();
        let update_queue = cur.update_queue.as_ref().map(Rc::clone);
        let lanes = cur.lanes;
        let child_lanes = cur.child_lanes;
        let existing = cur.alternate.filter(|alt| self.contains(*alt));

        let wip = match existing {
            Some(wip) => {
                let node = &mut self[wip];
                if node.alternate != Some(current) {
                    debug_assert!(false, "alternate link is not symmetric");
                    return Err(InvariantViolation::AlternateMismatch(wip));
                }
                node.pending_props = pending_props;
                node.flags = Flags::NONE;
                node.subtree_flags = Flags::NONE;
                node.deletions.clear();
                wip
            }
            None => {
                let mut node = RenderNode::new(tag, key, pending_props);
                node.alternate = Some(current);
                let wip = self.alloc(node);
                self[current].alternate = Some(wip);
                log::trace!(target: "reconciler.tree", "allocated alternate {wip:?} for {current:?}");
                wip
            }
        };

        let node = &mut self[wip];
        node.element_type = element_type;
        node.payload = payload;
        node.markup = markup;
        node.index = index;
        node.parent = parent;
        node.child = child;
        node.sibling = sibling;
        node.memoized_props = memoized_props;
        node.memoized_state = memoized_state;
        node.update_queue = update_queue;
        node.lanes = lanes;
        node.child_lanes = child_lanes;
        Ok(wip)
    }

    pub fn children(&self, parent: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.get(parent).and_then(|node| node.child),
        }
    }

    /// Sibling chain starting at `first`.
    pub fn siblings(&self, first: Option<NodeId>) -> Children<'_> {
        Children {
            tree: self,
            next: first,
        }
    }

    pub fn effects(&self, id: NodeId) -> Option<StructuralEffects> {
        let node = self.get(id)?;
        Some(StructuralEffects {
            needs_placement: node.flags.contains(Flags::PLACEMENT),
            needs_update: node.flags.contains(Flags::UPDATE),
            deletions: node.deletions.clone(),
        })
    }

    /// `true` when `id` and its alternate (if any) point at each other.
    pub fn alternates_consistent(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        match node.alternate {
            None => true,
            Some(alt) => self.get(alt).is_some_and(|other| other.alternate == Some(id)),
        }
    }

    /// Makes `finished` the current tree of `root` and releases every node that
    /// was scheduled for deletion during the pass.
    pub fn commit_root(&mut self, root: RootId, finished: NodeId) -> Result<(), ReconcileError> {
        let Some(record) = self.roots.get(root.0 as usize) else {
            return Err(InvariantViolation::DetachedNode(finished).into());
        };
        let current = record.current;
        let finished_node = self.require(finished)?;
        if finished != current && finished_node.alternate != Some(current) {
            debug_assert!(false, "finished work is not the alternate of the current root");
            return Err(InvariantViolation::AlternateMismatch(finished).into());
        }

        let mut released = 0usize;
        let mut stack = vec![finished];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get_mut(id) else {
                continue;
            };
            let deletions = std::mem::take(&mut node.deletions);
            let mut child = node.child;
            for deleted in deletions {
                released += self.release_subtree(deleted);
            }
            while let Some(c) = child {
                stack.push(c);
                child = self.get(c).and_then(|n| n.sibling);
            }
        }

        self.roots[root.0 as usize].current = finished;
        log::debug!(
            target: "reconciler.tree",
            "committed {finished:?} (released {released} nodes, {} live)",
            self.live
        );
        Ok(())
    }

    /// Drops work-in-progress nodes created during an abandoned pass.
    ///
    /// Nodes that have a current counterpart stay allocated as reusable
    /// alternates; only fresh nodes are released. The current tree is not
    /// touched.
    pub fn discard_work_in_progress(&mut self, wip_root: NodeId) -> usize {
        let mut released = 0usize;
        let mut stack = vec![wip_root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else {
                continue;
            };
            let alternate = node.alternate;
            let shares_children = alternate
                .and_then(|alt| self.get(alt))
                .is_some_and(|alt| alt.child == node.child);
            if !shares_children {
                let mut child = node.child;
                while let Some(c) = child {
                    stack.push(c);
                    child = self.get(c).and_then(|n| n.sibling);
                }
            }
            // Markup placeholders exist only in deletion lists.
            let placeholders: Vec<NodeId> = node
                .deletions
                .iter()
                .copied()
                .filter(|d| self.get(*d).is_some_and(|n| n.tag == NodeTag::ExternalMarkup))
                .collect();
            for placeholder in placeholders {
                self.release(placeholder);
                released += 1;
            }
            if alternate.is_none() && id != wip_root {
                self.release(id);
                released += 1;
            } else if let Some(node) = self.get_mut(id) {
                node.flags = Flags::NONE;
                node.subtree_flags = Flags::NONE;
                node.deletions.clear();
            }
        }
        log::debug!(target: "reconciler.tree", "discarded work in progress, released {released} nodes");
        released
    }

    fn release_subtree(&mut self, id: NodeId) -> usize {
        let mut released = 0usize;
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            let Some(node) = self.release(n) else {
                continue;
            };
            released += 1;
            let mut child = node.child;
            while let Some(c) = child {
                stack.push(c);
                child = self.get(c).and_then(|n| n.sibling);
            }
            if let Some(alt) = node.alternate {
                if self.get(alt).is_some_and(|a| a.alternate == Some(n)) {
                    stack.push(alt);
                }
            }
        }
        released
    }
}

impl Index<NodeId> for RenderTree {
    type Output = RenderNode;

    fn index(&self, id: NodeId) -> &RenderNode {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node handle {id:?}"),
        }
    }
}

impl IndexMut<NodeId> for RenderTree {
    fn index_mut(&mut self, id: NodeId) -> &mut RenderNode {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale node handle {id:?}"),
        }
    }
}

pub struct Children<'a> {
    tree: &'a RenderTree,
    next: Option<NodeId>,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.get(id).and_then(|node| node.sibling);
        Some(id)
    }
}
