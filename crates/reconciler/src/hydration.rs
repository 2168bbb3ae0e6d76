//! Matching a first render against externally produced markup.
//!
//! Contract:
//! - `enter` points the cursor at the container's first markup child.
//! - `try_claim` binds a host or text node to the markup at the cursor, or to
//!   the markup right after it (the skipped one is deleted). Never further.
//! - A node that cannot be claimed is flagged for insertion; its subtree is
//!   not matched. Siblings resume at the same cursor.
//! - `finish_node` deletes markup left over below a claimed node and moves
//!   the cursor past it.
//! - Mismatches are recoverable unless `HydrationConfig::strict` is set.

use crate::config::{HydrationConfig, MismatchRetry};
use crate::error::{HydrationMismatch, InvariantViolation, ReconcileError};
use crate::flags::Flags;
use crate::node::{NodeTag, PendingProps, RenderNode};
use crate::tree::{NodeId, RenderTree};
use crate::types::Props;
use core_types::{ContainerId, MarkupHandle};

/// Where to look for markup children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkupParent {
    Container(ContainerId),
    Node(MarkupHandle),
}

/// What a render node needs from the markup it claims.
#[derive(Clone, Copy, Debug)]
pub enum ClaimRequest<'a> {
    Element { name: &'a str, props: &'a Props },
    Text(&'a str),
}

/// Read-only view of externally produced markup.
pub trait ExternalMarkup {
    fn first_child(&self, parent: MarkupParent) -> Option<MarkupHandle>;

    fn next_sibling(&self, handle: MarkupHandle) -> Option<MarkupHandle>;

    /// The handle to bind when `handle` can stand in for `request`.
    fn can_claim(&self, handle: MarkupHandle, request: &ClaimRequest<'_>) -> Option<MarkupHandle>;

    fn text_content(&self, handle: MarkupHandle) -> Option<String>;
}

#[derive(Debug, Default)]
pub struct HydrationState {
    config: HydrationConfig,
    active: bool,
    parent: Option<NodeId>,
    next: Option<MarkupHandle>,
    recoverable: Vec<HydrationMismatch>,
}

impl HydrationState {
    pub fn new(config: HydrationConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &HydrationConfig {
        &self.config
    }

    pub fn is_hydrating(&self) -> bool {
        self.active
    }

    /// Markup the next claim will be tried against.
    pub fn cursor(&self) -> Option<MarkupHandle> {
        self.next
    }

    /// Starts matching below a root work-in-progress node.
    pub fn enter(
        &mut self,
        tree: &mut RenderTree,
        root: NodeId,
        markup: &dyn ExternalMarkup,
    ) -> Result<(), ReconcileError> {
        let node = tree.get_mut(root).ok_or(InvariantViolation::StaleNode(root))?;
        let Some(container) = node.container() else {
            debug_assert!(false, "hydration must start at a container node");
            return Err(InvariantViolation::DetachedNode(root).into());
        };
        node.flags |= Flags::HYDRATING;
        self.active = true;
        self.parent = Some(root);
        self.next = markup.first_child(MarkupParent::Container(container));
        log::debug!(target: "reconciler.hydration", "entered {root:?}, cursor {:?}", self.next);
        Ok(())
    }

    /// Tries to bind `node` to the markup at the cursor. Returns `true` when a
    /// markup node was claimed.
    ///
    /// Nodes other than host elements and text are transparent and ignored.
    pub fn try_claim(
        &mut self,
        tree: &mut RenderTree,
        node: NodeId,
        markup: &dyn ExternalMarkup,
    ) -> Result<bool, ReconcileError> {
        if !self.active {
            return Ok(false);
        }
        let target = tree.require(node)?;
        if !matches!(target.tag, NodeTag::Host | NodeTag::Text) || inside_portal(tree, node) {
            return Ok(false);
        }

        let Some(first) = self.next else {
            self.insert_non_hydrated(tree, node, HydrationMismatch::MissingMarkup { node })?;
            return Ok(false);
        };
        if let Some(bound) = claim(tree, node, first, markup) {
            self.bind(tree, node, bound, markup);
            return Ok(true);
        }

        if self.config.retry == MismatchRetry::NextSibling {
            let retried = markup
                .next_sibling(first)
                .and_then(|second| claim(tree, node, second, markup));
            if let Some(bound) = retried {
                // A successful retry is not a mismatch, even in strict mode.
                if let Some(parent) = self.parent {
                    schedule_markup_deletion(tree, parent, first);
                }
                log::trace!(
                    target: "reconciler.hydration",
                    "{node:?} claimed {bound:?} after skipping {first:?}"
                );
                self.bind(tree, node, bound, markup);
                return Ok(true);
            }
        }

        self.insert_non_hydrated(
            tree,
            node,
            HydrationMismatch::UnmatchedMarkup {
                node,
                handle: first,
            },
        )?;
        Ok(false)
    }

    /// Completes `node`. Returns `true` when it was matched against markup.
    pub fn finish_node(
        &mut self,
        tree: &mut RenderTree,
        node: NodeId,
        markup: &dyn ExternalMarkup,
    ) -> Result<bool, ReconcileError> {
        if self.parent != Some(node) {
            return Ok(false);
        }
        if !self.active {
            // `node` was inserted instead of claimed; matching resumes at its
            // siblings with the cursor untouched.
            self.pop_to_host_parent(tree, node);
            self.active = true;
            return Ok(false);
        }

        let (tag, handle) = {
            let target = tree.require(node)?;
            (target.tag, target.markup)
        };
        if matches!(tag, NodeTag::Host | NodeTag::Root) {
            let mut leftover = self.next;
            while let Some(excess) = leftover {
                leftover = markup.next_sibling(excess);
                self.delete_markup(tree, node, excess)?;
            }
        }
        if tag == NodeTag::Text {
            self.verify_text(tree, node, handle, markup)?;
        }

        let diverged = tree[node].flags.contains(Flags::HYDRATION_DIVERGED);
        self.pop_to_host_parent(tree, node);
        if diverged {
            if let Some(parent) = self.parent {
                tree[parent].flags |= Flags::HYDRATION_DIVERGED;
            }
        }

        if tag == NodeTag::Root {
            self.active = false;
            self.parent = None;
            self.next = None;
            log::debug!(target: "reconciler.hydration", "hydration of {node:?} finished (diverged: {diverged})");
        } else {
            self.next = handle.and_then(|h| markup.next_sibling(h));
        }
        Ok(true)
    }

    /// Stops matching and forgets the cursor.
    pub fn reset(&mut self) {
        self.active = false;
        self.parent = None;
        self.next = None;
        self.recoverable.clear();
    }

    pub fn recoverable_errors(&self) -> &[HydrationMismatch] {
        &self.recoverable
    }

    pub fn take_recoverable_errors(&mut self) -> Vec<HydrationMismatch> {
        std::mem::take(&mut self.recoverable)
    }

    fn bind(&mut self, tree: &mut RenderTree, node: NodeId, handle: MarkupHandle, markup: &dyn ExternalMarkup) {
        let target = &mut tree[node];
        target.markup = Some(handle);
        target.flags |= Flags::HYDRATING;
        self.parent = Some(node);
        // Text is a leaf: nothing to descend into.
        self.next = match target.tag {
            NodeTag::Host => markup.first_child(MarkupParent::Node(handle)),
            _ => None,
        };
        log::trace!(target: "reconciler.hydration", "{node:?} claimed {handle:?}");
    }

    fn insert_non_hydrated(
        &mut self,
        tree: &mut RenderTree,
        node: NodeId,
        mismatch: HydrationMismatch,
    ) -> Result<(), ReconcileError> {
        if self.config.strict {
            self.reset();
            return Err(mismatch.into());
        }
        log::debug!(target: "reconciler.hydration", "{mismatch}; inserting instead");
        let target = &mut tree[node];
        target.flags.remove(Flags::HYDRATING);
        target.flags |= Flags::PLACEMENT;
        if let Some(parent) = self.parent {
            tree[parent].flags |= Flags::HYDRATION_DIVERGED;
        }
        self.recoverable.push(mismatch);
        self.active = false;
        self.parent = Some(node);
        Ok(())
    }

    fn delete_markup(
        &mut self,
        tree: &mut RenderTree,
        parent: NodeId,
        handle: MarkupHandle,
    ) -> Result<(), ReconcileError> {
        let mismatch = HydrationMismatch::ExcessMarkup { parent, handle };
        if self.config.strict {
            self.reset();
            return Err(mismatch.into());
        }
        schedule_markup_deletion(tree, parent, handle);
        log::trace!(target: "reconciler.hydration", "{mismatch}");
        Ok(())
    }

    fn verify_text(
        &mut self,
        tree: &mut RenderTree,
        node: NodeId,
        handle: Option<MarkupHandle>,
        markup: &dyn ExternalMarkup,
    ) -> Result<(), ReconcileError> {
        let Some(expected) = (match &tree[node].pending_props {
            PendingProps::Text(text) => Some(text.clone()),
            _ => None,
        }) else {
            return Ok(());
        };
        let found = handle.and_then(|h| markup.text_content(h));
        if found.as_deref() == Some(&*expected) {
            return Ok(());
        }
        let mismatch = HydrationMismatch::TextContent {
            node,
            expected,
            found,
        };
        if self.config.strict {
            self.reset();
            return Err(mismatch.into());
        }
        log::debug!(target: "reconciler.hydration", "{mismatch}; patching text");
        tree[node].flags |= Flags::UPDATE | Flags::HYDRATION_DIVERGED;
        self.recoverable.push(mismatch);
        Ok(())
    }

    fn pop_to_host_parent(&mut self, tree: &RenderTree, node: NodeId) {
        let mut parent = tree.get(node).and_then(|n| n.parent);
        while let Some(p) = parent {
            match tree.get(p) {
                Some(n) if matches!(n.tag, NodeTag::Host | NodeTag::Root) => break,
                Some(n) => parent = n.parent,
                None => parent = None,
            }
        }
        self.parent = parent;
    }
}

/// `true` when `node` was bound to markup and nothing below it diverged.
pub fn is_fully_matched(tree: &RenderTree, node: NodeId) -> bool {
    tree.get(node).is_some_and(|n| {
        n.flags.contains(Flags::HYDRATING) && !n.flags.contains(Flags::HYDRATION_DIVERGED)
    })
}

fn claim(tree: &RenderTree, node: NodeId, handle: MarkupHandle, markup: &dyn ExternalMarkup) -> Option<MarkupHandle> {
    let target = tree.get(node)?;
    match target.tag {
        NodeTag::Host => {
            let name = target.element_type.as_ref()?.host_name()?;
            let empty = Props::default();
            let props = target.pending_props.props().unwrap_or(&empty);
            markup.can_claim(handle, &ClaimRequest::Element { name, props })
        }
        NodeTag::Text => {
            let text = target.pending_props.text()?;
            markup.can_claim(handle, &ClaimRequest::Text(text))
        }
        _ => None,
    }
}

fn schedule_markup_deletion(tree: &mut RenderTree, parent: NodeId, handle: MarkupHandle) {
    let mut placeholder = RenderNode::new(NodeTag::ExternalMarkup, None, PendingProps::Empty);
    placeholder.markup = Some(handle);
    placeholder.parent = Some(parent);
    let id = tree.alloc(placeholder);
    let parent_node = &mut tree[parent];
    parent_node.deletions.push(id);
    parent_node.flags |= Flags::CHILD_DELETION | Flags::HYDRATION_DIVERGED;
    log::trace!(target: "reconciler.hydration", "{handle:?} under {parent:?} scheduled for deletion");
}

fn inside_portal(tree: &RenderTree, node: NodeId) -> bool {
    let mut parent = tree.get(node).and_then(|n| n.parent);
    while let Some(p) = parent {
        match tree.get(p).map(|n| (n.tag, n.parent)) {
            Some((NodeTag::Portal, _)) => return true,
            Some((NodeTag::Host | NodeTag::Root, _)) | None => return false,
            Some((_, next)) => parent = next,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Element;

    /// Flat markup: every handle is a child of the container, in order.
    struct Flat(Vec<(&'static str, Option<&'static str>)>);

    impl ExternalMarkup for Flat {
        fn first_child(&self, parent: MarkupParent) -> Option<MarkupHandle> {
            match parent {
                MarkupParent::Container(_) if !self.0.is_empty() => Some(MarkupHandle(0)),
                _ => None,
            }
        }

        fn next_sibling(&self, handle: MarkupHandle) -> Option<MarkupHandle> {
            let next = handle.0 as usize + 1;
            (next < self.0.len()).then_some(MarkupHandle(next as u32))
        }

        fn can_claim(&self, handle: MarkupHandle, request: &ClaimRequest<'_>) -> Option<MarkupHandle> {
            let (name, _) = self.0.get(handle.0 as usize)?;
            match request {
                ClaimRequest::Element { name: wanted, .. } if wanted == name => Some(handle),
                ClaimRequest::Text(_) if *name == "#text" => Some(handle),
                _ => None,
            }
        }

        fn text_content(&self, handle: MarkupHandle) -> Option<String> {
            self.0.get(handle.0 as usize)?.1.map(str::to_string)
        }
    }

    fn setup(markup: &Flat) -> (RenderTree, NodeId, HydrationState) {
        let mut tree = RenderTree::new();
        let root = tree.create_root(ContainerId(1));
        let root = tree.root_current(root).expect("root");
        let mut state = HydrationState::new(HydrationConfig::default());
        state.enter(&mut tree, root, markup).expect("enter");
        (tree, root, state)
    }

    fn host(tree: &mut RenderTree, parent: NodeId, name: &str) -> NodeId {
        let mut node = RenderNode::from_element(&Element::host(name));
        node.parent = Some(parent);
        tree.alloc(node)
    }

    #[test]
    fn retry_claims_next_sibling_and_deletes_skipped() {
        let markup = Flat(vec![("p", None), ("div", None)]);
        let (mut tree, root, mut state) = setup(&markup);
        let div = host(&mut tree, root, "div");
        assert!(state.try_claim(&mut tree, div, &markup).expect("claim"));
        assert_eq!(tree[div].markup(), Some(MarkupHandle(1)));
        assert_eq!(tree[root].deletions().len(), 1);
        let skipped = tree[root].deletions()[0];
        assert_eq!(tree[skipped].tag(), NodeTag::ExternalMarkup);
        assert_eq!(tree[skipped].markup(), Some(MarkupHandle(0)));
    }

    #[test]
    fn lookahead_is_bounded_to_one_sibling() {
        let markup = Flat(vec![("p", None), ("p", None), ("div", None)]);
        let (mut tree, root, mut state) = setup(&markup);
        let div = host(&mut tree, root, "div");
        assert!(!state.try_claim(&mut tree, div, &markup).expect("claim"));
        assert!(tree[div].flags().contains(Flags::PLACEMENT));
        assert!(tree[div].markup().is_none());
        assert_eq!(state.recoverable_errors().len(), 1);
        assert!(!is_fully_matched(&tree, root));
    }

    #[test]
    fn strict_mode_escalates() {
        let markup = Flat(vec![("p", None)]);
        let mut tree = RenderTree::new();
        let root = tree.create_root(ContainerId(1));
        let root = tree.root_current(root).expect("root");
        let mut state = HydrationState::new(HydrationConfig {
            strict: true,
            retry: MismatchRetry::NextSibling,
        });
        state.enter(&mut tree, root, &markup).expect("enter");
        let div = host(&mut tree, root, "div");
        assert!(matches!(
            state.try_claim(&mut tree, div, &markup),
            Err(ReconcileError::Hydration(HydrationMismatch::UnmatchedMarkup { .. }))
        ));
        assert!(!state.is_hydrating());
    }

    #[test]
    fn strict_mode_accepts_a_successful_retry() {
        let markup = Flat(vec![("p", None), ("div", None)]);
        let mut tree = RenderTree::new();
        let root = tree.create_root(ContainerId(1));
        let root = tree.root_current(root).expect("root");
        let mut state = HydrationState::new(HydrationConfig {
            strict: true,
            retry: MismatchRetry::NextSibling,
        });
        state.enter(&mut tree, root, &markup).expect("enter");
        let div = host(&mut tree, root, "div");
        assert!(state.try_claim(&mut tree, div, &markup).expect("claim"));
        assert!(state.is_hydrating());
        assert_eq!(tree[div].markup(), Some(MarkupHandle(1)));
        assert_eq!(tree[root].deletions().len(), 1);
        assert!(state.recoverable_errors().is_empty());
    }

    #[test]
    fn text_mismatch_is_recoverable() {
        let markup = Flat(vec![("#text", Some("old"))]);
        let (mut tree, root, mut state) = setup(&markup);
        let mut text = RenderNode::new(NodeTag::Text, None, PendingProps::Text("new".into()));
        text.parent = Some(root);
        let text = tree.alloc(text);
        assert!(state.try_claim(&mut tree, text, &markup).expect("claim"));
        assert!(state.finish_node(&mut tree, text, &markup).expect("finish"));
        assert!(tree[text].flags().contains(Flags::UPDATE));
        assert!(matches!(
            state.recoverable_errors(),
            [HydrationMismatch::TextContent { .. }]
        ));
        assert!(state.finish_node(&mut tree, root, &markup).expect("root"));
        assert!(!is_fully_matched(&tree, root));
    }
}
