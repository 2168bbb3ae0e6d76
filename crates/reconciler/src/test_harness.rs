//! Reference driver for exercising the engine end to end.
//!
//! `WorkLoop` walks one pass depth-first (begin on the way down, complete on
//! the way up) the way a real scheduler would, but synchronously and without
//! time slicing. `MarkupDocument` is an in-memory markup tree for hydration.

use crate::child_reconciler::{ReconcileOutcome, clone_child_nodes, mount_children, reconcile_children};
use crate::config::{HydrationConfig, ReconcilerConfig};
use crate::context::{Counters, PassContext};
use crate::deferred::Wakeable;
use crate::error::{Diagnostic, HydrationMismatch, InvariantViolation, ReconcileError};
use crate::flags::Flags;
use crate::host::{DefaultHost, HostConfig};
use crate::hydration::{ClaimRequest, ExternalMarkup, HydrationState, MarkupParent};
use crate::node::{NodeTag, PendingProps};
use crate::tree::{NodeId, RenderTree, RootId};
use crate::types::{Child, Props};
use crate::update_queue::{Update, commit_update_queue, enqueue_update, process_update_queue};
use core_types::{ContainerId, Lanes, MarkupHandle};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Renders a component from its props and current state.
pub type RenderFn = Rc<dyn Fn(&Props, &Value) -> Child>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    Place,
    Update,
    Delete,
}

/// Structural effect of a finished pass, in tree order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Effect {
    pub kind: EffectKind,
    pub node: NodeId,
    pub label: String,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind {
            EffectKind::Place => "place",
            EffectKind::Update => "update",
            EffectKind::Delete => "delete",
        };
        write!(f, "{verb} {}", self.label)
    }
}

#[derive(Debug)]
pub struct PassReport {
    /// Work-in-progress root; becomes current on commit.
    pub finished: NodeId,
    pub suspended: Vec<(NodeId, Wakeable)>,
    pub errors: Vec<(NodeId, ReconcileError)>,
    pub diagnostics: Vec<Diagnostic>,
    pub recoverable: Vec<HydrationMismatch>,
    pub counters: Counters,
    pub skipped_lanes: Lanes,
    pub effects: Vec<Effect>,
}

struct Hydrating<'m> {
    state: &'m mut HydrationState,
    markup: &'m dyn ExternalMarkup,
}

pub struct WorkLoop<H: HostConfig = DefaultHost> {
    pub tree: RenderTree,
    host: H,
    root: RootId,
    components: HashMap<Arc<str>, RenderFn>,
    config: ReconcilerConfig,
}

impl WorkLoop<DefaultHost> {
    pub fn new(container: ContainerId) -> Self {
        Self::with_host(DefaultHost, container)
    }
}

impl<H: HostConfig> WorkLoop<H> {
    pub fn with_host(host: H, container: ContainerId) -> Self {
        let mut tree = RenderTree::new();
        let root = tree.create_root(container);
        Self {
            tree,
            host,
            root,
            components: HashMap::new(),
            config: ReconcilerConfig::default(),
        }
    }

    pub fn set_config(&mut self, config: ReconcilerConfig) {
        self.config = config;
    }

    pub fn register(&mut self, name: &str, render: impl Fn(&Props, &Value) -> Child + 'static) {
        self.components.insert(Arc::from(name), Rc::new(render));
    }

    pub fn root(&self) -> RootId {
        self.root
    }

    pub fn current_root(&self) -> Result<NodeId, ReconcileError> {
        self.tree
            .root_current(self.root)
            .ok_or_else(|| InvariantViolation::UnknownRoot(self.root).into())
    }

    /// Runs a pass that renders `children` under the root. Nothing is
    /// committed.
    pub fn render(&mut self, children: impl Into<Child>, lanes: Lanes) -> Result<PassReport, ReconcileError> {
        self.run_pass(Rc::new(children.into()), lanes, None)
    }

    /// Re-renders the committed root children, e.g. after `enqueue`.
    pub fn rerender(&mut self, lanes: Lanes) -> Result<PassReport, ReconcileError> {
        let current = self.current_root()?;
        let children = self.tree[current]
            .memoized_props()
            .and_then(PendingProps::children)
            .unwrap_or_else(|| Rc::new(Child::Empty));
        self.run_pass(children, lanes, None)
    }

    /// Runs a first pass that claims existing markup instead of creating nodes.
    pub fn hydrate(
        &mut self,
        children: impl Into<Child>,
        markup: &dyn ExternalMarkup,
        config: HydrationConfig,
        lanes: Lanes,
    ) -> Result<(PassReport, HydrationState), ReconcileError> {
        let mut state = HydrationState::new(config);
        let report = self.run_pass(
            Rc::new(children.into()),
            lanes,
            Some(Hydrating {
                state: &mut state,
                markup,
            }),
        )?;
        Ok((report, state))
    }

    pub fn commit(&mut self, report: &PassReport) -> Result<usize, ReconcileError> {
        let mut callbacks = 0usize;
        let mut stack = vec![report.finished];
        while let Some(id) = stack.pop() {
            let Some(node) = self.tree.get(id) else {
                continue;
            };
            if node.subtree_flags.intersects(Flags::CALLBACK) {
                stack.extend(self.tree.children(id));
            }
            if node.flags.contains(Flags::CALLBACK) && node.has_update_queue() {
                callbacks += commit_update_queue(&self.tree, id, false)?;
            }
        }
        self.tree.commit_root(self.root, report.finished)?;
        Ok(callbacks)
    }

    pub fn render_and_commit(&mut self, children: impl Into<Child>, lanes: Lanes) -> Result<PassReport, ReconcileError> {
        let report = self.render(children, lanes)?;
        self.commit(&report)?;
        Ok(report)
    }

    /// Throws away an uncommitted pass.
    pub fn abandon(&mut self, report: PassReport) -> usize {
        self.tree.discard_work_in_progress(report.finished)
    }

    pub fn enqueue(&mut self, node: NodeId, update: Update<Value, Props>) -> Result<Option<NodeId>, ReconcileError> {
        enqueue_update(&mut self.tree, node, update)
    }

    /// Committed children of `parent`, in order.
    pub fn children_of(&self, parent: NodeId) -> Vec<NodeId> {
        self.tree.children(parent).collect()
    }

    /// Committed node reached by following child indices from the root.
    pub fn find(&self, path: &[usize]) -> Option<NodeId> {
        let mut node = self.tree.root_current(self.root)?;
        for &index in path {
            node = self.tree.children(node).nth(index)?;
        }
        Some(node)
    }

    fn run_pass(
        &mut self,
        children: Rc<Child>,
        lanes: Lanes,
        mut hydrating: Option<Hydrating<'_>>,
    ) -> Result<PassReport, ReconcileError> {
        let current = self.current_root()?;
        let wip_root = self
            .tree
            .create_work_in_progress(current, PendingProps::Children(children))?;
        let mut pass = PassContext::with_config(self.config.clone(), lanes);
        let mut report = PassReport {
            finished: wip_root,
            suspended: Vec::new(),
            errors: Vec::new(),
            diagnostics: Vec::new(),
            recoverable: Vec::new(),
            counters: Counters::default(),
            skipped_lanes: Lanes::NONE,
            effects: Vec::new(),
        };
        if let Some(h) = hydrating.as_mut() {
            h.state.enter(&mut self.tree, wip_root, h.markup)?;
        }
        log::debug!(target: "reconciler.tree", "pass over {wip_root:?} at {lanes:?}");

        let mut next = Some(wip_root);
        while let Some(unit) = next {
            let result = self.begin_work(unit, &mut pass, &mut hydrating, &mut report);
            let child = match result {
                Ok(child) => child,
                Err(error) => {
                    if let Some(h) = hydrating.as_mut() {
                        h.state.reset();
                    }
                    pass.abandon();
                    self.tree.discard_work_in_progress(wip_root);
                    return Err(error);
                }
            };
            next = match child {
                Some(child) => Some(child),
                None => match self.complete_unit(unit, wip_root, &mut hydrating) {
                    Ok(next) => next,
                    Err(error) => {
                        if let Some(h) = hydrating.as_mut() {
                            h.state.reset();
                        }
                        pass.abandon();
                        self.tree.discard_work_in_progress(wip_root);
                        return Err(error);
                    }
                },
            };
        }

        if let Some(h) = hydrating.as_mut() {
            report.recoverable = h.state.take_recoverable_errors();
        }
        report.diagnostics = pass.take_diagnostics();
        report.skipped_lanes = pass.skipped_lanes();
        report.counters = pass.finish();
        report.effects = collect_effects(&self.tree, wip_root);
        Ok(report)
    }

    fn begin_work(
        &mut self,
        unit: NodeId,
        pass: &mut PassContext,
        hydrating: &mut Option<Hydrating<'_>>,
        report: &mut PassReport,
    ) -> Result<Option<NodeId>, ReconcileError> {
        let node = self.tree.require(unit)?;
        let tag = node.tag;
        let is_hydrating = hydrating.as_ref().is_some_and(|h| h.state.is_hydrating());

        if tag != NodeTag::Root && !is_hydrating {
            let unchanged = node
                .alternate
                .and_then(|alt| self.tree.get(alt))
                .and_then(|current| current.memoized_props.as_ref())
                .is_some_and(|memoized| memoized.ptr_eq(&node.pending_props));
            if unchanged && !node.lanes.intersects(pass.render_lanes()) {
                if node.child_lanes.intersects(pass.render_lanes()) {
                    clone_child_nodes(&mut self.tree, unit)?;
                    log::trace!(target: "reconciler.tree", "{unit:?} bailed out, descending for child lanes");
                    return Ok(self.tree[unit].child);
                }
                log::trace!(target: "reconciler.tree", "{unit:?} bailed out");
                return Ok(None);
            }
        }

        if let Some(h) = hydrating.as_mut() {
            h.state.try_claim(&mut self.tree, unit, h.markup)?;
        }

        let children = match tag {
            NodeTag::Root | NodeTag::Fragment | NodeTag::Portal | NodeTag::Host => {
                self.tree[unit].pending_props.children()
            }
            NodeTag::Component => Some(Rc::new(self.render_component(unit, pass)?)),
            NodeTag::Text | NodeTag::Pending | NodeTag::Throw | NodeTag::ExternalMarkup => None,
        };
        let Some(children) = children else {
            return Ok(None);
        };

        let lanes = pass.render_lanes();
        let outcome = if tag == NodeTag::Root && is_hydrating {
            let outcome = mount_children(&mut self.tree, &self.host, pass, unit, &children, lanes)?;
            self.tree[unit].child = outcome.first_child();
            outcome
        } else {
            reconcile_children(&mut self.tree, &self.host, pass, unit, &children, lanes)?
        };
        match &outcome {
            ReconcileOutcome::Ready(_) => {}
            ReconcileOutcome::Suspended { placeholder, wakeable } => {
                report.suspended.push((*placeholder, wakeable.clone()));
            }
            ReconcileOutcome::Errored { placeholder, error } => {
                report.errors.push((*placeholder, error.clone()));
            }
        }
        Ok(outcome.first_child())
    }

    fn render_component(&mut self, unit: NodeId, pass: &mut PassContext) -> Result<Child, ReconcileError> {
        if self.tree[unit].has_update_queue() {
            process_update_queue(&mut self.tree, unit, pass)?;
        }
        let node = &self.tree[unit];
        let props = node.pending_props.props().cloned().unwrap_or_default();
        let name = node.element_type.as_ref().map(|ty| ty.label().to_string());
        let render = name.and_then(|name| self.components.get(name.as_str()).cloned());
        Ok(match render {
            Some(render) => render(&props, node.state()),
            // Unknown components pass their children through.
            None => props.children().cloned().unwrap_or_default(),
        })
    }

    fn complete_unit(
        &mut self,
        unit: NodeId,
        wip_root: NodeId,
        hydrating: &mut Option<Hydrating<'_>>,
    ) -> Result<Option<NodeId>, ReconcileError> {
        let mut node = unit;
        loop {
            self.complete_work(node, hydrating)?;
            if node == wip_root {
                return Ok(None);
            }
            let current = self.tree.require(node)?;
            if let Some(sibling) = current.sibling {
                return Ok(Some(sibling));
            }
            node = current.parent.ok_or(InvariantViolation::DetachedNode(node))?;
        }
    }

    fn complete_work(&mut self, id: NodeId, hydrating: &mut Option<Hydrating<'_>>) -> Result<(), ReconcileError> {
        if let Some(h) = hydrating.as_mut() {
            h.state.finish_node(&mut self.tree, id, h.markup)?;
        }

        let node = self.tree.require(id)?;
        let bailed_out = node
            .alternate
            .and_then(|alt| self.tree.get(alt))
            .is_some_and(|current| current.child == node.child);
        let mut subtree_flags = Flags::NONE;
        let mut child_lanes = Lanes::NONE;
        for child in self.tree.children(id) {
            let child_node = &self.tree[child];
            child_lanes |= child_node.lanes | child_node.child_lanes;
            if !bailed_out {
                subtree_flags |= child_node.flags | child_node.subtree_flags;
            }
        }

        let node = &mut self.tree[id];
        node.memoized_props = Some(node.pending_props.clone());
        node.subtree_flags = subtree_flags;
        node.child_lanes = child_lanes;
        Ok(())
    }
}

/// Placement, update and deletion effects of a finished tree, skipping
/// subtrees without structural work.
pub fn collect_effects(tree: &RenderTree, root: NodeId) -> Vec<Effect> {
    fn walk(tree: &RenderTree, id: NodeId, out: &mut Vec<Effect>) {
        let Some(node) = tree.get(id) else {
            return;
        };
        for deleted in node.deletions() {
            if let Some(deleted_node) = tree.get(*deleted) {
                out.push(Effect {
                    kind: EffectKind::Delete,
                    node: *deleted,
                    label: deleted_node.label(),
                });
            }
        }
        if node.subtree_flags().intersects(Flags::STRUCTURAL) {
            for child in tree.children(id) {
                let child_node = &tree[child];
                if child_node.flags().contains(Flags::PLACEMENT) {
                    out.push(Effect {
                        kind: EffectKind::Place,
                        node: child,
                        label: child_node.label(),
                    });
                }
                if child_node.flags().contains(Flags::UPDATE) {
                    out.push(Effect {
                        kind: EffectKind::Update,
                        node: child,
                        label: child_node.label(),
                    });
                }
                walk(tree, child, out);
            }
        }
    }

    let mut out = Vec::new();
    walk(tree, root, &mut out);
    out
}

/// Why a markup mutation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupError {
    UnknownHandle(MarkupHandle),
    CycleDetected { parent: MarkupHandle, child: MarkupHandle },
    InvalidParent(MarkupHandle),
}

enum MarkupKind {
    Element { name: Arc<str>, attrs: Vec<(Arc<str>, String)> },
    Text(String),
}

struct MarkupRecord {
    kind: MarkupKind,
    parent: Option<MarkupParent>,
    children: Vec<MarkupHandle>,
}

/// In-memory markup tree. Element names match case-insensitively.
#[derive(Default)]
pub struct MarkupDocument {
    nodes: Vec<MarkupRecord>,
    containers: HashMap<ContainerId, Vec<MarkupHandle>>,
}

impl MarkupDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn element(&mut self, name: &str) -> MarkupHandle {
        self.insert(MarkupKind::Element {
            name: Arc::from(name),
            attrs: Vec::new(),
        })
    }

    pub fn text(&mut self, text: &str) -> MarkupHandle {
        self.insert(MarkupKind::Text(text.to_string()))
    }

    pub fn set_attr(&mut self, handle: MarkupHandle, name: &str, value: &str) -> Result<(), MarkupError> {
        let record = self
            .nodes
            .get_mut(handle.0 as usize)
            .ok_or(MarkupError::UnknownHandle(handle))?;
        match &mut record.kind {
            MarkupKind::Element { attrs, .. } => {
                attrs.retain(|(existing, _)| &**existing != name);
                attrs.push((Arc::from(name), value.to_string()));
                Ok(())
            }
            MarkupKind::Text(_) => Err(MarkupError::InvalidParent(handle)),
        }
    }

    pub fn attr(&self, handle: MarkupHandle, name: &str) -> Option<&str> {
        match &self.nodes.get(handle.0 as usize)?.kind {
            MarkupKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(existing, _)| &**existing == name)
                .map(|(_, value)| value.as_str()),
            MarkupKind::Text(_) => None,
        }
    }

    pub fn append_child(&mut self, parent: MarkupParent, child: MarkupHandle) -> Result<(), MarkupError> {
        let child_index = child.0 as usize;
        if child_index >= self.nodes.len() {
            debug_assert!(false, "unknown markup handle");
            return Err(MarkupError::UnknownHandle(child));
        }
        if self.nodes[child_index].parent.is_some() {
            debug_assert!(false, "markup node already has a parent");
            return Err(MarkupError::InvalidParent(child));
        }
        match parent {
            MarkupParent::Container(container) => {
                self.containers.entry(container).or_default().push(child);
            }
            MarkupParent::Node(handle) => {
                if handle == child || self.is_descendant(child, handle) {
                    debug_assert!(false, "cannot create cycle");
                    return Err(MarkupError::CycleDetected { parent: handle, child });
                }
                let record = self
                    .nodes
                    .get_mut(handle.0 as usize)
                    .ok_or(MarkupError::UnknownHandle(handle))?;
                if !matches!(record.kind, MarkupKind::Element { .. }) {
                    debug_assert!(false, "text cannot have children");
                    return Err(MarkupError::InvalidParent(handle));
                }
                record.children.push(child);
            }
        }
        self.nodes[child_index].parent = Some(parent);
        Ok(())
    }

    /// Shorthand for building fixtures: `name` starting with `#` creates text.
    pub fn append(&mut self, parent: MarkupParent, name: &str) -> Result<MarkupHandle, MarkupError> {
        let handle = match name.strip_prefix('#') {
            Some(text) => self.text(text),
            None => self.element(name),
        };
        self.append_child(parent, handle)?;
        Ok(handle)
    }

    /// Top-level markup of `container`, rendered one node per line.
    pub fn outline(&self, container: ContainerId) -> Vec<String> {
        fn walk(doc: &MarkupDocument, handle: MarkupHandle, depth: usize, out: &mut Vec<String>) {
            let Some(record) = doc.nodes.get(handle.0 as usize) else {
                return;
            };
            let indent = "  ".repeat(depth);
            match &record.kind {
                MarkupKind::Element { name, .. } => out.push(format!("{indent}<{name}>")),
                MarkupKind::Text(text) => out.push(format!("{indent}\"{text}\"")),
            }
            for child in &record.children {
                walk(doc, *child, depth + 1, out);
            }
        }

        let mut out = Vec::new();
        for handle in self.containers.get(&container).into_iter().flatten() {
            walk(self, *handle, 0, &mut out);
        }
        out
    }

    fn insert(&mut self, kind: MarkupKind) -> MarkupHandle {
        let handle = MarkupHandle(self.nodes.len() as u32);
        self.nodes.push(MarkupRecord {
            kind,
            parent: None,
            children: Vec::new(),
        });
        handle
    }

    fn is_descendant(&self, ancestor: MarkupHandle, maybe_descendant: MarkupHandle) -> bool {
        let Some(record) = self.nodes.get(ancestor.0 as usize) else {
            return false;
        };
        let mut stack: Vec<MarkupHandle> = record.children.clone();
        while let Some(current) = stack.pop() {
            if current == maybe_descendant {
                return true;
            }
            if let Some(record) = self.nodes.get(current.0 as usize) {
                stack.extend(record.children.iter().copied());
            }
        }
        false
    }

    fn siblings(&self, handle: MarkupHandle) -> Option<&[MarkupHandle]> {
        match self.nodes.get(handle.0 as usize)?.parent? {
            MarkupParent::Container(container) => self.containers.get(&container).map(Vec::as_slice),
            MarkupParent::Node(parent) => self.nodes.get(parent.0 as usize).map(|p| p.children.as_slice()),
        }
    }
}

impl ExternalMarkup for MarkupDocument {
    fn first_child(&self, parent: MarkupParent) -> Option<MarkupHandle> {
        match parent {
            MarkupParent::Container(container) => self.containers.get(&container)?.first().copied(),
            MarkupParent::Node(handle) => self.nodes.get(handle.0 as usize)?.children.first().copied(),
        }
    }

    fn next_sibling(&self, handle: MarkupHandle) -> Option<MarkupHandle> {
        let siblings = self.siblings(handle)?;
        let position = siblings.iter().position(|h| *h == handle)?;
        siblings.get(position + 1).copied()
    }

    fn can_claim(&self, handle: MarkupHandle, request: &ClaimRequest<'_>) -> Option<MarkupHandle> {
        let record = self.nodes.get(handle.0 as usize)?;
        match (&record.kind, request) {
            (MarkupKind::Element { name, .. }, ClaimRequest::Element { name: wanted, .. })
                if name.eq_ignore_ascii_case(wanted) =>
            {
                Some(handle)
            }
            (MarkupKind::Text(_), ClaimRequest::Text(_)) => Some(handle),
            _ => None,
        }
    }

    fn text_content(&self, handle: MarkupHandle) -> Option<String> {
        match &self.nodes.get(handle.0 as usize)?.kind {
            MarkupKind::Text(text) => Some(text.clone()),
            MarkupKind::Element { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Element;

    #[test]
    fn markup_document_walks_siblings_in_order() {
        let mut doc = MarkupDocument::new();
        let root = MarkupParent::Container(ContainerId(1));
        let a = doc.append(root, "div").expect("a");
        let b = doc.append(root, "#hello").expect("b");
        assert_eq!(doc.first_child(root), Some(a));
        assert_eq!(doc.next_sibling(a), Some(b));
        assert_eq!(doc.next_sibling(b), None);
        assert_eq!(doc.text_content(b).as_deref(), Some("hello"));
        assert_eq!(doc.outline(ContainerId(1)), vec!["<div>", "\"hello\""]);

        doc.set_attr(a, "id", "main").expect("attr");
        doc.set_attr(a, "id", "top").expect("attr again");
        assert_eq!(doc.attr(a, "id"), Some("top"));
        assert_eq!(doc.set_attr(b, "id", "x"), Err(MarkupError::InvalidParent(b)));
    }

    #[test]
    fn markup_document_rejects_cycles() {
        let mut doc = MarkupDocument::new();
        let outer = doc.append(MarkupParent::Container(ContainerId(1)), "div").expect("outer");
        let inner = doc.append(MarkupParent::Node(outer), "span").expect("inner");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            doc.append_child(MarkupParent::Node(inner), outer)
        }));
        // Debug builds assert; release builds return the error.
        if let Ok(result) = result {
            assert!(result.is_err());
        }
    }

    #[test]
    fn work_loop_reports_effects_in_tree_order() {
        let mut work = WorkLoop::new(ContainerId(1));
        let report = work
            .render_and_commit(
                Element::host("ul").with_children(vec![
                    Element::host("li").keyed("a"),
                    Element::host("li").keyed("b"),
                ]),
                Lanes::DEFAULT,
            )
            .expect("render");
        let effects: Vec<String> = report.effects.iter().map(ToString::to_string).collect();
        assert_eq!(effects, vec!["place ul"]);

        let report = work
            .render_and_commit(
                Element::host("ul").with_children(vec![Element::host("li").keyed("b")]),
                Lanes::DEFAULT,
            )
            .expect("render");
        let effects: Vec<String> = report.effects.iter().map(ToString::to_string).collect();
        assert_eq!(effects, vec!["delete a"]);
    }
}
