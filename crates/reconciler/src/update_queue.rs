//! Priority-tiered pending-mutation queue.
//!
//! Contract:
//! - Records are kept in insertion order; lanes only decide whether a record is
//!   applied in a given pass, never where it sits.
//! - At the first skipped record, the state computed so far becomes the next
//!   base state, and every later record (applied or not) is retained after the
//!   skipped one. Applied records are retained with `Lanes::NONE` so they are
//!   never skipped again.
//! - Folding across any number of passes at widening lanes yields the same state
//!   as folding everything in one pass.
//! - New records go to a buffer shared by the current and work-in-progress
//!   queues, so discarding either version never loses an update.

use crate::context::PassContext;
use crate::error::{InvariantViolation, ReconcileError};
use crate::flags::Flags;
use crate::tree::{NodeId, RenderTree};
use crate::types::Props;
use core_types::Lanes;
use serde_json::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// State that supports shallow partial merges.
pub trait Mergeable: Clone {
    fn merge_partial(&self, partial: &Self) -> Self;
}

impl Mergeable for Value {
    /// Object partials are merged key by key into a copy of `self`; `null` is a
    /// no-op and any other partial replaces the state.
    fn merge_partial(&self, partial: &Value) -> Value {
        match (self, partial) {
            (_, Value::Null) => self.clone(),
            (Value::Object(base), Value::Object(patch)) => {
                let mut merged = base.clone();
                for (key, value) in patch {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            (_, other) => other.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    Replace,
    Merge,
    /// Leaves state untouched but asks the caller to re-render.
    ForceNoop,
    /// Error-boundary update: moves the node from should-capture to
    /// did-capture, then merges.
    Captured,
}

pub type Reducer<S, P> = Rc<dyn Fn(&S, &P) -> Option<S>>;
pub type Callback = Rc<dyn Fn()>;

pub enum Payload<S, P> {
    Empty,
    Value(S),
    /// Computed from the previous state and the next props. `None` means
    /// "nothing to apply".
    Reducer(Reducer<S, P>),
}

impl<S: Clone, P> Clone for Payload<S, P> {
    fn clone(&self) -> Self {
        match self {
            Payload::Empty => Payload::Empty,
            Payload::Value(value) => Payload::Value(value.clone()),
            Payload::Reducer(reducer) => Payload::Reducer(Rc::clone(reducer)),
        }
    }
}

pub struct Update<S, P> {
    pub lane: Lanes,
    pub kind: UpdateKind,
    pub payload: Payload<S, P>,
    pub callback: Option<Callback>,
}

impl<S: Clone, P> Update<S, P> {
    pub fn new(lane: Lanes, kind: UpdateKind, payload: Payload<S, P>) -> Self {
        Self {
            lane,
            kind,
            payload,
            callback: None,
        }
    }

    pub fn replace(lane: Lanes, state: S) -> Self {
        Self::new(lane, UpdateKind::Replace, Payload::Value(state))
    }

    pub fn merge(lane: Lanes, partial: S) -> Self {
        Self::new(lane, UpdateKind::Merge, Payload::Value(partial))
    }

    pub fn reducer(
        lane: Lanes,
        kind: UpdateKind,
        reducer: impl Fn(&S, &P) -> Option<S> + 'static,
    ) -> Self {
        Self::new(lane, kind, Payload::Reducer(Rc::new(reducer)))
    }

    pub fn force(lane: Lanes) -> Self {
        Self::new(lane, UpdateKind::ForceNoop, Payload::Empty)
    }

    pub fn captured(lane: Lanes, payload: Payload<S, P>) -> Self {
        Self::new(lane, UpdateKind::Captured, payload)
    }

    pub fn with_callback(mut self, callback: impl Fn() + 'static) -> Self {
        self.callback = Some(Rc::new(callback));
        self
    }

    /// Copy kept after an earlier record was skipped. It carries no lane and no
    /// callback: it has already been applied once.
    fn rebased(&self) -> Self {
        Self {
            lane: Lanes::NONE,
            kind: self.kind,
            payload: self.payload.clone(),
            callback: None,
        }
    }
}

impl<S, P> fmt::Debug for Update<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("lane", &self.lane)
            .field("kind", &self.kind)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

struct SharedQueue<S, P> {
    pending: Vec<Rc<Update<S, P>>>,
    lanes: Lanes,
    hidden_callbacks: Vec<Callback>,
}

/// Outcome of folding a queue for one pass.
#[derive(Clone, Debug)]
pub struct ProcessResult<S> {
    pub state: S,
    /// Lanes of records left for a later pass.
    pub remaining_lanes: Lanes,
    pub force_update: bool,
    pub flags: Flags,
    pub applied: usize,
    pub skipped: usize,
}

pub struct UpdateQueue<S, P> {
    base_state: S,
    base_updates: Rc<Vec<Rc<Update<S, P>>>>,
    shared: Rc<RefCell<SharedQueue<S, P>>>,
    callbacks: Vec<Callback>,
}

impl<S: Mergeable, P> UpdateQueue<S, P> {
    pub fn new(base_state: S) -> Self {
        Self {
            base_state,
            base_updates: Rc::new(Vec::new()),
            shared: Rc::new(RefCell::new(SharedQueue {
                pending: Vec::new(),
                lanes: Lanes::NONE,
                hidden_callbacks: Vec::new(),
            })),
            callbacks: Vec::new(),
        }
    }

    pub fn base_state(&self) -> &S {
        &self.base_state
    }

    /// Lanes of the records retained from earlier passes.
    pub fn base_lanes(&self) -> Lanes {
        self.base_updates
            .iter()
            .fold(Lanes::NONE, |lanes, update| lanes | update.lane)
    }

    pub fn base_len(&self) -> usize {
        self.base_updates.len()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.borrow().pending.len()
    }

    pub fn pending_lanes(&self) -> Lanes {
        self.shared.borrow().lanes
    }

    pub fn shares_buffer_with(&self, other: &UpdateQueue<S, P>) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Work-in-progress copy: same base list and shared buffer, no callbacks.
    pub fn fork(&self) -> Self {
        Self {
            base_state: self.base_state.clone(),
            base_updates: Rc::clone(&self.base_updates),
            shared: Rc::clone(&self.shared),
            callbacks: Vec::new(),
        }
    }

    /// Appends to the shared buffer. Takes `&self`: the buffer is reachable
    /// from both versions of the node.
    pub fn enqueue(&self, update: Update<S, P>) {
        let mut shared = self.shared.borrow_mut();
        shared.lanes |= update.lane;
        shared.pending.push(Rc::new(update));
    }

    /// Appends directly to this queue's base list, bypassing the shared buffer.
    pub fn push_base(&mut self, update: Update<S, P>) {
        Rc::make_mut(&mut self.base_updates).push(Rc::new(update));
    }

    fn take_pending(&self) -> Vec<Rc<Update<S, P>>> {
        std::mem::take(&mut self.shared.borrow_mut().pending)
    }

    /// Folds the queue for a pass.
    ///
    /// `current` is the committed counterpart; pending records are appended to
    /// its base list too so they survive if this work is discarded.
    pub fn process(
        &mut self,
        current: Option<&mut UpdateQueue<S, P>>,
        render_lanes: Lanes,
        root_render_lanes: Lanes,
        props: &P,
    ) -> ProcessResult<S> {
        let pending = self.take_pending();
        let mut list: Vec<Rc<Update<S, P>>> = self.base_updates.as_ref().clone();
        if !pending.is_empty() {
            list.extend(pending.iter().cloned());
            if let Some(current) = current {
                Rc::make_mut(&mut current.base_updates).extend(pending.iter().cloned());
            }
        }

        let mut state = self.base_state.clone();
        let mut new_base_state: Option<S> = None;
        let mut new_base_updates: Vec<Rc<Update<S, P>>> = Vec::new();
        let mut remaining_lanes = Lanes::NONE;
        let mut force_update = false;
        let mut flags = Flags::NONE;
        let mut applied = 0usize;
        let mut skipped = 0usize;

        let mut cursor = 0usize;
        loop {
            while cursor < list.len() {
                let update = Rc::clone(&list[cursor]);
                cursor += 1;

                let lane = update.lane.remove(Lanes::OFFSCREEN);
                let hidden = lane != update.lane;
                let should_skip = if hidden {
                    !root_render_lanes.includes(lane)
                } else {
                    !render_lanes.includes(lane)
                };

                if should_skip {
                    if new_base_updates.is_empty() {
                        new_base_state = Some(state.clone());
                    }
                    remaining_lanes |= update.lane;
                    new_base_updates.push(update);
                    skipped += 1;
                    continue;
                }

                if !new_base_updates.is_empty() {
                    new_base_updates.push(Rc::new(update.rebased()));
                }
                state = apply_update(&update, state, props, &mut force_update, &mut flags);
                applied += 1;
                if let Some(callback) = &update.callback {
                    flags |= Flags::CALLBACK;
                    if hidden {
                        flags |= Flags::VISIBILITY;
                    }
                    self.callbacks.push(Rc::clone(callback));
                }
            }

            // Records enqueued while folding (e.g. by a reducer) are folded in
            // the same pass.
            let more = self.take_pending();
            if more.is_empty() {
                break;
            }
            log::trace!(target: "reconciler.queue", "{} records enqueued mid-fold", more.len());
            list.extend(more);
        }

        self.base_state = match new_base_state {
            Some(base) => base,
            None => state.clone(),
        };
        self.base_updates = Rc::new(new_base_updates);
        self.shared.borrow_mut().lanes = Lanes::NONE;

        log::trace!(
            target: "reconciler.queue",
            "folded {applied} records, skipped {skipped}, remaining lanes {remaining_lanes:?}"
        );
        ProcessResult {
            state,
            remaining_lanes,
            force_update,
            flags,
            applied,
            skipped,
        }
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    /// Runs callbacks collected by `process`, in record order.
    pub fn commit_callbacks(&mut self) -> usize {
        let callbacks = std::mem::take(&mut self.callbacks);
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }

    /// Parks collected callbacks until the hidden subtree is revealed.
    pub fn defer_hidden_callbacks(&mut self) {
        let callbacks = std::mem::take(&mut self.callbacks);
        self.shared.borrow_mut().hidden_callbacks.extend(callbacks);
    }

    pub fn commit_hidden_callbacks(&self) -> usize {
        let callbacks = std::mem::take(&mut self.shared.borrow_mut().hidden_callbacks);
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }
}

fn apply_update<S: Mergeable, P>(
    update: &Update<S, P>,
    previous: S,
    props: &P,
    force_update: &mut bool,
    flags: &mut Flags,
) -> S {
    match update.kind {
        UpdateKind::Replace => match &update.payload {
            Payload::Value(value) => value.clone(),
            Payload::Reducer(reducer) => reducer(&previous, props).unwrap_or(previous),
            Payload::Empty => previous,
        },
        UpdateKind::Captured => {
            flags.remove(Flags::SHOULD_CAPTURE);
            flags.insert(Flags::DID_CAPTURE);
            merge_payload(&update.payload, previous, props)
        }
        UpdateKind::Merge => merge_payload(&update.payload, previous, props),
        UpdateKind::ForceNoop => {
            *force_update = true;
            previous
        }
    }
}

fn merge_payload<S: Mergeable, P>(payload: &Payload<S, P>, previous: S, props: &P) -> S {
    let partial = match payload {
        Payload::Empty => None,
        Payload::Value(value) => Some(value.clone()),
        Payload::Reducer(reducer) => reducer(&previous, props),
    };
    match partial {
        Some(partial) => previous.merge_partial(&partial),
        None => previous,
    }
}

impl<S: fmt::Debug, P> fmt::Debug for UpdateQueue<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.shared.try_borrow().map(|shared| shared.pending.len()).ok();
        f.debug_struct("UpdateQueue")
            .field("base_state", &self.base_state)
            .field("base_updates", &self.base_updates.len())
            .field("pending", &pending)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Queue type carried by component nodes.
pub type NodeQueue = UpdateQueue<Value, Props>;

/// Gives a component node its queue and initial state.
pub fn initialize_update_queue(
    tree: &mut RenderTree,
    node: NodeId,
    base_state: Value,
) -> Result<(), ReconcileError> {
    let target = tree.get_mut(node).ok_or(InvariantViolation::StaleNode(node))?;
    target.memoized_state = base_state.clone();
    target.update_queue = Some(Rc::new(RefCell::new(NodeQueue::new(base_state))));
    Ok(())
}

/// Appends `update` to the node's shared buffer and marks its lane up to the
/// root. Returns the root, or `None` when the node is not attached to one.
pub fn enqueue_update(
    tree: &mut RenderTree,
    node: NodeId,
    update: Update<Value, Props>,
) -> Result<Option<NodeId>, ReconcileError> {
    let queue = tree
        .require(node)?
        .update_queue
        .clone()
        .ok_or(InvariantViolation::MissingUpdateQueue(node))?;
    let lane = update.lane;
    queue.borrow().enqueue(update);
    log::trace!(target: "reconciler.queue", "enqueued {lane:?} on {node:?}");
    Ok(mark_update_lane_from_node_to_root(tree, node, lane))
}

fn mark_update_lane_from_node_to_root(tree: &mut RenderTree, node: NodeId, lane: Lanes) -> Option<NodeId> {
    let alternate = {
        let target = tree.get_mut(node)?;
        target.lanes |= lane;
        target.alternate
    };
    if let Some(alt) = alternate.and_then(|alt| tree.get_mut(alt)) {
        alt.lanes |= lane;
    }

    let mut last = node;
    let mut parent = tree.get(node)?.parent;
    while let Some(p) = parent {
        let Some(parent_node) = tree.get_mut(p) else {
            break;
        };
        parent_node.child_lanes |= lane;
        let alternate = parent_node.alternate;
        let next = parent_node.parent;
        if let Some(alt) = alternate.and_then(|alt| tree.get_mut(alt)) {
            alt.child_lanes |= lane;
        }
        last = p;
        parent = next;
    }
    match tree.get(last)?.tag {
        crate::node::NodeTag::Root => Some(last),
        _ => None,
    }
}

/// Gives the work-in-progress node its own queue object when it still shares
/// the current one. Base list and shared buffer stay shared.
pub fn clone_update_queue(tree: &mut RenderTree, wip: NodeId) -> Result<(), ReconcileError> {
    let node = tree.require(wip)?;
    let Some(current) = node.alternate else {
        return Ok(());
    };
    let (Some(wip_queue), Some(current_queue)) = (
        node.update_queue.clone(),
        tree.get(current).and_then(|cur| cur.update_queue.clone()),
    ) else {
        return Ok(());
    };
    if Rc::ptr_eq(&wip_queue, &current_queue) {
        let forked = current_queue.borrow().fork();
        tree[wip].update_queue = Some(Rc::new(RefCell::new(forked)));
    }
    Ok(())
}

/// Folds the node's queue at the pass lanes and stores the resulting state.
pub fn process_update_queue(
    tree: &mut RenderTree,
    wip: NodeId,
    pass: &mut PassContext,
) -> Result<ProcessResult<Value>, ReconcileError> {
    clone_update_queue(tree, wip)?;
    let node = tree.require(wip)?;
    let queue = node
        .update_queue
        .clone()
        .ok_or(InvariantViolation::MissingUpdateQueue(wip))?;
    let props = node.pending_props.props().cloned().unwrap_or_default();
    let current_queue = node
        .alternate
        .and_then(|alt| tree.get(alt))
        .and_then(|alt| alt.update_queue.clone())
        .filter(|other| !Rc::ptr_eq(other, &queue));

    let result = {
        let mut queue = queue.borrow_mut();
        let mut current = current_queue.as_ref().map(|other| other.borrow_mut());
        queue.process(
            current.as_deref_mut(),
            pass.render_lanes(),
            pass.root_render_lanes(),
            &props,
        )
    };

    let node = &mut tree[wip];
    node.memoized_state = result.state.clone();
    node.lanes = result.remaining_lanes;
    node.flags |= result.flags;
    if result.flags.contains(Flags::DID_CAPTURE) {
        node.flags.remove(Flags::SHOULD_CAPTURE);
    }
    pass.mark_skipped(result.remaining_lanes);
    let counters = pass.counters_mut();
    counters.updates_applied += result.applied as u64;
    counters.updates_skipped += result.skipped as u64;
    Ok(result)
}

/// Queues an error-capture update on the work-in-progress version only.
pub fn enqueue_captured_update(
    tree: &mut RenderTree,
    wip: NodeId,
    update: Update<Value, Props>,
) -> Result<(), ReconcileError> {
    clone_update_queue(tree, wip)?;
    let node = tree.get_mut(wip).ok_or(InvariantViolation::StaleNode(wip))?;
    let queue = node
        .update_queue
        .clone()
        .ok_or(InvariantViolation::MissingUpdateQueue(wip))?;
    node.flags |= Flags::SHOULD_CAPTURE;
    node.lanes |= update.lane;
    queue.borrow_mut().push_base(update);
    Ok(())
}

/// Runs the callbacks collected while processing `node`. Hidden nodes park them
/// instead.
pub fn commit_update_queue(tree: &RenderTree, node: NodeId, hidden: bool) -> Result<usize, ReconcileError> {
    let queue = tree
        .require(node)?
        .update_queue
        .clone()
        .ok_or(InvariantViolation::MissingUpdateQueue(node))?;
    let mut queue = queue.borrow_mut();
    if hidden {
        queue.defer_hidden_callbacks();
        return Ok(0);
    }
    Ok(queue.commit_callbacks())
}
