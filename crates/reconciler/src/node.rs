//! Render node record stored in the `RenderTree` arena.

use crate::deferred::Wakeable;
use crate::error::ReconcileError;
use crate::flags::Flags;
use crate::tree::NodeId;
use crate::types::{Child, Element, ElementType, Key, Props};
use crate::update_queue::NodeQueue;
use core_types::{ContainerId, Lanes, MarkupHandle};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Root,
    Host,
    Text,
    Fragment,
    Portal,
    Component,
    /// Stand-in for children whose description is still deferred.
    Pending,
    /// Stand-in for children whose reconciliation failed.
    Throw,
    /// External markup scheduled for deletion during hydration.
    ExternalMarkup,
}

/// Input for the next pass, interpreted per tag.
#[derive(Clone, Debug, Default)]
pub enum PendingProps {
    #[default]
    Empty,
    /// Host and component nodes.
    Props(Props),
    /// Text nodes.
    Text(Arc<str>),
    /// Roots, fragments and portals.
    Children(Rc<Child>),
}

impl PendingProps {
    pub fn props(&self) -> Option<&Props> {
        match self {
            PendingProps::Props(props) => Some(props),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            PendingProps::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Children description for any tag that has one.
    pub fn children(&self) -> Option<Rc<Child>> {
        match self {
            PendingProps::Props(props) => Some(props.children_rc()),
            PendingProps::Children(children) => Some(Rc::clone(children)),
            PendingProps::Text(_) | PendingProps::Empty => None,
        }
    }

    pub(crate) fn ptr_eq(&self, other: &PendingProps) -> bool {
        match (self, other) {
            (PendingProps::Props(a), PendingProps::Props(b)) => a.ptr_eq(b),
            (PendingProps::Text(a), PendingProps::Text(b)) => Arc::ptr_eq(a, b),
            (PendingProps::Children(a), PendingProps::Children(b)) => Rc::ptr_eq(a, b),
            (PendingProps::Empty, PendingProps::Empty) => true,
            _ => false,
        }
    }
}

/// Tag-specific data that is not part of the props.
#[derive(Clone, Debug, Default)]
pub enum NodePayload {
    #[default]
    None,
    Container(ContainerId),
    Suspended(Wakeable),
    Error(ReconcileError),
}

#[derive(Debug)]
pub struct RenderNode {
    pub(crate) tag: NodeTag,
    pub(crate) key: Option<Key>,
    pub(crate) element_type: Option<ElementType>,
    pub(crate) index: usize,
    pub(crate) pending_props: PendingProps,
    pub(crate) memoized_props: Option<PendingProps>,
    pub(crate) memoized_state: Value,
    pub(crate) update_queue: Option<Rc<RefCell<NodeQueue>>>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) child: Option<NodeId>,
    pub(crate) sibling: Option<NodeId>,
    pub(crate) alternate: Option<NodeId>,
    pub(crate) flags: Flags,
    pub(crate) subtree_flags: Flags,
    pub(crate) deletions: Vec<NodeId>,
    pub(crate) lanes: Lanes,
    pub(crate) child_lanes: Lanes,
    pub(crate) markup: Option<MarkupHandle>,
    pub(crate) payload: NodePayload,
}

impl RenderNode {
    pub fn new(tag: NodeTag, key: Option<Key>, pending_props: PendingProps) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            index: 0,
            pending_props,
            memoized_props: None,
            memoized_state: Value::Null,
            update_queue: None,
            parent: None,
            child: None,
            sibling: None,
            alternate: None,
            flags: Flags::NONE,
            subtree_flags: Flags::NONE,
            deletions: Vec::new(),
            lanes: Lanes::NONE,
            child_lanes: Lanes::NONE,
            markup: None,
            payload: NodePayload::None,
        }
    }

    /// Plain node for an element description. Fragments become `Fragment`
    /// nodes holding the element's children.
    pub fn from_element(element: &Element) -> Self {
        let (tag, pending) = match &element.ty {
            ElementType::Host(_) => (NodeTag::Host, PendingProps::Props(element.props.clone())),
            ElementType::Component(_) => {
                (NodeTag::Component, PendingProps::Props(element.props.clone()))
            }
            ElementType::Fragment => (
                NodeTag::Fragment,
                PendingProps::Children(element.props.children_rc()),
            ),
        };
        let mut node = Self::new(tag, element.key.clone(), pending);
        node.element_type = Some(element.ty.clone());
        node
    }

    pub fn tag(&self) -> NodeTag {
        self.tag
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn element_type(&self) -> Option<&ElementType> {
        self.element_type.as_ref()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pending_props(&self) -> &PendingProps {
        &self.pending_props
    }

    pub fn memoized_props(&self) -> Option<&PendingProps> {
        self.memoized_props.as_ref()
    }

    pub fn state(&self) -> &Value {
        &self.memoized_state
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn child(&self) -> Option<NodeId> {
        self.child
    }

    pub fn sibling(&self) -> Option<NodeId> {
        self.sibling
    }

    pub fn alternate(&self) -> Option<NodeId> {
        self.alternate
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn subtree_flags(&self) -> Flags {
        self.subtree_flags
    }

    pub fn deletions(&self) -> &[NodeId] {
        &self.deletions
    }

    pub fn lanes(&self) -> Lanes {
        self.lanes
    }

    pub fn child_lanes(&self) -> Lanes {
        self.child_lanes
    }

    pub fn markup(&self) -> Option<MarkupHandle> {
        self.markup
    }

    pub fn payload(&self) -> &NodePayload {
        &self.payload
    }

    pub fn has_update_queue(&self) -> bool {
        self.update_queue.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        match self.tag {
            NodeTag::Text => self.pending_props.text(),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<ContainerId> {
        match self.payload {
            NodePayload::Container(container) => Some(container),
            _ => None,
        }
    }

    /// Short label used by outlines and scenario reports: the key when present,
    /// otherwise the element type or tag.
    pub fn label(&self) -> String {
        if let Some(key) = &self.key {
            return key.as_str().to_string();
        }
        match (&self.element_type, self.tag) {
            (Some(ty), _) => ty.label().to_string(),
            (None, NodeTag::Text) => format!("#text({})", self.text().unwrap_or("")),
            (None, tag) => format!("#{}", tag_name(tag)),
        }
    }
}

pub(crate) fn tag_name(tag: NodeTag) -> &'static str {
    match tag {
        NodeTag::Root => "root",
        NodeTag::Host => "host",
        NodeTag::Text => "text",
        NodeTag::Fragment => "fragment",
        NodeTag::Portal => "portal",
        NodeTag::Component => "component",
        NodeTag::Pending => "pending",
        NodeTag::Throw => "throw",
        NodeTag::ExternalMarkup => "markup",
    }
}
