//! Node-kind specific construction, supplied by the embedder.

use crate::node::RenderNode;
use crate::types::{Element, Props};
use serde_json::Value;

/// Construction and compatibility hooks for element nodes.
///
/// Every method has a default, so an embedder only overrides what its node
/// kinds need. `DefaultHost` uses all of them unchanged.
pub trait HostConfig {
    /// Builds the node for an element that has no reusable counterpart.
    fn create_node(&self, element: &Element) -> RenderNode {
        RenderNode::from_element(element)
    }

    /// Whether `node` may be reused for `element` once their keys already match.
    fn can_reuse(&self, node: &RenderNode, element: &Element) -> bool {
        node.element_type() == Some(&element.ty)
    }

    /// Called when `node` is reused with `next` props. Returns `true` when the
    /// change must be applied at commit.
    fn apply_props(&self, node: &RenderNode, next: &Props) -> bool {
        if node.element_type().and_then(|ty| ty.host_name()).is_none() {
            return false;
        }
        match node.memoized_props().and_then(|props| props.props()) {
            Some(previous) => !previous.same_attrs(next),
            None => true,
        }
    }

    /// Base state for a freshly created component node.
    fn initial_state(&self, _element: &Element) -> Value {
        Value::Null
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHost;

impl HostConfig for DefaultHost {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PendingProps;

    #[test]
    fn host_nodes_need_update_only_when_attrs_change() {
        let host = DefaultHost;
        let element = Element::host("div").attr("id", "a");
        let mut node = host.create_node(&element);
        node.memoized_props = Some(PendingProps::Props(element.props.clone()));

        assert!(!host.apply_props(&node, &Props::new().with_attr("id", "a")));
        assert!(host.apply_props(&node, &Props::new().with_attr("id", "b")));
    }

    #[test]
    fn reuse_requires_same_element_type() {
        let host = DefaultHost;
        let node = host.create_node(&Element::host("span"));
        assert!(host.can_reuse(&node, &Element::host("span")));
        assert!(!host.can_reuse(&node, &Element::host("div")));
        assert!(!host.can_reuse(&node, &Element::component("span")));
    }
}
