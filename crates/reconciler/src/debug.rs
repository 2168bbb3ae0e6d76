use crate::flags::Flags;
use crate::node::{NodePayload, NodeTag, RenderNode, tag_name};
use crate::tree::{NodeId, RenderTree};

/// One line per node, indented by depth, with effect flags in brackets.
/// Stops after `cap` nodes.
pub fn outline(tree: &RenderTree, root: NodeId, cap: usize) -> Vec<String> {
    render_outline(tree, root, cap, true)
}

/// Like `outline`, without flags. Stable across passes for the same shape.
pub fn structure(tree: &RenderTree, root: NodeId, cap: usize) -> Vec<String> {
    render_outline(tree, root, cap, false)
}

fn render_outline(tree: &RenderTree, root: NodeId, cap: usize, with_flags: bool) -> Vec<String> {
    struct IndentGuard<'a> {
        indent: &'a mut String,
        step: usize,
    }

    impl Drop for IndentGuard<'_> {
        fn drop(&mut self) {
            let new_len = self.indent.len() - self.step;
            self.indent.truncate(new_len);
        }
    }

    const INDENT_STEP: &str = "  ";
    const PREVIEW_CHARS: usize = 40;

    fn push_preview(out: &mut String, s: &str) {
        for (i, ch) in s.chars().enumerate() {
            if i == PREVIEW_CHARS {
                out.push('…');
                break;
            }
            out.push(if ch == '\n' { ' ' } else { ch });
        }
    }

    fn describe(node: &RenderNode, line: &mut String, with_flags: bool) {
        match node.tag() {
            NodeTag::Text => {
                line.push('"');
                push_preview(line, node.text().unwrap_or(""));
                line.push('"');
            }
            NodeTag::Host => {
                line.push('<');
                line.push_str(node.element_type().map_or("?", |ty| ty.label()));
                if let Some(key) = node.key() {
                    line.push_str(" key=\"");
                    line.push_str(key.as_str());
                    line.push('"');
                }
                line.push('>');
            }
            NodeTag::Component => {
                line.push_str(node.element_type().map_or("?", |ty| ty.label()));
                if let Some(key) = node.key() {
                    line.push_str(" key=");
                    line.push_str(key.as_str());
                }
            }
            tag => {
                line.push('#');
                line.push_str(tag_name(tag));
                if let Some(key) = node.key() {
                    line.push_str(" key=");
                    line.push_str(key.as_str());
                }
                match node.payload() {
                    NodePayload::Container(container) => line.push_str(&format!(" -> {}", container.0)),
                    NodePayload::Error(error) => {
                        line.push_str(": ");
                        push_preview(line, &error.to_string());
                    }
                    NodePayload::Suspended(_) | NodePayload::None => {}
                }
            }
        }
        let flags = node.flags().without(Flags::FORKED);
        if with_flags && flags != Flags::NONE {
            line.push_str(&format!(" [{flags}]"));
        }
    }

    struct Walk<'t> {
        tree: &'t RenderTree,
        with_flags: bool,
        left: usize,
        out: Vec<String>,
    }

    fn walk(state: &mut Walk<'_>, id: NodeId, indent: &mut String) {
        if state.left == 0 {
            return;
        }
        state.left -= 1;
        let tree = state.tree;
        let Some(node) = tree.get(id) else {
            return;
        };
        let mut line = String::with_capacity(indent.len() + 32);
        line.push_str(indent);
        describe(node, &mut line, state.with_flags);
        state.out.push(line);

        indent.push_str(INDENT_STEP);
        let guard = IndentGuard {
            indent,
            step: INDENT_STEP.len(),
        };
        for child in tree.children(id) {
            walk(state, child, &mut *guard.indent);
        }
    }

    let mut state = Walk {
        tree,
        with_flags,
        left: cap,
        out: Vec::new(),
    };
    let mut indent = String::new();
    walk(&mut state, root, &mut indent);
    state.out
}
