//! Document arena - the retained node tree the engine renders into.
//!
//! A host-free stand-in for a browser document, in the same shape as the
//! component registry: a thread-local arena of nodes addressed by
//! [`NodeId`], with parent links and ordered child lists.
//!
//! Two details matter to the rest of the engine:
//!
//! - Node ids are monotonic and never reused. A reactive text binding that
//!   fires after its node was removed degrades to a no-op instead of
//!   writing into an unrelated node.
//! - [`insert_before`] on a node that is already attached moves it. Keyed
//!   list reorder is a sequence of moves, never a rebuild.
//!
//! Claim marks ([`mark_claimed`] / [`is_claimed`]) exist for the hydration
//! invariant: after a full pass every server-rendered node must have been
//! claimed exactly once, and the pass runner scans for violations.

use std::cell::RefCell;

// =============================================================================
// Node Storage
// =============================================================================

/// Handle to a node in the document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element { tag: String, attributes: Vec<(String, String)> },
    Text { content: String },
}

#[derive(Debug)]
struct DomNode {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    claimed: bool,
}

#[derive(Default)]
struct Document {
    nodes: Vec<Option<DomNode>>,
}

impl Document {
    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(DomNode {
            kind,
            parent: None,
            children: Vec::new(),
            claimed: false,
        }));
        id
    }

    fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut DomNode> {
        self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.node(id).and_then(|node| node.parent) else {
            return;
        };
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.retain(|child| *child != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let children = match self.node(id) {
            Some(node) => node.children.clone(),
            None => return,
        };
        for child in children {
            self.free_subtree(child);
        }
        if let Some(slot) = self.nodes.get_mut(id.0) {
            *slot = None;
        }
    }
}

thread_local! {
    static DOCUMENT: RefCell<Document> = RefCell::new(Document::default());
}

fn with_document<R>(f: impl FnOnce(&mut Document) -> R) -> R {
    DOCUMENT.with(|doc| f(&mut doc.borrow_mut()))
}

/// Drop every node (for testing).
pub fn reset_document() {
    with_document(|doc| *doc = Document::default());
}

// =============================================================================
// Construction
// =============================================================================

/// Create a detached element node.
pub fn create_element(tag: &str) -> NodeId {
    with_document(|doc| {
        doc.insert(NodeKind::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
        })
    })
}

/// Create a detached text node.
pub fn create_text(content: &str) -> NodeId {
    with_document(|doc| {
        doc.insert(NodeKind::Text {
            content: content.to_string(),
        })
    })
}

/// Append `child` as the last child of `parent`, detaching it first if
/// it is attached elsewhere.
pub fn append_child(parent: NodeId, child: NodeId) {
    insert_before(parent, child, None);
}

/// Insert `child` under `parent` immediately before `reference`
/// (append when `reference` is `None`). An already-attached child is
/// moved, not duplicated.
pub fn insert_before(parent: NodeId, child: NodeId, reference: Option<NodeId>) {
    with_document(|doc| {
        if doc.node(parent).is_none() || doc.node(child).is_none() {
            return;
        }
        doc.detach(child);
        let Some(parent_node) = doc.node_mut(parent) else {
            return;
        };
        let position = match reference {
            Some(reference) => parent_node
                .children
                .iter()
                .position(|existing| *existing == reference)
                .unwrap_or(parent_node.children.len()),
            None => parent_node.children.len(),
        };
        parent_node.children.insert(position, child);
        if let Some(child_node) = doc.node_mut(child) {
            child_node.parent = Some(parent);
        }
    });
}

/// Detach `child` from its parent and free its whole subtree.
pub fn remove(id: NodeId) {
    with_document(|doc| {
        doc.detach(id);
        doc.free_subtree(id);
    });
}

/// Remove every child of `parent` (freeing their subtrees).
pub fn clear_children(parent: NodeId) {
    for child in children(parent) {
        remove(child);
    }
}

// =============================================================================
// Mutation
// =============================================================================

/// Rewrite a text node's content. No-op on elements or freed nodes.
pub fn set_text(id: NodeId, content: &str) {
    with_document(|doc| {
        if let Some(node) = doc.node_mut(id) {
            if let NodeKind::Text { content: existing } = &mut node.kind {
                *existing = content.to_string();
            }
        }
    });
}

/// Set (or replace) an attribute on an element node.
pub fn set_attribute(id: NodeId, name: &str, value: &str) {
    with_document(|doc| {
        if let Some(node) = doc.node_mut(id) {
            if let NodeKind::Element { attributes, .. } = &mut node.kind {
                match attributes.iter_mut().find(|(existing, _)| existing == name) {
                    Some((_, existing)) => *existing = value.to_string(),
                    None => attributes.push((name.to_string(), value.to_string())),
                }
            }
        }
    });
}

// =============================================================================
// Queries
// =============================================================================

/// Element tag, or `None` for text/freed nodes.
pub fn tag(id: NodeId) -> Option<String> {
    with_document(|doc| match doc.node(id).map(|node| &node.kind) {
        Some(NodeKind::Element { tag, .. }) => Some(tag.clone()),
        _ => None,
    })
}

/// Attribute value on an element node.
pub fn get_attribute(id: NodeId, name: &str) -> Option<String> {
    with_document(|doc| match doc.node(id).map(|node| &node.kind) {
        Some(NodeKind::Element { attributes, .. }) => attributes
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.clone()),
        _ => None,
    })
}

/// Text content of a text node (empty for elements/freed nodes).
pub fn text_content(id: NodeId) -> String {
    with_document(|doc| match doc.node(id).map(|node| &node.kind) {
        Some(NodeKind::Text { content }) => content.clone(),
        _ => String::new(),
    })
}

/// Ordered child list.
pub fn children(id: NodeId) -> Vec<NodeId> {
    with_document(|doc| doc.node(id).map(|node| node.children.clone()).unwrap_or_default())
}

/// Child at `index`, if present.
pub fn child_at(id: NodeId, index: usize) -> Option<NodeId> {
    with_document(|doc| doc.node(id).and_then(|node| node.children.get(index).copied()))
}

/// Number of children.
pub fn child_count(id: NodeId) -> usize {
    with_document(|doc| doc.node(id).map(|node| node.children.len()).unwrap_or(0))
}

/// Parent node, if attached.
pub fn parent(id: NodeId) -> Option<NodeId> {
    with_document(|doc| doc.node(id).and_then(|node| node.parent))
}

/// Is this a live element node?
pub fn is_element(id: NodeId) -> bool {
    with_document(|doc| matches!(doc.node(id).map(|node| &node.kind), Some(NodeKind::Element { .. })))
}

/// Is this a live text node?
pub fn is_text(id: NodeId) -> bool {
    with_document(|doc| matches!(doc.node(id).map(|node| &node.kind), Some(NodeKind::Text { .. })))
}

/// Does the node still exist?
pub fn exists(id: NodeId) -> bool {
    with_document(|doc| doc.node(id).is_some())
}

// =============================================================================
// Claim Marks (hydration bookkeeping)
// =============================================================================

/// Mark a node claimed by the hydration cursor. Returns `false` if it was
/// already claimed.
pub fn mark_claimed(id: NodeId) -> bool {
    with_document(|doc| match doc.node_mut(id) {
        Some(node) if !node.claimed => {
            node.claimed = true;
            true
        }
        _ => false,
    })
}

/// Has the node been claimed?
pub fn is_claimed(id: NodeId) -> bool {
    with_document(|doc| doc.node(id).map(|node| node.claimed).unwrap_or(false))
}

/// Count nodes in the subtree under `root` (exclusive) that were never
/// claimed. Used by the hydration pass to surface drift.
pub fn count_unclaimed(root: NodeId) -> usize {
    fn walk(doc: &Document, id: NodeId, count_self: bool) -> usize {
        let Some(node) = doc.node(id) else { return 0 };
        let own = usize::from(count_self && !node.claimed);
        own + node
            .children
            .iter()
            .map(|child| walk(doc, *child, true))
            .sum::<usize>()
    }
    with_document(|doc| walk(doc, root, false))
}

// =============================================================================
// Serialization
// =============================================================================

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Serialize a subtree to markup. Tests use this both to describe the
/// expected client output and to fabricate server-rendered trees to
/// hydrate against.
pub fn render_to_string(id: NodeId) -> String {
    fn write(doc: &Document, id: NodeId, out: &mut String) {
        let Some(node) = doc.node(id) else { return };
        match &node.kind {
            NodeKind::Text { content } => out.push_str(&escape(content)),
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value));
                    out.push('"');
                }
                out.push('>');
                for child in &node.children {
                    write(doc, *child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
    with_document(|doc| {
        let mut out = String::new();
        write(doc, id, &mut out);
        out
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() {
        reset_document();
    }

    #[test]
    fn build_and_serialize() {
        setup();
        let root = create_element("div");
        let title = create_element("h1");
        let text = create_text("hello");
        append_child(root, title);
        append_child(title, text);
        assert_eq!(render_to_string(root), "<div><h1>hello</h1></div>");
    }

    #[test]
    fn attributes_render_and_replace() {
        setup();
        let root = create_element("a");
        set_attribute(root, "href", "/home");
        set_attribute(root, "href", "/away");
        assert_eq!(get_attribute(root, "href").as_deref(), Some("/away"));
        assert_eq!(render_to_string(root), "<a href=\"/away\"></a>");
    }

    #[test]
    fn insert_before_moves_attached_nodes() {
        setup();
        let root = create_element("ul");
        let first = create_element("li");
        let second = create_element("li");
        append_child(root, first);
        append_child(root, second);

        // Move `second` in front of `first`.
        insert_before(root, second, Some(first));
        assert_eq!(children(root), vec![second, first]);
        assert_eq!(child_count(root), 2, "a move must not duplicate");
    }

    #[test]
    fn remove_frees_the_subtree() {
        setup();
        let root = create_element("div");
        let child = create_element("span");
        let grandchild = create_text("x");
        append_child(root, child);
        append_child(child, grandchild);

        remove(child);
        assert!(!exists(child));
        assert!(!exists(grandchild));
        assert_eq!(child_count(root), 0);
    }

    #[test]
    fn writes_to_freed_nodes_are_noops() {
        setup();
        let root = create_element("div");
        let text = create_text("old");
        append_child(root, text);
        remove(text);
        set_text(text, "new");
        assert_eq!(text_content(text), "");
        assert_eq!(render_to_string(root), "<div></div>");
    }

    #[test]
    fn claim_marks_are_exactly_once() {
        setup();
        let node = create_element("div");
        assert!(mark_claimed(node), "first claim succeeds");
        assert!(!mark_claimed(node), "second claim is rejected");
        assert!(is_claimed(node));
    }

    #[test]
    fn unclaimed_count_excludes_the_root() {
        setup();
        let root = create_element("div");
        let a = create_element("span");
        let b = create_text("x");
        append_child(root, a);
        append_child(a, b);
        assert_eq!(count_unclaimed(root), 2);
        mark_claimed(a);
        assert_eq!(count_unclaimed(root), 1);
    }

    #[test]
    fn text_is_escaped_in_markup() {
        setup();
        let root = create_element("p");
        let text = create_text("a < b & c");
        append_child(root, text);
        assert_eq!(render_to_string(root), "<p>a &lt; b &amp; c</p>");
    }
}
