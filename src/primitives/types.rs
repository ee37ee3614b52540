//! Primitive types - children and cleanup.

use crate::dom::NodeId;

pub use crate::signals::Cleanup;

use super::context::attach_to_parent;

// =============================================================================
// Children
// =============================================================================

/// Child content passed across a composing-function boundary.
///
/// The `Thunk` form defers construction until the composer has claimed
/// its own node and entered its child frame. Without it, eager argument
/// evaluation would claim the children *before* the parent during
/// hydration and corrupt the cursor. Pre-built `Nodes` remain valid for
/// callers with no ordering constraint (fresh non-hydrated renders).
pub enum Children {
    /// No children.
    None,
    /// Already-constructed nodes, appended as-is.
    Nodes(Vec<NodeId>),
    /// Deferred construction, run inside the parent's child frame.
    Thunk(Box<dyn FnOnce()>),
}

impl Children {
    /// Defer child construction until the parent is positioned.
    pub fn thunk(f: impl FnOnce() + 'static) -> Self {
        Children::Thunk(Box::new(f))
    }
}

/// Realize child content in the current parent context.
///
/// Composing primitives call this between entering and exiting their
/// child frame, so thunks claim nodes at the right cursor position.
pub fn resolve_children(children: Children) {
    match children {
        Children::None => {}
        Children::Nodes(nodes) => {
            for node in nodes {
                attach_to_parent(node);
            }
        }
        Children::Thunk(build) => build(),
    }
}
