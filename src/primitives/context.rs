//! Parent context - where newly created nodes attach.
//!
//! Primitives that compose children push their node onto a thread-local
//! parent stack while the children run, so a child primitive never needs
//! an explicit parent argument. The stack is RAII-balanced and empty
//! outside any mount or render.

use std::cell::RefCell;

use crate::dom::{self, NodeId};

thread_local! {
    static PARENT_STACK: RefCell<Vec<NodeId>> = const { RefCell::new(Vec::new()) };
}

/// The node new children currently attach to, if any.
pub(crate) fn current_parent() -> Option<NodeId> {
    PARENT_STACK.with(|stack| stack.borrow().last().copied())
}

/// Append `node` to the current parent. Detached when no parent is set;
/// the caller decides whether that is an error.
pub(crate) fn attach_to_parent(node: NodeId) {
    if let Some(parent) = current_parent() {
        dom::append_child(parent, node);
    }
}

/// RAII parent frame: `node` is the attach target until the frame drops.
pub(crate) struct ParentFrame;

impl ParentFrame {
    pub(crate) fn push(node: NodeId) -> Self {
        PARENT_STACK.with(|stack| stack.borrow_mut().push(node));
        ParentFrame
    }
}

impl Drop for ParentFrame {
    fn drop(&mut self) {
        PARENT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
