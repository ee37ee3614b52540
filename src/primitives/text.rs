//! Text primitive - a text node bound to a reactive string.

use std::cell::Cell;
use std::rc::Rc;

use crate::dom::{self, NodeId};
use crate::hydrate::{self, is_hydrating};
use crate::signals::{effect, effect_scope, on_scope_dispose};

use super::context::attach_to_parent;
use super::types::Cleanup;

/// Render a text node whose content follows `content`.
///
/// The closure runs inside an effect: signals it reads become
/// dependencies, and later writes rewrite the same node in place. During
/// hydration the first run claims the matching server text node instead
/// of creating one.
pub fn text(content: impl Fn() -> String + 'static) -> Cleanup {
    let scope = effect_scope();
    let node: Rc<Cell<Option<NodeId>>> = Rc::new(Cell::new(None));
    scope.run(|| {
        let node_effect = node.clone();
        effect(move || {
            let value = content();
            match node_effect.get() {
                Some(existing) => dom::set_text(existing, &value),
                None => {
                    let created = if is_hydrating() {
                        hydrate::claim_text(&value)
                    } else {
                        let created = dom::create_text(&value);
                        attach_to_parent(created);
                        created
                    };
                    node_effect.set(Some(created));
                }
            }
        });
        let node_dispose = node.clone();
        on_scope_dispose(move || {
            if let Some(existing) = node_dispose.get() {
                dom::remove(existing);
            }
        });
    });
    Box::new(move || scope.stop())
}

/// Render a fixed text node.
pub fn static_text(content: &str) -> Cleanup {
    let owned = content.to_string();
    text(move || owned.clone())
}

#[cfg(test)]
mod tests {
    use super::super::context::ParentFrame;
    use super::*;
    use crate::dom::{create_element, render_to_string, reset_document};
    use crate::signals::{reset_runtime, signal};

    fn setup() -> NodeId {
        reset_runtime();
        reset_document();
        create_element("p")
    }

    #[test]
    fn text_rewrites_in_place_on_signal_change() {
        let parent = setup();
        let name = signal("world".to_string());
        let _cleanup = {
            let _frame = ParentFrame::push(parent);
            text(move || format!("hello {}", name.get()))
        };
        assert_eq!(render_to_string(parent), "<p>hello world</p>");

        name.set("tides".to_string());
        assert_eq!(render_to_string(parent), "<p>hello tides</p>");
        assert_eq!(
            crate::dom::child_count(parent),
            1,
            "updates rewrite the node, never replace it"
        );
    }

    #[test]
    fn cleanup_removes_the_node() {
        let parent = setup();
        let cleanup = {
            let _frame = ParentFrame::push(parent);
            static_text("gone soon")
        };
        cleanup();
        assert_eq!(render_to_string(parent), "<p></p>");
    }

    #[test]
    fn stopped_text_ignores_later_writes() {
        let parent = setup();
        let value = signal(0);
        let cleanup = {
            let _frame = ParentFrame::push(parent);
            text(move || value.get().to_string())
        };
        cleanup();
        value.set(7);
        assert_eq!(render_to_string(parent), "<p></p>", "no zombie updates");
    }
}
