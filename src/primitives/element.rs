//! Element primitive - one host element plus its children.

use crate::dom::{self, NodeId};
use crate::hydrate::{self, ChildFrame, is_hydrating};
use crate::signals::{effect_scope, on_scope_dispose};

use super::context::{ParentFrame, attach_to_parent};
use super::types::{Children, Cleanup, resolve_children};

/// Claim the next server element during hydration, otherwise create one
/// and attach it to the current parent. Shared by every primitive that
/// owns a host element.
pub(crate) fn claim_or_create_element(tag: &str) -> NodeId {
    if is_hydrating() {
        hydrate::claim_element(tag)
    } else {
        let node = dom::create_element(tag);
        attach_to_parent(node);
        node
    }
}

/// Render an element with the given children.
///
/// The element is removed from the document when the returned cleanup
/// runs or an owning scope is disposed.
pub fn element(tag: &str, children: Children) -> Cleanup {
    element_with(tag, &[], children)
}

/// [`element`] with static attributes.
pub fn element_with(tag: &str, attributes: &[(&str, &str)], children: Children) -> Cleanup {
    let node = claim_or_create_element(tag);
    for (name, value) in attributes {
        dom::set_attribute(node, name, value);
    }
    let scope = effect_scope();
    scope.run(|| {
        {
            let _parent = ParentFrame::push(node);
            let _frame = ChildFrame::enter(node);
            resolve_children(children);
        }
        on_scope_dispose(move || dom::remove(node));
    });
    Box::new(move || scope.stop())
}
