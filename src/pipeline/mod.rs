//! Mount pipeline - attaching a component tree to a container.
//!
//! [`mount`] builds fresh DOM under a container; [`hydrate_mount`] runs
//! the same construction as a hydration pass over server markup already
//! there. Both hand back a [`MountHandle`] that owns the tree's root
//! scope.

use crate::dom::NodeId;
use crate::hydrate::{HydrationReport, hydrate};
use crate::primitives::ParentFrame;
use crate::signals::{EffectScope, effect_scope};

/// Owner of a mounted tree. Dropping the handle unmounts it.
pub struct MountHandle {
    scope: EffectScope,
    container: NodeId,
    report: Option<HydrationReport>,
}

/// Mount the tree built by `f` under `container`.
pub fn mount(container: NodeId, f: impl FnOnce()) -> MountHandle {
    let scope = effect_scope();
    scope.run(|| {
        let _parent = ParentFrame::push(container);
        f();
    });
    MountHandle {
        scope,
        container,
        report: None,
    }
}

/// Mount by claiming the server-rendered children of `container`
/// instead of creating fresh nodes.
pub fn hydrate_mount(container: NodeId, f: impl FnOnce()) -> MountHandle {
    let scope = effect_scope();
    let report = hydrate(container, || {
        scope.run(|| {
            let _parent = ParentFrame::push(container);
            f();
        });
    });
    MountHandle {
        scope,
        container,
        report: Some(report),
    }
}

impl MountHandle {
    pub fn container(&self) -> NodeId {
        self.container
    }

    /// Hydration outcome; `None` for a fresh [`mount`].
    pub fn report(&self) -> Option<&HydrationReport> {
        self.report.as_ref()
    }

    /// Tear the tree down now instead of at drop.
    pub fn unmount(self) {}
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        self.scope.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{
        append_child, child_count, create_element, create_text, render_to_string, reset_document,
    };
    use crate::primitives::{Children, element, static_text, text};
    use crate::signals::{reset_runtime, signal};

    fn setup() -> NodeId {
        reset_runtime();
        reset_document();
        create_element("body")
    }

    #[test]
    fn mount_builds_and_unmount_clears() {
        let body = setup();
        let handle = mount(body, || {
            let _ = element(
                "main",
                Children::thunk(|| {
                    static_text("hello");
                }),
            );
        });
        assert_eq!(render_to_string(body), "<body><main>hello</main></body>");
        handle.unmount();
        assert_eq!(child_count(body), 0);
    }

    #[test]
    fn dropping_the_handle_unmounts() {
        let body = setup();
        {
            let _handle = mount(body, || {
                static_text("transient");
            });
            assert_eq!(child_count(body), 1);
        }
        assert_eq!(child_count(body), 0);
    }

    #[test]
    fn hydrate_mount_claims_server_markup_and_stays_reactive() {
        let body = setup();
        let server_main = create_element("main");
        append_child(server_main, create_text("count: 0"));
        append_child(body, server_main);

        let count = signal(0);
        let handle = hydrate_mount(body, move || {
            let _ = element(
                "main",
                Children::thunk(move || {
                    text(move || format!("count: {}", count.get()));
                }),
            );
        });
        let report = handle.report().unwrap();
        assert!(report.is_clean(), "matching markup hydrates cleanly");
        assert_eq!(crate::dom::children(body), vec![server_main]);

        count.set(3);
        assert_eq!(render_to_string(body), "<body><main>count: 3</main></body>");
    }
}
