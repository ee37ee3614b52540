//! Show primitive - conditional rendering with a stable container.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::dom;
use crate::hydrate::ChildFrame;
use crate::signals::{EffectScope, effect, effect_scope, on_scope_dispose, untrack};

use super::context::ParentFrame;
use super::element::claim_or_create_element;
use super::types::Cleanup;

/// Render `then_branch` while `condition` is true, `else_branch` (if
/// given) while it is false.
///
/// The container element is stable across toggles; only its contents are
/// swapped. Branch construction runs untracked inside a scope of its own,
/// so signals read while building do not become dependencies of the
/// condition, and a toggle disposes the old branch before the new one
/// is built.
pub fn show<C, TB, T, EB, E>(condition: C, then_branch: TB, else_branch: Option<EB>) -> Cleanup
where
    C: Fn() -> bool + 'static,
    TB: Fn() -> T + 'static,
    T: Into<Cleanup>,
    EB: Fn() -> E + 'static,
    E: Into<Cleanup>,
{
    let container = claim_or_create_element("div");
    let scope = effect_scope();
    let branch: Rc<RefCell<Option<EffectScope>>> = Rc::new(RefCell::new(None));
    let was_true: Rc<Cell<Option<bool>>> = Rc::new(Cell::new(None));

    scope.run(|| {
        let branch_effect = branch.clone();
        effect(move || {
            let active = condition();
            if was_true.get() == Some(active) {
                return;
            }
            was_true.set(Some(active));

            let previous = branch_effect.borrow_mut().take();
            if let Some(previous) = previous {
                previous.stop();
            }

            // Child of the show scope, so unmounting the show tears the
            // current branch down too.
            let branch_scope = scope.run(effect_scope);
            branch_scope.run(|| {
                let _parent = ParentFrame::push(container);
                let _frame = ChildFrame::enter(container);
                let built: Option<Cleanup> = untrack(|| {
                    if active {
                        Some(then_branch().into())
                    } else {
                        else_branch.as_ref().map(|build| build().into())
                    }
                });
                if let Some(cleanup) = built {
                    on_scope_dispose(cleanup);
                }
            });
            *branch_effect.borrow_mut() = Some(branch_scope);
        });

        let branch_dispose = branch.clone();
        on_scope_dispose(move || {
            if let Some(current) = branch_dispose.borrow_mut().take() {
                current.stop();
            }
        });
        on_scope_dispose(move || dom::remove(container));
    });

    Box::new(move || scope.stop())
}

/// [`show`] without an else branch.
pub fn show_when<C, TB, T>(condition: C, then_branch: TB) -> Cleanup
where
    C: Fn() -> bool + 'static,
    TB: Fn() -> T + 'static,
    T: Into<Cleanup>,
{
    show(condition, then_branch, None::<fn() -> Cleanup>)
}

#[cfg(test)]
mod tests {
    use super::super::context::ParentFrame;
    use super::super::text::static_text;
    use super::*;
    use crate::dom::{NodeId, create_element, render_to_string, reset_document};
    use crate::signals::{reset_runtime, signal};
    use std::rc::Rc;

    fn setup() -> NodeId {
        reset_runtime();
        reset_document();
        create_element("body")
    }

    #[test]
    fn toggling_swaps_branches_in_a_stable_container() {
        let body = setup();
        let open = signal(false);
        let _cleanup = {
            let _frame = ParentFrame::push(body);
            show(
                move || open.get(),
                || static_text("shown"),
                Some(|| static_text("hidden")),
            )
        };
        let container = crate::dom::children(body)[0];
        assert_eq!(render_to_string(body), "<body><div>hidden</div></body>");

        open.set(true);
        assert_eq!(render_to_string(body), "<body><div>shown</div></body>");
        assert_eq!(
            crate::dom::children(body)[0],
            container,
            "the container node survives the toggle"
        );

        open.set(false);
        assert_eq!(render_to_string(body), "<body><div>hidden</div></body>");
    }

    #[test]
    fn missing_else_renders_an_empty_container() {
        let body = setup();
        let open = signal(false);
        let _cleanup = {
            let _frame = ParentFrame::push(body);
            show_when(move || open.get(), || static_text("on"))
        };
        assert_eq!(render_to_string(body), "<body><div></div></body>");
        open.set(true);
        assert_eq!(render_to_string(body), "<body><div>on</div></body>");
    }

    #[test]
    fn branch_effects_die_with_the_branch() {
        let body = setup();
        let open = signal(true);
        let label = signal("a".to_string());
        let runs = Rc::new(std::cell::Cell::new(0));
        let runs_branch = runs.clone();
        let _cleanup = {
            let _frame = ParentFrame::push(body);
            show_when(move || open.get(), move || {
                let runs_text = runs_branch.clone();
                text_probe(label, runs_text)
            })
        };
        assert_eq!(runs.get(), 1);
        label.set("b".to_string());
        assert_eq!(runs.get(), 2);

        open.set(false);
        label.set("c".to_string());
        assert_eq!(runs.get(), 2, "old branch effects must be disposed");
    }

    fn text_probe(
        label: crate::signals::Signal<String>,
        runs: Rc<std::cell::Cell<u32>>,
    ) -> Cleanup {
        super::super::text::text(move || {
            runs.set(runs.get() + 1);
            label.get()
        })
    }

    #[test]
    fn signals_read_during_construction_are_not_condition_deps() {
        let body = setup();
        let open = signal(true);
        let sampled = signal(1);
        let builds = Rc::new(std::cell::Cell::new(0));
        let builds_branch = builds.clone();
        let _cleanup = {
            let _frame = ParentFrame::push(body);
            show_when(move || open.get(), move || {
                builds_branch.set(builds_branch.get() + 1);
                let seen = sampled.get();
                static_text(&seen.to_string())
            })
        };
        assert_eq!(builds.get(), 1);
        sampled.set(2);
        assert_eq!(builds.get(), 1, "construction reads must stay untracked");
    }
}
