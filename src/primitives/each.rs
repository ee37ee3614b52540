//! Each primitive - keyed list rendering.
//!
//! Rows are keyed: when the list changes, rows whose key survives keep
//! their DOM subtree and scope, receiving the new item through a per-row
//! signal. New keys mount fresh rows, vanished keys dispose theirs, and
//! moved rows are reordered in place with `insert_before`.

use std::cell::RefCell;
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::dom::{self, NodeId};
use crate::hydrate::ChildFrame;
use crate::signals::{EffectScope, Signal, effect, effect_scope, on_scope_dispose, signal, untrack};

use super::context::ParentFrame;
use super::element::claim_or_create_element;
use super::types::Cleanup;

struct Row<T: Clone + PartialEq + 'static> {
    scope: EffectScope,
    container: NodeId,
    item: Signal<T>,
}

/// Render one row per item, keyed by `key_fn`.
///
/// `render` runs once per key, inside that row's scope, and receives the
/// item as a signal so in-place updates flow through the row's own
/// effects instead of remounting it. Duplicate keys are logged and the
/// repeated item skipped.
pub fn each<T, K, I, Items, KeyFn, Render>(items: Items, key_fn: KeyFn, render: Render) -> Cleanup
where
    T: Clone + PartialEq + 'static,
    K: Clone + Eq + Hash + Debug + 'static,
    I: IntoIterator<Item = T>,
    Items: Fn() -> I + 'static,
    KeyFn: Fn(&T) -> K + 'static,
    Render: Fn(Signal<T>, &K) + 'static,
{
    let container = claim_or_create_element("div");
    let scope = effect_scope();
    let rows: Rc<RefCell<IndexMap<K, Row<T>>>> = Rc::new(RefCell::new(IndexMap::new()));

    scope.run(|| {
        let rows_effect = rows.clone();
        effect(move || {
            let list: Vec<T> = items().into_iter().collect();
            untrack(|| {
                let mut new_keys: Vec<K> = Vec::with_capacity(list.len());
                {
                    let _parent = ParentFrame::push(container);
                    let _frame = ChildFrame::enter(container);
                    for item in list {
                        let key = key_fn(&item);
                        if new_keys.contains(&key) {
                            log::warn!("each: duplicate key {key:?}; skipping repeated item");
                            continue;
                        }
                        let surviving = rows_effect.borrow().get(&key).map(|row| row.item);
                        match surviving {
                            Some(item_signal) => item_signal.set(item),
                            None => {
                                // Child of the each scope; dies with it.
                                let row_scope = scope.run(effect_scope);
                                let item_signal = signal(item);
                                let row_container = claim_or_create_element("div");
                                row_scope.run(|| {
                                    let _row_parent = ParentFrame::push(row_container);
                                    let _row_frame = ChildFrame::enter(row_container);
                                    render(item_signal, &key);
                                    on_scope_dispose(move || dom::remove(row_container));
                                });
                                rows_effect.borrow_mut().insert(
                                    key.clone(),
                                    Row { scope: row_scope, container: row_container, item: item_signal },
                                );
                            }
                        }
                        new_keys.push(key);
                    }
                }

                let stale: Vec<K> = rows_effect
                    .borrow()
                    .keys()
                    .filter(|key| !new_keys.contains(key))
                    .cloned()
                    .collect();
                for key in stale {
                    let row = rows_effect.borrow_mut().shift_remove(&key);
                    if let Some(row) = row {
                        row.scope.stop();
                    }
                }

                for (index, key) in new_keys.iter().enumerate() {
                    let row_container = rows_effect.borrow().get(key).map(|row| row.container);
                    let Some(row_container) = row_container else {
                        continue;
                    };
                    if dom::child_at(container, index) != Some(row_container) {
                        dom::insert_before(container, row_container, dom::child_at(container, index));
                    }
                }
            });
        });

        let rows_dispose = rows.clone();
        on_scope_dispose(move || {
            let drained: Vec<Row<T>> = rows_dispose
                .borrow_mut()
                .drain(..)
                .map(|(_, row)| row)
                .collect();
            for row in drained {
                row.scope.stop();
            }
        });
        on_scope_dispose(move || dom::remove(container));
    });

    Box::new(move || scope.stop())
}

#[cfg(test)]
mod tests {
    use super::super::context::ParentFrame;
    use super::super::text::text;
    use super::*;
    use crate::dom::{children, create_element, render_to_string, reset_document};
    use crate::signals::reset_runtime;
    use std::cell::Cell;

    fn setup() -> NodeId {
        reset_runtime();
        reset_document();
        create_element("body")
    }

    fn mount_list(body: NodeId, list: Signal<Vec<(u32, &'static str)>>) -> Cleanup {
        let _frame = ParentFrame::push(body);
        each(
            move || list.get(),
            |item: &(u32, &str)| item.0,
            |item, _key| {
                let _ = text(move || item.get().1.to_string());
            },
        )
    }

    #[test]
    fn rows_render_in_list_order() {
        let body = setup();
        let list = crate::signals::signal(vec![(1, "a"), (2, "b"), (3, "c")]);
        let _cleanup = mount_list(body, list);
        assert_eq!(
            render_to_string(body),
            "<body><div><div>a</div><div>b</div><div>c</div></div></body>"
        );
    }

    #[test]
    fn surviving_keys_keep_their_dom_nodes() {
        let body = setup();
        let list = crate::signals::signal(vec![(1, "a"), (2, "b")]);
        let _cleanup = mount_list(body, list);
        let container = children(body)[0];
        let row_one = children(container)[0];
        let row_two = children(container)[1];

        list.set(vec![(2, "b"), (1, "a"), (3, "c")]);
        let rows = children(container);
        assert_eq!(rows[0], row_two, "moved row keeps its node");
        assert_eq!(rows[1], row_one);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            render_to_string(container),
            "<div><div>b</div><div>a</div><div>c</div></div>"
        );
    }

    #[test]
    fn vanished_keys_dispose_their_rows() {
        let body = setup();
        let list = crate::signals::signal(vec![(1, "a"), (2, "b")]);
        let _cleanup = mount_list(body, list);
        let container = children(body)[0];

        list.set(vec![(2, "b")]);
        assert_eq!(children(container).len(), 1);
        assert_eq!(render_to_string(container), "<div><div>b</div></div>");
    }

    #[test]
    fn item_change_updates_row_in_place() {
        let body = setup();
        let list = crate::signals::signal(vec![(1, "before")]);
        let _cleanup = mount_list(body, list);
        let container = children(body)[0];
        let row = children(container)[0];

        list.set(vec![(1, "after")]);
        assert_eq!(children(container)[0], row, "same key, same row node");
        assert_eq!(render_to_string(container), "<div><div>after</div></div>");
    }

    #[test]
    fn duplicate_keys_render_once() {
        let body = setup();
        let list = crate::signals::signal(vec![(1, "a"), (1, "dup"), (2, "b")]);
        let _cleanup = mount_list(body, list);
        let container = children(body)[0];
        assert_eq!(children(container).len(), 2, "duplicate key is skipped");
        assert_eq!(render_to_string(container), "<div><div>a</div><div>b</div></div>");
    }

    #[test]
    fn render_runs_once_per_key() {
        let body = setup();
        let builds = Rc::new(Cell::new(0));
        let builds_render = builds.clone();
        let list = crate::signals::signal(vec![1, 2]);
        let _cleanup = {
            let _frame = ParentFrame::push(body);
            each(
                move || list.get(),
                |item: &u32| *item,
                move |item, _key| {
                    builds_render.set(builds_render.get() + 1);
                    let _ = text(move || item.get().to_string());
                },
            )
        };
        assert_eq!(builds.get(), 2);
        list.set(vec![2, 1]);
        assert_eq!(builds.get(), 2, "reorder must not remount rows");
    }
}
