//! Effect scopes - ownership and lifetime for reactions and cleanups.
//!
//! A scope owns the effects created while it is running, the cleanups
//! registered with [`on_scope_dispose`], and any scopes created inside it.
//! Scopes form a stack during synchronous execution and a tree for
//! lifetime: stopping a scope stops its children first, then its effects,
//! then runs its own cleanups - recursively, exactly once.

use super::graph::{dispose_node, with_runtime, NodeId};

/// Id of a scope in the scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ScopeId(pub(crate) usize);

pub(crate) struct Scope {
    pub(crate) children: Vec<ScopeId>,
    pub(crate) effects: Vec<NodeId>,
    pub(crate) cleanups: Vec<Box<dyn FnOnce()>>,
    pub(crate) disposed: bool,
}

impl Scope {
    fn new() -> Self {
        Scope {
            children: Vec::new(),
            effects: Vec::new(),
            cleanups: Vec::new(),
            disposed: false,
        }
    }
}

// =============================================================================
// EffectScope Handle
// =============================================================================

/// Ownership unit for effects, cleanups, and nested scopes.
#[derive(Clone, Copy)]
pub struct EffectScope {
    id: ScopeId,
}

/// Create a scope. If another scope is currently running, the new scope
/// becomes its child and is disposed with it.
pub fn effect_scope() -> EffectScope {
    let id = with_runtime(|rt| {
        let id = ScopeId(rt.scopes.len());
        rt.scopes.push(Some(Scope::new()));
        if let Some(&parent) = rt.scope_stack.last() {
            if let Some(parent) = rt.scopes.get_mut(parent.0).and_then(|slot| slot.as_mut()) {
                parent.children.push(id);
            }
        }
        id
    });
    EffectScope { id }
}

struct StackGuard;

impl Drop for StackGuard {
    fn drop(&mut self) {
        with_runtime(|rt| {
            rt.scope_stack.pop();
        });
    }
}

impl EffectScope {
    /// Run `f` with this scope as the current owner: effects, cleanups,
    /// and scopes created inside belong to it. Balances on panic.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        with_runtime(|rt| rt.scope_stack.push(self.id));
        let _guard = StackGuard;
        f()
    }

    /// Dispose the scope: children first, then owned effects, then this
    /// scope's cleanups. Idempotent.
    pub fn stop(&self) {
        dispose_scope(self.id);
    }
}

fn dispose_scope(id: ScopeId) {
    let Some((children, effects, cleanups)) = with_runtime(|rt| {
        let scope = rt.scopes.get_mut(id.0).and_then(|slot| slot.as_mut())?;
        if scope.disposed {
            return None;
        }
        scope.disposed = true;
        Some((
            std::mem::take(&mut scope.children),
            std::mem::take(&mut scope.effects),
            std::mem::take(&mut scope.cleanups),
        ))
    }) else {
        return;
    };

    for child in children {
        dispose_scope(child);
    }
    for effect in effects {
        dispose_node(effect);
    }
    for cleanup in cleanups {
        cleanup();
    }
}

/// Register a cleanup on the current scope, run once when it stops.
///
/// Outside any scope there is no owner to attach to; the callback is
/// dropped with a warning.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    let placed = with_runtime(|rt| {
        let Some(&current) = rt.scope_stack.last() else {
            return false;
        };
        let Some(scope) = rt.scopes.get_mut(current.0).and_then(|slot| slot.as_mut()) else {
            return false;
        };
        scope.cleanups.push(Box::new(f));
        true
    });
    if !placed {
        log::warn!("on_scope_dispose called outside any scope; callback will never run");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::graph::{effect, reset_runtime, signal};
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn stop_disposes_owned_effects() {
        reset_runtime();
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));
        let runs_effect = runs.clone();
        let scope = effect_scope();
        scope.run(|| {
            effect(move || {
                count.get();
                runs_effect.set(runs_effect.get() + 1);
            });
        });
        assert_eq!(runs.get(), 1);
        scope.stop();
        count.set(1);
        assert_eq!(runs.get(), 1, "stopped scope's effect must not re-run");
    }

    #[test]
    fn stop_runs_dispose_callbacks_exactly_once() {
        reset_runtime();
        let disposed = Rc::new(Cell::new(0));
        let disposed_scope = disposed.clone();
        let scope = effect_scope();
        scope.run(|| {
            on_scope_dispose(move || disposed_scope.set(disposed_scope.get() + 1));
        });
        scope.stop();
        scope.stop();
        assert_eq!(disposed.get(), 1, "double stop must run cleanups once");
    }

    #[test]
    fn nested_scopes_dispose_with_parent() {
        reset_runtime();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));
        let parent = effect_scope();
        parent.run(|| {
            let order_parent = order.clone();
            on_scope_dispose(move || order_parent.borrow_mut().push("parent"));
            let child = effect_scope();
            child.run(|| {
                let order_child = order.clone();
                on_scope_dispose(move || order_child.borrow_mut().push("child"));
            });
        });
        parent.stop();
        assert_eq!(
            *order.borrow(),
            vec!["child", "parent"],
            "children dispose before the parent's own cleanups"
        );
    }

    #[test]
    fn stopping_child_first_is_safe() {
        reset_runtime();
        let disposed = Rc::new(Cell::new(0));
        let parent = effect_scope();
        let child_slot: Rc<Cell<Option<EffectScope>>> = Rc::new(Cell::new(None));
        let child_for_run = child_slot.clone();
        let disposed_child = disposed.clone();
        parent.run(|| {
            let child = effect_scope();
            child.run(|| {
                on_scope_dispose(move || disposed_child.set(disposed_child.get() + 1));
            });
            child_for_run.set(Some(child));
        });
        child_slot.get().map(|child| child.stop());
        parent.stop();
        assert_eq!(disposed.get(), 1, "child already stopped; parent must not re-run it");
    }
}
