//! Core reactive graph - node arena, dependency tracking, reactions.
//!
//! All graph state lives in a thread-local [`Runtime`]. Public handles
//! ([`Signal`], [`Derived`]) are copyable ids into the node arena; values
//! are stored type-erased and downcast at the typed handle boundary.
//!
//! # Tracking
//!
//! A single `active` pointer names the reaction currently executing. Reads
//! through `get()` while a reaction is active create a dependency edge;
//! `peek()` and [`untrack`] never do. Every reaction rebuilds its
//! dependency set from scratch on each run - stale edges from the previous
//! run are removed first, which is what makes conditional dependencies
//! work.
//!
//! # Failure semantics
//!
//! A panic inside an effect body aborts only that run: it is caught,
//! logged, and the graph stays consistent. A panic inside a derived
//! recompute propagates and the node stays dirty, so the next read
//! retries instead of caching the failure.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use smallvec::SmallVec;

use super::flags::NodeFlags;
use super::scheduling;
use super::scope::{Scope, ScopeId};

/// Cleanup function returned by effects and rendering primitives.
///
/// Call it to dispose the thing that handed it out. Disposal is
/// idempotent everywhere in this crate.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Node Arena
// =============================================================================

/// Id of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(pub(crate) usize);

type Value = Rc<dyn Any>;
type EdgeList = SmallVec<[NodeId; 4]>;

pub(crate) struct Node {
    pub(crate) flags: NodeFlags,
    /// Current value (sources and deriveds).
    value: Option<Value>,
    /// Recompute function (deriveds).
    compute: Option<Rc<dyn Fn() -> Value>>,
    /// Reaction body (effects).
    run: Option<Rc<dyn Fn()>>,
    /// Structural equality used to de-duplicate writes.
    equals: Option<Rc<dyn Fn(&Value, &Value) -> bool>>,
    /// Nodes this reaction read during its last run.
    deps: EdgeList,
    /// Reactions that read this node.
    subs: EdgeList,
    /// Reaction-level cleanups, run before each re-run and at disposal.
    cleanups: Vec<Box<dyn FnOnce()>>,
}

impl Node {
    fn source(value: Value, equals: Rc<dyn Fn(&Value, &Value) -> bool>) -> Self {
        Node {
            flags: NodeFlags::SOURCE,
            value: Some(value),
            compute: None,
            run: None,
            equals: Some(equals),
            deps: EdgeList::new(),
            subs: EdgeList::new(),
            cleanups: Vec::new(),
        }
    }

    fn derived(compute: Rc<dyn Fn() -> Value>, equals: Rc<dyn Fn(&Value, &Value) -> bool>) -> Self {
        Node {
            flags: NodeFlags::DERIVED | NodeFlags::DIRTY,
            value: None,
            compute: Some(compute),
            run: None,
            equals: Some(equals),
            deps: EdgeList::new(),
            subs: EdgeList::new(),
            cleanups: Vec::new(),
        }
    }

    fn effect(run: Rc<dyn Fn()>) -> Self {
        Node {
            flags: NodeFlags::EFFECT,
            value: None,
            compute: None,
            run: Some(run),
            equals: None,
            deps: EdgeList::new(),
            subs: EdgeList::new(),
            cleanups: Vec::new(),
        }
    }
}

// =============================================================================
// Runtime
// =============================================================================

pub(crate) struct Runtime {
    /// Node arena. Slots are monotonic - a disposed node keeps its slot so
    /// a retained cleanup can never hit an unrelated node.
    pub(crate) nodes: Vec<Option<Node>>,
    /// Reaction currently executing, if any.
    pub(crate) active: Option<NodeId>,
    /// Effects waiting for the next flush, in schedule order.
    pub(crate) pending: VecDeque<NodeId>,
    /// Nesting depth of `batch()` calls; flush runs when it returns to 0.
    pub(crate) batch_depth: usize,
    /// A flush loop is draining `pending` right now.
    pub(crate) flushing: bool,
    /// Scope arena, same monotonic policy as nodes.
    pub(crate) scopes: Vec<Option<Scope>>,
    /// Stack of scopes entered via `EffectScope::run`.
    pub(crate) scope_stack: Vec<ScopeId>,
}

impl Runtime {
    fn new() -> Self {
        Runtime {
            nodes: Vec::new(),
            active: None,
            pending: VecDeque::new(),
            batch_depth: 0,
            flushing: false,
            scopes: Vec::new(),
            scope_stack: Vec::new(),
        }
    }

    pub(crate) fn insert_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }
}

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::new());
}

/// Run `f` with exclusive access to the runtime.
///
/// Callers must not invoke user code inside `f` - user closures may read
/// signals, which needs the runtime back.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.borrow_mut()))
}

/// Reset the whole graph (for testing).
pub fn reset_runtime() {
    RUNTIME.with(|rt| *rt.borrow_mut() = Runtime::new());
}

// =============================================================================
// Tracking
// =============================================================================

/// Record an edge from the active reaction (if any) to `id`.
pub(crate) fn track_read(id: NodeId) {
    with_runtime(|rt| {
        let Some(active) = rt.active else { return };
        let already = rt
            .node_ref(active)
            .map(|node| node.deps.contains(&id))
            .unwrap_or(true);
        if already {
            return;
        }
        if let Some(node) = rt.node_mut(active) {
            node.deps.push(id);
        }
        if let Some(node) = rt.node_mut(id) {
            node.subs.push(active);
        }
    });
}

/// Mark everything downstream of a changed node and queue its effects.
fn mark_subscribers(rt: &mut Runtime, id: NodeId) {
    let subs: EdgeList = match rt.node_ref(id) {
        Some(node) => node.subs.clone(),
        None => return,
    };
    for sub in subs {
        let Some(node) = rt.node_mut(sub) else { continue };
        if node.flags.contains(NodeFlags::DISPOSED) {
            continue;
        }
        if node.flags.contains(NodeFlags::DERIVED) {
            if !node.flags.contains(NodeFlags::DIRTY) {
                node.flags.insert(NodeFlags::DIRTY);
                mark_subscribers(rt, sub);
            }
        } else if node.flags.contains(NodeFlags::EFFECT)
            && !node.flags.contains(NodeFlags::SCHEDULED)
        {
            node.flags.insert(NodeFlags::SCHEDULED);
            rt.pending.push_back(sub);
        }
    }
}

/// A source node's value changed: propagate dirtiness, then flush if idle.
pub(crate) fn notify_write(id: NodeId) {
    with_runtime(|rt| mark_subscribers(rt, id));
    scheduling::maybe_flush();
}

// =============================================================================
// Reaction Execution
// =============================================================================

fn detach_deps(rt: &mut Runtime, id: NodeId) {
    let deps = match rt.node_mut(id) {
        Some(node) => std::mem::take(&mut node.deps),
        None => return,
    };
    for dep in deps {
        if let Some(node) = rt.node_mut(dep) {
            node.subs.retain(|sub| *sub != id);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run an effect body once: discard old edges, run previous cleanups,
/// execute tracked, and isolate panics to this run.
pub(crate) fn run_reaction(id: NodeId) {
    let Some((body, cleanups)) = with_runtime(|rt| {
        let node = rt.node_mut(id)?;
        if node.flags.contains(NodeFlags::DISPOSED) {
            return None;
        }
        node.flags.remove(NodeFlags::DIRTY | NodeFlags::SCHEDULED);
        let body = node.run.clone()?;
        let cleanups = std::mem::take(&mut node.cleanups);
        detach_deps(rt, id);
        Some((body, cleanups))
    }) else {
        return;
    };

    // Previous run's cleanups fire before the body, outside tracking.
    for cleanup in cleanups {
        cleanup();
    }

    let prev = with_runtime(|rt| rt.active.replace(id));
    let result = catch_unwind(AssertUnwindSafe(|| body()));
    with_runtime(|rt| rt.active = prev);

    if let Err(payload) = result {
        log::error!("reaction panicked: {}", panic_message(&payload));
    }
}

/// Settle a derived node if it is dirty.
fn update_derived(id: NodeId) {
    let compute = with_runtime(|rt| {
        let node = rt.node_mut(id)?;
        if node.flags.contains(NodeFlags::DISPOSED)
            || node.flags.contains(NodeFlags::RUNNING)
            || !node.flags.contains(NodeFlags::DIRTY)
        {
            return None;
        }
        node.flags.insert(NodeFlags::RUNNING);
        let compute = node.compute.clone();
        detach_deps(rt, id);
        compute
    });
    let Some(compute) = compute else { return };

    let prev = with_runtime(|rt| rt.active.replace(id));
    let result = catch_unwind(AssertUnwindSafe(|| compute()));
    with_runtime(|rt| rt.active = prev);

    match result {
        Ok(value) => with_runtime(|rt| {
            let Some(node) = rt.node_mut(id) else { return };
            node.flags.remove(NodeFlags::RUNNING | NodeFlags::DIRTY);
            let changed = match (&node.value, &node.equals) {
                (Some(old), Some(eq)) => !eq(old, &value),
                _ => true,
            };
            if changed {
                node.value = Some(value);
            }
        }),
        Err(payload) => {
            // Leave DIRTY set: the failure is not cached, the next read
            // recomputes.
            with_runtime(|rt| {
                if let Some(node) = rt.node_mut(id) {
                    node.flags.remove(NodeFlags::RUNNING);
                }
            });
            std::panic::resume_unwind(payload);
        }
    }
}

/// Dispose a node: detach edges, run cleanups, drop closures.
pub(crate) fn dispose_node(id: NodeId) {
    let cleanups = with_runtime(|rt| {
        let Some(node) = rt.node_mut(id) else {
            return Vec::new();
        };
        if node.flags.contains(NodeFlags::DISPOSED) {
            return Vec::new();
        }
        node.flags.insert(NodeFlags::DISPOSED);
        node.run = None;
        node.compute = None;
        node.value = None;
        let cleanups = std::mem::take(&mut node.cleanups);
        detach_deps(rt, id);
        cleanups
    });
    for cleanup in cleanups {
        cleanup();
    }
}

// =============================================================================
// Signal
// =============================================================================

/// Mutable reactive cell.
///
/// Copyable handle; the value lives in the thread-local graph. Reading
/// through [`Signal::get`] inside a running reaction subscribes that
/// reaction; [`Signal::peek`] never does.
pub struct Signal<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Signal<T> {}

fn typed_equals<T: PartialEq + 'static>() -> Rc<dyn Fn(&Value, &Value) -> bool> {
    Rc::new(|a: &Value, b: &Value| {
        match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    })
}

fn read_value<T: Clone + 'static>(id: NodeId) -> Option<T> {
    with_runtime(|rt| {
        let node = rt.node_ref(id)?;
        let value = node.value.as_ref()?;
        value.downcast_ref::<T>().cloned()
    })
}

/// Create a reactive source value.
pub fn signal<T: Clone + PartialEq + 'static>(initial: T) -> Signal<T> {
    let id = with_runtime(|rt| rt.insert_node(Node::source(Rc::new(initial), typed_equals::<T>())));
    Signal {
        id,
        _marker: PhantomData,
    }
}

impl<T: Clone + PartialEq + 'static> Signal<T> {
    /// Read the value, subscribing the active reaction.
    pub fn get(&self) -> T {
        track_read(self.id);
        read_value(self.id).expect("signal read after runtime reset")
    }

    /// Read the value without subscribing.
    pub fn peek(&self) -> T {
        read_value(self.id).expect("signal read after runtime reset")
    }

    /// Write the value. Writing an equal value schedules nothing.
    pub fn set(&self, value: T) {
        let changed = with_runtime(|rt| {
            let Some(node) = rt.node_mut(self.id) else {
                return false;
            };
            if node.flags.contains(NodeFlags::DISPOSED) {
                return false;
            }
            let value: Value = Rc::new(value);
            let equal = match (&node.value, &node.equals) {
                (Some(old), Some(eq)) => eq(old, &value),
                _ => false,
            };
            if equal {
                return false;
            }
            node.value = Some(value);
            true
        });
        if changed {
            notify_write(self.id);
        }
    }

    /// Update the value through a function of the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.peek());
        self.set(next);
    }
}

// =============================================================================
// Derived
// =============================================================================

/// Memoized derived value, recomputed lazily on stale reads.
pub struct Derived<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Derived<T> {}

/// Create a derived value from a pure function of other signals.
pub fn derived<T: Clone + PartialEq + 'static>(f: impl Fn() -> T + 'static) -> Derived<T> {
    let compute: Rc<dyn Fn() -> Value> = Rc::new(move || Rc::new(f()) as Value);
    let id = with_runtime(|rt| rt.insert_node(Node::derived(compute, typed_equals::<T>())));
    Derived {
        id,
        _marker: PhantomData,
    }
}

impl<T: Clone + PartialEq + 'static> Derived<T> {
    /// Read the value, settling it first if dirty. Subscribes the active
    /// reaction.
    pub fn get(&self) -> T {
        track_read(self.id);
        update_derived(self.id);
        read_value(self.id).expect("derived read after runtime reset")
    }

    /// Read without subscribing. Still settles a dirty value.
    pub fn peek(&self) -> T {
        untrack(|| {
            update_derived(self.id);
            read_value(self.id).expect("derived read after runtime reset")
        })
    }
}

// =============================================================================
// Effect
// =============================================================================

/// Create a reaction: runs now, re-runs when any dependency changes.
///
/// The returned cleanup disposes it. The effect is also owned by the
/// innermost [`super::scope::EffectScope`], which disposes it when the
/// scope stops - whichever happens first wins, the other is a no-op.
pub fn effect(f: impl Fn() + 'static) -> Cleanup {
    let id = with_runtime(|rt| {
        let id = rt.insert_node(Node::effect(Rc::new(f)));
        if let Some(&scope) = rt.scope_stack.last() {
            if let Some(scope) = rt.scopes.get_mut(scope.0).and_then(|slot| slot.as_mut()) {
                scope.effects.push(id);
            }
        }
        id
    });
    run_reaction(id);
    Box::new(move || dispose_node(id))
}

/// Register a cleanup on the running reaction (or, outside a reaction,
/// on the current scope). Runs before the next re-run and at disposal.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    let placed = with_runtime(|rt| {
        if let Some(active) = rt.active {
            if let Some(node) = rt.node_mut(active) {
                node.cleanups.push(Box::new(f));
                return Ok(());
            }
        }
        Err(f)
    });
    match placed {
        Ok(()) => {}
        Err(f) => super::scope::on_scope_dispose(f),
    }
}

// =============================================================================
// Untracked Execution
// =============================================================================

struct ActiveGuard {
    prev: Option<NodeId>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        with_runtime(|rt| rt.active = prev);
    }
}

/// Run `f` with tracking suspended: reads inside never create edges.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ActiveGuard {
        prev: with_runtime(|rt| rt.active.take()),
    };
    f()
}

/// Alias of [`untrack`] for read-only peeking at graph values.
pub fn peek<R>(f: impl FnOnce() -> R) -> R {
    untrack(f)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::scheduling::batch;
    use super::*;
    use std::cell::Cell;

    fn setup() {
        reset_runtime();
    }

    #[test]
    fn signal_get_set_peek() {
        setup();
        let count = signal(1);
        assert_eq!(count.get(), 1);
        count.set(2);
        assert_eq!(count.peek(), 2);
    }

    #[test]
    fn effect_runs_immediately_and_on_change() {
        setup();
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));
        let runs_effect = runs.clone();
        let _cleanup = effect(move || {
            count.get();
            runs_effect.set(runs_effect.get() + 1);
        });
        assert_eq!(runs.get(), 1, "effect runs once at creation");
        count.set(1);
        assert_eq!(runs.get(), 2, "effect re-runs on dependency change");
    }

    #[test]
    fn equal_write_schedules_nothing() {
        setup();
        let count = signal(5);
        let runs = Rc::new(Cell::new(0));
        let runs_effect = runs.clone();
        let _cleanup = effect(move || {
            count.get();
            runs_effect.set(runs_effect.get() + 1);
        });
        count.set(5);
        assert_eq!(runs.get(), 1, "writing an equal value must not schedule");
    }

    #[test]
    fn derived_is_lazy_and_memoized() {
        setup();
        let count = signal(2);
        let computes = Rc::new(Cell::new(0));
        let computes_inner = computes.clone();
        let doubled = derived(move || {
            computes_inner.set(computes_inner.get() + 1);
            count.get() * 2
        });
        assert_eq!(computes.get(), 0, "derived does not compute until read");
        assert_eq!(doubled.get(), 4);
        assert_eq!(doubled.get(), 4);
        assert_eq!(computes.get(), 1, "clean reads reuse the memo");
        count.set(3);
        assert_eq!(doubled.get(), 6);
        assert_eq!(computes.get(), 2);
    }

    #[test]
    fn dependency_set_rebuilds_each_run() {
        setup();
        let gate = signal(true);
        let a = signal(0);
        let runs = Rc::new(Cell::new(0));
        let runs_effect = runs.clone();
        let _cleanup = effect(move || {
            if gate.get() {
                a.get();
            }
            runs_effect.set(runs_effect.get() + 1);
        });
        assert_eq!(runs.get(), 1);

        a.set(1);
        assert_eq!(runs.get(), 2, "a is a dependency while gate is true");

        gate.set(false);
        assert_eq!(runs.get(), 3);

        a.set(2);
        assert_eq!(runs.get(), 3, "a must stop notifying once gate is false");
    }

    #[test]
    fn untrack_suppresses_edges() {
        setup();
        let tracked = signal(0);
        let ignored = signal(0);
        let runs = Rc::new(Cell::new(0));
        let runs_effect = runs.clone();
        let _cleanup = effect(move || {
            tracked.get();
            untrack(|| ignored.get());
            runs_effect.set(runs_effect.get() + 1);
        });
        ignored.set(9);
        assert_eq!(runs.get(), 1, "untracked reads must not subscribe");
        tracked.set(1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn glitch_free_batch() {
        setup();
        let a = signal(1);
        let b = signal(10);
        let sum = derived(move || a.get() + b.get());
        let observed = Rc::new(RefCell::new(Vec::new()));
        let observed_effect = observed.clone();
        let _cleanup = effect(move || {
            observed_effect.borrow_mut().push(sum.get());
        });
        assert_eq!(*observed.borrow(), vec![11]);

        batch(|| {
            a.set(2);
            b.set(20);
        });
        assert_eq!(
            *observed.borrow(),
            vec![11, 22],
            "effect must see the batch exactly once, never an intermediate sum"
        );
    }

    #[test]
    fn end_to_end_count_doubled_log() {
        setup();
        let count = signal(0);
        let doubled = derived(move || count.get() * 2);
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_effect = log.clone();
        let _cleanup = effect(move || {
            log_effect.borrow_mut().push(doubled.get());
        });
        count.set(5);
        assert_eq!(
            *log.borrow(),
            vec![0, 10],
            "set(5) must log 10 exactly once"
        );
    }

    #[test]
    fn reaction_cleanup_runs_before_rerun_and_on_dispose() {
        setup();
        let count = signal(0);
        let cleaned = Rc::new(Cell::new(0));
        let cleaned_effect = cleaned.clone();
        let cleanup = effect(move || {
            count.get();
            let cleaned = cleaned_effect.clone();
            on_cleanup(move || cleaned.set(cleaned.get() + 1));
        });
        assert_eq!(cleaned.get(), 0);
        count.set(1);
        assert_eq!(cleaned.get(), 1, "cleanup fires before the re-run");
        cleanup();
        assert_eq!(cleaned.get(), 2, "cleanup fires at disposal");
    }

    #[test]
    fn panicking_reaction_does_not_corrupt_the_graph() {
        setup();
        let count = signal(0);
        let trip = signal(false);
        let runs = Rc::new(Cell::new(0));
        let runs_effect = runs.clone();
        let _cleanup = effect(move || {
            runs_effect.set(runs_effect.get() + 1);
            count.get();
            if trip.get() {
                panic!("boom");
            }
        });
        assert_eq!(runs.get(), 1);
        trip.set(true);
        assert_eq!(runs.get(), 2, "the panicking run still counts");
        // Edges established before the panic are intact: the effect still
        // reacts to count.
        trip.set(false);
        count.set(1);
        assert!(runs.get() >= 3, "graph keeps working after the panic");
    }

    #[test]
    fn derived_panic_is_not_cached() {
        setup();
        let poison = signal(true);
        let value = derived(move || {
            if poison.get() {
                panic!("poisoned");
            }
            42
        });
        let first = catch_unwind(AssertUnwindSafe(|| value.get()));
        assert!(first.is_err(), "first read propagates the panic");
        poison.set(false);
        assert_eq!(value.get(), 42, "next read retries the computation");
    }

    #[test]
    fn effect_cleanup_handle_is_idempotent() {
        setup();
        let count = signal(0);
        let runs = Rc::new(Cell::new(0));
        let runs_effect = runs.clone();
        let cleanup = effect(move || {
            count.get();
            runs_effect.set(runs_effect.get() + 1);
        });
        cleanup();
        count.set(1);
        assert_eq!(runs.get(), 1, "disposed effect must not re-run");
    }
}
