//! Outlet - nested route composition over child slots.
//!
//! A matched route chain `[layout, section, leaf]` composes outside-in:
//! each level's component renders once and marks where its child goes by
//! calling [`outlet`] during its own synchronous construction. The outlet
//! reads a per-level child slot signal, so navigation that only swaps a
//! deeper level writes that one slot and re-renders that one subtree;
//! every ancestor's DOM is untouched.
//!
//! Route identity is the `Rc<RouteDef>` pointer. Two chains that share a
//! prefix by pointer identity keep that prefix mounted; the first level
//! where identity differs is where teardown begins.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::dom::{self, NodeId};
use crate::hydrate::{ChildFrame, HydrationReport, hydrate};
use crate::primitives::{Cleanup, ParentFrame, claim_or_create_element};
use crate::signals::{EffectScope, Signal, effect, effect_scope, on_scope_dispose, signal, untrack};

// =============================================================================
// Route Types
// =============================================================================

/// A component renders by side effect into the current parent context.
pub type Component = Rc<dyn Fn()>;

/// A route table entry. Identity is the allocation: two `RouteMatch`es
/// referring to the same `Rc<RouteDef>` are the same route.
#[derive(Debug)]
pub struct RouteDef {
    pub path: String,
}

impl RouteDef {
    pub fn new(path: impl Into<String>) -> Rc<Self> {
        Rc::new(RouteDef { path: path.into() })
    }
}

/// One matched level of a route chain.
#[derive(Clone)]
pub struct RouteMatch {
    pub route: Rc<RouteDef>,
    pub params: Vec<(String, String)>,
    pub render: Component,
}

impl RouteMatch {
    pub fn new(route: &Rc<RouteDef>, render: impl Fn() + 'static) -> Self {
        RouteMatch {
            route: route.clone(),
            params: Vec::new(),
            render: Rc::new(render),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }
}

// =============================================================================
// Child Slots
// =============================================================================

/// The component a level's outlet should currently render, if any.
///
/// Equality is pointer identity, matching route identity: writing the
/// same component back is a no-op at the signal layer.
#[derive(Clone)]
pub struct ChildSlot(Option<Component>);

impl ChildSlot {
    fn new(component: Option<Component>) -> Self {
        ChildSlot(component)
    }

    fn component(&self) -> Option<Component> {
        self.0.clone()
    }
}

impl PartialEq for ChildSlot {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

thread_local! {
    static OUTLET_STACK: RefCell<Vec<Signal<ChildSlot>>> = const { RefCell::new(Vec::new()) };
}

fn current_slot() -> Option<Signal<ChildSlot>> {
    OUTLET_STACK.with(|stack| stack.borrow().last().copied())
}

/// RAII outlet context: while a level renders, its child slot is the one
/// an [`outlet`] call inside it captures.
struct OutletFrame;

impl OutletFrame {
    fn push(slot: Signal<ChildSlot>) -> Self {
        OUTLET_STACK.with(|stack| stack.borrow_mut().push(slot));
        OutletFrame
    }
}

impl Drop for OutletFrame {
    fn drop(&mut self) {
        OUTLET_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// =============================================================================
// Outlet Primitive
// =============================================================================

/// Render the current level's child route here.
///
/// Must run during the level's synchronous construction, while the
/// router's context for that level is live. Outside any route level it
/// renders nothing and logs a warning.
pub fn outlet() -> Cleanup {
    let Some(slot) = current_slot() else {
        log::warn!("outlet() called outside any route level; rendering nothing");
        return Box::new(|| {});
    };
    let container = claim_or_create_element("div");
    let scope = effect_scope();
    let child: Rc<RefCell<Option<EffectScope>>> = Rc::new(RefCell::new(None));

    scope.run(|| {
        let child_effect = child.clone();
        effect(move || {
            let current = slot.get();
            let previous = child_effect.borrow_mut().take();
            if let Some(previous) = previous {
                previous.stop();
            }
            let child_scope = scope.run(effect_scope);
            child_scope.run(|| {
                let _parent = ParentFrame::push(container);
                let _frame = ChildFrame::enter(container);
                untrack(|| {
                    if let Some(component) = current.component() {
                        component();
                    }
                });
            });
            *child_effect.borrow_mut() = Some(child_scope);
        });

        let child_dispose = child.clone();
        on_scope_dispose(move || {
            if let Some(current) = child_dispose.borrow_mut().take() {
                current.stop();
            }
        });
        on_scope_dispose(move || dom::remove(container));
    });

    Box::new(move || scope.stop())
}

// =============================================================================
// Composition
// =============================================================================

/// First level where the chains stop being the same route, by pointer
/// identity. `None` means same routes all the way down (params may still
/// differ).
fn divergence_index(old: &[RouteMatch], new: &[RouteMatch]) -> Option<usize> {
    let shared = old.len().min(new.len());
    for index in 0..shared {
        if !Rc::ptr_eq(&old[index].route, &new[index].route) {
            return Some(index);
        }
    }
    if old.len() == new.len() { None } else { Some(shared) }
}

/// Compose `chain[from..]` inside-out into a single component. Appends
/// one fresh child slot per level to `slots`, outermost first.
fn compose_from(
    chain: &[RouteMatch],
    from: usize,
    slots: &mut Vec<Signal<ChildSlot>>,
) -> Option<Component> {
    let mut inner: Option<Component> = None;
    let mut built: Vec<Signal<ChildSlot>> = Vec::new();
    for level in chain[from..].iter().rev() {
        let slot = signal(ChildSlot::new(inner.take()));
        built.push(slot);
        let render = level.render.clone();
        inner = Some(Rc::new(move || {
            let _context = OutletFrame::push(slot);
            render();
        }) as Component);
    }
    built.reverse();
    slots.extend(built);
    inner
}

// =============================================================================
// Router Handle
// =============================================================================

/// A mounted route chain and the machinery to navigate it.
pub struct RouterHandle {
    container: NodeId,
    root: RefCell<Option<EffectScope>>,
    chain: RefCell<Vec<RouteMatch>>,
    slots: RefCell<Vec<Signal<ChildSlot>>>,
    generation: Cell<u64>,
    report: Option<HydrationReport>,
}

/// Mount `chain` into `container` from scratch.
pub fn mount_router(container: NodeId, chain: Vec<RouteMatch>) -> RouterHandle {
    let handle = RouterHandle::detached(container);
    handle.remount(chain);
    handle
}

/// Mount `chain` by hydrating the server markup already under
/// `container`.
pub fn hydrate_router(container: NodeId, chain: Vec<RouteMatch>) -> RouterHandle {
    let mut handle = RouterHandle::detached(container);
    let report = hydrate(container, || handle.remount(chain));
    handle.report = Some(report);
    handle
}

impl RouterHandle {
    fn detached(container: NodeId) -> Self {
        RouterHandle {
            container,
            root: RefCell::new(None),
            chain: RefCell::new(Vec::new()),
            slots: RefCell::new(Vec::new()),
            generation: Cell::new(0),
            report: None,
        }
    }

    /// Hydration outcome, when this router was mounted with
    /// [`hydrate_router`].
    pub fn report(&self) -> Option<&HydrationReport> {
        self.report.as_ref()
    }

    /// The chain currently mounted.
    pub fn current_chain(&self) -> Vec<RouteMatch> {
        self.chain.borrow().clone()
    }

    /// Start a navigation; the token must be presented to
    /// [`finish_navigation`]. Starting a newer navigation invalidates
    /// every earlier token, so a slow async match cannot clobber a later
    /// one.
    pub fn begin_navigation(&self) -> u64 {
        let token = self.generation.get() + 1;
        self.generation.set(token);
        token
    }

    /// Apply a resolved chain if `token` is still the latest navigation.
    /// Returns whether the chain was applied.
    pub fn finish_navigation(&self, token: u64, chain: Vec<RouteMatch>) -> bool {
        if token != self.generation.get() {
            log::debug!("discarding stale navigation (token {token})");
            return false;
        }
        self.apply(chain);
        true
    }

    /// Synchronous navigate: begin and finish in one step.
    pub fn navigate(&self, chain: Vec<RouteMatch>) {
        let token = self.begin_navigation();
        self.finish_navigation(token, chain);
    }

    /// Tear down the mounted chain, leaving the container empty.
    pub fn unmount(&self) {
        if let Some(root) = self.root.borrow_mut().take() {
            root.stop();
        }
        self.chain.borrow_mut().clear();
        self.slots.borrow_mut().clear();
    }

    fn apply(&self, chain: Vec<RouteMatch>) {
        let divergence = divergence_index(&self.chain.borrow(), &chain);
        match divergence {
            // Same routes throughout: params-only change, no DOM work.
            None => {
                *self.chain.borrow_mut() = chain;
            }
            Some(0) => self.remount(chain),
            Some(level) => {
                let mut fresh_slots = Vec::new();
                let suffix = compose_from(&chain, level, &mut fresh_slots);
                let feed = self.slots.borrow()[level - 1];
                {
                    let mut slots = self.slots.borrow_mut();
                    slots.truncate(level);
                    slots.extend(fresh_slots);
                }
                *self.chain.borrow_mut() = chain;
                // One slot write; only the diverged subtree re-renders.
                feed.set(ChildSlot::new(suffix));
            }
        }
    }

    fn remount(&self, chain: Vec<RouteMatch>) {
        if let Some(old) = self.root.borrow_mut().take() {
            old.stop();
        }
        let mut slots = Vec::new();
        let root_component = compose_from(&chain, 0, &mut slots);
        let scope = effect_scope();
        scope.run(|| {
            let _parent = ParentFrame::push(self.container);
            if let Some(component) = root_component {
                component();
            }
        });
        *self.root.borrow_mut() = Some(scope);
        *self.slots.borrow_mut() = slots;
        *self.chain.borrow_mut() = chain;
    }
}

// =============================================================================
// Tests
// =============================================================================
