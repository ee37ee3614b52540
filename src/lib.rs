//! # tidal
//!
//! Fine-grained reactive rendering engine.
//!
//! A compiler targets this crate: component templates lower to
//! straight-line calls into [`primitives`], state lowers to [`signals`]
//! per the [`classify`] rules, and the result mounts fresh or hydrates
//! server markup through [`pipeline`]. Updates are node-grained - a
//! signal write rewrites the text nodes and regions that depend on it,
//! never a virtual-tree diff.
//!
//! ## Modules
//!
//! - [`signals`] - signal graph: signals, deriveds, effects, scopes, batching
//! - [`classify`] - static classifier deciding which bindings become signals
//! - [`dom`] - document arena the primitives lower into
//! - [`primitives`] - element/text/show/each lowering targets
//! - [`hydrate`] - cursor protocol for claiming server-rendered nodes
//! - [`outlet`] - nested route composition over child slots
//! - [`pipeline`] - mount and hydrate entry points

pub mod classify;
pub mod dom;
pub mod error;
pub mod hydrate;
pub mod outlet;
pub mod pipeline;
pub mod primitives;
pub mod signals;

pub use error::{GraphError, HydrationMismatch};

pub use signals::{
    Cleanup, Derived, EffectScope, Signal, batch, derived, effect, effect_scope, flush_sync,
    on_cleanup, on_scope_dispose, peek, signal, tick, untrack,
};

pub use classify::{
    Binding, BindingKind, Classification, ClassificationDiagnostic, ClassifiedBinding,
    ClassifierOutput, ComponentFn, Write, WriteKind, classify,
};

pub use dom::NodeId;

pub use primitives::{
    Children, each, element, element_with, resolve_children, show, show_when, static_text, text,
};

pub use hydrate::{HydrationReport, hydrate, is_hydrating};

pub use outlet::{
    ChildSlot, Component, RouteDef, RouteMatch, RouterHandle, hydrate_router, mount_router, outlet,
};

pub use pipeline::{MountHandle, hydrate_mount, mount};
