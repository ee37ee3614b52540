//! Signal graph - fine-grained dependency tracking and propagation.
//!
//! The primitive surface a code generator targets:
//! [`signal`], [`derived`], [`effect`], [`untrack`], [`batch`],
//! [`effect_scope`] / [`on_scope_dispose`], [`on_cleanup`], [`tick`].
//!
//! - [`graph`] - node arena, tracking, signal/derived/effect constructors
//! - [`scheduling`] - batching and the flush loop
//! - [`scope`] - ownership tree for reactions and cleanups

mod flags;
mod graph;
mod scheduling;
mod scope;

pub use graph::{
    Cleanup, Derived, Signal, derived, effect, on_cleanup, peek, reset_runtime, signal, untrack,
};
pub use scheduling::{batch, flush_sync, tick};
pub use scope::{EffectScope, effect_scope, on_scope_dispose};
