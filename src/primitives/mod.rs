//! Rendering primitives - the lowering target for compiled templates.
//!
//! A template compiles into straight-line calls to these primitives:
//! [`element`] and [`text`] for static structure, [`show`] and [`each`]
//! for control flow. Every primitive returns a [`Cleanup`] and owns an
//! effect scope, so a subtree's effects and DOM nodes are released
//! together when the owner stops.
//!
//! Child content crosses primitive boundaries as [`Children`], whose
//! thunk form keeps hydration claims in document order.

mod context;
mod each;
mod element;
mod show;
mod text;
mod types;

pub(crate) use context::ParentFrame;
pub(crate) use element::claim_or_create_element;

pub use each::each;
pub use element::{element, element_with};
pub use show::{show, show_when};
pub use text::{static_text, text};
pub use types::{Children, Cleanup, resolve_children};
