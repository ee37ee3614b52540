//! Hydration cursor - claiming server-rendered nodes in document order.
//!
//! Server markup is built top-down; a client program that constructs the
//! same tree claims nodes in the same order, provided child content
//! crosses composing-function boundaries as a thunk (see
//! [`crate::primitives::Children`]). The cursor is a plain value - a
//! stack of `(parent, next-child index)` frames - installed for exactly
//! one [`hydrate`] pass and visible only to the claiming primitives,
//! never to component authors.
//!
//! Claims are tolerant: a non-matching sibling (say, injected by a
//! browser extension) is skipped, and when no match exists at all the
//! claim falls back to creating a fresh node at the cursor position. Both
//! outcomes are recorded as [`HydrationMismatch`]es in the pass report,
//! because they mean server and client output have drifted - drift is
//! recoverable, but never silent.
//!
//! After a full pass the frame stack must be back to its base frame and
//! every server-rendered node claimed exactly once. Violations are logged
//! and surfaced through [`HydrationReport`] so tests can assert on them.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use crate::dom::{self, NodeId};
use crate::error::HydrationMismatch;

// =============================================================================
// Cursor
// =============================================================================

struct Frame {
    parent: NodeId,
    /// Index of the next child to consider for a claim.
    next: usize,
}

struct Cursor {
    frames: Vec<Frame>,
    mismatches: Vec<HydrationMismatch>,
    claims: usize,
}

impl Cursor {
    fn new(root: NodeId) -> Self {
        Cursor {
            frames: vec![Frame { parent: root, next: 0 }],
            mismatches: Vec::new(),
            claims: 0,
        }
    }
}

thread_local! {
    static CURSOR: RefCell<Option<Cursor>> = const { RefCell::new(None) };
}

fn with_cursor<R>(f: impl FnOnce(&mut Cursor) -> R) -> Option<R> {
    CURSOR.with(|cursor| cursor.borrow_mut().as_mut().map(f))
}

/// Is a hydration pass currently running on this thread?
pub fn is_hydrating() -> bool {
    CURSOR.with(|cursor| cursor.borrow().is_some())
}

// =============================================================================
// Hydration Pass
// =============================================================================

/// Outcome of one [`hydrate`] pass.
#[derive(Debug)]
pub struct HydrationReport {
    /// Server nodes successfully claimed.
    pub claims: usize,
    /// Every spot where client expectations and server markup drifted.
    pub mismatches: Vec<HydrationMismatch>,
    /// Server nodes under the root that no claim consumed.
    pub unclaimed: usize,
    /// Every `enter_children` was matched by an exit.
    pub balanced: bool,
}

impl HydrationReport {
    /// True when the pass matched the server markup exactly.
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.unclaimed == 0 && self.balanced
    }
}

/// Run `f` as a hydration pass over the children of `root`.
///
/// Claims issued by primitives inside `f` consume `root`'s existing
/// subtree instead of creating nodes. The cursor exists only for the
/// duration of this call.
pub fn hydrate(root: NodeId, f: impl FnOnce()) -> HydrationReport {
    CURSOR.with(|cursor| {
        let mut slot = cursor.borrow_mut();
        debug_assert!(slot.is_none(), "nested hydration passes are not supported");
        *slot = Some(Cursor::new(root));
    });

    let result = catch_unwind(AssertUnwindSafe(f));
    let cursor = CURSOR.with(|cursor| cursor.borrow_mut().take());
    if let Err(payload) = result {
        resume_unwind(payload);
    }

    let cursor = cursor.unwrap_or_else(|| Cursor::new(root));
    let balanced = cursor.frames.len() == 1;
    let unclaimed = dom::count_unclaimed(root);
    if !balanced {
        log::warn!(
            "hydration pass ended with {} unbalanced child frame(s)",
            cursor.frames.len().saturating_sub(1)
        );
    }
    if unclaimed > 0 {
        log::warn!("hydration pass left {unclaimed} server node(s) unclaimed");
    }
    for mismatch in &cursor.mismatches {
        log::warn!("{mismatch}");
    }
    HydrationReport {
        claims: cursor.claims,
        mismatches: cursor.mismatches,
        unclaimed,
        balanced,
    }
}

// =============================================================================
// Claiming
// =============================================================================

fn describe(node: NodeId) -> String {
    match dom::tag(node) {
        Some(tag) => tag,
        None => format!("#text \"{}\"", dom::text_content(node)),
    }
}

enum Expected<'a> {
    Element(&'a str),
    Text(&'a str),
}

fn matches(node: NodeId, expected: &Expected<'_>) -> bool {
    if dom::is_claimed(node) {
        return false;
    }
    match expected {
        Expected::Element(tag) => dom::tag(node).as_deref() == Some(*tag),
        Expected::Text(_) => dom::is_text(node),
    }
}

fn claim_in_frame(cursor: &mut Cursor, expected: Expected<'_>) -> NodeId {
    let Some(frame) = cursor.frames.last_mut() else {
        // Frame stack exhausted mid-pass; treat like a fresh render.
        return match expected {
            Expected::Element(tag) => dom::create_element(tag),
            Expected::Text(content) => dom::create_text(content),
        };
    };

    let siblings = dom::children(frame.parent);

    // Tolerant scan: skip foreign siblings, claim the first match.
    let mut index = frame.next;
    while index < siblings.len() {
        let candidate = siblings[index];
        if matches(candidate, &expected) {
            dom::mark_claimed(candidate);
            frame.next = index + 1;
            cursor.claims += 1;
            if let Expected::Text(content) = expected {
                let server = dom::text_content(candidate);
                if server != content {
                    cursor.mismatches.push(HydrationMismatch {
                        expected: format!("#text \"{content}\""),
                        found: Some(format!("#text \"{server}\"")),
                    });
                    dom::set_text(candidate, content);
                }
            }
            return candidate;
        }
        index += 1;
    }

    // Exhausted: fall back to a fresh node at the cursor position.
    let found = siblings.get(frame.next).map(|node| describe(*node));
    let (label, node) = match expected {
        Expected::Element(tag) => (tag.to_string(), dom::create_element(tag)),
        Expected::Text(content) => (format!("#text \"{content}\""), dom::create_text(content)),
    };
    cursor.mismatches.push(HydrationMismatch {
        expected: label,
        found,
    });
    // The fresh node is client-made, not server drift: mark it claimed so
    // the end-of-pass scan does not double-report it.
    dom::mark_claimed(node);
    dom::insert_before(frame.parent, node, siblings.get(frame.next).copied());
    frame.next += 1;
    node
}

/// Claim the next unclaimed element with this tag in the current frame.
pub(crate) fn claim_element(tag: &str) -> NodeId {
    with_cursor(|cursor| claim_in_frame(cursor, Expected::Element(tag)))
        .unwrap_or_else(|| dom::create_element(tag))
}

/// Claim the next unclaimed text node in the current frame, rewriting it
/// if its server content drifted from `content`.
pub(crate) fn claim_text(content: &str) -> NodeId {
    with_cursor(|cursor| claim_in_frame(cursor, Expected::Text(content)))
        .unwrap_or_else(|| dom::create_text(content))
}

// =============================================================================
// Child Frames
// =============================================================================

/// RAII child frame: enter on construction, exit on drop, so the frame
/// stack balances even on exceptional exit paths. A no-op outside a
/// hydration pass.
pub(crate) struct ChildFrame {
    active: bool,
}

impl ChildFrame {
    pub(crate) fn enter(node: NodeId) -> Self {
        let active = with_cursor(|cursor| {
            cursor.frames.push(Frame { parent: node, next: 0 });
        })
        .is_some();
        ChildFrame { active }
    }
}

impl Drop for ChildFrame {
    fn drop(&mut self) {
        if self.active {
            with_cursor(|cursor| {
                cursor.frames.pop();
            });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
