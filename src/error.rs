//! Error taxonomy for the rendering engine.
//!
//! Only two failure shapes live here. Classifier diagnostics are values
//! returned by [`crate::classify`], and a superseded navigation is an
//! expected outcome (`finish_navigation` returns `false`), not an error.

use thiserror::Error;

/// Fatal signal-graph failures.
///
/// A flush that keeps scheduling work without reaching a fixed point is a
/// cyclic or runaway update. The flush aborts and drops the remaining
/// queue rather than spinning forever.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The flush executed more reactions than the step cap allows.
    #[error(
        "reactive flush exceeded {max_steps} steps without settling; \
         a reaction is writing its own dependencies"
    )]
    FlushOverflow {
        /// The step cap that was exceeded.
        max_steps: usize,
    },
}

/// A claimed node did not match what the component program expected.
///
/// Recoverable: the claim falls back to creating a fresh node. Still worth
/// reporting, because it means server and client output have drifted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hydration mismatch: expected <{expected}>, found {}", found.as_deref().unwrap_or("end of children"))]
pub struct HydrationMismatch {
    /// Tag (or `#text`) the claiming code asked for.
    pub expected: String,
    /// What sat at the cursor position instead, if anything.
    pub found: Option<String>,
}
