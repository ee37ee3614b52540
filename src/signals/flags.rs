//! Node state flags for the signal graph.
//!
//! Every graph node carries one flag word combining its kind (source,
//! derived, effect) with its current status. Status bits are mutated in
//! place during tracking and flushing.

use bitflags::bitflags;

bitflags! {
    /// Kind and status of a signal-graph node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct NodeFlags: u32 {
        /// Plain reactive source value.
        const SOURCE = 1 << 0;
        /// Memoized derived value.
        const DERIVED = 1 << 1;
        /// Reaction with a side-effecting body.
        const EFFECT = 1 << 2;

        /// Value may be stale; recompute on next read (derived only).
        const DIRTY = 1 << 3;
        /// Already queued for the current flush (effect only).
        const SCHEDULED = 1 << 4;
        /// Body is executing right now; guards re-entrant reads.
        const RUNNING = 1 << 5;
        /// Disposed; every further operation is a no-op.
        const DISPOSED = 1 << 6;
    }
}
