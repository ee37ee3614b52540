//! Batching and flushing of scheduled reactions.
//!
//! Writes coalesce: every `set()` inside one synchronous batch marks
//! dirtiness and queues effects, and the queue drains once when the batch
//! ends. Deriveds settle lazily when the flushed effects read them, so an
//! effect never observes a half-updated derived.
//!
//! A flush that never reaches a fixed point (a reaction writing its own
//! dependencies) is a runaway update: the flush aborts after
//! [`MAX_FLUSH_STEPS`] reaction executions and reports
//! [`GraphError::FlushOverflow`].

use crate::error::GraphError;

use super::flags::NodeFlags;
use super::graph::{run_reaction, with_runtime};

/// Reaction executions allowed in a single flush before it is declared
/// divergent.
pub(crate) const MAX_FLUSH_STEPS: usize = 10_000;

/// Flush if no batch is open and no flush is already draining the queue.
pub(crate) fn maybe_flush() {
    let idle = with_runtime(|rt| rt.batch_depth == 0 && !rt.flushing);
    if idle {
        if let Err(err) = tick() {
            log::error!("{err}");
        }
    }
}

/// Drain the pending effect queue now.
///
/// Effects run once each, in schedule order; work they queue runs in the
/// same flush. Exceeding the step cap aborts the batch: the remaining
/// queue is dropped and [`GraphError::FlushOverflow`] is returned.
pub fn tick() -> Result<(), GraphError> {
    let proceed = with_runtime(|rt| {
        if rt.flushing {
            false
        } else {
            rt.flushing = true;
            true
        }
    });
    if !proceed {
        return Ok(());
    }

    let mut steps = 0usize;
    let mut result = Ok(());
    loop {
        let next = with_runtime(|rt| rt.pending.pop_front());
        let Some(id) = next else { break };
        steps += 1;
        if steps > MAX_FLUSH_STEPS {
            // Drop the queue, but unschedule its entries so a later write
            // can queue them again.
            with_runtime(|rt| {
                let mut stale: Vec<_> = rt.pending.drain(..).collect();
                stale.push(id);
                for stale_id in stale {
                    if let Some(node) = rt.node_mut(stale_id) {
                        node.flags.remove(NodeFlags::SCHEDULED);
                    }
                }
            });
            result = Err(GraphError::FlushOverflow {
                max_steps: MAX_FLUSH_STEPS,
            });
            break;
        }
        run_reaction(id);
    }

    with_runtime(|rt| rt.flushing = false);
    result
}

/// Synonym for [`tick`], for callers that think in flushes.
pub fn flush_sync() -> Result<(), GraphError> {
    tick()
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        with_runtime(|rt| rt.batch_depth -= 1);
    }
}

/// Coalesce every write inside `f` into one flush.
///
/// Nests: only the outermost batch flushes.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    with_runtime(|rt| rt.batch_depth += 1);
    let result = {
        let _guard = BatchGuard;
        f()
    };
    maybe_flush();
    result
}
