//! Schedule planning — turns a buffer of collected payloads plus timing
//! parameters into one UTC delivery instant per post.

use chrono::{DateTime, Duration, Utc};
use postcast_core::types::PostPayload;

/// Intra-batch stagger for grouped plans, so one batch's posts do not land on
/// the exact same instant.
const GROUP_STAGGER_SECS: i64 = 2;

/// How the delivery instants are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    /// Posts spread evenly across the duration.
    Spaced,
    /// Posts grouped into fixed-size batches, batches spread across the
    /// duration.
    Grouped,
    /// Single post at an absolute instant.
    Exact,
    /// Single post after a relative delay (already resolved to an instant).
    Relative,
}

/// Timing parameters for a plan. `duration_minutes` and `batch_size` are only
/// read by the modes that need them.
#[derive(Debug, Clone, Copy)]
pub struct PlanParams {
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub batch_size: usize,
}

/// Compute one `(payload, scheduled_at)` pair per item, in input order.
///
/// Callers must reject empty buffers before planning; an empty input yields
/// an empty plan.
pub fn plan(
    mode: PlanMode,
    items: Vec<PostPayload>,
    params: PlanParams,
) -> Vec<(PostPayload, DateTime<Utc>)> {
    let n = items.len();
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let at = params.start + offset(mode, i, n, params);
            (item, at)
        })
        .collect()
}

fn offset(mode: PlanMode, i: usize, n: usize, params: PlanParams) -> Duration {
    match mode {
        PlanMode::Exact | PlanMode::Relative => Duration::zero(),
        PlanMode::Spaced => {
            // interval = duration / N; item i lands at start + i * interval.
            if n <= 1 {
                return Duration::zero();
            }
            let duration_secs = params.duration_minutes * 60;
            Duration::seconds(duration_secs * i as i64 / n as i64)
        }
        PlanMode::Grouped => {
            let b = params.batch_size.max(1);
            let num_batches = n.div_ceil(b);
            let batch_interval_secs = if num_batches > 1 {
                params.duration_minutes * 60 / num_batches as i64
            } else {
                0
            };
            let batch_index = (i / b) as i64;
            let slot_in_batch = (i % b) as i64;
            Duration::seconds(batch_interval_secs * batch_index + GROUP_STAGGER_SECS * slot_in_batch)
        }
    }
}

/// Number of batches a grouped plan of `n` items with batch size `b` uses.
pub fn num_batches(n: usize, b: usize) -> usize {
    n.div_ceil(b.max(1))
}
