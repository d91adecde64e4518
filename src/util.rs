//! Small shared helpers that don't belong to any one component.

use std::time::Instant;

use once_cell::sync::Lazy;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Nanoseconds since an arbitrary, process-local epoch. Used for the pool's
/// idle-eviction bookkeeping (spec §4.5 `idleAtNs`), where only relative
/// ordering matters, not wall-clock time.
pub(crate) fn monotonic_nanos() -> i64 {
    Instant::now().duration_since(*EPOCH).as_nanos() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_nanos_is_nondecreasing() {
        let a = monotonic_nanos();
        let b = monotonic_nanos();
        assert!(b >= a);
    }
}
