//! Contiguous UDP/TCP port range allocation, ported from
//! `internal/room/ports.go`. A pure function of a live-fleet snapshot —
//! the allocator keeps no state of its own, so callers re-derive the
//! used ranges from the host on every call.

use crate::error::{Error, Result};
use crate::model::EprRange;

/// Returns a free `EprRange` of `span` ports inside `[pool_min, pool_max]`
/// that does not intersect any range in `used` (need not be sorted).
///
/// In mux mode the caller always asks for `span = 1`, and the single
/// returned port is bound for both UDP and TCP.
pub fn allocate(used: &[EprRange], pool_min: u16, pool_max: u16, span: u16) -> Result<EprRange> {
    if span < 1 {
        return Err(Error::invalid_input("unable to allocate 0 ports"));
    }

    let mut sorted: Vec<EprRange> = used.to_vec();
    sorted.sort_by_key(|r| r.min);

    let mut candidate_min = pool_min;
    let mut candidate_max = pool_min.saturating_add(span - 1);

    for range in &sorted {
        let candidate = EprRange::new(candidate_min, candidate_max);
        if candidate.overlaps(range) {
            candidate_min = range.max.saturating_add(1);
            candidate_max = range.max.saturating_add(span);
        }
    }

    if candidate_max > pool_max || candidate_min > candidate_max {
        return Err(Error::conflict("port range exhausted"));
    }

    Ok(EprRange::new(candidate_min, candidate_max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_allocations_tile_the_pool() {
        let mut used = Vec::new();
        let a = allocate(&used, 100, 199, 10).unwrap();
        assert_eq!(a, EprRange::new(100, 109));
        used.push(a);

        let b = allocate(&used, 100, 199, 10).unwrap();
        assert_eq!(b, EprRange::new(110, 119));
        used.push(b);

        let c = allocate(&used, 100, 199, 10).unwrap();
        assert_eq!(c, EprRange::new(120, 129));
    }

    #[test]
    fn releasing_middle_range_allows_reuse() {
        let a = EprRange::new(100, 109);
        let b = EprRange::new(110, 119);
        let c = EprRange::new(120, 129);

        // "a" removed, "b" and "c" still live; a size-10 request should
        // land back in "a"'s old slot.
        let d = allocate(&[b, c], 100, 199, 10).unwrap();
        assert_eq!(d, a);
    }

    #[test]
    fn exhausted_pool_fails() {
        let used = vec![EprRange::new(100, 198)];
        let err = allocate(&used, 100, 199, 10).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }

    #[test]
    fn mux_mode_allocates_single_port() {
        let used = vec![EprRange::new(100, 100)];
        let next = allocate(&used, 100, 199, 1).unwrap();
        assert_eq!(next, EprRange::new(101, 101));
    }
}
