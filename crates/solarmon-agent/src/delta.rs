//! Per-interval rates from cumulative network counters.

use crate::sensors::CounterPair;

/// Bytes per MiB.
pub const MIB: f64 = 1024.0 * 1024.0;

/// Signed byte difference between two counter pairs, as (in, out).
///
/// Counters that went backwards (wrap or interface reset) yield a negative
/// component; it is returned as-is for the caller to classify.
pub fn rate(prev: CounterPair, curr: CounterPair) -> (i64, i64) {
    (
        curr.received.wrapping_sub(prev.received) as i64,
        curr.sent.wrapping_sub(prev.sent) as i64,
    )
}

/// Returns true if either component of a rate is negative.
pub fn is_rollback(rate: (i64, i64)) -> bool {
    rate.0 < 0 || rate.1 < 0
}

/// Scales a byte count to MiB.
pub fn to_mib(bytes: i64) -> f64 {
    bytes as f64 / MIB
}
