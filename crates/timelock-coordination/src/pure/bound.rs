//! Bound encoding and allocator refill arithmetic.

/// Result of parsing a stored bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseBoundResult {
    /// Decoded bound.
    Value(u64),
    /// Not 16 lowercase hex characters encoding 8 bytes.
    Invalid,
}

/// Encode a bound as 16 lowercase hex characters (8 bytes, big-endian).
///
/// Fixed width keeps the lexical order of stored values equal to their
/// numeric order.
#[inline]
pub fn encode_bound(value: u64) -> String {
    hex::encode(value.to_be_bytes())
}

/// Decode a stored bound.
pub fn parse_bound(stored: &str) -> ParseBoundResult {
    let bytes = match hex::decode(stored) {
        Ok(bytes) => bytes,
        Err(_) => return ParseBoundResult::Invalid,
    };
    match <[u8; 8]>::try_from(bytes.as_slice()) {
        Ok(array) => ParseBoundResult::Value(u64::from_be_bytes(array)),
        Err(_) => ParseBoundResult::Invalid,
    }
}

/// Whether moving the bound from `previous` to `new_bound` keeps it non-decreasing.
#[inline]
pub fn is_valid_advance(previous: u64, new_bound: u64) -> bool {
    new_bound >= previous
}

/// Whether `count` timestamps starting at `next` fit below `upper_limit`.
#[inline]
pub fn can_serve_from_reservation(next: u64, upper_limit: u64, count: u64) -> bool {
    match next.checked_add(count) {
        Some(end) => end <= upper_limit,
        None => false,
    }
}

/// Compute the bound to persist when the reservation cannot serve `count`.
///
/// The target is `next + max(count * multiplier, min_buffer, count)`. Near the
/// top of the timestamp space the over-reservation is dropped and only `count`
/// is reserved. Returns `None` when even that overflows.
pub fn compute_refill_target(next: u64, count: u64, multiplier: u64, min_buffer: u64) -> Option<u64> {
    let headroom = count.saturating_mul(multiplier).max(min_buffer).max(count);
    next.checked_add(headroom).or_else(|| next.checked_add(count))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_encode_bound_fixed_width() {
        assert_eq!(encode_bound(10_000), "0000000000002710");
        assert_eq!(encode_bound(0), "0000000000000000");
        assert_eq!(encode_bound(u64::MAX), "ffffffffffffffff");
    }

    #[test]
    fn test_parse_bound() {
        assert_eq!(parse_bound("0000000000002710"), ParseBoundResult::Value(10_000));
        assert_eq!(parse_bound(""), ParseBoundResult::Invalid);
        assert_eq!(parse_bound("2710"), ParseBoundResult::Invalid);
        assert_eq!(parse_bound("not hex at all!!"), ParseBoundResult::Invalid);
        assert_eq!(parse_bound("000000000000002710"), ParseBoundResult::Invalid);
    }

    #[test]
    fn test_is_valid_advance() {
        assert!(is_valid_advance(10, 10));
        assert!(is_valid_advance(10, 11));
        assert!(!is_valid_advance(10, 9));
    }

    #[test]
    fn test_can_serve_from_reservation() {
        assert!(can_serve_from_reservation(10_000, 10_005, 5));
        assert!(!can_serve_from_reservation(10_000, 10_005, 6));
        assert!(!can_serve_from_reservation(u64::MAX - 1, u64::MAX, 2));
    }

    #[test]
    fn test_compute_refill_target() {
        // min_buffer dominates small requests
        assert_eq!(compute_refill_target(10_000, 5, 1_000, 1_000_000), Some(1_010_000));
        // count * multiplier dominates large requests
        assert_eq!(compute_refill_target(0, 5_000, 1_000, 1_000_000), Some(5_000_000));
        // never less than count
        assert_eq!(compute_refill_target(0, 7, 0, 0), Some(7));
        // near the top: fall back to exactly count
        assert_eq!(compute_refill_target(u64::MAX - 10, 5, 1_000, 1_000_000), Some(u64::MAX - 5));
        assert_eq!(compute_refill_target(u64::MAX - 1, 5, 1, 1), None);
    }

    proptest! {
        #[test]
        fn prop_encoding_preserves_order(a in any::<u64>(), b in any::<u64>()) {
            prop_assert_eq!(a.cmp(&b), encode_bound(a).cmp(&encode_bound(b)));
            prop_assert_eq!(parse_bound(&encode_bound(a)), ParseBoundResult::Value(a));
        }

        #[test]
        fn prop_refill_covers_request(
            next in 0u64..u64::MAX / 2,
            count in 1u64..10_000,
            multiplier in 0u64..10_000,
            min_buffer in 0u64..10_000_000,
        ) {
            let target = compute_refill_target(next, count, multiplier, min_buffer).unwrap();
            prop_assert!(can_serve_from_reservation(next, target, count));
            prop_assert!(target >= next + min_buffer);
        }
    }
}
