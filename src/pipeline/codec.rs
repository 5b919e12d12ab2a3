//! Verification-code codec.
//!
//! Encodes `(prefix, scoreBucket, sessionSuffix)` into one integer an
//! external LMS can accept as a numeric grade:
//! `prefix·1,000,000 + scoreBucket·1,000 + suffix`. The prefix sub-range
//! that gets sampled encodes pass/fail relative to the agent's stable
//! minimum prefix, so a teacher configures a single "minimum accepted
//! value" threshold and never sees the raw score.

use rand::Rng;
use uuid::Uuid;

pub const PREFIX_MIN: u32 = 200;
pub const PREFIX_MAX: u32 = 998;

/// Fixed sentinel for cases no model path could resolve.
pub const HUMAN_REQUIRED_CODE: i64 = 999_000_000;

/// Derive a stable prefix from the agent id. Pure function of the id, so
/// concurrent first assignments agree without coordination.
pub fn derive_prefix(agent_id: &Uuid) -> u32 {
    let mut hash: u64 = 0;
    for byte in agent_id.to_string().bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u64::from(byte));
    }
    PREFIX_MIN + (hash % u64::from(PREFIX_MAX - PREFIX_MIN + 1)) as u32
}

/// Encode a resolved grading into a verification code.
///
/// A passing result samples its prefix from `[min_prefix, 998]`, a
/// failing one from `[200, min_prefix - 1]` (or `min_prefix` itself when
/// no room exists below). An escalated-but-resolved case is multiplied
/// by 10 as a marker for manual teacher review.
pub fn encode(min_prefix: u32, passed: bool, score: u32, escalated: bool) -> i64 {
    let min_prefix = min_prefix.clamp(PREFIX_MIN, PREFIX_MAX);
    let mut rng = rand::thread_rng();

    let prefix = if passed {
        rng.gen_range(min_prefix..=PREFIX_MAX)
    } else if min_prefix > PREFIX_MIN {
        rng.gen_range(PREFIX_MIN..=min_prefix - 1)
    } else {
        min_prefix
    };

    // Bucket is capped at 999 so a perfect 100,000 cannot spill into
    // the prefix digits.
    let bucket = (score.min(100_000) / 100).min(999);
    let suffix: u32 = rng.gen_range(0..=999);

    let code = i64::from(prefix) * 1_000_000 + i64::from(bucket) * 1_000 + i64::from(suffix);
    if escalated {
        code * 10
    } else {
        code
    }
}

/// Inverse for the external LMS configuration step: the smallest code a
/// passing submission can produce for a given prefix.
pub fn minimum_accepted_value(prefix: u32) -> i64 {
    i64::from(prefix) * 1_000_000
}

/// Largest code any non-escalated result can produce.
pub fn maximum_accepted_value() -> i64 {
    i64::from(PREFIX_MAX) * 1_000_000 + 999_999
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_prefix_is_stable_and_in_range() {
        let id = Uuid::new_v4();
        let first = derive_prefix(&id);
        assert_eq!(first, derive_prefix(&id));
        assert!((PREFIX_MIN..=PREFIX_MAX).contains(&first));
    }

    #[test]
    fn derived_prefixes_spread_across_the_range() {
        let prefixes: std::collections::HashSet<u32> =
            (0..50).map(|_| derive_prefix(&Uuid::new_v4())).collect();
        assert!(prefixes.len() > 10);
    }

    #[test]
    fn passing_code_clears_the_minimum_accepted_value() {
        let min_prefix = 500;
        for _ in 0..100 {
            let code = encode(min_prefix, true, 85_000, false);
            assert!(code >= minimum_accepted_value(min_prefix));
            assert!(code < minimum_accepted_value(PREFIX_MAX + 1));
        }
    }

    #[test]
    fn failing_code_stays_below_the_minimum_accepted_value() {
        let min_prefix = 500;
        for _ in 0..100 {
            let code = encode(min_prefix, false, 40_000, false);
            assert!(code < minimum_accepted_value(min_prefix));
            assert!(code >= minimum_accepted_value(PREFIX_MIN));
        }
    }

    #[test]
    fn failing_with_no_room_below_returns_the_minimum_prefix() {
        let code = encode(PREFIX_MIN, false, 40_000, false);
        assert_eq!(code / 1_000_000, i64::from(PREFIX_MIN));
    }

    #[test]
    fn score_bucket_is_recoverable() {
        for _ in 0..20 {
            let code = encode(500, true, 85_432, false);
            let bucket = (code / 1_000) % 1_000;
            assert_eq!(bucket, 854);
        }
    }

    #[test]
    fn score_is_clamped_to_the_scale_ceiling() {
        let code = encode(500, true, 2_000_000, false);
        let bucket = (code / 1_000) % 1_000;
        assert_eq!(bucket, 999);
    }

    #[test]
    fn escalated_code_carries_the_times_ten_marker() {
        let code = encode(500, true, 85_000, true);
        assert_eq!(code % 10, 0);
        let unmarked = code / 10;
        assert!(unmarked >= minimum_accepted_value(500));
        assert!(unmarked < minimum_accepted_value(PREFIX_MAX + 1));
    }

    #[test]
    fn sentinel_is_outside_every_normal_prefix_range() {
        assert_eq!(maximum_accepted_value(), 998_999_999);
        assert!(HUMAN_REQUIRED_CODE > maximum_accepted_value());
    }
}
