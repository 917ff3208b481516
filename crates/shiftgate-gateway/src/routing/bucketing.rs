//! Sticky cohort assignment for percentage rollouts.

use shiftgate_abstraction::ANONYMOUS_SUBJECT;

/// Number of buckets subjects are hashed into.
pub const BUCKETS: u32 = 100;

/// Hashes a subject identifier into a bucket in `0..100`.
///
/// Classic 31-multiplier polynomial hash over UTF-16 code units with 32-bit
/// wraparound. The result depends only on the input string, so a subject keeps
/// its bucket across calls and process restarts.
#[must_use]
pub fn bucket_for(subject_id: &str) -> u8 {
    let hash = subject_id
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)));
    (hash.unsigned_abs() % BUCKETS) as u8
}

/// Decides whether a subject falls inside the primary rollout cohort.
///
/// `0` never routes to primary and `100` (or more) always does; anything in
/// between compares the subject's bucket against the percentage.
#[must_use]
pub fn should_use_secondary(percentage: u8, subject_id: Option<&str>) -> bool {
    if percentage == 0 {
        return false;
    }
    if u32::from(percentage) >= BUCKETS {
        return true;
    }
    bucket_for(subject_id.unwrap_or(ANONYMOUS_SUBJECT)) < percentage
}
