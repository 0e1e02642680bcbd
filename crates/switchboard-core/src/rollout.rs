//! Deterministic rollout bucketing.
//!
//! An entity is mapped to a bucket in `[0, 1000)` by hashing
//! `"{seed}:{key}"` with murmur3 (seed 0). The hash is stable across
//! processes and versions; regression tests pin exact outputs.

use std::io::Cursor;

use uuid::Uuid;

use crate::flag::FlagId;
use crate::segment::SegmentId;

/// Number of rollout buckets. One percent of traffic spans 10 buckets.
pub const TOTAL_BUCKETS: u32 = 1000;

/// Maps a (seed, key) pair to a bucket in `[0, TOTAL_BUCKETS)`.
pub fn bucket(seed: &str, key: &str) -> u32 {
    let payload = format!("{}:{}", seed, key);
    let mut reader = Cursor::new(payload.as_bytes());
    murmur3::murmur3_32(&mut reader, 0).unwrap_or(0) % TOTAL_BUCKETS
}

/// Seed for segment admission. Derived from the flag and segment ids so
/// each segment buckets entities independently.
pub fn segment_seed(flag_id: FlagId, segment_id: SegmentId) -> String {
    format!("{}{}", flag_id, segment_id)
}

/// Seed for variant selection, distinct from the admission seed of the
/// same segment.
pub fn variant_seed(flag_id: FlagId, segment_id: SegmentId) -> String {
    format!("{}{}variant", flag_id, segment_id)
}

/// Fresh random bucket key for callers that supply no entity id, so
/// anonymous evaluations are bucketed independently of each other.
pub fn anonymous_key() -> String {
    Uuid::new_v4().to_string()
}
