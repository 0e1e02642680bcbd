//! Compiled, immutable snapshots of the flag corpus.
//!
//! A snapshot is built once from the authoritative corpus and then only
//! read: constraint sources are pre-parsed into expression trees and
//! distributions are laid out as cumulative bucket bands, so evaluation
//! never parses or allocates per request.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::conditions::{parse, Expr};
use crate::errors::{Result, SwitchboardError};
use crate::flag::{Flag, FlagId, Variant, VariantId};
use crate::rollout::TOTAL_BUCKETS;
use crate::segment::{ConstraintId, SegmentId};

/// A constraint with its pre-parsed expression.
#[derive(Debug, Clone)]
pub struct CompiledConstraint {
    pub id: ConstraintId,
    /// Original condition source, kept for debug traces.
    pub source: String,
    pub expr: Expr,
}

/// Half-open bucket band assigning `[previous limit, limit)` to a variant.
#[derive(Debug, Clone)]
pub struct VariantBand {
    /// Exclusive upper bucket bound.
    pub limit: u32,
    pub variant_id: VariantId,
    pub variant_key: String,
}

/// A segment ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledSegment {
    pub id: SegmentId,
    pub rank: i64,
    pub rollout_percent: u8,
    pub constraints: Vec<CompiledConstraint>,
    /// Cumulative variant bands over distributions in ascending id order.
    pub bands: Vec<VariantBand>,
}

impl CompiledSegment {
    /// Finds the variant band containing a bucket.
    pub fn variant_for_bucket(&self, bucket: u32) -> Option<&VariantBand> {
        self.bands.iter().find(|band| bucket < band.limit)
    }
}

/// A flag ready for evaluation, segments sorted by ascending rank.
#[derive(Debug, Clone)]
pub struct CompiledFlag {
    pub id: FlagId,
    pub key: Option<String>,
    pub enabled: bool,
    pub data_record_type: Option<String>,
    pub variants: Vec<Variant>,
    pub updated_at: DateTime<Utc>,
    pub segments: Vec<CompiledSegment>,
}

impl CompiledFlag {
    /// Looks up a variant by id.
    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.id == id)
    }
}

/// An immutable compiled view of the whole corpus at one point in time.
#[derive(Debug, Default)]
pub struct Snapshot {
    version: u64,
    loaded_at: Option<DateTime<Utc>>,
    by_id: HashMap<FlagId, Arc<CompiledFlag>>,
    by_key: HashMap<String, Arc<CompiledFlag>>,
    /// Flags excluded from this snapshot because a constraint failed to
    /// parse, with the offending error text.
    rejected: Vec<(FlagId, String)>,
}

impl Snapshot {
    /// An empty snapshot, used before the first successful load.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compiles a corpus into a snapshot.
    ///
    /// Contract violations (invalid distributions, dangling variant
    /// references, duplicate flag keys) reject the snapshot in full. A flag
    /// whose constraint fails to parse is only excluded from the snapshot;
    /// it is listed in [`Snapshot::rejected`] so callers can log it.
    pub fn compile(corpus: Vec<Flag>, version: u64) -> Result<Self> {
        let mut snapshot = Self {
            version,
            loaded_at: Some(Utc::now()),
            by_id: HashMap::with_capacity(corpus.len()),
            by_key: HashMap::new(),
            rejected: Vec::new(),
        };

        for flag in corpus {
            let id = flag.id;
            match compile_flag(flag) {
                Ok(compiled) => {
                    let compiled = Arc::new(compiled);
                    if snapshot.by_id.insert(id, Arc::clone(&compiled)).is_some() {
                        return Err(SwitchboardError::SnapshotRejected(format!(
                            "duplicate flag id {}",
                            id
                        )));
                    }
                    if let Some(key) = compiled.key.clone() {
                        if snapshot.by_key.insert(key.clone(), compiled).is_some() {
                            return Err(SwitchboardError::SnapshotRejected(format!(
                                "duplicate flag key {:?}",
                                key
                            )));
                        }
                    }
                },
                Err(err) if err.is_syntax() => {
                    snapshot.rejected.push((id, err.to_string()));
                },
                Err(err) => {
                    return Err(SwitchboardError::SnapshotRejected(err.to_string()));
                },
            }
        }
        Ok(snapshot)
    }

    /// Checks the per-flag timestamp invariant between consecutive
    /// snapshots: a flag present in both may never move backwards.
    pub fn validate_succession(previous: &Snapshot, next: &Snapshot) -> Result<()> {
        for (id, flag) in &next.by_id {
            if let Some(prior) = previous.by_id.get(id) {
                if flag.updated_at < prior.updated_at {
                    return Err(SwitchboardError::SnapshotRejected(format!(
                        "flag {} moved backwards: {} -> {}",
                        id, prior.updated_at, flag.updated_at
                    )));
                }
            }
        }
        Ok(())
    }

    /// O(1) flag lookup by id. Absence is a sentinel, not an error.
    pub fn flag_by_id(&self, id: FlagId) -> Option<Arc<CompiledFlag>> {
        self.by_id.get(&id).cloned()
    }

    /// O(1) flag lookup by key.
    pub fn flag_by_key(&self, key: &str) -> Option<Arc<CompiledFlag>> {
        self.by_key.get(key).cloned()
    }

    /// Iterates all flags in the snapshot.
    pub fn flags(&self) -> impl Iterator<Item = &Arc<CompiledFlag>> {
        self.by_id.values()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Flags excluded for unparseable constraints.
    pub fn rejected(&self) -> &[(FlagId, String)] {
        &self.rejected
    }
}

fn compile_flag(flag: Flag) -> Result<CompiledFlag> {
    flag.validate()?;

    let mut segments = Vec::with_capacity(flag.segments.len());
    for segment in &flag.segments {
        let mut constraints = Vec::with_capacity(segment.constraints.len());
        for constraint in &segment.constraints {
            let source = constraint.expr_source();
            let expr = parse(&source)?;
            constraints.push(CompiledConstraint {
                id: constraint.id,
                source,
                expr,
            });
        }

        let mut bands = Vec::with_capacity(segment.distributions.len());
        let mut distributions: Vec<_> = segment.distributions.iter().collect();
        distributions.sort_by_key(|distribution| distribution.id);
        let mut limit = 0u32;
        for distribution in distributions {
            limit += u32::from(distribution.percent) * (TOTAL_BUCKETS / 100);
            bands.push(VariantBand {
                limit,
                variant_id: distribution.variant_id,
                variant_key: distribution.variant_key.clone(),
            });
        }

        segments.push(CompiledSegment {
            id: segment.id,
            rank: segment.rank,
            rollout_percent: segment.rollout_percent,
            constraints,
            bands,
        });
    }
    segments.sort_by_key(|segment| (segment.rank, segment.id));

    Ok(CompiledFlag {
        id: flag.id,
        key: flag.key,
        enabled: flag.enabled,
        data_record_type: flag.data_record_type,
        variants: flag.variants,
        updated_at: flag.updated_at,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::segment::{Constraint, Distribution, Operator, Segment};

    fn sample_flag() -> Flag {
        Flag::new(1)
            .with_key("new_checkout")
            .with_enabled(true)
            .with_variant(Variant::new(1, "on"))
            .with_variant(Variant::new(2, "off"))
            .with_segment(
                Segment::new(20, 20)
                    .with_rollout_percent(50)
                    .with_distribution(Distribution::new(1, 1, "on", 40))
                    .with_distribution(Distribution::new(2, 2, "off", 60)),
            )
            .with_segment(
                Segment::new(10, 10)
                    .with_rollout_percent(100)
                    .with_constraint(Constraint::new(1, "tier", Operator::Eq, r#""gold""#))
                    .with_distribution(Distribution::new(3, 1, "on", 100)),
            )
    }

    #[test]
    fn test_compile_sorts_segments_and_builds_bands() {
        let snapshot = Snapshot::compile(vec![sample_flag()], 1).unwrap();
        let flag = snapshot.flag_by_id(FlagId(1)).unwrap();
        assert_eq!(snapshot.flag_by_key("new_checkout").unwrap().id, flag.id);

        // Rank 10 evaluates before rank 20 regardless of input order.
        assert_eq!(flag.segments[0].id, SegmentId(10));
        assert_eq!(flag.segments[1].id, SegmentId(20));

        let split = &flag.segments[1];
        assert_eq!(split.bands.len(), 2);
        assert_eq!(split.bands[0].limit, 400);
        assert_eq!(split.bands[1].limit, 1000);
        assert_eq!(split.variant_for_bucket(0).unwrap().variant_key, "on");
        assert_eq!(split.variant_for_bucket(399).unwrap().variant_key, "on");
        assert_eq!(split.variant_for_bucket(400).unwrap().variant_key, "off");
        assert_eq!(split.variant_for_bucket(999).unwrap().variant_key, "off");
    }

    #[test]
    fn test_unparseable_constraint_excludes_only_that_flag() {
        let broken = Flag::new(2)
            .with_key("broken")
            .with_enabled(true)
            .with_segment(
                Segment::new(1, 10)
                    .with_constraint(Constraint::new(1, "tier", Operator::Eq, "DEMO")),
            );
        let snapshot = Snapshot::compile(vec![sample_flag(), broken], 3).unwrap();

        assert!(snapshot.flag_by_id(FlagId(1)).is_some());
        assert!(snapshot.flag_by_id(FlagId(2)).is_none());
        assert!(snapshot.flag_by_key("broken").is_none());
        assert_eq!(snapshot.rejected().len(), 1);
        assert_eq!(snapshot.rejected()[0].0, FlagId(2));
    }

    #[test]
    fn test_invalid_distribution_rejects_whole_snapshot() {
        let invalid = Flag::new(2)
            .with_variant(Variant::new(1, "on"))
            .with_segment(
                Segment::new(1, 10)
                    .with_rollout_percent(100)
                    .with_distribution(Distribution::new(1, 1, "on", 70)),
            );
        let result = Snapshot::compile(vec![sample_flag(), invalid], 1);
        assert!(matches!(result, Err(SwitchboardError::SnapshotRejected(_))));
    }

    #[test]
    fn test_duplicate_flag_key_rejects_snapshot() {
        let first = Flag::new(1).with_key("dup");
        let second = Flag::new(2).with_key("dup");
        let result = Snapshot::compile(vec![first, second], 1);
        assert!(matches!(result, Err(SwitchboardError::SnapshotRejected(_))));
    }

    #[test]
    fn test_succession_rejects_backwards_timestamps() {
        let newer = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let older = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();

        let previous =
            Snapshot::compile(vec![sample_flag().with_updated_at(newer)], 1).unwrap();
        let regressed =
            Snapshot::compile(vec![sample_flag().with_updated_at(older)], 2).unwrap();
        let advanced =
            Snapshot::compile(vec![sample_flag().with_updated_at(newer)], 2).unwrap();

        assert!(Snapshot::validate_succession(&previous, &regressed).is_err());
        assert!(Snapshot::validate_succession(&previous, &advanced).is_ok());

        // Flags absent from the previous snapshot carry no obligation.
        let unrelated = Snapshot::compile(
            vec![Flag::new(9).with_updated_at(older)],
            3,
        )
        .unwrap();
        assert!(Snapshot::validate_succession(&previous, &unrelated).is_ok());
    }
}
