//! Flag evaluation engine.
//!
//! Orchestrates segment ordering, rollout admission, and weighted variant
//! selection against a compiled flag. Under a well-formed snapshot the
//! evaluator is infallible: constraint-level errors demote the offending
//! segment to non-matching and, in debug mode, surface in the trace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::conditions;
use crate::context::{AttributeBag, EvaluationContext};
use crate::errors::Result;
use crate::flag::{FlagId, VariantId};
use crate::rollout;
use crate::segment::SegmentId;
use crate::snapshot::{CompiledFlag, CompiledSegment};

/// Outcome of one segment during a debug-enabled evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDebugLog {
    #[serde(rename = "segmentID")]
    pub segment_id: SegmentId,
    pub msg: String,
}

/// Trace of a debug-enabled evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalDebugLog {
    #[serde(default)]
    pub msg: String,
    #[serde(rename = "segmentDebugLogs", default)]
    pub segment_debug_logs: Vec<SegmentDebugLog>,
}

/// Result of a flag evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    #[serde(rename = "flagID")]
    pub flag_id: Option<FlagId>,
    #[serde(rename = "flagKey")]
    pub flag_key: Option<String>,
    #[serde(rename = "segmentID")]
    pub segment_id: Option<SegmentId>,
    #[serde(rename = "variantID")]
    pub variant_id: Option<VariantId>,
    #[serde(rename = "variantKey")]
    pub variant_key: Option<String>,
    #[serde(rename = "variantAttachment")]
    pub variant_attachment: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "evalContext")]
    pub eval_context: EvaluationContext,
    #[serde(rename = "evalDebugLog", skip_serializing_if = "Option::is_none")]
    pub eval_debug_log: Option<EvalDebugLog>,
    /// Export routing identifier from the flag; not part of the wire result.
    #[serde(skip)]
    pub data_record_type: Option<String>,
}

impl EvaluationResult {
    fn blank(
        flag_id: Option<FlagId>,
        flag_key: Option<String>,
        context: &EvaluationContext,
    ) -> Self {
        Self {
            flag_id,
            flag_key,
            segment_id: None,
            variant_id: None,
            variant_key: None,
            variant_attachment: None,
            timestamp: Utc::now(),
            eval_context: context.clone(),
            eval_debug_log: None,
            data_record_type: None,
        }
    }

    /// Result for a flag absent from the snapshot.
    pub fn flag_not_found(
        flag_id: Option<FlagId>,
        flag_key: Option<String>,
        context: &EvaluationContext,
        enable_debug: bool,
    ) -> Self {
        let mut result = Self::blank(flag_id, flag_key, context);
        if enable_debug {
            result.eval_debug_log = Some(EvalDebugLog {
                msg: "flag not found".to_string(),
                segment_debug_logs: Vec::new(),
            });
        }
        result
    }

    /// True when the evaluation selected a variant.
    pub fn has_variant(&self) -> bool {
        self.variant_id.is_some()
    }
}

/// The flag evaluation engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Creates a new evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Evaluates a compiled flag against a context.
    ///
    /// Segments are consulted in ascending rank; the first segment whose
    /// constraints match is terminal. Within it, the rollout percent gates
    /// admission and the variant bands pick the outcome. A segment excluded
    /// by rollout still ends the evaluation with no variant.
    pub fn evaluate(
        &self,
        flag: &CompiledFlag,
        context: &EvaluationContext,
        enable_debug: bool,
    ) -> EvaluationResult {
        let mut result =
            EvaluationResult::blank(Some(flag.id), flag.key.clone(), context);
        result.data_record_type = flag.data_record_type.clone();
        let mut debug = if enable_debug {
            Some(EvalDebugLog::default())
        } else {
            None
        };

        if !flag.enabled {
            if let Some(log) = debug.as_mut() {
                log.msg = "flag is disabled".to_string();
            }
            result.eval_debug_log = debug;
            return result;
        }

        let attributes = context.attributes();
        let bucket_key = context
            .entity_id
            .clone()
            .unwrap_or_else(rollout::anonymous_key);

        for segment in &flag.segments {
            match match_constraints(segment, &attributes) {
                Ok(false) => {
                    if let Some(log) = debug.as_mut() {
                        log.segment_debug_logs.push(SegmentDebugLog {
                            segment_id: segment.id,
                            msg: "constraints not matched".to_string(),
                        });
                    }
                },
                Err(err) => {
                    // Runtime constraint errors demote the segment.
                    if let Some(log) = debug.as_mut() {
                        log.segment_debug_logs.push(SegmentDebugLog {
                            segment_id: segment.id,
                            msg: format!("constraint error, segment skipped: {}", err),
                        });
                    }
                },
                Ok(true) => {
                    result.segment_id = Some(segment.id);
                    self.apply_rollout(flag, segment, &bucket_key, &mut result, debug.as_mut());
                    break;
                },
            }
        }

        result.eval_debug_log = debug;
        result
    }

    fn apply_rollout(
        &self,
        flag: &CompiledFlag,
        segment: &CompiledSegment,
        bucket_key: &str,
        result: &mut EvaluationResult,
        mut debug: Option<&mut EvalDebugLog>,
    ) {
        let admission_seed = rollout::segment_seed(flag.id, segment.id);
        let admission = rollout::bucket(&admission_seed, bucket_key);
        let threshold = u32::from(segment.rollout_percent) * (rollout::TOTAL_BUCKETS / 100);
        if admission >= threshold {
            if let Some(log) = debug.as_deref_mut() {
                log.segment_debug_logs.push(SegmentDebugLog {
                    segment_id: segment.id,
                    msg: format!(
                        "matched constraints, excluded by rollout (bucket {} >= {})",
                        admission, threshold
                    ),
                });
            }
            return;
        }

        let variant_seed = rollout::variant_seed(flag.id, segment.id);
        let pick = rollout::bucket(&variant_seed, bucket_key);
        match segment.variant_for_bucket(pick) {
            Some(band) => {
                result.variant_id = Some(band.variant_id);
                result.variant_key = Some(band.variant_key.clone());
                result.variant_attachment = flag
                    .variant(band.variant_id)
                    .and_then(|variant| variant.attachment.clone());
                if let Some(log) = debug.as_deref_mut() {
                    log.segment_debug_logs.push(SegmentDebugLog {
                        segment_id: segment.id,
                        msg: format!("matched, assigned variant {} (bucket {})", band.variant_key, pick),
                    });
                }
            },
            None => {
                if let Some(log) = debug.as_deref_mut() {
                    log.segment_debug_logs.push(SegmentDebugLog {
                        segment_id: segment.id,
                        msg: "matched, no distribution configured".to_string(),
                    });
                }
            },
        }
    }
}

/// Evaluates the constraint conjunction. Empty constraints match everyone.
fn match_constraints(segment: &CompiledSegment, attributes: &AttributeBag) -> Result<bool> {
    for constraint in &segment.constraints {
        if !conditions::evaluate(&constraint.expr, attributes)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::flag::{Flag, Variant};
    use crate::segment::{Constraint, Distribution, Operator, Segment};
    use crate::snapshot::Snapshot;

    /// Flag 1: segment 10 targets gold tier at 100% with variant `v1`;
    /// segment 20 admits 50% of everyone, split 40/60 over `v2`/`v3`.
    fn checkout_flag() -> CompiledFlag {
        let flag = Flag::new(1)
            .with_key("new_checkout")
            .with_enabled(true)
            .with_variant(Variant::new(1, "v1").with_attachment(json!({"layout": "hero"})))
            .with_variant(Variant::new(2, "v2"))
            .with_variant(Variant::new(3, "v3"))
            .with_segment(
                Segment::new(10, 10)
                    .with_rollout_percent(100)
                    .with_constraint(Constraint::new(1, "tier", Operator::Eq, r#""gold""#))
                    .with_distribution(Distribution::new(1, 1, "v1", 100)),
            )
            .with_segment(
                Segment::new(20, 20)
                    .with_rollout_percent(50)
                    .with_distribution(Distribution::new(2, 2, "v2", 40))
                    .with_distribution(Distribution::new(3, 3, "v3", 60)),
            );
        let snapshot = Snapshot::compile(vec![flag], 1).unwrap();
        let compiled = snapshot.flag_by_id(FlagId(1)).unwrap();
        CompiledFlag::clone(&compiled)
    }

    #[test]
    fn test_targeted_segment_wins() {
        let flag = checkout_flag();
        let context = EvaluationContext::with_entity_id("u-1").set("tier", "gold");
        let result = Evaluator::new().evaluate(&flag, &context, false);

        assert_eq!(result.segment_id, Some(SegmentId(10)));
        assert_eq!(result.variant_key.as_deref(), Some("v1"));
        assert_eq!(result.variant_attachment, Some(json!({"layout": "hero"})));
    }

    #[test]
    fn test_split_segment_is_deterministic() {
        // Admission and variant buckets for flag 1 / segment 20:
        // u-2 -> 384 / 242 (admitted, band v2)
        // u-5 -> 251 / 641 (admitted, band v3)
        let flag = checkout_flag();
        let evaluator = Evaluator::new();

        let result = evaluator.evaluate(
            &flag,
            &EvaluationContext::with_entity_id("u-2").set("tier", "silver"),
            false,
        );
        assert_eq!(result.segment_id, Some(SegmentId(20)));
        assert_eq!(result.variant_key.as_deref(), Some("v2"));

        let result = evaluator.evaluate(
            &flag,
            &EvaluationContext::with_entity_id("u-5").set("tier", "silver"),
            false,
        );
        assert_eq!(result.variant_key.as_deref(), Some("v3"));
    }

    #[test]
    fn test_rollout_exclusion_is_terminal() {
        // u-3's admission bucket for segment 20 is 683, above the 50%
        // threshold of 500: the evaluation stops with no variant.
        let flag = checkout_flag();
        let context = EvaluationContext::with_entity_id("u-3").set("tier", "silver");
        let result = Evaluator::new().evaluate(&flag, &context, true);

        assert_eq!(result.segment_id, Some(SegmentId(20)));
        assert!(!result.has_variant());
        let log = result.eval_debug_log.unwrap();
        assert!(log.segment_debug_logs[1].msg.contains("excluded by rollout"));
    }

    #[test]
    fn test_exclusion_does_not_fall_through() {
        // An unconstrained 0% segment swallows everyone even though a later
        // segment would match.
        let flag = Flag::new(2)
            .with_enabled(true)
            .with_variant(Variant::new(1, "on"))
            .with_segment(Segment::new(1, 10).with_rollout_percent(0))
            .with_segment(
                Segment::new(2, 20)
                    .with_rollout_percent(100)
                    .with_distribution(Distribution::new(1, 1, "on", 100)),
            );
        let snapshot = Snapshot::compile(vec![flag], 1).unwrap();
        let compiled = snapshot.flag_by_id(FlagId(2)).unwrap();

        let context = EvaluationContext::with_entity_id("u-1");
        let result = Evaluator::new().evaluate(&compiled, &context, false);
        assert_eq!(result.segment_id, Some(SegmentId(1)));
        assert!(!result.has_variant());
    }

    #[test]
    fn test_constraint_error_demotes_segment_silently() {
        // Segment 10 reads [age], absent from the context: the segment is
        // skipped and segment 20 still assigns a variant.
        let flag = Flag::new(3)
            .with_enabled(true)
            .with_variant(Variant::new(1, "fallback"))
            .with_segment(
                Segment::new(10, 10)
                    .with_rollout_percent(100)
                    .with_constraint(Constraint::new(1, "age", Operator::Gt, "21"))
                    .with_distribution(Distribution::new(1, 1, "fallback", 100)),
            )
            .with_segment(
                Segment::new(20, 20)
                    .with_rollout_percent(100)
                    .with_distribution(Distribution::new(2, 1, "fallback", 100)),
            );
        let snapshot = Snapshot::compile(vec![flag], 1).unwrap();
        let compiled = snapshot.flag_by_id(FlagId(3)).unwrap();
        let evaluator = Evaluator::new();

        let context = EvaluationContext::with_entity_id("u-1");
        let result = evaluator.evaluate(&compiled, &context, false);
        assert_eq!(result.segment_id, Some(SegmentId(20)));
        assert_eq!(result.variant_key.as_deref(), Some("fallback"));

        // With debug enabled the error text is traced.
        let result = evaluator.evaluate(&compiled, &context, true);
        let log = result.eval_debug_log.unwrap();
        assert!(log.segment_debug_logs[0].msg.contains("Unknown variable: age"));
    }

    #[test]
    fn test_disabled_flag_selects_nothing() {
        let flag = Flag::new(4)
            .with_enabled(false)
            .with_variant(Variant::new(1, "on"))
            .with_segment(
                Segment::new(1, 10)
                    .with_rollout_percent(100)
                    .with_distribution(Distribution::new(1, 1, "on", 100)),
            );
        let snapshot = Snapshot::compile(vec![flag], 1).unwrap();
        let compiled = snapshot.flag_by_id(FlagId(4)).unwrap();

        let result = Evaluator::new().evaluate(
            &compiled,
            &EvaluationContext::with_entity_id("u-1"),
            true,
        );
        assert!(result.segment_id.is_none());
        assert!(!result.has_variant());
        assert_eq!(result.eval_debug_log.unwrap().msg, "flag is disabled");
    }

    #[test]
    fn test_anonymous_entities_are_bucketed() {
        // A fully-open segment with full-coverage bands always assigns a
        // variant, entity id or not.
        let flag = Flag::new(5)
            .with_enabled(true)
            .with_variant(Variant::new(1, "a"))
            .with_variant(Variant::new(2, "b"))
            .with_segment(
                Segment::new(1, 10)
                    .with_rollout_percent(100)
                    .with_distribution(Distribution::new(1, 1, "a", 50))
                    .with_distribution(Distribution::new(2, 2, "b", 50)),
            );
        let snapshot = Snapshot::compile(vec![flag], 1).unwrap();
        let compiled = snapshot.flag_by_id(FlagId(5)).unwrap();

        let result = Evaluator::new().evaluate(&compiled, &EvaluationContext::new(), false);
        assert!(result.has_variant());
    }

    #[test]
    fn test_evaluation_is_pure_per_entity() {
        let flag = checkout_flag();
        let evaluator = Evaluator::new();
        let context = EvaluationContext::with_entity_id("u-2").set("tier", "silver");

        let first = evaluator.evaluate(&flag, &context, false);
        for _ in 0..50 {
            let again = evaluator.evaluate(&flag, &context, false);
            assert_eq!(again.segment_id, first.segment_id);
            assert_eq!(again.variant_id, first.variant_id);
            assert_eq!(again.variant_key, first.variant_key);
        }
    }

    #[test]
    fn test_result_wire_spellings() {
        let flag = checkout_flag();
        let context = EvaluationContext::with_entity_id("u-1").set("tier", "gold");
        let result = Evaluator::new().evaluate(&flag, &context, false);
        let encoded = serde_json::to_value(&result).unwrap();

        assert_eq!(encoded["flagID"], json!(1));
        assert_eq!(encoded["flagKey"], json!("new_checkout"));
        assert_eq!(encoded["segmentID"], json!(10));
        assert_eq!(encoded["variantID"], json!(1));
        assert_eq!(encoded["variantKey"], json!("v1"));
        assert_eq!(encoded["evalContext"]["entityID"], json!("u-1"));
        assert!(encoded.get("evalDebugLog").is_none());
    }
}
