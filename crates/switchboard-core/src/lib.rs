//! # Switchboard Core
//!
//! Core domain logic for Switchboard - a deterministic feature flag
//! decision engine.
//!
//! This crate provides the condition language, the entity model, and the
//! evaluation engine, without any I/O dependencies. Given a compiled flag
//! and an evaluation context it returns a variant selection together with
//! the segment that caused the decision.
//!
//! ## Key Components
//!
//! - [`conditions`] - The predicate language gating segments
//! - [`Flag`] / [`Segment`] - The flag corpus entity model
//! - [`Snapshot`] - An immutable compiled view of the whole corpus
//! - [`Evaluator`] - The deterministic evaluation engine
//!
//! ## Example
//!
//! ```rust
//! use switchboard_core::{EvaluationContext, Evaluator, Snapshot};
//! use switchboard_core::{Distribution, Flag, FlagId, Segment, Variant};
//!
//! let flag = Flag::new(1)
//!     .with_key("new_checkout")
//!     .with_enabled(true)
//!     .with_variant(Variant::new(1, "on"))
//!     .with_segment(
//!         Segment::new(1, 10)
//!             .with_rollout_percent(100)
//!             .with_distribution(Distribution::new(1, 1, "on", 100)),
//!     );
//!
//! let snapshot = Snapshot::compile(vec![flag], 1).unwrap();
//! let compiled = snapshot.flag_by_id(FlagId(1)).unwrap();
//! let context = EvaluationContext::with_entity_id("u-42").set("tier", "gold");
//! let result = Evaluator::new().evaluate(&compiled, &context, false);
//! assert_eq!(result.variant_key.as_deref(), Some("on"));
//! ```

pub mod conditions;
pub mod context;
pub mod errors;
pub mod evaluation;
pub mod flag;
pub mod rollout;
pub mod segment;
pub mod snapshot;

// Re-exports for convenience
pub use context::{AttributeBag, EvaluationContext};
pub use errors::SwitchboardError;
pub use evaluation::{EvalDebugLog, EvaluationResult, Evaluator, SegmentDebugLog};
pub use flag::{Flag, FlagId, Variant, VariantId};
pub use segment::{
    Constraint, ConstraintId, Distribution, DistributionId, Operator, Segment, SegmentId,
};
pub use snapshot::{CompiledFlag, CompiledSegment, Snapshot, VariantBand};

/// Result type for Switchboard operations.
pub type Result<T> = std::result::Result<T, SwitchboardError>;
