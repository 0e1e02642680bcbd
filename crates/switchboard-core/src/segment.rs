//! Segments, constraints, and variant distributions.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SwitchboardError};
use crate::flag::{FlagId, VariantId};

/// Unique identifier for a segment, scoped to a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub i64);

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a constraint, scoped to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintId(pub i64);

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a distribution, scoped to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistributionId(pub i64);

impl std::fmt::Display for DistributionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Constraint operators. Each maps onto one binary operator of the
/// condition language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    NotIn,
    Contains,
    NotContains,
    Matches,
    NotMatches,
}

impl Operator {
    /// Stable code used for persistence.
    pub fn code(&self) -> &'static str {
        match self {
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT_CONTAINS",
            Operator::Matches => "MATCHES",
            Operator::NotMatches => "NOT_MATCHES",
        }
    }

    /// Parses a persistence code.
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "EQ" => Operator::Eq,
            "NEQ" => Operator::Neq,
            "LT" => Operator::Lt,
            "LTE" => Operator::Lte,
            "GT" => Operator::Gt,
            "GTE" => Operator::Gte,
            "IN" => Operator::In,
            "NOT_IN" => Operator::NotIn,
            "CONTAINS" => Operator::Contains,
            "NOT_CONTAINS" => Operator::NotContains,
            "MATCHES" => Operator::Matches,
            "NOT_MATCHES" => Operator::NotMatches,
            _ => return None,
        })
    }

    /// Spelling of the operator in condition source.
    pub fn as_dsl(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Neq => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT CONTAINS",
            Operator::Matches => "=~",
            Operator::NotMatches => "!~",
        }
    }
}

/// A single predicate gating a segment.
///
/// The operand is stored textually exactly as written by the operator
/// (`"OFF"`, `42`, `["a","b"]`, `/^5\d\d/`) and is parsed together with the
/// property and operator when the snapshot is compiled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    /// Unique identifier.
    pub id: ConstraintId,
    /// Attribute name, dotted for nested context (e.g., "geo.country").
    pub property: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Textual operand.
    pub value: String,
}

impl Constraint {
    /// Creates a new constraint.
    pub fn new(
        id: i64,
        property: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            id: ConstraintId(id),
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    /// Renders the constraint as condition source.
    pub fn expr_source(&self) -> String {
        format!("[{}] {} {}", self.property, self.operator.as_dsl(), self.value)
    }

    /// Validates that the property name is usable inside brackets.
    pub fn validate(&self) -> Result<()> {
        if self.property.is_empty() {
            return Err(SwitchboardError::validation(format!(
                "constraint {}: empty property",
                self.id
            )));
        }
        if self.property.contains(['[', ']']) {
            return Err(SwitchboardError::validation(format!(
                "constraint {}: property {:?} may not contain brackets",
                self.id, self.property
            )));
        }
        Ok(())
    }
}

/// A weighted share of a segment's traffic for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    /// Unique identifier. Bucket bands are laid out in ascending id order.
    pub id: DistributionId,
    /// Variant receiving this share.
    pub variant_id: VariantId,
    /// Denormalized variant key, kept for result payloads.
    pub variant_key: String,
    /// Share of admitted traffic, 0-100.
    pub percent: u8,
}

impl Distribution {
    /// Creates a new distribution.
    pub fn new(id: i64, variant_id: i64, variant_key: impl Into<String>, percent: u8) -> Self {
        Self {
            id: DistributionId(id),
            variant_id: VariantId(variant_id),
            variant_key: variant_key.into(),
            percent,
        }
    }
}

/// A rule within a flag: a constraint conjunction, a rollout percent, and a
/// variant distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Unique identifier.
    pub id: SegmentId,
    /// Description shown in tooling.
    pub description: String,
    /// Ordering key within the flag; lower ranks evaluate first.
    pub rank: i64,
    /// Share of matching entities admitted into this segment, 0-100.
    pub rollout_percent: u8,
    /// Constraint conjunction; all must hold for the segment to match.
    pub constraints: Vec<Constraint>,
    /// Variant shares for admitted entities.
    pub distributions: Vec<Distribution>,
}

impl Segment {
    /// Creates an empty segment with a 0% rollout.
    pub fn new(id: i64, rank: i64) -> Self {
        Self {
            id: SegmentId(id),
            description: String::new(),
            rank,
            rollout_percent: 0,
            constraints: Vec::new(),
            distributions: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the rollout percent, clamped to 100.
    pub fn with_rollout_percent(mut self, percent: u8) -> Self {
        self.rollout_percent = percent.min(100);
        self
    }

    /// Adds a constraint.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Adds a distribution.
    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distributions.push(distribution);
        self
    }

    /// Validates segment-local invariants: rollout and share ranges, and
    /// non-empty distributions summing to exactly 100.
    pub fn validate(&self, flag_id: FlagId) -> Result<()> {
        if self.rollout_percent > 100 {
            return Err(SwitchboardError::validation(format!(
                "flag {}: segment {} rollout {} exceeds 100",
                flag_id, self.id, self.rollout_percent
            )));
        }
        for constraint in &self.constraints {
            constraint.validate()?;
        }
        if !self.distributions.is_empty() {
            let total: u32 = self
                .distributions
                .iter()
                .map(|distribution| u32::from(distribution.percent))
                .sum();
            if total != 100 {
                return Err(SwitchboardError::validation(format!(
                    "flag {}: segment {} distributions sum to {}, expected 100",
                    flag_id, self.id, total
                )));
            }
        }
        Ok(())
    }
}
