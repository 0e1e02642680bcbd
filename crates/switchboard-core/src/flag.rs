//! Feature flag and variant types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::errors::{Result, SwitchboardError};
use crate::segment::Segment;

/// Unique identifier for a flag. Ids are assigned monotonically by the
/// authoritative store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagId(pub i64);

impl std::fmt::Display for FlagId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a variant, scoped to a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(pub i64);

impl std::fmt::Display for VariantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outcome of a flag evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Unique identifier.
    pub id: VariantId,
    /// Key, unique within the owning flag (e.g., "on", "treatment-b").
    pub key: String,
    /// Opaque caller-defined payload returned with evaluations.
    pub attachment: Option<JsonValue>,
}

impl Variant {
    /// Creates a variant without an attachment.
    pub fn new(id: i64, key: impl Into<String>) -> Self {
        Self {
            id: VariantId(id),
            key: key.into(),
            attachment: None,
        }
    }

    /// Sets the attachment.
    pub fn with_attachment(mut self, attachment: JsonValue) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// A feature flag: an ordered list of segments plus the variants they can
/// select among.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    /// Unique identifier.
    pub id: FlagId,
    /// Optional unique human-readable key (e.g., "new_checkout").
    pub key: Option<String>,
    /// Description shown in tooling.
    pub description: String,
    /// Kill switch; a disabled flag evaluates to no variant.
    pub enabled: bool,
    /// Identifier controlling how evaluation results are exported. When
    /// unset, evaluations of this flag are not recorded.
    pub data_record_type: Option<String>,
    /// Segments, evaluated in ascending rank order.
    pub segments: Vec<Segment>,
    /// Variants, uniquely keyed within this flag.
    pub variants: Vec<Variant>,
    /// Last mutation timestamp from the authoritative store.
    pub updated_at: DateTime<Utc>,
    /// Free-form operator notes.
    pub notes: Option<String>,
}

impl Flag {
    /// Creates a disabled flag with no segments or variants.
    pub fn new(id: i64) -> Self {
        Self {
            id: FlagId(id),
            key: None,
            description: String::new(),
            enabled: false,
            data_record_type: None,
            segments: Vec::new(),
            variants: Vec::new(),
            updated_at: Utc::now(),
            notes: None,
        }
    }

    /// Sets the key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the enabled bit.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the data record type.
    pub fn with_data_record_type(mut self, record_type: impl Into<String>) -> Self {
        self.data_record_type = Some(record_type.into());
        self
    }

    /// Adds a variant.
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Adds a segment.
    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Sets the update timestamp.
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Looks up a variant by id.
    pub fn variant(&self, id: VariantId) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.id == id)
    }

    /// Looks up a variant by key.
    pub fn variant_by_key(&self, key: &str) -> Option<&Variant> {
        self.variants.iter().find(|variant| variant.key == key)
    }

    /// Validates flag-level invariants: variant keys are unique, segment
    /// invariants hold, and every distribution references a variant of this
    /// flag under its denormalized key.
    pub fn validate(&self) -> Result<()> {
        for (index, variant) in self.variants.iter().enumerate() {
            if variant.key.is_empty() {
                return Err(SwitchboardError::validation(format!(
                    "flag {}: variant {} has an empty key",
                    self.id, variant.id
                )));
            }
            if self.variants[..index].iter().any(|other| other.key == variant.key) {
                return Err(SwitchboardError::validation(format!(
                    "flag {}: duplicate variant key {:?}",
                    self.id, variant.key
                )));
            }
        }

        for segment in &self.segments {
            segment.validate(self.id)?;
            for distribution in &segment.distributions {
                match self.variant(distribution.variant_id) {
                    None => {
                        return Err(SwitchboardError::validation(format!(
                            "flag {}: segment {} distributes to unknown variant {}",
                            self.id, segment.id, distribution.variant_id
                        )));
                    },
                    Some(variant) if variant.key != distribution.variant_key => {
                        return Err(SwitchboardError::validation(format!(
                            "flag {}: segment {} distribution key {:?} does not match variant {}",
                            self.id, segment.id, distribution.variant_key, distribution.variant_id
                        )));
                    },
                    Some(_) => {},
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::segment::{Distribution, Segment};

    #[test]
    fn test_builders_and_lookup() {
        let flag = Flag::new(7)
            .with_key("new_checkout")
            .with_description("New checkout funnel")
            .with_enabled(true)
            .with_variant(Variant::new(1, "on").with_attachment(json!({"color": "green"})))
            .with_variant(Variant::new(2, "off"));

        assert_eq!(flag.id, FlagId(7));
        assert_eq!(flag.variant(VariantId(1)).unwrap().key, "on");
        assert_eq!(flag.variant_by_key("off").unwrap().id, VariantId(2));
        assert!(flag.variant_by_key("missing").is_none());
    }

    #[test]
    fn test_duplicate_variant_keys_rejected() {
        let flag = Flag::new(1)
            .with_variant(Variant::new(1, "on"))
            .with_variant(Variant::new(2, "on"));
        assert!(flag.validate().is_err());
    }

    #[test]
    fn test_distribution_must_reference_own_variant() {
        let flag = Flag::new(1)
            .with_variant(Variant::new(1, "on"))
            .with_segment(
                Segment::new(10, 10)
                    .with_rollout_percent(100)
                    .with_distribution(Distribution::new(1, 99, "on", 100)),
            );
        assert!(flag.validate().is_err());

        let flag = Flag::new(1)
            .with_variant(Variant::new(1, "on"))
            .with_segment(
                Segment::new(10, 10)
                    .with_rollout_percent(100)
                    .with_distribution(Distribution::new(1, 1, "stale-key", 100)),
            );
        assert!(flag.validate().is_err());
    }
}
