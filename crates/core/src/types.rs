//! Runtime data model: flags, segments, constraints, and the evaluation
//! request/response types. Wire-format counterparts live in [`crate::document`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagKind {
    Boolean,
    Variant,
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagKind::Boolean => write!(f, "boolean"),
            FlagKind::Variant => write!(f, "variant"),
        }
    }
}

/// Join semantics shared by segment match types (across a segment's
/// constraints) and rule-level segment operators (across a rule's segments).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    All,
    Any,
}

/// The type a constraint coerces context attributes to before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonType {
    String,
    Number,
    Boolean,
    Datetime,
    Semver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Prefix,
    Suffix,
    Contains,
    IsOneOf,
    IsNotOneOf,
    Empty,
    NotEmpty,
    True,
    False,
    Present,
    NotPresent,
}

/// A single typed comparison against one context attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub property: String,
    #[serde(rename = "type")]
    pub comparison: ComparisonType,
    pub operator: Operator,
    /// String-encoded comparison value. Set-membership operators split it
    /// on `,` into a candidate set; presence/absence operators ignore it.
    #[serde(default)]
    pub value: String,
}

/// A named, reusable audience predicate over context attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub key: String,
    #[serde(default = "default_segment_match")]
    pub match_type: MatchKind,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

fn default_segment_match() -> MatchKind {
    MatchKind::All
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub key: String,
    /// Opaque payload handed back verbatim with evaluation responses.
    pub attachment: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistributionEntry {
    pub variant_key: String,
    pub weight: u32,
}

/// What a matched rule yields: a fixed value for boolean flags, a weighted
/// variant distribution for variant flags. Snapshot validation guarantees
/// the outcome agrees with the owning flag's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Fixed(bool),
    Distribute(Vec<DistributionEntry>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub rank: u32,
    pub segments: Vec<String>,
    pub segment_operator: MatchKind,
    pub outcome: RuleOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flag {
    pub key: String,
    pub enabled: bool,
    pub kind: FlagKind,
    pub default_value: Option<bool>,
    pub default_variant: Option<String>,
    pub variants: HashMap<String, Variant>,
    /// Sorted by ascending rank at snapshot build.
    pub rules: Vec<Rule>,
}

impl Flag {
    pub fn variant_attachment(&self, variant_key: &str) -> Option<serde_json::Value> {
        self.variants
            .get(variant_key)
            .and_then(|v| v.attachment.clone())
    }
}

/// A typed context attribute value.
///
/// Untagged: JSON booleans, numbers, and strings map onto the matching
/// variant. `Datetime` exists for host bindings with native datetime types;
/// on the JSON wire, datetimes travel as RFC 3339 strings and are coerced
/// by the constraint matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Datetime(DateTime<Utc>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub namespace_key: String,
    pub flag_key: String,
    pub entity_id: String,
    /// Overrides `entity_id` for distribution bucketing when present.
    #[serde(default)]
    pub bucketing_key: Option<String>,
    #[serde(default)]
    pub context: HashMap<String, AttributeValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    FlagDisabled,
    Match,
    Default,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantEvaluation {
    pub flag_key: String,
    pub matched: bool,
    pub reason: EvaluationReason,
    pub variant_key: Option<String>,
    pub variant_attachment: Option<serde_json::Value>,
    pub segment_keys: Vec<String>,
    pub request_duration_millis: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BooleanEvaluation {
    pub flag_key: String,
    pub enabled: bool,
    pub reason: EvaluationReason,
    pub request_duration_millis: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvaluation {
    pub namespace_key: String,
    pub flag_key: String,
    pub error_kind: String,
    pub message: String,
}

/// One entry of a batch response, tagged by shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvaluation {
    Variant(VariantEvaluation),
    Boolean(BooleanEvaluation),
    Error(ErrorEvaluation),
}
