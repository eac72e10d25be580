//! Wire format for namespace configuration payloads.
//!
//! A [`NamespaceDocument`] is the structured form a host pushes across the
//! boundary to (re)configure one namespace. Parsing failures are
//! [`Error::InvalidPayload`]; semantic problems are caught later, at
//! snapshot build.

use serde::{Deserialize, Serialize};

use crate::error::{Error, FlagcastResult};
use crate::types::{FlagKind, MatchKind, Segment};

/// The only payload version this engine understands.
pub const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDocument {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub flags: Vec<FlagDef>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

fn default_version() -> u32 {
    SUPPORTED_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagDef {
    pub key: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_flag_kind")]
    pub kind: FlagKind,
    /// Default outcome for boolean flags when no rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<bool>,
    /// Default variant key for variant flags when no rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_variant: Option<String>,
    #[serde(default)]
    pub variants: Vec<VariantDef>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

fn default_flag_kind() -> FlagKind {
    FlagKind::Variant
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDef {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub rank: u32,
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default = "default_segment_operator")]
    pub segment_operator: MatchKind,
    /// Fixed outcome; required for rules of boolean flags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<bool>,
    /// Weighted variant distribution; required for rules of variant flags.
    #[serde(default)]
    pub distribution: Vec<DistributionDef>,
}

fn default_segment_operator() -> MatchKind {
    MatchKind::Any
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionDef {
    pub variant_key: String,
    pub weight: u32,
}

impl NamespaceDocument {
    /// Parse a JSON payload into a document, gating on the format version.
    pub fn from_json(payload: &str) -> FlagcastResult<Self> {
        let document: NamespaceDocument = serde_json::from_str(payload)
            .map_err(|e| Error::InvalidPayload(format!("configuration payload: {e}")))?;

        if document.version != SUPPORTED_VERSION {
            return Err(Error::InvalidPayload(format!(
                "unsupported configuration version {} (supported: {})",
                document.version, SUPPORTED_VERSION
            )));
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ComparisonType, Operator};

    #[test]
    fn parses_minimal_document() {
        let doc = NamespaceDocument::from_json(r#"{"flags": [], "segments": []}"#).unwrap();
        assert_eq!(doc.version, SUPPORTED_VERSION);
        assert!(doc.flags.is_empty());
        assert!(doc.segments.is_empty());
    }

    #[test]
    fn parses_flag_with_rules_and_segments() {
        let payload = r#"{
            "flags": [{
                "key": "new-ui",
                "enabled": true,
                "kind": "variant",
                "default_variant": "A",
                "variants": [
                    {"key": "A", "attachment": {"color": "teal"}},
                    {"key": "B"}
                ],
                "rules": [{
                    "rank": 0,
                    "segments": ["beta-users"],
                    "distribution": [
                        {"variant_key": "A", "weight": 50},
                        {"variant_key": "B", "weight": 50}
                    ]
                }]
            }],
            "segments": [{
                "key": "beta-users",
                "match_type": "any",
                "constraints": [
                    {"property": "plan", "type": "string", "operator": "eq", "value": "pro"}
                ]
            }]
        }"#;

        let doc = NamespaceDocument::from_json(payload).unwrap();
        assert_eq!(doc.flags.len(), 1);

        let flag = &doc.flags[0];
        assert_eq!(flag.kind, FlagKind::Variant);
        assert_eq!(flag.default_variant.as_deref(), Some("A"));
        assert_eq!(flag.rules[0].segment_operator, MatchKind::Any);
        assert_eq!(flag.rules[0].distribution.len(), 2);

        let constraint = &doc.segments[0].constraints[0];
        assert_eq!(constraint.comparison, ComparisonType::String);
        assert_eq!(constraint.operator, Operator::Eq);
    }

    #[test]
    fn malformed_json_is_invalid_payload() {
        let err = NamespaceDocument::from_json("{not json").unwrap_err();
        assert_eq!(err.kind(), "invalid_payload");
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = NamespaceDocument::from_json(r#"{"version": 9}"#).unwrap_err();
        assert_eq!(err.kind(), "invalid_payload");
    }

    #[test]
    fn boolean_rule_roundtrip() {
        let payload = r#"{
            "flags": [{
                "key": "kill-switch",
                "enabled": true,
                "kind": "boolean",
                "default_value": false,
                "rules": [{"rank": 1, "segments": ["ops"], "value": true}]
            }],
            "segments": [{"key": "ops", "match_type": "all"}]
        }"#;

        let doc = NamespaceDocument::from_json(payload).unwrap();
        assert_eq!(doc.flags[0].rules[0].value, Some(true));
        assert_eq!(doc.segments[0].match_type, MatchKind::All);
    }
}
