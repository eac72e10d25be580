//! Immutable per-namespace configuration index.
//!
//! A snapshot is built once from a whole-namespace document, validated in
//! full, and never mutated. A build failure leaves whatever snapshot the
//! engine was serving untouched.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use flagcast_core::document::{FlagDef, NamespaceDocument, RuleDef};
use flagcast_core::error::{Error, FlagcastResult};
use flagcast_core::types::{
    DistributionEntry, Flag, FlagKind, Rule, RuleOutcome, Segment, Variant,
};

use crate::matcher::{operator_valid_for, validate_comparison_value};

#[derive(Debug)]
pub struct Snapshot {
    namespace: String,
    flags: HashMap<String, Flag>,
    segments: HashMap<String, Segment>,
}

impl Snapshot {
    /// Validate a parsed document and build the lookup indices.
    pub fn build(namespace: &str, document: NamespaceDocument) -> FlagcastResult<Self> {
        let mut segments: HashMap<String, Segment> = HashMap::new();
        for segment in document.segments {
            validate_segment(&segment)?;
            if segments.contains_key(&segment.key) {
                return Err(Error::Validation(format!(
                    "duplicate segment key {:?}",
                    segment.key
                )));
            }
            segments.insert(segment.key.clone(), segment);
        }

        let mut flags: HashMap<String, Flag> = HashMap::new();
        for def in document.flags {
            let flag = build_flag(def, &segments)?;
            if flags.contains_key(&flag.key) {
                return Err(Error::Validation(format!(
                    "duplicate flag key {:?}",
                    flag.key
                )));
            }
            flags.insert(flag.key.clone(), flag);
        }

        debug!(
            namespace,
            flags = flags.len(),
            segments = segments.len(),
            "built configuration snapshot"
        );

        Ok(Self {
            namespace: namespace.to_string(),
            flags,
            segments,
        })
    }

    /// Parse a JSON payload and build, separating `InvalidPayload` (parse)
    /// from `Validation` (semantics).
    pub fn from_json(namespace: &str, payload: &str) -> FlagcastResult<Self> {
        let document = NamespaceDocument::from_json(payload)?;
        Self::build(namespace, document)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn flag(&self, key: &str) -> Option<&Flag> {
        self.flags.get(key)
    }

    pub fn segment(&self, key: &str) -> Option<&Segment> {
        self.segments.get(key)
    }

    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

fn validate_segment(segment: &Segment) -> FlagcastResult<()> {
    if segment.key.is_empty() {
        return Err(Error::Validation("segment with empty key".into()));
    }

    for constraint in &segment.constraints {
        if constraint.property.is_empty() {
            return Err(Error::Validation(format!(
                "segment {:?} has a constraint with an empty property",
                segment.key
            )));
        }
        if !operator_valid_for(constraint.comparison, constraint.operator) {
            return Err(Error::Validation(format!(
                "segment {:?}: operator {:?} is not valid for {:?} comparisons",
                segment.key, constraint.operator, constraint.comparison
            )));
        }
        validate_comparison_value(constraint)
            .map_err(|msg| Error::Validation(format!("segment {:?}: {msg}", segment.key)))?;
    }

    Ok(())
}

fn build_flag(def: FlagDef, segments: &HashMap<String, Segment>) -> FlagcastResult<Flag> {
    if def.key.is_empty() {
        return Err(Error::Validation("flag with empty key".into()));
    }

    let mut variants: HashMap<String, Variant> = HashMap::new();
    for variant in def.variants {
        if variant.key.is_empty() {
            return Err(Error::Validation(format!(
                "flag {:?} has a variant with an empty key",
                def.key
            )));
        }
        if variants.contains_key(&variant.key) {
            return Err(Error::Validation(format!(
                "flag {:?} has duplicate variant key {:?}",
                def.key, variant.key
            )));
        }
        variants.insert(
            variant.key.clone(),
            Variant {
                key: variant.key,
                attachment: variant.attachment,
            },
        );
    }

    match def.kind {
        FlagKind::Boolean => {
            if def.default_variant.is_some() {
                return Err(Error::Validation(format!(
                    "boolean flag {:?} declares a default variant",
                    def.key
                )));
            }
            if !variants.is_empty() {
                return Err(Error::Validation(format!(
                    "boolean flag {:?} declares variants",
                    def.key
                )));
            }
        }
        FlagKind::Variant => {
            if def.default_value.is_some() {
                return Err(Error::Validation(format!(
                    "variant flag {:?} declares a boolean default",
                    def.key
                )));
            }
            if let Some(default_variant) = &def.default_variant {
                if !variants.contains_key(default_variant) {
                    return Err(Error::Validation(format!(
                        "flag {:?} default variant {:?} is not a declared variant",
                        def.key, default_variant
                    )));
                }
            }
        }
    }

    let mut seen_ranks = HashSet::new();
    let mut rules = Vec::with_capacity(def.rules.len());
    for rule in def.rules {
        if !seen_ranks.insert(rule.rank) {
            return Err(Error::Validation(format!(
                "flag {:?} has duplicate rule rank {}",
                def.key, rule.rank
            )));
        }
        rules.push(build_rule(&def.key, def.kind, rule, &variants, segments)?);
    }

    // Evaluation order is defined by rank, not payload order.
    rules.sort_by_key(|r| r.rank);

    Ok(Flag {
        key: def.key,
        enabled: def.enabled,
        kind: def.kind,
        default_value: def.default_value,
        default_variant: def.default_variant,
        variants,
        rules,
    })
}

fn build_rule(
    flag_key: &str,
    kind: FlagKind,
    rule: RuleDef,
    variants: &HashMap<String, Variant>,
    segments: &HashMap<String, Segment>,
) -> FlagcastResult<Rule> {
    if rule.segments.is_empty() {
        return Err(Error::Validation(format!(
            "flag {:?} rule rank {} references no segments",
            flag_key, rule.rank
        )));
    }
    for segment_key in &rule.segments {
        if !segments.contains_key(segment_key) {
            return Err(Error::Validation(format!(
                "flag {:?} rule rank {} references unknown segment {:?}",
                flag_key, rule.rank, segment_key
            )));
        }
    }

    let outcome = match kind {
        FlagKind::Boolean => {
            if !rule.distribution.is_empty() {
                return Err(Error::Validation(format!(
                    "boolean flag {:?} rule rank {} carries a distribution",
                    flag_key, rule.rank
                )));
            }
            let Some(value) = rule.value else {
                return Err(Error::Validation(format!(
                    "boolean flag {:?} rule rank {} is missing a fixed value",
                    flag_key, rule.rank
                )));
            };
            RuleOutcome::Fixed(value)
        }
        FlagKind::Variant => {
            if rule.value.is_some() {
                return Err(Error::Validation(format!(
                    "variant flag {:?} rule rank {} carries a fixed boolean value",
                    flag_key, rule.rank
                )));
            }
            if rule.distribution.is_empty() {
                return Err(Error::Validation(format!(
                    "variant flag {:?} rule rank {} has no distribution",
                    flag_key, rule.rank
                )));
            }

            let mut total: u64 = 0;
            let mut entries = Vec::with_capacity(rule.distribution.len());
            for entry in rule.distribution {
                if !variants.contains_key(&entry.variant_key) {
                    return Err(Error::Validation(format!(
                        "flag {:?} rule rank {} distributes to unknown variant {:?}",
                        flag_key, rule.rank, entry.variant_key
                    )));
                }
                total += u64::from(entry.weight);
                entries.push(DistributionEntry {
                    variant_key: entry.variant_key,
                    weight: entry.weight,
                });
            }
            if total == 0 {
                return Err(Error::Validation(format!(
                    "flag {:?} rule rank {} has zero total distribution weight",
                    flag_key, rule.rank
                )));
            }
            RuleOutcome::Distribute(entries)
        }
    };

    Ok(Rule {
        rank: rule.rank,
        segments: rule.segments,
        segment_operator: rule.segment_operator,
        outcome,
    })
}
