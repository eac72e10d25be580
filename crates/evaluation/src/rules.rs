//! Rule evaluation: scan a flag's ranked rules and produce a response.

use std::time::Instant;

use flagcast_core::error::{Error, FlagcastResult};
use flagcast_core::types::{
    BooleanEvaluation, EvaluationReason, EvaluationRequest, Flag, MatchKind, Rule, RuleOutcome,
    VariantEvaluation,
};

use crate::distribution::select_variant;
use crate::segment::matches_segment;
use crate::snapshot::Snapshot;

/// Resolve a rule's segment references and apply its rule-level join.
/// Returns the matched segment keys when the rule holds, `None` otherwise.
fn rule_matches(
    snapshot: &Snapshot,
    rule: &Rule,
    request: &EvaluationRequest,
) -> FlagcastResult<Option<Vec<String>>> {
    let mut matched_keys = Vec::new();

    for segment_key in &rule.segments {
        let segment = snapshot
            .segment(segment_key)
            .ok_or_else(|| Error::SegmentNotFound(segment_key.clone()))?;
        if matches_segment(segment, &request.context) {
            matched_keys.push(segment_key.clone());
        }
    }

    let holds = match rule.segment_operator {
        MatchKind::All => matched_keys.len() == rule.segments.len(),
        MatchKind::Any => !matched_keys.is_empty(),
    };

    Ok(holds.then_some(matched_keys))
}

pub fn evaluate_variant_flag(
    snapshot: &Snapshot,
    flag: &Flag,
    request: &EvaluationRequest,
) -> FlagcastResult<VariantEvaluation> {
    let start = Instant::now();

    if !flag.enabled {
        return Ok(VariantEvaluation {
            flag_key: flag.key.clone(),
            matched: false,
            reason: EvaluationReason::FlagDisabled,
            variant_key: None,
            variant_attachment: None,
            segment_keys: Vec::new(),
            request_duration_millis: duration_millis(start),
        });
    }

    for rule in &flag.rules {
        let Some(segment_keys) = rule_matches(snapshot, rule, request)? else {
            continue;
        };

        let RuleOutcome::Distribute(distribution) = &rule.outcome else {
            // Guarded at snapshot build: variant rules always distribute.
            return Err(Error::Validation(format!(
                "variant flag {:?} rule rank {} has no distribution",
                flag.key, rule.rank
            )));
        };

        let Some(variant_key) = select_variant(
            distribution,
            &flag.key,
            &request.entity_id,
            request.bucketing_key.as_deref(),
        ) else {
            // Guarded at snapshot build: total weight is positive.
            return Err(Error::Validation(format!(
                "variant flag {:?} rule rank {} has zero total distribution weight",
                flag.key, rule.rank
            )));
        };

        return Ok(VariantEvaluation {
            flag_key: flag.key.clone(),
            matched: true,
            reason: EvaluationReason::Match,
            variant_attachment: flag.variant_attachment(variant_key),
            variant_key: Some(variant_key.to_string()),
            segment_keys,
            request_duration_millis: duration_millis(start),
        });
    }

    match &flag.default_variant {
        Some(variant_key) => Ok(VariantEvaluation {
            flag_key: flag.key.clone(),
            matched: false,
            reason: EvaluationReason::Default,
            variant_attachment: flag.variant_attachment(variant_key),
            variant_key: Some(variant_key.clone()),
            segment_keys: Vec::new(),
            request_duration_millis: duration_millis(start),
        }),
        None => Err(Error::NoDefault(flag.key.clone())),
    }
}

pub fn evaluate_boolean_flag(
    snapshot: &Snapshot,
    flag: &Flag,
    request: &EvaluationRequest,
) -> FlagcastResult<BooleanEvaluation> {
    let start = Instant::now();

    if !flag.enabled {
        return Ok(BooleanEvaluation {
            flag_key: flag.key.clone(),
            enabled: false,
            reason: EvaluationReason::FlagDisabled,
            request_duration_millis: duration_millis(start),
        });
    }

    for rule in &flag.rules {
        if rule_matches(snapshot, rule, request)?.is_none() {
            continue;
        }

        let RuleOutcome::Fixed(value) = &rule.outcome else {
            // Guarded at snapshot build: boolean rules carry a fixed value.
            return Err(Error::Validation(format!(
                "boolean flag {:?} rule rank {} has no fixed value",
                flag.key, rule.rank
            )));
        };

        return Ok(BooleanEvaluation {
            flag_key: flag.key.clone(),
            enabled: *value,
            reason: EvaluationReason::Match,
            request_duration_millis: duration_millis(start),
        });
    }

    match flag.default_value {
        Some(value) => Ok(BooleanEvaluation {
            flag_key: flag.key.clone(),
            enabled: value,
            reason: EvaluationReason::Default,
            request_duration_millis: duration_millis(start),
        }),
        None => Err(Error::NoDefault(flag.key.clone())),
    }
}

fn duration_millis(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
