//! Segment evaluation: fold constraint results under the segment's match type.

use std::collections::HashMap;

use flagcast_core::types::{AttributeValue, MatchKind, Segment};

use crate::matcher::matches_constraint;

/// Whether the context satisfies the segment.
///
/// `all` segments short-circuit on the first failing constraint and match
/// trivially when they have none ("always"). `any` segments short-circuit on
/// the first passing constraint and never match when they have none
/// ("never").
pub fn matches_segment(segment: &Segment, context: &HashMap<String, AttributeValue>) -> bool {
    match segment.match_type {
        MatchKind::All => segment
            .constraints
            .iter()
            .all(|c| matches_constraint(c, context)),
        MatchKind::Any => segment
            .constraints
            .iter()
            .any(|c| matches_constraint(c, context)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagcast_core::types::{ComparisonType, Constraint, Operator};

    fn plan_eq(value: &str) -> Constraint {
        Constraint {
            property: "plan".into(),
            comparison: ComparisonType::String,
            operator: Operator::Eq,
            value: value.into(),
        }
    }

    fn segment(match_type: MatchKind, constraints: Vec<Constraint>) -> Segment {
        Segment {
            key: "seg".into(),
            match_type,
            constraints,
        }
    }

    fn pro_context() -> HashMap<String, AttributeValue> {
        [("plan".to_string(), AttributeValue::String("pro".into()))].into()
    }

    #[test]
    fn all_requires_every_constraint() {
        let s = segment(MatchKind::All, vec![plan_eq("pro"), plan_eq("free")]);
        assert!(!matches_segment(&s, &pro_context()));

        let s = segment(MatchKind::All, vec![plan_eq("pro")]);
        assert!(matches_segment(&s, &pro_context()));
    }

    #[test]
    fn any_requires_one_constraint() {
        let s = segment(MatchKind::Any, vec![plan_eq("free"), plan_eq("pro")]);
        assert!(matches_segment(&s, &pro_context()));

        let s = segment(MatchKind::Any, vec![plan_eq("free"), plan_eq("team")]);
        assert!(!matches_segment(&s, &pro_context()));
    }

    #[test]
    fn empty_all_always_matches() {
        let s = segment(MatchKind::All, vec![]);
        assert!(matches_segment(&s, &pro_context()));
        assert!(matches_segment(&s, &HashMap::new()));
    }

    #[test]
    fn empty_any_never_matches() {
        let s = segment(MatchKind::Any, vec![]);
        assert!(!matches_segment(&s, &pro_context()));
        assert!(!matches_segment(&s, &HashMap::new()));
    }
}
