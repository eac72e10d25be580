//! Constraint matching: coerce one context attribute to the constraint's
//! declared type and compare. Pure functions, no side effects.
//!
//! Coercion rules: a `string` constraint only sees string attributes;
//! `number` accepts numbers and numeric strings; `boolean` accepts booleans
//! and `"true"`/`"false"`; `datetime` accepts datetime values and RFC 3339
//! strings; `semver` accepts version strings. Anything that cannot be
//! coerced fails closed; a mismatch is never an error.

use std::collections::HashMap;

use chrono::DateTime;
use semver::Version;

use flagcast_core::types::{AttributeValue, ComparisonType, Constraint, Operator};

/// Evaluate a single constraint against the request context.
///
/// An absent attribute fails every comparison except `notpresent`, which
/// succeeds exactly when the attribute is missing (`present` is its dual).
pub fn matches_constraint(
    constraint: &Constraint,
    context: &HashMap<String, AttributeValue>,
) -> bool {
    let attribute = context.get(&constraint.property);

    match constraint.operator {
        Operator::Present => return attribute.is_some(),
        Operator::NotPresent => return attribute.is_none(),
        _ => {}
    }

    let Some(attribute) = attribute else {
        return false;
    };

    match constraint.comparison {
        ComparisonType::String => matches_string(constraint, attribute),
        ComparisonType::Number => matches_number(constraint, attribute),
        ComparisonType::Boolean => matches_boolean(constraint, attribute),
        ComparisonType::Datetime => matches_datetime(constraint, attribute),
        ComparisonType::Semver => matches_semver(constraint, attribute),
    }
}

/// True when `operator` is meaningful for constraints of `comparison` type.
/// Snapshot validation rejects configurations outside this table.
pub fn operator_valid_for(comparison: ComparisonType, operator: Operator) -> bool {
    use Operator::*;

    match comparison {
        ComparisonType::String => matches!(
            operator,
            Eq | Neq
                | Prefix
                | Suffix
                | Contains
                | IsOneOf
                | IsNotOneOf
                | Empty
                | NotEmpty
                | Present
                | NotPresent
        ),
        ComparisonType::Number => matches!(
            operator,
            Eq | Neq | Lt | Lte | Gt | Gte | IsOneOf | IsNotOneOf | Present | NotPresent
        ),
        ComparisonType::Boolean => matches!(operator, True | False | Present | NotPresent),
        ComparisonType::Datetime | ComparisonType::Semver => {
            matches!(operator, Eq | Neq | Lt | Lte | Gt | Gte | Present | NotPresent)
        }
    }
}

/// Check a constraint's comparison value at snapshot build, so evaluation
/// only ever fails closed on the context side.
pub fn validate_comparison_value(constraint: &Constraint) -> Result<(), String> {
    use Operator::*;

    // These operators never read the comparison value.
    if matches!(
        constraint.operator,
        Empty | NotEmpty | True | False | Present | NotPresent
    ) {
        return Ok(());
    }

    if matches!(constraint.operator, IsOneOf | IsNotOneOf) {
        let mut candidates = split_candidates(&constraint.value).peekable();
        if candidates.peek().is_none() {
            return Err(format!(
                "constraint on {:?} has an empty candidate set",
                constraint.property
            ));
        }
        if constraint.comparison == ComparisonType::Number {
            for candidate in candidates {
                if candidate.parse::<f64>().is_err() {
                    return Err(format!(
                        "constraint on {:?} has non-numeric candidate {candidate:?}",
                        constraint.property
                    ));
                }
            }
        }
        return Ok(());
    }

    match constraint.comparison {
        ComparisonType::String => Ok(()),
        ComparisonType::Number => constraint
            .value
            .trim()
            .parse::<f64>()
            .map(|_| ())
            .map_err(|_| {
                format!(
                    "constraint on {:?} has non-numeric value {:?}",
                    constraint.property, constraint.value
                )
            }),
        // `true`/`false` operators carry no value; nothing else is valid for booleans.
        ComparisonType::Boolean => Ok(()),
        ComparisonType::Datetime => DateTime::parse_from_rfc3339(constraint.value.trim())
            .map(|_| ())
            .map_err(|_| {
                format!(
                    "constraint on {:?} has non-RFC3339 value {:?}",
                    constraint.property, constraint.value
                )
            }),
        ComparisonType::Semver => Version::parse(constraint.value.trim())
            .map(|_| ())
            .map_err(|_| {
                format!(
                    "constraint on {:?} has invalid semver value {:?}",
                    constraint.property, constraint.value
                )
            }),
    }
}

fn split_candidates(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|c| !c.is_empty())
}

fn as_str(value: &AttributeValue) -> Option<&str> {
    match value {
        AttributeValue::String(s) => Some(s),
        _ => None,
    }
}

fn as_number(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Number(n) => Some(*n),
        AttributeValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_boolean(value: &AttributeValue) -> Option<bool> {
    match value {
        AttributeValue::Boolean(b) => Some(*b),
        AttributeValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_timestamp(value: &AttributeValue) -> Option<i64> {
    match value {
        AttributeValue::Datetime(dt) => Some(dt.timestamp()),
        AttributeValue::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.timestamp()),
        _ => None,
    }
}

fn matches_string(constraint: &Constraint, attribute: &AttributeValue) -> bool {
    let Some(v) = as_str(attribute) else {
        return false;
    };
    let value = constraint.value.as_str();

    match constraint.operator {
        Operator::Empty => v.trim().is_empty(),
        Operator::NotEmpty => !v.trim().is_empty(),
        Operator::Eq => v == value,
        Operator::Neq => v != value,
        Operator::Prefix => v.starts_with(value),
        Operator::Suffix => v.ends_with(value),
        Operator::Contains => v.contains(value),
        Operator::IsOneOf => split_candidates(value).any(|c| c == v),
        Operator::IsNotOneOf => !split_candidates(value).any(|c| c == v),
        _ => false,
    }
}

fn matches_number(constraint: &Constraint, attribute: &AttributeValue) -> bool {
    let Some(n) = as_number(attribute) else {
        return false;
    };

    match constraint.operator {
        Operator::IsOneOf => split_candidates(&constraint.value)
            .filter_map(|c| c.parse::<f64>().ok())
            .any(|c| c == n),
        Operator::IsNotOneOf => !split_candidates(&constraint.value)
            .filter_map(|c| c.parse::<f64>().ok())
            .any(|c| c == n),
        _ => {
            let Ok(value) = constraint.value.trim().parse::<f64>() else {
                return false;
            };
            match constraint.operator {
                Operator::Eq => n == value,
                Operator::Neq => n != value,
                Operator::Lt => n < value,
                Operator::Lte => n <= value,
                Operator::Gt => n > value,
                Operator::Gte => n >= value,
                _ => false,
            }
        }
    }
}

fn matches_boolean(constraint: &Constraint, attribute: &AttributeValue) -> bool {
    let Some(b) = as_boolean(attribute) else {
        return false;
    };

    match constraint.operator {
        Operator::True => b,
        Operator::False => !b,
        _ => false,
    }
}

fn matches_datetime(constraint: &Constraint, attribute: &AttributeValue) -> bool {
    let Some(ts) = as_timestamp(attribute) else {
        return false;
    };
    let Ok(value) = DateTime::parse_from_rfc3339(constraint.value.trim()) else {
        return false;
    };
    let value = value.timestamp();

    match constraint.operator {
        Operator::Eq => ts == value,
        Operator::Neq => ts != value,
        Operator::Lt => ts < value,
        Operator::Lte => ts <= value,
        Operator::Gt => ts > value,
        Operator::Gte => ts >= value,
        _ => false,
    }
}

fn matches_semver(constraint: &Constraint, attribute: &AttributeValue) -> bool {
    let Some(raw) = as_str(attribute) else {
        return false;
    };
    let Ok(v) = Version::parse(raw.trim()) else {
        return false;
    };
    let Ok(value) = Version::parse(constraint.value.trim()) else {
        return false;
    };

    match constraint.operator {
        Operator::Eq => v == value,
        Operator::Neq => v != value,
        Operator::Lt => v < value,
        Operator::Lte => v <= value,
        Operator::Gt => v > value,
        Operator::Gte => v >= value,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn constraint(
        property: &str,
        comparison: ComparisonType,
        operator: Operator,
        value: &str,
    ) -> Constraint {
        Constraint {
            property: property.into(),
            comparison,
            operator,
            value: value.into(),
        }
    }

    fn ctx(entries: &[(&str, AttributeValue)]) -> HashMap<String, AttributeValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn string_operators() {
        let context = ctx(&[("plan", AttributeValue::String("pro-annual".into()))]);

        let cases = [
            (Operator::Eq, "pro-annual", true),
            (Operator::Eq, "pro", false),
            (Operator::Neq, "free", true),
            (Operator::Prefix, "pro", true),
            (Operator::Suffix, "annual", true),
            (Operator::Contains, "o-a", true),
            (Operator::IsOneOf, "free, pro-annual, team", true),
            (Operator::IsOneOf, "free, team", false),
            (Operator::IsNotOneOf, "free, team", true),
        ];

        for (operator, value, expected) in cases {
            let c = constraint("plan", ComparisonType::String, operator, value);
            assert_eq!(matches_constraint(&c, &context), expected, "{operator:?} {value:?}");
        }
    }

    #[test]
    fn absent_attribute_fails_closed() {
        let context = ctx(&[]);
        let c = constraint("plan", ComparisonType::String, Operator::Eq, "pro");
        assert!(!matches_constraint(&c, &context));

        let c = constraint("count", ComparisonType::Number, Operator::Gte, "1");
        assert!(!matches_constraint(&c, &context));
    }

    #[test]
    fn presence_and_absence() {
        let context = ctx(&[("plan", AttributeValue::String("pro".into()))]);

        let present = constraint("plan", ComparisonType::String, Operator::Present, "");
        let absent = constraint("plan", ComparisonType::String, Operator::NotPresent, "");
        assert!(matches_constraint(&present, &context));
        assert!(!matches_constraint(&absent, &context));

        let present = constraint("other", ComparisonType::String, Operator::Present, "");
        let absent = constraint("other", ComparisonType::String, Operator::NotPresent, "");
        assert!(!matches_constraint(&present, &context));
        assert!(matches_constraint(&absent, &context));
    }

    #[test]
    fn number_coercion_from_string() {
        let context = ctx(&[("age", AttributeValue::String("42".into()))]);
        let c = constraint("age", ComparisonType::Number, Operator::Gt, "40");
        assert!(matches_constraint(&c, &context));

        let context = ctx(&[("age", AttributeValue::String("forty-two".into()))]);
        assert!(!matches_constraint(&c, &context));
    }

    #[test]
    fn number_ordering() {
        let context = ctx(&[("score", AttributeValue::Number(3.5))]);

        let cases = [
            (Operator::Lt, "4", true),
            (Operator::Lte, "3.5", true),
            (Operator::Gt, "3.5", false),
            (Operator::Gte, "3.5", true),
            (Operator::Eq, "3.5", true),
            (Operator::Neq, "3.5", false),
            (Operator::IsOneOf, "1, 3.5, 7", true),
        ];

        for (operator, value, expected) in cases {
            let c = constraint("score", ComparisonType::Number, operator, value);
            assert_eq!(matches_constraint(&c, &context), expected, "{operator:?} {value:?}");
        }
    }

    #[test]
    fn boolean_operators() {
        let context = ctx(&[("beta", AttributeValue::Boolean(true))]);
        let truthy = constraint("beta", ComparisonType::Boolean, Operator::True, "");
        let falsy = constraint("beta", ComparisonType::Boolean, Operator::False, "");
        assert!(matches_constraint(&truthy, &context));
        assert!(!matches_constraint(&falsy, &context));

        // string coercion
        let context = ctx(&[("beta", AttributeValue::String("false".into()))]);
        assert!(matches_constraint(&falsy, &context));

        // uncoercible
        let context = ctx(&[("beta", AttributeValue::Number(1.0))]);
        assert!(!matches_constraint(&truthy, &context));
    }

    #[test]
    fn datetime_ordering_not_lexical() {
        // Lexically "2024-02-01..." > "2024-01-31..." holds too, so compare
        // across offsets where lexical ordering gives the wrong answer.
        let context = ctx(&[(
            "signup",
            AttributeValue::String("2024-06-01T02:00:00+03:00".into()),
        )]);
        // 2024-05-31T23:00:00Z in UTC, so strictly before June 1 UTC.
        let c = constraint(
            "signup",
            ComparisonType::Datetime,
            Operator::Lt,
            "2024-06-01T00:00:00Z",
        );
        assert!(matches_constraint(&c, &context));
    }

    #[test]
    fn datetime_native_value() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let context = ctx(&[("signup", AttributeValue::Datetime(dt))]);
        let c = constraint(
            "signup",
            ComparisonType::Datetime,
            Operator::Eq,
            "2024-06-01T12:00:00Z",
        );
        assert!(matches_constraint(&c, &context));
    }

    #[test]
    fn semver_precedence() {
        let context = ctx(&[("app_version", AttributeValue::String("1.10.0".into()))]);

        // 1.10.0 > 1.9.0 numerically, though "1.10.0" < "1.9.0" lexically.
        let c = constraint(
            "app_version",
            ComparisonType::Semver,
            Operator::Gt,
            "1.9.0",
        );
        assert!(matches_constraint(&c, &context));

        let c = constraint(
            "app_version",
            ComparisonType::Semver,
            Operator::Lte,
            "1.10.0",
        );
        assert!(matches_constraint(&c, &context));
    }

    #[test]
    fn empty_and_notempty() {
        let context = ctx(&[("note", AttributeValue::String("  ".into()))]);
        let empty = constraint("note", ComparisonType::String, Operator::Empty, "");
        let not_empty = constraint("note", ComparisonType::String, Operator::NotEmpty, "");
        assert!(matches_constraint(&empty, &context));
        assert!(!matches_constraint(&not_empty, &context));
    }

    #[test]
    fn operator_table() {
        assert!(operator_valid_for(ComparisonType::String, Operator::Prefix));
        assert!(!operator_valid_for(ComparisonType::String, Operator::Lt));
        assert!(operator_valid_for(ComparisonType::Number, Operator::Lte));
        assert!(!operator_valid_for(ComparisonType::Number, Operator::Prefix));
        assert!(operator_valid_for(ComparisonType::Boolean, Operator::True));
        assert!(!operator_valid_for(ComparisonType::Boolean, Operator::Eq));
        assert!(operator_valid_for(ComparisonType::Datetime, Operator::Gte));
        assert!(operator_valid_for(ComparisonType::Semver, Operator::Neq));
        assert!(!operator_valid_for(ComparisonType::Semver, Operator::Contains));
    }

    #[test]
    fn comparison_value_validation() {
        let ok = constraint("age", ComparisonType::Number, Operator::Gt, "10");
        assert!(validate_comparison_value(&ok).is_ok());

        let bad = constraint("age", ComparisonType::Number, Operator::Gt, "ten");
        assert!(validate_comparison_value(&bad).is_err());

        let bad = constraint("when", ComparisonType::Datetime, Operator::Lt, "yesterday");
        assert!(validate_comparison_value(&bad).is_err());

        let bad = constraint("v", ComparisonType::Semver, Operator::Eq, "1.2");
        assert!(validate_comparison_value(&bad).is_err());

        let empty_set = constraint("plan", ComparisonType::String, Operator::IsOneOf, " , ");
        assert!(validate_comparison_value(&empty_set).is_err());

        // no-value operators accept anything
        let presence = constraint("plan", ComparisonType::Number, Operator::Present, "");
        assert!(validate_comparison_value(&presence).is_ok());
    }
}
