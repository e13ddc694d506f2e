//! Condition evaluation against candidate payloads.
//!
//! A small, fixed operator set, not an expression language. `all` clause
//! lists use AND semantics (there is no OR combinator); the flat map shape
//! requires every key to match exactly. Anything unexpected (unknown
//! operator, non-numeric operand to a numeric comparison, non-array `in`
//! value) evaluates false.

use serde_json::Value;

use flotilla_core::Payload;

use crate::schema::{ConditionClause, ConditionOp, RuleConditions};

/// Evaluate rule conditions against a candidate payload.
pub fn matches_conditions(conditions: &RuleConditions, payload: &Payload) -> bool {
    match conditions {
        RuleConditions::All { all } => all.iter().all(|clause| evaluate_clause(clause, payload)),
        RuleConditions::Flat(map) => map.iter().all(|(key, expected)| {
            payload
                .get_path(key)
                .map(|actual| values_equal(actual, expected))
                .unwrap_or(false)
        }),
    }
}

/// Evaluate one `{field, op, value}` clause.
pub fn evaluate_clause(clause: &ConditionClause, payload: &Payload) -> bool {
    let actual = payload.get_path(&clause.field);
    match clause.op {
        ConditionOp::Eq => actual
            .map(|a| values_equal(a, &clause.value))
            .unwrap_or(false),
        ConditionOp::Neq => actual
            .map(|a| !values_equal(a, &clause.value))
            .unwrap_or(false),
        ConditionOp::Gt => numeric_compare(actual, &clause.value, |a, b| a > b),
        ConditionOp::Gte => numeric_compare(actual, &clause.value, |a, b| a >= b),
        ConditionOp::Lt => numeric_compare(actual, &clause.value, |a, b| a < b),
        ConditionOp::Lte => numeric_compare(actual, &clause.value, |a, b| a <= b),
        ConditionOp::In => membership(actual, &clause.value),
        ConditionOp::NotIn => match clause.value {
            Value::Array(_) => !membership(actual, &clause.value),
            _ => false,
        },
        ConditionOp::Contains => match (actual, &clause.value) {
            (Some(Value::String(haystack)), Value::String(needle)) => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => false,
        },
        ConditionOp::Unknown => false,
    }
}

/// Equality that treats numerically-equal numbers as equal regardless of
/// integer/float representation; everything else is strict JSON equality.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Coerce both sides to numbers (numeric strings included) and compare;
/// non-numeric operands fail the comparison.
fn numeric_compare(actual: Option<&Value>, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    let a = actual.and_then(coerce_f64);
    let b = coerce_f64(expected);
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `in` membership: the clause value must be an array.
fn membership(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(a), Value::Array(items)) => items.iter().any(|item| values_equal(a, item)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(field: &str, op: ConditionOp, value: Value) -> ConditionClause {
        ConditionClause {
            field: field.to_string(),
            op,
            value,
        }
    }

    fn payload() -> Payload {
        Payload::new()
            .with("priority", "Critical")
            .with("daysLeft", 1)
            .with("category", "engine")
            .with("note", "Check Oil Filter")
            .with("stock", json!({"onHand": 4}))
    }

    #[test]
    fn eq_and_neq() {
        let p = payload();
        assert!(evaluate_clause(&clause("priority", ConditionOp::Eq, json!("Critical")), &p));
        assert!(!evaluate_clause(&clause("priority", ConditionOp::Eq, json!("High")), &p));
        assert!(evaluate_clause(&clause("priority", ConditionOp::Neq, json!("High")), &p));
        // Missing field fails both ways (fail closed).
        assert!(!evaluate_clause(&clause("missing", ConditionOp::Eq, json!("x")), &p));
        assert!(!evaluate_clause(&clause("missing", ConditionOp::Neq, json!("x")), &p));
    }

    #[test]
    fn numeric_comparisons_coerce() {
        let p = payload();
        assert!(evaluate_clause(&clause("daysLeft", ConditionOp::Lte, json!(3)), &p));
        assert!(!evaluate_clause(&clause("daysLeft", ConditionOp::Gt, json!(3)), &p));
        assert!(evaluate_clause(&clause("daysLeft", ConditionOp::Gte, json!("1")), &p));
        // Non-numeric operand → false.
        assert!(!evaluate_clause(&clause("priority", ConditionOp::Lt, json!(3)), &p));
        assert!(!evaluate_clause(&clause("daysLeft", ConditionOp::Lt, json!("soon")), &p));
    }

    #[test]
    fn integer_float_equality() {
        let p = Payload::new().with("count", 3);
        assert!(evaluate_clause(&clause("count", ConditionOp::Eq, json!(3.0)), &p));
    }

    #[test]
    fn in_and_not_in() {
        let p = payload();
        assert!(evaluate_clause(
            &clause("category", ConditionOp::In, json!(["engine", "hull"])),
            &p
        ));
        assert!(!evaluate_clause(
            &clause("category", ConditionOp::In, json!(["galley"])),
            &p
        ));
        assert!(evaluate_clause(
            &clause("category", ConditionOp::NotIn, json!(["galley"])),
            &p
        ));
        // Non-array value → false for both.
        assert!(!evaluate_clause(&clause("category", ConditionOp::In, json!("engine")), &p));
        assert!(!evaluate_clause(&clause("category", ConditionOp::NotIn, json!("galley")), &p));
    }

    #[test]
    fn contains_is_case_insensitive_strings_only() {
        let p = payload();
        assert!(evaluate_clause(&clause("note", ConditionOp::Contains, json!("oil filter")), &p));
        assert!(!evaluate_clause(&clause("note", ConditionOp::Contains, json!("diesel")), &p));
        assert!(!evaluate_clause(&clause("daysLeft", ConditionOp::Contains, json!("1")), &p));
    }

    #[test]
    fn unknown_op_fails_closed() {
        let p = payload();
        assert!(!evaluate_clause(&clause("priority", ConditionOp::Unknown, json!("Critical")), &p));
    }

    #[test]
    fn dot_path_fields() {
        let p = payload();
        assert!(evaluate_clause(&clause("stock.onHand", ConditionOp::Lte, json!(5)), &p));
    }

    #[test]
    fn all_clauses_are_anded() {
        let p = payload();
        let conditions = RuleConditions::All {
            all: vec![
                clause("priority", ConditionOp::Eq, json!("Critical")),
                clause("daysLeft", ConditionOp::Lte, json!(3)),
            ],
        };
        assert!(matches_conditions(&conditions, &p));

        let conditions = RuleConditions::All {
            all: vec![
                clause("priority", ConditionOp::Eq, json!("Critical")),
                clause("daysLeft", ConditionOp::Gt, json!(3)),
            ],
        };
        assert!(!matches_conditions(&conditions, &p));
    }

    #[test]
    fn flat_map_requires_all_keys() {
        let p = payload();
        let mut map = serde_json::Map::new();
        map.insert("priority".to_string(), json!("Critical"));
        map.insert("category".to_string(), json!("engine"));
        assert!(matches_conditions(&RuleConditions::Flat(map.clone()), &p));

        map.insert("category".to_string(), json!("hull"));
        assert!(!matches_conditions(&RuleConditions::Flat(map), &p));
    }

    #[test]
    fn empty_conditions_always_match() {
        let p = payload();
        assert!(matches_conditions(&RuleConditions::default(), &p));
        assert!(matches_conditions(&RuleConditions::All { all: vec![] }, &p));
    }
}
