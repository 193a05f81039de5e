//! Filter evaluation for query execution.
//!
//! This module provides the `FilterEvaluator` that evaluates filter
//! conditions from the query IR against resolved field values.

use std::cmp::Ordering;

use listdb_proto::{Condition, Filter, Predicate, Value};

/// Evaluates filter conditions against field values.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate an AND-combined filter. `resolve` maps a field path to its
    /// value in the row under test, `Null` when absent.
    pub fn evaluate<F>(filter: &Filter, mut resolve: F) -> bool
    where
        F: FnMut(&str) -> Value,
    {
        filter
            .conditions
            .iter()
            .all(|condition| Self::evaluate_condition(condition, &resolve(&condition.field)))
    }

    /// Evaluate one condition against a value.
    ///
    /// Every predicate except `IsNull` is false on a null value; negation
    /// then inverts the result.
    pub fn evaluate_condition(condition: &Condition, value: &Value) -> bool {
        let matched = match &condition.predicate {
            Predicate::IsNull => value.is_null(),
            _ if value.is_null() => false,
            Predicate::Eq(expected) => Self::values_equal(value, expected),
            Predicate::Lt(bound) => Self::compare_values(value, bound).is_some_and(Ordering::is_lt),
            Predicate::Le(bound) => Self::compare_values(value, bound).is_some_and(Ordering::is_le),
            Predicate::Gt(bound) => Self::compare_values(value, bound).is_some_and(Ordering::is_gt),
            Predicate::Ge(bound) => Self::compare_values(value, bound).is_some_and(Ordering::is_ge),
            Predicate::Like(pattern) => match value {
                Value::String(s) => Self::like_match(s, pattern),
                _ => false,
            },
            Predicate::In(values) => values.iter().any(|v| Self::values_equal(value, v)),
        };
        matched != condition.negated
    }

    /// Check two values for equality across compatible types.
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => Self::compare_values(a, b) == Some(Ordering::Equal),
        }
    }

    /// Compare two values, returning their ordering if comparable.
    ///
    /// Integers compare with numeric strings, since ids often arrive as
    /// request parameters.
    pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => a.partial_cmp(b),
            (Value::Int64(a), Value::Float64(b)) => (*a as f64).partial_cmp(b),
            (Value::Float64(a), Value::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::String(s)) => s.parse::<i64>().ok().map(|b| a.cmp(&b)),
            (Value::String(s), Value::Int64(b)) => s.parse::<i64>().ok().map(|a| a.cmp(b)),
            _ => None, // Incompatible types
        }
    }

    /// Total order for sorting: nulls first, incomparable values equal.
    pub fn order_values(a: &Value, b: &Value) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Self::compare_values(a, b).unwrap_or(Ordering::Equal),
        }
    }

    /// Match a string against a SQL LIKE pattern.
    ///
    /// Supports:
    /// - `%` matches zero or more characters
    /// - `_` matches exactly one character
    /// - `\\%` matches literal `%`
    /// - `\\_` matches literal `_`
    ///
    /// Matching is case-insensitive, as in the collations list filters
    /// usually run under.
    pub fn like_match(value: &str, pattern: &str) -> bool {
        let value: Vec<char> = value.to_lowercase().chars().collect();
        let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
        Self::like_match_from(&value, &pattern)
    }

    fn like_match_from(value: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => value.is_empty(),
            Some(('%', rest)) => {
                if rest.is_empty() {
                    return true;
                }
                (0..=value.len()).any(|skip| Self::like_match_from(&value[skip..], rest))
            }
            Some(('_', rest)) => !value.is_empty() && Self::like_match_from(&value[1..], rest),
            Some(('\\', rest)) => match (rest.split_first(), value.split_first()) {
                (Some((p, rest)), Some((c, value))) if p == c => Self::like_match_from(value, rest),
                _ => false,
            },
            Some((p, rest)) => match value.split_first() {
                Some((c, value)) if c == p => Self::like_match_from(value, rest),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: Vec<(&str, Value)>) -> impl Fn(&str) -> Value {
        let fields: Vec<(String, Value)> = fields
            .into_iter()
            .map(|(n, v)| (n.to_string(), v))
            .collect();
        move |name: &str| {
            fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null)
        }
    }

    #[test]
    fn test_eq_filter() {
        let resolve = row(vec![("NAME", "Alice".into()), ("SORT", Value::Int64(30))]);

        assert!(FilterEvaluator::evaluate(&Filter::new().eq("NAME", "Alice"), &resolve));
        assert!(!FilterEvaluator::evaluate(&Filter::new().eq("NAME", "Bob"), &resolve));
        assert!(FilterEvaluator::evaluate(&Filter::new().eq("SORT", 30.0), &resolve));
        assert!(FilterEvaluator::evaluate(&Filter::new().eq("SORT", "30"), &resolve));
    }

    #[test]
    fn test_comparisons() {
        let resolve = row(vec![("SORT", Value::Int64(30))]);

        assert!(FilterEvaluator::evaluate(&Filter::new().gt("SORT", 20), &resolve));
        assert!(FilterEvaluator::evaluate(&Filter::new().ge("SORT", 30), &resolve));
        assert!(!FilterEvaluator::evaluate(&Filter::new().lt("SORT", 30), &resolve));
        assert!(FilterEvaluator::evaluate(&Filter::new().le("SORT", 30), &resolve));
        // Incompatible types never match
        assert!(!FilterEvaluator::evaluate(&Filter::new().gt("SORT", true), &resolve));
    }

    #[test]
    fn test_null_semantics() {
        let resolve = row(vec![("TAG", Value::Null)]);

        assert!(FilterEvaluator::evaluate(&Filter::new().is_null("TAG"), &resolve));
        assert!(FilterEvaluator::evaluate(&Filter::new().is_null("ABSENT"), &resolve));
        assert!(!FilterEvaluator::evaluate(&Filter::new().not_null("TAG"), &resolve));
        assert!(!FilterEvaluator::evaluate(&Filter::new().eq("TAG", 1), &resolve));
        assert!(FilterEvaluator::evaluate(&Filter::new().ne("TAG", 1), &resolve));
    }

    #[test]
    fn test_contains_entry_matches_literally() {
        let filter = Filter::new().entry("%NAME", "50%").unwrap();

        let sale = row(vec![("NAME", "Chair 50% off".into())]);
        let plain = row(vec![("NAME", "Chair 500 off".into())]);
        assert!(FilterEvaluator::evaluate(&filter, &sale));
        assert!(!FilterEvaluator::evaluate(&filter, &plain));

        let filter = Filter::new().entry("%NAME", "a_b").unwrap();
        assert!(FilterEvaluator::evaluate(&filter, &row(vec![("NAME", "xa_by".into())])));
        assert!(!FilterEvaluator::evaluate(&filter, &row(vec![("NAME", "xacby".into())])));
    }

    #[test]
    fn test_in_and_not_in() {
        let resolve = row(vec![("ID", Value::Int64(2))]);
        let ids = vec![Value::Int64(1), Value::Int64(2)];

        assert!(FilterEvaluator::evaluate(&Filter::new().in_list("ID", ids.clone()), &resolve));
        assert!(!FilterEvaluator::evaluate(&Filter::new().not_in("ID", ids), &resolve));
        assert!(!FilterEvaluator::evaluate(&Filter::new().in_list("ID", vec![]), &resolve));
    }

    #[test]
    fn test_like_match() {
        assert!(FilterEvaluator::like_match("Lake house", "%house"));
        assert!(FilterEvaluator::like_match("Lake house", "lake%"));
        assert!(FilterEvaluator::like_match("Lake house", "%KE H%"));
        assert!(FilterEvaluator::like_match("abc", "a_c"));
        assert!(!FilterEvaluator::like_match("abc", "a_d"));
        assert!(FilterEvaluator::like_match("100%", "100\\%"));
        assert!(!FilterEvaluator::like_match("1000", "100\\%"));
        assert!(FilterEvaluator::like_match("", "%"));
        assert!(!FilterEvaluator::like_match("x", ""));
    }

    #[test]
    fn test_order_values_nulls_first() {
        let mut values = vec![Value::Int64(3), Value::Null, Value::Int64(1)];
        values.sort_by(FilterEvaluator::order_values);
        assert_eq!(values, vec![Value::Null, Value::Int64(1), Value::Int64(3)]);
    }
}
