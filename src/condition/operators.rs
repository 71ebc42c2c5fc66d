/// Comparison operators and generic value comparison
///
/// Operators are parsed case-insensitively with aliases (`eq` ≡ `equals` ≡ `==`).
/// Values compare numerically when both sides coerce to numbers, otherwise as
/// strings; `null` sorts before any defined value.

use crate::error::ConditionError;
use crate::path::display_value;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::str::FromStr;

/// Supported comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    NotBetween,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    RegexMatch,
    NotRegexMatch,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
}

impl FromStr for Operation {
    type Err = ConditionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let op = match raw.trim().to_ascii_lowercase().replace(&['-', ' '][..], "_").as_str() {
            "eq" | "equals" | "equal" | "is" | "==" | "=" | "===" => Operation::Equals,
            "ne" | "neq" | "not_equals" | "not_equal" | "is_not" | "!=" | "!==" | "<>" => {
                Operation::NotEquals
            }
            "gt" | "greater_than" | ">" => Operation::GreaterThan,
            "gte" | "ge" | "greater_than_or_equal" | "greater_or_equal" | ">=" => {
                Operation::GreaterThanOrEqual
            }
            "lt" | "less_than" | "<" => Operation::LessThan,
            "lte" | "le" | "less_than_or_equal" | "less_or_equal" | "<=" => {
                Operation::LessThanOrEqual
            }
            "between" => Operation::Between,
            "not_between" => Operation::NotBetween,
            "in" | "one_of" => Operation::In,
            "not_in" | "none_of" => Operation::NotIn,
            "contains" => Operation::Contains,
            "not_contains" | "does_not_contain" => Operation::NotContains,
            "starts_with" | "startswith" | "start_with" => Operation::StartsWith,
            "not_starts_with" => Operation::NotStartsWith,
            "ends_with" | "endswith" | "end_with" => Operation::EndsWith,
            "not_ends_with" => Operation::NotEndsWith,
            "regex_match" | "regex" | "matches" => Operation::RegexMatch,
            "not_regex_match" | "not_matches" => Operation::NotRegexMatch,
            "is_null" | "null" => Operation::IsNull,
            "is_not_null" | "not_null" => Operation::IsNotNull,
            "is_empty" | "empty" => Operation::IsEmpty,
            "is_not_empty" | "not_empty" => Operation::IsNotEmpty,
            _ => return Err(ConditionError::UnknownOperator(raw.to_string())),
        };
        Ok(op)
    }
}

impl Operation {
    /// Canonical snake_case name
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Equals => "equals",
            Operation::NotEquals => "not_equals",
            Operation::GreaterThan => "greater_than",
            Operation::GreaterThanOrEqual => "greater_than_or_equal",
            Operation::LessThan => "less_than",
            Operation::LessThanOrEqual => "less_than_or_equal",
            Operation::Between => "between",
            Operation::NotBetween => "not_between",
            Operation::In => "in",
            Operation::NotIn => "not_in",
            Operation::Contains => "contains",
            Operation::NotContains => "not_contains",
            Operation::StartsWith => "starts_with",
            Operation::NotStartsWith => "not_starts_with",
            Operation::EndsWith => "ends_with",
            Operation::NotEndsWith => "not_ends_with",
            Operation::RegexMatch => "regex_match",
            Operation::NotRegexMatch => "not_regex_match",
            Operation::IsNull => "is_null",
            Operation::IsNotNull => "is_not_null",
            Operation::IsEmpty => "is_empty",
            Operation::IsNotEmpty => "is_not_empty",
        }
    }

    /// Apply the operation to already-resolved operands
    pub fn apply(
        &self,
        left: &Value,
        right: &Value,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> Result<bool, ConditionError> {
        let outcome = match self {
            Operation::Equals => loose_equal(left, right),
            Operation::NotEquals => !loose_equal(left, right),
            Operation::GreaterThan => compare_values(left, right) == Ordering::Greater,
            Operation::GreaterThanOrEqual => compare_values(left, right) != Ordering::Less,
            Operation::LessThan => compare_values(left, right) == Ordering::Less,
            Operation::LessThanOrEqual => compare_values(left, right) != Ordering::Greater,
            Operation::Between => self.between(left, min, max)?,
            Operation::NotBetween => !self.between(left, min, max)?,
            Operation::In => member_of(left, right),
            Operation::NotIn => !member_of(left, right),
            Operation::Contains => contains(left, right),
            Operation::NotContains => !contains(left, right),
            Operation::StartsWith => display_value(left).starts_with(&display_value(right)),
            Operation::NotStartsWith => !display_value(left).starts_with(&display_value(right)),
            Operation::EndsWith => display_value(left).ends_with(&display_value(right)),
            Operation::NotEndsWith => !display_value(left).ends_with(&display_value(right)),
            Operation::RegexMatch => regex_match(left, right)?,
            Operation::NotRegexMatch => !regex_match(left, right)?,
            Operation::IsNull => left.is_null(),
            Operation::IsNotNull => !left.is_null(),
            Operation::IsEmpty => is_empty(left),
            Operation::IsNotEmpty => !is_empty(left),
        };
        Ok(outcome)
    }

    fn between(
        &self,
        value: &Value,
        min: Option<&Value>,
        max: Option<&Value>,
    ) -> Result<bool, ConditionError> {
        let missing = |operand: &str| ConditionError::MissingOperand {
            operator: self.name().to_string(),
            operand: operand.to_string(),
        };
        let min = min.ok_or_else(|| missing("min"))?;
        let max = max.ok_or_else(|| missing("max"))?;

        Ok(compare_values(value, min) != Ordering::Less
            && compare_values(value, max) != Ordering::Greater)
    }
}

/// Coerce a value to a number when it is a number or a numeric string
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Generic ordering: null first, then numeric when both coerce, else lexicographic
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }

    display_value(left).cmp(&display_value(right))
}

/// Equality with numeric and boolean coercion
pub fn loose_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }

    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        (Value::Array(_), _) | (_, Value::Array(_)) | (Value::Object(_), _) | (_, Value::Object(_)) => {
            false
        }
        _ => match (as_number(left), as_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => display_value(left) == display_value(right),
        },
    }
}

/// Emptiness: null, empty string, empty array and empty object all qualify
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn member_of(value: &Value, set: &Value) -> bool {
    match set {
        Value::Array(items) => items.iter().any(|item| loose_equal(value, item)),
        Value::String(list) => list
            .split(',')
            .map(str::trim)
            .any(|item| item == display_value(value)),
        Value::Object(map) => map.contains_key(&display_value(value)),
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.contains(&display_value(needle)),
        Value::Array(items) => items.iter().any(|item| loose_equal(item, needle)),
        Value::Object(map) => map.contains_key(&display_value(needle)),
        _ => false,
    }
}

fn regex_match(value: &Value, pattern: &Value) -> Result<bool, ConditionError> {
    let pattern = display_value(pattern);
    let regex = Regex::new(&pattern).map_err(|e| ConditionError::InvalidRegex {
        pattern: pattern.clone(),
        message: e.to_string(),
    })?;
    Ok(regex.is_match(&display_value(value)))
}
