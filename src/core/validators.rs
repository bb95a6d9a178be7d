// src/core/validators.rs

//! Pluggable checks that a raw parameter value must pass before a handler sees it.
//!
//! A validator runs in three steps: `map_before` reshapes the raw value (for
//! example splitting a comma separated list), `validate` tests the reshaped
//! value and `map_after` converts it into its final form on success.

use patterns::{LIST_SEPARATOR_RE, NUMBER_RE};
use serde_json::{Number, Value};
use std::path::PathBuf;
use std::sync::Arc;

// Both patterns are literals exercised by the tests below.
#[allow(clippy::expect_used)]
mod patterns {
    use lazy_static::lazy_static;
    use regex::Regex;

    lazy_static! {
        pub(super) static ref NUMBER_RE: Regex =
            Regex::new(r"^\s*[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?\s*$")
                .expect("number pattern is valid");
        pub(super) static ref LIST_SEPARATOR_RE: Regex =
            Regex::new(r"\s*,\s*").expect("list separator pattern is valid");
    }
}

pub trait Validator: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    fn map_before(&self, value: Value) -> Value {
        value
    }

    fn validate(&self, value: &Value) -> bool;

    fn map_after(&self, value: Value) -> Value {
        value
    }

    /// The message shown to the user when `raw` is rejected.
    fn invalid_text(&self, raw: &Value) -> String;
}

/// Outcome of running a value through a validator chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Valid(Value),
    Invalid(String),
}

/// Runs `raw` through every validator in order. The first rejection stops the chain.
pub fn run_chain(validators: &[Arc<dyn Validator>], raw: Value) -> Validation {
    let mut value = raw.clone();
    for validator in validators {
        let mapped = validator.map_before(value);
        if !validator.validate(&mapped) {
            log::debug!("Validator '{}' rejected {}", validator.name(), raw);
            return Validation::Invalid(validator.invalid_text(&raw));
        }
        value = validator.map_after(mapped);
    }
    Validation::Valid(value)
}

// --- Helpers ---

/// Renders a value for messages without the JSON quotes around strings.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => NUMBER_RE.is_match(s),
        _ => false,
    }
}

fn to_number(value: Value) -> Value {
    let Value::String(s) = &value else {
        return value;
    };
    let trimmed = s.trim().trim_start_matches('+');
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::Number(int.into());
    }
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or(value, Value::Number)
}

fn split_list(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Value::Array(Vec::new());
            }
            Value::Array(
                LIST_SEPARATOR_RE
                    .split(trimmed)
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            )
        }
        other => other,
    }
}

/// Expands `~` and resolves relative paths against the working directory.
pub fn resolve_path(raw: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().unwrap_or_default().join(expanded)
    }
}

// --- Built-in validators ---

/// Accepts numeric strings and numbers, and converts them into JSON numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsNumber;

impl Validator for IsNumber {
    fn name(&self) -> &'static str {
        "is_number"
    }

    fn validate(&self, value: &Value) -> bool {
        is_number(value)
    }

    fn map_after(&self, value: Value) -> Value {
        to_number(value)
    }

    fn invalid_text(&self, raw: &Value) -> String {
        format!(t!("validators.number"), value = display(raw))
    }
}

/// Accepts a comma separated list of numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsNumberArray;

impl Validator for IsNumberArray {
    fn name(&self) -> &'static str {
        "is_number_array"
    }

    fn map_before(&self, value: Value) -> Value {
        split_list(value)
    }

    fn validate(&self, value: &Value) -> bool {
        matches!(value, Value::Array(items) if !items.is_empty() && items.iter().all(is_number))
    }

    fn map_after(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.into_iter().map(to_number).collect()),
            other => other,
        }
    }

    fn invalid_text(&self, _raw: &Value) -> String {
        t!("validators.number_array").to_string()
    }
}

/// Accepts `true/false`, `yes/no`, `y/n` and `1/0` and converts them into booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsBoolean;

impl Validator for IsBoolean {
    fn name(&self) -> &'static str {
        "is_boolean"
    }

    fn map_before(&self, value: Value) -> Value {
        let Value::String(s) = &value else {
            return value;
        };
        match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Value::Bool(true),
            "false" | "no" | "n" | "0" => Value::Bool(false),
            _ => value,
        }
    }

    fn validate(&self, value: &Value) -> bool {
        value.is_boolean()
    }

    fn invalid_text(&self, _raw: &Value) -> String {
        t!("validators.boolean").to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IsString;

impl Validator for IsString {
    fn name(&self) -> &'static str {
        "is_string"
    }

    fn validate(&self, value: &Value) -> bool {
        value.is_string()
    }

    fn invalid_text(&self, raw: &Value) -> String {
        format!(t!("validators.string"), value = display(raw))
    }
}

/// Accepts a comma separated list and turns it into an array of strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsStringArray;

impl Validator for IsStringArray {
    fn name(&self) -> &'static str {
        "is_string_array"
    }

    fn map_before(&self, value: Value) -> Value {
        split_list(value)
    }

    fn validate(&self, value: &Value) -> bool {
        matches!(value, Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string))
    }

    fn invalid_text(&self, _raw: &Value) -> String {
        t!("validators.string_array").to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IsExistingPath;

impl Validator for IsExistingPath {
    fn name(&self) -> &'static str {
        "is_existing_path"
    }

    fn validate(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|p| resolve_path(p).exists())
    }

    fn invalid_text(&self, raw: &Value) -> String {
        format!(t!("validators.existing_path"), value = display(raw))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IsNonExistingPath;

impl Validator for IsNonExistingPath {
    fn name(&self) -> &'static str {
        "is_non_existing_path"
    }

    fn validate(&self, value: &Value) -> bool {
        value.as_str().is_some_and(|p| !resolve_path(p).exists())
    }

    fn invalid_text(&self, raw: &Value) -> String {
        format!(t!("validators.non_existing_path"), value = display(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn chain(validators: Vec<Arc<dyn Validator>>, raw: Value) -> Validation {
        run_chain(&validators, raw)
    }

    #[test]
    fn test_number_accepts_and_converts() {
        assert_eq!(
            chain(vec![Arc::new(IsNumber)], json!("42")),
            Validation::Valid(json!(42))
        );
        assert_eq!(
            chain(vec![Arc::new(IsNumber)], json!("-1.5")),
            Validation::Valid(json!(-1.5))
        );
    }

    #[test]
    fn test_number_rejects_text_with_message() {
        match chain(vec![Arc::new(IsNumber)], json!("abc")) {
            Validation::Invalid(msg) => assert!(msg.contains("abc")),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_number_array_splits_and_converts() {
        assert_eq!(
            chain(vec![Arc::new(IsNumberArray)], json!("1, 2,3")),
            Validation::Valid(json!([1, 2, 3]))
        );
        assert!(matches!(
            chain(vec![Arc::new(IsNumberArray)], json!("1,two")),
            Validation::Invalid(_)
        ));
        assert!(matches!(
            chain(vec![Arc::new(IsNumberArray)], json!("")),
            Validation::Invalid(_)
        ));
    }

    #[test]
    fn test_patterns_build_and_match() {
        assert!(NUMBER_RE.is_match(" 1e3 "));
        assert!(NUMBER_RE.is_match(".5"));
        assert!(!NUMBER_RE.is_match("1.2.3"));
        assert_eq!(LIST_SEPARATOR_RE.split("a , b,c").collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_boolean_tokens() {
        for token in ["true", "YES", "y", "1"] {
            assert_eq!(
                chain(vec![Arc::new(IsBoolean)], json!(token)),
                Validation::Valid(json!(true))
            );
        }
        for token in ["false", "no", "N", "0"] {
            assert_eq!(
                chain(vec![Arc::new(IsBoolean)], json!(token)),
                Validation::Valid(json!(false))
            );
        }
        assert!(matches!(
            chain(vec![Arc::new(IsBoolean)], json!("maybe")),
            Validation::Invalid(_)
        ));
    }

    #[test]
    fn test_string_and_string_array() {
        assert_eq!(
            chain(vec![Arc::new(IsString)], json!("hello")),
            Validation::Valid(json!("hello"))
        );
        assert!(matches!(
            chain(vec![Arc::new(IsString)], json!(7)),
            Validation::Invalid(_)
        ));
        assert_eq!(
            chain(vec![Arc::new(IsStringArray)], json!("a,b , c")),
            Validation::Valid(json!(["a", "b", "c"]))
        );
    }

    #[test]
    fn test_path_validators() {
        let dir = tempdir().unwrap();
        let existing = dir.path().to_string_lossy().to_string();
        let missing = dir.path().join("missing").to_string_lossy().to_string();

        assert!(matches!(
            chain(vec![Arc::new(IsExistingPath)], json!(existing.clone())),
            Validation::Valid(_)
        ));
        assert!(matches!(
            chain(vec![Arc::new(IsExistingPath)], json!(missing.clone())),
            Validation::Invalid(_)
        ));
        assert!(matches!(
            chain(vec![Arc::new(IsNonExistingPath)], json!(missing)),
            Validation::Valid(_)
        ));
        assert!(matches!(
            chain(vec![Arc::new(IsNonExistingPath)], json!(existing)),
            Validation::Invalid(_)
        ));
    }

    #[test]
    fn test_chain_feeds_mapped_value_forward() {
        // The boolean validator only sees the output of the string check.
        let validators: Vec<Arc<dyn Validator>> = vec![Arc::new(IsString), Arc::new(IsBoolean)];
        assert_eq!(
            run_chain(&validators, json!("yes")),
            Validation::Valid(json!(true))
        );
        // A rejection reports the first failing validator.
        match run_chain(&validators, json!(3)) {
            Validation::Invalid(msg) => assert!(msg.contains('3')),
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
