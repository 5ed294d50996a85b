//! Record validation.
//!
//! Each field may carry a list of [`Rule`]s. A rule is either a named
//! predicate looked up in a static table (optionally with positional
//! arguments) or a custom callback. After the per-field rules, the
//! descriptor's whole-record validator runs for cross-field checks and
//! reports through the same [`ValidationContext`].
//!
//! Failures coalesce per field: three failed rules on `age` produce one
//! [`FieldValidationError`] listing all three.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use regex::Regex;

use crate::descriptor::ModelDescriptor;
use crate::error::{Error, FieldValidationError, Result, ValidationError};
use crate::record::Record;
use crate::value::Value;

/// Compiled-pattern cache shared by every `matches`-style rule.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> std::result::Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Invalid patterns never match; the compile error is logged.
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Check a pattern up front. Returns an error message if it is invalid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

const EMAIL: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const URL: &str = r"^https?://[^\s/$.?#].[^\s]*$";
const UUID: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";
const ALPHA: &str = r"^[a-zA-Z]+$";
const ALPHANUMERIC: &str = r"^[a-zA-Z0-9]+$";

/// Signature of a custom field rule.
///
/// Receives the record, the field being checked and the context; reports
/// failures with [`ValidationContext::fail`].
pub type CustomRule = Arc<dyn Fn(&Record, &str, &mut ValidationContext) + Send + Sync>;

/// One validation rule attached to a field.
#[derive(Clone)]
pub enum Rule {
    /// A predicate from the built-in table.
    Named {
        /// Rule name, e.g. `isEmail` or `len`.
        name: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// An arbitrary callback.
    Custom {
        /// Name reported in `expected_rules` / `failed_rules`.
        name: String,
        /// The callback.
        check: CustomRule,
    },
}

impl Rule {
    /// A named rule without arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Rule::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// A named rule with positional arguments.
    pub fn with_args(name: impl Into<String>, args: Vec<Value>) -> Self {
        Rule::Named {
            name: name.into(),
            args,
        }
    }

    /// Field must be present and non-null.
    pub fn required() -> Self {
        Self::named("required")
    }

    /// Text must match `pattern`.
    pub fn matches(pattern: impl Into<String>) -> Self {
        Self::with_args("matches", vec![Value::Text(pattern.into())])
    }

    /// Text or list length must lie within `min..=max`.
    pub fn len(min: i64, max: Option<i64>) -> Self {
        let mut args = vec![Value::BigInt(min)];
        args.extend(max.map(Value::BigInt));
        Self::with_args("len", args)
    }

    /// Number must be at least `n`.
    pub fn min(n: impl Into<Value>) -> Self {
        Self::with_args("min", vec![n.into()])
    }

    /// Number must be at most `n`.
    pub fn max(n: impl Into<Value>) -> Self {
        Self::with_args("max", vec![n.into()])
    }

    /// Value must be one of `values`.
    pub fn is_in<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::with_args("isIn", values.into_iter().map(Into::into).collect())
    }

    /// A custom callback rule.
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Record, &str, &mut ValidationContext) + Send + Sync + 'static,
    {
        Rule::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// The name reported for this rule.
    pub fn name(&self) -> &str {
        match self {
            Rule::Named { name, .. } | Rule::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Named { name, args } => f
                .debug_struct("Named")
                .field("name", name)
                .field("args", args)
                .finish(),
            Rule::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

type NamedCheck = fn(&Value, &[Value]) -> bool;

/// Built-in rules. `required` is handled separately since it is the only
/// rule that inspects absent values.
static NAMED_RULES: &[(&str, NamedCheck)] = &[
    ("notEmpty", not_empty),
    ("isInt", is_int),
    ("isNumeric", is_numeric),
    ("isBoolean", is_boolean),
    ("isEmail", is_email),
    ("isUrl", is_url),
    ("isUuid", is_uuid),
    ("isAlpha", is_alpha),
    ("isAlphanumeric", is_alphanumeric),
    ("matches", matches_arg),
    ("len", len_between),
    ("min", at_least),
    ("max", at_most),
    ("isIn", one_of),
];

fn lookup_named(name: &str) -> Option<NamedCheck> {
    NAMED_RULES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, check)| *check)
}

fn not_empty(v: &Value, _: &[Value]) -> bool {
    match v {
        Value::Text(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn is_int(v: &Value, _: &[Value]) -> bool {
    match v {
        Value::Text(s) => s.trim().parse::<i64>().is_ok(),
        other => other.as_i64().is_some() && !matches!(other, Value::Timestamp(_)),
    }
}

fn is_numeric(v: &Value, _: &[Value]) -> bool {
    match v {
        Value::Text(s) => s.trim().parse::<f64>().is_ok(),
        other => other.as_f64().is_some(),
    }
}

fn is_boolean(v: &Value, _: &[Value]) -> bool {
    match v {
        Value::Bool(_) => true,
        Value::Text(s) => matches!(s.as_str(), "true" | "false"),
        _ => false,
    }
}

fn text_matches(v: &Value, pattern: &str) -> bool {
    v.as_str().is_some_and(|s| matches_pattern(s, pattern))
}

fn is_email(v: &Value, _: &[Value]) -> bool {
    text_matches(v, EMAIL)
}

fn is_url(v: &Value, _: &[Value]) -> bool {
    text_matches(v, URL)
}

fn is_uuid(v: &Value, _: &[Value]) -> bool {
    text_matches(v, UUID)
}

fn is_alpha(v: &Value, _: &[Value]) -> bool {
    text_matches(v, ALPHA)
}

fn is_alphanumeric(v: &Value, _: &[Value]) -> bool {
    text_matches(v, ALPHANUMERIC)
}

fn matches_arg(v: &Value, args: &[Value]) -> bool {
    match args.first().and_then(Value::as_str) {
        Some(pattern) => text_matches(v, pattern),
        None => false,
    }
}

fn len_between(v: &Value, args: &[Value]) -> bool {
    let len = match v {
        Value::Text(s) => s.chars().count() as i64,
        Value::Array(items) => items.len() as i64,
        _ => return false,
    };
    let min = args.first().and_then(Value::as_i64).unwrap_or(0);
    let max = args.get(1).and_then(Value::as_i64).unwrap_or(i64::MAX);
    (min..=max).contains(&len)
}

fn at_least(v: &Value, args: &[Value]) -> bool {
    match (v.as_f64(), args.first().and_then(Value::as_f64)) {
        (Some(x), Some(bound)) => x >= bound,
        _ => false,
    }
}

fn at_most(v: &Value, args: &[Value]) -> bool {
    match (v.as_f64(), args.first().and_then(Value::as_f64)) {
        (Some(x), Some(bound)) => x <= bound,
        _ => false,
    }
}

fn one_of(v: &Value, args: &[Value]) -> bool {
    let candidates = match args {
        [Value::Array(items)] => items.as_slice(),
        _ => args,
    };
    candidates.iter().any(|c| c.loosely_equals(v))
}

/// Accumulates failures while a record is validated.
#[derive(Debug, Default)]
pub struct ValidationContext {
    failures: Vec<(String, Vec<String>)>,
}

impl ValidationContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `rule` failed for `field`.
    ///
    /// Repeated failures for the same field are merged into one entry.
    pub fn fail(&mut self, field: &str, rule: &str) {
        match self.failures.iter_mut().find(|(f, _)| f == field) {
            Some((_, rules)) => {
                if !rules.iter().any(|r| r == rule) {
                    rules.push(rule.to_string());
                }
            }
            None => self.failures.push((field.to_string(), vec![rule.to_string()])),
        }
    }

    /// True if nothing has failed so far.
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

fn run_rule(record: &Record, field: &str, rule: &Rule, ctx: &mut ValidationContext) {
    match rule {
        Rule::Custom { check, .. } => check(record, field, ctx),
        Rule::Named { name, args } => {
            let value = record.get(field).unwrap_or(&Value::Null);
            let ok = if name == "required" {
                !value.is_null()
            } else if value.is_null() {
                true
            } else {
                lookup_named(name).is_some_and(|check| check(value, args))
            };
            if !ok {
                ctx.fail(field, name);
            }
        }
    }
}

/// Run every declared rule and the whole-record validator, returning the
/// accumulated failures (possibly empty).
pub fn check(descriptor: &ModelDescriptor, record: &Record) -> ValidationError {
    let mut ctx = ValidationContext::new();
    for (field, rules) in descriptor.validations() {
        for rule in rules {
            run_rule(record, field, rule, &mut ctx);
        }
    }
    if let Some(validator) = descriptor.object_validator() {
        validator(record, &mut ctx);
    }

    let mut result = ValidationError::new(descriptor.name());
    for (field, failed_rules) in ctx.failures {
        let mut expected_rules: Vec<String> = descriptor
            .validations()
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, rules)| rules.iter().map(|r| r.name().to_string()).collect())
            .unwrap_or_default();
        for failed in &failed_rules {
            if !expected_rules.contains(failed) {
                expected_rules.push(failed.clone());
            }
        }
        result.errors.push(FieldValidationError {
            value: record.get(&field).cloned().unwrap_or(Value::Null),
            field,
            expected_rules,
            failed_rules,
        });
    }
    result
}

/// Validate a record, failing with [`Error::Validation`] if any rule failed.
#[tracing::instrument(level = "trace", skip_all, fields(model = descriptor.name()))]
pub fn validate(descriptor: &ModelDescriptor, record: &Record) -> Result<()> {
    let result = check(descriptor, record);
    if result.is_empty() {
        Ok(())
    } else {
        tracing::debug!(failed_fields = result.len(), "validation failed");
        Err(Error::Validation(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SqlType;

    fn person() -> ModelDescriptor {
        ModelDescriptor::builder("person")
            .column("name", SqlType::Text)
            .column("age", SqlType::BigInt)
            .column("email", SqlType::Text)
            .validate_field("age", Rule::required())
            .validate_field("age", Rule::named("isInt"))
            .validate_field("age", Rule::min(0))
            .validate_field("email", Rule::named("isEmail"))
            .build()
    }

    #[test]
    fn test_matches_email_pattern() {
        assert!(matches_pattern("test@example.com", EMAIL));
        assert!(matches_pattern("user.name+tag@domain.org", EMAIL));
        assert!(!matches_pattern("@example.com", EMAIL));
        assert!(!matches_pattern("test@", EMAIL));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        assert!(!matches_pattern("anything", r"[unclosed"));
        assert!(validate_pattern(r"[unclosed").is_some());
        assert!(validate_pattern(r"^\d{4}$").is_none());
    }

    #[test]
    fn test_missing_required_field() {
        let record = Record::new().with("name", "Jim");
        let err = check(&person(), &record);
        assert_eq!(err.len(), 1);
        let age = err.field("age").unwrap();
        assert_eq!(age.failed_rules, vec!["required"]);
        assert_eq!(age.expected_rules, vec!["required", "isInt", "min"]);
        assert_eq!(age.value, Value::Null);
    }

    #[test]
    fn test_failures_coalesce_per_field() {
        let record = Record::new().with("age", -2.5).with("email", "nope");
        let err = check(&person(), &record);
        assert_eq!(err.len(), 2);
        assert_eq!(err.field("age").unwrap().failed_rules, vec!["isInt", "min"]);
        assert_eq!(err.field("email").unwrap().failed_rules, vec!["isEmail"]);
    }

    #[test]
    fn test_optional_rules_skip_null() {
        let record = Record::new().with("age", 30);
        assert!(validate(&person(), &record).is_ok());
    }

    #[test]
    fn test_unknown_rule_name_fails() {
        let d = ModelDescriptor::builder("thing")
            .column("code", SqlType::Text)
            .validate_field("code", Rule::named("isKlingon"))
            .build();
        let err = check(&d, &Record::new().with("code", "x"));
        assert_eq!(err.field("code").unwrap().failed_rules, vec!["isKlingon"]);
    }

    #[test]
    fn test_argument_rules() {
        assert!(len_between(&Value::from("abc"), &[Value::BigInt(1), Value::BigInt(3)]));
        assert!(!len_between(&Value::from("abcd"), &[Value::BigInt(1), Value::BigInt(3)]));
        assert!(len_between(&Value::from("abcd"), &[Value::BigInt(2)]));
        assert!(one_of(&Value::from("b"), &[Value::from("a"), Value::from("b")]));
        assert!(one_of(&Value::BigInt(2), &[Value::Array(vec![Value::Double(2.0)])]));
        assert!(!at_most(&Value::BigInt(11), &[Value::BigInt(10)]));
        assert!(matches_arg(&Value::from("A-1"), &[Value::from(r"^[A-Z]-\d$")]));
    }

    #[test]
    fn test_custom_and_object_validators_share_context() {
        let d = ModelDescriptor::builder("range")
            .column("low", SqlType::BigInt)
            .column("high", SqlType::BigInt)
            .validate_field(
                "low",
                Rule::custom("even", |record, field, ctx| {
                    if record.get(field).and_then(Value::as_i64).is_some_and(|n| n % 2 != 0) {
                        ctx.fail(field, "even");
                    }
                }),
            )
            .validate_with(|record, ctx| {
                let low = record.get("low").and_then(Value::as_i64);
                let high = record.get("high").and_then(Value::as_i64);
                if let (Some(low), Some(high)) = (low, high) {
                    if low > high {
                        ctx.fail("high", "greaterThanLow");
                    }
                }
            })
            .build();

        let err = validate(&d, &Record::new().with("low", 5).with("high", 1)).unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].field, "high");
        assert_eq!(errors[1].expected_rules, vec!["greaterThanLow"]);
        assert_eq!(errors[1].value, Value::BigInt(1));
    }
}
