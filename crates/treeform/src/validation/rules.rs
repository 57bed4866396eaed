#![forbid(unsafe_code)]

//! Built-in rules for common field checks.
//!
//! Rules are synchronous and work on JSON values: text rules look at strings,
//! length rules also count sequence elements, [`Range`] looks at numbers.
//! Values of a type a rule does not understand pass, except for [`Required`],
//! which fails on anything blank.
//!
//! Every rule converts into a [`Validator`]:
//!
//! ```rust
//! use treeform::validation::Validator;
//! use treeform::validation::rules::{Email, MinLength, Required};
//!
//! let validators: Vec<Validator> = vec![
//!     Required::new().into(),
//!     MinLength::new(3).into(),
//!     Email::new().with_message("Not an email").into(),
//! ];
//! # let _ = validators;
//! ```

use serde_json::Value;

use super::validator::{Validator, Verdict};

/// A synchronous check over a JSON value.
pub trait Rule: Send + Sync {
    /// Check `value`, returning the messages it earns.
    fn check(&self, value: &Value) -> Verdict;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

impl<R: Rule + 'static> From<R> for Validator {
    fn from(rule: R) -> Self {
        let name = rule.name();
        Validator::new(move |value: &Value| rule.check(value)).named(name)
    }
}

/// Substitute `{key}` placeholders in a message template.
fn interpolate(template: &str, params: &[(&str, String)]) -> String {
    params.iter().fold(template.to_owned(), |message, (key, value)| {
        message.replace(&format!("{{{key}}}"), value)
    })
}

fn char_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Required
// ---------------------------------------------------------------------------

/// Fails on missing, `null`, blank strings and empty sequences or mappings.
///
/// Whitespace-only strings count as blank unless [`allow_whitespace`] is set.
///
/// [`allow_whitespace`]: Required::allow_whitespace
#[derive(Debug, Clone)]
pub struct Required {
    allow_whitespace: bool,
    message: String,
}

impl Default for Required {
    fn default() -> Self {
        Self {
            allow_whitespace: false,
            message: "Value is required".to_owned(),
        }
    }
}

impl Required {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat whitespace-only strings as present.
    #[must_use]
    pub fn allow_whitespace(mut self) -> Self {
        self.allow_whitespace = true;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn is_blank(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) if self.allow_whitespace => s.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }
}

impl Rule for Required {
    fn check(&self, value: &Value) -> Verdict {
        if self.is_blank(value) {
            Verdict::fail(self.message.as_str())
        } else {
            Verdict::pass()
        }
    }

    fn name(&self) -> &'static str {
        "required"
    }
}

// ---------------------------------------------------------------------------
// Length
// ---------------------------------------------------------------------------

/// Fails when a string has fewer than `min` characters (or a sequence fewer
/// than `min` elements). Empty strings pass; pair with [`Required`].
#[derive(Debug, Clone)]
pub struct MinLength {
    min: usize,
    message: String,
}

impl MinLength {
    #[must_use]
    pub fn new(min: usize) -> Self {
        Self {
            min,
            message: "Must be at least {min} characters".to_owned(),
        }
    }

    /// Override the message; `{min}` and `{actual}` are substituted.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Rule for MinLength {
    fn check(&self, value: &Value) -> Verdict {
        match char_len(value) {
            Some(len) if len > 0 && len < self.min => Verdict::fail(interpolate(
                &self.message,
                &[("min", self.min.to_string()), ("actual", len.to_string())],
            )),
            _ => Verdict::pass(),
        }
    }

    fn name(&self) -> &'static str {
        "min_length"
    }
}

/// Fails when a string has more than `max` characters (or a sequence more
/// than `max` elements).
#[derive(Debug, Clone)]
pub struct MaxLength {
    max: usize,
    message: String,
}

impl MaxLength {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self {
            max,
            message: "Must be at most {max} characters".to_owned(),
        }
    }

    /// Override the message; `{max}` and `{actual}` are substituted.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Rule for MaxLength {
    fn check(&self, value: &Value) -> Verdict {
        match char_len(value) {
            Some(len) if len > self.max => Verdict::fail(interpolate(
                &self.message,
                &[("max", self.max.to_string()), ("actual", len.to_string())],
            )),
            _ => Verdict::pass(),
        }
    }

    fn name(&self) -> &'static str {
        "max_length"
    }
}

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// Plain substring or exact-match check, no regex engine.
#[derive(Debug, Clone)]
pub struct Pattern {
    pattern: String,
    exact: bool,
    message: String,
}

impl Pattern {
    /// Pass when the string contains `pattern`.
    #[must_use]
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            exact: false,
            message: "Invalid format".to_owned(),
        }
    }

    /// Pass when the string equals `pattern`.
    #[must_use]
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            exact: true,
            ..Self::contains(pattern)
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Rule for Pattern {
    fn check(&self, value: &Value) -> Verdict {
        let Some(text) = value.as_str().filter(|s| !s.is_empty()) else {
            return Verdict::pass();
        };
        let matches = if self.exact {
            text == self.pattern
        } else {
            text.contains(&self.pattern)
        };
        if matches {
            Verdict::pass()
        } else {
            Verdict::fail(self.message.as_str())
        }
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

// ---------------------------------------------------------------------------
// Email / Url
// ---------------------------------------------------------------------------

/// Heuristic email check: `local@domain.tld` with a TLD of two or more
/// characters. Blank strings pass.
#[derive(Debug, Clone)]
pub struct Email {
    message: String,
}

impl Default for Email {
    fn default() -> Self {
        Self {
            message: "Invalid email address".to_owned(),
        }
    }
}

impl Email {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn looks_valid(text: &str) -> bool {
        let Some((local, domain)) = text.split_once('@') else {
            return false;
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') {
            return false;
        }
        let labels: Vec<&str> = domain.split('.').collect();
        !labels.iter().any(|label| label.is_empty())
            && labels.last().is_some_and(|tld| tld.len() >= 2)
    }
}

impl Rule for Email {
    fn check(&self, value: &Value) -> Verdict {
        match value.as_str().map(str::trim) {
            Some(text) if !text.is_empty() && !Self::looks_valid(text) => {
                Verdict::fail(self.message.as_str())
            }
            _ => Verdict::pass(),
        }
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

/// Heuristic URL check: `http://` or `https://` followed by something.
#[derive(Debug, Clone, Copy, Default)]
pub struct Url {
    require_https: bool,
}

impl Url {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require_https(mut self) -> Self {
        self.require_https = true;
        self
    }
}

impl Rule for Url {
    fn check(&self, value: &Value) -> Verdict {
        let Some(text) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Verdict::pass();
        };
        let has_rest = |scheme: &str| text.strip_prefix(scheme).is_some_and(|rest| !rest.is_empty());
        if self.require_https {
            if has_rest("https://") {
                Verdict::pass()
            } else {
                Verdict::fail("Invalid URL (must use HTTPS)")
            }
        } else if has_rest("http://") || has_rest("https://") {
            Verdict::pass()
        } else {
            Verdict::fail("Invalid URL")
        }
    }

    fn name(&self) -> &'static str {
        "url"
    }
}

// ---------------------------------------------------------------------------
// Range
// ---------------------------------------------------------------------------

/// Inclusive numeric bounds. Non-numbers pass.
#[derive(Debug, Clone)]
pub struct Range {
    min: f64,
    max: f64,
    message: String,
}

impl Range {
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            message: "Must be between {min} and {max}".to_owned(),
        }
    }

    /// Override the message; `{min}`, `{max}` and `{actual}` are substituted.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl Rule for Range {
    fn check(&self, value: &Value) -> Verdict {
        match value.as_f64() {
            Some(number) if number < self.min || number > self.max => Verdict::fail(interpolate(
                &self.message,
                &[
                    ("min", self.min.to_string()),
                    ("max", self.max.to_string()),
                    ("actual", number.to_string()),
                ],
            )),
            _ => Verdict::pass(),
        }
    }

    fn name(&self) -> &'static str {
        "range"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(rule: &impl Rule, value: Value) -> Vec<String> {
        rule.check(&value).into_messages()
    }

    #[test]
    fn required_fails_on_blank_values() {
        let rule = Required::new();
        for blank in [json!(null), json!(""), json!("   "), json!([]), json!({})] {
            assert_eq!(messages(&rule, blank.clone()), ["Value is required"], "{blank}");
        }
        for present in [json!("x"), json!(0), json!(false), json!([1])] {
            assert!(messages(&rule, present.clone()).is_empty(), "{present}");
        }
    }

    #[test]
    fn required_whitespace_allowed() {
        assert!(messages(&Required::new().allow_whitespace(), json!("  ")).is_empty());
    }

    #[test]
    fn min_length_boundary_and_unicode() {
        let rule = MinLength::new(3);
        assert_eq!(messages(&rule, json!("ab")), ["Must be at least 3 characters"]);
        assert!(messages(&rule, json!("abc")).is_empty());
        assert!(messages(&rule, json!("日本語")).is_empty());
        assert!(messages(&rule, json!("")).is_empty());
    }

    #[test]
    fn max_length_counts_sequence_elements() {
        let rule = MaxLength::new(2).with_message("{actual} is more than {max}");
        assert_eq!(messages(&rule, json!([1, 2, 3])), ["3 is more than 2"]);
        assert!(messages(&rule, json!("ab")).is_empty());
    }

    #[test]
    fn pattern_contains_and_exact() {
        assert!(messages(&Pattern::contains("@"), json!("a@b")).is_empty());
        assert_eq!(messages(&Pattern::contains("@"), json!("ab")), ["Invalid format"]);
        assert_eq!(
            messages(&Pattern::exact("yes").with_message("Type yes"), json!("yes!")),
            ["Type yes"]
        );
    }

    #[test]
    fn email_heuristics() {
        let rule = Email::new();
        for valid in ["user@example.com", "a.b@sub.example.org", ""] {
            assert!(messages(&rule, json!(valid)).is_empty(), "{valid}");
        }
        for invalid in ["something_at_something.com", "@x.com", "user@", "user@host", "u@x.c", "u@x..com"] {
            assert_eq!(messages(&rule, json!(invalid)), ["Invalid email address"], "{invalid}");
        }
    }

    #[test]
    fn url_scheme_checks() {
        assert!(messages(&Url::new(), json!("http://x.io")).is_empty());
        assert_eq!(messages(&Url::new(), json!("ftp://x.io")), ["Invalid URL"]);
        assert_eq!(
            messages(&Url::new().require_https(), json!("http://x.io")),
            ["Invalid URL (must use HTTPS)"]
        );
        assert_eq!(messages(&Url::new(), json!("https://")), ["Invalid URL"]);
    }

    #[test]
    fn range_is_inclusive() {
        let rule = Range::new(1.0, 10.0);
        assert!(messages(&rule, json!(1)).is_empty());
        assert!(messages(&rule, json!(10)).is_empty());
        assert_eq!(messages(&rule, json!(11)), ["Must be between 1 and 10"]);
        assert!(messages(&rule, json!("eleven")).is_empty());
    }

    #[test]
    fn rules_convert_into_named_validators() {
        let validator: Validator = Required::new().into();
        assert_eq!(validator.name(), "required");
        assert!(validator.is_sync());
        assert_eq!(
            validator.evaluate_now(&json!("")),
            Some(vec!["Value is required".to_owned()])
        );
    }
}
