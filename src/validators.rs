//! Field-level validators for string and string-list attributes.
//!
//! Each validator checks one value found under `key` and reports problems as
//! error diagnostics attributed to that key. None of them emit warnings.
//!
//! ```
//! use twilio_chat_provider::validators::{list_of_match_string, Validator};
//! use serde_json::json;
//!
//! let events = list_of_match_string(["onMessageSent", "onUserAdded"]);
//! assert!(events.validate(&json!(["onMessageSent"]), "events").is_empty());
//! assert_eq!(events.validate(&json!(["onBogus"]), "events").len(), 1);
//! ```

use std::collections::HashSet;

use serde_json::Value;
use url::Url;

use crate::schema::Diagnostic;

/// A check applied to a single attribute value.
pub trait Validator: Send + Sync {
    /// Validate `value` found under `key`. Returns no diagnostics when valid.
    fn validate(&self, value: &Value, key: &str) -> Vec<Diagnostic>;
}

/// Every element of a list must be a string taken from a fixed set.
#[derive(Debug, Clone)]
pub struct ListOfMatchString {
    valid: HashSet<String>,
}

/// Build a [`ListOfMatchString`] validator.
pub fn list_of_match_string<I, S>(valid: I) -> ListOfMatchString
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ListOfMatchString {
        valid: valid.into_iter().map(Into::into).collect(),
    }
}

impl Validator for ListOfMatchString {
    fn validate(&self, value: &Value, key: &str) -> Vec<Diagnostic> {
        let Some(items) = value.as_array() else {
            return vec![error(key, format!("expected type of {:?} to be List", key))];
        };

        // Reports the first offending element only.
        for item in items {
            let Some(s) = item.as_str() else {
                return vec![error(
                    key,
                    format!(
                        "expected {:?} to only contain string elements, found :{}",
                        key, item
                    ),
                )];
            };
            if !self.valid.contains(s) {
                return vec![error(
                    key,
                    format!("expected {:?} to event names, found {}", key, s),
                )];
            }
        }

        Vec::new()
    }
}

/// A string that must equal one of a fixed set of values. Case-sensitive.
#[derive(Debug, Clone)]
pub struct StringInSlice {
    valid: Vec<String>,
}

/// Build a [`StringInSlice`] validator.
pub fn string_in_slice<I, S>(valid: I) -> StringInSlice
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    StringInSlice {
        valid: valid.into_iter().map(Into::into).collect(),
    }
}

impl Validator for StringInSlice {
    fn validate(&self, value: &Value, key: &str) -> Vec<Diagnostic> {
        match value.as_str() {
            Some(s) if self.valid.iter().any(|v| v == s) => Vec::new(),
            Some(s) => vec![error(
                key,
                format!(
                    "expected {} to be one of {:?}, got {}",
                    key, self.valid, s
                ),
            )],
            None => vec![error(key, format!("expected type of {} to be string", key))],
        }
    }
}

/// A list whose string elements must not repeat.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOfUniqueStrings;

/// Build a [`ListOfUniqueStrings`] validator.
pub fn list_of_unique_strings() -> ListOfUniqueStrings {
    ListOfUniqueStrings
}

impl Validator for ListOfUniqueStrings {
    fn validate(&self, value: &Value, key: &str) -> Vec<Diagnostic> {
        let Some(items) = value.as_array() else {
            return vec![error(key, format!("expected type of {:?} to be List", key))];
        };

        let mut seen = HashSet::new();
        for s in items.iter().filter_map(Value::as_str) {
            if !seen.insert(s) {
                return vec![error(
                    key,
                    format!("{}: duplicate entry - {}", key, s),
                )];
            }
        }
        Vec::new()
    }
}

/// A string that must parse as an absolute `http` or `https` URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsUrlWithHttpOrHttps;

/// Build an [`IsUrlWithHttpOrHttps`] validator.
pub fn is_url_with_http_or_https() -> IsUrlWithHttpOrHttps {
    IsUrlWithHttpOrHttps
}

impl Validator for IsUrlWithHttpOrHttps {
    fn validate(&self, value: &Value, key: &str) -> Vec<Diagnostic> {
        let Some(s) = value.as_str() else {
            return vec![error(key, format!("expected type of {} to be string", key))];
        };
        if s.is_empty() {
            return vec![error(
                key,
                format!("expected {:?} url to not be empty, got {}", key, s),
            )];
        }

        match Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Vec::new(),
            Ok(url) => vec![error(
                key,
                format!(
                    "expected {:?} to have a url with schema of: \"http,https\", got {} ({})",
                    key,
                    s,
                    url.scheme()
                ),
            )],
            Err(e) => vec![error(
                key,
                format!("expected {:?} to be a valid url, got {}: {}", key, s, e),
            )],
        }
    }
}

fn error(key: &str, summary: String) -> Diagnostic {
    Diagnostic::error(summary).with_attribute(key)
}
