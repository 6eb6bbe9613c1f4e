//! Schema validation.
//!
//! Checks a `serde_json::Value` against a [`Schema`] and reports problems as
//! [`Diagnostic`]s with dotted attribute paths (`webhooks.0.method`). Field-level
//! rules such as allowed values live in [`crate::validators`].
//!
//! # Example
//!
//! ```
//! use twilio_chat_provider::schema::{Attribute, Schema};
//! use twilio_chat_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("friendly_name", Attribute::required_string())
//!     .with_attribute("typing_indicator_timeout", Attribute::optional_int64());
//!
//! assert!(validate(&schema, &json!({"friendly_name": "support"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({
//!     "friendly_name": "support",
//!     "typing_indicator_timeout": "five"
//! }));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("typing_indicator_timeout"));
//! ```

use crate::schema::{Attribute, AttributeType, Block, Diagnostic, NestedBlock, Schema};
use serde_json::Value;
use std::collections::HashMap;

/// Validate a JSON value against a schema.
///
/// Returns an empty list when the value is valid.
///
/// - Required attributes must be present and non-null
/// - Computed-only attributes are skipped
/// - Attribute types must match the schema
/// - Nested blocks are validated recursively with min/max item constraints
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], but as a `Result`.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            let diag = Diagnostic::error("Expected object")
                .with_detail(format!("Got {}", value_type_name(value)));
            diagnostics.push(if path.is_empty() {
                diag
            } else {
                diag.with_attribute(path)
            });
            return;
        },
    };

    for (name, attr) in &block.attributes {
        validate_attribute(attr, obj.get(name), &join_path(path, name), diagnostics);
    }

    for (name, nested) in &block.blocks {
        validate_nested_block(nested, obj.get(name), &join_path(path, name), diagnostics);
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.flags.is_computed_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => match value.as_array() {
            Some(arr) => {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "list", value)),
        },
        AttributeType::Object(attrs) => match value.as_object() {
            Some(obj) => validate_object_type(attrs, obj, path, diagnostics),
            None => diagnostics.push(type_error(path, "object", value)),
        },
    }
}

fn validate_object_type(
    attrs: &HashMap<String, AttributeType>,
    obj: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Object members carry no required/optional flags; presence is not enforced.
    for (name, attr_type) in attrs {
        if let Some(value) = obj.get(name).filter(|v| !v.is_null()) {
            validate_attribute_type(attr_type, value, &join_path(path, name), diagnostics);
        }
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let arr = match value {
        None | Some(Value::Null) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
            return;
        },
        Some(Value::Array(arr)) => arr,
        Some(v) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
            return;
        },
    };

    let len = arr.len() as u32;
    if len < nested.min_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' requires at least {} item(s), got {}",
                path, nested.min_items, len
            ))
            .with_attribute(path),
        );
    }
    if nested.max_items > 0 && len > nested.max_items {
        diagnostics.push(
            Diagnostic::error(format!(
                "Block '{}' allows at most {} item(s), got {}",
                path, nested.max_items, len
            ))
            .with_attribute(path),
        );
    }

    for (i, item) in arr.iter().enumerate() {
        validate_block(&nested.block, item, &format!("{}.{}", path, i), diagnostics);
    }
}

pub(crate) fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64().is_some_and(|f| {
                    f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
                })
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn service_like_schema() -> Schema {
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("friendly_name", Attribute::required_string())
            .with_block(
                "limits",
                NestedBlock::list_of_one(
                    Block::new()
                        .with_attribute("channel_members", Attribute::optional_int64())
                        .with_attribute("user_channels", Attribute::optional_int64()),
                ),
            )
            .with_block(
                "webhooks",
                NestedBlock::list_of_one(
                    Block::new()
                        .with_attribute("events", Attribute::optional_string_list())
                        .with_attribute("method", Attribute::optional_string()),
                ),
            )
    }

    #[test]
    fn test_valid_config() {
        let diagnostics = validate(
            &service_like_schema(),
            &json!({
                "friendly_name": "support",
                "limits": [{"channel_members": 100, "user_channels": 250}],
                "webhooks": [{"events": ["onMessageSent"], "method": "POST"}]
            }),
        );
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
    }

    #[test]
    fn test_missing_required_attribute() {
        let diagnostics = validate(&service_like_schema(), &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("friendly_name"));

        let diagnostics = validate(&service_like_schema(), &json!({"friendly_name": null}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_computed_attribute_skipped() {
        let diagnostics = validate(
            &service_like_schema(),
            &json!({"friendly_name": "support", "id": 42}),
        );
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_int64_accepts_integral_floats() {
        let schema = service_like_schema();
        let ok = json!({"friendly_name": "s", "limits": [{"channel_members": 100.0}]});
        assert!(validate(&schema, &ok).is_empty());

        let bad = json!({"friendly_name": "s", "limits": [{"channel_members": 100.5}]});
        let diagnostics = validate(&schema, &bad);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("limits.0.channel_members")
        );
    }

    #[test]
    fn test_list_of_one_rejects_second_item() {
        let diagnostics = validate(
            &service_like_schema(),
            &json!({
                "friendly_name": "support",
                "limits": [{"channel_members": 1}, {"channel_members": 2}]
            }),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at most 1"));
    }

    #[test]
    fn test_block_must_be_list() {
        let diagnostics = validate(
            &service_like_schema(),
            &json!({"friendly_name": "support", "limits": {"channel_members": 1}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_list_element_types() {
        let diagnostics = validate(
            &service_like_schema(),
            &json!({"friendly_name": "support", "webhooks": [{"events": ["onUserAdded", 7]}]}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("webhooks.0.events.1")
        );
    }

    #[test]
    fn test_object_attribute_type() {
        let schema = Schema::v0().with_attribute(
            "service",
            Attribute::new(
                AttributeType::object([
                    ("sid", AttributeType::String),
                    ("user_channels", AttributeType::Int64),
                ]),
                crate::schema::AttributeFlags::optional(),
            ),
        );

        assert!(validate(&schema, &json!({"service": {"sid": "IS1"}})).is_empty());
        let diagnostics = validate(&schema, &json!({"service": {"user_channels": "ten"}}));
        assert_eq!(
            diagnostics[0].attribute.as_deref(),
            Some("service.user_channels")
        );
    }

    #[test]
    fn test_min_items() {
        let schema = Schema::v0().with_block(
            "roles",
            NestedBlock::list_of_one(Block::new()).with_min_items(1),
        );
        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("at least 1"));
    }

    #[test]
    fn test_validate_result_and_root_type() {
        let schema = service_like_schema();
        assert!(validate_result(&schema, &json!({"friendly_name": "s"})).is_ok());

        let err = validate_result(&schema, &json!("not an object")).unwrap_err();
        assert_eq!(err.len(), 1);
        assert!(err[0].summary.contains("Expected object"));
        assert!(err[0].attribute.is_none());
    }
}
