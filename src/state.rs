//! Helpers for reading resource state and computing plans.
//!
//! State is a JSON object keyed by attribute name. Grouped settings are lists
//! holding at most one object, so "the block" means the first list item.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::schema::{Block, Schema};
use crate::types::{AttributeChange, PlanResult};

/// Prior and planned state of one resource, for building partial updates.
#[derive(Debug, Clone, Copy)]
pub struct ResourceData<'a> {
    prior: Option<&'a Value>,
    planned: &'a Value,
}

impl<'a> ResourceData<'a> {
    /// Wrap planned state, with prior state when the resource already exists.
    pub fn new(prior: Option<&'a Value>, planned: &'a Value) -> Self {
        Self { prior, planned }
    }

    /// The remote SID, taken from planned state and falling back to prior state.
    pub fn id(&self) -> Option<&'a str> {
        str_field(self.planned, "id").or_else(|| self.prior.and_then(|p| str_field(p, "id")))
    }

    /// True when `key` differs between prior and planned state.
    ///
    /// Null, absent and empty lists compare equal, at any depth inside block
    /// items. Without prior state every set attribute counts as changed.
    pub fn has_change(&self, key: &str) -> bool {
        let before = self.prior.and_then(|p| normalized(p, key));
        let after = normalized(self.planned, key);
        before != after
    }

    /// The planned value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.planned.get(key).filter(|v| !v.is_null())
    }

    /// The planned value of `key` as a string.
    pub fn get_str(&self, key: &str) -> Option<&'a str> {
        str_field(self.planned, key)
    }

    /// The planned value of the list-of-one block `key`.
    pub fn block(&self, key: &str) -> Option<&'a Map<String, Value>> {
        first_item(self.planned, key)
    }
}

/// The first object of the list stored under `key`.
pub fn first_item<'v>(value: &'v Value, key: &str) -> Option<&'v Map<String, Value>> {
    value
        .get(key)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(Value::as_object)
}

/// True when `key` holds a list with at least one element.
pub fn has_items(value: &Value, key: &str) -> bool {
    value
        .get(key)
        .and_then(Value::as_array)
        .is_some_and(|items| !items.is_empty())
}

/// A string field of a JSON object.
pub fn str_field<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
    value.get(key).and_then(Value::as_str)
}

/// Typed accessors for the attributes of a block item. Absent and null
/// attributes read as `None`.
pub trait BlockItem {
    /// A string attribute.
    fn string(&self, key: &str) -> Option<String>;
    /// An integer attribute.
    fn int(&self, key: &str) -> Option<i64>;
    /// A boolean attribute.
    fn boolean(&self, key: &str) -> Option<bool>;
    /// A list-of-strings attribute. Non-string elements are skipped.
    fn strings(&self, key: &str) -> Option<Vec<String>>;
    /// The item of a nested list-of-one block.
    fn nested(&self, key: &str) -> Option<&Map<String, Value>>;
}

impl BlockItem for Map<String, Value> {
    fn string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::as_str).map(String::from)
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        })
    }

    fn boolean(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    fn strings(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
    }

    fn nested(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_object)
    }
}

/// Wrap a block item in the list-of-one encoding. An item with no
/// attributes becomes an empty list.
pub fn list_of_one(item: Map<String, Value>) -> Value {
    if item.is_empty() {
        Value::Array(Vec::new())
    } else {
        Value::Array(vec![Value::Object(item)])
    }
}

/// Insert `value` under `key` when it is set.
pub fn insert_opt<T: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.into());
    }
}

/// Format a Twilio timestamp as RFC 3339 (`2015-07-30T20:00:00Z`).
pub fn format_date(date: Option<&DateTime<Utc>>) -> Value {
    date.map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .unwrap_or(Value::Null)
}

fn normalized(value: &Value, key: &str) -> Option<Value> {
    value.get(key).and_then(normalize)
}

/// Drop null values, empty lists and objects left empty, recursively.
fn normalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.iter().filter_map(normalize).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        },
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k.clone(), v)))
                .collect();
            (!map.is_empty()).then_some(Value::Object(map))
        },
        other => Some(other.clone()),
    }
}

/// Fill the items of `block`'s nested blocks in `proposed` from `prior`.
///
/// Only blocks the proposal configures with an item are touched.
fn carry_block_items(
    block: &Block,
    prior: &Map<String, Value>,
    proposed: &mut Map<String, Value>,
) {
    for (name, nested) in &block.blocks {
        let Some(prior_item) = prior
            .get(name)
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(Value::as_object)
        else {
            continue;
        };
        let Some(item) = proposed
            .get_mut(name)
            .and_then(Value::as_array_mut)
            .and_then(|items| items.first_mut())
            .and_then(Value::as_object_mut)
        else {
            continue;
        };
        fill_unset(&nested.block, prior_item, item);
    }
}

/// Copy attributes and nested blocks that `item` leaves unset from `prior`.
fn fill_unset(block: &Block, prior: &Map<String, Value>, item: &mut Map<String, Value>) {
    let unset_keys = block.attributes.keys().chain(block.blocks.keys());
    for name in unset_keys {
        if item.get(name).and_then(normalize).is_some() {
            continue;
        }
        if let Some(value) = prior.get(name).filter(|v| !v.is_null()) {
            item.insert(name.clone(), value.clone());
        }
    }
    carry_block_items(block, prior, item);
}

/// Diff prior state against proposed state over the schema's top-level
/// attributes and blocks.
///
/// Computed-only attributes are copied from prior state on update and left
/// null on create. Inside a configured block item, attributes the proposal
/// leaves unset keep their prior value. A null proposal plans a destroy.
pub fn plan(schema: &Schema, prior: Option<&Value>, proposed: &Value) -> PlanResult {
    let mut keys: Vec<&str> = schema
        .block
        .attributes
        .keys()
        .chain(schema.block.blocks.keys())
        .map(String::as_str)
        .collect();
    keys.sort_unstable();

    if proposed.is_null() {
        let changes = prior
            .map(|prior| {
                keys.iter()
                    .filter_map(|key| {
                        normalized(prior, key).map(|v| AttributeChange::removed(*key, v))
                    })
                    .collect()
            })
            .unwrap_or_default();
        return PlanResult::with_changes(Value::Null, changes, false);
    }

    let mut planned = proposed.as_object().cloned().unwrap_or_default();
    for name in schema.computed_attributes() {
        let value = prior
            .and_then(|p| p.get(name))
            .cloned()
            .unwrap_or(Value::Null);
        planned.insert(name.to_string(), value);
    }
    if let Some(prior) = prior.and_then(Value::as_object) {
        carry_block_items(&schema.block, prior, &mut planned);
    }
    let planned = Value::Object(planned);

    let data = ResourceData::new(prior, &planned);
    let changes: Vec<AttributeChange> = keys
        .into_iter()
        .filter(|key| data.has_change(key))
        .map(|key| {
            let before = prior.and_then(|p| normalized(p, key));
            let after = normalized(&planned, key);
            AttributeChange::new(key, before, after)
        })
        .collect();

    if changes.is_empty() {
        PlanResult::no_change(planned)
    } else {
        PlanResult::with_changes(planned, changes, false)
    }
}
