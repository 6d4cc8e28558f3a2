//! Input/output schema tree and reduction (component C1).

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared shape of a recorded `inputValue`/`outputValue`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Schema {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "decodedType")]
    pub decoded_type: Option<String>,
    /// In `[0, 1]`. A property with importance `0` is dropped by reduction.
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "matchImportance")]
    pub match_importance: Option<f64>,
}

fn is_zero_importance(schema: &Schema) -> bool {
    matches!(schema.match_importance, Some(importance) if importance == 0.0)
}

/// Walk `value` alongside `schema`, omitting object properties whose schema
/// entry has `match_importance == 0`. Single pass, depth-unbounded, array
/// order preserved.
pub fn reduce_value(value: &Value, schema: &Schema) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, val) in map {
                let child_schema = schema.properties.as_ref().and_then(|p| p.get(key));
                if let Some(child_schema) = child_schema {
                    if is_zero_importance(child_schema) {
                        continue;
                    }
                    out.insert(key.clone(), reduce_value(val, child_schema));
                } else {
                    out.insert(key.clone(), val.clone());
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            let item_schema = schema.items.as_deref();
            let reduced: Vec<Value> = items
                .iter()
                .map(|item| match item_schema {
                    Some(s) => reduce_value(item, s),
                    None => item.clone(),
                })
                .collect();
            Value::Array(reduced)
        }
        other => other.clone(),
    }
}

/// Drop `properties[k]` entries whose `match_importance == 0`, recursively.
pub fn reduce_schema(schema: &Schema) -> Schema {
    let properties = schema.properties.as_ref().map(|props| {
        props
            .iter()
            .filter(|(_, child)| !is_zero_importance(child))
            .map(|(key, child)| (key.clone(), reduce_schema(child)))
            .collect()
    });
    let items = schema.items.as_ref().map(|item| Box::new(reduce_schema(item)));
    Schema {
        type_: schema.type_.clone(),
        properties,
        items,
        encoding: schema.encoding.clone(),
        decoded_type: schema.decoded_type.clone(),
        match_importance: schema.match_importance,
    }
}
