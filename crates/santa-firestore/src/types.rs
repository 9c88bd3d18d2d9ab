//! Firestore REST API types and JSON conversion.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{FirestoreError, FirestoreResult};

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, Value>>,
    /// Create time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Update time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document with the given fields.
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Last path segment of the resource name.
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }
}

/// `documents:runQuery` request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl StructuredQuery {
    /// `SELECT * FROM collection WHERE field == value LIMIT limit`.
    pub fn field_equals(collection: &str, field: &str, value: Value, limit: u32) -> Self {
        Self {
            from: vec![CollectionSelector {
                collection_id: collection.to_string(),
            }],
            filter: Some(Filter {
                field_filter: FieldFilter {
                    field: FieldReference {
                        field_path: field.to_string(),
                    },
                    op: "EQUAL".to_string(),
                    value,
                },
            }),
            limit: Some(limit),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub field_filter: FieldFilter,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

/// One element of the streamed `runQuery` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponseItem {
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub read_time: Option<String>,
}

/// Convert a JSON value into a Firestore value.
pub fn json_to_value(json: &serde_json::Value) -> Value {
    use serde_json::Value as J;
    match json {
        J::Null => Value::NullValue(()),
        J::Bool(b) => Value::BooleanValue(*b),
        J::Number(n) => match n.as_i64() {
            Some(i) => Value::IntegerValue(i.to_string()),
            None => Value::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        J::String(s) => Value::StringValue(s.clone()),
        J::Array(items) => Value::ArrayValue(ArrayValue {
            values: Some(items.iter().map(json_to_value).collect()),
        }),
        J::Object(map) => Value::MapValue(MapValue {
            fields: Some(
                map.iter()
                    .map(|(k, v)| (k.clone(), json_to_value(v)))
                    .collect(),
            ),
        }),
    }
}

/// Convert a Firestore value back into JSON.
pub fn value_to_json(value: &Value) -> FirestoreResult<serde_json::Value> {
    use serde_json::Value as J;
    Ok(match value {
        Value::NullValue(()) => J::Null,
        Value::BooleanValue(b) => J::Bool(*b),
        Value::IntegerValue(s) => {
            let i: i64 = s
                .parse()
                .map_err(|_| FirestoreError::serialization(format!("bad integer {}", s)))?;
            J::from(i)
        }
        Value::DoubleValue(d) => serde_json::Number::from_f64(*d)
            .map(J::Number)
            .unwrap_or(J::Null),
        Value::TimestampValue(s)
        | Value::StringValue(s)
        | Value::BytesValue(s)
        | Value::ReferenceValue(s) => J::String(s.clone()),
        Value::ArrayValue(arr) => J::Array(
            arr.values
                .iter()
                .flatten()
                .map(value_to_json)
                .collect::<FirestoreResult<_>>()?,
        ),
        Value::MapValue(map) => J::Object(fields_to_json(map.fields.as_ref())?),
    })
}

/// Encode a serializable struct as document fields.
pub fn to_fields<T: Serialize>(value: &T) -> FirestoreResult<HashMap<String, Value>> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), json_to_value(v)))
            .collect()),
        other => Err(FirestoreError::serialization(format!(
            "expected an object, got {}",
            other
        ))),
    }
}

/// Decode document fields into a struct.
pub fn from_fields<T: serde::de::DeserializeOwned>(
    fields: Option<&HashMap<String, Value>>,
) -> FirestoreResult<T> {
    let json = serde_json::Value::Object(fields_to_json(fields)?);
    Ok(serde_json::from_value(json)?)
}

fn fields_to_json(
    fields: Option<&HashMap<String, Value>>,
) -> FirestoreResult<serde_json::Map<String, serde_json::Value>> {
    fields
        .into_iter()
        .flatten()
        .map(|(k, v)| Ok((k.clone(), value_to_json(v)?)))
        .collect()
}
