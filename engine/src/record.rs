//! Record types exchanged with the codec.

use crate::{
    error::Result,
    field::{CREATED, ID, UPDATED},
    value::{parse_datetime, FileUpload, FromValue},
    Error, RecordMeta, Value,
};
use serde::de::DeserializeOwned;
use serde_json::Map;
use std::collections::BTreeMap;

/// A typed record: system fields plus user-declared attribute values.
///
/// An attribute that is not set is absent from the value map; there is no
/// separate "explicitly empty" state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub meta: RecordMeta,
    values: BTreeMap<String, Value>,
}

impl Record {
    /// Create an empty, unsaved record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set an attribute value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Set an attribute when `value` is present, clear it otherwise.
    pub fn set_opt<V: Into<Value>>(&mut self, name: impl Into<String>, value: Option<V>) {
        let name = name.into();
        match value {
            Some(value) => self.set(name, value),
            None => {
                self.values.remove(&name);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate attribute values in name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Take a required attribute, converting it to `T`.
    pub fn take<T: FromValue>(&mut self, name: &str) -> Result<T> {
        let value = self.values.remove(name).ok_or_else(|| Error::missing(name))?;
        T::from_value(name, value)
    }

    /// Take an optional attribute, converting it to `T`.
    pub fn take_opt<T: FromValue>(&mut self, name: &str) -> Result<Option<T>> {
        self.values
            .remove(name)
            .map(|value| T::from_value(name, value))
            .transpose()
    }

    /// Take an attribute through its JSON form into any deserializable type.
    ///
    /// Used for enums, lists and nested objects.
    pub fn take_json<T: DeserializeOwned>(&mut self, name: &str) -> Result<Option<T>> {
        let Some(value) = self.values.remove(name) else {
            return Ok(None);
        };
        let json = <serde_json::Value as FromValue>::from_value(name, value)?;
        serde_json::from_value(json)
            .map(Some)
            .map_err(|e| Error::invalid_format(name, "value", e.to_string()))
    }
}

/// The untyped payload exchanged with the backend: JSON-compatible fields
/// plus any binary attachments for file fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WireRecord {
    fields: Map<String, serde_json::Value>,
    files: BTreeMap<String, FileUpload>,
}

impl WireRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style JSON field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Attach a file payload for a file field.
    pub fn attach(&mut self, name: impl Into<String>, upload: FileUpload) {
        self.files.insert(name.into(), upload);
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, serde_json::Value> {
        &self.fields
    }

    pub fn files(&self) -> &BTreeMap<String, FileUpload> {
        &self.files
    }

    /// Whether any file attachments must be sent.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.files.is_empty()
    }

    /// The record id, empty when absent.
    pub fn id(&self) -> &str {
        self.fields.get(ID).and_then(|v| v.as_str()).unwrap_or("")
    }

    /// Read the system fields from a backend response.
    pub fn meta(&self) -> RecordMeta {
        let date = |name: &str| {
            self.fields
                .get(name)
                .and_then(|v| v.as_str())
                .and_then(parse_datetime)
        };
        RecordMeta {
            id: self.id().to_string(),
            created: date(CREATED),
            updated: date(UPDATED),
        }
    }
}

impl From<Map<String, serde_json::Value>> for WireRecord {
    fn from(fields: Map<String, serde_json::Value>) -> Self {
        Self {
            fields,
            files: BTreeMap::new(),
        }
    }
}

impl TryFrom<serde_json::Value> for WireRecord {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(fields) => Ok(fields.into()),
            _ => Err(Error::Validation(
                crate::error::ValidationError::InvalidPayload("record must be an object".into()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn set_and_take() {
        let mut record = Record::new()
            .with("name", "Alice")
            .with("count", 3)
            .with("tags", json!(["a", "b"]));

        assert!(record.contains("name"));
        assert_eq!(record.take::<String>("name").unwrap(), "Alice");
        assert!(!record.contains("name"));
        assert_eq!(record.take_opt::<i64>("count").unwrap(), Some(3));
        assert_eq!(record.take_opt::<i64>("count").unwrap(), None);
        assert_eq!(
            record.take_json::<Vec<String>>("tags").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert!(matches!(
            record.take::<String>("name"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn set_opt_clears() {
        let mut record = Record::new().with("nick", "al");
        record.set_opt::<String>("nick", None);
        assert!(record.get("nick").is_none());
    }

    #[test]
    fn wire_meta() {
        let wire = WireRecord::try_from(json!({
            "id": "abc123",
            "created": "2024-01-02 03:04:05.000Z",
            "updated": "2024-01-03 03:04:05.000Z",
            "name": "x"
        }))
        .unwrap();

        let meta = wire.meta();
        assert_eq!(meta.id, "abc123");
        assert_eq!(
            meta.created,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert_eq!(
            meta.updated,
            Some(Utc.with_ymd_and_hms(2024, 1, 3, 3, 4, 5).unwrap())
        );
    }

    #[test]
    fn wire_rejects_non_object() {
        assert!(WireRecord::try_from(json!([1, 2])).is_err());
    }

    #[test]
    fn attachments() {
        let mut wire = WireRecord::new().with("name", "x");
        assert!(!wire.has_files());
        wire.attach("photo", FileUpload::new("a.png", vec![1, 2, 3]));
        assert!(wire.has_files());
        assert_eq!(wire.files()["photo"].data, vec![1, 2, 3]);
    }
}
