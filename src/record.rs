//! Input collaborators: the current record and the stream it comes from.
//!
//! The engine only ever asks a record for named fields. Storage formats live
//! behind these traits; `JsonRecord` and `MemorySource` are the in-memory
//! versions used by the binary and the tests.

use std::rc::Rc;

use serde_json::{Map, Value};

use crate::errors::{Error, Result};

/// One unit of input.
pub trait Record {
    /// Reads a named field; `None` if the record has no such field.
    fn field(&self, name: &str) -> Option<Value>;

    /// Element count of an array-like group, read from its `<group>_n` field.
    fn count(&self, group: &str) -> Option<usize> {
        self.field(&format!("{group}_n"))
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
    }
}

/// An indexable stream of records.
pub trait RecordSource {
    fn entry_count(&self) -> usize;

    /// Loads entry `index`. `Ok(None)` once the stream is exhausted.
    fn entry(&mut self, index: usize) -> Result<Option<Rc<dyn Record>>>;
}

/// A record backed by a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonRecord {
    fields: Map<String, Value>,
}

impl JsonRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl TryFrom<Value> for JsonRecord {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::Source(format!("record must be a JSON object, got {other}"))),
        }
    }
}

impl Record for JsonRecord {
    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }
}

/// Records held in memory.
#[derive(Clone, Default)]
pub struct MemorySource {
    records: Vec<Rc<JsonRecord>>,
}

impl MemorySource {
    pub fn new(records: Vec<JsonRecord>) -> Self {
        Self {
            records: records.into_iter().map(Rc::new).collect(),
        }
    }

    /// Parses a JSON array of objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let Value::Array(items) = value else {
            return Err(Error::Source("expected a JSON array of records".into()));
        };
        let records = items
            .into_iter()
            .map(JsonRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(records))
    }

    /// One record per value, each holding a single field `name`.
    pub fn single_field(name: &str, values: impl IntoIterator<Item = Value>) -> Self {
        Self::new(
            values
                .into_iter()
                .map(|v| {
                    let mut fields = Map::new();
                    fields.insert(name.to_string(), v);
                    JsonRecord::new(fields)
                })
                .collect(),
        )
    }
}

impl RecordSource for MemorySource {
    fn entry_count(&self) -> usize {
        self.records.len()
    }

    fn entry(&mut self, index: usize) -> Result<Option<Rc<dyn Record>>> {
        Ok(self
            .records
            .get(index)
            .map(|r| Rc::clone(r) as Rc<dyn Record>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_array_of_objects() {
        let mut src = MemorySource::from_json(r#"[{"mu_n": 2}, {"mu_n": 0}]"#).unwrap();
        assert_eq!(src.entry_count(), 2);
        let first = src.entry(0).unwrap().unwrap();
        assert_eq!(first.count("mu"), Some(2));
        assert_eq!(first.field("missing"), None);
        assert!(src.entry(2).unwrap().is_none());
    }

    #[test]
    fn rejects_non_object_records() {
        assert!(MemorySource::from_json("[1, 2]").is_err());
        assert!(MemorySource::from_json(r#"{"n": 1}"#).is_err());
    }

    #[test]
    fn single_field_records() {
        let mut src = MemorySource::single_field("n", [json!(1), json!(3)]);
        let rec = src.entry(1).unwrap().unwrap();
        assert_eq!(rec.field("n"), Some(json!(3)));
    }
}
