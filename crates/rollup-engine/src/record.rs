use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

use crate::value::Value;

/// One row of tabular input: an ordered mapping from field name to [`Value`].
///
/// Field order is insertion order. Inserting a name that already exists replaces the value in
/// place. Rows are narrow (a handful of columns), so lookups scan linearly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Sets `name` to `value`, returning the previous value if the field already existed.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    /// Appends a field without looking for an existing one with the same name.
    ///
    /// The caller guarantees `name` is not already present, e.g. because the names come from a
    /// de-duplicated header row.
    pub fn push_unique(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Value at `name`, or [`Value::Blank`] when the record does not carry the field.
    pub fn get_or_blank(&self, name: &str) -> &Value {
        const BLANK: &Value = &Value::Blank;
        self.get(name).unwrap_or(BLANK)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Record {
    fn from(fields: [(K, V); N]) -> Self {
        fields.into_iter().collect()
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = Record;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object of scalar fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
        let mut record = Record::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, value)) = access.next_entry::<String, Value>()? {
            record.insert(name, value);
        }
        Ok(record)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn insert_replaces_in_place_and_keeps_order() {
        let mut record = Record::from([("a", Value::from(1)), ("b", Value::from("x"))]);
        assert_eq!(record.insert("a", 2), Some(Value::from(1)));
        assert_eq!(record.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(record.get("a"), Some(&Value::from(2)));
    }

    #[test]
    fn push_unique_appends_in_order() {
        let mut record = Record::with_capacity(2);
        record.push_unique("b", 1);
        record.push_unique("a", "x");
        assert_eq!(
            record,
            Record::from([("b", Value::from(1)), ("a", Value::from("x"))])
        );
    }

    #[test]
    fn missing_fields_read_as_blank() {
        let record = Record::from([("a", Value::from(1))]);
        assert_eq!(record.get("zzz"), None);
        assert_eq!(record.get_or_blank("zzz"), &Value::Blank);
        assert!(!record.contains_field("zzz"));
    }

    #[test]
    fn json_object_preserves_field_order() {
        let json = r#"{"segment":"A","sales":10,"flag":true,"note":null}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(
            record.field_names().collect::<Vec<_>>(),
            vec!["segment", "sales", "flag", "note"]
        );
        assert_eq!(serde_json::to_string(&record).unwrap(), json);
    }
}
