use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::field_value::FieldValue;
use crate::key::EntityKey;

/// An entity the engine can patch, diff and merge at field granularity.
///
/// The engine never looks inside a field value; it only needs the normalized
/// key, field reads by name, and field writes by name. `accepts` declares the
/// field names the kind recognizes so change sets can reject typos before
/// they reach any store.
pub trait Entity: Clone + Send + 'static {
    fn key(&self) -> EntityKey;

    fn field(&self, name: &str) -> Option<FieldValue>;

    fn set_field(&mut self, name: &str, value: FieldValue);

    /// Whether this entity kind recognizes `name`. Dynamic kinds may accept
    /// everything.
    fn accepts(name: &str) -> bool;
}

/// Dynamic entity: a key plus an ordered field map.
///
/// Used where shapes are only known at runtime (imported boards) and by the
/// SQLite gateway, which persists exactly this layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: EntityKey,
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(key: impl Into<EntityKey>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}

impl Entity for Record {
    fn key(&self) -> EntityKey {
        self.key.clone()
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        self.fields.get(name).cloned()
    }

    fn set_field(&mut self, name: &str, value: FieldValue) {
        self.fields.insert(name.to_string(), value);
    }

    fn accepts(_name: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_field_roundtrip() {
        let mut record = Record::new("12").with_field("status", FieldValue::text("offen"));
        assert_eq!(record.field("status"), Some(FieldValue::text("offen")));
        assert_eq!(record.field("missing"), None);

        record.set_field("status", FieldValue::text("erledigt"));
        assert_eq!(record.field("status"), Some(FieldValue::text("erledigt")));
        assert_eq!(record.key(), EntityKey::from(12i64));
    }
}
