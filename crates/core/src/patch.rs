use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use crate::entity::Entity;
use crate::error::PatchError;
use crate::field_value::FieldValue;
use crate::key::EntityKey;

/// A partial update typed to one entity kind.
///
/// Field names are validated against `T::accepts` on insertion, so a change
/// set can only ever carry fields the kind recognizes. Semantics are shallow:
/// a field value is replaced wholesale, and merging two change sets is
/// last-write-wins per field.
pub struct ChangeSet<T: Entity> {
    fields: BTreeMap<String, FieldValue>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Entity> ChangeSet<T> {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            _kind: PhantomData,
        }
    }

    /// Add or replace one field. Rejects names the entity kind does not
    /// accept.
    pub fn set(mut self, name: &str, value: FieldValue) -> Result<Self, PatchError> {
        if !T::accepts(name) {
            return Err(PatchError::UnknownField(name.to_string()));
        }
        self.fields.insert(name.to_string(), value);
        Ok(self)
    }

    /// Merge `other` into `self`, later writes winning per field.
    pub fn merge(&mut self, other: &ChangeSet<T>) {
        for (name, value) in &other.fields {
            self.fields.insert(name.clone(), value.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }
}

impl<T: Entity> Default for ChangeSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for ChangeSet<T> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T: Entity> PartialEq for ChangeSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl<T: Entity> fmt::Debug for ChangeSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter()).finish()
    }
}

/// A proposed partial update to one entity, keyed by its normalized id.
pub struct Patch<T: Entity> {
    pub key: EntityKey,
    pub changes: ChangeSet<T>,
}

impl<T: Entity> Patch<T> {
    pub fn new(key: impl Into<EntityKey>, changes: ChangeSet<T>) -> Self {
        Self {
            key: key.into(),
            changes,
        }
    }

    /// Convenience for the common one-field edit.
    pub fn single(
        key: impl Into<EntityKey>,
        name: &str,
        value: FieldValue,
    ) -> Result<Self, PatchError> {
        Ok(Self::new(key, ChangeSet::new().set(name, value)?))
    }

    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

impl<T: Entity> Clone for Patch<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            changes: self.changes.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for Patch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch")
            .field("key", &self.key)
            .field("changes", &self.changes)
            .finish()
    }
}
