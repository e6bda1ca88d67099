use std::collections::HashMap;

use caseboard_core::{ChangeSet, Entity, EntityKey};

use crate::error::StorageError;
use crate::traits::PersistenceGateway;

/// In-memory gateway, generic over the entity kind.
///
/// Backs unit and integration tests; `snapshot` doubles as the base stream's
/// read of persisted truth.
pub struct MemoryGateway<T: Entity> {
    entities: HashMap<EntityKey, T>,
}

impl<T: Entity> MemoryGateway<T> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    pub fn insert(&mut self, entity: T) {
        self.entities.insert(entity.key(), entity);
    }

    pub fn remove(&mut self, key: &EntityKey) -> Option<T> {
        self.entities.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Every stored entity, in unspecified order.
    pub fn snapshot(&self) -> Vec<T> {
        self.entities.values().cloned().collect()
    }
}

impl<T: Entity> Default for MemoryGateway<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> PersistenceGateway<T> for MemoryGateway<T> {
    fn get(&self, key: &EntityKey) -> Result<Option<T>, StorageError> {
        Ok(self.entities.get(key).cloned())
    }

    fn update(&mut self, key: &EntityKey, changes: &ChangeSet<T>) -> Result<usize, StorageError> {
        match self.entities.get_mut(key) {
            Some(entity) => {
                for (name, value) in changes.fields() {
                    entity.set_field(name, value.clone());
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use caseboard_core::{FieldValue, Record};

    use super::*;

    #[test]
    fn update_applies_fields_in_place() -> Result<(), StorageError> {
        let mut gateway = MemoryGateway::new();
        gateway.insert(Record::new("1").with_field("status", FieldValue::text("offen")));

        let changes = ChangeSet::<Record>::new()
            .set("status", FieldValue::text("inBearbeitung"))
            .unwrap();
        assert_eq!(gateway.update(&EntityKey::from("1"), &changes)?, 1);

        let stored = gateway.get(&EntityKey::from("1"))?.unwrap();
        assert_eq!(stored.field("status"), Some(FieldValue::text("inBearbeitung")));
        Ok(())
    }

    #[test]
    fn update_of_unknown_key_touches_nothing() -> Result<(), StorageError> {
        let mut gateway: MemoryGateway<Record> = MemoryGateway::new();
        let changes = ChangeSet::new().set("status", FieldValue::text("offen")).unwrap();
        assert_eq!(gateway.update(&EntityKey::from("ghost"), &changes)?, 0);
        assert!(gateway.is_empty());
        Ok(())
    }
}
