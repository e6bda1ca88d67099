use caseboard_core::{ChangeSet, Entity, EntityKey};

use crate::error::StorageError;

/// The seam between the mutation engine and whatever actually persists
/// entities. Any key-value or document store that can read one entity and
/// apply a field-level update satisfies it.
pub trait PersistenceGateway<T: Entity> {
    fn get(&self, key: &EntityKey) -> Result<Option<T>, StorageError>;

    /// Apply the changed fields to the stored entity. Returns the number of
    /// entities updated; 0 means the key is unknown to the store.
    fn update(&mut self, key: &EntityKey, changes: &ChangeSet<T>) -> Result<usize, StorageError>;
}
