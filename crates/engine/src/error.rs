use caseboard_core::{EntityKey, PatchError};
use caseboard_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("not found: {0}")]
    NotFound(EntityKey),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    #[error("patch error: {0}")]
    Patch(#[from] PatchError),
}
