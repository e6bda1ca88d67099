pub mod entity;
pub mod error;
pub mod field_value;
pub mod key;
pub mod patch;

pub use entity::{Entity, Record};
pub use error::{CoreError, PatchError};
pub use field_value::FieldValue;
pub use key::EntityKey;
pub use patch::{ChangeSet, Patch};
