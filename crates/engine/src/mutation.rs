use std::collections::VecDeque;
use std::slice;

use caseboard_core::{ChangeSet, Entity, EntityKey, FieldValue, Patch};
use caseboard_storage::PersistenceGateway;
use tracing::{debug, trace};

use crate::error::MutationError;
use crate::overlay::OverlayEngine;

pub const DEFAULT_HISTORY_DEPTH: usize = 50;

/// What the fields named by one patch looked like immediately before it was
/// written, enough to exactly reverse that one mutation. A field the entity
/// lacked at capture time is recorded as `Null`.
struct HistoryEntry<T: Entity> {
    key: EntityKey,
    inverse: ChangeSet<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Empty change set: success without a gateway call or stack mutation.
    Noop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackStatus {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_count: usize,
    pub redo_count: usize,
}

/// Applies one field-level change to one persisted entity, with bounded
/// undo/redo and optimistic overlay signalling.
///
/// History discipline is transactional with respect to this service's own
/// state: both stacks mutate only after the corresponding gateway write has
/// succeeded, so a failed write leaves history exactly as it was. The
/// service performs no retries.
///
/// Methods take `&mut self`, so mutations through one service instance are
/// serialized by construction; a stale pre-image can never be captured into
/// an inverse. One service per writer is the supported topology.
pub struct MutationService<T: Entity, G: PersistenceGateway<T>> {
    gateway: G,
    overlay: OverlayEngine<T>,
    undo_stack: VecDeque<HistoryEntry<T>>,
    redo_stack: VecDeque<HistoryEntry<T>>,
    max_depth: usize,
}

impl<T: Entity, G: PersistenceGateway<T>> MutationService<T, G> {
    pub fn new(gateway: G, overlay: OverlayEngine<T>) -> Self {
        Self::with_depth(gateway, overlay, DEFAULT_HISTORY_DEPTH)
    }

    pub fn with_depth(gateway: G, overlay: OverlayEngine<T>, max_depth: usize) -> Self {
        Self {
            gateway,
            overlay,
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_depth,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn overlay(&self) -> &OverlayEngine<T> {
        &self.overlay
    }

    /// Write a forward patch, record its inverse, and signal the overlay so
    /// the UI reflects the change before the base stream confirms it.
    pub fn apply_patch(&mut self, patch: Patch<T>) -> Result<ApplyOutcome, MutationError> {
        if patch.is_noop() {
            return Ok(ApplyOutcome::Noop);
        }

        let current = self
            .gateway
            .get(&patch.key)?
            .ok_or_else(|| MutationError::NotFound(patch.key.clone()))?;
        let inverse = capture_fields(&current, patch.changes.field_names())?;

        if self.gateway.update(&patch.key, &patch.changes)? == 0 {
            // Target vanished between get and update.
            return Err(MutationError::NotFound(patch.key.clone()));
        }

        self.push_undo(HistoryEntry {
            key: patch.key.clone(),
            inverse,
        });
        self.redo_stack.clear();

        trace!(key = %patch.key, fields = patch.changes.len(), "patch applied");
        self.overlay.apply(slice::from_ref(&patch));
        self.overlay.commit_hint(slice::from_ref(&patch));
        Ok(ApplyOutcome::Applied)
    }

    /// Revert the most recent mutation. The popped inverse is written through
    /// the gateway and its pre-undo values move onto the redo stack; the
    /// overlay reflects the reverted fields immediately.
    pub fn undo(&mut self) -> Result<(), MutationError> {
        let entry = match self.undo_stack.back() {
            Some(entry) => entry,
            None => return Err(MutationError::NothingToUndo),
        };
        let key = entry.key.clone();
        let inverse = entry.inverse.clone();

        let complement = self.write_inverse(&key, &inverse)?;
        self.undo_stack.pop_back();
        self.redo_stack.push_back(HistoryEntry {
            key: key.clone(),
            inverse: complement,
        });
        if self.redo_stack.len() > self.max_depth {
            self.redo_stack.pop_front();
        }

        debug!(%key, "undo applied");
        self.emit_reverted(key, inverse);
        Ok(())
    }

    /// Re-apply the most recently undone mutation. Does not clear the redo
    /// stack: only forward mutations invalidate future history.
    pub fn redo(&mut self) -> Result<(), MutationError> {
        let entry = match self.redo_stack.back() {
            Some(entry) => entry,
            None => return Err(MutationError::NothingToRedo),
        };
        let key = entry.key.clone();
        let inverse = entry.inverse.clone();

        let complement = self.write_inverse(&key, &inverse)?;
        self.redo_stack.pop_back();
        self.push_undo(HistoryEntry {
            key: key.clone(),
            inverse: complement,
        });

        debug!(%key, "redo applied");
        self.emit_reverted(key, inverse);
        Ok(())
    }

    pub fn stack_status(&self) -> StackStatus {
        StackStatus {
            can_undo: !self.undo_stack.is_empty(),
            can_redo: !self.redo_stack.is_empty(),
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
        }
    }

    pub fn clear_stacks(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Capture the complement, write `changes`, and return the complement.
    /// Stacks are untouched here: callers mutate them only after this
    /// succeeds.
    fn write_inverse(
        &mut self,
        key: &EntityKey,
        changes: &ChangeSet<T>,
    ) -> Result<ChangeSet<T>, MutationError> {
        let current = self
            .gateway
            .get(key)?
            .ok_or_else(|| MutationError::NotFound(key.clone()))?;
        let complement = capture_fields(&current, changes.field_names())?;
        if self.gateway.update(key, changes)? == 0 {
            return Err(MutationError::NotFound(key.clone()));
        }
        Ok(complement)
    }

    fn push_undo(&mut self, entry: HistoryEntry<T>) {
        self.undo_stack.push_back(entry);
        // Enforce depth limit by dropping oldest entry
        if self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
            debug!(max_depth = self.max_depth, "undo stack truncated");
        }
    }

    fn emit_reverted(&self, key: EntityKey, changes: ChangeSet<T>) {
        let patch = Patch::new(key, changes);
        self.overlay.apply(slice::from_ref(&patch));
        self.overlay.commit_hint(slice::from_ref(&patch));
    }
}

/// Current values of exactly the named fields; absent fields become `Null`.
fn capture_fields<'a, T: Entity>(
    entity: &T,
    names: impl Iterator<Item = &'a str>,
) -> Result<ChangeSet<T>, MutationError> {
    let mut captured = ChangeSet::new();
    for name in names {
        let value = entity.field(name).unwrap_or(FieldValue::Null);
        captured = captured.set(name, value)?;
    }
    Ok(captured)
}
