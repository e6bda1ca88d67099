use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use caseboard_core::{Entity, EntityKey, FieldValue, Patch};
use tracing::{debug, trace};

use crate::sweeper::Sweeper;

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Age after which an entry is swept regardless of reconciliation.
    pub ttl: Duration,
    /// Maximum entry count; checked after every apply.
    pub capacity: usize,
    /// Cadence of the background TTL sweep.
    pub sweep_interval: Duration,
    /// Delay before a commit hint re-evaluates its keys.
    pub commit_hint_delay: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: 500,
            sweep_interval: Duration::from_secs(60),
            commit_hint_delay: Duration::from_millis(150),
        }
    }
}

/// Diagnostics snapshot; not part of the correctness contract.
#[derive(Debug, Clone)]
pub struct OverlayStats {
    pub entries: usize,
    pub ttl: Duration,
    pub capacity: usize,
}

struct OverlayEntry {
    data: BTreeMap<String, FieldValue>,
    created_at: Instant,
    last_accessed: Instant,
}

struct OverlayState<T: Entity> {
    entries: HashMap<EntityKey, OverlayEntry>,
    /// Base snapshot from the most recent reconcile; delayed re-evaluations
    /// compare against this.
    retained: HashMap<EntityKey, T>,
}

/// Keyed cache of unconfirmed per-entity field changes, plus the merged
/// projection the UI reads.
///
/// An edit lands here the moment it is issued and stays until the refreshing
/// base stream is observed to carry the same values (`reconcile`), the edit
/// is explicitly rolled back, or eviction removes it. The engine value is a
/// cheap-clone handle over shared state, so the background sweeper and
/// delayed re-evaluations operate on the same store; independent instances
/// are fully isolated from each other.
pub struct OverlayEngine<T: Entity> {
    state: Arc<Mutex<OverlayState<T>>>,
    config: OverlayConfig,
}

impl<T: Entity> Clone for OverlayEngine<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: self.config.clone(),
        }
    }
}

impl<T: Entity> Default for OverlayEngine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> OverlayEngine<T> {
    pub fn new() -> Self {
        Self::with_config(OverlayConfig::default())
    }

    pub fn with_config(config: OverlayConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(OverlayState {
                entries: HashMap::new(),
                retained: HashMap::new(),
            })),
            config,
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, OverlayState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merge each patch's changes into the entry for its key, creating the
    /// entry if absent. Both timestamps are refreshed, so applying the same
    /// patch twice leaves the entry unchanged apart from its age.
    pub fn apply(&self, patches: &[Patch<T>]) {
        if patches.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut state = self.lock();
        for patch in patches {
            if patch.is_noop() {
                continue;
            }
            let entry = state
                .entries
                .entry(patch.key.clone())
                .or_insert_with(|| OverlayEntry {
                    data: BTreeMap::new(),
                    created_at: now,
                    last_accessed: now,
                });
            for (name, value) in patch.changes.fields() {
                entry.data.insert(name.to_string(), value.clone());
            }
            entry.created_at = now;
            entry.last_accessed = now;
            trace!(key = %patch.key, fields = patch.changes.len(), "overlay apply");
        }
        enforce_capacity(&mut state.entries, self.config.capacity);
    }

    /// Hint that the patches were written to the gateway. Never deletes at
    /// call time (deletion stays with reconciliation); schedules one
    /// delayed re-evaluation of the hinted keys against the retained base.
    /// Heuristic: it narrows, not closes, the window where reconciliation
    /// runs before the base stream has observed the write.
    pub fn commit_hint(&self, patches: &[Patch<T>]) {
        let keys: HashSet<EntityKey> = patches
            .iter()
            .filter(|p| !p.is_noop())
            .map(|p| p.key.clone())
            .collect();
        if keys.is_empty() {
            return;
        }
        self.schedule_recheck(Some(keys));
    }

    /// Raise when something outside the mutation service wrote through the
    /// shared gateway; forces one extra delayed re-evaluation over every
    /// entry. Same heuristic contract as `commit_hint`.
    pub fn note_external_write(&self) {
        self.schedule_recheck(None);
    }

    fn schedule_recheck(&self, keys: Option<HashSet<EntityKey>>) {
        let state = Arc::downgrade(&self.state);
        let delay = self.config.commit_hint_delay;
        thread::spawn(move || {
            thread::sleep(delay);
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let OverlayState { entries, retained } = &mut *state;
            let removed = drop_converged(entries, retained, keys.as_ref());
            if removed > 0 {
                debug!(removed, "delayed re-evaluation dropped converged entries");
            }
        });
    }

    /// Unconditionally discard the entries for the patched keys. Used when a
    /// mutation is undone or fails and its optimism should not wait for
    /// convergence.
    pub fn rollback(&self, patches: &[Patch<T>]) {
        let mut state = self.lock();
        for patch in patches {
            if state.entries.remove(&patch.key).is_some() {
                debug!(key = %patch.key, "overlay rollback");
            }
        }
    }

    /// Session reset: drop every entry and the retained base.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.retained.clear();
    }

    /// Run on every base refresh. Entries whose fields all match the base
    /// entity are dropped (converged); entries that differ stay and have
    /// their access time refreshed; entries whose key is absent from `base`
    /// are left untouched for eviction to clean up.
    pub fn reconcile(&self, base: &[T]) {
        let mut state = self.lock();
        state.retained = base.iter().map(|entity| (entity.key(), entity.clone())).collect();
        let OverlayState { entries, retained } = &mut *state;
        let removed = drop_converged(entries, retained, None);
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "reconcile dropped converged entries");
        }
    }

    /// Pure projection of `base` with unconfirmed edits layered on top.
    /// Returns the borrowed slice untouched when the store is empty, so
    /// downstream consumers can skip recomputation on identity.
    pub fn merged_view<'a>(&self, base: &'a [T]) -> Cow<'a, [T]> {
        let state = self.lock();
        if state.entries.is_empty() {
            return Cow::Borrowed(base);
        }
        let merged = base
            .iter()
            .map(|entity| match state.entries.get(&entity.key()) {
                Some(entry) => {
                    let mut merged = entity.clone();
                    for (name, value) in &entry.data {
                        merged.set_field(name, value.clone());
                    }
                    merged
                }
                None => entity.clone(),
            })
            .collect();
        Cow::Owned(merged)
    }

    /// Remove entries older than the configured TTL. Returns how many were
    /// dropped. The sweeper calls this on its own timer; tests call it
    /// directly.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let now = Instant::now();
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|key, entry| {
            let expired = now.duration_since(entry.created_at) > ttl;
            if expired {
                debug!(%key, "overlay ttl eviction");
            }
            !expired
        });
        before - state.entries.len()
    }

    /// Spawn the periodic TTL sweep. The returned handle stops and joins the
    /// thread on `stop()` or drop, so no timer outlives its engine's users.
    pub fn start_sweeper(&self) -> Sweeper {
        Sweeper::start(self.clone(), self.config.sweep_interval)
    }

    // ========================================================================
    // Introspection (diagnostics and tests only)
    // ========================================================================

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn entry_age(&self, key: &EntityKey) -> Option<Duration> {
        self.lock()
            .entries
            .get(key)
            .map(|entry| entry.created_at.elapsed())
    }

    pub fn stats(&self) -> OverlayStats {
        OverlayStats {
            entries: self.len(),
            ttl: self.config.ttl,
            capacity: self.config.capacity,
        }
    }
}

/// Drop every entry (or only those in `only`) whose overlay fields all equal
/// the corresponding base entity's fields. A field the base entity does not
/// carry compares unequal, so an odd entry is kept rather than erred on;
/// one stray entry must never stall the rest of the merge.
fn drop_converged<T: Entity>(
    entries: &mut HashMap<EntityKey, OverlayEntry>,
    base: &HashMap<EntityKey, T>,
    only: Option<&HashSet<EntityKey>>,
) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|key, entry| {
        if let Some(only) = only
            && !only.contains(key)
        {
            return true;
        }
        let Some(base_entity) = base.get(key) else {
            // Orphan: base does not (or no longer) carry this key.
            return true;
        };
        let converged = entry
            .data
            .iter()
            .all(|(name, value)| base_entity.field(name).as_ref() == Some(value));
        if converged {
            trace!(%key, "overlay entry converged");
        } else {
            entry.last_accessed = now;
        }
        !converged
    });
    before - entries.len()
}

/// Evict smallest-`last_accessed` entries until the store fits its capacity.
fn enforce_capacity(entries: &mut HashMap<EntityKey, OverlayEntry>, capacity: usize) {
    while entries.len() > capacity {
        let coldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone());
        match coldest {
            Some(key) => {
                entries.remove(&key);
                debug!(%key, "overlay capacity eviction");
            }
            None => break,
        }
    }
}
