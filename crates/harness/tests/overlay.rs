use std::borrow::Cow;
use std::thread::sleep;
use std::time::Duration;

use caseboard_core::{Entity, EntityKey, FieldValue, Patch, Record};
use caseboard_engine::{OverlayConfig, OverlayEngine};
use caseboard_harness::CaseFile;

fn case(key: &str, status: &str) -> CaseFile {
    CaseFile::new(key, status)
}

fn status_patch(key: &str, status: &str) -> Patch<CaseFile> {
    Patch::single(key, "status", FieldValue::text(status)).unwrap()
}

/// Config with short timings for eviction tests.
fn fast_config() -> OverlayConfig {
    OverlayConfig {
        ttl: Duration::from_millis(20),
        capacity: 500,
        sweep_interval: Duration::from_millis(10),
        commit_hint_delay: Duration::from_millis(20),
    }
}

// ============================================================================
// Apply / rollback / clear
// ============================================================================

#[test]
fn apply_is_idempotent() {
    let engine = OverlayEngine::new();
    let patch = status_patch("1", "inBearbeitung");

    engine.apply(std::slice::from_ref(&patch));
    let base = vec![case("1", "offen")];
    let once = engine.merged_view(&base).into_owned();

    engine.apply(std::slice::from_ref(&patch));
    let twice = engine.merged_view(&base).into_owned();

    assert_eq!(once, twice);
    assert_eq!(engine.len(), 1);
}

#[test]
fn repeated_patches_merge_last_write_wins() {
    let engine = OverlayEngine::new();
    engine.apply(&[status_patch("1", "offen")]);
    engine.apply(&[Patch::single("1", "assignee", FieldValue::text("weber")).unwrap()]);
    engine.apply(&[status_patch("1", "inBearbeitung")]);

    assert_eq!(engine.len(), 1);

    let base = vec![case("1", "offen")];
    let view = engine.merged_view(&base);
    assert_eq!(view[0].status, "inBearbeitung");
    assert_eq!(view[0].assignee.as_deref(), Some("weber"));
}

#[test]
fn rollback_discards_optimism() {
    let engine = OverlayEngine::new();
    let patch = status_patch("1", "inBearbeitung");
    engine.apply(std::slice::from_ref(&patch));
    assert_eq!(engine.len(), 1);

    engine.rollback(std::slice::from_ref(&patch));
    assert!(engine.is_empty());

    let base = vec![case("1", "offen")];
    let view = engine.merged_view(&base);
    assert_eq!(view[0].status, "offen");
}

#[test]
fn clear_resets_store() {
    let engine = OverlayEngine::new();
    engine.apply(&[status_patch("1", "a"), status_patch("2", "b")]);
    assert_eq!(engine.len(), 2);

    engine.clear();
    assert!(engine.is_empty());
}

#[test]
fn noop_patches_create_no_entries() {
    let engine: OverlayEngine<CaseFile> = OverlayEngine::new();
    engine.apply(&[Patch::new("1", Default::default())]);
    assert!(engine.is_empty());
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn reconcile_drops_converged_entries() {
    let engine = OverlayEngine::new();
    engine.apply(&[status_patch("1", "inBearbeitung"), status_patch("2", "erledigt")]);

    // Base caught up for case 1 only.
    let base = vec![case("1", "inBearbeitung"), case("2", "offen")];
    engine.reconcile(&base);

    assert_eq!(engine.len(), 1);
    assert!(engine.entry_age(&EntityKey::from("1")).is_none());
    assert!(engine.entry_age(&EntityKey::from("2")).is_some());

    let view = engine.merged_view(&base);
    assert_eq!(view[0].status, "inBearbeitung");
    assert_eq!(view[1].status, "erledigt");
}

#[test]
fn reconcile_requires_every_field_to_match() {
    let engine = OverlayEngine::new();
    let patch = Patch::new(
        "1",
        caseboard_core::ChangeSet::new()
            .set("status", FieldValue::text("inBearbeitung"))
            .unwrap()
            .set("priority", FieldValue::Integer(2))
            .unwrap(),
    );
    engine.apply(&[patch]);

    // Status caught up, priority did not.
    engine.reconcile(&[case("1", "inBearbeitung")]);
    assert_eq!(engine.len(), 1);

    engine.reconcile(&[case("1", "inBearbeitung").with_priority(2)]);
    assert!(engine.is_empty());
}

#[test]
fn reconcile_leaves_orphans_untouched() {
    let engine = OverlayEngine::new();
    engine.apply(&[status_patch("gone", "inBearbeitung")]);

    engine.reconcile(&[case("1", "offen")]);
    assert_eq!(engine.len(), 1);
    assert!(engine.entry_age(&EntityKey::from("gone")).is_some());
}

#[test]
fn unknown_overlay_field_never_converges_and_never_panics() {
    // Dynamic records accept any field, so an entry can carry a field the
    // refreshed base does not. Reconciliation must skip it, not fail.
    let engine: OverlayEngine<Record> = OverlayEngine::new();
    let patch = Patch::<Record>::single("1", "vanished_column", FieldValue::text("x")).unwrap();
    engine.apply(&[patch]);

    let base = vec![Record::new("1").with_field("status", FieldValue::text("offen"))];
    engine.reconcile(&base);

    assert_eq!(engine.len(), 1);
    let view = engine.merged_view(&base);
    assert_eq!(view[0].field("vanished_column"), Some(FieldValue::text("x")));
}

// ============================================================================
// Merged view
// ============================================================================

#[test]
fn merged_view_borrows_base_when_store_empty() {
    let engine: OverlayEngine<CaseFile> = OverlayEngine::new();
    let base = vec![case("1", "offen")];
    let view = engine.merged_view(&base);
    assert!(matches!(view, Cow::Borrowed(_)));
}

#[test]
fn merged_view_overlays_without_mutating_base() {
    let engine = OverlayEngine::new();
    engine.apply(&[status_patch("2", "erledigt")]);

    let base = vec![case("1", "offen"), case("2", "offen")];
    let view = engine.merged_view(&base);

    assert!(matches!(view, Cow::Owned(_)));
    assert_eq!(view[0].status, "offen");
    assert_eq!(view[1].status, "erledigt");
    // Base untouched.
    assert_eq!(base[1].status, "offen");
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn expired_entries_are_swept_without_reconciliation() {
    let engine = OverlayEngine::with_config(fast_config());
    engine.apply(&[status_patch("1", "inBearbeitung")]);

    sleep(Duration::from_millis(60));
    assert_eq!(engine.evict_expired(), 1);
    assert!(engine.is_empty());
}

#[test]
fn fresh_entries_survive_a_sweep() {
    let engine = OverlayEngine::with_config(OverlayConfig {
        ttl: Duration::from_secs(300),
        ..fast_config()
    });
    engine.apply(&[status_patch("1", "inBearbeitung")]);
    assert_eq!(engine.evict_expired(), 0);
    assert_eq!(engine.len(), 1);
}

#[test]
fn capacity_evicts_least_recently_accessed_first() {
    let engine = OverlayEngine::with_config(OverlayConfig {
        capacity: 2,
        ..OverlayConfig::default()
    });

    engine.apply(&[status_patch("a", "1")]);
    sleep(Duration::from_millis(5));
    engine.apply(&[status_patch("b", "2")]);
    sleep(Duration::from_millis(5));
    engine.apply(&[status_patch("c", "3")]);

    assert_eq!(engine.len(), 2);
    assert!(engine.entry_age(&EntityKey::from("a")).is_none());
    assert!(engine.entry_age(&EntityKey::from("b")).is_some());
    assert!(engine.entry_age(&EntityKey::from("c")).is_some());
}

#[test]
fn sweeper_runs_on_its_own_timer_and_stops_cleanly() {
    let engine = OverlayEngine::with_config(fast_config());
    engine.apply(&[status_patch("1", "inBearbeitung")]);

    let sweeper = engine.start_sweeper();
    sleep(Duration::from_millis(120));
    assert!(engine.is_empty());
    sweeper.stop();

    // After stop, nothing sweeps: a stale entry stays put.
    engine.apply(&[status_patch("2", "offen")]);
    sleep(Duration::from_millis(120));
    assert_eq!(engine.len(), 1);
}

// ============================================================================
// Commit hints / external writes
// ============================================================================

#[test]
fn commit_hint_does_not_delete_without_confirmed_base() {
    let engine = OverlayEngine::with_config(fast_config());
    let patch = status_patch("1", "inBearbeitung");
    engine.apply(std::slice::from_ref(&patch));

    engine.commit_hint(std::slice::from_ref(&patch));
    assert_eq!(engine.len(), 1);

    // No reconcile has retained a matching base, so the delayed check keeps
    // the entry.
    sleep(Duration::from_millis(100));
    assert_eq!(engine.len(), 1);
}

#[test]
fn commit_hint_converges_after_delay_when_base_already_matches() {
    let engine = OverlayEngine::with_config(fast_config());
    engine.reconcile(&[case("1", "inBearbeitung")]);

    let patch = status_patch("1", "inBearbeitung");
    engine.apply(std::slice::from_ref(&patch));
    engine.commit_hint(std::slice::from_ref(&patch));

    // Not an immediate deletion.
    assert_eq!(engine.len(), 1);

    sleep(Duration::from_millis(100));
    assert!(engine.is_empty());
}

#[test]
fn external_write_notice_rechecks_every_entry() {
    let engine = OverlayEngine::with_config(fast_config());
    engine.reconcile(&[case("1", "inBearbeitung"), case("2", "offen")]);

    engine.apply(&[status_patch("1", "inBearbeitung"), status_patch("2", "erledigt")]);
    engine.note_external_write();

    sleep(Duration::from_millis(100));
    assert_eq!(engine.len(), 1);
    assert!(engine.entry_age(&EntityKey::from("2")).is_some());
}

// ============================================================================
// Introspection
// ============================================================================

#[test]
fn stats_report_configuration_and_size() {
    let engine = OverlayEngine::new();
    engine.apply(&[status_patch("1", "a")]);

    let stats = engine.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.capacity, 500);
    assert_eq!(stats.ttl, Duration::from_secs(300));
    assert!(engine.entry_age(&EntityKey::from("1")).is_some());
}
