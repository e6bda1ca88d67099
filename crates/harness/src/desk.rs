use caseboard_core::{EntityKey, FieldValue, Patch};
use caseboard_engine::{ApplyOutcome, MutationError, MutationService, OverlayConfig, OverlayEngine};
use caseboard_storage::MemoryGateway;

use crate::case::CaseFile;

/// Gateway, overlay and mutation service wired the way the host application
/// wires them, over an in-memory store.
///
/// The base stream is simulated by `refresh`: it reads persisted truth from
/// the gateway and runs reconciliation, exactly what the host's refresh
/// handler does on each live-query tick.
pub struct TestDesk {
    pub service: MutationService<CaseFile, MemoryGateway<CaseFile>>,
}

impl TestDesk {
    pub fn new() -> Self {
        Self::with_config(OverlayConfig::default())
    }

    pub fn with_config(config: OverlayConfig) -> Self {
        let overlay = OverlayEngine::with_config(config);
        let service = MutationService::new(MemoryGateway::new(), overlay);
        Self { service }
    }

    pub fn overlay(&self) -> &OverlayEngine<CaseFile> {
        self.service.overlay()
    }

    pub fn seed(&mut self, cases: impl IntoIterator<Item = CaseFile>) {
        for case in cases {
            self.service.gateway_mut().insert(case);
        }
    }

    /// One base-stream refresh: snapshot the gateway, reconcile, return the
    /// snapshot sorted by case number for stable assertions.
    pub fn refresh(&self) -> Vec<CaseFile> {
        let mut base = self.service.gateway().snapshot();
        base.sort_by(|a, b| a.case_number.cmp(&b.case_number));
        self.overlay().reconcile(&base);
        base
    }

    pub fn set_status(
        &mut self,
        key: impl Into<EntityKey>,
        status: &str,
    ) -> Result<ApplyOutcome, MutationError> {
        let patch = Patch::single(key, "status", FieldValue::text(status))?;
        self.service.apply_patch(patch)
    }

    pub fn stored_status(&self, key: impl Into<EntityKey>) -> Option<String> {
        let key = key.into();
        self.service
            .gateway()
            .snapshot()
            .into_iter()
            .find(|case| case.case_number == key)
            .map(|case| case.status)
    }
}

impl Default for TestDesk {
    fn default() -> Self {
        Self::new()
    }
}
