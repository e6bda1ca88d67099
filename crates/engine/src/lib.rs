pub mod error;
pub mod mutation;
pub mod overlay;
pub mod sweeper;

pub use error::MutationError;
pub use mutation::{ApplyOutcome, MutationService, StackStatus, DEFAULT_HISTORY_DEPTH};
pub use overlay::{OverlayConfig, OverlayEngine, OverlayStats};
pub use sweeper::Sweeper;
