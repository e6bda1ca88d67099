pub mod case;
pub mod desk;

pub use case::CaseFile;
pub use desk::TestDesk;
