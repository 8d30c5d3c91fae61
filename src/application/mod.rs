pub mod builder;
pub mod errors;
pub mod gc;
pub mod ports;
pub mod reports;
pub mod store;
pub mod usage;

pub use builder::{Application, ApplicationBuilder};
pub use errors::BinaryStoreError;
pub use reports::{ExternalStoreReport, HealthReport, PruneReport};
pub use store::{BinaryStore, BinaryUpload};
pub use usage::{UsageGuard, UsageTracker};
