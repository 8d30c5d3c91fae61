mod blob_provider;
mod chain;
mod content_hasher;
mod empty_provider;
mod external_provider;
mod external_wrapper;
mod filesystem_provider;
mod path_builder;
mod usage_tracking_provider;

pub use blob_provider::BlobProvider;
pub use chain::{ExternalStoreConfig, InternalStore, ProviderChain};
pub use content_hasher::ContentHasher;
pub use empty_provider::EmptyProvider;
pub use external_provider::ExternalFilestoreProvider;
pub use external_wrapper::{ExternalWrapperProvider, TransferOutcome};
pub use filesystem_provider::FilesystemProvider;
pub use path_builder::{PathBuilder, CONTENT_DIR, TEMP_DIR};
pub use usage_tracking_provider::{UsageGuardedReader, UsageTrackingProvider};
