mod binary_catalog;
mod binary_provider;
mod reference_resolver;
mod signals;

pub use binary_catalog::{BinaryCatalog, CatalogError};
pub use binary_provider::{
    BinaryProvider, BlobReader, LocalBinary, LocalStore, StorageError, WriteReceipt,
};
pub use reference_resolver::{ReferenceResolver, ReferenceSet, ResolverError};
pub use signals::{
    CollectingReporter, InterruptSignal, NeverInterrupt, ReportLevel, StatusReporter, TaskControl,
    TracingReporter,
};

#[cfg(test)]
pub use binary_catalog::MockBinaryCatalog;
#[cfg(test)]
pub use reference_resolver::MockReferenceResolver;
