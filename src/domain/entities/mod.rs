mod binary_record;

pub use binary_record::{BinaryRecord, CatalogStats};
