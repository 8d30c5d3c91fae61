mod binary_info;
mod content_hash;
mod external_mode;

pub use binary_info::BinaryInfo;
pub use content_hash::ContentHash;
pub use external_mode::{ExternalMode, ProviderKind};
