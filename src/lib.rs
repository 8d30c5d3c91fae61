//! # binstore - Content-Addressable Binary Store
//!
//! Deduplicating storage for artifact payloads. Every binary is identified by
//! the SHA-256 of its content and recorded in a relational catalog; the bytes
//! live behind a chain of providers.
//!
//! ## Architecture Layers
//!
//! - **Domain**: hashes, binary info and catalog records
//! - **Application**: the [`BinaryStore`] facade, usage tracking, garbage
//!   collection and the ports it drives
//! - **Infrastructure**: SQL catalog and the filesystem, BLOB and external
//!   filestore providers
//!
//! ## Provider chain
//!
//! ```text
//! usage-tracking -> filesystem | blob -> [external-wrapper -> external] -> empty
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use binstore::{ApplicationBuilder, BinaryUpload, Config};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let app = ApplicationBuilder::new(Config::from_env())
//!     .with_database()
//!     .await?
//!     .with_storage()
//!     .await?
//!     .build()?;
//!
//! let info = app.store.add_stream(BinaryUpload::from_bytes(&b"hello"[..])).await?;
//! println!("stored {}", info);
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export key types explicitly to avoid ambiguity
pub use application::errors::BinaryStoreError;
pub use application::{gc, ports, reports};
pub use application::{Application, ApplicationBuilder, BinaryStore, BinaryUpload, UsageTracker};
pub use config::Config;
pub use domain::errors as domain_errors;
pub use domain::{entities, value_objects};
