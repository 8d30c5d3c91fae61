mod dialect;
mod pool;
mod sql_binary_catalog;

pub use dialect::{is_unique_violation, placeholders, SqlDialect};
pub use pool::{connect_in_memory, connect_pool, PoolSettings};
pub use sql_binary_catalog::SqlBinaryCatalog;
