pub mod collector;
pub mod config;
pub mod results;
pub mod scheduler;
pub mod worker;

pub use collector::BinaryCollector;
pub use config::GcConfig;
pub use results::{GarbageCollectionInfo, GcStatistics};
pub use scheduler::TaskScheduler;
pub use worker::GarbageCollector;
