use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for garbage collection operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// How often the periodic collector runs
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    /// Candidates swept between two interrupt checks
    pub batch_size: usize,
    /// Records younger than this are never collected
    #[serde(with = "duration_secs")]
    pub min_candidate_age: Duration,
    /// How often to prune orphans (relative to main interval)
    pub prune_multiplier: u32,
    /// Temp upload files older than this are removed by prune
    #[serde(with = "duration_secs")]
    pub stale_temp_age: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300), // 5 minutes
            batch_size: 100,
            min_candidate_age: Duration::ZERO,
            prune_multiplier: 12, // Prune once an hour with the default interval
            stale_temp_age: Duration::from_secs(24 * 3600),
        }
    }
}

impl GcConfig {
    pub fn new(interval: Duration, batch_size: usize, min_candidate_age: Duration) -> Self {
        Self {
            interval,
            batch_size,
            min_candidate_age,
            ..Self::default()
        }
    }

    /// Calculate the prune interval
    pub fn prune_interval(&self) -> Duration {
        self.interval * self.prune_multiplier
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
