mod client;
mod error;
mod lock;
mod queue;
mod ready;
mod reclaim;
mod settings;

pub mod serve;

pub use client::HaClient;
pub use error::QueueError;
pub use lock::{LockSlot, PoolLock};
pub use queue::{QueueId, QueueKeys, ReadyMap, QUEUES_WITH_JOBS_KEY, READY_MAP_KEY};
pub use ready::{publish_ready_map, read_ready_map};
pub use reclaim::{ReclaimOutcome, ReclaimParams, Reclaimer};
pub use settings::{LoopConfig, Settings};

// How long a failed endpoint sits out before the HA client will route
// commands to it again.
pub const ENDPOINT_BACKOFF_SECS: u64 = 5;
