pub const CYCLE_STARTS: &str = "jobchron_cycle_starts";
pub const CYCLE_TIME: &str = "jobchron_total_cycle_ms";
pub const CYCLE_ENDS: &str = "jobchron_cycle_ends";
pub const CYCLE_RACED: &str = "jobchron_cycles_raced";
pub const CYCLE_FAILED: &str = "jobchron_cycles_failed";

pub const RELEASED_COUNT: &str = "jobchron_claims_recycled";
pub const ABANDONED_COUNT: &str = "jobchron_jobs_abandoned";
pub const PRUNED_COUNT: &str = "jobchron_jobs_pruned";
pub const UNDELAYED_COUNT: &str = "jobchron_jobs_undelayed";

pub const QUEUES_SEEN: &str = "jobchron_queues_reclaimed";
pub const SCRIPT_ERRORS: &str = "jobchron_script_errors";
pub const PARTITION_ERRORS: &str = "jobchron_partition_errors";

// Depth of the published map, so dashboards can see readiness spread
pub const READY_QUEUES: &str = "jobchron_ready_queues";
