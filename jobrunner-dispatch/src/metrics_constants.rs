pub const JOBS_OK: &str = "jobrunner_jobs_ok";
pub const JOBS_FAILED: &str = "jobrunner_jobs_failed";
pub const RUNNER_ERRORS: &str = "jobrunner_runner_errors";

pub const DISPATCHES: &str = "jobrunner_dispatches";
pub const BUSY_SLOTS: &str = "jobrunner_busy_slots";
pub const PRIORITY_FLIPS: &str = "jobrunner_priority_flips";

pub const READY_QUEUES_CACHED: &str = "jobrunner_ready_queues_cached";

// Sampled from /proc so operators can watch the daemon's footprint drift
pub const RSS_BYTES: &str = "jobrunner_rss_bytes";
pub const RSS_DELTA_BYTES: &str = "jobrunner_rss_delta_bytes";
