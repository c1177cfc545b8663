use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// The domain config object, deserialized from the file handed to the
// daemons with --config-file. Designed to be passable across API
// boundaries; immutable once loaded.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Loop id -> loop descriptor.
    #[serde(default)]
    pub loops: HashMap<String, LoopConfig>,

    /// Aggregator endpoints, in preference order.
    #[serde(rename = "aggrSrvs")]
    pub aggregators: Vec<String>,

    /// Partition endpoints holding the per-queue keys.
    #[serde(rename = "queueSrvs")]
    pub partitions: Vec<String>,

    /// Claim TTL seconds per job type, with a "*" fallback entry.
    #[serde(rename = "claimTTLMap", default)]
    pub claim_ttl: HashMap<String, u64>,

    /// Attempt limits per job type, with a "*" fallback entry.
    #[serde(rename = "attemptsMap", default)]
    pub attempts: HashMap<String, u32>,

    #[serde(rename = "hpMaxDelay", default = "default_hp_max_delay")]
    pub hp_max_delay: u64,
    #[serde(rename = "lpMaxDelay", default = "default_lp_max_delay")]
    pub lp_max_delay: u64,
    #[serde(rename = "hpMaxTime", default = "default_hp_max_time")]
    pub hp_max_time: u64,
    #[serde(rename = "lpMaxTime", default = "default_lp_max_time")]
    pub lp_max_time: u64,

    /// The job-execution endpoint requests are POSTed to.
    pub url: String,

    /// Tenant -> Host header value.
    #[serde(default)]
    pub wikis: HashMap<String, String>,

    /// Secret-store project the signing secret is fetched under.
    #[serde(default)]
    pub project: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct LoopConfig {
    /// Concurrency ceiling for this loop's slot pool.
    pub runners: usize,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(rename = "low-priority", default)]
    pub low_priority: Vec<String>,
}

fn default_hp_max_delay() -> u64 {
    120
}

fn default_lp_max_delay() -> u64 {
    600
}

fn default_hp_max_time() -> u64 {
    30
}

fn default_lp_max_time() -> u64 {
    60
}

impl Settings {
    /// Claim TTL for a job type, falling back to the "*" entry, then to a
    /// conservative hour.
    pub fn claim_ttl_for(&self, job_type: &str) -> u64 {
        lookup_with_default(&self.claim_ttl, job_type).copied().unwrap_or(3600)
    }

    /// Attempt limit for a job type, falling back to the "*" entry, then 3.
    pub fn attempts_for(&self, job_type: &str) -> u32 {
        lookup_with_default(&self.attempts, job_type).copied().unwrap_or(3)
    }

    /// Tenants the runner is allowed to dispatch for. A queue naming a
    /// tenant with no configured host is skipped, not guessed at.
    pub fn host_for(&self, tenant: &str) -> Option<&str> {
        self.wikis.get(tenant).map(String::as_str)
    }
}

fn lookup_with_default<'a, V>(map: &'a HashMap<String, V>, key: &str) -> Option<&'a V> {
    map.get(key).or_else(|| map.get("*"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        serde_json::from_str(
            r#"{
                "loops": {
                    "basic": {
                        "runners": 5,
                        "include": ["*"],
                        "exclude": ["webVideoTranscode"],
                        "low-priority": ["refreshLinks"]
                    }
                },
                "aggrSrvs": ["redis://aggr1:6379", "redis://aggr2:6379"],
                "queueSrvs": ["redis://part1:6379"],
                "claimTTLMap": {"*": 3600, "webVideoTranscode": 86400},
                "attemptsMap": {"*": 3},
                "hpMaxDelay": 120,
                "lpMaxDelay": 600,
                "hpMaxTime": 30,
                "lpMaxTime": 60,
                "url": "http://appservers.local/rpc/RunJobs.php",
                "wikis": {"enwiki": "en.wikipedia.org"},
                "project": "jobrunner"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn per_type_maps_fall_back_to_star() {
        let s = sample();
        assert_eq!(s.claim_ttl_for("webVideoTranscode"), 86400);
        assert_eq!(s.claim_ttl_for("refreshLinks"), 3600);
        assert_eq!(s.attempts_for("anything"), 3);
    }

    #[test]
    fn missing_maps_use_built_in_defaults() {
        let s: Settings = serde_json::from_str(
            r#"{"aggrSrvs": [], "queueSrvs": [], "url": "http://x/"}"#,
        )
        .unwrap();
        assert_eq!(s.claim_ttl_for("anything"), 3600);
        assert_eq!(s.attempts_for("anything"), 3);
        assert_eq!(s.hp_max_delay, 120);
        assert_eq!(s.lp_max_time, 60);
    }

    #[test]
    fn unknown_tenant_has_no_host() {
        let s = sample();
        assert_eq!(s.host_for("enwiki"), Some("en.wikipedia.org"));
        assert_eq!(s.host_for("dewiki"), None);
    }

    #[test]
    fn loop_descriptor_round_trips() {
        let s = sample();
        let basic = &s.loops["basic"];
        assert_eq!(basic.runners, 5);
        assert_eq!(basic.include, vec!["*"]);
        assert_eq!(basic.low_priority, vec!["refreshLinks"]);
    }
}
