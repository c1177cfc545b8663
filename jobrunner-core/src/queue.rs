use std::collections::HashMap;
use std::fmt;

use crate::error::QueueError;

/// Cluster-wide set of encoded queue names that hold any live job,
/// maintained by the reclaim script on each partition.
pub const QUEUES_WITH_JOBS_KEY: &str = "global:jobqueue:s-queuesWithJobs";

/// Aggregator hash of encoded queue name -> last-ready epoch seconds.
/// Writes stage into "<key>:temp" and RENAME over this.
pub const READY_MAP_KEY: &str = "global:jobqueue:h-readyQueues";

/// Identity of one queue: a (type, tenant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueId {
    pub job_type: String,
    pub tenant: String,
}

impl QueueId {
    pub fn new(job_type: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            tenant: tenant.into(),
        }
    }

    /// Canonical encoded form, as stored in the queues-with-jobs set and
    /// the aggregator ready map. The escaping makes the mapping bijective
    /// even when a type or tenant contains '/' or '%'.
    pub fn encode(&self) -> String {
        format!("{}/{}", escape(&self.job_type), escape(&self.tenant))
    }

    pub fn decode(encoded: &str) -> Result<Self, QueueError> {
        let (job_type, tenant) = encoded
            .split_once('/')
            .ok_or_else(|| QueueError::BadQueueName(encoded.to_string()))?;
        Ok(Self {
            job_type: unescape(job_type)
                .ok_or_else(|| QueueError::BadQueueName(encoded.to_string()))?,
            tenant: unescape(tenant)
                .ok_or_else(|| QueueError::BadQueueName(encoded.to_string()))?,
        })
    }

    pub fn keys(&self) -> QueueKeys {
        QueueKeys::new(self)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.job_type, self.tenant)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-' | b'.' => out.push(b as char),
            _ => {
                out.push('%');
                out.push_str(&format!("{b:02x}"));
            }
        }
    }
    out
}

fn unescape(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// The per-queue key set on a partition, in the order the reclaim script
/// expects them.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    pub claimed: String,
    pub attempts: String,
    pub unclaimed: String,
    pub data: String,
    pub abandoned: String,
    pub delayed: String,
}

impl QueueKeys {
    fn new(id: &QueueId) -> Self {
        let base = format!("{}:jobqueue:{}", id.tenant, id.job_type);
        Self {
            claimed: format!("{base}:z-claimed"),
            attempts: format!("{base}:h-attempts"),
            unclaimed: format!("{base}:l-unclaimed"),
            data: format!("{base}:h-data"),
            abandoned: format!("{base}:z-abandoned"),
            delayed: format!("{base}:z-delayed"),
        }
    }
}

/// The aggregator ready map, viewed as type -> tenant -> last-ready
/// epoch seconds. Entries whose name fails to decode are dropped rather
/// than failing the whole read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadyMap {
    entries: HashMap<String, HashMap<String, i64>>,
}

impl ReadyMap {
    pub fn from_hash(pairs: impl IntoIterator<Item = (String, i64)>) -> Self {
        let mut map = ReadyMap::default();
        for (name, ts) in pairs {
            if let Ok(id) = QueueId::decode(&name) {
                map.insert(&id, ts);
            }
        }
        map
    }

    pub fn insert(&mut self, id: &QueueId, ts: i64) {
        self.entries
            .entry(id.job_type.clone())
            .or_default()
            .insert(id.tenant.clone(), ts);
    }

    pub fn remove(&mut self, id: &QueueId) {
        if let Some(tenants) = self.entries.get_mut(&id.job_type) {
            tenants.remove(&id.tenant);
            if tenants.is_empty() {
                self.entries.remove(&id.job_type);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn tenants_of<'a>(&'a self, job_type: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .get(job_type)
            .into_iter()
            .flat_map(|tenants| tenants.keys().map(String::as_str))
    }

    pub fn contains_type(&self, job_type: &str) -> bool {
        self.entries.contains_key(job_type)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_bijective_for_plain_names() {
        let id = QueueId::new("refreshLinks", "enwiki");
        assert_eq!(id.encode(), "refreshLinks/enwiki");
        assert_eq!(QueueId::decode("refreshLinks/enwiki").unwrap(), id);
    }

    #[test]
    fn encode_escapes_separator_and_percent() {
        let id = QueueId::new("a/b", "c%d");
        let enc = id.encode();
        // Exactly one unescaped separator survives
        assert_eq!(enc.matches('/').count(), 1);
        assert_eq!(QueueId::decode(&enc).unwrap(), id);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(QueueId::decode("no-separator").is_err());
        assert!(QueueId::decode("bad%zz/enwiki").is_err());
        assert!(QueueId::decode("truncated%2/enwiki").is_err());
    }

    #[test]
    fn key_layout() {
        let keys = QueueId::new("refreshLinks", "enwiki").keys();
        assert_eq!(keys.claimed, "enwiki:jobqueue:refreshLinks:z-claimed");
        assert_eq!(keys.attempts, "enwiki:jobqueue:refreshLinks:h-attempts");
        assert_eq!(keys.unclaimed, "enwiki:jobqueue:refreshLinks:l-unclaimed");
        assert_eq!(keys.data, "enwiki:jobqueue:refreshLinks:h-data");
        assert_eq!(keys.abandoned, "enwiki:jobqueue:refreshLinks:z-abandoned");
        assert_eq!(keys.delayed, "enwiki:jobqueue:refreshLinks:z-delayed");
    }

    #[test]
    fn ready_map_groups_by_type() {
        let map = ReadyMap::from_hash(vec![
            ("refreshLinks/enwiki".to_string(), 100),
            ("refreshLinks/dewiki".to_string(), 101),
            ("htmlCacheUpdate/enwiki".to_string(), 102),
            ("not-a-queue-name".to_string(), 103), // dropped
        ]);
        assert_eq!(map.len(), 3);
        let mut tenants: Vec<_> = map.tenants_of("refreshLinks").collect();
        tenants.sort_unstable();
        assert_eq!(tenants, vec!["dewiki", "enwiki"]);
        assert!(map.contains_type("htmlCacheUpdate"));
        assert!(!map.contains_type("not-a-queue-name"));
    }

    #[test]
    fn ready_map_remove_drops_empty_types() {
        let mut map = ReadyMap::default();
        let id = QueueId::new("refreshLinks", "enwiki");
        map.insert(&id, 100);
        map.remove(&id);
        assert!(map.is_empty());
        assert!(!map.contains_type("refreshLinks"));
    }
}
