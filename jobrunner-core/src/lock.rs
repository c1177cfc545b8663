use chrono::Utc;
use redis::from_redis_value;

use crate::client::HaClient;
use crate::error::QueueError;

/// Cooperative at-most-N lock spread over N slot keys on the aggregator
/// pool. A holder that dies simply lets its slot timestamp go stale; the
/// TTL lets the next acquirer take the slot over with GETSET, so there is
/// no single hot key and no reliance on a death signal.
pub struct PoolLock<'a> {
    client: &'a HaClient,
    name: String,
    slots: usize,
    ttl_secs: i64,
}

/// A held slot. Dropping it does not release; callers release explicitly
/// so a lost redis round-trip can be logged rather than ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSlot {
    key: String,
}

impl LockSlot {
    pub fn key(&self) -> &str {
        &self.key
    }
}

fn slot_key(name: &str, i: usize) -> String {
    format!("{name}:lock:{i}")
}

fn is_stale(current: Option<i64>, now: i64, ttl_secs: i64) -> bool {
    match current {
        None => true,
        Some(ts) => ts < now - ttl_secs,
    }
}

impl<'a> PoolLock<'a> {
    pub fn new(client: &'a HaClient, name: &str, slots: usize, ttl_secs: i64) -> Self {
        Self {
            client,
            name: name.to_string(),
            slots,
            ttl_secs,
        }
    }

    pub async fn acquire(&self) -> Result<LockSlot, QueueError> {
        let now = Utc::now().timestamp();
        for i in 0..self.slots {
            let key = slot_key(&self.name, i);

            let current: Option<i64> =
                from_redis_value(&self.client.any(redis::cmd("GET").arg(&key)).await?)?;
            if !is_stale(current, now, self.ttl_secs) {
                continue;
            }

            // The slot looks free (or its holder is dead); race for it.
            // GETSET hands back whatever was there the instant we wrote,
            // so a mismatch means somebody else got in first.
            let prev: Option<i64> = from_redis_value(
                &self
                    .client
                    .any(redis::cmd("GETSET").arg(&key).arg(now))
                    .await?,
            )?;
            if prev == current {
                return Ok(LockSlot { key });
            }
        }
        Err(QueueError::LockUnavailable(self.name.clone()))
    }

    pub async fn refresh(&self, slot: &LockSlot) -> Result<(), QueueError> {
        let now = Utc::now().timestamp();
        self.client
            .any(redis::cmd("SET").arg(slot.key()).arg(now))
            .await?;
        Ok(())
    }

    pub async fn release(&self, slot: LockSlot) -> Result<(), QueueError> {
        self.client.any(redis::cmd("DEL").arg(slot.key())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_keys_are_per_index() {
        assert_eq!(slot_key("jobchron", 0), "jobchron:lock:0");
        assert_eq!(slot_key("jobchron", 7), "jobchron:lock:7");
    }

    #[test]
    fn staleness_window() {
        // Absent is always stale
        assert!(is_stale(None, 1_000, 300));
        // Fresh holder
        assert!(!is_stale(Some(900), 1_000, 300));
        // Exactly at the boundary is still held
        assert!(!is_stale(Some(700), 1_000, 300));
        // Past it is up for grabs
        assert!(is_stale(Some(699), 1_000, 300));
    }
}
