use std::collections::HashMap;

use crate::client::HaClient;
use crate::error::QueueError;
use crate::queue::{ReadyMap, READY_MAP_KEY};

fn temp_key() -> String {
    format!("{READY_MAP_KEY}:temp")
}

/// Publish a fresh ready map to every live aggregator: stage the hash
/// under a temp key, then RENAME it over the live key so readers never
/// see a half-written map. Returns how many aggregators accepted it.
pub async fn publish_ready_map(client: &HaClient, entries: &HashMap<String, i64>) -> usize {
    let temp = temp_key();
    let mut pipe = redis::pipe();
    pipe.atomic();
    pipe.cmd("DEL").arg(&temp).ignore();
    if entries.is_empty() {
        // Nothing is ready anywhere; RENAME of a missing temp key would
        // fail, so clear the live map instead.
        pipe.cmd("DEL").arg(READY_MAP_KEY).ignore();
    } else {
        for (name, ts) in entries {
            pipe.cmd("HSET").arg(&temp).arg(name).arg(*ts).ignore();
        }
        pipe.cmd("RENAME").arg(&temp).arg(READY_MAP_KEY).ignore();
    }
    client.broadcast_pipe(&pipe).await
}

/// Read the live ready map from the first aggregator that answers.
pub async fn read_ready_map(client: &HaClient) -> Result<ReadyMap, QueueError> {
    let value = client
        .any(redis::cmd("HGETALL").arg(READY_MAP_KEY))
        .await?;
    let pairs: HashMap<String, i64> = redis::from_redis_value(&value)?;
    Ok(ReadyMap::from_hash(pairs))
}
