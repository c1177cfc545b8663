use redis::aio::MultiplexedConnection;

use crate::error::QueueError;
use crate::queue::{QueueId, QUEUES_WITH_JOBS_KEY};

const RECLAIM_LUA: &str = include_str!("lua/reclaim.lua");

/// Arguments for one reclamation pass over one queue.
#[derive(Debug, Clone)]
pub struct ReclaimParams {
    pub queue: QueueId,
    /// Claims with a timestamp at or below this are expired.
    pub claim_cutoff: i64,
    /// Abandoned entries with a timestamp at or below this are deleted.
    pub prune_cutoff: i64,
    /// Jobs at or past this many attempts are abandoned instead of
    /// released.
    pub attempts_limit: u32,
    pub now: i64,
    /// Per-structure item cap for this pass.
    pub limit: usize,
}

/// What one pass did, in job counts, plus the resulting ready length.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimOutcome {
    pub released: u64,
    pub abandoned: u64,
    pub pruned: u64,
    pub undelayed: u64,
    pub ready: u64,
}

impl ReclaimOutcome {
    pub fn accumulate(&mut self, other: ReclaimOutcome) {
        self.released += other.released;
        self.abandoned += other.abandoned;
        self.pruned += other.pruned;
        self.undelayed += other.undelayed;
        self.ready += other.ready;
    }
}

/// Wrapper around the server-side reclamation script. The SHA is derived
/// from the script body at construction, so EVALSHA against a warm
/// server never re-uploads across daemon restarts.
pub struct Reclaimer {
    script: redis::Script,
}

impl Default for Reclaimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reclaimer {
    pub fn new() -> Self {
        Self {
            script: redis::Script::new(RECLAIM_LUA),
        }
    }

    /// Upload the script to one partition ahead of a round of
    /// invocations, so the EVALSHA fast path holds for every queue.
    pub async fn load(&self, conn: &mut MultiplexedConnection) -> Result<(), QueueError> {
        self.script.prepare_invoke().load_async(conn).await?;
        Ok(())
    }

    pub async fn run(
        &self,
        conn: &mut MultiplexedConnection,
        params: &ReclaimParams,
    ) -> Result<ReclaimOutcome, QueueError> {
        let keys = params.queue.keys();
        let (released, abandoned, pruned, undelayed, ready): (u64, u64, u64, u64, u64) = self
            .script
            .key(&keys.claimed)
            .key(&keys.attempts)
            .key(&keys.unclaimed)
            .key(&keys.data)
            .key(&keys.abandoned)
            .key(&keys.delayed)
            .key(QUEUES_WITH_JOBS_KEY)
            .arg(params.claim_cutoff)
            .arg(params.prune_cutoff)
            .arg(params.attempts_limit)
            .arg(params.now)
            .arg(params.queue.encode())
            .arg(params.limit)
            .invoke_async(conn)
            .await?;
        Ok(ReclaimOutcome {
            released,
            abandoned,
            pruned,
            undelayed,
            ready,
        })
    }
}
