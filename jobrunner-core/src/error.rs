#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("no endpoint in the {0} pool would take the command")]
    AllEndpointsDown(String),
    #[error("redis command timed out on {0}")]
    Timeout(String),
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),
    #[error("no free slot on lock {0}")]
    LockUnavailable(String), // Expected under contention - callers count it and move on
    #[error("malformed queue name: {0}")]
    BadQueueName(String),
}

impl QueueError {
    /// True for failures that indicate the remote end (or the path to it)
    /// is unhealthy, as opposed to a caller mistake.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            QueueError::Redis(_) | QueueError::AllEndpointsDown(_) | QueueError::Timeout(_)
        )
    }
}
