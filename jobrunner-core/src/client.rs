use std::sync::Mutex;
use std::time::{Duration, Instant};

use redis::aio::MultiplexedConnection;
use tokio::time::timeout;
use tracing::warn;

use crate::error::QueueError;
use crate::ENDPOINT_BACKOFF_SECS;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

struct Endpoint {
    addr: String,
    client: redis::Client,
    // Reused across calls; cleared on failure so the next call reconnects.
    conn: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    down_until: Mutex<Option<Instant>>,
}

impl Endpoint {
    fn is_down(&self) -> bool {
        match *self.down_until.lock().unwrap() {
            Some(until) => until > Instant::now(),
            None => false,
        }
    }

    fn mark_down(&self, backoff: Duration) {
        *self.down_until.lock().unwrap() = Some(Instant::now() + backoff);
    }

    fn mark_up(&self) {
        *self.down_until.lock().unwrap() = None;
    }
}

/// A set of equivalent redis endpoints, addressed individually, by
/// first-success, or all at once. Commands are opaque; results are
/// returned as raw `redis::Value`s for the caller to interpret.
pub struct HaClient {
    name: String,
    endpoints: Vec<Endpoint>,
    backoff: Duration,
}

impl HaClient {
    pub fn new(name: &str, addrs: &[String]) -> Result<Self, QueueError> {
        let endpoints = addrs
            .iter()
            .map(|addr| {
                Ok(Endpoint {
                    addr: addr.clone(),
                    client: redis::Client::open(addr.as_str())?,
                    conn: tokio::sync::Mutex::new(None),
                    down_until: Mutex::new(None),
                })
            })
            .collect::<Result<Vec<_>, redis::RedisError>>()?;
        Ok(Self {
            name: name.to_string(),
            endpoints,
            backoff: Duration::from_secs(ENDPOINT_BACKOFF_SECS),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addrs(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|e| e.addr.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn endpoint(&self, addr: &str) -> Result<&Endpoint, QueueError> {
        self.endpoints
            .iter()
            .find(|e| e.addr == addr)
            .ok_or_else(|| QueueError::UnknownEndpoint(addr.to_string()))
    }

    /// A multiplexed connection to one named endpoint, for callers that
    /// need to drive something other than a plain command (scripts,
    /// pipelines). Connection failures mark the endpoint down.
    pub async fn connection(&self, addr: &str) -> Result<MultiplexedConnection, QueueError> {
        let endpoint = self.endpoint(addr)?;
        self.connect(endpoint).await
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<MultiplexedConnection, QueueError> {
        let mut guard = endpoint.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let connected = timeout(
            COMMAND_TIMEOUT,
            endpoint.client.get_multiplexed_async_connection(),
        )
        .await;
        match connected {
            Ok(Ok(conn)) => {
                *guard = Some(conn.clone());
                Ok(conn)
            }
            Ok(Err(e)) => {
                endpoint.mark_down(self.backoff);
                Err(e.into())
            }
            Err(_) => {
                endpoint.mark_down(self.backoff);
                Err(QueueError::Timeout(endpoint.addr.clone()))
            }
        }
    }

    async fn issue(&self, endpoint: &Endpoint, cmd: &redis::Cmd) -> Result<redis::Value, QueueError> {
        let mut conn = self.connect(endpoint).await?;
        match timeout(COMMAND_TIMEOUT, cmd.query_async::<redis::Value>(&mut conn)).await {
            Ok(Ok(value)) => {
                endpoint.mark_up();
                Ok(value)
            }
            Ok(Err(e)) => {
                // Server-side errors (wrong type, script error) are not a
                // reason to fail the endpoint over; connection drops are.
                if e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() {
                    endpoint.conn.lock().await.take();
                    endpoint.mark_down(self.backoff);
                }
                Err(e.into())
            }
            Err(_) => {
                endpoint.conn.lock().await.take();
                endpoint.mark_down(self.backoff);
                Err(QueueError::Timeout(endpoint.addr.clone()))
            }
        }
    }

    /// Issue against one named endpoint. Transport failures put the
    /// endpoint into back-off and are surfaced to the caller.
    pub async fn on(&self, addr: &str, cmd: &redis::Cmd) -> Result<redis::Value, QueueError> {
        let endpoint = self.endpoint(addr)?;
        self.issue(endpoint, cmd).await
    }

    /// Try endpoints in order until one takes the command. Endpoints in
    /// back-off are skipped and count as failed for this call.
    pub async fn any(&self, cmd: &redis::Cmd) -> Result<redis::Value, QueueError> {
        for endpoint in &self.endpoints {
            if endpoint.is_down() {
                continue;
            }
            match self.issue(endpoint, cmd).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(pool = %self.name, endpoint = %endpoint.addr, error = %e, "endpoint failed, trying next");
                }
            }
        }
        Err(QueueError::AllEndpointsDown(self.name.clone()))
    }

    /// Issue against every live endpoint; returns how many succeeded.
    pub async fn broadcast(&self, cmd: &redis::Cmd) -> usize {
        let mut ok = 0;
        for endpoint in &self.endpoints {
            if endpoint.is_down() {
                continue;
            }
            match self.issue(endpoint, cmd).await {
                Ok(_) => ok += 1,
                Err(e) => {
                    warn!(pool = %self.name, endpoint = %endpoint.addr, error = %e, "broadcast skipped endpoint");
                }
            }
        }
        ok
    }

    /// Run an atomic pipeline against every live endpoint; returns how
    /// many accepted it.
    pub async fn broadcast_pipe(&self, pipe: &redis::Pipeline) -> usize {
        let mut ok = 0;
        for endpoint in &self.endpoints {
            if endpoint.is_down() {
                continue;
            }
            let mut conn = match self.connect(endpoint).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(pool = %self.name, endpoint = %endpoint.addr, error = %e, "broadcast skipped endpoint");
                    continue;
                }
            };
            match timeout(COMMAND_TIMEOUT, pipe.query_async::<redis::Value>(&mut conn)).await {
                Ok(Ok(_)) => {
                    endpoint.mark_up();
                    ok += 1;
                }
                Ok(Err(e)) => {
                    if e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal() {
                        endpoint.conn.lock().await.take();
                        endpoint.mark_down(self.backoff);
                    }
                    warn!(pool = %self.name, endpoint = %endpoint.addr, error = %e, "broadcast pipeline failed");
                }
                Err(_) => {
                    endpoint.conn.lock().await.take();
                    endpoint.mark_down(self.backoff);
                    warn!(pool = %self.name, endpoint = %endpoint.addr, "broadcast pipeline timed out");
                }
            }
        }
        ok
    }
}
