use std::collections::HashMap;
use std::time::{Duration, Instant};

use jobrunner_core::{QueueError, QueueId, ReadyMap};
use rand::Rng;
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::context::AppContext;
use crate::metrics_constants::*;
use crate::priority::Priority;
use crate::select::select_queue;
use crate::sign::signed_body;

// Malformed response bodies are logged for debugging, but never whole.
const MAX_LOGGED_BODY: usize = 4096;

// Exclusively for errors in the daemon itself - nothing here is ever a
// statement about a job, only about our ability to keep dispatching.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    // We failed doing some kind of setup, like creating the http client
    #[error("error during startup: {0}")]
    StartupError(String),
    #[error("no such loop: {0}")]
    UnknownLoop(String),
}

type HttpResult = Result<(u16, String), reqwest::Error>;

/// One entry of the execution endpoint's response: the disposition of a
/// single job from the batch.
#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
}

fn tally(body: &str) -> Result<(u64, u64), serde_json::Error> {
    let statuses: Vec<JobStatus> = serde_json::from_str(body)?;
    let ok = statuses.iter().filter(|s| s.status == "ok").count() as u64;
    Ok((ok, statuses.len() as u64 - ok))
}

fn truncated(body: &str) -> &str {
    if body.len() <= MAX_LOGGED_BODY {
        return body;
    }
    let mut end = MAX_LOGGED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

struct InFlight {
    queue: QueueId,
    started: Instant,
    handle: JoinHandle<HttpResult>,
}

struct LoopSlots {
    slots: Vec<Option<InFlight>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefillOutcome {
    /// Slots still idle after this refill.
    pub free: usize,
    /// Requests newly dispatched (at most one per refill).
    pub started: usize,
}

/// Per-loop pools of in-flight dispatches. A slot is either idle or
/// holds exactly one tagged request; the vector length is the loop's
/// concurrency ceiling and never changes after init.
#[derive(Default)]
pub struct SlotPool {
    loops: HashMap<String, LoopSlots>,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_loop(&mut self, loop_id: &str, runners: usize) {
        let slots = (0..runners).map(|_| None).collect();
        self.loops.insert(loop_id.to_string(), LoopSlots { slots });
    }

    pub fn busy(&self) -> usize {
        self.loops
            .values()
            .flat_map(|l| l.slots.iter())
            .filter(|s| s.is_some())
            .count()
    }

    /// Reap whatever has finished on this loop, then top it up with at
    /// most one new dispatch if the selector finds a queue for a tenant
    /// we actually know how to address.
    pub async fn refill(
        &mut self,
        ctx: &AppContext,
        loop_id: &str,
        priority: Priority,
        ready: &mut ReadyMap,
        rng: &mut impl Rng,
    ) -> Result<RefillOutcome, DispatchError> {
        let cfg = ctx
            .settings
            .loops
            .get(loop_id)
            .ok_or_else(|| DispatchError::UnknownLoop(loop_id.to_string()))?;
        let slots = self
            .loops
            .get_mut(loop_id)
            .ok_or_else(|| DispatchError::UnknownLoop(loop_id.to_string()))?;

        for slot in slots.slots.iter_mut() {
            if matches!(slot, Some(inflight) if inflight.handle.is_finished()) {
                let inflight = slot.take().unwrap();
                reap_one(ctx, inflight, ready).await;
            }
        }

        let free = slots.slots.iter().filter(|s| s.is_none()).count();
        let mut started = 0;
        if free > 0 {
            if let Some(queue) = select_queue(cfg, priority, ready, rng) {
                match ctx.settings.host_for(&queue.tenant) {
                    Some(host) => {
                        let inflight = dispatch(ctx, priority, queue, host);
                        let open = slots
                            .slots
                            .iter_mut()
                            .find(|s| s.is_none())
                            .expect("a free slot was counted");
                        *open = Some(inflight);
                        started = 1;
                    }
                    None => {
                        warn!(tenant = %queue.tenant, "ready queue for a tenant with no configured host");
                    }
                }
            }
        }

        Ok(RefillOutcome {
            free: free - started,
            started,
        })
    }

    /// Abort everything in flight. Returns how many requests were cut
    /// short.
    pub fn terminate(&mut self) -> usize {
        let mut aborted = 0;
        for slots in self.loops.values_mut() {
            for slot in slots.slots.iter_mut() {
                if let Some(inflight) = slot.take() {
                    inflight.handle.abort();
                    aborted += 1;
                }
            }
        }
        aborted
    }
}

async fn reap_one(ctx: &AppContext, inflight: InFlight, ready: &mut ReadyMap) {
    let InFlight {
        queue,
        started,
        handle,
    } = inflight;
    let elapsed = started.elapsed();

    match handle.await {
        Ok(Ok((status, body))) => {
            if !(200..300).contains(&status) {
                warn!(queue = %queue, status, "execution endpoint returned a failure status");
                metrics::counter!(RUNNER_ERRORS, &ctx.metrics_labels).increment(1);
                return;
            }
            match tally(&body) {
                Ok((ok, failed)) => {
                    metrics::counter!(JOBS_OK, &ctx.metrics_labels).increment(ok);
                    metrics::counter!(JOBS_FAILED, &ctx.metrics_labels).increment(failed);
                    // A batch that came back this fast ran out of jobs;
                    // stop feeding that queue until the next map refresh.
                    if elapsed < Duration::from_secs(ctx.settings.hp_max_time) / 2 {
                        ready.remove(&queue);
                    }
                }
                Err(e) => {
                    error!(
                        queue = %queue,
                        error = %e,
                        body = truncated(&body),
                        "malformed runner response"
                    );
                    metrics::counter!(RUNNER_ERRORS, &ctx.metrics_labels).increment(1);
                }
            }
        }
        Ok(Err(e)) => {
            warn!(queue = %queue, error = %e, "dispatch failed");
            metrics::counter!(RUNNER_ERRORS, &ctx.metrics_labels).increment(1);
        }
        Err(e) => {
            error!(queue = %queue, error = %e, "dispatch task died");
            metrics::counter!(RUNNER_ERRORS, &ctx.metrics_labels).increment(1);
        }
    }
}

fn dispatch(ctx: &AppContext, priority: Priority, queue: QueueId, host: &str) -> InFlight {
    // Cross-assignment: a high-priority turn may run long work, so it
    // gets the low-priority time budget, and vice versa.
    let maxtime = match priority {
        Priority::High => ctx.settings.lp_max_time,
        Priority::Low => ctx.settings.hp_max_time,
    };
    let body = signed_body(&queue.job_type, maxtime, &ctx.secret);

    let request = ctx
        .http
        .post(&ctx.settings.url)
        .header(reqwest::header::HOST, host)
        .header(
            reqwest::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .timeout(Duration::from_secs(maxtime + 5))
        .body(body);

    let handle = tokio::spawn(async move {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    });

    metrics::counter!(DISPATCHES, &ctx.metrics_labels).increment(1);

    InFlight {
        queue,
        started: Instant::now(),
        handle,
    }
}
