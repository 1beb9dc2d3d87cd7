// Periodic refresh loops, one per (symbol, interval).
use shared::{ErrorKind, Interval, PipelineFailure, PipelineState, RefreshStatus};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::orchestrator::Orchestrator;
use super::publisher::Publisher;
use super::timer::Timer;
use crate::error::{EngineError, EngineResult};
use crate::forecast::TrainingGate;

type LoopKey = (String, Interval);

/// Removes the loop key from the registry when the loop task ends.
struct Registration {
    registry: Arc<Mutex<HashSet<LoopKey>>>,
    key: LoopKey,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Ok(mut running) = self.registry.lock() {
            running.remove(&self.key);
        }
    }
}

pub struct RefreshScheduler {
    orchestrator: Arc<Orchestrator>,
    publisher: Arc<dyn Publisher>,
    timer: Arc<dyn Timer>,
    gate: TrainingGate,
    max_backoff: Duration,
    running: Arc<Mutex<HashSet<LoopKey>>>,
}

/// Control handle for one running loop.
pub struct RefreshHandle {
    symbol: String,
    interval: Interval,
    stop: CancellationToken,
    state: watch::Receiver<PipelineState>,
    task: JoinHandle<PipelineState>,
}

impl RefreshHandle {
    /// Requests a stop; takes effect before the next fetch.
    pub fn stop(&self) {
        tracing::info!(symbol = %self.symbol, interval = %self.interval, "Stop requested");
        self.stop.cancel();
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Waits for the loop to finish and returns its final state.
    pub async fn join(self) -> EngineResult<PipelineState> {
        self.task
            .await
            .map_err(|e| EngineError::ProcessingError(format!("refresh loop task failed: {}", e)))
    }
}

struct LoopContext {
    orchestrator: Arc<Orchestrator>,
    publisher: Arc<dyn Publisher>,
    timer: Arc<dyn Timer>,
    gate: TrainingGate,
    period: Duration,
    max_backoff: Duration,
    stop: CancellationToken,
    cancel: CancellationToken,
    state_tx: watch::Sender<PipelineState>,
    _registration: Registration,
}

impl RefreshScheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        publisher: Arc<dyn Publisher>,
        timer: Arc<dyn Timer>,
        gate: TrainingGate,
        max_backoff: Duration,
    ) -> Self {
        Self {
            orchestrator,
            publisher,
            timer,
            gate,
            max_backoff,
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn is_running(&self, symbol: &str, interval: Interval) -> bool {
        self.running
            .lock()
            .map(|running| running.contains(&(symbol.to_string(), interval)))
            .unwrap_or(false)
    }

    pub fn start(&self, symbol: &str, interval: Interval, period: Duration) -> EngineResult<RefreshHandle> {
        self.start_with_cancel(symbol, interval, period, CancellationToken::new())
    }

    /// Starts a loop that also ends, as `Cancelled`, when `cancel` fires.
    pub fn start_with_cancel(
        &self,
        symbol: &str,
        interval: Interval,
        period: Duration,
        cancel: CancellationToken,
    ) -> EngineResult<RefreshHandle> {
        if period.is_zero() {
            return Err(EngineError::ConfigError("refresh period must be greater than zero".to_string()));
        }
        let key = (symbol.to_string(), interval);
        {
            let mut running = self
                .running
                .lock()
                .map_err(|_| EngineError::ProcessingError("refresh registry poisoned".to_string()))?;
            if !running.insert(key.clone()) {
                tracing::warn!(symbol, %interval, "Refresh loop already running");
                return Err(EngineError::AlreadyRunning(format!("{} {}", symbol, interval)));
            }
        }

        let initial = PipelineState::idle(symbol, interval).with_status(RefreshStatus::Running);
        let (state_tx, state_rx) = watch::channel(initial.clone());
        self.publisher.publish(&initial);
        tracing::info!(symbol, %interval, period_secs = period.as_secs_f64(), run_id = %initial.run_id, "Refresh loop started");

        let stop = CancellationToken::new();
        let ctx = LoopContext {
            orchestrator: self.orchestrator.clone(),
            publisher: self.publisher.clone(),
            timer: self.timer.clone(),
            gate: self.gate.clone(),
            period,
            max_backoff: self.max_backoff.max(period),
            stop: stop.clone(),
            cancel,
            state_tx,
            _registration: Registration { registry: self.running.clone(), key },
        };
        let task = tokio::spawn(run_loop(ctx));

        Ok(RefreshHandle {
            symbol: symbol.to_string(),
            interval,
            stop,
            state: state_rx,
            task,
        })
    }
}

fn termination(stop: &CancellationToken, cancel: &CancellationToken) -> Option<RefreshStatus> {
    if stop.is_cancelled() {
        Some(RefreshStatus::Stopped)
    } else if cancel.is_cancelled() {
        Some(RefreshStatus::Cancelled)
    } else {
        None
    }
}

/// Doubles the wait after a rate-limited cycle, never below the upstream
/// `Retry-After` hint, capped at `max`. Resets on success.
fn next_backoff(
    current: Option<Duration>,
    error: Option<&PipelineFailure>,
    period: Duration,
    max: Duration,
) -> Option<Duration> {
    match error {
        Some(failure) if failure.kind == ErrorKind::RateLimited => {
            let doubled = current.unwrap_or(period).saturating_mul(2);
            let hint = failure.retry_after_secs.map(Duration::from_secs).unwrap_or_default();
            Some(doubled.max(hint).min(max))
        }
        Some(_) => current,
        None => None,
    }
}

async fn run_loop(ctx: LoopContext) -> PipelineState {
    let mut state = ctx.state_tx.borrow().clone();
    let mut backoff: Option<Duration> = None;

    let final_status = loop {
        if let Some(status) = termination(&ctx.stop, &ctx.cancel) {
            break status;
        }

        let result = {
            let _permit = tokio::select! {
                permit = ctx.gate.fetch_permit() => permit,
                _ = ctx.stop.cancelled() => continue,
                _ = ctx.cancel.cancelled() => continue,
            };
            ctx.orchestrator.run_interval(&state.symbol, state.interval).await
        };

        if let Some(status) = termination(&ctx.stop, &ctx.cancel) {
            tracing::info!(symbol = %state.symbol, interval = %state.interval, "Discarding result of in-flight fetch");
            break status;
        }

        backoff = next_backoff(backoff, result.error.as_ref(), ctx.period, ctx.max_backoff);
        state = state.with_result(state.cycle + 1, result);
        ctx.state_tx.send_replace(state.clone());
        ctx.publisher.publish(&state);

        let wait = backoff.unwrap_or(ctx.period);
        if backoff.is_some() {
            tracing::warn!(symbol = %state.symbol, interval = %state.interval, wait_secs = wait.as_secs_f64(), "Backing off after rate limit");
        }
        tokio::select! {
            _ = ctx.timer.sleep(wait) => {}
            _ = ctx.stop.cancelled() => {}
            _ = ctx.cancel.cancelled() => {}
        }
    };

    state = state.with_status(final_status);
    ctx.state_tx.send_replace(state.clone());
    ctx.publisher.publish(&state);
    tracing::info!(
        symbol = %state.symbol,
        interval = %state.interval,
        status = ?final_status,
        cycles = state.cycle,
        "Refresh loop ended"
    );
    state
}
