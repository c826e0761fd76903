//! Order polling.
//!
//! One timer task per armed cycle and at most one fetch in flight. All of the
//! bookkeeping lives in [`SchedulerState`] behind a single mutex; the phase is
//! derived from it rather than stored.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use portal_types::domain::notification::Notification;
use portal_types::ports::notifier::Notifier;
use portal_types::ports::order_gateway::{FetchOutcome, OrderGateway, OrderList};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::board::OrderBoard;

pub const DEFAULT_BASE_INTERVAL: Duration = Duration::from_millis(3_000);
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_millis(30_000);
pub const OFFLINE_NOTICE: &str = "You are offline. Showing cached data.";

/// `min(base * 2^error_count, cap)`, saturating at the cap.
pub fn backoff_interval(base: Duration, error_count: u32, cap: Duration) -> Duration {
    2u32.checked_pow(error_count)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(cap, |d| d.min(cap))
}

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub base_interval: Duration,
    pub max_interval: Duration,
    pub enabled: bool,
}

impl PollSettings {
    /// A zero base never waits between fetches and a cap below the base
    /// would shrink the interval on failure.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.base_interval.is_zero(),
            "poll interval must be greater than zero"
        );
        anyhow::ensure!(
            self.max_interval >= self.base_interval,
            "max poll interval ({:?}) is below the poll interval ({:?})",
            self.max_interval,
            self.base_interval
        );
        Ok(())
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base_interval: DEFAULT_BASE_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Idle,
    Scheduled,
    Fetching,
    Backoff,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollStatus {
    pub phase: PollPhase,
    pub interval_ms: u64,
    pub error_count: u32,
    pub last_updated: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub visible: bool,
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InFlight,
    Hidden,
    NetworkDown,
    /// The timer cycle was disarmed while this tick waited.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PollResult {
    Updated {
        count: usize,
        newly_seen: Vec<String>,
    },
    /// Showing cached or no data; the next attempt is backed off.
    Offline { count: usize, retry_in_ms: u64 },
    Cancelled,
    Skipped { reason: SkipReason },
}

struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

pub struct SchedulerState {
    base: Duration,
    max: Duration,
    interval: Duration,
    error_count: u32,
    in_flight: Option<InFlight>,
    timer: Option<CancellationToken>,
    next_fetch_id: u64,
    last_updated: Option<DateTime<Utc>>,
    enabled: bool,
    visible: bool,
    online: bool,
    showing_offline: bool,
}

impl SchedulerState {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            base: settings.base_interval,
            max: settings.max_interval,
            interval: settings.base_interval,
            error_count: 0,
            in_flight: None,
            timer: None,
            next_fetch_id: 0,
            last_updated: None,
            enabled: settings.enabled,
            visible: true,
            online: true,
            showing_offline: false,
        }
    }

    pub fn phase(&self) -> PollPhase {
        if self.is_fetching() {
            PollPhase::Fetching
        } else if self.timer.is_none() {
            PollPhase::Idle
        } else if self.error_count > 0 {
            PollPhase::Backoff
        } else {
            PollPhase::Scheduled
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.interval = self.base;
    }

    pub fn record_success(&mut self) {
        self.reset();
        self.last_updated = Some(Utc::now());
    }

    /// Counts the failure and returns the interval until the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.error_count = self.error_count.saturating_add(1);
        self.interval = backoff_interval(self.base, self.error_count, self.max);
        self.interval
    }

    /// Records that the board now shows offline data. True only on the switch
    /// from live data.
    pub fn mark_offline(&mut self) -> bool {
        !std::mem::replace(&mut self.showing_offline, true)
    }

    pub fn mark_live(&mut self) {
        self.showing_offline = false;
    }

    /// Marks a fetch as started. `None` while another one is still running.
    pub fn begin_fetch(&mut self) -> Option<(u64, CancellationToken)> {
        if self.in_flight.is_some() {
            return None;
        }
        self.next_fetch_id += 1;
        let cancel = CancellationToken::new();
        self.in_flight = Some(InFlight {
            id: self.next_fetch_id,
            cancel: cancel.clone(),
        });
        Some((self.next_fetch_id, cancel))
    }

    /// Clears the in-flight marker if it still belongs to fetch `id`.
    pub fn finish_fetch(&mut self, id: u64) -> bool {
        match &self.in_flight {
            Some(f) if f.id == id => {
                self.in_flight = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel_in_flight(&mut self) {
        if let Some(f) = self.in_flight.take() {
            f.cancel.cancel();
        }
    }

    /// Arms a new timer cycle. `None` when one is already armed.
    pub fn arm_timer(&mut self) -> Option<CancellationToken> {
        if self.timer.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        self.timer = Some(token.clone());
        Some(token)
    }

    pub fn disarm_timer(&mut self) {
        if let Some(t) = self.timer.take() {
            t.cancel();
        }
    }

    pub fn status(&self) -> PollStatus {
        PollStatus {
            phase: self.phase(),
            interval_ms: self.interval.as_millis() as u64,
            error_count: self.error_count,
            last_updated: self.last_updated,
            enabled: self.enabled,
            visible: self.visible,
            online: self.online,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger<'a> {
    /// A tick of the armed cycle owning this token.
    Timer(&'a CancellationToken),
    Manual,
}

struct Inner<G: OrderGateway> {
    gateway: Arc<G>,
    board: OrderBoard,
    notifier: Arc<dyn Notifier>,
    state: Mutex<SchedulerState>,
    fetch_done: Notify,
}

pub struct PollingScheduler<G: OrderGateway> {
    inner: Arc<Inner<G>>,
}

impl<G: OrderGateway> Clone for PollingScheduler<G> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<G: OrderGateway> PollingScheduler<G> {
    pub fn new(
        gateway: Arc<G>,
        board: OrderBoard,
        settings: PollSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                board,
                notifier,
                state: Mutex::new(SchedulerState::new(settings)),
                fetch_done: Notify::new(),
            }),
        }
    }

    pub fn board(&self) -> &OrderBoard {
        &self.inner.board
    }

    pub async fn status(&self) -> PollStatus {
        self.inner.state.lock().await.status()
    }

    /// Arms the timer and polls right away. Returns false when polling is
    /// disabled, the view is hidden or a cycle is already armed.
    pub async fn start(&self) -> bool {
        let token = {
            let mut state = self.inner.state.lock().await;
            if !state.enabled || !state.visible {
                return false;
            }
            match state.arm_timer() {
                Some(token) => token,
                None => return false,
            }
        };
        info!("order polling started");
        let this = self.clone();
        tokio::spawn(async move { this.run_timer(token).await });
        true
    }

    pub async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        state.disarm_timer();
        state.cancel_in_flight();
        info!("order polling stopped");
    }

    /// Polls now with fresh backoff bookkeeping. Still refuses to overlap a
    /// fetch that is already running.
    pub async fn refresh(&self) -> PollResult {
        self.inner.state.lock().await.reset();
        self.poll(Trigger::Manual).await
    }

    /// Like [`refresh`](Self::refresh), but a fetch already running is waited
    /// out instead of skipped, so the data lands from a request sent after
    /// this call began.
    pub async fn refresh_latest(&self) -> PollResult {
        loop {
            let done = self.inner.fetch_done.notified();
            match self.refresh().await {
                PollResult::Skipped {
                    reason: SkipReason::InFlight,
                } => {
                    debug!("waiting for the running fetch before refreshing");
                    done.await;
                }
                other => return other,
            }
        }
    }

    pub async fn set_visibility(&self, visible: bool) {
        {
            let mut state = self.inner.state.lock().await;
            if state.visible == visible {
                return;
            }
            state.visible = visible;
            if !visible {
                state.disarm_timer();
                state.cancel_in_flight();
                debug!("view hidden, polling paused");
                return;
            }
            state.reset();
        }
        debug!("view visible, polling resumed");
        self.start().await;
    }

    pub async fn set_online(&self, online: bool) {
        self.inner.board.set_offline(!online).await;
        let armed = {
            let mut state = self.inner.state.lock().await;
            state.online = online;
            if !online {
                warn!("network reported offline");
                return;
            }
            if !state.enabled {
                return;
            }
            state.reset();
            state.is_armed()
        };
        info!("network back online");
        if armed {
            self.refresh().await;
        } else {
            self.start().await;
        }
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.inner.state.lock().await.enabled = enabled;
        if enabled {
            self.start().await;
        } else {
            self.stop().await;
        }
    }

    async fn run_timer(self, token: CancellationToken) {
        while !token.is_cancelled() {
            let result = self.poll(Trigger::Timer(&token)).await;
            debug!(?result, "poll tick");
            let wait = self.inner.state.lock().await.interval();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        debug!("poll timer released");
    }

    async fn poll(&self, trigger: Trigger<'_>) -> PollResult {
        let (id, cancel) = {
            let mut state = self.inner.state.lock().await;
            if let Trigger::Timer(cycle) = trigger {
                if cycle.is_cancelled() || !state.enabled {
                    return PollResult::Skipped {
                        reason: SkipReason::Stopped,
                    };
                }
                if !state.visible {
                    return PollResult::Skipped {
                        reason: SkipReason::Hidden,
                    };
                }
                if !state.online {
                    return PollResult::Skipped {
                        reason: SkipReason::NetworkDown,
                    };
                }
            }
            match state.begin_fetch() {
                Some(started) => started,
                None => {
                    debug!(?trigger, "fetch already in flight, skipping");
                    return PollResult::Skipped {
                        reason: SkipReason::InFlight,
                    };
                }
            }
        };

        let outcome = self.inner.gateway.fetch_orders(&cancel).await;
        let result = self.land(id, &cancel, outcome).await;
        self.inner.fetch_done.notify_waiters();
        result
    }

    async fn land(&self, id: u64, cancel: &CancellationToken, outcome: FetchOutcome) -> PollResult {
        // Held until the board is updated so the next fetch cannot start
        // before this one has fully landed.
        let mut state = self.inner.state.lock().await;
        let list: OrderList = match outcome {
            FetchOutcome::Fetched(list) if !cancel.is_cancelled() => list,
            _ => {
                state.finish_fetch(id);
                debug!(fetch = id, "fetch cancelled, result discarded");
                return PollResult::Cancelled;
            }
        };
        if !state.finish_fetch(id) {
            return PollResult::Cancelled;
        }

        let offline = list.offline;
        let count = list.orders.len();
        let newly_seen = self.inner.board.apply_fetch(list).await;
        if offline {
            let retry_in = state.record_failure();
            warn!(
                error_count = state.error_count(),
                retry_in_ms = retry_in.as_millis() as u64,
                "orders unavailable, showing offline data"
            );
            if state.mark_offline() {
                self.inner.notifier.notify(Notification::warning(OFFLINE_NOTICE));
            }
            PollResult::Offline {
                count,
                retry_in_ms: retry_in.as_millis() as u64,
            }
        } else {
            state.record_success();
            state.mark_live();
            debug!(count, new = newly_seen.len(), "orders synced");
            PollResult::Updated { count, newly_seen }
        }
    }
}
