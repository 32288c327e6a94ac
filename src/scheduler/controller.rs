use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::diagnostics::{TriggerContext, TRIGGER_EVENT};
use crate::gateway::Gateway;
use crate::models::{DayStats, Severity};
use crate::settings::SchedulerSettings;

use super::commands::SchedulerCommand;
use super::duration::{budget_minutes, session_duration_ms, thread_durations, ThreadCount, ThrottleLevel};
use super::state::{
    ActiveTimers, SchedulerSnapshot, SchedulerState, SystemStatus, ThreadOutcome, TriggerSource,
};
use super::toast::{phase_end_toast, ThreadTag, Toast};
use super::SchedulerError;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const EVENT_CAPACITY: usize = 64;

/// What the presentation layer hears about.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SchedulerEvent {
    StatusChanged { status: SystemStatus },
    Toast(Toast),
    ToastDismissed { id: u64 },
    StatsUpdated(DayStats),
}

/// Owner of the session state machine. Cloning shares the same state.
#[derive(Clone)]
pub struct SessionScheduler {
    state: Arc<Mutex<SchedulerState>>,
    gateway: Gateway,
    settings: SchedulerSettings,
    rng: Arc<std::sync::Mutex<StdRng>>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl SessionScheduler {
    pub fn new(gateway: Gateway, settings: SchedulerSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(SchedulerState::new(Utc::now()))),
            gateway,
            settings,
            rng: Arc::new(std::sync::Mutex::new(StdRng::from_entropy())),
            events,
        }
    }

    /// Pins toast template selection to a seed.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Arc::new(std::sync::Mutex::new(StdRng::seed_from_u64(seed))),
            ..self
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SchedulerSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn status(&self) -> SystemStatus {
        self.state.lock().await.status
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Triggers ─────────────────────────────────────────────────────

    /// Manual start/stop. Starts from `standby`, interrupts a running
    /// session, and is ignored while the cooldown runs.
    pub async fn toggle(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.status {
            SystemStatus::Standby => self.start_locked(&mut state, TriggerSource::Manual, Utc::now()),
            SystemStatus::Doomscrolling => self.interrupt_locked(&mut state),
            SystemStatus::Interrupted => {
                log_debug!("toggle ignored during cooldown");
                false
            }
        }
    }

    /// Starts a session if the scheduler is idle and the trigger gate is open.
    pub async fn request_start(&self, source: TriggerSource) -> bool {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state, source, Utc::now())
    }

    pub async fn request_stop(&self) -> bool {
        let mut state = self.state.lock().await;
        self.interrupt_locked(&mut state)
    }

    /// Resume bookkeeping from the lifecycle bridge. Arms a live session only
    /// when configured to and when enough time passed.
    pub async fn report_elapsed(&self, elapsed_ms: u64) -> bool {
        if !self.settings.resume_arms_session {
            return false;
        }
        let floor_ms = (self.settings.resume_floor_minutes * 60_000.0) as u64;
        if elapsed_ms < floor_ms {
            log_debug!("resume after {elapsed_ms}ms is below the {floor_ms}ms floor");
            return false;
        }
        self.request_start(TriggerSource::Resume).await
    }

    pub async fn apply(&self, command: SchedulerCommand) -> bool {
        match command {
            SchedulerCommand::Toggle => self.toggle().await,
            SchedulerCommand::RequestStart { source } => self.request_start(source).await,
            SchedulerCommand::RequestStop => self.request_stop().await,
            SchedulerCommand::ReportElapsed { elapsed_ms } => self.report_elapsed(elapsed_ms).await,
        }
    }

    /// Single consumer of the command bus; returns when every handle is
    /// dropped or `cancel` fires.
    pub async fn run_commands(
        self,
        mut rx: mpsc::UnboundedReceiver<SchedulerCommand>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(command) => {
                        let applied = self.apply(command).await;
                        log_debug!("command {command:?} applied={applied}");
                    }
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
        log_info!("scheduler command loop stopped");
    }

    fn start_locked(&self, state: &mut SchedulerState, source: TriggerSource, now: DateTime<Utc>) -> bool {
        if state.status != SystemStatus::Standby {
            log_debug!("{} start ignored while {}", source.as_str(), state.status.as_str());
            return false;
        }
        if !state.trigger_gate_open(now) {
            log_debug!("{} start ignored during onboarding grace window", source.as_str());
            return false;
        }

        let total_ms = session_duration_ms(state.throttle_level, &self.settings.doomscroll);
        let threads = state.thread_count.get();
        let durations = match thread_durations(total_ms, usize::from(threads)) {
            Ok(durations) => durations,
            Err(err) => {
                log_error!("cannot plan session: {err}");
                return false;
            }
        };

        let context = TriggerContext::new(source, state, now);
        let session_id = state.begin_session(source, now);
        let handles = durations
            .iter()
            .enumerate()
            .map(|(index, &duration_ms)| {
                let tag = ThreadTag {
                    index: index as u8 + 1,
                    of: threads,
                };
                tokio::spawn(self.clone().run_thread(session_id, tag, duration_ms))
            })
            .collect();
        state.timers = ActiveTimers::Session { session_id, handles };

        log_info!(
            "session {session_id} started by {}: {total_ms}ms across {threads} thread(s) {durations:?}",
            source.as_str()
        );
        self.emit(SchedulerEvent::StatusChanged {
            status: SystemStatus::Doomscrolling,
        });

        tokio::spawn(self.clone().prewarm(threads));
        tokio::spawn(self.clone().log_trigger(context, state.loaded_items));
        true
    }

    fn interrupt_locked(&self, state: &mut SchedulerState) -> bool {
        if !state.interrupt() {
            log_debug!("stop ignored while {}", state.status.as_str());
            return false;
        }

        let cooldown_id = Uuid::new_v4();
        let handle = tokio::spawn(self.clone().run_cooldown(cooldown_id));
        state.timers = ActiveTimers::Cooldown { cooldown_id, handle };

        log_info!("session interrupted; cooling down for {}ms", self.settings.cooldown_ms);
        self.emit(SchedulerEvent::StatusChanged {
            status: SystemStatus::Interrupted,
        });
        true
    }

    // ── Timer bodies ─────────────────────────────────────────────────

    async fn run_thread(self, session_id: Uuid, tag: ThreadTag, duration_ms: u64) {
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;

        if !self.state.lock().await.is_current_session(session_id) {
            return;
        }

        let budget = budget_minutes(duration_ms);
        match self.gateway.consume_pending_items(budget).await {
            Ok(result) => {
                log_info!(
                    "thread {}/{} consumed {} item(s) on a {budget:.2}min budget",
                    tag.index,
                    tag.of,
                    result.items_consumed
                );
                self.refresh_stats().await;
                let text = {
                    let mut rng = match self.rng.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    phase_end_toast(&result, &mut *rng)
                };
                self.show_toast(text, Some(tag)).await;
            }
            Err(err) => {
                log_error!("thread {}/{} consume failed: {err:#}", tag.index, tag.of);
                self.gateway
                    .log_diagnostic(
                        "consume_error",
                        Severity::Error,
                        "Consumption thread failed",
                        Some(json!({
                            "thread": tag.index,
                            "budgetMinutes": budget,
                            "error": format!("{err:#}"),
                        })),
                    )
                    .await;
            }
        }

        let outcome = self.state.lock().await.record_thread_done(session_id);
        match outcome {
            ThreadOutcome::SessionComplete => {
                log_info!("session {session_id} complete");
                self.emit(SchedulerEvent::StatusChanged {
                    status: SystemStatus::Standby,
                });
            }
            ThreadOutcome::Pending { completed, expected } => {
                log_debug!("session {session_id}: {completed}/{expected} threads done");
            }
            ThreadOutcome::Stale => {}
        }
    }

    async fn run_cooldown(self, cooldown_id: Uuid) {
        tokio::time::sleep(Duration::from_millis(self.settings.cooldown_ms)).await;
        self.refresh_stats().await;
        if self.state.lock().await.finish_cooldown(cooldown_id) {
            self.emit(SchedulerEvent::StatusChanged {
                status: SystemStatus::Standby,
            });
        }
    }

    /// Asks for a crawl when the pending buffer is thinner than the session
    /// is likely to need. Failures only get logged.
    async fn prewarm(self, threads: u8) {
        let floor = self.settings.prewarm_items_per_thread * i64::from(threads);
        if floor <= 0 {
            return;
        }
        let pending = match self.gateway.get_pending_count().await {
            Ok(pending) => pending,
            Err(err) => {
                log_warn!("pending count unavailable, skipping prewarm: {err:#}");
                return;
            }
        };
        if pending >= floor {
            return;
        }
        match self.gateway.trigger_crawl().await {
            Ok(fetched) => log_info!("prewarm crawl fetched {fetched} item(s) ({pending} < {floor})"),
            Err(err) => log_warn!("prewarm crawl failed: {err:#}"),
        }
    }

    async fn log_trigger(self, context: TriggerContext, loaded_items: usize) {
        let context = context.with_pending_count(&self.gateway, loaded_items).await;
        let message = format!("Doomscroll triggered by {}", context.source);
        self.gateway
            .log_diagnostic(
                TRIGGER_EVENT,
                Severity::Info,
                &message,
                serde_json::to_value(&context).ok(),
            )
            .await;
    }

    // ── Setters & queries ────────────────────────────────────────────

    pub async fn set_throttle_level(&self, level: u8) -> ThrottleLevel {
        let level = ThrottleLevel::clamped(level);
        self.state.lock().await.throttle_level = level;
        if let Err(err) = self.gateway.set_throttle_level(level.get()).await {
            log_warn!("failed to persist throttle level {}: {err:#}", level.get());
        }
        level
    }

    pub async fn set_thread_count(&self, count: u8) -> Result<ThreadCount, SchedulerError> {
        let count = ThreadCount::clamped(count);
        {
            let mut state = self.state.lock().await;
            if self.settings.lock_threads_during_session && state.status == SystemStatus::Doomscrolling {
                return Err(SchedulerError::SessionActive);
            }
            state.thread_count = count;
        }
        if let Err(err) = self.gateway.set_consumption_threads(count.get()).await {
            log_warn!("failed to persist thread count {}: {err:#}", count.get());
        }
        Ok(count)
    }

    /// Pulls throttle level and thread count from the backend; keeps the
    /// defaults for whichever read fails.
    pub async fn load_persisted_preferences(&self) {
        let level = self.gateway.get_throttle_level().await;
        let threads = self.gateway.get_consumption_threads().await;
        let mut state = self.state.lock().await;
        match level {
            Ok(level) => state.throttle_level = ThrottleLevel::clamped(level),
            Err(err) => log_warn!("throttle level unavailable: {err:#}"),
        }
        match threads {
            Ok(threads) => state.thread_count = ThreadCount::clamped(threads),
            Err(err) => log_warn!("thread count unavailable: {err:#}"),
        }
    }

    /// Opens the trigger gate only after the onboarding grace window.
    pub async fn complete_onboarding(&self, now: DateTime<Utc>) {
        let grace = chrono::Duration::milliseconds(self.settings.onboarding_grace_ms as i64);
        self.state.lock().await.doomscrolling_enabled_at = Some(now + grace);
    }

    /// Item count the content feed last loaded; the trigger log falls back
    /// to it when the backend summary is unavailable.
    pub async fn report_loaded_items(&self, count: usize) {
        self.state.lock().await.loaded_items = count;
    }

    pub async fn record_interaction(&self) {
        self.state.lock().await.last_interaction_time = Utc::now();
    }

    pub async fn refresh_stats(&self) {
        match self.gateway.get_today_stats().await {
            Ok(stats) => {
                self.state.lock().await.stats = Some(stats.clone());
                self.emit(SchedulerEvent::StatsUpdated(stats));
            }
            Err(err) => log_debug!("stats refresh failed: {err:#}"),
        }
    }

    /// Replaces the current toast and schedules its dismissal.
    pub async fn show_toast(&self, text: String, thread: Option<ThreadTag>) -> u64 {
        let toast = self.state.lock().await.push_toast(text, thread);
        let id = toast.id;
        self.emit(SchedulerEvent::Toast(toast));

        let scheduler = self.clone();
        let dismiss_after = Duration::from_millis(self.settings.toast_dismiss_ms);
        tokio::spawn(async move {
            tokio::time::sleep(dismiss_after).await;
            scheduler.dismiss_toast(id).await;
        });
        id
    }

    pub async fn dismiss_toast(&self, id: u64) {
        if self.state.lock().await.clear_toast(id) {
            self.emit(SchedulerEvent::ToastDismissed { id });
        }
    }
}
