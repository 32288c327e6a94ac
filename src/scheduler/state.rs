use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::DayStats;

use super::duration::{ThreadCount, ThrottleLevel};
use super::toast::{ThreadTag, Toast};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    #[default]
    Standby,
    Doomscrolling,
    Interrupted,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Standby => "standby",
            SystemStatus::Doomscrolling => "doomscrolling",
            SystemStatus::Interrupted => "interrupted",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Notification,
    Resume,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::Notification => "notification",
            TriggerSource::Resume => "app_resume",
        }
    }
}

/// Pending timers. A session's per-thread timers and the post-interruption
/// cooldown never coexist.
#[derive(Debug, Default)]
pub(crate) enum ActiveTimers {
    #[default]
    None,
    Session {
        session_id: Uuid,
        handles: Vec<JoinHandle<()>>,
    },
    Cooldown {
        cooldown_id: Uuid,
        handle: JoinHandle<()>,
    },
}

impl ActiveTimers {
    /// Aborts whatever is still pending.
    pub(crate) fn cancel(&mut self) {
        match std::mem::take(self) {
            ActiveTimers::None => {}
            ActiveTimers::Session { handles, .. } => handles.iter().for_each(JoinHandle::abort),
            ActiveTimers::Cooldown { handle, .. } => handle.abort(),
        }
    }

    /// Forgets the handles without aborting; used once every task has finished
    /// or when the caller is itself one of the tasks.
    pub(crate) fn release(&mut self) {
        *self = ActiveTimers::None;
    }

    pub(crate) fn pending_threads(&self) -> usize {
        match self {
            ActiveTimers::Session { handles, .. } => {
                handles.iter().filter(|h| !h.is_finished()).count()
            }
            _ => 0,
        }
    }

    pub(crate) fn has_cooldown(&self) -> bool {
        matches!(self, ActiveTimers::Cooldown { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub id: Uuid,
    pub source: TriggerSource,
    pub started_at: DateTime<Utc>,
    /// Captured at start so a mid-session thread-count change cannot move
    /// the finish line.
    pub expected_threads: u8,
    pub completed_threads: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThreadOutcome {
    /// The session this thread belonged to is gone.
    Stale,
    Pending { completed: u8, expected: u8 },
    SessionComplete,
}

#[derive(Debug)]
pub struct SchedulerState {
    pub status: SystemStatus,
    pub throttle_level: ThrottleLevel,
    pub thread_count: ThreadCount,
    pub session: Option<SessionProgress>,
    pub toast: Option<Toast>,
    pub stats: Option<DayStats>,
    pub doomscrolling_enabled_at: Option<DateTime<Utc>>,
    pub app_start_time: DateTime<Utc>,
    pub last_interaction_time: DateTime<Utc>,
    /// Items the content feed currently holds.
    pub loaded_items: usize,
    pub(crate) timers: ActiveTimers,
    next_toast_id: u64,
}

impl SchedulerState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: SystemStatus::Standby,
            throttle_level: ThrottleLevel::default(),
            thread_count: ThreadCount::default(),
            session: None,
            toast: None,
            stats: None,
            doomscrolling_enabled_at: None,
            app_start_time: now,
            last_interaction_time: now,
            loaded_items: 0,
            timers: ActiveTimers::None,
            next_toast_id: 0,
        }
    }

    /// False while the post-onboarding grace window is still open.
    pub fn trigger_gate_open(&self, now: DateTime<Utc>) -> bool {
        self.doomscrolling_enabled_at
            .map_or(true, |enabled_at| now >= enabled_at)
    }

    pub fn is_current_session(&self, session_id: Uuid) -> bool {
        self.status == SystemStatus::Doomscrolling
            && self.session.map(|s| s.id) == Some(session_id)
    }

    /// Enters `doomscrolling`. The caller has already checked the status and
    /// the trigger gate; any stray cooldown is dropped here.
    pub(crate) fn begin_session(&mut self, source: TriggerSource, now: DateTime<Utc>) -> Uuid {
        self.timers.cancel();
        let id = Uuid::new_v4();
        self.status = SystemStatus::Doomscrolling;
        self.session = Some(SessionProgress {
            id,
            source,
            started_at: now,
            expected_threads: self.thread_count.get(),
            completed_threads: 0,
        });
        id
    }

    /// Enters `interrupted`, abandoning every pending thread.
    pub(crate) fn interrupt(&mut self) -> bool {
        if self.status != SystemStatus::Doomscrolling {
            return false;
        }
        self.timers.cancel();
        self.session = None;
        self.status = SystemStatus::Interrupted;
        true
    }

    pub(crate) fn record_thread_done(&mut self, session_id: Uuid) -> ThreadOutcome {
        if !self.is_current_session(session_id) {
            return ThreadOutcome::Stale;
        }
        let Some(progress) = self.session.as_mut() else {
            return ThreadOutcome::Stale;
        };
        progress.completed_threads = progress.completed_threads.saturating_add(1);
        if progress.completed_threads < progress.expected_threads {
            return ThreadOutcome::Pending {
                completed: progress.completed_threads,
                expected: progress.expected_threads,
            };
        }
        self.session = None;
        self.status = SystemStatus::Standby;
        self.timers.release();
        ThreadOutcome::SessionComplete
    }

    /// Leaves `interrupted` if `cooldown_id` is still the armed cooldown.
    pub(crate) fn finish_cooldown(&mut self, cooldown_id: Uuid) -> bool {
        let armed = matches!(
            self.timers,
            ActiveTimers::Cooldown { cooldown_id: id, .. } if id == cooldown_id
        );
        if self.status != SystemStatus::Interrupted || !armed {
            return false;
        }
        self.timers.release();
        self.status = SystemStatus::Standby;
        true
    }

    pub(crate) fn push_toast(&mut self, text: String, thread: Option<ThreadTag>) -> Toast {
        self.next_toast_id += 1;
        let toast = Toast {
            id: self.next_toast_id,
            text,
            thread,
        };
        self.toast = Some(toast.clone());
        toast
    }

    pub(crate) fn clear_toast(&mut self, id: u64) -> bool {
        if self.toast.as_ref().map(|t| t.id) == Some(id) {
            self.toast = None;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            status: self.status,
            throttle_level: self.throttle_level.get(),
            thread_count: self.thread_count.get(),
            session: self.session,
            pending_threads: self.timers.pending_threads(),
            cooldown_armed: self.timers.has_cooldown(),
            toast: self.toast.clone(),
            stats: self.stats.clone(),
            doomscrolling_enabled_at: self.doomscrolling_enabled_at,
            loaded_items: self.loaded_items,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub status: SystemStatus,
    pub throttle_level: u8,
    pub thread_count: u8,
    pub session: Option<SessionProgress>,
    pub pending_threads: usize,
    pub cooldown_armed: bool,
    pub toast: Option<Toast>,
    pub stats: Option<DayStats>,
    pub doomscrolling_enabled_at: Option<DateTime<Utc>>,
    pub loaded_items: usize,
}
