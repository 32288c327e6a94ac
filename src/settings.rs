use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Which shell the client runs in; decides how lifecycle signals arrive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Desktop,
    Android,
}

/// Constants of the linear session-length formula:
/// `min_minutes + multiplier * (level - 1) / divisor` minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DoomscrollConfig {
    pub min_minutes: f64,
    pub multiplier: f64,
    pub divisor: f64,
}

impl Default for DoomscrollConfig {
    fn default() -> Self {
        Self {
            min_minutes: 1.0,
            multiplier: 4.0,
            divisor: 8.0,
        }
    }
}

/// Tunables of the session scheduler and its bridges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub doomscroll: DoomscrollConfig,
    /// How long `interrupted` lasts before falling back to `standby`.
    pub cooldown_ms: u64,
    pub toast_dismiss_ms: u64,
    /// Grace window after onboarding during which start triggers are ignored.
    pub onboarding_grace_ms: u64,
    pub resume_floor_minutes: f64,
    /// Whether a resume with enough elapsed time also arms a live session
    /// after the lump catch-up consumption.
    pub resume_arms_session: bool,
    /// Reject thread-count changes while a session is running.
    pub lock_threads_during_session: bool,
    /// Pending-item floor per consumption thread before a crawl is requested.
    pub prewarm_items_per_thread: i64,
    pub hover_timeout_ms: u64,
    pub stats_refresh_interval_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            doomscroll: DoomscrollConfig::default(),
            cooldown_ms: 2_000,
            toast_dismiss_ms: 8_000,
            onboarding_grace_ms: 5_000,
            resume_floor_minutes: 1.0,
            resume_arms_session: false,
            lock_threads_during_session: true,
            prewarm_items_per_thread: 20,
            hover_timeout_ms: 200,
            stats_refresh_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub platform: Platform,
    pub first_run: bool,
    pub scheduler: SchedulerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform: Platform::Desktop,
            first_run: true,
            scheduler: SchedulerSettings::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: Settings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Settings::default()
        };

        let debug_mode = std::env::var("CAZZMACHINE_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            data.scheduler.stats_refresh_interval_ms = 5_000;
        }

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn snapshot(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn scheduler(&self) -> SchedulerSettings {
        self.snapshot().scheduler
    }

    pub fn is_first_run(&self) -> bool {
        self.snapshot().first_run
    }

    /// Flips the first-run flag off and persists it.
    pub fn finish_first_run(&self) -> Result<()> {
        self.update(|settings| settings.first_run = false)
    }

    pub fn update(&self, apply: impl FnOnce(&mut Settings)) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
