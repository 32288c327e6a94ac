//! Foreground/background bookkeeping and resume catch-up.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::TRIGGER_EVENT;
use crate::gateway::Gateway;
use crate::models::{ConsumeResult, Severity};
use crate::scheduler::toast::resume_toast;
use crate::scheduler::{SchedulerHandle, SessionScheduler, TriggerSource};
use crate::settings::{Platform, SettingsStore};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const MS_PER_MINUTE: f64 = 60_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Resumed,
    Backgrounded,
}

#[derive(Clone)]
pub struct LifecycleBridge {
    gateway: Gateway,
    scheduler: SessionScheduler,
    commands: SchedulerHandle,
    settings: Arc<SettingsStore>,
}

impl LifecycleBridge {
    pub fn new(
        gateway: Gateway,
        scheduler: SessionScheduler,
        commands: SchedulerHandle,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            gateway,
            scheduler,
            commands,
            settings,
        }
    }

    fn platform(&self) -> Platform {
        self.settings.snapshot().platform
    }

    /// Gives the first resume a baseline on platforms that deliver native
    /// app events.
    pub async fn initialize(&self, now: DateTime<Utc>) {
        if self.platform() != Platform::Android {
            return;
        }
        if self.gateway.get_last_active_timestamp().await.is_ok() {
            return;
        }
        if let Err(err) = self
            .gateway
            .set_last_active_timestamp(now.timestamp_millis())
            .await
        {
            log_warn!("could not seed last-active timestamp: {err:#}");
        }
    }

    /// Lump catch-up for the time spent away. Returns the consume result when
    /// enough time elapsed to spend a budget.
    pub async fn on_resume(&self, now: DateTime<Utc>) -> Result<Option<ConsumeResult>> {
        let last_active = self
            .gateway
            .get_last_active_timestamp()
            .await
            .context("reading last-active timestamp")?;
        let now_ms = now.timestamp_millis();
        let elapsed_ms = (now_ms - last_active).max(0);
        let elapsed_minutes = elapsed_ms as f64 / MS_PER_MINUTE;

        let snapshot = self.scheduler.snapshot().await;
        self.gateway
            .log_diagnostic(
                TRIGGER_EVENT,
                Severity::Info,
                "App resume consumption",
                Some(json!({
                    "source": TriggerSource::Resume.as_str(),
                    "currentStatus": snapshot.status,
                    "isFirstRun": self.settings.is_first_run(),
                    "elapsedSinceLastActive": elapsed_minutes,
                })),
            )
            .await;

        // Written before consuming so a burst of resumes cannot count the
        // same stretch twice.
        self.gateway
            .set_last_active_timestamp(now_ms)
            .await
            .context("writing last-active timestamp")?;

        if elapsed_minutes < self.scheduler.settings().resume_floor_minutes {
            log_debug!("resumed after {elapsed_minutes:.2}min, nothing to catch up");
            return Ok(None);
        }

        let budget = elapsed_minutes * f64::from(snapshot.thread_count);
        let result = self
            .gateway
            .consume_pending_items(budget)
            .await
            .context("consuming resume budget")?;
        log_info!(
            "resume after {elapsed_minutes:.1}min consumed {} item(s) on a {budget:.1}min budget",
            result.items_consumed
        );

        if result.items_consumed > 0 {
            self.scheduler.show_toast(resume_toast(&result), None).await;
        }
        self.scheduler.refresh_stats().await;

        self.gateway
            .log_diagnostic(
                "app_resume",
                Severity::Info,
                &format!("App resume: consumed {} items", result.items_consumed),
                Some(json!({ "elapsedMinutes": format!("{elapsed_minutes:.1}") })),
            )
            .await;

        if let Err(err) = self.commands.report_elapsed(elapsed_ms as u64) {
            log_debug!("scheduler not listening for resume reports: {err}");
        }
        Ok(Some(result))
    }

    pub async fn on_background(&self, now: DateTime<Utc>) -> Result<()> {
        self.gateway
            .set_last_active_timestamp(now.timestamp_millis())
            .await
            .context("writing last-active timestamp")?;
        if self.platform() == Platform::Android {
            self.gateway
                .on_app_background()
                .await
                .context("notifying backend of background transition")?;
        }
        Ok(())
    }

    /// Runs one event to completion; failures end up in the diagnostics log.
    pub async fn handle(&self, event: LifecycleEvent) {
        let now = Utc::now();
        let (outcome, error_event, message) = match event {
            LifecycleEvent::Resumed => (
                self.on_resume(now).await.map(|_| ()),
                "app_resume_error",
                "Failed to handle app resume",
            ),
            LifecycleEvent::Backgrounded => (
                self.on_background(now).await,
                "app_background_error",
                "Failed to handle app background",
            ),
        };
        if let Err(err) = outcome {
            log_warn!("{message}: {err:#}");
            self.gateway
                .log_diagnostic(
                    error_event,
                    Severity::Error,
                    message,
                    Some(json!({ "error": format!("{err:#}") })),
                )
                .await;
        }
    }

    pub fn spawn(
        self,
        mut events: mpsc::UnboundedReceiver<LifecycleEvent>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(event) => self.handle(event).await,
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                }
            }
            log_info!("lifecycle bridge stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::local::LocalBackend;
    use crate::models::Category;
    use crate::scheduler::{commands, SchedulerCommand};
    use crate::settings::SchedulerSettings;
    use chrono::Duration;

    struct Harness {
        backend: Arc<LocalBackend>,
        scheduler: SessionScheduler,
        settings: Arc<SettingsStore>,
        bridge: LifecycleBridge,
        commands: mpsc::UnboundedReceiver<SchedulerCommand>,
    }

    fn harness(platform: Platform) -> Harness {
        let backend = Arc::new(LocalBackend::new());
        backend.set_crawl_batch(0);
        let gateway = Gateway::new(backend.clone());
        let scheduler = SessionScheduler::new(gateway.clone(), SchedulerSettings::default());
        let path = std::env::temp_dir().join(format!(
            "cazzmachine-lifecycle-{}.json",
            uuid::Uuid::new_v4()
        ));
        let settings = Arc::new(SettingsStore::new(path).unwrap());
        settings.update(|s| s.platform = platform).unwrap();
        let (handle, rx) = commands::channel();
        let bridge = LifecycleBridge::new(gateway, scheduler.clone(), handle, settings.clone());
        Harness {
            backend,
            scheduler,
            settings,
            bridge,
            commands: rx,
        }
    }

    fn trigger_metadata(backend: &LocalBackend) -> Vec<String> {
        backend
            .diagnostics()
            .into_iter()
            .filter(|log| log.event_type == TRIGGER_EVENT)
            .filter_map(|log| log.metadata)
            .collect()
    }

    #[tokio::test]
    async fn resume_consumes_lump_budget_scaled_by_threads() {
        let mut h = harness(Platform::Desktop);
        h.scheduler.set_thread_count(2).await.unwrap();
        h.backend.seed_item(Category::Meme, "https://m/1");
        h.backend.seed_item(Category::Meme, "https://m/2");
        let now = Utc::now();
        h.backend
            .set_last_active(Some((now - Duration::minutes(3)).timestamp_millis()));

        let result = h.bridge.on_resume(now).await.unwrap().expect("catch-up");

        assert_eq!(result.memes_consumed, 2);
        let consumes = h.backend.calls_to("consume_pending_items");
        assert_eq!(consumes.len(), 1);
        assert_eq!(consumes[0]["budgetMinutes"], json!(6.0));
        assert_eq!(h.backend.last_active(), Some(now.timestamp_millis()));

        let toast = h.scheduler.snapshot().await.toast.expect("resume toast");
        assert_eq!(
            toast.text,
            "While you were away, I doomscrolled through 2 memes. You're welcome."
        );
        assert_eq!(toast.thread, None);
        assert_eq!(
            h.commands.recv().await,
            Some(SchedulerCommand::ReportElapsed { elapsed_ms: 180_000 })
        );
    }

    #[tokio::test]
    async fn short_absence_only_moves_the_timestamp() {
        let mut h = harness(Platform::Desktop);
        let now = Utc::now();
        h.backend
            .set_last_active(Some((now - Duration::seconds(30)).timestamp_millis()));

        assert!(h.bridge.on_resume(now).await.unwrap().is_none());
        assert!(h.backend.calls_to("consume_pending_items").is_empty());
        assert_eq!(h.backend.last_active(), Some(now.timestamp_millis()));
        assert!(h.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn first_desktop_resume_without_background_succeeds() {
        let mut h = harness(Platform::Desktop);
        let now = Utc::now();
        h.bridge.initialize(now).await;

        assert!(h.bridge.on_resume(now).await.unwrap().is_none());
        assert_eq!(h.backend.last_active(), Some(now.timestamp_millis()));

        let later = now + Duration::seconds(20);
        assert!(h.bridge.on_resume(later).await.unwrap().is_none());
        assert_eq!(h.backend.last_active(), Some(later.timestamp_millis()));
        assert!(h.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn cleared_timestamp_reads_as_no_absence() {
        let h = harness(Platform::Desktop);
        h.backend.set_last_active(None);
        let now = Utc::now() + Duration::seconds(1);

        h.bridge.handle(LifecycleEvent::Resumed).await;
        assert!(h.bridge.on_resume(now).await.unwrap().is_none());

        assert!(h.backend.calls_to("consume_pending_items").is_empty());
        assert!(!h
            .backend
            .diagnostics()
            .iter()
            .any(|log| log.event_type == "app_resume_error"));
    }

    #[tokio::test]
    async fn back_to_back_resumes_consume_once() {
        let mut h = harness(Platform::Desktop);
        h.backend.seed_item(Category::Meme, "https://m/1");
        h.backend.seed_item(Category::Joke, "https://j/1");
        let now = Utc::now();
        h.backend
            .set_last_active(Some((now - Duration::minutes(10)).timestamp_millis()));

        let first = h.bridge.on_resume(now).await.unwrap().expect("catch-up");
        assert_eq!(first.items_consumed, 2);
        assert!(h.bridge.on_resume(now).await.unwrap().is_none());

        assert_eq!(h.backend.calls_to("consume_pending_items").len(), 1);
        assert_eq!(
            h.commands.recv().await,
            Some(SchedulerCommand::ReportElapsed { elapsed_ms: 600_000 })
        );
        assert!(h.commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn resume_trigger_records_first_run_flag() {
        let h = harness(Platform::Desktop);
        let now = Utc::now();
        h.bridge.on_resume(now).await.unwrap();

        h.settings.finish_first_run().unwrap();
        h.bridge.on_resume(now).await.unwrap();

        let metadata = trigger_metadata(&h.backend);
        assert_eq!(metadata.len(), 2);
        assert!(metadata[0].contains("\"isFirstRun\":true"));
        assert!(metadata[0].contains("\"source\":\"app_resume\""));
        assert!(metadata[1].contains("\"isFirstRun\":false"));
    }

    #[tokio::test]
    async fn timestamp_is_written_before_a_failing_consume() {
        let h = harness(Platform::Desktop);
        h.backend.fail_command("consume_pending_items");
        let now = Utc::now();
        h.backend
            .set_last_active(Some((now - Duration::minutes(10)).timestamp_millis()));

        h.bridge.handle(LifecycleEvent::Resumed).await;

        assert!(h.backend.last_active() > Some((now - Duration::minutes(1)).timestamp_millis()));
        assert!(h
            .backend
            .diagnostics()
            .iter()
            .any(|log| log.event_type == "app_resume_error"));
    }

    #[tokio::test]
    async fn empty_catch_up_shows_no_toast() {
        let h = harness(Platform::Desktop);
        let now = Utc::now();
        h.backend
            .set_last_active(Some((now - Duration::minutes(5)).timestamp_millis()));

        let result = h.bridge.on_resume(now).await.unwrap().expect("catch-up");
        assert_eq!(result.items_consumed, 0);
        assert!(h.scheduler.snapshot().await.toast.is_none());
        assert!(h
            .backend
            .diagnostics()
            .iter()
            .any(|log| log.event_type == "app_resume"));
    }

    #[tokio::test]
    async fn background_notifies_backend_only_on_android() {
        let desktop = harness(Platform::Desktop);
        let now = Utc::now();
        desktop.bridge.on_background(now).await.unwrap();
        assert_eq!(desktop.backend.last_active(), Some(now.timestamp_millis()));
        assert!(desktop.backend.calls_to("on_app_background").is_empty());

        let android = harness(Platform::Android);
        android.bridge.on_background(now).await.unwrap();
        assert_eq!(android.backend.calls_to("on_app_background").len(), 1);
    }

    #[tokio::test]
    async fn android_initialize_seeds_unreadable_timestamp() {
        let h = harness(Platform::Android);
        let now = Utc::now() + Duration::hours(1);
        h.backend.fail_command("get_last_active_timestamp");
        h.bridge.initialize(now).await;
        assert_eq!(h.backend.last_active(), Some(now.timestamp_millis()));

        h.backend.heal_command("get_last_active_timestamp");
        let earlier = now - Duration::hours(3);
        h.backend.set_last_active(Some(earlier.timestamp_millis()));
        h.bridge.initialize(now).await;
        assert_eq!(h.backend.last_active(), Some(earlier.timestamp_millis()));

        let desktop = harness(Platform::Desktop);
        desktop.backend.fail_command("get_last_active_timestamp");
        desktop.backend.set_last_active(Some(earlier.timestamp_millis()));
        desktop.bridge.initialize(now).await;
        assert_eq!(desktop.backend.last_active(), Some(earlier.timestamp_millis()));
    }

    #[tokio::test]
    async fn event_loop_stops_on_cancel() {
        let h = harness(Platform::Desktop);
        h.backend.set_last_active(Some(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = h.bridge.clone().spawn(rx, cancel.clone());

        tx.send(LifecycleEvent::Backgrounded).unwrap();
        while h.backend.last_active() == Some(0) {
            tokio::task::yield_now().await;
        }

        cancel.cancel();
        task.await.unwrap();
    }
}
