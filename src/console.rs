//! Line-oriented stand-in for the desktop UI: reads commands from stdin and
//! prints scheduler events as they happen.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::content::{CategoryFilter, ContentFeed};
use crate::diagnostics::export_trigger_logs;
use crate::gateway::Gateway;
use crate::lifecycle::LifecycleEvent;
use crate::notifications::BackendEvent;
use crate::scheduler::{SchedulerEvent, SchedulerHandle, SessionScheduler, TriggerSource};
use crate::settings::SettingsStore;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const HELP: &str = "commands: toggle | start | stop | throttle N | threads N | items [category] | \
stats | summary | save ID | open ID | hover ID | leave | resume | background | notify | \
onboard | diag | export | status | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Toggle,
    Start,
    Stop,
    Throttle(u8),
    Threads(u8),
    Items(CategoryFilter),
    Stats,
    Summary,
    Save(String),
    Open(String),
    Hover(String),
    Leave,
    Resume,
    Background,
    Notify,
    Onboard,
    Diag,
    Export,
    Status,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();

        let number = |name: &str| -> Result<u8> {
            arg.ok_or_else(|| anyhow!("{name} needs a number"))?
                .parse()
                .with_context(|| format!("{name} needs a number"))
        };
        let id = |name: &str| -> Result<String> {
            arg.map(str::to_string)
                .ok_or_else(|| anyhow!("{name} needs an item id"))
        };

        let command = match verb {
            "toggle" => Self::Toggle,
            "start" => Self::Start,
            "stop" => Self::Stop,
            "throttle" => Self::Throttle(number("throttle")?),
            "threads" => Self::Threads(number("threads")?),
            "items" => Self::Items(
                arg.map(str::parse::<CategoryFilter>)
                    .transpose()?
                    .unwrap_or_default(),
            ),
            "stats" => Self::Stats,
            "summary" => Self::Summary,
            "save" => Self::Save(id("save")?),
            "open" => Self::Open(id("open")?),
            "hover" => Self::Hover(id("hover")?),
            "leave" => Self::Leave,
            "resume" => Self::Resume,
            "background" => Self::Background,
            "notify" => Self::Notify,
            "onboard" => Self::Onboard,
            "diag" => Self::Diag,
            "export" => Self::Export,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => bail!("unknown command '{other}' (try 'help')"),
        };
        Ok(Some(command))
    }
}

pub struct Console {
    gateway: Gateway,
    scheduler: SessionScheduler,
    commands: SchedulerHandle,
    feed: ContentFeed,
    settings: Arc<SettingsStore>,
    lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
    notifications: mpsc::UnboundedSender<BackendEvent>,
}

impl Console {
    pub fn new(
        gateway: Gateway,
        scheduler: SessionScheduler,
        commands: SchedulerHandle,
        feed: ContentFeed,
        settings: Arc<SettingsStore>,
        lifecycle: mpsc::UnboundedSender<LifecycleEvent>,
        notifications: mpsc::UnboundedSender<BackendEvent>,
    ) -> Self {
        Self {
            gateway,
            scheduler,
            commands,
            feed,
            settings,
            lifecycle,
            notifications,
        }
    }

    /// Runs one command and returns what should be printed, if anything.
    pub async fn execute(&self, command: ConsoleCommand) -> Result<Option<String>> {
        self.scheduler.record_interaction().await;
        let output = match command {
            ConsoleCommand::Toggle => {
                self.commands.toggle()?;
                None
            }
            ConsoleCommand::Start => {
                self.commands.request_start(TriggerSource::Manual)?;
                None
            }
            ConsoleCommand::Stop => {
                self.commands.request_stop()?;
                None
            }
            ConsoleCommand::Throttle(level) => {
                let level = self.scheduler.set_throttle_level(level).await;
                Some(format!("throttle level {}", level.get()))
            }
            ConsoleCommand::Threads(count) => {
                let count = self.scheduler.set_thread_count(count).await?;
                Some(format!("{} consumption thread(s)", count.get()))
            }
            ConsoleCommand::Items(filter) => {
                self.feed.set_active_category(filter).await;
                let items = self.feed.snapshot().await.items;
                let lines: Vec<String> = items
                    .iter()
                    .map(|item| {
                        let flags = match (item.is_saved, item.is_seen) {
                            (true, _) => "*",
                            (false, true) => ".",
                            (false, false) => " ",
                        };
                        format!("{flags} {:<10} [{}] {}", item.id, item.category, item.title)
                    })
                    .collect();
                Some(if lines.is_empty() {
                    "no items yet".to_string()
                } else {
                    lines.join("\n")
                })
            }
            ConsoleCommand::Stats => {
                let stats = self.gateway.get_today_stats().await?;
                Some(serde_json::to_string_pretty(&stats)?)
            }
            ConsoleCommand::Summary => {
                self.feed.fetch_summary().await;
                let summary = self.feed.snapshot().await.summary;
                Some(match summary {
                    Some(summary) => summary.summary_text,
                    None => "summary unavailable".to_string(),
                })
            }
            ConsoleCommand::Save(id) => {
                let saved = self.feed.toggle_save(&id).await?;
                Some(format!("{id} {}", if saved { "saved" } else { "unsaved" }))
            }
            ConsoleCommand::Open(id) => {
                self.feed.open_item(&id).await?;
                Some(format!("opened {id}"))
            }
            ConsoleCommand::Hover(id) => {
                let item = self
                    .feed
                    .snapshot()
                    .await
                    .items
                    .into_iter()
                    .find(|item| item.id == id)
                    .ok_or_else(|| anyhow!("item '{id}' is not loaded"))?;
                let thumbnail = self.feed.thumbnail(&item).await;
                let preview = format!(
                    "{}\n{}\n{}",
                    item.title,
                    item.description.as_deref().unwrap_or(""),
                    thumbnail.as_deref().unwrap_or("(no thumbnail)")
                );
                self.feed.hover(item).await;
                Some(preview)
            }
            ConsoleCommand::Leave => {
                self.feed.leave_hover().await;
                None
            }
            ConsoleCommand::Resume => {
                self.lifecycle
                    .send(LifecycleEvent::Resumed)
                    .map_err(|_| anyhow!("lifecycle bridge is not running"))?;
                None
            }
            ConsoleCommand::Background => {
                self.lifecycle
                    .send(LifecycleEvent::Backgrounded)
                    .map_err(|_| anyhow!("lifecycle bridge is not running"))?;
                None
            }
            ConsoleCommand::Notify => {
                self.notifications
                    .send(BackendEvent::notification("Fresh content just dropped"))
                    .map_err(|_| anyhow!("notification bridge is not running"))?;
                None
            }
            ConsoleCommand::Onboard => {
                self.scheduler.complete_onboarding(Utc::now()).await;
                self.settings.finish_first_run()?;
                Some(format!(
                    "onboarding done; triggers open in {}s",
                    self.scheduler.settings().onboarding_grace_ms / 1_000
                ))
            }
            ConsoleCommand::Diag => {
                let summary = self.gateway.get_diagnostic_summary().await?;
                let providers = self.gateway.get_provider_status().await?;
                Some(format!(
                    "{}\n{}",
                    serde_json::to_string_pretty(&summary)?,
                    serde_json::to_string_pretty(&providers)?
                ))
            }
            ConsoleCommand::Export => Some(export_trigger_logs(&self.gateway, None).await?),
            ConsoleCommand::Status => {
                Some(serde_json::to_string_pretty(&self.scheduler.snapshot().await)?)
            }
            ConsoleCommand::Help => Some(HELP.to_string()),
            ConsoleCommand::Quit => None,
        };
        Ok(output)
    }

    /// Reads commands until `quit` or end of input.
    pub async fn run<R>(&self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        println!("{HELP}");
        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await.context("reading console input")? {
            let command = match ConsoleCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            };
            if command == ConsoleCommand::Quit {
                break;
            }
            match self.execute(command).await {
                Ok(Some(output)) => println!("{output}"),
                Ok(None) => {}
                Err(err) => {
                    log_warn!("console command failed: {err:#}");
                    println!("error: {err:#}");
                }
            }
        }
        Ok(())
    }
}

/// Prints scheduler events until cancelled.
pub fn spawn_event_printer(
    mut events: broadcast::Receiver<SchedulerEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(SchedulerEvent::StatusChanged { status }) => println!("status: {}", status.as_str()),
                    Ok(SchedulerEvent::Toast(toast)) => println!(">> {toast}"),
                    Ok(SchedulerEvent::ToastDismissed { .. }) => {}
                    Ok(SchedulerEvent::StatsUpdated(stats)) => println!(
                        "stats: {} items, {:.1} min saved",
                        stats.total_items, stats.estimated_time_saved_minutes
                    ),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log_debug!("event printer skipped {skipped} event(s)");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = cancel.cancelled() => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::local::LocalBackend;
    use crate::gateway::url::{BackendLauncher, UrlOpener};
    use crate::models::Category;
    use crate::scheduler::{commands, SchedulerCommand};
    use crate::settings::SchedulerSettings;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(ConsoleCommand::parse("  ").unwrap(), None);
        assert_eq!(
            ConsoleCommand::parse("throttle 7").unwrap(),
            Some(ConsoleCommand::Throttle(7))
        );
        assert_eq!(
            ConsoleCommand::parse("items news").unwrap(),
            Some(ConsoleCommand::Items(CategoryFilter::Only(Category::News)))
        );
        assert_eq!(
            ConsoleCommand::parse("items").unwrap(),
            Some(ConsoleCommand::Items(CategoryFilter::All))
        );
        assert_eq!(
            ConsoleCommand::parse("open item-3").unwrap(),
            Some(ConsoleCommand::Open("item-3".into()))
        );
        assert!(ConsoleCommand::parse("threads many").is_err());
        assert!(ConsoleCommand::parse("save").is_err());
        assert!(ConsoleCommand::parse("items cats").is_err());
        assert!(ConsoleCommand::parse("dance").is_err());
    }

    struct Harness {
        backend: Arc<LocalBackend>,
        console: Console,
        commands: mpsc::UnboundedReceiver<SchedulerCommand>,
        lifecycle: mpsc::UnboundedReceiver<LifecycleEvent>,
        notifications: mpsc::UnboundedReceiver<BackendEvent>,
    }

    fn harness() -> Harness {
        let backend = Arc::new(LocalBackend::new());
        backend.set_crawl_batch(0);
        let gateway = Gateway::new(backend.clone());
        let scheduler = SessionScheduler::new(gateway.clone(), SchedulerSettings::default());
        let opener = Arc::new(UrlOpener::new(vec![Box::new(BackendLauncher::new(
            gateway.clone(),
        ))]));
        let feed = ContentFeed::new(gateway.clone(), scheduler.clone(), opener);
        let settings_path = std::env::temp_dir().join(format!(
            "cazzmachine-console-{}.json",
            uuid::Uuid::new_v4()
        ));
        let settings = Arc::new(SettingsStore::new(settings_path).unwrap());
        let (handle, commands) = commands::channel();
        let (lifecycle_tx, lifecycle) = mpsc::unbounded_channel();
        let (notify_tx, notifications) = mpsc::unbounded_channel();
        Harness {
            backend,
            console: Console::new(
                gateway,
                scheduler,
                handle,
                feed,
                settings,
                lifecycle_tx,
                notify_tx,
            ),
            commands,
            lifecycle,
            notifications,
        }
    }

    #[tokio::test]
    async fn triggers_go_through_the_right_channels() {
        let mut h = harness();
        h.console.execute(ConsoleCommand::Toggle).await.unwrap();
        h.console.execute(ConsoleCommand::Stop).await.unwrap();
        h.console.execute(ConsoleCommand::Resume).await.unwrap();
        h.console.execute(ConsoleCommand::Notify).await.unwrap();

        assert_eq!(h.commands.recv().await, Some(SchedulerCommand::Toggle));
        assert_eq!(h.commands.recv().await, Some(SchedulerCommand::RequestStop));
        assert_eq!(h.lifecycle.recv().await, Some(LifecycleEvent::Resumed));
        assert_eq!(
            h.notifications.recv().await.map(|e| e.name),
            Some(crate::notifications::NOTIFICATION_EVENT.to_string())
        );
    }

    #[tokio::test]
    async fn items_and_save_round_through_the_feed() {
        let h = harness();
        let id = h.backend.seed_item(Category::Gossip, "https://g");

        let listing = h
            .console
            .execute(ConsoleCommand::Items(CategoryFilter::All))
            .await
            .unwrap()
            .unwrap();
        assert!(listing.contains(&id));

        let saved = h
            .console
            .execute(ConsoleCommand::Save(id.clone()))
            .await
            .unwrap();
        assert_eq!(saved, Some(format!("{id} saved")));
    }

    #[tokio::test]
    async fn onboarding_persists_first_run_flag() {
        let h = harness();
        h.console.execute(ConsoleCommand::Onboard).await.unwrap();
        assert!(!h.console.settings.is_first_run());
        let snapshot = h.console.scheduler.snapshot().await;
        assert!(snapshot.doomscrolling_enabled_at.is_some());
    }

    #[tokio::test]
    async fn run_stops_at_quit() {
        let mut h = harness();
        let script: &[u8] = b"bogus\nthrottle 3\nstart\nquit\nstop\n";
        h.console.run(script).await.unwrap();

        assert_eq!(
            h.commands.recv().await,
            Some(SchedulerCommand::RequestStart {
                source: TriggerSource::Manual
            })
        );
        assert!(h.commands.try_recv().is_err());
        assert_eq!(h.console.scheduler.snapshot().await.throttle_level, 3);
    }
}
