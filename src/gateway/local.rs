//! In-process stand-in for the backend.
//!
//! Keeps everything in memory behind one mutex, answers the same command
//! names as the real backend, and records every invocation so callers can
//! inspect what was sent. Used by the headless console and by tests.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{
    BudgetAnalysis, BufferHealth, Category, ConsumeResult, CrawlItem, DayStats, DaySummary,
    DiagnosticLog, DiagnosticSummary, ImageData, ProviderStatus,
};

use super::Invoker;

const DEFAULT_CRAWL_BATCH: usize = 10;
const UNKNOWN_CATEGORY_COST: f64 = 1.0;

#[derive(Debug, Clone)]
struct StoredItem {
    item: CrawlItem,
    is_consumed: bool,
}

impl StoredItem {
    fn cost(&self) -> f64 {
        self.item
            .category()
            .map(|c| c.cost_minutes())
            .unwrap_or(UNKNOWN_CATEGORY_COST)
    }
}

struct BackendState {
    today: String,
    items: Vec<StoredItem>,
    throttle_level: u8,
    consumption_threads: u8,
    last_active_ms: Option<i64>,
    diagnostics: Vec<DiagnosticLog>,
    calls: Vec<(String, Value)>,
    failing: HashSet<String>,
    crawl_batch: usize,
    crawl_counter: u64,
}

pub struct LocalBackend {
    state: Mutex<BackendState>,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BackendState {
                today: Local::now().format("%Y-%m-%d").to_string(),
                items: Vec::new(),
                throttle_level: 5,
                consumption_threads: 1,
                last_active_ms: Some(Utc::now().timestamp_millis()),
                diagnostics: Vec::new(),
                calls: Vec::new(),
                failing: HashSet::new(),
                crawl_batch: DEFAULT_CRAWL_BATCH,
                crawl_counter: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adds a pending item dated today and returns its id.
    pub fn seed_item(&self, category: Category, url: &str) -> String {
        let today = self.lock().today.clone();
        self.seed_item_on(&today, category, url)
    }

    pub fn seed_item_on(&self, session_date: &str, category: Category, url: &str) -> String {
        let mut state = self.lock();
        state.crawl_counter += 1;
        let id = format!("item-{}", state.crawl_counter);
        let item = CrawlItem {
            id: id.clone(),
            source: "local".into(),
            category: category.as_str().into(),
            title: format!("{} #{}", category, state.crawl_counter),
            url: url.into(),
            thumbnail_url: None,
            description: None,
            fetched_at: Utc::now().to_rfc3339(),
            is_seen: false,
            is_saved: false,
            session_date: session_date.into(),
        };
        state.items.push(StoredItem {
            item,
            is_consumed: false,
        });
        id
    }

    pub fn set_today(&self, date: &str) {
        self.lock().today = date.into();
    }

    pub fn set_crawl_batch(&self, batch: usize) {
        self.lock().crawl_batch = batch;
    }

    pub fn set_last_active(&self, timestamp_ms: Option<i64>) {
        self.lock().last_active_ms = timestamp_ms;
    }

    pub fn last_active(&self) -> Option<i64> {
        self.lock().last_active_ms
    }

    /// Makes every future call to `command` fail until [`heal_command`](Self::heal_command).
    pub fn fail_command(&self, command: &str) {
        self.lock().failing.insert(command.into());
    }

    pub fn heal_command(&self, command: &str) {
        self.lock().failing.remove(command);
    }

    /// Arguments of every recorded call to `command`, oldest first.
    pub fn calls_to(&self, command: &str) -> Vec<Value> {
        self.lock()
            .calls
            .iter()
            .filter(|(name, _)| name == command)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn items(&self) -> Vec<CrawlItem> {
        self.lock().items.iter().map(|s| s.item.clone()).collect()
    }

    pub fn pending_count(&self) -> i64 {
        let state = self.lock();
        pending(&state).count() as i64
    }

    pub fn diagnostics(&self) -> Vec<DiagnosticLog> {
        self.lock().diagnostics.clone()
    }

    fn dispatch(&self, command: &str, args: &Value) -> Result<Value> {
        let mut state = self.lock();
        match command {
            "get_today_items" => to_value(today_items(&state, None)),
            "get_items_by_category" => {
                let category: Category = arg(args, "category")?;
                to_value(today_items(&state, Some(category)))
            }
            "get_today_stats" => to_value(stats(&state)),
            "get_daily_summary" => to_value(summary(&state)),
            "toggle_save_item" => {
                let id: String = arg(args, "itemId")?;
                let stored = find_item(&mut state, &id)?;
                stored.item.is_saved = !stored.item.is_saved;
                Ok(json!(stored.item.is_saved))
            }
            "mark_item_seen" => {
                let id: String = arg(args, "itemId")?;
                find_item(&mut state, &id)?.item.is_seen = true;
                Ok(Value::Null)
            }
            "open_url" => {
                let url: String = arg(args, "url")?;
                if url.trim().is_empty() {
                    bail!("empty url");
                }
                Ok(Value::Null)
            }
            "get_throttle_level" => Ok(json!(state.throttle_level)),
            "set_throttle_level" => {
                let level: u8 = arg(args, "level")?;
                state.throttle_level = level.clamp(1, 9);
                Ok(json!(state.throttle_level))
            }
            "get_consumption_threads" => Ok(json!(state.consumption_threads)),
            "set_consumption_threads" => {
                let count: u8 = arg(args, "count")?;
                state.consumption_threads = count.clamp(1, 8);
                Ok(json!(state.consumption_threads))
            }
            "get_pending_count" => Ok(json!(pending(&state).count())),
            "consume_pending_items" => {
                let budget: f64 = arg(args, "budgetMinutes")?;
                to_value(consume(&mut state, budget))
            }
            "prune_old_items" => {
                let today = state.today.clone();
                let before = state.items.len();
                state
                    .items
                    .retain(|s| s.is_consumed || s.item.session_date >= today);
                let deleted = (before - state.items.len()) as i64;
                let mut stripped = 0_i64;
                for stored in state.items.iter_mut() {
                    if stored.is_consumed && stored.item.session_date < today {
                        stored.item.title = "[ARCHIVED]".into();
                        stored.item.description = None;
                        stored.item.thumbnail_url = None;
                        stored.item.is_seen = true;
                        stripped += 1;
                    }
                }
                Ok(json!([deleted, stripped]))
            }
            // Seeded at construction; a cleared value reads as "just now".
            "get_last_active_timestamp" => Ok(json!(state
                .last_active_ms
                .unwrap_or_else(|| Utc::now().timestamp_millis()))),
            "set_last_active_timestamp" => {
                let timestamp: i64 = arg(args, "timestamp")?;
                state.last_active_ms = Some(timestamp);
                Ok(Value::Null)
            }
            "get_diagnostic_summary" => to_value(diagnostic_summary(&state)),
            "get_provider_status" => to_value(provider_status(&state)),
            "get_recent_diagnostics" => {
                let limit: i64 = arg(args, "limit")?;
                let logs: Vec<DiagnosticLog> = state
                    .diagnostics
                    .iter()
                    .rev()
                    .take(limit.max(0) as usize)
                    .cloned()
                    .collect();
                to_value(logs)
            }
            "log_diagnostic" => {
                let metadata = match args.get("metadata") {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(value.to_string()),
                };
                state.diagnostics.push(DiagnosticLog {
                    id: Uuid::new_v4().to_string(),
                    timestamp: Utc::now().to_rfc3339(),
                    event_type: arg(args, "eventType")?,
                    severity: arg(args, "severity")?,
                    message: arg(args, "message")?,
                    metadata,
                    related_item_id: None,
                });
                Ok(Value::Null)
            }
            "trigger_crawl" => {
                let batch = state.crawl_batch;
                drop(state);
                for n in 0..batch {
                    let category = Category::ALL[n % Category::ALL.len()];
                    self.seed_item(category, &format!("https://example.com/{category}/{n}"));
                }
                Ok(json!(batch))
            }
            "fetch_image" => {
                let url: String = arg(args, "url")?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    bail!("refusing to fetch non-http image '{url}'");
                }
                to_value(ImageData(format!("data:image/png;base64,{}", url.len())))
            }
            "on_app_background" => Ok(Value::Null),
            other => Err(anyhow!("unknown command '{other}'")),
        }
    }
}

#[async_trait]
impl Invoker for LocalBackend {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value> {
        {
            let mut state = self.lock();
            state.calls.push((command.to_string(), args.clone()));
            if state.failing.contains(command) {
                bail!("backend unavailable");
            }
        }
        self.dispatch(command, &args)
    }
}

fn arg<T: DeserializeOwned>(args: &Value, key: &str) -> Result<T> {
    let value = args
        .get(key)
        .cloned()
        .ok_or_else(|| anyhow!("missing argument '{key}'"))?;
    serde_json::from_value(value).with_context(|| format!("invalid argument '{key}'"))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value).context("failed to encode response")
}

fn pending(state: &BackendState) -> impl Iterator<Item = &StoredItem> {
    state
        .items
        .iter()
        .filter(move |s| !s.is_consumed && s.item.session_date == state.today)
}

fn find_item<'a>(state: &'a mut BackendState, id: &str) -> Result<&'a mut StoredItem> {
    state
        .items
        .iter_mut()
        .find(|s| s.item.id == id)
        .ok_or_else(|| anyhow!("no item with id '{id}'"))
}

fn today_items(state: &BackendState, category: Option<Category>) -> Vec<CrawlItem> {
    state
        .items
        .iter()
        .filter(|s| s.item.session_date == state.today)
        .filter(|s| category.map_or(true, |c| s.item.category() == Some(c)))
        .map(|s| s.item.clone())
        .collect()
}

/// Spends the budget on pending items, oldest first. Items that do not fit
/// stay pending for the next call.
fn consume(state: &mut BackendState, budget_minutes: f64) -> ConsumeResult {
    let today = state.today.clone();
    let mut result = ConsumeResult::default();
    let mut remaining = budget_minutes;

    for stored in state
        .items
        .iter_mut()
        .filter(|s| !s.is_consumed && s.item.session_date == today)
    {
        let cost = stored.cost();
        if remaining < cost {
            result.items_discarded += 1;
            continue;
        }
        remaining -= cost;
        stored.is_consumed = true;
        result.items_consumed += 1;
        result.time_consumed_minutes += cost;
        match stored.item.category() {
            Some(Category::Meme) => result.memes_consumed += 1,
            Some(Category::Joke) => result.jokes_consumed += 1,
            Some(Category::News) => result.news_consumed += 1,
            Some(Category::Video) => result.videos_consumed += 1,
            Some(Category::Gossip) => result.gossip_consumed += 1,
            None => {}
        }
    }
    result
}

fn stats(state: &BackendState) -> DayStats {
    let mut stats = DayStats::default();
    for stored in state.items.iter().filter(|s| s.item.session_date == state.today) {
        stats.total_items += 1;
        match stored.item.category() {
            Some(Category::Meme) => stats.memes_found += 1,
            Some(Category::Joke) => stats.jokes_found += 1,
            Some(Category::News) => stats.news_checked += 1,
            Some(Category::Video) => stats.videos_found += 1,
            Some(Category::Gossip) => stats.gossip_found += 1,
            None => {}
        }
        if stored.is_consumed {
            stats.estimated_time_saved_minutes += stored.cost();
        }
    }
    stats
}

fn summary(state: &BackendState) -> DaySummary {
    let stats = stats(state);
    let summary_text = format!(
        "Today I sifted through {} items and saved you {:.0} minutes.",
        stats.total_items, stats.estimated_time_saved_minutes
    );
    let mut highlights: Vec<CrawlItem> = today_items(state, None)
        .into_iter()
        .filter(|item| item.is_saved)
        .collect();
    if highlights.is_empty() {
        highlights = today_items(state, None).into_iter().take(3).collect();
    }
    DaySummary {
        stats,
        summary_text,
        highlights,
    }
}

fn diagnostic_summary(state: &BackendState) -> DiagnosticSummary {
    let costs: Vec<f64> = pending(state).map(StoredItem::cost).collect();
    let total: f64 = costs.iter().sum();
    let min = costs.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = costs.iter().cloned().fold(0.0, f64::max);
    let pending_count = costs.len() as i64;

    DiagnosticSummary {
        pending_count,
        estimated_buffer_health: BufferHealth::classify(pending_count, total),
        budget_analysis: BudgetAnalysis {
            min_cost_per_item: if min.is_finite() { min } else { 0.0 },
            max_cost_per_item: max,
            estimated_buffer_minutes: total,
            total_pending_cost_minutes: total,
        },
    }
}

fn provider_status(state: &BackendState) -> Vec<ProviderStatus> {
    Category::ALL
        .iter()
        .map(|category| {
            let has_items = state.items.iter().any(|s| {
                s.item.session_date == state.today && s.item.category() == Some(*category)
            });
            ProviderStatus {
                provider_name: format!("local-{category}"),
                category: category.as_str().into(),
                last_fetch_status: if has_items { "ok" } else { "unknown" }.into(),
                last_fetch_timestamp: has_items.then(|| state.today.clone()),
                recent_error_count: 0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consume_spends_budget_oldest_first() {
        let backend = LocalBackend::new();
        backend.seed_item(Category::Video, "https://v");
        backend.seed_item(Category::Meme, "https://m1");
        backend.seed_item(Category::Meme, "https://m2");

        let value = backend
            .invoke("consume_pending_items", json!({ "budgetMinutes": 3.5 }))
            .await
            .unwrap();
        let result: ConsumeResult = serde_json::from_value(value).unwrap();

        assert_eq!(result.items_consumed, 2);
        assert_eq!(result.videos_consumed, 1);
        assert_eq!(result.memes_consumed, 1);
        assert_eq!(result.items_discarded, 1);
        assert_eq!(backend.pending_count(), 1);
    }

    #[tokio::test]
    async fn prune_deletes_stale_pending_and_strips_stale_consumed() {
        let backend = LocalBackend::new();
        backend.set_today("2026-01-01");
        backend.seed_item(Category::Joke, "https://j");
        backend.seed_item(Category::Joke, "https://k");
        backend
            .invoke("consume_pending_items", json!({ "budgetMinutes": 0.3 }))
            .await
            .unwrap();

        backend.set_today("2026-01-02");
        let value = backend.invoke("prune_old_items", json!({})).await.unwrap();

        assert_eq!(value, json!([1, 1]));
        let items = backend.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "[ARCHIVED]");
    }

    #[tokio::test]
    async fn last_active_is_always_readable() {
        let before = Utc::now().timestamp_millis();
        let backend = LocalBackend::new();
        let seeded = backend
            .invoke("get_last_active_timestamp", json!({}))
            .await
            .unwrap();
        assert!(seeded.as_i64().unwrap() >= before);

        backend.set_last_active(None);
        let missing = backend
            .invoke("get_last_active_timestamp", json!({}))
            .await
            .unwrap();
        assert!(missing.as_i64().unwrap() >= before);

        backend
            .invoke("set_last_active_timestamp", json!({ "timestamp": 42 }))
            .await
            .unwrap();
        let value = backend
            .invoke("get_last_active_timestamp", json!({}))
            .await
            .unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn trigger_crawl_seeds_a_batch() {
        let backend = LocalBackend::new();
        backend.set_crawl_batch(4);

        let fetched = backend.invoke("trigger_crawl", json!({})).await.unwrap();

        assert_eq!(fetched, json!(4));
        assert_eq!(backend.pending_count(), 4);
    }

    #[tokio::test]
    async fn injected_failures_are_recorded() {
        let backend = LocalBackend::new();
        backend.fail_command("get_pending_count");

        assert!(backend.invoke("get_pending_count", json!({})).await.is_err());
        assert_eq!(backend.calls_to("get_pending_count").len(), 1);

        backend.heal_command("get_pending_count");
        assert!(backend.invoke("get_pending_count", json!({})).await.is_ok());
    }
}
