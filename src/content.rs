//! What the presentation layer shows besides the scheduler: the item list,
//! the daily summary, the hover preview and thumbnails.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::gateway::url::{is_web_url, UrlOpener};
use crate::gateway::Gateway;
use crate::models::{Category, CrawlItem, DaySummary};
use crate::scheduler::SessionScheduler;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Idle,
    Summary,
    Detail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl std::str::FromStr for CategoryFilter {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "all" => Ok(CategoryFilter::All),
            other => other.parse().map(CategoryFilter::Only),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedSnapshot {
    pub view: View,
    pub items: Vec<CrawlItem>,
    pub active_category: CategoryFilter,
    pub is_loading: bool,
    pub summary: Option<DaySummary>,
    pub hovered: Option<CrawlItem>,
}

struct FeedState {
    view: View,
    items: Vec<CrawlItem>,
    active_category: CategoryFilter,
    is_loading: bool,
    summary: Option<DaySummary>,
    hovered: Option<CrawlItem>,
    hover_timer: Option<JoinHandle<()>>,
    current_day: String,
}

impl FeedState {
    fn cancel_hover_timer(&mut self) {
        if let Some(timer) = self.hover_timer.take() {
            timer.abort();
        }
    }
}

/// Calendar key the backend files items under.
pub fn today_key() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct ContentFeed {
    state: Arc<Mutex<FeedState>>,
    gateway: Gateway,
    scheduler: SessionScheduler,
    opener: Arc<UrlOpener>,
}

impl ContentFeed {
    pub fn new(gateway: Gateway, scheduler: SessionScheduler, opener: Arc<UrlOpener>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FeedState {
                view: View::Idle,
                items: Vec::new(),
                active_category: CategoryFilter::All,
                is_loading: false,
                summary: None,
                hovered: None,
                hover_timer: None,
                current_day: today_key(),
            })),
            gateway,
            scheduler,
            opener,
        }
    }

    pub async fn snapshot(&self) -> FeedSnapshot {
        let state = self.state.lock().await;
        FeedSnapshot {
            view: state.view,
            items: state.items.clone(),
            active_category: state.active_category,
            is_loading: state.is_loading,
            summary: state.summary.clone(),
            hovered: state.hovered.clone(),
        }
    }

    /// On a calendar change, prunes the previous day's leftovers and drops
    /// everything cached for it.
    pub async fn check_new_day(&self, today: &str) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.current_day == today {
                return false;
            }
            state.current_day = today.to_string();
            state.items.clear();
            state.summary = None;
        }
        self.scheduler.report_loaded_items(0).await;
        log_info!("day rolled over to {today}");
        match self.gateway.prune_old_items().await {
            Ok(pruned) => log_info!(
                "pruned {} stale item(s), archived {}",
                pruned.deleted,
                pruned.stripped
            ),
            Err(err) => log_warn!("prune failed: {err:#}"),
        }
        true
    }

    async fn load_items(&self, category: Option<Category>) {
        self.check_new_day(&today_key()).await;
        self.state.lock().await.is_loading = true;

        let fetched = match category {
            None => self.gateway.get_today_items().await,
            Some(category) => self.gateway.get_items_by_category(category).await,
        };

        let loaded = {
            let mut state = self.state.lock().await;
            state.is_loading = false;
            match fetched {
                Ok(items) => state.items = items,
                Err(err) => log_debug!("item fetch failed: {err:#}"),
            }
            state.items.len()
        };
        self.scheduler.report_loaded_items(loaded).await;
    }

    pub async fn fetch_items(&self) {
        self.load_items(None).await;
    }

    pub async fn fetch_items_by_category(&self, category: Category) {
        self.load_items(Some(category)).await;
    }

    pub async fn set_active_category(&self, filter: CategoryFilter) {
        self.state.lock().await.active_category = filter;
        match filter {
            CategoryFilter::All => self.fetch_items().await,
            CategoryFilter::Only(category) => self.fetch_items_by_category(category).await,
        }
    }

    /// Loads the daily summary and switches to the summary view on success.
    pub async fn fetch_summary(&self) {
        self.check_new_day(&today_key()).await;
        self.state.lock().await.is_loading = true;

        let fetched = self.gateway.get_daily_summary().await;

        let mut state = self.state.lock().await;
        state.is_loading = false;
        match fetched {
            Ok(summary) => {
                state.summary = Some(summary);
                state.view = View::Summary;
            }
            Err(err) => log_debug!("summary fetch failed: {err:#}"),
        }
    }

    pub async fn peek_items(&self) {
        self.state.lock().await.view = View::Detail;
        self.fetch_items().await;
    }

    pub async fn toggle_save(&self, item_id: &str) -> anyhow::Result<bool> {
        let saved = self.gateway.toggle_save_item(item_id).await?;
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.iter_mut().find(|item| item.id == item_id) {
            item.is_saved = saved;
        }
        Ok(saved)
    }

    pub async fn mark_seen(&self, item_id: &str) -> anyhow::Result<()> {
        self.gateway.mark_item_seen(item_id).await?;
        let mut state = self.state.lock().await;
        if let Some(item) = state.items.iter_mut().find(|item| item.id == item_id) {
            item.is_seen = true;
        }
        Ok(())
    }

    /// Opens the item's link and marks it seen.
    pub async fn open_item(&self, item_id: &str) -> anyhow::Result<()> {
        let url = {
            let state = self.state.lock().await;
            state
                .items
                .iter()
                .find(|item| item.id == item_id)
                .map(|item| item.url.clone())
        };
        let url = url.ok_or_else(|| anyhow::anyhow!("item '{item_id}' is not loaded"))?;
        self.scheduler.record_interaction().await;
        self.opener.open(&url).await?;
        if let Err(err) = self.mark_seen(item_id).await {
            log_debug!("could not mark {item_id} seen: {err:#}");
        }
        Ok(())
    }

    pub async fn hover(&self, item: CrawlItem) {
        let mut state = self.state.lock().await;
        state.cancel_hover_timer();
        state.hovered = Some(item);
    }

    /// Clears the preview after the hover timeout unless the pointer comes
    /// back first.
    pub async fn leave_hover(&self) {
        let timeout = Duration::from_millis(self.scheduler.settings().hover_timeout_ms);
        let feed = self.clone();
        let mut state = self.state.lock().await;
        state.cancel_hover_timer();
        state.hover_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut state = feed.state.lock().await;
            state.hovered = None;
            state.hover_timer = None;
        }));
    }

    /// Displayable thumbnail for `item`. Protocol-relative URLs become https;
    /// only web URLs go through the backend's image proxy.
    pub async fn thumbnail(&self, item: &CrawlItem) -> Option<String> {
        let raw = item.thumbnail_url.as_deref()?;
        let url = match raw.strip_prefix("//") {
            Some(rest) => format!("https://{rest}"),
            None => raw.to_string(),
        };
        if !is_web_url(&url) {
            return Some(url);
        }
        match self.gateway.fetch_image(&url).await {
            Ok(image) => Some(image.0),
            Err(err) => {
                log_debug!("thumbnail fetch failed for {url}: {err:#}");
                None
            }
        }
    }

    /// Day-rollover check plus stats refresh, immediately and then on every
    /// refresh interval.
    pub fn spawn_refresh_loop(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let feed = self.clone();
        let period = Duration::from_millis(self.scheduler.settings().stats_refresh_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        feed.check_new_day(&today_key()).await;
                        feed.scheduler.refresh_stats().await;
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        })
    }
}
