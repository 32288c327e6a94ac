//! Typed client for the backend's named commands.
//!
//! Everything crosses a single asynchronous primitive, [`Invoker::invoke`],
//! which takes a command name plus a JSON argument object and resolves to a
//! JSON value. [`Gateway`] layers one typed method per command on top of it
//! and carries no business logic of its own.

pub mod local;
pub mod url;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::models::{
    Category, ConsumeResult, CrawlItem, DayStats, DaySummary, DiagnosticLog, DiagnosticSummary,
    ImageData, ProviderStatus, PruneResult, Severity,
};

const ENABLE_LOGS: bool = true;

use crate::log_debug;

/// The external invocation primitive.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value>;
}

#[derive(Clone)]
pub struct Gateway {
    invoker: Arc<dyn Invoker>,
}

impl Gateway {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    async fn call<T: DeserializeOwned>(&self, command: &str, args: Value) -> Result<T> {
        let value = self
            .invoker
            .invoke(command, args)
            .await
            .with_context(|| format!("backend command '{command}' failed"))?;
        serde_json::from_value(value)
            .with_context(|| format!("unexpected response shape from '{command}'"))
    }

    pub async fn get_today_items(&self) -> Result<Vec<CrawlItem>> {
        self.call("get_today_items", json!({})).await
    }

    pub async fn get_items_by_category(&self, category: Category) -> Result<Vec<CrawlItem>> {
        self.call("get_items_by_category", json!({ "category": category }))
            .await
    }

    pub async fn get_today_stats(&self) -> Result<DayStats> {
        self.call("get_today_stats", json!({})).await
    }

    pub async fn get_daily_summary(&self) -> Result<DaySummary> {
        self.call("get_daily_summary", json!({})).await
    }

    /// Returns the item's new saved state.
    pub async fn toggle_save_item(&self, item_id: &str) -> Result<bool> {
        self.call("toggle_save_item", json!({ "itemId": item_id }))
            .await
    }

    pub async fn mark_item_seen(&self, item_id: &str) -> Result<()> {
        self.call("mark_item_seen", json!({ "itemId": item_id })).await
    }

    /// Backend-side URL opening; see [`url::UrlOpener`] for the full chain.
    pub async fn open_url(&self, url: &str) -> Result<()> {
        self.call("open_url", json!({ "url": url })).await
    }

    pub async fn get_throttle_level(&self) -> Result<u8> {
        self.call("get_throttle_level", json!({})).await
    }

    pub async fn set_throttle_level(&self, level: u8) -> Result<u8> {
        let echoed: Option<u8> = self
            .call("set_throttle_level", json!({ "level": level }))
            .await?;
        Ok(echoed.unwrap_or(level))
    }

    pub async fn get_consumption_threads(&self) -> Result<u8> {
        self.call("get_consumption_threads", json!({})).await
    }

    pub async fn set_consumption_threads(&self, count: u8) -> Result<u8> {
        let echoed: Option<u8> = self
            .call("set_consumption_threads", json!({ "count": count }))
            .await?;
        Ok(echoed.unwrap_or(count))
    }

    pub async fn get_pending_count(&self) -> Result<i64> {
        self.call("get_pending_count", json!({})).await
    }

    pub async fn consume_pending_items(&self, budget_minutes: f64) -> Result<ConsumeResult> {
        self.call(
            "consume_pending_items",
            json!({ "budgetMinutes": budget_minutes }),
        )
        .await
    }

    pub async fn prune_old_items(&self) -> Result<PruneResult> {
        self.call("prune_old_items", json!({})).await
    }

    /// Epoch milliseconds of the last time the app was seen in the foreground.
    pub async fn get_last_active_timestamp(&self) -> Result<i64> {
        self.call("get_last_active_timestamp", json!({})).await
    }

    pub async fn set_last_active_timestamp(&self, timestamp_ms: i64) -> Result<()> {
        self.call(
            "set_last_active_timestamp",
            json!({ "timestamp": timestamp_ms }),
        )
        .await
    }

    pub async fn get_diagnostic_summary(&self) -> Result<DiagnosticSummary> {
        self.call("get_diagnostic_summary", json!({})).await
    }

    pub async fn get_provider_status(&self) -> Result<Vec<ProviderStatus>> {
        self.call("get_provider_status", json!({})).await
    }

    pub async fn get_recent_diagnostics(&self, limit: i64) -> Result<Vec<DiagnosticLog>> {
        self.call("get_recent_diagnostics", json!({ "limit": limit }))
            .await
    }

    /// Best-effort: a failed diagnostic write is dropped, never surfaced.
    pub async fn log_diagnostic(
        &self,
        event_type: &str,
        severity: Severity,
        message: &str,
        metadata: Option<Value>,
    ) {
        let args = json!({
            "eventType": event_type,
            "severity": severity,
            "message": message,
            "metadata": metadata,
        });
        if let Err(err) = self.call::<()>("log_diagnostic", args).await {
            log_debug!("dropping diagnostic '{event_type}': {err:#}");
        }
    }

    /// Asks the backend to crawl now; resolves to the number of items fetched.
    pub async fn trigger_crawl(&self) -> Result<i64> {
        self.call("trigger_crawl", json!({})).await
    }

    pub async fn fetch_image(&self, url: &str) -> Result<ImageData> {
        self.call("fetch_image", json!({ "url": url })).await
    }

    /// Android only: tells the native side the activity went to the background.
    pub async fn on_app_background(&self) -> Result<()> {
        self.call("on_app_background", json!({})).await
    }
}

#[cfg(test)]
mod tests {
    use super::local::LocalBackend;
    use super::*;

    #[tokio::test]
    async fn consume_sends_budget_in_minutes() {
        let backend = Arc::new(LocalBackend::new());
        let gateway = Gateway::new(backend.clone());

        gateway.consume_pending_items(3.0).await.unwrap();

        let calls = backend.calls_to("consume_pending_items");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["budgetMinutes"], json!(3.0));
    }

    #[tokio::test]
    async fn toggle_save_passes_item_id() {
        let backend = Arc::new(LocalBackend::new());
        backend.seed_item(Category::Meme, "https://example.com/a");
        let id = backend.items()[0].id.clone();
        let gateway = Gateway::new(backend.clone());

        assert!(gateway.toggle_save_item(&id).await.unwrap());
        assert!(!gateway.toggle_save_item(&id).await.unwrap());
        assert_eq!(backend.calls_to("toggle_save_item")[0]["itemId"], json!(id));
    }

    #[tokio::test]
    async fn failures_carry_command_name() {
        let backend = Arc::new(LocalBackend::new());
        backend.fail_command("get_today_stats");
        let gateway = Gateway::new(backend);

        let err = gateway.get_today_stats().await.unwrap_err();
        assert!(format!("{err:#}").contains("get_today_stats"));
    }

    #[tokio::test]
    async fn log_diagnostic_swallows_failures() {
        let backend = Arc::new(LocalBackend::new());
        backend.fail_command("log_diagnostic");
        let gateway = Gateway::new(backend.clone());

        gateway
            .log_diagnostic("app_resume", Severity::Info, "hello", None)
            .await;
        assert_eq!(backend.calls_to("log_diagnostic").len(), 1);
    }

    #[tokio::test]
    async fn prune_maps_pair_to_counts() {
        let backend = Arc::new(LocalBackend::new());
        let gateway = Gateway::new(backend);

        let pruned = gateway.prune_old_items().await.unwrap();
        assert_eq!(pruned, PruneResult { deleted: 0, stripped: 0 });
    }
}
