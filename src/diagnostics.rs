//! Context attached to `doomscroll_trigger` diagnostics, and their export.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::gateway::Gateway;
use crate::models::DiagnosticLog;
use crate::scheduler::{SchedulerState, SystemStatus, TriggerSource};

pub const TRIGGER_EVENT: &str = "doomscroll_trigger";
const EXPORT_SCAN_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerContext {
    pub source: String,
    pub current_status: SystemStatus,
    /// Milliseconds since the client started.
    pub app_uptime: i64,
    pub time_since_last_interaction: i64,
    pub items_available: i64,
    pub throttle_level: u8,
    pub thread_count: u8,
}

impl TriggerContext {
    pub fn new(source: TriggerSource, state: &SchedulerState, now: DateTime<Utc>) -> Self {
        Self {
            source: source.as_str().to_string(),
            current_status: state.status,
            app_uptime: (now - state.app_start_time).num_milliseconds(),
            time_since_last_interaction: (now - state.last_interaction_time).num_milliseconds(),
            items_available: 0,
            throttle_level: state.throttle_level.get(),
            thread_count: state.thread_count.get(),
        }
    }

    /// Fills `items_available` from the backend's pending count, or from
    /// `fallback` (items already loaded client-side) when that fails.
    pub async fn with_pending_count(mut self, gateway: &Gateway, fallback: usize) -> Self {
        self.items_available = match gateway.get_diagnostic_summary().await {
            Ok(summary) => summary.pending_count,
            Err(_) => fallback as i64,
        };
        self
    }
}

/// `doomscroll_trigger` entries at or after `since` (default: the last day)
/// as pretty-printed JSON.
pub async fn export_trigger_logs(gateway: &Gateway, since: Option<DateTime<Utc>>) -> Result<String> {
    let since = since.unwrap_or_else(|| Utc::now() - Duration::hours(24));
    let logs = gateway.get_recent_diagnostics(EXPORT_SCAN_LIMIT).await?;
    let triggers: Vec<DiagnosticLog> = logs
        .into_iter()
        .filter(|log| log.event_type == TRIGGER_EVENT)
        .filter(|log| {
            DateTime::parse_from_rfc3339(&log.timestamp)
                .map(|ts| ts.with_timezone(&Utc) >= since)
                .unwrap_or(false)
        })
        .collect();
    serde_json::to_string_pretty(&triggers).context("failed to encode trigger logs")
}
