//! Diagnostic records exposed by the backend's diagnostics panel commands.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BufferHealth {
    Empty,
    Low,
    Moderate,
    Healthy,
}

impl BufferHealth {
    /// Classifies the pending buffer by its total cost in minutes.
    pub fn classify(pending_count: i64, total_cost_minutes: f64) -> Self {
        if pending_count == 0 {
            BufferHealth::Empty
        } else if total_cost_minutes < 5.0 {
            BufferHealth::Low
        } else if total_cost_minutes < 15.0 {
            BufferHealth::Moderate
        } else {
            BufferHealth::Healthy
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BudgetAnalysis {
    pub min_cost_per_item: f64,
    pub max_cost_per_item: f64,
    pub estimated_buffer_minutes: f64,
    pub total_pending_cost_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticSummary {
    pub pending_count: i64,
    pub estimated_buffer_health: BufferHealth,
    pub budget_analysis: BudgetAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderStatus {
    pub provider_name: String,
    pub category: String,
    /// `ok`, `error` or `unknown`.
    pub last_fetch_status: String,
    pub last_fetch_timestamp: Option<String>,
    pub recent_error_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiagnosticLog {
    pub id: String,
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub event_type: String,
    pub severity: String,
    pub message: String,
    pub metadata: Option<String>,
    pub related_item_id: Option<String>,
}
