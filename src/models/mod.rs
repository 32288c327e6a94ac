mod consume;
mod diagnostics;
mod item;

pub use consume::{ConsumeResult, PruneResult};
pub use diagnostics::{
    BudgetAnalysis, BufferHealth, DiagnosticLog, DiagnosticSummary, ProviderStatus, Severity,
};
pub use item::{Category, CrawlItem, DayStats, DaySummary, ImageData};
