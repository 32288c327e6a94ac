use serde::{Deserialize, Serialize};

/// Outcome of one `consume_pending_items` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsumeResult {
    pub items_consumed: i64,
    pub items_discarded: i64,
    pub time_consumed_minutes: f64,
    pub memes_consumed: i64,
    pub jokes_consumed: i64,
    pub news_consumed: i64,
    pub videos_consumed: i64,
    pub gossip_consumed: i64,
}

impl ConsumeResult {
    pub fn is_empty(&self) -> bool {
        self.items_consumed == 0
    }
}

/// Counts from `prune_old_items`. The backend answers with a `[deleted, stripped]` pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "(i64, i64)", into = "(i64, i64)")]
pub struct PruneResult {
    pub deleted: i64,
    pub stripped: i64,
}

impl From<(i64, i64)> for PruneResult {
    fn from((deleted, stripped): (i64, i64)) -> Self {
        Self { deleted, stripped }
    }
}

impl From<PruneResult> for (i64, i64) {
    fn from(result: PruneResult) -> Self {
        (result.deleted, result.stripped)
    }
}
