//! Human-readable summaries of what a consumption pass went through.

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::ConsumeResult;

pub const NO_CONTENT_MESSAGE: &str =
    "No content found. The internet is quiet... suspiciously quiet.";

/// `{summary}` is the clause list, `{count}` the raw number of items.
const PHASE_END_TEMPLATES: [&str; 7] = [
    "Doomscrolled {summary} so you don't have to. You're welcome.",
    "Just inhaled {summary}. Your productivity is safe. For now.",
    "Consumed {summary}. The internet never sleeps and neither do I.",
    "{summary} catalogued. Your procrastination proxy delivers.",
    "Finished binging {summary}. Back to pretending to work.",
    "{count} distractions neutralized. {summary} absorbed.",
    "Another haul: {summary}. You owe me a coffee.",
];

/// Which consumption thread produced a toast, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadTag {
    pub index: u8,
    pub of: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: u64,
    pub text: String,
    pub thread: Option<ThreadTag>,
}

impl fmt::Display for Toast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread {
            Some(tag) => write!(f, "[thread {}/{}] {}", tag.index, tag.of, self.text),
            None => f.write_str(&self.text),
        }
    }
}

fn clause(count: i64, singular: &str, plural: &str) -> Option<String> {
    match count {
        n if n <= 0 => None,
        1 => Some(format!("1 {singular}")),
        n => Some(format!("{n} {plural}")),
    }
}

/// Comma-joined per-category clauses, or `"<N> items"` when the backend
/// reported a total without a breakdown.
pub fn consumed_summary(result: &ConsumeResult) -> String {
    let parts: Vec<String> = [
        clause(result.memes_consumed, "meme", "memes"),
        clause(result.jokes_consumed, "dad joke", "dad jokes"),
        clause(result.news_consumed, "news article", "news articles"),
        clause(result.videos_consumed, "video", "videos"),
        clause(result.gossip_consumed, "gossip piece", "gossip pieces"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if parts.is_empty() {
        format!("{} items", result.items_consumed)
    } else {
        parts.join(", ")
    }
}

/// Phase-end message with a template picked uniformly by `rng`.
pub fn phase_end_toast<R: Rng + ?Sized>(result: &ConsumeResult, rng: &mut R) -> String {
    if result.is_empty() {
        return NO_CONTENT_MESSAGE.to_string();
    }

    let summary = consumed_summary(result);
    let template = PHASE_END_TEMPLATES
        .choose(rng)
        .copied()
        .unwrap_or(PHASE_END_TEMPLATES[0]);
    template
        .replace("{summary}", &summary)
        .replace("{count}", &result.items_consumed.to_string())
}

/// Catch-up message shown after the app comes back to the foreground.
pub fn resume_toast(result: &ConsumeResult) -> String {
    format!(
        "While you were away, I doomscrolled through {}. You're welcome.",
        consumed_summary(result)
    )
}
