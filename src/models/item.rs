//! Content records handed out by the backend.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Meme,
    Joke,
    News,
    Video,
    Gossip,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Meme,
        Category::Joke,
        Category::News,
        Category::Video,
        Category::Gossip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Meme => "meme",
            Category::Joke => "joke",
            Category::News => "news",
            Category::Video => "video",
            Category::Gossip => "gossip",
        }
    }

    /// Minutes of simulated attention one item of this category costs.
    pub fn cost_minutes(&self) -> f64 {
        match self {
            Category::Meme => 0.5,
            Category::Joke => 0.3,
            Category::News => 2.0,
            Category::Video => 3.0,
            Category::Gossip => 1.5,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "meme" => Ok(Category::Meme),
            "joke" => Ok(Category::Joke),
            "news" => Ok(Category::News),
            "video" => Ok(Category::Video),
            "gossip" => Ok(Category::Gossip),
            _ => Err(anyhow!("unknown category '{value}'")),
        }
    }
}

/// One crawled item. The client never mutates these; it only asks the
/// backend to flip `is_seen`/`is_saved` by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrawlItem {
    pub id: String,
    pub source: String,
    pub category: String,
    pub title: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub fetched_at: String,
    pub is_seen: bool,
    pub is_saved: bool,
    pub session_date: String,
}

impl CrawlItem {
    pub fn category(&self) -> Option<Category> {
        self.category.parse().ok()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DayStats {
    pub memes_found: i64,
    pub jokes_found: i64,
    pub news_checked: i64,
    pub videos_found: i64,
    pub gossip_found: i64,
    pub total_items: i64,
    pub estimated_time_saved_minutes: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaySummary {
    pub stats: DayStats,
    pub summary_text: String,
    pub highlights: Vec<CrawlItem>,
}

/// Opaque image payload returned by `fetch_image`, usually a data URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ImageData(pub String);
