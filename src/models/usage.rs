use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TimeFrame {
    Daily,
    Weekly,
    Monthly,
}

impl TimeFrame {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Daily => "daily",
            TimeFrame::Weekly => "weekly",
            TimeFrame::Monthly => "monthly",
        }
    }
}

impl Default for TimeFrame {
    fn default() -> Self {
        TimeFrame::Daily
    }
}

/// Per-language/editor usage sub-record within one day's [`UsageRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakdownEntry {
    pub language: String,
    pub editor: String,
    #[serde(default)]
    pub suggestions_count: u64,
    #[serde(default)]
    pub acceptances_count: u64,
    #[serde(default)]
    pub lines_suggested: u64,
    #[serde(default)]
    pub lines_accepted: u64,
    #[serde(default)]
    pub active_users: u64,
}

/// One day of aggregate usage for a scope. The `time_frame_*` labels are not
/// part of the wire payload; they are attached once by the bucket labeler
/// and the record is treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageRecord {
    #[serde(alias = "day")]
    pub date: NaiveDate,
    #[serde(default)]
    pub total_suggestions_count: u64,
    #[serde(default)]
    pub total_acceptances_count: u64,
    #[serde(default)]
    pub total_lines_suggested: u64,
    #[serde(default)]
    pub total_lines_accepted: u64,
    #[serde(default)]
    pub total_active_users: u64,
    #[serde(default)]
    pub total_chat_acceptances: u64,
    #[serde(default)]
    pub total_chat_turns: u64,
    #[serde(default)]
    pub total_active_chat_users: u64,
    #[serde(default)]
    pub breakdown: Vec<BreakdownEntry>,
    #[serde(default)]
    pub time_frame_week: String,
    #[serde(default)]
    pub time_frame_month: String,
    #[serde(default)]
    pub time_frame_display: String,
}

impl UsageRecord {
    pub fn is_weekend(&self) -> bool {
        matches!(self.date.weekday(), Weekday::Sat | Weekday::Sun)
    }
}
