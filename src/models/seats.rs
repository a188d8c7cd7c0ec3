use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One license assignment, normalized at the collaborator boundary (the
/// vendor API nests the assignee; the historical store flattens it).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    pub login: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub assigning_team: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity_editor: Option<String>,
}

/// One paginated snapshot of seat assignments (one API page or one
/// historical row).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SeatRecord {
    #[serde(default)]
    pub total_seats: u64,
    #[serde(default)]
    pub total_active_seats: u64,
    #[serde(default)]
    pub seats: Vec<Seat>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub has_next_page: Option<bool>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Deduplicated, filtered view over one or more [`SeatRecord`] pages.
/// `total_active_seats <= total_seats` always holds after aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SeatSummary {
    pub total_seats: u64,
    pub total_active_seats: u64,
    pub seats: Vec<Seat>,
}
