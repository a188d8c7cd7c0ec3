use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::models::seats::{Seat, SeatRecord, SeatSummary};

/// Trailing window that counts a seat as active, measured back from the
/// aggregation reference instant.
pub const ACTIVITY_WINDOW_DAYS: i64 = 30;

/// Merges one or more seat pages into a single summary: flatten in input
/// order, dedupe by login (first occurrence wins), apply the optional
/// assigning-team filter, then recount totals. Zero pages yields the empty
/// summary.
pub fn aggregate_seats(
    pages: &[SeatRecord],
    team_filter: Option<&HashSet<String>>,
    reference: DateTime<Utc>,
) -> SeatSummary {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut seats: Vec<Seat> = Vec::new();

    for page in pages {
        for seat in &page.seats {
            if !seen.insert(seat.login.as_str()) {
                continue;
            }
            if let Some(filter) = team_filter {
                if !filter.is_empty() {
                    match seat.assigning_team.as_deref() {
                        Some(team) if filter.contains(team) => {}
                        _ => continue,
                    }
                }
            }
            seats.push(seat.clone());
        }
    }

    let activity_floor = reference - Duration::days(ACTIVITY_WINDOW_DAYS);
    let total_seats = seats.len() as u64;
    let total_active_seats = seats
        .iter()
        .filter(|seat| {
            seat.last_activity_at
                .map(|at| at >= activity_floor)
                .unwrap_or(false)
        })
        .count() as u64;

    debug!(
        target: "app::seats",
        pages = pages.len(),
        total_seats,
        total_active_seats,
        filtered = team_filter.map(|f| !f.is_empty()).unwrap_or(false),
        "aggregated seat pages"
    );

    SeatSummary {
        total_seats,
        total_active_seats,
        seats,
    }
}
