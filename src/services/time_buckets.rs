use chrono::NaiveDate;

use crate::models::usage::UsageRecord;

/// ISO week bucket key, e.g. `2024-W23`.
pub fn week_label(date: NaiveDate) -> String {
    date.format("%G-W%V").to_string()
}

/// Calendar month bucket key, e.g. `2024-06`.
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

pub fn display_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// Annotates every record with its week/month/display labels. Applied once
/// at ingestion, to every record regardless of source; records are treated
/// as immutable afterwards.
pub fn label_records(records: &mut [UsageRecord]) {
    for record in records.iter_mut() {
        record.time_frame_week = week_label(record.date);
        record.time_frame_month = month_label(record.date);
        record.time_frame_display = display_label(record.date);
    }
}
