use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::models::query::MetricsQuery;
use crate::models::seats::SeatSummary;
use crate::models::team::{DropdownFilterItem, Team};
use crate::models::usage::{TimeFrame, UsageRecord};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification hook for UI re-render triggers. Observers subscribe via
/// [`DashboardService::subscribe`]; a send with no receivers is fine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardEvent {
    Initialized,
    FiltersChanged,
    LoadingChanged(bool),
    MetricsRefreshed,
    SeatsRefreshed,
}

/// The mutable dashboard aggregate: the raw fetched dataset, its derived
/// filtered projection, and every user-toggled filter. Lives for one page
/// session; no persistence.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardState {
    pub api_data: Vec<UsageRecord>,
    pub filtered_data: Vec<UsageRecord>,
    pub seat_summary: SeatSummary,
    pub teams: Vec<Team>,
    pub languages: Vec<DropdownFilterItem>,
    pub editors: Vec<DropdownFilterItem>,
    pub team_items: Vec<DropdownFilterItem>,
    pub time_frame: TimeFrame,
    pub hide_weekends: bool,
    pub is_loading: bool,
    pub pending_team_change: bool,
    pub last_query: Option<MetricsQuery>,
}

/// Single-writer state machine over [`DashboardState`] plus the refresh
/// protocol. Every mutation takes the write lock, so interleaved callers
/// serialize; refreshes carry a sequence number and superseded responses
/// are discarded.
pub struct DashboardService {
    source: Arc<dyn crate::providers::DashboardDataSource>,
    state: RwLock<DashboardState>,
    events: broadcast::Sender<DashboardEvent>,
    refresh_seq: AtomicU64,
}

impl DashboardService {
    pub fn new(source: Arc<dyn crate::providers::DashboardDataSource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            source,
            state: RwLock::new(DashboardState::default()),
            events,
            refresh_seq: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state.read().expect("state lock poisoned").clone()
    }

    /// Page-load fan-out: metrics, seats and teams fetched in parallel and
    /// joined fail-fast. An error here aborts rendering entirely, unlike
    /// the interactive refresh path.
    pub async fn load_initial(&self, query: MetricsQuery) -> AppResult<()> {
        let scope = query.scope.clone();
        let until = query.range.until;

        let (records, seat_summary, teams) = tokio::try_join!(
            self.source.fetch_metrics(&query, &[]),
            self.source.fetch_seats(&scope, until, &[]),
            self.source.fetch_teams(&scope, until),
        )?;

        self.initialize(records, seat_summary, teams, query);
        Ok(())
    }

    /// Replaces all stored data and derived collections; `filtered_data`
    /// becomes the full bucketed dataset. Input is assumed validated by the
    /// caller; there is no error path.
    pub fn initialize(
        &self,
        records: Vec<UsageRecord>,
        seat_summary: SeatSummary,
        teams: Vec<Team>,
        query: MetricsQuery,
    ) {
        {
            let mut state = self.state.write().expect("state lock poisoned");
            state.languages = distinct_items(records.iter().flat_map(|record| {
                record.breakdown.iter().map(|entry| entry.language.as_str())
            }));
            state.editors = distinct_items(records.iter().flat_map(|record| {
                record.breakdown.iter().map(|entry| entry.editor.as_str())
            }));
            state.team_items = teams
                .iter()
                .map(|team| DropdownFilterItem::new(&team.name))
                .collect();
            state.api_data = records;
            state.seat_summary = seat_summary;
            state.teams = teams;
            state.pending_team_change = false;
            state.is_loading = false;
            state.last_query = Some(query);
            recompute_filtered(&mut state);
        }
        self.emit(DashboardEvent::Initialized);
    }

    /// Flips the matching language item; silently a no-op when the value is
    /// not present in the current dataset.
    pub fn toggle_language(&self, value: &str) {
        let changed = {
            let mut state = self.state.write().expect("state lock poisoned");
            let changed = toggle_value(&mut state.languages, value);
            if changed {
                recompute_filtered(&mut state);
            }
            changed
        };
        if changed {
            self.emit(DashboardEvent::FiltersChanged);
        }
    }

    pub fn toggle_editor(&self, value: &str) {
        let changed = {
            let mut state = self.state.write().expect("state lock poisoned");
            let changed = toggle_value(&mut state.editors, value);
            if changed {
                recompute_filtered(&mut state);
            }
            changed
        };
        if changed {
            self.emit(DashboardEvent::FiltersChanged);
        }
    }

    /// Flips the matching team item and marks the selection as pending.
    /// Team narrowing is server-side only, so the local recompute does not
    /// filter by team; the re-fetch happens when the dropdown closes.
    pub fn toggle_team(&self, value: &str) {
        let changed = {
            let mut state = self.state.write().expect("state lock poisoned");
            let changed = toggle_value(&mut state.team_items, value);
            if changed {
                state.pending_team_change = true;
                recompute_filtered(&mut state);
            }
            changed
        };
        if changed {
            self.emit(DashboardEvent::FiltersChanged);
        }
    }

    pub fn set_time_frame(&self, time_frame: TimeFrame) {
        {
            let mut state = self.state.write().expect("state lock poisoned");
            state.time_frame = time_frame;
            recompute_filtered(&mut state);
        }
        self.emit(DashboardEvent::FiltersChanged);
    }

    pub fn set_hide_weekends(&self, hide: bool) {
        {
            let mut state = self.state.write().expect("state lock poisoned");
            state.hide_weekends = hide;
            recompute_filtered(&mut state);
        }
        self.emit(DashboardEvent::FiltersChanged);
    }

    /// Clears every selection and flag, recomputes locally, then
    /// unconditionally refreshes server data with an empty team selection.
    pub async fn reset_all_filters(&self) {
        {
            let mut state = self.state.write().expect("state lock poisoned");
            let state = &mut *state;
            for item in state
                .languages
                .iter_mut()
                .chain(state.editors.iter_mut())
                .chain(state.team_items.iter_mut())
            {
                item.is_selected = false;
            }
            state.hide_weekends = false;
            state.pending_team_change = false;
            recompute_filtered(state);
        }
        self.emit(DashboardEvent::FiltersChanged);

        self.refresh_with_teams(Vec::new()).await;
    }

    /// Invoked when the team dropdown closes: refreshes server data with
    /// the currently selected teams if a selection change is pending, and
    /// is a no-op otherwise.
    pub async fn refresh_team_data_if_needed(&self) {
        let selected = {
            let mut state = self.state.write().expect("state lock poisoned");
            if !state.pending_team_change {
                return;
            }
            state.pending_team_change = false;
            selected_values(&state.team_items)
        };

        self.refresh_with_teams(selected).await;
    }

    /// Refresh protocol: re-fetches metrics and seats concurrently with the
    /// last-used query narrowed to `selected_teams`. Either half failing is
    /// logged and swallowed, leaving its previous value in place (stale
    /// over broken). Responses for a superseded refresh are discarded; the
    /// owner of the latest sequence clears the loading flag on every path.
    pub async fn refresh_with_teams(&self, selected_teams: Vec<String>) {
        let seq = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let query = {
            let mut state = self.state.write().expect("state lock poisoned");
            state.is_loading = true;
            state.last_query.clone()
        };
        self.emit(DashboardEvent::LoadingChanged(true));

        let Some(query) = query else {
            warn!(target: "app::dashboard", "refresh requested before initial load");
            self.finish_refresh(seq);
            return;
        };

        debug!(
            target: "app::dashboard",
            seq,
            teams = selected_teams.len(),
            "refreshing server data"
        );

        let scope = query.scope.clone();
        let until = query.range.until;
        let (metrics, seats) = tokio::join!(
            self.source.fetch_metrics(&query, &selected_teams),
            self.source.fetch_seats(&scope, until, &selected_teams),
        );

        if self.refresh_seq.load(Ordering::SeqCst) != seq {
            debug!(target: "app::dashboard", seq, "discarding superseded refresh response");
            return;
        }

        match metrics {
            Ok(records) => {
                {
                    let mut state = self.state.write().expect("state lock poisoned");
                    state.languages = distinct_items(records.iter().flat_map(|record| {
                        record.breakdown.iter().map(|entry| entry.language.as_str())
                    }));
                    state.editors = distinct_items(records.iter().flat_map(|record| {
                        record.breakdown.iter().map(|entry| entry.editor.as_str())
                    }));
                    // Team items are rebuilt from the held team list; prior
                    // selections are reapplied by value.
                    let selected: HashSet<String> =
                        selected_values(&state.team_items).into_iter().collect();
                    state.team_items = state
                        .teams
                        .iter()
                        .map(|team| DropdownFilterItem {
                            value: team.name.clone(),
                            is_selected: selected.contains(&team.name),
                        })
                        .collect();
                    state.api_data = records;
                    recompute_filtered(&mut state);
                }
                self.emit(DashboardEvent::MetricsRefreshed);
            }
            Err(error) => {
                warn!(
                    target: "app::dashboard",
                    seq,
                    %error,
                    "metrics refresh failed, keeping previous dataset"
                );
            }
        }

        match seats {
            Ok(summary) => {
                {
                    let mut state = self.state.write().expect("state lock poisoned");
                    state.seat_summary = summary;
                }
                self.emit(DashboardEvent::SeatsRefreshed);
            }
            Err(error) => {
                warn!(
                    target: "app::dashboard",
                    seq,
                    %error,
                    "seat refresh failed, keeping previous summary"
                );
            }
        }

        self.finish_refresh(seq);
    }

    fn finish_refresh(&self, seq: u64) {
        if self.refresh_seq.load(Ordering::SeqCst) != seq {
            return;
        }
        {
            let mut state = self.state.write().expect("state lock poisoned");
            state.is_loading = false;
        }
        self.emit(DashboardEvent::LoadingChanged(false));
    }

    fn emit(&self, event: DashboardEvent) {
        let _ = self.events.send(event);
    }
}

fn toggle_value(items: &mut [DropdownFilterItem], value: &str) -> bool {
    match items.iter_mut().find(|item| item.value == value) {
        Some(item) => {
            item.is_selected = !item.is_selected;
            true
        }
        None => {
            debug!(target: "app::dashboard", %value, "toggle for unknown filter value ignored");
            false
        }
    }
}

fn selected_values(items: &[DropdownFilterItem]) -> Vec<String> {
    items
        .iter()
        .filter(|item| item.is_selected)
        .map(|item| item.value.clone())
        .collect()
}

fn distinct_items<'a>(values: impl Iterator<Item = &'a str>) -> Vec<DropdownFilterItem> {
    let distinct: BTreeSet<&str> = values.collect();
    distinct.into_iter().map(DropdownFilterItem::new).collect()
}

/// Re-derives `filtered_data` from `api_data`: weekend drop, time-bucket
/// grouping, then breakdown intersection against the selected language and
/// editor sets (AND across facets, OR within one; an empty selection leaves
/// that facet inactive). Buckets whose breakdown empties are dropped.
fn recompute_filtered(state: &mut DashboardState) {
    let rows: Vec<UsageRecord> = state
        .api_data
        .iter()
        .filter(|record| !(state.hide_weekends && record.is_weekend()))
        .cloned()
        .collect();

    let bucketed = match state.time_frame {
        TimeFrame::Daily => rows,
        TimeFrame::Weekly => bucket_rows(rows, |record| record.time_frame_week.clone()),
        TimeFrame::Monthly => bucket_rows(rows, |record| record.time_frame_month.clone()),
    };

    let selected_languages: HashSet<&str> = state
        .languages
        .iter()
        .filter(|item| item.is_selected)
        .map(|item| item.value.as_str())
        .collect();
    let selected_editors: HashSet<&str> = state
        .editors
        .iter()
        .filter(|item| item.is_selected)
        .map(|item| item.value.as_str())
        .collect();

    let filtered = if selected_languages.is_empty() && selected_editors.is_empty() {
        bucketed
    } else {
        bucketed
            .into_iter()
            .filter_map(|mut record| {
                record.breakdown.retain(|entry| {
                    (selected_languages.is_empty()
                        || selected_languages.contains(entry.language.as_str()))
                        && (selected_editors.is_empty()
                            || selected_editors.contains(entry.editor.as_str()))
                });
                if record.breakdown.is_empty() {
                    None
                } else {
                    Some(record)
                }
            })
            .collect()
    };

    state.filtered_data = filtered;
}

/// Collapses rows into one synthesized row per bucket. The representative
/// is the bucket's newest-dated member, re-used as-is (breakdown and totals
/// included) with the bucket key as its display label. Counts are
/// deliberately NOT summed across the bucket; displayed totals follow the
/// representative.
fn bucket_rows<F>(rows: Vec<UsageRecord>, bucket_key: F) -> Vec<UsageRecord>
where
    F: Fn(&UsageRecord) -> String,
{
    let mut order: Vec<String> = Vec::new();
    let mut representatives: HashMap<String, UsageRecord> = HashMap::new();

    for row in rows {
        let key = bucket_key(&row);
        match representatives.get(&key) {
            Some(existing) if existing.date >= row.date => {}
            Some(_) => {
                representatives.insert(key, row);
            }
            None => {
                order.push(key.clone());
                representatives.insert(key, row);
            }
        }
    }

    order
        .into_iter()
        .map(|key| {
            let mut row = representatives
                .remove(&key)
                .expect("bucket representative present");
            row.time_frame_display = key;
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::usage::BreakdownEntry;
    use chrono::NaiveDate;

    fn record(date: &str, suggestions: u64) -> UsageRecord {
        let date = date.parse::<NaiveDate>().expect("valid date");
        let mut record = UsageRecord {
            date,
            total_suggestions_count: suggestions,
            total_acceptances_count: 0,
            total_lines_suggested: 0,
            total_lines_accepted: 0,
            total_active_users: 0,
            total_chat_acceptances: 0,
            total_chat_turns: 0,
            total_active_chat_users: 0,
            breakdown: vec![BreakdownEntry {
                language: "rust".into(),
                editor: "vscode".into(),
                suggestions_count: suggestions,
                acceptances_count: 0,
                lines_suggested: 0,
                lines_accepted: 0,
                active_users: 1,
            }],
            time_frame_week: String::new(),
            time_frame_month: String::new(),
            time_frame_display: String::new(),
        };
        crate::services::time_buckets::label_records(std::slice::from_mut(&mut record));
        record
    }

    #[test]
    fn weekly_bucket_keeps_newest_representative() {
        // Mon + Wed of the same ISO week, plus one row the week after.
        let rows = vec![
            record("2024-06-03", 10),
            record("2024-06-05", 20),
            record("2024-06-10", 30),
        ];

        let buckets = bucket_rows(rows, |row| row.time_frame_week.clone());

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].total_suggestions_count, 20);
        assert_eq!(buckets[0].time_frame_display, "2024-W23");
        assert_eq!(buckets[1].total_suggestions_count, 30);
    }

    #[test]
    fn bucket_order_follows_first_appearance() {
        let rows = vec![
            record("2024-06-03", 1),
            record("2024-06-10", 2),
            record("2024-06-04", 3),
        ];

        let buckets = bucket_rows(rows, |row| row.time_frame_week.clone());

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].time_frame_display, "2024-W23");
        assert_eq!(buckets[0].total_suggestions_count, 3);
        assert_eq!(buckets[1].time_frame_display, "2024-W24");
    }
}
