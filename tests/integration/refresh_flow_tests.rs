use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use metricsdash::error::{AppError, AppResult};
use metricsdash::models::query::{DateRange, MetricsQuery, Scope};
use metricsdash::models::seats::SeatSummary;
use metricsdash::models::team::Team;
use metricsdash::models::usage::{BreakdownEntry, UsageRecord};
use metricsdash::providers::DashboardDataSource;
use metricsdash::services::dashboard_service::{DashboardEvent, DashboardService};
use metricsdash::services::time_buckets::label_records;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Source whose halves can be failed independently, and whose metrics call
/// can be slowed down per team tag to force one refresh to straddle another.
struct ScriptedSource {
    metrics: Vec<UsageRecord>,
    summary: SeatSummary,
    teams: Vec<Team>,
    fail_metrics: AtomicBool,
    fail_seats: AtomicBool,
    slow_team: Option<String>,
    metrics_calls: AtomicUsize,
    seats_calls: AtomicUsize,
    last_seats_teams: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn new(metrics: Vec<UsageRecord>, summary: SeatSummary, teams: Vec<Team>) -> Self {
        Self {
            metrics,
            summary,
            teams,
            fail_metrics: AtomicBool::new(false),
            fail_seats: AtomicBool::new(false),
            slow_team: None,
            metrics_calls: AtomicUsize::new(0),
            seats_calls: AtomicUsize::new(0),
            last_seats_teams: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DashboardDataSource for ScriptedSource {
    async fn fetch_metrics(
        &self,
        _query: &MetricsQuery,
        teams: &[String],
    ) -> AppResult<Vec<UsageRecord>> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(slow) = &self.slow_team {
            if teams.contains(slow) {
                sleep(Duration::from_millis(200)).await;
            }
        }
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(AppError::Upstream {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        // Tag the returned rows with the team count so callers can tell
        // which refresh's payload landed.
        let mut records = self.metrics.clone();
        for record in &mut records {
            record.total_active_users = teams.len() as u64;
        }
        Ok(records)
    }

    async fn fetch_seats(
        &self,
        _scope: &Scope,
        _date: NaiveDate,
        teams: &[String],
    ) -> AppResult<SeatSummary> {
        self.seats_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_seats_teams.lock().unwrap() = teams.to_vec();
        if self.fail_seats.load(Ordering::SeqCst) {
            return Err(AppError::Upstream {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.summary.clone())
    }

    async fn fetch_teams(&self, _scope: &Scope, _date: NaiveDate) -> AppResult<Vec<Team>> {
        Ok(self.teams.clone())
    }
}

fn record(date: &str, suggestions: u64) -> UsageRecord {
    UsageRecord {
        date: date.parse().expect("valid date"),
        total_suggestions_count: suggestions,
        total_acceptances_count: 0,
        total_lines_suggested: 0,
        total_lines_accepted: 0,
        total_active_users: 0,
        total_chat_acceptances: 0,
        total_chat_turns: 0,
        total_active_chat_users: 0,
        breakdown: vec![BreakdownEntry {
            language: "rust".to_string(),
            editor: "vscode".to_string(),
            suggestions_count: suggestions,
            acceptances_count: 0,
            lines_suggested: 0,
            lines_accepted: 0,
            active_users: 1,
        }],
        time_frame_week: String::new(),
        time_frame_month: String::new(),
        time_frame_display: String::new(),
    }
}

fn dataset() -> Vec<UsageRecord> {
    let mut records = vec![record("2024-06-03", 10), record("2024-06-04", 20)];
    label_records(&mut records);
    records
}

fn teams() -> Vec<Team> {
    vec![
        Team {
            id: Some(1),
            name: "eng".to_string(),
        },
        Team {
            id: Some(2),
            name: "docs".to_string(),
        },
    ]
}

fn summary(total: u64, active: u64) -> SeatSummary {
    SeatSummary {
        total_seats: total,
        total_active_seats: active,
        seats: Vec::new(),
    }
}

fn query() -> MetricsQuery {
    MetricsQuery {
        scope: Scope::Organization("acme".to_string()),
        range: DateRange {
            since: "2024-06-01".parse().unwrap(),
            until: "2024-06-30".parse().unwrap(),
        },
    }
}

fn seeded_service(source: Arc<ScriptedSource>) -> DashboardService {
    let service = DashboardService::new(source);
    service.initialize(dataset(), summary(5, 3), teams(), query());
    service
}

fn loading_transitions(rx: &mut broadcast::Receiver<DashboardEvent>) -> Vec<bool> {
    let mut transitions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let DashboardEvent::LoadingChanged(value) = event {
            transitions.push(value);
        }
    }
    transitions
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_failure_keeps_old_dataset_but_replaces_seats() {
    let source = Arc::new(ScriptedSource::new(dataset(), summary(8, 4), teams()));
    source.fail_metrics.store(true, Ordering::SeqCst);
    let service = seeded_service(Arc::clone(&source));
    let before = service.snapshot();

    service.refresh_with_teams(vec!["eng".to_string()]).await;

    let state = service.snapshot();
    assert_eq!(state.api_data, before.api_data);
    assert_eq!(state.filtered_data, before.filtered_data);
    assert_eq!(state.seat_summary, summary(8, 4));
    assert!(!state.is_loading);
    assert_eq!(
        *source.last_seats_teams.lock().unwrap(),
        vec!["eng".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn seats_failure_keeps_old_summary_but_replaces_metrics() {
    let source = Arc::new(ScriptedSource::new(dataset(), summary(8, 4), teams()));
    source.fail_seats.store(true, Ordering::SeqCst);
    let service = seeded_service(Arc::clone(&source));

    service.refresh_with_teams(vec!["eng".to_string()]).await;

    let state = service.snapshot();
    // The scripted source tags refreshed rows with the team count.
    assert!(state.api_data.iter().all(|r| r.total_active_users == 1));
    assert_eq!(state.seat_summary, summary(5, 3));
    assert!(!state.is_loading);
}

#[tokio::test(flavor = "multi_thread")]
async fn full_failure_leaves_state_unchanged_and_clears_loading() {
    let source = Arc::new(ScriptedSource::new(dataset(), summary(8, 4), teams()));
    source.fail_metrics.store(true, Ordering::SeqCst);
    source.fail_seats.store(true, Ordering::SeqCst);
    let service = seeded_service(Arc::clone(&source));
    let before = service.snapshot();
    let mut rx = service.subscribe();

    service.refresh_with_teams(Vec::new()).await;

    let state = service.snapshot();
    assert_eq!(state.api_data, before.api_data);
    assert_eq!(state.seat_summary, before.seat_summary);
    assert!(!state.is_loading);
    assert_eq!(loading_transitions(&mut rx), vec![true, false]);
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_refresh_preserves_team_selection_by_value() {
    let source = Arc::new(ScriptedSource::new(dataset(), summary(8, 4), teams()));
    let service = seeded_service(Arc::clone(&source));

    service.toggle_team("docs");
    service.refresh_team_data_if_needed().await;

    let state = service.snapshot();
    let docs = state
        .team_items
        .iter()
        .find(|item| item.value == "docs")
        .expect("docs item rebuilt");
    assert!(docs.is_selected);
    let eng = state
        .team_items
        .iter()
        .find(|item| item.value == "eng")
        .expect("eng item rebuilt");
    assert!(!eng.is_selected);
}

#[tokio::test(flavor = "multi_thread")]
async fn superseded_refresh_response_is_discarded() {
    let mut source = ScriptedSource::new(dataset(), summary(8, 4), teams());
    source.slow_team = Some("slow".to_string());
    let source = Arc::new(source);
    let service = Arc::new(seeded_service(Arc::clone(&source)));

    let slow = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service.refresh_with_teams(vec!["slow".to_string()]).await;
        })
    };
    sleep(Duration::from_millis(50)).await;
    service
        .refresh_with_teams(vec!["a".to_string(), "b".to_string()])
        .await;
    slow.await.expect("slow refresh task completes");

    let state = service.snapshot();
    // The two-team refresh owns the latest sequence; the slow single-team
    // payload that resolved after it must not overwrite anything.
    assert!(state.api_data.iter().all(|r| r.total_active_users == 2));
    assert!(!state.is_loading);
    assert_eq!(source.metrics_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn refresh_before_initial_load_only_toggles_loading() {
    let source = Arc::new(ScriptedSource::new(dataset(), summary(8, 4), teams()));
    let service = DashboardService::new(Arc::clone(&source) as Arc<dyn DashboardDataSource>);
    let mut rx = service.subscribe();

    service.refresh_with_teams(vec!["eng".to_string()]).await;

    assert_eq!(source.metrics_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.seats_calls.load(Ordering::SeqCst), 0);
    assert!(!service.snapshot().is_loading);
    assert_eq!(loading_transitions(&mut rx), vec![true, false]);
}
