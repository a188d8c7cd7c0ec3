use std::collections::HashSet;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future;
use reqwest::header;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::query::{MetricsQuery, Scope};
use crate::models::seats::{Seat, SeatRecord, SeatSummary};
use crate::models::team::Team;
use crate::models::usage::UsageRecord;
use crate::providers::DashboardDataSource;
use crate::services::seat_aggregator::aggregate_seats;
use crate::services::time_buckets::label_records;
use crate::utils::link_header::next_link;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PER_PAGE: u32 = 100;
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone)]
pub struct GithubSourceConfig {
    pub token: String,
    pub base_url: String,
    pub timeout: StdDuration,
    pub per_page: u32,
}

impl GithubSourceConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: StdDuration::from_secs(DEFAULT_TIMEOUT_SECS),
            per_page: DEFAULT_PER_PAGE,
        }
    }

    pub fn from_env() -> AppResult<Self> {
        let token = std::env::var("METRICSDASH_GITHUB_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::other("METRICSDASH_GITHUB_TOKEN is not set"))?;

        let mut config = Self::new(token);
        if let Ok(base_url) = std::env::var("METRICSDASH_GITHUB_BASE_URL") {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim().trim_end_matches('/').to_string();
            }
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Vendor REST API source. Pagination follows the response `Link` header
/// `rel="next"` until absent; team-scoped metrics fan out one request per
/// team and join all-or-nothing.
pub struct GithubDataSource {
    client: reqwest::Client,
    config: GithubSourceConfig,
}

impl GithubDataSource {
    pub fn try_new(config: GithubSourceConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build HTTP client: {err}")))?;

        Ok(Self { client, config })
    }

    fn scope_root(&self, scope: &Scope) -> String {
        match scope {
            Scope::Enterprise(name) => format!("{}/enterprises/{}", self.config.base_url, name),
            Scope::Organization(name) => format!("{}/orgs/{}", self.config.base_url, name),
        }
    }

    async fn get_json_page<T: DeserializeOwned>(
        &self,
        url: &str,
        correlation_id: &str,
    ) -> AppResult<(T, Option<String>)> {
        debug!(target: "app::github", correlation_id = %correlation_id, %url, "GET");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|err| AppError::unknown(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = vendor_message(response).await.unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unrecognized status")
                    .to_string()
            });
            warn!(
                target: "app::github",
                correlation_id = %correlation_id,
                status = status.as_u16(),
                %message,
                "non-success response"
            );
            return Err(AppError::upstream(status.as_u16(), message));
        }

        let next = response
            .headers()
            .get(header::LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_link);

        let body = response
            .json::<T>()
            .await
            .map_err(|err| AppError::unknown(format!("malformed response body: {err}")))?;

        Ok((body, next))
    }

    async fn fetch_metric_pages(
        &self,
        first_url: String,
        correlation_id: &str,
    ) -> AppResult<Vec<UsageRecord>> {
        let mut records = Vec::new();
        let mut url = first_url;
        loop {
            let (page, next): (Vec<UsageRecord>, _) =
                self.get_json_page(&url, correlation_id).await?;
            records.extend(page);
            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }
        Ok(records)
    }

    fn scope_metrics_url(&self, query: &MetricsQuery) -> String {
        format!(
            "{}/copilot/metrics?since={}&until={}&per_page={}&page=1",
            self.scope_root(&query.scope),
            query.range.since,
            query.range.until,
            self.config.per_page
        )
    }

    fn team_metrics_url(&self, query: &MetricsQuery, team: &str) -> String {
        format!(
            "{}/team/{}/copilot/metrics?since={}&until={}&per_page={}&page=1",
            self.scope_root(&query.scope),
            team,
            query.range.since,
            query.range.until,
            self.config.per_page
        )
    }

    async fn fetch_seat_pages(
        &self,
        scope: &Scope,
        correlation_id: &str,
    ) -> AppResult<Vec<SeatsPage>> {
        let mut pages = Vec::new();
        let mut url = format!(
            "{}/copilot/billing/seats?per_page={}&page=1",
            self.scope_root(scope),
            self.config.per_page
        );
        loop {
            let (page, next): (SeatsPage, _) = self.get_json_page(&url, correlation_id).await?;
            pages.push(page);
            match next {
                Some(next_url) => url = next_url,
                None => break,
            }
        }
        Ok(pages)
    }
}

#[async_trait]
impl DashboardDataSource for GithubDataSource {
    async fn fetch_metrics(
        &self,
        query: &MetricsQuery,
        teams: &[String],
    ) -> AppResult<Vec<UsageRecord>> {
        let correlation_id = Uuid::new_v4().to_string();

        let mut records = if teams.is_empty() {
            self.fetch_metric_pages(self.scope_metrics_url(query), &correlation_id)
                .await?
        } else {
            let requests = teams
                .iter()
                .map(|team| self.fetch_metric_pages(self.team_metrics_url(query, team), &correlation_id));
            let per_team = future::try_join_all(requests).await?;
            let mut merged: Vec<UsageRecord> = per_team.into_iter().flatten().collect();
            merged.sort_by_key(|record| record.date);
            merged
        };

        if records.is_empty() {
            return Err(AppError::no_data(format!(
                "no usage metrics returned for {}",
                query.scope.name()
            )));
        }

        label_records(&mut records);

        debug!(
            target: "app::github",
            correlation_id = %correlation_id,
            records = records.len(),
            teams = teams.len(),
            "fetched usage metrics"
        );

        Ok(records)
    }

    async fn fetch_seats(
        &self,
        scope: &Scope,
        date: NaiveDate,
        teams: &[String],
    ) -> AppResult<SeatSummary> {
        let correlation_id = Uuid::new_v4().to_string();
        let pages = self.fetch_seat_pages(scope, &correlation_id).await?;
        let records: Vec<SeatRecord> = pages.iter().map(SeatsPage::to_record).collect();

        let filter: Option<HashSet<String>> = if teams.is_empty() {
            None
        } else {
            Some(teams.iter().cloned().collect())
        };

        Ok(aggregate_seats(
            &records,
            filter.as_ref(),
            end_of_day(date),
        ))
    }

    async fn fetch_teams(&self, scope: &Scope, date: NaiveDate) -> AppResult<Vec<Team>> {
        let correlation_id = Uuid::new_v4().to_string();
        let pages = self.fetch_seat_pages(scope, &correlation_id).await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut teams = Vec::new();
        for page in &pages {
            for seat in &page.seats {
                if let Some(team) = &seat.assigning_team {
                    let team = Team {
                        id: team.id,
                        name: team.name.clone(),
                    };
                    if seen.insert(team.identity()) {
                        teams.push(team);
                    }
                }
            }
        }

        debug!(
            target: "app::github",
            correlation_id = %correlation_id,
            %date,
            teams = teams.len(),
            "collected teams from seat pages"
        );

        Ok(teams)
    }
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(23, 59, 59)
        .expect("valid end-of-day time")
        .and_utc()
}

async fn vendor_message(response: reqwest::Response) -> Option<String> {
    let body: JsonValue = response.json().await.ok()?;
    body.get("message")
        .and_then(|value| value.as_str())
        .map(|message| message.to_string())
}

#[derive(Debug, Deserialize)]
struct SeatsPage {
    #[serde(default)]
    total_seats: u64,
    #[serde(default)]
    seats: Vec<WireSeat>,
}

#[derive(Debug, Deserialize)]
struct WireSeat {
    assignee: WireAssignee,
    #[serde(default)]
    assigning_team: Option<WireTeam>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_activity_editor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAssignee {
    login: String,
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireTeam {
    #[serde(default)]
    id: Option<i64>,
    name: String,
}

impl SeatsPage {
    fn to_record(&self) -> SeatRecord {
        SeatRecord {
            total_seats: self.total_seats,
            total_active_seats: 0,
            seats: self
                .seats
                .iter()
                .map(|seat| Seat {
                    login: seat.assignee.login.clone(),
                    id: seat.assignee.id,
                    assigning_team: seat.assigning_team.as_ref().map(|team| team.name.clone()),
                    created_at: seat.created_at,
                    last_activity_at: seat.last_activity_at,
                    last_activity_editor: seat.last_activity_editor.clone(),
                })
                .collect(),
            page: None,
            has_next_page: None,
            date: None,
        }
    }
}
