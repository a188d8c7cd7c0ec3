pub mod github;
pub mod store;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::AppResult;
use crate::models::query::{MetricsQuery, Scope};
use crate::models::seats::SeatSummary;
use crate::models::team::Team;
use crate::models::usage::UsageRecord;

/// Collaborator boundary for everything the dashboard fetches. Implementors
/// decide the transport (vendor REST API, historical store); the dashboard
/// treats them as black boxes. Every returned usage record carries its
/// time-bucket labels.
#[async_trait]
pub trait DashboardDataSource: Send + Sync {
    /// Usage records for the query range, optionally narrowed to teams.
    /// A non-empty team list is all-or-nothing: any failing team request
    /// fails the whole call.
    async fn fetch_metrics(
        &self,
        query: &MetricsQuery,
        teams: &[String],
    ) -> AppResult<Vec<UsageRecord>>;

    /// Aggregated seat summary for the scope; `date` is the reference
    /// instant for the 30-day activity window.
    async fn fetch_seats(
        &self,
        scope: &Scope,
        date: NaiveDate,
        teams: &[String],
    ) -> AppResult<SeatSummary>;

    /// Teams known to the scope as of `date`.
    async fn fetch_teams(&self, scope: &Scope, date: NaiveDate) -> AppResult<Vec<Team>>;
}
