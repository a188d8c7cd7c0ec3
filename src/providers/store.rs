use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::query::{MetricsQuery, Scope};
use crate::models::seats::{SeatRecord, SeatSummary};
use crate::models::team::Team;
use crate::models::usage::UsageRecord;
use crate::providers::DashboardDataSource;
use crate::services::seat_aggregator::aggregate_seats;
use crate::services::time_buckets::label_records;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreCollection {
    Usage,
    Seats,
}

/// Parametrized query handed to the external document store. The store's
/// schema and query language are an external contract; this type only names
/// the parameters the dashboard supplies.
#[derive(Debug, Clone, Serialize)]
pub struct StoreQuery {
    pub collection: StoreCollection,
    pub scope: Scope,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub date: Option<NaiveDate>,
    pub teams: Vec<String>,
}

/// Black-box query executor over the historical data store. Implementations
/// wrap whatever managed-service driver is in use and return raw documents.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn query(&self, request: &StoreQuery) -> AppResult<Vec<JsonValue>>;
}

/// Historical-store source: decodes raw documents into typed records at this
/// boundary. Decoding failures map to `Unknown`.
pub struct StoreDataSource {
    store: Arc<dyn HistoryStore>,
}

impl StoreDataSource {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    fn decode_rows<T: serde::de::DeserializeOwned>(
        rows: Vec<JsonValue>,
        what: &str,
    ) -> AppResult<Vec<T>> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<T>(row)
                    .map_err(|err| AppError::unknown(format!("failed to decode {what} row: {err}")))
            })
            .collect()
    }
}

#[async_trait]
impl DashboardDataSource for StoreDataSource {
    async fn fetch_metrics(
        &self,
        query: &MetricsQuery,
        teams: &[String],
    ) -> AppResult<Vec<UsageRecord>> {
        let request = StoreQuery {
            collection: StoreCollection::Usage,
            scope: query.scope.clone(),
            since: Some(query.range.since),
            until: Some(query.range.until),
            date: None,
            teams: teams.to_vec(),
        };
        let rows = self.store.query(&request).await?;
        if rows.is_empty() {
            return Err(AppError::no_data(format!(
                "no historical usage rows for {}",
                query.scope.name()
            )));
        }

        let mut records: Vec<UsageRecord> = Self::decode_rows(rows, "usage")?;
        records.sort_by_key(|record| record.date);
        label_records(&mut records);

        debug!(
            target: "app::store",
            records = records.len(),
            teams = teams.len(),
            "fetched historical usage"
        );
        Ok(records)
    }

    async fn fetch_seats(
        &self,
        scope: &Scope,
        date: NaiveDate,
        teams: &[String],
    ) -> AppResult<SeatSummary> {
        let request = StoreQuery {
            collection: StoreCollection::Seats,
            scope: scope.clone(),
            since: None,
            until: None,
            date: Some(date),
            teams: Vec::new(),
        };
        let rows = self.store.query(&request).await?;
        let records: Vec<SeatRecord> = Self::decode_rows(rows, "seat")?;

        let filter: Option<HashSet<String>> = if teams.is_empty() {
            None
        } else {
            Some(teams.iter().cloned().collect())
        };

        let reference = date
            .and_hms_opt(23, 59, 59)
            .expect("valid end-of-day time")
            .and_utc();
        Ok(aggregate_seats(&records, filter.as_ref(), reference))
    }

    async fn fetch_teams(&self, scope: &Scope, date: NaiveDate) -> AppResult<Vec<Team>> {
        let request = StoreQuery {
            collection: StoreCollection::Seats,
            scope: scope.clone(),
            since: None,
            until: None,
            date: Some(date),
            teams: Vec::new(),
        };
        let rows = self.store.query(&request).await?;
        let records: Vec<SeatRecord> = Self::decode_rows(rows, "seat")?;

        // Distinct assigning-team values for the date, first-seen order.
        let mut seen: HashSet<String> = HashSet::new();
        let mut teams = Vec::new();
        for record in &records {
            for seat in &record.seats {
                if let Some(name) = &seat.assigning_team {
                    if seen.insert(name.clone()) {
                        teams.push(Team {
                            id: None,
                            name: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(teams)
    }
}
