use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// The enterprise-or-organization identifier a query is bound to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum Scope {
    Enterprise(String),
    Organization(String),
}

impl Scope {
    /// Builds a scope from optional names, enterprise taking precedence.
    pub fn from_parts(
        enterprise: Option<String>,
        organization: Option<String>,
    ) -> AppResult<Self> {
        match (enterprise, organization) {
            (Some(name), _) if !name.trim().is_empty() => Ok(Scope::Enterprise(name)),
            (_, Some(name)) if !name.trim().is_empty() => Ok(Scope::Organization(name)),
            _ => Err(AppError::other(
                "either an enterprise or an organization name is required",
            )),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Scope::Enterprise(name) | Scope::Organization(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

/// The last-used server-side filter, retained by the dashboard state so a
/// team refresh can re-issue the same query narrowed to the selected teams.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsQuery {
    pub scope: Scope,
    pub range: DateRange,
}
