use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("no usable data: {message}")]
    NoData { message: String },

    #[error("unexpected failure: {message}")]
    Unknown { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::upstream", status, %message, "upstream error");
        AppError::Upstream { status, message }
    }

    pub fn no_data(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::upstream", %message, "collaborator returned nothing usable");
        AppError::NoData { message }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::upstream", %message, "unexpected error");
        AppError::Unknown { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, AppError::NoData { .. })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::unknown(error.to_string())
    }
}
