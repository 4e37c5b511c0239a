use thiserror::Error;

use crate::model::{GameId, TaskStage};

/// Terminal failure of a single lookup.
///
/// Every variant is per-task: it is folded into the result table under the
/// game's key and never aborts the coordinator or sibling tasks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Malformed response: {0}")]
    MalformedResponseError(String),

    #[error("Game not found")]
    GameNotFoundError,

    #[error("Missing game name")]
    GameNameMissingError,

    #[error("Task aborted while {stage}")]
    TaskAborted { stage: TaskStage },
}

impl LookupError {
    pub fn is_network(&self) -> bool {
        matches!(self, LookupError::NetworkError(_))
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_default();
            return LookupError::NetworkError(format!("HTTP {} for {url}", status.as_u16()));
        }

        LookupError::NetworkError(err.to_string())
    }
}

impl From<quick_xml::DeError> for LookupError {
    fn from(err: quick_xml::DeError) -> Self {
        LookupError::MalformedResponseError(err.to_string())
    }
}

impl From<quick_xml::Error> for LookupError {
    fn from(err: quick_xml::Error) -> Self {
        LookupError::MalformedResponseError(err.to_string())
    }
}

/// Violation of the one-outcome-per-query invariant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Outcome channel closed after {received} of {expected} outcomes")]
    MissingOutcomes { expected: usize, received: usize },

    #[error("Received an outcome for {0}, which was not dispatched or was already recorded")]
    UnexpectedOutcome(GameId),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
