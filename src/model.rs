use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::error::LookupError;

/// Identifier of one game lookup, passed verbatim as the `id` query parameter.
///
/// Equality is textual. Ordering is numeric when both sides parse as integers
/// so that `2` sorts before `10` in printed tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GameId(String);

impl GameId {
    pub fn new(id: impl Into<String>) -> Self {
        GameId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for GameId {
    fn from(id: u32) -> Self {
        GameId(id.to_string())
    }
}

impl From<u64> for GameId {
    fn from(id: u64) -> Self {
        GameId(id.to_string())
    }
}

impl From<&str> for GameId {
    fn from(id: &str) -> Self {
        GameId(id.to_string())
    }
}

impl From<String> for GameId {
    fn from(id: String) -> Self {
        GameId(id)
    }
}

impl Ord for GameId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for GameId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lifecycle of one lookup task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStage {
    Pending,
    Fetching,
    Parsing,
    Done,
}

impl fmt::Display for TaskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStage::Pending => "pending",
            TaskStage::Fetching => "fetching",
            TaskStage::Parsing => "parsing",
            TaskStage::Done => "done",
        };
        f.write_str(label)
    }
}

/// Terminal result of one task, emitted exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success { id: GameId, name: String },
    Failure { id: GameId, error: LookupError },
}

impl Outcome {
    pub fn from_result(id: GameId, result: Result<String, LookupError>) -> Self {
        match result {
            Ok(name) => Outcome::Success { id, name },
            Err(error) => Outcome::Failure { id, error },
        }
    }

    pub fn id(&self) -> &GameId {
        match self {
            Outcome::Success { id, .. } | Outcome::Failure { id, .. } => id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn into_parts(self) -> (GameId, Result<String, LookupError>) {
        match self {
            Outcome::Success { id, name } => (id, Ok(name)),
            Outcome::Failure { id, error } => (id, Err(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids_sort_numerically() {
        let mut ids: Vec<GameId> = ["10", "2", "abc", "1", "007"]
            .into_iter()
            .map(GameId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(GameId::as_str).collect();
        assert_eq!(sorted, vec!["1", "2", "007", "10", "abc"]);
    }

    #[test]
    fn test_textually_distinct_ids_are_not_equal() {
        let padded = GameId::from("07");
        let plain = GameId::from(7u32);
        assert_ne!(padded, plain);
        assert_ne!(padded.cmp(&plain), Ordering::Equal);
    }

    #[test]
    fn test_outcome_round_trips_result() {
        let outcome = Outcome::from_result(GameId::from(1u32), Err(LookupError::GameNotFoundError));
        assert!(!outcome.is_success());
        assert_eq!(outcome.id().as_str(), "1");

        let (id, result) = outcome.into_parts();
        assert_eq!(id, GameId::from("1"));
        assert_eq!(result, Err(LookupError::GameNotFoundError));
    }
}
