use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use colored::Colorize;

use crate::error::{CoordinatorError, LookupError};
use crate::model::{GameId, Outcome};

/// Keyed accumulation of lookup outcomes.
///
/// Built against the set of dispatched IDs: each of them must be recorded
/// exactly once, and nothing else may be.
#[derive(Debug, Default)]
pub struct ResultTable {
    pending: HashSet<GameId>,
    entries: BTreeMap<GameId, Result<String, LookupError>>,
}

impl ResultTable {
    pub fn expecting(ids: impl IntoIterator<Item = GameId>) -> Self {
        Self {
            pending: ids.into_iter().collect(),
            entries: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, outcome: Outcome) -> Result<(), CoordinatorError> {
        let (id, result) = outcome.into_parts();
        if !self.pending.remove(&id) {
            return Err(CoordinatorError::UnexpectedOutcome(id));
        }

        self.entries.insert(id, result);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, id: &GameId) -> Option<&Result<String, LookupError>> {
        self.entries.get(id)
    }

    /// Entries in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = (&GameId, &Result<String, LookupError>)> {
        self.entries.iter()
    }

    /// Name or error message per ID.
    pub fn to_display_map(&self) -> BTreeMap<GameId, String> {
        self.entries
            .iter()
            .map(|(id, result)| {
                let text = match result {
                    Ok(name) => name.clone(),
                    Err(err) => err.to_string(),
                };
                (id.clone(), text)
            })
            .collect()
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary::from_table(self)
    }

    pub fn render_text(&self, color: bool) -> String {
        let width = self.entries.keys().map(|id| id.as_str().len()).max().unwrap_or(0);
        let mut out = String::new();

        for (id, result) in &self.entries {
            let line = match result {
                Ok(name) if color => name.green().to_string(),
                Ok(name) => name.clone(),
                Err(err) if color => err.to_string().red().to_string(),
                Err(err) => err.to_string(),
            };
            let _ = writeln!(out, "{:>width$}  {line}", id.as_str());
        }

        out
    }

    pub fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_display_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub total: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub name_missing: usize,
    pub malformed: usize,
    pub network: usize,
    pub aborted: usize,
}

impl TableSummary {
    pub fn from_table(table: &ResultTable) -> Self {
        let mut summary = Self {
            total: table.len(),
            resolved: 0,
            not_found: 0,
            name_missing: 0,
            malformed: 0,
            network: 0,
            aborted: 0,
        };

        for (_, result) in table.iter() {
            match result {
                Ok(_) => summary.resolved += 1,
                Err(LookupError::GameNotFoundError) => summary.not_found += 1,
                Err(LookupError::GameNameMissingError) => summary.name_missing += 1,
                Err(LookupError::MalformedResponseError(_)) => summary.malformed += 1,
                Err(LookupError::NetworkError(_)) => summary.network += 1,
                Err(LookupError::TaskAborted { .. }) => summary.aborted += 1,
            }
        }

        summary
    }

    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.resolved)
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.resolved as f64 / self.total as f64) * 100.0
        }
    }
}
