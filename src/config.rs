use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use url::Url;

use crate::coordinator::CompletionPolicy;
use crate::error::ConfigError;
use crate::model::GameId;
use crate::transport::DEFAULT_ENDPOINT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupMode {
    /// One ID, awaited inline.
    Single,
    Counted,
    #[default]
    Tracked,
}

impl LookupMode {
    /// Fan-in policy for the concurrent modes.
    pub fn policy(self) -> Option<CompletionPolicy> {
        match self {
            LookupMode::Single => None,
            LookupMode::Counted => Some(CompletionPolicy::Counted),
            LookupMode::Tracked => Some(CompletionPolicy::Tracked),
        }
    }
}

impl FromStr for LookupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(LookupMode::Single),
            other => other
                .parse::<CompletionPolicy>()
                .map(|policy| match policy {
                    CompletionPolicy::Counted => LookupMode::Counted,
                    CompletionPolicy::Tracked => LookupMode::Tracked,
                })
                .map_err(|_| format!("unknown mode '{other}' (expected single, counted or tracked)")),
        }
    }
}

impl fmt::Display for LookupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupMode::Single => f.write_str("single"),
            LookupMode::Counted => f.write_str("counted"),
            LookupMode::Tracked => f.write_str("tracked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Run configuration: built-in defaults, then an optional TOML file, then
/// command-line overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub endpoint: String,
    pub first_id: u64,
    pub count: u64,
    pub mode: LookupMode,
    pub max_in_flight: Option<usize>,
    pub api_token: Option<String>,
    pub format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            first_id: 0,
            count: 100,
            mode: LookupMode::default(),
            max_in_flight: None,
            api_token: None,
            format: OutputFormat::default(),
        }
    }
}

/// Values supplied on the command line; `None` leaves the current value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub first_id: Option<u64>,
    pub count: Option<u64>,
    pub mode: Option<LookupMode>,
    pub max_in_flight: Option<usize>,
    pub api_token: Option<String>,
    pub format: Option<OutputFormat>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(first_id) = overrides.first_id {
            self.first_id = first_id;
        }
        if let Some(count) = overrides.count {
            self.count = count;
        }
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(limit) = overrides.max_in_flight {
            self.max_in_flight = Some(limit);
        }
        if let Some(token) = overrides.api_token {
            self.api_token = Some(token);
        }
        if let Some(format) = overrides.format {
            self.format = format;
        }
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|err| ConfigError::invalid_value("endpoint", err.to_string()))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::invalid_value(
                "endpoint",
                format!("unsupported scheme '{scheme}'"),
            )),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.count == 0 {
            return Err(ConfigError::invalid_value("count", "must be at least 1"));
        }
        if self.first_id.checked_add(self.count).is_none() {
            return Err(ConfigError::invalid_value("count", "id range overflows"));
        }
        if self.max_in_flight == Some(0) {
            return Err(ConfigError::invalid_value("max_in_flight", "must be at least 1"));
        }
        if matches!(&self.api_token, Some(token) if token.trim().is_empty()) {
            return Err(ConfigError::invalid_value("api_token", "must not be blank"));
        }

        Ok(())
    }

    /// `first_id .. first_id + count`, used when no IDs are given explicitly.
    pub fn id_range(&self) -> impl Iterator<Item = GameId> {
        let end = self.first_id.saturating_add(self.count);
        (self.first_id..end).map(GameId::from)
    }
}
