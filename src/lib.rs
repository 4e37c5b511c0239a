//! Primary-name lookups against BoardGameGeek's XML API.
//!
//! [`transport`] fetches `/xmlapi2/thing?id=<id>`, [`parser`] pulls the
//! primary name out of the response, and [`coordinator`] fans lookups out over
//! one task per ID and collects every outcome into a [`ResultTable`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod parser;
pub mod table;
pub mod transport;

pub use config::{Config, ConfigOverrides, LookupMode, OutputFormat};
pub use coordinator::{CompletionPolicy, Coordinator};
pub use error::{ConfigError, CoordinatorError, LookupError};
pub use model::{GameId, Outcome, TaskStage};
pub use table::{ResultTable, TableSummary};
pub use transport::{HttpTransport, Transport};
