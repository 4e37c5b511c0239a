use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bgg_names::{
    Config, ConfigOverrides, Coordinator, GameId, HttpTransport, LookupMode, Outcome,
    OutputFormat, ResultTable,
};

#[derive(Debug, Parser)]
#[command(
    name = "bgg-names",
    version,
    about = "Look up BoardGameGeek primary names by game id"
)]
struct Cli {
    /// Game ids to look up. Defaults to the configured id range.
    ids: Vec<String>,

    /// single, counted or tracked
    #[arg(long)]
    mode: Option<LookupMode>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    first_id: Option<u64>,

    #[arg(long)]
    count: Option<u64>,

    /// Cap on concurrent fetches (unbounded when unset)
    #[arg(long)]
    max_in_flight: Option<usize>,

    #[arg(long, env = "BGG_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// text or json
    #[arg(long)]
    format: Option<OutputFormat>,

    /// TOML file with any of the above settings
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    no_color: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            endpoint: self.endpoint.clone(),
            first_id: self.first_id,
            count: self.count,
            mode: self.mode,
            max_in_flight: self.max_in_flight,
            api_token: self.token.clone(),
            format: self.format,
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.apply(cli.overrides());
    config.validate()?;
    Ok(config)
}

async fn run_single(coordinator: &Coordinator, ids: Vec<GameId>) -> anyhow::Result<ResultTable> {
    let [id] = <[GameId; 1]>::try_from(ids).map_err(|ids| {
        anyhow::anyhow!("single mode takes exactly one game id, got {}", ids.len())
    })?;

    let result = coordinator.resolve_one(&id).await;
    let mut table = ResultTable::expecting([id.clone()]);
    table.record(Outcome::from_result(id, result))?;
    Ok(table)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli).context("invalid configuration")?;

    let transport = HttpTransport::new(config.endpoint_url()?, config.api_token.as_deref())
        .context("failed to set up HTTP transport")?;
    let mut coordinator = Coordinator::new(Arc::new(transport));
    if let Some(limit) = config.max_in_flight {
        coordinator = coordinator.with_max_in_flight(limit);
    }

    let ids: Vec<GameId> = if cli.ids.is_empty() {
        config.id_range().collect()
    } else {
        cli.ids.iter().map(|id| GameId::new(id.trim())).collect()
    };
    if ids.iter().any(|id| id.as_str().is_empty()) {
        bail!("game ids must not be empty");
    }

    tracing::info!(mode = %config.mode, ids = ids.len(), endpoint = %config.endpoint, "starting lookups");
    let table = match config.mode.policy() {
        Some(policy) => coordinator.resolve(ids, policy).await?,
        None => run_single(&coordinator, ids).await?,
    };

    let summary = table.summary();
    tracing::info!(
        total = summary.total,
        resolved = summary.resolved,
        failed = summary.failed(),
        network = summary.network,
        "lookups complete ({:.1}% resolved)",
        summary.success_rate()
    );

    match config.format {
        OutputFormat::Text => {
            let color = !cli.no_color && std::io::stdout().is_terminal();
            print!("{}", table.render_text(color));
        }
        OutputFormat::Json => println!("{}", table.render_json()?),
    }

    Ok(())
}
