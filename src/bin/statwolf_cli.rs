use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::{error, info};
use statwolf::{ClientConfig, FluentQuery, QuerySpec, StatwolfClient, StatwolfError, StatwolfResult};

#[derive(Parser, Debug)]
#[command(name = "statwolf_cli", about = "Query Statwolf datasources from the command line")]
struct Cli {
    /// TOML configuration file; falls back to SW_HOST, SW_USERNAME and SW_PASSWORD
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available datasources
    List,
    /// Print the schema of a datasource
    Schema { source: String },
    /// Run a query and print the resulting element
    Query {
        source: String,
        /// Query document in wire JSON form; other flags are applied on top
        #[arg(long)]
        spec: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        dimensions: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        #[arg(long)]
        take: Option<usize>,
        #[arg(long, requires = "to")]
        from: Option<String>,
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> StatwolfResult<ClientConfig> {
    match path {
        Some(path) => ClientConfig::from_file(path),
        None => match ClientConfig::default_path().filter(|p| p.exists()) {
            Some(path) => ClientConfig::from_file(path),
            None => ClientConfig::from_env(),
        },
    }
}

async fn run(cli: Cli) -> StatwolfResult<()> {
    let client = StatwolfClient::connect(load_config(cli.config.as_ref())?)?;
    let datasource = client.datasource();

    match cli.command {
        Command::List => {
            for source in datasource.list().await? {
                println!("{}", source);
            }
        }
        Command::Schema { source } => {
            let instance = datasource.explore(&source).await?;
            println!("{}", serde_json::to_string_pretty(instance.raw())?);
        }
        Command::Query {
            source,
            spec,
            dimensions,
            metrics,
            take,
            from,
            to,
        } => {
            let mut builder = match spec {
                Some(path) => {
                    let spec: QuerySpec = serde_json::from_str(&std::fs::read_to_string(path)?)?;
                    if spec.table() != source {
                        return Err(StatwolfError::Configuration(format!(
                            "query document targets {}, not {}",
                            spec.table(),
                            source
                        )));
                    }
                    info!("Loaded query document for {}", source);
                    datasource.pipeline(spec)
                }
                None => datasource.builder(&source),
            };

            if !dimensions.is_empty() {
                builder = builder.dimensions(dimensions);
            }
            if !metrics.is_empty() {
                builder = builder.metrics(metrics);
            }
            if let Some(take) = take {
                builder = builder.take(take);
            }
            if let (Some(from), Some(to)) = (from, to) {
                builder = builder.timeframe(&from, &to);
            }

            let element = builder.steps().build().execute(None).await?;
            println!("{}", serde_json::to_string_pretty(&element)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        process::exit(1);
    }
}
