//! Survey CLI
//!
//! Imports an entity list, runs collections and drives the trend harvest
//! against a SQLite database. Results are exported as TSV on stdout.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use price_survey::{
    run_collection, CollectionSinks, HarvestStores, InvocationOutcome, MetricsRow, MetricsSink,
    Phase, ReqwestTransport, RowSink, SeriesSink, SqliteStore, SurveyConfig, SurveyContext,
    TrendHarvester, TriggerScheduler, HARVEST_HANDLER, RECORD_HEADER,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://survey.db?mode=rwc";

#[derive(Parser)]
#[command(name = "survey")]
#[command(about = "Search-API price survey and trend harvest")]
struct Cli {
    /// SQLite database URL (falls back to SURVEY_DATABASE_URL)
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the entity list from a file (one `name[<TAB>identifier]` per line)
    Import { file: PathBuf },

    /// Run a full collection over every entity
    Collect,

    /// Run one harvest invocation
    Harvest {
        /// Keep re-invoking as triggers come due until every phase is done
        #[arg(long)]
        follow: bool,

        /// Drop checkpoints and start from the first phase
        #[arg(long)]
        reset: bool,
    },

    /// Show harvest checkpoints and pending triggers
    Status,

    /// Print a table as TSV
    Export {
        #[arg(value_enum)]
        table: Table,

        /// Series name (for `series`), e.g. "Trends 90d"
        name: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Table {
    Rows,
    Metrics,
    Series,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,price_survey=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = SurveyConfig::from_env().context("Failed to load configuration")?;

    let database_url = cli
        .database
        .or_else(|| std::env::var("SURVEY_DATABASE_URL").ok())
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    let store = Arc::new(
        SqliteStore::new(&database_url)
            .await
            .with_context(|| format!("Failed to open database {}", database_url))?
            .with_name_limit(config.name_limit),
    );

    match cli.command {
        Commands::Import { file } => import(&store, &file).await,
        Commands::Collect => collect(config, store).await,
        Commands::Harvest { follow, reset } => harvest(config, store, follow, reset).await,
        Commands::Status => status(&store).await,
        Commands::Export { table, name } => export(&store, table, name).await,
    }
}

async fn context(
    config: SurveyConfig,
    store: &Arc<SqliteStore>,
) -> Result<SurveyContext<ReqwestTransport, Arc<SqliteStore>>> {
    let transport =
        ReqwestTransport::new(config.fetch.timeout()).context("Failed to build HTTP client")?;
    SurveyContext::new(config, transport, store.clone(), store.as_ref())
        .await
        .context("Failed to initialize survey context")
}

async fn import(store: &SqliteStore, file: &PathBuf) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let entities: Vec<(String, Option<String>)> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let mut parts = line.splitn(2, '\t');
            let name = parts.next().unwrap_or_default().trim().to_string();
            let identifier = parts
                .next()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty());
            (name, identifier)
        })
        .collect();

    if entities.is_empty() {
        bail!("No entities found in {}", file.display());
    }

    let count = store.import_entities(&entities).await?;
    println!("{} {} entities", "Imported".green().bold(), count);
    Ok(())
}

async fn collect(config: SurveyConfig, store: Arc<SqliteStore>) -> Result<()> {
    let ctx = context(config, &store).await?;
    let report = run_collection(&ctx, CollectionSinks::single(store.as_ref())).await?;

    println!("{}", "Collection complete".green().bold());
    println!("  entities:           {}", report.entities);
    println!("  rows appended:      {}", report.rows_appended);
    println!("  duplicates removed: {}", report.duplicates_removed);
    println!("  metrics rows:       {}", report.metrics_rows);
    if !report.is_clean() {
        println!("  {} {}", "failed:".red().bold(), report.failed.len());
        for (position, message) in &report.failed {
            println!("    row {}: {}", position, message);
        }
    }
    Ok(())
}

async fn harvest(
    config: SurveyConfig,
    store: Arc<SqliteStore>,
    follow: bool,
    reset: bool,
) -> Result<()> {
    let ctx = context(config, &store).await?;
    let harvester = TrendHarvester::new(&ctx, HarvestStores::single(store.as_ref()));

    if reset {
        harvester.reset().await?;
    }

    loop {
        let outcome = harvester.resume(Utc::now().date_naive()).await?;
        let due_at = match &outcome {
            InvocationOutcome::Finished => {
                println!("{}", "Trend harvest finished".green().bold());
                return Ok(());
            }
            InvocationOutcome::Rescheduled {
                phase,
                next_row,
                due_at,
            } => {
                println!(
                    "{} {} at row {}, next run due {}",
                    "Rescheduled".yellow().bold(),
                    phase,
                    next_row,
                    due_at
                );
                *due_at
            }
            InvocationOutcome::Retrying { error, due_at } => {
                println!(
                    "{} {}, retry due {}",
                    "Invocation failed:".red().bold(),
                    error,
                    due_at
                );
                *due_at
            }
        };

        if !follow {
            return Ok(());
        }
        let wait = (due_at - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
    }
}

async fn status(store: &Arc<SqliteStore>) -> Result<()> {
    use price_survey::PropertyStore;

    for phase in Phase::ALL {
        match store.get_property(phase.label()).await? {
            Some(raw) => println!("{:>8}  {}", phase.to_string().as_str().bold(), raw),
            None => println!("{:>8}  {}", phase.to_string().as_str().bold(), "no checkpoint".dimmed()),
        }
    }

    let pending = store.pending(HARVEST_HANDLER).await?;
    if pending.is_empty() {
        println!("{}", "No pending triggers".dimmed());
    }
    for trigger in pending {
        println!("trigger {} due {}", trigger.id, trigger.due_at);
    }
    Ok(())
}

async fn export(store: &SqliteStore, table: Table, name: Option<String>) -> Result<()> {
    match table {
        Table::Rows => {
            print_tsv(RECORD_HEADER.iter().map(|h| h.to_string()).collect());
            for record in store.read_all().await? {
                print_tsv(record.to_row());
            }
        }
        Table::Metrics => {
            print_tsv(MetricsRow::header());
            for row in store.read_metrics().await? {
                print_tsv(row.to_row());
            }
        }
        Table::Series => {
            let Some(series) = name else {
                bail!("export series needs a series name, e.g. \"Trends 90d\"");
            };
            let header = store.read_header(&series).await?;
            if header.is_empty() {
                bail!("No series named {}", series);
            }
            let columns = header.len().saturating_sub(2);
            print_tsv(header);
            for (_, row) in store.read_rows(&series).await? {
                print_tsv(row.to_row(columns));
            }
        }
    }
    Ok(())
}

fn print_tsv(cells: Vec<String>) {
    let cells: Vec<String> = cells
        .into_iter()
        .map(|c| c.replace(['\t', '\n'], " "))
        .collect();
    println!("{}", cells.join("\t"));
}
