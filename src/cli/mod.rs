use std::borrow::Cow;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{
    database::PostgresConnection,
    server,
    trends::services::{PopulateOptions, TrendsService},
};

mod migrate;

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,

    /// DSN to tell Sentry where to send events.
    ///
    /// If provided, errors will be sent to Sentry.
    #[clap(long = "sentry-dsn", env = "SENTRY_DSN")]
    sentry_dsn: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    Migrate(MigrateOpts),
    Serve(ServeOpts),
    /// Populate the trends cube from historical ledger data.
    Populate(PopulateOpts),
}

#[derive(Args)]
struct MigrateOpts {
    /// Connection string for the database.
    #[clap(long = "database-url", env = "DATABASE_URL")]
    database_url: String,
}

impl From<MigrateOpts> for migrate::MigrationOpts {
    fn from(opts: MigrateOpts) -> Self {
        Self {
            database_url: opts.database_url,
        }
    }
}

#[derive(Args)]
struct ServeOpts {
    /// The number of connections to use for the database pool.
    #[clap(long = "database-pool-size", default_value = "16")]
    database_pool_size: u32,

    /// The number of seconds before a database connection times out.
    #[clap(long = "database-timeout", default_value = "5")]
    database_timeout: u8,

    /// Connection string for the application database.
    #[clap(long = "database-url", env = "DATABASE_URL")]
    database_url: String,
}

impl From<ServeOpts> for server::Options {
    fn from(opts: ServeOpts) -> Self {
        Self {
            database_pool_size: opts.database_pool_size,
            database_timeout_seconds: opts.database_timeout,
            database_url: opts.database_url,
        }
    }
}

#[derive(Args)]
struct PopulateOpts {
    /// Connection string for the application database.
    #[clap(long = "database-url", env = "DATABASE_URL")]
    database_url: String,

    /// The user whose cube should be populated.
    #[clap(long = "user-id")]
    user_id: Uuid,

    /// First date to populate. Defaults to the user's earliest
    /// transaction.
    #[clap(long = "start-date")]
    start_date: Option<NaiveDate>,

    /// Last date to populate. Defaults to today.
    #[clap(long = "end-date")]
    end_date: Option<NaiveDate>,

    /// Wipe the user's cube before repopulating.
    #[clap(long = "clear-existing")]
    clear_existing: bool,

    /// Number of periods to rebuild between pauses.
    #[clap(long = "batch-size")]
    batch_size: Option<usize>,

    /// Restrict population to one account's transactions.
    #[clap(long = "account-id")]
    account_id: Option<Uuid>,
}

pub async fn run_with_sys_args() -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;

    let cli = Cli::parse();

    let sentry_config = cli.sentry_dsn.map(|dsn| {
        debug!("Enabled sentry.");

        let release_name = option_env!("GIT_SHA")
            .map(Cow::from)
            .or_else(|| sentry::release_name!());

        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: release_name,
                ..Default::default()
            },
        ))
    });

    let sentry_tracing_layer = if sentry_config.is_some() {
        Some(sentry_tracing::layer())
    } else {
        None
    };

    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sentry_tracing_layer)
        .init();

    match cli.command {
        Commands::Migrate(opts) => Ok(migrate::run_migrations(opts.into()).await?),
        Commands::Serve(opts) => {
            let migrate_opts = MigrateOpts {
                database_url: opts.database_url.clone(),
            };

            migrate::run_migrations(migrate_opts.into()).await?;

            server::serve(opts.into()).await
        }
        Commands::Populate(opts) => run_population(opts).await,
    }
}

async fn run_population(opts: PopulateOpts) -> anyhow::Result<()> {
    let db_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&opts.database_url)
        .await?;
    let db_connection = PostgresConnection::new(db_pool);

    let trends_service = TrendsService::new(
        Arc::new(db_connection.clone()),
        Arc::new(db_connection.clone()),
        Arc::new(db_connection),
    );

    let summary = trends_service
        .populate(
            opts.user_id,
            PopulateOptions {
                start_date: opts.start_date,
                end_date: opts.end_date,
                clear_existing: opts.clear_existing,
                batch_size: opts.batch_size,
                account_id: opts.account_id,
            },
        )
        .await?;

    info!(
        periods = summary.periods_processed,
        records = summary.records_created,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Population finished."
    );

    Ok(())
}
