use sqlx::postgres::PgPoolOptions;
use tracing::info;

pub struct MigrationOpts {
    pub database_url: String,
}

pub async fn run_migrations(opts: MigrationOpts) -> anyhow::Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&opts.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("Applied database migrations.");

    Ok(())
}
