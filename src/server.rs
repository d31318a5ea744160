use std::{sync::Arc, time::Duration};

use axum::{extract::FromRef, Router};
use sqlx::postgres::PgPoolOptions;

use crate::{
    database::PostgresConnection,
    trends::{
        commands::DynCubeCommands,
        queries::{DynCubeQueries, DynLedgerQueries},
        services::TrendsService,
    },
};

pub struct Options {
    pub database_pool_size: u32,
    pub database_timeout_seconds: u8,
    pub database_url: String,
}

#[derive(Clone)]
pub struct AppState {
    trends_service: TrendsService,
}

pub async fn serve(opts: Options) -> anyhow::Result<()> {
    let db_pool = PgPoolOptions::new()
        .max_connections(opts.database_pool_size)
        .acquire_timeout(Duration::from_secs(opts.database_timeout_seconds.into()))
        .connect(&opts.database_url)
        .await?;

    let db_connection = PostgresConnection::new(db_pool);

    let ledger_queries: DynLedgerQueries = Arc::new(db_connection.clone());
    let cube_queries: DynCubeQueries = Arc::new(db_connection.clone());
    let cube_commands: DynCubeCommands = Arc::new(db_connection);

    let trends_service = TrendsService::new(ledger_queries, cube_queries, cube_commands);

    let state = AppState { trends_service };

    let app = Router::new()
        .nest("/trends", crate::trends::http::routes())
        .with_state(state);

    axum::Server::bind(&"0.0.0.0:8000".parse().unwrap())
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

impl FromRef<AppState> for TrendsService {
    fn from_ref(state: &AppState) -> Self {
        state.trends_service.clone()
    }
}
