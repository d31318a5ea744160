use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::error;

use crate::{
    http_err::{ApiError, ApiResponse},
    server::AppState,
    trends::services::TrendsService,
};

use super::reps;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_trends).delete(clear_cube))
        .route("/totals", get(get_aggregated_totals))
        .route("/statistics", get(get_statistics))
        .route("/populate", post(populate))
}

async fn get_trends(
    State(trends_service): State<TrendsService>,
    Query(params): Query<reps::TrendsParams>,
) -> ApiResponse<Json<reps::ResourceCollection<reps::CubeRecordRep>>> {
    let filter = params.filter().map_err(ApiError::BadRequest)?;

    match trends_service.get_trends(params.user_id, &filter).await {
        Ok(records) => Ok(Json(reps::ResourceCollection {
            items: records.iter().map(reps::CubeRecordRep::from).collect(),
        })),
        Err(error) => {
            error!(user_id = %params.user_id, ?error, "Failed to query trends.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn get_aggregated_totals(
    State(trends_service): State<TrendsService>,
    Query(params): Query<reps::TotalsParams>,
) -> ApiResponse<Json<reps::ResourceCollection<reps::GroupedTotalRep>>> {
    let filter = params.filter().map_err(ApiError::BadRequest)?;
    let dimensions = params.dimensions().map_err(ApiError::BadRequest)?;

    match trends_service
        .get_aggregated_totals(params.user_id, &dimensions, &filter)
        .await
    {
        Ok(totals) => Ok(Json(reps::ResourceCollection {
            items: totals.iter().map(reps::GroupedTotalRep::from).collect(),
        })),
        Err(error) => {
            error!(user_id = %params.user_id, ?error, "Failed to query aggregated totals.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn get_statistics(
    State(trends_service): State<TrendsService>,
    Query(params): Query<reps::UserParams>,
) -> ApiResponse<Json<reps::StatisticsRep>> {
    match trends_service.get_statistics(params.user_id).await {
        Ok(statistics) => Ok(Json(reps::StatisticsRep::from(&statistics))),
        Err(error) => {
            error!(user_id = %params.user_id, ?error, "Failed to query cube statistics.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn populate(
    State(trends_service): State<TrendsService>,
    Json(request): Json<reps::PopulateRequest>,
) -> ApiResponse<Json<reps::PopulationSummaryRep>> {
    match trends_service
        .populate(request.user_id, (&request).into())
        .await
    {
        Ok(summary) => Ok(Json(reps::PopulationSummaryRep::from(&summary))),
        Err(error) => {
            error!(user_id = %request.user_id, ?error, "Failed to populate cube.");

            Err(ApiError::InternalServerError)
        }
    }
}

async fn clear_cube(
    State(trends_service): State<TrendsService>,
    Query(params): Query<reps::UserParams>,
) -> ApiResponse<StatusCode> {
    match trends_service.clear_all(params.user_id).await {
        Ok(_) => Ok(StatusCode::NO_CONTENT),
        Err(error) => {
            error!(user_id = %params.user_id, ?error, "Failed to clear cube.");

            Err(ApiError::InternalServerError)
        }
    }
}
