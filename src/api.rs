use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::services::series_service::{SeriesParams, SeriesRequest, SeriesResponse};
use crate::services::SeriesService;

#[derive(Clone)]
pub struct AppState {
    pub series_service: SeriesService,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/series", get(get_series))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state))]
async fn get_series(
    State(state): State<AppState>,
    Query(params): Query<SeriesParams>,
) -> (StatusCode, Json<SeriesResponse>) {
    let request = match SeriesRequest::from_params(&params) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected series request: {}", e);
            return (StatusCode::BAD_REQUEST, Json(SeriesResponse::failure(e)));
        }
    };
    debug!("Parsed series request: {:?}", request);

    match state.series_service.run_query(&request).await {
        Ok(response) => {
            info!(
                "Series query returned {} documents",
                response.content.as_ref().map_or(0, Vec::len)
            );
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            error!("Failed to run series query: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SeriesResponse::failure(e)),
            )
        }
    }
}
