use axum::{
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, warn};

use crate::service::WeatherLookup;

#[derive(Clone)]
pub struct AppState {
    pub lookup: Arc<dyn WeatherLookup>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    #[serde(default)]
    city: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BadRequestResponse {
    pub message: String,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    // The last route layer runs first: non-GET requests, CORS preflights and
    // HEAD included, are refused before anything else sees them.
    Router::new()
        .route("/weather", any(weather))
        .route_layer(cors)
        .route_layer(middleware::from_fn(only_get))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

async fn only_get(request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, [(header::ALLOW, "GET")]).into_response();
    }
    next.run(request).await
}

async fn weather(State(state): State<AppState>, Query(query): Query<WeatherQuery>) -> Response {
    if query.city.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(BadRequestResponse {
                message: "`city` query parameter is required".to_string(),
            }),
        )
            .into_response();
    }

    // axum drops this future when the client goes away; the guard turns that
    // into a cancellation of any in-flight provider call.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state
        .lookup
        .get_weather_for_cities(&cancel, &query.city)
        .await
    {
        Ok(out) => Json(out).into_response(),
        Err(e) if e.is_cancelled() => {
            debug!("Request cancelled while getting weather for cities: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            warn!("Got error on getting weather for cities: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
