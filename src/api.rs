//! JSON HTTP surface over the scorer.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::error::ScoringError;
use crate::planner::RoutePlanner;
use crate::reroute::{FreshSignals, RerouteReason, reroute_reasons};
use crate::scorer::{RouteSafetyScorer, staleness};
use crate::types::{GeoPoint, RiskLevel, RouteCandidate, SafetyScore, ScoredRoute};

// Shared State for concurrency
pub struct AppState {
    pub scorer: RouteSafetyScorer,
    pub planner: RoutePlanner,
}

pub enum ApiError {
    BadRequest(String),
    InternalServerError(String),
}

impl From<ScoringError> for ApiError {
    fn from(error: ScoringError) -> Self {
        match error {
            ScoringError::InvalidInput(message) => ApiError::BadRequest(message),
            other => {
                error!(error = %other, "request_failed");
                ApiError::InternalServerError(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            ApiError::InternalServerError(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // Allows browser clients on other origins to call the API
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/score", post(score_location))
        .route("/route", post(plan_route))
        .route("/routes/rank", post(rank_routes))
        .route("/routes/reroute", post(check_reroute))
        .layer(cors)
        .with_state(state)
}

// --- API DTOs ---

#[derive(Deserialize)]
pub struct ScoreRequest {
    pub location: GeoPoint,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct ScoreResponse {
    #[serde(flatten)]
    pub score: SafetyScore,
    pub risk_level: RiskLevel,
}

#[derive(Deserialize)]
pub struct RankRequest {
    pub routes: Vec<RouteCandidate>,
    pub time: Option<DateTime<Utc>>,
    pub top_n: Option<usize>,
}

#[derive(Deserialize)]
pub struct RouteRequest {
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub time: Option<DateTime<Utc>>,
    pub top_n: Option<usize>,
}

#[derive(Deserialize)]
pub struct RerouteRequest {
    pub current: ScoredRoute,
    #[serde(default)]
    pub alternatives: Vec<RouteCandidate>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct RerouteResponse {
    pub reroute: bool,
    pub reasons: Vec<RerouteReason>,
    pub signals: FreshSignals,
    pub score_age_secs: i64,
    pub alternative: Option<ScoredRoute>,
}

// --- Handlers ---

async fn score_location(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, ApiError> {
    let time = payload.time.unwrap_or_else(Utc::now);
    let score = state.scorer.score_location(payload.location, time).await?;
    let risk_level = score.risk_level();
    Ok(Json(ScoreResponse { score, risk_level }))
}

async fn rank_routes(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RankRequest>,
) -> Result<Json<Vec<ScoredRoute>>, ApiError> {
    if payload.routes.is_empty() {
        return Err(ApiError::BadRequest("no routes to rank".to_string()));
    }
    let time = payload.time.unwrap_or_else(Utc::now);
    let ranked = state.scorer.rank_routes(&payload.routes, time, payload.top_n).await?;
    Ok(Json(ranked))
}

async fn plan_route(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<Vec<ScoredRoute>>, ApiError> {
    let time = payload.time.unwrap_or_else(Utc::now);
    let candidates = state
        .planner
        .candidates(&state.scorer, payload.origin, payload.destination, time)
        .await?;
    info!(candidates = candidates.len(), graph = state.planner.has_graph(), "route_candidates_generated");

    let ranked = state.scorer.rank_routes(&candidates, time, payload.top_n).await?;
    Ok(Json(ranked))
}

async fn check_reroute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RerouteRequest>,
) -> Result<Json<RerouteResponse>, ApiError> {
    let now = payload.time.unwrap_or_else(Utc::now);
    let current = &payload.current;

    let signals = state.scorer.collect_fresh_signals(current, now).await?;
    let reasons = reroute_reasons(current, &signals, &state.scorer.settings().reroute);
    let reroute = !reasons.is_empty();

    let alternative = if reroute && !payload.alternatives.is_empty() {
        state.scorer.find_alternative(current, &payload.alternatives, now).await?
    } else {
        None
    };

    info!(
        route_id = %current.route.id,
        reroute,
        reasons = ?reasons,
        alternative = alternative.as_ref().map(|a| a.route.id.as_str()).unwrap_or("-"),
        "reroute_checked"
    );

    Ok(Json(RerouteResponse {
        reroute,
        reasons,
        signals,
        score_age_secs: staleness(current.scored_at, now).num_seconds(),
        alternative,
    }))
}
