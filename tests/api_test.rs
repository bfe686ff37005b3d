mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use safewalk::api::{AppState, router};
use safewalk::planner::{FallbackParams, RoutePlanner};
use safewalk::{RouteSafetyScorer, ScorerSettings};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::FixedSource;

fn app() -> axum::Router {
    let state = Arc::new(AppState {
        scorer: RouteSafetyScorer::new(Arc::new(FixedSource::default()), ScorerSettings::default()),
        planner: RoutePlanner::new(None, Vec::new(), FallbackParams::default()),
    });
    router(state)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn score_returns_factors_and_level() {
    let response = app()
        .oneshot(post(
            "/score",
            json!({
                "location": { "latitude": 30.3398, "longitude": 76.3869 },
                "time": "2024-03-01T12:00:00Z"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["risk_level"], "low");
    assert_eq!(body["degraded"], false);
    assert_eq!(body["factors"]["lighting"], 0.9);
    assert_eq!(body["timestamp"], "2024-03-01T12:00:00Z");
}

#[tokio::test]
async fn out_of_range_coordinate_is_bad_request() {
    let response = app()
        .oneshot(post("/score", json!({ "location": { "latitude": 95.0, "longitude": 0.0 } })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rank_orders_and_truncates() {
    let path = json!([
        { "latitude": 30.0, "longitude": 76.0 },
        { "latitude": 30.0, "longitude": 76.01 }
    ]);
    let route = |id: &str, secs: f64| {
        json!({
            "id": id,
            "start_point": { "latitude": 30.0, "longitude": 76.0 },
            "end_point": { "latitude": 30.0, "longitude": 76.01 },
            "waypoints": path,
            "estimated_duration_secs": secs
        })
    };

    let response = app()
        .oneshot(post(
            "/routes/rank",
            json!({
                "routes": [route("slow", 900.0), route("quick", 600.0)],
                "time": "2024-03-01T12:00:00Z",
                "top_n": 1
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let ranked = body.as_array().unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0]["route"]["id"], "quick");
}

#[tokio::test]
async fn rank_rejects_route_with_mismatched_endpoints() {
    let response = app()
        .oneshot(post(
            "/routes/rank",
            json!({
                "routes": [{
                    "id": "broken",
                    "start_point": { "latitude": 10.0, "longitude": 10.0 },
                    "end_point": { "latitude": 30.0, "longitude": 76.01 },
                    "waypoints": [
                        { "latitude": 30.0, "longitude": 76.0 },
                        { "latitude": 30.0, "longitude": 76.01 }
                    ]
                }]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn route_without_graph_returns_direct_candidate() {
    let response = app()
        .oneshot(post(
            "/route",
            json!({
                "origin": { "latitude": 30.3398, "longitude": 76.3869 },
                "destination": { "latitude": 30.3450, "longitude": 76.3920 },
                "time": "2024-03-01T12:00:00Z"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body[0]["route"]["id"], "direct");
}

#[tokio::test]
async fn calm_conditions_do_not_reroute() {
    let app = app();
    let candidate = json!({
        "id": "current",
        "start_point": { "latitude": 30.0, "longitude": 76.0 },
        "end_point": { "latitude": 30.0, "longitude": 76.01 },
        "waypoints": [
            { "latitude": 30.0, "longitude": 76.0 },
            { "latitude": 30.0, "longitude": 76.01 }
        ]
    });
    let ranked = app
        .clone()
        .oneshot(post("/routes/rank", json!({ "routes": [candidate], "time": "2024-03-01T12:00:00Z" })))
        .await
        .unwrap();
    let current = json_body(ranked).await[0].clone();

    let response = app
        .oneshot(post(
            "/routes/reroute",
            json!({ "current": current, "time": "2024-03-01T12:10:00Z" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["reroute"], false);
    assert_eq!(body["score_age_secs"], 600);
    assert!(body["alternative"].is_null());
}
