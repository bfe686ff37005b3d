//! Produces route candidates for an origin/destination pair.
//!
//! With a navigation graph loaded, candidates come from risk-weighted A* at
//! several safety preferences. Without one, the planner offers the straight
//! line plus, if any point on it is high risk, a detour around the first such
//! point.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScoringError;
use crate::geometry::{DEFAULT_DETOUR_OFFSET_DEG, detour_path, direct_path};
use crate::graph::NavigationGraph;
use crate::scorer::RouteSafetyScorer;
use crate::types::{GeoPoint, RouteCandidate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackParams {
    pub steps: usize,
    pub detour_offset_deg: f64,
    /// Risk (1 - safety) at or above which a point is avoided.
    pub high_risk_threshold: f64,
}

impl Default for FallbackParams {
    fn default() -> Self {
        Self {
            steps: 10,
            detour_offset_deg: DEFAULT_DETOUR_OFFSET_DEG,
            high_risk_threshold: 0.7,
        }
    }
}

pub struct RoutePlanner {
    graph: Option<NavigationGraph>,
    alphas: Vec<f64>,
    fallback: FallbackParams,
}

impl RoutePlanner {
    pub fn new(graph: Option<NavigationGraph>, alphas: Vec<f64>, fallback: FallbackParams) -> Self {
        Self { graph, alphas, fallback }
    }

    pub fn has_graph(&self) -> bool {
        self.graph.is_some()
    }

    pub async fn candidates(
        &self,
        scorer: &RouteSafetyScorer,
        origin: GeoPoint,
        destination: GeoPoint,
        time: DateTime<Utc>,
    ) -> Result<Vec<RouteCandidate>, ScoringError> {
        origin.validate()?;
        destination.validate()?;

        if let Some(graph) = &self.graph {
            let found = graph.candidate_routes(origin, destination, &self.alphas);
            if !found.is_empty() {
                return Ok(found);
            }
            debug!("graph_found_no_path_using_fallback");
        }
        self.fallback_candidates(scorer, origin, destination, time).await
    }

    async fn fallback_candidates(
        &self,
        scorer: &RouteSafetyScorer,
        origin: GeoPoint,
        destination: GeoPoint,
        time: DateTime<Utc>,
    ) -> Result<Vec<RouteCandidate>, ScoringError> {
        let path = direct_path(origin, destination, self.fallback.steps);
        let scores = join_all(path.iter().map(|&p| scorer.score_location(p, time)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let mut candidates = vec![RouteCandidate::from_path("direct", path.clone())?];

        let high_risk = scores
            .iter()
            .position(|s| 1.0 - s.overall >= self.fallback.high_risk_threshold);
        if let Some(pivot) = high_risk {
            debug!(pivot, "high_risk_point_on_direct_path");
            let detour = detour_path(&path, pivot, self.fallback.detour_offset_deg, self.fallback.steps);
            candidates.push(RouteCandidate::from_path("detour", detour)?);
        }
        Ok(candidates)
    }
}
