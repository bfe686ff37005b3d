//! Location and route safety scoring over injected data sources.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::aggregate::{WeightTable, check_unit, route_safety, weighted_mean};
use crate::error::{FetchError, ScoringError};
use crate::factors::{self, FactorParams};
use crate::geometry::{Segment, Segmentation, path_length, segment_path};
use crate::reroute::{self, FreshSignals, RerouteThresholds};
use crate::source::SafetyDataSource;
use crate::types::{
    FactorKind, GeoPoint, Incident, InfrastructureKind, RouteCandidate, SafetyScore, ScoredRoute,
    SegmentAnalysis,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchBudget {
    /// Upper bound for any single upstream call.
    pub per_fetch_ms: u64,
    /// Upper bound for one scoring call, fan-out included.
    pub overall_ms: u64,
}

impl Default for FetchBudget {
    fn default() -> Self {
        Self { per_fetch_ms: 3_000, overall_ms: 5_000 }
    }
}

impl FetchBudget {
    pub fn per_fetch(&self) -> Duration {
        Duration::from_millis(self.per_fetch_ms)
    }

    pub fn overall(&self) -> Duration {
        Duration::from_millis(self.overall_ms)
    }
}

/// How safety and travel time combine into the ranking score.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BlendPolicy {
    /// Rank on safety alone.
    #[default]
    SafetyOnly,
    /// `w · safety + (1 - w) / traffic_multiplier`.
    Weighted { safety_weight: f64 },
}

impl BlendPolicy {
    pub fn final_score(&self, safety: f64, traffic_multiplier: f64) -> f64 {
        match *self {
            BlendPolicy::SafetyOnly => safety,
            BlendPolicy::Weighted { safety_weight } => {
                let w = safety_weight.clamp(0.0, 1.0);
                let time_efficiency = 1.0 / traffic_multiplier.max(1.0);
                w * safety + (1.0 - w) * time_efficiency
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteParams {
    pub segmentation: Segmentation,
    /// Sample segment endpoints as well as the midpoint.
    pub sample_endpoints: bool,
    pub walking_speed_mps: f64,
    pub top_n: usize,
    pub blend: BlendPolicy,
}

impl Default for RouteParams {
    fn default() -> Self {
        Self {
            segmentation: Segmentation::Waypoints,
            sample_endpoints: false,
            walking_speed_mps: 1.4,
            top_n: 3,
            blend: BlendPolicy::SafetyOnly,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerSettings {
    pub factors: FactorParams,
    pub weights: WeightTable,
    pub routing: RouteParams,
    pub reroute: RerouteThresholds,
    pub budget: FetchBudget,
}

/// Stateless between calls; everything it knows comes from `source`.
#[derive(Clone)]
pub struct RouteSafetyScorer {
    source: Arc<dyn SafetyDataSource>,
    settings: ScorerSettings,
}

struct TrafficReading {
    score: f64,
    degraded: bool,
}

impl RouteSafetyScorer {
    pub fn new(source: Arc<dyn SafetyDataSource>, settings: ScorerSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &ScorerSettings {
        &self.settings
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.settings.budget.overall()
    }

    /// Runs `fut` until the per-fetch timeout or the call deadline, whichever is first.
    async fn bounded<T>(
        &self,
        deadline: Instant,
        fut: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        let per_fetch = self.settings.budget.per_fetch();
        let started = Instant::now();
        let until = (started + per_fetch).min(deadline);
        match tokio::time::timeout_at(until, fut).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(until.saturating_duration_since(started))),
        }
    }

    fn resolve(
        &self,
        kind: FactorKind,
        location: GeoPoint,
        outcome: Result<f64, FetchError>,
        degraded: &mut Vec<FactorKind>,
    ) -> f64 {
        match outcome {
            Ok(score) => score,
            Err(e) => {
                warn!(
                    factor = %kind,
                    lat = location.latitude,
                    lon = location.longitude,
                    error = %e,
                    "factor_fetch_failed_using_fallback"
                );
                degraded.push(kind);
                self.settings.factors.fallback_score
            }
        }
    }

    pub async fn score_location(&self, location: GeoPoint, time: DateTime<Utc>) -> Result<SafetyScore, ScoringError> {
        location.validate()?;
        self.settings.weights.validate()?;
        self.score_location_by(location, time, self.deadline()).await
    }

    async fn score_location_by(
        &self,
        location: GeoPoint,
        time: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<SafetyScore, ScoringError> {
        let p = &self.settings.factors;
        let night = p.is_night(time);
        let since = time - p.incident_window();

        let (lights, security, incidents, crowd, infrastructure) = tokio::join!(
            self.bounded(
                deadline,
                self.source
                    .nearby_infrastructure(location, p.lighting_radius_m, &[InfrastructureKind::Streetlight]),
            ),
            self.bounded(
                deadline,
                self.source
                    .nearby_infrastructure(location, p.surveillance_radius_m, &InfrastructureKind::SECURITY),
            ),
            self.bounded(deadline, self.source.recent_incidents(location, p.incident_radius_m, since)),
            self.bounded(deadline, self.source.crowd_density(location, p.crowd_radius_m, time)),
            self.bounded(
                deadline,
                self.source
                    .nearby_infrastructure(location, p.infrastructure_radius_m, &InfrastructureKind::ALL),
            ),
        );

        let mut degraded = Vec::new();
        let scores = [
            (
                FactorKind::Lighting,
                lights.map(|l| factors::lighting_score(&l, night, p)),
            ),
            (
                FactorKind::Surveillance,
                security.map(|s| factors::surveillance_score(&s, p)),
            ),
            (
                FactorKind::HistoricalIncidents,
                incidents.map(|i| factors::historical_incident_score(&i, time, p)),
            ),
            (
                FactorKind::CrowdDensity,
                crowd.map(|c| factors::crowd_score(c, night, p)),
            ),
            (
                FactorKind::InfrastructureQuality,
                infrastructure.map(|i| factors::infrastructure_quality_score(&i, p)),
            ),
        ]
        .map(|(kind, outcome)| {
            let score = self.resolve(kind, location, outcome, &mut degraded);
            self.settings.weights.factor(kind, score)
        });

        let overall = weighted_mean(&scores)?;

        debug!(
            lat = location.latitude,
            lon = location.longitude,
            overall,
            degraded = !degraded.is_empty(),
            "location_scored"
        );

        Ok(SafetyScore {
            overall,
            factors: scores.iter().map(|f| (f.kind, f.score)).collect(),
            degraded: !degraded.is_empty(),
            degraded_factors: degraded,
            timestamp: time,
        })
    }

    fn sample_points(&self, segment: &Segment) -> Vec<GeoPoint> {
        if self.settings.routing.sample_endpoints {
            vec![segment.start, segment.midpoint(), segment.end]
        } else {
            vec![segment.midpoint()]
        }
    }

    async fn analyze_segment(
        &self,
        segment: Segment,
        time: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<SegmentAnalysis, ScoringError> {
        let samples = join_all(
            self.sample_points(&segment)
                .into_iter()
                .map(|point| self.score_location_by(point, time, deadline)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        let n = samples.len() as f64;
        let safety_score = samples.iter().map(|s| s.overall).sum::<f64>() / n;
        let incident_safety = samples
            .iter()
            .map(|s| s.factor(FactorKind::HistoricalIncidents).unwrap_or(1.0))
            .sum::<f64>()
            / n;

        Ok(SegmentAnalysis {
            start: segment.start,
            end: segment.end,
            distance_m: segment.distance_m,
            safety_score,
            incident_probability: (1.0 - incident_safety).clamp(0.0, 1.0),
            samples,
        })
    }

    /// Mean free-flow share over `points` as of `time`; failed points use the fallback.
    async fn traffic_along(&self, points: &[GeoPoint], time: DateTime<Utc>, deadline: Instant) -> TrafficReading {
        let readings = join_all(
            points
                .iter()
                .map(|&point| self.bounded(deadline, self.source.traffic_snapshot(point, time))),
        )
        .await;

        let mut degraded = false;
        let mut sum = 0.0;
        for (point, reading) in points.iter().zip(readings) {
            sum += match reading {
                Ok(samples) => factors::traffic_score(&samples),
                Err(e) => {
                    warn!(
                        factor = %FactorKind::Traffic,
                        lat = point.latitude,
                        lon = point.longitude,
                        error = %e,
                        "factor_fetch_failed_using_fallback"
                    );
                    degraded = true;
                    self.settings.factors.fallback_score
                }
            };
        }
        let score = if points.is_empty() { 1.0 } else { sum / points.len() as f64 };
        TrafficReading { score, degraded }
    }

    pub async fn score_route(&self, route: &RouteCandidate, time: DateTime<Utc>) -> Result<ScoredRoute, ScoringError> {
        route.validate()?;
        self.settings.weights.validate()?;
        self.score_route_by(route, time, self.deadline()).await
    }

    async fn score_route_by(
        &self,
        route: &RouteCandidate,
        time: DateTime<Utc>,
        deadline: Instant,
    ) -> Result<ScoredRoute, ScoringError> {
        let routing = &self.settings.routing;
        let segments = segment_path(&route.waypoints, routing.segmentation);

        let (analyses, traffic) = tokio::join!(
            join_all(
                segments
                    .into_iter()
                    .map(|segment| self.analyze_segment(segment, time, deadline))
            ),
            self.traffic_along(&route.waypoints, time, deadline),
        );
        let analyses = analyses.into_iter().collect::<Result<Vec<_>, _>>()?;

        let safety_score = route_safety(&analyses)?;
        let multiplier = factors::traffic_multiplier(traffic.score);
        let base_duration = route
            .estimated_duration_secs
            .unwrap_or_else(|| path_length(&route.waypoints) / routing.walking_speed_mps.max(0.1));
        let final_score = check_unit(None, routing.blend.final_score(safety_score, multiplier))?;
        let degraded = traffic.degraded || analyses.iter().any(SegmentAnalysis::degraded);

        debug!(
            route_id = %route.id,
            segments = analyses.len(),
            safety_score,
            traffic_score = traffic.score,
            final_score,
            degraded,
            "route_scored"
        );

        Ok(ScoredRoute {
            route: route.clone(),
            safety_score,
            traffic_score: traffic.score,
            traffic_adjusted_duration: base_duration * multiplier,
            final_score,
            degraded,
            segments: analyses,
            scored_at: time,
        })
    }

    /// Best first; ties go to the quicker route, then the lower id.
    pub async fn rank_routes(
        &self,
        routes: &[RouteCandidate],
        time: DateTime<Utc>,
        top_n: Option<usize>,
    ) -> Result<Vec<ScoredRoute>, ScoringError> {
        for route in routes {
            route.validate()?;
        }
        self.settings.weights.validate()?;

        let deadline = self.deadline();
        let mut scored = join_all(routes.iter().map(|route| self.score_route_by(route, time, deadline)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        sort_ranked(&mut scored);
        scored.truncate(top_n.unwrap_or(self.settings.routing.top_n));

        info!(
            candidates = routes.len(),
            returned = scored.len(),
            best = scored.first().map(|r| r.route.id.as_str()).unwrap_or("-"),
            "routes_ranked"
        );
        Ok(scored)
    }

    pub fn should_reroute(&self, current: &ScoredRoute, signals: &FreshSignals) -> bool {
        reroute::should_reroute(current, signals, &self.settings.reroute)
    }

    pub fn is_viable_alternative(&self, alternative: &ScoredRoute, current: &ScoredRoute) -> bool {
        reroute::is_viable_alternative(alternative, current, &self.settings.reroute)
    }

    /// Current traffic, weather and recent incidents around a route in progress.
    pub async fn collect_fresh_signals(
        &self,
        current: &ScoredRoute,
        now: DateTime<Utc>,
    ) -> Result<FreshSignals, ScoringError> {
        current.route.validate()?;
        let deadline = self.deadline();
        let thresholds = &self.settings.reroute;
        let path = &current.route.waypoints;
        let since = now - thresholds.incident_window();

        let (traffic, weather, incidents) = tokio::join!(
            self.traffic_along(path, now, deadline),
            self.bounded(deadline, self.source.weather(current.route.start_point)),
            join_all(path.iter().map(|&point| {
                self.bounded(
                    deadline,
                    self.source.recent_incidents(point, thresholds.incident_radius_m, since),
                )
            })),
        );

        let mut degraded = traffic.degraded;
        let weather_impact = match weather {
            Ok(weather) => factors::weather_impact(&weather),
            Err(e) => {
                warn!(factor = %FactorKind::Weather, error = %e, "factor_fetch_failed_using_fallback");
                degraded = true;
                1.0 - self.settings.factors.fallback_score
            }
        };

        let mut seen: Vec<Incident> = Vec::new();
        for result in incidents {
            match result {
                Ok(found) => {
                    for incident in found {
                        if !seen.contains(&incident) {
                            seen.push(incident);
                        }
                    }
                }
                Err(e) => {
                    warn!(factor = %FactorKind::HistoricalIncidents, error = %e, "incident_fetch_failed");
                    degraded = true;
                }
            }
        }

        Ok(FreshSignals {
            as_of: now,
            traffic_score: traffic.score,
            weather_impact,
            incidents: seen,
            degraded,
        })
    }

    /// The best-ranked candidate that clears the viability bar against `current`.
    pub async fn find_alternative(
        &self,
        current: &ScoredRoute,
        candidates: &[RouteCandidate],
        time: DateTime<Utc>,
    ) -> Result<Option<ScoredRoute>, ScoringError> {
        let others = candidates
            .iter()
            .filter(|c| c.id != current.route.id)
            .cloned()
            .collect::<Vec<_>>();
        let ranked = self.rank_routes(&others, time, Some(others.len())).await?;
        Ok(ranked
            .into_iter()
            .find(|alternative| self.is_viable_alternative(alternative, current)))
    }
}

pub fn sort_ranked(routes: &mut [ScoredRoute]) {
    routes.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.traffic_adjusted_duration.total_cmp(&b.traffic_adjusted_duration))
            .then_with(|| a.route.id.cmp(&b.route.id))
    });
}

/// Age of a score relative to `now`, for callers deciding whether to rescore.
pub fn staleness(scored_at: DateTime<Utc>, now: DateTime<Utc>) -> ChronoDuration {
    (now - scored_at).max(ChronoDuration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Snapshot, SnapshotStore};
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn scorer(settings: ScorerSettings) -> RouteSafetyScorer {
        RouteSafetyScorer::new(Arc::new(SnapshotStore::new(Snapshot::default())), settings)
    }

    #[test]
    fn test_weighted_blend_rewards_free_flow() {
        let blend = BlendPolicy::Weighted { safety_weight: 0.8 };
        assert!((blend.final_score(0.5, 1.0) - 0.6).abs() < 1e-12);
        assert!((blend.final_score(0.5, 2.0) - 0.5).abs() < 1e-12);
        assert_eq!(BlendPolicy::SafetyOnly.final_score(0.42, 2.0), 0.42);
    }

    #[test]
    fn test_staleness_never_negative() {
        assert_eq!(staleness(noon(), noon() - ChronoDuration::minutes(1)), ChronoDuration::zero());
        assert_eq!(staleness(noon(), noon() + ChronoDuration::minutes(2)), ChronoDuration::minutes(2));
    }

    #[tokio::test]
    async fn test_invalid_location_is_rejected() {
        let scorer = scorer(ScorerSettings::default());
        let err = scorer.score_location(GeoPoint::new(95.0, 0.0), noon()).await.unwrap_err();
        assert!(matches!(err, ScoringError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_world_daytime_score() {
        let scorer = scorer(ScorerSettings::default());
        let score = scorer.score_location(GeoPoint::new(30.0, 76.0), noon()).await.unwrap();

        assert!(!score.degraded);
        assert_eq!(score.factor(FactorKind::Lighting), Some(0.9));
        assert_eq!(score.factor(FactorKind::Surveillance), Some(0.0));
        assert_eq!(score.factor(FactorKind::HistoricalIncidents), Some(1.0));
        assert_eq!(score.factor(FactorKind::CrowdDensity), Some(1.0));
        assert_eq!(score.factor(FactorKind::InfrastructureQuality), Some(0.5));

        // (0.27 + 0 + 0.3 + 0.2 + 0.1) / 1.15
        assert!((score.overall - 0.87 / 1.15).abs() < 1e-12);
        assert_eq!(score.timestamp, noon());
    }

    #[tokio::test]
    async fn test_route_duration_from_walking_speed() {
        let scorer = scorer(ScorerSettings::default());
        let route =
            RouteCandidate::from_path("r", vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)]).unwrap();
        let scored = scorer.score_route(&route, noon()).await.unwrap();

        let expected = path_length(&route.waypoints) / 1.4;
        assert!((scored.traffic_adjusted_duration - expected).abs() < 1e-6);
        assert_eq!(scored.traffic_score, 1.0);
        assert_eq!(scored.segments.len(), 1);
        assert_eq!(scored.final_score, scored.safety_score);
    }
}
