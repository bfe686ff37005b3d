//! Value types shared by the scorer, its data sources and the HTTP layer.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ScoringError::invalid(format!(
                "coordinate ({}, {}) out of range",
                self.latitude, self.longitude
            )))
        }
    }

    /// geo uses x = longitude, y = latitude.
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// A candidate path. `waypoints` is the full ordered path, endpoints included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteCandidate {
    pub id: String,
    pub start_point: GeoPoint,
    pub end_point: GeoPoint,
    pub waypoints: Vec<GeoPoint>,
    /// Untrafficked travel time. Derived from path length when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_secs: Option<f64>,
}

impl RouteCandidate {
    pub fn from_path(id: impl Into<String>, waypoints: Vec<GeoPoint>) -> Result<Self, ScoringError> {
        let (Some(&start_point), Some(&end_point)) = (waypoints.first(), waypoints.last()) else {
            return Err(ScoringError::invalid("route has no waypoints"));
        };
        let route = Self {
            id: id.into(),
            start_point,
            end_point,
            waypoints,
            estimated_duration_secs: None,
        };
        route.validate()?;
        Ok(route)
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.estimated_duration_secs = Some(secs);
        self
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if self.waypoints.len() < 2 {
            return Err(ScoringError::invalid(format!(
                "route {} needs at least two waypoints, got {}",
                self.id,
                self.waypoints.len()
            )));
        }
        for point in &self.waypoints {
            point.validate()?;
        }
        if self.waypoints.first() != Some(&self.start_point) {
            return Err(ScoringError::invalid(format!(
                "route {} does not begin at its start point",
                self.id
            )));
        }
        if self.waypoints.last() != Some(&self.end_point) {
            return Err(ScoringError::invalid(format!(
                "route {} does not finish at its end point",
                self.id
            )));
        }
        if let Some(secs) = self.estimated_duration_secs {
            if !secs.is_finite() || secs < 0.0 {
                return Err(ScoringError::invalid(format!(
                    "route {} has invalid duration {secs}",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Lighting,
    Surveillance,
    CrowdDensity,
    HistoricalIncidents,
    InfrastructureQuality,
    Traffic,
    Weather,
}

impl FactorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactorKind::Lighting => "lighting",
            FactorKind::Surveillance => "surveillance",
            FactorKind::CrowdDensity => "crowd_density",
            FactorKind::HistoricalIncidents => "historical_incidents",
            FactorKind::InfrastructureQuality => "infrastructure_quality",
            FactorKind::Traffic => "traffic",
            FactorKind::Weather => "weather",
        }
    }
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub kind: FactorKind,
    pub weight: f64,
    /// Safety, 1.0 = safest.
    pub score: f64,
}

/// Point-in-time safety snapshot. Never persisted; recomputed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyScore {
    pub overall: f64,
    pub factors: BTreeMap<FactorKind, f64>,
    pub degraded: bool,
    /// Factors that fell back to the neutral value.
    #[serde(default)]
    pub degraded_factors: Vec<FactorKind>,
    pub timestamp: DateTime<Utc>,
}

impl SafetyScore {
    pub fn factor(&self, kind: FactorKind) -> Option<f64> {
        self.factors.get(&kind).copied()
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.overall)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(safety: f64) -> Self {
        if safety < 0.4 {
            RiskLevel::High
        } else if safety < 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentAnalysis {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub distance_m: f64,
    pub safety_score: f64,
    pub incident_probability: f64,
    pub samples: Vec<SafetyScore>,
}

impl SegmentAnalysis {
    /// Riskier segments count more against the route total.
    pub fn weight(&self) -> f64 {
        1.0 + 0.5 * self.incident_probability
    }

    pub fn degraded(&self) -> bool {
        self.samples.iter().any(|s| s.degraded)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRoute {
    pub route: RouteCandidate,
    pub safety_score: f64,
    /// 1.0 = free flow, 0.0 = standstill, as measured when scored.
    pub traffic_score: f64,
    /// Seconds.
    pub traffic_adjusted_duration: f64,
    pub final_score: f64,
    pub degraded: bool,
    #[serde(default)]
    pub segments: Vec<SegmentAnalysis>,
    pub scored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfrastructureKind {
    Streetlight,
    Cctv,
    GuardPost,
    EmergencyPhone,
    TrafficSignal,
}

impl InfrastructureKind {
    pub const SECURITY: [InfrastructureKind; 3] = [
        InfrastructureKind::Cctv,
        InfrastructureKind::GuardPost,
        InfrastructureKind::EmergencyPhone,
    ];

    pub const ALL: [InfrastructureKind; 5] = [
        InfrastructureKind::Streetlight,
        InfrastructureKind::Cctv,
        InfrastructureKind::GuardPost,
        InfrastructureKind::EmergencyPhone,
        InfrastructureKind::TrafficSignal,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfrastructureStatus {
    Functional,
    Faulty,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Infrastructure {
    pub location: GeoPoint,
    pub kind: InfrastructureKind,
    #[serde(default)]
    pub status: InfrastructureStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub location: GeoPoint,
    pub severity: u8,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrafficSample {
    pub location: GeoPoint,
    /// 0 = free flow, 5 = standstill.
    pub congestion_level: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature_c: f64,
    pub precipitation_mm: f64,
    pub visibility_km: f64,
    pub wind_speed_kmh: f64,
}

impl Default for Weather {
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            precipitation_mm: 0.0,
            visibility_km: 10.0,
            wind_speed_kmh: 5.0,
        }
    }
}
