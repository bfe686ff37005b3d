//! Normalization of raw upstream measurements into [0, 1] safety factors.
//!
//! Every function here is pure: the scorer fetches, these functions turn what
//! was fetched into scores where 1.0 is safest.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Incident, Infrastructure, InfrastructureKind, InfrastructureStatus, TrafficSample, Weather};

/// How headcount near a point maps to safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdPolicy {
    /// Sparse is risky at night, dense is risky by day.
    #[default]
    TimeConditioned,
    SparseIsRisky,
    DenseIsRisky,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorParams {
    /// Night is `hour < night_end_hour || hour >= night_start_hour`, local time.
    pub night_start_hour: u32,
    pub night_end_hour: u32,
    /// Offset applied to UTC timestamps to obtain local hour.
    pub utc_offset_minutes: i32,
    pub daytime_lighting: f64,
    pub lighting_radius_m: f64,
    pub surveillance_radius_m: f64,
    pub surveillance_saturation: f64,
    pub incident_radius_m: f64,
    pub incident_window_days: i64,
    pub incident_half_life_days: f64,
    pub incident_recency_weight: f64,
    pub incident_severity_weight: f64,
    /// Summed incident risk at which the factor reaches zero.
    pub incident_saturation: f64,
    pub severity_scale: u8,
    pub crowd_radius_m: f64,
    pub crowd_saturation: f64,
    pub crowd_policy: CrowdPolicy,
    pub infrastructure_radius_m: f64,
    pub unknown_infrastructure: f64,
    /// Substituted for any factor whose fetch failed.
    pub fallback_score: f64,
}

impl Default for FactorParams {
    fn default() -> Self {
        Self {
            night_start_hour: 18,
            night_end_hour: 6,
            utc_offset_minutes: 0,
            daytime_lighting: 0.9,
            lighting_radius_m: 100.0,
            surveillance_radius_m: 200.0,
            surveillance_saturation: 3.0,
            incident_radius_m: 1_000.0,
            incident_window_days: 30,
            incident_half_life_days: 30.0,
            incident_recency_weight: 0.7,
            incident_severity_weight: 0.3,
            incident_saturation: 5.0,
            severity_scale: 5,
            crowd_radius_m: 500.0,
            crowd_saturation: 50.0,
            crowd_policy: CrowdPolicy::TimeConditioned,
            infrastructure_radius_m: 200.0,
            unknown_infrastructure: 0.5,
            fallback_score: 0.5,
        }
    }
}

impl FactorParams {
    pub fn local_hour(&self, time: DateTime<Utc>) -> u32 {
        match FixedOffset::east_opt(self.utc_offset_minutes * 60) {
            Some(offset) => time.with_timezone(&offset).hour(),
            None => time.hour(),
        }
    }

    pub fn is_night(&self, time: DateTime<Utc>) -> bool {
        let hour = self.local_hour(time);
        hour < self.night_end_hour || hour >= self.night_start_hour
    }

    pub fn incident_window(&self) -> Duration {
        Duration::days(self.incident_window_days)
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Functional share of nearby streetlights at night, daytime baseline otherwise.
pub fn lighting_score(lights: &[Infrastructure], night: bool, params: &FactorParams) -> f64 {
    if !night {
        return unit(params.daytime_lighting);
    }
    let streetlights = lights
        .iter()
        .filter(|i| i.kind == InfrastructureKind::Streetlight)
        .collect::<Vec<_>>();
    if streetlights.is_empty() {
        return 0.0;
    }
    let functional = streetlights
        .iter()
        .filter(|i| i.status == InfrastructureStatus::Functional)
        .count();
    functional as f64 / streetlights.len() as f64
}

pub fn surveillance_score(features: &[Infrastructure], params: &FactorParams) -> f64 {
    let count = features
        .iter()
        .filter(|i| InfrastructureKind::SECURITY.contains(&i.kind))
        .filter(|i| i.status != InfrastructureStatus::Faulty)
        .count();
    unit(count as f64 / params.surveillance_saturation.max(f64::EPSILON))
}

/// Risk one incident contributes: recency decay blended with severity.
pub fn incident_risk(incident: &Incident, now: DateTime<Utc>, params: &FactorParams) -> f64 {
    let age_days = ((now - incident.created_at).num_seconds().max(0) as f64) / 86_400.0;
    let half_life = params.incident_half_life_days.max(f64::EPSILON);
    let recency = 0.5_f64.powf(age_days / half_life);
    let severity = unit(incident.severity as f64 / params.severity_scale.max(1) as f64);
    params.incident_recency_weight * recency + params.incident_severity_weight * severity
}

/// Contributions are summed, so one more incident never raises the score.
pub fn historical_incident_score(incidents: &[Incident], now: DateTime<Utc>, params: &FactorParams) -> f64 {
    let total: f64 = incidents.iter().map(|i| incident_risk(i, now, params)).sum();
    unit(1.0 - total / params.incident_saturation.max(f64::EPSILON))
}

pub fn crowd_score(headcount: f64, night: bool, params: &FactorParams) -> f64 {
    let density = unit(headcount.max(0.0) / params.crowd_saturation.max(f64::EPSILON));
    let sparse_is_risky = match params.crowd_policy {
        CrowdPolicy::TimeConditioned => night,
        CrowdPolicy::SparseIsRisky => true,
        CrowdPolicy::DenseIsRisky => false,
    };
    if sparse_is_risky { density } else { 1.0 - density }
}

/// Functional share of nearby infrastructure with a known status.
pub fn infrastructure_quality_score(items: &[Infrastructure], params: &FactorParams) -> f64 {
    let (functional, known) = items.iter().fold((0usize, 0usize), |(ok, known), item| match item.status {
        InfrastructureStatus::Functional => (ok + 1, known + 1),
        InfrastructureStatus::Faulty => (ok, known + 1),
        InfrastructureStatus::Unknown => (ok, known),
    });
    if known == 0 {
        return unit(params.unknown_infrastructure);
    }
    functional as f64 / known as f64
}

/// Mean free-flow share across samples; no samples reads as free flow.
pub fn traffic_score(samples: &[TrafficSample]) -> f64 {
    if samples.is_empty() {
        return 1.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|s| (5.0 - s.congestion_level.clamp(0.0, 5.0)) / 5.0)
        .sum();
    unit(sum / samples.len() as f64)
}

/// Each congestion level adds 20% to travel time.
pub fn traffic_multiplier(traffic_score: f64) -> f64 {
    let avg_congestion = 5.0 * (1.0 - unit(traffic_score));
    1.0 + avg_congestion * 0.2
}

/// 0 = no impact, 1 = severe.
pub fn weather_impact(weather: &Weather) -> f64 {
    let visibility = unit(1.0 - weather.visibility_km / 10.0) * 0.3;
    let precipitation = unit(weather.precipitation_mm / 50.0) * 0.4;
    let temperature = unit((weather.temperature_c - 20.0).abs() / 30.0) * 0.2;
    let wind = unit(weather.wind_speed_kmh / 50.0) * 0.1;
    unit(visibility + precipitation + temperature + wind)
}
