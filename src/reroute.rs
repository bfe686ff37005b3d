//! Reroute triggers and the anti-flapping bar for switching routes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::near_path;
use crate::types::{Incident, ScoredRoute};

/// Guards float noise on threshold comparisons such as `0.7 - 0.5 >= 0.2`.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerouteThresholds {
    /// Relative drop of the traffic score since the route was scored.
    pub traffic_degradation: f64,
    pub weather_impact: f64,
    pub incident_radius_m: f64,
    pub incident_window_minutes: i64,
    /// An alternative must save at least this much time...
    pub min_time_saving_secs: f64,
    /// ...or improve the final score by at least this much.
    pub min_safety_gain: f64,
}

impl Default for RerouteThresholds {
    fn default() -> Self {
        Self {
            traffic_degradation: 0.3,
            weather_impact: 0.5,
            incident_radius_m: 100.0,
            incident_window_minutes: 15,
            min_time_saving_secs: 300.0,
            min_safety_gain: 0.2,
        }
    }
}

impl RerouteThresholds {
    pub fn incident_window(&self) -> Duration {
        Duration::minutes(self.incident_window_minutes)
    }
}

/// Signals observed after a route was scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshSignals {
    pub as_of: DateTime<Utc>,
    pub traffic_score: f64,
    pub weather_impact: f64,
    #[serde(default)]
    pub incidents: Vec<Incident>,
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerouteReason {
    TrafficDegraded,
    SevereWeather,
    NewIncident,
}

pub fn traffic_degradation(original: f64, current: f64) -> f64 {
    if original <= 0.0 {
        return 0.0;
    }
    (original - current) / original
}

/// Every reason the current route should be reconsidered, in check order.
pub fn reroute_reasons(
    current: &ScoredRoute,
    signals: &FreshSignals,
    thresholds: &RerouteThresholds,
) -> Vec<RerouteReason> {
    let mut reasons = Vec::new();

    if traffic_degradation(current.traffic_score, signals.traffic_score) > thresholds.traffic_degradation {
        reasons.push(RerouteReason::TrafficDegraded);
    }
    if signals.weather_impact > thresholds.weather_impact {
        reasons.push(RerouteReason::SevereWeather);
    }

    let window_start = signals.as_of - thresholds.incident_window();
    let new_incident = signals.incidents.iter().any(|incident| {
        incident.created_at >= window_start
            && incident.created_at <= signals.as_of
            && near_path(incident.location, &current.route.waypoints, thresholds.incident_radius_m)
    });
    if new_incident {
        reasons.push(RerouteReason::NewIncident);
    }

    reasons
}

pub fn should_reroute(current: &ScoredRoute, signals: &FreshSignals, thresholds: &RerouteThresholds) -> bool {
    !reroute_reasons(current, signals, thresholds).is_empty()
}

/// Only clearly better routes qualify, so marginal gains never cause a switch.
pub fn is_viable_alternative(
    alternative: &ScoredRoute,
    current: &ScoredRoute,
    thresholds: &RerouteThresholds,
) -> bool {
    let time_saving = current.traffic_adjusted_duration - alternative.traffic_adjusted_duration;
    let safety_gain = alternative.final_score - current.final_score;

    time_saving + EPSILON >= thresholds.min_time_saving_secs
        || safety_gain + EPSILON >= thresholds.min_safety_gain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoPoint, RouteCandidate};
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn scored(id: &str, final_score: f64, duration: f64) -> ScoredRoute {
        let route = RouteCandidate::from_path(
            id,
            vec![GeoPoint::new(30.0, 76.0), GeoPoint::new(30.0, 76.01)],
        )
        .unwrap();
        ScoredRoute {
            route,
            safety_score: final_score,
            traffic_score: 0.8,
            traffic_adjusted_duration: duration,
            final_score,
            degraded: false,
            segments: Vec::new(),
            scored_at: noon(),
        }
    }

    fn calm() -> FreshSignals {
        FreshSignals {
            as_of: noon(),
            traffic_score: 0.8,
            weather_impact: 0.1,
            incidents: Vec::new(),
            degraded: false,
        }
    }

    #[test]
    fn test_marginal_alternative_is_not_viable() {
        let t = RerouteThresholds::default();
        let current = scored("current", 0.6, 600.0);
        assert!(!is_viable_alternative(&scored("alt", 0.65, 590.0), &current, &t));
    }

    #[test]
    fn test_much_safer_alternative_is_viable() {
        let t = RerouteThresholds::default();
        let current = scored("current", 0.6, 600.0);
        assert!(is_viable_alternative(&scored("alt", 0.85, 600.0), &current, &t));
    }

    #[test]
    fn test_much_faster_alternative_is_viable() {
        let t = RerouteThresholds::default();
        let current = scored("current", 0.6, 900.0);
        assert!(is_viable_alternative(&scored("alt", 0.55, 600.0), &current, &t));
    }

    #[test]
    fn test_exact_threshold_gain_is_viable() {
        let t = RerouteThresholds::default();
        let current = scored("current", 0.5, 600.0);
        assert!(is_viable_alternative(&scored("alt", 0.7, 600.0), &current, &t));
    }

    #[test]
    fn test_calm_signals_do_not_reroute() {
        let t = RerouteThresholds::default();
        assert!(!should_reroute(&scored("r", 0.7, 600.0), &calm(), &t));
    }

    #[test]
    fn test_traffic_degradation_triggers() {
        let t = RerouteThresholds::default();
        let route = scored("r", 0.7, 600.0);

        // 0.8 -> 0.6 is a 25% drop
        let mild = FreshSignals { traffic_score: 0.6, ..calm() };
        assert!(!should_reroute(&route, &mild, &t));

        // 0.8 -> 0.5 is a 37.5% drop
        let heavy = FreshSignals { traffic_score: 0.5, ..calm() };
        assert_eq!(reroute_reasons(&route, &heavy, &t), vec![RerouteReason::TrafficDegraded]);
    }

    #[test]
    fn test_severe_weather_triggers() {
        let t = RerouteThresholds::default();
        let signals = FreshSignals { weather_impact: 0.51, ..calm() };
        assert!(should_reroute(&scored("r", 0.7, 600.0), &signals, &t));

        let borderline = FreshSignals { weather_impact: 0.5, ..calm() };
        assert!(!should_reroute(&scored("r", 0.7, 600.0), &borderline, &t));
    }

    #[test]
    fn test_recent_nearby_incident_triggers() {
        let t = RerouteThresholds::default();
        let route = scored("r", 0.7, 600.0);
        let near = Incident {
            location: GeoPoint::new(30.0005, 76.01),
            severity: 2,
            created_at: noon() - Duration::minutes(5),
        };
        let signals = FreshSignals { incidents: vec![near], ..calm() };
        assert_eq!(reroute_reasons(&route, &signals, &t), vec![RerouteReason::NewIncident]);
    }

    #[test]
    fn test_stale_or_distant_incident_is_ignored() {
        let t = RerouteThresholds::default();
        let route = scored("r", 0.7, 600.0);
        let stale = Incident {
            location: GeoPoint::new(30.0, 76.0),
            severity: 3,
            created_at: noon() - Duration::minutes(20),
        };
        let distant = Incident {
            location: GeoPoint::new(30.01, 76.005),
            severity: 3,
            created_at: noon() - Duration::minutes(1),
        };
        let signals = FreshSignals { incidents: vec![stale, distant], ..calm() };
        assert!(!should_reroute(&route, &signals, &t));
    }
}
