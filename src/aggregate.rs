//! The one place factor scores are blended into a single number.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::ScoringError;
use crate::types::{FactorKind, RiskFactor, SegmentAnalysis};

/// Per-factor contribution shares. Need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightTable {
    pub lighting: f64,
    pub surveillance: f64,
    pub crowd_density: f64,
    pub historical_incidents: f64,
    pub infrastructure_quality: f64,
    pub traffic: f64,
    pub weather: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            lighting: 0.3,
            surveillance: 0.15,
            crowd_density: 0.2,
            historical_incidents: 0.3,
            infrastructure_quality: 0.2,
            traffic: 0.0,
            weather: 0.0,
        }
    }
}

impl WeightTable {
    pub fn weight(&self, kind: FactorKind) -> f64 {
        match kind {
            FactorKind::Lighting => self.lighting,
            FactorKind::Surveillance => self.surveillance,
            FactorKind::CrowdDensity => self.crowd_density,
            FactorKind::HistoricalIncidents => self.historical_incidents,
            FactorKind::InfrastructureQuality => self.infrastructure_quality,
            FactorKind::Traffic => self.traffic,
            FactorKind::Weather => self.weather,
        }
    }

    pub fn scaled(&self, by: f64) -> Self {
        Self {
            lighting: self.lighting * by,
            surveillance: self.surveillance * by,
            crowd_density: self.crowd_density * by,
            historical_incidents: self.historical_incidents * by,
            infrastructure_quality: self.infrastructure_quality * by,
            traffic: self.traffic * by,
            weather: self.weather * by,
        }
    }

    pub fn factor(&self, kind: FactorKind, score: f64) -> RiskFactor {
        RiskFactor { kind, weight: self.weight(kind), score }
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        let all = [
            self.lighting,
            self.surveillance,
            self.crowd_density,
            self.historical_incidents,
            self.infrastructure_quality,
            self.traffic,
            self.weather,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ScoringError::invalid("factor weights must be finite and non-negative"));
        }
        Ok(())
    }

    /// Stricter check for a loaded table: point scores blend only the
    /// location factors, so those must not all be zero.
    pub fn validate_for_scoring(&self) -> Result<(), ScoringError> {
        self.validate()?;
        let location = self.lighting
            + self.surveillance
            + self.crowd_density
            + self.historical_incidents
            + self.infrastructure_quality;
        if location <= 0.0 {
            return Err(ScoringError::invalid("location factor weights must not all be zero"));
        }
        Ok(())
    }
}

pub(crate) fn check_unit(kind: Option<FactorKind>, value: f64) -> Result<f64, ScoringError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        let err = ScoringError::out_of_range(kind, value);
        error!(error = %err, "score_out_of_range");
        Err(err)
    }
}

/// `Σ wᵢ sᵢ / Σ wᵢ`. Out-of-range inputs or output are a computation error.
pub fn weighted_mean(factors: &[RiskFactor]) -> Result<f64, ScoringError> {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for factor in factors {
        let score = check_unit(Some(factor.kind), factor.score)?;
        if !factor.weight.is_finite() || factor.weight < 0.0 {
            return Err(ScoringError::invalid(format!(
                "weight {} for {} is not a finite non-negative number",
                factor.weight, factor.kind
            )));
        }
        weighted += factor.weight * score;
        total_weight += factor.weight;
    }
    if total_weight <= 0.0 {
        return Err(ScoringError::invalid("factor weights sum to zero"));
    }
    check_unit(None, weighted / total_weight)
}

/// Segment scores weighted by `1 + 0.5 · incident_probability`.
pub fn route_safety(segments: &[SegmentAnalysis]) -> Result<f64, ScoringError> {
    if segments.is_empty() {
        return Err(ScoringError::invalid("route has no segments"));
    }
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for segment in segments {
        let score = check_unit(None, segment.safety_score)?;
        let weight = segment.weight();
        weighted += score * weight;
        total_weight += weight;
    }
    check_unit(None, weighted / total_weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoPoint;

    fn segment(score: f64, probability: f64) -> SegmentAnalysis {
        SegmentAnalysis {
            start: GeoPoint::new(0.0, 0.0),
            end: GeoPoint::new(0.0, 0.001),
            distance_m: 111.0,
            safety_score: score,
            incident_probability: probability,
            samples: Vec::new(),
        }
    }

    #[test]
    fn test_weighted_mean_normalizes_weights() {
        let weights = WeightTable::default();
        let factors = [
            weights.factor(FactorKind::Lighting, 1.0),
            weights.factor(FactorKind::HistoricalIncidents, 0.0),
        ];
        assert!((weighted_mean(&factors).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_table_without_location_weight_is_rejected() {
        let table = WeightTable {
            lighting: 0.0,
            surveillance: 0.0,
            crowd_density: 0.0,
            historical_incidents: 0.0,
            infrastructure_quality: 0.0,
            traffic: 1.0,
            weather: 1.0,
        };
        assert!(table.validate().is_ok());
        assert!(matches!(table.validate_for_scoring(), Err(ScoringError::InvalidInput(_))));
        assert!(WeightTable::default().validate_for_scoring().is_ok());
    }

    #[test]
    fn test_weighted_mean_rejects_out_of_range_factor() {
        let factors = [RiskFactor { kind: FactorKind::Lighting, weight: 1.0, score: 1.2 }];
        assert!(matches!(
            weighted_mean(&factors),
            Err(ScoringError::Computation { .. })
        ));
    }

    #[test]
    fn test_weighted_mean_rejects_zero_weight_sum() {
        let factors = [RiskFactor { kind: FactorKind::Lighting, weight: 0.0, score: 0.4 }];
        assert!(matches!(weighted_mean(&factors), Err(ScoringError::InvalidInput(_))));
    }

    #[test]
    fn test_route_safety_counts_risky_segments_more() {
        let score = route_safety(&[segment(0.9, 0.0), segment(0.3, 0.8)]).unwrap();
        // (0.9 * 1.0 + 0.3 * 1.4) / 2.4
        assert!((score - 0.55).abs() < 1e-12);
        assert!(score < 0.6);
    }

    #[test]
    fn test_route_safety_without_incidents_is_plain_mean() {
        let score = route_safety(&[segment(0.8, 0.0), segment(0.4, 0.0)]).unwrap();
        assert!((score - 0.6).abs() < 1e-12);
    }
}
