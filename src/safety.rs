use h3o::{CellIndex, LatLng, Resolution};
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::factors::{FactorParams, incident_risk};
use crate::types::{GeoPoint, Incident};

// 0.0 = Safe, 1.0 = Dangerous
pub struct RiskGrid {
    cells: HashMap<CellIndex, f32>,
    resolution: Resolution,
    base_risk: f32,
}

impl RiskGrid {
    pub fn new(resolution: Resolution, base_risk: f32) -> Self {
        Self { cells: HashMap::new(), resolution, base_risk }
    }

    /// Folds incidents into cells: full weight in the incident's cell, half in
    /// the surrounding ring.
    pub fn from_incidents(
        incidents: &[Incident],
        now: DateTime<Utc>,
        params: &FactorParams,
        resolution: Resolution,
        base_risk: f32,
    ) -> Self {
        let mut grid = Self::new(resolution, base_risk);
        let saturation = params.incident_saturation.max(f64::EPSILON);

        for incident in incidents {
            let Some(center) = grid.cell(incident.location) else {
                continue;
            };
            let risk = (incident_risk(incident, now, params) / saturation) as f32;
            for cell in center.grid_disk::<Vec<_>>(1) {
                let share = if cell == center { risk } else { risk * 0.5 };
                grid.add(cell, share);
            }
        }
        grid
    }

    fn cell(&self, location: GeoPoint) -> Option<CellIndex> {
        LatLng::new(location.latitude, location.longitude)
            .ok()
            .map(|ll| ll.to_cell(self.resolution))
    }

    fn add(&mut self, cell: CellIndex, risk: f32) {
        let entry = self.cells.entry(cell).or_insert(self.base_risk);
        *entry = (*entry + risk).min(1.0);
    }

    pub fn mark(&mut self, location: GeoPoint, risk: f32) {
        if let Some(cell) = self.cell(location) {
            self.cells.insert(cell, risk.clamp(0.0, 1.0));
        }
    }

    pub fn get_risk_score(&self, location: GeoPoint) -> f32 {
        self.cell(location)
            .and_then(|cell| self.cells.get(&cell).copied())
            .unwrap_or(self.base_risk)
    }

    /// Risk at the edge midpoint, raised when the way is tagged unlit.
    pub fn calculate_edge_risk(&self, a: GeoPoint, b: GeoPoint, unlit: bool, unlit_penalty: f32) -> f32 {
        let mid = crate::geometry::midpoint(a, b);
        let risk = self.get_risk_score(mid);
        if unlit { (risk + unlit_penalty).min(1.0) } else { risk }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unknown_cells_use_base_risk() {
        let grid = RiskGrid::new(Resolution::Nine, 0.1);
        assert_eq!(grid.get_risk_score(GeoPoint::new(30.3398, 76.3869)), 0.1);
        assert!(grid.is_empty());
    }

    #[test]
    fn test_incident_raises_its_cell_more_than_neighbours() {
        let center = GeoPoint::new(30.3398, 76.3869);
        let incidents = vec![Incident { location: center, severity: 5, created_at: noon() - Duration::hours(1) }];
        let grid = RiskGrid::from_incidents(&incidents, noon(), &FactorParams::default(), Resolution::Nine, 0.1);

        assert_eq!(grid.len(), 7);
        let here = grid.get_risk_score(center);
        assert!(here > 0.25 && here <= 1.0, "got {here}");

        let cell = LatLng::new(center.latitude, center.longitude).unwrap().to_cell(Resolution::Nine);
        let neighbour = cell.grid_disk::<Vec<_>>(1).into_iter().find(|c| *c != cell).unwrap();
        let ll = LatLng::from(neighbour);
        let there = grid.get_risk_score(GeoPoint::new(ll.lat(), ll.lng()));
        assert!(there < here && there > 0.1);
    }

    #[test]
    fn test_unlit_penalty_is_capped() {
        let mut grid = RiskGrid::new(Resolution::Nine, 0.1);
        let a = GeoPoint::new(30.3398, 76.3869);
        grid.mark(a, 0.9);
        assert_eq!(grid.calculate_edge_risk(a, a, true, 0.2), 1.0);
        assert_eq!(grid.calculate_edge_risk(a, a, false, 0.2), 0.9);
    }
}
