//! Distances, path segmentation and the graph-free fallback paths.

use geo::prelude::*;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::types::GeoPoint;

/// Roughly 100m in degrees at mid latitudes.
pub const DEFAULT_DETOUR_OFFSET_DEG: f64 = 0.001;

/// Shortest fixed-distance chunk; finer requests are clamped up to it.
pub const MIN_SEGMENT_M: f64 = 1.0;

const METERS_PER_DEGREE_LAT: f64 = 111_320.0;

/// Great-circle distance in meters.
pub fn haversine(a: GeoPoint, b: GeoPoint) -> f64 {
    a.to_point().haversine_distance(&b.to_point())
}

pub fn path_length(path: &[GeoPoint]) -> f64 {
    path.iter().tuple_windows().map(|(&a, &b)| haversine(a, b)).sum()
}

/// Linear interpolation in coordinate space. Adequate at street scale.
pub fn interpolate(a: GeoPoint, b: GeoPoint, fraction: f64) -> GeoPoint {
    GeoPoint::new(
        a.latitude + (b.latitude - a.latitude) * fraction,
        a.longitude + (b.longitude - a.longitude) * fraction,
    )
}

pub fn midpoint(a: GeoPoint, b: GeoPoint) -> GeoPoint {
    interpolate(a, b, 0.5)
}

/// True if `point` is within `radius_m` of any point of `path`.
pub fn near_path(point: GeoPoint, path: &[GeoPoint], radius_m: f64) -> bool {
    path.iter().any(|&p| haversine(p, point) <= radius_m)
}

/// Degree offsets covering a radius around `center`, for index queries.
pub fn degree_extent(center: GeoPoint, radius_m: f64) -> (f64, f64) {
    let d_lat = radius_m / METERS_PER_DEGREE_LAT;
    let cos_lat = center.latitude.to_radians().cos().abs().max(0.01);
    let d_lon = (radius_m / (METERS_PER_DEGREE_LAT * cos_lat)).min(360.0);
    (d_lat, d_lon)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Segmentation {
    /// One segment per consecutive waypoint pair.
    #[default]
    Waypoints,
    /// Cut the path every `meters` along its length.
    FixedDistance { meters: f64 },
}

impl Segmentation {
    pub fn validate(&self) -> Result<(), ScoringError> {
        match *self {
            Segmentation::FixedDistance { meters } if !(meters.is_finite() && meters >= MIN_SEGMENT_M) => {
                Err(ScoringError::invalid(format!(
                    "segment length must be at least {MIN_SEGMENT_M} m, got {meters}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A stretch of route between two points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub distance_m: f64,
}

impl Segment {
    fn new(start: GeoPoint, end: GeoPoint) -> Self {
        Self { start, end, distance_m: haversine(start, end) }
    }

    pub fn midpoint(&self) -> GeoPoint {
        midpoint(self.start, self.end)
    }
}

pub fn segment_path(path: &[GeoPoint], segmentation: Segmentation) -> Vec<Segment> {
    match segmentation {
        Segmentation::Waypoints => path
            .iter()
            .tuple_windows()
            .map(|(&a, &b)| Segment::new(a, b))
            .collect(),
        Segmentation::FixedDistance { meters } if meters.is_finite() && meters > 0.0 => {
            fixed_distance_segments(path, meters.max(MIN_SEGMENT_M))
        }
        Segmentation::FixedDistance { .. } => segment_path(path, Segmentation::Waypoints),
    }
}

fn fixed_distance_segments(path: &[GeoPoint], chunk_m: f64) -> Vec<Segment> {
    let mut segments = Vec::new();
    let Some(&first) = path.first() else {
        return segments;
    };

    let mut chunk_start = first;
    let mut carried = 0.0;

    for (&a, &b) in path.iter().tuple_windows() {
        let leg = haversine(a, b);
        if leg == 0.0 {
            continue;
        }
        let mut consumed = 0.0;
        while carried + (leg - consumed) >= chunk_m {
            consumed += chunk_m - carried;
            let cut = interpolate(a, b, consumed / leg);
            segments.push(Segment::new(chunk_start, cut));
            chunk_start = cut;
            carried = 0.0;
        }
        carried += leg - consumed;
    }

    // Keep the tail unless it is a floating-point sliver.
    if let Some(&last) = path.last() {
        if carried > 1e-6 || segments.is_empty() {
            segments.push(Segment::new(chunk_start, last));
        }
    }
    segments
}

/// Straight-line path with `steps` equal legs.
pub fn direct_path(start: GeoPoint, end: GeoPoint, steps: usize) -> Vec<GeoPoint> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|i| interpolate(start, end, i as f64 / steps as f64))
        .collect()
}

/// Reroutes around `path[pivot]` by offsetting it and joining two direct paths.
pub fn detour_path(path: &[GeoPoint], pivot: usize, offset_deg: f64, steps: usize) -> Vec<GeoPoint> {
    let (Some(&start), Some(&end), Some(&around)) = (path.first(), path.last(), path.get(pivot)) else {
        return path.to_vec();
    };
    let via = GeoPoint::new(around.latitude + offset_deg, around.longitude + offset_deg);

    let mut detour = direct_path(start, via, steps);
    detour.extend(direct_path(via, end, steps).into_iter().skip(1));
    detour
}
