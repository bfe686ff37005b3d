//! In-memory snapshot of upstream signals, spatially indexed.
//!
//! Loaded from a JSON document so the service can run (and be tested) against
//! a fixed, reproducible view of the world.

use std::fs;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::FetchError;
use crate::geometry::{degree_extent, haversine};
use crate::source::SafetyDataSource;
use crate::types::{GeoPoint, Incident, Infrastructure, InfrastructureKind, TrafficSample, Weather};

const CROWD_WINDOW_MINUTES: i64 = 15;
const TRAFFIC_WINDOW_MINUTES: i64 = 15;
const TRAFFIC_RADIUS_M: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrowdPing {
    pub location: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub location: GeoPoint,
    #[serde(flatten)]
    pub weather: Weather,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub infrastructure: Vec<Infrastructure>,
    pub incidents: Vec<Incident>,
    pub crowd: Vec<CrowdPing>,
    pub traffic: Vec<TrafficSample>,
    pub weather: Vec<WeatherReading>,
}

fn distance_to(center: GeoPoint, entry: &GeomWithData<[f64; 2], usize>) -> f64 {
    let [lon, lat] = *entry.geom();
    haversine(center, GeoPoint::new(lat, lon))
}

/// R-tree over `[lon, lat]` keys pointing into `items`.
struct SpatialIndex<T> {
    tree: RTree<GeomWithData<[f64; 2], usize>>,
    items: Vec<T>,
}

impl<T> SpatialIndex<T> {
    fn build(items: Vec<T>, location: impl Fn(&T) -> GeoPoint) -> Self {
        let entries = items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let p = location(item);
                GeomWithData::new([p.longitude, p.latitude], idx)
            })
            .collect();
        Self { tree: RTree::bulk_load(entries), items }
    }

    fn within(&self, center: GeoPoint, radius_m: f64) -> impl Iterator<Item = &T> + '_ {
        self.entries_within(center, radius_m).map(|(_, idx)| &self.items[idx])
    }

    /// `(distance_m, item index)` for every entry within `radius_m`.
    fn entries_within(&self, center: GeoPoint, radius_m: f64) -> impl Iterator<Item = (f64, usize)> + '_ {
        // Degree-space circle covering the metric radius; haversine trims it
        let (d_lat, d_lon) = degree_extent(center, radius_m);
        let reach = d_lat.max(d_lon) * 1.01;
        self.tree
            .locate_within_distance([center.longitude, center.latitude], reach * reach)
            .map(move |entry| (distance_to(center, entry), entry.data))
            .filter(move |(d, _)| *d <= radius_m)
    }

    fn nearest(&self, center: GeoPoint) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        let query = [center.longitude, center.latitude];

        // Widen a degree-space window until it holds an entry. Degree distance
        // is not ground distance, so the closest hit only bounds the answer.
        let mut reach: f64 = 0.01;
        let bound = loop {
            let hit = self
                .tree
                .locate_within_distance(query, reach * reach)
                .map(|entry| distance_to(center, entry))
                .min_by(f64::total_cmp);
            match hit {
                Some(d) => break d,
                None if reach > 360.0 => return None,
                None => reach *= 4.0,
            }
        };

        self.entries_within(center, bound)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, idx)| &self.items[idx])
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

pub struct SnapshotStore {
    infrastructure: SpatialIndex<Infrastructure>,
    incidents: SpatialIndex<Incident>,
    crowd: SpatialIndex<CrowdPing>,
    traffic: SpatialIndex<TrafficSample>,
    weather: SpatialIndex<WeatherReading>,
}

impl SnapshotStore {
    pub fn new(snapshot: Snapshot) -> Self {
        let store = Self {
            infrastructure: SpatialIndex::build(snapshot.infrastructure, |i| i.location),
            incidents: SpatialIndex::build(snapshot.incidents, |i| i.location),
            crowd: SpatialIndex::build(snapshot.crowd, |c| c.location),
            traffic: SpatialIndex::build(snapshot.traffic, |t| t.location),
            weather: SpatialIndex::build(snapshot.weather, |w| w.location),
        };
        info!(
            infrastructure = store.infrastructure.len(),
            incidents = store.incidents.len(),
            crowd = store.crowd.len(),
            traffic = store.traffic.len(),
            weather = store.weather.len(),
            "snapshot_loaded"
        );
        store
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
        Ok(Self::new(snapshot))
    }

    pub fn empty() -> Self {
        Self::new(Snapshot::default())
    }

    /// All incidents, for building the routing risk grid.
    pub fn incidents(&self) -> &[Incident] {
        &self.incidents.items
    }
}

fn check_radius(radius_m: f64) -> Result<(), FetchError> {
    if radius_m.is_finite() && radius_m >= 0.0 {
        Ok(())
    } else {
        Err(FetchError::Malformed(format!("radius {radius_m} is not a valid distance")))
    }
}

#[async_trait]
impl SafetyDataSource for SnapshotStore {
    async fn nearby_infrastructure(
        &self,
        location: GeoPoint,
        radius_m: f64,
        kinds: &[InfrastructureKind],
    ) -> Result<Vec<Infrastructure>, FetchError> {
        check_radius(radius_m)?;
        Ok(self
            .infrastructure
            .within(location, radius_m)
            .filter(|i| kinds.contains(&i.kind))
            .copied()
            .collect())
    }

    async fn recent_incidents(
        &self,
        location: GeoPoint,
        radius_m: f64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Incident>, FetchError> {
        check_radius(radius_m)?;
        Ok(self
            .incidents
            .within(location, radius_m)
            .filter(|i| i.created_at >= since)
            .copied()
            .collect())
    }

    async fn crowd_density(
        &self,
        location: GeoPoint,
        radius_m: f64,
        as_of: DateTime<Utc>,
    ) -> Result<f64, FetchError> {
        check_radius(radius_m)?;
        let from = as_of - Duration::minutes(CROWD_WINDOW_MINUTES);
        let count = self
            .crowd
            .within(location, radius_m)
            .filter(|ping| ping.updated_at >= from && ping.updated_at <= as_of)
            .count();
        Ok(count as f64)
    }

    async fn traffic_snapshot(
        &self,
        location: GeoPoint,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<TrafficSample>, FetchError> {
        let from = as_of - Duration::minutes(TRAFFIC_WINDOW_MINUTES);
        Ok(self
            .traffic
            .within(location, TRAFFIC_RADIUS_M)
            .filter(|sample| sample.timestamp >= from && sample.timestamp <= as_of)
            .copied()
            .collect())
    }

    async fn weather(&self, location: GeoPoint) -> Result<Weather, FetchError> {
        Ok(self.weather.nearest(location).map(|r| r.weather).unwrap_or_default())
    }
}
