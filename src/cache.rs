//! Short-lived cache in front of a [`SafetyDataSource`].
//!
//! Only slow-moving signals are cached (infrastructure and weather); incidents,
//! crowd and traffic always pass through. Keys snap the location to an h3 cell
//! so nearby queries share an entry. Infrastructure entries hold everything
//! reachable from anywhere in the cell and are trimmed to the caller's exact
//! radius on every read, so a hit returns what the inner source would.
//! Weather is resolved at the cell centre.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use h3o::{CellIndex, LatLng, Resolution};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::geometry::haversine;
use crate::source::SafetyDataSource;
use crate::types::{GeoPoint, Incident, Infrastructure, InfrastructureKind, TrafficSample, Weather};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheParams {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub h3_resolution: u8,
}

impl Default for CacheParams {
    fn default() -> Self {
        Self { enabled: true, ttl_secs: 300, h3_resolution: 9 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InfrastructureKey {
    cell: CellIndex,
    radius_m: u64,
    kinds: Vec<InfrastructureKind>,
}

struct TtlMap<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlMap<K, V> {
    fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        let ttl = self.ttl;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value));
    }
}

pub struct CachedSource<S> {
    inner: S,
    resolution: Resolution,
    infrastructure: TtlMap<InfrastructureKey, Vec<Infrastructure>>,
    weather: TtlMap<CellIndex, Weather>,
}

impl<S: SafetyDataSource> CachedSource<S> {
    pub fn new(inner: S, params: &CacheParams) -> Self {
        let resolution = Resolution::try_from(params.h3_resolution).unwrap_or_else(|_| {
            warn!(resolution = params.h3_resolution, "invalid_h3_resolution_using_nine");
            Resolution::Nine
        });
        let ttl = Duration::from_secs(params.ttl_secs);
        Self {
            inner,
            resolution,
            infrastructure: TtlMap::new(ttl),
            weather: TtlMap::new(ttl),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn cell(&self, location: GeoPoint) -> Option<CellIndex> {
        LatLng::new(location.latitude, location.longitude)
            .ok()
            .map(|ll| ll.to_cell(self.resolution))
    }
}

fn cell_center(cell: CellIndex) -> GeoPoint {
    let center = LatLng::from(cell);
    GeoPoint::new(center.lat(), center.lng())
}

/// Upper bound on the distance from the cell centre to any point in the cell.
fn cell_reach_m(cell: CellIndex) -> f64 {
    let center = cell_center(cell);
    let farthest = cell
        .boundary()
        .iter()
        .map(|vertex| haversine(center, GeoPoint::new(vertex.lat(), vertex.lng())))
        .fold(0.0, f64::max);
    farthest * 1.01 + 1.0
}

#[async_trait]
impl<S: SafetyDataSource> SafetyDataSource for CachedSource<S> {
    async fn nearby_infrastructure(
        &self,
        location: GeoPoint,
        radius_m: f64,
        kinds: &[InfrastructureKind],
    ) -> Result<Vec<Infrastructure>, FetchError> {
        let cell = match self.cell(location) {
            Some(cell) if radius_m.is_finite() && radius_m >= 0.0 => cell,
            _ => return self.inner.nearby_infrastructure(location, radius_m, kinds).await,
        };
        let mut sorted = kinds.to_vec();
        sorted.sort();
        sorted.dedup();
        let key_radius = radius_m.ceil();
        let key = InfrastructureKey { cell, radius_m: key_radius as u64, kinds: sorted };

        let superset = match self.infrastructure.get(&key) {
            Some(hit) => {
                debug!(cell = %cell, "infrastructure_cache_hit");
                hit
            }
            None => {
                let fetched = self
                    .inner
                    .nearby_infrastructure(cell_center(cell), key_radius + cell_reach_m(cell), kinds)
                    .await?;
                self.infrastructure.insert(key, fetched.clone());
                fetched
            }
        };

        Ok(superset
            .into_iter()
            .filter(|item| haversine(location, item.location) <= radius_m)
            .collect())
    }

    async fn recent_incidents(
        &self,
        location: GeoPoint,
        radius_m: f64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Incident>, FetchError> {
        self.inner.recent_incidents(location, radius_m, since).await
    }

    async fn crowd_density(
        &self,
        location: GeoPoint,
        radius_m: f64,
        as_of: DateTime<Utc>,
    ) -> Result<f64, FetchError> {
        self.inner.crowd_density(location, radius_m, as_of).await
    }

    async fn traffic_snapshot(
        &self,
        location: GeoPoint,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<TrafficSample>, FetchError> {
        self.inner.traffic_snapshot(location, as_of).await
    }

    async fn weather(&self, location: GeoPoint) -> Result<Weather, FetchError> {
        let Some(cell) = self.cell(location) else {
            return self.inner.weather(location).await;
        };
        if let Some(hit) = self.weather.get(&cell) {
            return Ok(hit);
        }
        let fetched = self.inner.weather(cell_center(cell)).await?;
        self.weather.insert(cell, fetched);
        Ok(fetched)
    }
}
