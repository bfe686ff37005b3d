//! Contracts for the upstream signal sources the scorer reads from.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::types::{GeoPoint, Incident, Infrastructure, InfrastructureKind, TrafficSample, Weather};

/// Read-only access to the signals behind a safety score.
///
/// Implementations may be hit concurrently and must not assume exclusive
/// access to the underlying store; each call is an "as of now" read.
#[async_trait]
pub trait SafetyDataSource: Send + Sync {
    async fn nearby_infrastructure(
        &self,
        location: GeoPoint,
        radius_m: f64,
        kinds: &[InfrastructureKind],
    ) -> Result<Vec<Infrastructure>, FetchError>;

    async fn recent_incidents(
        &self,
        location: GeoPoint,
        radius_m: f64,
        since: DateTime<Utc>,
    ) -> Result<Vec<Incident>, FetchError>;

    /// Headcount within `radius_m` as of `as_of`.
    async fn crowd_density(
        &self,
        location: GeoPoint,
        radius_m: f64,
        as_of: DateTime<Utc>,
    ) -> Result<f64, FetchError>;

    /// Congestion samples near `location` from the window ending at `as_of`.
    async fn traffic_snapshot(
        &self,
        location: GeoPoint,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<TrafficSample>, FetchError>;

    async fn weather(&self, location: GeoPoint) -> Result<Weather, FetchError>;
}
