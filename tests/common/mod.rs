#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use safewalk::source::SafetyDataSource;
use safewalk::types::{
    GeoPoint, Incident, Infrastructure, InfrastructureKind, InfrastructureStatus, TrafficSample, Weather,
};
use safewalk::FetchError;

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

pub fn late_night() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap()
}

pub fn light(location: GeoPoint, status: InfrastructureStatus) -> Infrastructure {
    Infrastructure { location, kind: InfrastructureKind::Streetlight, status }
}

pub fn incident(location: GeoPoint, severity: u8, created_at: DateTime<Utc>) -> Incident {
    Incident { location, severity, created_at }
}

/// Which fetch misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    FailIncidents,
    StallCrowd,
    FailTraffic,
}

/// Serves the same signals for every location, ignoring radius and time.
#[derive(Default)]
pub struct FixedSource {
    pub infrastructure: Vec<Infrastructure>,
    pub incidents: Vec<Incident>,
    pub headcount: f64,
    pub congestion: Option<f64>,
    pub weather: Weather,
    pub faults: Vec<Fault>,
    pub calls: AtomicUsize,
}

impl FixedSource {
    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }

    fn has(&self, fault: Fault) -> bool {
        self.faults.contains(&fault)
    }
}

#[async_trait]
impl SafetyDataSource for FixedSource {
    async fn nearby_infrastructure(
        &self,
        _location: GeoPoint,
        _radius_m: f64,
        kinds: &[InfrastructureKind],
    ) -> Result<Vec<Infrastructure>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.infrastructure.iter().filter(|i| kinds.contains(&i.kind)).copied().collect())
    }

    async fn recent_incidents(
        &self,
        _location: GeoPoint,
        _radius_m: f64,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Incident>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.has(Fault::FailIncidents) {
            return Err(FetchError::Unavailable("incident feed down".to_string()));
        }
        Ok(self.incidents.clone())
    }

    async fn crowd_density(
        &self,
        _location: GeoPoint,
        _radius_m: f64,
        _as_of: DateTime<Utc>,
    ) -> Result<f64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.has(Fault::StallCrowd) {
            std::future::pending::<()>().await;
        }
        Ok(self.headcount)
    }

    async fn traffic_snapshot(
        &self,
        location: GeoPoint,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<TrafficSample>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.has(Fault::FailTraffic) {
            return Err(FetchError::Unavailable("traffic feed down".to_string()));
        }
        Ok(self
            .congestion
            .map(|congestion_level| TrafficSample {
                location,
                congestion_level,
                timestamp: noon() - Duration::minutes(1),
            })
            .into_iter()
            .collect())
    }

    async fn weather(&self, _location: GeoPoint) -> Result<Weather, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.weather)
    }
}
