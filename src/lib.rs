//! Route safety scoring.
//!
//! Module structure:
//! - `types` / `error` - value types and error taxonomy
//! - `factors` / `aggregate` - normalization and weighted blending
//! - `source` / `store` / `cache` - upstream signal contracts and implementations
//! - `scorer` / `reroute` - location and route scoring, ranking, reroute checks
//! - `safety` / `graph` / `planner` - candidate route generation
//! - `api` / `config` - HTTP surface and TOML configuration

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod factors;
pub mod geometry;
pub mod graph;
pub mod planner;
pub mod reroute;
pub mod safety;
pub mod scorer;
pub mod source;
pub mod store;
pub mod types;

pub use error::{FetchError, ScoringError};
pub use scorer::{RouteSafetyScorer, ScorerSettings};
pub use source::SafetyDataSource;
pub use types::{GeoPoint, RouteCandidate, SafetyScore, ScoredRoute};
