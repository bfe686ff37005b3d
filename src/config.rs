//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/default.toml
//!
//! Every section and field is optional; anything left out keeps its default.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::aggregate::WeightTable;
use crate::cache::CacheParams;
use crate::factors::FactorParams;
use crate::graph::GraphParams;
use crate::planner::FallbackParams;
use crate::reroute::RerouteThresholds;
use crate::scorer::{FetchBudget, RouteParams, ScorerSettings};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 3000 }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// JSON snapshot of upstream signals. Empty world when absent.
    pub snapshot_path: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { snapshot_path: Some("data/sample_snapshot.json".to_string()) }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
    pub scoring: FactorParams,
    pub weights: WeightTable,
    pub routing: RouteParams,
    pub reroute: RerouteThresholds,
    pub timeouts: FetchBudget,
    pub cache: CacheParams,
    pub graph: GraphParams,
    pub fallback: FallbackParams,
    #[serde(skip)]
    config_file: Option<String>,
}

impl Config {
    /// Determine config file path from an explicit argument or environment
    pub fn resolve_config_path(explicit: Option<&str>) -> String {
        if let Some(path) = explicit {
            return path.to_string();
        }
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }
        DEFAULT_CONFIG_PATH.to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_file = Some(path.display().to_string());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.weights.validate_for_scoring()?;
        config.routing.segmentation.validate()?;
        Ok(config)
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn config_file(&self) -> &str {
        self.config_file.as_deref().unwrap_or("default")
    }

    pub fn scorer_settings(&self) -> ScorerSettings {
        ScorerSettings {
            factors: self.scoring.clone(),
            weights: self.weights,
            routing: self.routing.clone(),
            reroute: self.reroute.clone(),
            budget: self.timeouts.clone(),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
