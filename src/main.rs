use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use h3o::Resolution;
use safewalk::api::{AppState, router};
use safewalk::cache::CachedSource;
use safewalk::config::Config;
use safewalk::graph::NavigationGraph;
use safewalk::planner::RoutePlanner;
use safewalk::safety::RiskGrid;
use safewalk::source::SafetyDataSource;
use safewalk::store::SnapshotStore;
use safewalk::RouteSafetyScorer;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Route safety scoring API
#[derive(Parser, Debug)]
#[command(name = "safewalk", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_tracing(json: bool) {
    // RUST_LOG overrides; info by default
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config.as_deref());

    // Read before logging is up so the format can come from the file
    let (config, load_error) = match Config::from_file(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    init_tracing(config.logging.json);
    if let Some(e) = load_error {
        warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
    }

    info!(
        config_file = %config.config_file(),
        listen = %config.listen_addr(),
        snapshot = ?config.data.snapshot_path,
        osm_pbf = ?config.graph.osm_pbf_path,
        cache_enabled = config.cache.enabled,
        "config_loaded"
    );

    // 1. Load the signal snapshot
    let store = match &config.data.snapshot_path {
        Some(path) => SnapshotStore::from_json_file(path)?,
        None => SnapshotStore::empty(),
    };

    // 2. Risk grid for graph edges, from the same incidents the scorer sees
    let resolution = Resolution::try_from(config.graph.h3_resolution)
        .with_context(|| format!("invalid h3 resolution {}", config.graph.h3_resolution))?;
    let risk_grid = RiskGrid::from_incidents(
        store.incidents(),
        chrono::Utc::now(),
        &config.scoring,
        resolution,
        config.graph.base_risk,
    );
    info!(cells = risk_grid.len(), "risk_grid_built");

    // 3. Optional OSM walking graph
    let graph = match &config.graph.osm_pbf_path {
        Some(path) => Some(
            NavigationGraph::from_pbf(path, &risk_grid, config.graph.unlit_penalty)
                .with_context(|| format!("Failed to load PBF file {path}"))?,
        ),
        None => {
            warn!("no_osm_graph_configured_using_straight_line_candidates");
            None
        }
    };

    let source: Arc<dyn SafetyDataSource> = if config.cache.enabled {
        Arc::new(CachedSource::new(store, &config.cache))
    } else {
        Arc::new(store)
    };

    let shared_state = Arc::new(AppState {
        scorer: RouteSafetyScorer::new(source, config.scorer_settings()),
        planner: RoutePlanner::new(graph, config.graph.alphas.clone(), config.fallback.clone()),
    });

    let app = router(shared_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %config.listen_addr(), "api_server_listening");
    axum::serve(listener, app).await?;

    Ok(())
}
