use std::collections::HashMap;
use petgraph::algo::astar;
use petgraph::graph::{Graph, NodeIndex};
use osmpbf::{ElementReader, Element};
use serde::{Deserialize, Serialize};
use tracing::info;
use crate::geometry::haversine;
use crate::safety::RiskGrid;
use crate::types::{GeoPoint, RouteCandidate};

#[derive(Debug, Clone, Copy)]
pub struct GeoNode {
    pub lat: f64,
    pub lon: f64,
}

impl GeoNode {
    fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WalkEdge {
    pub distance_meters: f64,
    pub risk: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphParams {
    /// OSM extract to route over. Without it only straight-line candidates exist.
    pub osm_pbf_path: Option<String>,
    /// Safety preferences tried per request (0.0 = fastest).
    pub alphas: Vec<f64>,
    pub base_risk: f32,
    pub unlit_penalty: f32,
    pub h3_resolution: u8,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            osm_pbf_path: None,
            alphas: vec![0.0, 1.0, 3.0, 5.0],
            base_risk: 0.1,
            unlit_penalty: 0.2,
            h3_resolution: 9,
        }
    }
}

/// Whether a way with these tags can be walked.
pub fn is_walkable(tags: &HashMap<&str, &str>) -> bool {
    let highway = tags.get("highway").copied().unwrap_or("");
    let foot = tags.get("foot").copied().unwrap_or("");
    let sidewalk = tags.get("sidewalk").copied().unwrap_or("");

    let is_walkable_type = matches!(highway,
        "footway" | "path" | "steps" | "pedestrian" | "living_street" |
        "residential" | "tertiary" | "service" | "unclassified"
    );

    let is_motor_road = matches!(highway, "motorway" | "trunk" | "primary" | "secondary");
    let foot_allowed = matches!(foot, "yes" | "designated" | "permissive");
    let has_sidewalk = matches!(sidewalk, "both" | "left" | "right" | "yes" | "separate");

    is_walkable_type || (is_motor_road && (foot_allowed || has_sidewalk))
}

pub struct NavigationGraph {
    pub graph: Graph<GeoNode, WalkEdge>,
}

impl Default for NavigationGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationGraph {
    pub fn new() -> Self {
        Self { graph: Graph::new() }
    }

    pub fn from_pbf(path: &str, risk_grid: &RiskGrid, unlit_penalty: f32) -> anyhow::Result<Self> {
        info!(path = %path, "osm_parse_started");

        let mut nav = Self::new();
        let mut osm_id_map = HashMap::new();
        let mut temp_nodes = HashMap::new();

        // PASS 1: Nodes
        let reader = ElementReader::from_path(path)?;
        let mut node_count = 0;

        reader.for_each(|element| {
            match element {
                Element::Node(node) => {
                    temp_nodes.insert(node.id(), (node.lat(), node.lon()));
                    node_count += 1;
                }
                Element::DenseNode(node) => {
                    temp_nodes.insert(node.id(), (node.lat(), node.lon()));
                    node_count += 1;
                }
                _ => {}
            }
        })?;

        info!(nodes = node_count, "osm_nodes_loaded");

        // PASS 2: Ways
        let reader_pass2 = ElementReader::from_path(path)?;
        reader_pass2.for_each(|element| {
            if let Element::Way(way) = element {
                let tags: HashMap<&str, &str> = way.tags().collect();
                if !is_walkable(&tags) {
                    return;
                }
                let unlit = tags.get("lit").copied() == Some("no");

                let refs: Vec<i64> = way.refs().collect();
                for window in refs.windows(2) {
                    let id_a = window[0];
                    let id_b = window[1];

                    if let (Some(&(lat_a, lon_a)), Some(&(lat_b, lon_b))) = (temp_nodes.get(&id_a), temp_nodes.get(&id_b)) {
                        let idx_a = *osm_id_map.entry(id_a).or_insert_with(|| nav.add_node(GeoPoint::new(lat_a, lon_a)));
                        let idx_b = *osm_id_map.entry(id_b).or_insert_with(|| nav.add_node(GeoPoint::new(lat_b, lon_b)));

                        let a = GeoPoint::new(lat_a, lon_a);
                        let b = GeoPoint::new(lat_b, lon_b);
                        let risk = risk_grid.calculate_edge_risk(a, b, unlit, unlit_penalty);
                        nav.connect(idx_a, idx_b, risk);
                    }
                }
            }
        })?;

        info!(nodes = nav.graph.node_count(), edges = nav.graph.edge_count(), "graph_built");
        Ok(nav)
    }

    pub fn add_node(&mut self, point: GeoPoint) -> NodeIndex {
        self.graph.add_node(GeoNode { lat: point.latitude, lon: point.longitude })
    }

    /// Adds a walkable segment in both directions.
    pub fn connect(&mut self, a: NodeIndex, b: NodeIndex, risk: f32) {
        let dist = haversine(self.graph[a].point(), self.graph[b].point());
        let edge_data = WalkEdge { distance_meters: dist, risk };
        self.graph.add_edge(a, b, edge_data);
        self.graph.add_edge(b, a, edge_data);
    }

    pub fn find_nearest_node(&self, point: GeoPoint) -> Option<NodeIndex> {
        self.graph.node_indices()
            .min_by(|&a, &b| {
                let da = haversine(self.graph[a].point(), point);
                let db = haversine(self.graph[b].point(), point);
                da.total_cmp(&db)
            })
    }

    /// Weighted A*: cost is `distance * (1 + alpha * risk)`, so a high alpha
    /// makes dangerous edges expensive.
    pub fn shortest_path(&self, start: NodeIndex, end: NodeIndex, alpha: f64) -> Option<Vec<NodeIndex>> {
        let g = &self.graph;
        let dest = g[end].point();
        astar(
            g,
            start,
            |finish| finish == end,
            |e| {
                let edge = e.weight();
                edge.distance_meters * (1.0 + alpha * edge.risk as f64)
            },
            |n| haversine(g[n].point(), dest),
        )
        .map(|(_cost, nodes)| nodes)
    }

    /// One candidate per distinct path found across `alphas`.
    pub fn candidate_routes(&self, origin: GeoPoint, destination: GeoPoint, alphas: &[f64]) -> Vec<RouteCandidate> {
        let (Some(start), Some(end)) = (self.find_nearest_node(origin), self.find_nearest_node(destination)) else {
            return Vec::new();
        };

        let mut seen: Vec<Vec<NodeIndex>> = Vec::new();
        let mut candidates = Vec::new();

        for &alpha in alphas {
            let Some(nodes) = self.shortest_path(start, end, alpha) else {
                continue;
            };
            if seen.contains(&nodes) {
                continue;
            }

            let mut waypoints = vec![origin];
            waypoints.extend(nodes.iter().map(|&n| self.graph[n].point()));
            waypoints.push(destination);
            waypoints.dedup();
            if waypoints.len() < 2 {
                waypoints = vec![origin, destination];
            }

            if let Ok(candidate) = RouteCandidate::from_path(format!("alpha-{alpha}"), waypoints) {
                candidates.push(candidate);
            }
            seen.push(nodes);
        }
        candidates
    }
}
