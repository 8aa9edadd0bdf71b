//! GeoJSON output: the drawn line graph, and an optional dump of the
//! grid graph for inspection.

use serde::Serialize;

use crate::basegraph::NodeGrid;
use crate::ir::LineGraph;

#[derive(Debug, Serialize)]
struct FeatureCollectionOut {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<FeatureOut>,
}

#[derive(Debug, Serialize)]
struct FeatureOut {
    #[serde(rename = "type")]
    kind: &'static str,
    geometry: GeometryOut,
    properties: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum GeometryOut {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
}

#[derive(Debug, Serialize)]
struct LineOut<'a> {
    id: &'a str,
    label: &'a str,
    color: &'a str,
}

/// Serialize a line graph as a GeoJSON FeatureCollection: one Point per
/// station, one LineString per rendered sub-edge.
pub fn write_line_graph(lg: &LineGraph) -> String {
    let mut features = Vec::new();

    for node in lg.nodes.values() {
        let stops: Vec<serde_json::Value> = node
            .stops
            .iter()
            .map(|s| {
                serde_json::json!({
                    "id": s.id,
                    "name": s.name,
                    "pos": [s.pos.x, s.pos.y],
                })
            })
            .collect();
        features.push(FeatureOut {
            kind: "Feature",
            geometry: GeometryOut::Point {
                coordinates: [node.pos.x, node.pos.y],
            },
            properties: serde_json::json!({
                "id": node.id,
                "stops": stops,
                "adjacent": node.adjacent,
            }),
        });
    }

    for edge in &lg.edges {
        let lines: Vec<LineOut> = edge
            .lines
            .iter()
            .map(|l| LineOut {
                id: &l.id,
                label: &l.label,
                color: &l.color,
            })
            .collect();
        features.push(FeatureOut {
            kind: "Feature",
            geometry: GeometryOut::LineString {
                coordinates: edge.geom.points().iter().map(|p| [p.x, p.y]).collect(),
            },
            properties: serde_json::json!({
                "id": edge.id,
                "from": edge.from,
                "to": edge.to,
                "lines": serde_json::to_value(lines).unwrap_or_default(),
            }),
        });
    }

    let fc = FeatureCollectionOut {
        kind: "FeatureCollection",
        features,
    };
    serde_json::to_string_pretty(&fc).expect("GeoJSON serialization cannot fail")
}

/// Dump the grid graph (sinks and primary edges) as GeoJSON.
pub fn write_grid(grid: &NodeGrid) -> String {
    let mut features = Vec::new();

    for &s in &grid.sinks {
        let pl = grid.graph.nd(s);
        features.push(FeatureOut {
            kind: "Feature",
            geometry: GeometryOut::Point {
                coordinates: [pl.pos.x, pl.pos.y],
            },
            properties: serde_json::json!({
                "id": pl.id,
                "cell": [pl.x, pl.y],
                "settled": pl.settled,
            }),
        });
    }

    for e in grid.graph.edgs() {
        let pl = grid.graph.edg(e);
        if pl.secondary {
            continue;
        }
        let from = grid.graph.nd(grid.graph.from(e));
        let to = grid.graph.nd(grid.graph.to(e));
        features.push(FeatureOut {
            kind: "Feature",
            geometry: GeometryOut::LineString {
                coordinates: vec![[from.pos.x, from.pos.y], [to.pos.x, to.pos.y]],
            },
            properties: serde_json::json!({
                "id": pl.id,
                "cost": pl.raw_cost(),
                "reserved": pl.res_edgs.len(),
                "order": pl.rndr_order,
            }),
        });
    }

    let fc = FeatureCollectionOut {
        kind: "FeatureCollection",
        features,
    };
    serde_json::to_string_pretty(&fc).expect("GeoJSON serialization cannot fail")
}
