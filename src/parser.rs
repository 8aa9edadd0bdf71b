//! GeoJSON input: the network arrives as a FeatureCollection of Point
//! features (stations) and LineString features (edges carrying lines).

use serde::Deserialize;

use crate::error::LayoutError;
use crate::geo::{Point, PolyLine};
use crate::ir::{Line, LineEdge, LineGraph, LineNode, Stop};

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    #[serde(default)]
    properties: Props,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Point { coordinates: [f64; 2] },
    LineString { coordinates: Vec<[f64; 2]> },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Props {
    id: Option<String>,
    from: Option<String>,
    to: Option<String>,
    lines: Vec<LineProp>,
    stops: Vec<StopProp>,
    /// Incident edge ids in clockwise angular order (stations only).
    adjacent: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LineProp {
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    color: String,
}

#[derive(Debug, Deserialize)]
struct StopProp {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    pos: Option<[f64; 2]>,
}

/// Parse a GeoJSON FeatureCollection into a line graph. Point features
/// become stations, LineString features become edges.
pub fn parse_line_graph(input: &str) -> Result<LineGraph, LayoutError> {
    let fc: FeatureCollection = serde_json::from_str(input)
        .map_err(|e| LayoutError::InvalidInput(format!("bad GeoJSON: {e}")))?;
    if fc.kind != "FeatureCollection" {
        return Err(LayoutError::InvalidInput(format!(
            "expected FeatureCollection, got {}",
            fc.kind
        )));
    }

    let mut lg = LineGraph::new();
    let mut edge_features = Vec::new();

    for feature in fc.features {
        match feature.geometry {
            Geometry::Point { coordinates } => {
                let id = feature
                    .properties
                    .id
                    .ok_or_else(|| LayoutError::InvalidInput("station without id".into()))?;
                if lg.nodes.contains_key(&id) {
                    return Err(LayoutError::InvalidInput(format!(
                        "duplicate station id '{id}'"
                    )));
                }
                let pos = Point::new(coordinates[0], coordinates[1]);
                let stops = feature
                    .properties
                    .stops
                    .into_iter()
                    .map(|s| Stop {
                        id: s.id,
                        name: s.name,
                        pos: s.pos.map(|p| Point::new(p[0], p[1])).unwrap_or(pos),
                    })
                    .collect();
                let adjacent = feature.properties.adjacent;
                lg.nodes.insert(
                    id.clone(),
                    LineNode {
                        id,
                        pos,
                        stops,
                        adjacent,
                    },
                );
            }
            Geometry::LineString { coordinates } => {
                edge_features.push((feature.properties, coordinates));
            }
        }
    }

    for (idx, (props, coordinates)) in edge_features.into_iter().enumerate() {
        let from = props
            .from
            .ok_or_else(|| LayoutError::InvalidInput("edge without 'from'".into()))?;
        let to = props
            .to
            .ok_or_else(|| LayoutError::InvalidInput("edge without 'to'".into()))?;
        for end in [&from, &to] {
            if !lg.nodes.contains_key(end.as_str()) {
                return Err(LayoutError::InvalidInput(format!(
                    "edge references unknown station '{end}'"
                )));
            }
        }
        let id = props.id.unwrap_or_else(|| format!("edge-{idx}"));
        let lines = props
            .lines
            .into_iter()
            .map(|l| Line {
                id: l.id,
                label: l.label,
                color: l.color,
            })
            .collect();
        let geom = PolyLine::from_points(
            coordinates
                .into_iter()
                .map(|c| Point::new(c[0], c[1]))
                .collect(),
        );
        lg.edges.push(LineEdge {
            id,
            from,
            to,
            lines,
            geom,
        });
    }

    // Declared clockwise orderings may only name edges that actually
    // touch the station.
    for node in lg.nodes.values() {
        for edge_id in &node.adjacent {
            let incident = lg
                .edges
                .iter()
                .any(|e| e.id == *edge_id && (e.from == node.id || e.to == node.id));
            if !incident {
                return Err(LayoutError::InvalidInput(format!(
                    "station '{}' lists unknown adjacent edge '{}'",
                    node.id, edge_id
                )));
            }
        }
    }

    Ok(lg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [0, 0]},
             "properties": {"id": "a", "stops": [{"id": "s1", "name": "Alpha"}]}},
            {"type": "Feature",
             "geometry": {"type": "Point", "coordinates": [1000, 0]},
             "properties": {"id": "b"}},
            {"type": "Feature",
             "geometry": {"type": "LineString", "coordinates": [[0, 0], [1000, 0]]},
             "properties": {"id": "e1", "from": "a", "to": "b",
                            "lines": [{"id": "l1", "label": "1", "color": "#e00"}]}}
        ]
    }"##;

    #[test]
    fn parses_stations_and_edges() {
        let lg = parse_line_graph(SAMPLE).unwrap();
        assert_eq!(lg.nodes.len(), 2);
        assert_eq!(lg.edges.len(), 1);
        assert_eq!(lg.edges[0].from, "a");
        assert_eq!(lg.edges[0].lines[0].label, "1");
        assert_eq!(lg.nodes["a"].stops[0].name, "Alpha");
        assert_eq!(lg.edges[0].geom.length(), 1000.0);
    }

    #[test]
    fn adjacency_order_is_read_verbatim() {
        let input = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0,0]},
             "properties": {"id": "x", "adjacent": ["e2", "e1"]}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [100,0]},
             "properties": {"id": "a"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0,100]},
             "properties": {"id": "b"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0,0],[100,0]]},
             "properties": {"id": "e1", "from": "x", "to": "a"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0,0],[0,100]]},
             "properties": {"id": "e2", "from": "x", "to": "b"}}
        ]}"#;
        let lg = parse_line_graph(input).unwrap();
        assert_eq!(lg.nodes["x"].adjacent, vec!["e2", "e1"]);
    }

    #[test]
    fn adjacency_naming_foreign_edge_is_rejected() {
        let input = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0,0]},
             "properties": {"id": "x", "adjacent": ["ghost"]}}
        ]}"#;
        assert!(matches!(
            parse_line_graph(input),
            Err(LayoutError::InvalidInput(_))
        ));
    }

    #[test]
    fn duplicate_station_is_rejected() {
        let input = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0,0]},
             "properties": {"id": "a"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1,1]},
             "properties": {"id": "a"}}
        ]}"#;
        assert!(matches!(
            parse_line_graph(input),
            Err(LayoutError::InvalidInput(_))
        ));
    }

    #[test]
    fn unknown_endpoint_is_rejected() {
        let input = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0,0]},
             "properties": {"id": "a"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]},
             "properties": {"from": "a", "to": "ghost"}}
        ]}"#;
        assert!(matches!(
            parse_line_graph(input),
            Err(LayoutError::InvalidInput(_))
        ));
    }

    #[test]
    fn station_without_position_is_impossible_by_schema() {
        // A Point feature always carries coordinates; a missing geometry
        // type fails the tagged-enum parse.
        let input = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Polygon", "coordinates": []},
             "properties": {"id": "a"}}
        ]}"#;
        assert!(matches!(
            parse_line_graph(input),
            Err(LayoutError::InvalidInput(_))
        ));
    }
}
