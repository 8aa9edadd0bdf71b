use std::collections::BTreeMap;

use crate::geo::{BBox, Point, PolyLine};

/// A transit line running over edges of the network.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Line {
    pub id: String,
    pub label: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub pos: Point,
}

/// A station (or intersection) of the input network.
#[derive(Debug, Clone)]
pub struct LineNode {
    pub id: String,
    pub pos: Point,
    pub stops: Vec<Stop>,
    /// Incident edge ids in clockwise angular order, as declared by the
    /// input. The drawing must preserve this cyclic order.
    pub adjacent: Vec<String>,
}

/// An undirected network edge carrying a set of lines. Stored once; the
/// direction is the `from` → `to` orientation of its geometry.
#[derive(Debug, Clone)]
pub struct LineEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub lines: Vec<Line>,
    pub geom: PolyLine,
}

#[derive(Debug, Clone, Default)]
pub struct LineGraph {
    pub nodes: BTreeMap<String, LineNode>,
    pub edges: Vec<LineEdge>,
}

impl LineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bbox(&self) -> BBox {
        let mut bbox = BBox::empty();
        for node in self.nodes.values() {
            bbox.extend(node.pos);
        }
        bbox
    }

    pub fn node_deg(&self, id: &str) -> usize {
        self.edges
            .iter()
            .filter(|e| e.from == id || e.to == id)
            .count()
    }

    /// Indices of edges incident to `id`, in insertion order.
    pub fn incident(&self, id: &str) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.from == id || e.to == id)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_spans_all_nodes() {
        let mut g = LineGraph::new();
        g.nodes.insert(
            "a".into(),
            LineNode {
                id: "a".into(),
                pos: Point::new(-10.0, 5.0),
                stops: Vec::new(),
                adjacent: Vec::new(),
            },
        );
        g.nodes.insert(
            "b".into(),
            LineNode {
                id: "b".into(),
                pos: Point::new(20.0, -3.0),
                stops: Vec::new(),
                adjacent: Vec::new(),
            },
        );
        let bbox = g.bbox();
        assert_eq!(bbox.lower_left, Point::new(-10.0, -3.0));
        assert_eq!(bbox.upper_right, Point::new(20.0, 5.0));
    }
}
