//! A drawing maps comb nodes to grid sinks and comb edges to chains of
//! primary grid edges, and renders those chains back into a line graph.

use std::collections::BTreeMap;

use crate::basegraph::NodeGrid;
use crate::combgraph::CombGraph;
use crate::geo::{dist, BezierCurve, PolyLine};
use crate::graph::{EdgeIdx, NodeIdx};
use crate::ir::LineGraph;

/// Samples used when rounding a port transition with a Bézier curve.
const BEZIER_SAMPLES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct Drawing {
    nds: BTreeMap<usize, NodeIdx>,
    edgs: BTreeMap<usize, Vec<EdgeIdx>>,
    edg_costs: BTreeMap<usize, f64>,
    cost: f64,
}

impl Drawing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(&self) -> f64 {
        self.cost
    }

    pub fn sink_of(&self, cn: usize) -> Option<NodeIdx> {
        self.nds.get(&cn).copied()
    }

    pub fn assignments(&self) -> &BTreeMap<usize, NodeIdx> {
        &self.nds
    }

    pub fn path(&self, ce: usize) -> Option<&[EdgeIdx]> {
        self.edgs.get(&ce).map(|v| v.as_slice())
    }

    pub fn paths(&self) -> &BTreeMap<usize, Vec<EdgeIdx>> {
        &self.edgs
    }

    /// Assign comb node `cn` to a sink; `pen` is charged when the
    /// assignment is not already paid for by an entry edge.
    pub fn assign(&mut self, cn: usize, sink: NodeIdx, pen: f64) {
        self.nds.insert(cn, sink);
        self.cost += pen;
    }

    pub fn unassign(&mut self, cn: usize) {
        self.nds.remove(&cn);
    }

    /// Record a routed path for `ce`. Every traversed edge contributes its
    /// cost (entry edges carry the node-move penalty at route time);
    /// only primary edges are stored.
    pub fn draw(&mut self, ce: usize, path: &[EdgeIdx], grid: &NodeGrid) {
        let mut primary = Vec::new();
        let mut path_cost = 0.0;
        for &e in path {
            path_cost += grid.graph.edg(e).raw_cost();
            if !grid.graph.edg(e).secondary {
                primary.push(e);
            }
        }
        self.cost += path_cost;
        self.edg_costs.insert(ce, path_cost);
        self.edgs.insert(ce, primary);
    }

    /// Remove a drawn path again (backtracking).
    pub fn erase(&mut self, ce: usize) {
        if let Some(c) = self.edg_costs.remove(&ce) {
            self.cost -= c;
        }
        self.edgs.remove(&ce);
    }

    /// Drop all state, keeping the drawing reusable.
    pub fn crumble(&mut self) {
        self.nds.clear();
        self.edgs.clear();
        self.edg_costs.clear();
        self.cost = 0.0;
    }

    pub fn is_empty(&self) -> bool {
        self.nds.is_empty() && self.edgs.is_empty()
    }

    /// Render the stored chain of `ce` into a polyline, smoothing port
    /// transitions with a cubic Bézier through the sink centre.
    pub fn build_polyline(&self, ce: usize, grid: &NodeGrid) -> PolyLine {
        let mut pl = PolyLine::new();
        let Some(path) = self.edgs.get(&ce) else {
            return pl;
        };
        for &e in path {
            let from = grid.graph.from(e);
            let to = grid.graph.to(e);
            let from_pos = grid.graph.nd(from).pos;
            let from_sink = grid.graph.nd(grid.graph.nd(from).parent).pos;
            match pl.last() {
                Some(last) if dist(last, from_pos) > 0.0 => {
                    let bc = BezierCurve::new(last, from_sink, from_sink, from_pos);
                    for &p in bc.render(BEZIER_SAMPLES).points() {
                        pl.push(p);
                    }
                }
                Some(_) => {}
                None => pl.push(from_sink),
            }
            pl.push(from_pos);
            pl.push(grid.graph.nd(to).pos);
        }
        if let Some(&last) = path.last() {
            let end = grid.graph.to(last);
            pl.push(grid.graph.nd(grid.graph.nd(end).parent).pos);
        }
        pl
    }

    /// Emit the final line graph: each comb edge's polyline is split into
    /// one equal-length piece per child edge, stations land on their sink
    /// positions.
    pub fn to_line_graph(&self, cg: &CombGraph, lg: &LineGraph, grid: &NodeGrid) -> LineGraph {
        let mut out = LineGraph::new();

        for (&cn, &sink) in &self.nds {
            let station = &cg.nodes[cn];
            if let Some(orig) = lg.nodes.get(&station.id) {
                let mut node = orig.clone();
                node.pos = grid.graph.nd(sink).pos;
                out.nodes.insert(node.id.clone(), node);
            }
        }

        for (&ce, _) in &self.edgs {
            let poly = self.build_polyline(ce, grid);
            let d = poly.length();
            if d <= 0.0 {
                continue;
            }
            let comb = &cg.edges[ce];
            let tot = comb.children.len().max(1);
            let step = d / tot as f64;

            let mut pre = cg.nodes[comb.from].id.clone();
            for (i, child) in comb.children.iter().enumerate() {
                let le = &lg.edges[child.line_edge];
                let mut seg = poly.segment(step * i as f64 / d, step * (i + 1) as f64 / d);

                // Stored geometry always runs le.from → le.to; flip the
                // sampled piece when the walk traverses the child backwards.
                if le.from == pre {
                    pre = le.to.clone();
                } else {
                    seg.reverse();
                    pre = le.from.clone();
                }

                for (id, pos) in [(&le.from, seg.first()), (&le.to, seg.last())] {
                    if !out.nodes.contains_key(id.as_str()) {
                        let mut node = lg.nodes[id.as_str()].clone();
                        if let Some(p) = pos {
                            node.pos = p;
                        }
                        out.nodes.insert(node.id.clone(), node);
                    }
                }

                let mut new_edge = le.clone();
                new_edge.geom = seg;
                out.edges.push(new_edge);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basegraph::{BaseGraph, GridCosts, OctiGrid};
    use crate::geo::{BBox, Point};

    fn grid() -> OctiGrid {
        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(200.0, 200.0),
        };
        let mut g = OctiGrid::new(
            bbox,
            100.0,
            GridCosts {
                horizontal_pen: 1.0,
                vertical_pen: 1.0,
                diagonal_pen: 1.5,
                bend: [0.0, 1.0, 1.5, 2.0],
            },
        );
        g.init(&[]);
        g
    }

    #[test]
    fn draw_accumulates_and_erase_restores() {
        let g = grid();
        let grid = g.grid();
        let a = grid.node_at(0, 0).unwrap();
        let b = grid.node_at(1, 0).unwrap();
        let e = grid.get_n_edg(a, b).unwrap();

        let mut d = Drawing::new();
        d.draw(7, &[e], grid);
        assert_eq!(d.path(7).unwrap(), &[e]);
        assert_eq!(d.score(), 1.0);
        d.erase(7);
        assert!(d.path(7).is_none());
        assert_eq!(d.score(), 0.0);
    }

    #[test]
    fn polyline_follows_straight_chain() {
        let g = grid();
        let grid = g.grid();
        let a = grid.node_at(0, 0).unwrap();
        let b = grid.node_at(1, 0).unwrap();
        let c = grid.node_at(2, 0).unwrap();
        let e1 = grid.get_n_edg(a, b).unwrap();
        let e2 = grid.get_n_edg(b, c).unwrap();

        let mut d = Drawing::new();
        d.draw(0, &[e1, e2], grid);
        let pl = d.build_polyline(0, grid);
        assert_eq!(pl.first(), Some(Point::new(0.0, 0.0)));
        assert_eq!(pl.last(), Some(Point::new(200.0, 0.0)));
        // A straight chain stays on the row.
        for p in pl.points() {
            assert!(p.y.abs() < 1e-9);
        }
    }

    #[test]
    fn crumble_clears_everything() {
        let g = grid();
        let grid = g.grid();
        let a = grid.node_at(0, 0).unwrap();
        let b = grid.node_at(1, 0).unwrap();
        let e = grid.get_n_edg(a, b).unwrap();
        let mut d = Drawing::new();
        d.assign(0, a, 0.0);
        d.draw(0, &[e], grid);
        d.crumble();
        assert!(d.is_empty());
        assert_eq!(d.score(), 0.0);
    }
}
