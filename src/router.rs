//! Greedy sequential router: place one comb edge at a time by shortest
//! octilinear path, settling grid state as it goes, with exponential
//! local backtracking when the grid runs out of room.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, warn};

use crate::basegraph::BaseGraph;
use crate::combgraph::CombGraph;
use crate::dijkstra::{shortest_path, SOFT_INF};
use crate::drawing::Drawing;
use crate::error::LayoutError;
use crate::graph::NodeIdx;

/// Hard cap on backtracking rounds before giving up.
const MAX_RETRIES: usize = 64;
/// Largest number of committed edges undone in a single backtrack.
const MAX_BACKTRACK: usize = 8;

#[derive(Debug)]
struct Commit {
    ce: usize,
    /// Settled sink pairs, in path order.
    hops: Vec<(NodeIdx, NodeIdx)>,
}

pub struct Router<'a> {
    cg: &'a CombGraph,
    max_gr_dist: f64,
    settled: Vec<Option<NodeIdx>>,
    commit_count: Vec<usize>,
    commits: Vec<Commit>,
    rndr_order: usize,
}

impl<'a> Router<'a> {
    pub fn new(cg: &'a CombGraph, max_gr_dist: f64) -> Self {
        Self {
            cg,
            max_gr_dist,
            settled: vec![None; cg.nodes.len()],
            commit_count: vec![0; cg.nodes.len()],
            commits: Vec::new(),
            rndr_order: 0,
        }
    }

    /// Route the whole comb graph, returning a feasible drawing.
    pub fn route(mut self, bg: &mut dyn BaseGraph) -> Result<Drawing, LayoutError> {
        let mut drawing = Drawing::new();
        let mut queue: VecDeque<usize> = self.ordered_edges().into();
        let mut fails: BTreeMap<usize, u32> = BTreeMap::new();
        let mut retries = 0usize;

        while let Some(ce) = queue.pop_front() {
            if self.try_route(ce, bg, &mut drawing)? {
                continue;
            }

            retries += 1;
            if retries > MAX_RETRIES || self.commits.is_empty() {
                warn!(ce, retries, "routing failed, no room to backtrack");
                return Err(LayoutError::InfeasibleLayout);
            }

            let f = fails.entry(ce).or_insert(0);
            *f += 1;
            let k = (1usize << (*f - 1).min(8))
                .min(MAX_BACKTRACK)
                .min(self.commits.len());
            debug!(ce, k, retries, "backtracking");

            let mut undone = Vec::new();
            for _ in 0..k {
                let commit = self.commits.pop().unwrap();
                self.undo(&commit, bg, &mut drawing);
                undone.push(commit.ce);
            }
            // Retry the stuck edge first, the undone ones at the end.
            queue.push_front(ce);
            for e in undone {
                queue.push_back(e);
            }
        }

        self.place_isolated(bg, &mut drawing);
        self.verify(&drawing)?;
        Ok(drawing)
    }

    /// Tightness ordering: strongly constrained endpoints first, shorter
    /// edges first among those, comb edge id as the final tie-break.
    fn ordered_edges(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.cg.edges.len()).collect();
        order.sort_by(|&a, &b| {
            let ea = &self.cg.edges[a];
            let eb = &self.cg.edges[b];
            let deg_a = self.cg.nodes[ea.from].deg() + self.cg.nodes[ea.to].deg();
            let deg_b = self.cg.nodes[eb.from].deg() + self.cg.nodes[eb.to].deg();
            deg_b
                .cmp(&deg_a)
                .then_with(|| {
                    ea.geom
                        .length()
                        .partial_cmp(&eb.geom.length())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then(a.cmp(&b))
        });
        order
    }

    fn candidates(&self, cn: usize, bg: &dyn BaseGraph) -> Vec<NodeIdx> {
        if let Some(s) = self.settled[cn] {
            return vec![s];
        }
        let grid = bg.grid();
        let deg = self.cg.nodes[cn].deg();
        grid.candidate_sinks(self.cg.nodes[cn].pos, self.max_gr_dist)
            .into_iter()
            .filter(|&s| !grid.graph.nd(s).settled && grid.unused(s))
            .filter(|&s| grid.open_deg(s) >= deg)
            .collect()
    }

    fn try_route(
        &mut self,
        ce: usize,
        bg: &mut dyn BaseGraph,
        drawing: &mut Drawing,
    ) -> Result<bool, LayoutError> {
        let (u, v) = (self.cg.edges[ce].from, self.cg.edges[ce].to);
        if u == v {
            warn!(ce, "self-loop comb edge skipped");
            drawing.draw(ce, &[], bg.grid());
            return Ok(true);
        }

        let su = self.candidates(u, bg);
        let mut sv = self.candidates(v, bg);
        sv.retain(|s| !su.contains(s));
        if su.is_empty() || sv.is_empty() {
            debug!(ce, "no candidate sinks");
            return Ok(false);
        }

        // Open the candidate sinks, charging the node displacement.
        for &s in &su {
            let pen = if self.settled[u].is_some() {
                0.0
            } else {
                bg.grid().nd_move_pen(self.cg.nodes[u].pos, s)
            };
            bg.grid_mut().open_sink_fr(s, pen);
        }
        for &s in &sv {
            let pen = if self.settled[v].is_some() {
                0.0
            } else {
                bg.grid().nd_move_pen(self.cg.nodes[v].pos, s)
            };
            bg.grid_mut().open_sink_to(s, pen);
        }

        let grid = bg.grid();
        let hop = grid.costs.heur_hop_cost();
        let targets: Vec<(usize, usize)> = sv
            .iter()
            .map(|&s| (grid.graph.nd(s).x, grid.graph.nd(s).y))
            .collect();
        let heur = |n: NodeIdx| {
            let pl = grid.graph.nd(n);
            let steps = targets
                .iter()
                .map(|&(tx, ty)| bg.heur_steps(pl.x, pl.y, tx, ty))
                .min()
                .unwrap_or(0);
            hop * steps as f64
        };

        let sp = shortest_path(&grid.graph, &su, &sv, |e| grid.graph.edg(e).cost(), heur);

        // Close the candidates again; settled state is managed below.
        let close_su = su.clone();
        let close_sv = sv.clone();

        let result = match sp {
            Some(sp) if sp.cost < SOFT_INF => {
                drawing.draw(ce, &sp.edges, bg.grid());
                drawing.assign(u, sp.source, 0.0);
                drawing.assign(v, sp.sink, 0.0);

                let mut hops = Vec::new();
                {
                    let grid = bg.grid();
                    for &e in &sp.edges {
                        if grid.graph.edg(e).secondary {
                            continue;
                        }
                        let a = grid.graph.nd(grid.graph.from(e)).parent;
                        let b = grid.graph.nd(grid.graph.to(e)).parent;
                        hops.push((a, b));
                    }
                }
                self.rndr_order += 1;
                for &(a, b) in &hops {
                    bg.grid_mut().settle_edg(a, b, ce, self.rndr_order);
                }

                self.settled[u] = Some(sp.source);
                self.settled[v] = Some(sp.sink);
                bg.grid_mut().graph.nd_mut(sp.source).settled = true;
                bg.grid_mut().graph.nd_mut(sp.sink).settled = true;
                self.commit_count[u] += 1;
                self.commit_count[v] += 1;
                self.commits.push(Commit { ce, hops });
                debug!(ce, cost = drawing.score(), "edge routed");
                true
            }
            _ => false,
        };

        for s in close_su {
            bg.grid_mut().close_sink_fr(s);
        }
        for s in close_sv {
            bg.grid_mut().close_sink_to(s);
        }
        Ok(result)
    }

    fn undo(&mut self, commit: &Commit, bg: &mut dyn BaseGraph, drawing: &mut Drawing) {
        let (u, v) = (
            self.cg.edges[commit.ce].from,
            self.cg.edges[commit.ce].to,
        );
        self.commit_count[u] -= 1;
        self.commit_count[v] -= 1;
        for &cn in &[u, v] {
            if self.commit_count[cn] == 0 {
                if let Some(s) = self.settled[cn].take() {
                    bg.grid_mut().graph.nd_mut(s).settled = false;
                }
                drawing.unassign(cn);
            }
        }
        for &(a, b) in commit.hops.iter().rev() {
            bg.grid_mut().un_settle_edg(commit.ce, a, b);
        }
        drawing.erase(commit.ce);
    }

    /// Stations without edges are snapped to their nearest free sink.
    fn place_isolated(&mut self, bg: &mut dyn BaseGraph, drawing: &mut Drawing) {
        for cn in 0..self.cg.nodes.len() {
            if self.cg.nodes[cn].deg() > 0 || self.settled[cn].is_some() {
                continue;
            }
            let pos = self.cg.nodes[cn].pos;
            let cand = bg
                .grid()
                .candidate_sinks(pos, self.max_gr_dist)
                .into_iter()
                .find(|&s| !bg.grid().graph.nd(s).settled);
            if let Some(s) = cand {
                let pen = bg.grid().nd_move_pen(pos, s);
                drawing.assign(cn, s, pen);
                self.settled[cn] = Some(s);
                bg.grid_mut().graph.nd_mut(s).settled = true;
            }
        }
    }

    fn verify(&self, drawing: &Drawing) -> Result<(), LayoutError> {
        let mut seen = std::collections::BTreeSet::new();
        for (_, &sink) in drawing.assignments() {
            if !seen.insert(sink) {
                return Err(LayoutError::InfeasibleLayout);
            }
        }
        for ce in 0..self.cg.edges.len() {
            let (u, v) = (self.cg.edges[ce].from, self.cg.edges[ce].to);
            if u != v && drawing.path(ce).is_none() {
                return Err(LayoutError::InfeasibleLayout);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basegraph::{GridCosts, OctiGrid};
    use crate::geo::{BBox, Point, PolyLine};
    use crate::ir::{Line, LineEdge, LineGraph, LineNode};

    fn costs() -> GridCosts {
        GridCosts {
            horizontal_pen: 1.0,
            vertical_pen: 1.0,
            diagonal_pen: 1.5,
            bend: [0.0, 1.0, 1.5, 2.0],
        }
    }

    fn station(id: &str, x: f64, y: f64) -> LineNode {
        LineNode {
            id: id.into(),
            pos: Point::new(x, y),
            stops: Vec::new(),
            adjacent: Vec::new(),
        }
    }

    fn edge(id: &str, from: &str, to: &str) -> LineEdge {
        LineEdge {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            lines: vec![Line {
                id: "l1".into(),
                label: "1".into(),
                color: "#d00".into(),
            }],
            geom: PolyLine::new(),
        }
    }

    fn two_station_graph() -> CombGraph {
        let mut lg = LineGraph::new();
        lg.nodes.insert("a".into(), station("a", 0.0, 0.0));
        lg.nodes.insert("b".into(), station("b", 1000.0, 0.0));
        lg.edges.push(edge("e", "a", "b"));
        CombGraph::build(&lg).unwrap()
    }

    fn octi(extent: f64, cell: f64) -> OctiGrid {
        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(extent, extent),
        };
        let mut g = OctiGrid::new(bbox, cell, costs());
        g.init(&[]);
        g
    }

    #[test]
    fn single_horizontal_edge_costs_four_hops() {
        let cg = two_station_graph();
        let mut bg = octi(1000.0, 250.0);
        let drawing = Router::new(&cg, 3.0).route(&mut bg).unwrap();

        // Stations coincide with sinks: no move penalty, four unit hops.
        assert!((drawing.score() - 4.0).abs() < 1e-9);
        let path = drawing.path(0).unwrap();
        assert_eq!(path.len(), 4);
        // Drawn along direction 2 (east) on row 0.
        let grid = bg.grid();
        for &e in path {
            assert_eq!(grid.graph.nd(grid.graph.from(e)).y, 0);
        }
    }

    #[test]
    fn routing_twice_is_deterministic() {
        let cg = two_station_graph();
        let mut bg1 = octi(1000.0, 250.0);
        let mut bg2 = octi(1000.0, 250.0);
        let d1 = Router::new(&cg, 3.0).route(&mut bg1).unwrap();
        let d2 = Router::new(&cg, 3.0).route(&mut bg2).unwrap();
        assert_eq!(d1.paths(), d2.paths());
        assert_eq!(d1.assignments(), d2.assignments());
        assert_eq!(d1.score(), d2.score());
    }

    #[test]
    fn isolated_station_gets_nearest_sink() {
        let mut lg = LineGraph::new();
        lg.nodes.insert("solo".into(), station("solo", 510.0, 510.0));
        let cg = CombGraph::build(&lg).unwrap();
        let mut bg = octi(1000.0, 250.0);
        let drawing = Router::new(&cg, 3.0).route(&mut bg).unwrap();
        let sink = drawing.sink_of(0).unwrap();
        let pos = bg.grid().graph.nd(sink).pos;
        assert_eq!((pos.x, pos.y), (500.0, 500.0));
        assert!(drawing.paths().is_empty());
    }

    #[test]
    fn empty_graph_yields_empty_drawing() {
        let cg = CombGraph::build(&LineGraph::new()).unwrap();
        let mut bg = octi(500.0, 250.0);
        let drawing = Router::new(&cg, 3.0).route(&mut bg).unwrap();
        assert!(drawing.is_empty());
    }

    #[test]
    fn degree_filter_fails_fast() {
        // A five-way star whose hub sits in a 1×1 grid corner cannot hold
        // five departures.
        let mut lg = LineGraph::new();
        lg.nodes.insert("hub".into(), station("hub", 0.0, 0.0));
        for (i, (x, y)) in [(250.0, 0.0), (0.0, 250.0), (250.0, 250.0), (-250.0, 0.0), (0.0, -250.0)]
            .iter()
            .enumerate()
        {
            let id = format!("s{i}");
            lg.nodes.insert(id.clone(), station(&id, *x, *y));
            lg.edges.push(edge(&format!("e{i}"), "hub", &id));
        }
        lg.nodes.get_mut("hub").unwrap().adjacent =
            vec!["e1".into(), "e2".into(), "e0".into(), "e4".into(), "e3".into()];
        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(250.0, 250.0),
        };
        let mut bg = OctiGrid::new(bbox, 250.0, costs());
        bg.init(&[]);
        let cg = CombGraph::build(&lg).unwrap();
        let res = Router::new(&cg, 1.5).route(&mut bg);
        assert!(matches!(res, Err(LayoutError::InfeasibleLayout)));
    }

    #[test]
    fn right_angle_bend_when_diagonals_are_expensive() {
        let mut lg = LineGraph::new();
        lg.nodes.insert("a".into(), station("a", 0.0, 0.0));
        lg.nodes.insert("b".into(), station("b", 500.0, 500.0));
        lg.edges.push(edge("e", "a", "b"));
        let cg = CombGraph::build(&lg).unwrap();

        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(500.0, 500.0),
        };
        let mut bg = OctiGrid::new(
            bbox,
            250.0,
            GridCosts {
                horizontal_pen: 1.0,
                vertical_pen: 1.0,
                diagonal_pen: 5.0,
                bend: [0.0, 1.0, 1.5, 2.0],
            },
        );
        bg.init(&[]);
        let drawing = Router::new(&cg, 3.0).route(&mut bg).unwrap();
        // Two axial legs and one 90° bend beat two expensive diagonals.
        assert!((drawing.score() - (2.0 + 2.0 + 1.5)).abs() < 1e-9);
        assert_eq!(drawing.path(0).unwrap().len(), 4);
    }
}
