//! Grid graphs for octilinear drawing. A grid node is either a sink (a
//! cell a station may occupy) or one of its ports (auxiliary nodes, one
//! per direction). Sink↔port entry edges and port↔port bend edges are
//! "secondary"; port↔port edges between two sinks are "primary" and carry
//! the axial costs.

mod hanan;
mod octi;
mod ortho;

pub use hanan::OctiHananGrid;
pub use octi::OctiGrid;
pub use ortho::OrthoGrid;

use std::collections::{BTreeMap, BTreeSet};

use crate::dijkstra::SOFT_INF;
use crate::geo::{dist, BBox, Point};
use crate::graph::{EdgeIdx, Graph, NodeIdx};

/// Extra penalty per grid cell of node displacement, on top of the
/// worst-case single-hop saving.
const MOVE_PEN: f64 = 0.5;

/// Two pairs of twin diagonal edges whose segments cross.
pub type CrossEdgPair = ((EdgeIdx, EdgeIdx), (EdgeIdx, EdgeIdx));

/// Per-(comb-edge, grid-edge) extra objective coefficients, keyed by comb
/// edge index and indexed by grid edge id.
pub type GeoPensMap = BTreeMap<usize, Vec<f64>>;

#[derive(Debug, Clone)]
pub struct GridCosts {
    pub horizontal_pen: f64,
    pub vertical_pen: f64,
    pub diagonal_pen: f64,
    /// Bend penalty by turn severity: 180°, 135°, 90°, 45°.
    pub bend: [f64; 4],
}

impl GridCosts {
    /// The cheapest possible per-hop cost, used as the A* heuristic rate.
    pub fn heur_hop_cost(&self) -> f64 {
        self.horizontal_pen
            .min(self.vertical_pen)
            .min(self.diagonal_pen)
    }
}

#[derive(Debug, Clone)]
pub struct GridNodePl {
    pub id: usize,
    pub pos: Point,
    pub x: usize,
    pub y: usize,
    pub sink: bool,
    pub settled: bool,
    /// Owning sink for ports; self for sinks.
    pub parent: NodeIdx,
    /// Direction index of this port at its parent; unused for sinks.
    pub port_dir: usize,
    /// Port nodes by direction; sinks only. Pruned directions are `None`.
    pub ports: [Option<NodeIdx>; 8],
    /// Neighbouring sink by direction; sinks only.
    pub neighs: [Option<NodeIdx>; 8],
}

#[derive(Debug, Clone)]
pub struct GridEdgePl {
    pub id: usize,
    cost: f64,
    pub secondary: bool,
    pub closed: bool,
    pub blocked: bool,
    pub rndr_order: usize,
    pub res_edgs: BTreeSet<usize>,
}

impl GridEdgePl {
    fn new(id: usize, cost: f64, secondary: bool, closed: bool) -> Self {
        Self {
            id,
            cost,
            secondary,
            closed,
            blocked: false,
            rndr_order: 0,
            res_edgs: BTreeSet::new(),
        }
    }

    /// Cost as seen by the router: reserved, closed or blocked edges are
    /// unusable.
    pub fn cost(&self) -> f64 {
        if self.closed || self.blocked || !self.res_edgs.is_empty() {
            SOFT_INF
        } else {
            self.cost
        }
    }

    /// The stored cost, regardless of open/closed state.
    pub fn raw_cost(&self) -> f64 {
        self.cost
    }

    pub fn set_cost(&mut self, cost: f64) {
        self.cost = cost;
    }

    pub fn open(&mut self) {
        self.closed = false;
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn block(&mut self) {
        self.blocked = true;
    }

    pub fn unblock(&mut self) {
        self.blocked = false;
    }
}

/// Offset of direction `i` in cell units, for a grid with `max_deg`
/// directions. Direction 0 points up; indices increase clockwise.
pub fn dir_delta(max_deg: usize, i: usize) -> (i64, i64) {
    match max_deg {
        4 => [(0, 1), (1, 0), (0, -1), (-1, 0)][i],
        _ => [
            (0, 1),
            (1, 1),
            (1, 0),
            (1, -1),
            (0, -1),
            (-1, -1),
            (-1, 0),
            (-1, 1),
        ][i],
    }
}

/// Turn-severity index for a pass through ports `i` and `j`: 0 is straight
/// (opposite ports), 3 the sharpest 45° turn. Scaled so orthogonal grids
/// index the same table.
pub fn port_ang(max_deg: usize, i: usize, j: usize) -> usize {
    let half = max_deg / 2;
    let d = (i as i64 - j as i64).rem_euclid(max_deg as i64) as usize;
    let d = d.min(max_deg - d);
    (half - d) * (8 / max_deg)
}

/// Shared sink-and-port lattice owned by every grid variant.
#[derive(Debug, Clone)]
pub struct NodeGrid {
    pub graph: Graph<GridNodePl, GridEdgePl>,
    pub costs: GridCosts,
    pub cell_size: f64,
    pub spacer: f64,
    pub bbox: BBox,
    pub width: usize,
    pub height: usize,
    pub max_deg: usize,
    /// Sink lookup: `x * height + y` → sink slot + 1, 0 when absent.
    nd_idx: Vec<u32>,
    pub sinks: Vec<NodeIdx>,
    /// For each diagonal primary edge, the crossing twin pairs.
    pub edge_pairs: BTreeMap<EdgeIdx, Vec<(EdgeIdx, EdgeIdx)>>,
}

impl NodeGrid {
    pub fn new(bbox: BBox, cell_size: f64, costs: GridCosts, max_deg: usize) -> Self {
        let width = (bbox.width() / cell_size).floor() as usize + 1;
        let height = (bbox.height() / cell_size).floor() as usize + 1;
        Self {
            graph: Graph::new(),
            costs,
            cell_size,
            spacer: cell_size / 10.0,
            bbox,
            width,
            height,
            max_deg,
            nd_idx: vec![0; width * height],
            sinks: Vec::new(),
            edge_pairs: BTreeMap::new(),
        }
    }

    pub fn cell_x(&self, px: f64) -> usize {
        let c = ((px - self.bbox.lower_left.x) / self.cell_size).floor();
        (c.max(0.0) as usize).min(self.width - 1)
    }

    pub fn cell_y(&self, py: f64) -> usize {
        let c = ((py - self.bbox.lower_left.y) / self.cell_size).floor();
        (c.max(0.0) as usize).min(self.height - 1)
    }

    pub fn node_at(&self, x: usize, y: usize) -> Option<NodeIdx> {
        let slot = self.nd_idx[x * self.height + y];
        if slot == 0 {
            None
        } else {
            Some(self.sinks[slot as usize - 1])
        }
    }

    /// Neighbouring sink of `(x, y)` in direction `i`.
    pub fn neigh(&self, x: usize, y: usize, i: usize) -> Option<NodeIdx> {
        let n = self.node_at(x, y)?;
        self.graph.nd(n).neighs[i]
    }

    /// Create a sink at cell `(x, y)` together with its ports, entry edges
    /// (infinite, closed) and bend edges.
    pub fn write_nd(&mut self, x: usize, y: usize) -> NodeIdx {
        let pos = Point::new(
            self.bbox.lower_left.x + x as f64 * self.cell_size,
            self.bbox.lower_left.y + y as f64 * self.cell_size,
        );
        let id = self.graph.nd_slots();
        let n = self.graph.add_nd(GridNodePl {
            id,
            pos,
            x,
            y,
            sink: true,
            settled: false,
            parent: NodeIdx(id as u32),
            port_dir: 0,
            ports: [None; 8],
            neighs: [None; 8],
        });
        self.nd_idx[x * self.height + y] = self.sinks.len() as u32 + 1;
        self.sinks.push(n);

        for i in 0..self.max_deg {
            let (dx, dy) = dir_delta(self.max_deg, i);
            let pid = self.graph.nd_slots();
            let port = self.graph.add_nd(GridNodePl {
                id: pid,
                pos: Point::new(
                    pos.x + dx as f64 * self.spacer,
                    pos.y + dy as f64 * self.spacer,
                ),
                x,
                y,
                sink: false,
                settled: false,
                parent: n,
                port_dir: i,
                ports: [None; 8],
                neighs: [None; 8],
            });
            self.graph.nd_mut(n).ports[i] = Some(port);

            let eid = self.graph.edg_slots();
            self.graph
                .add_edg(n, port, GridEdgePl::new(eid, SOFT_INF, true, true));
            let eid = self.graph.edg_slots();
            self.graph
                .add_edg(port, n, GridEdgePl::new(eid, SOFT_INF, true, true));
        }

        for i in 0..self.max_deg {
            for j in i + 1..self.max_deg {
                let pen = self.costs.bend[port_ang(self.max_deg, i, j)];
                let pi = self.graph.nd(n).ports[i].unwrap();
                let pj = self.graph.nd(n).ports[j].unwrap();
                let eid = self.graph.edg_slots();
                self.graph
                    .add_edg(pi, pj, GridEdgePl::new(eid, pen, true, false));
                let eid = self.graph.edg_slots();
                self.graph
                    .add_edg(pj, pi, GridEdgePl::new(eid, pen, true, false));
            }
        }

        n
    }

    /// Connect two sinks with twin primary edges through their facing
    /// ports, direction `p` as seen from `fr`.
    pub fn connect_nodes(&mut self, fr: NodeIdx, to: NodeIdx, p: usize) {
        if fr == to {
            return;
        }
        let opp = (p + self.max_deg / 2) % self.max_deg;
        let pfr = self.graph.nd(fr).ports[p];
        let pto = self.graph.nd(to).ports[opp];
        let (Some(pfr), Some(pto)) = (pfr, pto) else {
            return;
        };
        let eid = self.graph.edg_slots();
        self.graph
            .add_edg(pfr, pto, GridEdgePl::new(eid, 9.0, false, false));
        let eid = self.graph.edg_slots();
        self.graph
            .add_edg(pto, pfr, GridEdgePl::new(eid, 9.0, false, false));
        self.graph.nd_mut(fr).neighs[p] = Some(to);
        self.graph.nd_mut(to).neighs[opp] = Some(fr);
    }

    /// The direction index whose offset best matches the vector `a` → `b`.
    pub fn get_dir(&self, a: NodeIdx, b: NodeIdx) -> usize {
        let pa = self.graph.nd(a);
        let pb = self.graph.nd(b);
        let sx = (pb.x as i64 - pa.x as i64).signum();
        let sy = (pb.y as i64 - pa.y as i64).signum();
        for i in 0..self.max_deg {
            if dir_delta(self.max_deg, i) == (sx, sy) {
                return i;
            }
        }
        0
    }

    /// The primary grid edge leading from sink `a` to sink `b`, through
    /// their facing ports.
    pub fn get_n_edg(&self, a: NodeIdx, b: NodeIdx) -> Option<EdgeIdx> {
        let dir = self.get_dir(a, b);
        let opp = (dir + self.max_deg / 2) % self.max_deg;
        let pa = self.graph.nd(a).ports[dir]?;
        let pb = self.graph.nd(b).ports[opp]?;
        self.graph.get_edg(pa, pb)
    }

    pub fn get_bend_pen(&self, i: usize, j: usize) -> f64 {
        self.costs.bend[port_ang(self.max_deg, i, j)]
    }

    /// Reopen all bend edges of `n` at their stored penalty, making the
    /// sink passable again.
    pub fn open_turns(&mut self, n: NodeIdx) {
        let ports = self.graph.nd(n).ports;
        for i in 0..self.max_deg {
            let Some(pi) = ports[i] else { continue };
            for j in i + 1..self.max_deg {
                let Some(pj) = ports[j] else { continue };
                let pen = self.get_bend_pen(i, j);
                if let Some(e) = self.graph.get_edg(pi, pj) {
                    self.graph.edg_mut(e).set_cost(pen);
                    self.graph.edg_mut(e).open();
                }
                if let Some(e) = self.graph.get_edg(pj, pi) {
                    self.graph.edg_mut(e).set_cost(pen);
                    self.graph.edg_mut(e).open();
                }
            }
        }
    }

    /// Close every bend edge of `n`: paths may end at this sink but no
    /// longer pass through it. Entry edges are left to the sink open/close
    /// bookkeeping.
    pub fn close_turns(&mut self, n: NodeIdx) {
        let ports = self.graph.nd(n).ports;
        for i in 0..self.max_deg {
            let Some(pi) = ports[i] else { continue };
            for j in 0..self.max_deg {
                if i == j {
                    continue;
                }
                let Some(pj) = ports[j] else { continue };
                if let Some(e) = self.graph.get_edg(pi, pj) {
                    self.graph.edg_mut(e).close();
                }
            }
        }
    }

    /// Open the sink → port entry edges of `n` at cost `pen`.
    pub fn open_sink_fr(&mut self, n: NodeIdx, pen: f64) {
        let ports = self.graph.nd(n).ports;
        for port in ports.iter().flatten() {
            if let Some(e) = self.graph.get_edg(n, *port) {
                self.graph.edg_mut(e).set_cost(pen);
                self.graph.edg_mut(e).open();
            }
        }
    }

    /// Open the port → sink entry edges of `n` at cost `pen`.
    pub fn open_sink_to(&mut self, n: NodeIdx, pen: f64) {
        let ports = self.graph.nd(n).ports;
        for port in ports.iter().flatten() {
            if let Some(e) = self.graph.get_edg(*port, n) {
                self.graph.edg_mut(e).set_cost(pen);
                self.graph.edg_mut(e).open();
            }
        }
    }

    pub fn close_sink_fr(&mut self, n: NodeIdx) {
        let ports = self.graph.nd(n).ports;
        for port in ports.iter().flatten() {
            if let Some(e) = self.graph.get_edg(n, *port) {
                self.graph.edg_mut(e).set_cost(SOFT_INF);
                self.graph.edg_mut(e).close();
            }
        }
    }

    pub fn close_sink_to(&mut self, n: NodeIdx) {
        let ports = self.graph.nd(n).ports;
        for port in ports.iter().flatten() {
            if let Some(e) = self.graph.get_edg(*port, n) {
                self.graph.edg_mut(e).set_cost(SOFT_INF);
                self.graph.edg_mut(e).close();
            }
        }
    }

    /// True when no primary edge incident to any port of `n` is reserved.
    pub fn unused(&self, n: NodeIdx) -> bool {
        let ports = self.graph.nd(n).ports;
        for port in ports.iter().flatten() {
            for e in self.graph.adj_all(*port) {
                let pl = self.graph.edg(e);
                if !pl.secondary && !pl.res_edgs.is_empty() {
                    return false;
                }
            }
        }
        true
    }

    /// Number of directions still usable for a new path at `n`.
    pub fn open_deg(&self, n: NodeIdx) -> usize {
        let pl = self.graph.nd(n);
        let mut deg = 0;
        for i in 0..self.max_deg {
            let (Some(port), Some(_)) = (pl.ports[i], pl.neighs[i]) else {
                continue;
            };
            let open = self.graph.adj_out(port).iter().any(|&e| {
                let epl = self.graph.edg(e);
                !epl.secondary && epl.cost() < SOFT_INF
            });
            if open {
                deg += 1;
            }
        }
        deg
    }

    /// Reserve the twin edges between sinks `a` and `b` for comb edge
    /// `ce`, closing both endpoints and blocking crossed diagonals.
    pub fn settle_edg(&mut self, a: NodeIdx, b: NodeIdx, ce: usize, rndr_order: usize) {
        if a == b {
            return;
        }
        let ge = self.get_n_edg(a, b).expect("settle on unconnected sinks");
        let gf = self.get_n_edg(b, a).expect("settle on unconnected sinks");

        self.graph.edg_mut(ge).res_edgs.insert(ce);
        self.graph.edg_mut(gf).res_edgs.insert(ce);
        self.graph.edg_mut(ge).rndr_order = rndr_order;

        self.close_turns(a);
        self.close_turns(b);

        if self.get_dir(a, b) % 2 != 0 {
            if let Some(pairs) = self.edge_pairs.get(&ge).cloned() {
                for (p, q) in pairs {
                    self.graph.edg_mut(p).block();
                    self.graph.edg_mut(q).block();
                }
            }
        }
    }

    /// Undo `settle_edg`: release the reservation, reopen turns at
    /// endpoints that are neither settled nor otherwise used, and unblock
    /// crossed diagonals.
    pub fn un_settle_edg(&mut self, ce: usize, a: NodeIdx, b: NodeIdx) {
        if a == b {
            return;
        }
        let ge = self.get_n_edg(a, b).expect("unsettle on unconnected sinks");
        let gf = self.get_n_edg(b, a).expect("unsettle on unconnected sinks");

        self.graph.edg_mut(ge).res_edgs.remove(&ce);
        self.graph.edg_mut(gf).res_edgs.remove(&ce);

        if self.graph.edg(ge).res_edgs.is_empty() {
            self.graph.edg_mut(ge).rndr_order = 0;
            if !self.graph.nd(a).settled && self.unused(a) {
                self.open_turns(a);
            }
            if !self.graph.nd(b).settled && self.unused(b) {
                self.open_turns(b);
            }

            if self.get_dir(a, b) % 2 != 0 {
                if let Some(pairs) = self.edge_pairs.get(&ge).cloned() {
                    for (p, q) in pairs {
                        self.graph.edg_mut(p).unblock();
                        self.graph.edg_mut(q).unblock();
                    }
                }
            }
        }
    }

    /// Penalty for snapping a station at `pos` to sink `grd`. At least the
    /// worst-case saving of one grid hop per cell moved, so moving a node
    /// can never pay for itself.
    pub fn nd_move_pen(&self, pos: Point, grd: NodeIdx) -> f64 {
        let c = &self.costs;
        let diag_cost = c.bend[0]
            + c.diagonal_pen
                .min(c.horizontal_pen + c.vertical_pen + c.bend[2]);
        let vert_cost = c.bend[0]
            + c.vertical_pen
                .min(c.horizontal_pen + c.diagonal_pen + c.bend[3]);
        let hori_cost = c.bend[0]
            + c.horizontal_pen
                .min(c.vertical_pen + c.diagonal_pen + c.bend[3]);
        let pen_per_grid = MOVE_PEN + diag_cost.max(vert_cost).max(hori_cost);
        let grid_d = dist(pos, self.graph.nd(grd).pos) / self.cell_size;
        grid_d * pen_per_grid
    }

    /// Delete every port that ended up without a primary edge (lattice
    /// boundary, or axes not present in a sparse grid).
    pub fn prune_ports(&mut self) {
        for si in 0..self.sinks.len() {
            let n = self.sinks[si];
            for i in 0..self.max_deg {
                let Some(port) = self.graph.nd(n).ports[i] else {
                    continue;
                };
                let has_primary = self
                    .graph
                    .adj_all(port)
                    .any(|e| !self.graph.edg(e).secondary);
                if !has_primary {
                    self.graph.del_nd(port);
                    self.graph.nd_mut(n).ports[i] = None;
                }
            }
        }
    }

    /// Axial penalty of direction `p`.
    pub fn axis_pen(&self, p: usize) -> f64 {
        if self.max_deg == 4 {
            if p % 2 == 0 {
                self.costs.vertical_pen
            } else {
                self.costs.horizontal_pen
            }
        } else if p % 4 == 0 {
            self.costs.vertical_pen
        } else if (p + 2) % 4 == 0 {
            self.costs.horizontal_pen
        } else {
            self.costs.diagonal_pen
        }
    }

    /// Initial cost of every primary edge: `(axis_pen + hop) · d − hop`,
    /// where `d` is the cell distance spanned. Interior hops of multi-cell
    /// edges count toward the heuristic rate, keeping A* consistent.
    pub fn write_initial_costs(&mut self) {
        let hop = self.costs.heur_hop_cost();
        for si in 0..self.sinks.len() {
            let n = self.sinks[si];
            for p in 0..self.max_deg {
                let pl = self.graph.nd(n);
                let (Some(port), Some(neighbor)) = (pl.ports[p], pl.neighs[p]) else {
                    continue;
                };
                let opp = (p + self.max_deg / 2) % self.max_deg;
                let Some(oport) = self.graph.nd(neighbor).ports[opp] else {
                    continue;
                };
                let x_dist = (pl.x as i64 - self.graph.nd(neighbor).x as i64).unsigned_abs();
                let y_dist = (pl.y as i64 - self.graph.nd(neighbor).y as i64).unsigned_abs();
                let d = x_dist.max(y_dist) as f64;
                let cost = (self.axis_pen(p) + hop) * d - hop;
                if let Some(e) = self.graph.get_edg(port, oport) {
                    self.graph.edg_mut(e).set_cost(cost);
                }
            }
        }
    }

    /// Clear all per-run state: reservations, render orders, blocks and
    /// settlement. Leaves the structural graph and initial costs alone.
    pub fn reset(&mut self) {
        let edges: Vec<EdgeIdx> = self.graph.edgs().collect();
        for e in edges {
            let pl = self.graph.edg_mut(e);
            pl.open();
            pl.unblock();
            pl.res_edgs.clear();
            pl.rndr_order = 0;
        }
        for si in 0..self.sinks.len() {
            let n = self.sinks[si];
            self.graph.nd_mut(n).settled = false;
            self.open_turns(n);
            self.close_sink_fr(n);
            self.close_sink_to(n);
        }
    }

    /// Candidate sinks for a station at `pos`: every sink strictly within
    /// `max_gr_dist` cells, ordered by distance (node id breaking ties).
    pub fn candidate_sinks(&self, pos: Point, max_gr_dist: f64) -> Vec<NodeIdx> {
        let max_dis = self.cell_size * max_gr_dist;
        let mut cands: Vec<(f64, NodeIdx)> = self
            .sinks
            .iter()
            .copied()
            .filter(|&s| dist(pos, self.graph.nd(s).pos) < max_dis)
            .map(|s| (dist(pos, self.graph.nd(s).pos), s))
            .collect();
        cands.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        cands.into_iter().map(|(_, s)| s).collect()
    }
}

/// Interface shared by the grid variants. Construction differs; routing
/// and the ILP only see this surface.
pub trait BaseGraph {
    fn grid(&self) -> &NodeGrid;
    fn grid_mut(&mut self) -> &mut NodeGrid;

    fn max_deg(&self) -> usize {
        self.grid().max_deg
    }

    /// Build sinks, ports and primary edges for the given station
    /// positions, then prune and write initial costs.
    fn init(&mut self, stations: &[Point]);

    /// All crossing diagonal twin pairs, for the ILP non-crossing rows.
    fn cross_edg_pairs(&self) -> Vec<CrossEdgPair>;

    /// Lower bound on remaining hops from cell `(x, y)` to cell `(tx, ty)`.
    fn heur_steps(&self, x: usize, y: usize, tx: usize, ty: usize) -> usize {
        let dx = (x as i64 - tx as i64).unsigned_abs() as usize;
        let dy = (y as i64 - ty as i64).unsigned_abs() as usize;
        dx.max(dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_ang_is_symmetric_and_scaled() {
        for i in 0..8 {
            for j in 0..8 {
                if i == j {
                    continue;
                }
                assert_eq!(port_ang(8, i, j), port_ang(8, j, i));
            }
        }
        assert_eq!(port_ang(8, 0, 4), 0); // straight
        assert_eq!(port_ang(8, 0, 3), 1); // 135°
        assert_eq!(port_ang(8, 0, 2), 2); // 90°
        assert_eq!(port_ang(8, 0, 1), 3); // 45°
        assert_eq!(port_ang(4, 0, 2), 0); // straight on the ortho grid
        assert_eq!(port_ang(4, 0, 1), 2); // 90°
    }

    #[test]
    fn dir_delta_round_trips_through_opposite() {
        for max_deg in [4usize, 8] {
            for i in 0..max_deg {
                let (dx, dy) = dir_delta(max_deg, i);
                let (ox, oy) = dir_delta(max_deg, (i + max_deg / 2) % max_deg);
                assert_eq!((dx, dy), (-ox, -oy));
            }
        }
    }
}
