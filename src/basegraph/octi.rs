//! Full octilinear grid: a regular lattice of sinks covering the padded
//! bounding box, connected along all four axes.

use std::collections::BTreeSet;

use crate::geo::{BBox, Point};
use crate::graph::EdgeIdx;

use super::{dir_delta, BaseGraph, CrossEdgPair, GridCosts, NodeGrid};

pub struct OctiGrid {
    grid: NodeGrid,
}

impl OctiGrid {
    pub fn new(bbox: BBox, cell_size: f64, costs: GridCosts) -> Self {
        Self {
            grid: NodeGrid::new(bbox, cell_size, costs, 8),
        }
    }
}

impl BaseGraph for OctiGrid {
    fn grid(&self) -> &NodeGrid {
        &self.grid
    }

    fn grid_mut(&mut self) -> &mut NodeGrid {
        &mut self.grid
    }

    fn init(&mut self, _stations: &[Point]) {
        let g = &mut self.grid;
        for x in 0..g.width {
            for y in 0..g.height {
                g.write_nd(x, y);
            }
        }

        // Connecting directions 0..4 from every sink covers each adjacent
        // pair exactly once; connect_nodes adds both twins.
        for x in 0..g.width {
            for y in 0..g.height {
                let n = g.node_at(x, y).unwrap();
                for p in 0..4 {
                    let (dx, dy) = dir_delta(8, p);
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= g.width as i64 || ny >= g.height as i64 {
                        continue;
                    }
                    let m = g.node_at(nx as usize, ny as usize).unwrap();
                    g.connect_nodes(n, m, p);
                }
            }
        }

        // Each lattice cell holds one NE and one SE diagonal; they cross.
        for x in 0..g.width.saturating_sub(1) {
            for y in 0..g.height.saturating_sub(1) {
                let ll = g.node_at(x, y).unwrap();
                let ul = g.node_at(x, y + 1).unwrap();
                let ur = g.node_at(x + 1, y + 1).unwrap();
                let lr = g.node_at(x + 1, y).unwrap();
                let (Some(ea), Some(eb)) = (g.get_n_edg(ll, ur), g.get_n_edg(ur, ll)) else {
                    continue;
                };
                let (Some(fa), Some(fb)) = (g.get_n_edg(ul, lr), g.get_n_edg(lr, ul)) else {
                    continue;
                };
                g.edge_pairs.entry(ea).or_default().push((fa, fb));
                g.edge_pairs.entry(eb).or_default().push((fa, fb));
                g.edge_pairs.entry(fa).or_default().push((ea, eb));
                g.edge_pairs.entry(fb).or_default().push((ea, eb));
            }
        }

        g.prune_ports();
        g.write_initial_costs();
    }

    fn cross_edg_pairs(&self) -> Vec<CrossEdgPair> {
        collect_cross_pairs(&self.grid)
    }
}

/// Deduplicated crossing pairs from the per-edge pair registry.
pub(super) fn collect_cross_pairs(grid: &NodeGrid) -> Vec<CrossEdgPair> {
    let mut seen: BTreeSet<(EdgeIdx, EdgeIdx)> = BTreeSet::new();
    let mut out = Vec::new();
    for (&e, pairs) in &grid.edge_pairs {
        let et = twin(grid, e);
        for &(f, ft) in pairs {
            let ka = e.min(et);
            let kb = f.min(ft);
            let key = (ka.min(kb), ka.max(kb));
            if seen.insert(key) {
                out.push(((e, et), (f, ft)));
            }
        }
    }
    out
}

fn twin(grid: &NodeGrid, e: EdgeIdx) -> EdgeIdx {
    let from = grid.graph.from(e);
    let to = grid.graph.to(e);
    grid.graph.get_edg(to, from).expect("primary edge without twin")
}
