//! Hanan-style sparse octilinear grid: only the cells required by the
//! input stations, enriched by intersection rounds on the horizontal,
//! vertical and the two diagonal axes.

use std::collections::BTreeSet;

use crate::geo::{BBox, Point};
use crate::graph::NodeIdx;

use super::octi::collect_cross_pairs;
use super::{BaseGraph, CrossEdgPair, GridCosts, NodeGrid};

pub struct OctiHananGrid {
    grid: NodeGrid,
    iters: usize,
}

impl OctiHananGrid {
    pub fn new(bbox: BBox, cell_size: f64, costs: GridCosts, iters: usize) -> Self {
        Self {
            grid: NodeGrid::new(bbox, cell_size, costs, 8),
            iters: iters.max(1),
        }
    }

    /// One enrichment round over plain coordinates: add every cell whose
    /// row and column are both active, plus the analogous points on the
    /// two diagonal axes.
    fn iter_coords(
        coords: &BTreeSet<(usize, usize)>,
        w: usize,
        h: usize,
    ) -> BTreeSet<(usize, usize)> {
        let mut y_act = vec![false; h];
        let mut x_act = vec![false; w];
        let mut xy_act = vec![false; w + h];
        let mut yx_act = vec![false; w + h];
        for &(x, y) in coords {
            x_act[x] = true;
            y_act[y] = true;
            xy_act[x + (h - 1 - y)] = true;
            yx_act[y + x] = true;
        }

        let mut ret = BTreeSet::new();
        for x in 0..w {
            if !x_act[x] {
                continue;
            }
            for y in 0..h {
                if y_act[y] {
                    ret.insert((x, y));
                }
            }
        }
        for x in 0..w {
            for y in 0..h {
                let xi = x + (h - 1 - y);
                let yi = y + x;
                let hit = (xy_act[xi] && (yx_act[yi] || y_act[y] || x_act[x]))
                    || (yx_act[yi] && (xy_act[xi] || y_act[y] || x_act[x]));
                if hit {
                    ret.insert((x, y));
                }
            }
        }
        ret
    }
}

impl BaseGraph for OctiHananGrid {
    fn grid(&self) -> &NodeGrid {
        &self.grid
    }

    fn grid_mut(&mut self) -> &mut NodeGrid {
        &mut self.grid
    }

    fn init(&mut self, stations: &[Point]) {
        let w = self.grid.width;
        let h = self.grid.height;

        let mut coords: BTreeSet<(usize, usize)> = stations
            .iter()
            .map(|p| (self.grid.cell_x(p.x), self.grid.cell_y(p.y)))
            .collect();
        for _ in 1..self.iters {
            coords = Self::iter_coords(&coords, w, h);
        }

        let g = &mut self.grid;
        for &(x, y) in &coords {
            g.write_nd(x, y);
        }
        if coords.is_empty() {
            return;
        }

        let mut y_act: Vec<Vec<NodeIdx>> = vec![Vec::new(); h];
        let mut x_act: Vec<Vec<NodeIdx>> = vec![Vec::new(); w];
        let mut xy_act: Vec<Vec<NodeIdx>> = vec![Vec::new(); w + h];
        let mut yx_act: Vec<Vec<NodeIdx>> = vec![Vec::new(); w + h];
        for &s in &g.sinks {
            let (x, y) = (g.graph.nd(s).x, g.graph.nd(s).y);
            y_act[y].push(s);
            x_act[x].push(s);
            xy_act[x + (h - 1 - y)].push(s);
            yx_act[y + x].push(s);
        }

        // Row/column intersections of active axes become sinks.
        for x in 0..w {
            if x_act[x].is_empty() {
                continue;
            }
            for y in 0..h {
                if y_act[y].is_empty() || g.node_at(x, y).is_some() {
                    continue;
                }
                let nn = g.write_nd(x, y);
                y_act[y].push(nn);
                x_act[x].push(nn);
            }
        }

        // Diagonal-axis intersections, against any other active axis.
        for x in 0..w {
            for y in 0..h {
                let xi = x + (h - 1 - y);
                let yi = y + x;
                let other_for_xy =
                    !yx_act[yi].is_empty() || !y_act[y].is_empty() || !x_act[x].is_empty();
                let other_for_yx =
                    !xy_act[xi].is_empty() || !y_act[y].is_empty() || !x_act[x].is_empty();
                let hit = (!xy_act[xi].is_empty() && other_for_xy)
                    || (!yx_act[yi].is_empty() && other_for_yx);
                if !hit {
                    continue;
                }
                let have = g.node_at(x, y);
                let nn = match have {
                    Some(n) => n,
                    None => g.write_nd(x, y),
                };
                if !xy_act[xi].is_empty() && !xy_act[xi].contains(&nn) {
                    xy_act[xi].push(nn);
                }
                if !yx_act[yi].is_empty() && !yx_act[yi].contains(&nn) {
                    yx_act[yi].push(nn);
                }
                if have.is_some() {
                    continue;
                }
                if !y_act[y].is_empty() {
                    y_act[y].push(nn);
                }
                if !x_act[x].is_empty() {
                    x_act[x].push(nn);
                }
            }
        }

        let by_x = |g: &NodeGrid, v: &mut Vec<NodeIdx>| {
            v.sort_by_key(|&n| (g.graph.nd(n).x, g.graph.nd(n).y));
            v.dedup();
        };
        let by_y = |g: &NodeGrid, v: &mut Vec<NodeIdx>| {
            v.sort_by_key(|&n| (g.graph.nd(n).y, g.graph.nd(n).x));
            v.dedup();
        };
        for v in y_act.iter_mut() {
            by_x(g, v);
        }
        for v in x_act.iter_mut() {
            by_y(g, v);
        }
        for v in xy_act.iter_mut() {
            by_y(g, v);
        }
        for v in yx_act.iter_mut() {
            by_x(g, v);
        }

        for row in &y_act {
            for i in 1..row.len() {
                g.connect_nodes(row[i - 1], row[i], 2);
            }
        }
        for col in &x_act {
            for i in 1..col.len() {
                g.connect_nodes(col[i - 1], col[i], 0);
            }
        }
        for diag in &xy_act {
            for i in 1..diag.len() {
                g.connect_nodes(diag[i - 1], diag[i], 1);
            }
        }
        for diag in &yx_act {
            for i in 1..diag.len() {
                g.connect_nodes(diag[i - 1], diag[i], 3);
            }
        }

        // Pair each rising diagonal segment with the falling diagonal
        // segment straddling its lower endpoint.
        for diag in &xy_act {
            for i in 1..diag.len() {
                let nd_a = diag[i - 1];
                let nd_b = diag[i];
                if nd_a == nd_b {
                    continue;
                }
                let (Some(ea), Some(eb)) = (g.get_n_edg(nd_a, nd_b), g.get_n_edg(nd_b, nd_a))
                else {
                    continue;
                };
                let yi = g.graph.nd(nd_a).x + g.graph.nd(nd_a).y + 1;
                if yi >= yx_act.len() || yx_act[yi].is_empty() {
                    continue;
                }
                let ax = g.graph.nd(nd_a).x;
                let k = yx_act[yi].partition_point(|&n| g.graph.nd(n).x <= ax);
                if k == 0 || k >= yx_act[yi].len() {
                    continue;
                }
                let o_nd_a = yx_act[yi][k - 1];
                let o_nd_b = yx_act[yi][k];
                let (Some(fa), Some(fb)) = (g.get_n_edg(o_nd_a, o_nd_b), g.get_n_edg(o_nd_b, o_nd_a))
                else {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn costs() -> GridCosts {
        GridCosts {
            horizontal_pen: 1.0,
            vertical_pen: 1.0,
            diagonal_pen: 1.5,
            bend: [0.0, 1.0, 1.5, 2.0],
        }
    }

    #[test]
    fn three_stations_yield_hanan_intersections() {
        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(300.0, 300.0),
        };
        let stations = [
            Point::new(0.0, 0.0),
            Point::new(300.0, 100.0),
            Point::new(100.0, 300.0),
        ];
        let mut g = OctiHananGrid::new(bbox, 100.0, costs(), 1);
        g.init(&stations);

        let mut have: Vec<(usize, usize)> = g
            .grid()
            .sinks
            .iter()
            .map(|&s| (g.grid().graph.nd(s).x, g.grid().graph.nd(s).y))
            .collect();
        have.sort_unstable();

        // Rows/columns {0, 1, 3} cross in nine cells; the diagonal axes
        // through the stations add (2,0), (0,2) and (2,2).
        let expect = vec![
            (0, 0),
            (0, 1),
            (0, 2),
            (0, 3),
            (1, 0),
            (1, 1),
            (1, 3),
            (2, 0),
            (2, 2),
            (3, 0),
            (3, 1),
            (3, 3),
        ];
        assert_eq!(have, expect);
    }

    #[test]
    fn axis_neighbours_skip_missing_cells() {
        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(300.0, 300.0),
        };
        let stations = [
            Point::new(0.0, 0.0),
            Point::new(300.0, 100.0),
            Point::new(100.0, 300.0),
        ];
        let mut g = OctiHananGrid::new(bbox, 100.0, costs(), 1);
        g.init(&stations);
        let grid = g.grid();

        // Row 0 holds cells 0,1,2,3; (1,0) connects east to (2,0).
        let a = grid.node_at(1, 0).unwrap();
        let b = grid.node_at(2, 0).unwrap();
        assert_eq!(grid.graph.nd(a).neighs[2], Some(b));
        // Row 1 holds only cells 0,1,3; (1,1) connects east straight
        // to (3,1), two cells away.
        let c = grid.node_at(1, 1).unwrap();
        let d = grid.node_at(3, 1).unwrap();
        assert_eq!(grid.graph.nd(c).neighs[2], Some(d));
        let e = grid.get_n_edg(c, d).unwrap();
        // (pen + hop) · 2 − hop with pen = hop = 1.
        assert_eq!(grid.graph.edg(e).raw_cost(), 3.0);
    }

    #[test]
    fn rising_diagonal_is_connected() {
        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(300.0, 300.0),
        };
        let stations = [
            Point::new(0.0, 0.0),
            Point::new(300.0, 100.0),
            Point::new(100.0, 300.0),
        ];
        let mut g = OctiHananGrid::new(bbox, 100.0, costs(), 1);
        g.init(&stations);
        let grid = g.grid();
        let a = grid.node_at(0, 0).unwrap();
        let b = grid.node_at(1, 1).unwrap();
        assert_eq!(grid.graph.nd(a).neighs[1], Some(b));
    }
}
