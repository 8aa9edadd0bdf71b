//! Orthogonal grid: the four-direction variant. Ports 0..4 sit at 90°
//! steps; there are no diagonals and hence no crossing pairs.

use crate::geo::{BBox, Point};

use super::{dir_delta, BaseGraph, CrossEdgPair, GridCosts, NodeGrid};

pub struct OrthoGrid {
    grid: NodeGrid,
}

impl OrthoGrid {
    pub fn new(bbox: BBox, cell_size: f64, costs: GridCosts) -> Self {
        Self {
            grid: NodeGrid::new(bbox, cell_size, costs, 4),
        }
    }
}

impl BaseGraph for OrthoGrid {
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

        for x in 0..g.width {
            for y in 0..g.height {
                let n = g.node_at(x, y).unwrap();
                for p in 0..2 {
                    let (dx, dy) = dir_delta(4, p);
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

        g.prune_ports();
        g.write_initial_costs();
    }

    fn cross_edg_pairs(&self) -> Vec<CrossEdgPair> {
        Vec::new()
    }

    fn heur_steps(&self, x: usize, y: usize, tx: usize, ty: usize) -> usize {
        let dx = (x as i64 - tx as i64).unsigned_abs() as usize;
        let dy = (y as i64 - ty as i64).unsigned_abs() as usize;
        dx + dy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_ports_and_manhattan_heuristic() {
        let bbox = BBox {
            lower_left: Point::new(0.0, 0.0),
            upper_right: Point::new(200.0, 200.0),
        };
        let mut g = OrthoGrid::new(
            bbox,
            100.0,
            GridCosts {
                horizontal_pen: 1.0,
                vertical_pen: 2.0,
                diagonal_pen: 1.0,
                bend: [0.0, 1.0, 1.5, 2.0],
            },
        );
        g.init(&[]);
        assert_eq!(g.max_deg(), 4);
        assert_eq!(g.heur_steps(0, 0, 2, 2), 4);

        let grid = g.grid();
        let center = grid.node_at(1, 1).unwrap();
        for i in 0..4 {
            assert!(grid.graph.nd(center).neighs[i].is_some());
        }
        // Vertical (dir 0) and horizontal (dir 1) penalties differ.
        let north = grid.get_n_edg(center, grid.node_at(1, 2).unwrap()).unwrap();
        let east = grid.get_n_edg(center, grid.node_at(2, 1).unwrap()).unwrap();
        assert_eq!(grid.graph.edg(north).raw_cost(), 2.0);
        assert_eq!(grid.graph.edg(east).raw_cost(), 1.0);
        assert!(g.cross_edg_pairs().is_empty());
    }
}
