//! ILP formulation of the grid layout problem. The greedy drawing is
//! handed to the solver as a warm start; the optimal assignment is
//! decoded back into a drawing.

pub mod solver;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info};

use crate::basegraph::{BaseGraph, GeoPensMap};
use crate::combgraph::CombGraph;
use crate::dijkstra::SOFT_INF;
use crate::drawing::Drawing;
use crate::error::LayoutError;
use crate::graph::{EdgeIdx, NodeIdx};
use crate::ir::LineGraph;

use solver::{solver_for, IlpSolver, Sense, SolveStatus, StarterSol, VarKind};

#[derive(Debug, Clone)]
pub struct IlpStats {
    pub score: f64,
    pub time_ms: u128,
    pub rows: usize,
    pub cols: usize,
    pub optimal: bool,
}

#[derive(Debug, Clone)]
pub struct IlpOpts {
    pub time_lim: Option<u64>,
    pub cache_dir: Option<PathBuf>,
    pub cache_threshold: f64,
    pub num_threads: usize,
    pub solver: String,
    pub no_solve: bool,
    /// When set, `<base>.mps` and `<base>.mst` are written here.
    pub path: Option<PathBuf>,
}

impl Default for IlpOpts {
    fn default() -> Self {
        Self {
            time_lim: None,
            cache_dir: None,
            cache_threshold: f64::INFINITY,
            num_threads: 0,
            solver: "cbc".to_string(),
            no_solve: false,
            path: None,
        }
    }
}

fn stat_pos_var(bg: &dyn BaseGraph, n: NodeIdx, cn: usize) -> String {
    format!("sp({},{})", bg.grid().graph.nd(n).id, cn)
}

fn edg_use_var(bg: &dyn BaseGraph, e: EdgeIdx, ce: usize) -> String {
    let g = &bg.grid().graph;
    format!(
        "edg({},{},{})",
        g.nd(g.from(e)).id,
        g.nd(g.to(e)).id,
        ce
    )
}

fn dir_var(cn: usize, ce: usize) -> String {
    format!("d({},{})", cn, ce)
}

fn vuln_var(cn: usize, i: usize) -> String {
    format!("vuln({},{})", cn, i)
}

/// Run the full optimisation: encode, warm-start, solve, decode.
pub fn optimize(
    bg: &mut dyn BaseGraph,
    cg: &CombGraph,
    lg: &LineGraph,
    drawing: &mut Drawing,
    max_gr_dist: f64,
    geo_pens: Option<&GeoPensMap>,
    opts: &IlpOpts,
) -> Result<IlpStats, LayoutError> {
    let started = Instant::now();

    // The greedy drawing becomes the warm start, then all per-run grid
    // state is wiped for the encoder.
    let starter = extract_feasible_sol(drawing, bg, cg, max_gr_dist);
    bg.grid_mut().reset();
    drawing.crumble();

    let mut lp = solver_for(&opts.solver)?;
    let cands = create_problem(bg, cg, lg, geo_pens, max_gr_dist, lp.as_mut());

    let mut stats = IlpStats {
        score: f64::INFINITY,
        time_ms: 0,
        rows: lp.model().num_constrs(),
        cols: lp.model().num_vars(),
        optimal: false,
    };
    info!(rows = stats.rows, cols = stats.cols, "ILP encoded");

    lp.set_starter(&starter);

    if let Some(path) = &opts.path {
        let base = path.with_extension("");
        lp.write_mps(&base.with_extension("mps"))
            .map_err(|e| LayoutError::InvalidInput(e.to_string()))?;
        lp.write_mst(&base.with_extension("mst"), &starter)
            .map_err(|e| LayoutError::InvalidInput(e.to_string()))?;
    }

    if opts.no_solve {
        stats.time_ms = started.elapsed().as_millis();
        return Ok(stats);
    }

    if let Some(lim) = opts.time_lim {
        lp.set_time_lim(lim);
    }
    if let Some(dir) = &opts.cache_dir {
        lp.set_cache_dir(dir);
    }
    lp.set_cache_threshold(opts.cache_threshold);
    if opts.num_threads > 0 {
        lp.set_num_threads(opts.num_threads);
    }

    let status = lp.solve()?;
    extract_solution(lp.as_ref(), bg, cg, &cands, drawing);

    stats.score = lp.obj_val();
    stats.time_ms = started.elapsed().as_millis();
    stats.optimal = status == SolveStatus::Optimal;
    Ok(stats)
}

/// Encode the layout MIP. Returns the candidate sink set per comb node.
pub fn create_problem(
    bg: &mut dyn BaseGraph,
    cg: &CombGraph,
    lg: &LineGraph,
    geo_pens: Option<&GeoPensMap>,
    max_gr_dist: f64,
    lp: &mut dyn IlpSolver,
) -> BTreeMap<usize, BTreeSet<NodeIdx>> {
    let max_deg = bg.max_deg();
    let mut cands: BTreeMap<usize, BTreeSet<NodeIdx>> = BTreeMap::new();

    // Station-position variables: exactly one sink per comb node.
    for (cn, nd) in cg.nodes.iter().enumerate() {
        if nd.deg() == 0 {
            continue;
        }
        let row = lp
            .model_mut()
            .add_row(&format!("oneass({})", cn), 1.0, Sense::Fix);

        let sinks = bg.grid().candidate_sinks(nd.pos, max_gr_dist);
        for n in sinks {
            let port_deg = bg.grid().graph.nd(n).ports.iter().flatten().count();
            if port_deg < nd.deg() {
                continue;
            }
            cands.entry(cn).or_default().insert(n);
            bg.grid_mut().open_sink_fr(n, 0.0);
            bg.grid_mut().open_sink_to(n, 0.0);

            let pen = bg.grid().nd_move_pen(nd.pos, n);
            let col = lp
                .model_mut()
                .add_col(&stat_pos_var(bg, n, cn), VarKind::Bin, pen);
            lp.model_mut().add_col_to_row(row, col, 1.0);
        }
    }

    // Edge-use variables: one binary per usable grid edge and comb edge.
    // Entry edges are tied to the endpoints' candidate sinks, which also
    // fixes the traversal direction from → to.
    for (ce, comb) in cg.edges.iter().enumerate() {
        let empty = BTreeSet::new();
        let cands_fr = cands.get(&comb.from).unwrap_or(&empty);
        let cands_to = cands.get(&comb.to).unwrap_or(&empty);
        let edges: Vec<EdgeIdx> = bg.grid().graph.edgs().collect();
        for e in edges {
            let grid = bg.grid();
            let pl = grid.graph.edg(e);
            if pl.cost() >= SOFT_INF {
                continue;
            }
            let from = grid.graph.from(e);
            let to = grid.graph.to(e);
            if grid.graph.nd(from).sink && !cands_fr.contains(&from) {
                continue;
            }
            if grid.graph.nd(to).sink && !cands_to.contains(&to) {
                continue;
            }
            let mut coef = pl.cost();
            if !pl.secondary {
                if let Some(pens) = geo_pens {
                    if let Some(per_edge) = pens.get(&ce) {
                        coef += per_edge.get(pl.id).copied().unwrap_or(0.0);
                    }
                }
            }
            let name = edg_use_var(bg, e, ce);
            lp.model_mut().add_col(&name, VarKind::Bin, coef);
        }
    }

    // Each primary edge is used at most once, over both directions and
    // all comb edges.
    let mut proced: BTreeSet<EdgeIdx> = BTreeSet::new();
    let primary: Vec<EdgeIdx> = bg
        .grid()
        .graph
        .edgs()
        .filter(|&e| !bg.grid().graph.edg(e).secondary)
        .collect();
    for e in primary {
        if proced.contains(&e) {
            continue;
        }
        let grid = bg.grid();
        let f = grid
            .graph
            .get_edg(grid.graph.to(e), grid.graph.from(e))
            .expect("primary edge without twin");
        proced.insert(e);
        proced.insert(f);

        let name = format!(
            "ue({},{})",
            grid.graph.nd(grid.graph.from(e)).id,
            grid.graph.nd(grid.graph.to(e)).id
        );
        let row = lp.model_mut().add_row(&name, 1.0, Sense::Up);
        for ce in 0..cg.edges.len() {
            let e_name = edg_use_var(bg, e, ce);
            let f_name = edg_use_var(bg, f, ce);
            if let Some(col) = lp.model().var_by_name(&e_name) {
                lp.model_mut().add_col_to_row(row, col, 1.0);
            }
            if let Some(col) = lp.model().var_by_name(&f_name) {
                lp.model_mut().add_col_to_row(row, col, 1.0);
            }
        }
    }

    // Flow conservation. At sinks the outgoing side counts double so an
    // incoming edge can never make up for a departure; only the station
    // assignment (coefficient −2) can.
    let nodes: Vec<NodeIdx> = bg.grid().graph.nds().collect();
    for n in &nodes {
        let n = *n;
        let grid = bg.grid();
        let usable = grid.graph.adj_all(n).any(|e| grid.graph.edg(e).cost() < SOFT_INF);
        if !usable {
            continue;
        }
        let is_sink = grid.graph.nd(n).sink;
        let nid = grid.graph.nd(n).id;

        for (ce, comb) in cg.edges.iter().enumerate() {
            let row = lp
                .model_mut()
                .add_row(&format!("as({},{})", nid, ce), 0.0, Sense::Up);

            let out_cost = if is_sink {
                let fr_name = stat_pos_var(bg, n, comb.from);
                if let Some(col) = lp.model().var_by_name(&fr_name) {
                    lp.model_mut().add_col_to_row(row, col, -2.0);
                }
                let to_name = stat_pos_var(bg, n, comb.to);
                if let Some(col) = lp.model().var_by_name(&to_name) {
                    lp.model_mut().add_col_to_row(row, col, 1.0);
                }
                2.0
            } else {
                1.0
            };

            let adj_in: Vec<EdgeIdx> = bg.grid().graph.adj_in(n).to_vec();
            for e in adj_in {
                if let Some(col) = lp.model().var_by_name(&edg_use_var(bg, e, ce)) {
                    lp.model_mut().add_col_to_row(row, col, -1.0);
                }
            }
            let adj_out: Vec<EdgeIdx> = bg.grid().graph.adj_out(n).to_vec();
            for e in adj_out {
                if let Some(col) = lp.model().var_by_name(&edg_use_var(bg, e, ce)) {
                    lp.model_mut().add_col_to_row(row, col, out_cost);
                }
            }
        }
    }

    // Redundant, but tightens the relaxation: the number of activated
    // sink edges at a settled node equals its assignment count.
    let sinks: Vec<NodeIdx> = bg.grid().sinks.clone();
    for &n in &sinks {
        let nid = bg.grid().graph.nd(n).id;
        for (ce, comb) in cg.edges.iter().enumerate() {
            let row = lp
                .model_mut()
                .add_row(&format!("ss({},{})", nid, ce), 0.0, Sense::Fix);

            let in_cands_to = cands.get(&comb.to).map_or(false, |s| s.contains(&n));
            let in_cands_fr = cands.get(&comb.from).map_or(false, |s| s.contains(&n));
            if in_cands_to {
                if let Some(col) = lp.model().var_by_name(&stat_pos_var(bg, n, comb.to)) {
                    lp.model_mut().add_col_to_row(row, col, -1.0);
                }
            }
            if in_cands_fr {
                if let Some(col) = lp.model().var_by_name(&stat_pos_var(bg, n, comb.from)) {
                    lp.model_mut().add_col_to_row(row, col, -1.0);
                }
            }

            for p in 0..max_deg {
                let Some(port) = bg.grid().graph.nd(n).ports[p] else {
                    continue;
                };
                let grid = bg.grid();
                let sink_to = grid.graph.get_edg(port, n);
                let sink_fr = grid.graph.get_edg(n, port);
                for e in [sink_to, sink_fr].into_iter().flatten() {
                    if let Some(col) = lp.model().var_by_name(&edg_use_var(bg, e, ce)) {
                        lp.model_mut().add_col_to_row(row, col, 1.0);
                    }
                }
            }
        }
    }

    // A sink is either one station's position or a pass-through.
    for &n in &sinks {
        let nid = bg.grid().graph.nd(n).id;
        let row = lp
            .model_mut()
            .add_row(&format!("iu({})", nid), 1.0, Sense::Up);

        for cn in 0..cg.nodes.len() {
            if let Some(col) = lp.model().var_by_name(&stat_pos_var(bg, n, cn)) {
                lp.model_mut().add_col_to_row(row, col, 1.0);
            }
        }

        for pf in 0..max_deg {
            for pt in 0..max_deg {
                if pf == pt {
                    continue;
                }
                let grid = bg.grid();
                let (Some(from), Some(to)) =
                    (grid.graph.nd(n).ports[pf], grid.graph.nd(n).ports[pt])
                else {
                    continue;
                };
                let Some(inner) = grid.graph.get_edg(from, to) else {
                    continue;
                };
                for ce in 0..cg.edges.len() {
                    if let Some(col) = lp.model().var_by_name(&edg_use_var(bg, inner, ce)) {
                        lp.model_mut().add_col_to_row(row, col, 1.0);
                    }
                }
            }
        }
    }

    // Crossing diagonals exclude each other.
    for (i, ((ea, eb), (fa, fb))) in bg.cross_edg_pairs().into_iter().enumerate() {
        let row = lp
            .model_mut()
            .add_row(&format!("ncx({})", i), 1.0, Sense::Up);
        for ce in 0..cg.edges.len() {
            for e in [ea, eb, fa, fb] {
                if let Some(col) = lp.model().var_by_name(&edg_use_var(bg, e, ce)) {
                    lp.model_mut().add_col_to_row(row, col, 1.0);
                }
            }
        }
    }

    // Direction variables: which port leaves a node for an edge. Port 0
    // is represented by the absence of any activated sink edge, so the
    // sum deliberately starts at 1.
    for (cn, nd) in cg.nodes.iter().enumerate() {
        if nd.deg() < 2 {
            continue;
        }
        for &ce in &nd.edges {
            let col = lp
                .model_mut()
                .add_int_col(&dir_var(cn, ce), 0.0, 0.0, (max_deg - 1) as f64);
            let row = lp
                .model_mut()
                .add_row(&format!("dc({},{})", cn, ce), 0.0, Sense::Fix);
            lp.model_mut().add_col_to_row(row, col, -1.0);

            let empty = BTreeSet::new();
            let nd_cands = cands.get(&cn).unwrap_or(&empty).clone();
            for n in nd_cands {
                if lp.model().var_by_name(&stat_pos_var(bg, n, cn)).is_none() {
                    continue;
                }
                let outgoing = cg.edges[ce].from == cn;
                for i in 1..max_deg {
                    let grid = bg.grid();
                    let Some(port) = grid.graph.nd(n).ports[i] else {
                        continue;
                    };
                    let e = if outgoing {
                        grid.graph.get_edg(n, port)
                    } else {
                        grid.graph.get_edg(port, n)
                    };
                    let Some(e) = e else { continue };
                    if let Some(c) = lp.model().var_by_name(&edg_use_var(bg, e, ce)) {
                        lp.model_mut().add_col_to_row(row, c, i as f64);
                    }
                }
            }
        }
    }

    // Circular-order preservation: around a node of degree ≥ 3, the
    // directions must increase along the input ordering, with exactly one
    // wrap-around pair.
    let m = max_deg as f64;
    for (cn, nd) in cg.nodes.iter().enumerate() {
        if nd.deg() < 3 {
            continue;
        }
        let vuln_row = lp
            .model_mut()
            .add_row(&format!("vc({})", cn), 1.0, Sense::Fix);
        for i in 0..nd.deg() {
            let col = lp.model_mut().add_col(&vuln_var(cn, i), VarKind::Bin, 0.0);
            lp.model_mut().add_col_to_row(vuln_row, col, 1.0);
        }

        let order = &nd.ordering;
        for i in 0..order.len() {
            let edg_a = if i == 0 {
                order[order.len() - 1]
            } else {
                order[i - 1]
            };
            let edg_b = order[i];

            let col_a = lp.model().var_by_name(&dir_var(cn, edg_a)).unwrap();
            let col_b = lp.model().var_by_name(&dir_var(cn, edg_b)).unwrap();
            let vuln_col = lp.model().var_by_name(&vuln_var(cn, i)).unwrap();

            let row = lp
                .model_mut()
                .add_row(&format!("oc({},{})", cn, i), 1.0, Sense::Lo);
            lp.model_mut().add_col_to_row(row, col_b, 1.0);
            lp.model_mut().add_col_to_row(row, col_a, -1.0);
            lp.model_mut().add_col_to_row(row, vuln_col, m);
        }
    }

    // Angle classes: for adjacent edges sharing a line, charge the bend
    // penalty matching the circular distance of their ports.
    for (cn, nd) in cg.nodes.iter().enumerate() {
        if nd.deg() < 2 {
            continue;
        }
        for i in 0..nd.edges.len() {
            let edg_a = nd.edges[i];
            for j in i + 1..nd.edges.len() {
                let edg_b = nd.edges[j];
                if cg.shared_lines(lg, edg_a, edg_b) == 0 {
                    continue;
                }

                // Names carry the node index so parallel edges meeting at
                // both endpoints stay distinct.
                let neg_col = lp.model_mut().add_col(
                    &format!("negdist({},{},{})", cn, edg_a, edg_b),
                    VarKind::Bin,
                    0.0,
                );

                let col_a = lp.model().var_by_name(&dir_var(cn, edg_a)).unwrap();
                let col_b = lp.model().var_by_name(&dir_var(cn, edg_b)).unwrap();

                let row_lo = lp.model_mut().add_row(
                    &format!("nc({},{},{})lo", cn, edg_a, edg_b),
                    0.0,
                    Sense::Lo,
                );
                let row_up = lp.model_mut().add_row(
                    &format!("nc({},{},{})up", cn, edg_a, edg_b),
                    m - 1.0,
                    Sense::Up,
                );
                for row in [row_lo, row_up] {
                    lp.model_mut().add_col_to_row(row, col_a, 1.0);
                    lp.model_mut().add_col_to_row(row, col_b, -1.0);
                    lp.model_mut().add_col_to_row(row, neg_col, m);
                }

                let row_ang = lp.model_mut().add_row(
                    &format!("ac({},{},{})", cn, edg_a, edg_b),
                    0.0,
                    Sense::Fix,
                );
                lp.model_mut().add_col_to_row(row_ang, col_a, 1.0);
                lp.model_mut().add_col_to_row(row_ang, col_b, -1.0);
                lp.model_mut().add_col_to_row(row_ang, neg_col, m);

                let row_sum = lp.model_mut().add_row(
                    &format!("asc({},{},{})", cn, edg_a, edg_b),
                    1.0,
                    Sense::Up,
                );

                for k in 0..max_deg - 1 {
                    let diff = k + 1;
                    let sev = crate::basegraph::port_ang(max_deg, 0, diff);
                    let prime = if diff > max_deg / 2 { "'" } else { "" };
                    let name = format!("d{}{}({},{},{})", sev, prime, cn, edg_a, edg_b);
                    let pen = bg.grid().costs.bend[sev];
                    let col = lp.model_mut().add_col(&name, VarKind::Bin, pen);
                    lp.model_mut().add_col_to_row(row_ang, col, -((k + 1) as f64));
                    lp.model_mut().add_col_to_row(row_sum, col, 1.0);
                }
            }
        }
    }

    cands
}

/// Decode the solved variables back into a drawing.
fn extract_solution(
    lp: &dyn IlpSolver,
    bg: &dyn BaseGraph,
    cg: &CombGraph,
    cands: &BTreeMap<usize, BTreeSet<NodeIdx>>,
    drawing: &mut Drawing,
) {
    let grid = bg.grid();

    // Station assignments.
    let mut grid_nds: BTreeMap<usize, NodeIdx> = BTreeMap::new();
    for (&cn, sinks) in cands {
        for &n in sinks {
            if let Some(col) = lp.model().var_by_name(&stat_pos_var(bg, n, cn)) {
                if lp.var_val(col) > 0.5 {
                    grid_nds.insert(cn, n);
                }
            }
        }
    }

    // Used grid edges per comb edge.
    let mut grid_edgs: BTreeMap<usize, BTreeSet<EdgeIdx>> = BTreeMap::new();
    for e in grid.graph.edgs() {
        for ce in 0..cg.edges.len() {
            if let Some(col) = lp.model().var_by_name(&edg_use_var(bg, e, ce)) {
                if lp.var_val(col) > 0.5 {
                    grid_edgs.entry(ce).or_default().insert(e);
                }
            }
        }
    }

    for (cn, &n) in &grid_nds {
        let pen = grid.nd_move_pen(cg.nodes[*cn].pos, n);
        drawing.assign(*cn, n, pen);
    }

    // Order each edge set into a directed walk from the start sink.
    for (ce, comb) in cg.edges.iter().enumerate() {
        let Some(used) = grid_edgs.get(&ce) else { continue };
        let (Some(&start), Some(&end)) = (grid_nds.get(&comb.from), grid_nds.get(&comb.to))
        else {
            continue;
        };

        let mut ordered = Vec::with_capacity(used.len());
        let mut consumed: BTreeSet<EdgeIdx> = BTreeSet::new();
        let mut cur = start;
        while cur != end && ordered.len() < used.len() {
            let next = grid
                .graph
                .adj_out(cur)
                .iter()
                .copied()
                .find(|e| used.contains(e) && !consumed.contains(e));
            let Some(e) = next else { break };
            consumed.insert(e);
            ordered.push(e);
            cur = grid.graph.to(e);
        }
        debug!(ce, edges = ordered.len(), "decoded ILP path");
        drawing.draw(ce, &ordered, grid);
    }
}

/// Turn the greedy drawing into a starter assignment: station positions,
/// their unused bend and sink edges, and the drawn paths. Bend and
/// direction variables are left for the solver to complete.
pub fn extract_feasible_sol(
    drawing: &Drawing,
    bg: &dyn BaseGraph,
    cg: &CombGraph,
    max_gr_dist: f64,
) -> StarterSol {
    let grid = bg.grid();
    let mut sol = StarterSol::new();

    for (cn, nd) in cg.nodes.iter().enumerate() {
        if nd.deg() == 0 {
            continue;
        }
        let settled = drawing.sink_of(cn);
        for gnd in grid.candidate_sinks(nd.pos, max_gr_dist) {
            let var = stat_pos_var(bg, gnd, cn);
            if Some(gnd) == settled {
                sol.insert(var, 1.0);

                // A settled sink never uses its bend edges.
                for p in 0..grid.max_deg {
                    let Some(port) = grid.graph.nd(gnd).ports[p] else {
                        continue;
                    };
                    for e in grid.graph.adj_all(port) {
                        if !grid.graph.edg(e).secondary {
                            continue;
                        }
                        let other = grid.graph.other_nd(e, port);
                        if grid.graph.nd(other).sink {
                            continue;
                        }
                        for &ce in &nd.edges {
                            sol.insert(edg_use_var(bg, e, ce), 0.0);
                        }
                    }
                }
            } else {
                sol.insert(var, 0.0);

                // An unsettled candidate activates none of its sink edges.
                // When the same sink settles the edge's other endpoint its
                // entries are in use there; leave those to the solver.
                for &ce in &nd.edges {
                    let other = cg.other(ce, cn);
                    if drawing.sink_of(other) == Some(gnd) {
                        continue;
                    }
                    for e in grid.graph.adj_all(gnd) {
                        sol.insert(edg_use_var(bg, e, ce), 0.0);
                    }
                }
            }
        }
    }

    // Default every primary edge to unused, then raise the drawn paths.
    for e in grid.graph.edgs() {
        if grid.graph.edg(e).secondary {
            continue;
        }
        for ce in 0..cg.edges.len() {
            sol.insert(edg_use_var(bg, e, ce), 0.0);
        }
    }
    for (&ce, path) in drawing.paths() {
        for &e in path {
            sol.insert(edg_use_var(bg, e, ce), 1.0);
        }
    }

    sol
}
