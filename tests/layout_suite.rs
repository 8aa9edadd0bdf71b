use octimap::basegraph::BaseGraph;
use octimap::cli::build_grid;
use octimap::combgraph::CombGraph;
use octimap::config::{GridType, LayoutConfig};
use octimap::ilp::solver::solver_for;
use octimap::ilp::{create_problem, extract_feasible_sol};
use octimap::output::write_line_graph;
use octimap::parser::parse_line_graph;
use octimap::router::Router;

fn geojson(stations: &[(&str, f64, f64)], edges: &[(&str, &str, &str)]) -> String {
    geojson_with_adjacency(stations, edges, &[])
}

/// `adjacency` declares the clockwise edge order at a station; junctions
/// of degree ≥ 3 require one.
fn geojson_with_adjacency(
    stations: &[(&str, f64, f64)],
    edges: &[(&str, &str, &str)],
    adjacency: &[(&str, &[&str])],
) -> String {
    let mut features = Vec::new();
    for (id, x, y) in stations {
        let adjacent = adjacency
            .iter()
            .find(|(s, _)| s == id)
            .map(|(_, list)| {
                let quoted: Vec<String> = list.iter().map(|e| format!("\"{e}\"")).collect();
                format!(r#", "adjacent": [{}]"#, quoted.join(","))
            })
            .unwrap_or_default();
        features.push(format!(
            r#"{{"type": "Feature", "geometry": {{"type": "Point", "coordinates": [{x}, {y}]}},
                "properties": {{"id": "{id}"{adjacent}}}}}"#
        ));
    }
    for (id, from, to) in edges {
        let (fx, fy) = stations
            .iter()
            .find(|(s, _, _)| s == from)
            .map(|(_, x, y)| (*x, *y))
            .unwrap();
        let (tx, ty) = stations
            .iter()
            .find(|(s, _, _)| s == to)
            .map(|(_, x, y)| (*x, *y))
            .unwrap();
        features.push(format!(
            r##"{{"type": "Feature",
                "geometry": {{"type": "LineString", "coordinates": [[{fx}, {fy}], [{tx}, {ty}]]}},
                "properties": {{"id": "{id}", "from": "{from}", "to": "{to}",
                               "lines": [{{"id": "l1", "label": "1", "color": "#e00"}}]}}}}"##
        ));
    }
    format!(
        r#"{{"type": "FeatureCollection", "features": [{}]}}"#,
        features.join(",")
    )
}

fn snapped_config() -> LayoutConfig {
    // Zero padding keeps stations exactly on sinks, which makes costs
    // exact in the assertions below.
    LayoutConfig {
        pad: 0.0,
        ..LayoutConfig::default()
    }
}

#[test]
fn single_horizontal_edge() {
    let input = geojson(&[("a", 0.0, 0.0), ("b", 1000.0, 0.0)], &[("e", "a", "b")]);
    let lg = parse_line_graph(&input).unwrap();
    let cg = CombGraph::build(&lg).unwrap();
    let config = snapped_config();
    let mut bg = build_grid(&lg, &cg, &config);
    let drawing = Router::new(&cg, config.max_gr_dist)
        .route(bg.as_mut())
        .unwrap();

    assert!((drawing.score() - 4.0 * config.horizontal_pen).abs() < 1e-9);
    assert_eq!(drawing.path(0).unwrap().len(), 4);

    let out = drawing.to_line_graph(&cg, &lg, bg.grid());
    assert_eq!(out.nodes.len(), 2);
    assert_eq!(out.edges.len(), 1);
    let geom = &out.edges[0].geom;
    assert!((geom.length() - 1000.0).abs() < 1e-6);
    for p in geom.points() {
        assert!(p.y.abs() < 1e-9, "edge must stay on its row");
    }
}

#[test]
fn right_angle_bend_beats_expensive_diagonals() {
    let input = geojson(&[("a", 0.0, 0.0), ("b", 500.0, 500.0)], &[("e", "a", "b")]);
    let lg = parse_line_graph(&input).unwrap();
    let cg = CombGraph::build(&lg).unwrap();
    let config = LayoutConfig {
        pad: 0.0,
        diagonal_pen: 5.0,
        ..LayoutConfig::default()
    };
    let mut bg = build_grid(&lg, &cg, &config);
    let drawing = Router::new(&cg, config.max_gr_dist)
        .route(bg.as_mut())
        .unwrap();

    let expect = 2.0 * config.horizontal_pen + 2.0 * config.vertical_pen + config.bend[2];
    assert!((drawing.score() - expect).abs() < 1e-9);
    assert_eq!(drawing.path(0).unwrap().len(), 4);
}

#[test]
fn crossing_diagonals_force_a_detour() {
    let input = geojson(
        &[
            ("a", 0.0, 0.0),
            ("b", 500.0, 500.0),
            ("c", 0.0, 500.0),
            ("d", 500.0, 0.0),
        ],
        &[("e1", "a", "b"), ("e2", "c", "d")],
    );
    let lg = parse_line_graph(&input).unwrap();
    let cg = CombGraph::build(&lg).unwrap();
    // Padding by one full cell keeps stations on sinks while leaving an
    // outer ring for the detour.
    let config = LayoutConfig {
        pad: 250.0,
        ..LayoutConfig::default()
    };
    let mut bg = build_grid(&lg, &cg, &config);
    let drawing = Router::new(&cg, config.max_gr_dist)
        .route(bg.as_mut())
        .unwrap();

    let p1 = drawing.path(0).unwrap();
    let p2 = drawing.path(1).unwrap();
    assert!(!p1.is_empty() && !p2.is_empty());
    for e in p1 {
        assert!(!p2.contains(e), "paths must not share grid edges");
    }

    // No crossing pair may be reserved on both sides.
    let grid = bg.grid();
    for ((ea, eb), (fa, fb)) in bg.cross_edg_pairs() {
        let first = !grid.graph.edg(ea).res_edgs.is_empty()
            || !grid.graph.edg(eb).res_edgs.is_empty();
        let second = !grid.graph.edg(fa).res_edgs.is_empty()
            || !grid.graph.edg(fb).res_edgs.is_empty();
        assert!(!(first && second), "crossing diagonals both in use");
    }

    // The first edge takes the cheap diagonal; the second pays a detour.
    let costs: Vec<f64> = [p1, p2]
        .iter()
        .map(|path| path.iter().map(|&e| grid.graph.edg(e).raw_cost()).sum())
        .collect();
    let direct = 2.0 * config.diagonal_pen;
    assert!((costs[0] - direct).abs() < 1e-9);
    assert!(costs[1] > direct);
}

#[test]
fn hanan_grid_layout_works_end_to_end() {
    let input = geojson(
        &[("a", 0.0, 0.0), ("b", 300.0, 100.0), ("c", 100.0, 300.0)],
        &[("e1", "a", "b"), ("e2", "a", "c")],
    );
    let lg = parse_line_graph(&input).unwrap();
    let cg = CombGraph::build(&lg).unwrap();
    let config = LayoutConfig {
        pad: 0.0,
        grid_size: 100.0,
        grid_type: GridType::Octihanan,
        ..LayoutConfig::default()
    };
    let mut bg = build_grid(&lg, &cg, &config);
    assert_eq!(bg.grid().sinks.len(), 12);

    let drawing = Router::new(&cg, config.max_gr_dist)
        .route(bg.as_mut())
        .unwrap();
    assert!(drawing.path(0).is_some());
    assert!(drawing.path(1).is_some());
}

#[test]
fn deterministic_output_across_runs() {
    let input = geojson(
        &[
            ("a", 0.0, 0.0),
            ("b", 1000.0, 0.0),
            ("c", 500.0, 750.0),
            ("d", 1500.0, 750.0),
        ],
        &[("e1", "a", "b"), ("e2", "b", "c"), ("e3", "c", "d")],
    );
    let mut outputs = Vec::new();
    for _ in 0..2 {
        let lg = parse_line_graph(&input).unwrap();
        let cg = CombGraph::build(&lg).unwrap();
        let config = snapped_config();
        let mut bg = build_grid(&lg, &cg, &config);
        let drawing = Router::new(&cg, config.max_gr_dist)
            .route(bg.as_mut())
            .unwrap();
        outputs.push(write_line_graph(&drawing.to_line_graph(&cg, &lg, bg.grid())));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn warm_start_satisfies_assigned_constraint_rows() {
    let input = geojson(
        &[("a", 0.0, 0.0), ("b", 1000.0, 0.0), ("c", 500.0, 500.0)],
        &[("e1", "a", "b"), ("e2", "b", "c")],
    );
    let lg = parse_line_graph(&input).unwrap();
    let cg = CombGraph::build(&lg).unwrap();
    let config = snapped_config();
    let mut bg = build_grid(&lg, &cg, &config);
    let drawing = Router::new(&cg, config.max_gr_dist)
        .route(bg.as_mut())
        .unwrap();

    let starter = extract_feasible_sol(&drawing, bg.as_ref(), &cg, config.max_gr_dist);
    assert!(starter.values().any(|&v| v == 1.0));

    bg.grid_mut().reset();
    let mut lp = solver_for("cbc").unwrap();
    create_problem(bg.as_mut(), &cg, &lg, None, config.max_gr_dist, lp.as_mut());

    // Every constraint row whose variables are all fixed by the starter
    // must hold.
    lp.model().check_starter(&starter).unwrap();

    let mps = lp.model().to_mps();
    for section in ["ROWS", "COLUMNS", "RHS", "BOUNDS"] {
        assert!(mps.contains(section));
    }
}

#[test]
fn junction_ordering_rows_are_encoded() {
    // Three edges meet at d; the ILP must carry direction variables, one
    // vulnerable wrap slot, and the cyclic-order rows for d in the
    // declared clockwise order.
    let input = geojson_with_adjacency(
        &[
            ("a", 0.0, 500.0),
            ("b", 500.0, 1000.0),
            ("c", 1000.0, 500.0),
            ("d", 500.0, 500.0),
        ],
        &[("e1", "a", "d"), ("e2", "b", "d"), ("e3", "c", "d")],
        &[("d", &["e2", "e3", "e1"])],
    );
    let lg = parse_line_graph(&input).unwrap();
    let cg = CombGraph::build(&lg).unwrap();
    let config = snapped_config();
    let mut bg = build_grid(&lg, &cg, &config);

    let mut lp = solver_for("cbc").unwrap();
    create_problem(bg.as_mut(), &cg, &lg, None, config.max_gr_dist, lp.as_mut());
    let model = lp.model();

    let hub = cg.nodes.iter().position(|n| n.id == "d").unwrap();
    assert_eq!(cg.nodes[hub].deg(), 3);
    // The ordering is the declared one (e2, e3, e1), not a recomputed one.
    let declared: Vec<&str> = cg.nodes[hub]
        .ordering
        .iter()
        .map(|&ce| lg.edges[cg.edges[ce].children[0].line_edge].id.as_str())
        .collect();
    assert_eq!(declared, vec!["e2", "e3", "e1"]);
    assert!(model.has_row(&format!("vc({hub})")));
    for i in 0..3 {
        assert!(model.has_row(&format!("oc({hub},{i})")));
        assert!(model.var_by_name(&format!("vuln({hub},{i})")).is_some());
    }
    for &ce in &cg.nodes[hub].edges {
        assert!(model.var_by_name(&format!("d({hub},{ce})")).is_some());
    }
}

#[test]
fn orthogonal_grid_routes_with_four_directions() {
    let input = geojson(&[("a", 0.0, 0.0), ("b", 500.0, 500.0)], &[("e", "a", "b")]);
    let lg = parse_line_graph(&input).unwrap();
    let cg = CombGraph::build(&lg).unwrap();
    let config = LayoutConfig {
        pad: 0.0,
        grid_type: GridType::Ortho,
        ..LayoutConfig::default()
    };
    let mut bg = build_grid(&lg, &cg, &config);
    assert_eq!(bg.max_deg(), 4);
    let drawing = Router::new(&cg, config.max_gr_dist)
        .route(bg.as_mut())
        .unwrap();
    // Four axial hops and one 90° bend, no diagonals available.
    let expect = 2.0 * config.horizontal_pen + 2.0 * config.vertical_pen + config.bend[2];
    assert!((drawing.score() - expect).abs() < 1e-9);
}
