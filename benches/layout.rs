use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use octimap::cli::build_grid;
use octimap::combgraph::CombGraph;
use octimap::config::LayoutConfig;
use octimap::geo::{Point, PolyLine};
use octimap::ir::{Line, LineEdge, LineGraph, LineNode};
use octimap::router::Router;

/// A ladder network: two parallel rows of stations with rungs between
/// them, `n` stations per row. Row 1 sits north of row 0.
fn ladder(n: usize) -> LineGraph {
    let mut lg = LineGraph::new();
    for row in 0..2 {
        for i in 0..n {
            let id = format!("s{row}_{i}");
            lg.nodes.insert(
                id.clone(),
                LineNode {
                    id,
                    pos: Point::new(i as f64 * 500.0, row as f64 * 500.0),
                    stops: Vec::new(),
                    adjacent: Vec::new(),
                },
            );
        }
    }
    let line = Line {
        id: "l1".into(),
        label: "1".into(),
        color: "#c00".into(),
    };
    let mut add = |from: String, to: String| {
        let id = format!("{from}-{to}");
        lg.edges.push(LineEdge {
            id,
            from,
            to,
            lines: vec![line.clone()],
            geom: PolyLine::new(),
        });
    };
    for row in 0..2 {
        for i in 1..n {
            add(format!("s{row}_{}", i - 1), format!("s{row}_{i}"));
        }
    }
    for i in 0..n {
        add(format!("s0_{i}"), format!("s1_{i}"));
    }

    // Clockwise adjacency from north at every station.
    for row in 0..2usize {
        for i in 0..n {
            let id = format!("s{row}_{i}");
            let west = (i > 0).then(|| format!("s{row}_{}-s{row}_{i}", i - 1));
            let east = (i + 1 < n).then(|| format!("s{row}_{i}-s{row}_{}", i + 1));
            let rung = format!("s0_{i}-s1_{i}");
            let mut adjacent = Vec::new();
            if row == 0 {
                adjacent.push(rung);
                adjacent.extend(east);
                adjacent.extend(west);
            } else {
                adjacent.extend(east);
                adjacent.push(rung);
                adjacent.extend(west);
            }
            lg.nodes.get_mut(&id).unwrap().adjacent = adjacent;
        }
    }
    lg
}

fn bench_grid_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_build");
    for n in [4usize, 8] {
        let lg = ladder(n);
        let cg = CombGraph::build(&lg).unwrap();
        let config = LayoutConfig::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(build_grid(&lg, &cg, &config)))
        });
    }
    group.finish();
}

fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");
    for n in [4usize, 8] {
        let lg = ladder(n);
        let cg = CombGraph::build(&lg).unwrap();
        let config = LayoutConfig::default();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let mut bg = build_grid(&lg, &cg, &config);
                let drawing = Router::new(&cg, config.max_gr_dist)
                    .route(bg.as_mut())
                    .expect("ladder layout is feasible");
                black_box(drawing.score())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_grid_build, bench_route);
criterion_main!(benches);
