use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::basegraph::{BaseGraph, OctiGrid, OctiHananGrid, OrthoGrid};
use crate::combgraph::CombGraph;
use crate::config::{load_config, GridType, LayoutConfig};
use crate::error::LayoutError;
use crate::ilp::{optimize, IlpOpts};
use crate::ir::LineGraph;
use crate::output::{write_grid, write_line_graph};
use crate::parser::parse_line_graph;
use crate::router::Router;

#[derive(Parser, Debug)]
#[command(name = "octimap", version, about = "Octilinear transit map layout engine")]
pub struct Args {
    /// Input GeoJSON line graph, or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output GeoJSON. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Grid cell size in input units
    #[arg(long = "gridSize")]
    pub grid_size: Option<f64>,

    /// Bounding-box padding
    #[arg(long = "pad")]
    pub pad: Option<f64>,

    /// Grid variant
    #[arg(short = 'g', long = "gridType", value_enum)]
    pub grid_type: Option<GridTypeArg>,

    /// Hanan enrichment rounds
    #[arg(long = "hananIters")]
    pub hanan_iters: Option<usize>,

    /// Candidate-sink radius in cells
    #[arg(long = "maxGrDist")]
    pub max_gr_dist: Option<f64>,

    /// Refine the greedy drawing with the ILP
    #[arg(long = "ilp")]
    pub ilp: bool,

    /// Build and write the ILP without solving it
    #[arg(long = "ilpNoSolve")]
    pub ilp_no_solve: bool,

    /// Solver time limit in seconds
    #[arg(long = "ilpTimeLim")]
    pub ilp_time_lim: Option<u64>,

    /// Solver backend name (cbc, glpk)
    #[arg(long = "ilpSolver")]
    pub ilp_solver: Option<String>,

    /// Solver thread count (0 = solver default)
    #[arg(long = "ilpNumThreads")]
    pub ilp_num_threads: Option<usize>,

    /// Directory for cached solutions of identical problems
    #[arg(long = "ilpCacheDir")]
    pub ilp_cache_dir: Option<PathBuf>,

    /// Minimum solve seconds before a solution is cached
    #[arg(long = "ilpCacheThreshold")]
    pub ilp_cache_threshold: Option<f64>,

    /// Write the problem as <base>.mps and the warm start as <base>.mst
    #[arg(long = "ilpPath")]
    pub ilp_path: Option<PathBuf>,

    /// Dump the grid graph as GeoJSON to this path
    #[arg(long = "gridDump")]
    pub grid_dump: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum GridTypeArg {
    Ortho,
    Octi,
    Octihanan,
}

impl From<GridTypeArg> for GridType {
    fn from(value: GridTypeArg) -> Self {
        match value {
            GridTypeArg::Ortho => GridType::Ortho,
            GridTypeArg::Octi => GridType::Octi,
            GridTypeArg::Octihanan => GridType::Octihanan,
        }
    }
}

/// Run the CLI. Returns the process exit code: 0 on success, 2 when the
/// ILP hit its time limit and the feasible incumbent was returned.
pub fn run() -> Result<i32> {
    init_tracing();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let input = read_input(args.input.as_deref())?;
    let lg = parse_line_graph(&input)?;
    let cg = CombGraph::build(&lg)?;
    info!(
        stations = cg.nodes.len(),
        edges = cg.edges.len(),
        "comb graph built"
    );

    let mut bg = build_grid(&lg, &cg, &config);
    info!(
        sinks = bg.grid().sinks.len(),
        grid_edges = bg.grid().graph.edg_count(),
        "grid graph built"
    );

    let mut drawing = Router::new(&cg, config.max_gr_dist).route(bg.as_mut())?;
    info!(cost = drawing.score(), "greedy drawing complete");

    let mut exit_code = 0;
    if config.ilp.enable || args.ilp || args.ilp_no_solve {
        let opts = IlpOpts {
            time_lim: config.ilp.time_lim,
            cache_dir: config.ilp.cache_dir.clone(),
            cache_threshold: config.ilp.cache_threshold,
            num_threads: config.ilp.num_threads,
            solver: config.ilp.solver.clone(),
            no_solve: args.ilp_no_solve,
            path: args.ilp_path.clone(),
        };
        let greedy = drawing.clone();
        match optimize(
            bg.as_mut(),
            &cg,
            &lg,
            &mut drawing,
            config.max_gr_dist,
            None,
            &opts,
        ) {
            Ok(stats) => {
                info!(
                    score = stats.score,
                    rows = stats.rows,
                    cols = stats.cols,
                    time_ms = stats.time_ms,
                    optimal = stats.optimal,
                    "ILP finished"
                );
                if opts.no_solve {
                    drawing = greedy;
                } else if !stats.optimal {
                    exit_code = 2;
                }
            }
            Err(LayoutError::SolverTimeout) => {
                warn!("solver hit the time limit without an incumbent, keeping the greedy drawing");
                drawing = greedy;
                exit_code = 2;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(path) = &args.grid_dump {
        std::fs::write(path, write_grid(bg.grid()))?;
    }

    let out = write_line_graph(&drawing.to_line_graph(&cg, &lg, bg.grid()));
    write_output(&out, args.output.as_deref())?;

    Ok(exit_code)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn apply_overrides(config: &mut LayoutConfig, args: &Args) {
    if let Some(v) = args.grid_size {
        config.grid_size = v;
    }
    if let Some(v) = args.pad {
        config.pad = v;
    }
    if let Some(v) = args.grid_type {
        config.grid_type = v.into();
    }
    if let Some(v) = args.hanan_iters {
        config.hanan_iters = v.max(1);
    }
    if let Some(v) = args.max_gr_dist {
        config.max_gr_dist = v.max(1.0);
    }
    if args.ilp {
        config.ilp.enable = true;
    }
    if let Some(v) = args.ilp_time_lim {
        config.ilp.time_lim = Some(v);
    }
    if let Some(v) = &args.ilp_solver {
        config.ilp.solver = v.clone();
    }
    if let Some(v) = args.ilp_num_threads {
        config.ilp.num_threads = v;
    }
    if let Some(v) = &args.ilp_cache_dir {
        config.ilp.cache_dir = Some(v.clone());
    }
    if let Some(v) = args.ilp_cache_threshold {
        config.ilp.cache_threshold = v;
    }
}

/// Build the configured grid variant over the padded bounding box.
pub fn build_grid(lg: &LineGraph, cg: &CombGraph, config: &LayoutConfig) -> Box<dyn BaseGraph> {
    let bbox = if lg.bbox().is_empty() {
        crate::geo::BBox {
            lower_left: crate::geo::Point::new(0.0, 0.0),
            upper_right: crate::geo::Point::new(config.grid_size, config.grid_size),
        }
    } else {
        lg.bbox().pad(config.pad)
    };
    let costs = config.grid_costs();
    let stations: Vec<crate::geo::Point> = cg.nodes.iter().map(|n| n.pos).collect();

    let mut bg: Box<dyn BaseGraph> = match config.grid_type {
        GridType::Ortho => Box::new(OrthoGrid::new(bbox, config.grid_size, costs)),
        GridType::Octi => Box::new(OctiGrid::new(bbox, config.grid_size, costs)),
        GridType::Octihanan => Box::new(OctiHananGrid::new(
            bbox,
            config.grid_size,
            costs,
            config.hanan_iters,
        )),
    };
    bg.init(&stations);
    bg
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path == Path::new("-") {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            return Ok(buf);
        }
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn write_output(out: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, out)?,
        None => println!("{out}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_type_arg_maps_to_config() {
        assert_eq!(GridType::from(GridTypeArg::Ortho), GridType::Ortho);
        assert_eq!(GridType::from(GridTypeArg::Octi), GridType::Octi);
        assert_eq!(GridType::from(GridTypeArg::Octihanan), GridType::Octihanan);
    }

    #[test]
    fn build_grid_handles_empty_input() {
        let lg = LineGraph::new();
        let cg = CombGraph::build(&lg).unwrap();
        let config = LayoutConfig::default();
        let bg = build_grid(&lg, &cg, &config);
        assert!(bg.grid().sinks.len() >= 4);
    }
}
