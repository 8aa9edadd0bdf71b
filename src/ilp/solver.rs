//! Solver-agnostic MIP model plus subprocess backends. The model is
//! written out as free MPS together with a warm-start file; any solver
//! that reads MPS can be driven this way.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use blake2::{Blake2b512, Digest};
use tracing::{debug, info, warn};

use crate::error::LayoutError;

/// A feasible assignment handed to the solver: variable name → value.
pub type StarterSol = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Bin,
    Int,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sense {
    /// Equality.
    Fix,
    /// Row sum ≤ rhs.
    Up,
    /// Row sum ≥ rhs.
    Lo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    /// Feasible incumbent, stopped early (time limit).
    Feasible,
    Infeasible,
}

#[derive(Debug, Clone)]
struct Col {
    name: String,
    kind: VarKind,
    obj: f64,
    lo: f64,
    up: f64,
}

#[derive(Debug, Clone)]
struct Row {
    name: String,
    sense: Sense,
    rhs: f64,
    coefs: Vec<(usize, f64)>,
}

/// In-memory MIP: columns, rows and coefficients, with name lookup.
#[derive(Debug, Clone, Default)]
pub struct Model {
    cols: Vec<Col>,
    rows: Vec<Row>,
    by_name: HashMap<String, usize>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, name: &str, rhs: f64, sense: Sense) -> usize {
        self.rows.push(Row {
            name: name.to_string(),
            sense,
            rhs,
            coefs: Vec::new(),
        });
        self.rows.len() - 1
    }

    pub fn add_col(&mut self, name: &str, kind: VarKind, obj: f64) -> usize {
        let (lo, up) = (0.0, 1.0);
        self.push_col(name, kind, obj, lo, up)
    }

    pub fn add_int_col(&mut self, name: &str, obj: f64, lo: f64, up: f64) -> usize {
        self.push_col(name, VarKind::Int, obj, lo, up)
    }

    fn push_col(&mut self, name: &str, kind: VarKind, obj: f64, lo: f64, up: f64) -> usize {
        let idx = self.cols.len();
        self.cols.push(Col {
            name: name.to_string(),
            kind,
            obj,
            lo,
            up,
        });
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    pub fn add_col_to_row(&mut self, row: usize, col: usize, coef: f64) {
        self.rows[row].coefs.push((col, coef));
    }

    pub fn var_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn has_row(&self, name: &str) -> bool {
        self.rows.iter().any(|r| r.name == name)
    }

    pub fn col_name(&self, col: usize) -> &str {
        &self.cols[col].name
    }

    pub fn obj_coef(&self, col: usize) -> f64 {
        self.cols[col].obj
    }

    pub fn num_vars(&self) -> usize {
        self.cols.len()
    }

    pub fn num_constrs(&self) -> usize {
        self.rows.len()
    }

    /// Verify a partial assignment: every row whose variables are all
    /// assigned must hold. Rows touching unassigned variables are skipped.
    pub fn check_starter(&self, sol: &StarterSol) -> Result<(), String> {
        for row in &self.rows {
            let mut sum = 0.0;
            let mut complete = true;
            for &(col, coef) in &row.coefs {
                match sol.get(&self.cols[col].name) {
                    Some(v) => sum += coef * v,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            let ok = match row.sense {
                Sense::Fix => (sum - row.rhs).abs() < 1e-6,
                Sense::Up => sum <= row.rhs + 1e-6,
                Sense::Lo => sum >= row.rhs - 1e-6,
            };
            if !ok {
                return Err(format!(
                    "row {} violated: sum {} vs rhs {}",
                    row.name, sum, row.rhs
                ));
            }
        }
        Ok(())
    }

    /// Serialize as free MPS. All variables are integral, so the whole
    /// COLUMNS section sits inside one INTORG/INTEND marker pair.
    pub fn to_mps(&self) -> String {
        let mut out = String::new();
        out.push_str("NAME octimap\n");
        out.push_str("ROWS\n");
        out.push_str(" N COST\n");
        for row in &self.rows {
            let tag = match row.sense {
                Sense::Fix => "E",
                Sense::Up => "L",
                Sense::Lo => "G",
            };
            let _ = writeln!(out, " {} {}", tag, row.name);
        }
        out.push_str("COLUMNS\n");
        out.push_str("    MARKER    'MARKER'    'INTORG'\n");
        let mut col_coefs: Vec<Vec<(usize, f64)>> = vec![Vec::new(); self.cols.len()];
        for (ri, row) in self.rows.iter().enumerate() {
            for &(c, coef) in &row.coefs {
                col_coefs[c].push((ri, coef));
            }
        }
        for (ci, col) in self.cols.iter().enumerate() {
            if col.obj != 0.0 {
                let _ = writeln!(out, "    {} COST {}", col.name, col.obj);
            }
            for &(ri, coef) in &col_coefs[ci] {
                let _ = writeln!(out, "    {} {} {}", col.name, self.rows[ri].name, coef);
            }
        }
        out.push_str("    MARKER    'MARKER'    'INTEND'\n");
        out.push_str("RHS\n");
        for row in &self.rows {
            if row.rhs != 0.0 {
                let _ = writeln!(out, "    RHS {} {}", row.name, row.rhs);
            }
        }
        out.push_str("BOUNDS\n");
        for col in &self.cols {
            match col.kind {
                VarKind::Bin => {
                    let _ = writeln!(out, " BV BND {}", col.name);
                }
                VarKind::Int => {
                    let _ = writeln!(out, " LI BND {} {}", col.name, col.lo as i64);
                    let _ = writeln!(out, " UI BND {} {}", col.name, col.up as i64);
                }
            }
        }
        out.push_str("ENDATA\n");
        out
    }
}

/// Dynamic dispatch over MPS-capable backends.
pub trait IlpSolver {
    fn model(&self) -> &Model;
    fn model_mut(&mut self) -> &mut Model;

    fn set_starter(&mut self, sol: &StarterSol);
    fn set_time_lim(&mut self, secs: u64);
    fn set_num_threads(&mut self, n: usize);
    fn set_cache_dir(&mut self, dir: &Path);
    fn set_cache_threshold(&mut self, secs: f64);

    fn write_mps(&self, path: &Path) -> std::io::Result<()>;
    fn write_mst(&self, path: &Path, sol: &StarterSol) -> std::io::Result<()>;

    fn solve(&mut self) -> Result<SolveStatus, LayoutError>;
    /// Value of a column in the incumbent, by index.
    fn var_val(&self, col: usize) -> f64;
    fn obj_val(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Cbc,
    Glpk,
}

impl Backend {
    fn binary(self) -> &'static str {
        match self {
            Backend::Cbc => "cbc",
            Backend::Glpk => "glpsol",
        }
    }
}

/// Instantiate a solver by name. Names follow the binaries: "cbc" and
/// "glpk" are supported.
pub fn solver_for(name: &str) -> Result<Box<dyn IlpSolver>, LayoutError> {
    let backend = match name {
        "cbc" | "coin" => Backend::Cbc,
        "glpk" | "glpsol" => Backend::Glpk,
        other => return Err(LayoutError::SolverUnavailable(other.to_string())),
    };
    Ok(Box::new(SubprocessSolver {
        model: Model::new(),
        backend,
        starter: StarterSol::new(),
        time_lim: None,
        num_threads: 0,
        cache_dir: None,
        cache_threshold: f64::INFINITY,
        values: HashMap::new(),
        obj: f64::INFINITY,
    }))
}

struct SubprocessSolver {
    model: Model,
    backend: Backend,
    starter: StarterSol,
    time_lim: Option<u64>,
    num_threads: usize,
    cache_dir: Option<PathBuf>,
    cache_threshold: f64,
    values: HashMap<String, f64>,
    obj: f64,
}

impl SubprocessSolver {
    fn workdir(&self) -> PathBuf {
        std::env::temp_dir().join("octimap-ilp")
    }

    fn run_backend(&self, mps: &Path, mst: &Path, sol_out: &Path) -> Result<(), LayoutError> {
        let mut cmd = Command::new(self.backend.binary());
        match self.backend {
            Backend::Cbc => {
                cmd.arg(mps);
                if !self.starter.is_empty() {
                    cmd.arg("mips").arg(mst);
                }
                if let Some(lim) = self.time_lim {
                    cmd.arg("sec").arg(lim.to_string());
                }
                if self.num_threads > 0 {
                    cmd.arg("threads").arg(self.num_threads.to_string());
                }
                cmd.arg("solve").arg("solution").arg(sol_out);
            }
            Backend::Glpk => {
                cmd.arg("--freemps").arg(mps);
                if let Some(lim) = self.time_lim {
                    cmd.arg("--tmlim").arg(lim.to_string());
                }
                cmd.arg("-o").arg(sol_out);
            }
        }
        debug!(solver = self.backend.binary(), "invoking external solver");
        let status = cmd
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map_err(|_| LayoutError::SolverUnavailable(self.backend.binary().to_string()))?;
        if !status.success() && !sol_out.exists() {
            return Err(LayoutError::SolverUnavailable(
                self.backend.binary().to_string(),
            ));
        }
        Ok(())
    }

    fn parse_solution(&mut self, text: &str) -> Result<SolveStatus, LayoutError> {
        match self.backend {
            Backend::Cbc => self.parse_cbc(text),
            Backend::Glpk => self.parse_glpk(text),
        }
    }

    fn parse_cbc(&mut self, text: &str) -> Result<SolveStatus, LayoutError> {
        let mut lines = text.lines();
        let header = lines.next().unwrap_or_default();
        let status = if header.starts_with("Optimal") {
            SolveStatus::Optimal
        } else if header.starts_with("Infeasible") {
            return Err(LayoutError::NoSolution);
        } else if header.contains("objective value") {
            SolveStatus::Feasible
        } else {
            return Err(LayoutError::SolverTimeout);
        };
        if let Some(obj) = header
            .rsplit("objective value")
            .next()
            .and_then(|s| s.trim().parse::<f64>().ok())
        {
            self.obj = obj;
        }
        for line in lines {
            let mut parts = line.split_whitespace();
            let _idx = parts.next();
            let (Some(name), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if let Ok(v) = val.parse::<f64>() {
                self.values.insert(name.to_string(), v);
            }
        }
        Ok(status)
    }

    fn parse_glpk(&mut self, text: &str) -> Result<SolveStatus, LayoutError> {
        let mut status = SolveStatus::Feasible;
        for line in text.lines() {
            if let Some(rest) = line.strip_prefix("Status:") {
                let rest = rest.trim();
                if rest.contains("OPTIMAL") {
                    status = SolveStatus::Optimal;
                } else if rest.contains("EMPTY") || rest.contains("INFEASIBLE") {
                    return Err(LayoutError::NoSolution);
                }
            }
            if let Some(rest) = line.strip_prefix("Objective:") {
                if let Some(eq) = rest.split('=').nth(1) {
                    if let Some(v) = eq.trim().split_whitespace().next() {
                        if let Ok(obj) = v.parse::<f64>() {
                            self.obj = obj;
                        }
                    }
                }
            }
        }

        // Column table: "  No. Column name  ...  Activity ..." followed by
        // one row per variable.
        let mut in_cols = false;
        for line in text.lines() {
            if line.trim_start().starts_with("No.") && line.contains("Column name") {
                in_cols = true;
                continue;
            }
            if !in_cols {
                continue;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                in_cols = false;
                continue;
            }
            if trimmed.starts_with('-') {
                continue;
            }
            let mut parts = trimmed.split_whitespace();
            let Some(first) = parts.next() else { continue };
            if first.parse::<usize>().is_err() {
                continue;
            }
            let Some(name) = parts.next() else { continue };
            for tok in parts {
                if tok == "*" {
                    continue;
                }
                if let Ok(v) = tok.parse::<f64>() {
                    self.values.insert(name.to_string(), v);
                    break;
                }
                break;
            }
        }
        Ok(status)
    }
}

impl IlpSolver for SubprocessSolver {
    fn model(&self) -> &Model {
        &self.model
    }

    fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    fn set_starter(&mut self, sol: &StarterSol) {
        self.starter = sol.clone();
    }

    fn set_time_lim(&mut self, secs: u64) {
        self.time_lim = Some(secs);
    }

    fn set_num_threads(&mut self, n: usize) {
        self.num_threads = n;
    }

    fn set_cache_dir(&mut self, dir: &Path) {
        self.cache_dir = Some(dir.to_path_buf());
    }

    fn set_cache_threshold(&mut self, secs: f64) {
        self.cache_threshold = secs;
    }

    fn write_mps(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.model.to_mps())
    }

    fn write_mst(&self, path: &Path, sol: &StarterSol) -> std::io::Result<()> {
        let mut f = std::fs::File::create(path)?;
        writeln!(f, "# warm start")?;
        for (name, val) in sol {
            writeln!(f, "{} {}", name, val)?;
        }
        Ok(())
    }

    fn solve(&mut self) -> Result<SolveStatus, LayoutError> {
        let mps_text = self.model.to_mps();
        let hash = {
            let mut hasher = Blake2b512::new();
            hasher.update(mps_text.as_bytes());
            let digest = hasher.finalize();
            digest.iter().take(16).fold(String::new(), |mut acc, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            })
        };

        // Re-use a cached solution for an identical problem.
        if let Some(dir) = &self.cache_dir {
            let cached = dir.join(format!("{hash}.sol"));
            if cached.is_file() {
                info!(%hash, "re-using cached ILP solution");
                let text = std::fs::read_to_string(&cached)
                    .map_err(|_| LayoutError::SolverUnavailable("cache".into()))?;
                return self.parse_solution(&text);
            }
        }

        let dir = self.workdir();
        std::fs::create_dir_all(&dir)
            .map_err(|_| LayoutError::SolverUnavailable(self.backend.binary().to_string()))?;
        let mps = dir.join(format!("{hash}.mps"));
        let mst = dir.join(format!("{hash}.mst"));
        let sol_out = dir.join(format!("{hash}.sol"));
        std::fs::write(&mps, &mps_text)
            .map_err(|_| LayoutError::SolverUnavailable(self.backend.binary().to_string()))?;
        if !self.starter.is_empty() {
            let starter = self.starter.clone();
            let _ = self.write_mst(&mst, &starter);
        }

        let started = Instant::now();
        self.run_backend(&mps, &mst, &sol_out)?;
        let elapsed = started.elapsed().as_secs_f64();

        let text = std::fs::read_to_string(&sol_out).map_err(|_| LayoutError::SolverTimeout)?;
        let status = self.parse_solution(&text)?;

        if elapsed >= self.cache_threshold {
            if let Some(cache) = &self.cache_dir {
                if std::fs::create_dir_all(cache).is_ok() {
                    if let Err(err) = std::fs::copy(&sol_out, cache.join(format!("{hash}.sol"))) {
                        warn!(%err, "could not populate ILP cache");
                    }
                }
            }
        }
        Ok(status)
    }

    fn var_val(&self, col: usize) -> f64 {
        self.values
            .get(self.model.col_name(col))
            .copied()
            .unwrap_or(0.0)
    }

    fn obj_val(&self) -> f64 {
        self.obj
    }
}
