use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::basegraph::GridCosts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridType {
    Ortho,
    Octi,
    Octihanan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IlpSettings {
    pub enable: bool,
    /// Solver time limit in seconds; `None` lets the solver run to
    /// optimality.
    pub time_lim: Option<u64>,
    pub cache_dir: Option<PathBuf>,
    /// Minimum solve time (seconds) before a solution is cached.
    pub cache_threshold: f64,
    /// 0 leaves the thread count to the solver.
    pub num_threads: usize,
    pub solver: String,
}

impl Default for IlpSettings {
    fn default() -> Self {
        Self {
            enable: false,
            time_lim: None,
            cache_dir: None,
            cache_threshold: f64::INFINITY,
            num_threads: 0,
            solver: "cbc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Grid cell size in input coordinate units.
    pub grid_size: f64,
    /// Bounding-box padding.
    pub pad: f64,
    pub grid_type: GridType,
    /// Hanan enrichment rounds (octihanan only).
    pub hanan_iters: usize,
    /// Candidate-sink radius in cells.
    pub max_gr_dist: f64,
    pub horizontal_pen: f64,
    pub vertical_pen: f64,
    pub diagonal_pen: f64,
    /// Bend penalty at 180°, 135°, 90°, 45°.
    pub bend: [f64; 4],
    pub ilp: IlpSettings,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            grid_size: 250.0,
            pad: 100.0,
            grid_type: GridType::Octi,
            hanan_iters: 1,
            max_gr_dist: 3.0,
            horizontal_pen: 1.0,
            vertical_pen: 1.0,
            diagonal_pen: 1.5,
            bend: [0.0, 1.0, 1.5, 2.0],
            ilp: IlpSettings::default(),
        }
    }
}

impl LayoutConfig {
    pub fn heur_hop_cost(&self) -> f64 {
        self.horizontal_pen
            .min(self.vertical_pen)
            .min(self.diagonal_pen)
    }

    pub fn grid_costs(&self) -> GridCosts {
        GridCosts {
            horizontal_pen: self.horizontal_pen,
            vertical_pen: self.vertical_pen,
            diagonal_pen: self.diagonal_pen,
            bend: self.bend,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct IlpConfigFile {
    enable: Option<bool>,
    time_lim: Option<u64>,
    cache_dir: Option<PathBuf>,
    cache_threshold: Option<f64>,
    num_threads: Option<usize>,
    solver: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ConfigFile {
    grid_size: Option<f64>,
    pad: Option<f64>,
    grid_type: Option<GridType>,
    hanan_iters: Option<usize>,
    max_gr_dist: Option<f64>,
    horizontal_pen: Option<f64>,
    vertical_pen: Option<f64>,
    diagonal_pen: Option<f64>,
    bend: Option<[f64; 4]>,
    ilp: Option<IlpConfigFile>,
}

/// Load a JSON config file and merge it over the defaults. A missing
/// path yields the defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<LayoutConfig> {
    let mut config = LayoutConfig::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed: ConfigFile = serde_json::from_str(&contents)?;

    if let Some(v) = parsed.grid_size {
        config.grid_size = v;
    }
    if let Some(v) = parsed.pad {
        config.pad = v;
    }
    if let Some(v) = parsed.grid_type {
        config.grid_type = v;
    }
    if let Some(v) = parsed.hanan_iters {
        config.hanan_iters = v.max(1);
    }
    if let Some(v) = parsed.max_gr_dist {
        config.max_gr_dist = v.max(1.0);
    }
    if let Some(v) = parsed.horizontal_pen {
        config.horizontal_pen = v;
    }
    if let Some(v) = parsed.vertical_pen {
        config.vertical_pen = v;
    }
    if let Some(v) = parsed.diagonal_pen {
        config.diagonal_pen = v;
    }
    if let Some(v) = parsed.bend {
        config.bend = v;
    }
    if let Some(ilp) = parsed.ilp {
        if let Some(v) = ilp.enable {
            config.ilp.enable = v;
        }
        if let Some(v) = ilp.time_lim {
            config.ilp.time_lim = Some(v);
        }
        if let Some(v) = ilp.cache_dir {
            config.ilp.cache_dir = Some(v);
        }
        if let Some(v) = ilp.cache_threshold {
            config.ilp.cache_threshold = v;
        }
        if let Some(v) = ilp.num_threads {
            config.ilp.num_threads = v;
        }
        if let Some(v) = ilp.solver {
            config.ilp.solver = v;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = LayoutConfig::default();
        assert_eq!(c.grid_size, 250.0);
        assert_eq!(c.pad, 100.0);
        assert_eq!(c.grid_type, GridType::Octi);
        assert_eq!(c.hanan_iters, 1);
        assert_eq!(c.max_gr_dist, 3.0);
        assert_eq!(c.heur_hop_cost(), 1.0);
        assert!(!c.ilp.enable);
    }

    #[test]
    fn heur_hop_cost_is_min_axis_penalty() {
        let c = LayoutConfig {
            horizontal_pen: 3.0,
            vertical_pen: 2.0,
            diagonal_pen: 4.0,
            ..Default::default()
        };
        assert_eq!(c.heur_hop_cost(), 2.0);
    }

    #[test]
    fn config_file_merges_over_defaults() {
        let dir = std::env::temp_dir().join("octimap-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{"gridSize": 100, "gridType": "octihanan",
               "ilp": {"enable": true, "solver": "glpk", "timeLim": 30}}"#,
        )
        .unwrap();
        let c = load_config(Some(&path)).unwrap();
        assert_eq!(c.grid_size, 100.0);
        assert_eq!(c.grid_type, GridType::Octihanan);
        assert_eq!(c.pad, 100.0);
        assert!(c.ilp.enable);
        assert_eq!(c.ilp.solver, "glpk");
        assert_eq!(c.ilp.time_lim, Some(30));
    }
}
