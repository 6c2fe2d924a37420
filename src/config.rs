// src/config.rs
//
// Run configuration: read from TOML, echoed to `config.json` in the output
// directory so every run records exactly what it was asked to do.
//
// Per-axis lists accept one entry (applied to every axis), one entry per
// active axis (x, z in 2-D; x, y, z in 3-D), or three entries.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::amr::hierarchy::Hierarchy;
use crate::amr::rect::Rect3i;
use crate::error::{PicError, Result};
use crate::evolve::{RunControl, Simulation};
use crate::ghost::PeriodicCopy;
use crate::grid::{Geometry, SpaceDim};
use crate::initial_states::{init_standing_wave, init_uniform, load_lattice, LatticeLoad, StandingWave};
use crate::maxwell::FieldEvolver;
use crate::params::{PhysConst, SolverOrders, C_SI, MU0_SI};
use crate::particles::{NoParticles, ParticleContainer, ParticleSet, Species};
use crate::plotfile::PlotFileWriter;
use crate::stencil::staggered_coefficients;
use crate::time_step::TimeStepController;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub run: RunSection,
    #[serde(default)]
    pub numerics: NumericsConfig,
    #[serde(default)]
    pub physics: PhysicsConfig,
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub refinement: Vec<RefinementConfig>,
    #[serde(default)]
    pub init: InitConfig,
    #[serde(default)]
    pub species: Vec<SpeciesConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    pub max_step: usize,
    pub stop_time: f64,
    /// Steps between snapshots; zero or negative disables output.
    #[serde(default)]
    pub plot_interval: i64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub plot_png: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("runs")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericsConfig {
    #[serde(default = "default_cfl")]
    pub cfl: f64,
    #[serde(default = "default_stencil_order")]
    pub stencil_order: Vec<usize>,
    #[serde(default = "default_shape_order")]
    pub shape_order: Vec<usize>,
    /// Defaults to the width the stencil and particle shape need.
    #[serde(default)]
    pub ghost_cells: Option<usize>,
}

fn default_cfl() -> f64 {
    0.95
}

fn default_stencil_order() -> Vec<usize> {
    vec![2]
}

fn default_shape_order() -> Vec<usize> {
    vec![1]
}

impl Default for NumericsConfig {
    fn default() -> Self {
        Self {
            cfl: default_cfl(),
            stencil_order: default_stencil_order(),
            shape_order: default_shape_order(),
            ghost_cells: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhysicsConfig {
    #[serde(default = "default_c")]
    pub speed_of_light: f64,
    #[serde(default = "default_mu0")]
    pub mu0: f64,
}

fn default_c() -> f64 {
    C_SI
}

fn default_mu0() -> f64 {
    MU0_SI
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            speed_of_light: C_SI,
            mu0: MU0_SI,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeometryConfig {
    pub dim: usize,
    pub n_cell: Vec<usize>,
    pub prob_lo: Vec<f64>,
    pub prob_hi: Vec<f64>,
    #[serde(default = "default_periodic")]
    pub periodic: Vec<bool>,
    #[serde(default = "default_max_grid_size")]
    pub max_grid_size: usize,
}

fn default_periodic() -> Vec<bool> {
    vec![true]
}

fn default_max_grid_size() -> usize {
    32
}

/// A statically refined box, in the index space of the previous level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefinementConfig {
    /// Lower corner (inclusive).
    pub lo: Vec<isize>,
    /// Upper corner (exclusive).
    pub hi: Vec<isize>,
    #[serde(default = "default_ratio")]
    pub ref_ratio: usize,
    #[serde(default = "default_subcycle")]
    pub subcycle_ratio: i64,
}

fn default_ratio() -> usize {
    2
}

fn default_subcycle() -> i64 {
    2
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitConfig {
    #[default]
    None,
    Uniform {
        #[serde(default)]
        e: [f64; 3],
        #[serde(default)]
        b: [f64; 3],
    },
    StandingWave {
        amplitude: f64,
        axis: usize,
        polarization: usize,
        /// Defaults to the domain length along `axis`.
        #[serde(default)]
        wavelength: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeciesConfig {
    pub name: String,
    pub charge: f64,
    pub mass: f64,
    pub density: f64,
    #[serde(default = "default_per_cell")]
    pub per_cell: Vec<usize>,
    #[serde(default)]
    pub velocity: [f64; 3],
    #[serde(default)]
    pub thermal_speed: f64,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub level: usize,
}

fn default_per_cell() -> Vec<usize> {
    vec![1]
}

/// Expand a per-axis list to three entries; `fill` goes on the degenerate y axis in 2-D.
fn per_axis<T: Copy>(v: &[T], dim: SpaceDim, fill: T, what: &str) -> Result<[T; 3]> {
    match (v.len(), dim) {
        (1, _) => Ok([v[0]; 3]),
        (2, SpaceDim::Two) => Ok([v[0], fill, v[1]]),
        (3, _) => Ok([v[0], v[1], v[2]]),
        (n, d) => Err(PicError::InvalidConfig(format!(
            "{}: expected 1, {} or 3 entries, got {}",
            what,
            d.rank(),
            n
        ))),
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: RunConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn write_to_dir(&self, out_dir: &Path) -> Result<()> {
        fs::create_dir_all(out_dir)?;
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn dim(&self) -> Result<SpaceDim> {
        SpaceDim::from_rank(self.geometry.dim).ok_or_else(|| {
            PicError::InvalidConfig(format!("dim must be 2 or 3, got {}", self.geometry.dim))
        })
    }

    pub fn orders(&self) -> Result<SolverOrders> {
        let dim = self.dim()?;
        Ok(SolverOrders {
            stencil: per_axis(&self.numerics.stencil_order, dim, 2, "stencil_order")?,
            shape: per_axis(&self.numerics.shape_order, dim, 1, "shape_order")?,
        })
    }

    pub fn phys_const(&self) -> PhysConst {
        PhysConst {
            c: self.physics.speed_of_light,
            mu0: self.physics.mu0,
        }
    }

    pub fn n_ghost(&self) -> Result<usize> {
        let orders = self.orders()?;
        Ok(self.numerics.ghost_cells.unwrap_or_else(|| orders.required_ghost()))
    }

    pub fn base_geometry(&self) -> Result<Geometry> {
        let dim = self.dim()?;
        let g = &self.geometry;
        let n_cell = per_axis(&g.n_cell, dim, 1, "n_cell")?;
        let lo = per_axis(&g.prob_lo, dim, 0.0, "prob_lo")?;
        let hi = per_axis(&g.prob_hi, dim, 1.0, "prob_hi")?;
        let periodic = per_axis(&g.periodic, dim, false, "periodic")?;
        Ok(Geometry::new(dim, n_cell, lo, hi, periodic))
    }

    /// Check everything that can be checked without building the hierarchy.
    pub fn validate(&self) -> Result<()> {
        let dim = self.dim()?;
        let act = dim.active_axes();
        let bad = |msg: String| Err(PicError::InvalidConfig(msg));

        let cfl = self.numerics.cfl;
        if !(cfl > 0.0 && cfl <= 1.0) {
            return bad(format!("cfl must lie in (0, 1], got {}", cfl));
        }
        let orders = self.orders()?;
        for a in (0..3).filter(|&a| act[a]) {
            staggered_coefficients(orders.stencil[a])?;
            if orders.shape[a] < 1 {
                return bad(format!("shape_order must be >= 1 on axis {}", a));
            }
        }
        let n_ghost = self.n_ghost()?;
        if n_ghost < orders.required_ghost() {
            return bad(format!(
                "ghost_cells = {} is below the {} the stencil and shape need",
                n_ghost,
                orders.required_ghost()
            ));
        }

        let phys = &self.physics;
        if !(phys.speed_of_light > 0.0 && phys.mu0 > 0.0) {
            return bad("speed_of_light and mu0 must be positive".into());
        }
        if self.run.stop_time.is_nan() {
            return bad("stop_time must be a number".into());
        }

        let g = &self.geometry;
        if g.max_grid_size == 0 {
            return bad("max_grid_size must be >= 1".into());
        }
        let n = per_axis(&g.n_cell, dim, 1, "n_cell")?;
        let lo = per_axis(&g.prob_lo, dim, 0.0, "prob_lo")?;
        let hi = per_axis(&g.prob_hi, dim, 1.0, "prob_hi")?;
        for a in (0..3).filter(|&a| act[a]) {
            if n[a] == 0 {
                return bad(format!("n_cell must be positive on axis {}", a));
            }
            if !(hi[a] > lo[a]) {
                return bad(format!("prob_hi must exceed prob_lo on axis {}", a));
            }
        }
        self.base_geometry()?.validate(0)?;

        for (i, r) in self.refinement.iter().enumerate() {
            let level = i + 1;
            if r.ref_ratio < 1 {
                return bad(format!("level {}: ref_ratio must be >= 1", level));
            }
            if r.subcycle_ratio <= 0 {
                return Err(PicError::InvalidSubcycleRatio {
                    level,
                    ratio: r.subcycle_ratio,
                });
            }
            per_axis(&r.lo, dim, 0, "refinement.lo")?;
            per_axis(&r.hi, dim, 1, "refinement.hi")?;
        }

        if let InitConfig::StandingWave {
            axis,
            polarization,
            wavelength,
            ..
        } = self.init
        {
            if axis > 2 || !act[axis] {
                return bad(format!("standing wave axis {} is not an active axis", axis));
            }
            if polarization > 2 || polarization == axis {
                return bad(format!("standing wave polarization {} is not transverse", polarization));
            }
            if wavelength.is_some_and(|w| !(w > 0.0)) {
                return bad("standing wave wavelength must be positive".into());
            }
        }

        for s in &self.species {
            if !(s.mass > 0.0) {
                return bad(format!("species {}: mass must be positive", s.name));
            }
            if s.density < 0.0 {
                return bad(format!("species {}: density must be >= 0", s.name));
            }
            if s.level > self.refinement.len() {
                return bad(format!("species {}: no level {}", s.name, s.level));
            }
            per_axis(&s.per_cell, dim, 1, "per_cell")?;
        }
        Ok(())
    }

    /// Command-line `key=value` overrides. The configuration is left
    /// unchanged if the result does not validate.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        let parse_err = || PicError::InvalidConfig(format!("bad value for {}: {}", key, value));
        let mut next = self.clone();
        match key {
            "max_step" => next.run.max_step = value.parse().map_err(|_| parse_err())?,
            "stop_time" => next.run.stop_time = value.parse().map_err(|_| parse_err())?,
            "plot_interval" | "plot_int" => {
                next.run.plot_interval = value.parse().map_err(|_| parse_err())?
            }
            "cfl" => next.numerics.cfl = value.parse().map_err(|_| parse_err())?,
            "out" | "output_dir" => next.run.output_dir = PathBuf::from(value),
            "png" => next.run.plot_png = matches!(value, "on" | "true" | "1"),
            _ => {
                return Err(PicError::InvalidConfig(format!("unknown override: {}", key)));
            }
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn init_level(&self, h: &mut Hierarchy, lev: usize) {
        let base = h.levels[0].geom;
        let level = &mut h.levels[lev];
        match self.init {
            InitConfig::None => {}
            InitConfig::Uniform { e, b } => init_uniform(level, e, b),
            InitConfig::StandingWave {
                amplitude,
                axis,
                polarization,
                wavelength,
            } => {
                let wave = StandingWave {
                    amplitude,
                    axis,
                    polarization,
                    wavelength: wavelength.unwrap_or_else(|| base.length(axis)),
                };
                init_standing_wave(level, &wave);
            }
        }
    }

    /// Base level plus every refinement, with initial fields applied.
    pub fn build_hierarchy(&self) -> Result<Hierarchy> {
        let dim = self.dim()?;
        let mut h = Hierarchy::new(self.base_geometry()?, self.geometry.max_grid_size, self.n_ghost()?);
        self.init_level(&mut h, 0);
        for r in &self.refinement {
            let lo = per_axis(&r.lo, dim, 0, "refinement.lo")?;
            let hi = per_axis(&r.hi, dim, 1, "refinement.hi")?;
            h.add_level(Rect3i::from_bounds(lo, hi), r.ref_ratio, r.subcycle_ratio)?;
            let lev = h.finest_level();
            self.init_level(&mut h, lev);
        }
        Ok(h)
    }

    pub fn build_particles(&self, h: &Hierarchy) -> Result<ParticleSet> {
        let dim = self.dim()?;
        let mut out = Vec::with_capacity(self.species.len());
        for s in &self.species {
            let level = h.levels.get(s.level).ok_or_else(|| {
                PicError::InvalidConfig(format!("species {}: no level {}", s.name, s.level))
            })?;
            let mut sp = Species::new(s.name.clone(), s.charge, s.mass, s.level);
            let load = LatticeLoad {
                per_cell: per_axis(&s.per_cell, dim, 1, "per_cell")?,
                density: s.density,
                velocity: s.velocity,
                thermal_speed: s.thermal_speed,
                seed: s.seed,
            };
            load_lattice(&mut sp, &level.geom, &load);
            out.push(sp);
        }
        Ok(ParticleSet::new(out))
    }

    /// Everything needed to call `evolve`, writing snapshots under `run.output_dir`.
    pub fn build_simulation(&self) -> Result<Simulation> {
        let hierarchy = self.build_hierarchy()?;
        let particles: Box<dyn ParticleContainer> = if self.species.is_empty() {
            Box::new(NoParticles)
        } else {
            Box::new(self.build_particles(&hierarchy)?)
        };
        let orders = self.orders()?;
        let consts = self.phys_const();
        let control = RunControl {
            max_step: self.run.max_step,
            stop_time: self.run.stop_time,
            plot_interval: self.run.plot_interval,
            orders,
        };
        let sim = Simulation::new(
            hierarchy,
            FieldEvolver::new(orders.stencil, consts),
            TimeStepController::new(self.numerics.cfl, consts),
            control,
            Box::new(PeriodicCopy),
            particles,
        );
        Ok(if self.run.plot_interval > 0 {
            sim.with_writer(Box::new(PlotFileWriter::new(&self.run.output_dir, self.run.plot_png)))
        } else {
            sim
        })
    }
}
