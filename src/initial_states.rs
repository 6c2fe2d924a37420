// src/initial_states.rs
//
// Initial field and particle generators.
//
// Fields are written on valid cells only; the simulation synchronises ghost
// cells before the first step. Positions are physical coordinates on the
// staggered Yee grid (see `Centering::position`).

use crate::amr::hierarchy::Level;
use crate::amr::rect::Rect3i;
use crate::grid::Geometry;
use crate::particles::{Particle, Species};

/// Uniform E and B on every valid cell of `level`.
pub fn init_uniform(level: &mut Level, e: [f64; 3], b: [f64; 3]) {
    let g = level.geom;
    for c in 0..3 {
        level.e.comps[c].set_valid_with(&g, |_| e[c]);
        level.b.comps[c].set_valid_with(&g, |_| b[c]);
    }
}

/// Standing electromagnetic wave at t = 0: E is a sine along `axis`,
/// polarised along `polarization`; B is zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandingWave {
    pub amplitude: f64,
    /// Axis of variation.
    pub axis: usize,
    /// Component of E that carries the wave (must differ from `axis`).
    pub polarization: usize,
    /// Physical wavelength.
    pub wavelength: f64,
}

impl StandingWave {
    /// E(x) = A sin(2π (x − x₀) / λ)
    pub fn e_at(&self, x: [f64; 3], origin: [f64; 3]) -> f64 {
        let k = 2.0 * std::f64::consts::PI / self.wavelength;
        self.amplitude * (k * (x[self.axis] - origin[self.axis])).sin()
    }
}

pub fn init_standing_wave(level: &mut Level, wave: &StandingWave) {
    assert_ne!(wave.axis, wave.polarization, "standing wave must be transverse");
    let g = level.geom;
    level.e.fill(0.0);
    level.b.fill(0.0);
    level.e.comps[wave.polarization].set_valid_with(&g, |x| wave.e_at(x, g.prob_lo));
}

/// Small xorshift generator for reproducible velocity jitter.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        let s = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_f64(&mut self) -> f64 {
        // Map top 53 bits to [0,1)
        let u = self.next_u64() >> 11;
        (u as f64) * (1.0 / ((1u64 << 53) as f64))
    }
}

/// Regular particle loading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeLoad {
    /// Particles per cell along each axis (ignored on degenerate axes).
    pub per_cell: [usize; 3],
    /// Physical number density.
    pub density: f64,
    /// Drift velocity.
    pub velocity: [f64; 3],
    /// Half-width of the uniform velocity jitter added to every component.
    pub thermal_speed: f64,
    pub seed: u64,
}

/// Fill every cell of `geom` with `per_cell` particles on a sub-lattice.
///
/// Each particle carries `density · cell_volume / n_per_cell` physical
/// particles, so the loaded density is exact.
pub fn load_lattice(species: &mut Species, geom: &Geometry, load: &LatticeLoad) {
    let act = geom.dim.active_axes();
    let ppc = [0, 1, 2].map(|a| if act[a] { load.per_cell[a].max(1) } else { 1 });
    let n_per_cell = (ppc[0] * ppc[1] * ppc[2]) as f64;
    let weight = load.density * geom.cell_volume() / n_per_cell;
    let mut rng = XorShift64::new(load.seed);

    for cell in geom.domain.indices() {
        for sub in Rect3i::from_size(ppc).indices() {
            let mut pos = [0.0; 3];
            for a in 0..3 {
                pos[a] = if act[a] {
                    let frac = (sub[a] as f64 + 0.5) / ppc[a] as f64;
                    geom.prob_lo[a] + (cell[a] as f64 + frac) * geom.cell_size[a]
                } else {
                    0.0
                };
            }
            let mut vel = load.velocity;
            if load.thermal_speed > 0.0 {
                for v in &mut vel {
                    *v += load.thermal_speed * (2.0 * rng.next_f64() - 1.0);
                }
            }
            species.push(Particle { pos, vel, weight });
        }
    }
}
