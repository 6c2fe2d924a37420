// src/particles.rs
//
// Particle collaborator of the leapfrog loop.
//
// The loop only sees `ParticleContainer`. `ParticleSet` is a small in-process
// implementation: non-relativistic Boris push, nearest-grid-point gather of
// the staggered E and B, nearest-grid-point current deposition at the
// half-step position, and per-patch tiles that are re-sorted on redistribute.

use log::debug;
use rayon::prelude::*;

use crate::amr::hierarchy::{Hierarchy, Level};
use crate::error::{PicError, Result};
use crate::grid::Geometry;
use crate::vec3::{axpy, cross, dot, scale};
use crate::vector_field::{MultiField, VectorField};

/// Particle mover and current depositor driven by the leapfrog loop.
pub trait ParticleContainer {
    /// Push the particles living on `level` through its E and B over `dt`,
    /// then zero `level.j` and deposit their current into it.
    fn advance_and_deposit(&mut self, level: &mut Level, dt: f64) -> Result<()>;

    /// Hand particles that left their patch to the patch that now owns them.
    ///
    /// Never modifies field data.
    fn redistribute(&mut self, hierarchy: &Hierarchy, local_only: bool, global: bool);

    /// Total particle kinetic energy, for diagnostics.
    fn kinetic_energy(&self) -> f64 {
        0.0
    }
}

/// Field-only runs: J stays zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoParticles;

impl ParticleContainer for NoParticles {
    fn advance_and_deposit(&mut self, level: &mut Level, _dt: f64) -> Result<()> {
        level.j.fill(0.0);
        Ok(())
    }

    fn redistribute(&mut self, _hierarchy: &Hierarchy, _local_only: bool, _global: bool) {}
}

/// A macro-particle: position, velocity and statistical weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub weight: f64,
}

/// All particles of one species, living on a single level.
#[derive(Debug, Clone)]
pub struct Species {
    pub name: String,
    pub charge: f64,
    pub mass: f64,
    pub level: usize,
    /// One tile per patch of `level`; particles not yet sorted sit in `pending`.
    pub tiles: Vec<Vec<Particle>>,
    pending: Vec<Particle>,
    /// Particles that left `level`, waiting to be handed to the parent level.
    outbound: Vec<Particle>,
}

impl Species {
    pub fn new(name: impl Into<String>, charge: f64, mass: f64, level: usize) -> Self {
        Self {
            name: name.into(),
            charge,
            mass,
            level,
            tiles: Vec::new(),
            pending: Vec::new(),
            outbound: Vec::new(),
        }
    }

    /// Queue a particle; it is assigned to a tile on the next redistribute.
    pub fn push(&mut self, p: Particle) {
        self.pending.push(p);
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.outbound.len() + self.tiles.iter().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.tiles
            .iter()
            .flatten()
            .chain(self.pending.iter())
            .chain(self.outbound.iter())
    }

    /// Kinetic energy ½ m w v², summed.
    pub fn kinetic_energy(&self) -> f64 {
        self.iter()
            .map(|p| 0.5 * self.mass * p.weight * dot(p.vel, p.vel))
            .sum()
    }
}

/// Non-relativistic Boris rotation: returns v(t+dt/2) from v(t−dt/2).
///
/// `qmdt2` is q·dt / (2m).
#[inline]
pub fn boris_push(v: [f64; 3], e: [f64; 3], b: [f64; 3], qmdt2: f64) -> [f64; 3] {
    let v_minus = axpy(v, qmdt2, e);
    let t = scale(b, qmdt2);
    let s = scale(t, 2.0 / (1.0 + dot(t, t)));
    let v_prime = axpy(v_minus, 1.0, cross(v_minus, t));
    let v_plus = axpy(v_minus, 1.0, cross(v_prime, s));
    axpy(v_plus, qmdt2, e)
}

/// Nearest index of a staggered component to a physical position.
fn nearest_index(geom: &Geometry, x: [f64; 3], nodal: [bool; 3]) -> [isize; 3] {
    let act = geom.dim.active_axes();
    [0, 1, 2].map(|a| {
        if act[a] {
            (geom.continuous_index(x[a], a, nodal[a]) + 0.5).floor() as isize
        } else {
            geom.domain.lo[a]
        }
    })
}

fn gather(field: &VectorField, geom: &Geometry, x: [f64; 3]) -> [f64; 3] {
    let comp = |f: &MultiField| {
        f.value_at(geom, nearest_index(geom, x, f.centering.nodal))
            .unwrap_or(0.0)
    };
    [comp(&field.comps[0]), comp(&field.comps[1]), comp(&field.comps[2])]
}

/// Cell of the level that contains `x`, after periodic wrap.
fn owning_cell(geom: &Geometry, x: [f64; 3]) -> Option<[isize; 3]> {
    let act = geom.dim.active_axes();
    let idx = [0, 1, 2].map(|a| {
        if act[a] {
            geom.continuous_index(x[a], a, true).floor() as isize
        } else {
            geom.domain.lo[a]
        }
    });
    geom.wrap(idx)
}

/// Map a position back into the domain along periodic axes.
fn wrap_position(geom: &Geometry, x: &mut [f64; 3]) {
    for a in 0..3 {
        if geom.periodic[a] {
            let lo = geom.prob_lo[a] + geom.domain.lo[a] as f64 * geom.cell_size[a];
            let len = geom.length(a);
            x[a] = lo + (x[a] - lo).rem_euclid(len);
        }
    }
}

/// Every species of the run, each bound to one level.
#[derive(Debug, Clone, Default)]
pub struct ParticleSet {
    pub species: Vec<Species>,
}

impl ParticleSet {
    pub fn new(species: Vec<Species>) -> Self {
        Self { species }
    }

    pub fn num_particles(&self) -> usize {
        self.species.iter().map(Species::len).sum()
    }

    /// Move outbound particles one level up.
    ///
    /// A refined level's boundary is not physical: particles crossing it
    /// continue on the parent level, in the species with the same name there
    /// (created on first use). Particles leaving level 0 through a
    /// non-periodic boundary are absorbed.
    fn hand_off(&mut self, hierarchy: &Hierarchy) {
        let mut moved = Vec::new();
        for sp in &mut self.species {
            if sp.outbound.is_empty() {
                continue;
            }
            let out = std::mem::take(&mut sp.outbound);
            if sp.level == 0 {
                debug!("species {}: {} particles absorbed at the domain boundary", sp.name, out.len());
            } else {
                moved.push((sp.name.clone(), sp.charge, sp.mass, sp.level - 1, out));
            }
        }

        for (name, charge, mass, level, mut out) in moved {
            let Some(parent) = hierarchy.levels.get(level) else {
                continue;
            };
            for p in &mut out {
                wrap_position(&parent.geom, &mut p.pos);
            }
            let idx = match self
                .species
                .iter()
                .position(|s| s.level == level && s.name == name)
            {
                Some(i) => i,
                None => {
                    self.species.push(Species::new(name.clone(), charge, mass, level));
                    self.species.len() - 1
                }
            };
            debug!(
                "species {}: {} particles handed from level {} to level {}",
                name,
                out.len(),
                level + 1,
                level
            );
            let target = &mut self.species[idx];
            target.pending.extend(out);
            sort_into_tiles(target, parent);
        }
    }

    fn deposit(level: &mut Level, species: &Species, dt: f64, old: &[Vec<Particle>]) {
        let geom = level.geom;
        let inv_vol = 1.0 / geom.cell_volume();
        for (tile, before) in species.tiles.iter().zip(old) {
            for (p, p0) in tile.iter().zip(before) {
                // Half-step position, before any periodic wrap of the new one.
                let mid = axpy(p0.pos, 0.5 * dt, p.vel);
                let q = species.charge * p.weight * inv_vol;
                for (c, f) in level.j.comps.iter_mut().enumerate() {
                    let idx = nearest_index(&geom, mid, f.centering.nodal);
                    let Some(w) = geom.wrap(idx) else {
                        continue;
                    };
                    let Some(owner) = f.locate(w) else {
                        continue;
                    };
                    f.patches[owner].add(w, q * p.vel[c]);
                }
            }
        }
    }
}

impl ParticleContainer for ParticleSet {
    fn advance_and_deposit(&mut self, level: &mut Level, dt: f64) -> Result<()> {
        level.j.fill(0.0);
        let geom = level.geom;
        let act = geom.dim.active_axes();
        let index = level.index;

        for sp in self.species.iter_mut().filter(|s| s.level == index) {
            if sp.mass <= 0.0 {
                return Err(PicError::InvalidConfig(format!(
                    "species {}: mass must be positive",
                    sp.name
                )));
            }
            if !sp.pending.is_empty() || sp.tiles.len() != level.num_patches() {
                debug!("species {}: sorting {} unsorted particles", sp.name, sp.pending.len());
                sort_into_tiles(sp, level);
            }

            let qmdt2 = sp.charge * dt / (2.0 * sp.mass);
            let old = sp.tiles.clone();
            let (e, b) = (&level.e, &level.b);
            sp.tiles.par_iter_mut().for_each(|tile| {
                for p in tile.iter_mut() {
                    let ep = gather(e, &geom, p.pos);
                    let bp = gather(b, &geom, p.pos);
                    p.vel = boris_push(p.vel, ep, bp, qmdt2);
                    for a in 0..3 {
                        if act[a] {
                            p.pos[a] += p.vel[a] * dt;
                        }
                    }
                }
            });
            Self::deposit(level, sp, dt, &old);
            for p in sp.tiles.iter_mut().flatten() {
                wrap_position(&geom, &mut p.pos);
            }
        }
        Ok(())
    }

    fn redistribute(&mut self, hierarchy: &Hierarchy, local_only: bool, global: bool) {
        debug!("redistribute (local_only={}, global={})", local_only, global);
        for sp in &mut self.species {
            let Some(level) = hierarchy.levels.get(sp.level) else {
                continue;
            };
            sort_into_tiles(sp, level);
        }
        self.hand_off(hierarchy);
    }

    fn kinetic_energy(&self) -> f64 {
        self.species.iter().map(Species::kinetic_energy).sum()
    }
}

/// Move every particle of `sp` into the tile of the patch owning its cell.
///
/// Particles outside a non-periodic level boundary go to `outbound`.
fn sort_into_tiles(sp: &mut Species, level: &Level) {
    let n = level.num_patches();
    if sp.tiles.len() != n {
        let all: Vec<Particle> = sp.tiles.drain(..).flatten().collect();
        sp.pending.extend(all);
        sp.tiles = vec![Vec::new(); n];
    }

    let mut migrants = std::mem::take(&mut sp.pending);
    for (t, tile) in sp.tiles.iter_mut().enumerate() {
        let valid = level.boxes[t];
        let mut i = 0;
        while i < tile.len() {
            let stays = owning_cell(&level.geom, tile[i].pos).is_some_and(|c| valid.contains(c));
            if stays {
                i += 1;
            } else {
                migrants.push(tile.swap_remove(i));
            }
        }
    }

    for p in migrants {
        let owner = owning_cell(&level.geom, p.pos)
            .and_then(|c| level.boxes.iter().position(|b| b.contains(c)));
        match owner {
            Some(t) => sp.tiles[t].push(p),
            None => sp.outbound.push(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amr::rect::Rect3i;
    use crate::grid::SpaceDim;
    use crate::vec3::norm;
    use approx::assert_abs_diff_eq;

    fn hierarchy() -> Hierarchy {
        let g = Geometry::new(SpaceDim::Three, [8, 4, 4], [0.0; 3], [8.0, 4.0, 4.0], [true; 3]);
        Hierarchy::new(g, 4, 1)
    }

    #[test]
    fn boris_conserves_speed_in_pure_magnetic_field() {
        let mut v = [0.3, -0.2, 0.5];
        let speed = norm(v);
        for _ in 0..1000 {
            v = boris_push(v, [0.0; 3], [0.1, 0.7, -1.3], 0.05);
        }
        assert_abs_diff_eq!(norm(v), speed, epsilon = 1e-12);
        // The component along B is invariant.
        let b = [0.1, 0.7, -1.3];
        assert_abs_diff_eq!(dot(v, b), dot([0.3, -0.2, 0.5], b), epsilon = 1e-12);
    }

    #[test]
    fn uniform_electric_field_accelerates_linearly() {
        let v = boris_push([0.0; 3], [0.0, 0.0, 2.0], [0.0; 3], 0.25);
        assert_eq!(v, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn particles_follow_periodic_wrap_into_owning_patch() {
        let mut h = hierarchy();
        let mut sp = Species::new("e", -1.0, 1.0, 0);
        sp.push(Particle {
            pos: [7.9, 1.5, 1.5],
            vel: [1.0, 0.0, 0.0],
            weight: 1.0,
        });
        let mut set = ParticleSet::new(vec![sp]);
        set.redistribute(&h, false, true);
        assert_eq!(set.species[0].tiles[1].len(), 1);

        set.advance_and_deposit(&mut h.levels[0], 0.5).unwrap();
        set.redistribute(&h, false, true);
        let sp = &set.species[0];
        assert_eq!(sp.tiles[0].len(), 1);
        assert_eq!(sp.tiles[1].len(), 0);
        assert_abs_diff_eq!(sp.tiles[0][0].pos[0], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn deposited_current_matches_particle_flux() {
        let mut h = hierarchy();
        let mut sp = Species::new("ions", 2.0, 4.0, 0);
        for k in 0..5 {
            sp.push(Particle {
                pos: [1.0 + k as f64, 2.2, 0.6],
                vel: [0.0, 0.0, 0.25],
                weight: 3.0,
            });
        }
        let mut set = ParticleSet::new(vec![sp]);
        set.advance_and_deposit(&mut h.levels[0], 0.1).unwrap();

        let vol = h.levels[0].geom.cell_volume();
        let total: f64 = h.levels[0].j.comps[2]
            .patches
            .iter()
            .map(|p| p.valid.indices().map(|i| p.get(i)).sum::<f64>())
            .sum();
        assert_abs_diff_eq!(total * vol, 5.0 * 2.0 * 3.0 * 0.25, epsilon = 1e-12);
        assert_eq!(h.levels[0].j.comps[0].max_abs(), 0.0);
        assert_eq!(set.num_particles(), 5);
    }

    #[test]
    fn particles_leaving_a_refined_level_continue_on_the_parent() {
        let mut h = hierarchy();
        // Fine level over x ∈ [2, 6): periodic along y and z only.
        h.add_level(Rect3i::new([2, 0, 0], [4, 4, 4]), 2, 2).unwrap();
        let mut sp = Species::new("e", -1.0, 2.0, 1);
        sp.push(Particle {
            pos: [5.9, 1.0, 1.0],
            vel: [1.0, 0.0, 0.0],
            weight: 0.5,
        });
        sp.push(Particle {
            pos: [3.0, 1.0, 1.0],
            vel: [0.0, 0.0, 1.0],
            weight: 0.5,
        });
        let mut set = ParticleSet::new(vec![sp]);
        let energy = set.kinetic_energy();
        assert_abs_diff_eq!(energy, 2.0 * 0.5 * 2.0 * 0.5, epsilon = 1e-15);

        set.advance_and_deposit(&mut h.levels[1], 0.5).unwrap();
        set.redistribute(&h, false, true);

        assert_eq!(set.num_particles(), 2);
        assert_eq!(set.species.len(), 2);
        assert_eq!(set.species[0].len(), 1);
        let parent = &set.species[1];
        assert_eq!((parent.name.as_str(), parent.level), ("e", 0));
        assert_eq!((parent.charge, parent.mass), (-1.0, 2.0));
        // Owned by the second level-0 patch (x ∈ [4, 8)).
        assert_eq!(parent.tiles[1].len(), 1);
        assert_abs_diff_eq!(parent.tiles[1][0].pos[0], 6.4, epsilon = 1e-12);
        assert_abs_diff_eq!(set.kinetic_energy(), energy, epsilon = 1e-15);
    }

    #[test]
    fn particles_leave_level_zero_only_through_open_boundaries() {
        let g = Geometry::new(SpaceDim::Three, [4, 4, 4], [0.0; 3], [4.0; 3], [false, true, true]);
        let mut h = Hierarchy::new(g, 4, 1);
        let mut sp = Species::new("p", 1.0, 1.0, 0);
        sp.push(Particle {
            pos: [3.9, 3.9, 0.5],
            vel: [1.0, 1.0, 0.0],
            weight: 1.0,
        });
        sp.push(Particle {
            pos: [2.0, 3.9, 0.5],
            vel: [0.0, 1.0, 0.0],
            weight: 1.0,
        });
        let mut set = ParticleSet::new(vec![sp]);
        set.advance_and_deposit(&mut h.levels[0], 0.5).unwrap();
        set.redistribute(&h, false, true);
        assert_eq!(set.num_particles(), 1);
        assert_abs_diff_eq!(set.species[0].tiles[0][0].pos[1], 0.4, epsilon = 1e-12);
    }

    #[test]
    fn field_only_runs_keep_current_zero() {
        let mut h = hierarchy();
        h.levels[0].j.fill(1.0);
        NoParticles.advance_and_deposit(&mut h.levels[0], 1.0).unwrap();
        assert_eq!(h.levels[0].j.max_abs(), 0.0);
    }
}
