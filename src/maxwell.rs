// src/maxwell.rs
//
// Explicit FDTD updates of B and E on one level.
//
//   B ← B − dt ∇×E
//   E ← E + c² dt ∇×B − μ₀ c² dt J
//
// Each patch is advanced independently (rayon over patches); the stencil
// reads ghost cells, which the caller must have synchronised beforehand.

use rayon::prelude::*;

use crate::amr::hierarchy::Level;
use crate::error::{PicError, Result};
use crate::grid::Geometry;
use crate::params::PhysConst;
use crate::stencil::{check_stencil, StencilOperator, YeeCurl};
use crate::vector_field::VectorField;

pub struct FieldEvolver<S: StencilOperator = YeeCurl> {
    pub stencil: S,
    /// Curl order per axis.
    pub order: [usize; 3],
    pub consts: PhysConst,
}

impl FieldEvolver<YeeCurl> {
    pub fn new(order: [usize; 3], consts: PhysConst) -> Self {
        Self::with_stencil(YeeCurl, order, consts)
    }
}

impl<S: StencilOperator> FieldEvolver<S> {
    pub fn with_stencil(stencil: S, order: [usize; 3], consts: PhysConst) -> Self {
        Self {
            stencil,
            order,
            consts,
        }
    }

    /// `scale / dx_a` on active axes, zero on degenerate ones.
    fn coefficients(geom: &Geometry, scale: f64) -> [f64; 3] {
        let act = geom.dim.active_axes();
        [0, 1, 2].map(|a| if act[a] { scale / geom.cell_size[a] } else { 0.0 })
    }

    /// Verify ghost widths, patch layout and stencil reach on `level`.
    ///
    /// Returns the common ghost width.
    fn check_level(&self, level: &Level, with_current: bool) -> Result<usize> {
        level.geom.validate(level.index)?;
        let expected = level.e.comps[0].n_grow();
        let n_patches = level.boxes.len();

        let mut fields: Vec<&VectorField> = vec![&level.e, &level.b];
        if with_current {
            fields.push(&level.j);
        }
        for f in fields.iter().flat_map(|v| v.comps.iter()) {
            if f.n_grow() != expected {
                return Err(PicError::GhostWidthMismatch {
                    level: level.index,
                    field: f.name.clone(),
                    expected,
                    found: f.n_grow(),
                });
            }
            if f.patches.len() != n_patches {
                return Err(PicError::LayoutMismatch {
                    level: level.index,
                    field: f.name.clone(),
                    expected: n_patches,
                    found: f.patches.len(),
                });
            }
        }
        check_stencil(self.order, level.geom.dim.active_axes(), expected)?;
        Ok(expected)
    }

    /// Advance B by `dt` from the curl of E. E is read-only.
    pub fn evolve_b(&self, level: &mut Level, dt: f64) -> Result<()> {
        let guard = self.check_level(level, false)?;
        let coef = Self::coefficients(&level.geom, -dt);
        let order = self.order;

        let [ex, ey, ez] = &level.e.comps;
        let [bx, by, bz] = &mut level.b.comps;
        bx.patches
            .par_iter_mut()
            .zip(by.patches.par_iter_mut())
            .zip(bz.patches.par_iter_mut())
            .enumerate()
            .try_for_each(|(p, ((px, py), pz))| {
                self.stencil.curl_update(
                    [&ex.patches[p], &ey.patches[p], &ez.patches[p]],
                    [px, py, pz],
                    coef,
                    order,
                    guard,
                )
            })
    }

    /// Advance E by `dt` from the curl of B and the current density J.
    pub fn evolve_e(&self, level: &mut Level, dt: f64) -> Result<()> {
        let guard = self.check_level(level, true)?;
        let c2 = self.consts.c * self.consts.c;
        let coef = Self::coefficients(&level.geom, c2 * dt);
        let j_coef = self.consts.mu0 * c2 * dt;
        let order = self.order;

        let [bx, by, bz] = &level.b.comps;
        let [jx, jy, jz] = &level.j.comps;
        let [ex, ey, ez] = &mut level.e.comps;
        ex.patches
            .par_iter_mut()
            .zip(ey.patches.par_iter_mut())
            .zip(ez.patches.par_iter_mut())
            .enumerate()
            .try_for_each(|(p, ((px, py), pz))| {
                self.stencil.curl_update(
                    [&bx.patches[p], &by.patches[p], &bz.patches[p]],
                    [&mut *px, &mut *py, &mut *pz],
                    coef,
                    order,
                    guard,
                )?;
                let js = [&jx.patches[p], &jy.patches[p], &jz.patches[p]];
                for (out, jp) in [px, py, pz].into_iter().zip(js) {
                    let valid = out.valid;
                    for idx in valid.indices() {
                        out.add(idx, -j_coef * jp.get(idx));
                    }
                }
                Ok(())
            })
    }

    /// Electromagnetic energy on the valid cells of `level`:
    /// Σ (ε₀ E²/2 + B²/(2μ₀)) · cell volume.
    pub fn field_energy(&self, level: &Level) -> f64 {
        let sum_sq = |v: &VectorField| -> f64 {
            v.comps
                .iter()
                .flat_map(|c| c.patches.iter())
                .map(|p| p.valid.indices().map(|i| p.get(i).powi(2)).sum::<f64>())
                .sum()
        };
        let vol = level.geom.cell_volume();
        vol * (0.5 * self.consts.eps0() * sum_sq(&level.e) + sum_sq(&level.b) / (2.0 * self.consts.mu0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amr::hierarchy::Hierarchy;
    use crate::ghost::{GhostExchange, PeriodicCopy};
    use crate::grid::{Geometry, SpaceDim};
    use crate::vector_field::FieldKind;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn level(n_ghost: usize) -> Level {
        let geom = Geometry::new(SpaceDim::Three, [8, 8, 8], [0.0; 3], [8.0; 3], [true; 3]);
        let mut h = Hierarchy::new(geom, 4, n_ghost);
        let mut lev = h.levels.remove(0);
        let g = lev.geom;
        lev.e.comps[0].set_valid_with(&g, |x| (2.0 * PI * x[1] / 8.0).sin());
        lev.e.comps[1].set_valid_with(&g, |x| (2.0 * PI * x[2] / 8.0).cos());
        lev.e.comps[2].set_valid_with(&g, |x| (2.0 * PI * x[0] / 8.0).sin());
        lev.b.comps[2].set_valid_with(&g, |x| (2.0 * PI * x[0] / 8.0).cos());
        lev.j.comps[1].set_valid_with(&g, |x| 0.1 * x[2]);
        PeriodicCopy.sync_vector(&mut lev.e, &g);
        PeriodicCopy.sync_vector(&mut lev.b, &g);
        lev
    }

    fn max_diff(a: &VectorField, b: &VectorField) -> f64 {
        let mut m: f64 = 0.0;
        for (ca, cb) in a.comps.iter().zip(&b.comps) {
            for (pa, pb) in ca.patches.iter().zip(&cb.patches) {
                for idx in pa.valid.indices() {
                    m = m.max((pa.get(idx) - pb.get(idx)).abs());
                }
            }
        }
        m
    }

    #[test]
    fn zero_step_changes_nothing() {
        let fe = FieldEvolver::new([2; 3], PhysConst::normalized());
        let mut lev = level(1);
        let reference = lev.clone();
        fe.evolve_b(&mut lev, 0.0).unwrap();
        fe.evolve_e(&mut lev, 0.0).unwrap();
        assert_eq!(max_diff(&lev.b, &reference.b), 0.0);
        assert_eq!(max_diff(&lev.e, &reference.e), 0.0);
    }

    #[test]
    fn updates_are_linear_in_dt() {
        for order in [2, 4] {
            let fe = FieldEvolver::new([order; 3], PhysConst::normalized());
            let mut one = level(order / 2);
            let mut two = one.clone();

            fe.evolve_b(&mut one, 0.2).unwrap();
            fe.evolve_b(&mut two, 0.1).unwrap();
            fe.evolve_b(&mut two, 0.1).unwrap();
            assert!(max_diff(&one.b, &two.b) < 1e-14);

            // B ghosts are stale after evolve_b, but identical in both copies.
            fe.evolve_e(&mut one, 0.2).unwrap();
            fe.evolve_e(&mut two, 0.1).unwrap();
            fe.evolve_e(&mut two, 0.1).unwrap();
            assert!(max_diff(&one.e, &two.e) < 1e-14);
        }
    }

    #[test]
    fn zero_state_stays_zero() {
        let geom = Geometry::new(SpaceDim::Two, [8, 1, 8], [0.0; 3], [1.0; 3], [true; 3]);
        let mut h = Hierarchy::new(geom, 4, 2);
        let fe = FieldEvolver::new([4, 4, 4], PhysConst::default());
        let lev = &mut h.levels[0];
        for _ in 0..3 {
            fe.evolve_b(lev, 1e-12).unwrap();
            fe.evolve_e(lev, 1e-12).unwrap();
        }
        assert_eq!(lev.e.max_abs(), 0.0);
        assert_eq!(lev.b.max_abs(), 0.0);
    }

    #[test]
    fn current_drives_electric_field() {
        let geom = Geometry::new(SpaceDim::Three, [4, 4, 4], [0.0; 3], [4.0; 3], [true; 3]);
        let mut h = Hierarchy::new(geom, 4, 1);
        let lev = &mut h.levels[0];
        lev.j.comps[2].fill(2.0);
        let fe = FieldEvolver::new([2; 3], PhysConst { c: 2.0, mu0: 0.5 });
        fe.evolve_e(lev, 0.25).unwrap();
        // −μ₀ c² dt J = −0.5 · 4 · 0.25 · 2
        for idx in lev.boxes[0].indices() {
            assert_abs_diff_eq!(lev.e.comps[2].patches[0].get(idx), -1.0, epsilon = 1e-15);
        }
        assert_eq!(lev.e.comps[0].max_abs(), 0.0);
    }

    #[test]
    fn field_energy_sums_both_fields() {
        let geom = Geometry::new(SpaceDim::Two, [4, 1, 2], [0.0; 3], [2.0, 1.0, 2.0], [true; 3]);
        let mut h = Hierarchy::new(geom, 2, 1);
        let lev = &mut h.levels[0];
        lev.e.comps[0].fill(3.0);
        lev.b.comps[1].fill(2.0);
        let fe = FieldEvolver::new([2; 3], PhysConst { c: 2.0, mu0: 0.5 });
        // ε₀ = 1/2; eight cells of volume 0.5.
        let expect = 8.0 * 0.5 * (0.5 * 0.5 * 9.0 + 4.0 / 1.0);
        assert_abs_diff_eq!(fe.field_energy(lev), expect, epsilon = 1e-12);
    }

    #[test]
    fn ghost_mismatch_is_rejected_before_mutation() {
        let fe = FieldEvolver::new([2; 3], PhysConst::normalized());
        let mut lev = level(2);
        let boxes = lev.boxes.clone();
        lev.b = VectorField::new(FieldKind::Magnetic, &boxes, lev.geom.dim, 1);
        lev.b.fill(3.0);
        let before = lev.clone();

        let err = fe.evolve_b(&mut lev, 0.1).unwrap_err();
        assert!(matches!(
            err,
            PicError::GhostWidthMismatch { expected: 2, found: 1, .. }
        ));
        assert!(fe.evolve_e(&mut lev, 0.1).is_err());
        assert_eq!(max_diff(&lev.b, &before.b), 0.0);
        assert_eq!(max_diff(&lev.e, &before.e), 0.0);
    }

    #[test]
    fn stencil_wider_than_ghosts_is_rejected() {
        let fe = FieldEvolver::new([6; 3], PhysConst::normalized());
        let mut lev = level(2);
        assert!(matches!(
            fe.evolve_b(&mut lev, 0.1),
            Err(PicError::StencilTooWide { needed: 3, ghost: 2, .. })
        ));
    }
}
