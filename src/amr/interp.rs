// src/amr/interp.rs
//
// Coarse↔fine transfer of Yee-staggered components.
//
// Coarse→fine: piecewise-linear along axes where the component is nodal,
// piecewise-constant along cell-centred axes. Fine→coarse: injection along
// nodal axes (the fine node coincides with the coarse one), plain average of
// the `r` covered fine values along cell-centred axes.

use rayon::prelude::*;

use crate::amr::patch::PatchArray;
use crate::amr::rect::Rect3i;
use crate::grid::Geometry;
use crate::vector_field::{MultiField, VectorField};

/// Coarse index and linear weight of the upper neighbour, per axis.
#[inline]
fn coarse_stencil(fine_idx: [isize; 3], nodal: [bool; 3], r: [usize; 3]) -> ([isize; 3], [f64; 3]) {
    let mut base = [0isize; 3];
    let mut t = [0.0; 3];
    for a in 0..3 {
        let ra = r[a] as isize;
        base[a] = fine_idx[a].div_euclid(ra);
        if nodal[a] {
            t[a] = fine_idx[a].rem_euclid(ra) as f64 / r[a] as f64;
        }
    }
    (base, t)
}

/// Interpolated coarse value at a fine index, or `None` if a needed coarse
/// sample lies outside the coarse level (non-periodic boundary).
fn interpolate_at(
    coarse: &MultiField,
    cgeom: &Geometry,
    fine_idx: [isize; 3],
    r: [usize; 3],
) -> Option<f64> {
    let (base, t) = coarse_stencil(fine_idx, coarse.centering.nodal, r);
    let mut acc = 0.0;
    for corner in 0..8usize {
        let mut w = 1.0;
        let mut idx = base;
        for a in 0..3 {
            let up = (corner >> a) & 1 == 1;
            if up {
                w *= t[a];
                idx[a] += 1;
            } else {
                w *= 1.0 - t[a];
            }
        }
        if w == 0.0 {
            continue;
        }
        acc += w * coarse.value_at(cgeom, idx)?;
    }
    Some(acc)
}

fn interpolate_patch(
    coarse: &MultiField,
    cgeom: &Geometry,
    patch: &mut PatchArray,
    r: [usize; 3],
    ghosts_only: bool,
) {
    let valid = patch.valid;
    for idx in patch.grown().indices() {
        if ghosts_only && valid.contains(idx) {
            continue;
        }
        if let Some(v) = interpolate_at(coarse, cgeom, idx, r) {
            patch.set(idx, v);
        }
    }
}

/// Fill the ghost cells of every fine patch from the coarse level.
///
/// Ghosts that also overlap a sibling patch are overwritten afterwards by
/// the intra-level exchange.
pub fn fill_ghosts_from_coarse(
    coarse: &VectorField,
    cgeom: &Geometry,
    fine: &mut VectorField,
    r: [usize; 3],
) {
    for (cf, ff) in coarse.comps.iter().zip(fine.comps.iter_mut()) {
        ff.patches
            .par_iter_mut()
            .for_each(|p| interpolate_patch(cf, cgeom, p, r, true));
    }
}

/// Initialise every fine value (valid and ghost) from the coarse level.
pub fn init_from_coarse(coarse: &VectorField, cgeom: &Geometry, fine: &mut VectorField, r: [usize; 3]) {
    for (cf, ff) in coarse.comps.iter().zip(fine.comps.iter_mut()) {
        ff.patches
            .par_iter_mut()
            .for_each(|p| interpolate_patch(cf, cgeom, p, r, false));
    }
}

/// Add the interpolated coarse field to the valid cells of every fine patch.
pub fn add_from_coarse(coarse: &VectorField, cgeom: &Geometry, fine: &mut VectorField, r: [usize; 3]) {
    for (cf, ff) in coarse.comps.iter().zip(fine.comps.iter_mut()) {
        ff.patches.par_iter_mut().for_each(|p| {
            let valid = p.valid;
            for idx in valid.indices() {
                if let Some(v) = interpolate_at(cf, cgeom, idx, r) {
                    p.add(idx, v);
                }
            }
        });
    }
}

/// Replace coarse values under `region` (coarse index space) with the
/// restriction of the fine level.
pub fn average_down(
    fine: &VectorField,
    fgeom: &Geometry,
    coarse: &mut VectorField,
    region: Rect3i,
    r: [usize; 3],
) {
    for (ff, cf) in fine.comps.iter().zip(coarse.comps.iter_mut()) {
        let nodal = ff.centering.nodal;
        let span = [0, 1, 2].map(|a| if nodal[a] { 1 } else { r[a] });
        let count = (span[0] * span[1] * span[2]) as f64;

        cf.patches.par_iter_mut().for_each(|cp| {
            let Some(overlap) = cp.valid.intersect(region) else {
                return;
            };
            for c in overlap.indices() {
                let lo = [0, 1, 2].map(|a| c[a] * r[a] as isize);
                let cell = Rect3i::new(lo, span);
                let mut sum = 0.0;
                let mut seen = 0usize;
                for f in cell.indices() {
                    if let Some(v) = ff.value_at(fgeom, f) {
                        sum += v;
                        seen += 1;
                    }
                }
                if seen == span[0] * span[1] * span[2] {
                    cp.set(c, sum / count);
                }
            }
        });
    }
}
