// src/ghost.rs

use crate::amr::patch::PatchArray;
use crate::amr::rect::Rect3i;
use crate::grid::Geometry;
use crate::vector_field::{MultiField, VectorField};

/// Fills the ghost region of every patch of a field from neighbouring valid data.
///
/// After `sync` returns, stencils may read any ghost cell that overlaps a
/// sibling patch or a periodic image. Ghosts outside a non-periodic domain
/// boundary are left untouched.
pub trait GhostExchange {
    fn sync(&self, field: &mut MultiField, geom: &Geometry);

    fn sync_vector(&self, field: &mut VectorField, geom: &Geometry) {
        for c in &mut field.comps {
            self.sync(c, geom);
        }
    }
}

/// In-process ghost fill: patch-to-patch copies plus periodic wrap.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodicCopy;

/// Borrow patch `p` mutably and patch `q` (≠ p) immutably.
fn dst_and_src(patches: &mut [PatchArray], p: usize, q: usize) -> (&mut PatchArray, &PatchArray) {
    debug_assert_ne!(p, q);
    if p < q {
        let (lo, hi) = patches.split_at_mut(q);
        (&mut lo[p], &hi[0])
    } else {
        let (lo, hi) = patches.split_at_mut(p);
        (&mut hi[0], &lo[q])
    }
}

impl PeriodicCopy {
    /// Every (destination, source, region, shift) copy needed to fill ghosts.
    fn plan(field: &MultiField, geom: &Geometry) -> Vec<(usize, usize, Rect3i, [isize; 3])> {
        let shifts = geom.periodic_shifts();
        let mut out = Vec::new();
        for (p, dst) in field.patches.iter().enumerate() {
            let grown = dst.grown();
            for (q, src) in field.patches.iter().enumerate() {
                for &s in &shifts {
                    if p == q && s == [0, 0, 0] {
                        continue;
                    }
                    if let Some(region) = grown.intersect(src.valid.shift(s)) {
                        out.push((p, q, region, s));
                    }
                }
            }
        }
        out
    }
}

impl GhostExchange for PeriodicCopy {
    fn sync(&self, field: &mut MultiField, geom: &Geometry) {
        for (p, q, region, s) in Self::plan(field, geom) {
            if p != q {
                let (dst, src) = dst_and_src(&mut field.patches, p, q);
                dst.copy_region_from(src, region, s);
            } else {
                // Periodic self-image: read before writing.
                let patch = &mut field.patches[p];
                let vals: Vec<f64> = region
                    .indices()
                    .map(|idx| patch.get([idx[0] - s[0], idx[1] - s[1], idx[2] - s[2]]))
                    .collect();
                for (idx, v) in region.indices().zip(vals) {
                    patch.set(idx, v);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SpaceDim;
    use crate::vector_field::Centering;

    fn tagged(geom: &Geometry, boxes: &[Rect3i]) -> MultiField {
        let mut f = MultiField::new("t", boxes, geom.dim, 1, Centering::CELL);
        // Unique value per global cell.
        f.set_valid_with(geom, |x| 100.0 * x[2] + 10.0 * x[1] + x[0]);
        f
    }

    #[test]
    fn ghosts_mirror_neighbours_and_periodic_images() {
        let geom = Geometry::new(SpaceDim::Three, [8, 4, 4], [0.0; 3], [8.0, 4.0, 4.0], [true; 3]);
        let boxes = geom.domain.chop(4);
        let mut f = tagged(&geom, &boxes);
        PeriodicCopy.sync(&mut f, &geom);

        let reference = tagged(&geom, &boxes);
        for p in &f.patches {
            for idx in p.grown().indices() {
                let expect = reference.value_at(&geom, idx).unwrap();
                assert_eq!(p.get(idx), expect, "patch {:?} idx {:?}", p.valid, idx);
            }
        }
    }

    #[test]
    fn non_periodic_boundary_ghosts_are_untouched() {
        let geom = Geometry::new(SpaceDim::Two, [4, 1, 4], [0.0; 3], [4.0, 1.0, 4.0], [false; 3]);
        let boxes = [geom.domain];
        let mut f = MultiField::new("t", &boxes, geom.dim, 1, Centering::CELL);
        f.fill(-1.0);
        f.set_valid_with(&geom, |_| 2.0);
        PeriodicCopy.sync(&mut f, &geom);
        assert_eq!(f.patches[0].get([-1, 0, 0]), -1.0);
        assert_eq!(f.patches[0].get([0, 0, 0]), 2.0);
    }
}
