// src/amr/hierarchy.rs

use log::debug;

use crate::amr::interp;
use crate::amr::rect::Rect3i;
use crate::error::{PicError, Result};
use crate::grid::Geometry;
use crate::vector_field::{FieldKind, VectorField};

/// One grid level: geometry, patch layout, E/B/J and its own clock.
#[derive(Debug, Clone)]
pub struct Level {
    pub index: usize,
    pub geom: Geometry,
    /// Valid boxes of the local patches (level index space).
    pub boxes: Vec<Rect3i>,

    pub e: VectorField,
    pub b: VectorField,
    pub j: VectorField,

    pub time: f64,
    pub step: usize,
    pub dt: f64,

    /// Steps taken per parent step (1 on level 0). Signed so that invalid
    /// configuration values can be reported instead of wrapped.
    pub subcycle_ratio: i64,
    /// Spatial refinement relative to the parent (1 on level 0).
    pub ref_ratio: usize,
}

impl Level {
    pub fn new(
        index: usize,
        geom: Geometry,
        boxes: Vec<Rect3i>,
        n_ghost: usize,
        ref_ratio: usize,
        subcycle_ratio: i64,
    ) -> Self {
        let dim = geom.dim;
        Self {
            index,
            geom,
            e: VectorField::new(FieldKind::Electric, &boxes, dim, n_ghost),
            b: VectorField::new(FieldKind::Magnetic, &boxes, dim, n_ghost),
            j: VectorField::new(FieldKind::Current, &boxes, dim, n_ghost),
            boxes,
            time: 0.0,
            step: 0,
            dt: 0.0,
            subcycle_ratio,
            ref_ratio,
        }
    }

    pub fn num_patches(&self) -> usize {
        self.boxes.len()
    }
}

/// Static, properly nested AMR hierarchy.
///
/// Level 0 covers the whole domain; every finer level covers one box of its
/// parent, refined by `ref_ratio`. Fine patches are chopped to `max_grid_size`.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub levels: Vec<Level>,
    pub max_grid_size: usize,
    pub n_ghost: usize,
}

impl Hierarchy {
    pub fn new(base: Geometry, max_grid_size: usize, n_ghost: usize) -> Self {
        let boxes = base.domain.chop(max_grid_size);
        debug!(
            "level 0: domain {:?}, {} patches, ghost {}",
            base.domain.n,
            boxes.len(),
            n_ghost
        );
        Self {
            levels: vec![Level::new(0, base, boxes, n_ghost, 1, 1)],
            max_grid_size,
            n_ghost,
        }
    }

    #[inline]
    pub fn finest_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Add a level refining `region` of the current finest level.
    ///
    /// The new level's fields are initialised from its parent.
    pub fn add_level(&mut self, region: Rect3i, ref_ratio: usize, subcycle_ratio: i64) -> Result<()> {
        let parent = &self.levels[self.finest_level()];
        let index = parent.index + 1;
        if ref_ratio < 1 {
            return Err(PicError::InvalidConfig(format!(
                "level {}: ref_ratio must be >= 1, got {}",
                index, ref_ratio
            )));
        }
        if subcycle_ratio <= 0 {
            return Err(PicError::InvalidSubcycleRatio {
                level: index,
                ratio: subcycle_ratio,
            });
        }
        let act = parent.geom.dim.active_axes();
        let mut region = region;
        for a in 0..3 {
            if !act[a] {
                region.lo[a] = parent.geom.domain.lo[a];
                region.n[a] = parent.geom.domain.n[a];
            }
        }
        if region.is_empty() || !parent.geom.domain.contains_box(region) {
            return Err(PicError::InvalidConfig(format!(
                "level {}: region {:?} is not inside the parent domain {:?}",
                index, region, parent.geom.domain
            )));
        }

        let geom = parent.geom.refine(region, ref_ratio);
        let boxes = geom.domain.chop(self.max_grid_size);
        let mut level = Level::new(index, geom, boxes, self.n_ghost, ref_ratio, subcycle_ratio);
        let r = geom.dim.ratio(ref_ratio);
        interp::init_from_coarse(&parent.e, &parent.geom, &mut level.e, r);
        interp::init_from_coarse(&parent.b, &parent.geom, &mut level.b, r);
        level.time = parent.time;

        debug!(
            "level {}: domain {:?}, {} patches, ref_ratio {}, subcycle {}",
            index,
            geom.domain,
            level.num_patches(),
            ref_ratio,
            subcycle_ratio
        );
        self.levels.push(level);
        Ok(())
    }

    /// Parent and child level, borrowed together.
    pub fn coarse_fine_mut(&mut self, fine: usize) -> (&mut Level, &mut Level) {
        assert!(fine >= 1 && fine <= self.finest_level(), "no level {} with a parent", fine);
        let (lo, hi) = self.levels.split_at_mut(fine);
        (&mut lo[fine - 1], &mut hi[0])
    }

    /// Interpolate the parent's E and B into the ghost cells of level `fine`.
    pub fn fill_fine_ghosts(&mut self, fine: usize) {
        let (c, f) = self.coarse_fine_mut(fine);
        let r = f.geom.dim.ratio(f.ref_ratio);
        interp::fill_ghosts_from_coarse(&c.e, &c.geom, &mut f.e, r);
        interp::fill_ghosts_from_coarse(&c.b, &c.geom, &mut f.b, r);
    }

    /// Fill the E ghosts of level `fine` from the parent E blended in time,
    /// `(1 − alpha)·e_old + alpha·E_parent`.
    pub fn fill_fine_e_ghosts_between(&mut self, fine: usize, e_old: &VectorField, alpha: f64) {
        let (c, f) = self.coarse_fine_mut(fine);
        let r = f.geom.dim.ratio(f.ref_ratio);
        let src = VectorField::lerp(e_old, &c.e, alpha);
        interp::fill_ghosts_from_coarse(&src, &c.geom, &mut f.e, r);
    }

    /// B counterpart of [`Hierarchy::fill_fine_e_ghosts_between`].
    pub fn fill_fine_b_ghosts_between(&mut self, fine: usize, b_old: &VectorField, alpha: f64) {
        let (c, f) = self.coarse_fine_mut(fine);
        let r = f.geom.dim.ratio(f.ref_ratio);
        let src = VectorField::lerp(b_old, &c.b, alpha);
        interp::fill_ghosts_from_coarse(&src, &c.geom, &mut f.b, r);
    }

    /// Add the parent's current density, interpolated, to level `fine`.
    ///
    /// Particles deposit only on their own level; this carries the current
    /// of coarser species into the refined region.
    pub fn add_parent_current(&mut self, fine: usize) {
        let (c, f) = self.coarse_fine_mut(fine);
        let r = f.geom.dim.ratio(f.ref_ratio);
        interp::add_from_coarse(&c.j, &c.geom, &mut f.j, r);
    }

    /// Restrict E (and B when `with_b`) of level `fine` onto the parent
    /// cells it covers.
    pub fn average_down(&mut self, fine: usize, with_b: bool) {
        let (c, f) = self.coarse_fine_mut(fine);
        let r = f.geom.dim.ratio(f.ref_ratio);
        let region = f.geom.domain.coarsen(r);
        interp::average_down(&f.e, &f.geom, &mut c.e, region, r);
        if with_b {
            interp::average_down(&f.b, &f.geom, &mut c.b, region, r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SpaceDim;

    fn base() -> Geometry {
        Geometry::new(SpaceDim::Three, [16, 8, 8], [0.0; 3], [16.0, 8.0, 8.0], [true; 3])
    }

    #[test]
    fn levels_are_chopped_and_nested() {
        let mut h = Hierarchy::new(base(), 8, 2);
        assert_eq!(h.levels[0].num_patches(), 2);
        h.add_level(Rect3i::new([4, 2, 2], [8, 4, 4]), 2, 2).unwrap();
        let l1 = &h.levels[1];
        assert_eq!(l1.geom.domain, Rect3i::new([8, 4, 4], [16, 8, 8]));
        assert_eq!(l1.num_patches(), 2);
        assert_eq!(l1.e.comps[2].patches[0].ghost, [2; 3]);
        assert_eq!(h.finest_level(), 1);
    }

    #[test]
    fn invalid_refinements_are_rejected() {
        let mut h = Hierarchy::new(base(), 8, 1);
        assert!(matches!(
            h.add_level(Rect3i::new([12, 0, 0], [8, 4, 4]), 2, 2),
            Err(PicError::InvalidConfig(_))
        ));
        assert!(matches!(
            h.add_level(Rect3i::new([0, 0, 0], [4, 4, 4]), 2, 0),
            Err(PicError::InvalidSubcycleRatio { level: 1, ratio: 0 })
        ));
        assert_eq!(h.finest_level(), 0);
    }

    #[test]
    fn fine_ghosts_follow_parent_time_blend() {
        let mut h = Hierarchy::new(base(), 8, 1);
        h.add_level(Rect3i::new([4, 0, 0], [8, 8, 8]), 2, 2).unwrap();
        let e_old = h.levels[0].e.clone();
        h.levels[0].e.fill(2.0);

        h.fill_fine_e_ghosts_between(1, &e_old, 0.25);
        let ex = &h.levels[1].e.comps[0].patches[0];
        // Ghost below the fine region, valid cells untouched.
        assert_eq!(ex.get([7, 0, 0]), 0.5);
        assert_eq!(ex.get([8, 0, 0]), 0.0);

        h.levels[0].j.comps[2].fill(3.0);
        h.add_parent_current(1);
        assert_eq!(h.levels[1].j.comps[2].max_abs(), 3.0);

        h.levels[1].b.fill(1.0);
        h.average_down(1, false);
        assert_eq!(h.levels[0].b.max_abs(), 0.0);
        h.average_down(1, true);
        assert_eq!(h.levels[0].b.max_abs(), 1.0);
    }

    #[test]
    fn two_dimensional_refinement_keeps_y_degenerate() {
        let g = Geometry::new(SpaceDim::Two, [8, 1, 8], [0.0; 3], [8.0, 1.0, 8.0], [true; 3]);
        let mut h = Hierarchy::new(g, 16, 1);
        h.add_level(Rect3i::new([2, 5, 2], [4, 3, 4]), 2, 2).unwrap();
        let fine = &h.levels[1].geom;
        assert_eq!(fine.domain.n, [8, 1, 8]);
        assert_eq!(fine.cell_size, [0.5, 1.0, 0.5]);
    }
}
