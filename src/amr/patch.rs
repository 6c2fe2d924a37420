// src/amr/patch.rs

use crate::amr::rect::Rect3i;
use crate::vector_field::Centering;

/// One scalar field component on one grid patch.
///
/// Values are stored over the valid box grown by `ghost` cells per axis.
/// The valid region is owned by this patch; ghost cells mirror neighbouring
/// patches (or coarse data) so that stencils can be evaluated patch-locally.
#[derive(Debug, Clone)]
pub struct PatchArray {
    /// Cells owned by this patch (level index space).
    pub valid: Rect3i,

    /// Ghost width per axis (zero on degenerate axes).
    pub ghost: [usize; 3],

    /// Staggering of the stored component.
    pub centering: Centering,

    grown: Rect3i,
    data: Vec<f64>,
}

impl PatchArray {
    /// Zero-initialised array over `valid` grown by `ghost`.
    pub fn new(valid: Rect3i, ghost: [usize; 3], centering: Centering) -> Self {
        let grown = valid.grow(ghost);
        Self {
            valid,
            ghost,
            centering,
            grown,
            data: vec![0.0; grown.num_cells()],
        }
    }

    /// Valid box plus ghost cells.
    #[inline]
    pub fn grown(&self) -> Rect3i {
        self.grown
    }

    #[inline]
    fn offset(&self, idx: [isize; 3]) -> usize {
        debug_assert!(
            self.grown.contains(idx),
            "index {:?} outside patch {:?}",
            idx,
            self.grown
        );
        let i = (idx[0] - self.grown.lo[0]) as usize;
        let j = (idx[1] - self.grown.lo[1]) as usize;
        let k = (idx[2] - self.grown.lo[2]) as usize;
        (k * self.grown.n[1] + j) * self.grown.n[0] + i
    }

    #[inline]
    pub fn get(&self, idx: [isize; 3]) -> f64 {
        self.data[self.offset(idx)]
    }

    #[inline]
    pub fn set(&mut self, idx: [isize; 3], v: f64) {
        let o = self.offset(idx);
        self.data[o] = v;
    }

    #[inline]
    pub fn add(&mut self, idx: [isize; 3], v: f64) {
        let o = self.offset(idx);
        self.data[o] += v;
    }

    pub fn fill(&mut self, v: f64) {
        self.data.fill(v);
    }

    /// Raw storage (valid and ghost cells, x fastest).
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Copy `src[idx - shift]` into `self[idx]` for every `idx` in `region`.
    ///
    /// `region` must lie inside this patch's grown box and, once shifted back,
    /// inside the source's grown box.
    pub fn copy_region_from(&mut self, src: &PatchArray, region: Rect3i, shift: [isize; 3]) {
        for idx in region.indices() {
            let s = [idx[0] - shift[0], idx[1] - shift[1], idx[2] - shift[2]];
            let v = src.get(s);
            self.set(idx, v);
        }
    }

    /// Largest absolute value over the valid region.
    pub fn max_abs_valid(&self) -> f64 {
        self.valid
            .indices()
            .map(|idx| self.get(idx).abs())
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grown_box_includes_ghosts() {
        let valid = Rect3i::new([4, 0, 0], [4, 2, 3]);
        let p = PatchArray::new(valid, [1, 0, 2], Centering::CELL);
        assert_eq!(p.grown(), Rect3i::new([3, 0, -2], [6, 2, 7]));
        assert_eq!(p.data().len(), 6 * 2 * 7);
    }

    #[test]
    fn copy_region_applies_shift() {
        let a_box = Rect3i::new([0, 0, 0], [4, 1, 1]);
        let mut a = PatchArray::new(a_box, [1, 0, 0], Centering::CELL);
        for i in 0..4 {
            a.set([i, 0, 0], i as f64 + 1.0);
        }
        let mut b = PatchArray::new(a_box, [1, 0, 0], Centering::CELL);
        // Ghost cell at i = -1 mirrors the periodic image of i = 3.
        b.copy_region_from(&a, Rect3i::new([-1, 0, 0], [1, 1, 1]), [-4, 0, 0]);
        assert_eq!(b.get([-1, 0, 0]), 4.0);
        assert_eq!(b.max_abs_valid(), 0.0);
        assert_eq!(a.max_abs_valid(), 4.0);
    }
}
