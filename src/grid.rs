// src/grid.rs

use serde::{Deserialize, Serialize};

use crate::amr::rect::Rect3i;
use crate::error::{PicError, Result};

/// Supported spatial ranks.
///
/// 2-D runs live in the x–z plane: y is kept as a degenerate axis of length 1
/// so that all storage and stencil code is written once for three axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceDim {
    Two,
    Three,
}

impl SpaceDim {
    pub fn from_rank(rank: usize) -> Option<Self> {
        match rank {
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    pub fn rank(self) -> usize {
        match self {
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Which of (x, y, z) carry real extent.
    #[inline]
    pub fn active_axes(self) -> [bool; 3] {
        match self {
            Self::Two => [true, false, true],
            Self::Three => [true, true, true],
        }
    }

    /// Per-axis version of a scalar width, zero on inactive axes.
    #[inline]
    pub fn per_axis(self, w: usize) -> [usize; 3] {
        let act = self.active_axes();
        [
            if act[0] { w } else { 0 },
            if act[1] { w } else { 0 },
            if act[2] { w } else { 0 },
        ]
    }

    /// Per-axis refinement ratio (1 on inactive axes).
    #[inline]
    pub fn ratio(self, r: usize) -> [usize; 3] {
        let act = self.active_axes();
        [
            if act[0] { r } else { 1 },
            if act[1] { r } else { 1 },
            if act[2] { r } else { 1 },
        ]
    }
}

/// Index domain and physical metrics of one AMR level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub dim: SpaceDim,
    /// Cells of this level's domain in level index space.
    pub domain: Rect3i,
    /// Physical position of index 0 on each axis.
    pub prob_lo: [f64; 3],
    pub cell_size: [f64; 3],
    pub periodic: [bool; 3],
}

impl Geometry {
    /// Level-0 geometry covering `[prob_lo, prob_hi)` with `n_cell` cells.
    ///
    /// On a 2-D geometry the y entries are ignored (one cell of unit size).
    pub fn new(
        dim: SpaceDim,
        n_cell: [usize; 3],
        prob_lo: [f64; 3],
        prob_hi: [f64; 3],
        periodic: [bool; 3],
    ) -> Self {
        let act = dim.active_axes();
        let mut n = n_cell;
        let mut lo = prob_lo;
        let mut dx = [1.0; 3];
        let mut per = periodic;
        for a in 0..3 {
            if act[a] {
                dx[a] = (prob_hi[a] - prob_lo[a]) / n_cell[a].max(1) as f64;
            } else {
                n[a] = 1;
                lo[a] = 0.0;
                per[a] = false;
            }
        }
        Self {
            dim,
            domain: Rect3i::from_size(n),
            prob_lo: lo,
            cell_size: dx,
            periodic: per,
        }
    }

    /// Check that every active axis has a strictly positive cell size.
    pub fn validate(&self, level: usize) -> Result<()> {
        let act = self.dim.active_axes();
        for a in 0..3 {
            let dx = self.cell_size[a];
            if act[a] && !(dx > 0.0 && dx.is_finite()) {
                return Err(PicError::InvalidCellSize { level, axis: a, dx });
            }
        }
        Ok(())
    }

    /// Geometry of a finer level covering `region` (in this level's index space).
    ///
    /// Periodicity survives only along axes where the region spans the whole domain.
    pub fn refine(&self, region: Rect3i, ref_ratio: usize) -> Geometry {
        let r = self.dim.ratio(ref_ratio);
        let mut dx = self.cell_size;
        let mut per = self.periodic;
        for a in 0..3 {
            dx[a] /= r[a] as f64;
            per[a] = per[a] && region.lo[a] == self.domain.lo[a] && region.n[a] == self.domain.n[a];
        }
        Geometry {
            dim: self.dim,
            domain: region.refine(r),
            prob_lo: self.prob_lo,
            cell_size: dx,
            periodic: per,
        }
    }

    #[inline]
    pub fn ghost(&self, width: usize) -> [usize; 3] {
        self.dim.per_axis(width)
    }

    /// Cell volume (area in 2-D, per unit length along y).
    pub fn cell_volume(&self) -> f64 {
        let act = self.dim.active_axes();
        (0..3).filter(|&a| act[a]).map(|a| self.cell_size[a]).product()
    }

    /// Map an index into the domain through periodic images.
    ///
    /// Returns `None` when the index lies outside a non-periodic boundary.
    pub fn wrap(&self, idx: [isize; 3]) -> Option<[isize; 3]> {
        let mut out = idx;
        for a in 0..3 {
            let lo = self.domain.lo[a];
            let n = self.domain.n[a] as isize;
            if out[a] >= lo && out[a] < lo + n {
                continue;
            }
            if !self.periodic[a] {
                return None;
            }
            out[a] = lo + (out[a] - lo).rem_euclid(n);
        }
        Some(out)
    }

    /// Index shifts of every periodic image of the domain (including the identity).
    pub fn periodic_shifts(&self) -> Vec<[isize; 3]> {
        let choices = |a: usize| -> Vec<isize> {
            if self.periodic[a] {
                let n = self.domain.n[a] as isize;
                vec![-n, 0, n]
            } else {
                vec![0]
            }
        };
        let mut out = Vec::new();
        for &sz in &choices(2) {
            for &sy in &choices(1) {
                for &sx in &choices(0) {
                    out.push([sx, sy, sz]);
                }
            }
        }
        out
    }

    /// Continuous index of a physical coordinate along `axis`, measured from
    /// the staggered location of index 0 (nodal: cell corner, otherwise centre).
    #[inline]
    pub fn continuous_index(&self, x: f64, axis: usize, nodal: bool) -> f64 {
        let s = (x - self.prob_lo[axis]) / self.cell_size[axis];
        if nodal { s } else { s - 0.5 }
    }

    /// Physical extent of the domain along `axis`.
    pub fn length(&self, axis: usize) -> f64 {
        self.cell_size[axis] * self.domain.n[axis] as f64
    }
}
