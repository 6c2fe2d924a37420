// src/vector_field.rs

use serde::Serialize;

use crate::amr::patch::PatchArray;
use crate::amr::rect::Rect3i;
use crate::grid::{Geometry, SpaceDim};

/// Node/cell staggering of a scalar component along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Centering {
    pub nodal: [bool; 3],
}

impl Centering {
    pub const CELL: Centering = Centering { nodal: [false; 3] };
    pub const NODE: Centering = Centering { nodal: [true; 3] };

    /// Yee edge centring (E, J): cell-centred along its own axis, nodal across.
    pub fn yee_edge(comp: usize) -> Self {
        let mut nodal = [true; 3];
        nodal[comp] = false;
        Self { nodal }
    }

    /// Yee face centring (B): nodal along its own axis, cell-centred across.
    pub fn yee_face(comp: usize) -> Self {
        let mut nodal = [false; 3];
        nodal[comp] = true;
        Self { nodal }
    }

    /// Physical position of index `idx` under this staggering.
    pub fn position(self, geom: &Geometry, idx: [isize; 3]) -> [f64; 3] {
        let mut x = [0.0; 3];
        for a in 0..3 {
            let off = if self.nodal[a] { 0.0 } else { 0.5 };
            x[a] = geom.prob_lo[a] + (idx[a] as f64 + off) * geom.cell_size[a];
        }
        x
    }
}

/// Which physical quantity a vector field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Electric,
    Magnetic,
    Current,
}

impl FieldKind {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Electric => "E",
            Self::Magnetic => "B",
            Self::Current => "j",
        }
    }

    pub fn centering(self, comp: usize) -> Centering {
        match self {
            Self::Electric | Self::Current => Centering::yee_edge(comp),
            Self::Magnetic => Centering::yee_face(comp),
        }
    }
}

/// One scalar field decomposed into patches (one `PatchArray` per box).
#[derive(Debug, Clone)]
pub struct MultiField {
    pub name: String,
    pub centering: Centering,
    /// Uniform ghost width requested for this field (per active axis).
    pub n_grow: usize,
    pub patches: Vec<PatchArray>,
}

impl MultiField {
    pub fn new(
        name: impl Into<String>,
        boxes: &[Rect3i],
        dim: SpaceDim,
        n_grow: usize,
        centering: Centering,
    ) -> Self {
        let ghost = dim.per_axis(n_grow);
        Self {
            name: name.into(),
            centering,
            n_grow,
            patches: boxes
                .iter()
                .map(|&b| PatchArray::new(b, ghost, centering))
                .collect(),
        }
    }

    #[inline]
    pub fn n_grow(&self) -> usize {
        self.n_grow
    }

    /// Set every value, ghosts included.
    pub fn fill(&mut self, v: f64) {
        for p in &mut self.patches {
            p.fill(v);
        }
    }

    /// Patch whose valid box owns `idx`.
    pub fn locate(&self, idx: [isize; 3]) -> Option<usize> {
        self.patches.iter().position(|p| p.valid.contains(idx))
    }

    /// Owning value at `idx`, after mapping through periodic images.
    pub fn value_at(&self, geom: &Geometry, idx: [isize; 3]) -> Option<f64> {
        let w = geom.wrap(idx)?;
        self.locate(w).map(|p| self.patches[p].get(w))
    }

    /// Set valid values from a function of the staggered physical position.
    pub fn set_valid_with<F: Fn([f64; 3]) -> f64>(&mut self, geom: &Geometry, f: F) {
        let c = self.centering;
        for p in &mut self.patches {
            let valid = p.valid;
            for idx in valid.indices() {
                p.set(idx, f(c.position(geom, idx)));
            }
        }
    }

    /// Largest absolute value over all valid regions.
    pub fn max_abs(&self) -> f64 {
        self.patches
            .iter()
            .map(PatchArray::max_abs_valid)
            .fold(0.0, f64::max)
    }
}

/// Three components of E, B or J with Yee staggering.
#[derive(Debug, Clone)]
pub struct VectorField {
    pub kind: FieldKind,
    pub comps: [MultiField; 3],
}

impl VectorField {
    pub fn new(kind: FieldKind, boxes: &[Rect3i], dim: SpaceDim, n_grow: usize) -> Self {
        let comp = |c: usize| {
            let name = format!("{}{}", kind.symbol(), ["x", "y", "z"][c]);
            MultiField::new(name, boxes, dim, n_grow, kind.centering(c))
        };
        Self {
            kind,
            comps: [comp(0), comp(1), comp(2)],
        }
    }

    pub fn fill(&mut self, v: f64) {
        for c in &mut self.comps {
            c.fill(v);
        }
    }

    pub fn max_abs(&self) -> f64 {
        self.comps.iter().map(MultiField::max_abs).fold(0.0, f64::max)
    }

    /// `(1 − alpha)·old + alpha·new`, value by value (ghosts included).
    ///
    /// Both fields must share one patch layout. `alpha` of 0 or 1 reproduces
    /// `old` or `new` exactly.
    pub fn lerp(old: &VectorField, new: &VectorField, alpha: f64) -> VectorField {
        let mut out = new.clone();
        for (oc, c0) in out.comps.iter_mut().zip(&old.comps) {
            for (p, p0) in oc.patches.iter_mut().zip(&c0.patches) {
                for (v, &v0) in p.data_mut().iter_mut().zip(p0.data()) {
                    *v = (1.0 - alpha) * v0 + alpha * *v;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yee_staggering_matches_convention() {
        let e = FieldKind::Electric;
        let b = FieldKind::Magnetic;
        assert_eq!(e.centering(0).nodal, [false, true, true]);
        assert_eq!(e.centering(2).nodal, [true, true, false]);
        assert_eq!(b.centering(0).nodal, [true, false, false]);
        assert_eq!(b.centering(1).nodal, [false, true, false]);
    }

    #[test]
    fn value_at_finds_owner_through_periodic_image() {
        let geom = Geometry::new(SpaceDim::Three, [8, 2, 2], [0.0; 3], [8.0, 2.0, 2.0], [true; 3]);
        let boxes = geom.domain.chop(4);
        let mut f = MultiField::new("ex", &boxes, geom.dim, 1, Centering::yee_edge(0));
        f.set_valid_with(&geom, |x| x[0]);

        assert_eq!(f.locate([5, 0, 0]), Some(1));
        // Ex sits at i + 1/2 along x.
        assert_eq!(f.value_at(&geom, [-1, 0, 0]), Some(7.5));
        assert_eq!(f.max_abs(), 7.5);
    }

    #[test]
    fn component_names_follow_kind() {
        let geom = Geometry::new(SpaceDim::Two, [4, 1, 4], [0.0; 3], [1.0; 3], [false; 3]);
        let b = VectorField::new(FieldKind::Magnetic, &[geom.domain], geom.dim, 2);
        assert_eq!(b.comps[1].name, "By");
        assert_eq!(b.comps[1].patches[0].ghost, [2, 0, 2]);
    }

    #[test]
    fn lerp_blends_and_hits_end_points_exactly() {
        let geom = Geometry::new(SpaceDim::Two, [4, 1, 4], [0.0; 3], [1.0; 3], [true; 3]);
        let boxes = geom.domain.chop(2);
        let mut old = VectorField::new(FieldKind::Electric, &boxes, geom.dim, 1);
        let mut new = old.clone();
        old.comps[0].set_valid_with(&geom, |x| 0.1 * x[0] + 0.3);
        new.comps[0].set_valid_with(&geom, |x| x[2].sin());
        new.comps[2].fill(4.0);

        let start = VectorField::lerp(&old, &new, 0.0);
        let end = VectorField::lerp(&old, &new, 1.0);
        for c in 0..3 {
            for p in 0..boxes.len() {
                assert_eq!(start.comps[c].patches[p].data(), old.comps[c].patches[p].data());
                assert_eq!(end.comps[c].patches[p].data(), new.comps[c].patches[p].data());
            }
        }
        let mid = VectorField::lerp(&old, &new, 0.25);
        assert_eq!(mid.comps[2].patches[0].get([0, 0, 0]), 1.0);
    }
}
