// src/amr/rect.rs

/// Integer box in (i,j,k) index space, using half-open intervals:
/// [lo[0], lo[0]+n[0]) × [lo[1], lo[1]+n[1]) × [lo[2], lo[2]+n[2])
///
/// Boxes describe level domains, patch valid regions and their ghost-grown
/// extents. `lo` is signed because grown boxes reach below the domain origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect3i {
    pub lo: [isize; 3],
    pub n: [usize; 3],
}

impl Rect3i {
    #[inline]
    pub fn new(lo: [isize; 3], n: [usize; 3]) -> Self {
        Self { lo, n }
    }

    /// Box with lower corner at the origin.
    #[inline]
    pub fn from_size(n: [usize; 3]) -> Self {
        Self { lo: [0; 3], n }
    }

    /// Box spanning `lo` (inclusive) to `hi` (exclusive). Empty if `hi <= lo` on any axis.
    pub fn from_bounds(lo: [isize; 3], hi: [isize; 3]) -> Self {
        let mut n = [0usize; 3];
        for a in 0..3 {
            n[a] = (hi[a] - lo[a]).max(0) as usize;
        }
        Self { lo, n }
    }

    /// Exclusive upper corner.
    #[inline]
    pub fn hi(self) -> [isize; 3] {
        [
            self.lo[0] + self.n[0] as isize,
            self.lo[1] + self.n[1] as isize,
            self.lo[2] + self.n[2] as isize,
        ]
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.n.iter().any(|&n| n == 0)
    }

    #[inline]
    pub fn num_cells(self) -> usize {
        self.n[0] * self.n[1] * self.n[2]
    }

    #[inline]
    pub fn contains(self, idx: [isize; 3]) -> bool {
        let hi = self.hi();
        (0..3).all(|a| idx[a] >= self.lo[a] && idx[a] < hi[a])
    }

    /// True if `other` lies entirely inside this box.
    pub fn contains_box(self, other: Rect3i) -> bool {
        if other.is_empty() {
            return true;
        }
        let (hi, ohi) = (self.hi(), other.hi());
        (0..3).all(|a| other.lo[a] >= self.lo[a] && ohi[a] <= hi[a])
    }

    /// Intersection of two boxes.
    pub fn intersect(self, other: Rect3i) -> Option<Rect3i> {
        let (hi, ohi) = (self.hi(), other.hi());
        let mut lo = [0isize; 3];
        let mut top = [0isize; 3];
        for a in 0..3 {
            lo[a] = self.lo[a].max(other.lo[a]);
            top[a] = hi[a].min(ohi[a]);
            if top[a] <= lo[a] {
                return None;
            }
        }
        Some(Rect3i::from_bounds(lo, top))
    }

    /// Grow by `g[a]` cells on both sides of each axis.
    pub fn grow(self, g: [usize; 3]) -> Rect3i {
        let mut out = self;
        for a in 0..3 {
            out.lo[a] -= g[a] as isize;
            out.n[a] += 2 * g[a];
        }
        out
    }

    pub fn shift(self, s: [isize; 3]) -> Rect3i {
        Rect3i::new(
            [self.lo[0] + s[0], self.lo[1] + s[1], self.lo[2] + s[2]],
            self.n,
        )
    }

    /// Index-space refinement by a per-axis ratio.
    pub fn refine(self, r: [usize; 3]) -> Rect3i {
        let mut out = self;
        for a in 0..3 {
            out.lo[a] *= r[a] as isize;
            out.n[a] *= r[a];
        }
        out
    }

    /// Smallest coarse box covering this one under a per-axis ratio.
    pub fn coarsen(self, r: [usize; 3]) -> Rect3i {
        let hi = self.hi();
        let mut lo = [0isize; 3];
        let mut top = [0isize; 3];
        for a in 0..3 {
            let ra = r[a] as isize;
            lo[a] = self.lo[a].div_euclid(ra);
            top[a] = (hi[a] + ra - 1).div_euclid(ra);
        }
        Rect3i::from_bounds(lo, top)
    }

    /// All indices of the box, x fastest.
    pub fn indices(self) -> impl Iterator<Item = [isize; 3]> {
        let lo = self.lo;
        let hi = self.hi();
        (lo[2]..hi[2]).flat_map(move |k| {
            (lo[1]..hi[1]).flat_map(move |j| (lo[0]..hi[0]).map(move |i| [i, j, k]))
        })
    }

    /// Split into boxes no longer than `max_size` along any axis.
    ///
    /// The pieces tile `self` exactly and are returned in x-fastest order.
    pub fn chop(self, max_size: usize) -> Vec<Rect3i> {
        assert!(max_size >= 1, "max_size must be >= 1");
        let mut cuts: [Vec<(isize, usize)>; 3] = Default::default();
        for a in 0..3 {
            let mut start = 0usize;
            while start < self.n[a] {
                let len = max_size.min(self.n[a] - start);
                cuts[a].push((self.lo[a] + start as isize, len));
                start += len;
            }
        }
        let mut out = Vec::new();
        for &(k0, nk) in &cuts[2] {
            for &(j0, nj) in &cuts[1] {
                for &(i0, ni) in &cuts[0] {
                    out.push(Rect3i::new([i0, j0, k0], [ni, nj, nk]));
                }
            }
        }
        out
    }
}
