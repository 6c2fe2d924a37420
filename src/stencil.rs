// src/stencil.rs
//
// Staggered finite-difference curl on Yee patches.
//
// The field solver only talks to `StencilOperator`; `YeeCurl` is the plain
// reference kernel (centered differences of order 2, 4 or 6, no offset).

use crate::amr::patch::PatchArray;
use crate::error::{PicError, Result};

/// Patch-local curl update: `dst += coef ⊙ curl(src)`.
///
/// `coef[a]` multiplies the difference taken along axis `a` (typically
/// ±dt/dx_a, with the sign of the update folded in). A zero coefficient
/// marks a degenerate axis whose neighbours must not be read.
///
/// The update direction of each difference follows the centring of the
/// destination: a destination nodal along `a` takes a backward difference of
/// a cell-centred source, a cell-centred destination a forward difference.
///
/// Fails without touching `dst` if an active axis asks for an unsupported
/// order or for more ghost cells than `guard`.
pub trait StencilOperator: Send + Sync {
    fn curl_update(
        &self,
        src: [&PatchArray; 3],
        dst: [&mut PatchArray; 3],
        coef: [f64; 3],
        order: [usize; 3],
        guard: usize,
    ) -> Result<()>;
}

static ORDER2: [f64; 1] = [1.0];
static ORDER4: [f64; 2] = [9.0 / 8.0, -1.0 / 24.0];
static ORDER6: [f64; 3] = [75.0 / 64.0, -25.0 / 384.0, 3.0 / 640.0];

/// Coefficients of the staggered centered first derivative of given order.
///
/// Entry `k-1` weights `f(x + (k-½)h) - f(x - (k-½)h)`.
pub fn staggered_coefficients(order: usize) -> Result<&'static [f64]> {
    match order {
        2 => Ok(&ORDER2[..]),
        4 => Ok(&ORDER4[..]),
        6 => Ok(&ORDER6[..]),
        o => Err(PicError::UnsupportedOrder(o)),
    }
}

/// Check a stencil configuration against the ghost width of the fields.
pub fn check_stencil(order: [usize; 3], active: [bool; 3], guard: usize) -> Result<()> {
    for a in 0..3 {
        if !active[a] {
            continue;
        }
        staggered_coefficients(order[a])?;
        let needed = order[a] / 2;
        if needed > guard {
            return Err(PicError::StencilTooWide {
                axis: a,
                order: order[a],
                needed,
                ghost: guard,
            });
        }
    }
    Ok(())
}

/// Reference Yee curl kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct YeeCurl;

#[inline]
fn step(idx: [isize; 3], axis: usize, by: isize) -> [isize; 3] {
    let mut out = idx;
    out[axis] += by;
    out
}

/// Staggered difference of `s` along `axis`, evaluated at `idx` of a
/// destination with the given nodality along that axis.
#[inline]
fn difference(s: &PatchArray, idx: [isize; 3], axis: usize, dst_nodal: bool, c: &[f64]) -> f64 {
    let mut acc = 0.0;
    for (k0, &ck) in c.iter().enumerate() {
        let k = k0 as isize + 1;
        let (up, down) = if dst_nodal { (k - 1, -k) } else { (k, 1 - k) };
        acc += ck * (s.get(step(idx, axis, up)) - s.get(step(idx, axis, down)));
    }
    acc
}

impl StencilOperator for YeeCurl {
    fn curl_update(
        &self,
        src: [&PatchArray; 3],
        dst: [&mut PatchArray; 3],
        coef: [f64; 3],
        order: [usize; 3],
        guard: usize,
    ) -> Result<()> {
        check_stencil(order, coef.map(|c| c != 0.0), guard)?;
        let unused: &[f64] = &[];
        let mut coeffs = [unused; 3];
        for a in (0..3).filter(|&a| coef[a] != 0.0) {
            coeffs[a] = staggered_coefficients(order[a])?;
        }

        for (d, out) in dst.into_iter().enumerate() {
            let a1 = (d + 1) % 3;
            let a2 = (d + 2) % 3;
            let nodal = out.centering.nodal;
            let valid = out.valid;
            for idx in valid.indices() {
                let mut du = 0.0;
                if coef[a1] != 0.0 {
                    du += coef[a1] * difference(src[a2], idx, a1, nodal[a1], coeffs[a1]);
                }
                if coef[a2] != 0.0 {
                    du -= coef[a2] * difference(src[a1], idx, a2, nodal[a2], coeffs[a2]);
                }
                out.add(idx, du);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amr::rect::Rect3i;
    use crate::vector_field::FieldKind;
    use approx::assert_abs_diff_eq;

    fn patches(kind: FieldKind, valid: Rect3i, g: usize) -> [PatchArray; 3] {
        [0, 1, 2].map(|c| PatchArray::new(valid, [g; 3], kind.centering(c)))
    }

    #[test]
    fn derivative_weights_sum_to_unit_slope() {
        for order in [2, 4, 6] {
            let c = staggered_coefficients(order).unwrap();
            let slope: f64 = c
                .iter()
                .enumerate()
                .map(|(k, ck)| ck * (2 * k + 1) as f64)
                .sum();
            assert_abs_diff_eq!(slope, 1.0, epsilon = 1e-14);
        }
        assert!(matches!(
            staggered_coefficients(3),
            Err(PicError::UnsupportedOrder(3))
        ));
    }

    #[test]
    fn check_stencil_rejects_narrow_ghosts() {
        assert!(check_stencil([4, 4, 4], [true; 3], 2).is_ok());
        assert!(matches!(
            check_stencil([4, 2, 6], [true; 3], 2),
            Err(PicError::StencilTooWide { axis: 2, needed: 3, .. })
        ));
        // Degenerate axes are never checked.
        assert!(check_stencil([2, 8, 2], [true, false, true], 1).is_ok());
    }

    #[test]
    fn linear_ey_drives_uniform_bz() {
        for order in [2, 4, 6] {
            let g = order / 2;
            let valid = Rect3i::from_size([6, 2, 2]);
            let mut e = patches(FieldKind::Electric, valid, g);
            let mut b = patches(FieldKind::Magnetic, valid, g);
            // Ey = 3 x, including ghosts; Ey is nodal along x.
            for idx in e[1].grown().indices() {
                e[1].set(idx, 3.0 * idx[0] as f64);
            }
            let [bx, by, bz] = &mut b;
            YeeCurl.curl_update(
                [&e[0], &e[1], &e[2]],
                [bx, by, bz],
                [-0.1, -0.1, -0.1],
                [order; 3],
                g,
            )
            .unwrap();
            for idx in valid.indices() {
                assert_abs_diff_eq!(b[2].get(idx), -0.3, epsilon = 1e-12);
                assert_eq!(b[0].get(idx), 0.0);
                assert_eq!(b[1].get(idx), 0.0);
            }
        }
    }

    #[test]
    fn zero_coefficient_axis_is_not_read() {
        // A 2-D style patch: no ghosts along y.
        let valid = Rect3i::from_size([4, 1, 4]);
        let ghost = [1, 0, 1];
        let e: [PatchArray; 3] =
            [0, 1, 2].map(|c| PatchArray::new(valid, ghost, FieldKind::Electric.centering(c)));
        let mut b: [PatchArray; 3] =
            [0, 1, 2].map(|c| PatchArray::new(valid, ghost, FieldKind::Magnetic.centering(c)));
        let [bx, by, bz] = &mut b;
        YeeCurl
            .curl_update([&e[0], &e[1], &e[2]], [bx, by, bz], [-1.0, 0.0, -1.0], [2; 3], 1)
            .unwrap();
        assert_eq!(b[0].max_abs_valid(), 0.0);
    }

    #[test]
    fn direct_calls_reject_bad_orders_without_writing() {
        let valid = Rect3i::from_size([4, 4, 4]);
        let mut e = patches(FieldKind::Electric, valid, 1);
        e[1].fill(1.0);
        let mut b = patches(FieldKind::Magnetic, valid, 1);
        let coef = [-0.5; 3];

        let [bx, by, bz] = &mut b;
        let err = YeeCurl
            .curl_update([&e[0], &e[1], &e[2]], [bx, by, bz], coef, [2, 3, 2], 1)
            .unwrap_err();
        assert!(matches!(err, PicError::UnsupportedOrder(3)));

        let [bx, by, bz] = &mut b;
        let err = YeeCurl
            .curl_update([&e[0], &e[1], &e[2]], [bx, by, bz], coef, [4, 2, 2], 1)
            .unwrap_err();
        assert!(matches!(err, PicError::StencilTooWide { axis: 0, needed: 2, .. }));
        assert!(b.iter().all(|p| p.data().iter().all(|&v| v == 0.0)));
    }
}
