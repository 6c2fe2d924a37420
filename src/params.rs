// src/params.rs

use serde::{Deserialize, Serialize};

/// Speed of light in vacuum (m/s).
pub const C_SI: f64 = 299_792_458.0;
/// Vacuum permeability (H/m).
pub const MU0_SI: f64 = 1.256_637_062_12e-6;

/// Physical constants used by the field solver.
///
/// SI by default; tests and normalised runs set `c = mu0 = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysConst {
    pub c: f64,
    pub mu0: f64,
}

impl Default for PhysConst {
    fn default() -> Self {
        Self {
            c: C_SI,
            mu0: MU0_SI,
        }
    }
}

impl PhysConst {
    pub fn normalized() -> Self {
        Self { c: 1.0, mu0: 1.0 }
    }

    /// ε₀ = 1 / (μ₀ c²)
    #[inline]
    pub fn eps0(&self) -> f64 {
        1.0 / (self.mu0 * self.c * self.c)
    }
}

/// Finite-difference and particle-shape orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverOrders {
    /// Curl stencil order per axis (2, 4 or 6).
    pub stencil: [usize; 3],
    /// Particle shape order per axis; above 1 the particle gather needs
    /// freshly synchronised E and B ghosts.
    pub shape: [usize; 3],
}

impl Default for SolverOrders {
    fn default() -> Self {
        Self {
            stencil: [2; 3],
            shape: [1; 3],
        }
    }
}

impl SolverOrders {
    /// Ghost width needed by both the stencil and the particle shape.
    pub fn required_ghost(&self) -> usize {
        let s = self.stencil.iter().map(|o| o / 2).max().unwrap_or(1);
        let p = self.shape.iter().copied().max().unwrap_or(1);
        s.max(p).max(1)
    }

    pub fn high_order_shape(&self) -> bool {
        self.shape.iter().any(|&o| o > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn si_constants_give_vacuum_permittivity() {
        let k = PhysConst::default();
        assert!((k.eps0() - 8.854_187_8e-12).abs() < 1e-18);
        assert_eq!(PhysConst::normalized().eps0(), 1.0);
    }

    #[test]
    fn ghost_width_covers_stencil_and_shape() {
        let mut o = SolverOrders::default();
        assert_eq!(o.required_ghost(), 1);
        o.stencil = [4, 4, 2];
        assert_eq!(o.required_ghost(), 2);
        o.shape = [3, 1, 1];
        assert_eq!(o.required_ghost(), 3);
        assert!(o.high_order_shape());
    }
}
