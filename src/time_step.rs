// src/time_step.rs

use log::warn;

use crate::amr::hierarchy::Hierarchy;
use crate::error::{PicError, Result};
use crate::grid::Geometry;
use crate::params::PhysConst;

/// Relative margin below which a step is stretched to land on `stop_time`.
const STOP_TIME_EPS: f64 = 1.0e-3;

/// Courant-limited time step for every level of a hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct TimeStepController {
    /// Courant number, in (0, 1].
    pub cfl: f64,
    pub consts: PhysConst,
}

impl TimeStepController {
    pub fn new(cfl: f64, consts: PhysConst) -> Self {
        Self { cfl, consts }
    }

    /// `cfl / (c · sqrt(Σ 1/dx²))` over the active axes of `geom`.
    pub fn candidate_dt(&self, geom: &Geometry, level: usize) -> Result<f64> {
        geom.validate(level)?;
        let act = geom.dim.active_axes();
        let inv_dx2: f64 = (0..3)
            .filter(|&a| act[a])
            .map(|a| 1.0 / (geom.cell_size[a] * geom.cell_size[a]))
            .sum();
        Ok(self.cfl / (self.consts.c * inv_dx2.sqrt()))
    }

    /// Time step of every level for the step starting at `cur_time`.
    ///
    /// Level 0 takes the Courant step, shortened to hit `stop_time` exactly
    /// when it would otherwise overshoot (or undershoot by less than a
    /// thousandth of a step). Finer levels divide their parent's step by their
    /// sub-cycling ratio.
    pub fn compute_dt(&self, hierarchy: &Hierarchy, cur_time: f64, stop_time: f64) -> Result<Vec<f64>> {
        for lev in &hierarchy.levels {
            lev.geom.validate(lev.index)?;
            if lev.index > 0 && lev.subcycle_ratio <= 0 {
                return Err(PicError::InvalidSubcycleRatio {
                    level: lev.index,
                    ratio: lev.subcycle_ratio,
                });
            }
        }

        let base = &hierarchy.levels[0];
        let mut dt0 = self.candidate_dt(&base.geom, 0)?;
        if cur_time + dt0 > stop_time - STOP_TIME_EPS * dt0 {
            dt0 = stop_time - cur_time;
        }

        let mut dts = Vec::with_capacity(hierarchy.levels.len());
        dts.push(dt0);
        for lev in &hierarchy.levels[1..] {
            let dt = dts[lev.index - 1] / lev.subcycle_ratio as f64;
            let limit = self.candidate_dt(&lev.geom, lev.index)?;
            if dt > limit * (1.0 + 1e-12) {
                warn!(
                    "level {}: sub-cycled dt {:.6e} exceeds its Courant limit {:.6e}",
                    lev.index, dt, limit
                );
            }
            dts.push(dt);
        }
        Ok(dts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amr::rect::Rect3i;
    use crate::grid::SpaceDim;
    use approx::assert_relative_eq;

    fn hierarchy() -> Hierarchy {
        let g = Geometry::new(SpaceDim::Three, [8, 8, 8], [0.0; 3], [8.0, 16.0, 4.0], [true; 3]);
        Hierarchy::new(g, 8, 1)
    }

    #[test]
    fn candidate_matches_courant_number() {
        let h = hierarchy();
        let ctl = TimeStepController::new(0.7, PhysConst::normalized());
        let g = &h.levels[0].geom;
        let dt = ctl.candidate_dt(g, 0).unwrap();
        assert!(dt > 0.0);
        let s: f64 = g.cell_size.iter().map(|d| 1.0 / (d * d)).sum();
        assert_relative_eq!(dt * s.sqrt(), 0.7, max_relative = 1e-14);
    }

    #[test]
    fn two_dimensional_step_ignores_y() {
        let g = Geometry::new(SpaceDim::Two, [4, 1, 4], [0.0; 3], [4.0, 1e-9, 4.0], [false; 3]);
        let ctl = TimeStepController::new(1.0, PhysConst::normalized());
        assert_relative_eq!(ctl.candidate_dt(&g, 0).unwrap(), 1.0 / 2f64.sqrt());
    }

    #[test]
    fn last_step_lands_on_stop_time() {
        let h = hierarchy();
        let ctl = TimeStepController::new(1.0, PhysConst::normalized());
        let full = ctl.compute_dt(&h, 0.0, 100.0).unwrap()[0];
        let t = 100.0 - 0.5 * full;
        let dt = ctl.compute_dt(&h, t, 100.0).unwrap()[0];
        assert_eq!(t + dt, 100.0);
        // Within a thousandth of a step the step is stretched, not split.
        let t = 100.0 - 1.0005 * full;
        let dt = ctl.compute_dt(&h, t, 100.0).unwrap()[0];
        assert!(dt > full);
        assert_eq!(t + dt, 100.0);
    }

    #[test]
    fn child_steps_divide_by_subcycle_ratio() {
        let mut h = hierarchy();
        h.add_level(Rect3i::new([2, 2, 2], [4, 4, 4]), 2, 2).unwrap();
        h.add_level(Rect3i::new([6, 6, 6], [4, 4, 4]), 2, 4).unwrap();
        let ctl = TimeStepController::new(0.5, PhysConst::normalized());
        let dts = ctl.compute_dt(&h, 0.0, 1e9).unwrap();
        assert_eq!(dts.len(), 3);
        assert_relative_eq!(dts[1], dts[0] / 2.0);
        assert_relative_eq!(dts[2], dts[0] / 8.0);
    }

    #[test]
    fn invalid_levels_are_fatal() {
        let mut h = hierarchy();
        h.add_level(Rect3i::new([2, 2, 2], [4, 4, 4]), 2, 2).unwrap();
        h.levels[1].subcycle_ratio = -1;
        let ctl = TimeStepController::new(0.5, PhysConst::normalized());
        assert!(matches!(
            ctl.compute_dt(&h, 0.0, 1.0),
            Err(PicError::InvalidSubcycleRatio { level: 1, ratio: -1 })
        ));

        let mut h = hierarchy();
        h.levels[0].geom.cell_size[0] = -1.0;
        assert!(matches!(
            ctl.compute_dt(&h, 0.0, 1.0),
            Err(PicError::InvalidCellSize { level: 0, axis: 0, .. })
        ));
    }
}
