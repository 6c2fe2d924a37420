// src/evolve.rs
//
// Top-level step loop.
//
// At the start of a level step we hold B^{n-1/2}, E^n and particles with
// x^n, p^{n-1/2}. The leapfrog sequence below brings them to B^{n+1/2},
// E^{n+1}, x^{n+1}, p^{n+1/2}. Finer levels are sub-cycled recursively
// after their parent (Berger–Oliger, no refluxing).
//
// A fine sub-step s of m covers the parent fractions [s/m, (s+1)/m]. Its
// coarse-fine ghosts are blended in time between the parent fields saved at
// the start of the parent step (E^n, B^{n-1/2}) and the advanced ones
// (E^{n+1}, B^{n+1/2}):
//
//   start of sub-step   E at s/m,        B at (s−½)/m
//   SyncFields          E at s/m,        B at s/m
//   SyncB                                B at (s+½)/m
//   SyncE               E at (s+1)/m
//
// The parent current J^{n+1/2} is added to the fine current after the fine
// particle deposit. Afterwards E is averaged down; B only when m = 1, the
// one case where fine and coarse B share a time level.

use log::{debug, info, log_enabled, Level as LogLevel};

use crate::amr::hierarchy::{Hierarchy, Level};
use crate::error::{PicError, Result};
use crate::ghost::GhostExchange;
use crate::maxwell::FieldEvolver;
use crate::params::SolverOrders;
use crate::particles::ParticleContainer;
use crate::plotfile::SnapshotWriter;
use crate::stencil::{StencilOperator, YeeCurl};
use crate::time_step::TimeStepController;
use crate::vector_field::VectorField;

/// Relative tolerance (in units of the coarse step) for reaching `stop_time`.
const STOP_TIME_TOL: f64 = 1.0e-6;

/// The phases of one leapfrog step, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeapfrogPhase {
    /// B^{n-1/2} → B^n
    PushBFirstHalf,
    /// Ghost sync of all six E/B components; only with particle shapes above first order.
    SyncFields,
    /// Particle push with E^n, B^n and deposition of J^{n+1/2}.
    AdvanceParticles,
    Redistribute,
    /// B^n → B^{n+1/2}
    PushBSecondHalf,
    SyncB,
    /// E^n → E^{n+1}
    PushE,
    SyncE,
}

impl LeapfrogPhase {
    pub const SEQUENCE: [LeapfrogPhase; 8] = [
        LeapfrogPhase::PushBFirstHalf,
        LeapfrogPhase::SyncFields,
        LeapfrogPhase::AdvanceParticles,
        LeapfrogPhase::Redistribute,
        LeapfrogPhase::PushBSecondHalf,
        LeapfrogPhase::SyncB,
        LeapfrogPhase::PushE,
        LeapfrogPhase::SyncE,
    ];

    /// Phase that follows `self`, or `None` at the end of the step.
    pub fn next(self, sync_fields: bool) -> Option<LeapfrogPhase> {
        use LeapfrogPhase::*;
        match self {
            PushBFirstHalf if sync_fields => Some(SyncFields),
            PushBFirstHalf | SyncFields => Some(AdvanceParticles),
            AdvanceParticles => Some(Redistribute),
            Redistribute => Some(PushBSecondHalf),
            PushBSecondHalf => Some(SyncB),
            SyncB => Some(PushE),
            PushE => Some(SyncE),
            SyncE => None,
        }
    }
}

/// Enforces the phase order of a single leapfrog step.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    sync_fields: bool,
    history: Vec<LeapfrogPhase>,
}

impl PhaseTracker {
    pub fn new(sync_fields: bool) -> Self {
        Self {
            sync_fields,
            history: Vec::with_capacity(LeapfrogPhase::SEQUENCE.len()),
        }
    }

    /// The only phase that may be entered next.
    pub fn expected(&self) -> Option<LeapfrogPhase> {
        match self.history.last() {
            None => Some(LeapfrogPhase::PushBFirstHalf),
            Some(p) => p.next(self.sync_fields),
        }
    }

    pub fn enter(&mut self, phase: LeapfrogPhase) -> Result<()> {
        let expected = self.expected();
        if expected != Some(phase) {
            return Err(PicError::PhaseOutOfOrder {
                expected,
                found: phase,
            });
        }
        self.history.push(phase);
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        !self.history.is_empty() && self.expected().is_none()
    }

    pub fn history(&self) -> &[LeapfrogPhase] {
        &self.history
    }
}

/// Loop limits and output cadence.
#[derive(Debug, Clone, Copy)]
pub struct RunControl {
    pub max_step: usize,
    pub stop_time: f64,
    /// Steps between snapshots; zero or negative disables output.
    pub plot_interval: i64,
    pub orders: SolverOrders,
}

/// What one call to [`Simulation::evolve`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvolveReport {
    pub steps_taken: usize,
    pub final_step: usize,
    pub final_time: f64,
    pub max_time_reached: bool,
    /// Level-0 steps at which a snapshot was written.
    pub snapshots: Vec<usize>,
}

pub struct Simulation<S: StencilOperator = YeeCurl> {
    pub hierarchy: Hierarchy,
    pub evolver: FieldEvolver<S>,
    pub controller: TimeStepController,
    pub control: RunControl,
    ghost: Box<dyn GhostExchange>,
    particles: Box<dyn ParticleContainer>,
    writer: Option<Box<dyn SnapshotWriter>>,
    cur_time: f64,
    last_plot_step: usize,
    last_phases: Vec<LeapfrogPhase>,
}

/// Parent fields at the start of the parent step and the position of one
/// fine sub-step inside it.
struct SubStep<'a> {
    e_old: &'a VectorField,
    b_old: &'a VectorField,
    sub: i64,
    n_sub: i64,
}

impl SubStep<'_> {
    /// Parent-step fraction `offset` fine steps after the start of this sub-step.
    fn frac(&self, offset: f64) -> f64 {
        (self.sub as f64 + offset) / self.n_sub as f64
    }
}

fn sync_e(ghost: &dyn GhostExchange, level: &mut Level) {
    let g = level.geom;
    ghost.sync_vector(&mut level.e, &g);
}

fn sync_b(ghost: &dyn GhostExchange, level: &mut Level) {
    let g = level.geom;
    ghost.sync_vector(&mut level.b, &g);
}

impl<S: StencilOperator> Simulation<S> {
    /// Assemble a simulation and bring every ghost cell up to date.
    pub fn new(
        hierarchy: Hierarchy,
        evolver: FieldEvolver<S>,
        controller: TimeStepController,
        control: RunControl,
        ghost: Box<dyn GhostExchange>,
        particles: Box<dyn ParticleContainer>,
    ) -> Self {
        let cur_time = hierarchy.levels[0].time;
        let last_plot_step = hierarchy.levels[0].step;
        let mut sim = Self {
            hierarchy,
            evolver,
            controller,
            control,
            ghost,
            particles,
            writer: None,
            cur_time,
            last_plot_step,
            last_phases: Vec::new(),
        };
        for lev in 0..=sim.hierarchy.finest_level() {
            sim.sync_level(lev);
        }
        sim
    }

    pub fn with_writer(mut self, writer: Box<dyn SnapshotWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    #[inline]
    pub fn cur_time(&self) -> f64 {
        self.cur_time
    }

    #[inline]
    pub fn last_plot_step(&self) -> usize {
        self.last_plot_step
    }

    /// Phases executed by the most recent level-0 step.
    pub fn last_step_phases(&self) -> &[LeapfrogPhase] {
        &self.last_phases
    }

    /// Coarse→fine ghost fill (for refined levels) followed by intra-level sync.
    fn sync_level(&mut self, lev: usize) {
        if lev > 0 {
            self.hierarchy.fill_fine_ghosts(lev);
        }
        let level = &mut self.hierarchy.levels[lev];
        sync_e(self.ghost.as_ref(), level);
        sync_b(self.ghost.as_ref(), level);
    }

    /// Run level-0 steps until `num_steps` (absolute step index, capped at
    /// `max_step`; `None` means `max_step`) or `stop_time` is reached.
    pub fn evolve(&mut self, num_steps: Option<usize>) -> Result<EvolveReport> {
        let max_step = self.control.max_step;
        let stop_time = self.control.stop_time;
        let plot_int = self.control.plot_interval;
        let numsteps_max = match num_steps {
            Some(n) if n <= max_step => n,
            _ => max_step,
        };

        let mut report = EvolveReport::default();
        let mut step = self.hierarchy.levels[0].step;
        while step < numsteps_max && self.cur_time < stop_time {
            info!("STEP {} starts ...", step + 1);

            let dts = self.controller.compute_dt(&self.hierarchy, self.cur_time, stop_time)?;
            for (level, dt) in self.hierarchy.levels.iter_mut().zip(&dts) {
                level.dt = *dt;
            }

            self.one_step(0, None)?;

            self.cur_time += dts[0];
            info!("STEP {} ends. TIME = {} DT = {}", step + 1, self.cur_time, dts[0]);
            if log_enabled!(LogLevel::Debug) {
                debug!(
                    "field energy (level 0) = {:.6e}, kinetic energy = {:.6e}",
                    self.evolver.field_energy(&self.hierarchy.levels[0]),
                    self.particles.kinetic_energy()
                );
            }
            for level in &mut self.hierarchy.levels {
                level.time = self.cur_time;
            }
            report.steps_taken += 1;

            if plot_int > 0 && (step as i64 + 1) % plot_int == 0 {
                self.last_plot_step = step + 1;
                self.write_plot(&mut report)?;
            }

            if self.cur_time >= stop_time - STOP_TIME_TOL * dts[0] {
                report.max_time_reached = true;
                break;
            }
            step += 1;
        }

        let istep = self.hierarchy.levels[0].step;
        if plot_int > 0
            && istep > self.last_plot_step
            && (report.max_time_reached || istep >= max_step)
        {
            self.last_plot_step = istep;
            self.write_plot(&mut report)?;
        }

        report.final_step = istep;
        report.final_time = self.cur_time;
        Ok(report)
    }

    fn write_plot(&mut self, report: &mut EvolveReport) -> Result<()> {
        let step = self.hierarchy.levels[0].step;
        if let Some(w) = self.writer.as_mut() {
            w.write_snapshot(step, self.cur_time, &self.hierarchy)?;
        }
        report.snapshots.push(step);
        Ok(())
    }

    /// One step of `lev`, then the sub-cycled steps of every finer level.
    fn one_step(&mut self, lev: usize, sub: Option<&SubStep>) -> Result<()> {
        let saved = (lev < self.hierarchy.finest_level()).then(|| {
            let level = &self.hierarchy.levels[lev];
            (level.e.clone(), level.b.clone())
        });

        let dt = self.hierarchy.levels[lev].dt;
        let phases = self.leapfrog(lev, dt, sub)?;
        if lev == 0 {
            self.last_phases = phases;
        }

        if let Some((e_old, b_old)) = saved {
            let fine = lev + 1;
            let n_sub = self.hierarchy.levels[fine].subcycle_ratio;
            if n_sub <= 0 {
                return Err(PicError::InvalidSubcycleRatio {
                    level: fine,
                    ratio: n_sub,
                });
            }
            for s in 0..n_sub {
                let window = SubStep {
                    e_old: &e_old,
                    b_old: &b_old,
                    sub: s,
                    n_sub,
                };
                self.one_step(fine, Some(&window))?;
                let level = &mut self.hierarchy.levels[fine];
                level.time += level.dt;
                debug!(
                    "level {} sub-step {}/{} ends. TIME = {}",
                    fine,
                    s + 1,
                    n_sub,
                    level.time
                );
            }
            let with_b = n_sub == 1;
            self.hierarchy.average_down(fine, with_b);
            let level = &mut self.hierarchy.levels[lev];
            sync_e(self.ghost.as_ref(), level);
            if with_b {
                sync_b(self.ghost.as_ref(), level);
            }
        }
        Ok(())
    }

    /// Coarse-fine E ghosts at parent fraction `sub.frac(offset)`, then intra-level sync.
    fn fill_e(&mut self, lev: usize, sub: Option<&SubStep>, offset: f64) {
        if let Some(s) = sub {
            self.hierarchy
                .fill_fine_e_ghosts_between(lev, s.e_old, s.frac(offset));
        }
        sync_e(self.ghost.as_ref(), &mut self.hierarchy.levels[lev]);
    }

    /// B counterpart of `fill_e`; B^{n±1/2} bracket the parent step.
    fn fill_b(&mut self, lev: usize, sub: Option<&SubStep>, offset: f64) {
        if let Some(s) = sub {
            self.hierarchy
                .fill_fine_b_ghosts_between(lev, s.b_old, s.frac(offset) + 0.5);
        }
        sync_b(self.ghost.as_ref(), &mut self.hierarchy.levels[lev]);
    }

    /// The leapfrog phase sequence on one level.
    fn leapfrog(&mut self, lev: usize, dt: f64, sub: Option<&SubStep>) -> Result<Vec<LeapfrogPhase>> {
        use LeapfrogPhase::*;
        let mut tracker = PhaseTracker::new(self.control.orders.high_order_shape());

        if sub.is_some() {
            self.fill_e(lev, sub, 0.0);
            self.fill_b(lev, sub, -0.5);
        }

        tracker.enter(PushBFirstHalf)?;
        self.evolver.evolve_b(&mut self.hierarchy.levels[lev], 0.5 * dt)?;

        if tracker.expected() == Some(SyncFields) {
            tracker.enter(SyncFields)?;
            self.fill_b(lev, sub, 0.0);
            self.fill_e(lev, sub, 0.0);
        }

        tracker.enter(AdvanceParticles)?;
        self.particles
            .advance_and_deposit(&mut self.hierarchy.levels[lev], dt)?;
        if lev > 0 {
            self.hierarchy.add_parent_current(lev);
        }

        tracker.enter(Redistribute)?;
        self.particles.redistribute(&self.hierarchy, false, true);

        tracker.enter(PushBSecondHalf)?;
        self.evolver.evolve_b(&mut self.hierarchy.levels[lev], 0.5 * dt)?;

        tracker.enter(SyncB)?;
        self.fill_b(lev, sub, 0.5);

        tracker.enter(PushE)?;
        self.evolver.evolve_e(&mut self.hierarchy.levels[lev], dt)?;

        tracker.enter(SyncE)?;
        self.fill_e(lev, sub, 1.0);

        debug_assert!(tracker.is_complete());
        self.hierarchy.levels[lev].step += 1;
        Ok(tracker.history().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LeapfrogPhase::*;

    #[test]
    fn tracker_follows_sequence() {
        let mut t = PhaseTracker::new(false);
        for p in [
            PushBFirstHalf,
            AdvanceParticles,
            Redistribute,
            PushBSecondHalf,
            SyncB,
            PushE,
            SyncE,
        ] {
            t.enter(p).unwrap();
        }
        assert!(t.is_complete());
        assert_eq!(t.history().len(), 7);

        let mut t = PhaseTracker::new(true);
        for p in LeapfrogPhase::SEQUENCE {
            t.enter(p).unwrap();
        }
        assert!(t.is_complete());
    }

    #[test]
    fn tracker_rejects_reordering() {
        let mut t = PhaseTracker::new(false);
        t.enter(PushBFirstHalf).unwrap();
        let err = t.enter(PushE).unwrap_err();
        assert!(matches!(
            err,
            PicError::PhaseOutOfOrder {
                expected: Some(AdvanceParticles),
                found: PushE
            }
        ));
        // Skipping the field sync is not allowed when it is required.
        let mut t = PhaseTracker::new(true);
        t.enter(PushBFirstHalf).unwrap();
        assert!(t.enter(AdvanceParticles).is_err());
        // Nothing follows the last phase.
        assert_eq!(SyncE.next(true), None);
        assert!(!PhaseTracker::new(false).is_complete());
    }
}
