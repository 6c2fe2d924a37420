// src/lib.rs

pub mod amr;
pub mod config;
pub mod error;
pub mod evolve;
pub mod ghost;
pub mod grid;
pub mod initial_states;
pub mod maxwell;
pub mod params;
pub mod particles;
pub mod plotfile;
pub mod stencil;
pub mod time_step;
pub mod vec3;
pub mod vector_field;
pub mod visualisation;

pub use error::{PicError, Result};
pub use evolve::{EvolveReport, LeapfrogPhase, RunControl, Simulation};
