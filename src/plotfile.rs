// src/plotfile.rs
//
// Snapshot output.
//
// One directory per snapshot, `plt{step:05}/`, holding:
//  - header.json: step, time and the layout of every level
//  - Level_{l}/{component}.txt: one value per cell of the level domain,
//    x fastest, preceded by a short `#` header
//  - optionally a PNG of the mid-plane of each E component on level 0

use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use crate::amr::hierarchy::{Hierarchy, Level};
use crate::error::Result;
use crate::grid::SpaceDim;
use crate::vector_field::MultiField;
use crate::visualisation::save_component_slice;

/// Receives the hierarchy at plot steps.
pub trait SnapshotWriter {
    fn write_snapshot(&mut self, step: usize, time: f64, hierarchy: &Hierarchy) -> Result<()>;
}

#[derive(Serialize)]
struct LevelHeader {
    level: usize,
    dim: SpaceDim,
    domain_lo: [isize; 3],
    domain_n: [usize; 3],
    prob_lo: [f64; 3],
    cell_size: [f64; 3],
    periodic: [bool; 3],
    time: f64,
    step: usize,
    dt: f64,
    ref_ratio: usize,
    subcycle_ratio: i64,
    n_ghost: usize,
    patches: Vec<([isize; 3], [usize; 3])>,
    components: Vec<String>,
}

#[derive(Serialize)]
struct PlotHeader {
    step: usize,
    time: f64,
    finest_level: usize,
    levels: Vec<LevelHeader>,
}

impl LevelHeader {
    fn new(l: &Level) -> Self {
        Self {
            level: l.index,
            dim: l.geom.dim,
            domain_lo: l.geom.domain.lo,
            domain_n: l.geom.domain.n,
            prob_lo: l.geom.prob_lo,
            cell_size: l.geom.cell_size,
            periodic: l.geom.periodic,
            time: l.time,
            step: l.step,
            dt: l.dt,
            ref_ratio: l.ref_ratio,
            subcycle_ratio: l.subcycle_ratio,
            n_ghost: l.e.comps[0].n_grow(),
            patches: l.boxes.iter().map(|b| (b.lo, b.n)).collect(),
            components: plotted(l).map(|f| f.name.clone()).collect(),
        }
    }
}

fn plotted(l: &Level) -> impl Iterator<Item = &MultiField> {
    l.e.comps.iter().chain(l.b.comps.iter()).chain(l.j.comps.iter())
}

/// Directory name of the snapshot taken at `step`.
pub fn snapshot_dir_name(step: usize) -> String {
    format!("plt{:05}", step)
}

fn write_component(path: &Path, level: &Level, field: &MultiField, time: f64) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);
    let d = level.geom.domain;

    writeln!(w, "# component: {}", field.name)?;
    writeln!(w, "# level: {}", level.index)?;
    writeln!(w, "# time: {:.16e}", time)?;
    writeln!(w, "# nodal: {:?}", field.centering.nodal)?;
    writeln!(w, "# lo: {} {} {}", d.lo[0], d.lo[1], d.lo[2])?;
    writeln!(w, "# n: {} {} {}", d.n[0], d.n[1], d.n[2])?;
    for idx in d.indices() {
        let v = field.value_at(&level.geom, idx).unwrap_or(0.0);
        writeln!(w, "{:.16e}", v)?;
    }
    w.flush()?;
    Ok(())
}

/// Writes `plt*` directories under `root`.
#[derive(Debug, Clone)]
pub struct PlotFileWriter {
    pub root: PathBuf,
    pub png: bool,
}

impl PlotFileWriter {
    pub fn new(root: impl Into<PathBuf>, png: bool) -> Self {
        Self {
            root: root.into(),
            png,
        }
    }
}

impl SnapshotWriter for PlotFileWriter {
    fn write_snapshot(&mut self, step: usize, time: f64, hierarchy: &Hierarchy) -> Result<()> {
        let dir = self.root.join(snapshot_dir_name(step));
        create_dir_all(&dir)?;

        let header = PlotHeader {
            step,
            time,
            finest_level: hierarchy.finest_level(),
            levels: hierarchy.levels.iter().map(LevelHeader::new).collect(),
        };
        let file = File::create(dir.join("header.json"))?;
        serde_json::to_writer_pretty(file, &header)?;

        for level in &hierarchy.levels {
            let ldir = dir.join(format!("Level_{}", level.index));
            create_dir_all(&ldir)?;
            for f in plotted(level) {
                write_component(&ldir.join(format!("{}.txt", f.name)), level, f, time)?;
            }
        }

        if self.png {
            let base = &hierarchy.levels[0];
            for f in &base.e.comps {
                let path = dir.join(format!("{}.png", f.name));
                save_component_slice(f, &base.geom, &path, time)?;
            }
        }

        info!("wrote snapshot {}", dir.display());
        Ok(())
    }
}
