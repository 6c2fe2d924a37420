// src/main.rs
//
// Command-line driver.
//
//   pic-sim <config.toml> [max_step=N] [stop_time=T] [plot_interval=N]
//           [cfl=C] [png=on|off] [out=DIR] [run=RUN_ID]
//
// Each run writes into its own directory:
//   <out>/<run_id>/
//     ├── config.json        (the configuration actually used)
//     └── plt00010/ ...      (one directory per snapshot)
//
// Log verbosity follows RUST_LOG (default: info).

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{error, info};

use pic_sim::config::RunConfig;
use pic_sim::error::Result;

fn print_usage() {
    eprintln!(
        r#"Usage:
  pic-sim <config.toml> [max_step=N] [stop_time=T] [plot_interval=N]
          [cfl=C] [png=on|off] [out=DIR] [run=RUN_ID]

Notes:
  - Overrides are applied on top of the TOML file and validated again.
  - Snapshots go to <out>/<run_id>/pltNNNNN; `out` defaults to [run].output_dir.
"#
    );
}

fn sanitize_run_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn default_run_id(config_path: &Path) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    let stem = config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "run".to_string());
    format!("{}{:03}_{}", now.as_secs(), now.subsec_millis(), stem)
}

fn unique_run_dir(out_root: &Path, run_id: &str) -> PathBuf {
    let mut dir = out_root.join(run_id);
    if !dir.exists() {
        return dir;
    }
    for k in 1..1000 {
        let cand = out_root.join(format!("{}_{}", run_id, k));
        if !cand.exists() {
            dir = cand;
            break;
        }
    }
    dir
}

fn run(args: &[String]) -> Result<()> {
    let config_path = PathBuf::from(&args[0]);
    let mut cfg = RunConfig::load(&config_path)?;

    let mut run_id: Option<String> = None;
    for arg in &args[1..] {
        match arg.split_once('=') {
            Some(("run", v)) => run_id = Some(sanitize_run_id(v)),
            Some((k, v)) => cfg.apply_override(k, v)?,
            None => log::warn!("ignoring unknown argument '{}'", arg),
        }
    }

    let run_id = run_id.unwrap_or_else(|| sanitize_run_id(&default_run_id(&config_path)));
    let run_dir = unique_run_dir(&cfg.run.output_dir, &run_id);
    cfg.run.output_dir = run_dir.clone();
    cfg.write_to_dir(&run_dir)?;
    info!("run directory: {}", run_dir.display());

    let mut sim = cfg.build_simulation()?;
    let h = &sim.hierarchy;
    info!(
        "{} level(s), {} patches on level 0, ghost width {}",
        h.finest_level() + 1,
        h.levels[0].num_patches(),
        h.n_ghost
    );

    let report = sim.evolve(None)?;
    info!(
        "done: {} steps, final step {}, time {:.6e}, {} snapshot(s)",
        report.steps_taken,
        report.final_step,
        report.final_time,
        report.snapshots.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help" || a == "help") {
        print_usage();
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
