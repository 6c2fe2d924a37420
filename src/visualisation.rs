// src/visualisation.rs

use std::path::Path;

use plotters::prelude::*;

use crate::error::{PicError, Result};
use crate::grid::Geometry;
use crate::vector_field::MultiField;

/// Map a value to a blue–white–red colour using a *local* min/max,
/// so small variations are still visible.
fn value_to_color(v: f64, min_v: f64, max_v: f64) -> RGBColor {
    // Protect against min ≈ max (e.g. a uniform field)
    let mut lo = min_v;
    let mut hi = max_v;
    if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < 1e-300 {
        lo = -1.0;
        hi = 1.0;
    }

    let x = ((v - lo) / (hi - lo)).clamp(0.0, 1.0);

    // x=0 -> blue, x=0.5 -> white, x=1 -> red
    let r = (255.0 * x) as u8;
    let b = (255.0 * (1.0 - x)) as u8;
    let g = (255.0 * (1.0 - (2.0 * (x - 0.5).abs()))).clamp(0.0, 255.0) as u8;

    RGBColor(r, g, b)
}

fn plot_err<E: std::fmt::Display>(e: E) -> PicError {
    PicError::Plot(e.to_string())
}

/// Save the x–z mid-plane (middle y index) of one component as a PNG heat map.
///
/// Axes are cell indices; colour spans the slice's own min/max.
pub fn save_component_slice(field: &MultiField, geom: &Geometry, path: &Path, time: f64) -> Result<()> {
    let d = geom.domain;
    let (i0, k0) = (d.lo[0] as i32, d.lo[2] as i32);
    let (i1, k1) = (i0 + d.n[0] as i32, k0 + d.n[2] as i32);
    let j = d.lo[1] + (d.n[1] / 2) as isize;

    let mut cells = Vec::with_capacity(d.n[0] * d.n[2]);
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for k in k0..k1 {
        for i in i0..i1 {
            let v = field
                .value_at(geom, [i as isize, j, k as isize])
                .unwrap_or(0.0);
            if v.is_finite() {
                min_v = min_v.min(v);
                max_v = max_v.max(v);
            }
            cells.push((i, k, v));
        }
    }

    let root = BitMapBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let caption = format!("{} at t = {:.4e} (y index {})", field.name, time, j);
    let mut chart = ChartBuilder::on(&root)
        .margin(40)
        .caption(caption, ("sans-serif", 20))
        .x_label_area_size(40)
        .y_label_area_size(40)
        .build_cartesian_2d(i0..i1, k0..k1)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("x (cell index)")
        .y_desc("z (cell index)")
        .axis_desc_style(("sans-serif", 15))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(cells.into_iter().map(|(i, k, v)| {
            let color = value_to_color(v, min_v, max_v);
            Rectangle::new([(i, k), (i + 1, k + 1)], color.filled())
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colour_map_ends() {
        assert_eq!(value_to_color(-2.0, -2.0, 2.0), RGBColor(0, 0, 255));
        assert_eq!(value_to_color(2.0, -2.0, 2.0), RGBColor(255, 0, 0));
        // Degenerate range falls back to [-1, 1].
        assert_eq!(value_to_color(1.0, 0.3, 0.3), RGBColor(255, 0, 0));
    }
}
