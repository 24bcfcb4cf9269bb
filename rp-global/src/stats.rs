use std::fmt::Display;

use derive_more::AddAssign;
use log::info;

/// Wall-clock seconds spent per phase of the loop, accumulated across
/// iterations.
#[derive(Clone, Copy, Debug, Default, AddAssign)]
pub struct GlobalTiming {
    /// grid-bin construction
    pub init: f32,
    /// quadratic solves, both axes
    pub solve: f32,
    /// look-ahead legalization
    pub spread: f32,
}

/// Outcome of one global placement run.
#[derive(Clone, Debug, Default)]
pub struct GlobalStats {
    pub init_hpwl: f64,
    /// Weighted HPWL after each anchored quadratic solve.
    pub lower_bound: Vec<f64>,
    /// Weighted HPWL after each look-ahead legalization.
    pub upper_bound: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    pub timing: GlobalTiming,
}

fn format_col<T: Display + num_traits::AsPrimitive<f64>>(
    width: usize,
    title: &str,
    val: T,
) -> (String, String) {
    (
        format!("{title:>width$}"),
        format!("{:>width$.3e}", val.as_()),
    )
}

fn format_raw<T: Display>(width: usize, title: &str, val: T) -> (String, String) {
    (format!("{title:>width$}"), format!("{val:>width$}"))
}

impl GlobalStats {
    /// Header and value rows for a compact aligned summary table.
    pub fn values(&self) -> (Vec<String>, Vec<String>) {
        [
            format_col(10, "init", self.init_hpwl),
            format_col(
                10,
                "lower",
                self.lower_bound.last().copied().unwrap_or(0.0),
            ),
            format_col(
                10,
                "upper",
                self.upper_bound.last().copied().unwrap_or(0.0),
            ),
            format_raw(4, "its", self.iterations),
            format_col(10, "cg[s]", self.timing.solve),
            format_col(10, "lal[s]", self.timing.spread),
        ]
        .into_iter()
        .unzip()
    }

    pub fn report(&self) {
        let (header, vals) = self.values();
        info!("{}", header.join(" "));
        info!("{}", vals.join(" "));
        info!(
            "iterations: {}, converged: {}",
            self.iterations, self.converged
        );
    }
}
