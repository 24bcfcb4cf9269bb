//! Analytical global placement: the SimPL-style loop alternating anchored
//! quadratic solves (lower bound) with look-ahead legalization by recursive
//! bisection spreading (upper bound).

mod box_bin;
mod config;
mod grid_bin;
mod placer;
mod stats;

pub use box_bin::*;
pub use config::*;
pub use grid_bin::*;
pub use placer::*;
pub use stats::*;

mod prelude {
    pub use rp_types::*;
    pub use std::cmp::{max, min};
}
