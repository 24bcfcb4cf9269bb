//! Well-aware gridded-row legalization: vertical stripes enforcing N/P-well
//! continuity, variable-height row packing with orientation alternation,
//! per-segment minimum-displacement legalization, a consensus post-pass for
//! multi-region cells, and well-tap / end-cap insertion.

mod config;
mod legalizer;
mod partition;
mod reorder;
mod row;
mod segment;
mod stripe;
mod taps;

pub use config::*;
pub use legalizer::*;
pub use partition::*;
pub use reorder::*;
pub use row::*;
pub use segment::*;
pub use stripe::*;
pub use taps::*;

mod prelude {
    pub use rp_types::*;
    pub use rustc_hash::FxHashMap as HashMap;
    pub use std::cmp::{max, min};
}
