//! Tetris-style detailed legalization: snap every movable block onto a row
//! inside the white space left by fixed macros, sweeping alternately from the
//! left and from the right with an expanding search window.

mod config;
mod legalizer;

pub use config::*;
pub use legalizer::*;

mod prelude {
    pub use rp_types::*;
    pub use std::cmp::{max, min};
}
