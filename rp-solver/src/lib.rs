//! Sparse linear algebra for quadratic placement: a CSR matrix built from
//! triplets, a Jacobi-preconditioned conjugate-gradient solver with warm
//! start, and the four net models that linearize HPWL into matrix entries.

mod cg;
mod matrix;
mod model;

pub use cg::*;
pub use matrix::*;
pub use model::*;

mod prelude {
    pub use rp_types::*;
    pub use rustc_hash::FxHashMap as HashMap;
    pub use std::cmp::{max, min};
}
