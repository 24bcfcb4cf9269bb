use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Tetris legalization arguments.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[clap(next_help_heading = "Legalization")]
#[serde(deny_unknown_fields, default)]
pub struct TetrisConfig {
    /// Row height in grid units; taken from the technology when absent.
    #[clap(long)]
    pub row_height: Option<I>,

    /// Cap on alternating-direction sweeps.
    #[clap(long, default_value_t = 10)]
    pub max_iter: usize,

    /// Width factor of the sweep sort key `llx - kw*w - kh*h`.
    #[clap(long, hide_short_help = true, default_value_t = 0.001)]
    pub k_width: f64,

    /// Height factor of the sweep sort key.
    #[clap(long, hide_short_help = true, default_value_t = 0.001)]
    pub k_height: f64,

    /// How far left of its current position a block may land, in widths.
    /// Grows by one each sweep.
    #[clap(long, hide_short_help = true, default_value_t = 1.0)]
    pub k_left: f64,

    /// On sweep failure, shift the unplaced tail after the failure point to
    /// keep the block order instead of leaving best-effort locations.
    #[clap(long, hide_short_help = true)]
    pub fast_shift: bool,
}

impl Default for TetrisConfig {
    fn default() -> Self {
        TetrisConfig {
            row_height: None,
            max_iter: 10,
            k_width: 0.001,
            k_height: 0.001,
            k_left: 1.0,
            fast_shift: false,
        }
    }
}

impl TetrisConfig {
    pub fn validate(&self, ckt: &Circuit) -> Result<()> {
        let row_height = self.row_height.unwrap_or(ckt.tech.row_height);
        if row_height <= 0 {
            return Err(PlaceError::config(format!(
                "row height {row_height} must be positive"
            )));
        }
        if ckt.region.height() % row_height != 0 {
            return Err(PlaceError::config(format!(
                "region height {} is not a multiple of row height {row_height}",
                ckt.region.height()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        <TetrisConfig as clap::CommandFactory>::command().debug_assert();
    }
}
