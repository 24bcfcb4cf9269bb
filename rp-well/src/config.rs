use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::partition::StripeMode;
use crate::prelude::*;

/// Well-aware legalization arguments.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[clap(next_help_heading = "Well legalization")]
#[serde(deny_unknown_fields, default)]
pub struct WellConfig {
    /// Greedy packing retries, alternating upward and downward.
    #[clap(long, default_value_t = 10)]
    pub max_iter: usize,

    /// What the rightmost stripe does with leftover width.
    #[clap(long = "wlgmode", default_value_t, value_enum)]
    pub stripe_mode: StripeMode,

    /// Target stripe width in multiples of the max plug distance.
    #[clap(long, hide_short_help = true, default_value_t = 2.0)]
    pub stripe_width_factor: f64,

    /// Stripe width cap in microns.
    #[clap(long)]
    pub max_row_width: Option<f64>,

    /// Skip well-tap insertion.
    #[clap(long)]
    pub no_well_tap: bool,

    /// Halve the per-row tap frequency and stagger odd rows.
    #[clap(long)]
    pub checker_board: bool,

    /// Well-tap interval in microns; defaults to twice the max plug
    /// distance.
    #[clap(long)]
    pub tap_interval: Option<f64>,

    /// Insert pre-/post-end-cap cells at row extremes.
    #[clap(long)]
    pub end_caps: bool,

    /// Consensus iteration cap for multi-region sub-location averaging.
    #[clap(long, hide_short_help = true, default_value_t = 10)]
    pub max_cons_iter: usize,

    /// Largest acceptable per-cell sub-location discrepancy.
    #[clap(long, hide_short_help = true, default_value_t = 0.5)]
    pub cons_tolerance: f64,

    /// Anchor weight pulling a cell's sub-locations together.
    #[clap(long, hide_short_help = true, default_value_t = 1.0)]
    pub cons_lambda: f64,

    /// Wirelength-driven local reordering after the greedy pass.
    #[clap(long)]
    pub local_reorder: bool,

    /// Worker threads for the legalization phase.
    #[clap(long, default_value_t = 1)]
    pub lg_threads: usize,

    /// Clearance between a well tap and its neighbors, grid units.
    #[clap(long, hide_short_help = true, default_value_t = 0)]
    pub space_to_well_tap: I,
}

impl Default for WellConfig {
    fn default() -> Self {
        WellConfig {
            max_iter: 10,
            stripe_mode: StripeMode::Strict,
            stripe_width_factor: 2.0,
            max_row_width: None,
            no_well_tap: false,
            checker_board: false,
            tap_interval: None,
            end_caps: false,
            max_cons_iter: 10,
            cons_tolerance: 0.5,
            cons_lambda: 1.0,
            local_reorder: false,
            lg_threads: 1,
            space_to_well_tap: 0,
        }
    }
}

impl WellConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(PlaceError::config("greedy iteration cap must be positive"));
        }
        if self.stripe_width_factor <= 0.0 {
            return Err(PlaceError::config("stripe width factor must be positive"));
        }
        if let Some(w) = self.max_row_width {
            if w <= 0.0 {
                return Err(PlaceError::config("max row width must be positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        <WellConfig as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn default_is_valid() {
        assert!(WellConfig::default().validate().is_ok());
    }
}
