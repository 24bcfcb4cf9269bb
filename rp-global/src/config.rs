use clap::{Parser, ValueEnum};
use rp_solver::NetModel;
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Which stopping rule ends the outer lower-bound/upper-bound loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ConvergenceCriterion {
    /// Gap shrinks to 10% of the tenth-iteration gap, or to 25% with a flat
    /// upper-bound tail.
    #[default]
    Simpl,
    /// `upper / lower - 1` below a threshold.
    Polar,
}

/// Global placement arguments.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[clap(next_help_heading = "Global placement")]
#[serde(deny_unknown_fields, default)]
pub struct GlobalConfig {
    /// Net model for the quadratic surrogate.
    #[clap(long, default_value_t, value_enum)]
    pub net_model: NetModel,

    /// Target placement density in (0, 1].
    #[clap(short = 'd', long, default_value_t = 0.7)]
    pub target_density: f64,

    /// Outer-iteration cap.
    #[clap(long, default_value_t = 100)]
    pub max_iter: usize,

    /// CG steps per evaluation round.
    #[clap(long, hide_short_help = true, default_value_t = 10)]
    pub cg_iteration: usize,

    /// Total CG step cap per solve.
    #[clap(long, hide_short_help = true, default_value_t = 1000)]
    pub cg_iteration_max_num: usize,

    #[clap(long, hide_short_help = true, default_value_t = 1e-7)]
    pub cg_tolerance: f64,

    /// Relative HPWL spread below which a CG round series has converged.
    #[clap(long, hide_short_help = true, default_value_t = 2e-3)]
    pub cg_stop_criterion: f64,

    /// Cap on net-model rebuild iterations per solve.
    #[clap(long, hide_short_help = true, default_value_t = 50)]
    pub b2b_update_max_iter: usize,

    #[clap(long, hide_short_help = true, default_value_t = 1e-2)]
    pub net_model_update_stop_criterion: f64,

    #[clap(long, default_value_t, value_enum)]
    pub convergence: ConvergenceCriterion,

    #[clap(long, hide_short_help = true, default_value_t = 5e-3)]
    pub simpl_lal_converge_criterion: f64,

    #[clap(long, hide_short_help = true, default_value_t = 0.08)]
    pub polar_converge_criterion: f64,

    /// Target number of cells per grid bin.
    #[clap(long, hide_short_help = true, default_value_t = 30)]
    pub cells_per_bin: usize,

    /// Cap on the size of an overfilled-bin cluster.
    #[clap(long, hide_short_help = true, default_value_t = 1000)]
    pub cluster_upper_size: usize,

    /// Initial anchor weight and its per-iteration growth factor.
    #[clap(long, hide_short_help = true, default_value_t = 0.005)]
    pub anchor_alpha: f64,

    #[clap(long, hide_short_help = true, default_value_t = 1.5)]
    pub anchor_growth: f64,

    /// Weight of the soft spring pulling out-of-region blocks to the region
    /// center, before the `1/sqrt(N)` normalization.
    #[clap(long, hide_short_help = true, default_value_t = 0.03)]
    pub center_weight: f64,

    /// Nets with at least this many pins are ignored.
    #[clap(long, default_value_t = 100)]
    pub ignore_net_threshold: usize,

    /// Spring dividend guard as a fraction of the average block dimension.
    #[clap(long, hide_short_help = true, default_value_t = 0.01)]
    pub epsilon_factor: f64,

    /// Distance-decay weight adjustment of the star models.
    #[clap(long, hide_short_help = true, default_value_t = 1.0)]
    pub base_weight_factor: f64,

    #[clap(long, hide_short_help = true, default_value_t = 0.0)]
    pub adjust_weight_factor: f64,

    /// Decay length in units of the average block height.
    #[clap(long, hide_short_help = true, default_value_t = 5.0)]
    pub decay_factor: f64,

    /// Seed for the initial uniform spread.
    #[clap(long, default_value_t = 1)]
    pub seed: u64,

    /// Initialize blocks at the region center instead of uniformly at random.
    #[clap(long)]
    pub center_init: bool,

    /// Keep the loaded block locations instead of the seeded initial spread.
    #[clap(long)]
    pub keep_init: bool,

    /// Recenter the whole placement after the loop when the design has no
    /// fixed blocks.
    #[clap(long)]
    pub recenter: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfig {
            net_model: NetModel::B2b,
            target_density: 0.7,
            max_iter: 100,
            cg_iteration: 10,
            cg_iteration_max_num: 1000,
            cg_tolerance: 1e-7,
            cg_stop_criterion: 2e-3,
            b2b_update_max_iter: 50,
            net_model_update_stop_criterion: 1e-2,
            convergence: ConvergenceCriterion::Simpl,
            simpl_lal_converge_criterion: 5e-3,
            polar_converge_criterion: 0.08,
            cells_per_bin: 30,
            cluster_upper_size: 1000,
            anchor_alpha: 0.005,
            anchor_growth: 1.5,
            center_weight: 0.03,
            ignore_net_threshold: 100,
            epsilon_factor: 0.01,
            base_weight_factor: 1.0,
            adjust_weight_factor: 0.0,
            decay_factor: 5.0,
            seed: 1,
            center_init: false,
            keep_init: false,
            recenter: false,
        }
    }
}

impl GlobalConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.target_density > 0.0 && self.target_density <= 1.0) {
            return Err(PlaceError::config(format!(
                "target density {} not in (0, 1]",
                self.target_density
            )));
        }
        if self.cg_iteration == 0 || self.cg_iteration_max_num == 0 {
            return Err(PlaceError::config("CG iteration counts must be positive"));
        }
        if self.max_iter == 0 {
            return Err(PlaceError::config("outer iteration cap must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(GlobalConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_density_rejected() {
        let cfg = GlobalConfig {
            target_density: 1.5,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cli_parses() {
        <GlobalConfig as clap::CommandFactory>::command().debug_assert();
    }
}
