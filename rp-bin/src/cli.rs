use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use rp_global::GlobalConfig;
use rp_tetris::TetrisConfig;
use rp_well::{StripeMode, WellConfig};

/// Gridded-cell analytical placer with N/P-well continuity legalization.
#[derive(Parser, Debug)]
#[clap(name = "rowplace", version, about)]
pub struct Cli {
    /// Input technology file (JSON materialization of the LEF data).
    #[clap(long, value_name = "path")]
    pub lef: Option<PathBuf>,

    /// Input design file (JSON materialization of the DEF data).
    #[clap(long, value_name = "path")]
    pub def: PathBuf,

    /// Single-well per-type cell spec.
    #[clap(long, value_name = "path")]
    pub cell: Option<PathBuf>,

    /// Multi-well per-type cell spec.
    #[clap(long, value_name = "path")]
    pub mcell: Option<PathBuf>,

    /// Output base name.
    #[clap(short, long, value_name = "base", default_value = "rowplace_out")]
    pub output: String,

    /// Placement grid in microns, X then Y.
    #[clap(short, long, num_args = 2, value_names = ["X", "Y"])]
    pub grid: Option<Vec<f64>>,

    /// Target placement density in (0, 1].
    #[clap(short = 'd', long)]
    pub density: Option<f64>,

    /// Skip global placement.
    #[clap(long)]
    pub noglobal: bool,

    /// Skip legalization.
    #[clap(long)]
    pub nolegal: bool,

    /// Accepted for flow compatibility; I/O-pin placement is an external
    /// collaborator.
    #[clap(long)]
    pub noioplace: bool,

    /// Rightmost stripe policy.
    #[clap(long, value_enum)]
    pub wlgmode: Option<StripeMode>,

    /// Stripe width cap in microns.
    #[clap(long, value_name = "w")]
    pub maxrowwidth: Option<f64>,

    /// Outer-iteration cap of global placement.
    #[clap(long, value_name = "n")]
    pub gbmaxit: Option<usize>,

    /// Worker threads in the global phase.
    #[clap(long, value_name = "n")]
    pub nthreads: Option<usize>,

    /// Worker threads in the legalization phase.
    #[clap(long, value_name = "n")]
    pub lgthreads: Option<usize>,

    /// Skip well-tap insertion.
    #[clap(long)]
    pub nowelltap: bool,

    /// JSON file with the detailed tuning knobs.
    #[clap(long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Write MATLAB patch tables and a displacement quiver after each phase.
    #[clap(long)]
    pub dump: bool,
}

/// Detailed tuning knobs, loadable from a JSON file next to the CLI flags.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub global: GlobalConfig,
    pub tetris: TetrisConfig,
    pub well: WellConfig,
}

impl Cli {
    /// Fold the CLI surface into the config structs.
    pub fn apply_overrides(&self, cfg: &mut ConfigFile) {
        if let Some(d) = self.density {
            cfg.global.target_density = d;
        }
        if let Some(n) = self.gbmaxit {
            cfg.global.max_iter = n;
        }
        if let Some(mode) = self.wlgmode {
            cfg.well.stripe_mode = mode;
        }
        if let Some(w) = self.maxrowwidth {
            cfg.well.max_row_width = Some(w);
        }
        if let Some(n) = self.lgthreads {
            cfg.well.lg_threads = n;
        }
        if self.nowelltap {
            cfg.well.no_well_tap = true;
        }
    }
}
