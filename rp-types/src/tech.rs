use serde::{Deserialize, Serialize};

use crate::geometry::I;

/// Design rules of one well layer, in microns. Converted to grid units by the
/// consumers via the circuit's grid values.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WellLayer {
    pub max_plug_dist: f64,
    pub spacing: f64,
    pub opposite_spacing: f64,
    pub min_width: f64,
    pub overhang: f64,
}

impl Default for WellLayer {
    fn default() -> Self {
        WellLayer {
            max_plug_dist: 0.0,
            spacing: 0.0,
            opposite_spacing: 0.0,
            min_width: 0.0,
            overhang: 0.0,
        }
    }
}

/// Read-only technology description consumed by the legalizers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tech {
    pub row_height: I,
    #[serde(default)]
    pub n_well: WellLayer,
    #[serde(default)]
    pub p_well: WellLayer,
    /// Type id of the well-tap cell, when the library defines one.
    #[serde(default)]
    pub well_tap_type: Option<usize>,
    /// Minimum widths for generated end-cap cell types, grid units.
    #[serde(default)]
    pub pre_end_cap_min_width: I,
    #[serde(default)]
    pub post_end_cap_min_width: I,
    /// Whether the bottom row of the region is N-oriented. Depends on the
    /// library's dummy-well convention, so it is a technology parameter.
    #[serde(default = "default_true")]
    pub is_first_row_orient_n: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Tech {
    fn default() -> Self {
        Tech {
            row_height: 1,
            n_well: WellLayer::default(),
            p_well: WellLayer::default(),
            well_tap_type: None,
            pre_end_cap_min_width: 0,
            post_end_cap_min_width: 0,
            is_first_row_orient_n: true,
        }
    }
}
