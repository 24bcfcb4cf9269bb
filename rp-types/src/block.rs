use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geometry::I;

/// Instance orientation, LEF/DEF naming. Standard-cell rows only ever use `N`
/// and `FS`; the rest exist for completeness of the data model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orient {
    #[default]
    N,
    FN,
    FS,
    S,
    E,
    W,
    FE,
    FW,
}

impl Orient {
    /// Whether the orientation mirrors the cell, so that well regions are
    /// indexed from the top instead of the bottom.
    #[inline]
    pub fn is_flipped(self) -> bool {
        matches!(self, Orient::FN | Orient::FS | Orient::FE | Orient::FW)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaceStatus {
    #[default]
    Unplaced,
    Placed,
    Fixed,
    Cover,
}

/// A cell instance. Location is real-valued during global placement and
/// snapped to the integer grid by legalization.
#[derive(Clone, Debug)]
pub struct Block {
    pub name: String,
    pub type_id: usize,
    pub llx: f64,
    pub lly: f64,
    /// Cached from the type at creation; types are immutable after load.
    pub width: I,
    pub height: I,
    pub orient: Orient,
    pub status: PlaceStatus,
    /// Per-region stretch lengths for multi-region cells,
    /// length `region_count - 1`. Empty for single-region cells.
    pub stretch: SmallVec<[I; 2]>,
}

impl Block {
    #[inline]
    pub fn urx(&self) -> f64 {
        self.llx + self.width as f64
    }

    #[inline]
    pub fn ury(&self) -> f64 {
        self.lly + self.height as f64 + self.stretch.iter().sum::<I>() as f64
    }

    /// Cell height including any stretch inserted between well regions.
    #[inline]
    pub fn eff_height(&self) -> I {
        self.height + self.stretch.iter().sum::<I>()
    }

    #[inline]
    pub fn center_x(&self) -> f64 {
        self.llx + self.width as f64 / 2.0
    }

    #[inline]
    pub fn center_y(&self) -> f64 {
        self.lly + self.eff_height() as f64 / 2.0
    }

    pub fn set_center_x(&mut self, x: f64) {
        self.llx = x - self.width as f64 / 2.0;
    }

    pub fn set_center_y(&mut self, y: f64) {
        self.lly = y - self.eff_height() as f64 / 2.0;
    }

    #[inline]
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    #[inline]
    pub fn is_movable(&self) -> bool {
        matches!(self.status, PlaceStatus::Unplaced | PlaceStatus::Placed)
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self.status, PlaceStatus::Fixed | PlaceStatus::Cover)
    }

    #[inline]
    pub fn is_flipped(&self) -> bool {
        self.orient.is_flipped()
    }

    /// Whether two blocks overlap with positive area.
    pub fn overlaps(&self, other: &Block) -> bool {
        self.llx < other.urx()
            && other.llx < self.urx()
            && self.lly < other.ury()
            && other.lly < self.ury()
    }
}
