use serde::{Deserialize, Serialize};

use crate::error::{PlaceError, Result};
use crate::geometry::{RectI, V2, I};

/// A pin of a cell type: offset of its connection point relative to the cell
/// origin, plus the access rectangles drawn on the pin layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    pub offset: V2<f64>,
    #[serde(default)]
    pub rects: Vec<RectI>,
}

/// Ordered N-well and P-well rectangles of a cell type, bottom to top.
///
/// Region `i` is the i-th abutted (N, P) pair counted from the cell origin;
/// a flipped instance indexes regions from the top instead.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MultiWell {
    pub n_rects: Vec<RectI>,
    pub p_rects: Vec<RectI>,
}

impl MultiWell {
    #[inline]
    pub fn region_count(&self) -> usize {
        self.n_rects.len().max(self.p_rects.len())
    }

    #[inline]
    pub fn has_odd_regions(&self) -> bool {
        self.region_count() % 2 == 1
    }

    /// Whether the N-well of region `region_id` sits above its P-well.
    pub fn is_n_above_p(&self, region_id: usize) -> bool {
        self.n_rects[region_id].lly > self.p_rects[region_id].lly
    }

    fn flip_region(&self, region_id: usize, is_flipped: bool) -> usize {
        if is_flipped {
            self.region_count() - 1 - region_id
        } else {
            region_id
        }
    }

    pub fn n_height(&self, region_id: usize, is_flipped: bool) -> I {
        self.n_rects[self.flip_region(region_id, is_flipped)].height()
    }

    pub fn p_height(&self, region_id: usize, is_flipped: bool) -> I {
        self.p_rects[self.flip_region(region_id, is_flipped)].height()
    }

    pub fn region_height(&self, region_id: usize, is_flipped: bool) -> I {
        let id = self.flip_region(region_id, is_flipped);
        self.n_rects[id].height() + self.p_rects[id].height()
    }

    fn is_abutted(&self) -> bool {
        // Every rectangle's bottom must coincide with the top of the one
        // below it, across the interleaved N/P sequence.
        let mut edges: Vec<(I, I)> = self
            .n_rects
            .iter()
            .chain(self.p_rects.iter())
            .map(|r| (r.lly, r.ury))
            .collect();
        edges.sort_unstable();
        edges.windows(2).all(|w| w[0].1 == w[1].0)
    }
}

/// A cell type from the library.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockType {
    pub name: String,
    pub width: I,
    pub height: I,
    #[serde(default)]
    pub pins: Vec<Pin>,
    #[serde(default)]
    pub well: Option<MultiWell>,
}

impl BlockType {
    pub fn new(name: impl Into<String>, width: I, height: I) -> Self {
        BlockType {
            name: name.into(),
            width,
            height,
            pins: Vec::new(),
            well: None,
        }
    }

    #[inline]
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Number of well regions; 1 for a plain standard cell (including one
    /// with no well description at all).
    #[inline]
    pub fn region_count(&self) -> usize {
        self.well.as_ref().map_or(1, |w| w.region_count())
    }

    #[inline]
    pub fn has_odd_regions(&self) -> bool {
        self.region_count() % 2 == 1
    }

    /// Fail-fast checks on the well description; a violation indicates
    /// corrupt library input.
    pub fn check_legality(&self) -> Result<()> {
        let Some(well) = &self.well else {
            return Ok(());
        };
        if well.n_rects.len() != well.p_rects.len() {
            return Err(PlaceError::invariant(
                format!(
                    "N-well rect count {} differs from P-well rect count {} for cell {}",
                    well.n_rects.len(),
                    well.p_rects.len(),
                    self.name
                ),
                "BlockType::check_legality",
            ));
        }
        if !well.is_abutted() {
            return Err(PlaceError::invariant(
                format!("wells are not vertically abutted for cell {}", self.name),
                "BlockType::check_legality",
            ));
        }
        let top = well
            .n_rects
            .iter()
            .chain(well.p_rects.iter())
            .map(|r| r.ury)
            .max()
            .unwrap_or(0);
        if top != self.height {
            return Err(PlaceError::invariant(
                format!(
                    "cell height {} inconsistent with well top {} for cell {}",
                    self.height, top, self.name
                ),
                "BlockType::check_legality",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_well(width: I, p_h: I, n_h: I) -> BlockType {
        let mut ty = BlockType::new("inv", width, p_h + n_h);
        ty.well = Some(MultiWell {
            p_rects: vec![RectI::new(0, 0, width, p_h)],
            n_rects: vec![RectI::new(0, p_h, width, p_h + n_h)],
        });
        ty
    }

    #[test]
    fn legal_single_well() {
        let ty = single_well(6, 4, 5);
        assert!(ty.check_legality().is_ok());
        assert_eq!(ty.region_count(), 1);
        let well = ty.well.as_ref().unwrap();
        assert!(well.is_n_above_p(0));
        assert_eq!(well.p_height(0, false), 4);
        assert_eq!(well.n_height(0, false), 5);
    }

    #[test]
    fn mismatched_rect_counts_rejected() {
        let mut ty = single_well(6, 4, 5);
        ty.well.as_mut().unwrap().n_rects.clear();
        assert!(ty.check_legality().is_err());
    }

    #[test]
    fn non_abutted_wells_rejected() {
        let mut ty = single_well(6, 4, 5);
        // open a gap between P and N
        ty.well.as_mut().unwrap().n_rects[0].lly += 1;
        assert!(ty.check_legality().is_err());
    }

    #[test]
    fn height_mismatch_rejected() {
        let mut ty = single_well(6, 4, 5);
        ty.height = 100;
        assert!(ty.check_legality().is_err());
    }

    #[test]
    fn double_height_region_indexing() {
        // region 0: P below N; region 1 mirrored above it
        let mut ty = BlockType::new("dff2", 10, 18);
        ty.well = Some(MultiWell {
            p_rects: vec![RectI::new(0, 0, 10, 4), RectI::new(0, 13, 10, 18)],
            n_rects: vec![RectI::new(0, 4, 10, 9), RectI::new(0, 9, 10, 13)],
        });
        assert!(ty.check_legality().is_ok());
        assert_eq!(ty.region_count(), 2);
        let well = ty.well.as_ref().unwrap();
        assert!(well.is_n_above_p(0));
        assert!(!well.is_n_above_p(1));
        // flipped indexing mirrors the region order
        assert_eq!(well.p_height(0, true), well.p_height(1, false));
    }
}
