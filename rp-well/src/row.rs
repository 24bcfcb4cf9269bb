use crate::prelude::*;
use crate::segment::RowSegment;

/// A `(block, region)` pair owned by a gridded row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRegion {
    pub blk: usize,
    pub region_id: usize,
}

/// A variable-height row inside a stripe. Its height is the sum of the
/// maximum P-well and N-well heights of the regions it contains, and its
/// orientation decides which well sits at the bottom.
#[derive(Clone, Debug, Default)]
pub struct GriddedRow {
    pub lx: I,
    pub ly: I,
    pub width: I,
    pub is_orient_n: bool,
    pub p_well_height: I,
    pub n_well_height: I,
    pub used_size: I,
    pub blk_regions: Vec<BlockRegion>,
    pub segments: Vec<RowSegment>,
}

impl GriddedRow {
    pub fn new(lx: I, ly: I, width: I) -> Self {
        GriddedRow {
            lx,
            ly,
            width,
            is_orient_n: true,
            ..Default::default()
        }
    }

    #[inline]
    pub fn height(&self) -> I {
        self.p_well_height + self.n_well_height
    }

    #[inline]
    pub fn urx(&self) -> I {
        self.lx + self.width
    }

    #[inline]
    pub fn ury(&self) -> I {
        self.ly + self.height()
    }

    pub fn update_well_height(&mut self, p_height: I, n_height: I) {
        self.p_well_height = max(self.p_well_height, p_height);
        self.n_well_height = max(self.n_well_height, n_height);
    }

    /// Whether a cell's region may live here without flipping mismatch.
    /// Odd-region cells fit any row; even-region cells need the row's well
    /// order.
    pub fn is_orient_matching(&self, ty: &BlockType, region_id: usize) -> bool {
        if ty.has_odd_regions() {
            return true;
        }
        let well = ty.well.as_ref().expect("multi-region cell without wells");
        if self.is_orient_n {
            well.is_n_above_p(region_id)
        } else {
            !well.is_n_above_p(region_id)
        }
    }

    /// The orientation a cell must take to match this row.
    pub fn compute_block_orient(&self, ty: &BlockType, is_upward: bool) -> Orient {
        let region_count = ty.region_count();
        let region_id = if is_upward { 0 } else { region_count - 1 };
        let n_above_p = ty
            .well
            .as_ref()
            .map_or(true, |w| w.is_n_above_p(region_id));
        let matching = self.is_orient_n == n_above_p;
        if matching {
            Orient::N
        } else {
            Orient::FS
        }
    }

    /// Record a region and grow the wells to hold it.
    pub fn add_block_region(&mut self, blocks: &[Block], types: &[BlockType], blk: usize, region_id: usize) {
        self.blk_regions.push(BlockRegion { blk, region_id });
        let b = &blocks[blk];
        let (p, n) = region_heights(types, b, region_id);
        self.update_well_height(p, n);
        self.used_size += b.width;
    }

    /// Recompute well heights from scratch, seeded by the well-tap heights.
    pub fn recompute_height(&mut self, blocks: &[Block], types: &[BlockType], seed_p: I, seed_n: I) {
        self.p_well_height = seed_p;
        self.n_well_height = seed_n;
        for br in &self.blk_regions {
            let (p, n) = region_heights(types, &blocks[br.blk], br.region_id);
            self.p_well_height = max(self.p_well_height, p);
            self.n_well_height = max(self.n_well_height, n);
        }
    }

    /// Set every region-0 block's LLY so its P-well edge meets the row's
    /// P/N boundary (N-well edge for flipped rows).
    pub fn legalize_y(&self, blocks: &mut [Block], types: &[BlockType]) {
        for br in &self.blk_regions {
            if br.region_id != 0 {
                continue;
            }
            let blk = &blocks[br.blk];
            let ty = &types[blk.type_id];
            let y = if let Some(well) = &ty.well {
                if self.is_orient_n {
                    self.ly + self.p_well_height - well.p_height(0, blk.is_flipped())
                } else {
                    self.ly + self.n_well_height - well.n_height(0, blk.is_flipped())
                }
            } else {
                self.ly
            };
            blocks[br.blk].lly = y as f64;
        }
    }

    /// One full-width segment; called once the row's extent is final.
    pub fn init_segments(&mut self, blocks: &[Block]) {
        let mut seg = RowSegment::new(self.lx, self.width);
        self.sort_block_regions(blocks);
        for br in &self.blk_regions {
            seg.add_region(br.blk, br.region_id, blocks[br.blk].width, 1.0);
        }
        self.segments = vec![seg];
    }

    /// Carve the segments around blockage intervals (tap cells), keeping the
    /// assigned regions with the segment that contains them.
    pub fn update_segments(&mut self, blocks: &[Block], blockage: &[SegI]) {
        let mut occupied = blockage.to_vec();
        merge_intervals(&mut occupied);
        let gaps = complement(&occupied, self.lx, self.urx(), 1);
        let mut segments: Vec<RowSegment> = gaps
            .iter()
            .map(|g| RowSegment::new(g.lo, g.span()))
            .collect();
        for br in &self.blk_regions {
            let x = blocks[br.blk].llx;
            let w = blocks[br.blk].width;
            // closest segment that can still take the block
            let mut best: Option<(usize, f64)> = None;
            for (i, seg) in segments.iter().enumerate() {
                if seg.used_size + w > seg.width {
                    continue;
                }
                let d = if x >= seg.lx as f64 && x + w as f64 <= seg.urx() as f64 {
                    0.0
                } else {
                    (x - seg.lx as f64).abs().min((x + w as f64 - seg.urx() as f64).abs())
                };
                if best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((i, d));
                }
            }
            if let Some((i, _)) = best {
                segments[i].add_region(br.blk, br.region_id, w, 1.0);
            } else if let Some(seg) = segments.first_mut() {
                seg.add_region(br.blk, br.region_id, w, 1.0);
            }
        }
        self.segments = segments;
    }

    /// Sort the row's regions by x with id tie-breaks.
    pub fn sort_block_regions(&mut self, blocks: &[Block]) {
        self.blk_regions.sort_by(|a, b| {
            blocks[a.blk]
                .llx
                .partial_cmp(&blocks[b.blk].llx)
                .unwrap()
                .then(a.blk.cmp(&b.blk))
        });
    }

    /// Non-overlap and containment of the row's blocks, in x order.
    pub fn is_row_legal(&self, blocks: &[Block]) -> bool {
        let mut regions = self.blk_regions.clone();
        regions.sort_by(|a, b| {
            blocks[a.blk]
                .llx
                .partial_cmp(&blocks[b.blk].llx)
                .unwrap()
                .then(a.blk.cmp(&b.blk))
        });
        let mut front = self.lx;
        for br in &regions {
            let lx = blocks[br.blk].llx.round() as I;
            if lx < front {
                return false;
            }
            front = lx + blocks[br.blk].width;
        }
        front <= self.urx()
    }
}

pub(crate) fn region_heights(types: &[BlockType], blk: &Block, region_id: usize) -> (I, I) {
    let ty = &types[blk.type_id];
    match &ty.well {
        Some(well) => (
            well.p_height(region_id, blk.is_flipped()),
            well.n_height(region_id, blk.is_flipped()),
        ),
        // treat a well-less cell as an even P/N split
        None => (ty.height / 2, ty.height - ty.height / 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::SmallVec;

    fn single_well_type(p: I, n: I) -> BlockType {
        let mut ty = BlockType::new("c", 4, p + n);
        ty.well = Some(MultiWell {
            p_rects: vec![RectI::new(0, 0, 4, p)],
            n_rects: vec![RectI::new(0, p, 4, p + n)],
        });
        ty
    }

    fn blk(type_id: usize, ty: &BlockType) -> Block {
        Block {
            name: String::new(),
            type_id,
            llx: 0.0,
            lly: 0.0,
            width: ty.width,
            height: ty.height,
            orient: Orient::N,
            status: PlaceStatus::Unplaced,
            stretch: SmallVec::new(),
        }
    }

    #[test]
    fn well_heights_track_members() {
        let types = vec![single_well_type(4, 5), single_well_type(6, 3)];
        let blocks = vec![blk(0, &types[0]), blk(1, &types[1])];
        let mut row = GriddedRow::new(0, 0, 100);
        row.add_block_region(&blocks, &types, 0, 0);
        assert_eq!((row.p_well_height, row.n_well_height), (4, 5));
        row.add_block_region(&blocks, &types, 1, 0);
        assert_eq!((row.p_well_height, row.n_well_height), (6, 5));
        assert_eq!(row.height(), 11);
        assert_eq!(row.used_size, 8);
    }

    #[test]
    fn y_alignment_meets_pn_boundary() {
        let types = vec![single_well_type(4, 5)];
        let mut blocks = vec![blk(0, &types[0])];
        let mut row = GriddedRow::new(0, 10, 100);
        row.add_block_region(&blocks, &types, 0, 0);
        row.p_well_height = 6; // taller neighbor pushed the boundary up
        row.legalize_y(&mut blocks, &types);
        // P-well top edge must sit at ly + p_well_height
        assert_eq!(blocks[0].lly, (10 + 6 - 4) as f64);
    }

    #[test]
    fn flipped_row_requires_fs() {
        let types = vec![single_well_type(4, 5)];
        let mut row = GriddedRow::new(0, 0, 100);
        row.is_orient_n = false;
        assert_eq!(row.compute_block_orient(&types[0], true), Orient::FS);
        row.is_orient_n = true;
        assert_eq!(row.compute_block_orient(&types[0], true), Orient::N);
    }

    #[test]
    fn segment_carving_around_blockage() {
        let types = vec![single_well_type(4, 5)];
        let mut blocks = vec![blk(0, &types[0])];
        blocks[0].llx = 30.0;
        let mut row = GriddedRow::new(0, 0, 100);
        row.add_block_region(&blocks, &types, 0, 0);
        row.update_segments(&blocks, &[SegI::new(45, 55)]);
        assert_eq!(row.segments.len(), 2);
        assert_eq!(row.segments[0].lx, 0);
        assert_eq!(row.segments[0].width, 45);
        assert_eq!(row.segments[0].regions.len(), 1);
        assert_eq!(row.segments[1].lx, 55);
    }
}
