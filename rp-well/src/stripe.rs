use log::trace;

use crate::prelude::*;
use crate::row::GriddedRow;

/// A vertical band of uniform white space inside a column. Rows are packed
/// into it bottom-up or top-down; well continuity holds within the stripe.
#[derive(Clone, Debug, Default)]
pub struct Stripe {
    pub lx: I,
    pub ly: I,
    pub width: I,
    pub height: I,
    pub max_blk_capacity_per_row: I,
    /// Movable blocks assigned to this stripe.
    pub blocks: Vec<usize>,
    pub rows: Vec<GriddedRow>,
    pub is_bottom_up: bool,
    pub is_first_row_orient_n: bool,
    /// Precomputed well-tap footprints for even and odd rows.
    pub tap_locs_even: Vec<SegI>,
    pub tap_locs_odd: Vec<SegI>,
}

impl Stripe {
    #[inline]
    pub fn urx(&self) -> I {
        self.lx + self.width
    }

    #[inline]
    pub fn ury(&self) -> I {
        self.ly + self.height
    }

    /// Manhattan distance from a point to this stripe, zero inside.
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let dx = if x >= self.lx as f64 && x < self.urx() as f64 {
            0.0
        } else {
            (x - self.lx as f64).abs().min((x - self.urx() as f64).abs())
        };
        let dy = if y >= self.ly as f64 && y < self.ury() as f64 {
            0.0
        } else {
            (y - self.ly as f64).abs().min((y - self.ury() as f64).abs())
        };
        dx + dy
    }

    /// Greedy row formation. Blocks are taken in y-order and appended to a
    /// front row that closes when full; a cell with `R` regions claims the
    /// `R - 1` rows after the front as well. Returns `false` on overflow of
    /// a row's width (the caller retries in the other direction) and leaves
    /// spill detection to [`Stripe::has_no_rows_spilling_out`].
    pub fn pack(
        &mut self,
        blocks: &mut [Block],
        types: &[BlockType],
        reserved: I,
        seed_p: I,
        seed_n: I,
        upward: bool,
    ) -> bool {
        self.rows.clear();
        self.is_bottom_up = upward;
        let capacity = self.width - reserved;

        let mut order = self.blocks.clone();
        if upward {
            order.sort_by(|&a, &b| {
                (blocks[a].lly, blocks[a].llx)
                    .partial_cmp(&(blocks[b].lly, blocks[b].llx))
                    .unwrap()
                    .then(a.cmp(&b))
            });
        } else {
            order.sort_by(|&a, &b| {
                (blocks[b].ury(), blocks[a].llx)
                    .partial_cmp(&(blocks[a].ury(), blocks[b].llx))
                    .unwrap()
                    .then(a.cmp(&b))
            });
        }

        let mut front = 0usize;
        for &id in &order {
            let width = blocks[id].width;
            let region_count = types[blocks[id].type_id].region_count();
            if width > capacity {
                trace!("block {} wider than stripe capacity", blocks[id].name);
                return false;
            }

            // advance the front past full rows (the next one may already
            // hold regions a multi-region cell placed ahead) and, for
            // even-region cells, past rows of the wrong orientation: such a
            // cell cannot be flipped into place, its base region needs a row
            // with the matching well order
            loop {
                if front == self.rows.len() {
                    self.rows.push(GriddedRow::new(self.lx, self.ly, self.width));
                }
                let full = self.rows[front].used_size + width > capacity;
                let mismatch = upward
                    && region_count % 2 == 0
                    && types[blocks[id].type_id].well.as_ref().map_or(false, |w| {
                        let orient_n = self.is_first_row_orient_n == (front % 2 == 0);
                        orient_n != w.is_n_above_p(0)
                    });
                if !full && !mismatch {
                    break;
                }
                front += 1;
            }

            for offset in 0..region_count {
                let row_idx = front + offset;
                if row_idx == self.rows.len() {
                    self.rows.push(GriddedRow::new(self.lx, self.ly, self.width));
                }
                let region_id = if upward {
                    offset
                } else {
                    region_count - 1 - offset
                };
                if offset > 0 && self.rows[row_idx].used_size + width > capacity {
                    trace!(
                        "multi-region block {} does not fit row {row_idx}",
                        blocks[id].name
                    );
                    return false;
                }
                self.rows[row_idx].add_block_region(blocks, types, id, region_id);
            }
        }

        self.finalize(blocks, types, seed_p, seed_n, upward);
        true
    }

    /// Orientation assignment, height recomputation with final flips, row
    /// stacking, and x/y legalization.
    fn finalize(
        &mut self,
        blocks: &mut [Block],
        types: &[BlockType],
        seed_p: I,
        seed_n: I,
        upward: bool,
    ) {
        if !upward {
            // rows were built top-first; store them bottom-up
            self.rows.reverse();
        }

        for (k, row) in self.rows.iter_mut().enumerate() {
            row.is_orient_n = self.is_first_row_orient_n == (k % 2 == 0);
        }

        // a block's orientation comes from the row holding its region 0
        for row in &self.rows {
            for br in &row.blk_regions {
                if br.region_id == 0 {
                    let orient = row.compute_block_orient(&types[blocks[br.blk].type_id], true);
                    blocks[br.blk].orient = orient;
                }
            }
        }

        let mut y = self.ly;
        for row in self.rows.iter_mut() {
            row.recompute_height(blocks, types, seed_p, seed_n);
            row.ly = y;
            y += row.height();
        }

        let targets: Vec<f64> = blocks.iter().map(|b| b.llx).collect();
        for row in self.rows.iter_mut() {
            row.init_segments(blocks);
            for seg in &row.segments {
                seg.legalize_x(blocks, |blk, _| targets[blk]);
            }
            row.legalize_y(blocks, types);
        }
    }

    /// The packed rows must not rise above the stripe.
    pub fn has_no_rows_spilling_out(&self) -> bool {
        self.rows.last().map_or(true, |row| row.ury() <= self.ury())
    }

    /// Total region width per row never exceeds the row width.
    pub fn is_stripe_legal(&self, blocks: &[Block]) -> bool {
        self.rows.iter().all(|row| row.is_row_legal(blocks))
    }

    /// Well-tap x-footprints per row parity, spaced by `interval` from the
    /// stripe's left edge; checker-board mode doubles the stride and offsets
    /// odd rows by one interval.
    pub fn precompute_tap_locations(&mut self, checker_board: bool, interval: I, tap_width: I) {
        self.tap_locs_even.clear();
        self.tap_locs_odd.clear();
        let step = if checker_board { 2 * interval } else { interval };
        let first = self.lx + interval / 2;
        let urx = self.urx();
        let push_run = |start: I| {
            let mut locs = Vec::new();
            let mut x = start;
            while x + tap_width <= urx {
                locs.push(SegI::new(x, x + tap_width));
                x += step;
            }
            locs
        };
        self.tap_locs_even = push_run(first);
        self.tap_locs_odd = if checker_board {
            push_run(first + interval)
        } else {
            self.tap_locs_even.clone()
        };
    }
}
