use log::{debug, info, warn};

use crate::config::TetrisConfig;
use crate::prelude::*;

/// Row-sweep detailed legalizer. Alternates left-to-right and right-to-left
/// sweeps until every movable block has a legal row position or the sweep
/// cap is reached.
pub struct TetrisLegalizer {
    pub config: TetrisConfig,
}

/// Per-sweep context: the row white space plus the advancing contour.
struct Sweep<'a> {
    space: &'a RowSpace,
    contour: Vec<I>,
    cur_iter: usize,
    k_left: f64,
}

impl TetrisLegalizer {
    pub fn new(config: TetrisConfig) -> Self {
        TetrisLegalizer { config }
    }

    /// Legalize all movable blocks. Returns `Ok(false)` when some block
    /// still has no legal location after the final sweep; the blocks then
    /// hold their best-cost locations.
    pub fn legalize(&self, ckt: &mut Circuit) -> Result<bool> {
        self.config.validate(ckt)?;
        info!("---------------------------------------");
        info!("start tetris legalization");

        let row_height = self.config.row_height.unwrap_or(ckt.tech.row_height);
        let space = RowSpace::detect(ckt, row_height, ckt.min_block_width());
        let mut success = false;
        let mut from_left = true;
        for cur_iter in 0..self.config.max_iter {
            let mut sweep = Sweep {
                space: &space,
                contour: vec![0; space.row_count()],
                cur_iter,
                k_left: self.config.k_left + cur_iter as f64,
            };
            success = if from_left {
                self.sweep_left(ckt, &mut sweep)
            } else {
                self.sweep_right(ckt, &mut sweep)
            };
            from_left = !from_left;
            debug!(
                "sweep {cur_iter} done, success: {success}, HPWL: {:.4e}",
                ckt.weighted_hpwl()
            );
            if success {
                break;
            }
        }
        if !success {
            warn!("tetris legalization failed, keeping best-effort locations");
        }
        info!("tetris legalization complete");
        Ok(success)
    }

    fn sort_order(&self, ckt: &Circuit, from_left: bool) -> Vec<usize> {
        let cfg = &self.config;
        let mut order: Vec<usize> = (0..ckt.blocks.len()).collect();
        let key = |id: usize| {
            let b = &ckt.blocks[id];
            let spread = cfg.k_width * b.width as f64 + cfg.k_height * b.eff_height() as f64;
            if from_left {
                b.llx - spread
            } else {
                -(b.urx() + spread)
            }
        };
        order.sort_by(|&a, &b| {
            key(a)
                .partial_cmp(&key(b))
                .unwrap()
                .then(
                    ckt.blocks[a]
                        .lly
                        .partial_cmp(&ckt.blocks[b].lly)
                        .unwrap(),
                )
                .then(a.cmp(&b))
        });
        order
    }

    fn sweep_left(&self, ckt: &mut Circuit, sweep: &mut Sweep) -> bool {
        sweep.contour.fill(sweep.space.left);
        let order = self.sort_order(ckt, true);

        let mut is_successful = true;
        let mut failure_point = None;
        for (pos, &id) in order.iter().enumerate() {
            if ckt.blocks[id].is_fixed() {
                continue;
            }
            let width = ckt.blocks[id].width;
            let height = ckt.blocks[id].eff_height();
            let mut x = ckt.blocks[id].llx.round() as I;
            let mut y = sweep.clamp_row_loc(ckt.blocks[id].lly, height);

            if !sweep.is_loc_legal_left(x, y, width, height) {
                let (bx, by, found) = sweep.find_loc_left(x, y, width, height);
                x = bx;
                y = by;
                if !found {
                    is_successful = false;
                    failure_point.get_or_insert(pos);
                }
            }
            ckt.blocks[id].llx = x as f64;
            ckt.blocks[id].lly = y as f64;
            sweep.use_space_left(x, y, width, height);
        }

        if !is_successful && self.config.fast_shift {
            if let Some(fp) = failure_point {
                fast_shift_left(ckt, &order, fp);
            }
        }
        is_successful
    }

    fn sweep_right(&self, ckt: &mut Circuit, sweep: &mut Sweep) -> bool {
        sweep.contour.fill(sweep.space.right);
        let order = self.sort_order(ckt, false);

        let mut is_successful = true;
        let mut failure_point = None;
        for (pos, &id) in order.iter().enumerate() {
            if ckt.blocks[id].is_fixed() {
                continue;
            }
            let width = ckt.blocks[id].width;
            let height = ckt.blocks[id].eff_height();
            // the sweep tracks the right edge
            let mut x = ckt.blocks[id].urx().round() as I;
            let mut y = sweep.clamp_row_loc(ckt.blocks[id].lly, height);

            if !sweep.is_loc_legal_right(x, y, width, height) {
                let (bx, by, found) = sweep.find_loc_right(x, y, width, height);
                x = bx;
                y = by;
                if !found {
                    is_successful = false;
                    failure_point.get_or_insert(pos);
                }
            }
            ckt.blocks[id].llx = (x - width) as f64;
            ckt.blocks[id].lly = y as f64;
            sweep.use_space_right(x, y, width, height);
        }

        if !is_successful && self.config.fast_shift {
            if let Some(fp) = failure_point {
                fast_shift_right(ckt, &order, fp);
            }
        }
        is_successful
    }
}

impl Sweep<'_> {
    fn height_to_rows(&self, height: I) -> usize {
        ((height + self.space.row_height - 1) / self.space.row_height).max(1) as usize
    }

    fn max_start_row(&self, height: I) -> usize {
        self.space
            .row_count()
            .saturating_sub(self.height_to_rows(height))
    }

    /// Snap to the nearest row origin at which the block still fits below
    /// the region top.
    fn clamp_row_loc(&self, y: f64, height: I) -> I {
        let row = ((y - self.space.bottom as f64) / self.space.row_height as f64).round() as isize;
        let row = row.clamp(0, self.max_start_row(height) as isize) as usize;
        self.space.row_to_loc(row)
    }

    /// Whether `[lo_x, hi_x]` lies inside a white-space segment of every row
    /// in `[lo_row, hi_row]`.
    fn is_space_legal(&self, lo_x: I, hi_x: I, lo_row: usize, hi_row: usize) -> bool {
        if hi_row >= self.space.row_count() || lo_x < self.space.left || hi_x > self.space.right {
            return false;
        }
        self.space.rows[lo_row..=hi_row]
            .iter()
            .all(|segs| segs.iter().any(|s| s.lo <= lo_x && s.hi >= hi_x))
    }

    fn is_loc_legal_left(&self, x: I, y: I, width: I, height: I) -> bool {
        let lo_row = self.space.start_row(y).max(0) as usize;
        let hi_row = lo_row + self.height_to_rows(height) - 1;
        if !self.is_space_legal(x, x + width, lo_row, hi_row) {
            return false;
        }
        self.contour[lo_row..=hi_row].iter().all(|&c| c <= x)
    }

    fn is_loc_legal_right(&self, x: I, y: I, width: I, height: I) -> bool {
        let lo_row = self.space.start_row(y).max(0) as usize;
        let hi_row = lo_row + self.height_to_rows(height) - 1;
        if !self.is_space_legal(x - width, x, lo_row, hi_row) {
            return false;
        }
        self.contour[lo_row..=hi_row].iter().all(|&c| c >= x)
    }

    /// Find the cheapest `(x, row)` for the block, searching a y-window that
    /// widens with the sweep iteration. Per row, every white-space segment
    /// that can hold the block past the contour yields one candidate; the
    /// returned location minimizes `|x - init_x| + |y - init_y|`. When no
    /// segment works anywhere, the best-cost illegal location is returned
    /// with `false` so the caller can keep it for post-processing.
    fn find_loc_left(&self, init_x: I, init_y: I, width: I, height: I) -> (I, I, bool) {
        let blk_rows = self.height_to_rows(height);
        let max_row = self.max_start_row(height);
        let left_block_bound = (init_x as f64 - self.k_left * width as f64).round() as I;

        let window = (self.cur_iter as I + 1) * height;
        let lo = self
            .space
            .start_row(init_y - 4 * height - window)
            .clamp(0, max_row as isize) as usize;
        let hi = self
            .space
            .start_row(init_y + 5 * height + window)
            .clamp(0, max_row as isize) as usize;

        let mut best_illegal = (self.space.left, lo, i64::MAX);
        let mut best_legal: Option<(I, usize, i64)> = None;
        for row in lo..=hi {
            let end_row = row + blk_rows - 1;
            if end_row >= self.space.row_count() {
                break;
            }
            let contour_max = self.contour[row..=end_row].iter().copied().max().unwrap();
            let y = self.space.row_to_loc(row);
            let y_cost = (y - init_y).abs() as i64;

            for seg in &self.space.rows[row] {
                let x_lo = max(seg.lo, max(contour_max, left_block_bound));
                let x_hi = seg.hi - width;
                if x_lo > x_hi {
                    continue;
                }
                let x = init_x.clamp(x_lo, x_hi);
                if !self.is_space_legal(x, x + width, row, end_row) {
                    continue;
                }
                let cost = (x - init_x).abs() as i64 + y_cost;
                if best_legal.map_or(true, |b| cost < b.2) {
                    best_legal = Some((x, row, cost));
                }
            }

            let x = max(left_block_bound, contour_max).max(self.space.left);
            let cost = (x - init_x).abs() as i64 + y_cost;
            if cost < best_illegal.2 {
                best_illegal = (x, row, cost);
            }
        }

        if let Some((x, row, _)) = best_legal {
            return (x, self.space.row_to_loc(row), true);
        }
        let (x, row, _) = best_illegal;
        (x, self.space.row_to_loc(row), false)
    }

    /// Mirror of [`find_loc_left`]; `init_x` and the result track the
    /// block's right edge.
    fn find_loc_right(&self, init_x: I, init_y: I, width: I, height: I) -> (I, I, bool) {
        let blk_rows = self.height_to_rows(height);
        let max_row = self.max_start_row(height);
        let right_block_bound = (init_x as f64 + self.k_left * width as f64).round() as I;

        let window = (self.cur_iter as I + 1) * height;
        let lo = self
            .space
            .start_row(init_y - 4 * height - window)
            .clamp(0, max_row as isize) as usize;
        let hi = self
            .space
            .start_row(init_y + 5 * height + window)
            .clamp(0, max_row as isize) as usize;

        let mut best_illegal = (self.space.right, lo, i64::MAX);
        let mut best_legal: Option<(I, usize, i64)> = None;
        for row in lo..=hi {
            let end_row = row + blk_rows - 1;
            if end_row >= self.space.row_count() {
                break;
            }
            let contour_min = self.contour[row..=end_row].iter().copied().min().unwrap();
            let y = self.space.row_to_loc(row);
            let y_cost = (y - init_y).abs() as i64;

            for seg in &self.space.rows[row] {
                let x_lo = seg.lo + width;
                let x_hi = min(seg.hi, min(contour_min, right_block_bound));
                if x_lo > x_hi {
                    continue;
                }
                let x = init_x.clamp(x_lo, x_hi);
                if !self.is_space_legal(x - width, x, row, end_row) {
                    continue;
                }
                let cost = (x - init_x).abs() as i64 + y_cost;
                if best_legal.map_or(true, |b| cost < b.2) {
                    best_legal = Some((x, row, cost));
                }
            }

            let x = min(right_block_bound, contour_min).min(self.space.right);
            let cost = (x - init_x).abs() as i64 + y_cost;
            if cost < best_illegal.2 {
                best_illegal = (x, row, cost);
            }
        }

        if let Some((x, row, _)) = best_legal {
            return (x, self.space.row_to_loc(row), true);
        }
        let (x, row, _) = best_illegal;
        (x, self.space.row_to_loc(row), false)
    }

    fn use_space_left(&mut self, x: I, y: I, width: I, height: I) {
        let lo_row = self.space.start_row(y).max(0) as usize;
        let hi_row = min(
            lo_row + self.height_to_rows(height) - 1,
            self.space.row_count() - 1,
        );
        for c in &mut self.contour[lo_row..=hi_row] {
            *c = x + width;
        }
    }

    fn use_space_right(&mut self, x: I, y: I, width: I, height: I) {
        let lo_row = self.space.start_row(y).max(0) as usize;
        let hi_row = min(
            lo_row + self.height_to_rows(height) - 1,
            self.space.row_count() - 1,
        );
        for c in &mut self.contour[lo_row..=hi_row] {
            *c = x - width;
        }
    }
}

/// Shift every not-yet-placed block in sweep order so it keeps its order
/// relative to the last successfully placed one.
fn fast_shift_left(ckt: &mut Circuit, order: &[usize], failure_point: usize) {
    if failure_point == 0 {
        warn!("unexpected legalization failure at the first block");
        return;
    }
    let failed = order[failure_point];
    let last_placed = order[failure_point - 1];
    let bounding_left = ckt.blocks[failed].llx;
    let left_new = ckt.blocks[last_placed].llx.round();
    let shift = left_new - bounding_left;
    for &id in &order[failure_point..] {
        if ckt.blocks[id].is_movable() {
            ckt.blocks[id].llx += shift;
        }
    }
}

fn fast_shift_right(ckt: &mut Circuit, order: &[usize], failure_point: usize) {
    if failure_point == 0 {
        warn!("unexpected legalization failure at the first block");
        return;
    }
    let failed = order[failure_point];
    let last_placed = order[failure_point - 1];
    let bounding_right = ckt.blocks[failed].urx();
    let right_new = ckt.blocks[last_placed].urx().round();
    let shift = right_new - bounding_right;
    for &id in &order[failure_point..] {
        if ckt.blocks[id].is_movable() {
            ckt.blocks[id].llx += shift;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tech(row_height: I) -> Tech {
        Tech {
            row_height,
            ..Default::default()
        }
    }

    fn no_overlap(ckt: &Circuit) {
        for (i, a) in ckt.blocks.iter().enumerate() {
            for b in ckt.blocks.iter().skip(i + 1) {
                assert!(
                    !a.overlaps(b),
                    "{} at ({}, {}) overlaps {} at ({}, {})",
                    a.name,
                    a.llx,
                    a.lly,
                    b.name,
                    b.llx,
                    b.lly
                );
            }
        }
    }

    fn rows_aligned(ckt: &Circuit, row_height: I) {
        for blk in ckt.blocks.iter().filter(|b| b.is_movable()) {
            let lly = blk.lly as I;
            assert_eq!(blk.lly.fract(), 0.0);
            assert_eq!(
                (lly - ckt.region.lly) % row_height,
                0,
                "{} lly {} not on a row",
                blk.name,
                blk.lly
            );
        }
    }

    #[test]
    fn two_abutting_blocks_on_row_zero() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 100, 100), tech(10));
        let ty = ckt.add_type(BlockType::new("c", 30, 30)).unwrap();
        ckt.add_block("a", ty, 10.0, 2.0, PlaceStatus::Unplaced, Orient::N);
        ckt.add_block("b", ty, 32.0, 2.0, PlaceStatus::Unplaced, Orient::N);
        let lg = TetrisLegalizer::new(TetrisConfig::default());
        assert!(lg.legalize(&mut ckt).unwrap());
        no_overlap(&ckt);
        rows_aligned(&ckt, 10);
        assert_eq!(ckt.blocks[0].lly, 0.0);
        assert_eq!(ckt.blocks[1].lly, 0.0);
        assert_eq!(ckt.blocks[0].urx(), ckt.blocks[1].llx);
    }

    #[test]
    fn stacked_cells_tile_a_row() {
        // four 50x50 cells piled at the origin of a single-row 200x100 region
        let mut ckt = Circuit::new(RectI::new(0, 0, 200, 100), tech(100));
        let ty = ckt.add_type(BlockType::new("c", 50, 50)).unwrap();
        for i in 0..4 {
            ckt.add_block(
                format!("c{i}"),
                ty,
                0.0,
                0.0,
                PlaceStatus::Unplaced,
                Orient::N,
            );
        }
        let lg = TetrisLegalizer::new(TetrisConfig::default());
        assert!(lg.legalize(&mut ckt).unwrap());
        no_overlap(&ckt);
        rows_aligned(&ckt, 100);
        let mut xs: Vec<f64> = ckt.blocks.iter().map(|b| b.llx).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(xs, vec![0.0, 50.0, 100.0, 150.0]);
        assert!(ckt.blocks.iter().all(|b| b.lly == 0.0));
    }

    #[test]
    fn macro_footprint_is_avoided() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 300, 200), tech(100));
        let ty = ckt.add_type(BlockType::new("c", 50, 50)).unwrap();
        let mac = ckt.add_type(BlockType::new("mac", 100, 100)).unwrap();
        let macro_id = ckt.add_block("m", mac, 100.0, 0.0, PlaceStatus::Fixed, Orient::N);
        for i in 0..4 {
            ckt.add_block(
                format!("c{i}"),
                ty,
                125.0,
                25.0,
                PlaceStatus::Unplaced,
                Orient::N,
            );
        }
        let lg = TetrisLegalizer::new(TetrisConfig::default());
        assert!(lg.legalize(&mut ckt).unwrap());
        no_overlap(&ckt);
        rows_aligned(&ckt, 100);
        let mac_blk = ckt.blocks[macro_id].clone();
        for blk in ckt.blocks.iter().filter(|b| b.is_movable()) {
            assert!(!blk.overlaps(&mac_blk), "{} overlaps the macro", blk.name);
            assert!(blk.lly == 0.0 || blk.lly == 100.0);
        }
    }

    #[test]
    fn taller_than_region_block_fails_cleanly() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 20, 20), tech(10));
        let ty = ckt.add_type(BlockType::new("tall", 30, 30)).unwrap();
        ckt.add_block("t", ty, 0.0, 0.0, PlaceStatus::Unplaced, Orient::N);
        let lg = TetrisLegalizer::new(TetrisConfig {
            max_iter: 2,
            ..Default::default()
        });
        assert!(!lg.legalize(&mut ckt).unwrap());
    }
}
