use log::trace;

use crate::grid_bin::{BinCluster, BinGrid, GridBinIndex};
use crate::prelude::*;

/// A spreading box: a window of grid bins (or a slice of a single bin) plus
/// the cells that must end up inside it.
#[derive(Clone, Debug)]
pub struct BoxBin {
    pub ll: GridBinIndex,
    pub ur: GridBinIndex,
    pub left: I,
    pub bottom: I,
    pub right: I,
    pub top: I,
    pub cells: Vec<usize>,
    pub total_cell_area: u64,
    pub total_white_space: u64,
    /// Which index range the next bisection splits.
    pub cut_axis: Axis,
}

impl BoxBin {
    #[inline]
    fn is_single_bin(&self) -> bool {
        self.ll == self.ur
    }

    fn rect(&self) -> RectI {
        RectI::new(self.left, self.bottom, self.right, self.top)
    }
}

/// Expand the cluster's bounding box until it holds at least as much white
/// space as cell area, collect the covered cells, and mark the window as
/// spread. Returns `None` for an empty cluster.
pub fn find_box_for_cluster(
    grid: &mut BinGrid,
    blocks: &[Block],
    cluster: &BinCluster,
    target_fill: f64,
) -> Option<BoxBin> {
    if cluster.bins.is_empty() {
        return None;
    }
    let mut ll = GridBinIndex::new(usize::MAX, usize::MAX);
    let mut ur = GridBinIndex::new(0, 0);
    for &i in &cluster.bins {
        ll.x = min(ll.x, i.x);
        ll.y = min(ll.y, i.y);
        ur.x = max(ur.x, i.x);
        ur.y = max(ur.y, i.y);
    }

    loop {
        let white_space = grid.lookup_white_space(ll, ur);
        let cell_area = grid.lookup_cell_area(ll, ur);
        let filling_rate = cell_area as f64 / white_space.max(1) as f64;
        if white_space > 0 && filling_rate <= target_fill {
            break;
        }
        let can_expand = ll.x > 0 || ll.y > 0 || ur.x + 1 < grid.cnt_x || ur.y + 1 < grid.cnt_y;
        if !can_expand {
            break;
        }
        ll.x = ll.x.saturating_sub(1);
        ll.y = ll.y.saturating_sub(1);
        ur.x = min(ur.x + 1, grid.cnt_x - 1);
        ur.y = min(ur.y + 1, grid.cnt_y - 1);
    }

    let mut cells = Vec::new();
    let mut total_cell_area = 0;
    for x in ll.x..=ur.x {
        for y in ll.y..=ur.y {
            let bin = &grid.bins[grid.idx(x, y)];
            for &c in &bin.cells {
                total_cell_area += blocks[c].area();
                cells.push(c);
            }
        }
    }
    let total_white_space = grid.lookup_white_space(ll, ur);

    for x in ll.x..=ur.x {
        for y in ll.y..=ur.y {
            let i = grid.idx(x, y);
            grid.bins[i].global_placed = true;
        }
    }

    let ll_rect = grid.bin(ll).rect;
    let ur_rect = grid.bin(ur).rect;
    Some(BoxBin {
        ll,
        ur,
        left: ll_rect.llx,
        bottom: ll_rect.lly,
        right: ur_rect.urx,
        top: ur_rect.ury,
        cells,
        total_cell_area,
        total_white_space,
        cut_axis: Axis::Y,
    })
}

/// Spread the root box's cells by recursive bisection. Every cell ends up
/// inside some macro-free leaf slice of the window.
pub fn recursive_bisection(grid: &BinGrid, blocks: &mut [Block], root: BoxBin) {
    let mut stack = vec![root];
    while let Some(bx) = stack.pop() {
        if bx.cells.is_empty() {
            continue;
        }
        if bx.is_single_bin() {
            let bin = grid.bin(bx.ll);
            let has_macro = bin
                .terminals
                .iter()
                .any(|&t| block_rect(&blocks[t]).overlaps(&bx.rect()));
            if has_macro {
                split_grid_box(grid, blocks, bx, &mut stack);
            } else {
                place_blocks_in_box(blocks, &bx);
            }
        } else {
            split_box(grid, blocks, bx, &mut stack);
        }
    }
}

fn block_rect(blk: &Block) -> RectI {
    RectI::new(
        blk.llx.floor() as I,
        blk.lly.floor() as I,
        blk.urx().ceil() as I,
        blk.ury().ceil() as I,
    )
}

#[inline]
fn center(blk: &Block, axis: Axis) -> f64 {
    match axis {
        Axis::X => blk.center_x(),
        Axis::Y => blk.center_y(),
    }
}

/// Split the cell list so the two sides' cell areas follow the white-space
/// proportion. Cells are taken in coordinate order along the cut axis.
fn split_cells(
    blocks: &[Block],
    mut cells: Vec<usize>,
    total_area: u64,
    ws_low: u64,
    ws_high: u64,
    axis: Axis,
) -> (Vec<usize>, u64, Vec<usize>, u64) {
    cells.sort_by(|&a, &b| {
        center(&blocks[a], axis)
            .partial_cmp(&center(&blocks[b], axis))
            .unwrap()
            .then(a.cmp(&b))
    });
    let target_low =
        total_area as f64 * ws_low as f64 / (ws_low + ws_high).max(1) as f64;
    let mut low = Vec::new();
    let mut high = Vec::new();
    let mut area_low = 0u64;
    let mut area_high = 0u64;
    for id in cells {
        if (area_low as f64) < target_low {
            area_low += blocks[id].area();
            low.push(id);
        } else {
            area_high += blocks[id].area();
            high.push(id);
        }
    }
    (low, area_low, high, area_high)
}

/// Bisect a multi-bin box on its cut axis at the white-space median.
fn split_box(grid: &BinGrid, blocks: &[Block], bx: BoxBin, stack: &mut Vec<BoxBin>) {
    let mut axis = bx.cut_axis;
    let range = |axis: Axis| match axis {
        Axis::X => (bx.ll.x, bx.ur.x),
        Axis::Y => (bx.ll.y, bx.ur.y),
    };
    if range(axis).0 == range(axis).1 {
        // degenerate on this axis, cut the other one
        axis = match axis {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        };
    }
    let (lo, hi) = range(axis);
    debug_assert!(lo < hi);

    // cut index k: low window is [lo, k], high window is [k+1, hi]
    let window = |a: usize, b: usize| match axis {
        Axis::X => (
            GridBinIndex::new(a, bx.ll.y),
            GridBinIndex::new(b, bx.ur.y),
        ),
        Axis::Y => (
            GridBinIndex::new(bx.ll.x, a),
            GridBinIndex::new(bx.ur.x, b),
        ),
    };
    let mut best_k = lo;
    let mut best_diff = u64::MAX;
    for k in lo..hi {
        let (wll, wur) = window(lo, k);
        let ws_low = grid.lookup_white_space(wll, wur);
        let ws_high = bx.total_white_space - ws_low;
        let diff = ws_low.abs_diff(ws_high);
        if diff < best_diff {
            best_diff = diff;
            best_k = k;
        }
    }

    let next_axis = match axis {
        Axis::X => Axis::Y,
        Axis::Y => Axis::X,
    };
    let (ll1, ur1) = window(lo, best_k);
    let (ll2, ur2) = window(best_k + 1, hi);
    let ws1 = grid.lookup_white_space(ll1, ur1);
    let ws2 = bx.total_white_space - ws1;

    let child = |ll: GridBinIndex, ur: GridBinIndex, cells: Vec<usize>, area: u64, ws: u64| {
        let ll_rect = grid.bin(ll).rect;
        let ur_rect = grid.bin(ur).rect;
        BoxBin {
            ll,
            ur,
            left: ll_rect.llx,
            bottom: ll_rect.lly,
            right: ur_rect.urx,
            top: ur_rect.ury,
            cells,
            total_cell_area: area,
            total_white_space: ws,
            cut_axis: next_axis,
        }
    };

    // a side holding almost no white space is dropped; the other inherits
    let threshold = bx.total_white_space / 100;
    if ws1 <= threshold {
        stack.push(child(ll2, ur2, bx.cells, bx.total_cell_area, ws2));
        return;
    }
    if ws2 <= threshold {
        stack.push(child(ll1, ur1, bx.cells, bx.total_cell_area, ws1));
        return;
    }

    let (low, area_low, high, area_high) =
        split_cells(blocks, bx.cells, bx.total_cell_area, ws1, ws2, axis);
    stack.push(child(ll1, ur1, low, area_low, ws1));
    stack.push(child(ll2, ur2, high, area_high, ws2));
}

/// Bisect a single-bin box along a fixed-macro boundary until its slices are
/// macro-free.
fn split_grid_box(grid: &BinGrid, blocks: &mut [Block], bx: BoxBin, stack: &mut Vec<BoxBin>) {
    let bin = grid.bin(bx.ll);
    let box_rect = bx.rect();
    let obstacles: Vec<RectI> = bin
        .terminals
        .iter()
        .map(|&t| block_rect(&blocks[t]))
        .filter(|r| r.overlaps(&box_rect))
        .collect();

    // candidate cut lines: macro edges strictly inside the box
    let mut x_cuts: Vec<I> = Vec::new();
    let mut y_cuts: Vec<I> = Vec::new();
    for r in &obstacles {
        for c in [r.llx, r.urx] {
            if c > bx.left && c < bx.right {
                x_cuts.push(c);
            }
        }
        for c in [r.lly, r.ury] {
            if c > bx.bottom && c < bx.top {
                y_cuts.push(c);
            }
        }
    }

    // prefer cutting the longer side; fall back to the other
    let wide = box_rect.width() >= box_rect.height();
    let (axis, cut) = match (wide, best_cut(&x_cuts, bx.left, bx.right), best_cut(&y_cuts, bx.bottom, bx.top)) {
        (true, Some(c), _) => (Axis::X, Some(c)),
        (true, None, c) => (Axis::Y, c),
        (false, _, Some(c)) => (Axis::Y, Some(c)),
        (false, c, None) => (Axis::X, c),
    };
    let Some(cut) = cut else {
        // macro covers the whole box; place best-effort
        trace!("grid box fully covered by terminals, placing {} cells best-effort", bx.cells.len());
        place_blocks_in_box(blocks, &bx);
        return;
    };

    let (rect1, rect2) = match axis {
        Axis::X => (
            RectI::new(bx.left, bx.bottom, cut, bx.top),
            RectI::new(cut, bx.bottom, bx.right, bx.top),
        ),
        Axis::Y => (
            RectI::new(bx.left, bx.bottom, bx.right, cut),
            RectI::new(bx.left, cut, bx.right, bx.top),
        ),
    };
    let free_space = |r: &RectI| {
        let occupied: u64 = obstacles.iter().map(|o| o.overlap_area(r)).sum();
        r.area().saturating_sub(occupied)
    };
    let ws1 = free_space(&rect1);
    let ws2 = free_space(&rect2);

    let (ll, ur, cut_axis) = (bx.ll, bx.ur, bx.cut_axis);
    let child = move |rect: RectI, cells: Vec<usize>, area: u64, ws: u64| BoxBin {
        ll,
        ur,
        left: rect.llx,
        bottom: rect.lly,
        right: rect.urx,
        top: rect.ury,
        cells,
        total_cell_area: area,
        total_white_space: ws,
        cut_axis,
    };

    let threshold = (ws1 + ws2) / 100;
    if ws1 <= threshold {
        stack.push(child(rect2, bx.cells, bx.total_cell_area, ws2));
        return;
    }
    if ws2 <= threshold {
        stack.push(child(rect1, bx.cells, bx.total_cell_area, ws1));
        return;
    }
    let (low, area_low, high, area_high) =
        split_cells(blocks, bx.cells, bx.total_cell_area, ws1, ws2, axis);
    stack.push(child(rect1, low, area_low, ws1));
    stack.push(child(rect2, high, area_high, ws2));
}

fn best_cut(cuts: &[I], lo: I, hi: I) -> Option<I> {
    let mid = (lo + hi) / 2;
    cuts.iter().copied().min_by_key(|c| (c - mid).abs())
}

/// Distribute a leaf box's cells along each axis in proportion to their
/// cumulative dimension. The box must be macro-free.
pub fn place_blocks_in_box(blocks: &mut [Block], bx: &BoxBin) {
    let mut by_x = bx.cells.clone();
    by_x.sort_by(|&a, &b| {
        blocks[a]
            .center_x()
            .partial_cmp(&blocks[b].center_x())
            .unwrap()
            .then(a.cmp(&b))
    });
    let total_w: f64 = by_x.iter().map(|&c| blocks[c].width as f64).sum();
    if total_w > 0.0 {
        let box_w = (bx.right - bx.left) as f64;
        let mut cur = 0.0;
        for &c in &by_x {
            blocks[c].set_center_x(bx.left as f64 + cur / total_w * box_w);
            cur += blocks[c].width as f64;
        }
    }

    let mut by_y = bx.cells.clone();
    by_y.sort_by(|&a, &b| {
        blocks[a]
            .center_y()
            .partial_cmp(&blocks[b].center_y())
            .unwrap()
            .then(a.cmp(&b))
    });
    let total_h: f64 = by_y.iter().map(|&c| blocks[c].eff_height() as f64).sum();
    if total_h > 0.0 {
        let box_h = (bx.top - bx.bottom) as f64;
        let mut cur = 0.0;
        for &c in &by_y {
            blocks[c].set_center_y(bx.bottom as f64 + cur / total_h * box_h);
            cur += blocks[c].eff_height() as f64;
        }
    }
}
