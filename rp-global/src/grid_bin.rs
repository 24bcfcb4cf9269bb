use std::collections::VecDeque;

use log::info;

use crate::prelude::*;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct GridBinIndex {
    pub x: usize,
    pub y: usize,
}

impl GridBinIndex {
    pub fn new(x: usize, y: usize) -> Self {
        GridBinIndex { x, y }
    }
}

/// One bin of the overflow grid.
#[derive(Clone, Debug, Default)]
pub struct GridBin {
    pub index: GridBinIndex,
    pub rect: RectI,
    /// Fixed blocks intersecting this bin.
    pub terminals: Vec<usize>,
    /// Movable blocks whose center falls in this bin.
    pub cells: Vec<usize>,
    pub cell_area: u64,
    pub white_space: u64,
    pub filling_rate: f64,
    /// Fully covered by fixed blocks.
    pub all_terminal: bool,
    pub over_fill: bool,
    /// Already covered by a spreading window this LAL pass.
    pub global_placed: bool,
}

impl GridBin {
    #[inline]
    pub fn area(&self) -> u64 {
        self.rect.area()
    }
}

/// A connected cluster of overfilled bins.
#[derive(Clone, Debug, Default)]
pub struct BinCluster {
    pub bins: Vec<GridBinIndex>,
    pub total_cell_area: u64,
}

/// The bin grid over the placement region, with a summed-area table for O(1)
/// white-space window queries.
#[derive(Clone, Debug)]
pub struct BinGrid {
    pub region: RectI,
    pub bin_width: I,
    pub bin_height: I,
    pub cnt_x: usize,
    pub cnt_y: usize,
    /// Bins in column-major order: `x * cnt_y + y`.
    pub bins: Vec<GridBin>,
    lut: Vec<u64>,
    pub target_fill: f64,
}

impl BinGrid {
    /// Size bins for roughly `cells_per_bin` average-sized movable cells at
    /// the target density, then subtract fixed-macro overlap from each bin's
    /// white space.
    pub fn new(ckt: &Circuit, cells_per_bin: usize, target_fill: f64) -> Self {
        let side = (cells_per_bin as f64 * ckt.ave_mov_block_area() / target_fill)
            .sqrt()
            .round()
            .max(1.0) as I;
        let region = ckt.region;
        let cnt_x = ((region.width() as f64) / side as f64).ceil().max(1.0) as usize;
        let cnt_y = ((region.height() as f64) / side as f64).ceil().max(1.0) as usize;
        info!("global placement bin width, height: {side} {side}");

        let mut bins = Vec::with_capacity(cnt_x * cnt_y);
        for x in 0..cnt_x {
            for y in 0..cnt_y {
                let left = region.llx + x as I * side;
                let bottom = region.lly + y as I * side;
                // edge bins absorb the remainder up to the region boundary
                let right = if x + 1 == cnt_x {
                    region.urx
                } else {
                    left + side
                };
                let top = if y + 1 == cnt_y {
                    region.ury
                } else {
                    bottom + side
                };
                let rect = RectI::new(left, bottom, right, top);
                bins.push(GridBin {
                    index: GridBinIndex::new(x, y),
                    rect,
                    white_space: rect.area(),
                    ..Default::default()
                });
            }
        }

        let mut grid = BinGrid {
            region,
            bin_width: side,
            bin_height: side,
            cnt_x,
            cnt_y,
            bins,
            lut: vec![0; cnt_x * cnt_y],
            target_fill,
        };
        grid.subtract_terminals(ckt);
        grid.rebuild_lut();
        grid
    }

    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        x * self.cnt_y + y
    }

    #[inline]
    pub fn bin(&self, i: GridBinIndex) -> &GridBin {
        &self.bins[i.x * self.cnt_y + i.y]
    }

    #[inline]
    pub fn bin_mut(&mut self, i: GridBinIndex) -> &mut GridBin {
        &mut self.bins[i.x * self.cnt_y + i.y]
    }

    fn clamp_x(&self, ix: isize) -> usize {
        ix.clamp(0, self.cnt_x as isize - 1) as usize
    }

    fn clamp_y(&self, iy: isize) -> usize {
        iy.clamp(0, self.cnt_y as isize - 1) as usize
    }

    fn subtract_terminals(&mut self, ckt: &Circuit) {
        for (id, blk) in ckt.blocks.iter().enumerate() {
            if blk.is_movable() {
                continue;
            }
            let lx = blk.llx.floor() as I;
            let ly = blk.lly.floor() as I;
            let ux = blk.urx().ceil() as I;
            let uy = blk.ury().ceil() as I;
            let out_of_range = ly >= self.region.ury
                || uy <= self.region.lly
                || lx >= self.region.urx
                || ux <= self.region.llx;
            if out_of_range {
                continue;
            }
            let blk_rect = RectI::new(lx, ly, ux, uy);

            let xl = self.clamp_x(((lx - self.region.llx) / self.bin_width) as isize);
            let xr = self.clamp_x(((ux - self.region.llx) / self.bin_width) as isize);
            let yb = self.clamp_y(((ly - self.region.lly) / self.bin_height) as isize);
            let yt = self.clamp_y(((uy - self.region.lly) / self.bin_height) as isize);
            for x in xl..=xr {
                for y in yb..=yt {
                    let bin = &mut self.bins[x * self.cnt_y + y];
                    if !blk_rect.overlaps(&bin.rect) {
                        continue;
                    }
                    bin.terminals.push(id);
                    let overlap = blk_rect.overlap_area(&bin.rect);
                    bin.white_space = bin.white_space.saturating_sub(overlap);
                    if bin.white_space < 1 {
                        bin.all_terminal = true;
                        bin.white_space = 0;
                    }
                }
            }
        }
    }

    fn rebuild_lut(&mut self) {
        for x in 0..self.cnt_x {
            for y in 0..self.cnt_y {
                let ws = self.bins[self.idx(x, y)].white_space;
                let left = if x > 0 { self.lut[self.idx(x - 1, y)] } else { 0 };
                let below = if y > 0 { self.lut[self.idx(x, y - 1)] } else { 0 };
                let corner = if x > 0 && y > 0 {
                    self.lut[self.idx(x - 1, y - 1)]
                } else {
                    0
                };
                let i = self.idx(x, y);
                self.lut[i] = left + below + ws - corner;
            }
        }
    }

    /// White space inside the inclusive bin window `[ll, ur]`.
    pub fn lookup_white_space(&self, ll: GridBinIndex, ur: GridBinIndex) -> u64 {
        let top_right = self.lut[self.idx(ur.x, ur.y)];
        let left = if ll.x > 0 {
            self.lut[self.idx(ll.x - 1, ur.y)]
        } else {
            0
        };
        let below = if ll.y > 0 {
            self.lut[self.idx(ur.x, ll.y - 1)]
        } else {
            0
        };
        let corner = if ll.x > 0 && ll.y > 0 {
            self.lut[self.idx(ll.x - 1, ll.y - 1)]
        } else {
            0
        };
        top_right - left - below + corner
    }

    /// Cell area inside the inclusive bin window `[ll, ur]`.
    pub fn lookup_cell_area(&self, ll: GridBinIndex, ur: GridBinIndex) -> u64 {
        let mut res = 0;
        for x in ll.x..=ur.x {
            for y in ll.y..=ur.y {
                res += self.bins[self.idx(x, y)].cell_area;
            }
        }
        res
    }

    pub fn clear_placed_flags(&mut self) {
        for bin in self.bins.iter_mut() {
            bin.global_placed = false;
        }
    }

    /// Re-assign movable blocks to bins and refresh the overfill flags.
    ///
    /// A bin overfills when its fill rate exceeds the target, when it is
    /// fully terminal-covered yet holds cells, or when any of its cells
    /// overlaps one of its fixed blocks.
    pub fn update_state(&mut self, ckt: &Circuit) {
        for bin in self.bins.iter_mut() {
            bin.cells.clear();
            bin.cell_area = 0;
            bin.over_fill = false;
        }

        for (id, blk) in ckt.blocks.iter().enumerate() {
            if blk.is_fixed() {
                continue;
            }
            let x = self.clamp_x(
                ((blk.center_x() - self.region.llx as f64) / self.bin_width as f64).floor() as isize,
            );
            let y = self.clamp_y(
                ((blk.center_y() - self.region.lly as f64) / self.bin_height as f64).floor()
                    as isize,
            );
            let bin = &mut self.bins[x * self.cnt_y + y];
            bin.cells.push(id);
            bin.cell_area += blk.area();
        }

        for bin in self.bins.iter_mut() {
            if bin.global_placed {
                bin.over_fill = false;
                continue;
            }
            if bin.all_terminal {
                bin.over_fill = !bin.cells.is_empty();
            } else {
                bin.filling_rate = bin.cell_area as f64 / bin.white_space.max(1) as f64;
                if bin.filling_rate > self.target_fill {
                    bin.over_fill = true;
                }
            }
            if !bin.over_fill {
                'outer: for &cell in &bin.cells {
                    for &term in &bin.terminals {
                        if ckt.blocks[cell].overlaps(&ckt.blocks[term]) {
                            bin.over_fill = true;
                            break 'outer;
                        }
                    }
                }
            }
        }
    }

    fn neighbors8(&self, i: GridBinIndex) -> impl Iterator<Item = GridBinIndex> {
        let (cx, cy) = (self.cnt_x as isize, self.cnt_y as isize);
        let (x, y) = (i.x as isize, i.y as isize);
        let mut out = Vec::with_capacity(8);
        for dx in -1..=1isize {
            for dy in -1..=1isize {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = x + dx;
                let ny = y + dy;
                if nx >= 0 && nx < cx && ny >= 0 && ny < cy {
                    out.push(GridBinIndex::new(nx as usize, ny as usize));
                }
            }
        }
        out.into_iter()
    }

    /// BFS over 8-adjacency from `seed`, visiting only overfilled, unvisited,
    /// unplaced bins, bounded by `cap` bins.
    fn grow_cluster(
        &self,
        seed: GridBinIndex,
        visited: &mut [bool],
        cap: usize,
    ) -> BinCluster {
        let mut cluster = BinCluster::default();
        let mut queue = VecDeque::new();
        visited[self.idx(seed.x, seed.y)] = true;
        cluster.bins.push(seed);
        queue.push_back(seed);
        let mut cnt = 0;
        'bfs: while let Some(b) = queue.pop_front() {
            for n in self.neighbors8(b) {
                let ni = self.idx(n.x, n.y);
                let bin = &self.bins[ni];
                if visited[ni] || !bin.over_fill || bin.global_placed {
                    continue;
                }
                if cnt > cap {
                    break 'bfs;
                }
                visited[ni] = true;
                cluster.bins.push(n);
                cnt += 1;
                queue.push_back(n);
            }
        }
        cluster.total_cell_area = cluster
            .bins
            .iter()
            .map(|&i| self.bin(i).cell_area)
            .sum();
        cluster
    }

    /// Cluster all overfilled bins, largest cell area first.
    pub fn cluster_overfilled(&self, cap: usize) -> Vec<BinCluster> {
        let mut visited = vec![false; self.bins.len()];
        let mut clusters = Vec::new();
        for x in 0..self.cnt_x {
            for y in 0..self.cnt_y {
                let i = self.idx(x, y);
                if visited[i] || !self.bins[i].over_fill || self.bins[i].global_placed {
                    continue;
                }
                clusters.push(self.grow_cluster(GridBinIndex::new(x, y), &mut visited, cap));
            }
        }
        sort_clusters(&mut clusters);
        clusters
    }

    /// Drop spread bins from the clusters, re-growing any cluster that was
    /// touched by a spreading window. Keeps the list sorted by area.
    pub fn refresh_clusters(&self, clusters: &mut Vec<BinCluster>, cap: usize) {
        let touched = |c: &BinCluster| c.bins.iter().any(|&i| self.bin(i).global_placed);
        if !clusters.iter().any(touched) {
            return;
        }
        let mut visited = vec![false; self.bins.len()];
        let mut rebuilt = Vec::new();
        for cluster in clusters.drain(..) {
            if !touched(&cluster) {
                rebuilt.push(cluster);
                continue;
            }
            for &seed in &cluster.bins {
                let i = self.idx(seed.x, seed.y);
                if visited[i] || self.bins[i].global_placed || !self.bins[i].over_fill {
                    continue;
                }
                rebuilt.push(self.grow_cluster(seed, &mut visited, cap));
            }
        }
        sort_clusters(&mut rebuilt);
        *clusters = rebuilt;
    }
}

fn sort_clusters(clusters: &mut [BinCluster]) {
    clusters.sort_by(|a, b| {
        b.total_cell_area
            .cmp(&a.total_cell_area)
            .then_with(|| a.bins.first().cmp(&b.bins.first()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_circuit() -> Circuit {
        let mut ckt = Circuit::new(RectI::new(0, 0, 40, 40), Tech::default());
        let ty = ckt.add_type(BlockType::new("c", 2, 2)).unwrap();
        // cluster five cells in the middle
        for i in 0..5 {
            ckt.add_block(
                format!("m{i}"),
                ty,
                20.0,
                20.0,
                PlaceStatus::Unplaced,
                Orient::N,
            );
        }
        ckt
    }

    #[test]
    fn lut_window_queries() {
        let ckt = grid_circuit();
        let mut grid = BinGrid::new(&ckt, 1, 1.0);
        grid.update_state(&ckt);
        let all = grid.lookup_white_space(
            GridBinIndex::new(0, 0),
            GridBinIndex::new(grid.cnt_x - 1, grid.cnt_y - 1),
        );
        assert_eq!(all, grid.region.area());
        let one = grid.lookup_white_space(GridBinIndex::new(0, 0), GridBinIndex::new(0, 0));
        assert_eq!(one, grid.bins[grid.idx(0, 0)].area());
    }

    #[test]
    fn stacked_cells_overfill_one_bin() {
        let ckt = grid_circuit();
        let mut grid = BinGrid::new(&ckt, 1, 1.0);
        grid.update_state(&ckt);
        let over: Vec<_> = grid.bins.iter().filter(|b| b.over_fill).collect();
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].cells.len(), 5);
        let clusters = grid.cluster_overfilled(100);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].total_cell_area, 20);
    }

    #[test]
    fn terminal_overlap_reduces_white_space() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 40, 40), Tech::default());
        let small = ckt.add_type(BlockType::new("c", 2, 2)).unwrap();
        let big = ckt.add_type(BlockType::new("macro", 40, 20)).unwrap();
        ckt.add_block("m", small, 1.0, 1.0, PlaceStatus::Unplaced, Orient::N);
        ckt.add_block("blk", big, 0.0, 0.0, PlaceStatus::Fixed, Orient::N);
        let grid = BinGrid::new(&ckt, 1, 1.0);
        let total_ws = grid.lookup_white_space(
            GridBinIndex::new(0, 0),
            GridBinIndex::new(grid.cnt_x - 1, grid.cnt_y - 1),
        );
        assert_eq!(total_ws, 40 * 40 - 40 * 20);
        // bins fully under the macro are all_terminal
        assert!(grid.bins.iter().any(|b| b.all_terminal));
    }
}
