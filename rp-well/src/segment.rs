use crate::prelude::*;

/// One block-region's variables for minimum-displacement legalization.
#[derive(Clone, Copy, Debug)]
pub struct BlkDispVar {
    /// Block width.
    pub w: I,
    /// Target location; anchors are folded into this.
    pub x0: f64,
    /// Weight of the target location.
    pub e: f64,
    /// Final location after solving.
    pub x: f64,
    /// Owning block and region.
    pub blk: usize,
    pub region_id: usize,
}

impl BlkDispVar {
    pub fn new(blk: usize, region_id: usize, w: I, x0: f64, e: f64) -> Self {
        BlkDispVar {
            w,
            x0,
            e,
            x: x0,
            blk,
            region_id,
        }
    }

    /// Fold an anchor location into the target: the effective target becomes
    /// the weighted mean of the original target and the anchor.
    pub fn set_anchor(&mut self, anchor: f64, anchor_weight: f64) {
        let sum_weight = self.e + anchor_weight;
        self.x0 = (self.e * self.x0 + anchor_weight * anchor) / sum_weight;
        self.e = sum_weight;
    }
}

#[derive(Clone, Copy, Debug)]
struct Cluster {
    /// Weighted target sum `Σ e_i (x0_i - w_before_i)`.
    q: f64,
    /// Total weight.
    e: f64,
    /// Total width.
    w: f64,
    /// Solved position of the cluster's left edge.
    x: f64,
    first: usize,
    last: usize,
}

impl Cluster {
    fn place(&mut self, lower: f64, upper: f64) {
        // left bound wins when the members overfill the range
        self.x = (self.q / self.e).min(upper - self.w).max(lower);
    }
}

/// Minimum weighted-L1/L2-displacement placement of `vars` inside
/// `[lower, upper]` with the blocks kept in their given order.
///
/// The classical cluster-merging sweep: each variable starts its own cluster
/// at its target; clusters that collide merge, and a merged cluster sits at
/// the weighted mean of its members' shifted targets. Optimal for a fixed
/// order and assignment.
pub fn minimize_displacement(vars: &mut [BlkDispVar], lower: I, upper: I) {
    if vars.is_empty() {
        return;
    }
    let (lower, upper) = (lower as f64, upper as f64);
    let mut clusters: Vec<Cluster> = Vec::with_capacity(vars.len());
    for (i, var) in vars.iter().enumerate() {
        let mut cur = Cluster {
            q: var.e * var.x0,
            e: var.e,
            w: var.w as f64,
            x: 0.0,
            first: i,
            last: i,
        };
        cur.place(lower, upper);
        while let Some(prev) = clusters.last() {
            if prev.x + prev.w <= cur.x {
                break;
            }
            let prev = clusters.pop().unwrap();
            // shift the current cluster's targets past the previous one
            let merged_q = prev.q + cur.q - cur.e * prev.w;
            cur = Cluster {
                q: merged_q,
                e: prev.e + cur.e,
                w: prev.w + cur.w,
                x: 0.0,
                first: prev.first,
                last: cur.last,
            };
            cur.place(lower, upper);
        }
        clusters.push(cur);
    }

    for cluster in &clusters {
        let mut x = cluster.x;
        for var in &mut vars[cluster.first..=cluster.last] {
            var.x = x;
            x += var.w as f64;
        }
    }
}

/// A white-space slice of a gridded row: the 1-D legalization domain.
#[derive(Clone, Debug, Default)]
pub struct RowSegment {
    pub lx: I,
    pub width: I,
    pub used_size: I,
    /// `(block, region)` pairs assigned to this segment.
    pub regions: Vec<SegBlockRegion>,
}

/// A block-region plus its target x inside a segment.
#[derive(Clone, Copy, Debug)]
pub struct SegBlockRegion {
    pub blk: usize,
    pub region_id: usize,
    /// Weight used when pinning generated cells (taps, caps) in place.
    pub weight: f64,
}

impl RowSegment {
    pub fn new(lx: I, width: I) -> Self {
        RowSegment {
            lx,
            width,
            ..Default::default()
        }
    }

    #[inline]
    pub fn urx(&self) -> I {
        self.lx + self.width
    }

    pub fn add_region(&mut self, blk: usize, region_id: usize, width: I, weight: f64) {
        self.regions.push(SegBlockRegion {
            blk,
            region_id,
            weight,
        });
        self.used_size += width;
    }

    /// Build displacement variables from the given per-block targets, sorted
    /// by target location with id tie-breaks.
    pub fn build_vars(&self, blocks: &[Block], target: impl Fn(usize, usize) -> f64) -> Vec<BlkDispVar> {
        let mut vars: Vec<BlkDispVar> = self
            .regions
            .iter()
            .map(|r| BlkDispVar::new(r.blk, r.region_id, blocks[r.blk].width, target(r.blk, r.region_id), r.weight))
            .collect();
        vars.sort_by(|a, b| {
            a.x0.partial_cmp(&b.x0)
                .unwrap()
                .then(a.blk.cmp(&b.blk))
                .then(a.region_id.cmp(&b.region_id))
        });
        vars
    }

    /// Legalize this segment with the given targets and write the block x
    /// locations for region-0 entries.
    pub fn legalize_x(&self, blocks: &mut [Block], target: impl Fn(usize, usize) -> f64) {
        let mut vars = self.build_vars(blocks, target);
        minimize_displacement(&mut vars, self.lx, self.urx());
        for var in &vars {
            if var.region_id == 0 {
                blocks[var.blk].llx = var.x;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(widths: &[I], targets: &[f64]) -> Vec<BlkDispVar> {
        widths
            .iter()
            .zip(targets)
            .enumerate()
            .map(|(i, (&w, &x0))| BlkDispVar::new(i, 0, w, x0, 1.0))
            .collect()
    }

    #[test]
    fn non_overlapping_vars_stay_put() {
        let mut v = vars(&[10, 10], &[0.0, 50.0]);
        minimize_displacement(&mut v, 0, 100);
        assert_eq!(v[0].x, 0.0);
        assert_eq!(v[1].x, 50.0);
    }

    #[test]
    fn overfilled_cluster_left_packs() {
        // four 30-wide cells at 20, 25, 30, 35 in a 100-wide segment:
        // the merged cluster anchor is negative, so it clamps to the left
        // edge and the cells lay out at 0, 30, 60, 90
        let mut v = vars(&[30, 30, 30, 30], &[20.0, 25.0, 30.0, 35.0]);
        minimize_displacement(&mut v, 0, 100);
        let xs: Vec<f64> = v.iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![0.0, 30.0, 60.0, 90.0]);
    }

    #[test]
    fn merge_respects_weights() {
        // heavy block dominates the merged cluster position
        let mut v = vars(&[10, 10], &[50.0, 50.0]);
        v[0].e = 9.0;
        minimize_displacement(&mut v, 0, 100);
        // cluster target: (9*50 + (50-10)) / 10 = 49
        assert!((v[0].x - 49.0).abs() < 1e-9);
        assert_eq!(v[1].x, v[0].x + 10.0);
    }

    #[test]
    fn anchor_folds_into_target() {
        let mut var = BlkDispVar::new(0, 0, 10, 10.0, 1.0);
        var.set_anchor(30.0, 1.0);
        assert_eq!(var.x0, 20.0);
        assert_eq!(var.e, 2.0);
    }

    #[test]
    fn right_clamp_applies_when_room_exists() {
        let mut v = vars(&[10], &[200.0]);
        minimize_displacement(&mut v, 0, 100);
        assert_eq!(v[0].x, 90.0);
    }
}
