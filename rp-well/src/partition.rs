use clap::ValueEnum;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::prelude::*;
use crate::stripe::Stripe;

/// What the rightmost column does with the leftover region width.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum StripeMode {
    /// Trim to the common column width.
    #[default]
    Strict,
    /// Extend to the region boundary.
    Scavenge,
}

/// Well rules converted to grid units.
#[derive(Clone, Copy, Debug, Default)]
pub struct WellParams {
    pub well_spacing: I,
    pub max_plug_len: I,
}

impl WellParams {
    /// Spacings round up, the plug distance rounds down: rules must never
    /// be violated by the unit conversion.
    pub fn from_tech(tech: &Tech, grid_value_x: f64) -> Result<Self> {
        let layer = &tech.n_well;
        if layer.max_plug_dist <= 0.0 {
            return Err(PlaceError::config(
                "technology has no N-well max plug distance",
            ));
        }
        let same = (layer.spacing / grid_value_x).ceil() as I;
        let opposite = (layer.opposite_spacing / grid_value_x).ceil() as I;
        Ok(WellParams {
            well_spacing: max(same, opposite),
            max_plug_len: (layer.max_plug_dist / grid_value_x).floor() as I,
        })
    }
}

/// A column of the region, holding its per-row white space and the stripes
/// carved out of it.
#[derive(Clone, Debug, Default)]
pub struct ClusterColumn {
    pub lx: I,
    pub width: I,
    /// White space per row restricted to this column's span.
    pub white_space: Vec<Vec<SegI>>,
    pub stripes: Vec<Stripe>,
    pub block_count: usize,
}

impl ClusterColumn {
    #[inline]
    pub fn urx(&self) -> I {
        self.lx + self.width
    }

    /// The stripe closest to a point among this column's stripes.
    fn closest_stripe(&self, x: f64, y: f64) -> Option<(usize, f64)> {
        self.stripes
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.distance_to(x, y)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
    }
}

/// Carve the region into columns and stripes, then assign every movable
/// block to its closest stripe.
pub struct SpacePartitioner {
    pub mode: StripeMode,
    /// Target stripe width in multiples of the max plug distance.
    pub stripe_width_factor: f64,
    /// Explicit stripe width cap in grid units; overrides the factor.
    pub max_row_width: Option<I>,
}

impl SpacePartitioner {
    pub fn partition(&self, ckt: &Circuit) -> Result<(Vec<ClusterColumn>, WellParams)> {
        let params = WellParams::from_tech(&ckt.tech, ckt.grid_value_x)?;
        let region = ckt.region;
        let row_height = ckt.tech.row_height;
        let min_blk_width = ckt.min_block_width();
        let space = RowSpace::detect(ckt, row_height, min_blk_width);

        let max_cell_width = ckt
            .blocks
            .iter()
            .filter(|b| b.is_movable())
            .map(|b| b.width)
            .max()
            .unwrap_or(0);
        info!("max movable cell width: {max_cell_width}");

        let mut stripe_width = match self.max_row_width {
            Some(w) => {
                if w < params.max_plug_len {
                    warn!(
                        "stripe width cap {w} below the max plug distance {}, space is wasted",
                        params.max_plug_len
                    );
                }
                w
            }
            None => (params.max_plug_len as f64 * self.stripe_width_factor).round() as I,
        };
        stripe_width += params.well_spacing;
        let region_width = region.width();
        stripe_width = min(stripe_width, region_width);
        let col_count = max(
            (region_width as f64 / stripe_width as f64).ceil() as usize,
            1,
        );
        stripe_width = region_width / col_count as I;
        info!("cluster columns: {col_count}, width: {stripe_width}");
        if stripe_width <= params.well_spacing {
            return Err(PlaceError::config(
                "well spacing leaves no room inside a stripe column",
            ));
        }
        if stripe_width - params.well_spacing < max_cell_width {
            warn!("maximum cell width exceeds the stripe width");
        }

        let mut columns: Vec<ClusterColumn> = (0..col_count)
            .map(|i| ClusterColumn {
                lx: region.llx + i as I * stripe_width,
                width: stripe_width - params.well_spacing,
                ..Default::default()
            })
            .collect();
        if self.mode == StripeMode::Scavenge {
            let last = columns.last_mut().unwrap();
            last.width = region.urx - last.lx;
        }

        for col in columns.iter_mut() {
            self.update_white_space(col, &space);
            self.decompose_to_stripes(col, ckt, &space, min_blk_width);
        }

        self.assign_blocks(ckt, &mut columns, stripe_width)?;
        Ok((columns, params))
    }

    fn update_white_space(&self, col: &mut ClusterColumn, space: &RowSpace) {
        let span = SegI::new(col.lx, col.urx());
        col.white_space = space
            .rows
            .iter()
            .map(|row| row.iter().filter_map(|seg| span.joint(seg)).collect())
            .collect();
    }

    /// Contiguous runs of rows with identical horizontal span become one
    /// stripe.
    fn decompose_to_stripes(
        &self,
        col: &mut ClusterColumn,
        ckt: &Circuit,
        space: &RowSpace,
        min_blk_width: I,
    ) {
        for i in 0..space.row_count() {
            let y_loc = space.row_to_loc(i);
            for seg_idx in 0..col.white_space[i].len() {
                let seg = col.white_space[i][seg_idx];
                let found = col
                    .stripes
                    .iter()
                    .position(|s| s.ury() == y_loc && s.lx == seg.lo && s.urx() == seg.hi);
                match found {
                    Some(idx) => col.stripes[idx].height += space.row_height,
                    None => col.stripes.push(Stripe {
                        lx: seg.lo,
                        ly: y_loc,
                        width: seg.span(),
                        height: space.row_height,
                        max_blk_capacity_per_row: seg.span() / min_blk_width,
                        is_first_row_orient_n: ckt.tech.is_first_row_orient_n,
                        ..Default::default()
                    }),
                }
            }
        }
    }

    /// Every movable block goes to the closest stripe among its own column
    /// and the two neighbors, by Manhattan distance from the block center.
    fn assign_blocks(
        &self,
        ckt: &Circuit,
        columns: &mut [ClusterColumn],
        stripe_width: I,
    ) -> Result<()> {
        let col_count = columns.len();
        for (id, blk) in ckt.blocks.iter().enumerate() {
            if blk.is_fixed() {
                continue;
            }
            let x = blk.center_x();
            let y = blk.center_y();
            let col_num = (((x - ckt.region.llx as f64) / stripe_width as f64).floor() as isize)
                .clamp(0, col_count as isize - 1) as usize;

            let mut best: Option<(usize, usize, f64)> = None;
            for c in col_num.saturating_sub(1)..min(col_num + 2, col_count) {
                if let Some((s, d)) = columns[c].closest_stripe(x, y) {
                    if best.map_or(true, |(_, _, bd)| d < bd) {
                        best = Some((c, s, d));
                    }
                }
            }
            match best {
                Some((c, s, _)) => {
                    columns[c].block_count += 1;
                    columns[c].stripes[s].blocks.push(id);
                }
                None => {
                    return Err(PlaceError::invariant(
                        format!("cannot find a stripe for cell {}", blk.name),
                        "SpacePartitioner::assign_blocks",
                    ))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well_tech() -> Tech {
        Tech {
            row_height: 10,
            n_well: WellLayer {
                max_plug_dist: 50.0,
                spacing: 2.0,
                opposite_spacing: 3.0,
                min_width: 1.0,
                overhang: 1.0,
            },
            p_well: WellLayer {
                max_plug_dist: 50.0,
                spacing: 2.0,
                opposite_spacing: 3.0,
                min_width: 1.0,
                overhang: 1.0,
            },
            ..Default::default()
        }
    }

    fn partitioner() -> SpacePartitioner {
        SpacePartitioner {
            mode: StripeMode::Strict,
            stripe_width_factor: 2.0,
            max_row_width: None,
        }
    }

    #[test]
    fn well_params_round_conservatively() {
        let tech = well_tech();
        let p = WellParams::from_tech(&tech, 0.9).unwrap();
        assert_eq!(p.well_spacing, 4); // ceil(3 / 0.9)
        assert_eq!(p.max_plug_len, 55); // floor(50 / 0.9)
    }

    #[test]
    fn columns_cover_region() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 300, 100), well_tech());
        let ty = ckt.add_type(BlockType::new("c", 5, 10)).unwrap();
        for i in 0..6 {
            ckt.add_block(
                format!("b{i}"),
                ty,
                i as f64 * 45.0,
                20.0,
                PlaceStatus::Unplaced,
                Orient::N,
            );
        }
        let (cols, params) = partitioner().partition(&ckt).unwrap();
        // stripe width = 2 * 50 + 3 = 103 -> 3 columns of 100
        assert_eq!(cols.len(), 3);
        assert_eq!(params.well_spacing, 3);
        for col in &cols {
            assert_eq!(col.width, 100 - 3);
            assert_eq!(col.stripes.len(), 1);
            let s = &col.stripes[0];
            assert_eq!(s.height, 100);
            assert_eq!(s.width, col.width);
        }
        // every movable block is owned by exactly one stripe
        let total: usize = cols
            .iter()
            .flat_map(|c| c.stripes.iter())
            .map(|s| s.blocks.len())
            .sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn scavenge_extends_last_column() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 310, 100), well_tech());
        let ty = ckt.add_type(BlockType::new("c", 5, 10)).unwrap();
        ckt.add_block("b", ty, 10.0, 20.0, PlaceStatus::Unplaced, Orient::N);
        let mut p = partitioner();
        p.mode = StripeMode::Scavenge;
        let (cols, _) = p.partition(&ckt).unwrap();
        assert_eq!(cols.last().unwrap().urx(), 310);
    }

    #[test]
    fn macro_splits_column_into_stripes() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 100, 100), well_tech());
        let ty = ckt.add_type(BlockType::new("c", 5, 10)).unwrap();
        let mac = ckt.add_type(BlockType::new("mac", 100, 20)).unwrap();
        // full-width macro in the vertical middle
        ckt.add_block("m", mac, 0.0, 40.0, PlaceStatus::Fixed, Orient::N);
        ckt.add_block("b", ty, 10.0, 10.0, PlaceStatus::Unplaced, Orient::N);
        let (cols, _) = partitioner().partition(&ckt).unwrap();
        assert_eq!(cols.len(), 1);
        let stripes = &cols[0].stripes;
        assert_eq!(stripes.len(), 2);
        assert_eq!(stripes[0].ly, 0);
        assert_eq!(stripes[0].height, 40);
        assert_eq!(stripes[1].ly, 60);
        assert_eq!(stripes[1].height, 40);
    }
}
