use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::block::{Block, Orient, PlaceStatus};
use crate::block_type::BlockType;
use crate::error::{PlaceError, Result};
use crate::geometry::{Axis, RectI, V2, I};
use crate::net::{Net, NetPin};
use crate::tech::Tech;

/// The in-memory circuit: sole owner of blocks, types, and nets.
///
/// Everything is id-indexed; placement phases receive `&mut Circuit` (or a
/// split borrow of its fields) and never hold references across phases.
#[derive(Clone, Debug, Default)]
pub struct Circuit {
    pub region: RectI,
    /// Microns per placement grid unit, used only for rule conversion.
    pub grid_value_x: f64,
    pub grid_value_y: f64,
    pub tech: Tech,
    pub types: Vec<BlockType>,
    pub blocks: Vec<Block>,
    pub nets: Vec<Net>,
    type_name_map: FxHashMap<String, usize>,
}

impl Circuit {
    pub fn new(region: RectI, tech: Tech) -> Self {
        Circuit {
            region,
            grid_value_x: 1.0,
            grid_value_y: 1.0,
            tech,
            ..Default::default()
        }
    }

    /// Register a cell type. Well descriptions are checked fail-fast here:
    /// a malformed library is corrupt input.
    pub fn add_type(&mut self, ty: BlockType) -> Result<usize> {
        ty.check_legality()?;
        if self.type_name_map.contains_key(&ty.name) {
            return Err(PlaceError::invariant(
                format!("duplicate cell type {}", ty.name),
                "Circuit::add_type",
            ));
        }
        let id = self.types.len();
        self.type_name_map.insert(ty.name.clone(), id);
        self.types.push(ty);
        Ok(id)
    }

    pub fn type_id(&self, name: &str) -> Option<usize> {
        self.type_name_map.get(name).copied()
    }

    pub fn add_block(
        &mut self,
        name: impl Into<String>,
        type_id: usize,
        llx: f64,
        lly: f64,
        status: PlaceStatus,
        orient: Orient,
    ) -> usize {
        let ty = &self.types[type_id];
        let id = self.blocks.len();
        self.blocks.push(Block {
            name: name.into(),
            type_id,
            llx,
            lly,
            width: ty.width,
            height: ty.height,
            orient,
            status,
            stretch: SmallVec::new(),
        });
        id
    }

    pub fn add_net(&mut self, weight: f64, pins: Vec<(usize, V2<f64>)>) -> usize {
        let id = self.nets.len();
        self.nets.push(Net::new(
            pins.into_iter()
                .map(|(block, offset)| NetPin { block, offset })
                .collect(),
            weight,
        ));
        id
    }

    #[inline]
    pub fn block_type(&self, blk: &Block) -> &BlockType {
        &self.types[blk.type_id]
    }

    pub fn fixed_block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_fixed()).count()
    }

    pub fn movable_block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_movable()).count()
    }

    /// Average area of movable blocks.
    pub fn ave_mov_block_area(&self) -> f64 {
        let (sum, cnt) = self
            .blocks
            .iter()
            .filter(|b| b.is_movable())
            .fold((0u64, 0usize), |(s, c), b| (s + b.area(), c + 1));
        if cnt == 0 {
            0.0
        } else {
            sum as f64 / cnt as f64
        }
    }

    pub fn ave_block_height(&self) -> f64 {
        let (sum, cnt) = self
            .blocks
            .iter()
            .fold((0i64, 0usize), |(s, c), b| (s + b.height as i64, c + 1));
        if cnt == 0 {
            0.0
        } else {
            sum as f64 / cnt as f64
        }
    }

    pub fn ave_block_width(&self) -> f64 {
        let (sum, cnt) = self
            .blocks
            .iter()
            .fold((0i64, 0usize), |(s, c), b| (s + b.width as i64, c + 1));
        if cnt == 0 {
            0.0
        } else {
            sum as f64 / cnt as f64
        }
    }

    pub fn total_movable_area(&self) -> u64 {
        self.blocks
            .iter()
            .filter(|b| b.is_movable())
            .map(|b| b.area())
            .sum()
    }

    pub fn min_block_width(&self) -> I {
        self.blocks
            .iter()
            .filter(|b| b.is_movable())
            .map(|b| b.width)
            .min()
            .unwrap_or(1)
            .max(1)
    }

    pub fn min_block_height(&self) -> I {
        self.blocks
            .iter()
            .filter(|b| b.is_movable())
            .map(|b| b.height)
            .min()
            .unwrap_or(1)
            .max(1)
    }

    /// Refresh every net's cached extreme pins on one axis.
    pub fn update_net_extremes(&mut self, axis: Axis) {
        let blocks = &self.blocks;
        for net in self.nets.iter_mut() {
            net.update_extremes(blocks, axis);
        }
    }

    /// Weighted HPWL on one axis. Refreshes the extreme-pin caches.
    pub fn weighted_hpwl_axis(&mut self, axis: Axis) -> f64 {
        self.update_net_extremes(axis);
        let blocks = &self.blocks;
        self.nets
            .iter()
            .map(|net| net.weight * net.span(blocks, axis))
            .sum()
    }

    pub fn weighted_hpwl(&mut self) -> f64 {
        self.weighted_hpwl_axis(Axis::X) + self.weighted_hpwl_axis(Axis::Y)
    }

    /// Split borrow for callers that refresh net caches while reading blocks.
    pub fn blocks_and_nets_mut(&mut self) -> (&[Block], &mut [Net]) {
        let Circuit { blocks, nets, .. } = self;
        (blocks, nets)
    }

    /// Promote all movable blocks to `Placed`, done at the end of a phase.
    pub fn update_movable_status(&mut self) {
        for blk in self.blocks.iter_mut() {
            if blk.status == PlaceStatus::Unplaced {
                blk.status = PlaceStatus::Placed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_circuit() -> Circuit {
        let mut ckt = Circuit::new(RectI::new(0, 0, 100, 100), Tech::default());
        let ty = ckt.add_type(BlockType::new("cell", 10, 10)).unwrap();
        ckt.add_block("a", ty, 0.0, 0.0, PlaceStatus::Unplaced, Orient::N);
        ckt.add_block("b", ty, 50.0, 20.0, PlaceStatus::Unplaced, Orient::N);
        ckt.add_net(
            1.0,
            vec![(0, V2::new(5.0, 5.0)), (1, V2::new(5.0, 5.0))],
        );
        ckt
    }

    #[test]
    fn hpwl_of_two_blocks() {
        let mut ckt = tiny_circuit();
        assert_eq!(ckt.weighted_hpwl_axis(Axis::X), 50.0);
        assert_eq!(ckt.weighted_hpwl_axis(Axis::Y), 20.0);
        assert_eq!(ckt.weighted_hpwl(), 70.0);
    }

    #[test]
    fn duplicate_type_rejected() {
        let mut ckt = tiny_circuit();
        assert!(ckt.add_type(BlockType::new("cell", 1, 1)).is_err());
    }

    #[test]
    fn averages() {
        let ckt = tiny_circuit();
        assert_eq!(ckt.ave_mov_block_area(), 100.0);
        assert_eq!(ckt.min_block_width(), 10);
        assert_eq!(ckt.total_movable_area(), 200);
    }
}
