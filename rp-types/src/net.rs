use crate::block::Block;
use crate::geometry::{Axis, V2};

/// One endpoint of a net: a block plus the pin offset within it.
#[derive(Clone, Copy, Debug)]
pub struct NetPin {
    pub block: usize,
    pub offset: V2<f64>,
}

impl NetPin {
    #[inline]
    pub fn abs_x(&self, blocks: &[Block]) -> f64 {
        blocks[self.block].llx + self.offset.x
    }

    #[inline]
    pub fn abs_y(&self, blocks: &[Block]) -> f64 {
        blocks[self.block].lly + self.offset.y
    }

    #[inline]
    pub fn abs(&self, blocks: &[Block], axis: Axis) -> f64 {
        match axis {
            Axis::X => self.abs_x(blocks),
            Axis::Y => self.abs_y(blocks),
        }
    }

    #[inline]
    pub fn offset(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.offset.x,
            Axis::Y => self.offset.y,
        }
    }
}

/// A net with its pin list, weight, and cached extreme-pin indices per axis.
#[derive(Clone, Debug)]
pub struct Net {
    pub pins: Vec<NetPin>,
    pub weight: f64,
    /// `1 / (pin_count - 1)`, zero for degenerate nets.
    pub inv_p: f64,
    pub min_pin_x: usize,
    pub max_pin_x: usize,
    pub min_pin_y: usize,
    pub max_pin_y: usize,
}

impl Net {
    pub fn new(pins: Vec<NetPin>, weight: f64) -> Self {
        let p = pins.len();
        let inv_p = if p > 1 { 1.0 / (p - 1) as f64 } else { 0.0 };
        Net {
            pins,
            weight,
            inv_p,
            min_pin_x: 0,
            max_pin_x: 0,
            min_pin_y: 0,
            max_pin_y: 0,
        }
    }

    #[inline]
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    /// Refresh the cached min/max pin index for one axis.
    pub fn update_extremes(&mut self, blocks: &[Block], axis: Axis) {
        let mut min_i = 0;
        let mut max_i = 0;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for (i, pin) in self.pins.iter().enumerate() {
            let v = pin.abs(blocks, axis);
            if v < min_v {
                min_v = v;
                min_i = i;
            }
            if v > max_v {
                max_v = v;
                max_i = i;
            }
        }
        match axis {
            Axis::X => {
                self.min_pin_x = min_i;
                self.max_pin_x = max_i;
            }
            Axis::Y => {
                self.min_pin_y = min_i;
                self.max_pin_y = max_i;
            }
        }
    }

    #[inline]
    pub fn extremes(&self, axis: Axis) -> (usize, usize) {
        match axis {
            Axis::X => (self.min_pin_x, self.max_pin_x),
            Axis::Y => (self.min_pin_y, self.max_pin_y),
        }
    }

    /// Half-perimeter span on one axis, using the cached extremes.
    pub fn span(&self, blocks: &[Block], axis: Axis) -> f64 {
        if self.pins.len() <= 1 {
            return 0.0;
        }
        let (min_i, max_i) = self.extremes(axis);
        self.pins[max_i].abs(blocks, axis) - self.pins[min_i].abs(blocks, axis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Block, Orient, PlaceStatus};
    use smallvec::SmallVec;

    fn blk(llx: f64, lly: f64) -> Block {
        Block {
            name: String::new(),
            type_id: 0,
            llx,
            lly,
            width: 1,
            height: 1,
            orient: Orient::N,
            status: PlaceStatus::Unplaced,
            stretch: SmallVec::new(),
        }
    }

    #[test]
    fn extremes_and_span() {
        let blocks = vec![blk(0.0, 0.0), blk(10.0, 5.0), blk(4.0, 20.0)];
        let mut net = Net::new(
            (0..3)
                .map(|b| NetPin {
                    block: b,
                    offset: V2::new(0.5, 0.5),
                })
                .collect(),
            1.0,
        );
        net.update_extremes(&blocks, Axis::X);
        net.update_extremes(&blocks, Axis::Y);
        assert_eq!(net.extremes(Axis::X), (0, 1));
        assert_eq!(net.extremes(Axis::Y), (0, 2));
        assert_eq!(net.span(&blocks, Axis::X), 10.0);
        assert_eq!(net.span(&blocks, Axis::Y), 20.0);
        assert_eq!(net.inv_p, 0.5);
    }
}
