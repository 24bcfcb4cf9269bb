use itertools::Itertools;
use log::debug;

use crate::prelude::*;
use crate::row::GriddedRow;

/// Sliding window width for the permutation search.
const WINDOW: usize = 3;

/// Wirelength-driven local reordering inside each gridded row: every window
/// of three adjacent single-region cells is repacked in the x-order (out of
/// all six permutations) that minimizes the x-span of the touched nets.
pub fn local_reorder_rows(ckt: &mut Circuit, rows: &mut [GriddedRow]) {
    // reverse index: block -> nets
    let mut blk_nets: Vec<Vec<usize>> = vec![Vec::new(); ckt.blocks.len()];
    for (net_id, net) in ckt.nets.iter().enumerate() {
        for pin in &net.pins {
            blk_nets[pin.block].push(net_id);
        }
    }
    for list in blk_nets.iter_mut() {
        list.dedup();
    }

    let mut improved = 0usize;
    for row in rows.iter_mut() {
        row.sort_block_regions(&ckt.blocks);
        let singles: Vec<usize> = row
            .blk_regions
            .iter()
            .filter(|br| br.region_id == 0 && ckt.types[ckt.blocks[br.blk].type_id].region_count() == 1)
            .map(|br| br.blk)
            .collect();
        if singles.len() < WINDOW {
            continue;
        }
        for start in 0..=singles.len() - WINDOW {
            let window = [singles[start], singles[start + 1], singles[start + 2]];
            if reorder_window(ckt, &blk_nets, &window) {
                improved += 1;
            }
        }
    }
    debug!("local reorder improved {improved} windows");
}

/// Try all permutations of the window's blocks over its packed slots; keep
/// the cheapest. Returns whether the order changed.
fn reorder_window(ckt: &mut Circuit, blk_nets: &[Vec<usize>], window: &[usize; 3]) -> bool {
    let left_edge = window
        .iter()
        .map(|&b| ckt.blocks[b].llx)
        .fold(f64::INFINITY, f64::min);

    let mut nets: Vec<usize> = window.iter().flat_map(|&b| blk_nets[b].iter().copied()).collect();
    nets.sort_unstable();
    nets.dedup();
    if nets.is_empty() {
        return false;
    }

    let original: Vec<f64> = window.iter().map(|&b| ckt.blocks[b].llx).collect();
    let mut best_cost = f64::INFINITY;
    let mut best_perm: Option<Vec<usize>> = None;
    for perm in window.iter().copied().permutations(WINDOW) {
        // pack the permutation from the window's left edge
        let mut x = left_edge;
        for &b in &perm {
            ckt.blocks[b].llx = x;
            x += ckt.blocks[b].width as f64;
        }
        let cost: f64 = nets
            .iter()
            .map(|&n| net_span_x(&ckt.nets[n], &ckt.blocks))
            .sum();
        if cost < best_cost {
            best_cost = cost;
            best_perm = Some(perm);
        }
    }

    let perm = best_perm.expect("at least one permutation evaluated");
    let changed = perm != *window;
    let mut x = left_edge;
    for &b in &perm {
        ckt.blocks[b].llx = x;
        x += ckt.blocks[b].width as f64;
    }
    if !changed {
        // identical order may still have shifted: restore exactly
        for (&b, &x0) in window.iter().zip(original.iter()) {
            ckt.blocks[b].llx = x0;
        }
    }
    changed
}

fn net_span_x(net: &Net, blocks: &[Block]) -> f64 {
    if net.pin_count() <= 1 {
        return 0.0;
    }
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for pin in &net.pins {
        let x = pin.abs_x(blocks);
        lo = lo.min(x);
        hi = hi.max(x);
    }
    net.weight * (hi - lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_reorders_toward_fixed_pin() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 100, 20), Tech::default());
        let ty = ckt.add_type(BlockType::new("c", 10, 10)).unwrap();
        let a = ckt.add_block("a", ty, 0.0, 0.0, PlaceStatus::Placed, Orient::N);
        let b = ckt.add_block("b", ty, 10.0, 0.0, PlaceStatus::Placed, Orient::N);
        let c = ckt.add_block("c", ty, 20.0, 0.0, PlaceStatus::Placed, Orient::N);
        let anchor = ckt.add_block("f", ty, 90.0, 0.0, PlaceStatus::Fixed, Orient::N);
        // `a` is pulled right, `c` is pulled left
        ckt.add_net(1.0, vec![(a, V2::new(0.0, 0.0)), (anchor, V2::new(0.0, 0.0))]);
        ckt.add_net(
            1.0,
            vec![(c, V2::new(0.0, 0.0)), (b, V2::new(0.0, 0.0))],
        );

        let mut row = GriddedRow::new(0, 0, 100);
        for id in [a, b, c] {
            row.blk_regions.push(crate::row::BlockRegion {
                blk: id,
                region_id: 0,
            });
        }
        let mut rows = vec![row];
        local_reorder_rows(&mut ckt, &mut rows);
        // `a` ends up rightmost within the window
        assert!(ckt.blocks[a].llx > ckt.blocks[b].llx);
        assert!(ckt.blocks[a].llx > ckt.blocks[c].llx);
        // window still packs from its original left edge without overlap
        let mut xs: Vec<f64> = [a, b, c].iter().map(|&i| ckt.blocks[i].llx).collect();
        xs.sort_by(|p, q| p.partial_cmp(q).unwrap());
        assert_eq!(xs, vec![0.0, 10.0, 20.0]);
    }
}
