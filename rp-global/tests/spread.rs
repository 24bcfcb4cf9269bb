//! Overfill detection and recursive bisection over a literal 4x4 bin grid.

use rp_global::{find_box_for_cluster, recursive_bisection, BinGrid, GridBinIndex};
use rp_types::{BlockType, Circuit, Orient, PlaceStatus, RectI, Tech};

/// Five 6x5 cells (total area 150 = 1.5x bin area) stacked inside bin (2, 2)
/// of a 4x4 grid of 10x10 bins.
fn overfilled_circuit() -> Circuit {
    let mut ckt = Circuit::new(RectI::new(0, 0, 40, 40), Tech::default());
    let ty = ckt.add_type(BlockType::new("c", 6, 5)).unwrap();
    for i in 0..5 {
        ckt.add_block(
            format!("c{i}"),
            ty,
            22.0,
            22.0,
            PlaceStatus::Unplaced,
            Orient::N,
        );
    }
    ckt
}

#[test]
fn overfilled_bin_spreads_into_expanded_window() {
    let ckt = overfilled_circuit();
    // cells_per_bin = 3 at 90% density gives 10x10 bins
    let mut grid = BinGrid::new(&ckt, 3, 0.9);
    assert_eq!((grid.cnt_x, grid.cnt_y), (4, 4));
    assert_eq!(grid.bin_width, 10);

    grid.update_state(&ckt);
    let the_bin = grid.bin(GridBinIndex::new(2, 2));
    assert!(the_bin.over_fill);
    assert_eq!(the_bin.cells.len(), 5);
    assert_eq!(the_bin.cell_area, 150);

    let clusters = grid.cluster_overfilled(1000);
    assert_eq!(clusters.len(), 1);

    let mut blocks = ckt.blocks.clone();
    let bx = find_box_for_cluster(&mut grid, &blocks, &clusters[0], 0.9).unwrap();
    assert!(
        bx.total_white_space >= bx.total_cell_area,
        "window expansion stopped before it held the cell area"
    );
    let (left, bottom, right, top) = (bx.left, bx.bottom, bx.right, bx.top);
    let cells = bx.cells.clone();
    assert_eq!(cells.len(), 5);

    recursive_bisection(&grid, &mut blocks, bx);

    // every cell of the cluster ends up inside the window
    for &c in &cells {
        let blk = &blocks[c];
        assert!(blk.center_x() >= left as f64 && blk.center_x() <= right as f64);
        assert!(blk.center_y() >= bottom as f64 && blk.center_y() <= top as f64);
    }
    // and they are declustered, no two cells share a center
    let mut centers: Vec<(i64, i64)> = cells
        .iter()
        .map(|&c| {
            (
                (blocks[c].center_x() * 1000.0) as i64,
                (blocks[c].center_y() * 1000.0) as i64,
            )
        })
        .collect();
    centers.sort_unstable();
    centers.dedup();
    assert_eq!(centers.len(), 5);
}

#[test]
fn spread_bins_are_excluded_from_reclustering() {
    let mut ckt = overfilled_circuit();
    let mut grid = BinGrid::new(&ckt, 3, 0.9);
    grid.update_state(&ckt);
    let mut clusters = grid.cluster_overfilled(1000);

    let cluster = clusters.remove(0);
    let bx = find_box_for_cluster(&mut grid, &ckt.blocks, &cluster, 0.9).unwrap();
    recursive_bisection(&grid, &mut ckt.blocks, bx);

    // the window is marked as spread: even bins that still look dense are
    // not flagged again within this pass
    grid.update_state(&ckt);
    assert!(grid.cluster_overfilled(1000).is_empty());
}
