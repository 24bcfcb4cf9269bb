//! End-to-end flows over small hand-built designs: global placement feeding
//! the Tetris legalizer.

use rp_global::{GlobalConfig, GlobalPlacer};
use rp_tetris::{TetrisConfig, TetrisLegalizer};
use rp_types::{BlockType, Circuit, Orient, PlaceStatus, RectI, Tech, V2};

fn tech(row_height: i32) -> Tech {
    Tech {
        row_height,
        ..Default::default()
    }
}

fn assert_no_overlap(ckt: &Circuit) {
    for (i, a) in ckt.blocks.iter().enumerate() {
        for b in ckt.blocks.iter().skip(i + 1) {
            assert!(
                !a.overlaps(b),
                "{} ({}, {}) overlaps {} ({}, {})",
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

#[test]
fn two_connected_cells_end_up_abutted_on_row_zero() {
    let mut ckt = Circuit::new(RectI::new(0, 0, 100, 100), tech(50));
    let ty = ckt.add_type(BlockType::new("c", 30, 30)).unwrap();
    let a = ckt.add_block("a", ty, 10.0, 10.0, PlaceStatus::Unplaced, Orient::N);
    let b = ckt.add_block("b", ty, 60.0, 10.0, PlaceStatus::Unplaced, Orient::N);
    ckt.add_net(1.0, vec![(a, V2::new(0.0, 0.0)), (b, V2::new(0.0, 0.0))]);

    let placer = GlobalPlacer::new(GlobalConfig {
        max_iter: 8,
        keep_init: true,
        ..Default::default()
    });
    placer.place(&mut ckt).unwrap();

    let legalizer = TetrisLegalizer::new(TetrisConfig::default());
    assert!(legalizer.legalize(&mut ckt).unwrap());

    assert_no_overlap(&ckt);
    assert_eq!(ckt.blocks[a].lly, 0.0, "block a not on row 0");
    assert_eq!(ckt.blocks[b].lly, 0.0, "block b not on row 0");
    let (left, right) = if ckt.blocks[a].llx <= ckt.blocks[b].llx {
        (a, b)
    } else {
        (b, a)
    };
    assert_eq!(
        ckt.blocks[left].urx(),
        ckt.blocks[right].llx,
        "blocks are not abutted"
    );
    assert_eq!(ckt.weighted_hpwl(), 30.0);
}

#[test]
fn stacked_netless_cells_tile_after_the_full_flow() {
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

    let placer = GlobalPlacer::new(GlobalConfig {
        keep_init: true,
        ..Default::default()
    });
    placer.place(&mut ckt).unwrap();

    let legalizer = TetrisLegalizer::new(TetrisConfig::default());
    assert!(legalizer.legalize(&mut ckt).unwrap());
    assert_no_overlap(&ckt);
    let mut xs: Vec<f64> = ckt.blocks.iter().map(|b| b.llx).collect();
    xs.sort_by(|p, q| p.partial_cmp(q).unwrap());
    assert_eq!(xs, vec![0.0, 50.0, 100.0, 150.0]);
    assert!(ckt.blocks.iter().all(|b| b.lly == 0.0));
    assert_eq!(ckt.weighted_hpwl(), 0.0);
}

#[test]
fn cells_spread_out_of_a_macro_after_global_and_tetris() {
    let mut ckt = Circuit::new(RectI::new(0, 0, 300, 200), tech(100));
    let cell = ckt.add_type(BlockType::new("c", 50, 50)).unwrap();
    let mac = ckt.add_type(BlockType::new("mac", 100, 100)).unwrap();
    let mac_id = ckt.add_block("m", mac, 100.0, 0.0, PlaceStatus::Fixed, Orient::N);
    for i in 0..4 {
        // centered at the macro center
        ckt.add_block(
            format!("c{i}"),
            cell,
            125.0,
            25.0,
            PlaceStatus::Unplaced,
            Orient::N,
        );
    }

    let placer = GlobalPlacer::new(GlobalConfig {
        max_iter: 6,
        keep_init: true,
        ..Default::default()
    });
    placer.place(&mut ckt).unwrap();

    let legalizer = TetrisLegalizer::new(TetrisConfig::default());
    assert!(legalizer.legalize(&mut ckt).unwrap());
    assert_no_overlap(&ckt);

    let mac_blk = ckt.blocks[mac_id].clone();
    for blk in ckt.blocks.iter().filter(|b| b.is_movable()) {
        assert!(
            !blk.overlaps(&mac_blk),
            "{} at ({}, {}) sits on the macro",
            blk.name,
            blk.llx,
            blk.lly
        );
        assert!(blk.lly == 0.0 || blk.lly == 100.0);
        assert!(blk.llx >= 0.0 && blk.urx() <= 300.0);
    }
}

#[test]
fn deterministic_given_the_same_seed() {
    let build = || {
        let mut ckt = Circuit::new(RectI::new(0, 0, 400, 200), tech(50));
        let ty = ckt.add_type(BlockType::new("c", 20, 50)).unwrap();
        for i in 0..12 {
            ckt.add_block(
                format!("c{i}"),
                ty,
                0.0,
                0.0,
                PlaceStatus::Unplaced,
                Orient::N,
            );
        }
        for i in 0..11usize {
            ckt.add_net(1.0, vec![(i, V2::new(0.0, 0.0)), (i + 1, V2::new(0.0, 0.0))]);
        }
        ckt
    };

    let run = || {
        let mut ckt = build();
        let placer = GlobalPlacer::new(GlobalConfig {
            max_iter: 5,
            ..Default::default()
        });
        placer.place(&mut ckt).unwrap();
        TetrisLegalizer::new(TetrisConfig::default())
            .legalize(&mut ckt)
            .unwrap();
        ckt.blocks
            .iter()
            .map(|b| (b.llx, b.lly))
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}
