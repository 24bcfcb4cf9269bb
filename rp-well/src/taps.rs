use log::info;

use crate::partition::ClusterColumn;
use crate::prelude::*;
use crate::row::GriddedRow;

fn type_well_heights(ty: &BlockType) -> (I, I) {
    match &ty.well {
        Some(well) => (well.p_height(0, false), well.n_height(0, false)),
        None => (ty.height / 2, ty.height - ty.height / 2),
    }
}

/// The y-location that aligns a single-region cell type to a row's well
/// boundary.
fn aligned_y(row: &GriddedRow, ty: &BlockType) -> I {
    let (p, n) = type_well_heights(ty);
    if row.is_orient_n {
        row.ly + row.p_well_height - p
    } else {
        row.ly + row.n_well_height - n
    }
}

/// Re-legalize a row treating the given footprints as blockages, keeping
/// every cell's current location as its target.
fn relegalize_row(ckt: &mut Circuit, row: &mut GriddedRow, footprints: &[SegI]) {
    row.update_segments(&ckt.blocks, footprints);
    let targets: Vec<f64> = ckt.blocks.iter().map(|b| b.llx).collect();
    for seg in &row.segments {
        seg.legalize_x(&mut ckt.blocks, |blk, _| targets[blk]);
    }
}

/// Insert well-tap cells at each stripe's precomputed x-positions, pushing
/// the surrounding cells aside. Returns the number of cells created.
pub fn insert_well_taps(
    ckt: &mut Circuit,
    columns: &mut [ClusterColumn],
    tap_type: usize,
    checker_board: bool,
    interval: I,
) -> usize {
    let tap_width = ckt.types[tap_type].width;
    let mut counter = 0usize;
    for col in columns.iter_mut() {
        for stripe in col.stripes.iter_mut() {
            stripe.precompute_tap_locations(checker_board, interval, tap_width);
            let even = stripe.tap_locs_even.clone();
            let odd = stripe.tap_locs_odd.clone();
            for (k, row) in stripe.rows.iter_mut().enumerate() {
                let locs = if k % 2 == 0 { &even } else { &odd };
                let mut footprints = Vec::with_capacity(locs.len());
                for &loc in locs {
                    if loc.lo < row.lx || loc.hi > row.urx() {
                        continue;
                    }
                    let y = aligned_y(row, &ckt.types[tap_type]);
                    let orient = if row.is_orient_n {
                        Orient::N
                    } else {
                        Orient::FS
                    };
                    let name = format!("__well_tap__{counter}");
                    ckt.add_block(name, tap_type, loc.lo as f64, y as f64, PlaceStatus::Placed, orient);
                    counter += 1;
                    footprints.push(loc);
                }
                relegalize_row(ckt, row, &footprints);
            }
        }
    }
    info!("insertion complete: {counter} well tap cells created");
    counter
}

/// Per unique `(n_well_height, p_well_height)` pair, create pre- and
/// post-end-cap cell types of the technology's minimum widths and plant one
/// at each row's extremes.
pub fn insert_end_caps(ckt: &mut Circuit, columns: &mut [ClusterColumn]) -> Result<usize> {
    let pre_w = max(ckt.tech.pre_end_cap_min_width, 1);
    let post_w = max(ckt.tech.post_end_cap_min_width, 1);

    let mut counter = 0usize;
    for col in columns.iter_mut() {
        for stripe in col.stripes.iter_mut() {
            for row in stripe.rows.iter_mut() {
                let (n_h, p_h) = (row.n_well_height, row.p_well_height);
                let pre_ty = end_cap_type(ckt, "pre", pre_w, n_h, p_h)?;
                let post_ty = end_cap_type(ckt, "post", post_w, n_h, p_h)?;

                let orient = if row.is_orient_n {
                    Orient::N
                } else {
                    Orient::FS
                };
                let y = aligned_y(row, &ckt.types[pre_ty]);
                ckt.add_block(
                    format!("__pre_end_cap__{counter}"),
                    pre_ty,
                    row.lx as f64,
                    y as f64,
                    PlaceStatus::Placed,
                    orient,
                );
                let y = aligned_y(row, &ckt.types[post_ty]);
                ckt.add_block(
                    format!("__post_end_cap__{counter}"),
                    post_ty,
                    (row.urx() - post_w) as f64,
                    y as f64,
                    PlaceStatus::Placed,
                    orient,
                );
                counter += 1;

                let footprints = [
                    SegI::new(row.lx, row.lx + pre_w),
                    SegI::new(row.urx() - post_w, row.urx()),
                ];
                relegalize_row(ckt, row, &footprints);
            }
        }
    }
    info!("insertion complete: {} end cap cells created", counter * 2);
    Ok(counter)
}

/// Find or create the end-cap type for a well-height pair. The type's wells
/// match the row split exactly so it abuts both neighbors.
fn end_cap_type(ckt: &mut Circuit, kind: &str, width: I, n_h: I, p_h: I) -> Result<usize> {
    let name = format!("{kind}_end_cap_n_height_{n_h}_p_height_{p_h}");
    if let Some(id) = ckt.type_id(&name) {
        return Ok(id);
    }
    let mut ty = BlockType::new(name, width, n_h + p_h);
    ty.well = Some(MultiWell {
        p_rects: vec![RectI::new(0, 0, width, p_h)],
        n_rects: vec![RectI::new(0, p_h, width, p_h + n_h)],
    });
    ckt.add_type(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::Stripe;

    fn tap_tech() -> Tech {
        Tech {
            row_height: 10,
            n_well: WellLayer {
                max_plug_dist: 25.0,
                spacing: 1.0,
                opposite_spacing: 1.0,
                min_width: 1.0,
                overhang: 1.0,
            },
            pre_end_cap_min_width: 2,
            post_end_cap_min_width: 2,
            ..Default::default()
        }
    }

    fn setup() -> (Circuit, Vec<ClusterColumn>) {
        let mut ckt = Circuit::new(RectI::new(0, 0, 100, 20), tap_tech());
        let mut tap = BlockType::new("welltap", 4, 9);
        tap.well = Some(MultiWell {
            p_rects: vec![RectI::new(0, 0, 4, 4)],
            n_rects: vec![RectI::new(0, 4, 4, 9)],
        });
        let tap_id = ckt.add_type(tap).unwrap();
        ckt.tech.well_tap_type = Some(tap_id);

        let mut cell = BlockType::new("c", 10, 9);
        cell.well = Some(MultiWell {
            p_rects: vec![RectI::new(0, 0, 10, 4)],
            n_rects: vec![RectI::new(0, 4, 10, 9)],
        });
        let cell_id = ckt.add_type(cell).unwrap();
        for i in 0..3 {
            ckt.add_block(
                format!("b{i}"),
                cell_id,
                (i * 10) as f64,
                0.0,
                PlaceStatus::Placed,
                Orient::N,
            );
        }

        let mut row = GriddedRow::new(0, 0, 100);
        row.p_well_height = 4;
        row.n_well_height = 5;
        for i in 0..3 {
            row.add_block_region(
                &ckt.blocks,
                &ckt.types,
                i,
                0,
            );
        }
        let stripe = Stripe {
            lx: 0,
            ly: 0,
            width: 100,
            height: 20,
            is_first_row_orient_n: true,
            rows: vec![row],
            ..Default::default()
        };
        let col = ClusterColumn {
            lx: 0,
            width: 100,
            stripes: vec![stripe],
            ..Default::default()
        };
        (ckt, vec![col])
    }

    #[test]
    fn taps_land_on_the_grid_and_cells_move_aside() {
        let (mut ckt, mut cols) = setup();
        let tap_type = ckt.tech.well_tap_type.unwrap();
        let created = insert_well_taps(&mut ckt, &mut cols, tap_type, false, 50);
        assert_eq!(created, 2);
        let taps: Vec<&Block> = ckt
            .blocks
            .iter()
            .filter(|b| b.name.starts_with("__well_tap__"))
            .collect();
        assert_eq!(taps[0].llx, 25.0);
        assert_eq!(taps[1].llx, 75.0);
        // consecutive taps no farther apart than the interval
        assert!(taps[1].llx - (taps[0].llx + 4.0) <= 50.0);
        // no cell overlaps a tap
        for tap in &taps {
            for blk in ckt.blocks.iter().filter(|b| b.name.starts_with('b')) {
                assert!(!blk.overlaps(tap), "{} overlaps {}", blk.name, tap.name);
            }
        }
    }

    #[test]
    fn end_caps_at_row_extremes() {
        let (mut ckt, mut cols) = setup();
        let created = insert_end_caps(&mut ckt, &mut cols).unwrap();
        assert_eq!(created, 1);
        let pre = ckt
            .blocks
            .iter()
            .find(|b| b.name.starts_with("__pre_end_cap__"))
            .unwrap();
        let post = ckt
            .blocks
            .iter()
            .find(|b| b.name.starts_with("__post_end_cap__"))
            .unwrap();
        assert_eq!(pre.llx, 0.0);
        assert_eq!(post.llx, 98.0);
        // shared type for equal well splits
        assert_eq!(ckt.types[pre.type_id].height, 9);
    }
}
