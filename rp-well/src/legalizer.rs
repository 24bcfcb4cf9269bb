use log::{debug, info, warn};
use smallvec::{smallvec, SmallVec};

use crate::config::WellConfig;
use crate::partition::{ClusterColumn, SpacePartitioner};
use crate::prelude::*;
use crate::reorder::local_reorder_rows;
use crate::row::region_heights;
use crate::segment::{minimize_displacement, BlkDispVar};
use crate::stripe::Stripe;
use crate::taps::{insert_end_caps, insert_well_taps};

/// Which cached location slot a save targets.
#[derive(Clone, Copy, Debug)]
enum LocSlot {
    Greedy,
    Consensus,
}

/// Cached per-block locations used across the legalization stages.
#[derive(Clone, Debug, Default)]
pub struct BlkAux {
    pub init: V2<f64>,
    pub greedy: V2<f64>,
    pub consensus: V2<f64>,
    /// One x per region of a multi-region cell; they may disagree until the
    /// consensus pass pulls them together.
    pub sub_locs: SmallVec<[f64; 2]>,
}

/// The well-aware gridded-row legalization driver: partition into stripes,
/// greedy row packing, consensus displacement optimization, then well-tap
/// and end-cap insertion.
pub struct GriddedRowLegalizer {
    pub config: WellConfig,
    /// The columns of the last run, kept for inspection and reporting.
    pub columns: Vec<ClusterColumn>,
}

impl GriddedRowLegalizer {
    pub fn new(config: WellConfig) -> Self {
        GriddedRowLegalizer {
            config,
            columns: Vec::new(),
        }
    }

    pub fn legalize(&mut self, ckt: &mut Circuit) -> Result<bool> {
        self.config.validate()?;
        info!("---------------------------------------");
        info!("start gridded-row well legalization");

        let (seed_p, seed_n, tap_width) = self.tap_seed(ckt)?;

        let partitioner = SpacePartitioner {
            mode: self.config.stripe_mode,
            stripe_width_factor: self.config.stripe_width_factor,
            max_row_width: self
                .config
                .max_row_width
                .map(|w| (w / ckt.grid_value_x).floor() as I),
        };
        let (mut columns, params) = partitioner.partition(ckt)?;

        let mut aux = self.init_aux(ckt);

        let reserved = if self.config.no_well_tap {
            0
        } else {
            2 * (tap_width + self.config.space_to_well_tap)
        };
        let is_success = self.greedy_legalization(ckt, &mut columns, reserved, seed_p, seed_n);
        self.save_locs(ckt, &mut aux, LocSlot::Greedy);
        self.report_displacement(ckt, &aux);
        info!("HPWL after greedy legalization: {:.4e}", ckt.weighted_hpwl());

        if is_success {
            self.consensus(ckt, &mut columns, &mut aux);
            self.save_locs(ckt, &mut aux, LocSlot::Consensus);
            self.report_displacement(ckt, &aux);
            info!("HPWL after consensus: {:.4e}", ckt.weighted_hpwl());

            if self.config.local_reorder {
                for col in columns.iter_mut() {
                    for stripe in col.stripes.iter_mut() {
                        local_reorder_rows(ckt, &mut stripe.rows);
                    }
                }
                info!("HPWL after local reorder: {:.4e}", ckt.weighted_hpwl());
            }

            self.update_stretch(ckt, &columns);

            if !self.config.no_well_tap {
                if let Some(tap_type) = ckt.tech.well_tap_type {
                    let interval = match self.config.tap_interval {
                        Some(um) => (um / ckt.grid_value_x).floor() as I,
                        None => 2 * params.max_plug_len,
                    };
                    insert_well_taps(
                        ckt,
                        &mut columns,
                        tap_type,
                        self.config.checker_board,
                        interval,
                    );
                }
            }
            if self.config.end_caps {
                insert_end_caps(ckt, &mut columns)?;
            }
            info!("gridded-row well legalization complete");
        } else {
            warn!("gridded-row well legalization failed; try a lower placement density");
        }

        ckt.update_movable_status();
        self.columns = columns;
        Ok(is_success)
    }

    /// Tap-cell well heights seed every row so a tap always fits; without a
    /// tap cell the seed is zero.
    fn tap_seed(&self, ckt: &Circuit) -> Result<(I, I, I)> {
        if self.config.no_well_tap {
            return Ok((0, 0, 0));
        }
        match ckt.tech.well_tap_type {
            Some(id) => {
                let ty = &ckt.types[id];
                let well = ty.well.as_ref().ok_or_else(|| {
                    PlaceError::invariant(
                        format!("well-tap type {} has no well description", ty.name),
                        "GriddedRowLegalizer::tap_seed",
                    )
                })?;
                Ok((well.p_height(0, false), well.n_height(0, false), ty.width))
            }
            None => {
                warn!("technology defines no well-tap cell type");
                Ok((0, 0, 0))
            }
        }
    }

    fn init_aux(&self, ckt: &Circuit) -> Vec<BlkAux> {
        ckt.blocks
            .iter()
            .map(|blk| {
                let region_count = ckt.types[blk.type_id].region_count();
                BlkAux {
                    init: V2::new(blk.llx, blk.lly),
                    greedy: V2::new(blk.llx, blk.lly),
                    consensus: V2::new(blk.llx, blk.lly),
                    sub_locs: smallvec![blk.llx; region_count],
                }
            })
            .collect()
    }

    fn save_locs(&self, ckt: &Circuit, aux: &mut [BlkAux], slot: LocSlot) {
        for (a, blk) in aux.iter_mut().zip(ckt.blocks.iter()) {
            let loc = V2::new(blk.llx, blk.lly);
            match slot {
                LocSlot::Greedy => a.greedy = loc,
                LocSlot::Consensus => a.consensus = loc,
            }
        }
    }

    /// Pack every stripe, alternating direction on spill until the retry cap.
    fn greedy_legalization(
        &self,
        ckt: &mut Circuit,
        columns: &mut [ClusterColumn],
        reserved: I,
        seed_p: I,
        seed_n: I,
    ) -> bool {
        let mut res = true;
        for col in columns.iter_mut() {
            for stripe in col.stripes.iter_mut() {
                let mut is_success = false;
                let mut upward = true;
                for it in 0..self.config.max_iter {
                    let packed =
                        stripe.pack(&mut ckt.blocks, &ckt.types, reserved, seed_p, seed_n, upward);
                    is_success = packed && stripe.has_no_rows_spilling_out();
                    upward = !upward;
                    if is_success {
                        debug!(
                            "stripe at ({}, {}) packed in {} tries",
                            stripe.lx,
                            stripe.ly,
                            it + 1
                        );
                        break;
                    }
                }
                res = res && is_success;
            }
        }
        res
    }

    /// Iterative sub-location averaging for multi-region cells, followed by
    /// a final per-segment legalization at the averaged targets.
    fn consensus(&self, ckt: &mut Circuit, columns: &mut [ClusterColumn], aux: &mut [BlkAux]) {
        info!("optimizing displacement with the consensus algorithm");
        for col in columns.iter_mut() {
            for stripe in col.stripes.iter_mut() {
                self.consensus_stripe(ckt, stripe, aux);
            }
        }
    }

    fn consensus_stripe(&self, ckt: &mut Circuit, stripe: &mut Stripe, aux: &mut [BlkAux]) {
        // seed sub-locations from the greedy result
        for row in &stripe.rows {
            for br in &row.blk_regions {
                aux[br.blk].sub_locs[br.region_id] = ckt.blocks[br.blk].llx;
            }
        }

        let avg = |aux: &[BlkAux], blk: usize| -> f64 {
            let subs = &aux[blk].sub_locs;
            subs.iter().sum::<f64>() / subs.len() as f64
        };

        let mut history: Vec<f64> = Vec::new();
        for it in 0..self.config.max_cons_iter {
            // anchored min-displacement per segment, writing sub-locations
            for row in &stripe.rows {
                for seg in &row.segments {
                    let mut vars: Vec<BlkDispVar> = seg
                        .regions
                        .iter()
                        .map(|r| {
                            let mut v = BlkDispVar::new(
                                r.blk,
                                r.region_id,
                                ckt.blocks[r.blk].width,
                                aux[r.blk].init.x,
                                r.weight,
                            );
                            v.set_anchor(avg(aux, r.blk), self.config.cons_lambda);
                            v
                        })
                        .collect();
                    vars.sort_by(|a, b| {
                        a.x0.partial_cmp(&b.x0)
                            .unwrap()
                            .then(a.blk.cmp(&b.blk))
                            .then(a.region_id.cmp(&b.region_id))
                    });
                    minimize_displacement(&mut vars, seg.lx, seg.urx());
                    for v in &vars {
                        aux[v.blk].sub_locs[v.region_id] = v.x;
                    }
                }
            }

            // largest per-cell disagreement across regions
            let mut max_discrepancy: f64 = 0.0;
            for row in &stripe.rows {
                for br in &row.blk_regions {
                    let mean = avg(aux, br.blk);
                    let d = (aux[br.blk].sub_locs[br.region_id] - mean).abs();
                    max_discrepancy = max_discrepancy.max(d);
                }
            }
            history.push(max_discrepancy);
            debug!("consensus iteration {it}: max discrepancy {max_discrepancy:.3}");
            if max_discrepancy < self.config.cons_tolerance {
                break;
            }
            if is_series_oscillate(&history, 3) {
                debug!("consensus oscillation detected");
                break;
            }

            // rebuild segment membership from the new averages
            for row in stripe.rows.iter_mut() {
                reassign_regions(row, ckt, aux, &avg);
            }
        }
        if let Some(residual) = history.last() {
            if *residual >= self.config.cons_tolerance {
                debug!("consensus stopped with residual {residual:.3}");
            }
        }

        // final pass: legalize each segment at the averaged targets and
        // commit the region-0 locations
        for row in &stripe.rows {
            for seg in &row.segments {
                seg.legalize_x(&mut ckt.blocks, |blk, _| avg(aux, blk));
            }
        }
    }

    /// Write back per-region stretch lengths: the extra well height each
    /// region interface needs so the cell's wells abut the row boundaries.
    fn update_stretch(&self, ckt: &mut Circuit, columns: &[ClusterColumn]) {
        // collect each multi-region block's rows, keyed by region
        let mut region_rows: HashMap<usize, Vec<(usize, I, I, I, bool)>> = HashMap::default();
        for col in columns {
            for stripe in &col.stripes {
                for row in &stripe.rows {
                    for br in &row.blk_regions {
                        if ckt.types[ckt.blocks[br.blk].type_id].region_count() > 1 {
                            region_rows.entry(br.blk).or_default().push((
                                br.region_id,
                                row.ly,
                                row.p_well_height,
                                row.n_well_height,
                                row.is_orient_n,
                            ));
                        }
                    }
                }
            }
        }

        let mut ids: Vec<usize> = region_rows.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let mut rows = region_rows.remove(&id).unwrap();
            rows.sort_by_key(|r| r.0);
            let region_count = ckt.types[ckt.blocks[id].type_id].region_count();
            if rows.len() != region_count {
                warn!(
                    "block {} has {} placed regions, expected {region_count}",
                    ckt.blocks[id].name,
                    rows.len()
                );
                continue;
            }
            let base = ckt.blocks[id].lly;
            let flipped = ckt.blocks[id].is_flipped();
            let mut stretch: SmallVec<[I; 2]> = smallvec![0; region_count - 1];
            let mut intrinsic = 0i32;
            let mut used = 0i32;
            for (region_id, ly, p_well, n_well, orient_n) in rows.iter().skip(1).copied() {
                let ty = &ckt.types[ckt.blocks[id].type_id];
                let well = ty.well.as_ref().expect("multi-region cell without wells");
                intrinsic += ty_region_height(ckt, id, region_id - 1);
                let aligned = if orient_n {
                    ly + p_well - well.p_height(region_id, flipped)
                } else {
                    ly + n_well - well.n_height(region_id, flipped)
                };
                let gap = (aligned as f64 - base) as I - intrinsic - used;
                stretch[region_id - 1] = max(gap, 0);
                used += stretch[region_id - 1];
            }
            ckt.blocks[id].stretch = stretch;
        }
    }

    fn report_displacement(&self, ckt: &Circuit, aux: &[BlkAux]) {
        let mut disp_x = 0.0;
        let mut disp_y = 0.0;
        let mut quad_x = 0.0;
        let mut quad_y = 0.0;
        for (a, blk) in aux.iter().zip(ckt.blocks.iter()) {
            if blk.is_fixed() {
                continue;
            }
            let dx = (blk.llx - a.init.x).abs();
            let dy = (blk.lly - a.init.y).abs();
            disp_x += dx;
            disp_y += dy;
            quad_x += dx * dx;
            quad_y += dy * dy;
        }
        disp_x *= ckt.grid_value_x;
        disp_y *= ckt.grid_value_y;
        quad_x *= ckt.grid_value_x * ckt.grid_value_x;
        quad_y *= ckt.grid_value_y * ckt.grid_value_y;
        info!(
            "linear displacement x: {disp_x:.1}, y: {disp_y:.1}, sum: {:.1} um",
            disp_x + disp_y
        );
        info!(
            "quadratic displacement x: {quad_x:.1}, y: {quad_y:.1}, sum: {:.1} um^2",
            quad_x + quad_y
        );
    }
}

fn ty_region_height(ckt: &Circuit, blk: usize, region_id: usize) -> I {
    let (p, n) = region_heights(&ckt.types, &ckt.blocks[blk], region_id);
    p + n
}

/// Reassign every region of the row to the segment closest to its averaged
/// location that still has room.
fn reassign_regions(
    row: &mut crate::row::GriddedRow,
    ckt: &Circuit,
    aux: &[BlkAux],
    avg: &impl Fn(&[BlkAux], usize) -> f64,
) {
    if row.segments.len() <= 1 {
        return;
    }
    let mut segments = row.segments.clone();
    for seg in segments.iter_mut() {
        seg.regions.clear();
        seg.used_size = 0;
    }
    for br in &row.blk_regions {
        let x = avg(aux, br.blk);
        let w = ckt.blocks[br.blk].width;
        let mut best: Option<(usize, f64)> = None;
        for (i, seg) in segments.iter().enumerate() {
            if seg.used_size + w > seg.width {
                continue;
            }
            let d = if x >= seg.lx as f64 && x + w as f64 <= seg.urx() as f64 {
                0.0
            } else {
                (x - seg.lx as f64)
                    .abs()
                    .min((x + w as f64 - seg.urx() as f64).abs())
            };
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }
        match best {
            Some((i, _)) => segments[i].add_region(br.blk, br.region_id, w, 1.0),
            None => {
                if let Some(seg) = segments.first_mut() {
                    seg.add_region(br.blk, br.region_id, w, 1.0);
                }
            }
        }
    }
    row.segments = segments;
}
