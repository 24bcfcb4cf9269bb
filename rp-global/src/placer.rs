use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, trace};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use rp_solver::{
    add_anchor_springs, build_problem, pcg_solve, weighted_hpwl_at, CsrMatrix, ModelParams,
    NetModel, PairCache, QuadProblem,
};

use crate::box_bin::{find_box_for_cluster, recursive_bisection};
use crate::config::{ConvergenceCriterion, GlobalConfig};
use crate::grid_bin::BinGrid;
use crate::prelude::*;
use crate::stats::{GlobalStats, GlobalTiming};

/// The SimPL/POLAR global placement driver.
pub struct GlobalPlacer {
    pub config: GlobalConfig,
    /// Cooperative cancellation, polled between the lower-bound and
    /// upper-bound phases of each outer iteration.
    pub stop: Option<Arc<AtomicBool>>,
}

/// Per-axis solver workspace. The two axes share no mutable state, so the
/// X and Y solves run on separate workers.
struct AxisWs {
    axis: Axis,
    pos: Vec<f64>,
    anchor: Vec<f64>,
    prob: QuadProblem,
    mat: CsrMatrix,
    pair_cache: Option<PairCache>,
}

impl AxisWs {
    fn new(axis: Axis, ckt: &Circuit, cfg: &GlobalConfig) -> Self {
        let n = ckt.blocks.len();
        let mut prob = QuadProblem::new(n);
        prob.reserve_for(ckt);
        AxisWs {
            axis,
            pos: vec![0.0; n],
            anchor: vec![0.0; n],
            prob,
            mat: CsrMatrix::new(n),
            pair_cache: (cfg.net_model == NetModel::StarHpwl)
                .then(|| PairCache::build(ckt, cfg.ignore_net_threshold)),
        }
    }

    fn load_positions(&mut self, ckt: &Circuit) {
        for (i, blk) in ckt.blocks.iter().enumerate() {
            self.pos[i] = match self.axis {
                Axis::X => blk.llx,
                Axis::Y => blk.lly,
            };
        }
    }
}

impl GlobalPlacer {
    pub fn new(config: GlobalConfig) -> Self {
        GlobalPlacer { config, stop: None }
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed))
    }

    /// Run global placement. Mutates block locations; fixed blocks never
    /// move. Returns per-iteration bound histories and timing.
    pub fn place(&self, ckt: &mut Circuit) -> Result<GlobalStats> {
        self.config.validate()?;
        let cfg = &self.config;
        let mut stats = GlobalStats::default();
        if ckt.blocks.is_empty() {
            return Ok(stats);
        }

        info!("---------------------------------------");
        info!("start global placement");

        let params = self.model_params(ckt);
        self.init_locations(ckt);
        stats.init_hpwl = refresh_and_hpwl(ckt);
        info!("HPWL after initialization: {:.4e}", stats.init_hpwl);

        if ckt.nets.is_empty() {
            info!("net list empty, skipping quadratic placement");
            ckt.update_movable_status();
            return Ok(stats);
        }

        let t_init = Instant::now();
        let mut grid = BinGrid::new(ckt, cfg.cells_per_bin, cfg.target_density);
        stats.timing += GlobalTiming {
            init: t_init.elapsed().as_secs_f32(),
            ..Default::default()
        };

        let mut ws_x = AxisWs::new(Axis::X, ckt, cfg);
        let mut ws_y = AxisWs::new(Axis::Y, ckt, cfg);

        // initial bounds, no anchors
        debug!("0-th iteration");
        let lb = self.quadratic_placement(ckt, &params, &mut ws_x, &mut ws_y, None, &mut stats);
        stats.lower_bound.push(lb);
        let ub = self.look_ahead_legalization(ckt, &mut grid, &mut ws_x, &mut ws_y, &mut stats);
        stats.upper_bound.push(ub);
        info!("It 0: \t{lb:.4e} {ub:.4e}");

        let mut alpha = cfg.anchor_alpha;
        for k in 1..cfg.max_iter {
            debug!("{k}-th iteration");
            let lb = self.quadratic_placement(
                ckt,
                &params,
                &mut ws_x,
                &mut ws_y,
                Some(alpha),
                &mut stats,
            );
            stats.lower_bound.push(lb);
            if self.stop_requested() {
                info!("global placement aborted after iteration {k}");
                break;
            }
            let ub = self.look_ahead_legalization(ckt, &mut grid, &mut ws_x, &mut ws_y, &mut stats);
            stats.upper_bound.push(ub);
            info!("It {k}: \t{lb:.4e} {ub:.4e}");

            alpha *= cfg.anchor_growth;
            if self.is_converged(&stats) {
                info!("iterative look-ahead legalization complete");
                stats.converged = true;
                break;
            }
        }
        stats.iterations = stats.lower_bound.len();

        if cfg.recenter && ckt.fixed_block_count() == 0 {
            check_and_shift(ckt);
        }
        ckt.update_movable_status();
        info!("global placement complete");
        stats.report();
        Ok(stats)
    }

    fn model_params(&self, ckt: &Circuit) -> ModelParams {
        let cfg = &self.config;
        ModelParams {
            width_epsilon: (ckt.ave_block_width() * cfg.epsilon_factor).max(1e-6),
            height_epsilon: (ckt.ave_block_height() * cfg.epsilon_factor).max(1e-6),
            ignore_net_threshold: cfg.ignore_net_threshold,
            center_weight: cfg.center_weight,
            base_weight_factor: cfg.base_weight_factor,
            adjust_weight_factor: cfg.adjust_weight_factor,
            decay_length: (cfg.decay_factor * ckt.ave_block_height()).max(1.0),
        }
    }

    /// Seeded initial spread: uniform over the region, or gathered around
    /// the center when `center_init` is set.
    fn init_locations(&self, ckt: &mut Circuit) {
        if self.config.keep_init {
            return;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let region = ckt.region;
        let w = region.width() as f64;
        let h = region.height() as f64;
        for blk in ckt.blocks.iter_mut() {
            if !blk.is_movable() {
                continue;
            }
            if self.config.center_init {
                let cx = (region.llx + region.urx) as f64 / 2.0;
                let cy = (region.lly + region.ury) as f64 / 2.0;
                blk.set_center_x(cx + w * (rng.gen::<f64>() - 0.5) / 3.0);
                blk.set_center_y(cy + h * (rng.gen::<f64>() - 0.5) / 3.0);
            } else {
                blk.set_center_x(region.llx as f64 + w * rng.gen::<f64>());
                blk.set_center_y(region.lly as f64 + h * rng.gen::<f64>());
            }
        }
        debug!("block location initialization complete");
    }

    /// One lower-bound step: rebuild the net model and run CG rounds per
    /// axis, both axes concurrently. With `alpha`, the previous legalized
    /// positions (held in the workspaces' anchor arrays) pull every block.
    fn quadratic_placement(
        &self,
        ckt: &mut Circuit,
        params: &ModelParams,
        ws_x: &mut AxisWs,
        ws_y: &mut AxisWs,
        alpha: Option<f64>,
        stats: &mut GlobalStats,
    ) -> f64 {
        let t = Instant::now();
        if alpha.is_some() {
            // blocks currently hold legalized positions, anchors the previous
            // solver positions: swap so the solve warm-starts from its own
            // trajectory and is anchored at the legalized result
            for (i, blk) in ckt.blocks.iter_mut().enumerate() {
                std::mem::swap(&mut ws_x.anchor[i], &mut blk.llx);
                std::mem::swap(&mut ws_y.anchor[i], &mut blk.lly);
            }
            trace!("alpha: {}", alpha.unwrap());
        }
        ws_x.load_positions(ckt);
        ws_y.load_positions(ckt);

        let cfg = &self.config;
        let ckt_ref: &Circuit = ckt;
        let (lb_x, lb_y) = rayon::join(
            || optimize_axis(ckt_ref, cfg, params, ws_x, alpha),
            || optimize_axis(ckt_ref, cfg, params, ws_y, alpha),
        );

        self.pull_back_to_region(ckt, ws_x, ws_y);
        debug!("quadratic placement complete");
        stats.timing += GlobalTiming {
            solve: t.elapsed().as_secs_f32(),
            ..Default::default()
        };
        lb_x + lb_y
    }

    /// Clamp solver positions into the region and write them to the blocks.
    fn pull_back_to_region(&self, ckt: &mut Circuit, ws_x: &AxisWs, ws_y: &AxisWs) {
        let region = ckt.region;
        for (i, blk) in ckt.blocks.iter_mut().enumerate() {
            if !blk.is_movable() {
                continue;
            }
            let hi_x = (region.urx - blk.width) as f64;
            let hi_y = (region.ury - blk.eff_height()) as f64;
            blk.llx = ws_x.pos[i].clamp(region.llx as f64, hi_x);
            blk.lly = ws_y.pos[i].clamp(region.lly as f64, hi_y);
        }
    }

    /// One upper-bound step: spread every overfilled cluster through
    /// recursive bisection. Backs up the solver positions as the next
    /// anchors before touching the blocks.
    fn look_ahead_legalization(
        &self,
        ckt: &mut Circuit,
        grid: &mut BinGrid,
        ws_x: &mut AxisWs,
        ws_y: &mut AxisWs,
        stats: &mut GlobalStats,
    ) -> f64 {
        let t = Instant::now();
        for (i, blk) in ckt.blocks.iter().enumerate() {
            ws_x.anchor[i] = blk.llx;
            ws_y.anchor[i] = blk.lly;
        }

        grid.clear_placed_flags();
        grid.update_state(ckt);
        let cap = self.config.cluster_upper_size;
        let mut clusters = grid.cluster_overfilled(cap);
        while !clusters.is_empty() {
            let cluster = clusters.remove(0);
            if let Some(bx) =
                find_box_for_cluster(grid, &ckt.blocks, &cluster, self.config.target_density)
            {
                recursive_bisection(grid, &mut ckt.blocks, bx);
            }
            grid.refresh_clusters(&mut clusters, cap);
        }

        let ub = refresh_and_hpwl(ckt);
        debug!("look-ahead legalization complete");
        stats.timing += GlobalTiming {
            spread: t.elapsed().as_secs_f32(),
            ..Default::default()
        };
        ub
    }

    fn is_converged(&self, stats: &GlobalStats) -> bool {
        let cfg = &self.config;
        let lb = &stats.lower_bound;
        let ub = &stats.upper_bound;
        match cfg.convergence {
            ConvergenceCriterion::Simpl => {
                if lb.len() <= 10 {
                    return false;
                }
                let tenth_gap = ub[9] - lb[9];
                let last_gap = ub.last().unwrap() - lb.last().unwrap();
                let gap_ratio = last_gap / tenth_gap;
                if gap_ratio < 0.1 {
                    true
                } else if gap_ratio < 0.25 {
                    is_series_converge(ub, 3, cfg.simpl_lal_converge_criterion)
                } else {
                    false
                }
            }
            ConvergenceCriterion::Polar => {
                if lb.is_empty() {
                    return false;
                }
                let lower = *lb.last().unwrap();
                let upper = *ub.last().unwrap();
                lower < upper && upper / lower - 1.0 < cfg.polar_converge_criterion
            }
        }
    }
}

fn optimize_axis(
    ckt: &Circuit,
    cfg: &GlobalConfig,
    params: &ModelParams,
    ws: &mut AxisWs,
    alpha: Option<f64>,
) -> f64 {
    let mut history = Vec::new();
    for _ in 0..cfg.b2b_update_max_iter {
        build_problem(
            ckt,
            ws.axis,
            &ws.pos,
            cfg.net_model,
            params,
            ws.pair_cache.as_mut(),
            &mut ws.prob,
        );
        if let Some(a) = alpha {
            add_anchor_springs(ckt, ws.axis, &ws.pos, &ws.anchor, a, params, &mut ws.prob);
        }
        let eval = optimize_quadratic_metric(ckt, cfg, ws);
        history.push(eval);
        if history.len() >= 3 {
            if is_series_converge(&history, 3, cfg.net_model_update_stop_criterion) {
                break;
            }
            if is_series_oscillate(&history, 5) {
                trace!("net model update oscillation detected on {:?}", ws.axis);
                break;
            }
        }
    }
    trace!("optimization summary {:?}: {:?}", ws.axis, history);
    history.last().copied().unwrap_or(0.0)
}

/// Run CG in rounds of `cg_iteration` steps, re-evaluating the weighted HPWL
/// after each round and stopping on convergence or oscillation.
fn optimize_quadratic_metric(ckt: &Circuit, cfg: &GlobalConfig, ws: &mut AxisWs) -> f64 {
    ws.mat.set_from_triplets(&ws.prob.triplets);
    let rounds = max(cfg.cg_iteration_max_num / cfg.cg_iteration, 1);
    let mut eval_history = Vec::new();
    for _ in 0..rounds {
        pcg_solve(
            &ws.mat,
            &ws.prob.rhs,
            &mut ws.pos,
            cfg.cg_iteration,
            cfg.cg_tolerance,
        );
        let eval = weighted_hpwl_at(ckt, &ws.pos, ws.axis);
        eval_history.push(eval);
        if eval_history.len() >= 3 {
            if is_series_converge(&eval_history, 3, cfg.cg_stop_criterion) {
                break;
            }
            if is_series_oscillate(&eval_history, 5) {
                trace!("cg oscillation detected on {:?}", ws.axis);
                break;
            }
        }
    }
    eval_history.last().copied().unwrap_or(0.0)
}

/// Refresh every net's extreme-pin caches (parallel-for over nets) and
/// return the weighted HPWL.
pub fn refresh_and_hpwl(ckt: &mut Circuit) -> f64 {
    let (blocks, nets) = ckt.blocks_and_nets_mut();
    nets.par_iter_mut().for_each(|net| {
        net.update_extremes(blocks, Axis::X);
        net.update_extremes(blocks, Axis::Y);
    });
    let blocks = &ckt.blocks;
    ckt.nets
        .iter()
        .map(|net| net.weight * (net.span(blocks, Axis::X) + net.span(blocks, Axis::Y)))
        .sum()
}

/// When the design has no fixed blocks the whole placement can be shifted
/// freely; move it toward the lower-left so legalization has room to its
/// right.
fn check_and_shift(ckt: &mut Circuit) {
    let mut left_most = f64::INFINITY;
    let mut right_most = f64::NEG_INFINITY;
    let mut bottom_most = f64::INFINITY;
    let mut top_most = f64::NEG_INFINITY;
    for blk in &ckt.blocks {
        left_most = left_most.min(blk.llx);
        right_most = right_most.max(blk.urx());
        bottom_most = bottom_most.min(blk.lly);
        top_most = top_most.max(blk.ury());
    }
    if !left_most.is_finite() {
        return;
    }
    let margin_x = ckt.region.width() as f64 - (right_most - left_most);
    let margin_y = ckt.region.height() as f64 - (top_most - bottom_most);
    let delta_x = ckt.region.llx as f64 + margin_x / 10.0 - left_most;
    let delta_y = ckt.region.lly as f64 + margin_y / 2.0 - bottom_most;
    for blk in ckt.blocks.iter_mut() {
        blk.llx += delta_x;
        blk.lly += delta_y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cell_net_circuit() -> Circuit {
        let mut ckt = Circuit::new(RectI::new(0, 0, 100, 100), Tech::default());
        let ty = ckt.add_type(BlockType::new("c", 30, 30)).unwrap();
        ckt.add_block("a", ty, 10.0, 10.0, PlaceStatus::Unplaced, Orient::N);
        ckt.add_block("b", ty, 60.0, 10.0, PlaceStatus::Unplaced, Orient::N);
        ckt.add_net(1.0, vec![(0, V2::new(0.0, 0.0)), (1, V2::new(0.0, 0.0))]);
        ckt
    }

    #[test]
    fn lower_bound_never_exceeds_upper_bound() {
        let mut ckt = two_cell_net_circuit();
        let placer = GlobalPlacer::new(GlobalConfig {
            max_iter: 8,
            ..Default::default()
        });
        let stats = placer.place(&mut ckt).unwrap();
        assert!(!stats.lower_bound.is_empty());
        for (k, (lb, ub)) in stats
            .lower_bound
            .iter()
            .zip(stats.upper_bound.iter())
            .enumerate()
            .skip(1)
        {
            assert!(
                lb <= &(ub + 1e-6),
                "iteration {k}: lower bound {lb} above upper bound {ub}"
            );
        }
    }

    #[test]
    fn placement_stays_in_region() {
        let mut ckt = two_cell_net_circuit();
        let placer = GlobalPlacer::new(GlobalConfig {
            max_iter: 4,
            ..Default::default()
        });
        placer.place(&mut ckt).unwrap();
        for blk in &ckt.blocks {
            assert!(blk.llx >= 0.0 && blk.urx() <= 100.0);
            assert!(blk.lly >= 0.0 && blk.ury() <= 100.0);
        }
    }

    #[test]
    fn no_nets_is_a_clean_noop() {
        let mut ckt = Circuit::new(RectI::new(0, 0, 200, 100), Tech::default());
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
        let placer = GlobalPlacer::new(GlobalConfig::default());
        let stats = placer.place(&mut ckt).unwrap();
        assert_eq!(stats.iterations, 0);
        // seeded init is deterministic
        let mut ckt2 = Circuit::new(RectI::new(0, 0, 200, 100), Tech::default());
        let ty2 = ckt2.add_type(BlockType::new("c", 50, 50)).unwrap();
        for i in 0..4 {
            ckt2.add_block(
                format!("c{i}"),
                ty2,
                0.0,
                0.0,
                PlaceStatus::Unplaced,
                Orient::N,
            );
        }
        placer.place(&mut ckt2).unwrap();
        for (a, b) in ckt.blocks.iter().zip(ckt2.blocks.iter()) {
            assert_eq!(a.llx, b.llx);
            assert_eq!(a.lly, b.lly);
        }
    }

    #[test]
    fn fixed_blocks_do_not_move() {
        let mut ckt = two_cell_net_circuit();
        let ty = ckt.type_id("c").unwrap();
        ckt.add_block("f", ty, 5.0, 5.0, PlaceStatus::Fixed, Orient::N);
        ckt.add_net(1.0, vec![(1, V2::new(0.0, 0.0)), (2, V2::new(0.0, 0.0))]);
        let placer = GlobalPlacer::new(GlobalConfig {
            max_iter: 4,
            ..Default::default()
        });
        placer.place(&mut ckt).unwrap();
        assert_eq!(ckt.blocks[2].llx, 5.0);
        assert_eq!(ckt.blocks[2].lly, 5.0);
    }
}
