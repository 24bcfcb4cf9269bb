use clap::ValueEnum;
use log::trace;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::matrix::Triplet;
use crate::prelude::*;

/// The quadratic surrogate used to linearize HPWL. Defaults to B2B.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum NetModel {
    /// Bound-to-bound: every pin springs to both extreme pins.
    #[default]
    B2b,
    /// Driver pin springs to every load.
    Star,
    /// A single spring between the two extreme pins.
    Hpwl,
    /// Star form scaled by each pin's span relative to the net span.
    StarHpwl,
}

/// Numeric knobs shared by all net models.
#[derive(Clone, Copy, Debug)]
pub struct ModelParams {
    /// Dividend guard for X-direction spring lengths.
    pub width_epsilon: f64,
    /// Dividend guard for Y-direction spring lengths.
    pub height_epsilon: f64,
    /// Nets with at least this many pins are ignored.
    pub ignore_net_threshold: usize,
    /// Out-of-region blocks are pulled to the region center with weight
    /// `center_weight / sqrt(N)`.
    pub center_weight: f64,
    /// Distance-decay weight adjustment: `base + adjust * (1 - e^(-d/L))`.
    pub base_weight_factor: f64,
    pub adjust_weight_factor: f64,
    /// Decay length `L` in grid units.
    pub decay_length: f64,
}

impl ModelParams {
    #[inline]
    pub fn epsilon(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.width_epsilon,
            Axis::Y => self.height_epsilon,
        }
    }

    #[inline]
    fn weight_adjust(&self, distance: f64) -> f64 {
        self.base_weight_factor
            + self.adjust_weight_factor * (1.0 - (-distance / self.decay_length).exp())
    }
}

/// One axis' linear system in triplet form.
///
/// All builders read block coordinates from a caller-owned position slice
/// rather than the circuit, so the X and Y systems can be built concurrently
/// against the same immutable circuit.
#[derive(Clone, Debug, Default)]
pub struct QuadProblem {
    pub triplets: Vec<Triplet>,
    pub rhs: Vec<f64>,
}

impl QuadProblem {
    pub fn new(n: usize) -> Self {
        QuadProblem {
            triplets: Vec::new(),
            rhs: vec![0.0; n],
        }
    }

    /// Reserve for the worst case: a net of size n contributes
    /// `(2(n-2)+1)*4` entries, and every block may get an anchor spring plus
    /// a center spring.
    pub fn reserve_for(&mut self, ckt: &Circuit) {
        let mut cap = 2 * ckt.blocks.len();
        for net in &ckt.nets {
            let p = net.pin_count();
            if p > 1 {
                cap += ((p.max(2) - 2) * 2 + 1) * 4;
            }
        }
        self.triplets.reserve(cap);
    }

    fn reset(&mut self) {
        self.triplets.clear();
        self.rhs.iter_mut().for_each(|v| *v = 0.0);
    }
}

#[inline]
fn pin_loc(pin: &NetPin, pos: &[f64], axis: Axis) -> f64 {
    pos[pin.block] + pin.offset(axis)
}

/// Indices of the min and max pin of a net at the given positions.
fn net_extremes(net: &Net, pos: &[f64], axis: Axis) -> (usize, usize) {
    let mut min_i = 0;
    let mut max_i = 0;
    let mut min_v = f64::INFINITY;
    let mut max_v = f64::NEG_INFINITY;
    for (i, pin) in net.pins.iter().enumerate() {
        let v = pin_loc(pin, pos, axis);
        if v < min_v {
            min_v = v;
            min_i = i;
        }
        if v > max_v {
            max_v = v;
            max_i = i;
        }
    }
    (min_i, max_i)
}

/// Weighted HPWL at the given positions, one axis.
pub fn weighted_hpwl_at(ckt: &Circuit, pos: &[f64], axis: Axis) -> f64 {
    ckt.nets
        .iter()
        .map(|net| {
            if net.pin_count() <= 1 {
                return 0.0;
            }
            let (min_i, max_i) = net_extremes(net, pos, axis);
            net.weight * (pin_loc(&net.pins[max_i], pos, axis) - pin_loc(&net.pins[min_i], pos, axis))
        })
        .sum()
}

/// Add a spring of stiffness `w` between two pins, folding fixed endpoints
/// into the right-hand side. Fixed-fixed pairs contribute nothing.
#[allow(clippy::too_many_arguments)]
fn connect(
    prob: &mut QuadProblem,
    i_blk: usize,
    i_loc: f64,
    i_off: f64,
    i_mov: bool,
    j_blk: usize,
    j_loc: f64,
    j_off: f64,
    j_mov: bool,
    w: f64,
) {
    if !i_mov && j_mov {
        prob.rhs[j_blk] += (i_loc - j_off) * w;
        prob.triplets.push(Triplet::new(j_blk, j_blk, w));
    } else if i_mov && !j_mov {
        prob.rhs[i_blk] += (j_loc - i_off) * w;
        prob.triplets.push(Triplet::new(i_blk, i_blk, w));
    } else if i_mov && j_mov {
        prob.triplets.push(Triplet::new(i_blk, i_blk, w));
        prob.triplets.push(Triplet::new(j_blk, j_blk, w));
        prob.triplets.push(Triplet::new(i_blk, j_blk, -w));
        prob.triplets.push(Triplet::new(j_blk, i_blk, -w));
        let offset_diff = (j_off - i_off) * w;
        prob.rhs[i_blk] += offset_diff;
        prob.rhs[j_blk] -= offset_diff;
    }
}

/// Fixed blocks pin their row to their position; movable blocks outside the
/// region get a soft spring to the region center.
fn add_boundary_springs(
    ckt: &Circuit,
    axis: Axis,
    pos: &[f64],
    params: &ModelParams,
    prob: &mut QuadProblem,
) {
    let sz = ckt.blocks.len();
    if sz == 0 {
        return;
    }
    let center_weight = params.center_weight / (sz as f64).sqrt();
    let (lo, hi) = match axis {
        Axis::X => (ckt.region.llx, ckt.region.urx),
        Axis::Y => (ckt.region.lly, ckt.region.ury),
    };
    let weight_center = (lo + hi) as f64 / 2.0 * center_weight;

    for (i, blk) in ckt.blocks.iter().enumerate() {
        if blk.is_fixed() {
            prob.triplets.push(Triplet::new(i, i, 1.0));
            prob.rhs[i] = pos[i];
        } else {
            let extent = match axis {
                Axis::X => blk.width as f64,
                Axis::Y => blk.eff_height() as f64,
            };
            if pos[i] < lo as f64 || pos[i] + extent > hi as f64 {
                prob.triplets.push(Triplet::new(i, i, center_weight));
                prob.rhs[i] += weight_center;
            }
        }
    }
}

fn build_b2b(ckt: &Circuit, axis: Axis, pos: &[f64], params: &ModelParams, prob: &mut QuadProblem) {
    let eps = params.epsilon(axis);
    let blocks = &ckt.blocks;
    for net in &ckt.nets {
        let p = net.pin_count();
        if p <= 1 || p >= params.ignore_net_threshold {
            continue;
        }
        let inv_p = net.inv_p;
        let (min_i, max_i) = net_extremes(net, pos, axis);

        let max_pin = &net.pins[max_i];
        let max_blk = max_pin.block;
        let max_loc = pin_loc(max_pin, pos, axis);
        let max_mov = blocks[max_blk].is_movable();
        let max_off = max_pin.offset(axis);

        let min_pin = &net.pins[min_i];
        let min_blk = min_pin.block;
        let min_loc = pin_loc(min_pin, pos, axis);
        let min_mov = blocks[min_blk].is_movable();
        let min_off = min_pin.offset(axis);

        for pin in &net.pins {
            let blk = pin.block;
            let loc = pin_loc(pin, pos, axis);
            let mov = blocks[blk].is_movable();
            let off = pin.offset(axis);

            if blk != max_blk {
                let w = inv_p / ((loc - max_loc).abs() + eps);
                connect(
                    prob, blk, loc, off, mov, max_blk, max_loc, max_off, max_mov, w,
                );
            }
            if blk != max_blk && blk != min_blk {
                let w = inv_p / ((loc - min_loc).abs() + eps);
                connect(
                    prob, blk, loc, off, mov, min_blk, min_loc, min_off, min_mov, w,
                );
            }
        }
    }
}

fn build_star(ckt: &Circuit, axis: Axis, pos: &[f64], params: &ModelParams, prob: &mut QuadProblem) {
    let eps = params.epsilon(axis);
    let blocks = &ckt.blocks;
    for net in &ckt.nets {
        let p = net.pin_count();
        if p <= 1 || p >= params.ignore_net_threshold {
            continue;
        }
        let inv_p = net.inv_p;

        // the 0-th pin of a net is its driver
        let driver = &net.pins[0];
        let d_blk = driver.block;
        let d_loc = pin_loc(driver, pos, axis);
        let d_mov = blocks[d_blk].is_movable();
        let d_off = driver.offset(axis);

        for pin in &net.pins {
            let blk = pin.block;
            if blk == d_blk {
                continue;
            }
            let loc = pin_loc(pin, pos, axis);
            let mov = blocks[blk].is_movable();
            let off = pin.offset(axis);
            let distance = (loc - d_loc).abs();
            let w = inv_p / (distance + eps) * params.weight_adjust(distance);
            connect(prob, blk, loc, off, mov, d_blk, d_loc, d_off, d_mov, w);
        }
    }
}

fn build_hpwl(ckt: &Circuit, axis: Axis, pos: &[f64], params: &ModelParams, prob: &mut QuadProblem) {
    let eps = params.epsilon(axis);
    let blocks = &ckt.blocks;
    for net in &ckt.nets {
        let p = net.pin_count();
        if p <= 1 || p >= params.ignore_net_threshold {
            continue;
        }
        let inv_p = net.inv_p;
        let (min_i, max_i) = net_extremes(net, pos, axis);
        let min_pin = &net.pins[min_i];
        let max_pin = &net.pins[max_i];
        let min_loc = pin_loc(min_pin, pos, axis);
        let max_loc = pin_loc(max_pin, pos, axis);
        let w = inv_p / ((min_loc - max_loc).abs() + eps);
        connect(
            prob,
            min_pin.block,
            min_loc,
            min_pin.offset(axis),
            blocks[min_pin.block].is_movable(),
            max_pin.block,
            max_loc,
            max_pin.offset(axis),
            blocks[max_pin.block].is_movable(),
            w,
        );
    }
}

/// One directed driver→load connection of some net.
#[derive(Clone, Copy, Debug)]
pub struct PairEdge {
    pub net: usize,
    pub driver: usize,
    pub load: usize,
}

/// Accumulators for one unordered block pair. Written by exactly one worker
/// during the parallel pass, then folded into the problem in pair order.
#[derive(Clone, Copy, Debug, Default)]
struct PairAccum {
    e00: f64,
    e01: f64,
    e10: f64,
    e11: f64,
    b0: f64,
    b1: f64,
}

#[derive(Clone, Debug)]
pub struct BlkPair {
    pub blk0: usize,
    pub blk1: usize,
    pub edges: Vec<PairEdge>,
    accum: PairAccum,
}

/// Driver-load pair cache for the star-HPWL model, built once per placement.
#[derive(Clone, Debug, Default)]
pub struct PairCache {
    pub pairs: Vec<BlkPair>,
}

impl PairCache {
    pub fn build(ckt: &Circuit, ignore_net_threshold: usize) -> Self {
        let mut map: HashMap<(usize, usize), usize> = HashMap::default();
        let mut pairs: Vec<BlkPair> = Vec::new();
        for (net_id, net) in ckt.nets.iter().enumerate() {
            let p = net.pin_count();
            if p <= 1 || p >= ignore_net_threshold {
                continue;
            }
            let d_blk = net.pins[0].block;
            for (l, pin) in net.pins.iter().enumerate() {
                if pin.block == d_blk {
                    continue;
                }
                let key = (min(d_blk, pin.block), max(d_blk, pin.block));
                let idx = *map.entry(key).or_insert_with(|| {
                    pairs.push(BlkPair {
                        blk0: key.0,
                        blk1: key.1,
                        edges: Vec::new(),
                        accum: PairAccum::default(),
                    });
                    pairs.len() - 1
                });
                pairs[idx].edges.push(PairEdge {
                    net: net_id,
                    driver: 0,
                    load: l,
                });
            }
        }
        // fold order must not depend on hash-map iteration
        pairs.sort_by_key(|p| (p.blk0, p.blk1));
        PairCache { pairs }
    }
}

fn build_star_hpwl(
    ckt: &Circuit,
    axis: Axis,
    pos: &[f64],
    params: &ModelParams,
    cache: &mut PairCache,
    prob: &mut QuadProblem,
) {
    let eps = params.epsilon(axis);
    let blocks = &ckt.blocks;
    let nets = &ckt.nets;

    // pairs hold disjoint records; each is updated independently
    cache.pairs.par_iter_mut().for_each(|pair| {
        let mut acc = PairAccum::default();
        for edge in &pair.edges {
            let net = &nets[edge.net];
            let driver = &net.pins[edge.driver];
            let load = &net.pins[edge.load];
            let d_blk = driver.block;
            let d_loc = pin_loc(driver, pos, axis);
            let d_mov = blocks[d_blk].is_movable();
            let d_off = driver.offset(axis);
            let l_blk = load.block;
            let l_loc = pin_loc(load, pos, axis);
            let l_mov = blocks[l_blk].is_movable();
            let l_off = load.offset(axis);

            let (min_i, max_i) = net_extremes(net, pos, axis);
            let blk_max = net.pins[max_i].block;
            let loc_max = pin_loc(&net.pins[max_i], pos, axis);
            let blk_min = net.pins[min_i].block;
            let loc_min = pin_loc(&net.pins[min_i], pos, axis);

            let distance = (l_loc - d_loc).abs();
            let mut w = net.inv_p / (distance + eps) * params.weight_adjust(distance);

            // scale by the pin's share of the net span
            let adjust = if d_blk == blk_max {
                (d_loc - l_loc) / (d_loc - loc_min + eps)
            } else if d_blk == blk_min {
                (l_loc - d_loc) / (loc_max - d_loc + eps)
            } else if l_loc > d_loc {
                (l_loc - d_loc) / (loc_max - d_loc + eps)
            } else {
                (d_loc - l_loc) / (d_loc - loc_min + eps)
            };
            w *= adjust;

            if !l_mov && d_mov {
                if d_blk == pair.blk0 {
                    acc.b0 += (l_loc - d_off) * w;
                    acc.e00 += w;
                } else {
                    acc.b1 += (l_loc - d_off) * w;
                    acc.e11 += w;
                }
            } else if l_mov && !d_mov {
                if l_blk == pair.blk0 {
                    acc.b0 += (d_loc - l_off) * w;
                    acc.e00 += w;
                } else {
                    acc.b1 += (d_loc - l_off) * w;
                    acc.e11 += w;
                }
            } else if l_mov && d_mov {
                let offset_diff = (d_off - l_off) * w;
                acc.e00 += w;
                acc.e01 -= w;
                acc.e10 -= w;
                acc.e11 += w;
                if d_blk == pair.blk0 {
                    acc.b0 -= offset_diff;
                    acc.b1 += offset_diff;
                } else {
                    acc.b0 += offset_diff;
                    acc.b1 -= offset_diff;
                }
            }
        }
        pair.accum = acc;
    });

    // deterministic fold in pair order
    for pair in &cache.pairs {
        let a = &pair.accum;
        if a.e00 != 0.0 {
            prob.triplets.push(Triplet::new(pair.blk0, pair.blk0, a.e00));
        }
        if a.e11 != 0.0 {
            prob.triplets.push(Triplet::new(pair.blk1, pair.blk1, a.e11));
        }
        if a.e01 != 0.0 {
            prob.triplets.push(Triplet::new(pair.blk0, pair.blk1, a.e01));
            prob.triplets.push(Triplet::new(pair.blk1, pair.blk0, a.e10));
        }
        prob.rhs[pair.blk0] += a.b0;
        prob.rhs[pair.blk1] += a.b1;
    }
}

/// Build one axis' linear system at the given block positions.
pub fn build_problem(
    ckt: &Circuit,
    axis: Axis,
    pos: &[f64],
    model: NetModel,
    params: &ModelParams,
    pairs: Option<&mut PairCache>,
    prob: &mut QuadProblem,
) {
    prob.reset();
    match model {
        NetModel::B2b => build_b2b(ckt, axis, pos, params, prob),
        NetModel::Star => build_star(ckt, axis, pos, params, prob),
        NetModel::Hpwl => build_hpwl(ckt, axis, pos, params, prob),
        NetModel::StarHpwl => {
            let cache = pairs.expect("star-HPWL model requires a pair cache");
            build_star_hpwl(ckt, axis, pos, params, cache, prob);
        }
    }
    add_boundary_springs(ckt, axis, pos, params, prob);
    trace!("{:?} problem built: {} triplets", axis, prob.triplets.len());
}

/// Add the per-block anchor springs used by the anchored quadratic solves.
/// `anchors` holds the look-ahead-legalized positions for this axis.
pub fn add_anchor_springs(
    ckt: &Circuit,
    axis: Axis,
    pos: &[f64],
    anchors: &[f64],
    alpha: f64,
    params: &ModelParams,
    prob: &mut QuadProblem,
) {
    let eps = params.epsilon(axis);
    for (i, blk) in ckt.blocks.iter().enumerate() {
        if blk.is_fixed() {
            continue;
        }
        let w = alpha / ((pos[i] - anchors[i]).abs() + eps);
        prob.rhs[i] += anchors[i] * w;
        prob.triplets.push(Triplet::new(i, i, w));
    }
}
