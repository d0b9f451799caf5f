//! Streamline tracing with separation enforced by per-family spatial hashes.
//!
//! Major and minor streamlines are traced alternately. Each streamline grows
//! forward and backward from a seed until it leaves the world, hits a
//! degenerate tensor, comes within `dtest` of an existing streamline of the
//! same family, or turns back on itself. Fronts that meet again after
//! separating close the streamline into a loop. After tracing, dangling ends
//! are extended to nearby roads and every streamline is simplified.

use crate::grid_storage::GridStorage;
use crate::integrator::{FieldIntegrator, IntegratorKind};
use citygen_core::error::GenError;
use citygen_core::geometry::{angle_between, simplify};
use citygen_core::params::{param_bool, param_f64, param_string, param_usize};
use citygen_core::{Bounds, Polyline, TensorField, Xorshift64};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_DSEP: f64 = 20.0;
const DEFAULT_DTEST: f64 = 15.0;
const DEFAULT_DSTEP: f64 = 1.0;
const DEFAULT_DCIRCLEJOIN: f64 = 5.0;
const DEFAULT_DLOOKAHEAD: f64 = 40.0;
const DEFAULT_JOIN_ANGLE: f64 = 0.1;
const DEFAULT_PATH_ITERATIONS: usize = 2000;
const DEFAULT_SEED_TRIES: usize = 30;
const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 10.0;
const DEFAULT_COLLIDE_EARLY: f64 = 0.01;

/// Streamlines with fewer points than this are discarded.
const MIN_STREAMLINE_POINTS: usize = 6;

/// Tracing parameters. Lengths are in world units, `join_angle` in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamlineParams {
    /// Minimum separation between streamlines of the same family.
    pub dsep: f64,
    /// Separation enforced while integrating; clamped to `dsep`.
    pub dtest: f64,
    /// Integration step length.
    pub dstep: f64,
    /// Distance at which the forward and backward fronts close a loop.
    pub dcirclejoin: f64,
    /// Search distance when joining dangling ends.
    pub dlookahead: f64,
    pub join_angle: f64,
    /// Ceiling on integration steps per streamline.
    pub path_iterations: usize,
    /// Failed random seeds (or consecutive rejected streamlines) before giving up.
    pub seed_tries: usize,
    pub simplify_tolerance: f64,
    /// Probability that a streamline also stops at the other family.
    pub collide_early: f64,
    pub integrator: IntegratorKind,
    /// Seed the other family from the endpoints of accepted streamlines.
    pub seed_at_endpoints: bool,
}

impl Default for StreamlineParams {
    fn default() -> Self {
        Self {
            dsep: DEFAULT_DSEP,
            dtest: DEFAULT_DTEST,
            dstep: DEFAULT_DSTEP,
            dcirclejoin: DEFAULT_DCIRCLEJOIN,
            dlookahead: DEFAULT_DLOOKAHEAD,
            join_angle: DEFAULT_JOIN_ANGLE,
            path_iterations: DEFAULT_PATH_ITERATIONS,
            seed_tries: DEFAULT_SEED_TRIES,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            collide_early: DEFAULT_COLLIDE_EARLY,
            integrator: IntegratorKind::default(),
            seed_at_endpoints: true,
        }
    }
}

impl StreamlineParams {
    /// Extracts parameters from a JSON object, falling back to defaults.
    /// An unknown integrator name falls back to RK4.
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();
        Self {
            dsep: param_f64(params, "dsep", d.dsep),
            dtest: param_f64(params, "dtest", d.dtest),
            dstep: param_f64(params, "dstep", d.dstep),
            dcirclejoin: param_f64(params, "dcirclejoin", d.dcirclejoin),
            dlookahead: param_f64(params, "dlookahead", d.dlookahead),
            join_angle: param_f64(params, "join_angle", d.join_angle),
            path_iterations: param_usize(params, "path_iterations", d.path_iterations),
            seed_tries: param_usize(params, "seed_tries", d.seed_tries),
            simplify_tolerance: param_f64(params, "simplify_tolerance", d.simplify_tolerance),
            collide_early: param_f64(params, "collide_early", d.collide_early),
            integrator: IntegratorKind::from_name(&param_string(
                params,
                "integrator",
                d.integrator.name(),
            ))
            .unwrap_or_default(),
            seed_at_endpoints: param_bool(params, "seed_at_endpoints", d.seed_at_endpoints),
        }
    }

    pub fn param_schema() -> Value {
        json!({
            "dsep": {"type": "number", "default": DEFAULT_DSEP, "min": 0.1, "max": 500.0,
                "description": "Minimum separation between streamlines of one family"},
            "dtest": {"type": "number", "default": DEFAULT_DTEST, "min": 0.1, "max": 500.0,
                "description": "Separation enforced while integrating (clamped to dsep)"},
            "dstep": {"type": "number", "default": DEFAULT_DSTEP, "min": 0.1, "max": 50.0,
                "description": "Integration step length; must not exceed dsep"},
            "dcirclejoin": {"type": "number", "default": DEFAULT_DCIRCLEJOIN, "min": 0.0, "max": 100.0,
                "description": "Distance at which the two fronts close a loop"},
            "dlookahead": {"type": "number", "default": DEFAULT_DLOOKAHEAD, "min": 0.0, "max": 1000.0,
                "description": "Search distance when joining dangling ends"},
            "join_angle": {"type": "number", "default": DEFAULT_JOIN_ANGLE, "min": 0.0, "max": 3.15,
                "description": "Maximum angle (radians) accepted when joining ends"},
            "path_iterations": {"type": "integer", "default": DEFAULT_PATH_ITERATIONS, "min": 1, "max": 100000,
                "description": "Maximum integration steps per streamline"},
            "seed_tries": {"type": "integer", "default": DEFAULT_SEED_TRIES, "min": 1, "max": 10000,
                "description": "Failed seed samples before generation stops"},
            "simplify_tolerance": {"type": "number", "default": DEFAULT_SIMPLIFY_TOLERANCE, "min": 0.0, "max": 100.0,
                "description": "Polyline simplification tolerance"},
            "collide_early": {"type": "number", "default": DEFAULT_COLLIDE_EARLY, "min": 0.0, "max": 1.0,
                "description": "Probability a streamline also stops at the other family"},
            "integrator": {"type": "string", "default": "rk4", "options": ["euler", "rk4"],
                "description": "Integration scheme"},
            "seed_at_endpoints": {"type": "boolean", "default": true,
                "description": "Seed the other family from streamline endpoints"}
        })
    }

    /// Rejects configurations that cannot trace anything sensible.
    pub fn validate(&self) -> Result<(), GenError> {
        let positive = [("dsep", self.dsep), ("dtest", self.dtest), ("dstep", self.dstep)];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(GenError::InvalidParam {
                    name: name.into(),
                    reason: format!("must be positive, got {value}"),
                });
            }
        }
        if self.dstep > self.dsep {
            return Err(GenError::StepExceedsSeparation {
                dstep: self.dstep,
                dsep: self.dsep,
            });
        }
        if !(0.0..=1.0).contains(&self.collide_early) {
            return Err(GenError::InvalidParam {
                name: "collide_early".into(),
                reason: format!("must be a probability, got {}", self.collide_early),
            });
        }
        Ok(())
    }
}

/// Squared lengths for distance comparisons.
#[derive(Debug, Clone, Copy)]
struct SquaredParams {
    dsep: f64,
    dtest: f64,
    dstep: f64,
    dcirclejoin: f64,
    dlookahead: f64,
}

impl SquaredParams {
    fn new(p: &StreamlineParams) -> Self {
        Self {
            dsep: p.dsep * p.dsep,
            dtest: p.dtest * p.dtest,
            dstep: p.dstep * p.dstep,
            dcirclejoin: p.dcirclejoin * p.dcirclejoin,
            dlookahead: p.dlookahead * p.dlookahead,
        }
    }
}

/// Traced streamlines of both families, raw and simplified.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Streamlines {
    pub major: Vec<Polyline>,
    pub minor: Vec<Polyline>,
    pub major_simple: Vec<Polyline>,
    pub minor_simple: Vec<Polyline>,
}

impl Streamlines {
    pub fn is_empty(&self) -> bool {
        self.major.is_empty() && self.minor.is_empty()
    }

    /// Simplified lines of both families, major first.
    pub fn simple_lines(&self) -> impl Iterator<Item = &Polyline> {
        self.major_simple.iter().chain(self.minor_simple.iter())
    }

    /// Appends another tier's lines after this one's.
    pub fn extend(&mut self, other: Streamlines) {
        self.major.extend(other.major);
        self.minor.extend(other.minor);
        self.major_simple.extend(other.major_simple);
        self.minor_simple.extend(other.minor_simple);
    }
}

/// One growing end of a streamline.
struct Front {
    seed: DVec2,
    original_dir: DVec2,
    points: Vec<DVec2>,
    previous_dir: DVec2,
    previous_point: DVec2,
    valid: bool,
    /// The last point is an unvalidated overshoot.
    overshoot: bool,
}

impl Front {
    fn new(seed: DVec2, dir: DVec2) -> Self {
        Self {
            seed,
            original_dir: dir,
            points: Vec::new(),
            previous_dir: dir,
            previous_point: seed + dir,
            valid: true,
            overshoot: false,
        }
    }

    /// Drops a trailing overshoot so the loop closes on validated points.
    fn trim_overshoot(&mut self) {
        if self.overshoot {
            self.points.pop();
            self.overshoot = false;
        }
    }
}

fn family(major: bool) -> usize {
    if major {
        0
    } else {
        1
    }
}

/// True once a front heading back against its original direction has
/// crossed to the side of the seed line it is turning towards.
pub(crate) fn streamline_turned(seed: DVec2, original_dir: DVec2, point: DVec2, direction: DVec2) -> bool {
    if original_dir.dot(direction) >= 0.0 {
        return false;
    }
    let perpendicular = DVec2::new(original_dir.y, -original_dir.x);
    let is_left = (point - seed).dot(perpendicular) < 0.0;
    let direction_up = direction.dot(perpendicular) > 0.0;
    is_left == direction_up
}

/// Traces major and minor streamlines over a tensor field.
///
/// Each call to [`step`](Self::step) traces at most one streamline, so a
/// caller can interleave generation with other work.
pub struct StreamlineGenerator {
    integrator: Box<dyn FieldIntegrator>,
    bounds: Bounds,
    params: StreamlineParams,
    sq: SquaredParams,
    rng: Xorshift64,
    grids: [GridStorage; 2],
    streamlines: [Vec<Polyline>; 2],
    candidates: [Vec<DVec2>; 2],
    next_major: bool,
    rejected_in_a_row: usize,
    finished: bool,
}

impl StreamlineGenerator {
    /// Fails when `dstep > dsep` or a length is non-positive. `dtest` is
    /// clamped to `dsep`.
    pub fn new(
        field: Arc<TensorField>,
        bounds: Bounds,
        params: StreamlineParams,
        rng: Xorshift64,
    ) -> Result<Self, GenError> {
        params.validate()?;
        let mut params = params;
        params.dtest = params.dtest.min(params.dsep);
        let sq = SquaredParams::new(&params);
        Ok(Self {
            integrator: params.integrator.build(field, params.dstep),
            grids: [
                GridStorage::new(bounds, params.dsep)?,
                GridStorage::new(bounds, params.dsep)?,
            ],
            bounds,
            sq,
            params,
            rng,
            streamlines: [Vec::new(), Vec::new()],
            candidates: [Vec::new(), Vec::new()],
            next_major: true,
            rejected_in_a_row: 0,
            finished: false,
        })
    }

    pub fn params(&self) -> &StreamlineParams {
        &self.params
    }

    pub fn grid(&self, major: bool) -> &GridStorage {
        &self.grids[family(major)]
    }

    pub fn streamlines(&self, major: bool) -> &[Polyline] {
        &self.streamlines[family(major)]
    }

    /// Generator state after everything drawn so far.
    pub fn rng(&self) -> &Xorshift64 {
        &self.rng
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Absorbs both spatial hashes of an earlier generator so that new
    /// streamlines keep their distance from its roads.
    pub fn add_existing(&mut self, other: &StreamlineGenerator) {
        self.grids[0].merge(&other.grids[0]);
        self.grids[1].merge(&other.grids[1]);
    }

    /// Traces one streamline, alternating families.
    ///
    /// Returns `false` once no further seed can be placed.
    pub fn step(&mut self) -> bool {
        if self.finished {
            return false;
        }
        let major = self.next_major;
        if !self.create_streamline(major) {
            self.finished = true;
            return false;
        }
        self.next_major = !major;
        true
    }

    /// Traces streamlines until seeding fails.
    pub fn create_all(&mut self) {
        while self.step() {}
        tracing::info!(
            target: "citygen::streamlines",
            major = self.streamlines[0].len(),
            minor = self.streamlines[1].len(),
            major_samples = self.grids[0].len(),
            minor_samples = self.grids[1].len(),
            "streamlines.create_all.done"
        );
    }

    fn is_valid_sample(&self, major: bool, p: DVec2, d_sq: f64, both: bool) -> bool {
        let f = family(major);
        self.integrator.on_land(p)
            && self.grids[f].is_valid_sample(p, d_sq)
            && (!both || self.grids[1 - f].is_valid_sample(p, d_sq))
    }

    fn find_seed(&mut self, major: bool, both: bool) -> Option<DVec2> {
        let f = family(major);
        if self.params.seed_at_endpoints {
            while let Some(seed) = self.candidates[f].pop() {
                if self.is_valid_sample(major, seed, self.sq.dsep, both) {
                    return Some(seed);
                }
            }
        }

        let mut tries = 0;
        loop {
            let seed = self.rng.next_point(self.bounds.origin, self.bounds.size);
            if self.is_valid_sample(major, seed, self.sq.dsep, both) {
                return Some(seed);
            }
            tries += 1;
            if tries >= self.params.seed_tries {
                tracing::debug!(
                    target: "citygen::streamlines",
                    major,
                    tries,
                    "streamlines.seed.exhausted"
                );
                return None;
            }
        }
    }

    fn create_streamline(&mut self, major: bool) -> bool {
        let collide_both = self.rng.chance(self.params.collide_early);
        let Some(seed) = self.find_seed(major, collide_both) else {
            return false;
        };
        let line = self.integrate_streamline(seed, major, collide_both);

        if line.len() < MIN_STREAMLINE_POINTS {
            self.rejected_in_a_row += 1;
            if self.rejected_in_a_row > self.params.seed_tries {
                tracing::debug!(
                    target: "citygen::streamlines",
                    major,
                    rejected = self.rejected_in_a_row,
                    "streamlines.seed.only_short_lines"
                );
                return false;
            }
            return true;
        }
        self.rejected_in_a_row = 0;
        self.accept(major, line);
        true
    }

    fn accept(&mut self, major: bool, line: Polyline) {
        let f = family(major);
        // Overshoot points were never validated; keep them out of the hash.
        let fresh: Vec<DVec2> = line
            .iter()
            .copied()
            .filter(|&p| self.grids[f].is_valid_sample(p, self.sq.dtest))
            .collect();
        self.grids[f].add_polyline(&fresh);

        let (first, last) = (line[0], line[line.len() - 1]);
        let closed = first == last;
        if self.params.seed_at_endpoints && !closed {
            self.candidates[1 - f].push(first);
            self.candidates[1 - f].push(last);
        }
        tracing::trace!(
            target: "citygen::streamlines",
            major,
            points = line.len(),
            closed,
            "streamlines.accepted"
        );
        self.streamlines[f].push(line);
    }

    fn front_start_valid(&self, p: DVec2, major: bool, both: bool) -> bool {
        self.bounds.contains(p) && self.is_valid_sample(major, p, self.sq.dtest, both)
    }

    fn integrate_streamline(&self, seed: DVec2, major: bool, collide_both: bool) -> Polyline {
        let d = self.integrator.integrate(seed, major);
        let mut forward = Front::new(seed, d);
        forward.points.push(seed);
        let mut backward = Front::new(seed, -d);
        if self.is_degenerate(d) {
            return forward.points;
        }
        forward.valid = self.front_start_valid(forward.previous_point, major, collide_both);
        backward.valid = self.front_start_valid(backward.previous_point, major, collide_both);

        let mut count = 0;
        let mut points_escaped = false;
        while count < self.params.path_iterations && (forward.valid || backward.valid) {
            self.integration_step(&mut forward, major, collide_both);
            self.integration_step(&mut backward, major, collide_both);

            let gap_sq = forward.previous_point.distance_squared(backward.previous_point);
            if !points_escaped && gap_sq > self.sq.dcirclejoin {
                points_escaped = true;
            }
            if points_escaped && gap_sq <= self.sq.dcirclejoin {
                forward.trim_overshoot();
                backward.trim_overshoot();
                forward.points.push(forward.previous_point);
                forward.points.push(backward.previous_point);
                backward.points.push(backward.previous_point);
                break;
            }
            count += 1;
        }

        let mut line = backward.points;
        line.reverse();
        line.extend(forward.points);
        line
    }

    fn is_degenerate(&self, step: DVec2) -> bool {
        step.length_squared() < 0.01 * self.sq.dstep
    }

    fn integration_step(&self, front: &mut Front, major: bool, collide_both: bool) {
        if !front.valid {
            return;
        }
        front.points.push(front.previous_point);
        let mut next_dir = self.integrator.integrate(front.previous_point, major);
        if self.is_degenerate(next_dir) {
            front.valid = false;
            return;
        }
        if next_dir.dot(front.previous_dir) < 0.0 {
            next_dir = -next_dir;
        }
        let next = front.previous_point + next_dir;
        if self.bounds.contains(next)
            && self.is_valid_sample(major, next, self.sq.dtest, collide_both)
            && !streamline_turned(front.seed, front.original_dir, next, next_dir)
        {
            front.previous_point = next;
            front.previous_dir = next_dir;
        } else {
            // Keep the overshoot so the road reaches the obstacle.
            front.points.push(next);
            front.overshoot = true;
            front.valid = false;
        }
    }

    /// Extends every open streamline's ends towards the best nearby sample
    /// of either family. Joined points are added to the hash unchecked.
    pub fn join_dangling(&mut self) {
        let mut joins = 0usize;
        for major in [true, false] {
            let f = family(major);
            for i in 0..self.streamlines[f].len() {
                let line = &self.streamlines[f][i];
                let n = line.len();
                if n < MIN_STREAMLINE_POINTS || line[0] == line[n - 1] {
                    continue;
                }
                let start_ext = self
                    .best_next_point(line[0], line[4])
                    .map(|target| self.points_between(line[0], target))
                    .unwrap_or_default();
                let end_ext = self
                    .best_next_point(line[n - 1], line[n - 5])
                    .map(|target| self.points_between(line[n - 1], target))
                    .unwrap_or_default();
                if start_ext.is_empty() && end_ext.is_empty() {
                    continue;
                }
                joins += usize::from(!start_ext.is_empty()) + usize::from(!end_ext.is_empty());

                let line = &mut self.streamlines[f][i];
                let mut joined: Polyline = start_ext.iter().rev().copied().collect();
                joined.append(line);
                joined.extend(end_ext.iter().copied());
                *line = joined;
                self.grids[f].add_polyline(&start_ext);
                self.grids[f].add_polyline(&end_ext);
            }
        }
        tracing::info!(target: "citygen::streamlines", joins, "streamlines.join_dangling.done");
    }

    fn best_next_point(&self, point: DVec2, previous: DVec2) -> Option<DVec2> {
        let direction = point - previous;
        let mut nearby = self.grids[0].nearby_points(point, self.params.dlookahead);
        nearby.extend(self.grids[1].nearby_points(point, self.params.dlookahead));

        let mut closest: Option<DVec2> = None;
        let mut closest_dist = f64::INFINITY;
        for sample in nearby {
            if sample == point || sample == previous {
                continue;
            }
            let diff = sample - point;
            if diff.dot(direction) < 0.0 {
                continue;
            }
            let dist_sq = diff.length_squared();
            if dist_sq > self.sq.dlookahead {
                continue;
            }
            if dist_sq < 2.0 * self.sq.dstep {
                closest = Some(sample);
                break;
            }
            let angle = angle_between(direction, diff).abs();
            if angle < self.params.join_angle && dist_sq < closest_dist {
                closest_dist = dist_sq;
                closest = Some(sample);
            }
        }
        // Overshoot so the joined road still crosses after simplification.
        closest.map(|s| s + direction.normalize_or_zero() * self.params.simplify_tolerance * 4.0)
    }

    /// Points from `from` (exclusive) to `to` (inclusive) at about `dstep`
    /// spacing, stopping before the first degenerate point.
    fn points_between(&self, from: DVec2, to: DVec2) -> Vec<DVec2> {
        let n = (from.distance(to) / self.params.dstep).floor() as usize;
        let delta = to - from;
        let mut out = Vec::with_capacity(n);
        for i in 1..=n {
            let next = from + delta * (i as f64 / n as f64);
            if self.integrator.integrate(next, true).length_squared() <= 0.001 * self.sq.dstep {
                break;
            }
            out.push(next);
        }
        out
    }

    /// Raw and simplified streamlines of both families.
    pub fn streamline_set(&self) -> Streamlines {
        let tol = self.params.simplify_tolerance;
        let simple = |lines: &[Polyline]| -> Vec<Polyline> {
            lines.iter().map(|l| simplify(l, tol)).collect()
        };
        Streamlines {
            major_simple: simple(&self.streamlines[0]),
            minor_simple: simple(&self.streamlines[1]),
            major: self.streamlines[0].clone(),
            minor: self.streamlines[1].clone(),
        }
    }

    pub fn finish(self) -> Streamlines {
        self.streamline_set()
    }
}
