//! Polygon operations used to turn road-graph faces into lots: line slicing,
//! straight-skeleton inward offset and recursive bisection.

use crate::error::GenError;
use crate::geometry::{
    bounding_box, is_simple, perimeter, point_in_polygon, polygon_area, segment_intersection,
    signed_area, Polygon,
};
use crate::prng::Xorshift64;
use glam::DVec2;

/// Crossings closer than this to the previous or first crossing are merged.
const CROSSING_MERGE: f64 = 1e-10;

/// Edges shorter than this are treated as already collapsed.
const COLLAPSE_EPS: f64 = 1e-9;

/// Shape index `A / P²` below which a piece is discarded as a sliver.
/// A 1:4 rectangle sits exactly on the limit.
pub const SLIVER_RATIO: f64 = 0.04;

#[derive(Debug, Clone, Copy)]
struct RingPoint {
    pos: DVec2,
    flag: bool,
    crossing: Option<usize>,
}

fn ring_position(ring: &[RingPoint], crossing: usize) -> Result<usize, GenError> {
    ring.iter()
        .position(|p| p.crossing == Some(crossing))
        .ok_or_else(|| GenError::SliceFailed(format!("crossing {crossing} lost from ring")))
}

/// Index of the next flagged point after `from`, wrapping.
fn next_flagged(ring: &[RingPoint], from: usize) -> Option<usize> {
    let n = ring.len();
    (1..=n).map(|k| (from + k) % n).find(|&i| ring[i].flag)
}

/// Inclusive run of the ring from `from` to `to`, wrapping.
fn ring_span(ring: &[RingPoint], from: usize, to: usize) -> Vec<RingPoint> {
    let n = ring.len();
    let end = if to < from { to + n } else { to };
    (from..=end).map(|i| ring[i % n]).collect()
}

/// Removes consecutive duplicates, including the wrap from last to first.
fn dedup_loop(mut points: Vec<DVec2>) -> Vec<DVec2> {
    points.dedup_by(|a, b| a.distance_squared(*b) <= CROSSING_MERGE * CROSSING_MERGE);
    while points.len() > 1
        && points[0].distance_squared(points[points.len() - 1]) <= CROSSING_MERGE * CROSSING_MERGE
    {
        points.pop();
    }
    points
}

/// Cuts `polygon` along the segment `a→b`.
///
/// Both endpoints of the cut must lie outside the polygon, otherwise the
/// polygon is returned whole; so is a polygon the cut misses or only grazes
/// once. A concave polygon may fall into more than two pieces. Returns
/// `GenError::SliceFailed` when crossings cannot be paired up.
pub fn slice(polygon: &[DVec2], a: DVec2, b: DVec2) -> Result<Vec<Polygon>, GenError> {
    if polygon.len() < 3 {
        return Err(GenError::DegeneratePolygon(format!(
            "cannot slice {} vertices",
            polygon.len()
        )));
    }
    if point_in_polygon(a, polygon) || point_in_polygon(b, polygon) {
        return Ok(vec![polygon.to_vec()]);
    }

    let mut ring: Vec<RingPoint> = polygon
        .iter()
        .map(|&pos| RingPoint {
            pos,
            flag: false,
            crossing: None,
        })
        .collect();
    let mut crossings: Vec<DVec2> = Vec::new();

    let mut i = 0;
    while i < ring.len() {
        let p0 = ring[i].pos;
        let p1 = ring[(i + 1) % ring.len()].pos;
        if let Some(hit) = segment_intersection(a, b, p0, p1, true) {
            let distinct = |q: Option<&DVec2>| q.map_or(true, |q| q.distance(hit.point) > CROSSING_MERGE);
            if distinct(crossings.first()) && distinct(crossings.last()) {
                ring.insert(
                    i + 1,
                    RingPoint {
                        pos: hit.point,
                        flag: true,
                        crossing: Some(crossings.len()),
                    },
                );
                crossings.push(hit.point);
                // Skip the half-edge that starts at the new crossing.
                i += 1;
            }
        }
        i += 1;
    }

    if crossings.len() < 2 {
        return Ok(vec![polygon.to_vec()]);
    }

    let mut order: Vec<usize> = (0..crossings.len()).collect();
    order.sort_by(|&x, &y| a.distance(crossings[x]).total_cmp(&a.distance(crossings[y])));

    let mut pieces: Vec<Polygon> = Vec::new();
    let mut turns: i32 = 0;
    while order.len() >= 2 {
        let (mut c0, mut c1) = (order[0], order[1]);
        let mut ind0 = ring_position(&ring, c0)?;
        let mut ind1 = ring_position(&ring, c1)?;
        let mut solved = next_flagged(&ring, ind0) == Some(ind1);
        if !solved {
            std::mem::swap(&mut c0, &mut c1);
            std::mem::swap(&mut ind0, &mut ind1);
            solved = next_flagged(&ring, ind0) == Some(ind1);
        }

        if solved {
            turns -= 1;
            pieces.push(ring_span(&ring, ind0, ind1).iter().map(|p| p.pos).collect());
            let mut rest = ring_span(&ring, ind1, ind0);
            for p in rest.iter_mut() {
                if p.crossing == Some(c0) || p.crossing == Some(c1) {
                    p.flag = false;
                }
            }
            ring = rest;
            order.drain(0..2);
        } else {
            turns += 1;
            order.reverse();
        }

        if turns > 1 {
            return Err(GenError::SliceFailed(format!(
                "{} crossings left unpaired",
                order.len()
            )));
        }
    }
    if !order.is_empty() {
        return Err(GenError::SliceFailed(format!(
            "odd number of crossings ({})",
            crossings.len()
        )));
    }
    pieces.push(ring.iter().map(|p| p.pos).collect());

    Ok(pieces
        .into_iter()
        .map(dedup_loop)
        .filter(|p| p.len() >= 3)
        .collect())
}

/// Velocity of each vertex when every edge moves inward at unit speed.
///
/// Expects a counter-clockwise loop. Returns `None` if two consecutive edges
/// fold back onto each other, which has no finite bisector.
fn wavefront_velocities(ring: &[DVec2]) -> Option<Vec<DVec2>> {
    let n = ring.len();
    (0..n)
        .map(|i| {
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            let n_in = (ring[i] - prev).normalize_or_zero().perp();
            let n_out = (next - ring[i]).normalize_or_zero().perp();
            let denom = 1.0 + n_in.dot(n_out);
            (denom > 1e-9).then(|| (n_in + n_out) / denom)
        })
        .collect()
}

/// Inward offset by `spacing` following the straight skeleton.
///
/// The wavefront is advanced event by event: whenever an edge shrinks to
/// zero length its two vertices merge and the bisectors are recomputed.
/// Split events are not followed. A block whose offset would pinch into
/// separate pieces is dropped whole, the same as one that collapses, and so
/// is a result that escapes the input.
/// The result is counter-clockwise regardless of input orientation.
pub fn shrink(polygon: &[DVec2], spacing: f64) -> Option<Polygon> {
    let area = signed_area(polygon);
    if polygon.len() < 3 || area == 0.0 || !spacing.is_finite() || spacing < 0.0 {
        return None;
    }
    let mut ring = if area > 0.0 {
        polygon.to_vec()
    } else {
        polygon.iter().rev().copied().collect()
    };
    ring = dedup_loop(ring);
    if spacing == 0.0 {
        return is_simple(&ring).then_some(ring);
    }

    let mut remaining = spacing;
    while remaining > 0.0 {
        if ring.len() < 3 {
            return None;
        }
        let velocities = wavefront_velocities(&ring)?;
        let n = ring.len();

        let mut event: Option<(f64, usize)> = None;
        for i in 0..n {
            let j = (i + 1) % n;
            let edge = ring[j] - ring[i];
            let len = edge.length();
            if len <= COLLAPSE_EPS {
                event = Some((0.0, i));
                break;
            }
            let rate = (velocities[j] - velocities[i]).dot(edge / len);
            if rate < 0.0 {
                let t = len / -rate;
                if event.map_or(true, |(best, _)| t < best) {
                    event = Some((t, i));
                }
            }
        }

        let step = match event {
            Some((t, _)) if t < remaining => t,
            _ => remaining,
        };
        for (p, v) in ring.iter_mut().zip(&velocities) {
            *p += *v * step;
        }
        remaining -= step;

        if let Some((t, i)) = event {
            if t <= step {
                let j = (i + 1) % ring.len();
                ring[i] = (ring[i] + ring[j]) * 0.5;
                ring.remove(j);
            }
        }
    }

    if ring.len() < 3 || signed_area(&ring) <= 0.0 || !is_simple(&ring) {
        return None;
    }
    if ring.iter().any(|&p| !point_in_polygon(p, polygon)) {
        return None;
    }
    Some(ring)
}

/// Recursively bisects `polygon` into lots of roughly `min_area`.
///
/// Each piece is handled from an explicit stack:
/// - area below `0.5 * min_area` or shape index below [`SLIVER_RATIO`]: dropped
/// - area below `2 * min_area`, or `max_depth` cuts deep: kept as a lot
/// - otherwise cut perpendicular to its longest edge at a random fraction in
///   `[0.4, 0.6)` along that edge, and the pieces pushed back.
///
/// Pieces that come out of a cut non-simple are dropped.
pub fn subdivide(
    polygon: &[DVec2],
    min_area: f64,
    max_depth: usize,
    rng: &mut Xorshift64,
) -> Vec<Polygon> {
    let mut lots = Vec::new();
    let mut stack = vec![(polygon.to_vec(), 0usize)];

    while let Some((piece, depth)) = stack.pop() {
        let n = piece.len();
        if n < 3 {
            continue;
        }
        let area = polygon_area(&piece);
        if area < 0.5 * min_area {
            continue;
        }
        let perim = perimeter(&piece);
        if area / (perim * perim) < SLIVER_RATIO {
            continue;
        }
        if area < 2.0 * min_area || depth >= max_depth {
            lots.push(piece);
            continue;
        }

        let mut longest = (piece[0], piece[1]);
        let mut longest_len = 0.0;
        for i in 0..n {
            let (a, b) = (piece[i], piece[(i + 1) % n]);
            let len = a.distance(b);
            if len > longest_len {
                longest_len = len;
                longest = (a, b);
            }
        }

        let t = rng.next_range(0.4, 0.6);
        let (a, b) = longest;
        let pivot = a + (b - a) * t;
        let across = (b - a).perp().normalize_or_zero();
        let (lo, hi) = bounding_box(&piece);
        let reach = (hi - lo).length() + 1.0;

        match slice(&piece, pivot + across * reach, pivot - across * reach) {
            Ok(pieces) if pieces.len() > 1 => {
                for p in pieces.into_iter().rev() {
                    if is_simple(&p) {
                        stack.push((p, depth + 1));
                    } else {
                        tracing::debug!(
                            target: "citygen::polygon",
                            vertices = p.len(),
                            "polygon.subdivide.non_simple_piece"
                        );
                    }
                }
            }
            Ok(_) => lots.push(piece),
            Err(err) => {
                tracing::warn!(
                    target: "citygen::polygon",
                    %err,
                    area,
                    "polygon.subdivide.slice_failed"
                );
            }
        }
    }

    lots
}
