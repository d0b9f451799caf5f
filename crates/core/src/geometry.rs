//! Planar geometry primitives shared by the field, the streamline tracer and
//! the polygon finder.
//!
//! Points are [`glam::DVec2`]. Polygons are implicit loops: the last vertex
//! connects back to the first and is not repeated.

use crate::error::GenError;
use glam::DVec2;
use serde::{Deserialize, Serialize};

/// An open polyline.
pub type Polyline = Vec<DVec2>;

/// A closed loop of at least three vertices, last vertex not repeated.
pub type Polygon = Vec<DVec2>;

/// Axis-aligned world rectangle. `origin` is the lower corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub origin: DVec2,
    pub size: DVec2,
}

impl Bounds {
    /// Creates bounds, rejecting non-positive or non-finite extents.
    pub fn new(origin: DVec2, size: DVec2) -> Result<Self, GenError> {
        if !origin.is_finite() || !size.is_finite() || size.x <= 0.0 || size.y <= 0.0 {
            return Err(GenError::InvalidDimensions);
        }
        Ok(Self { origin, size })
    }

    /// Upper corner (exclusive).
    pub fn max(&self) -> DVec2 {
        self.origin + self.size
    }

    /// Half-open containment: `origin <= p < origin + size`.
    pub fn contains(&self, p: DVec2) -> bool {
        let max = self.max();
        p.x >= self.origin.x && p.y >= self.origin.y && p.x < max.x && p.y < max.y
    }
}

/// Crossing of two segments `p1→p2` and `q1→q2`.
///
/// `t` is the parameter along the first segment, `u` along the second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentIntersection {
    pub point: DVec2,
    pub t: f64,
    pub u: f64,
}

/// Intersects two segments.
///
/// With `inclusive` the endpoints count (`0 <= t, u <= 1`), otherwise only
/// interior crossings are reported. Parallel and collinear segments never
/// intersect.
pub fn segment_intersection(
    p1: DVec2,
    p2: DVec2,
    q1: DVec2,
    q2: DVec2,
    inclusive: bool,
) -> Option<SegmentIntersection> {
    let r = p2 - p1;
    let s = q2 - q1;
    let denom = r.perp_dot(s);
    if denom.abs() <= f64::EPSILON * r.length() * s.length() {
        return None;
    }
    let qp = q1 - p1;
    let t = qp.perp_dot(s) / denom;
    let u = qp.perp_dot(r) / denom;
    let within = |v: f64| {
        if inclusive {
            (0.0..=1.0).contains(&v)
        } else {
            v > 0.0 && v < 1.0
        }
    };
    if within(t) && within(u) {
        Some(SegmentIntersection {
            point: p1 + r * t,
            t,
            u,
        })
    } else {
        None
    }
}

/// Ray-casting point-in-polygon test. An empty polygon contains nothing.
pub fn point_in_polygon(point: DVec2, polygon: &[DVec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Shoelace area, positive for counter-clockwise loops (y up).
pub fn signed_area(polygon: &[DVec2]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n)
        .map(|i| polygon[i].perp_dot(polygon[(i + 1) % n]))
        .sum();
    twice * 0.5
}

/// Unsigned shoelace area.
pub fn polygon_area(polygon: &[DVec2]) -> f64 {
    signed_area(polygon).abs()
}

/// Closed perimeter of a loop.
pub fn perimeter(polygon: &[DVec2]) -> f64 {
    let n = polygon.len();
    if n < 2 {
        return 0.0;
    }
    (0..n)
        .map(|i| polygon[i].distance(polygon[(i + 1) % n]))
        .sum()
}

/// Vertex average, `(0, 0)` for an empty slice.
pub fn average_point(points: &[DVec2]) -> DVec2 {
    if points.is_empty() {
        return DVec2::ZERO;
    }
    points.iter().copied().sum::<DVec2>() / points.len() as f64
}

/// Axis-aligned bounding box `(min, max)`. Empty input gives `(0, 0)` twice.
pub fn bounding_box(points: &[DVec2]) -> (DVec2, DVec2) {
    let Some(&first) = points.first() else {
        return (DVec2::ZERO, DVec2::ZERO);
    };
    points
        .iter()
        .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)))
}

/// True when the loop has non-zero area and no two non-adjacent edges touch.
pub fn is_simple(polygon: &[DVec2]) -> bool {
    let n = polygon.len();
    if n < 3 || polygon_area(polygon) <= 0.0 {
        return false;
    }
    for i in 0..n {
        let (a1, a2) = (polygon[i], polygon[(i + 1) % n]);
        if a1 == a2 {
            return false;
        }
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                continue;
            }
            let (b1, b2) = (polygon[j], polygon[(j + 1) % n]);
            if segment_intersection(a1, a2, b1, b2, true).is_some() {
                return false;
            }
        }
    }
    true
}

/// Angle in `(-π, π]` that rotates `a` onto `b`.
pub fn angle_between(a: DVec2, b: DVec2) -> f64 {
    a.perp_dot(b).atan2(a.dot(b))
}

/// Squared distance from `p` to the segment `a→b`.
fn segment_distance_squared(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let d = b - a;
    let len_sq = d.length_squared();
    if len_sq == 0.0 {
        return p.distance_squared(a);
    }
    let t = ((p - a).dot(d) / len_sq).clamp(0.0, 1.0);
    p.distance_squared(a + d * t)
}

/// Drops vertices closer than `tolerance` to the last kept vertex. The final
/// vertex is always kept.
fn simplify_radial(points: &[DVec2], tolerance_sq: f64) -> Vec<DVec2> {
    let mut kept = vec![points[0]];
    let mut last_index = 0;
    for (i, &p) in points.iter().enumerate().skip(1) {
        if p.distance_squared(points[last_index]) > tolerance_sq {
            kept.push(p);
            last_index = i;
        }
    }
    if last_index != points.len() - 1 {
        kept.push(points[points.len() - 1]);
    }
    kept
}

/// Douglas–Peucker with an explicit range stack.
fn simplify_douglas_peucker(points: &[DVec2], tolerance_sq: f64) -> Vec<DVec2> {
    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;
    let mut ranges = vec![(0, last)];
    while let Some((first, end)) = ranges.pop() {
        let mut max_dist = tolerance_sq;
        let mut index = None;
        for i in (first + 1)..end {
            let d = segment_distance_squared(points[i], points[first], points[end]);
            if d > max_dist {
                max_dist = d;
                index = Some(i);
            }
        }
        if let Some(i) = index {
            keep[i] = true;
            if i - first > 1 {
                ranges.push((first, i));
            }
            if end - i > 1 {
                ranges.push((i, end));
            }
        }
    }
    points
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Polyline vertex simplification: radial-distance pre-pass followed by
/// Douglas–Peucker. Endpoints are always preserved.
pub fn simplify(points: &[DVec2], tolerance: f64) -> Vec<DVec2> {
    if points.len() <= 2 {
        return points.to_vec();
    }
    let tolerance_sq = tolerance * tolerance;
    let radial = simplify_radial(points, tolerance_sq);
    if radial.len() <= 2 {
        return radial;
    }
    simplify_douglas_peucker(&radial, tolerance_sq)
}
