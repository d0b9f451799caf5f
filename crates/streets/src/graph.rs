//! Planar road graph built from simplified streamlines.
//!
//! Nodes are created at every streamline vertex and at every crossing
//! between two segments; nodes closer than `node_radius` are merged. Each
//! segment then links the nodes lying on it in order along its direction.
//! Nodes live in one arena and refer to each other by index.

use citygen_core::geometry::segment_intersection;
use citygen_core::params::{param_bool, param_f64};
use citygen_core::Polyline;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};

const DEFAULT_NODE_RADIUS: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphParams {
    /// Nodes closer than this are merged into one.
    pub node_radius: f64,
    /// Repeatedly remove nodes of degree one or zero.
    pub delete_dangling: bool,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            node_radius: DEFAULT_NODE_RADIUS,
            delete_dangling: true,
        }
    }
}

impl GraphParams {
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();
        Self {
            node_radius: param_f64(params, "node_radius", d.node_radius),
            delete_dangling: param_bool(params, "delete_dangling", d.delete_dangling),
        }
    }

    pub fn param_schema() -> Value {
        json!({
            "node_radius": {"type": "number", "default": DEFAULT_NODE_RADIUS, "min": 1e-9, "max": 10.0,
                "description": "Nodes closer than this are merged"},
            "delete_dangling": {"type": "boolean", "default": true,
                "description": "Prune dead-end roads before finding blocks"}
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub position: DVec2,
    /// Neighbour indices, sorted ascending.
    pub adj: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    line: usize,
    index: usize,
    from: DVec2,
    to: DVec2,
    min: DVec2,
    max: DVec2,
}

impl Segment {
    fn new(line: usize, index: usize, from: DVec2, to: DVec2) -> Self {
        Self {
            line,
            index,
            from,
            to,
            min: from.min(to),
            max: from.max(to),
        }
    }

    fn boxes_overlap(&self, other: &Segment) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }
}

/// Node under construction: position, owning segment ids and neighbours.
struct PendingNode {
    position: DVec2,
    segments: Vec<usize>,
    adj: BTreeSet<usize>,
}

/// Bucketed node arena that merges nodes within `radius`.
struct NodeIndex {
    radius: f64,
    nodes: Vec<PendingNode>,
    buckets: HashMap<(i64, i64), Vec<usize>>,
    /// Node ids per segment id.
    members: Vec<Vec<usize>>,
}

impl NodeIndex {
    fn new(radius: f64, segment_count: usize) -> Self {
        Self {
            radius,
            nodes: Vec::new(),
            buckets: HashMap::new(),
            members: vec![Vec::new(); segment_count],
        }
    }

    fn bucket(&self, p: DVec2) -> (i64, i64) {
        ((p.x / self.radius).floor() as i64, (p.y / self.radius).floor() as i64)
    }

    /// Lowest-index node within `radius` of `p`.
    fn find(&self, p: DVec2) -> Option<usize> {
        let (bx, by) = self.bucket(p);
        let radius_sq = self.radius * self.radius;
        let mut found: Option<usize> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(ids) = self.buckets.get(&(bx + dx, by + dy)) else {
                    continue;
                };
                for &id in ids {
                    if self.nodes[id].position.distance_squared(p) <= radius_sq
                        && found.map_or(true, |f| id < f)
                    {
                        found = Some(id);
                    }
                }
            }
        }
        found
    }

    /// Adds a node on `segments`, merging into an existing one if close.
    fn add(&mut self, position: DVec2, segments: &[usize]) {
        let id = match self.find(position) {
            Some(id) => id,
            None => {
                let id = self.nodes.len();
                self.nodes.push(PendingNode {
                    position,
                    segments: Vec::new(),
                    adj: BTreeSet::new(),
                });
                let key = self.bucket(position);
                self.buckets.entry(key).or_default().push(id);
                id
            }
        };
        for &s in segments {
            if !self.nodes[id].segments.contains(&s) {
                self.nodes[id].segments.push(s);
                self.members[s].push(id);
            }
        }
    }

    fn link(&mut self, a: usize, b: usize) {
        if a != b {
            self.nodes[a].adj.insert(b);
            self.nodes[b].adj.insert(a);
        }
    }
}

/// Undirected planar graph with integer node ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Graph {
    nodes: Vec<Node>,
    intersections: Vec<DVec2>,
}

impl Graph {
    /// Builds the graph over `lines`. Empty input gives an empty graph.
    pub fn build(lines: &[Polyline], params: &GraphParams) -> Self {
        let mut segments: Vec<Segment> = Vec::new();
        let mut first_segment: Vec<usize> = Vec::with_capacity(lines.len());
        for (li, line) in lines.iter().enumerate() {
            first_segment.push(segments.len());
            for (i, pair) in line.windows(2).enumerate() {
                segments.push(Segment::new(li, i, pair[0], pair[1]));
            }
        }

        let intersections = find_intersections(lines, &segments);

        let mut index = NodeIndex::new(params.node_radius.max(f64::MIN_POSITIVE), segments.len());
        for (li, line) in lines.iter().enumerate() {
            let base = first_segment[li];
            let n = line.len();
            for (i, &p) in line.iter().enumerate() {
                let mut owned = Vec::with_capacity(2);
                if i > 0 {
                    owned.push(base + i - 1);
                }
                if i + 1 < n {
                    owned.push(base + i);
                }
                index.add(p, &owned);
            }
        }
        for &(point, a, b) in &intersections {
            index.add(point, &[a, b]);
        }

        let mut short_segments = 0usize;
        for (s, seg) in segments.iter().enumerate() {
            let dir = seg.to - seg.from;
            let mut along: Vec<(f64, usize)> = index.members[s]
                .iter()
                .map(|&id| ((index.nodes[id].position - seg.from).dot(dir), id))
                .collect();
            along.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut ordered: Vec<usize> = along.into_iter().map(|(_, id)| id).collect();
            ordered.dedup();
            if ordered.len() < 2 {
                short_segments += 1;
                tracing::warn!(
                    target: "citygen::graph",
                    line = seg.line,
                    segment = seg.index,
                    nodes = ordered.len(),
                    "graph.segment.too_few_nodes"
                );
                continue;
            }
            for pair in ordered.windows(2) {
                index.link(pair[0], pair[1]);
            }
        }

        let mut nodes = index.nodes;
        let before = nodes.len();
        if params.delete_dangling {
            nodes = prune_dangling(nodes);
        }

        let graph = Graph {
            nodes: nodes
                .into_iter()
                .map(|n| Node {
                    position: n.position,
                    adj: n.adj.into_iter().collect(),
                })
                .collect(),
            intersections: intersections.iter().map(|&(p, _, _)| p).collect(),
        };
        tracing::info!(
            target: "citygen::graph",
            lines = lines.len(),
            segments = segments.len(),
            intersections = graph.intersections.len(),
            nodes = graph.nodes.len(),
            pruned = before - graph.nodes.len(),
            edges = graph.edge_count(),
            short_segments,
            "graph.build.done"
        );
        graph
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Every crossing found between segments, before node merging.
    pub fn intersections(&self) -> &[DVec2] {
        &self.intersections
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.adj.len()).sum::<usize>() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index of the node nearest to `p`.
    pub fn nearest_node(&self, p: DVec2) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .min_by(|a, b| {
                a.1.position
                    .distance_squared(p)
                    .total_cmp(&b.1.position.distance_squared(p))
            })
            .map(|(i, _)| i)
    }
}

/// All pairwise crossings as `(point, segment, segment)`.
///
/// Consecutive segments of one line share a vertex by construction and are
/// skipped, including the wrap-around pair of a closed line.
fn find_intersections(lines: &[Polyline], segments: &[Segment]) -> Vec<(DVec2, usize, usize)> {
    let mut out = Vec::new();
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let (a, b) = (&segments[i], &segments[j]);
            if a.line == b.line {
                let line = &lines[a.line];
                let last = line.len() - 2;
                let closed = line.first() == line.last();
                if b.index == a.index + 1 || (closed && a.index == 0 && b.index == last) {
                    continue;
                }
            }
            if !a.boxes_overlap(b) {
                continue;
            }
            if let Some(hit) = segment_intersection(a.from, a.to, b.from, b.to, true) {
                out.push((hit.point, i, j));
            }
        }
    }
    out
}

/// Flag-and-sweep removal of nodes with at most one neighbour, then
/// compaction with ids remapped in their original order.
fn prune_dangling(mut nodes: Vec<PendingNode>) -> Vec<PendingNode> {
    let mut alive = vec![true; nodes.len()];
    let mut stack: Vec<usize> = (0..nodes.len()).rev().filter(|&i| nodes[i].adj.len() <= 1).collect();
    while let Some(i) = stack.pop() {
        if !alive[i] || nodes[i].adj.len() > 1 {
            continue;
        }
        alive[i] = false;
        let neighbours: Vec<usize> = std::mem::take(&mut nodes[i].adj).into_iter().collect();
        for n in neighbours {
            nodes[n].adj.remove(&i);
            if alive[n] && nodes[n].adj.len() <= 1 {
                stack.push(n);
            }
        }
    }

    let mut remap = vec![usize::MAX; nodes.len()];
    let mut next = 0;
    for (i, &keep) in alive.iter().enumerate() {
        if keep {
            remap[i] = next;
            next += 1;
        }
    }
    nodes
        .into_iter()
        .zip(alive)
        .filter(|(_, keep)| *keep)
        .map(|(node, _)| PendingNode {
            position: node.position,
            segments: node.segments,
            adj: node.adj.into_iter().map(|n| remap[n]).collect(),
        })
        .collect()
}
