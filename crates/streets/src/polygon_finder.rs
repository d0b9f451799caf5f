//! Block and lot extraction from the road graph.
//!
//! Faces are recovered by walking the graph and always taking the rightmost
//! turn. Interior faces come out clockwise; they are masked, shrunk inward
//! and bisected into lots. Each stage keeps its own layer.

use crate::graph::Graph;
use citygen_core::geometry::{average_point, is_simple, signed_area};
use citygen_core::params::{param_f64, param_usize};
use citygen_core::polygon::{shrink, subdivide};
use citygen_core::{Polygon, TensorField, Xorshift64};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::f64::consts::TAU;

const DEFAULT_MAX_LENGTH: usize = 20;
const DEFAULT_MIN_AREA: f64 = 80.0;
const DEFAULT_SHRINK_SPACING: f64 = 4.0;
const DEFAULT_CHANCE_NO_DIVIDE: f64 = 0.05;
const DEFAULT_MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolygonParams {
    /// Longest face, in nodes, the walk will follow.
    pub max_length: usize,
    /// Target lot area for subdivision.
    pub min_area: f64,
    /// Inward offset applied to each block.
    pub shrink_spacing: f64,
    /// Probability that a block is kept whole instead of divided.
    pub chance_no_divide: f64,
    /// Most cuts any lot may sit below its block.
    pub max_depth: usize,
}

impl Default for PolygonParams {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            min_area: DEFAULT_MIN_AREA,
            shrink_spacing: DEFAULT_SHRINK_SPACING,
            chance_no_divide: DEFAULT_CHANCE_NO_DIVIDE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl PolygonParams {
    pub fn from_json(params: &Value) -> Self {
        let d = Self::default();
        Self {
            max_length: param_usize(params, "max_length", d.max_length),
            min_area: param_f64(params, "min_area", d.min_area),
            shrink_spacing: param_f64(params, "shrink_spacing", d.shrink_spacing),
            chance_no_divide: param_f64(params, "chance_no_divide", d.chance_no_divide),
            max_depth: param_usize(params, "max_depth", d.max_depth),
        }
    }

    pub fn param_schema() -> Value {
        json!({
            "max_length": {"type": "integer", "default": DEFAULT_MAX_LENGTH, "min": 3, "max": 1000,
                "description": "Longest face (in nodes) kept as a block"},
            "min_area": {"type": "number", "default": DEFAULT_MIN_AREA, "min": 1.0, "max": 100000.0,
                "description": "Target lot area"},
            "shrink_spacing": {"type": "number", "default": DEFAULT_SHRINK_SPACING, "min": 0.0, "max": 100.0,
                "description": "Inward offset of blocks from the road centre line"},
            "chance_no_divide": {"type": "number", "default": DEFAULT_CHANCE_NO_DIVIDE, "min": 0.0, "max": 1.0,
                "description": "Probability a block is left undivided"},
            "max_depth": {"type": "integer", "default": DEFAULT_MAX_DEPTH, "min": 0, "max": 30,
                "description": "Most successive cuts applied to one block"}
        })
    }
}

/// The three polygon stages, each counter-clockwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonLayers {
    pub faces: Vec<Polygon>,
    pub shrunk: Vec<Polygon>,
    pub divided: Vec<Polygon>,
}

pub struct PolygonFinder {
    positions: Vec<DVec2>,
    adj: Vec<Vec<usize>>,
    params: PolygonParams,
    faces: Vec<Polygon>,
    shrunk: Option<Vec<Polygon>>,
    divided: Option<Vec<Polygon>>,
}

impl PolygonFinder {
    /// Takes a working copy of the graph's adjacency.
    pub fn new(graph: &Graph, params: PolygonParams) -> Self {
        Self {
            positions: graph.nodes().iter().map(|n| n.position).collect(),
            adj: graph.nodes().iter().map(|n| n.adj.clone()).collect(),
            params,
            faces: Vec::new(),
            shrunk: None,
            divided: None,
        }
    }

    pub fn params(&self) -> &PolygonParams {
        &self.params
    }

    /// Walks every face of the graph, returning node cycles.
    ///
    /// With `remove_edges` the directed edges of each found face are taken
    /// out of the working adjacency, so every face is reported once. Without
    /// it a face is reported once per directed edge that starts a walk on it.
    pub fn trace_faces(&self, remove_edges: bool) -> Vec<Vec<usize>> {
        let mut adj = self.adj.clone();
        let mut faces = Vec::new();
        for node in 0..adj.len() {
            if adj[node].len() < 2 {
                continue;
            }
            let starts = adj[node].clone();
            for next in starts {
                if !adj[node].contains(&next) {
                    continue;
                }
                let Some(face) = self.walk(&adj, node, next) else {
                    continue;
                };
                if face.len() >= self.params.max_length {
                    continue;
                }
                if remove_edges {
                    remove_directed_edges(&mut adj, &face);
                }
                faces.push(face);
            }
        }
        faces
    }

    /// Follows rightmost turns from `start → next` until a node repeats.
    fn walk(&self, adj: &[Vec<usize>], start: usize, next: usize) -> Option<Vec<usize>> {
        let mut visited = vec![start, next];
        for _ in 0..self.params.max_length {
            let from = visited[visited.len() - 2];
            let to = visited[visited.len() - 1];
            let candidate = self.rightmost(adj, from, to)?;
            if let Some(i) = visited.iter().position(|&v| v == candidate) {
                return Some(visited.split_off(i));
            }
            visited.push(candidate);
        }
        None
    }

    /// Neighbour of `to` with the smallest counter-clockwise angle measured
    /// from the direction back towards `from`.
    fn rightmost(&self, adj: &[Vec<usize>], from: usize, to: usize) -> Option<usize> {
        let here = self.positions[to];
        let back = self.positions[from] - here;
        let base = back.y.atan2(back.x);
        let mut best = None;
        let mut smallest = f64::INFINITY;
        for &n in &adj[to] {
            if n == from {
                continue;
            }
            let out = self.positions[n] - here;
            let mut angle = out.y.atan2(out.x) - base;
            if angle < 0.0 {
                angle += TAU;
            }
            if angle < smallest {
                smallest = angle;
                best = Some(n);
            }
        }
        best
    }

    /// Finds blocks: clockwise simple faces whose average point is on land
    /// and outside every park. Resets later stages.
    pub fn find_polygons(&mut self, field: &TensorField) -> &[Polygon] {
        let cycles = self.trace_faces(true);
        let found = cycles.len();
        let interior: Vec<Polygon> = cycles
            .into_iter()
            .map(|cycle| cycle.iter().map(|&i| self.positions[i]).collect::<Polygon>())
            .filter(|poly| poly.len() >= 3 && signed_area(poly) < 0.0)
            .map(|poly| poly.into_iter().rev().collect::<Polygon>())
            .filter(|poly| is_simple(poly))
            .collect();
        let interior_count = interior.len();
        self.faces = interior
            .into_iter()
            .filter(|poly| {
                let centre = average_point(poly);
                field.on_land(centre) && !field.in_parks(centre)
            })
            .collect();
        self.shrunk = None;
        self.divided = None;
        tracing::info!(
            target: "citygen::polygons",
            found,
            interior = interior_count,
            kept = self.faces.len(),
            "polygons.find.done"
        );
        &self.faces
    }

    /// Offsets every block inward by `shrink_spacing`; collapsed blocks drop out.
    pub fn shrink(&mut self) -> &[Polygon] {
        let spacing = self.params.shrink_spacing;
        let shrunk: Vec<Polygon> = self.faces.iter().filter_map(|f| shrink(f, spacing)).collect();
        tracing::info!(
            target: "citygen::polygons",
            blocks = self.faces.len(),
            shrunk = shrunk.len(),
            spacing,
            "polygons.shrink.done"
        );
        self.divided = None;
        self.shrunk.insert(shrunk)
    }

    /// Bisects blocks into lots, from the shrunk layer if [`shrink`](Self::shrink)
    /// ran and from the raw faces otherwise.
    pub fn divide(&mut self, rng: &mut Xorshift64) -> &[Polygon] {
        let source = self.shrunk.as_deref().unwrap_or(&self.faces);
        let mut lots = Vec::new();
        let mut whole = 0usize;
        for block in source {
            if rng.chance(self.params.chance_no_divide) {
                whole += 1;
                lots.push(block.clone());
            } else {
                lots.extend(subdivide(block, self.params.min_area, self.params.max_depth, rng));
            }
        }
        tracing::info!(
            target: "citygen::polygons",
            blocks = source.len(),
            undivided = whole,
            lots = lots.len(),
            "polygons.divide.done"
        );
        self.divided.insert(lots)
    }

    pub fn faces(&self) -> &[Polygon] {
        &self.faces
    }

    /// Empty until [`shrink`](Self::shrink) runs.
    pub fn shrunk(&self) -> &[Polygon] {
        self.shrunk.as_deref().unwrap_or(&[])
    }

    /// Empty until [`divide`](Self::divide) runs.
    pub fn divided(&self) -> &[Polygon] {
        self.divided.as_deref().unwrap_or(&[])
    }

    /// The most processed layer available.
    pub fn latest(&self) -> &[Polygon] {
        self.divided
            .as_deref()
            .or(self.shrunk.as_deref())
            .unwrap_or(&self.faces)
    }

    pub fn into_layers(self) -> PolygonLayers {
        PolygonLayers {
            faces: self.faces,
            shrunk: self.shrunk.unwrap_or_default(),
            divided: self.divided.unwrap_or_default(),
        }
    }
}

fn remove_directed_edges(adj: &mut [Vec<usize>], face: &[usize]) {
    for (i, &current) in face.iter().enumerate() {
        let next = face[(i + 1) % face.len()];
        if let Some(pos) = adj[current].iter().position(|&n| n == next) {
            adj[current].remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphParams;
    use citygen_core::geometry::{point_in_polygon, polygon_area};
    use citygen_core::{Masks, NoiseParams, Polyline};

    fn v(x: f64, y: f64) -> DVec2 {
        DVec2::new(x, y)
    }

    fn open_field() -> TensorField {
        TensorField::new(NoiseParams::default(), false)
    }

    /// `n × n` grid of square cells of side `cell`.
    fn grid_graph(n: usize, cell: f64) -> Graph {
        let extent = n as f64 * cell;
        let mut lines: Vec<Polyline> = Vec::new();
        for i in 0..=n {
            let c = i as f64 * cell;
            lines.push(vec![v(0.0, c), v(extent, c)]);
            lines.push(vec![v(c, 0.0), v(c, extent)]);
        }
        Graph::build(&lines, &GraphParams::default())
    }

    fn square(origin: DVec2, side: f64) -> Polyline {
        vec![
            origin,
            origin + v(side, 0.0),
            origin + v(side, side),
            origin + v(0.0, side),
            origin,
        ]
    }

    #[test]
    fn grid_yields_its_cells_counter_clockwise() {
        let graph = grid_graph(2, 50.0);
        let mut finder = PolygonFinder::new(&graph, PolygonParams::default());
        let faces = finder.find_polygons(&open_field());
        assert_eq!(faces.len(), 4);
        for face in faces {
            assert_eq!(face.len(), 4);
            assert!((signed_area(face) - 2500.0).abs() < 1e-9);
            assert!(is_simple(face));
        }
    }

    #[test]
    fn each_face_found_once_per_directed_start_without_removal() {
        let graph = grid_graph(2, 50.0);
        let finder = PolygonFinder::new(&graph, PolygonParams::default());
        let canonical = |cycle: &Vec<usize>| {
            let mut c = cycle.clone();
            c.sort_unstable();
            c
        };

        let once = finder.trace_faces(true);
        let mut distinct: Vec<Vec<usize>> = once.iter().map(canonical).collect();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), once.len());

        let all = finder.trace_faces(false);
        // 24 directed edges: four 4-cycles and the 8-node outer boundary.
        assert_eq!(all.len(), 24);
        for face in &distinct {
            let count = all.iter().filter(|c| &canonical(*c) == face).count();
            assert_eq!(count, face.len());
        }
    }

    #[test]
    fn long_faces_are_discarded() {
        let graph = grid_graph(1, 50.0);
        let params = PolygonParams {
            max_length: 4,
            ..PolygonParams::default()
        };
        let mut finder = PolygonFinder::new(&graph, params);
        assert!(finder.find_polygons(&open_field()).is_empty());
    }

    #[test]
    fn empty_graph_gives_empty_layers() {
        let mut finder = PolygonFinder::new(&Graph::default(), PolygonParams::default());
        assert!(finder.find_polygons(&open_field()).is_empty());
        assert!(finder.shrink().is_empty());
        assert!(finder.divide(&mut Xorshift64::new(1)).is_empty());
        assert_eq!(finder.into_layers(), PolygonLayers::default());
    }

    #[test]
    fn square_block_is_shrunk_and_divided_into_lots() {
        let graph = Graph::build(&[square(v(0.0, 0.0), 100.0)], &GraphParams::default());
        let params = PolygonParams {
            min_area: 30.0,
            shrink_spacing: 1.0,
            chance_no_divide: 0.0,
            ..PolygonParams::default()
        };
        let mut finder = PolygonFinder::new(&graph, params);
        assert_eq!(finder.find_polygons(&open_field()).len(), 1);

        let shrunk = finder.shrink().to_vec();
        assert_eq!(shrunk.len(), 1);
        assert!((polygon_area(&shrunk[0]) - 98.0 * 98.0).abs() < 1e-6);
        for p in &shrunk[0] {
            assert!(p.x > 0.0 && p.x < 100.0 && p.y > 0.0 && p.y < 100.0);
        }

        let lots = finder.divide(&mut Xorshift64::new(9)).to_vec();
        assert!(lots.len() > 150 && lots.len() < 700, "got {} lots", lots.len());
        let mut total = 0.0;
        for lot in &lots {
            let area = polygon_area(lot);
            assert!((15.0..60.0).contains(&area), "lot area {area}");
            assert!(is_simple(lot));
            total += area;
        }
        assert!((total - 98.0 * 98.0).abs() < 1e-6 * total);
        assert_eq!(finder.latest().len(), lots.len());
    }

    #[test]
    fn block_in_park_is_dropped() {
        let graph = Graph::build(
            &[square(v(0.0, 0.0), 100.0), vec![v(50.0, 0.0), v(50.0, 100.0)]],
            &GraphParams::default(),
        );
        let mut field = open_field();
        field.set_masks(Masks {
            parks: vec![vec![v(5.0, 5.0), v(45.0, 5.0), v(45.0, 95.0), v(5.0, 95.0)]],
            ..Masks::default()
        });
        let params = PolygonParams {
            chance_no_divide: 0.0,
            ..PolygonParams::default()
        };
        let mut finder = PolygonFinder::new(&graph, params);
        let faces = finder.find_polygons(&field).to_vec();
        assert_eq!(faces.len(), 1);
        assert!(average_point(&faces[0]).x > 50.0);

        finder.shrink();
        let lots = finder.divide(&mut Xorshift64::new(3)).to_vec();
        assert!(!lots.is_empty());
        let park_centre = v(25.0, 50.0);
        assert!(lots.iter().all(|lot| !point_in_polygon(park_centre, lot)));
        assert!(lots.iter().all(|lot| average_point(lot).x > 50.0));
    }

    #[test]
    fn block_on_water_is_dropped() {
        let graph = grid_graph(1, 50.0);
        let mut field = open_field();
        field.set_masks(Masks {
            sea: vec![vec![v(-10.0, -10.0), v(60.0, -10.0), v(60.0, 60.0), v(-10.0, 60.0)]],
            ..Masks::default()
        });
        let mut finder = PolygonFinder::new(&graph, PolygonParams::default());
        assert!(finder.find_polygons(&field).is_empty());
    }

    #[test]
    fn divide_without_shrink_uses_faces() {
        let graph = grid_graph(1, 20.0);
        let params = PolygonParams {
            chance_no_divide: 1.0,
            ..PolygonParams::default()
        };
        let mut finder = PolygonFinder::new(&graph, params);
        finder.find_polygons(&open_field());
        assert!(finder.shrunk().is_empty());
        let lots = finder.divide(&mut Xorshift64::new(5)).to_vec();
        assert_eq!(lots, finder.faces().to_vec());
    }

    #[test]
    fn params_from_json() {
        let p = PolygonParams::from_json(&json!({"min_area": 30.0, "max_length": 12}));
        assert_eq!(p.min_area, 30.0);
        assert_eq!(p.max_length, 12);
        assert_eq!(p.shrink_spacing, DEFAULT_SHRINK_SPACING);
        assert_eq!(p.max_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn divide_respects_max_depth() {
        let graph = Graph::build(&[square(v(0.0, 0.0), 100.0)], &GraphParams::default());
        let params = PolygonParams {
            min_area: 1e-6,
            shrink_spacing: 0.0,
            chance_no_divide: 0.0,
            max_depth: 4,
            ..PolygonParams::default()
        };
        let mut finder = PolygonFinder::new(&graph, params);
        finder.find_polygons(&open_field());
        let lots = finder.divide(&mut Xorshift64::new(3));
        assert!(!lots.is_empty() && lots.len() <= 16, "got {} lots", lots.len());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn emitted_polygons_are_simple(
                n in 1usize..4,
                cell in 20.0_f64..60.0,
                seed in 1u64..1000,
            ) {
                let graph = grid_graph(n, cell);
                let params = PolygonParams { min_area: 60.0, shrink_spacing: 2.0, ..PolygonParams::default() };
                let mut finder = PolygonFinder::new(&graph, params);
                finder.find_polygons(&open_field());
                prop_assert_eq!(finder.faces().len(), n * n);
                finder.shrink();
                finder.divide(&mut Xorshift64::new(seed));
                let layers = finder.into_layers();
                for poly in layers.faces.iter().chain(&layers.shrunk).chain(&layers.divided) {
                    prop_assert!(is_simple(poly));
                }
            }
        }
    }
}
