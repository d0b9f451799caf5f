//! Field → streamlines → graph → polygons, as free functions and as a
//! stepped [`Generator`].

use crate::config::{merge_params, CityConfig};
use crate::graph::{Graph, GraphParams};
use crate::polygon_finder::{PolygonFinder, PolygonLayers, PolygonParams};
use crate::presets::Preset;
use crate::streamlines::{StreamlineGenerator, StreamlineParams, Streamlines};
use citygen_core::error::GenError;
use citygen_core::{BasisSpec, Bounds, Generator, NoiseParams, Polyline, Seed, TensorField, Xorshift64};
use glam::DVec2;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Builds an unmasked, non-smooth field from basis specs.
pub fn build_field(specs: &[BasisSpec], noise: NoiseParams) -> Result<TensorField, GenError> {
    TensorField::from_specs(specs, noise, false)
}

/// Builds the field described by `config`, masks included.
pub fn field_from_config(config: &CityConfig) -> Result<TensorField, GenError> {
    let mut field = TensorField::from_specs(&config.basis, config.noise.clone(), config.smooth)?;
    field.set_masks(config.masks.clone());
    field.set_ignore_river(config.ignore_river);
    Ok(field)
}

/// Traces, joins and simplifies one tier of streamlines.
pub fn generate_streamlines(
    field: Arc<TensorField>,
    bounds: Bounds,
    params: &StreamlineParams,
    seed: u64,
) -> Result<Streamlines, GenError> {
    let mut generator = StreamlineGenerator::new(field, bounds, params.clone(), Xorshift64::new(seed))?;
    generator.create_all();
    generator.join_dangling();
    Ok(generator.finish())
}

/// Graph over the simplified lines of both families.
pub fn build_graph(streamlines: &Streamlines, node_radius: f64, delete_dangling: bool) -> Graph {
    let lines: Vec<Polyline> = streamlines.simple_lines().cloned().collect();
    Graph::build(
        &lines,
        &GraphParams {
            node_radius,
            delete_dangling,
        },
    )
}

/// Blocks, shrunk blocks and lots. `rng` drives subdivision only.
pub fn find_polygons(
    graph: &Graph,
    field: &TensorField,
    params: &PolygonParams,
    rng: &mut Xorshift64,
) -> PolygonLayers {
    let mut finder = PolygonFinder::new(graph, params.clone());
    finder.find_polygons(field);
    finder.shrink();
    finder.divide(rng);
    finder.into_layers()
}

/// Everything one run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct City {
    pub streamlines: Streamlines,
    pub graph: Graph,
    pub polygons: PolygonLayers,
}

/// Counts describing a [`City`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitySummary {
    pub major: usize,
    pub minor: usize,
    pub nodes: usize,
    pub edges: usize,
    pub intersections: usize,
    pub blocks: usize,
    pub shrunk: usize,
    pub lots: usize,
}

impl City {
    pub fn summary(&self) -> CitySummary {
        CitySummary {
            major: self.streamlines.major.len(),
            minor: self.streamlines.minor.len(),
            nodes: self.graph.nodes().len(),
            edges: self.graph.edge_count(),
            intersections: self.graph.intersections().len(),
            blocks: self.polygons.faces.len(),
            shrunk: self.polygons.shrunk.len(),
            lots: self.polygons.divided.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Streamlines,
    Graph,
    Polygons,
    Done,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Streamlines => "streamlines",
            Stage::Graph => "graph",
            Stage::Polygons => "polygons",
            Stage::Done => "done",
        }
    }
}

/// Staged city generator.
///
/// While tracing, each [`step`](Generator::step) adds at most one
/// streamline. A tier is joined once it stops finding seeds and the next
/// tier starts from its random state, absorbing the spatial hashes of the
/// tier before it, which already hold every earlier tier's samples. The graph and the polygons take one step each.
pub struct CityGenerator {
    config: CityConfig,
    seed: u64,
    field: Arc<TensorField>,
    stage: Stage,
    tier: usize,
    current: Option<StreamlineGenerator>,
    /// Last finished tier.
    previous: Option<StreamlineGenerator>,
    rng: Xorshift64,
    streamlines: Streamlines,
    graph: Option<Graph>,
    polygons: Option<PolygonLayers>,
}

impl CityGenerator {
    pub fn new(config: CityConfig, seed: u64) -> Result<Self, GenError> {
        config.validate()?;
        let field = Arc::new(field_from_config(&config)?);
        Ok(Self {
            config,
            seed,
            field,
            stage: Stage::Streamlines,
            tier: 0,
            current: None,
            previous: None,
            rng: Xorshift64::new(seed),
            streamlines: Streamlines::default(),
            graph: None,
            polygons: None,
        })
    }

    /// Resolves the preset, merges the seed's params over it and builds
    /// the generator.
    pub fn from_seed(seed: &Seed) -> Result<Self, GenError> {
        seed.validate()?;
        let preset = Preset::from_name(&seed.preset)?;
        let bounds = Bounds::new(DVec2::from(seed.origin), DVec2::new(seed.width, seed.height))?;
        let params = merge_params(&preset.params(), &seed.params);
        Self::new(CityConfig::from_json(bounds, &params)?, seed.seed)
    }

    pub fn config(&self) -> &CityConfig {
        &self.config
    }

    pub fn field(&self) -> &TensorField {
        &self.field
    }

    pub fn stage_name(&self) -> &'static str {
        self.stage.name()
    }

    pub fn is_done(&self) -> bool {
        self.stage == Stage::Done
    }

    /// Streamlines of the tiers finished so far.
    pub fn streamlines(&self) -> &Streamlines {
        &self.streamlines
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    pub fn polygons(&self) -> Option<&PolygonLayers> {
        self.polygons.as_ref()
    }

    /// Runs any remaining stages and returns the result.
    pub fn into_city(mut self) -> Result<City, GenError> {
        self.run()?;
        Ok(City {
            streamlines: self.streamlines,
            graph: self.graph.unwrap_or_default(),
            polygons: self.polygons.unwrap_or_default(),
        })
    }

    fn start_tier(&self) -> Result<StreamlineGenerator, GenError> {
        let tier = &self.config.tiers[self.tier];
        let mut generator = StreamlineGenerator::new(
            Arc::clone(&self.field),
            self.config.bounds,
            tier.streamlines.clone(),
            self.rng.clone(),
        )?;
        if let Some(previous) = &self.previous {
            generator.add_existing(previous);
        }
        Ok(generator)
    }

    fn step_streamlines(&mut self) -> Result<(), GenError> {
        let mut generator = match self.current.take() {
            Some(generator) => generator,
            None => self.start_tier()?,
        };
        if generator.step() {
            self.current = Some(generator);
            return Ok(());
        }

        generator.join_dangling();
        let lines = generator.streamline_set();
        tracing::info!(
            target: "citygen::city",
            tier = %self.config.tiers[self.tier].name,
            major = lines.major.len(),
            minor = lines.minor.len(),
            "city.tier.done"
        );
        self.streamlines.extend(lines);
        self.rng = generator.rng().clone();
        self.previous = Some(generator);
        self.tier += 1;
        if self.tier >= self.config.tiers.len() {
            self.stage = Stage::Graph;
        }
        Ok(())
    }
}

impl Generator for CityGenerator {
    fn step(&mut self) -> Result<bool, GenError> {
        match self.stage {
            Stage::Streamlines => self.step_streamlines()?,
            Stage::Graph => {
                let graph = &self.config.graph;
                self.graph = Some(build_graph(&self.streamlines, graph.node_radius, graph.delete_dangling));
                self.stage = Stage::Polygons;
            }
            Stage::Polygons => {
                let empty = Graph::default();
                let graph = self.graph.as_ref().unwrap_or(&empty);
                let layers = find_polygons(graph, &self.field, &self.config.polygons, &mut self.rng);
                tracing::info!(
                    target: "citygen::city",
                    seed = self.seed,
                    major = self.streamlines.major.len(),
                    minor = self.streamlines.minor.len(),
                    nodes = graph.nodes().len(),
                    lots = layers.divided.len(),
                    "city.done"
                );
                self.polygons = Some(layers);
                self.stage = Stage::Done;
            }
            Stage::Done => return Ok(false),
        }
        Ok(self.stage != Stage::Done)
    }

    fn params(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn param_schema(&self) -> Value {
        CityConfig::param_schema()
    }
}
