#![deny(unsafe_code)]
//! CLI binary for the tensor-field city generator.
//!
//! Subcommands:
//! - `generate`: run a preset with a seed and print a summary
//! - `list`: print available presets

mod error;

use citygen_streets::{CityGenerator, Preset};
use clap::{Parser, Subcommand};
use error::CliError;
use std::process;

#[derive(Parser)]
#[command(name = "citygen", about = "Tensor-field city street generator")]
struct Cli {
    /// Output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a street network and print what was built.
    Generate {
        /// Preset name (twin-grids, radial, empty).
        #[arg(short, long, default_value = "twin-grids")]
        preset: String,

        /// PRNG seed for deterministic output.
        #[arg(long, default_value_t = 1234)]
        seed: u64,

        /// World width; defaults to the preset's reference rectangle.
        #[arg(short = 'W', long)]
        width: Option<f64>,

        /// World height; defaults to the preset's reference rectangle.
        #[arg(short = 'H', long)]
        height: Option<f64>,

        /// Parameter overrides as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,

        /// Include streamlines, graph and polygons in JSON output.
        #[arg(long)]
        geometry: bool,
    },
    /// List available presets.
    List,
}

fn generate(
    preset: &str,
    seed: u64,
    width: Option<f64>,
    height: Option<f64>,
    params: &str,
    geometry: bool,
    json: bool,
) -> Result<(), CliError> {
    let params: serde_json::Value = serde_json::from_str(params)
        .map_err(|e| CliError::Input(format!("invalid --params JSON: {e}")))?;
    if !params.is_object() {
        return Err(CliError::Input("--params must be a JSON object".into()));
    }

    let mut city_seed = Preset::from_name(preset)?.default_seed(seed);
    city_seed.width = width.unwrap_or(city_seed.width);
    city_seed.height = height.unwrap_or(city_seed.height);
    city_seed.params = params;

    let city = CityGenerator::from_seed(&city_seed)?.into_city()?;
    let summary = city.summary();

    if json {
        let mut info = serde_json::json!({
            "seed": city_seed,
            "summary": summary,
        });
        if geometry {
            info["city"] = serde_json::to_value(&city)?;
        }
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("{preset} (seed {seed}, {}x{})", city_seed.width, city_seed.height);
        println!("  streamlines: {} major, {} minor", summary.major, summary.minor);
        println!(
            "  graph:       {} nodes, {} edges, {} intersections",
            summary.nodes, summary.edges, summary.intersections
        );
        println!(
            "  polygons:    {} blocks, {} shrunk, {} lots",
            summary.blocks, summary.shrunk, summary.lots
        );
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::List => {
            let presets = Preset::list();
            if cli.json {
                let info = serde_json::json!({ "presets": presets });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Presets:");
                for name in presets {
                    println!("  {name}");
                }
            }
        }
        Command::Generate {
            preset,
            seed,
            width,
            height,
            params,
            geometry,
        } => generate(&preset, seed, width, height, &params, geometry, cli.json)?,
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_mode = cli.json;
    if let Err(e) = run(cli) {
        tracing::debug!(target: "citygen::cli", exit_code = e.exit_code(), "cli.failed");
        if json_mode {
            let j = serde_json::json!({"error": e.to_string(), "exit_code": e.exit_code()});
            eprintln!("{}", serde_json::to_string_pretty(&j).unwrap_or_default());
        } else {
            eprintln!("error: {e}");
        }
        process::exit(e.exit_code());
    }
}
