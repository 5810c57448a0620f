use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geodownscale::vector::{
    grid_csv_to_points, read_geojson, reproject_layer, subset_layer, write_geojson, GridCsvOptions,
    ReprojectOptions, DEFAULT_SUBSET_SEED,
};
use geodownscale::{DownscaleConfig, Downscaler};

#[derive(Parser)]
#[command(name = "geodownscale")]
#[command(about = "Raster downscaling and point-layer reprojection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Downscale a coarse raster using a folder of fine-resolution predictors
    Downscale {
        /// Folder containing predictor GeoTIFFs
        #[arg(short, long)]
        predictors: PathBuf,

        /// Coarse raster to downscale
        #[arg(short, long)]
        target: PathBuf,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Share of pixels used for training
        #[arg(long)]
        train_fraction: Option<f64>,

        /// Seed of the train/holdout partition
        #[arg(long)]
        split_seed: Option<u64>,

        /// Seed of the random forest
        #[arg(long)]
        model_seed: Option<u64>,

        /// Number of trees
        #[arg(long)]
        trees: Option<usize>,

        /// Output raster (default: downscaled.<ext> next to the target)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a CSV of projected grid coordinates into a GeoJSON point layer
    GridToPoints {
        /// Input CSV with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Output GeoJSON
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "32644")]
        source_epsg: i32,

        #[arg(long, default_value = "4326")]
        target_epsg: i32,

        #[arg(long, default_value = "x")]
        x_column: String,

        #[arg(long, default_value = "y")]
        y_column: String,
    },

    /// Reproject a GeoJSON layer to EPSG:4326, optionally keeping a random subset
    ReprojectLayer {
        /// Input GeoJSON
        #[arg(short, long)]
        input: PathBuf,

        /// Output GeoJSON
        #[arg(short, long)]
        output: PathBuf,

        /// Source EPSG code, overriding the file's crs member
        #[arg(long)]
        source_epsg: Option<i32>,

        /// Keep only this many randomly sampled features
        #[arg(long)]
        subset: Option<usize>,

        /// Seed of the subset sample
        #[arg(long, default_value_t = DEFAULT_SUBSET_SEED)]
        seed: u64,

        /// Seed of the generated feature names
        #[arg(long)]
        id_seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match Cli::parse().command {
        Commands::Downscale {
            predictors,
            target,
            config,
            train_fraction,
            split_seed,
            model_seed,
            trees,
            output,
        } => {
            let mut config = match config {
                Some(path) => DownscaleConfig::from_json_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => DownscaleConfig::default(),
            };
            if let Some(f) = train_fraction {
                config.train_fraction = f;
            }
            if let Some(s) = split_seed {
                config.split_seed = s;
            }
            if let Some(s) = model_seed {
                config.forest.seed = s;
            }
            if let Some(n) = trees {
                config.forest.n_estimators = n;
            }

            let mut downscaler = Downscaler::new(&predictors, &target).config(config);
            if let Some(path) = output {
                downscaler = downscaler.output_path(path);
            }
            let result = downscaler
                .run()
                .with_context(|| format!("downscaling {}", target.display()))?;
            info!(
                output = %result.output_path.display(),
                predictors = result.predictor_paths.len(),
                holdout = result.holdout.len(),
                "Done"
            );
        }

        Commands::GridToPoints {
            input,
            output,
            source_epsg,
            target_epsg,
            x_column,
            y_column,
        } => {
            let options = GridCsvOptions {
                source_epsg,
                target_epsg,
                x_column,
                y_column,
            };
            let layer = grid_csv_to_points(&input, &options)
                .with_context(|| format!("converting {}", input.display()))?;
            write_geojson(&layer, &output).with_context(|| format!("writing {}", output.display()))?;
            info!(output = %output.display(), points = layer.len(), "Done");
        }

        Commands::ReprojectLayer {
            input,
            output,
            source_epsg,
            subset,
            seed,
            id_seed,
        } => {
            let layer = read_geojson(&input, source_epsg).with_context(|| format!("reading {}", input.display()))?;
            let mut layer = reproject_layer(layer, &ReprojectOptions { id_seed })
                .with_context(|| format!("reprojecting {}", input.display()))?;
            if let Some(n) = subset {
                layer = subset_layer(layer, n, seed)?;
            }
            write_geojson(&layer, &output).with_context(|| format!("writing {}", output.display()))?;
            info!(output = %output.display(), features = layer.len(), "Done");
        }
    }

    Ok(())
}
