//! `parallax` -- feature extraction and matching pipeline CLI.
//!
//! One subcommand per job kind. Exit status is 0 for success (including the
//! deliberate no-op when the resolved input set is empty) and 1 for any
//! configuration error or worker failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parallax_pipeline::options::{
    ExhaustiveMatchingOptions, ExtractionOptions, ImportOptions, MatchesImportOptions,
    MatchingOptions, SequentialMatchingOptions, SpatialMatchingOptions, TransitiveMatchingOptions,
    VocabTreeMatchingOptions, DEFAULT_CAMERA_MODEL,
};
use parallax_pipeline::{
    run_exhaustive_matcher, run_feature_extractor, run_feature_importer, run_matches_importer,
    run_sequential_matcher, run_spatial_matcher, run_transitive_matcher, run_vocab_tree_matcher,
    DispatchReport, DispatchStatus,
};

#[derive(Parser)]
#[command(name = "parallax", about = "Feature extraction and matching pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute descriptors for every image under the image path.
    FeatureExtractor(FeatureExtractorArgs),
    /// Import externally computed descriptors.
    FeatureImporter(FeatureImporterArgs),
    /// Match all image pairs.
    ExhaustiveMatcher(ExhaustiveMatcherArgs),
    /// Match order-adjacent images.
    SequentialMatcher(SequentialMatcherArgs),
    /// Match spatially neighbouring images.
    SpatialMatcher(SpatialMatcherArgs),
    /// Expand the existing match graph transitively.
    TransitiveMatcher(TransitiveMatcherArgs),
    /// Match visually similar images.
    VocabTreeMatcher(VocabTreeMatcherArgs),
    /// Import an external pair or match list.
    MatchesImporter(MatchesImporterArgs),
}

#[derive(Args)]
struct CameraArgs {
    #[arg(long, env = "PARALLAX_CAMERA_MODEL", default_value = DEFAULT_CAMERA_MODEL)]
    camera_model: String,

    /// Comma-separated parameters; leave empty to defer estimation.
    #[arg(long, default_value = "")]
    camera_params: String,
}

#[derive(Args)]
struct MatchingArgs {
    #[arg(long, env = "PARALLAX_STORE_PATH")]
    store_path: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    use_gpu: bool,

    #[arg(long, default_value_t = 0.8)]
    max_ratio: f32,

    #[arg(long, default_value_t = 0.7)]
    max_distance: f32,
}

impl MatchingArgs {
    fn into_options(self) -> MatchingOptions {
        MatchingOptions {
            store_path: self.store_path,
            use_gpu: self.use_gpu,
            max_ratio: self.max_ratio,
            max_distance: self.max_distance,
        }
    }
}

#[derive(Args)]
struct FeatureExtractorArgs {
    #[arg(long, env = "PARALLAX_STORE_PATH")]
    store_path: PathBuf,

    #[arg(long)]
    image_path: PathBuf,

    /// Explicit image list; takes precedence over the directory scan.
    #[arg(long)]
    image_list_path: Option<PathBuf>,

    #[command(flatten)]
    camera: CameraArgs,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    use_gpu: bool,
}

#[derive(Args)]
struct FeatureImporterArgs {
    #[arg(long, env = "PARALLAX_STORE_PATH")]
    store_path: PathBuf,

    #[arg(long)]
    image_path: PathBuf,

    /// Directory of externally computed descriptor files.
    #[arg(long)]
    import_path: PathBuf,

    #[arg(long)]
    image_list_path: Option<PathBuf>,

    #[command(flatten)]
    camera: CameraArgs,
}

#[derive(Args)]
struct ExhaustiveMatcherArgs {
    #[command(flatten)]
    matching: MatchingArgs,
}

#[derive(Args)]
struct SequentialMatcherArgs {
    #[command(flatten)]
    matching: MatchingArgs,

    #[arg(long, default_value_t = 10)]
    overlap: usize,

    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    loop_detection: bool,

    #[arg(long, default_value_t = 10)]
    loop_detection_period: usize,

    #[arg(long, default_value_t = 50)]
    loop_detection_num_images: usize,
}

#[derive(Args)]
struct SpatialMatcherArgs {
    #[command(flatten)]
    matching: MatchingArgs,

    #[arg(long, default_value_t = 50)]
    max_num_neighbors: usize,

    /// Neighbourhood radius, in the unit of the stored image locations.
    #[arg(long = "max-spatial-distance", default_value_t = 100.0)]
    max_distance: f64,
}

#[derive(Args)]
struct TransitiveMatcherArgs {
    #[command(flatten)]
    matching: MatchingArgs,

    #[arg(long, default_value_t = 3)]
    num_iterations: usize,
}

#[derive(Args)]
struct VocabTreeMatcherArgs {
    #[command(flatten)]
    matching: MatchingArgs,

    #[arg(long, default_value_t = 100)]
    num_nearest: usize,
}

#[derive(Args)]
struct MatchesImporterArgs {
    #[command(flatten)]
    matching: MatchingArgs,

    #[arg(long)]
    match_list_path: PathBuf,

    /// One of: pairs, raw, inliers.
    #[arg(long, default_value = "pairs")]
    match_type: String,
}

async fn run(command: Command) -> anyhow::Result<DispatchReport> {
    let report = match command {
        Command::FeatureExtractor(args) => {
            let options = ExtractionOptions {
                store_path: args.store_path,
                image_path: args.image_path,
                image_list_path: args.image_list_path,
                camera_model: args.camera.camera_model,
                camera_params: args.camera.camera_params,
                use_gpu: args.use_gpu,
            };
            run_feature_extractor(&options).await?
        }
        Command::FeatureImporter(args) => {
            let options = ImportOptions {
                store_path: args.store_path,
                image_path: args.image_path,
                import_path: args.import_path,
                image_list_path: args.image_list_path,
                camera_model: args.camera.camera_model,
                camera_params: args.camera.camera_params,
            };
            run_feature_importer(&options).await?
        }
        Command::ExhaustiveMatcher(args) => {
            let options = ExhaustiveMatchingOptions {
                matching: args.matching.into_options(),
            };
            run_exhaustive_matcher(&options).await?
        }
        Command::SequentialMatcher(args) => {
            let options = SequentialMatchingOptions {
                matching: args.matching.into_options(),
                overlap: args.overlap,
                loop_detection: args.loop_detection,
                loop_detection_period: args.loop_detection_period,
                loop_detection_num_images: args.loop_detection_num_images,
            };
            run_sequential_matcher(&options).await?
        }
        Command::SpatialMatcher(args) => {
            let options = SpatialMatchingOptions {
                matching: args.matching.into_options(),
                max_num_neighbors: args.max_num_neighbors,
                max_distance: args.max_distance,
            };
            run_spatial_matcher(&options).await?
        }
        Command::TransitiveMatcher(args) => {
            let options = TransitiveMatchingOptions {
                matching: args.matching.into_options(),
                num_iterations: args.num_iterations,
            };
            run_transitive_matcher(&options).await?
        }
        Command::VocabTreeMatcher(args) => {
            let options = VocabTreeMatchingOptions {
                matching: args.matching.into_options(),
                num_nearest: args.num_nearest,
            };
            run_vocab_tree_matcher(&options).await?
        }
        Command::MatchesImporter(args) => {
            let options = MatchesImportOptions {
                matching: args.matching.into_options(),
                match_list_path: args.match_list_path,
                match_type: args.match_type,
            };
            run_matches_importer(&options).await?
        }
    };
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parallax=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(report) => {
            match report.status {
                DispatchStatus::Completed => tracing::info!(
                    resolved_items = report.resolved_items,
                    gpu_context_used = report.gpu_context_used,
                    "Done",
                ),
                DispatchStatus::SkippedEmptyInput => {
                    tracing::info!("Nothing to do (empty input set)")
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
