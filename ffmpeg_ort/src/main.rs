use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ffmpeg_ort::pipeline::VideoAnalyzer;
use inference_common::options::AnalysisOptions;
use ort_common::classifier::DeepfakeClassifier;
use ort_common::mtcnn::MtcnnFaceLocator;
use ort_common::session;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
pub struct Args {
    /// Path to input video file (.mp4/.avi/.mov/.mkv/.webm).
    input: PathBuf,
    /// Whether to attempt to use `cuda` hw acceleration.
    /// This may silently fail and fallback to cpu acceleration presently.
    #[arg(long, action, default_value = "false")]
    cuda: bool,
    /// Deepfake classifier onnx model file to use.
    #[arg(long, short, default_value = "_models/deepfake_convnext.onnx")]
    classifier: PathBuf,
    /// Directory holding pnet.onnx, rnet.onnx and onet.onnx.
    #[arg(long, default_value = "_models/mtcnn")]
    mtcnn_dir: PathBuf,
    /// Upper bound on analyzed frames, clamped to 5..=60.
    #[arg(long, default_value_t = 30)]
    max_frames: usize,
    /// Take one frame every N frames.
    #[arg(long, default_value_t = 10)]
    sample_rate: u64,
    /// Embed base64 JPEG thumbnails in the report.
    #[arg(long, action)]
    thumbnails: bool,
    /// Pretty-print the JSON report.
    #[arg(long, action)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,ffmpeg_ort=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let ep_name = session::init_runtime(args.cuda)?;
    let classifier = DeepfakeClassifier::new(&args.classifier)
        .with_context(|| format!("loading classifier {:?}", args.classifier))?;
    let locator = MtcnnFaceLocator::from_dir(&args.mtcnn_dir)
        .with_context(|| format!("loading MTCNN from {:?}", args.mtcnn_dir))?;
    log::info!("Prepared ort {ep_name} sessions");

    let analyzer = VideoAnalyzer::new(Arc::new(locator), Arc::new(classifier));
    let options = AnalysisOptions::new(args.max_frames, args.sample_rate, args.thumbnails);
    let report = analyzer.analyze(&args.input, &options);

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
