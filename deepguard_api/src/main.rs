use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use deepguard_api::api::{self, AppState};
use ort_common::classifier::DeepfakeClassifier;
use ort_common::mtcnn::MtcnnFaceLocator;
use ort_common::registry::MODELS;
use ort_common::session;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
pub struct Args {
    /// Address to bind.
    #[arg(long, env = "DEEPGUARD_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "DEEPGUARD_PORT", default_value_t = 7860)]
    port: u16,
    /// Deepfake classifier onnx model file to use.
    #[arg(
        long,
        env = "DEEPGUARD_CLASSIFIER",
        default_value = "_models/deepfake_convnext.onnx"
    )]
    classifier: PathBuf,
    /// Directory holding pnet.onnx, rnet.onnx and onet.onnx.
    #[arg(long, env = "DEEPGUARD_MTCNN_DIR", default_value = "_models/mtcnn")]
    mtcnn_dir: PathBuf,
    /// Whether to attempt to use `cuda` hw acceleration.
    #[arg(long, env = "DEEPGUARD_CUDA", action, default_value = "false")]
    cuda: bool,
    /// Where uploaded videos are stored while they are analyzed. Defaults to
    /// the system temp directory.
    #[arg(long, env = "DEEPGUARD_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    tracing::info!("Starting DeepGuard API");

    let ep_name = session::init_runtime(args.cuda)?;
    let classifier = DeepfakeClassifier::new(&args.classifier)
        .with_context(|| format!("loading classifier {:?}", args.classifier))?;
    let locator = MtcnnFaceLocator::from_dir(&args.mtcnn_dir)
        .with_context(|| format!("loading MTCNN from {:?}", args.mtcnn_dir))?;
    MODELS.classifier.install(Arc::new(classifier))?;
    MODELS.face_locator.install(Arc::new(locator))?;
    tracing::info!("Models loaded on {ep_name}");

    let mut state = AppState::new(&MODELS);
    if let Some(upload_dir) = args.upload_dir {
        state = state.with_upload_dir(upload_dir);
    }
    api::serve(state, &args.host, args.port).await
}
