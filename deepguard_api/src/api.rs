use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::{get, post},
    Router,
};
use ffmpeg_ort::pipeline::VideoAnalyzer;
use image::RgbImage;
use inference_common::options::AnalysisOptions;
use inference_common::prediction::{Classifier, Prediction};
use inference_common::report::VideoReport;
use inference_common::rounding;
use ort_common::classifier::MODEL_VERSION;
use ort_common::registry::Models;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::{ApiError, ApiResult};
use crate::upload::UploadedVideo;

/// Largest accepted request body.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
pub const MAX_BATCH_FILES: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub models: &'static Models,
    /// Settings applied to every uploaded video.
    pub video_options: AnalysisOptions,
    /// Parent of the per-request directories uploaded videos are written to.
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(models: &'static Models) -> Self {
        Self {
            models,
            video_options: AnalysisOptions::new(20, 15, true),
            upload_dir: std::env::temp_dir(),
        }
    }

    pub fn with_upload_dir(mut self, upload_dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = upload_dir.into();
        self
    }
}

#[derive(Debug, Serialize)]
struct ImagePrediction {
    #[serde(flatten)]
    prediction: Prediction,
    #[serde(serialize_with = "rounding::two_decimals")]
    processing_time_ms: f64,
    filename: Option<String>,
    image_size: [u32; 2],
    #[serde(serialize_with = "rounding::two_decimals")]
    file_size_kb: f64,
    model_version: &'static str,
}

#[derive(Debug, Serialize)]
struct BatchItem {
    #[serde(flatten)]
    prediction: Prediction,
    filename: Option<String>,
    index: usize,
}

#[derive(Debug, Serialize)]
struct BatchError {
    filename: Option<String>,
    index: usize,
    error: String,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    total: usize,
    success: usize,
    errors: usize,
    results: Vec<BatchItem>,
    error_details: Option<Vec<BatchError>>,
}

#[derive(Debug, Serialize)]
struct VideoResponse {
    #[serde(flatten)]
    report: VideoReport,
    filename: Option<String>,
    #[serde(serialize_with = "rounding::two_decimals")]
    file_size_mb: f64,
}

/// One multipart file field, read fully into memory.
struct Upload {
    filename: Option<String>,
    bytes: Vec<u8>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/info", get(model_info))
        .route("/video/info", get(video_info))
        .route("/predict", post(predict_image))
        .route("/predict/batch", post(predict_batch))
        .route("/predict/video", post(predict_video))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "name": "DeepGuard API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Real-time deepfake detection for images and videos",
        "endpoints": {
            "health": "/health",
            "info": "/info",
            "predict": "/predict",
            "predict_batch": "/predict/batch",
            "predict_video": "/predict/video",
            "video_info": "/video/info"
        },
        "status": "operational"
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.models.is_loaded(),
        "timestamp": unix_timestamp(),
    }))
}

async fn model_info() -> Json<serde_json::Value> {
    Json(json!({
        "model": {
            "version": MODEL_VERSION,
            "architecture": "ConvNeXt-Base",
            "runtime": "ONNX Runtime",
            "input_size": "224x224",
            "classes": ["real", "fake"]
        },
        "preprocessing": {
            "resize": "224x224",
            "normalization": "ImageNet (mean=[0.485, 0.456, 0.406], std=[0.229, 0.224, 0.225])",
            "augmentation": "None (inference mode)"
        }
    }))
}

async fn video_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let options = state.video_options;
    Json(json!({
        "video_analysis": {
            "supported_formats": [".mp4", ".avi", ".mov", ".mkv", ".webm"],
            "max_frames_analyzed": options.max_frames,
            "sample_rate": format!("1 frame every {} frames", options.sample_rate),
            "face_detection": "MTCNN",
            "aggregation_method": "Confidence-weighted majority vote"
        },
        "process": {
            "1": "Extract sample frames from video",
            "2": "Detect faces in each frame (MTCNN)",
            "3": "Predict deepfake on each face (ConvNeXt-Base)",
            "4": "Aggregate results with confidence weighting",
            "5": "Return final prediction + details"
        }
    }))
}

/// Reads every file field called `name`.
async fn read_files(multipart: &mut Multipart, name: &str) -> ApiResult<Vec<Upload>> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await?.to_vec();
        uploads.push(Upload { filename, bytes });
    }
    Ok(uploads)
}

async fn read_file(multipart: &mut Multipart, name: &str) -> ApiResult<Upload> {
    read_files(multipart, name)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request(format!("missing multipart field `{name}`")))
}

fn decode_image(bytes: &[u8]) -> ApiResult<RgbImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|err| ApiError::bad_request(format!("Invalid image: {err}")))
}

/// Runs the classifier off the async runtime.
async fn classify(classifier: Arc<dyn Classifier>, image: RgbImage) -> ApiResult<Prediction> {
    tokio::task::spawn_blocking(move || classifier.predict(&image))
        .await
        .map_err(|err| ApiError::internal(format!("classification task failed: {err}")))?
        .map_err(|err| ApiError::internal(format!("Processing error: {err}")))
}

async fn predict_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImagePrediction>> {
    let upload = read_file(&mut multipart, "file").await?;
    info!("New prediction: {:?}", upload.filename);

    let classifier = state.models.classifier.get()?;
    let image = decode_image(&upload.bytes)?;
    let image_size = [image.width(), image.height()];

    let started = Instant::now();
    let prediction = classify(classifier, image).await?;
    let processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!(
        "Prediction: {} (confidence: {:.2}%)",
        prediction.prediction,
        prediction.confidence * 100.0
    );

    Ok(Json(ImagePrediction {
        prediction,
        processing_time_ms,
        filename: upload.filename,
        image_size,
        file_size_kb: upload.bytes.len() as f64 / 1024.0,
        model_version: MODEL_VERSION,
    }))
}

async fn predict_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<BatchResponse>> {
    let uploads = read_files(&mut multipart, "files").await?;
    info!("Batch prediction: {} images", uploads.len());
    if uploads.is_empty() {
        return Err(ApiError::bad_request("missing multipart field `files`"));
    }
    if uploads.len() > MAX_BATCH_FILES {
        return Err(ApiError::bad_request(format!(
            "Maximum {MAX_BATCH_FILES} images per batch"
        )));
    }
    let classifier = state.models.classifier.get()?;

    let total = uploads.len();
    let mut results = Vec::new();
    let mut errors = Vec::new();
    for (index, upload) in uploads.into_iter().enumerate() {
        let outcome = match decode_image(&upload.bytes) {
            Ok(image) => classify(classifier.clone(), image).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(prediction) => results.push(BatchItem {
                prediction,
                filename: upload.filename,
                index,
            }),
            Err(err) => {
                warn!("Error on {:?}: {err}", upload.filename);
                errors.push(BatchError {
                    filename: upload.filename,
                    index,
                    error: err.to_string(),
                });
            }
        }
    }
    info!(
        "Batch finished: {} succeeded, {} failed",
        results.len(),
        errors.len()
    );

    Ok(Json(BatchResponse {
        total,
        success: results.len(),
        errors: errors.len(),
        results,
        error_details: (!errors.is_empty()).then_some(errors),
    }))
}

async fn predict_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<VideoResponse>> {
    let upload = read_file(&mut multipart, "file").await?;
    info!("New video analysis: {:?}", upload.filename);

    let analyzer = VideoAnalyzer::new(
        state.models.face_locator.get()?,
        state.models.classifier.get()?,
    );
    let options = state.video_options;
    let upload_dir = state.upload_dir.clone();
    let filename = upload.filename.clone();

    // The temporary copy is owned by the blocking task, so it is removed once
    // analysis ends even if this request has been dropped by then.
    let (report, file_size_mb) = tokio::task::spawn_blocking(move || {
        let video =
            UploadedVideo::persist(&upload_dir, upload.filename.as_deref(), &upload.bytes)?;
        info!("Video saved ({:.1}MB)", video.size_mb());
        let report = analyzer.analyze(video.path(), &options);
        let size = video.size_mb();
        if let Err(err) = video.cleanup() {
            warn!("Temp cleanup failed: {err}");
        }
        Ok::<_, std::io::Error>((report, size))
    })
    .await
    .map_err(|err| ApiError::internal(format!("analysis task failed: {err}")))?
    .map_err(|err| ApiError::internal(format!("Failed to store upload: {err}")))?;

    match &report {
        VideoReport::Verdict(verdict) => info!(
            "Video analyzed: {} ({:.1}%)",
            verdict.prediction,
            verdict.confidence * 100.0
        ),
        VideoReport::Failure(failure) => error!("Video analysis failed: {}", failure.error),
    }

    Ok(Json(VideoResponse {
        report,
        filename,
        file_size_mb,
    }))
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = create_router(state);

    let addr = format!("{host}:{port}");
    info!("REST API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
