//! Sampled frame extraction with FFmpeg.

use std::path::{Path, PathBuf};

use ffmpeg::format::{context::Input, Pixel};
use ffmpeg::media::Type;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video;
use ffmpeg::{Packet, Rational};
use image::RgbImage;
use inference_common::frame_meta::{FrameStamp, SampledFrame};
use inference_common::sampling::SamplingPlan;
use inference_common::video_meta::VideoMeta;
use thiserror::Error;

/// `AV_TIME_BASE`: container-level seek timestamps are in microseconds.
const SEEK_TIME_BASE: f64 = 1_000_000.0;
/// Targets closer than this many seconds ahead are reached by decoding
/// forward instead of seeking.
const FORWARD_DECODE_SECONDS: f64 = 2.0;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unable to open video {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: ffmpeg::Error,
    },

    #[error("no video stream found")]
    NoVideoStream,

    #[error("decode error: {0}")]
    Decode(#[from] ffmpeg::Error),

    #[error("frame {0} is past the end of the stream")]
    FrameUnavailable(u64),

    #[error("decoded frame has an unexpected buffer layout")]
    Convert,
}

/// An open video container positioned somewhere in its best video stream.
/// The demuxer and decoder are released when this is dropped.
pub struct VideoSource {
    input: Input,
    stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    decoder: ffmpeg::decoder::Video,
    scaler: Scaler,
    meta: VideoMeta,
    decoded: Video,
    cursor: FrameCursor,
    eof: bool,
    last: Option<(u64, RgbImage)>,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        let open_error = |source| ExtractError::Open {
            path: path.to_path_buf(),
            source,
        };
        ffmpeg::init().map_err(open_error)?;
        let input = ffmpeg::format::input(&path).map_err(open_error)?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(ExtractError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_pts = match stream.start_time() {
            i64::MIN => 0,
            pts => pts,
        };
        let rate = stream.avg_frame_rate();
        let fps = if rate.numerator() > 0 && rate.denominator() > 0 {
            f64::from(rate)
        } else {
            0.0
        };
        let reported_frames = stream.frames();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(open_error)?;
        let decoder = context.decoder().video().map_err(open_error)?;
        let (width, height) = (decoder.width(), decoder.height());
        let scaler = Scaler::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )
        .map_err(open_error)?;

        let total_frames = if reported_frames > 0 {
            reported_frames as u64
        } else {
            // Containers without a frame count: estimate from the duration.
            let seconds = input.duration().max(0) as f64 / SEEK_TIME_BASE;
            (seconds * fps).round() as u64
        };
        let meta = VideoMeta::new(total_frames, fps, width, height);
        log::info!(
            "Video: {} frames, {:.1} FPS, {:.1}s",
            meta.total_frames,
            meta.fps,
            meta.duration_seconds
        );

        Ok(Self {
            input,
            stream_index,
            time_base,
            start_pts,
            decoder,
            scaler,
            meta,
            decoded: Video::empty(),
            cursor: FrameCursor::default(),
            eof: false,
            last: None,
        })
    }

    pub fn meta(&self) -> &VideoMeta {
        &self.meta
    }

    /// Decodes frame `target` as RGB.
    pub fn read_frame(&mut self, target: u64) -> Result<RgbImage, ExtractError> {
        if let Some((number, image)) = &self.last {
            if *number == target {
                return Ok(image.clone());
            }
        }

        if self.needs_seek(target) {
            self.seek(target)?;
        }
        loop {
            match self.decode_next()? {
                Some(number) if number >= target => break,
                Some(_) => continue,
                None => return Err(ExtractError::FrameUnavailable(target)),
            }
        }

        let image = self.convert()?;
        self.last = Some((target, image.clone()));
        Ok(image)
    }

    /// Decodes every planned frame in order. Frames that fail to decode are
    /// logged and skipped, so the result may be shorter than the plan.
    pub fn sample(&mut self, plan: &SamplingPlan) -> Vec<SampledFrame> {
        let fps = self.meta.fps;
        plan.indices()
            .iter()
            .enumerate()
            .filter_map(|(sequence, &frame_index)| match self.read_frame(frame_index) {
                Ok(image) => Some(SampledFrame {
                    stamp: FrameStamp::new(frame_index, sequence, fps),
                    image,
                }),
                Err(err) => {
                    log::warn!("Skipping frame {frame_index}: {err}");
                    None
                }
            })
            .collect()
    }

    fn needs_seek(&self, target: u64) -> bool {
        let fps = self.meta.fps;
        if fps <= 0.0 {
            // No timestamps to seek by; only a rewind helps.
            return self.cursor.position.is_some_and(|p| target <= p);
        }
        let window = (fps * FORWARD_DECODE_SECONDS) as u64;
        match self.cursor.position {
            None => target > window,
            Some(p) => target <= p || target - p > window,
        }
    }

    fn seek(&mut self, target: u64) -> Result<(), ExtractError> {
        let fps = self.meta.fps;
        let (ts, landing) = if fps > 0.0 {
            ((target as f64 / fps * SEEK_TIME_BASE) as i64, target)
        } else {
            (0, 0)
        };
        log::debug!("Seeking to frame {target} ({ts}us)");
        self.input.seek(ts, ..ts)?;
        self.decoder.flush();
        self.cursor.seeked(landing);
        self.eof = false;
        Ok(())
    }

    /// Advances the decoder by one frame. `None` once the stream is drained.
    fn decode_next(&mut self) -> Result<Option<u64>, ExtractError> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded).is_ok() {
                let pts_number = frame_number(
                    self.decoded.timestamp(),
                    self.start_pts,
                    self.time_base,
                    self.meta.fps,
                );
                return Ok(Some(self.cursor.advance(pts_number)));
            }
            if self.eof {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => {
                    self.decoder.send_packet(&packet)?;
                }
                Ok(()) => {}
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof = true;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn convert(&mut self) -> Result<RgbImage, ExtractError> {
        let mut rgb = Video::empty();
        self.scaler.run(&self.decoded, &mut rgb)?;
        frame_to_image(&rgb)
    }
}

/// Frame number of the frame last handed out by the decoder.
#[derive(Debug, Default)]
struct FrameCursor {
    position: Option<u64>,
    /// Where counting restarts after a seek when frames carry no timestamp.
    resume_from: u64,
}

impl FrameCursor {
    fn seeked(&mut self, landing: u64) {
        self.position = None;
        self.resume_from = landing;
    }

    /// Records the next decoded frame. Frames without a usable timestamp
    /// follow the previous one, or the seek landing point.
    fn advance(&mut self, pts_number: Option<u64>) -> u64 {
        let number = pts_number
            .unwrap_or_else(|| self.position.map_or(self.resume_from, |p| p + 1));
        self.position = Some(number);
        number
    }
}

/// Maps a presentation timestamp to a frame number. `None` without a
/// timestamp or a known frame rate.
fn frame_number(pts: Option<i64>, start_pts: i64, time_base: Rational, fps: f64) -> Option<u64> {
    let pts = pts?;
    if fps <= 0.0 {
        return None;
    }
    let seconds = (pts - start_pts) as f64 * f64::from(time_base);
    Some((seconds * fps).round().max(0.0) as u64)
}

/// Copies an RGB24 frame into an image, dropping row padding.
fn frame_to_image(frame: &Video) -> Result<RgbImage, ExtractError> {
    let (width, height) = (frame.width(), frame.height());
    let stride = frame.stride(0);
    let row = width as usize * 3;
    let data = frame.data(0);

    let mut buf = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        let line = data.get(start..start + row).ok_or(ExtractError::Convert)?;
        buf.extend_from_slice(line);
    }
    RgbImage::from_raw(width, height, buf).ok_or(ExtractError::Convert)
}

/// Opens `path`, samples it and closes it again.
pub fn extract(
    path: &Path,
    max_frames: usize,
    sample_rate: u64,
) -> Result<(Vec<SampledFrame>, VideoMeta), ExtractError> {
    let mut source = VideoSource::open(path)?;
    let plan = source.meta().sampling_plan(max_frames, sample_rate);
    let frames = source.sample(&plan);
    log::info!("{} frames extracted", frames.len());
    Ok((frames, source.meta))
}
