//! Decodes a synthetic clip written with FFmpeg. Every frame carries its own
//! index in luma: the left half holds `index / 16`, the right half
//! `index % 16`, each digit stepped by `LUMA_STEP` above video black.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format::Pixel;
use ffmpeg::util::frame::video::Video;
use ffmpeg::{Packet, Rational};
use ffmpeg_ort::extractor::{self, VideoSource};
use image::RgbImage;
use inference_common::frame_meta::SampledFrame;
use inference_common::sampling::SamplingPlan;
use tempfile::TempDir;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
const FPS: i32 = 25;
const FRAMES: u32 = 200;
const LUMA_BLACK: u8 = 16;
const LUMA_STEP: u8 = 13;

fn luma_digits(index: u32) -> (u8, u8) {
    let digit = |d: u32| LUMA_BLACK + d as u8 * LUMA_STEP;
    (digit(index / 16), digit(index % 16))
}

fn synthetic_frame(index: u32) -> Video {
    let mut frame = Video::new(Pixel::YUV420P, WIDTH, HEIGHT);
    let (left, right) = luma_digits(index);
    let stride = frame.stride(0);
    let luma = frame.data_mut(0);
    for y in 0..HEIGHT as usize {
        for x in 0..WIDTH as usize {
            luma[y * stride + x] = if x < WIDTH as usize / 2 { left } else { right };
        }
    }
    frame.data_mut(1).fill(128);
    frame.data_mut(2).fill(128);
    frame.set_pts(Some(index as i64));
    frame
}

fn drain(
    encoder: &mut ffmpeg::encoder::video::Encoder,
    output: &mut ffmpeg::format::context::Output,
    encoder_time_base: Rational,
    stream_time_base: Rational,
) -> Result<(), ffmpeg::Error> {
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(0);
        packet.rescale_ts(encoder_time_base, stream_time_base);
        packet.write_interleaved(output)?;
    }
    Ok(())
}

/// Writes `FRAMES` intra-only FFV1 frames into an AVI container.
fn write_clip(path: &Path) -> Result<(), ffmpeg::Error> {
    ffmpeg::init()?;
    let mut output = ffmpeg::format::output(&path)?;
    let codec = ffmpeg::encoder::find(codec::Id::FFV1).ok_or(ffmpeg::Error::EncoderNotFound)?;
    let time_base = Rational::new(1, FPS);

    let mut encoder = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()?;
    encoder.set_width(WIDTH);
    encoder.set_height(HEIGHT);
    encoder.set_format(Pixel::YUV420P);
    encoder.set_time_base(time_base);
    encoder.set_frame_rate(Some(Rational::new(FPS, 1)));
    if output
        .format()
        .flags()
        .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    {
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);
    }
    let mut encoder = encoder.open_as(codec)?;

    {
        let mut stream = output.add_stream(codec)?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);
    }
    output.write_header()?;
    let stream_time_base = output
        .stream(0)
        .ok_or(ffmpeg::Error::StreamNotFound)?
        .time_base();

    for index in 0..FRAMES {
        encoder.send_frame(&synthetic_frame(index))?;
        drain(&mut encoder, &mut output, time_base, stream_time_base)?;
    }
    encoder.send_eof()?;
    drain(&mut encoder, &mut output, time_base, stream_time_base)?;
    output.write_trailer()?;
    Ok(())
}

fn clip() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counter.avi");
    write_clip(&path).expect("write synthetic clip");
    (dir, path)
}

/// Reads the frame index back from the luma digits.
fn decoded_index(image: &RgbImage) -> u64 {
    // Limited-range luma expands by 255/219 on the way to RGB.
    let step = LUMA_STEP as f64 * 255.0 / 219.0;
    let digit = |x: u32| (image.get_pixel(x, HEIGHT / 2)[0] as f64 / step).round() as u64;
    digit(WIDTH / 4) * 16 + digit(WIDTH * 3 / 4)
}

fn assert_frames_match(frames: &[SampledFrame], expected: &[u64]) {
    let indices: Vec<u64> = frames.iter().map(|f| f.stamp.frame_index).collect();
    assert_eq!(indices, expected);
    for (sequence, frame) in frames.iter().enumerate() {
        let index = frame.stamp.frame_index;
        assert_eq!(frame.stamp.sequence_index, sequence);
        assert!((frame.stamp.timestamp_seconds - index as f64 / FPS as f64).abs() < 1e-9);
        assert_eq!(frame.image.dimensions(), (WIDTH, HEIGHT));
        assert_eq!(decoded_index(&frame.image), index, "pixels of frame {index}");
    }
}

#[test]
fn reports_container_metadata() {
    let (_dir, path) = clip();
    let source = VideoSource::open(&path).unwrap();
    let meta = source.meta();
    assert_eq!(meta.total_frames, FRAMES as u64);
    assert!((meta.fps - FPS as f64).abs() < 1e-6);
    assert!((meta.duration_seconds - 8.0).abs() < 1e-6);
    assert_eq!((meta.width, meta.height), (WIDTH, HEIGHT));
}

#[test]
fn short_video_is_sampled_by_stride() {
    let (_dir, path) = clip();
    let (frames, meta) = extractor::extract(&path, 30, 10).unwrap();
    let expected: Vec<u64> = (0..FRAMES as u64).step_by(10).collect();
    assert_eq!(meta.sampling_plan(30, 10).indices(), expected.as_slice());
    assert_frames_match(&frames, &expected);
}

#[test]
fn long_video_is_spread_with_seeks() {
    let (_dir, path) = clip();
    // Gaps of ~100 frames exceed the two second forward decode window.
    let (frames, _) = extractor::extract(&path, 3, 10).unwrap();
    assert_frames_match(&frames, &[0, 99, 199]);

    let (frames, _) = extractor::extract(&path, 5, 10).unwrap();
    assert_frames_match(&frames, &[0, 49, 99, 149, 199]);
    assert!(frames.len() <= 5);
}

#[test]
fn repeated_and_earlier_targets_decode_the_right_frame() {
    let (_dir, path) = clip();
    let mut source = VideoSource::open(&path).unwrap();

    let first = source.read_frame(120).unwrap();
    let again = source.read_frame(120).unwrap();
    assert_eq!(decoded_index(&first), 120);
    assert_eq!(first, again);

    assert_eq!(decoded_index(&source.read_frame(30).unwrap()), 30);
    assert_eq!(decoded_index(&source.read_frame(31).unwrap()), 31);
    assert_eq!(decoded_index(&source.read_frame(75).unwrap()), 75);
}

#[test]
fn frames_past_the_end_are_skipped() {
    let (_dir, path) = clip();
    let mut source = VideoSource::open(&path).unwrap();

    assert!(source.read_frame(FRAMES as u64 + 50).is_err());
    assert_eq!(decoded_index(&source.read_frame(10).unwrap()), 10);

    let frames = source.sample(&SamplingPlan::new(400, 4, 100));
    assert_frames_match(&frames, &[0, 100]);
}
