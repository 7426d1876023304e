//! Box geometry for the MTCNN cascade. Coordinates are `f32` pixels in the
//! source frame.

use std::cmp::Ordering;

/// PNet sees the image through a 12x12 window moved with stride 2.
const PNET_STRIDE: f32 = 2.0;
const PNET_CELL: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    /// Pending bounding-box regression offsets (dx1, dy1, dx2, dy2).
    pub reg: [f32; 4],
}

impl Candidate {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
            reg: [0.0; 4],
        }
    }
}

/// How two boxes' overlap is measured during suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// Intersection over union on continuous coordinates.
    Union,
    /// Intersection over the smaller box, with inclusive pixel extents.
    Min,
}

/// Scales at which PNet runs so that faces of `min_face` pixels and larger
/// map onto its 12 pixel window.
pub fn scale_pyramid(width: u32, height: u32, min_face: f32, factor: f32) -> Vec<f32> {
    let m = PNET_CELL / min_face;
    let mut min_side = width.min(height) as f32 * m;
    let mut scale = m;
    let mut scales = Vec::new();
    while min_side >= PNET_CELL {
        scales.push(scale);
        scale *= factor;
        min_side *= factor;
    }
    scales
}

/// Size of the image fed to PNet at `scale`.
pub fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    (
        (width as f32 * scale + 1.0) as u32,
        (height as f32 * scale + 1.0) as u32,
    )
}

/// Turns a PNet face-probability map (`map_h * map_w`) and its regression
/// planes (`4 * map_h * map_w`) into candidate windows in frame coordinates.
pub fn generate_candidates(
    prob: &[f32],
    reg: &[f32],
    map_w: usize,
    map_h: usize,
    scale: f32,
    threshold: f32,
) -> Vec<Candidate> {
    let plane = map_w * map_h;
    let mut candidates = Vec::new();
    for y in 0..map_h {
        for x in 0..map_w {
            let i = y * map_w + x;
            let score = prob[i];
            if score < threshold {
                continue;
            }
            let (bx, by) = (x as f32, y as f32);
            candidates.push(Candidate {
                x1: ((PNET_STRIDE * bx + 1.0) / scale).floor(),
                y1: ((PNET_STRIDE * by + 1.0) / scale).floor(),
                x2: ((PNET_STRIDE * bx + PNET_CELL) / scale).floor(),
                y2: ((PNET_STRIDE * by + PNET_CELL) / scale).floor(),
                score,
                reg: [reg[i], reg[plane + i], reg[2 * plane + i], reg[3 * plane + i]],
            });
        }
    }
    candidates
}

fn by_score_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.score.total_cmp(&a.score)
}

fn overlap(a: &Candidate, b: &Candidate, mode: Overlap) -> f32 {
    let pad = match mode {
        Overlap::Union => 0.0,
        Overlap::Min => 1.0,
    };
    let area = |c: &Candidate| (c.x2 - c.x1 + pad) * (c.y2 - c.y1 + pad);
    let w = (a.x2.min(b.x2) - a.x1.max(b.x1) + pad).max(0.0);
    let h = (a.y2.min(b.y2) - a.y1.max(b.y1) + pad).max(0.0);
    let inter = w * h;
    let denom = match mode {
        Overlap::Union => area(a) + area(b) - inter,
        Overlap::Min => area(a).min(area(b)),
    };
    if denom <= 0.0 { 0.0 } else { inter / denom }
}

/// Greedy non-maximum suppression. Keeps the best box, drops every box
/// overlapping it by more than `threshold`, repeats. Output is ordered by
/// descending score.
pub fn nms(mut candidates: Vec<Candidate>, threshold: f32, mode: Overlap) -> Vec<Candidate> {
    candidates.sort_by(by_score_desc);
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept
            .iter()
            .all(|best| overlap(best, &candidate, mode) <= threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

/// Applies PNet's pending offsets, scaled by the window's extent.
pub fn regress_window(c: &Candidate) -> Candidate {
    let w = c.x2 - c.x1;
    let h = c.y2 - c.y1;
    Candidate::new(
        c.x1 + c.reg[0] * w,
        c.y1 + c.reg[1] * h,
        c.x2 + c.reg[2] * w,
        c.y2 + c.reg[3] * h,
        c.score,
    )
}

/// Applies RNet/ONet offsets, scaled by the inclusive pixel extent.
pub fn regress(c: &Candidate, reg: [f32; 4]) -> Candidate {
    let w = c.x2 - c.x1 + 1.0;
    let h = c.y2 - c.y1 + 1.0;
    Candidate::new(
        c.x1 + reg[0] * w,
        c.y1 + reg[1] * h,
        c.x2 + reg[2] * w,
        c.y2 + reg[3] * h,
        c.score,
    )
}

/// Grows the shorter side so the box becomes a square about the same centre.
pub fn square(c: &Candidate) -> Candidate {
    let w = c.x2 - c.x1;
    let h = c.y2 - c.y1;
    let side = w.max(h);
    let x1 = c.x1 + w * 0.5 - side * 0.5;
    let y1 = c.y1 + h * 0.5 - side * 0.5;
    Candidate {
        x1,
        y1,
        x2: x1 + side,
        y2: y1 + side,
        ..*c
    }
}

/// Pixel rectangle `(x, y, width, height)` within a frame.
pub type Window = (u32, u32, u32, u32);

/// Integer crop of a candidate for the refinement stages, clipped to the
/// frame. `None` when nothing of the box lies inside it.
pub fn crop_window(c: &Candidate, width: u32, height: u32) -> Option<Window> {
    // 1-based inclusive bounds, truncated toward zero.
    let x = (c.x1.trunc() as i64).max(1);
    let y = (c.y1.trunc() as i64).max(1);
    let ex = (c.x2.trunc() as i64).min(width as i64);
    let ey = (c.y2.trunc() as i64).min(height as i64);
    if ex < x || ey < y {
        return None;
    }
    Some(((x - 1) as u32, (y - 1) as u32, (ex - x + 1) as u32, (ey - y + 1) as u32))
}

/// Region cropped for the final face image: the detection grown by a margin
/// expressed in output pixels, clipped to the frame.
pub fn face_window(c: &Candidate, margin: f32, image_size: u32, width: u32, height: u32) -> Option<Window> {
    let size = image_size as f32;
    let margin_x = margin * (c.x2 - c.x1) / (size - margin);
    let margin_y = margin * (c.y2 - c.y1) / (size - margin);
    let x1 = (c.x1 - margin_x / 2.0).max(0.0) as u32;
    let y1 = (c.y1 - margin_y / 2.0).max(0.0) as u32;
    let x2 = (c.x2 + margin_x / 2.0).min(width as f32) as u32;
    let y2 = (c.y2 + margin_y / 2.0).min(height as f32) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn pyramid_stops_below_pnet_window() {
        let scales = scale_pyramid(100, 80, 40.0, 0.709);
        assert!(approx(scales[0], 0.3));
        // 80 * 0.3 = 24 -> 17.0 -> 12.06 -> stop
        assert_eq!(scales.len(), 3);
        assert!(approx(scales[2], 0.3 * 0.709 * 0.709));
        assert!(scale_pyramid(30, 30, 40.0, 0.709).is_empty());
    }

    #[test]
    fn scaled_size_rounds_up_by_one() {
        assert_eq!(scaled_size(100, 80, 0.3), (31, 25));
    }

    #[test]
    fn candidates_map_back_to_frame_coordinates() {
        // 2x2 map, one cell over threshold at (x=1, y=0).
        let prob = [0.1, 0.9, 0.2, 0.5];
        let mut reg = [0.0; 16];
        reg[1] = 0.1;
        reg[12 + 1] = -0.2;
        let candidates = generate_candidates(&prob, &reg, 2, 2, 0.5, 0.6);
        assert_eq!(candidates.len(), 1);
        let c = candidates[0];
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (6.0, 2.0, 28.0, 24.0));
        assert_eq!(c.score, 0.9);
        assert_eq!(c.reg, [0.1, 0.0, 0.0, -0.2]);
    }

    #[test]
    fn nms_keeps_best_of_overlapping_boxes() {
        let boxes = vec![
            Candidate::new(0.0, 0.0, 10.0, 10.0, 0.8),
            Candidate::new(1.0, 1.0, 11.0, 11.0, 0.9),
            Candidate::new(50.0, 50.0, 60.0, 60.0, 0.7),
        ];
        let kept = nms(boxes, 0.5, Overlap::Union);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.7);
    }

    #[test]
    fn min_overlap_suppresses_nested_boxes() {
        let outer = Candidate::new(0.0, 0.0, 99.0, 99.0, 0.95);
        let inner = Candidate::new(10.0, 10.0, 29.0, 29.0, 0.9);
        // IoU is small, but the inner box is fully covered.
        assert_eq!(nms(vec![outer, inner], 0.7, Overlap::Union).len(), 2);
        assert_eq!(nms(vec![outer, inner], 0.7, Overlap::Min).len(), 1);
    }

    #[test]
    fn square_centres_the_long_side() {
        let c = square(&Candidate::new(10.0, 20.0, 30.0, 60.0, 1.0));
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (0.0, 20.0, 40.0, 60.0));
    }

    #[test]
    fn regression_uses_window_extent() {
        let mut c = Candidate::new(0.0, 0.0, 10.0, 20.0, 1.0);
        c.reg = [0.1, 0.1, -0.1, 0.5];
        let r = regress_window(&c);
        assert!(approx(r.x1, 1.0) && approx(r.y1, 2.0));
        assert!(approx(r.x2, 9.0) && approx(r.y2, 30.0));

        let r = regress(&Candidate::new(0.0, 0.0, 9.0, 19.0, 1.0), [0.1, 0.0, 0.0, 0.5]);
        assert!(approx(r.x1, 1.0) && approx(r.y2, 29.0));
    }

    #[test]
    fn crop_window_clips_to_frame() {
        let c = Candidate::new(-5.0, 3.7, 120.0, 40.2, 1.0);
        assert_eq!(crop_window(&c, 100, 100), Some((0, 2, 100, 38)));
        let outside = Candidate::new(150.0, 150.0, 160.0, 160.0, 1.0);
        assert_eq!(crop_window(&outside, 100, 100), None);
    }

    #[test]
    fn face_window_adds_margin() {
        // 204 px face, margin 20 at 224 output -> 20 px margin, 10 per side.
        let c = Candidate::new(100.0, 100.0, 304.0, 304.0, 1.0);
        assert_eq!(face_window(&c, 20.0, 224, 640, 480), Some((90, 90, 224, 224)));
        let edge = Candidate::new(0.0, 0.0, 204.0, 204.0, 1.0);
        assert_eq!(face_window(&edge, 20.0, 224, 210, 480), Some((0, 0, 210, 214)));
    }
}
