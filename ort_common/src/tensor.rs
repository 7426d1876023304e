use image::RgbImage;
use ndarray::Array4;

/// Packs equally sized images into an `(N, 3, H, W)` batch, mapping each
/// sample through `normalize(channel, value)`.
pub fn nchw_batch<F>(images: &[RgbImage], normalize: F) -> Array4<f32>
where
    F: Fn(usize, u8) -> f32,
{
    let (width, height) = images.first().map(|img| img.dimensions()).unwrap_or((0, 0));
    let mut array = Array4::<f32>::zeros((images.len(), 3, height as usize, width as usize));

    for (n, image) in images.iter().enumerate() {
        for (x, y, pixel) in image.enumerate_pixels() {
            for c in 0..3 {
                array[[n, c, y as usize, x as usize]] = normalize(c, pixel[c]);
            }
        }
    }
    array
}
