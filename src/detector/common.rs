use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{NUM_LANDMARKS, PixelBuffer};

pub const HANDPOSE_INPUT_SIZE: u32 = 224;
pub const PALM_INPUT_SIZE: u32 = 192;

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Maps the square handpose crop back onto the source image.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
}

/// Aspect-preserving resize into a black `target_size` square, NHWC in [0, 1].
pub fn prepare_frame_with_size(
    buffer: &PixelBuffer,
    target_size: u32,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    let (width, height) = (buffer.width(), buffer.height());
    if width == 0 || height == 0 {
        return Err(anyhow!("cannot letterbox an empty {width}x{height} image"));
    }

    let scale = target_size as f32 / (width.max(height) as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, target_size);

    let src_image = fir::images::Image::from_vec_u8(
        width,
        height,
        buffer.rgba().to_vec(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    for px in canvas.chunks_mut(4) {
        px[3] = 255;
    }
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: width,
        orig_h: height,
    };

    Ok((input, letterbox))
}

/// Samples a rotated square of side `side` (source pixels) centred on
/// `center` into an `output_size` NHWC tensor.
pub fn prepare_rotated_crop(
    buffer: &PixelBuffer,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
    };

    let data: Vec<f32> = (0..output_size)
        .into_par_iter()
        .flat_map_iter(|y| {
            let transform = &transform;
            (0..output_size).flat_map(move |x| {
                let (src_x, src_y) = transform.to_source(x as f32 + 0.5, y as f32 + 0.5);
                sample_rgb(buffer, src_x, src_y)
            })
        })
        .collect();

    let array =
        Array4::<f32>::from_shape_vec((1, output_size as usize, output_size as usize, 3), data)
            .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    Ok((array, transform))
}

impl CropTransform {
    fn pixel_scale(&self) -> f32 {
        self.side / self.output_size as f32
    }

    /// Crop pixel coordinates to source pixel coordinates.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.pixel_scale();
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Crop-space landmark to source pixels; depth gets the same scale.
    pub fn project(&self, point: [f32; 3]) -> [f32; 3] {
        let (x, y) = self.to_source(point[0], point[1]);
        [x, y, point[2] * self.pixel_scale()]
    }
}

/// Groups a flat model output into at most [`NUM_LANDMARKS`] triples.
pub fn decode_points(flat: &[f32]) -> Vec<[f32; 3]> {
    flat.chunks_exact(3)
        .take(NUM_LANDMARKS)
        .map(|chunk| [chunk[0], chunk[1], chunk[2]])
        .collect()
}

fn sample_rgb(buffer: &PixelBuffer, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    // Pixel centres sit at +0.5.
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (buffer.width() as i64, buffer.height() as i64);
    let rgba = buffer.rgba();
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i64;
        let iy = cy as i64;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy * w + ix) as usize) * 4;
        [
            rgba[idx] as f32 / 255.0,
            rgba[idx + 1] as f32 / 255.0,
            rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn letterbox_pads_the_short_side() {
        let buffer = PixelBuffer::new(RgbaImage::from_pixel(400, 200, Rgba([255, 255, 255, 255])));
        let (input, letterbox) = prepare_frame_with_size(&buffer, PALM_INPUT_SIZE).unwrap();

        assert_eq!(input.shape(), &[1, 192, 192, 3]);
        assert_abs_diff_eq!(letterbox.scale, 0.48);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 48.0);
        assert_eq!(input[[0, 0, 96, 0]], 0.0);
        assert_abs_diff_eq!(input[[0, 96, 96, 0]], 1.0, epsilon = 1e-2);
    }

    #[test]
    fn unrotated_crop_is_a_plain_window() {
        let transform = CropTransform {
            center: (100.0, 50.0),
            side: 224.0,
            angle: 0.0,
            output_size: 224,
        };
        let (x, y) = transform.to_source(112.0, 112.0);
        assert_abs_diff_eq!(x, 100.0);
        assert_abs_diff_eq!(y, 50.0);

        let p = transform.project([0.0, 0.0, 7.0]);
        assert_abs_diff_eq!(p[0], -12.0);
        assert_abs_diff_eq!(p[1], -62.0);
        assert_abs_diff_eq!(p[2], 7.0);
    }

    #[test]
    fn quarter_turn_maps_crop_up_to_source_right() {
        let transform = CropTransform {
            center: (0.0, 0.0),
            side: 2.0,
            angle: std::f32::consts::FRAC_PI_2,
            output_size: 2,
        };
        // Top-centre of the crop.
        let (x, y) = transform.to_source(1.0, 0.0);
        assert_abs_diff_eq!(x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn rotated_crop_samples_source_colour() {
        let buffer = PixelBuffer::new(RgbaImage::from_pixel(64, 64, Rgba([0, 255, 0, 255])));
        let (input, _) = prepare_rotated_crop(&buffer, (32.0, 32.0), 16.0, 0.3, 8).unwrap();
        assert_eq!(input.shape(), &[1, 8, 8, 3]);
        assert_abs_diff_eq!(input[[0, 4, 4, 1]], 1.0);
        assert_abs_diff_eq!(input[[0, 4, 4, 0]], 0.0);
    }

    #[test]
    fn short_outputs_decode_partially() {
        assert_eq!(decode_points(&[0.0; 30]).len(), 10);
        assert_eq!(decode_points(&[0.0; 70]).len(), NUM_LANDMARKS);
    }
}
