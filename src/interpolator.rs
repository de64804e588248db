use ndarray::ArrayView3;
use rayon::prelude::*;

use crate::enums::ResampleFilter;
use crate::error::{Error, Result};
use crate::frame::{FrameBuffer2D, Rgba8};

/// Resizes frames to a target size. Output is always fully opaque.
pub struct Interpolator;

impl Interpolator {
    /// Resize `frame` to `width` x `height` with the given filter.
    ///
    /// When the size already matches the pixels are copied with alpha set
    /// to 255 and nothing is resampled.
    pub fn fit(
        frame: &FrameBuffer2D,
        width: u32,
        height: u32,
        filter: ResampleFilter,
    ) -> Result<FrameBuffer2D> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        if frame.dim() == (width, height) {
            let pixels = frame
                .pixels()
                .iter()
                .map(|&[r, g, b, _]| [r, g, b, u8::MAX])
                .collect();
            return FrameBuffer2D::new(width, height, pixels);
        }

        let (src_width, src_height) = frame.dim();
        // (row, column, channel)
        let source = ArrayView3::from_shape(
            (src_height as usize, src_width as usize, 4),
            frame.as_bytes(),
        )
        .map_err(|_| Error::PixelCountMismatch {
            width: src_width,
            height: src_height,
            actual: frame.pixels().len(),
        })?;

        let pixels: Vec<Rgba8> = (0..height)
            .into_par_iter()
            .flat_map(|y| {
                (0..width)
                    .map(|x| {
                        // Half-pixel centres, same mapping for both filters
                        let norm_x = (x as f32 + 0.5) / width as f32;
                        let norm_y = (y as f32 + 0.5) / height as f32;

                        let src_x = norm_x * src_width as f32 - 0.5;
                        let src_y = norm_y * src_height as f32 - 0.5;

                        let src_x = src_x.max(0.0).min((src_width - 1) as f32);
                        let src_y = src_y.max(0.0).min((src_height - 1) as f32);

                        let mut pixel = match filter {
                            ResampleFilter::Nearest => Self::nearest(&source, src_y, src_x),
                            ResampleFilter::Bilinear => {
                                Self::bilinear_interpolate(&source, src_y, src_x)
                            }
                        };
                        pixel[3] = u8::MAX;
                        pixel
                    })
                    .collect::<Vec<Rgba8>>()
            })
            .collect();

        FrameBuffer2D::new(width, height, pixels)
    }

    #[inline]
    fn nearest(source: &ArrayView3<u8>, y: f32, x: f32) -> Rgba8 {
        let (yi, xi) = (y.round() as usize, x.round() as usize);
        [
            source[[yi, xi, 0]],
            source[[yi, xi, 1]],
            source[[yi, xi, 2]],
            source[[yi, xi, 3]],
        ]
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(source: &ArrayView3<u8>, y: f32, x: f32) -> Rgba8 {
        let (height, width, _) = source.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let mut out = [0u8; 4];
        for (channel, value) in out.iter_mut().enumerate() {
            let v00 = source[[y0, x0, channel]] as f32;
            let v01 = source[[y0, x1, channel]] as f32;
            let v10 = source[[y1, x0, channel]] as f32;
            let v11 = source[[y1, x1, channel]] as f32;

            let v0 = v00.mul_add(one_minus_dx, v01 * dx);
            let v1 = v10.mul_add(one_minus_dx, v11 * dx);

            *value = v0.mul_add(one_minus_dy, v1 * dy).round().clamp(0.0, 255.0) as u8;
        }
        out
    }
}
