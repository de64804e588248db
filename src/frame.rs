use std::io::Cursor;

use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// One RGBA pixel, 8 bits per channel.
pub type Rgba8 = [u8; 4];

pub const OPAQUE_BLACK: Rgba8 = [0, 0, 0, 255];

/// An immutable 2-D RGBA image. Transforms always produce a new frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer2D {
    width: u32,
    height: u32,
    pixels: Vec<Rgba8>,
}

impl FrameBuffer2D {
    /// Create a frame from row-major pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDimensions`] for a zero-sized frame and
    /// [`Error::PixelCountMismatch`] when `pixels.len() != width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<Rgba8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions { width, height });
        }
        if pixels.len() != width as usize * height as usize {
            return Err(Error::PixelCountMismatch {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A frame filled with a single colour
    pub fn solid(width: u32, height: u32, color: Rgba8) -> Result<Self> {
        Self::new(width, height, vec![color; width as usize * height as usize])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    pub fn dim(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[Rgba8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<Rgba8> {
        self.pixels
    }

    /// Pixel at column `x`, row `y`, or `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[y as usize * self.width as usize + x as usize])
    }

    /// Raw RGBA bytes, four per pixel
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(self.width, self.height, self.as_bytes().to_vec())
    }

    pub fn from_rgba_image(image: &RgbaImage) -> Result<Self> {
        let pixels: Vec<Rgba8> = image.pixels().map(|p| p.0).collect();
        Self::new(image.width(), image.height(), pixels)
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let image = self.to_rgba_image().ok_or(Error::PixelCountMismatch {
            width: self.width,
            height: self.height,
            actual: self.pixels.len(),
        })?;
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    /// Decode any image format the `image` crate can guess (PNG on the wire)
    pub fn from_encoded(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Self::from_rgba_image(&image)
    }
}
