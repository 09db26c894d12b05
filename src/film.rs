//! Film storage: plain images, splatting blocks and differentiable images.

use crate::color::{Color, Spectrum};
use crate::error::{RenderError, RenderResult};
use crate::math::Vec2;

/// RGB image in linear color space.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Linear RGB pixels, row-major, length = width * height * 3.
    pub pixels: Vec<f32>,
}

impl Image {
    /// Black image.
    pub fn new(width: u32, height: u32) -> Self {
        Self::solid(width, height, Color::BLACK)
    }

    /// Create a solid color image.
    pub fn solid(width: u32, height: u32, color: Color) -> Self {
        let mut pixels = vec![0.0; width as usize * height as usize * 3];
        for chunk in pixels.chunks_mut(3) {
            chunk[0] = color.r;
            chunk[1] = color.g;
            chunk[2] = color.b;
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Wrap an existing pixel buffer, checking its length.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<f32>) -> RenderResult<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(RenderError::ImageSize {
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        Color::new(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, c: Color) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels[i] = c.r;
        self.pixels[i + 1] = c.g;
        self.pixels[i + 2] = c.b;
    }

    /// Mean over all pixels and channels.
    pub fn mean(&self) -> f32 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.pixels.iter().map(|&v| v as f64).sum();
        (sum / self.pixels.len() as f64) as f32
    }

    /// Point query at a continuous film position; zero outside the image.
    pub fn read(&self, pos: Vec2) -> Color {
        match pixel_index(self.width, self.height, pos) {
            Some(i) => Color::new(self.pixels[3 * i], self.pixels[3 * i + 1], self.pixels[3 * i + 2]),
            None => Color::BLACK,
        }
    }
}

/// Index of the pixel containing `pos`, if any.
fn pixel_index(width: u32, height: u32, pos: Vec2) -> Option<usize> {
    if !(pos.x >= 0.0 && pos.y >= 0.0) {
        return None;
    }
    let x = pos.x.floor() as usize;
    let y = pos.y.floor() as usize;
    if x >= width as usize || y >= height as usize {
        return None;
    }
    Some(y * width as usize + x)
}

/// Additive splatting buffer with box reconstruction.
///
/// Sums are kept in `f64` so that per-worker blocks can be merged in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    width: u32,
    height: u32,
    data: Vec<f64>,
}

impl ImageBlock {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize * 3],
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Accumulate `value` into the pixel containing `pos`. Splats outside the film
    /// or carrying non-finite values are dropped.
    pub fn put(&mut self, pos: Vec2, value: Color) {
        if !value.is_finite() {
            return;
        }
        if let Some(i) = pixel_index(self.width, self.height, pos) {
            self.data[3 * i] += value.r as f64;
            self.data[3 * i + 1] += value.g as f64;
            self.data[3 * i + 2] += value.b as f64;
        }
    }

    /// Value stored at the pixel containing `pos`.
    pub fn read(&self, pos: Vec2) -> Color {
        match pixel_index(self.width, self.height, pos) {
            Some(i) => Color::new(
                self.data[3 * i] as f32,
                self.data[3 * i + 1] as f32,
                self.data[3 * i + 2] as f32,
            ),
            None => Color::BLACK,
        }
    }

    /// Add another block of the same size.
    pub fn merge(mut self, other: Self) -> Self {
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += *b;
        }
        self
    }

    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn to_image(&self) -> Image {
        Image {
            width: self.width,
            height: self.height,
            pixels: self.data.iter().map(|&v| v as f32).collect(),
        }
    }
}

/// Image whose pixels carry forward-mode tangents.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<Spectrum>,
}

impl DiffImage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![Spectrum::zero(); width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Spectrum {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Primal image.
    pub fn value(&self) -> Image {
        self.map_channels(|s| s.value())
    }

    /// Derivative image for tangent `slot`.
    pub fn grad(&self, slot: usize) -> Image {
        self.map_channels(|s| s.grad(slot))
    }

    fn map_channels(&self, f: impl Fn(Spectrum) -> Color) -> Image {
        let pixels = self
            .pixels
            .iter()
            .flat_map(|&s| {
                let c = f(s);
                [c.r, c.g, c.b]
            })
            .collect();
        Image {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad::Dual;

    #[test]
    fn splats_land_in_containing_pixel() {
        let mut block = ImageBlock::new(2, 2);
        block.put(Vec2::new(1.5, 0.2), Color::splat(1.0));
        block.put(Vec2::new(1.9, 0.9), Color::splat(2.0));
        block.put(Vec2::new(-0.1, 0.5), Color::splat(5.0));
        block.put(Vec2::new(0.5, 0.5), Color::new(f32::NAN, 0.0, 0.0));
        assert_eq!(block.read(Vec2::new(1.1, 0.1)), Color::splat(3.0));
        assert_eq!(block.read(Vec2::new(0.5, 0.5)), Color::BLACK);
        let image = block.to_image();
        assert_eq!(image.pixel(1, 0), Color::splat(3.0));
        assert_eq!(image.read(Vec2::new(1.2, 0.7)), Color::splat(3.0));
    }

    #[test]
    fn merge_is_additive() {
        let mut a = ImageBlock::new(1, 1);
        let mut b = ImageBlock::new(1, 1);
        a.put(Vec2::new(0.5, 0.5), Color::splat(1.0));
        b.put(Vec2::new(0.5, 0.5), Color::splat(0.25));
        assert_eq!(a.merge(b).read(Vec2::new(0.5, 0.5)), Color::splat(1.25));
    }

    #[test]
    fn image_size_is_checked() {
        assert!(matches!(
            Image::from_pixels(2, 2, vec![0.0; 11]),
            Err(RenderError::ImageSize { expected: 12, got: 11 })
        ));
    }

    #[test]
    fn diff_image_splits_value_and_gradient() {
        let mut img = DiffImage::new(1, 1);
        img.pixels[0] = Spectrum::splat(Dual::variable(2.0, 1) * 3.0);
        assert_eq!(img.value().pixels, vec![6.0, 6.0, 6.0]);
        assert_eq!(img.grad(1).pixels, vec![3.0, 3.0, 3.0]);
        assert_eq!(img.grad(0).pixels, vec![0.0, 0.0, 0.0]);
    }
}
