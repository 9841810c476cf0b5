//! Reference raster storage: orthoimage pixels plus a co-registered
//! elevation grid.

pub mod align;

use anyhow::Result;
use image::GrayImage;

use crate::geo::BoundingBox;

pub use align::{align, AlignedRaster};

/// Per-pixel terrain elevation in meters, same grid as the orthoimage.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    data: Vec<f32>,
    width: u32,
    height: u32,
}

impl ElevationGrid {
    pub fn new(data: Vec<f32>, width: u32, height: u32) -> Result<Self> {
        if data.len() != (width as usize) * (height as usize) {
            anyhow::bail!(
                "elevation grid has {} samples for a {}x{} raster",
                data.len(),
                width,
                height
            );
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// All-zero grid, the "flat terrain assumed" fallback when the map
    /// client has no elevation layer configured.
    pub fn flat(width: u32, height: u32) -> Self {
        Self {
            data: vec![0.0; (width as usize) * (height as usize)],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bounds-checked sample. `None` outside `[0, w) x [0, h)`.
    pub fn get(&self, x: i64, y: i64) -> Option<f32> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some(self.data[y as usize * self.width as usize + x as usize])
    }
}

/// The cached map product: orthoimage, elevation and the bounding box
/// they cover. Replaced wholesale on every successful fetch.
#[derive(Debug, Clone)]
pub struct ReferenceRaster {
    pub image: GrayImage,
    pub elevation: ElevationGrid,
    pub bbox: BoundingBox,
}

impl ReferenceRaster {
    /// Validates that image and elevation share a square shape.
    pub fn new(image: GrayImage, elevation: ElevationGrid, bbox: BoundingBox) -> Result<Self> {
        let (w, h) = image.dimensions();
        if w != elevation.width() || h != elevation.height() {
            anyhow::bail!(
                "raster shape mismatch: image {}x{}, elevation {}x{}",
                w,
                h,
                elevation.width(),
                elevation.height()
            );
        }
        if w != h {
            anyhow::bail!("reference raster must be square, got {}x{}", w, h);
        }
        Ok(Self {
            image,
            elevation,
            bbox,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
