//! Keypoint matcher interface.
//!
//! Matching is a black box to the pipeline: typically a neural
//! correspondence network, but anything that returns point pairs with
//! confidences fits. Implementations are selected at startup by the
//! embedding application; the pipeline only depends on this trait.

use image::GrayImage;
use nalgebra::Vector2;

/// One keypoint correspondence between the query camera frame and the
/// aligned reference raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    /// Pixel position in the query image.
    pub query: Vector2<f64>,
    /// Pixel position in the aligned reference raster.
    pub reference: Vector2<f64>,
    /// Matcher confidence in [0, 1].
    pub confidence: f64,
}

/// Black-box correspondence generator.
pub trait KeypointMatcher: Send {
    fn match_images(&self, query: &GrayImage, reference: &GrayImage) -> Vec<Match>;
}
