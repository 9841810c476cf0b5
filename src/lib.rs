pub mod cache;
pub mod config;
pub mod estimator;
pub mod fov;
pub mod geo;
pub mod geometry;
pub mod matching;
pub mod raster;
pub mod resolver;
pub mod scheduler;
pub mod system;
pub mod worker;

pub use config::PipelineConfig;
pub use resolver::GlobalPoseEstimate;
pub use system::{CameraFrame, NavSystem};
