//! Rotation, pose and frame-convention primitives shared by the
//! pipeline components.

pub mod frames;
pub mod pose;
pub mod so3;

pub use pose::Pose;
