//! Shared sensor state fed by external callbacks.
//!
//! Attitude, position and camera information arrive on their own
//! schedules from the transport layer. Everything is optional until
//! first delivery; the scheduler gate simply skips frames until the
//! inputs it needs have shown up.

use nalgebra::UnitQuaternion;
use parking_lot::RwLock;

use crate::fov::CameraIntrinsics;
use crate::geo::LatLon;

/// Point-in-time copy of the sensor inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SensorSnapshot {
    /// Camera orientation, camera frame to ENU.
    pub attitude: Option<UnitQuaternion<f64>>,
    /// Approximate vehicle position.
    pub position: Option<LatLon>,
    /// Altitude above ground in meters.
    pub altitude_agl_m: Option<f64>,
    pub intrinsics: Option<CameraIntrinsics>,
    /// Camera frame (width, height) in pixels.
    pub image_dim: Option<(u32, u32)>,
}

/// Latest sensor inputs behind a lock, written by external callbacks
/// and read by the event thread.
#[derive(Debug, Default)]
pub struct SensorState {
    inner: RwLock<SensorSnapshot>,
}

impl SensorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_attitude(&self, attitude: UnitQuaternion<f64>) {
        self.inner.write().attitude = Some(attitude);
    }

    pub fn set_position(&self, position: LatLon, altitude_agl_m: f64) {
        let mut inner = self.inner.write();
        inner.position = Some(position);
        inner.altitude_agl_m = Some(altitude_agl_m);
    }

    /// Intrinsics are supplied once per camera and cached.
    pub fn set_camera(&self, intrinsics: CameraIntrinsics, image_dim: (u32, u32)) {
        let mut inner = self.inner.write();
        inner.intrinsics = Some(intrinsics);
        inner.image_dim = Some(image_dim);
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let s = SensorState::new();
        let snap = s.snapshot();
        assert!(snap.attitude.is_none());
        assert!(snap.position.is_none());
        assert!(snap.intrinsics.is_none());
    }

    #[test]
    fn test_updates_visible_in_snapshot() {
        let s = SensorState::new();
        s.set_position(LatLon::new(60.0, 24.0), 120.0);
        s.set_camera(CameraIntrinsics::new(500.0, 500.0, 240.0, 240.0), (480, 480));

        let snap = s.snapshot();
        assert_eq!(snap.altitude_agl_m, Some(120.0));
        assert_eq!(snap.image_dim, Some((480, 480)));
    }
}
