//! Reference-map cache and fetch decision.
//!
//! Owns the most recently fetched orthoimage/elevation raster and
//! decides when the current field of view has drifted far enough from
//! the cached coverage that a new fetch pays for itself. The fetch
//! itself runs on a single-slot worker because a tile-server round
//! trip can take seconds.

use std::sync::Arc;

use anyhow::Result;
use image::GrayImage;

use crate::fov::CameraIntrinsics;
use crate::geo::BoundingBox;
use crate::raster::{ElevationGrid, ReferenceRaster};
use crate::worker::{Worker, WorkerBusy};

/// Raw fetch product from the map server collaborator. A missing
/// elevation layer means flat terrain is assumed downstream.
pub struct MapFetch {
    pub image: GrayImage,
    pub elevation: Option<ElevationGrid>,
}

/// External map/tile server client. Network and decode failures are
/// surfaced as errors and absorbed by the cache.
pub trait MapClient: Send {
    fn fetch_map(&self, bbox: BoundingBox, size: (u32, u32)) -> Result<MapFetch>;
}

struct FetchJob {
    bbox: BoundingBox,
    size: (u32, u32),
}

/// Cache of the current reference raster with a single in-flight
/// fetch slot.
pub struct ReferenceMapCache {
    current: Option<Arc<ReferenceRaster>>,
    worker: Worker<FetchJob, Result<ReferenceRaster>>,
    overlap_threshold: f64,
}

impl ReferenceMapCache {
    pub fn new(client: Box<dyn MapClient>, overlap_threshold: f64) -> Self {
        let worker = Worker::spawn(move |job: FetchJob| -> Result<ReferenceRaster> {
            let fetch = client.fetch_map(job.bbox, job.size)?;
            let (w, h) = fetch.image.dimensions();
            let elevation = match fetch.elevation {
                Some(e) => e,
                None => {
                    tracing::debug!("fetch carried no elevation layer, assuming flat terrain");
                    ElevationGrid::flat(w, h)
                }
            };
            ReferenceRaster::new(fetch.image, elevation, job.bbox)
        });

        Self {
            current: None,
            worker,
            overlap_threshold,
        }
    }

    /// The cached raster, if any fetch has succeeded yet.
    pub fn current(&self) -> Option<Arc<ReferenceRaster>> {
        self.current.clone()
    }

    pub fn fetch_pending(&self) -> bool {
        self.worker.is_busy()
    }

    /// Whether `candidate` warrants fetching a new map.
    ///
    /// True when nothing is cached, otherwise when the minimum of the
    /// two directional containment ratios drops to the configured
    /// threshold or below. Pure with respect to cache state, so
    /// repeated calls with the same candidate agree.
    pub fn should_refetch(&self, candidate: &BoundingBox) -> bool {
        let Some(current) = &self.current else {
            return true;
        };
        let ratio = current.bbox.overlap_ratio(candidate);
        ratio <= self.overlap_threshold
    }

    /// Dispatches an asynchronous fetch. Skipped with a debug log when
    /// a fetch is already in flight.
    pub fn request_fetch(&mut self, bbox: BoundingBox, size: (u32, u32)) {
        match self.worker.dispatch(FetchJob { bbox, size }) {
            Ok(()) => {
                tracing::info!(
                    "requested {}x{} map for ({:.6}, {:.6})..({:.6}, {:.6})",
                    size.0,
                    size.1,
                    bbox.min.lat,
                    bbox.min.lon,
                    bbox.max.lat,
                    bbox.max.lon
                );
            }
            Err(WorkerBusy) => {
                tracing::debug!("map fetch already in flight, skipping request");
            }
        }
    }

    /// Drains a completed fetch if one is ready. On success the cached
    /// raster is replaced wholesale; on failure the previous raster is
    /// kept and the fetch is retried on the next scheduling
    /// opportunity. Returns true when the raster was replaced.
    pub fn poll(&mut self) -> bool {
        match self.worker.poll() {
            Some(Ok(raster)) => {
                let (w, h) = raster.size();
                tracing::info!("new {}x{} reference raster cached", w, h);
                self.current = Some(Arc::new(raster));
                true
            }
            Some(Err(e)) => {
                tracing::warn!("map fetch failed, keeping previous raster: {e:#}");
                false
            }
            None => false,
        }
    }
}

/// Requested raster side length: the camera frame diagonal, so any
/// rotation of the raster still covers a full camera-sized crop.
pub fn raster_diagonal(image_dim: (u32, u32)) -> u32 {
    let (w, h) = image_dim;
    ((w as f64).hypot(h as f64)).ceil() as u32
}

/// Map request radius in meters.
///
/// Scales with altitude and the horizontal field of view, with a 50%
/// pad; without intrinsics a conservative triple-altitude fallback is
/// used. Clamped to `max_radius_m`.
pub fn dynamic_map_radius(
    altitude_agl: f64,
    intrinsics: Option<&CameraIntrinsics>,
    image_width: u32,
    max_radius_m: f64,
) -> f64 {
    let radius = match intrinsics {
        Some(k) => 1.5 * k.horizontal_fov(image_width) * altitude_agl,
        None => {
            tracing::warn!("no intrinsics available, using guess for map radius");
            3.0 * altitude_agl
        }
    };
    if radius > max_radius_m {
        tracing::warn!(
            "map radius {:.0} m capped to {:.0} m",
            radius,
            max_radius_m
        );
        return max_radius_m;
    }
    radius
}
