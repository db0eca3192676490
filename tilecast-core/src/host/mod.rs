//! Capabilities the host environment provides to the core.
//!
//! The world that owns display surfaces is never reached directly: grid
//! discovery reads it through [`SpatialIndex`] and playback writes through
//! [`TileSink`]. [`memory::MemoryWall`] implements both in memory.

pub mod memory;

use glam::DVec3;

use crate::{
    foundation::{
        core::{Facing, SurfaceId},
        error::PushError,
    },
    tile::partition::Tile,
};

/// Read-only spatial queries over the host's surfaces.
pub trait SpatialIndex {
    /// A surface facing `facing` whose position is within `radius` of
    /// `position` on every axis.
    fn find_surface_near(&self, position: DVec3, radius: f64, facing: Facing)
    -> Option<SurfaceId>;

    /// Whether the surface currently displays nothing.
    fn is_empty(&self, surface: SurfaceId) -> bool;
}

/// Per-surface display output, driven from playback ticks.
pub trait TileSink: Send + Sync {
    /// Show `tile` on `surface`. Best-effort; the surface may have vanished.
    fn push_tile(&self, surface: SurfaceId, tile: &Tile<'_>) -> Result<(), PushError>;

    /// Remove whatever `surface` displays.
    fn clear(&self, surface: SurfaceId) -> Result<(), PushError>;
}
