//! Tilecast plays a remote video as a mosaic across a rectangular grid of
//! fixed-size display surfaces.
//!
//! # Pipeline overview
//!
//! 1. **Fetch**: `MediaRequest -> LocalMedia` (blocking HTTP download into the media dir)
//! 2. **Extract**: `LocalMedia -> FrameSequence` (system `ffmpeg`, scaled to grid × 128 px)
//! 3. **Discover**: anchor + facing -> `SurfaceGrid` (every cell must exist and be empty)
//! 4. **Play**: `PlaybackSession` pushes one 128×128 tile per cell per frame, looping
//!
//! Steps 1-2 are slow and run off-thread through [`Ingest::spawn_prepare`];
//! steps 3-4 are [`deploy`]. The host world is reached only through the
//! [`SpatialIndex`] and [`TileSink`] traits.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;
mod grid;
mod host;
mod media;
mod pipeline;
mod playback;
mod tile;

pub use crate::foundation::config::TilecastConfig;
pub use crate::foundation::core::{
    DEFAULT_FRAME_RATE, Facing, FrameSequence, MAX_FRAME_RATE, MAX_GRID_CELLS, MediaRequest,
    SurfaceId, TILE_SIZE, frame_delay_ticks,
};
pub use crate::foundation::error::{PushError, TilecastError, TilecastResult};
pub use crate::grid::discover::{
    CellProblem, GridNotFound, POSITION_TOLERANCE, SurfaceGrid, discover,
};
pub use crate::host::{SpatialIndex, TileSink, memory::MemoryWall};
pub use crate::media::extract::FrameExtractor;
pub use crate::media::fetch::{LocalMedia, MediaFetcher};
pub use crate::pipeline::deploy::{Placement, deploy};
pub use crate::pipeline::ingest::{Ingest, PreparedMedia, Stage};
pub use crate::playback::registry::{SessionId, SessionRegistry};
pub use crate::playback::schedule::{
    Job, ManualScheduler, Scheduler, TaskHandle, ThreadScheduler,
};
pub use crate::playback::session::{PlaybackSession, PlaybackState, SessionOpts, SessionStatus};
pub use crate::tile::partition::{Tile, extract_tile};
