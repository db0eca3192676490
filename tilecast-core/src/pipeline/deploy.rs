use std::sync::Arc;

use glam::DVec3;
use image::Rgba;

use crate::{
    foundation::{
        core::{Facing, TILE_SIZE},
        error::TilecastResult,
    },
    grid::discover::discover,
    host::{SpatialIndex, TileSink},
    pipeline::ingest::PreparedMedia,
    playback::{
        registry::{SessionId, SessionRegistry},
        schedule::Scheduler,
        session::{PlaybackSession, SessionOpts},
    },
};

/// Where and how a prepared video should play.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    /// Position of the anchor surface, the grid's top-left cell.
    pub anchor: DVec3,
    /// `None` when the host could not tell which way the anchor faces.
    pub facing: Option<Facing>,
    /// Fill for edge tiles the frame does not cover.
    pub background: Rgba<u8>,
}

/// Bind `prepared` to the grid at `placement` and start it.
///
/// Discovery failure leaves `registry` untouched. On success the session
/// is registered as `<name>_<millis>` (with `_<n>` on collision) and
/// already playing.
#[tracing::instrument(skip_all, fields(name = prepared.request.name(), anchor = ?placement.anchor))]
pub fn deploy(
    prepared: &PreparedMedia,
    placement: Placement,
    index: &dyn SpatialIndex,
    sink: Arc<dyn TileSink>,
    scheduler: Arc<dyn Scheduler>,
    registry: &SessionRegistry,
) -> TilecastResult<SessionId> {
    let request = &prepared.request;
    let grid = discover(
        index,
        placement.anchor,
        placement.facing,
        request.width(),
        request.height(),
    )?;

    let id = SessionId::generate(request.name());
    let session = PlaybackSession::new(
        id.as_str(),
        prepared.frames.clone(),
        grid,
        sink,
        scheduler,
        SessionOpts {
            frame_rate: request.frame_rate(),
            background: placement.background,
            tile_size: TILE_SIZE,
        },
    );

    // A registry stop landing between these two calls retires the session,
    // so start fails instead of scheduling an unreachable task.
    let id = registry.register_unique(id, session.clone());
    if let Err(e) = session.start() {
        registry.unregister(&id);
        return Err(e);
    }
    tracing::info!(session = %id, "deployed");
    Ok(id)
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/deploy.rs"]
mod tests;
