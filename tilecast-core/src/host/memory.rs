use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use glam::DVec3;
use image::{Rgba, RgbaImage};

use crate::{
    foundation::{
        core::{Facing, SurfaceId},
        error::PushError,
    },
    grid::discover::{SurfaceGrid, basis, cell_position},
    host::{SpatialIndex, TileSink},
    tile::partition::Tile,
};

#[derive(Clone, Debug)]
struct MemorySurface {
    position: DVec3,
    facing: Facing,
    content: Option<RgbaImage>,
    // Content placed by something other than a tile push.
    foreign: bool,
}

#[derive(Debug, Default)]
struct WallState {
    next_id: u64,
    surfaces: BTreeMap<SurfaceId, MemorySurface>,
    pushes: u64,
    clears: u64,
}

/// A host with no world behind it: surfaces are points with a facing, and
/// pushed tiles are kept as images.
#[derive(Debug, Default)]
pub struct MemoryWall {
    state: Mutex<WallState>,
}

impl MemoryWall {
    /// Wall with no surfaces.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one empty surface.
    pub fn add_surface(&self, position: DVec3, facing: Facing) -> SurfaceId {
        let mut st = self.lock();
        let id = SurfaceId(st.next_id);
        st.next_id += 1;
        st.surfaces.insert(
            id,
            MemorySurface {
                position,
                facing,
                content: None,
                foreign: false,
            },
        );
        id
    }

    /// Lay out a full `width`×`height` block cornered at `anchor`; ids come
    /// back row-major.
    pub fn add_grid(
        &self,
        anchor: DVec3,
        facing: Facing,
        width: u32,
        height: u32,
    ) -> Vec<SurfaceId> {
        let b = basis(facing);
        let mut ids = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for column in 0..width {
                ids.push(self.add_surface(cell_position(anchor, b, column, row), facing));
            }
        }
        ids
    }

    /// Delete a surface, as when the host destroys it. Returns whether it existed.
    pub fn remove_surface(&self, surface: SurfaceId) -> bool {
        self.lock().surfaces.remove(&surface).is_some()
    }

    /// Mark a surface as displaying something unrelated to playback.
    pub fn occupy(&self, surface: SurfaceId) -> bool {
        match self.lock().surfaces.get_mut(&surface) {
            Some(s) => {
                s.foreign = true;
                true
            }
            None => false,
        }
    }

    /// Where `surface` sits.
    pub fn position(&self, surface: SurfaceId) -> Option<DVec3> {
        self.lock().surfaces.get(&surface).map(|s| s.position)
    }

    /// Last tile pushed to `surface`.
    pub fn content(&self, surface: SurfaceId) -> Option<RgbaImage> {
        self.lock()
            .surfaces
            .get(&surface)
            .and_then(|s| s.content.clone())
    }

    /// Surfaces on the wall.
    pub fn surface_count(&self) -> usize {
        self.lock().surfaces.len()
    }

    /// Successful tile pushes so far.
    pub fn push_count(&self) -> u64 {
        self.lock().pushes
    }

    /// Successful clears so far.
    pub fn clear_count(&self) -> u64 {
        self.lock().clears
    }

    /// Stitch what every cell of `grid` currently shows into one image.
    /// Cells without content are left as `background`.
    pub fn compose(&self, grid: &SurfaceGrid, tile_size: u32, background: Rgba<u8>) -> RgbaImage {
        let mut out = RgbaImage::from_pixel(
            grid.width() * tile_size,
            grid.height() * tile_size,
            background,
        );
        let st = self.lock();
        for (column, row, id) in grid.cells() {
            if let Some(tile) = st.surfaces.get(&id).and_then(|s| s.content.as_ref()) {
                image::imageops::replace(
                    &mut out,
                    tile,
                    i64::from(column * tile_size),
                    i64::from(row * tile_size),
                );
            }
        }
        out
    }
}

impl SpatialIndex for MemoryWall {
    fn find_surface_near(
        &self,
        position: DVec3,
        radius: f64,
        facing: Facing,
    ) -> Option<SurfaceId> {
        let st = self.lock();
        st.surfaces
            .iter()
            .filter(|(_, s)| s.facing == facing)
            .map(|(id, s)| (*id, (s.position - position).abs().max_element()))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn is_empty(&self, surface: SurfaceId) -> bool {
        self.lock()
            .surfaces
            .get(&surface)
            .is_some_and(|s| s.content.is_none() && !s.foreign)
    }
}

impl TileSink for MemoryWall {
    fn push_tile(&self, surface: SurfaceId, tile: &Tile<'_>) -> Result<(), PushError> {
        let mut st = self.lock();
        let s = st
            .surfaces
            .get_mut(&surface)
            .ok_or(PushError::SurfaceGone(surface))?;
        s.content = Some(tile.to_image());
        st.pushes += 1;
        Ok(())
    }

    fn clear(&self, surface: SurfaceId) -> Result<(), PushError> {
        let mut st = self.lock();
        let s = st
            .surfaces
            .get_mut(&surface)
            .ok_or(PushError::SurfaceGone(surface))?;
        s.content = None;
        st.clears += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/memory.rs"]
mod tests;
