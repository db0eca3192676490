use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::{Rgba, RgbaImage};

use crate::{
    foundation::{
        core::{DEFAULT_FRAME_RATE, FrameSequence, SurfaceId, TILE_SIZE, frame_delay_ticks},
        error::{TilecastError, TilecastResult},
    },
    grid::discover::SurfaceGrid,
    host::TileSink,
    playback::schedule::{Scheduler, TaskHandle},
    tile::partition::extract_tile,
};

/// Lifecycle of a [`PlaybackSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// Constructed, never started.
    Idle,
    /// Scheduled, and each tick shows the next frame.
    Playing,
    /// Still scheduled, but ticks do nothing.
    Paused,
    /// Schedule cancelled and cells cleared. May be started again unless a
    /// registry stopped it.
    Stopped,
}

/// Point-in-time view of a session.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SessionStatus {
    /// Session label, the registry id for deployed sessions.
    pub label: String,
    /// Current state.
    pub state: PlaybackState,
    /// Frame the next tick will show.
    pub cursor: usize,
    /// Length of the frame sequence.
    pub total_frames: usize,
    /// Grid width in cells.
    pub grid_width: u32,
    /// Grid height in cells.
    pub grid_height: u32,
    /// Host ticks between frames.
    pub delay_ticks: u64,
}

/// Per-session playback settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionOpts {
    /// Requested frames per second; clamped to the host tick rate.
    pub frame_rate: u32,
    /// Fill for the uncovered part of edge tiles.
    pub background: Rgba<u8>,
    /// Cell edge length in pixels.
    pub tile_size: u32,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            background: Rgba([0, 0, 0, 255]),
            tile_size: TILE_SIZE,
        }
    }
}

struct Playback {
    state: PlaybackState,
    cursor: usize,
    task: Option<TaskHandle>,
    // Bumped on every start; jobs from earlier starts see a mismatch and
    // do nothing.
    generation: u64,
    // Set once the registry has stopped this session; it never starts again.
    retired: bool,
}

struct SessionInner {
    label: String,
    frames: FrameSequence,
    grid: SurfaceGrid,
    opts: SessionOpts,
    sink: Arc<dyn TileSink>,
    scheduler: Arc<dyn Scheduler>,
    playback: Mutex<Playback>,
}

/// One looping animation bound to one grid.
///
/// Clones are handles to the same session. Ticks and state changes are
/// serialized on an internal lock, so a tick that starts after [`stop`]
/// returns sees `Stopped` and renders nothing.
///
/// [`stop`]: PlaybackSession::stop
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("label", &self.inner.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PlaybackSession {
    /// Bind `frames` to `grid`. The session is [`PlaybackState::Idle`] until
    /// [`start`](Self::start).
    pub fn new(
        label: impl Into<String>,
        frames: FrameSequence,
        grid: SurfaceGrid,
        sink: Arc<dyn TileSink>,
        scheduler: Arc<dyn Scheduler>,
        opts: SessionOpts,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                label: label.into(),
                frames,
                grid,
                opts,
                sink,
                scheduler,
                playback: Mutex::new(Playback {
                    state: PlaybackState::Idle,
                    cursor: 0,
                    task: None,
                    generation: 0,
                    retired: false,
                }),
            }),
        }
    }

    /// Label given at construction.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Cells this session draws to.
    pub fn grid(&self) -> &SurfaceGrid {
        &self.inner.grid
    }

    /// Frames being looped.
    pub fn frames(&self) -> &FrameSequence {
        &self.inner.frames
    }

    /// Current state.
    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    /// Index of the frame the next tick will show; always below the frame
    /// count (0 for an empty sequence).
    pub fn cursor(&self) -> usize {
        self.inner.lock().cursor
    }

    /// Length of the frame sequence.
    pub fn total_frames(&self) -> usize {
        self.inner.frames.len()
    }

    /// Host ticks between frames.
    pub fn delay_ticks(&self) -> u64 {
        frame_delay_ticks(
            self.inner.opts.frame_rate,
            self.inner.scheduler.ticks_per_second(),
        )
    }

    /// Whether `surface` is one of this session's cells.
    pub fn occupies(&self, surface: SurfaceId) -> bool {
        self.inner.grid.contains(surface)
    }

    /// Snapshot of the session for reporting.
    pub fn status(&self) -> SessionStatus {
        let pb = self.inner.lock();
        SessionStatus {
            label: self.inner.label.clone(),
            state: pb.state,
            cursor: pb.cursor,
            total_frames: self.inner.frames.len(),
            grid_width: self.inner.grid.width(),
            grid_height: self.inner.grid.height(),
            delay_ticks: self.delay_ticks(),
        }
    }

    /// Begin playback from the first frame.
    ///
    /// Only `Idle` and `Stopped` sessions start; otherwise this is a no-op.
    /// A session the registry has stopped is retired and refuses to start.
    pub fn start(&self) -> TilecastResult<()> {
        let mut pb = self.inner.lock();
        if pb.retired {
            return Err(TilecastError::validation(format!(
                "session {} was stopped and removed",
                self.inner.label
            )));
        }
        if matches!(pb.state, PlaybackState::Playing | PlaybackState::Paused) {
            return Ok(());
        }

        let delay = self.delay_ticks();
        let generation = pb.generation.wrapping_add(1);
        let weak = Arc::downgrade(&self.inner);
        let task = self.inner.scheduler.schedule_repeating(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.tick(generation);
                }
            }),
        )?;

        pb.generation = generation;
        pb.cursor = 0;
        pb.state = PlaybackState::Playing;
        pb.task = Some(task);
        tracing::info!(
            session = %self.inner.label,
            frame_rate = self.inner.opts.frame_rate,
            delay_ticks = delay,
            frames = self.inner.frames.len(),
            "started playback"
        );
        Ok(())
    }

    /// Freeze on the current frame; the schedule stays alive.
    pub fn pause(&self) {
        let mut pb = self.inner.lock();
        if pb.state == PlaybackState::Playing {
            pb.state = PlaybackState::Paused;
        }
    }

    /// Resume a paused session whose schedule is still alive.
    pub fn resume(&self) {
        let mut pb = self.inner.lock();
        let scheduled = pb.task.as_ref().is_some_and(|t| !t.is_cancelled());
        if pb.state == PlaybackState::Paused && scheduled {
            pb.state = PlaybackState::Playing;
        }
    }

    /// Cancel the schedule and clear every cell.
    ///
    /// Idempotent. A session that never started is marked stopped without
    /// touching its cells.
    pub fn stop(&self) {
        let mut pb = self.inner.lock();
        self.stop_locked(&mut pb);
    }

    /// Stop for good: later [`start`](Self::start) calls fail.
    pub(crate) fn retire(&self) {
        let mut pb = self.inner.lock();
        pb.retired = true;
        self.stop_locked(&mut pb);
    }

    fn stop_locked(&self, pb: &mut Playback) {
        let previous = pb.state;
        match previous {
            PlaybackState::Stopped => return,
            PlaybackState::Idle => {
                pb.state = PlaybackState::Stopped;
                return;
            }
            PlaybackState::Playing | PlaybackState::Paused => {}
        }

        pb.state = PlaybackState::Stopped;
        if let Some(task) = pb.task.take() {
            task.cancel();
        }
        for (_, _, surface) in self.inner.grid.cells() {
            if let Err(e) = self.inner.sink.clear(surface) {
                tracing::warn!(
                    session = %self.inner.label,
                    %surface,
                    error = %e,
                    "failed to clear surface"
                );
            }
        }
        tracing::info!(session = %self.inner.label, ?previous, "stopped playback");
    }
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, Playback> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick(&self, generation: u64) {
        let mut pb = self.lock();
        if pb.generation != generation || pb.state != PlaybackState::Playing {
            return;
        }
        let len = self.frames.len();
        if len == 0 {
            return;
        }

        if let Some(frame) = self.frames.get(pb.cursor) {
            self.render(frame);
        }
        pb.cursor = (pb.cursor + 1) % len;
    }

    fn render(&self, frame: &RgbaImage) {
        for (column, row, surface) in self.grid.cells() {
            let Some(tile) =
                extract_tile(frame, column, row, self.opts.tile_size, self.opts.background)
            else {
                continue;
            };
            if let Err(e) = self.sink.push_tile(surface, &tile) {
                tracing::warn!(session = %self.label, %surface, error = %e, "tile push failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/session.rs"]
mod tests;
