use std::time::Duration;

use glam::DVec3;

use super::*;
use crate::{
    foundation::{core::Facing, error::TilecastError},
    grid::discover::discover,
    host::{SpatialIndex, memory::MemoryWall},
    playback::schedule::{ManualScheduler, ThreadScheduler},
};

const TS: u32 = 128;

fn solid_frames(w: u32, h: u32, shades: &[u8]) -> FrameSequence {
    let frames = shades
        .iter()
        .map(|&s| RgbaImage::from_pixel(w * TS, h * TS, Rgba([s, s, s, 255])))
        .collect();
    FrameSequence::new(frames).unwrap()
}

struct Rig {
    wall: Arc<MemoryWall>,
    sched: Arc<ManualScheduler>,
    session: PlaybackSession,
}

fn rig(w: u32, h: u32, shades: &[u8], frame_rate: u32) -> Rig {
    let wall = Arc::new(MemoryWall::new());
    wall.add_grid(DVec3::ZERO, Facing::North, w, h);
    let grid = discover(wall.as_ref(), DVec3::ZERO, Some(Facing::North), w, h).unwrap();
    let sched = Arc::new(ManualScheduler::new(20));
    let session = PlaybackSession::new(
        "demo",
        solid_frames(w, h, shades),
        grid,
        wall.clone(),
        sched.clone(),
        SessionOpts {
            frame_rate,
            ..SessionOpts::default()
        },
    );
    Rig {
        wall,
        sched,
        session,
    }
}

fn shade_at(wall: &MemoryWall, surface: SurfaceId) -> Option<u8> {
    wall.content(surface).map(|img| img.get_pixel(0, 0).0[0])
}

#[test]
fn new_session_is_idle() {
    let r = rig(2, 2, &[10, 20, 30], 20);
    assert_eq!(r.session.state(), PlaybackState::Idle);
    assert_eq!(r.session.cursor(), 0);
    assert_eq!(r.session.total_frames(), 3);
    r.sched.advance(5);
    assert_eq!(r.wall.push_count(), 0);
}

#[test]
fn ticks_cycle_frames_and_loop() {
    let r = rig(2, 2, &[10, 20, 30], 20);
    assert_eq!(r.session.delay_ticks(), 1);
    r.session.start().unwrap();
    assert_eq!(r.session.state(), PlaybackState::Playing);

    let cells: Vec<_> = r.session.grid().cells().map(|(_, _, id)| id).collect();
    let mut shown = Vec::new();
    for _ in 0..7 {
        r.sched.advance(1);
        let shade = shade_at(&r.wall, cells[0]).unwrap();
        for &c in &cells {
            assert_eq!(shade_at(&r.wall, c), Some(shade));
        }
        shown.push(shade);
        assert!(r.session.cursor() < 3);
    }
    assert_eq!(shown, vec![10, 20, 30, 10, 20, 30, 10]);
    assert_eq!(r.wall.push_count(), 7 * 4);
}

#[test]
fn cursor_returns_to_zero_after_full_cycle() {
    let r = rig(1, 1, &[1, 2, 3, 4, 5], 20);
    r.session.start().unwrap();
    r.sched.advance(5);
    assert_eq!(r.session.cursor(), 0);
    r.sched.advance(2);
    assert_eq!(r.session.cursor(), 2);
}

#[test]
fn slow_frame_rate_spaces_out_frames() {
    let r = rig(1, 1, &[1, 2], 10);
    assert_eq!(r.session.delay_ticks(), 2);
    r.session.start().unwrap();
    r.sched.advance(4);
    assert_eq!(r.wall.push_count(), 2);
}

#[test]
fn frame_rate_above_tick_rate_clamps_to_one_tick() {
    let r = rig(1, 1, &[1, 2], 45);
    assert_eq!(r.session.delay_ticks(), 1);
    r.session.start().unwrap();
    r.sched.advance(4);
    assert_eq!(r.wall.push_count(), 4);
}

#[test]
fn start_is_noop_while_playing() {
    let r = rig(1, 1, &[1, 2, 3], 20);
    r.session.start().unwrap();
    r.sched.advance(2);
    r.session.start().unwrap();
    assert_eq!(r.session.cursor(), 2);
    assert_eq!(r.sched.active_tasks(), 1);
}

#[test]
fn pause_freezes_cursor_and_resume_continues() {
    let r = rig(1, 1, &[1, 2, 3], 20);
    r.session.start().unwrap();
    r.sched.advance(1);
    r.session.pause();
    assert_eq!(r.session.state(), PlaybackState::Paused);

    r.sched.advance(10);
    assert_eq!(r.session.cursor(), 1);
    assert_eq!(r.wall.push_count(), 1);
    // Still scheduled while paused.
    assert_eq!(r.sched.active_tasks(), 1);

    r.session.resume();
    assert_eq!(r.session.state(), PlaybackState::Playing);
    r.sched.advance(1);
    assert_eq!(r.session.cursor(), 2);
}

#[test]
fn resume_does_nothing_unless_paused() {
    let r = rig(1, 1, &[1], 20);
    r.session.resume();
    assert_eq!(r.session.state(), PlaybackState::Idle);

    r.session.start().unwrap();
    r.session.stop();
    r.session.resume();
    assert_eq!(r.session.state(), PlaybackState::Stopped);
}

#[test]
fn stop_clears_cells_and_cancels_schedule() {
    let r = rig(2, 1, &[7, 8], 20);
    r.session.start().unwrap();
    r.sched.advance(3);
    let cells: Vec<_> = r.session.grid().cells().map(|(_, _, id)| id).collect();
    assert!(cells.iter().all(|&c| !r.wall.is_empty(c)));

    r.session.stop();
    assert_eq!(r.session.state(), PlaybackState::Stopped);
    assert!(cells.iter().all(|&c| r.wall.is_empty(c)));
    assert_eq!(r.sched.active_tasks(), 0);

    let pushes = r.wall.push_count();
    r.sched.advance(5);
    assert_eq!(r.wall.push_count(), pushes);
}

#[test]
fn stop_twice_is_harmless() {
    let r = rig(1, 1, &[1], 20);
    r.session.start().unwrap();
    r.sched.advance(1);
    r.session.stop();
    r.session.stop();
    assert_eq!(r.session.state(), PlaybackState::Stopped);
    assert_eq!(r.wall.clear_count(), 1);
}

#[test]
fn stop_while_idle_leaves_cells_untouched() {
    let r = rig(2, 2, &[1], 20);
    r.session.stop();
    assert_eq!(r.session.state(), PlaybackState::Stopped);
    assert_eq!(r.wall.clear_count(), 0);
    assert_eq!(r.wall.push_count(), 0);
}

#[test]
fn stopped_session_restarts_from_first_frame() {
    let r = rig(1, 1, &[1, 2, 3], 20);
    r.session.start().unwrap();
    r.sched.advance(2);
    r.session.stop();

    r.session.start().unwrap();
    assert_eq!(r.session.state(), PlaybackState::Playing);
    assert_eq!(r.session.cursor(), 0);
    r.sched.advance(1);
    let cell = r.session.grid().get(0, 0).unwrap();
    assert_eq!(shade_at(&r.wall, cell), Some(1));
}

#[test]
fn tick_from_previous_start_is_ignored() {
    let r = rig(1, 1, &[1, 2, 3], 20);
    r.session.start().unwrap();
    let first = r.session.inner.lock().generation;
    r.sched.advance(1);
    r.session.stop();
    r.session.start().unwrap();
    r.sched.advance(1);
    assert_eq!(r.session.cursor(), 1);
    let pushes = r.wall.push_count();

    // A tick already dispatched for the first run reaches the lock late.
    r.session.inner.tick(first);
    assert_eq!(r.session.cursor(), 1);
    assert_eq!(r.wall.push_count(), pushes);

    let current = r.session.inner.lock().generation;
    assert_ne!(current, first);
    r.session.inner.tick(current);
    assert_eq!(r.session.cursor(), 2);
}

#[test]
fn retired_session_refuses_to_start() {
    let r = rig(1, 1, &[1, 2], 20);
    r.session.start().unwrap();
    r.sched.advance(1);
    r.session.retire();
    assert_eq!(r.session.state(), PlaybackState::Stopped);
    assert!(r.session.start().is_err());
    assert_eq!(r.sched.active_tasks(), 0);

    let idle = rig(1, 1, &[1], 20);
    idle.session.retire();
    assert!(matches!(idle.session.start(), Err(TilecastError::Validation(_))));
    assert_eq!(idle.sched.active_tasks(), 0);
}

#[test]
fn empty_sequence_keeps_ticking_without_rendering() {
    let wall = Arc::new(MemoryWall::new());
    wall.add_grid(DVec3::ZERO, Facing::North, 1, 1);
    let grid = discover(wall.as_ref(), DVec3::ZERO, Some(Facing::North), 1, 1).unwrap();
    let sched = Arc::new(ManualScheduler::new(20));
    let session = PlaybackSession::new(
        "empty",
        FrameSequence::empty(),
        grid,
        wall.clone(),
        sched.clone(),
        SessionOpts::default(),
    );

    session.start().unwrap();
    sched.advance(5);
    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(session.cursor(), 0);
    assert_eq!(wall.push_count(), 0);
    assert_eq!(sched.active_tasks(), 1);
}

#[test]
fn vanished_cell_does_not_abort_tick() {
    let r = rig(3, 1, &[5, 6], 20);
    let cells: Vec<_> = r.session.grid().cells().map(|(_, _, id)| id).collect();
    r.wall.remove_surface(cells[1]);

    r.session.start().unwrap();
    r.sched.advance(2);
    assert_eq!(r.session.state(), PlaybackState::Playing);
    assert_eq!(shade_at(&r.wall, cells[0]), Some(6));
    assert_eq!(shade_at(&r.wall, cells[2]), Some(6));
    assert_eq!(r.wall.push_count(), 4);

    r.session.stop();
    assert!(r.wall.is_empty(cells[0]));
    assert!(r.wall.is_empty(cells[2]));
}

#[test]
fn small_frames_render_only_covered_cells() {
    let wall = Arc::new(MemoryWall::new());
    wall.add_grid(DVec3::ZERO, Facing::North, 3, 1);
    let grid = discover(wall.as_ref(), DVec3::ZERO, Some(Facing::North), 3, 1).unwrap();
    let sched = Arc::new(ManualScheduler::new(20));
    // 200px wide: cell 0 full, cell 1 padded, cell 2 outside the frame.
    let frame = RgbaImage::from_pixel(200, 128, Rgba([50, 50, 50, 255]));
    let frames = FrameSequence::new(vec![frame]).unwrap();
    let session = PlaybackSession::new(
        "short",
        frames,
        grid.clone(),
        wall.clone(),
        sched.clone(),
        SessionOpts::default(),
    );

    session.start().unwrap();
    sched.advance(1);
    let c: Vec<_> = grid.cells().map(|(_, _, id)| id).collect();
    assert_eq!(shade_at(&wall, c[0]), Some(50));
    let padded = wall.content(c[1]).unwrap();
    assert_eq!(padded.get_pixel(71, 0), &Rgba([50, 50, 50, 255]));
    assert_eq!(padded.get_pixel(72, 0), &Rgba([0, 0, 0, 255]));
    assert!(wall.content(c[2]).is_none());
}

#[test]
fn status_reports_snapshot() {
    let r = rig(2, 3, &[1, 2], 10);
    r.session.start().unwrap();
    r.sched.advance(1);
    let st = r.session.status();
    assert_eq!(st.label, "demo");
    assert_eq!(st.state, PlaybackState::Playing);
    assert_eq!((st.cursor, st.total_frames), (1, 2));
    assert_eq!((st.grid_width, st.grid_height), (2, 3));
    assert_eq!(st.delay_ticks, 2);
}

#[test]
fn stop_races_thread_ticks_without_leaving_content() {
    let wall = Arc::new(MemoryWall::new());
    wall.add_grid(DVec3::ZERO, Facing::North, 2, 2);
    let grid = discover(wall.as_ref(), DVec3::ZERO, Some(Facing::North), 2, 2).unwrap();
    let sched = Arc::new(ThreadScheduler::new(1000).unwrap());
    let session = PlaybackSession::new(
        "race",
        solid_frames(2, 2, &[1, 2, 3]),
        grid.clone(),
        wall.clone(),
        sched,
        SessionOpts {
            frame_rate: 60,
            ..SessionOpts::default()
        },
    );

    session.start().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    session.stop();
    std::thread::sleep(Duration::from_millis(30));

    assert_eq!(session.state(), PlaybackState::Stopped);
    assert!(grid.cells().all(|(_, _, id)| wall.is_empty(id)));
}

#[test]
fn sessions_share_frame_storage() {
    let frames = solid_frames(1, 1, &[1, 2]);
    let wall = Arc::new(MemoryWall::new());
    wall.add_grid(DVec3::ZERO, Facing::North, 1, 1);
    wall.add_grid(DVec3::new(0.0, 0.0, 5.0), Facing::North, 1, 1);
    let g1 = discover(wall.as_ref(), DVec3::ZERO, Some(Facing::North), 1, 1).unwrap();
    let g2 = discover(wall.as_ref(), DVec3::new(0.0, 0.0, 5.0), Some(Facing::North), 1, 1)
        .unwrap();
    let sched = Arc::new(ManualScheduler::new(20));
    let opts = SessionOpts::default();

    let a = PlaybackSession::new("a", frames.clone(), g1, wall.clone(), sched.clone(), opts);
    let b = PlaybackSession::new("b", frames, g2, wall.clone(), sched.clone(), opts);
    assert!(a.frames().shares_storage(b.frames()));

    a.start().unwrap();
    b.start().unwrap();
    sched.advance(3);
    assert_eq!(a.cursor(), 1);
    assert_eq!(b.cursor(), 1);
}
