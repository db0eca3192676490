//! Looping playback of frame sequences onto surface grids.

pub mod registry;
pub mod schedule;
pub mod session;
