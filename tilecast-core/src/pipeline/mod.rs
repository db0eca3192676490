//! End-to-end flow: prepare media off-thread, then deploy it onto a grid.

pub mod deploy;
pub mod ingest;
