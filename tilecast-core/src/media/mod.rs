//! Getting a remote video onto local disk and decoded into frames.

pub mod extract;
pub mod fetch;
