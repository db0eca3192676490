use std::{path::PathBuf, sync::Arc, thread};

use anyhow::Context as _;
use crossbeam_channel::{Receiver, bounded};

use crate::{
    foundation::{
        config::TilecastConfig,
        core::{FrameSequence, MediaRequest},
        error::{TilecastError, TilecastResult},
    },
    media::{extract::FrameExtractor, fetch::MediaFetcher},
};

/// A request whose frames are decoded and ready to deploy.
#[derive(Clone, Debug)]
pub struct PreparedMedia {
    /// The request the frames were made for.
    pub request: MediaRequest,
    /// Downloaded source; `None` once deleted.
    pub source_path: Option<PathBuf>,
    /// Decoded frames at the request's grid resolution.
    pub frames: FrameSequence,
}

impl PreparedMedia {
    /// One-line description for logs and command output.
    pub fn summary(&self) -> String {
        let (w, h) = self.frames.dimensions();
        format!(
            "{}: {} frames at {}x{} px, {} fps, {}x{} grid",
            self.request.name(),
            self.frames.len(),
            w,
            h,
            self.request.frame_rate(),
            self.request.width(),
            self.request.height()
        )
    }
}

/// Progress reported while preparing media.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Fetching the source.
    Downloading,
    /// Running the decoder.
    Extracting,
    /// Done.
    Ready {
        /// Frames decoded.
        frames: usize,
    },
}

/// Fetch then extract, the slow half of a deployment.
#[derive(Debug)]
pub struct Ingest {
    fetcher: MediaFetcher,
    extractor: FrameExtractor,
    keep_sources: bool,
}

impl Ingest {
    /// `keep_sources` decides whether downloads survive extraction.
    pub fn new(fetcher: MediaFetcher, extractor: FrameExtractor, keep_sources: bool) -> Self {
        Self {
            fetcher,
            extractor,
            keep_sources,
        }
    }

    /// Fetcher and extractor built from `cfg`.
    pub fn from_config(cfg: &TilecastConfig) -> TilecastResult<Self> {
        Ok(Self::new(
            MediaFetcher::from_config(cfg)?,
            FrameExtractor::from_config(cfg),
            cfg.keep_sources,
        ))
    }

    /// Download and decode `request`.
    ///
    /// A decode that yields no frames is [`TilecastError::EmptyResult`].
    #[tracing::instrument(skip(self, progress), fields(name = request.name()))]
    pub fn prepare(
        &self,
        request: &MediaRequest,
        progress: &mut dyn FnMut(Stage),
    ) -> TilecastResult<PreparedMedia> {
        progress(Stage::Downloading);
        let local = self.fetcher.fetch(request)?;

        progress(Stage::Extracting);
        let extracted = self.extractor.extract(
            &local.path,
            request.width(),
            request.height(),
            request.frame_rate(),
        );

        let source_path = if self.keep_sources {
            Some(local.path)
        } else {
            if let Err(e) = std::fs::remove_file(&local.path) {
                tracing::warn!(path = %local.path.display(), error = %e, "failed to remove source");
            }
            None
        };

        let frames = extracted?;
        if frames.is_empty() {
            return Err(TilecastError::EmptyResult);
        }

        progress(Stage::Ready {
            frames: frames.len(),
        });
        Ok(PreparedMedia {
            request: request.clone(),
            source_path,
            frames,
        })
    }

    /// Run [`prepare`](Self::prepare) on a worker thread.
    ///
    /// The receiver yields exactly one result. Progress is logged rather than
    /// reported.
    pub fn spawn_prepare(
        self: Arc<Self>,
        request: MediaRequest,
    ) -> TilecastResult<Receiver<TilecastResult<PreparedMedia>>> {
        let (tx, rx) = bounded(1);
        let ingest = self;
        thread::Builder::new()
            .name(format!("tilecast-ingest-{}", request.name()))
            .spawn(move || {
                let res = ingest.prepare(&request, &mut |stage| {
                    tracing::info!(name = request.name(), ?stage, "ingest progress");
                });
                let _ = tx.send(res);
            })
            .context("spawn ingest worker")?;
        Ok(rx)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/ingest.rs"]
mod tests;
