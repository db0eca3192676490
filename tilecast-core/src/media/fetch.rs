use std::{
    fs::File,
    io::{self, BufWriter, Write as _},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::foundation::{
    config::TilecastConfig,
    core::{MediaRequest, unix_millis},
    error::{TilecastError, TilecastResult},
};

/// A downloaded source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalMedia {
    /// Where the download landed.
    pub path: PathBuf,
    /// Bytes written.
    pub bytes: u64,
}

/// File extension for a media URL, from the lower-cased path suffix.
///
/// Unknown suffixes fall back to `mp4`; the decoder sniffs the container
/// anyway.
pub(crate) fn extension_for_url(url: &url::Url) -> &'static str {
    let path = url.path().to_ascii_lowercase();
    for ext in ["mp4", "gif", "webp", "webm", "mov"] {
        if path.ends_with(&format!(".{ext}")) {
            return ext;
        }
    }
    "mp4"
}

/// Downloads request URLs into the media directory.
#[derive(Debug)]
pub struct MediaFetcher {
    client: reqwest::blocking::Client,
    media_dir: PathBuf,
}

impl MediaFetcher {
    /// Fetcher writing into `media_dir`, giving up on a request after `timeout`.
    pub fn new(media_dir: impl Into<PathBuf>, timeout: Option<Duration>) -> TilecastResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tilecast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TilecastError::fetch(format!("build http client: {e}")))?;
        Ok(Self {
            client,
            media_dir: media_dir.into(),
        })
    }

    /// Fetcher using the configured media dir and timeout.
    pub fn from_config(cfg: &TilecastConfig) -> TilecastResult<Self> {
        Self::new(&cfg.media_dir, cfg.fetch_timeout())
    }

    /// Download directory.
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Stream `request`'s URL to `<name>_<millis>.<ext>` in the media dir.
    ///
    /// No retries. A partially written file is removed on failure.
    #[tracing::instrument(skip(self), fields(name = request.name(), url = %request.url()))]
    pub fn fetch(&self, request: &MediaRequest) -> TilecastResult<LocalMedia> {
        std::fs::create_dir_all(&self.media_dir).map_err(|e| {
            TilecastError::fetch(format!(
                "create media dir '{}': {e}",
                self.media_dir.display()
            ))
        })?;

        let file_name = format!(
            "{}_{}.{}",
            request.name(),
            unix_millis(),
            extension_for_url(request.url())
        );
        let path = self.media_dir.join(file_name);

        let mut resp = self
            .client
            .get(request.url().clone())
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| TilecastError::fetch(format!("download failed: {e}")))?;

        let bytes = match write_body(&mut resp, &path) {
            Ok(n) => n,
            Err(e) => {
                match std::fs::remove_file(&path) {
                    Err(rm) if rm.kind() != io::ErrorKind::NotFound => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %rm,
                            "failed to remove partial download"
                        );
                    }
                    _ => {}
                }
                return Err(TilecastError::fetch(format!(
                    "write '{}': {e}",
                    path.display()
                )));
            }
        };

        tracing::info!(path = %path.display(), bytes, "downloaded source");
        Ok(LocalMedia { path, bytes })
    }
}

fn write_body(body: &mut impl io::Read, path: &Path) -> io::Result<u64> {
    let mut out = BufWriter::new(File::create(path)?);
    let n = io::copy(body, &mut out)?;
    out.flush()?;
    Ok(n)
}

#[cfg(test)]
#[path = "../../tests/unit/media/fetch.rs"]
mod tests;
