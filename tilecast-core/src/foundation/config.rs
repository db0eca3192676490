use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;

use crate::foundation::error::{TilecastError, TilecastResult};

/// Runtime configuration shared by the ingest pipeline and playback.
///
/// Every field has a default, so a config file only lists what it overrides:
///
/// ```json
/// { "media_dir": "/srv/tilecast", "ticks_per_second": 20, "max_frames": 2400 }
/// ```
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TilecastConfig {
    /// Directory holding downloaded sources and transient extraction dirs.
    pub media_dir: PathBuf,
    /// Host scheduling granularity.
    pub ticks_per_second: u32,
    /// Fill color (straight RGBA8) for letterboxing and tile padding.
    pub background: [u8; 4],
    /// Decoder executable, looked up on PATH when not absolute.
    pub ffmpeg_program: PathBuf,
    /// Whole-request timeout for downloads; `null` waits forever.
    pub fetch_timeout_secs: Option<u64>,
    /// Wall-clock limit for one decoder run; `null` waits forever.
    pub decode_timeout_secs: Option<u64>,
    /// Upper bound on decoded frames; `null` decodes the whole source.
    pub max_frames: Option<u32>,
    /// Keep downloaded sources after extraction.
    pub keep_sources: bool,
}

impl Default for TilecastConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("tilecast-media"),
            ticks_per_second: 20,
            background: [0, 0, 0, 255],
            ffmpeg_program: PathBuf::from("ffmpeg"),
            fetch_timeout_secs: Some(120),
            decode_timeout_secs: Some(600),
            max_frames: None,
            keep_sources: true,
        }
    }
}

impl TilecastConfig {
    /// Load and validate a JSON config file.
    pub fn from_path(path: &Path) -> TilecastResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_str(&text).map_err(|e| {
            TilecastError::validation(format!("config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values playback or extraction cannot work with.
    pub fn validate(&self) -> TilecastResult<()> {
        if self.ticks_per_second == 0 {
            return Err(TilecastError::validation("ticks_per_second must be > 0"));
        }
        if self.max_frames == Some(0) {
            return Err(TilecastError::validation("max_frames must be > 0 when set"));
        }
        if self.ffmpeg_program.as_os_str().is_empty() {
            return Err(TilecastError::validation("ffmpeg_program must not be empty"));
        }
        Ok(())
    }

    /// Download timeout.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    /// Decoder timeout.
    pub fn decode_timeout(&self) -> Option<Duration> {
        self.decode_timeout_secs.map(Duration::from_secs)
    }

    /// [`background`](Self::background) as a pixel.
    pub fn background_pixel(&self) -> image::Rgba<u8> {
        image::Rgba(self.background)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;
