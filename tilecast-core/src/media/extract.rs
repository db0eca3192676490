//! Frame extraction through the system `ffmpeg` binary.
//!
//! The decoder scales the source to fit the grid's pixel size (letterboxed
//! with the background color), resamples to the requested frame rate and
//! writes numbered PNGs into a scratch directory under the media dir. The
//! PNGs are then loaded back in filename order and the scratch directory is
//! removed, whatever the outcome.

use std::{
    collections::VecDeque,
    ffi::OsString,
    io::{self, BufRead as _, BufReader, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::foundation::{
    config::TilecastConfig,
    core::{FrameSequence, TILE_SIZE, unix_millis},
    error::{TilecastError, TilecastResult},
};

const FRAME_PATTERN: &str = "frame_%05d.png";
const STDERR_TAIL_LINES: usize = 8;
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs the decoder and loads its output as a [`FrameSequence`].
#[derive(Clone, Debug)]
pub struct FrameExtractor {
    program: PathBuf,
    media_dir: PathBuf,
    background: Rgba<u8>,
    timeout: Option<Duration>,
    max_frames: Option<u32>,
}

impl FrameExtractor {
    /// Extractor running `program` with scratch dirs under `media_dir`.
    pub fn new(program: impl Into<PathBuf>, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            media_dir: media_dir.into(),
            background: Rgba([0, 0, 0, 255]),
            timeout: None,
            max_frames: None,
        }
    }

    /// Extractor with the configured decoder, background, timeout and frame cap.
    pub fn from_config(cfg: &TilecastConfig) -> Self {
        Self::new(&cfg.ffmpeg_program, &cfg.media_dir)
            .with_background(cfg.background_pixel())
            .with_timeout(cfg.decode_timeout())
            .with_max_frames(cfg.max_frames)
    }

    /// Letterbox color.
    pub fn with_background(mut self, background: Rgba<u8>) -> Self {
        self.background = background;
        self
    }

    /// Kill the decoder after `timeout`; `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap on decoded frames.
    pub fn with_max_frames(mut self, max_frames: Option<u32>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Decoder arguments for one run, output going to `out_dir`.
    pub fn decoder_args(
        &self,
        input: &Path,
        out_dir: &Path,
        target: (u32, u32),
        frame_rate: u32,
    ) -> Vec<OsString> {
        let (tw, th) = target;
        let filter = format!(
            "scale={tw}:{th}:force_original_aspect_ratio=decrease,pad={tw}:{th}:(ow-iw)/2:(oh-ih)/2:{}",
            ffmpeg_color(self.background)
        );

        let mut args: Vec<OsString> = vec!["-y".into(), "-v".into(), "error".into(), "-i".into()];
        args.push(input.into());
        args.extend(["-vf".into(), filter.into()]);
        args.extend(["-r".into(), frame_rate.to_string().into()]);
        if let Some(n) = self.max_frames {
            args.extend(["-frames:v".into(), n.to_string().into()]);
        }
        args.extend(["-f".into(), "image2".into()]);
        args.push(out_dir.join(FRAME_PATTERN).into());
        args
    }

    /// Decode `source` for a `grid_width`×`grid_height` grid at `frame_rate`.
    ///
    /// Zero usable frames is not an error here; callers decide.
    #[tracing::instrument(skip(self, source), fields(path = %source.display()))]
    pub fn extract(
        &self,
        source: &Path,
        grid_width: u32,
        grid_height: u32,
        frame_rate: u32,
    ) -> TilecastResult<FrameSequence> {
        let target = (grid_width * TILE_SIZE, grid_height * TILE_SIZE);

        std::fs::create_dir_all(&self.media_dir)
            .with_context(|| format!("create media dir '{}'", self.media_dir.display()))?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("temp_{}_", unix_millis()))
            .tempdir_in(&self.media_dir)
            .context("create extraction scratch dir")?;

        let args = self.decoder_args(source, scratch.path(), target, frame_rate);
        tracing::debug!(program = %self.program.display(), ?args, "running decoder");
        self.run_decoder(&args)?;

        let frames = load_frames(scratch.path(), target)?;
        tracing::info!(
            frames = frames.len(),
            width = target.0,
            height = target.1,
            "extracted frames"
        );

        if let Err(e) = scratch.close() {
            tracing::warn!(error = %e, "failed to remove extraction scratch dir");
        }
        FrameSequence::new(frames)
    }

    fn run_decoder(&self, args: &[OsString]) -> TilecastResult<()> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TilecastError::extract(format!(
                    "failed to spawn '{}' (is it installed and on PATH?): {e}",
                    self.program.display()
                ))
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TilecastError::extract("failed to open decoder stderr"))?;
        let drain = thread::Builder::new()
            .name("tilecast-ffmpeg-stderr".into())
            .spawn(move || drain_stderr(stderr))
            .context("spawn decoder stderr drain")?;

        let status = wait_with_deadline(&mut child, self.timeout);
        let tail = drain.join().unwrap_or_default();

        let status = status?;
        if !status.success() {
            tracing::error!(code = ?status.code(), stderr = %tail.join("\n"), "decoder failed");
            return Err(TilecastError::extract_exit(status.code()));
        }
        Ok(())
    }
}

/// Read `stderr` to EOF, logging each line and keeping the last few.
///
/// Lines are split on raw bytes; decoder output is not guaranteed UTF-8 and
/// the pipe must stay open until the decoder exits.
fn drain_stderr(stderr: impl Read) -> Vec<String> {
    let mut reader = BufReader::new(stderr);
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_owned();
                tracing::debug!(target: "tilecast::ffmpeg", "{line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(error = %e, "decoder stderr read failed");
                break;
            }
        }
    }
    tail.into()
}

/// ffmpeg color literal, `0xRRGGBBAA`.
fn ffmpeg_color(c: Rgba<u8>) -> String {
    let [r, g, b, a] = c.0;
    format!("0x{r:02X}{g:02X}{b:02X}{a:02X}")
}

fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> TilecastResult<ExitStatus> {
    let Some(timeout) = timeout else {
        return child
            .wait()
            .map_err(|e| TilecastError::extract(format!("failed to wait for decoder: {e}")));
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                tracing::warn!(?timeout, "decoder timed out; killing");
                let _ = child.kill();
                let _ = child.wait();
                return Err(TilecastError::extract(format!(
                    "decoder exceeded {}s timeout",
                    timeout.as_secs()
                )));
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                return Err(TilecastError::extract(format!(
                    "failed to poll decoder: {e}"
                )));
            }
        }
    }
}

/// Load every `*.png` in `dir`, sorted by name, keeping only frames of
/// exactly `target` size.
fn load_frames(dir: &Path, target: (u32, u32)) -> TilecastResult<Vec<RgbaImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("list '{}'", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .collect();
    paths.sort();

    let frames = paths
        .par_iter()
        .map(|path| match image::open(path) {
            Ok(img) => {
                let img = img.into_rgba8();
                if img.dimensions() == target {
                    Some(img)
                } else {
                    tracing::warn!(
                        frame = %path.display(),
                        got = ?img.dimensions(),
                        want = ?target,
                        "skipping frame with unexpected size"
                    );
                    None
                }
            }
            Err(e) => {
                tracing::warn!(frame = %path.display(), error = %e, "skipping unreadable frame");
                None
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect();
    Ok(frames)
}

#[cfg(test)]
#[path = "../../tests/unit/media/extract.rs"]
mod tests;
