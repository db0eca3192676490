use std::{
    fmt,
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use image::RgbaImage;

use crate::foundation::error::{TilecastError, TilecastResult};

/// Edge length in pixels of one display surface.
pub const TILE_SIZE: u32 = 128;

/// Largest accepted grid width or height, in cells.
pub const MAX_GRID_CELLS: u32 = 128;

/// Frame rate used when a request does not name one.
pub const DEFAULT_FRAME_RATE: u32 = 20;

/// Highest accepted frame rate.
pub const MAX_FRAME_RATE: u32 = 60;

/// Opaque handle to a display surface owned by the host.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SurfaceId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Axis-aligned direction a surface faces, as on a cube.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Horizontal, toward north.
    North,
    /// Horizontal, toward south.
    South,
    /// Horizontal, toward east.
    East,
    /// Horizontal, toward west.
    West,
    /// Lying flat, facing the sky.
    Up,
    /// Lying flat, facing the ground.
    Down,
}

impl Facing {
    /// Every facing, in declaration order.
    pub const ALL: [Facing; 6] = [
        Facing::North,
        Facing::South,
        Facing::East,
        Facing::West,
        Facing::Up,
        Facing::Down,
    ];

    /// Lower-case name, as accepted by `FromStr`.
    pub fn as_str(self) -> &'static str {
        match self {
            Facing::North => "north",
            Facing::South => "south",
            Facing::East => "east",
            Facing::West => "west",
            Facing::Up => "up",
            Facing::Down => "down",
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Facing {
    type Err = TilecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Facing::ALL
            .into_iter()
            .find(|f| f.as_str() == lower)
            .ok_or_else(|| TilecastError::validation(format!("unknown facing '{s}'")))
    }
}

/// A validated request to turn a remote video into a `width`×`height` mosaic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRequest {
    name: String,
    url: url::Url,
    width: u32,
    height: u32,
    frame_rate: u32,
}

impl MediaRequest {
    /// Validate every field; a missing frame rate becomes [`DEFAULT_FRAME_RATE`].
    pub fn new(
        name: impl Into<String>,
        url: &str,
        width: u32,
        height: u32,
        frame_rate: Option<u32>,
    ) -> TilecastResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(TilecastError::validation("name must not be empty"));
        }
        if name.contains(['/', '\\', '\0']) || name.contains("..") {
            return Err(TilecastError::validation(
                "name must not contain path separators or '..'",
            ));
        }

        let url = url::Url::parse(url)
            .map_err(|e| TilecastError::validation(format!("invalid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(TilecastError::validation(format!(
                "unsupported URL scheme '{}' (expected http or https)",
                url.scheme()
            )));
        }

        for (label, v) in [("width", width), ("height", height)] {
            if v == 0 || v > MAX_GRID_CELLS {
                return Err(TilecastError::validation(format!(
                    "{label} must be between 1 and {MAX_GRID_CELLS}, got {v}"
                )));
            }
        }

        let frame_rate = frame_rate.unwrap_or(DEFAULT_FRAME_RATE);
        if frame_rate == 0 || frame_rate > MAX_FRAME_RATE {
            return Err(TilecastError::validation(format!(
                "frame rate must be between 1 and {MAX_FRAME_RATE} FPS, got {frame_rate}"
            )));
        }

        Ok(Self {
            name,
            url,
            width,
            height,
            frame_rate,
        })
    }

    /// Media name, also used for the downloaded file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source URL, always http or https.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Grid width in cells.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Frames per second.
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    /// Mosaic resolution in pixels.
    pub fn pixel_size(&self) -> (u32, u32) {
        (self.width * TILE_SIZE, self.height * TILE_SIZE)
    }
}

/// Ordered, immutable RGBA8 frames sharing one resolution.
///
/// Cloning is cheap; clones share the same pixel storage.
#[derive(Clone, Debug)]
pub struct FrameSequence {
    frames: Arc<[RgbaImage]>,
    width: u32,
    height: u32,
}

impl FrameSequence {
    /// Fails if the frames do not all share one size.
    pub fn new(frames: Vec<RgbaImage>) -> TilecastResult<Self> {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        if let Some((i, f)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.dimensions() != (width, height))
        {
            return Err(TilecastError::validation(format!(
                "frame {i} is {}x{}, expected {width}x{height}",
                f.width(),
                f.height()
            )));
        }
        Ok(Self {
            frames: frames.into(),
            width,
            height,
        })
    }

    /// Sequence with no frames.
    pub fn empty() -> Self {
        Self {
            frames: Arc::from(Vec::new()),
            width: 0,
            height: 0,
        }
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether there are no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frame `index`.
    pub fn get(&self, index: usize) -> Option<&RgbaImage> {
        self.frames.get(index)
    }

    /// Frames in order.
    pub fn iter(&self) -> impl Iterator<Item = &RgbaImage> {
        self.frames.iter()
    }

    /// Pixel dimensions shared by every frame; `(0, 0)` when empty.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// True when both values point at the same frame storage.
    pub fn shares_storage(&self, other: &FrameSequence) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }
}

/// Host ticks between frames: `max(1, ticks_per_second / frame_rate)`.
///
/// Playback never runs faster than the host's tick rate.
pub fn frame_delay_ticks(frame_rate: u32, ticks_per_second: u32) -> u64 {
    if frame_rate == 0 {
        return 1;
    }
    u64::from(ticks_per_second / frame_rate).max(1)
}

pub(crate) fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
