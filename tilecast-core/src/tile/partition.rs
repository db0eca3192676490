use std::fmt;

use image::{GenericImageView, Rgba, RgbaImage, SubImage, imageops};

/// Pixels destined for one surface.
///
/// Tiles fully inside their frame borrow it; edge tiles that needed padding
/// own a fresh buffer.
pub enum Tile<'a> {
    /// Window onto the frame.
    View(SubImage<&'a RgbaImage>),
    /// Copy of the covered part over the background.
    Padded(RgbaImage),
}

impl Tile<'_> {
    /// Width and height in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Tile::View(v) => v.dimensions(),
            Tile::Padded(img) => img.dimensions(),
        }
    }

    /// Pixel at (`x`, `y`) within the tile.
    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        match self {
            Tile::View(v) => v.get_pixel(x, y),
            Tile::Padded(img) => *img.get_pixel(x, y),
        }
    }

    /// True when no pixels were copied to build this tile.
    pub fn is_borrowed(&self) -> bool {
        matches!(self, Tile::View(_))
    }

    /// Owned copy of the tile's pixels.
    pub fn to_image(&self) -> RgbaImage {
        match self {
            Tile::View(v) => v.to_image(),
            Tile::Padded(img) => img.clone(),
        }
    }
}

impl fmt::Debug for Tile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (w, h) = self.dimensions();
        let kind = if self.is_borrowed() { "View" } else { "Padded" };
        write!(f, "Tile::{kind}({w}x{h})")
    }
}

/// Cut the `tile_size` square for cell (`grid_x`, `grid_y`) out of `frame`.
///
/// Returns `None` when the cell lies entirely outside the frame. Cells that
/// overhang the frame edge come back as a full square of `background` with
/// the covered part copied into the top-left.
pub fn extract_tile(
    frame: &RgbaImage,
    grid_x: u32,
    grid_y: u32,
    tile_size: u32,
    background: Rgba<u8>,
) -> Option<Tile<'_>> {
    if tile_size == 0 {
        return None;
    }
    let x = grid_x.checked_mul(tile_size)?;
    let y = grid_y.checked_mul(tile_size)?;
    let (fw, fh) = frame.dimensions();
    if x >= fw || y >= fh {
        return None;
    }

    let w = tile_size.min(fw - x);
    let h = tile_size.min(fh - y);
    let view = imageops::crop_imm(frame, x, y, w, h);
    if w == tile_size && h == tile_size {
        return Some(Tile::View(view));
    }

    let mut padded = RgbaImage::from_pixel(tile_size, tile_size, background);
    imageops::replace(&mut padded, &*view, 0, 0);
    Some(Tile::Padded(padded))
}

#[cfg(test)]
#[path = "../../tests/unit/tile/partition.rs"]
mod tests;
