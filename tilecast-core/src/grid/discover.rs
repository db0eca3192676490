use std::fmt;

use glam::DVec3;

use crate::{
    foundation::{
        core::{Facing, SurfaceId},
        error::{TilecastError, TilecastResult},
    },
    host::SpatialIndex,
};

/// Per-axis distance within which a surface counts as "at" an expected position.
pub const POSITION_TOLERANCE: f64 = 0.1;

/// Unit steps for one column to the right and one row down.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Basis {
    pub right: DVec3,
    pub down: DVec3,
}

/// Grid basis for surfaces facing `facing`.
pub(crate) fn basis(facing: Facing) -> Basis {
    let (right, down) = match facing {
        Facing::North => (DVec3::X, DVec3::Y),
        Facing::South => (DVec3::NEG_X, DVec3::Y),
        Facing::East => (DVec3::Z, DVec3::Y),
        Facing::West => (DVec3::NEG_Z, DVec3::Y),
        Facing::Up => (DVec3::X, DVec3::NEG_Z),
        Facing::Down => (DVec3::X, DVec3::Z),
    };
    Basis { right, down }
}

/// Where the surface for (`column`, `row`) must sit relative to the anchor.
pub(crate) fn cell_position(anchor: DVec3, basis: Basis, column: u32, row: u32) -> DVec3 {
    anchor + basis.right * f64::from(column) + basis.down * f64::from(row)
}

/// Why one cell disqualified a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellProblem {
    /// No surface with the anchor's facing at the expected position.
    Missing,
    /// A surface is there but already displays something.
    Occupied,
    /// The anchor has no usable facing.
    UnsupportedFacing,
}

impl fmt::Display for CellProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CellProblem::Missing => "has no matching surface",
            CellProblem::Occupied => "is not empty",
            CellProblem::UnsupportedFacing => "has an unsupported facing",
        })
    }
}

/// Discovery failed; names the first offending cell.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("no {width}x{height} grid at anchor: cell ({column}, {row}) {problem}")]
pub struct GridNotFound {
    /// Requested grid width.
    pub width: u32,
    /// Requested grid height.
    pub height: u32,
    /// Zero-based column of the offending cell.
    pub column: u32,
    /// Zero-based row of the offending cell.
    pub row: u32,
    /// What was wrong with it.
    pub problem: CellProblem,
}

impl GridNotFound {
    /// Player-facing explanation, with one-based cell coordinates.
    pub fn user_message(&self) -> String {
        let where_ = format!("column {}, row {}", self.column + 1, self.row + 1);
        match self.problem {
            CellProblem::Missing => format!(
                "Could not find a {}x{} grid of surfaces starting from the selected one: nothing at {where_}.",
                self.width, self.height
            ),
            CellProblem::Occupied => format!(
                "Could not use a {}x{} grid starting from the selected surface: the surface at {where_} is not empty.",
                self.width, self.height
            ),
            CellProblem::UnsupportedFacing => format!(
                "Could not find a {}x{} grid: the selected surface has no supported facing.",
                self.width, self.height
            ),
        }
    }
}

/// Row-major `height`×`width` surfaces; row 0 starts at the anchor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurfaceGrid {
    width: u32,
    height: u32,
    cells: Vec<SurfaceId>,
}

impl SurfaceGrid {
    /// Columns.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Rows.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Surface at (`column`, `row`), or `None` outside the grid.
    pub fn get(&self, column: u32, row: u32) -> Option<SurfaceId> {
        if column >= self.width || row >= self.height {
            return None;
        }
        self.cells
            .get(row as usize * self.width as usize + column as usize)
            .copied()
    }

    /// One row of surfaces, left to right.
    pub fn row(&self, row: u32) -> Option<&[SurfaceId]> {
        if row >= self.height {
            return None;
        }
        let start = row as usize * self.width as usize;
        self.cells.get(start..start + self.width as usize)
    }

    /// `(column, row, surface)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32, SurfaceId)> + '_ {
        let width = self.width.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, &id)| ((i as u32) % width, (i as u32) / width, id))
    }

    /// Whether `surface` is one of the cells.
    pub fn contains(&self, surface: SurfaceId) -> bool {
        self.cells.contains(&surface)
    }
}

/// Find a complete `width`×`height` grid of empty surfaces cornered at `anchor`.
///
/// Every cell must hold a surface with the anchor's facing and no content;
/// the first cell that does not aborts discovery for the whole grid.
#[tracing::instrument(skip(index))]
pub fn discover(
    index: &dyn SpatialIndex,
    anchor: DVec3,
    facing: Option<Facing>,
    width: u32,
    height: u32,
) -> TilecastResult<SurfaceGrid> {
    if width == 0 || height == 0 {
        return Err(TilecastError::validation(
            "grid width/height must be non-zero",
        ));
    }

    let not_found = |column, row, problem| GridNotFound {
        width,
        height,
        column,
        row,
        problem,
    };

    let Some(facing) = facing else {
        return Err(not_found(0, 0, CellProblem::UnsupportedFacing).into());
    };
    let basis = basis(facing);

    let mut cells = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height {
        for column in 0..width {
            let expected = cell_position(anchor, basis, column, row);
            let Some(surface) = index.find_surface_near(expected, POSITION_TOLERANCE, facing)
            else {
                tracing::debug!(column, row, ?expected, "grid cell missing");
                return Err(not_found(column, row, CellProblem::Missing).into());
            };
            if !index.is_empty(surface) {
                tracing::debug!(column, row, %surface, "grid cell occupied");
                return Err(not_found(column, row, CellProblem::Occupied).into());
            }
            cells.push(surface);
        }
    }

    Ok(SurfaceGrid {
        width,
        height,
        cells,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/grid/discover.rs"]
mod tests;
