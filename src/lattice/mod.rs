//! Microlens lattice model: centroids, indexed centroid lists and ideal
//! grids.
//!
//! Coordinates are sub-pixel `(y, x)` in sensor space. Rows run top to
//! bottom and columns left to right. In a hexagonal lattice every other row
//! is shifted right by half a pitch; `hex_odd` says whether the shifted rows
//! are the odd ones.
pub mod spatial;

use crate::error::{LfError, Result};
use serde::{Deserialize, Serialize};

/// Row spacing of a hexagonal lattice relative to its pitch (√3/2).
pub const HEX_ROW_FACTOR: f64 = 0.866_025_403_784_438_6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    #[serde(rename = "rec")]
    Rectangular,
    #[serde(rename = "hex")]
    Hexagonal,
}

impl Pattern {
    /// Row spacing divided by column spacing for an ideal lattice.
    pub fn row_factor(self) -> f64 {
        match self {
            Self::Rectangular => 1.0,
            Self::Hexagonal => HEX_ROW_FACTOR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rectangular => "rec",
            Self::Hexagonal => "hex",
        }
    }
}

/// Unindexed sub-pixel micro-image centre.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub y: f64,
    pub x: f64,
}

impl Centroid {
    pub fn new(y: f64, x: f64) -> Self {
        Self { y, x }
    }

    #[inline]
    pub fn yx(&self) -> [f64; 2] {
        [self.y, self.x]
    }
}

/// Micro-image centre with its lattice index.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mic {
    pub y: f64,
    pub x: f64,
    pub row: usize,
    pub col: usize,
}

impl Mic {
    #[inline]
    pub fn yx(&self) -> [f64; 2] {
        [self.y, self.x]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MlaGeometry {
    pub pattern: Pattern,
    /// `[vertical, horizontal]` mean spacing in pixels.
    pub pitch: [f64; 2],
    /// Odd rows carry the half-pitch shift (hexagonal only).
    pub hex_odd: bool,
}

impl MlaGeometry {
    /// Whether lattice row `row` sits half a pitch to the right.
    pub fn row_shifted(&self, row: usize) -> bool {
        self.pattern == Pattern::Hexagonal && ((row % 2 == 1) == self.hex_odd)
    }

    /// Micro-image diameter estimate: horizontal pitch and the vertical pitch
    /// corrected for the row factor, averaged.
    pub fn mean_pitch(&self) -> f64 {
        0.5 * (self.pitch[0] / self.pattern.row_factor() + self.pitch[1])
    }
}

/// Dense, row-major list of indexed micro-image centres.
///
/// Every `(row, col)` in `[0, rows) × [0, cols)` appears exactly once and
/// `mics[row * cols + col]` holds it.
#[derive(Clone, Debug, PartialEq)]
pub struct CentroidList {
    mics: Vec<Mic>,
    rows: usize,
    cols: usize,
    geometry: MlaGeometry,
}

impl CentroidList {
    /// Validate density and order the entries row-major.
    pub fn new(mut mics: Vec<Mic>, rows: usize, cols: usize, geometry: MlaGeometry) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(LfError::degenerate("empty lattice"));
        }
        if mics.len() != rows * cols {
            return Err(LfError::degenerate(format!(
                "lattice {rows}x{cols} needs {} centroids, got {}",
                rows * cols,
                mics.len()
            )));
        }
        mics.sort_by_key(|m| (m.row, m.col));
        for (i, m) in mics.iter().enumerate() {
            if m.row != i / cols || m.col != i % cols {
                return Err(LfError::degenerate(format!(
                    "lattice index ({}, {}) missing or duplicated",
                    i / cols,
                    i % cols
                )));
            }
        }
        Ok(Self {
            mics,
            rows,
            cols,
            geometry,
        })
    }

    /// Build from row-major positions, measuring pitch and hex parity.
    pub fn from_positions(
        positions: &[[f64; 2]],
        rows: usize,
        cols: usize,
        pattern: Pattern,
    ) -> Result<Self> {
        if positions.len() != rows * cols {
            return Err(LfError::degenerate("position count does not match lattice"));
        }
        let pitch = measure_pitch(positions, rows, cols, pattern);
        let hex_odd = pattern == Pattern::Hexagonal && derive_hex_odd(positions, rows, cols);
        let mics = positions
            .iter()
            .enumerate()
            .map(|(i, p)| Mic {
                y: p[0],
                x: p[1],
                row: i / cols,
                col: i % cols,
            })
            .collect();
        Self::new(
            mics,
            rows,
            cols,
            MlaGeometry {
                pattern,
                pitch,
                hex_odd,
            },
        )
    }

    /// Same lattice with new positions; pitch and parity are re-measured.
    pub fn with_positions(&self, positions: &[[f64; 2]]) -> Result<Self> {
        Self::from_positions(positions, self.rows, self.cols, self.geometry.pattern)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.mics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mics.is_empty()
    }

    pub fn geometry(&self) -> &MlaGeometry {
        &self.geometry
    }

    pub fn pattern(&self) -> Pattern {
        self.geometry.pattern
    }

    pub fn mics(&self) -> &[Mic] {
        &self.mics
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> &Mic {
        &self.mics[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[Mic] {
        &self.mics[row * self.cols..(row + 1) * self.cols]
    }

    pub fn positions(&self) -> Vec<[f64; 2]> {
        self.mics.iter().map(Mic::yx).collect()
    }
}

/// Mean `[vertical, horizontal]` neighbour spacing of a row-major lattice.
///
/// A missing direction (single row or column) falls back to the other one
/// scaled by the pattern's row factor.
pub fn measure_pitch(positions: &[[f64; 2]], rows: usize, cols: usize, pattern: Pattern) -> [f64; 2] {
    let mut h_sum = 0.0;
    let mut h_n = 0usize;
    for r in 0..rows {
        for c in 0..cols.saturating_sub(1) {
            h_sum += positions[r * cols + c + 1][1] - positions[r * cols + c][1];
            h_n += 1;
        }
    }
    let mut v_sum = 0.0;
    let mut v_n = 0usize;
    for r in 0..rows.saturating_sub(1) {
        for c in 0..cols {
            v_sum += positions[(r + 1) * cols + c][0] - positions[r * cols + c][0];
            v_n += 1;
        }
    }
    let f = pattern.row_factor();
    match (v_n, h_n) {
        (0, 0) => [0.0, 0.0],
        (0, _) => {
            let h = h_sum / h_n as f64;
            [h * f, h]
        }
        (_, 0) => {
            let v = v_sum / v_n as f64;
            [v, v / f]
        }
        _ => [v_sum / v_n as f64, h_sum / h_n as f64],
    }
}

/// `true` when row 1 sits to the right of row 0, i.e. odd rows are shifted.
pub fn derive_hex_odd(positions: &[[f64; 2]], rows: usize, cols: usize) -> bool {
    if rows < 2 || cols == 0 {
        return true;
    }
    let mean_x = |r: usize| positions[r * cols..(r + 1) * cols].iter().map(|p| p[1]).sum::<f64>() / cols as f64;
    mean_x(1) > mean_x(0)
}

/// Ideal lattice of `rows × cols` points, row-major, centred on the origin.
///
/// With `normalize` both axes span `[-1, 1]` before the hexagonal row factor
/// and shift are applied; otherwise the spacing is one unit. Shifted rows
/// move right by half a column spacing.
pub fn grid_gen(rows: usize, cols: usize, pattern: Pattern, hex_odd: bool, normalize: bool) -> Vec<Mic> {
    let lin = |k: usize, d: usize| -> f64 {
        if !normalize {
            k as f64
        } else if d > 1 {
            -1.0 + 2.0 * k as f64 / (d - 1) as f64
        } else {
            0.0
        }
    };
    let col_step = if normalize && cols > 1 {
        2.0 / (cols - 1) as f64
    } else {
        1.0
    };
    let geometry = MlaGeometry {
        pattern,
        pitch: [pattern.row_factor(), 1.0],
        hex_odd,
    };
    let mut mics = Vec::with_capacity(rows * cols);
    for ly in 0..rows {
        let shift = if geometry.row_shifted(ly) {
            0.5 * col_step
        } else {
            0.0
        };
        let y = lin(ly, rows) * pattern.row_factor();
        for lx in 0..cols {
            mics.push(Mic {
                y,
                x: lin(lx, cols) + shift,
                row: ly,
                col: lx,
            });
        }
    }
    if mics.is_empty() {
        return mics;
    }
    let (mut y0, mut y1, mut x0, mut x1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for m in &mics {
        y0 = y0.min(m.y);
        y1 = y1.max(m.y);
        x0 = x0.min(m.x);
        x1 = x1.max(m.x);
    }
    let (cy, cx) = ((y0 + y1) / 2.0, (x0 + x1) / 2.0);
    for m in &mut mics {
        m.y -= cy;
        m.x -= cx;
    }
    mics
}
