//! Synthetic white images of micro-lens lattices.
use lfp_align::image::ImageF32;
use lfp_align::{grid_gen, Pattern, SensorImage};

/// Lattice layout used to render a white image.
#[derive(Clone, Copy, Debug)]
pub struct LatticeSpec {
    pub rows: usize,
    pub cols: usize,
    pub pattern: Pattern,
    pub hex_odd: bool,
    pub pitch: f64,
    /// Sensor position `[y, x]` of lattice point `(0, 0)`.
    pub origin: [f64; 2],
}

impl LatticeSpec {
    pub fn rect(rows: usize, cols: usize, pitch: f64) -> Self {
        Self {
            rows,
            cols,
            pattern: Pattern::Rectangular,
            hex_odd: false,
            pitch,
            origin: [20.3, 19.6],
        }
    }

    pub fn hex(rows: usize, cols: usize, pitch: f64, hex_odd: bool) -> Self {
        Self {
            pattern: Pattern::Hexagonal,
            hex_odd,
            ..Self::rect(rows, cols, pitch)
        }
    }

    /// Ground-truth centres, row-major.
    pub fn centers(&self) -> Vec<[f64; 2]> {
        let grid = grid_gen(self.rows, self.cols, self.pattern, self.hex_odd, false);
        let (y0, x0) = (grid[0].y, grid.iter().map(|m| m.x).fold(f64::MAX, f64::min));
        grid.iter()
            .map(|m| {
                [
                    self.origin[0] + (m.y - y0) * self.pitch,
                    self.origin[1] + (m.x - x0) * self.pitch,
                ]
            })
            .collect()
    }

    /// Image size `(w, h)` with a margin of one pitch plus the origin.
    pub fn image_size(&self) -> (usize, usize) {
        let centers = self.centers();
        let ymax = centers.iter().map(|c| c[0]).fold(0.0, f64::max);
        let xmax = centers.iter().map(|c| c[1]).fold(0.0, f64::max);
        (
            (xmax + self.origin[1]).ceil() as usize + 1,
            (ymax + self.origin[0]).ceil() as usize + 1,
        )
    }
}

/// Vignetted micro-images: `cos²(π·d/pitch)` inside half a pitch of each
/// centre, zero elsewhere.
pub fn white_image(spec: &LatticeSpec) -> ImageF32 {
    let (w, h) = spec.image_size();
    let mut img = ImageF32::new(w, h);
    let r = spec.pitch / 2.0;
    for c in spec.centers() {
        let y0 = (c[0] - r).floor().max(0.0) as usize;
        let y1 = ((c[0] + r).ceil() as usize).min(h - 1);
        let x0 = (c[1] - r).floor().max(0.0) as usize;
        let x1 = ((c[1] + r).ceil() as usize).min(w - 1);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let d = ((y as f64 - c[0]).powi(2) + (x as f64 - c[1]).powi(2)).sqrt();
                if d < r {
                    let v = (std::f64::consts::PI * d / spec.pitch).cos().powi(2) as f32;
                    if v > img.get(x, y) {
                        img.set(x, y, v);
                    }
                }
            }
        }
    }
    img
}

pub fn white_sensor(spec: &LatticeSpec) -> SensorImage {
    SensorImage::Gray(white_image(spec))
}

/// Three channels with different gains.
pub fn color_sensor(spec: &LatticeSpec) -> SensorImage {
    let base = white_image(spec);
    let planes = [1.0f32, 0.8, 0.6]
        .iter()
        .map(|g| ImageF32 {
            data: base.data.iter().map(|v| v * g).collect(),
            ..base.clone()
        })
        .collect();
    SensorImage::Multi(planes)
}
