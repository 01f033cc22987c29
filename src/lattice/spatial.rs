//! Uniform bucket grid for radius and nearest-neighbour queries over
//! centroid positions.
//!
//! Cells are about one lattice pitch wide, so a query touches a handful of
//! buckets regardless of how many centroids the sensor carries.

const MAX_CELLS_PER_AXIS: f64 = 4096.0;

pub struct PointGrid<'a> {
    points: &'a [[f64; 2]],
    cell: f64,
    origin: [f64; 2],
    rows: usize,
    cols: usize,
    buckets: Vec<Vec<u32>>,
}

impl<'a> PointGrid<'a> {
    pub fn new(points: &'a [[f64; 2]], cell: f64) -> Self {
        let (mut a0, mut a1, mut b0, mut b1) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for p in points {
            a0 = a0.min(p[0]);
            a1 = a1.max(p[0]);
            b0 = b0.min(p[1]);
            b1 = b1.max(p[1]);
        }
        if points.is_empty() {
            (a0, a1, b0, b1) = (0.0, 0.0, 0.0, 0.0);
        }
        let extent = (a1 - a0).max(b1 - b0);
        let cell = cell.max(extent / MAX_CELLS_PER_AXIS).max(1e-9);
        let rows = ((a1 - a0) / cell).floor() as usize + 1;
        let cols = ((b1 - b0) / cell).floor() as usize + 1;
        let mut buckets = vec![Vec::new(); rows * cols];
        for (i, p) in points.iter().enumerate() {
            let r = (((p[0] - a0) / cell).floor() as usize).min(rows - 1);
            let c = (((p[1] - b0) / cell).floor() as usize).min(cols - 1);
            buckets[r * cols + c].push(i as u32);
        }
        Self {
            points,
            cell,
            origin: [a0, b0],
            rows,
            cols,
            buckets,
        }
    }

    pub fn points(&self) -> &'a [[f64; 2]] {
        self.points
    }

    /// Visit every point within `radius` of `center` with its squared
    /// distance.
    pub fn for_each_within(&self, center: [f64; 2], radius: f64, mut f: impl FnMut(usize, f64)) {
        let r2 = radius * radius;
        let lo_r = ((center[0] - radius - self.origin[0]) / self.cell).floor();
        let hi_r = ((center[0] + radius - self.origin[0]) / self.cell).floor();
        let lo_c = ((center[1] - radius - self.origin[1]) / self.cell).floor();
        let hi_c = ((center[1] + radius - self.origin[1]) / self.cell).floor();
        if hi_r < 0.0 || hi_c < 0.0 || lo_r >= self.rows as f64 || lo_c >= self.cols as f64 {
            return;
        }
        let r0 = lo_r.max(0.0) as usize;
        let r1 = (hi_r as usize).min(self.rows - 1);
        let c0 = lo_c.max(0.0) as usize;
        let c1 = (hi_c as usize).min(self.cols - 1);
        for r in r0..=r1 {
            for c in c0..=c1 {
                for &i in &self.buckets[r * self.cols + c] {
                    let p = self.points[i as usize];
                    let d2 = (p[0] - center[0]).powi(2) + (p[1] - center[1]).powi(2);
                    if d2 <= r2 {
                        f(i as usize, d2);
                    }
                }
            }
        }
    }

    pub fn within(&self, center: [f64; 2], radius: f64) -> Vec<usize> {
        let mut out = Vec::new();
        self.for_each_within(center, radius, |i, _| out.push(i));
        out
    }

    /// Closest point within `radius`, skipping `exclude`. Returns the index
    /// and the distance.
    pub fn nearest(&self, center: [f64; 2], radius: f64, exclude: Option<usize>) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        self.for_each_within(center, radius, |i, d2| {
            if Some(i) == exclude {
                return;
            }
            if best.map_or(true, |(_, b)| d2 < b) {
                best = Some((i, d2));
            }
        });
        best.map(|(i, d2)| (i, d2.sqrt()))
    }
}
