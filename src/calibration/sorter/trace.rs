//! Directional neighbour search used to walk the lattice.
use crate::lattice::spatial::PointGrid;
use crate::params::SortParams;

use serde::Serialize;

/// How a lattice step was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StepPolicy {
    /// Exactly one candidate in the search trapezoid.
    Single,
    /// Several candidates (split detections); their mean is used.
    Averaged,
    /// Nothing found; the predicted position `last + step` is used.
    Extrapolated,
}

#[derive(Clone, Copy, Debug)]
pub struct Step {
    pub position: [f64; 2],
    pub policy: StepPolicy,
}

impl Step {
    pub fn is_measured(&self) -> bool {
        self.policy != StepPolicy::Extrapolated
    }
}

#[inline]
pub(super) fn add(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] + b[0], a[1] + b[1]]
}

#[inline]
pub(super) fn sub(a: [f64; 2], b: [f64; 2]) -> [f64; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

#[inline]
pub(super) fn scale(a: [f64; 2], s: f64) -> [f64; 2] {
    [a[0] * s, a[1] * s]
}

#[inline]
fn norm(a: [f64; 2]) -> f64 {
    (a[0] * a[0] + a[1] * a[1]).sqrt()
}

pub(super) struct Tracer<'g, 'a> {
    grid: &'g PointGrid<'a>,
    along_tol: f64,
    tan_half: f64,
    max_jump: usize,
}

impl<'g, 'a> Tracer<'g, 'a> {
    pub fn new(grid: &'g PointGrid<'a>, params: &SortParams) -> Self {
        Self {
            grid,
            along_tol: params.along_tol,
            tan_half: params.half_angle_deg.to_radians().tan(),
            max_jump: params.max_jump,
        }
    }

    /// Resolve the lattice neighbour of `from` in direction `delta`.
    ///
    /// Candidates must project onto the step axis within
    /// `[(1 − tol)·|delta|, (1 + tol)·|delta|]` and stay within the half-angle
    /// cone around it.
    pub fn step(&self, from: [f64; 2], delta: [f64; 2]) -> Step {
        let predicted = add(from, delta);
        let len = norm(delta);
        if len <= f64::EPSILON {
            return Step {
                position: predicted,
                policy: StepPolicy::Extrapolated,
            };
        }
        let dir = scale(delta, 1.0 / len);
        let lo = (1.0 - self.along_tol) * len;
        let hi = (1.0 + self.along_tol) * len;
        let reach = hi * (1.0 + self.tan_half * self.tan_half).sqrt();
        let points = self.grid.points();

        let mut sum = [0.0, 0.0];
        let mut n = 0usize;
        self.grid.for_each_within(from, reach, |i, _| {
            let d = sub(points[i], from);
            let along = d[0] * dir[0] + d[1] * dir[1];
            if along < lo || along > hi {
                return;
            }
            let lateral = (d[0] * dir[1] - d[1] * dir[0]).abs();
            if lateral <= along * self.tan_half {
                sum = add(sum, points[i]);
                n += 1;
            }
        });
        match n {
            0 => Step {
                position: predicted,
                policy: StepPolicy::Extrapolated,
            },
            1 => Step {
                position: sum,
                policy: StepPolicy::Single,
            },
            _ => Step {
                position: scale(sum, 1.0 / n as f64),
                policy: StepPolicy::Averaged,
            },
        }
    }

    /// Number of lattice positions on the chain starting at `start`.
    ///
    /// Steps follow `first`; with `alternate` the lateral component flips
    /// sign on every step (hexagonal columns). Up to `max_jump` consecutive
    /// missing positions are bridged.
    pub fn chain_length(&self, start: [f64; 2], first: [f64; 2], alternate: bool) -> usize {
        let points = self.grid.points();
        let radius = self.along_tol * norm(first);
        let step_at = |k: usize| {
            if alternate && k % 2 == 1 {
                [first[0], -first[1]]
            } else {
                first
            }
        };
        let mut count = 1;
        let mut taken = 0;
        let mut cur = start;
        'walk: while count <= points.len() + self.max_jump {
            let mut disp = [0.0, 0.0];
            for j in 1..=self.max_jump {
                disp = add(disp, step_at(taken + j - 1));
                if let Some((i, _)) = self.grid.nearest(add(cur, disp), radius, None) {
                    cur = points[i];
                    count += j;
                    taken += j;
                    continue 'walk;
                }
            }
            break;
        }
        count
    }

    /// Sign of the lateral offset of the nearest diagonal neighbour in the
    /// adjacent row (below when `downward`).
    pub fn diagonal_sign(&self, from: [f64; 2], pitch: [f64; 2], downward: bool) -> Option<f64> {
        let points = self.grid.points();
        let sy = if downward { 1.0 } else { -1.0 };
        let (pv, ph) = (pitch[0], pitch[1]);
        let mut best: Option<(f64, f64)> = None;
        self.grid.for_each_within(from, 1.5 * ph.max(pv), |i, d2| {
            let d = sub(points[i], from);
            let dy = d[0] * sy;
            let ax = d[1].abs();
            if dy < 0.5 * pv || dy > 1.5 * pv || ax > 0.75 * ph || ax < 0.1 * ph {
                return;
            }
            if best.map_or(true, |(b, _)| d2 < b) {
                best = Some((d2, d[1].signum()));
            }
        });
        best.map(|(_, s)| s)
    }
}
