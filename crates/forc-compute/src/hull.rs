//! Convex hull of the measured (ha, hb) region.
//!
//! Every reversal curve is a horizontal segment from its first to its last
//! applied field, so the hull of all samples is the hull of the curve
//! endpoints. Built with the monotone chain; vertices are counter-clockwise.

use forc_core::MeasurementSet;

/// Convex polygon (possibly degenerate: a segment or a single point).
#[derive(Debug, Clone, PartialEq)]
pub struct DataHull {
    vertices: Vec<(f64, f64)>,
    tolerance: f64,
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// One side of the monotone chain: keeps only strict left turns.
fn half_chain<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> Vec<(f64, f64)> {
    let mut out: Vec<(f64, f64)> = Vec::new();
    for &p in points {
        while let [.., a, b] = out.as_slice() {
            if cross(*a, *b, p) > 0.0 {
                break;
            }
            out.pop();
        }
        out.push(p);
    }
    out
}

/// Squared distance from `p` to the segment `a`-`b`.
fn segment_distance_sq(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq > 0.0 {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (ex, ey) = (p.0 - (a.0 + t * dx), p.1 - (a.1 + t * dy));
    ex * ex + ey * ey
}

impl DataHull {
    /// Hull of the endpoints of every curve in `data`.
    pub fn of(data: &MeasurementSet) -> Self {
        let mut points: Vec<(f64, f64)> = data
            .curves()
            .iter()
            .flat_map(|c| [(c.ha()[0], c.hb()), (c.ha()[c.len() - 1], c.hb())])
            .collect();
        Self::from_points(&mut points)
    }

    /// Hull of an arbitrary point cloud (`(ha, hb)` pairs). Reorders `points`.
    pub fn from_points(points: &mut [(f64, f64)]) -> Self {
        points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
        let scale = points.iter().fold(1.0_f64, |m, p| m.max(p.0.abs()).max(p.1.abs()));
        let tolerance = 1e-9 * scale;

        let mut lower = half_chain(points.iter());
        let upper = half_chain(points.iter().rev());
        lower.pop();
        lower.extend(&upper[..upper.len().saturating_sub(1)]);

        let mut vertices = lower;
        vertices.dedup();
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.is_empty()
            && let Some(&p) = points.first()
        {
            vertices.push(p);
        }
        Self { vertices, tolerance }
    }

    /// Hull vertices, counter-clockwise starting from the smallest `(ha, hb)`.
    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.vertices
    }

    /// `true` if `(ha, hb)` lies inside the hull or on its boundary.
    pub fn contains(&self, ha: f64, hb: f64) -> bool {
        let p = (ha, hb);
        let tol = self.tolerance;
        match self.vertices.as_slice() {
            [] => false,
            [a] => segment_distance_sq(p, *a, *a) <= tol * tol,
            [a, b] => segment_distance_sq(p, *a, *b) <= tol * tol,
            vs => {
                let n = vs.len();
                (0..n).all(|k| {
                    let (a, b) = (vs[k], vs[(k + 1) % n]);
                    let len = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
                    cross(a, b, p) >= -tol * len
                })
            }
        }
    }
}
