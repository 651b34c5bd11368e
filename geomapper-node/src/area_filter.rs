use std::collections::HashMap;

use crate::error::CalibrationLoadError;

/// Simple polygon in planar (lon, lat) coordinates. Exterior ring only.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingArea {
    ring: Vec<(f64, f64)>,
}

impl MappingArea {
    /// Compiles an ordered list of `[lon, lat]` vertices.
    ///
    /// The ring may be given open or closed. Rings with fewer than three distinct vertices,
    /// non-finite coordinates, crossing or folded edges, or no enclosed area are rejected.
    pub fn new(stream_id: &str, vertices: &[[f64; 2]]) -> Result<Self, CalibrationLoadError> {
        let invalid = |reason: String| CalibrationLoadError::InvalidMappingArea {
            stream_id: stream_id.to_string(),
            reason,
        };

        let mut ring: Vec<(f64, f64)> = vertices.iter().map(|v| (v[0], v[1])).collect();
        if ring.iter().any(|(lon, lat)| !lon.is_finite() || !lat.is_finite()) {
            return Err(invalid("non-finite vertex".to_string()));
        }
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        ring.dedup();
        if ring.len() < 3 {
            return Err(invalid(format!("{} distinct vertices, need at least 3", ring.len())));
        }
        if let Some(k) = first_fold(&ring) {
            return Err(invalid(format!("edges meeting at vertex {} fold back onto each other", k)));
        }
        if let Some((i, j)) = first_crossing(&ring) {
            return Err(invalid(format!("edges {} and {} intersect", i, j)));
        }
        if is_degenerate(&ring) {
            return Err(invalid("ring encloses no area".to_string()));
        }

        Ok(Self { ring })
    }

    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.ring
    }

    /// Even-odd ray casting towards +lon.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let mut inside = false;
        let n = self.ring.len();
        let mut j = n - 1;
        for i in 0..n {
            let (xi, yi) = self.ring[i];
            let (xj, yj) = self.ring[j];
            if (yi > lat) != (yj > lat) {
                let x_cross = xi + (lat - yi) * (xj - xi) / (yj - yi);
                if lon < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Returns the indices of the first pair of non-adjacent edges that touch.
fn first_crossing(ring: &[(f64, f64)]) -> Option<(usize, usize)> {
    let n = ring.len();
    let edge = |k: usize| (ring[k], ring[(k + 1) % n]);
    for i in 0..n {
        for j in (i + 1)..n {
            // neighbours share a vertex by construction
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            let (a, b) = edge(i);
            let (c, d) = edge(j);
            if segments_intersect(a, b, c, d) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Returns the first vertex whose two edges overlap, i.e. the ring turns back by 180 degrees.
fn first_fold(ring: &[(f64, f64)]) -> Option<usize> {
    let n = ring.len();
    (0..n).find(|&k| {
        let prev = ring[(k + n - 1) % n];
        let here = ring[k];
        let next = ring[(k + 1) % n];
        let dot = (prev.0 - here.0) * (next.0 - here.0) + (prev.1 - here.1) * (next.1 - here.1);
        orientation(prev, here, next) == 0.0 && dot > 0.0
    })
}

/// Shoelace area compared against the bounding box, so tiny real areas in degrees still pass.
fn is_degenerate(ring: &[(f64, f64)]) -> bool {
    let n = ring.len();
    let twice_area: f64 = (0..n)
        .map(|k| {
            let (x0, y0) = ring[k];
            let (x1, y1) = ring[(k + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();

    let (min_x, max_x, min_y, max_y) = ring.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
        |(min_x, max_x, min_y, max_y), &(x, y)| (min_x.min(x), max_x.max(x), min_y.min(y), max_y.max(y)),
    );
    let extent = (max_x - min_x).max(max_y - min_y);

    twice_area.abs() <= 1e-9 * extent * extent
}

fn orientation(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
    (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
}

fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
    r.0 >= p.0.min(q.0) && r.0 <= p.0.max(q.0) && r.1 >= p.1.min(q.1) && r.1 <= p.1.max(q.1)
}

fn segments_intersect(a: (f64, f64), b: (f64, f64), c: (f64, f64), d: (f64, f64)) -> bool {
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);

    if ((o1 > 0.0 && o2 < 0.0) || (o1 < 0.0 && o2 > 0.0))
        && ((o3 > 0.0 && o4 < 0.0) || (o3 < 0.0 && o4 > 0.0))
    {
        return true;
    }

    (o1 == 0.0 && on_segment(a, b, c))
        || (o2 == 0.0 && on_segment(a, b, d))
        || (o3 == 0.0 && on_segment(c, d, a))
        || (o4 == 0.0 && on_segment(c, d, b))
}

/// Compiled mapping areas by camera id. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct AreaFilter {
    areas: HashMap<String, MappingArea>,
}

impl AreaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stream_id: impl Into<String>, area: MappingArea) {
        self.areas.insert(stream_id.into(), area);
    }

    /// Cameras without an area accept every point.
    pub fn contains(&self, stream_id: &str, lat: f64, lon: f64) -> bool {
        match self.areas.get(stream_id) {
            Some(area) => area.contains(lon, lat),
            None => true,
        }
    }
}
