//! Zone geometry — containment tests for rectangular and polygonal AOIs.
//!
//! Stateless. The tracker and the counting layer both test centroids
//! against a `Zone`; zone resolution (rect vs polygon precedence) also
//! lives here so config and callers agree on it.

use serde::{Deserialize, Serialize};

/// Pixel coordinate.
pub type Point = (i32, i32);

/// Axis-aligned bounding box, `x1 < x2`, `y1 < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Centroid with integer division, matching the tracker's matching math.
    pub fn centroid(&self) -> Point {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }
}

/// Active area of interest. At most one zone is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Zone {
    Rect(Rect),
    Polygon(Vec<Point>),
}

impl Zone {
    pub fn contains(&self, pt: Point) -> bool {
        match self {
            Zone::Rect(r) => point_in_rect(pt, r),
            Zone::Polygon(poly) => point_in_polygon(pt, poly),
        }
    }
}

/// Inclusive-boundary axis-aligned containment.
pub fn point_in_rect(pt: Point, rect: &Rect) -> bool {
    let (x, y) = pt;
    rect.x1 <= x && x <= rect.x2 && rect.y1 <= y && y <= rect.y2
}

/// Even-odd (ray casting) polygon containment.
///
/// A horizontal ray from `pt` toward +x toggles membership on each edge
/// crossing. Exactly-horizontal edges substitute a 1e-6 denominator
/// instead of dividing by zero; this intentionally reproduces the
/// long-standing behavior of the counting deployments rather than
/// special-casing points on such edges.
pub fn point_in_polygon(pt: Point, poly: &[Point]) -> bool {
    if poly.len() < 3 {
        return false;
    }
    let (x, y) = (pt.0 as f64, pt.1 as f64);
    let mut inside = false;
    let n = poly.len();
    for i in 0..n {
        let (x1, y1) = (poly[i].0 as f64, poly[i].1 as f64);
        let (x2, y2) = (poly[(i + 1) % n].0 as f64, poly[(i + 1) % n].1 as f64);
        let dy = if (y2 - y1) != 0.0 { y2 - y1 } else { 1e-6 };
        if ((y1 > y) != (y2 > y)) && x < (x2 - x1) * (y - y1) / dy + x1 {
            inside = !inside;
        }
    }
    inside
}

/// Pick the active zone from configured shapes. A polygon with at least
/// 3 vertices wins over the rectangle; a degenerate polygon falls back
/// to the rectangle; neither configured means no zone.
pub fn resolve_zone(rect: Option<Rect>, polygon: &[Point]) -> Option<Zone> {
    if polygon.len() >= 3 {
        return Some(Zone::Polygon(polygon.to_vec()));
    }
    rect.map(Zone::Rect)
}
