//! Planar geometry for court regions and detection boxes.
//!
//! Polygons are closed loops: the edge from the last point back to the first
//! is implicit and never stored as an extra element.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in corner form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build from center form.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Area, or zero for an inverted rectangle.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        !(self.left < self.right && self.top < self.bottom)
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }

    /// Clamp every edge into `[0, max_x] x [0, max_y]`.
    pub fn clamp_to(&self, max_x: f32, max_y: f32) -> Self {
        Self::new(
            self.left.max(0.0),
            self.top.max(0.0),
            self.right.min(max_x),
            self.bottom.min(max_y),
        )
    }

    /// Half-open containment: left/top edges are inside, right/bottom are not.
    pub fn contains(&self, p: Point) -> bool {
        self.left < self.right
            && self.top < self.bottom
            && p.x >= self.left
            && p.x < self.right
            && p.y >= self.top
            && p.y < self.bottom
    }

    /// Corners in clockwise order starting at top-left.
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.right, self.bottom),
            Point::new(self.left, self.bottom),
        ]
    }

    /// Area of the overlap with `other`, zero when disjoint.
    pub fn intersection_area(&self, other: &Rect) -> f32 {
        let x0 = self.left.max(other.left);
        let y0 = self.top.max(other.top);
        let x1 = self.right.min(other.right);
        let y1 = self.bottom.min(other.bottom);
        (x1 - x0).max(0.0) * (y1 - y0).max(0.0)
    }

    /// Intersection over union.
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection_area(other);
        if intersection <= 0.0 {
            return 0.0;
        }
        intersection / (self.area() + other.area() - intersection)
    }
}

/// Closed polygon. Edge `i` runs from `points[i]` to `points[(i + 1) % n]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Fewer than three vertices enclose no area.
    pub fn is_usable(&self) -> bool {
        self.points.len() >= 3
    }

    /// Edges including the implicit closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Scale normalized `[0,1]` coordinates to a `width x height` frame.
    pub fn to_absolute(&self, width: f32, height: f32) -> Polygon {
        Polygon::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x * width, p.y * height))
                .collect(),
        )
    }

    /// Inverse of [`Polygon::to_absolute`]. Zero dimensions yield an empty polygon.
    pub fn to_normalized(&self, width: f32, height: f32) -> Polygon {
        if width <= 0.0 || height <= 0.0 {
            return Polygon::default();
        }
        Polygon::new(
            self.points
                .iter()
                .map(|p| Point::new(p.x / width, p.y / height))
                .collect(),
        )
    }

    /// Even-odd (ray casting) containment test.
    pub fn contains(&self, test: Point) -> bool {
        if !self.is_usable() {
            return false;
        }
        let mut crossings = 0usize;
        for (p1, p2) in self.edges() {
            let spans = (p1.y <= test.y && test.y < p2.y) || (p2.y <= test.y && test.y < p1.y);
            if spans && test.x < (p2.x - p1.x) * (test.y - p1.y) / (p2.y - p1.y) + p1.x {
                crossings += 1;
            }
        }
        crossings % 2 == 1
    }

    /// True when two non-adjacent edges cross.
    ///
    /// Edges that only share an endpoint do not count, so a triangle never
    /// self-intersects.
    pub fn is_self_intersecting(&self) -> bool {
        let n = self.points.len();
        if n < 4 {
            return false;
        }
        for i in 0..n {
            let p1 = self.points[i];
            let p2 = self.points[(i + 1) % n];
            for j in (i + 2)..n {
                if (j + 1) % n == i {
                    continue;
                }
                let p3 = self.points[j];
                let p4 = self.points[(j + 1) % n];
                if p1 == p3 || p1 == p4 || p2 == p3 || p2 == p4 {
                    continue;
                }
                if segments_intersect(p1, p2, p3, p4) {
                    return true;
                }
            }
        }
        false
    }
}

impl From<Vec<Point>> for Polygon {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Orientation {
    Collinear,
    Clockwise,
    CounterClockwise,
}

fn orientation(a: Point, b: Point, c: Point) -> Orientation {
    let value = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if value == 0.0 {
        Orientation::Collinear
    } else if value > 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::CounterClockwise
    }
}

fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// Closed-segment intersection, including touching and collinear overlap.
pub fn segments_intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    let o1 = orientation(p1, p2, p3);
    let o2 = orientation(p1, p2, p4);
    let o3 = orientation(p3, p4, p1);
    let o4 = orientation(p3, p4, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == Orientation::Collinear && on_segment(p1, p3, p2))
        || (o2 == Orientation::Collinear && on_segment(p1, p4, p2))
        || (o3 == Orientation::Collinear && on_segment(p3, p1, p4))
        || (o4 == Orientation::Collinear && on_segment(p3, p2, p4))
}

/// Strict crossing: each segment has its endpoints on opposite sides of the other.
///
/// Touching at an endpoint or running along the same line is not a crossing,
/// so a crossing always implies a positive-area overlap nearby.
pub fn segments_cross(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    let o1 = orientation(p1, p2, p3);
    let o2 = orientation(p1, p2, p4);
    let o3 = orientation(p3, p4, p1);
    let o4 = orientation(p3, p4, p2);

    o1 != Orientation::Collinear
        && o2 != Orientation::Collinear
        && o3 != Orientation::Collinear
        && o4 != Orientation::Collinear
        && o1 != o2
        && o3 != o4
}

/// Overlap test between a box and a polygon in the same coordinate frame.
///
/// True when any box corner is inside the polygon, any polygon vertex is
/// inside the box, or the two boundaries cross. The boundary check covers
/// partial overlaps where no vertex of either shape lies inside the other.
pub fn rect_overlaps_polygon(rect: &Rect, polygon: &Polygon) -> bool {
    if !polygon.is_usable() || rect.is_empty() {
        return false;
    }

    let corners = rect.corners();
    if corners.iter().any(|c| polygon.contains(*c)) {
        return true;
    }
    if polygon.points().iter().any(|v| rect.contains(*v)) {
        return true;
    }

    // Region fallback: boundary paths intersect.
    (0..4).any(|i| {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        polygon.edges().any(|(p, q)| segments_cross(a, b, p, q))
    })
}
