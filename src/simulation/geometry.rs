//! Geometry calculations for ray propagation and reflection.
//!
//! Contains helper functions for:
//! - Ray-segment intersection against a piecewise-linear surface
//! - Segment normals facing an incoming ray, specular reflection and 2D rotation
//! - Point-in-rectangle tests
//! - Distance calculations (squared distance to avoid sqrt in hot paths)

use crate::common::config::ConfigError;
use crate::common::types::{Point, Vector};

/// Denominators below this magnitude mean the ray runs (nearly) parallel to
/// the segment; such segments are skipped rather than treated as hits.
pub const PARALLEL_EPSILON: f64 = 1e-6;

/// Squared Euclidean distance in world units (avoids a sqrt in hot paths).
///
/// Detection compares `distance2(ray, sensor)` against `tolerance²` every frame
/// for every returning ray, so the square root is never needed.
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// One straight piece of the surface, from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn vector(&self) -> Vector {
        self.end - self.start
    }

    /// Unit normal of the segment oriented against `incoming`
    /// (`normal · incoming <= 0`). `None` for a zero-length segment.
    pub fn normal_facing(&self, incoming: &Vector) -> Option<Vector> {
        let seg = self.vector();
        let normal = Vector::new(seg.dy, -seg.dx).normalize()?;
        if incoming.dot(&normal) > 0.0 { Some(-normal) } else { Some(normal) }
    }
}

/// Nearest hit of a ray on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Ray parameter: distance along a unit direction.
    pub t: f64,
    pub point: Point,
    pub segment: Segment,
}

/// Piecewise-linear boundary (open polyline). Immutable once built.
#[derive(Debug, Clone)]
pub struct Surface {
    segments: Vec<Segment>,
}

impl Surface {
    /// Build a surface from ordered vertices; consecutive pairs become segments.
    pub fn new(points: Vec<Point>) -> Result<Self, ConfigError> {
        if points.len() < 2 {
            return Err(ConfigError::ValidationError(format!(
                "Surface needs at least 2 points, got {}",
                points.len()
            )));
        }
        let segments = points.windows(2).map(|w| Segment { start: w[0], end: w[1] }).collect();
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Intersect the ray `origin + t * direction, t >= 0` with every segment
    /// and return the hit with the smallest `t`, or `None` when nothing is hit.
    ///
    /// On equal `t` (a ray through a shared vertex) the earlier segment wins.
    pub fn ray_intersection(&self, origin: &Point, direction: &Vector) -> Option<Intersection> {
        let mut nearest: Option<Intersection> = None;
        for segment in &self.segments {
            if let Some((t, point)) = intersect_ray_segment(origin, direction, segment) {
                if nearest.as_ref().is_none_or(|n| t < n.t) {
                    nearest = Some(Intersection { t, point, segment: *segment });
                }
            }
        }
        nearest
    }
}

/// Parametric ray/segment intersection.
///
/// Solves `origin + t * direction = start + u * (end - start)` with the
/// cross-product form; a hit requires `t >= 0` and `u` in `[0, 1]`.
fn intersect_ray_segment(origin: &Point, direction: &Vector, segment: &Segment) -> Option<(f64, Point)> {
    let seg = segment.vector();
    let denom = direction.cross(&seg);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let diff = segment.start - *origin;
    let t = diff.cross(&seg) / denom;
    let u = diff.cross(direction) / denom;
    if t >= 0.0 && (0.0..=1.0).contains(&u) {
        Some((t, *origin + *direction * t))
    } else {
        None
    }
}

/// Ideal specular reflection `R = D - 2 (D·N) N`.
pub fn reflect(direction: &Vector, normal: &Vector) -> Vector {
    *direction - 2.0 * direction.dot(normal) * *normal
}

/// Rotate a vector counter-clockwise by `angle_deg`.
pub fn rotate(v: &Vector, angle_deg: f64) -> Vector {
    let (sin_d, cos_d) = angle_deg.to_radians().sin_cos();
    Vector::new(cos_d * v.dx - sin_d * v.dy, sin_d * v.dx + cos_d * v.dy)
}

/// Axis-aligned rectangle given by its centre and full extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectPos {
    pub center: Point,
    pub width: f64,
    pub height: f64,
}

/// Inclusive point-in-rectangle test.
pub fn point_in_rect(p: &Point, rect: &RectPos) -> bool {
    let half_w = rect.width / 2.0;
    let half_h = rect.height / 2.0;
    p.x >= rect.center.x - half_w && p.x <= rect.center.x + half_w && p.y >= rect.center.y - half_h && p.y <= rect.center.y + half_h
}
