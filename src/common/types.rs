//! Shared 2D primitives used by both the simulation and the analyzer.
//!
//! Contains:
//! - `Point` positions in world units
//! - `Vector` displacements/directions with the usual dot/cross helpers
//! - `Region` classification of a sensor by the sign of its x coordinate

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Simple 2D point in world units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_array(self) -> [f64; 2] {
        [self.x, self.y]
    }

    /// True when both coordinates are exactly zero (the designated origin).
    pub fn is_origin(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Point { x: p[0], y: p[1] }
    }
}

/// 2D displacement or direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector {
    pub dx: f64,
    pub dy: f64,
}

impl Vector {
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Unit vector pointing at `angle_deg`, measured counter-clockwise from +x.
    pub fn from_angle_deg(angle_deg: f64) -> Self {
        let rad = angle_deg.to_radians();
        Vector::new(rad.cos(), rad.sin())
    }

    pub fn dot(&self, other: &Vector) -> f64 {
        self.dx * other.dx + self.dy * other.dy
    }

    /// Z component of the 3D cross product of two planar vectors.
    pub fn cross(&self, other: &Vector) -> f64 {
        self.dx * other.dy - self.dy * other.dx
    }

    pub fn length(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    /// Unit vector with the same direction, or `None` for a zero-length vector.
    pub fn normalize(&self) -> Option<Vector> {
        let len = self.length();
        if len == 0.0 || !len.is_finite() {
            return None;
        }
        Some(Vector::new(self.dx / len, self.dy / len))
    }
}

impl Sub for Point {
    type Output = Vector;

    fn sub(self, rhs: Point) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Add<Vector> for Point {
    type Output = Point;

    fn add(self, rhs: Vector) -> Point {
        Point::new(self.x + rhs.dx, self.y + rhs.dy)
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.dx + rhs.dx, self.dy + rhs.dy)
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.dx - rhs.dx, self.dy - rhs.dy)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, rhs: f64) -> Vector {
        Vector::new(self.dx * rhs, self.dy * rhs)
    }
}

impl Mul<Vector> for f64 {
    type Output = Vector;

    fn mul(self, rhs: Vector) -> Vector {
        rhs * self
    }
}

impl Neg for Vector {
    type Output = Vector;

    fn neg(self) -> Vector {
        Vector::new(-self.dx, -self.dy)
    }
}

/// Horizontal region of a sensor, decided by the sign of its x coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Left,
    Center,
    Right,
}

impl Region {
    pub fn from_x(x: f64) -> Self {
        if x < 0.0 {
            Region::Left
        } else if x > 0.0 {
            Region::Right
        } else {
            Region::Center
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Left => write!(f, "left"),
            Region::Center => write!(f, "center"),
            Region::Right => write!(f, "right"),
        }
    }
}

/// Round to a fixed number of decimal places (half away from zero).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
