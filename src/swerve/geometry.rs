// Planar geometry shared by kinematics, module control and odometry.
//
// Angles are radians, counter-clockwise positive, X forward and Y left.

use std::f64::consts::PI;
use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

const TAU: f64 = 2.0 * PI;

/// A heading wrapped to `[-PI, PI)`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Rotation2d(f64);

impl Rotation2d {
    pub const ZERO: Self = Self(0.0);

    pub fn from_radians(radians: f64) -> Self {
        Self(normalize_angle(radians))
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self::from_radians(degrees.to_radians())
    }

    /// Direction of the vector `(x, y)`.
    pub fn from_xy(x: f64, y: f64) -> Self {
        Self::from_radians(y.atan2(x))
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }

    pub fn cos(self) -> f64 {
        self.0.cos()
    }

    pub fn sin(self) -> f64 {
        self.0.sin()
    }

    /// The same heading turned half a revolution.
    pub fn flipped(self) -> Self {
        Self::from_radians(self.0 + PI)
    }
}

/// Wrap an angle in radians to `[-PI, PI)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    // rem_euclid can round up to exactly TAU
    if wrapped >= PI { wrapped - TAU } else { wrapped }
}

impl Add for Rotation2d {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_radians(self.0 + rhs.0)
    }
}

/// Shortest signed difference `self - rhs`.
impl Sub for Rotation2d {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::from_radians(self.0 - rhs.0)
    }
}

impl Neg for Rotation2d {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_radians(-self.0)
    }
}

impl From<f64> for Rotation2d {
    fn from(radians: f64) -> Self {
        Self::from_radians(radians)
    }
}

impl From<Rotation2d> for f64 {
    fn from(rotation: Rotation2d) -> Self {
        rotation.0
    }
}

impl fmt::Display for Rotation2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°", self.degrees())
    }
}

/// A 2-D offset in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn angle(&self) -> Rotation2d {
        Rotation2d::from_xy(self.x, self.y)
    }

    pub fn rotate_by(&self, rotation: Rotation2d) -> Self {
        let (sin, cos) = (rotation.sin(), rotation.cos());
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }
}

/// Linear (m/s) and angular (rad/s) velocity of the chassis.
///
/// Which frame the linear part is expressed in is decided by the producer;
/// everything downstream of the control law works in the chassis frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl ChassisVelocity {
    pub const fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Convert a field-frame demand into the chassis frame given the robot heading.
    pub fn from_field_relative(field: ChassisVelocity, heading: Rotation2d) -> Self {
        let linear = Translation2d::new(field.vx, field.vy).rotate_by(-heading);
        Self::new(linear.x, linear.y, field.omega)
    }

    pub fn is_zero(&self) -> bool {
        self.vx == 0.0 && self.vy == 0.0 && self.omega == 0.0
    }
}

impl fmt::Display for ChassisVelocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(vx: {:.2} m/s, vy: {:.2} m/s, ω: {:.2} rad/s)",
            self.vx, self.vy, self.omega
        )
    }
}

/// Wheel speed (m/s, signed) and steering angle of one module.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    pub speed: f64,
    pub angle: Rotation2d,
}

impl ModuleState {
    pub const fn new(speed: f64, angle: Rotation2d) -> Self {
        Self { speed, angle }
    }
}

/// Accumulated wheel travel (m) and steering angle of one module.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    pub distance: f64,
    pub angle: Rotation2d,
}

impl ModulePosition {
    pub const fn new(distance: f64, angle: Rotation2d) -> Self {
        Self { distance, angle }
    }
}

/// Incremental displacement in the chassis frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

/// Field-frame position (m) and heading.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub heading: Rotation2d,
}

impl Pose2d {
    pub const fn new(x: f64, y: f64, heading: Rotation2d) -> Self {
        Self { x, y, heading }
    }

    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.x, self.y)
    }

    /// Apply a chassis-frame twist along a constant-curvature arc.
    pub fn exp(&self, twist: Twist2d) -> Self {
        let dtheta = twist.dtheta;
        let (s, c) = if dtheta.abs() < 1e-9 {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };

        let local = Translation2d::new(twist.dx * s - twist.dy * c, twist.dx * c + twist.dy * s);
        let delta = local.rotate_by(self.heading);

        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
            heading: Rotation2d::from_radians(self.heading.radians() + dtheta),
        }
    }
}

impl fmt::Display for Pose2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(x: {:.2}, y: {:.2}, θ: {})", self.x, self.y, self.heading)
    }
}
