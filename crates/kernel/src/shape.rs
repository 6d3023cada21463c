//! Shape factory: turns a shape kind plus caller dimensions into collision geometry.
//!
//! Callers always pass *full* extents and diameters; the factory halves them
//! into the half-extent / radius form the contact code works with.

use std::fmt;
use std::str::FromStr;

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Angular segment count used to sample a cylinder's rims for contacts.
pub const CYLINDER_SEGMENTS: usize = 16;

/// Errors raised while building collision geometry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("unsupported shape kind {0:?}")]
    Unsupported(String),
    #[error("{kind} needs {expected} dimension(s), got {got}")]
    MissingDimensions {
        kind: ShapeKind,
        expected: usize,
        got: usize,
    },
    #[error("{kind} dimension {index} must be positive, got {value}")]
    NonPositiveDimension {
        kind: ShapeKind,
        index: usize,
        value: f32,
    },
}

/// The shape taxonomy accepted at the descriptor boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ShapeKind {
    Box,
    Sphere,
    Cylinder,
    Plane,
}

impl ShapeKind {
    /// Number of leading dimensions this kind reads.
    pub fn required_dimensions(self) -> usize {
        match self {
            Self::Box => 3,
            Self::Sphere => 1,
            Self::Cylinder => 2,
            Self::Plane => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Box => "box",
            Self::Sphere => "sphere",
            Self::Cylinder => "cylinder",
            Self::Plane => "plane",
        }
    }
}

impl FromStr for ShapeKind {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "box" => Ok(Self::Box),
            "sphere" => Ok(Self::Sphere),
            "cylinder" => Ok(Self::Cylinder),
            "plane" => Ok(Self::Plane),
            _ => Err(ShapeError::Unsupported(s.to_owned())),
        }
    }
}

impl TryFrom<String> for ShapeKind {
    type Error = ShapeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete collision geometry in the body's local frame.
///
/// Cylinders are aligned with local Y. Planes are the half-space below the
/// local XY plane, with local +Z as the outward normal.
#[derive(Debug, Clone, PartialEq)]
pub enum CollisionShape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    Cylinder {
        radius: f32,
        half_height: f32,
        segments: usize,
    },
    Plane,
}

/// Build collision geometry from a kind and its full-size dimensions.
///
/// Extra trailing dimensions are ignored. Fails before anything else happens
/// so a bad descriptor never reaches the world.
pub fn make_shape(kind: ShapeKind, dimensions: &[f32]) -> Result<CollisionShape, ShapeError> {
    let expected = kind.required_dimensions();
    if dimensions.len() < expected {
        return Err(ShapeError::MissingDimensions {
            kind,
            expected,
            got: dimensions.len(),
        });
    }
    for (index, &value) in dimensions.iter().take(expected).enumerate() {
        // NaN fails this comparison too.
        if !(value > 0.0 && value.is_finite()) {
            return Err(ShapeError::NonPositiveDimension { kind, index, value });
        }
    }

    Ok(match kind {
        ShapeKind::Box => CollisionShape::Box {
            half_extents: Vec3::new(dimensions[0], dimensions[1], dimensions[2]) * 0.5,
        },
        ShapeKind::Sphere => CollisionShape::Sphere {
            radius: dimensions[0] * 0.5,
        },
        ShapeKind::Cylinder => CollisionShape::Cylinder {
            radius: dimensions[0] * 0.5,
            half_height: dimensions[1] * 0.5,
            segments: CYLINDER_SEGMENTS,
        },
        ShapeKind::Plane => CollisionShape::Plane,
    })
}

impl CollisionShape {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Self::Box { .. } => ShapeKind::Box,
            Self::Sphere { .. } => ShapeKind::Sphere,
            Self::Cylinder { .. } => ShapeKind::Cylinder,
            Self::Plane => ShapeKind::Plane,
        }
    }

    /// Principal moments of inertia for a body of the given mass.
    pub fn principal_inertia(&self, mass: f32) -> Vec3 {
        match *self {
            Self::Box { half_extents: h } => {
                let sq = h * h;
                Vec3::new(sq.y + sq.z, sq.x + sq.z, sq.x + sq.y) * (mass / 3.0)
            }
            Self::Sphere { radius } => Vec3::splat(0.4 * mass * radius * radius),
            Self::Cylinder {
                radius,
                half_height,
                ..
            } => {
                let h = 2.0 * half_height;
                let side = mass * (3.0 * radius * radius + h * h) / 12.0;
                Vec3::new(side, 0.5 * mass * radius * radius, side)
            }
            Self::Plane => Vec3::ZERO,
        }
    }

    /// Radius of a sphere around the local origin enclosing the shape.
    pub fn bounding_radius(&self) -> f32 {
        match *self {
            Self::Box { half_extents } => half_extents.length(),
            Self::Sphere { radius } => radius,
            Self::Cylinder {
                radius,
                half_height,
                ..
            } => Vec2::new(radius, half_height).length(),
            Self::Plane => f32::INFINITY,
        }
    }

    /// Local points tested against other shapes: box corners and cylinder rim samples.
    pub fn feature_points(&self) -> Vec<Vec3> {
        match *self {
            Self::Box { half_extents: h } => {
                let mut corners = Vec::with_capacity(8);
                for sx in [-1.0, 1.0] {
                    for sy in [-1.0, 1.0] {
                        for sz in [-1.0, 1.0] {
                            corners.push(Vec3::new(sx * h.x, sy * h.y, sz * h.z));
                        }
                    }
                }
                corners
            }
            Self::Cylinder {
                radius,
                half_height,
                segments,
            } => {
                let mut rim = Vec::with_capacity(segments * 2);
                for i in 0..segments {
                    let angle = std::f32::consts::TAU * i as f32 / segments as f32;
                    let (sin, cos) = angle.sin_cos();
                    for y in [-half_height, half_height] {
                        rim.push(Vec3::new(cos * radius, y, sin * radius));
                    }
                }
                rim
            }
            Self::Sphere { .. } | Self::Plane => Vec::new(),
        }
    }

    /// If `p` (local frame) is inside a box or cylinder, the penetration depth
    /// and outward normal of the nearest surface.
    pub fn penetration(&self, p: Vec3) -> Option<(f32, Vec3)> {
        match *self {
            Self::Box { half_extents: h } => {
                let depth = h - p.abs();
                if depth.min_element() <= 0.0 {
                    return None;
                }
                let normal = if depth.x <= depth.y && depth.x <= depth.z {
                    Vec3::X * p.x.signum()
                } else if depth.y <= depth.z {
                    Vec3::Y * p.y.signum()
                } else {
                    Vec3::Z * p.z.signum()
                };
                Some((depth.min_element(), normal))
            }
            Self::Cylinder {
                radius,
                half_height,
                ..
            } => {
                let radial = Vec2::new(p.x, p.z);
                let side_depth = radius - radial.length();
                let cap_depth = half_height - p.y.abs();
                if side_depth <= 0.0 || cap_depth <= 0.0 {
                    return None;
                }
                if cap_depth < side_depth {
                    Some((cap_depth, Vec3::Y * p.y.signum()))
                } else {
                    let dir = radial.try_normalize().unwrap_or(Vec2::X);
                    Some((side_depth, Vec3::new(dir.x, 0.0, dir.y)))
                }
            }
            Self::Sphere { radius } => {
                let len = p.length();
                (len < radius).then(|| (radius - len, p.try_normalize().unwrap_or(Vec3::Y)))
            }
            Self::Plane => (p.z < 0.0).then_some((-p.z, Vec3::Z)),
        }
    }

    /// Closest point on or in the shape to `p`, in the local frame.
    pub fn closest_point(&self, p: Vec3) -> Vec3 {
        match *self {
            Self::Box { half_extents } => p.clamp(-half_extents, half_extents),
            Self::Cylinder {
                radius,
                half_height,
                ..
            } => {
                let radial = Vec2::new(p.x, p.z).clamp_length_max(radius);
                Vec3::new(radial.x, p.y.clamp(-half_height, half_height), radial.y)
            }
            Self::Sphere { radius } => p.clamp_length_max(radius),
            Self::Plane => Vec3::new(p.x, p.y, p.z.min(0.0)),
        }
    }
}
