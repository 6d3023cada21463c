//! Contact generation and a sequential-impulse contact solver.
//!
//! Narrow phase per shape pair:
//! - plane vs anything: sphere bottom point or feature points below the plane,
//! - sphere vs sphere/box/cylinder: closest point,
//! - box/cylinder vs box/cylinder: feature points of each inside the other.
//!
//! Every contact normal points from body `a` to body `b`.

use glam::{Mat3, Vec3};
use orrery_common::Pose;

use crate::body::{LiveBody, Material};
use crate::registry::{BodyHandle, BodyRegistry};
use crate::shape::CollisionShape;

/// Fraction of penetration (beyond the slop) corrected per second of step.
const BAUMGARTE: f32 = 0.2;
/// Penetration tolerated without correction, in meters.
const SLOP: f32 = 0.005;
/// Approach speeds below this do not bounce.
const RESTITUTION_THRESHOLD: f32 = 0.5;
/// Extra distance kept in the bounding-sphere broad phase.
const BROAD_MARGIN: f32 = 0.05;

/// A single contact point between two bodies.
#[derive(Debug, Clone)]
pub(crate) struct Contact {
    pub a: BodyHandle,
    pub b: BodyHandle,
    pub point: Vec3,
    pub normal: Vec3,
    pub depth: f32,
}

/// Raw geometric contact before it is attached to body handles.
struct Manifold {
    point: Vec3,
    normal: Vec3,
    depth: f32,
}

/// Find every touching pair in the registry.
pub(crate) fn collect_contacts(registry: &BodyRegistry) -> Vec<Contact> {
    let handles = registry.handles();
    let mut contacts = Vec::new();
    for (i, &ha) in handles.iter().enumerate() {
        let Some(a) = registry.get(ha) else { continue };
        for &hb in &handles[i + 1..] {
            let Some(b) = registry.get(hb) else { continue };
            if !a.is_dynamic() && !b.is_dynamic() {
                continue;
            }
            let reach = a.shape().bounding_radius() + b.shape().bounding_radius() + BROAD_MARGIN;
            if reach.is_finite() && a.position().distance(b.position()) > reach {
                continue;
            }
            for m in narrow_phase(a, b) {
                contacts.push(Contact {
                    a: ha,
                    b: hb,
                    point: m.point,
                    normal: m.normal,
                    depth: m.depth,
                });
            }
        }
    }
    contacts
}

fn narrow_phase(a: &LiveBody, b: &LiveBody) -> Vec<Manifold> {
    use CollisionShape as S;

    let (pa, pb) = (a.pose(), b.pose());
    match (a.shape(), b.shape()) {
        (S::Plane, S::Plane) => Vec::new(),
        (S::Plane, other) => plane_contacts(&pa, other, &pb),
        (other, S::Plane) => flip(plane_contacts(&pb, other, &pa)),
        (S::Sphere { radius: ra }, S::Sphere { radius: rb }) => {
            sphere_sphere(pa.position, *ra, pb.position, *rb)
        }
        (S::Sphere { radius }, other) => sphere_solid(pa.position, *radius, other, &pb),
        (other, S::Sphere { radius }) => flip(sphere_solid(pb.position, *radius, other, &pa)),
        (sa, sb) => {
            let mut out = points_inside(sa, &pa, sb, &pb);
            out.extend(flip(points_inside(sb, &pb, sa, &pa)));
            out
        }
    }
}

fn flip(mut manifolds: Vec<Manifold>) -> Vec<Manifold> {
    for m in &mut manifolds {
        m.normal = -m.normal;
    }
    manifolds
}

fn plane_contacts(plane: &Pose, shape: &CollisionShape, pose: &Pose) -> Vec<Manifold> {
    let normal = plane.rotation * Vec3::Z;
    let offset = normal.dot(plane.position);
    if let CollisionShape::Sphere { radius } = *shape {
        let distance = normal.dot(pose.position) - offset - radius;
        if distance >= 0.0 {
            return Vec::new();
        }
        return vec![Manifold {
            point: pose.position - normal * radius,
            normal,
            depth: -distance,
        }];
    }
    shape
        .feature_points()
        .into_iter()
        .filter_map(|local| {
            let point = pose.transform_point(local);
            let distance = normal.dot(point) - offset;
            (distance < 0.0).then_some(Manifold {
                point,
                normal,
                depth: -distance,
            })
        })
        .collect()
}

fn sphere_sphere(ca: Vec3, ra: f32, cb: Vec3, rb: f32) -> Vec<Manifold> {
    let delta = cb - ca;
    let distance = delta.length();
    if distance >= ra + rb {
        return Vec::new();
    }
    let normal = delta.try_normalize().unwrap_or(Vec3::Y);
    vec![Manifold {
        point: ca + normal * ra,
        normal,
        depth: ra + rb - distance,
    }]
}

/// Sphere `a` against a box or cylinder `b`.
fn sphere_solid(center: Vec3, radius: f32, shape: &CollisionShape, pose: &Pose) -> Vec<Manifold> {
    let local = pose.inverse_transform_point(center);
    if let Some((depth, outward)) = shape.penetration(local) {
        // Center is inside the solid: push out through the nearest face.
        return vec![Manifold {
            point: center,
            normal: -(pose.rotation * outward),
            depth: depth + radius,
        }];
    }
    let closest = shape.closest_point(local);
    let offset = local - closest;
    let distance = offset.length();
    if distance >= radius {
        return Vec::new();
    }
    let outward = pose.rotation * offset.try_normalize().unwrap_or(Vec3::Y);
    vec![Manifold {
        point: pose.transform_point(closest),
        normal: -outward,
        depth: radius - distance,
    }]
}

/// Feature points of `a` that sit inside `b`.
fn points_inside(
    a: &CollisionShape,
    pa: &Pose,
    b: &CollisionShape,
    pb: &Pose,
) -> Vec<Manifold> {
    a.feature_points()
        .into_iter()
        .filter_map(|local| {
            let point = pa.transform_point(local);
            let (depth, outward) = b.penetration(pb.inverse_transform_point(point))?;
            Some(Manifold {
                point,
                normal: -(pb.rotation * outward),
                depth,
            })
        })
        .collect()
}

/// Material for a contact: the product of both body materials when each has
/// one, otherwise the world default.
pub(crate) fn combine_materials(
    a: Option<Material>,
    b: Option<Material>,
    default: Material,
) -> Material {
    match (a, b) {
        (Some(a), Some(b)) => Material::new(a.friction * b.friction, a.restitution * b.restitution),
        _ => default,
    }
}

/// Per-contact solver state, prepared once per sub-step.
struct Constraint {
    a: BodyHandle,
    b: BodyHandle,
    ra: Vec3,
    rb: Vec3,
    inv_ia: Mat3,
    inv_ib: Mat3,
    inv_ma: f32,
    inv_mb: f32,
    normal: Vec3,
    tangents: [Vec3; 2],
    normal_mass: f32,
    tangent_mass: [f32; 2],
    bias: f32,
    friction: f32,
    normal_impulse: f32,
    tangent_impulse: [f32; 2],
}

impl Constraint {
    fn effective_mass(&self, dir: Vec3) -> f32 {
        let ka = self.inv_ia * self.ra.cross(dir);
        let kb = self.inv_ib * self.rb.cross(dir);
        let k = self.inv_ma + self.inv_mb + dir.dot(ka.cross(self.ra) + kb.cross(self.rb));
        if k > 0.0 { 1.0 / k } else { 0.0 }
    }

    fn apply(&self, registry: &mut BodyRegistry, impulse: Vec3) {
        if let Some((a, b)) = registry.pair_mut(self.a, self.b) {
            a.apply_impulse(-impulse, self.ra);
            b.apply_impulse(impulse, self.rb);
        }
    }

    fn relative_velocity(&self, registry: &mut BodyRegistry) -> Vec3 {
        match registry.pair_mut(self.a, self.b) {
            Some((a, b)) => b.velocity_at(self.rb) - a.velocity_at(self.ra),
            None => Vec3::ZERO,
        }
    }
}

/// Resolve contacts with `iterations` passes of sequential impulses.
pub(crate) fn solve_contacts(
    registry: &mut BodyRegistry,
    contacts: &[Contact],
    default_material: Material,
    iterations: u32,
    dt: f32,
) {
    let mut constraints: Vec<Constraint> = contacts
        .iter()
        .filter_map(|c| prepare(registry, c, default_material, dt))
        .collect();

    for _ in 0..iterations {
        for c in &mut constraints {
            let dv = c.relative_velocity(registry);
            let lambda = (c.bias - dv.dot(c.normal)) * c.normal_mass;
            let previous = c.normal_impulse;
            c.normal_impulse = (previous + lambda).max(0.0);
            c.apply(registry, c.normal * (c.normal_impulse - previous));

            let limit = c.friction * c.normal_impulse;
            for k in 0..2 {
                let dv = c.relative_velocity(registry);
                let lambda = -dv.dot(c.tangents[k]) * c.tangent_mass[k];
                let previous = c.tangent_impulse[k];
                c.tangent_impulse[k] = (previous + lambda).clamp(-limit, limit);
                c.apply(registry, c.tangents[k] * (c.tangent_impulse[k] - previous));
            }
        }
    }
}

fn prepare(
    registry: &mut BodyRegistry,
    contact: &Contact,
    default_material: Material,
    dt: f32,
) -> Option<Constraint> {
    let (a, b) = registry.pair_mut(contact.a, contact.b)?;
    let material = combine_materials(a.material(), b.material(), default_material);
    let ra = contact.point - a.position();
    let rb = contact.point - b.position();
    let n = contact.normal;

    let approach = (b.velocity_at(rb) - a.velocity_at(ra)).dot(n);
    let bounce = if approach < -RESTITUTION_THRESHOLD {
        -material.restitution * approach
    } else {
        0.0
    };
    let correction = BAUMGARTE / dt * (contact.depth - SLOP).max(0.0);

    let t1 = n.any_orthonormal_vector();
    let t2 = n.cross(t1);

    let mut constraint = Constraint {
        a: contact.a,
        b: contact.b,
        ra,
        rb,
        inv_ia: a.inv_inertia_world(),
        inv_ib: b.inv_inertia_world(),
        inv_ma: a.inv_mass(),
        inv_mb: b.inv_mass(),
        normal: n,
        tangents: [t1, t2],
        normal_mass: 0.0,
        tangent_mass: [0.0; 2],
        bias: bounce.max(correction),
        friction: material.friction,
        normal_impulse: 0.0,
        tangent_impulse: [0.0; 2],
    };
    constraint.normal_mass = constraint.effective_mass(n);
    constraint.tangent_mass = [constraint.effective_mass(t1), constraint.effective_mass(t2)];
    Some(constraint)
}
