use glam::{Mat3, Quat, Vec3};
use orrery_common::{ObjectId, Pose, euler_to_quat};
use serde::{Deserialize, Serialize};

use crate::shape::{CollisionShape, ShapeError, ShapeKind, make_shape};

/// Errors that reject a single object insertion or update.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BodyError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error("mass must be finite and non-negative, got {0}")]
    InvalidMass(f32),
    #[error("material out of range: friction={friction}, restitution={restitution}")]
    InvalidMaterial { friction: f32, restitution: f32 },
    #[error("pose for {0} is not finite")]
    NonFinitePose(ObjectId),
}

/// Surface properties of a body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
}

impl Material {
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
        }
    }

    /// Both coefficients must lie in [0, 1].
    pub fn validate(&self) -> Result<(), BodyError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if in_unit(self.friction) && in_unit(self.restitution) {
            Ok(())
        } else {
            Err(BodyError::InvalidMaterial {
                friction: self.friction,
                restitution: self.restitution,
            })
        }
    }
}

/// Everything needed to insert one object, as it arrives at the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDescriptor {
    pub id: ObjectId,
    pub shape: ShapeKind,
    #[serde(default)]
    pub dimensions: Vec<f32>,
    #[serde(default)]
    pub position: Vec3,
    /// XYZ Euler angles in radians.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "unit_mass")]
    pub mass: f32,
    #[serde(default)]
    pub is_static: bool,
    /// Falls back to the world's default contact material when absent.
    #[serde(default)]
    pub material: Option<Material>,
}

fn unit_mass() -> f32 {
    1.0
}

impl ObjectDescriptor {
    /// A dynamic, unit-mass object at the origin.
    pub fn new(id: impl Into<ObjectId>, shape: ShapeKind, dimensions: &[f32]) -> Self {
        Self {
            id: id.into(),
            shape,
            dimensions: dimensions.to_vec(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            mass: 1.0,
            is_static: false,
            material: None,
        }
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn rotated(mut self, euler: Vec3) -> Self {
        self.rotation = euler;
        self
    }

    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    pub fn fixed(mut self) -> Self {
        self.is_static = true;
        self
    }
}

/// Partial update: only the present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectUpdate {
    pub position: Option<Vec3>,
    /// XYZ Euler angles in radians.
    pub rotation: Option<Vec3>,
    pub mass: Option<f32>,
    pub material: Option<Material>,
}

fn check_mass(mass: f32) -> Result<(), BodyError> {
    if mass.is_finite() && mass >= 0.0 {
        Ok(())
    } else {
        Err(BodyError::InvalidMass(mass))
    }
}

/// A live simulated body. Owned exclusively by the [`BodyRegistry`](crate::BodyRegistry).
#[derive(Debug, Clone)]
pub struct LiveBody {
    id: ObjectId,
    shape: CollisionShape,
    material: Option<Material>,
    is_static: bool,
    /// Mass as supplied by the caller, before the world's mass scale.
    base_mass: f32,
    mass: f32,
    inv_mass: f32,
    inv_inertia_local: Vec3,
    pose: Pose,
    /// Pose restored by a world reset: the insertion pose or the last teleport.
    rest_pose: Pose,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
}

impl LiveBody {
    /// Build a body from a descriptor. Planes are always immovable.
    pub fn from_descriptor(desc: &ObjectDescriptor, mass_scale: f32) -> Result<Self, BodyError> {
        let shape = make_shape(desc.shape, &desc.dimensions)?;
        let is_static = desc.is_static || shape == CollisionShape::Plane;
        // Static bodies ignore the descriptor mass entirely.
        if !is_static {
            check_mass(desc.mass)?;
        }
        if let Some(material) = &desc.material {
            material.validate()?;
        }
        if !desc.position.is_finite() || !desc.rotation.is_finite() {
            return Err(BodyError::NonFinitePose(desc.id.clone()));
        }

        if is_static && !desc.is_static {
            tracing::debug!(id = %desc.id, "plane bodies are always static");
        }

        let pose = Pose::from_euler(desc.position, desc.rotation);
        let mut body = Self {
            id: desc.id.clone(),
            shape,
            material: desc.material,
            is_static,
            base_mass: if is_static { 0.0 } else { desc.mass },
            mass: 0.0,
            inv_mass: 0.0,
            inv_inertia_local: Vec3::ZERO,
            pose,
            rest_pose: pose,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        };
        body.recompute_mass_properties(mass_scale);
        Ok(body)
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn shape(&self) -> &CollisionShape {
        &self.shape
    }

    pub fn material(&self) -> Option<Material> {
        self.material
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Effective mass after the world mass scale. Zero for static bodies.
    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inv_mass(&self) -> f32 {
        self.inv_mass
    }

    /// True when forces and impulses can move this body.
    pub fn is_dynamic(&self) -> bool {
        self.inv_mass > 0.0
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    pub fn set_linear_velocity(&mut self, v: Vec3) {
        if self.is_dynamic() {
            self.linear_velocity = v;
        }
    }

    /// Recompute mass and inertia from the base mass and a world mass scale.
    ///
    /// A zero mass leaves the body immovable, the same as a static body.
    pub fn recompute_mass_properties(&mut self, mass_scale: f32) {
        self.mass = if self.is_static {
            0.0
        } else {
            self.base_mass * mass_scale
        };
        if self.mass > 0.0 {
            self.inv_mass = 1.0 / self.mass;
            let inertia = self.shape.principal_inertia(self.mass);
            self.inv_inertia_local = Vec3::select(
                inertia.cmpgt(Vec3::ZERO),
                inertia.recip(),
                Vec3::ZERO,
            );
        } else {
            self.inv_mass = 0.0;
            self.inv_inertia_local = Vec3::ZERO;
            self.linear_velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
        }
    }

    /// Apply a partial update. Validates everything before touching the body.
    pub fn apply_update(&mut self, update: &ObjectUpdate, mass_scale: f32) -> Result<(), BodyError> {
        if let Some(mass) = update.mass.filter(|_| !self.is_static) {
            check_mass(mass)?;
        }
        if let Some(material) = &update.material {
            material.validate()?;
        }
        let position_ok = update.position.is_none_or(|p| p.is_finite());
        let rotation_ok = update.rotation.is_none_or(|r| r.is_finite());
        if !position_ok || !rotation_ok {
            return Err(BodyError::NonFinitePose(self.id.clone()));
        }

        if let Some(position) = update.position {
            self.pose.position = position;
            self.rest_pose.position = position;
        }
        if let Some(euler) = update.rotation {
            let rotation = euler_to_quat(euler);
            self.pose.rotation = rotation;
            self.rest_pose.rotation = rotation;
        }
        if let Some(mass) = update.mass {
            if self.is_static {
                tracing::debug!(id = %self.id, "ignoring mass change on static body");
            } else {
                self.base_mass = mass;
                self.recompute_mass_properties(mass_scale);
            }
        }
        if let Some(material) = update.material {
            self.material = Some(material);
        }
        Ok(())
    }

    /// Inverse inertia tensor in world space.
    pub fn inv_inertia_world(&self) -> Mat3 {
        let r = Mat3::from_quat(self.pose.rotation);
        r * Mat3::from_diagonal(self.inv_inertia_local) * r.transpose()
    }

    /// Apply an impulse at offset `r` from the center of mass.
    pub fn apply_impulse(&mut self, impulse: Vec3, r: Vec3) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_world() * r.cross(impulse);
    }

    /// Velocity of the material point at offset `r` from the center of mass.
    pub fn velocity_at(&self, r: Vec3) -> Vec3 {
        self.linear_velocity + self.angular_velocity.cross(r)
    }

    /// Gravity plus air-resistance damping over one sub-step.
    pub fn integrate_velocity(&mut self, gravity: Vec3, damping: f32, dt: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += gravity * dt;
        let keep = 1.0 / (1.0 + dt * damping);
        self.linear_velocity *= keep;
        self.angular_velocity *= keep;
    }

    pub fn integrate_position(&mut self, dt: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.pose.position += self.linear_velocity * dt;
        let w = self.angular_velocity;
        let spin = Quat::from_xyzw(w.x, w.y, w.z, 0.0) * self.pose.rotation;
        self.pose.rotation = (self.pose.rotation + spin * (0.5 * dt)).normalize();
    }

    /// Return to the rest pose with zero velocity.
    pub fn rest(&mut self) {
        self.pose = self.rest_pose;
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball() -> ObjectDescriptor {
        ObjectDescriptor::new(1u64, ShapeKind::Sphere, &[1.0]).at(Vec3::new(0.0, 10.0, 0.0))
    }

    #[test]
    fn descriptor_from_wire_json() {
        let desc: ObjectDescriptor = serde_json::from_str(
            r#"{"id":1,"shape":"sphere","dimensions":[1],"position":[0,10,0],
                "rotation":[0,0,0],"mass":1,"isStatic":false,
                "material":{"friction":0.3,"restitution":0.3}}"#,
        )
        .unwrap();
        assert_eq!(desc.id, ObjectId::from(1u64));
        assert_eq!(desc.shape, ShapeKind::Sphere);
        assert_eq!(desc.position, Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(desc.material, Some(Material::new(0.3, 0.3)));
    }

    #[test]
    fn omitted_fields_take_defaults() {
        let desc: ObjectDescriptor =
            serde_json::from_str(r#"{"id":"crate","shape":"box","dimensions":[1,1,1]}"#).unwrap();
        assert_eq!(desc, ObjectDescriptor::new("crate", ShapeKind::Box, &[1.0, 1.0, 1.0]));
    }

    #[test]
    fn unknown_shape_fails_at_the_boundary() {
        let err = serde_json::from_str::<ObjectDescriptor>(r#"{"id":"x","shape":"torus"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unsupported shape kind"));
    }

    #[test]
    fn static_body_has_no_mass() {
        let body = LiveBody::from_descriptor(&ball().with_mass(5.0).fixed(), 1.0).unwrap();
        assert_eq!(body.mass(), 0.0);
        assert!(!body.is_dynamic());
    }

    #[test]
    fn static_body_ignores_invalid_mass() {
        let wall = ObjectDescriptor::new("wall", ShapeKind::Box, &[1.0, 1.0, 1.0])
            .with_mass(-1.0)
            .fixed();
        let mut body = LiveBody::from_descriptor(&wall, 1.0).unwrap();
        assert_eq!(body.mass(), 0.0);

        let update = ObjectUpdate {
            mass: Some(f32::NAN),
            ..Default::default()
        };
        assert!(body.apply_update(&update, 1.0).is_ok());
        assert_eq!(body.mass(), 0.0);

        let dynamic = ObjectDescriptor::new("crate", ShapeKind::Box, &[1.0, 1.0, 1.0]).with_mass(-1.0);
        assert!(matches!(
            LiveBody::from_descriptor(&dynamic, 1.0),
            Err(BodyError::InvalidMass(_))
        ));
    }

    #[test]
    fn plane_is_forced_static() {
        let desc = ObjectDescriptor::new("floor", ShapeKind::Plane, &[]).with_mass(3.0);
        let body = LiveBody::from_descriptor(&desc, 1.0).unwrap();
        assert!(body.is_static());
        assert_eq!(body.mass(), 0.0);
    }

    #[test]
    fn invalid_mass_and_material_rejected() {
        assert_eq!(
            LiveBody::from_descriptor(&ball().with_mass(-1.0), 1.0).unwrap_err(),
            BodyError::InvalidMass(-1.0)
        );
        let bad = ball().with_material(Material::new(1.5, 0.0));
        assert!(matches!(
            LiveBody::from_descriptor(&bad, 1.0),
            Err(BodyError::InvalidMaterial { .. })
        ));
    }

    #[test]
    fn mass_update_recomputes_inertia() {
        let mut body = LiveBody::from_descriptor(&ball(), 1.0).unwrap();
        let before = body.inv_inertia_world();
        body.apply_update(
            &ObjectUpdate {
                mass: Some(4.0),
                ..Default::default()
            },
            1.0,
        )
        .unwrap();
        assert_eq!(body.mass(), 4.0);
        let after = body.inv_inertia_world();
        assert!((before.x_axis.x / after.x_axis.x - 4.0).abs() < 1e-4);
    }

    #[test]
    fn failed_update_leaves_body_untouched() {
        let mut body = LiveBody::from_descriptor(&ball(), 1.0).unwrap();
        let update = ObjectUpdate {
            position: Some(Vec3::ZERO),
            mass: Some(f32::NAN),
            ..Default::default()
        };
        assert!(body.apply_update(&update, 1.0).is_err());
        assert_eq!(body.position(), Vec3::new(0.0, 10.0, 0.0));
    }

    #[test]
    fn static_body_ignores_integration() {
        let mut body = LiveBody::from_descriptor(&ball().fixed(), 1.0).unwrap();
        body.integrate_velocity(Vec3::new(0.0, -100.0, 0.0), 0.0, 1.0);
        body.integrate_position(1.0);
        body.apply_impulse(Vec3::Y * 50.0, Vec3::X);
        assert_eq!(body.position(), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(body.linear_velocity(), Vec3::ZERO);
    }
}
