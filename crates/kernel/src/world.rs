use std::collections::BTreeMap;

use glam::Vec3;
use orrery_common::{ObjectId, Pose};
use serde::{Deserialize, Serialize};

use crate::body::{BodyError, LiveBody, ObjectDescriptor, ObjectUpdate};
use crate::config::{ConfigError, WorldConfig};
use crate::contact::{collect_contacts, solve_contacts};
use crate::params::{ParameterError, PhysicsParameters};
use crate::registry::{BodyHandle, BodyRegistry};

/// A record produced by every structural change to the world.
///
/// Hosts drain these to refresh whatever mirrors the world (scene graph,
/// inspector panels); stepping itself does not log events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// Object was inserted. `replaced` is true when it overwrote a live id.
    Added { id: ObjectId, replaced: bool },
    Removed { id: ObjectId },
    Updated { id: ObjectId },
    /// All bodies returned to their rest poses.
    Reset,
    /// A physics parameter bundle replaced the world settings.
    Reconfigured { gravity: Vec3 },
}

/// The simulated world: settings plus the body registry.
///
/// Owns every body through the registry; nothing outside holds body state,
/// only ids. All mutations go through explicit operations.
#[derive(Debug)]
pub struct PhysicsWorld {
    config: WorldConfig,
    /// Air-resistance damping coefficient.
    damping: f32,
    /// Scale applied to each dynamic body's own mass.
    mass_scale: f32,
    registry: BodyRegistry,
    steps: u64,
    simulated_time: f64,
    event_log: Vec<WorldEvent>,
}

impl PhysicsWorld {
    /// Build a world. Rejects malformed configuration up front.
    pub fn new(config: WorldConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            damping: 0.0,
            mass_scale: 1.0,
            registry: BodyRegistry::new(),
            steps: 0,
            simulated_time: 0.0,
            event_log: Vec::new(),
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn gravity(&self) -> Vec3 {
        self.config.gravity
    }

    pub fn time_step(&self) -> f32 {
        self.config.time_step
    }

    pub fn damping(&self) -> f32 {
        self.damping
    }

    pub fn mass_scale(&self) -> f32 {
        self.mass_scale
    }

    /// Number of fixed sub-steps taken since creation.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated seconds since creation.
    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    pub fn body_count(&self) -> usize {
        self.registry.len()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.registry.contains(id)
    }

    /// Read-only view of a body, mainly for inspection and tests.
    pub fn body(&self, id: &ObjectId) -> Option<&LiveBody> {
        self.registry.get_by_id(id)
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.event_log)
    }

    pub fn events(&self) -> &[WorldEvent] {
        &self.event_log
    }

    /// Insert an object. A live id is overwritten and its old body released.
    pub fn add_object(&mut self, desc: &ObjectDescriptor) -> Result<BodyHandle, BodyError> {
        let body = LiveBody::from_descriptor(desc, self.mass_scale)?;
        let (handle, replaced) = self.registry.insert(body);
        if replaced.is_some() {
            tracing::warn!(id = %desc.id, "object id already live; previous body released");
        }
        tracing::debug!(id = %desc.id, shape = %desc.shape, "object added");
        self.event_log.push(WorldEvent::Added {
            id: desc.id.clone(),
            replaced: replaced.is_some(),
        });
        Ok(handle)
    }

    /// Remove an object. Returns false if the id was not live.
    pub fn remove_object(&mut self, id: &ObjectId) -> bool {
        if self.registry.remove(id).is_none() {
            tracing::trace!(%id, "remove of unknown id ignored");
            return false;
        }
        self.event_log.push(WorldEvent::Removed { id: id.clone() });
        true
    }

    /// Apply a partial update. Returns `Ok(false)` if the id was not live.
    pub fn update_object(&mut self, id: &ObjectId, update: &ObjectUpdate) -> Result<bool, BodyError> {
        let mass_scale = self.mass_scale;
        let Some(body) = self.registry.get_by_id_mut(id) else {
            tracing::trace!(%id, "update of unknown id ignored");
            return Ok(false);
        };
        body.apply_update(update, mass_scale)?;
        self.event_log.push(WorldEvent::Updated { id: id.clone() });
        Ok(true)
    }

    pub fn transform(&self, id: &ObjectId) -> Option<Pose> {
        self.registry.get_by_id(id).map(LiveBody::pose)
    }

    /// Snapshot of every live body's position, keyed by id.
    pub fn positions(&self) -> BTreeMap<ObjectId, Vec3> {
        self.registry
            .iter()
            .map(|b| (b.id().clone(), b.position()))
            .collect()
    }

    /// Return every body to its rest pose with zero velocity.
    pub fn reset(&mut self) {
        for body in self.registry.iter_mut() {
            body.rest();
        }
        tracing::debug!(bodies = self.registry.len(), "world reset");
        self.event_log.push(WorldEvent::Reset);
    }

    /// Release every body. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        self.registry.clear()
    }

    /// Replace gravity, default contact material, damping and mass scale.
    ///
    /// The time scale belongs to the stepper, not the world. Bodies keep their
    /// identities, poses and velocities; only mass properties are recomputed.
    /// A bundle that fails validation changes nothing.
    pub fn apply_parameters(&mut self, params: &PhysicsParameters) -> Result<(), ParameterError> {
        params.validate()?;
        self.config.gravity = params.gravity.to_vector();
        self.config.friction = params.friction;
        self.config.restitution = params.elasticity;
        self.damping = params.air_resistance;
        if self.mass_scale != params.mass {
            self.mass_scale = params.mass;
            for body in self.registry.iter_mut() {
                body.recompute_mass_properties(self.mass_scale);
            }
        }
        tracing::debug!(gravity = %self.config.gravity, damping = self.damping, "world reconfigured");
        self.event_log.push(WorldEvent::Reconfigured {
            gravity: self.config.gravity,
        });
        Ok(())
    }

    /// The current settings expressed as a parameter bundle.
    pub fn parameters(&self, time_scale: f32) -> PhysicsParameters {
        PhysicsParameters {
            air_resistance: self.damping,
            mass: self.mass_scale,
            time_scale,
            ..PhysicsParameters::from_config(&self.config)
        }
    }

    /// Advance by one fixed sub-step of `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        let gravity = self.config.gravity;
        for body in self.registry.iter_mut() {
            body.integrate_velocity(gravity, self.damping, dt);
        }

        let contacts = collect_contacts(&self.registry);
        solve_contacts(
            &mut self.registry,
            &contacts,
            self.config.default_material(),
            self.config.iterations,
            dt,
        );

        for body in self.registry.iter_mut() {
            body.integrate_position(dt);
        }

        self.steps += 1;
        self.simulated_time += dt as f64;
        tracing::trace!(step = self.steps, contacts = contacts.len(), "world stepped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Material;
    use crate::params::Gravity;
    use crate::shape::ShapeKind;

    fn world() -> PhysicsWorld {
        PhysicsWorld::new(WorldConfig::default()).unwrap()
    }

    fn ball(id: &str, y: f32) -> ObjectDescriptor {
        ObjectDescriptor::new(id, ShapeKind::Sphere, &[1.0]).at(Vec3::new(0.0, y, 0.0))
    }

    fn floor() -> ObjectDescriptor {
        ObjectDescriptor::new("floor", ShapeKind::Plane, &[])
            .rotated(Vec3::new(-std::f32::consts::FRAC_PI_2, 0.0, 0.0))
            .fixed()
    }

    fn run(w: &mut PhysicsWorld, steps: usize) {
        let dt = w.time_step();
        for _ in 0..steps {
            w.step(dt);
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = WorldConfig {
            iterations: 0,
            ..Default::default()
        };
        assert!(PhysicsWorld::new(cfg).is_err());
    }

    #[test]
    fn add_then_transform_returns_initial_pose() {
        let mut w = world();
        let desc = ball("a", 3.0).rotated(Vec3::new(0.1, 0.2, 0.3));
        w.add_object(&desc).unwrap();
        let pose = w.transform(&"a".into()).unwrap();
        assert_eq!(pose.position, Vec3::new(0.0, 3.0, 0.0));
        let expected = orrery_common::euler_to_quat(desc.rotation);
        assert!(pose.rotation.angle_between(expected) < 1e-5);
    }

    #[test]
    fn construction_error_registers_nothing() {
        let mut w = world();
        let bad = ObjectDescriptor::new("bad", ShapeKind::Box, &[1.0, -1.0, 1.0]);
        assert!(w.add_object(&bad).is_err());
        assert_eq!(w.body_count(), 0);
        assert!(w.events().is_empty());
    }

    #[test]
    fn duplicate_id_keeps_one_body() {
        let mut w = world();
        w.add_object(&ball("a", 1.0)).unwrap();
        w.add_object(&ball("a", 7.0)).unwrap();
        assert_eq!(w.body_count(), 1);
        assert_eq!(w.positions()[&ObjectId::from("a")].y, 7.0);
        assert_eq!(
            w.events().last(),
            Some(&WorldEvent::Added {
                id: "a".into(),
                replaced: true
            })
        );
    }

    #[test]
    fn remove_and_update_unknown_ids_are_noops() {
        let mut w = world();
        assert!(!w.remove_object(&"ghost".into()));
        assert!(!w.update_object(&"ghost".into(), &ObjectUpdate::default()).unwrap());
        assert!(w.transform(&"ghost".into()).is_none());
        assert!(w.events().is_empty());
    }

    #[test]
    fn remove_then_query_is_none() {
        let mut w = world();
        w.add_object(&ball("a", 1.0)).unwrap();
        assert!(w.remove_object(&"a".into()));
        assert!(w.transform(&"a".into()).is_none());
        assert!(w.positions().is_empty());
    }

    #[test]
    fn update_teleports_and_replaces_material() {
        let mut w = world();
        w.add_object(&ball("a", 1.0).with_material(Material::new(0.1, 0.1)))
            .unwrap();
        let update = ObjectUpdate {
            position: Some(Vec3::new(4.0, 5.0, 6.0)),
            material: Some(Material::new(0.9, 0.0)),
            ..Default::default()
        };
        assert!(w.update_object(&"a".into(), &update).unwrap());
        let body = w.body(&"a".into()).unwrap();
        assert_eq!(body.position(), Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(body.material(), Some(Material::new(0.9, 0.0)));
        assert_eq!(body.linear_velocity(), Vec3::ZERO);
    }

    #[test]
    fn static_body_never_moves() {
        let mut w = PhysicsWorld::new(WorldConfig {
            gravity: Vec3::new(0.0, -1000.0, 0.0),
            ..Default::default()
        })
        .unwrap();
        w.add_object(&ball("rock", 2.0).with_mass(10.0).fixed()).unwrap();
        run(&mut w, 300);
        assert_eq!(w.positions()[&ObjectId::from("rock")], Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn ball_comes_to_rest_on_floor() {
        let mut w = world();
        w.add_object(&floor()).unwrap();
        w.add_object(&ball("ball", 3.0)).unwrap();
        run(&mut w, 400);
        let body = w.body(&"ball".into()).unwrap();
        assert!((body.position().y - 0.5).abs() < 0.05, "y = {}", body.position().y);
        assert!(body.linear_velocity().length() < 0.1);
    }

    #[test]
    fn box_lands_on_floor() {
        let mut w = world();
        w.add_object(&floor()).unwrap();
        w.add_object(
            &ObjectDescriptor::new("crate", ShapeKind::Box, &[1.0, 1.0, 1.0])
                .at(Vec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap();
        run(&mut w, 400);
        let y = w.positions()[&ObjectId::from("crate")].y;
        assert!((y - 0.5).abs() < 0.1, "y = {y}");
    }

    #[test]
    fn box_stacks_on_box() {
        let mut w = world();
        w.add_object(&floor()).unwrap();
        w.add_object(
            &ObjectDescriptor::new("base", ShapeKind::Box, &[2.0, 1.0, 2.0])
                .at(Vec3::new(0.0, 0.5, 0.0))
                .fixed(),
        )
        .unwrap();
        w.add_object(
            &ObjectDescriptor::new("top", ShapeKind::Box, &[1.0, 1.0, 1.0])
                .at(Vec3::new(0.0, 1.6, 0.0)),
        )
        .unwrap();
        run(&mut w, 400);
        let top = w.body(&"top".into()).unwrap();
        assert!((top.position().y - 1.5).abs() < 0.1, "y = {}", top.position().y);
        assert!(top.linear_velocity().length() < 0.1);
    }

    #[test]
    fn ball_rests_on_cylinder_cap() {
        let mut w = world();
        w.add_object(
            &ObjectDescriptor::new("post", ShapeKind::Cylinder, &[2.0, 2.0])
                .at(Vec3::new(0.0, 1.0, 0.0))
                .fixed(),
        )
        .unwrap();
        w.add_object(&ball("ball", 3.0)).unwrap();
        run(&mut w, 400);
        let body = w.body(&"ball".into()).unwrap();
        assert!((body.position().y - 2.5).abs() < 0.05, "y = {}", body.position().y);
        assert!(body.linear_velocity().length() < 0.1);
    }

    #[test]
    fn reset_restores_rest_pose() {
        let mut w = world();
        w.add_object(&ball("a", 10.0)).unwrap();
        run(&mut w, 30);
        assert!(w.positions()[&ObjectId::from("a")].y < 10.0);
        w.reset();
        let body = w.body(&"a".into()).unwrap();
        assert_eq!(body.position(), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(body.linear_velocity(), Vec3::ZERO);
        assert_eq!(body.angular_velocity(), Vec3::ZERO);
        assert_eq!(w.body_count(), 1);
    }

    #[test]
    fn parameters_reconfigure_without_touching_bodies() {
        let mut w = world();
        w.add_object(&ball("a", 10.0).with_mass(2.0)).unwrap();
        let params = PhysicsParameters {
            gravity: Gravity::Magnitude(1.62),
            mass: 3.0,
            air_resistance: 0.25,
            ..Default::default()
        };
        w.apply_parameters(&params).unwrap();
        assert_eq!(w.gravity(), Vec3::new(0.0, -1.62, 0.0));
        assert_eq!(w.damping(), 0.25);
        let body = w.body(&"a".into()).unwrap();
        assert_eq!(body.mass(), 6.0);
        assert_eq!(body.position(), Vec3::new(0.0, 10.0, 0.0));
        assert_eq!(w.parameters(1.0).air_resistance, 0.25);
    }

    #[test]
    fn rejected_parameters_change_nothing() {
        let mut w = world();
        w.add_object(&ball("a", 10.0)).unwrap();
        let before = w.parameters(1.0);
        let bad = PhysicsParameters {
            gravity: Gravity::Magnitude(f32::NAN),
            friction: 0.9,
            ..Default::default()
        };
        assert_eq!(w.apply_parameters(&bad), Err(ParameterError::NonFiniteGravity));
        assert_eq!(w.parameters(1.0), before);
        assert!(w.events().iter().all(|e| !matches!(e, WorldEvent::Reconfigured { .. })));

        run(&mut w, 10);
        assert!(w.positions()[&ObjectId::from("a")].is_finite());
    }

    #[test]
    fn air_resistance_slows_fall() {
        let mut still_air = world();
        let mut thick_air = world();
        thick_air
            .apply_parameters(&PhysicsParameters {
                air_resistance: 2.0,
                ..Default::default()
            })
            .unwrap();
        for w in [&mut still_air, &mut thick_air] {
            w.add_object(&ball("a", 10.0)).unwrap();
            run(w, 60);
        }
        let y_still = still_air.positions()[&ObjectId::from("a")].y;
        let y_thick = thick_air.positions()[&ObjectId::from("a")].y;
        assert!(y_thick > y_still);
    }
}
