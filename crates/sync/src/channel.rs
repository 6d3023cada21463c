use std::collections::BTreeMap;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use orrery_common::UniverseId;
use orrery_kernel::{PhysicsParameters, Simulation};

use crate::event::{ParameterCategory, ParameterUpdateEvent};

/// A component that owns one or more parameter categories.
pub trait ParameterTarget {
    /// Replace the physics bundle wholesale.
    fn apply_physics(&mut self, params: &PhysicsParameters);

    /// Replace the music bundle wholesale. The default drops it.
    fn apply_music(&mut self, params: &serde_json::Value) {
        tracing::debug!(%params, "no music handler; update ignored");
    }
}

impl ParameterTarget for Simulation {
    fn apply_physics(&mut self, params: &PhysicsParameters) {
        if let Err(e) = self.apply_physics_parameters(params) {
            tracing::warn!(error = %e, "physics parameters refused");
        }
    }
}

/// Notification that a category was replaced, for the host to re-render.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub category: ParameterCategory,
    /// When the winning event was taken off the transport queue.
    pub received_at: Instant,
}

/// Counters for what passed through the channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub received: u64,
    pub applied: u64,
    pub foreign: u64,
    pub malformed: u64,
    pub published: u64,
    pub publish_failures: u64,
}

#[derive(Debug, Clone)]
enum Bundle {
    Physics(PhysicsParameters),
    Music(serde_json::Value),
}

#[derive(Debug, Clone)]
struct Pending {
    bundle: Bundle,
    received_at: Instant,
}

/// The transport's side of a channel: hand it raw inbound messages, take
/// outbound ones from it.
///
/// Both ends are crossbeam channels, so a transport may live on another thread.
#[derive(Debug, Clone)]
pub struct TransportEndpoint {
    inbound: Sender<String>,
    outbound: Receiver<String>,
}

impl TransportEndpoint {
    /// Queue a raw message for the channel. Returns false once the channel is gone.
    pub fn deliver(&self, raw: impl Into<String>) -> bool {
        self.inbound.send(raw.into()).is_ok()
    }

    /// A cloneable sender for delivering from another thread.
    pub fn inbound(&self) -> Sender<String> {
        self.inbound.clone()
    }

    /// Take every message the channel has published so far.
    pub fn drain_outbound(&self) -> Vec<String> {
        self.outbound.try_iter().collect()
    }
}

/// Per-universe parameter sync channel.
///
/// Inbound messages are only queued on arrival. [`SyncChannel::pump`] decodes
/// and filters them and applies the survivors, so the host calls it at the
/// frame boundary, before stepping. Within one pump the last event per
/// category wins.
#[derive(Debug)]
pub struct SyncChannel {
    universe: UniverseId,
    inbound: Receiver<String>,
    outbound: Sender<String>,
    pending: BTreeMap<ParameterCategory, Pending>,
    stats: SyncStats,
}

impl SyncChannel {
    /// Create a channel bound to `universe` and the transport endpoint feeding it.
    pub fn connect(universe: UniverseId) -> (Self, TransportEndpoint) {
        let (in_tx, in_rx) = unbounded();
        let (out_tx, out_rx) = unbounded();
        let channel = Self {
            universe,
            inbound: in_rx,
            outbound: out_tx,
            pending: BTreeMap::new(),
            stats: SyncStats::default(),
        };
        let endpoint = TransportEndpoint {
            inbound: in_tx,
            outbound: out_rx,
        };
        (channel, endpoint)
    }

    pub fn universe(&self) -> &UniverseId {
        &self.universe
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Drain the transport queue without blocking. Malformed and foreign
    /// events are dropped here. Returns how many updates are now pending.
    pub fn poll(&mut self) -> usize {
        loop {
            match self.inbound.try_recv() {
                Ok(raw) => self.accept(&raw),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::trace!(universe = %self.universe, "transport disconnected");
                    break;
                }
            }
        }
        self.pending.len()
    }

    fn accept(&mut self, raw: &str) {
        self.stats.received += 1;
        let event = match ParameterUpdateEvent::decode(raw) {
            Ok(event) => event,
            Err(e) => {
                self.stats.malformed += 1;
                tracing::warn!(error = %e, "dropping malformed parameter event");
                return;
            }
        };
        if event.universe_id != self.universe {
            self.stats.foreign += 1;
            tracing::trace!(universe = %event.universe_id, "ignoring event for another universe");
            return;
        }
        let bundle = match event.category {
            ParameterCategory::Physics => match event.physics_parameters() {
                Ok(params) => Bundle::Physics(params),
                Err(e) => {
                    self.stats.malformed += 1;
                    tracing::warn!(error = %e, "dropping physics event");
                    return;
                }
            },
            ParameterCategory::Music => Bundle::Music(event.parameters),
        };
        self.pending.insert(
            event.category,
            Pending {
                bundle,
                received_at: Instant::now(),
            },
        );
    }

    /// Apply every pending update to `target`. Returns one notification per
    /// replaced category.
    pub fn apply_pending(&mut self, target: &mut impl ParameterTarget) -> Vec<Applied> {
        let pending = std::mem::take(&mut self.pending);
        let mut applied = Vec::with_capacity(pending.len());
        for (category, update) in pending {
            match &update.bundle {
                Bundle::Physics(params) => target.apply_physics(params),
                Bundle::Music(params) => target.apply_music(params),
            }
            self.stats.applied += 1;
            tracing::debug!(%category, universe = %self.universe, "parameters applied");
            applied.push(Applied {
                category,
                received_at: update.received_at,
            });
        }
        applied
    }

    /// Poll then apply. Call once per frame, before stepping.
    pub fn pump(&mut self, target: &mut impl ParameterTarget) -> Vec<Applied> {
        self.poll();
        self.apply_pending(target)
    }

    /// Publish a local edit. Fire-and-forget: failures are counted and logged,
    /// never retried.
    pub fn publish(&mut self, category: ParameterCategory, parameters: serde_json::Value) {
        let event = ParameterUpdateEvent {
            universe_id: self.universe.clone(),
            category,
            parameters,
        };
        self.send(&event);
    }

    pub fn publish_physics(&mut self, params: &PhysicsParameters) {
        match ParameterUpdateEvent::physics(self.universe.clone(), params) {
            Ok(event) => self.send(&event),
            Err(e) => {
                self.stats.publish_failures += 1;
                tracing::warn!(error = %e, "could not encode physics parameters");
            }
        }
    }

    fn send(&mut self, event: &ParameterUpdateEvent) {
        let sent = event
            .encode()
            .ok()
            .is_some_and(|raw| self.outbound.send(raw).is_ok());
        if sent {
            self.stats.published += 1;
        } else {
            self.stats.publish_failures += 1;
            tracing::debug!(category = %event.category, "publish dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use orrery_kernel::{Gravity, ObjectDescriptor, ShapeKind, WorldConfig};
    use std::time::Duration;

    const FRAME: Duration = Duration::from_micros(16_667);

    fn physics_event(universe: &UniverseId, gravity: Vec3) -> String {
        let params = PhysicsParameters {
            gravity: Gravity::Vector(gravity),
            ..Default::default()
        };
        ParameterUpdateEvent::physics(universe.clone(), &params)
            .unwrap()
            .encode()
            .unwrap()
    }

    fn simulation() -> (Simulation, Instant) {
        let mut sim = Simulation::new();
        sim.initialize(WorldConfig::default()).unwrap();
        sim.add_object(
            &ObjectDescriptor::new("ball", ShapeKind::Sphere, &[1.0]).at(Vec3::new(0.0, 10.0, 0.0)),
        )
        .unwrap();
        let t0 = Instant::now();
        sim.start_at(t0);
        (sim, t0)
    }

    fn ball_y(sim: &Simulation) -> f32 {
        sim.object_transform(&"ball".into()).unwrap().position.y
    }

    #[derive(Default)]
    struct Recorder {
        physics: Vec<PhysicsParameters>,
        music: Vec<serde_json::Value>,
    }

    impl ParameterTarget for Recorder {
        fn apply_physics(&mut self, params: &PhysicsParameters) {
            self.physics.push(*params);
        }

        fn apply_music(&mut self, params: &serde_json::Value) {
            self.music.push(params.clone());
        }
    }

    #[test]
    fn matching_gravity_event_changes_later_steps() {
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        let (mut sim, t0) = simulation();

        assert!(transport.deliver(physics_event(&universe, Vec3::ZERO)));
        let applied = channel.pump(&mut sim);
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].category, ParameterCategory::Physics);

        for i in 1..=60 {
            sim.step_at(t0 + FRAME * i);
        }
        assert_eq!(ball_y(&sim), 10.0);
        assert_eq!(sim.world().unwrap().gravity(), Vec3::ZERO);
    }

    #[test]
    fn integer_keyed_universe_receives_updates() {
        let (mut channel, transport) = SyncChannel::connect(UniverseId::from(42u64));
        let mut recorder = Recorder::default();
        transport.deliver(r#"{"universe_id":42,"type":"physics","parameters":{"gravity":0}}"#);
        transport.deliver(r#"{"universe_id":"42","type":"music","parameters":{}}"#);
        transport.deliver(r#"{"universe_id":43,"type":"physics","parameters":{}}"#);
        assert_eq!(channel.pump(&mut recorder).len(), 2);
        assert_eq!(recorder.physics[0].gravity.to_vector(), Vec3::new(0.0, -0.0, 0.0));
        assert_eq!(channel.stats().foreign, 1);
        assert_eq!(channel.stats().malformed, 0);
    }

    #[test]
    fn foreign_universe_is_ignored() {
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        let (mut sim, t0) = simulation();

        transport.deliver(physics_event(&UniverseId::new(), Vec3::ZERO));
        assert!(channel.pump(&mut sim).is_empty());
        assert_eq!(channel.stats().foreign, 1);

        for i in 1..=30 {
            sim.step_at(t0 + FRAME * i);
        }
        assert!(ball_y(&sim) < 10.0);
        assert_eq!(sim.world().unwrap().gravity(), Vec3::new(0.0, -9.81, 0.0));
    }

    #[test]
    fn malformed_payloads_never_reach_the_world() {
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        let (mut sim, _) = simulation();

        transport.deliver("{ not json");
        transport.deliver(format!(
            r#"{{"universe_id":"{universe}","type":"physics","parameters":{{"friction":"sticky"}}}}"#
        ));
        transport.deliver(format!(
            r#"{{"universe_id":"{universe}","type":"physics","parameters":{{"timeScale":-1}}}}"#
        ));
        assert!(channel.pump(&mut sim).is_empty());
        assert_eq!(channel.stats().malformed, 3);
        assert_eq!(sim.time_scale(), 1.0);
    }

    #[test]
    fn last_event_per_category_wins() {
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        let mut recorder = Recorder::default();

        transport.deliver(physics_event(&universe, Vec3::new(0.0, -1.0, 0.0)));
        transport.deliver(physics_event(&universe, Vec3::new(0.0, -2.0, 0.0)));
        transport.deliver(
            serde_json::json!({
                "universe_id": universe,
                "type": "music",
                "parameters": { "tempo": 96 }
            })
            .to_string(),
        );
        let applied = channel.pump(&mut recorder);
        assert_eq!(applied.len(), 2);
        assert_eq!(recorder.physics.len(), 1);
        assert_eq!(recorder.physics[0].gravity.to_vector().y, -2.0);
        assert_eq!(recorder.music, vec![serde_json::json!({ "tempo": 96 })]);
    }

    #[test]
    fn nothing_applies_until_pumped() {
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        let (mut sim, _) = simulation();

        transport.deliver(physics_event(&universe, Vec3::ZERO));
        assert_eq!(channel.poll(), 1);
        assert_eq!(sim.world().unwrap().gravity(), Vec3::new(0.0, -9.81, 0.0));
        channel.apply_pending(&mut sim);
        assert_eq!(sim.world().unwrap().gravity(), Vec3::ZERO);
        assert!(channel.apply_pending(&mut sim).is_empty());
    }

    #[test]
    fn publish_is_fire_and_forget() {
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        channel.publish_physics(&PhysicsParameters::default());
        channel.publish(ParameterCategory::Music, serde_json::json!({ "key": "C" }));

        let sent = transport.drain_outbound();
        assert_eq!(sent.len(), 2);
        let first = ParameterUpdateEvent::decode(&sent[0]).unwrap();
        assert_eq!(first.universe_id, universe);
        assert_eq!(first.category, ParameterCategory::Physics);

        drop(transport);
        channel.publish_physics(&PhysicsParameters::default());
        assert_eq!(channel.stats().published, 2);
        assert_eq!(channel.stats().publish_failures, 1);
    }

    #[test]
    fn delivery_from_another_thread() {
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        let sender = transport.inbound();
        let raw = physics_event(&universe, Vec3::new(0.0, -3.0, 0.0));
        std::thread::spawn(move || sender.send(raw).unwrap())
            .join()
            .unwrap();
        let mut recorder = Recorder::default();
        assert_eq!(channel.pump(&mut recorder).len(), 1);
    }

    #[test]
    fn echo_of_local_edit_is_reapplied() {
        // No origin tag exists, so a client's own published edit comes back
        // as an ordinary update. Applying it again is harmless because the
        // bundle is a full replacement.
        let universe = UniverseId::new();
        let (mut channel, transport) = SyncChannel::connect(universe.clone());
        let (mut sim, _) = simulation();

        let mut params = sim.physics_parameters().unwrap();
        params.gravity = Gravity::Magnitude(1.0);
        sim.apply_physics_parameters(&params).unwrap();
        channel.publish_physics(&params);

        for raw in transport.drain_outbound() {
            transport.deliver(raw);
        }
        assert_eq!(channel.pump(&mut sim).len(), 1);
        assert_eq!(sim.world().unwrap().gravity(), Vec3::new(0.0, -1.0, 0.0));
    }
}
