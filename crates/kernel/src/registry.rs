//! Arena storage for live bodies.
//!
//! # Invariants
//! - Every live identifier maps to exactly one slot.
//! - A handle is only valid while its slot generation matches; removal bumps it.
//! - The registry is the only owner of body state. Removing a body drops its
//!   shape and material together.

use std::collections::BTreeMap;

use orrery_common::ObjectId;

use crate::body::LiveBody;

/// Opaque, generation-checked reference to a body slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    body: Option<LiveBody>,
}

/// Identifier-keyed arena of live bodies.
///
/// The id index is a BTreeMap so iteration (and therefore stepping and
/// position snapshots) follows a stable order.
#[derive(Debug, Default)]
pub struct BodyRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: BTreeMap<ObjectId, BodyHandle>,
}

impl BodyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Insert a body under its own id.
    ///
    /// If the id is already live the previous body is released first and
    /// returned, so the registry never holds two bodies for one id.
    pub fn insert(&mut self, body: LiveBody) -> (BodyHandle, Option<LiveBody>) {
        let replaced = self.remove(body.id());
        let id = body.id().clone();
        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.body = Some(body);
                BodyHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    body: Some(body),
                });
                BodyHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.by_id.insert(id, handle);
        (handle, replaced)
    }

    /// Remove a body by id. Absent ids return `None`.
    pub fn remove(&mut self, id: &ObjectId) -> Option<LiveBody> {
        let handle = self.by_id.remove(id)?;
        let slot = &mut self.slots[handle.index as usize];
        let body = slot.body.take();
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        body
    }

    /// Drop every body. Returns how many were released.
    pub fn clear(&mut self) -> usize {
        let count = self.by_id.len();
        self.by_id.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.body.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        count
    }

    pub fn handle(&self, id: &ObjectId) -> Option<BodyHandle> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, handle: BodyHandle) -> Option<&LiveBody> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.body.as_ref()
    }

    pub fn get_mut(&mut self, handle: BodyHandle) -> Option<&mut LiveBody> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.body.as_mut()
    }

    pub fn get_by_id(&self, id: &ObjectId) -> Option<&LiveBody> {
        self.get(self.handle(id)?)
    }

    pub fn get_by_id_mut(&mut self, id: &ObjectId) -> Option<&mut LiveBody> {
        let handle = self.handle(id)?;
        self.get_mut(handle)
    }

    /// Mutable access to two distinct bodies at once.
    pub fn pair_mut(
        &mut self,
        a: BodyHandle,
        b: BodyHandle,
    ) -> Option<(&mut LiveBody, &mut LiveBody)> {
        if a.index == b.index {
            return None;
        }
        let valid = |h: BodyHandle, slots: &[Slot]| {
            slots
                .get(h.index as usize)
                .is_some_and(|s| s.generation == h.generation && s.body.is_some())
        };
        if !valid(a, &self.slots) || !valid(b, &self.slots) {
            return None;
        }
        let (lo, hi, swapped) = if a.index < b.index {
            (a.index as usize, b.index as usize, false)
        } else {
            (b.index as usize, a.index as usize, true)
        };
        let (head, tail) = self.slots.split_at_mut(hi);
        let first = head[lo].body.as_mut()?;
        let second = tail[0].body.as_mut()?;
        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    /// Handles of all live bodies in id order.
    pub fn handles(&self) -> Vec<BodyHandle> {
        self.by_id.values().copied().collect()
    }

    /// Live bodies in id order.
    pub fn iter(&self) -> impl Iterator<Item = &LiveBody> + '_ {
        self.by_id.values().filter_map(|h| self.get(*h))
    }

    /// Mutable access to every live body, in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LiveBody> + '_ {
        self.slots.iter_mut().filter_map(|s| s.body.as_mut())
    }
}
