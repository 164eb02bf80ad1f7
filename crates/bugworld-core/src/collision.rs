//! Collision channels and the registration/detection machinery.
//!
//! Detection is deliberately split from reaction: [`CollisionGroup::detect`]
//! only reads the arena and collects [`Contact`] pairs, and the dispatch code
//! in [`crate::matrix`] applies the consequences afterwards. That keeps the
//! membership lists stable while a pass is being evaluated.

use crate::entity::{EntityArena, EntityId};
use crate::pose::distance_squared;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Recoverable misuse of the collision registry. These are logged and turned
/// into no-ops at the world surface rather than tearing the run down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown collision channel '{0}'")]
    UnknownChannel(String),
    #[error("unknown channel role '{0}'")]
    InvalidChannelRole(String),
    #[error("unknown entity type tag '{0}'")]
    UnknownTypeTag(String),
    #[error("kind '{kind}' may not register as a {channel} {role}")]
    ChannelNotPermitted {
        kind: &'static str,
        channel: &'static str,
        role: &'static str,
    },
}

/// The two sensing channels the world runs each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Body-on-body contact: feeding, combat, obstacle scrapes.
    Physical,
    /// Eye hitbox overlap: sight.
    Visual,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Physical, Channel::Visual];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Physical => "physical",
            Channel::Visual => "visual",
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Channel::Physical => 0,
            Channel::Visual => 1,
        }
    }
}

impl FromStr for Channel {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" => Ok(Channel::Physical),
            "visual" => Ok(Channel::Visual),
            other => Err(RegistryError::UnknownChannel(other.to_owned())),
        }
    }
}

/// Side of a channel an entity participates on. Detectors notice, emitters
/// are noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Emitter,
    Detector,
}

impl Role {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Role::Emitter => "emitter",
            Role::Detector => "detector",
        }
    }
}

impl FromStr for Role {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emitter" => Ok(Role::Emitter),
            "detector" => Ok(Role::Detector),
            other => Err(RegistryError::InvalidChannelRole(other.to_owned())),
        }
    }
}

/// One detected overlap, recorded before any reaction runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub detector: EntityId,
    pub emitter: EntityId,
    pub dist_sqrd: f32,
}

/// Per-entity record of every (channel, role) registration, replayed in
/// reverse on teardown so deregistration never misses a list.
#[derive(Debug, Default, Clone)]
pub struct RegistrationLedger {
    entries: Vec<(Channel, Role)>,
}

impl RegistrationLedger {
    pub fn record(&mut self, channel: Channel, role: Role) {
        self.entries.push((channel, role));
    }

    /// Drain all recorded registrations, most recent first.
    pub fn drain_reverse(&mut self) -> Vec<(Channel, Role)> {
        let mut entries = std::mem::take(&mut self.entries);
        entries.reverse();
        entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Membership lists for one channel.
#[derive(Debug, Default)]
pub struct CollisionGroup {
    emitters: Vec<EntityId>,
    detectors: Vec<EntityId>,
    enabled: bool,
}

impl CollisionGroup {
    #[must_use]
    pub fn new() -> Self {
        Self {
            emitters: Vec::new(),
            detectors: Vec::new(),
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn list_mut(&mut self, role: Role) -> &mut Vec<EntityId> {
        match role {
            Role::Emitter => &mut self.emitters,
            Role::Detector => &mut self.detectors,
        }
    }

    fn list(&self, role: Role) -> &[EntityId] {
        match role {
            Role::Emitter => &self.emitters,
            Role::Detector => &self.detectors,
        }
    }

    /// Add an entity to a role list. Re-registering is a no-op.
    pub fn register(&mut self, id: EntityId, role: Role) {
        let list = self.list_mut(role);
        if !list.contains(&id) {
            list.push(id);
        }
    }

    /// Remove an entity from a role list. Absent entries are a no-op, so
    /// teardown can be replayed safely.
    pub fn deregister(&mut self, id: EntityId, role: Role) {
        self.list_mut(role).retain(|&member| member != id);
    }

    #[must_use]
    pub fn contains(&self, id: EntityId, role: Role) -> bool {
        self.list(role).contains(&id)
    }

    #[must_use]
    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    #[must_use]
    pub fn detector_count(&self) -> usize {
        self.detectors.len()
    }

    /// Circle-overlap sweep of every detector against every emitter.
    ///
    /// Pairs sharing a root owner are skipped so an eye never sees its own
    /// body, and stale ids left by concurrent teardown are ignored.
    #[must_use]
    pub fn detect(&self, arena: &EntityArena) -> Vec<Contact> {
        if !self.enabled {
            return Vec::new();
        }
        let mut contacts = Vec::new();
        for &detector in &self.detectors {
            let Some(det) = arena.get(detector) else {
                continue;
            };
            for &emitter in &self.emitters {
                if detector == emitter {
                    continue;
                }
                let Some(emi) = arena.get(emitter) else {
                    continue;
                };
                if arena.root_owner(detector) == arena.root_owner(emitter) {
                    continue;
                }
                let dist_sqrd = distance_squared(det.abs_pose, emi.abs_pose);
                let reach = det.radius + emi.radius;
                if dist_sqrd < reach * reach {
                    debug!(
                        detector = %det.name,
                        emitter = %emi.name,
                        dist_sqrd,
                        "contact"
                    );
                    contacts.push(Contact {
                        detector,
                        emitter,
                        dist_sqrd,
                    });
                }
            }
        }
        contacts
    }
}

/// Contacts from one full detection pass, split per channel.
#[derive(Debug, Default)]
pub struct ChannelContacts {
    pub physical: Vec<Contact>,
    pub visual: Vec<Contact>,
}

/// Registry of all collision groups, one per [`Channel`].
#[derive(Debug)]
pub struct Collisions {
    groups: [CollisionGroup; 2],
}

impl Default for Collisions {
    fn default() -> Self {
        Self::new()
    }
}

impl Collisions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: [CollisionGroup::new(), CollisionGroup::new()],
        }
    }

    #[must_use]
    pub fn group(&self, channel: Channel) -> &CollisionGroup {
        &self.groups[channel.index()]
    }

    pub fn group_mut(&mut self, channel: Channel) -> &mut CollisionGroup {
        &mut self.groups[channel.index()]
    }

    /// Register an entity on a channel and record it in the entity's ledger so
    /// teardown can undo it.
    pub fn register(
        &mut self,
        id: EntityId,
        channel: Channel,
        role: Role,
        ledger: &mut RegistrationLedger,
    ) {
        self.group_mut(channel).register(id, role);
        ledger.record(channel, role);
    }

    /// Undo every registration in the ledger, most recent first. Running it a
    /// second time is a no-op since the ledger is drained.
    pub fn deregister_all(&mut self, id: EntityId, ledger: &mut RegistrationLedger) {
        for (channel, role) in ledger.drain_reverse() {
            self.group_mut(channel).deregister(id, role);
        }
    }

    /// Run detection on every enabled channel.
    #[must_use]
    pub fn detect_all(&self, arena: &EntityArena) -> ChannelContacts {
        ChannelContacts {
            physical: self.group(Channel::Physical).detect(arena),
            visual: self.group(Channel::Visual).detect(arena),
        }
    }

    pub fn set_enabled(&mut self, channel: Channel, enabled: bool) {
        self.group_mut(channel).set_enabled(enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityKind};
    use crate::pose::Pose;

    fn body(arena: &mut EntityArena, name: &str, x: f32, y: f32, radius: f32) -> EntityId {
        arena.insert(Entity::new(
            name.to_owned(),
            EntityKind::Herbivore,
            Pose::new(x, y, 0.0),
            radius,
            100.0,
        ))
    }

    #[test]
    fn channel_and_role_parse() {
        assert_eq!("physical".parse::<Channel>().unwrap(), Channel::Physical);
        assert_eq!("detector".parse::<Role>().unwrap(), Role::Detector);
        assert!(matches!(
            "auditory".parse::<Channel>(),
            Err(RegistryError::UnknownChannel(_))
        ));
        assert!(matches!(
            "observer".parse::<Role>(),
            Err(RegistryError::InvalidChannelRole(_))
        ));
    }

    #[test]
    fn detect_reports_overlapping_pairs_once() {
        let mut arena = EntityArena::new();
        let a = body(&mut arena, "H-0", 0.0, 0.0, 10.0);
        let b = body(&mut arena, "H-1", 15.0, 0.0, 10.0);
        let far = body(&mut arena, "H-2", 500.0, 0.0, 10.0);

        let mut group = CollisionGroup::new();
        group.register(a, Role::Detector);
        group.register(b, Role::Emitter);
        group.register(far, Role::Emitter);

        let contacts = group.detect(&arena);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].detector, a);
        assert_eq!(contacts[0].emitter, b);
        assert!((contacts[0].dist_sqrd - 225.0).abs() < 1e-3);
    }

    #[test]
    fn detect_skips_shared_owner() {
        let mut arena = EntityArena::new();
        let bug = body(&mut arena, "H-0", 0.0, 0.0, 10.0);
        let mut eye = Entity::new(
            "H-0-eye".to_owned(),
            EntityKind::EyeHitbox,
            Pose::new(1.0, 0.0, 0.0),
            25.0,
            1.0,
        );
        eye.owner = Some(bug);
        let eye = arena.insert(eye);

        let mut group = CollisionGroup::new();
        group.register(eye, Role::Detector);
        group.register(bug, Role::Emitter);
        assert!(group.detect(&arena).is_empty());
    }

    #[test]
    fn disabled_group_detects_nothing() {
        let mut arena = EntityArena::new();
        let a = body(&mut arena, "H-0", 0.0, 0.0, 10.0);
        let b = body(&mut arena, "H-1", 5.0, 0.0, 10.0);
        let mut group = CollisionGroup::new();
        group.register(a, Role::Detector);
        group.register(b, Role::Emitter);
        group.set_enabled(false);
        assert!(group.detect(&arena).is_empty());
    }

    #[test]
    fn double_registration_is_single_membership() {
        let mut arena = EntityArena::new();
        let a = body(&mut arena, "H-0", 0.0, 0.0, 10.0);
        let mut group = CollisionGroup::new();
        group.register(a, Role::Emitter);
        group.register(a, Role::Emitter);
        assert_eq!(group.emitter_count(), 1);
        group.deregister(a, Role::Emitter);
        assert_eq!(group.emitter_count(), 0);
        // deregistering again must stay a no-op
        group.deregister(a, Role::Emitter);
        assert_eq!(group.emitter_count(), 0);
    }

    #[test]
    fn ledger_replay_clears_all_memberships() {
        let mut arena = EntityArena::new();
        let a = body(&mut arena, "H-0", 0.0, 0.0, 10.0);
        let entity = arena.get_mut(a).unwrap();
        let mut ledger = std::mem::take(&mut entity.ledger);

        let mut collisions = Collisions::new();
        collisions.register(a, Channel::Physical, Role::Emitter, &mut ledger);
        collisions.register(a, Channel::Physical, Role::Detector, &mut ledger);
        collisions.register(a, Channel::Visual, Role::Emitter, &mut ledger);

        collisions.deregister_all(a, &mut ledger);
        assert!(!collisions.group(Channel::Physical).contains(a, Role::Emitter));
        assert!(!collisions.group(Channel::Physical).contains(a, Role::Detector));
        assert!(!collisions.group(Channel::Visual).contains(a, Role::Emitter));
        assert!(ledger.is_empty());

        // second teardown pass finds an empty ledger and does nothing
        collisions.deregister_all(a, &mut ledger);
    }

}
