//! Entities and the slotmap-backed arena that owns them.

use crate::brain::{Brain, SensorFrame, SightReading};
use crate::collision::{Channel, RegistrationLedger, RegistryError, Role};
use crate::population::Genome;
use crate::pose::Pose;
use crate::NUM_EYES;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable handle for an entity slot in the arena.
    pub struct EntityId;
}

/// Every kind of object the world can hold. Collision dispatch and population
/// membership are both driven off this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Herbivore,
    Omnivore,
    Carnivore,
    Obstacle,
    Meat,
    Plant,
    EyeHitbox,
}

impl EntityKind {
    /// Kinds whose members are managed by a [`crate::Population`].
    pub const POPULATION_KINDS: [EntityKind; 3] = [
        EntityKind::Herbivore,
        EntityKind::Omnivore,
        EntityKind::Carnivore,
    ];

    /// Short wire/debug tag, stable across releases.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            EntityKind::Herbivore => "HERB",
            EntityKind::Omnivore => "OMN",
            EntityKind::Carnivore => "CARN",
            EntityKind::Obstacle => "OBST",
            EntityKind::Meat => "MEAT",
            EntityKind::Plant => "PLANT",
            EntityKind::EyeHitbox => "EHB",
        }
    }

    /// Parse a tag back into a kind. External callers (scenario files,
    /// scripting surfaces) go through this, so unknown tags are a recoverable
    /// error rather than a panic.
    pub fn from_tag(tag: &str) -> Result<Self, RegistryError> {
        match tag {
            "HERB" => Ok(EntityKind::Herbivore),
            "OMN" => Ok(EntityKind::Omnivore),
            "CARN" => Ok(EntityKind::Carnivore),
            "OBST" => Ok(EntityKind::Obstacle),
            "MEAT" => Ok(EntityKind::Meat),
            "PLANT" => Ok(EntityKind::Plant),
            "EHB" => Ok(EntityKind::EyeHitbox),
            other => Err(RegistryError::UnknownTypeTag(other.to_owned())),
        }
    }

    /// True for the three mobile, brain-driven kinds.
    #[must_use]
    pub const fn is_bug(self) -> bool {
        matches!(
            self,
            EntityKind::Herbivore | EntityKind::Omnivore | EntityKind::Carnivore
        )
    }

    /// True for kinds that hold edible energy.
    #[must_use]
    pub const fn is_food(self) -> bool {
        matches!(self, EntityKind::Plant | EntityKind::Meat)
    }

    /// Channel/role combinations this kind may register under.
    ///
    /// Bugs emit and detect physically and are visible to eye hitboxes.
    /// Passives only emit, on both channels. Eye hitboxes only look.
    #[must_use]
    pub const fn permits(self, channel: Channel, role: Role) -> bool {
        match self {
            EntityKind::Herbivore | EntityKind::Omnivore | EntityKind::Carnivore => matches!(
                (channel, role),
                (Channel::Physical, Role::Emitter)
                    | (Channel::Physical, Role::Detector)
                    | (Channel::Visual, Role::Emitter)
            ),
            EntityKind::Obstacle | EntityKind::Meat | EntityKind::Plant => matches!(
                (channel, role),
                (Channel::Physical, Role::Emitter) | (Channel::Visual, Role::Emitter)
            ),
            EntityKind::EyeHitbox => matches!((channel, role), (Channel::Visual, Role::Detector)),
        }
    }

    #[must_use]
    pub const fn has_population(self) -> bool {
        self.is_bug()
    }

    /// Section key used in the species configuration file.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            EntityKind::Herbivore => "herbivore",
            EntityKind::Omnivore => "omnivore",
            EntityKind::Carnivore => "carnivore",
            EntityKind::Obstacle => "obstacle",
            EntityKind::Meat => "meat",
            EntityKind::Plant => "plant",
            EntityKind::EyeHitbox => "eye_hitbox",
        }
    }

    /// One-letter prefix for generated entity names.
    #[must_use]
    pub const fn name_prefix(self) -> char {
        match self {
            EntityKind::Herbivore => 'H',
            EntityKind::Omnivore => 'O',
            EntityKind::Carnivore => 'C',
            EntityKind::Obstacle => 'B',
            EntityKind::Meat => 'M',
            EntityKind::Plant => 'P',
            EntityKind::EyeHitbox => 'E',
        }
    }

    /// Default display color, RGB in 0..=1.
    #[must_use]
    pub const fn base_color(self) -> [f32; 3] {
        match self {
            EntityKind::Herbivore => [0.0, 1.0, 0.0],
            EntityKind::Omnivore => [1.0, 0.647, 0.0],
            EntityKind::Carnivore => [1.0, 0.0, 0.0],
            EntityKind::Obstacle => [1.0, 1.0, 0.0],
            EntityKind::Meat => [0.627, 0.322, 0.176],
            EntityKind::Plant => [1.0, 0.0, 0.0],
            EntityKind::EyeHitbox => [0.5, 0.5, 0.5],
        }
    }
}

/// Which side of the body an eye hitbox sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EyeSide {
    Left,
    Right,
}

impl EyeSide {
    pub const ALL: [EyeSide; NUM_EYES] = [EyeSide::Left, EyeSide::Right];

    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            EyeSide::Left => "L",
            EyeSide::Right => "R",
        }
    }

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            EyeSide::Left => 0,
            EyeSide::Right => 1,
        }
    }

    /// Angular offset of the eye from the body heading, radians.
    #[must_use]
    pub fn mount_angle(self) -> f32 {
        let sweep = std::f32::consts::FRAC_PI_6;
        match self {
            EyeSide::Left => sweep,
            EyeSide::Right => -sweep,
        }
    }
}

/// Mutable per-agent state a bug carries on top of its body entity.
pub struct AgentState {
    pub energy: f32,
    pub score: f32,
    pub wheels: (f32, f32),
    sight: [Option<SightReading>; NUM_EYES],
    pub brain: Box<dyn Brain>,
}

impl std::fmt::Debug for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentState")
            .field("energy", &self.energy)
            .field("score", &self.score)
            .field("wheels", &self.wheels)
            .field("sight", &self.sight)
            .field("brain", &self.brain.kind())
            .finish()
    }
}

impl AgentState {
    #[must_use]
    pub fn new(energy: f32, brain: Box<dyn Brain>) -> Self {
        Self {
            energy,
            score: 0.0,
            wheels: (0.0, 0.0),
            sight: [None; NUM_EYES],
            brain,
        }
    }

    /// Store an eye reading, keeping only the nearest emitter per eye.
    pub fn record_sight(&mut self, side: EyeSide, reading: SightReading) {
        let slot = &mut self.sight[side.index()];
        match slot {
            Some(existing) if existing.dist_sqrd <= reading.dist_sqrd => {}
            _ => *slot = Some(reading),
        }
    }

    /// Assemble this tick's sensor frame and reset the sight buffer for the
    /// next detection pass.
    pub fn take_frame(&mut self, health: f32) -> SensorFrame {
        let eyes = std::mem::take(&mut self.sight);
        SensorFrame {
            eyes,
            health,
            energy: self.energy,
            wheels: self.wheels,
        }
    }
}

/// One object in the world. Bugs additionally carry an [`AgentState`] and a
/// genome; eye hitboxes carry an [`EyeSide`] and an owner link back to the
/// body they are mounted on.
#[derive(Debug)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    /// Pose relative to the owner, or the world pose for root entities.
    pub pose: Pose,
    /// World-frame pose, refreshed each tick after movement.
    pub abs_pose: Pose,
    pub radius: f32,
    pub health: f32,
    pub color: [f32; 3],
    pub owner: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub eye: Option<EyeSide>,
    pub agent: Option<AgentState>,
    pub genome: Option<Genome>,
    pub ledger: RegistrationLedger,
}

impl Entity {
    #[must_use]
    pub fn new(name: String, kind: EntityKind, pose: Pose, radius: f32, health: f32) -> Self {
        Self {
            name,
            kind,
            pose,
            abs_pose: pose,
            radius,
            health,
            color: kind.base_color(),
            owner: None,
            children: Vec::new(),
            eye: None,
            agent: None,
            genome: None,
            ledger: RegistrationLedger::default(),
        }
    }

    /// Evolutionary fitness of this entity, zero for non-agents.
    #[must_use]
    pub fn fitness(&self) -> f32 {
        self.agent.as_ref().map_or(0.0, |agent| agent.score)
    }
}

/// Slotmap arena plus a stable insertion-order index, so iteration order is
/// deterministic under a fixed seed.
#[derive(Debug, Default)]
pub struct EntityArena {
    slots: SlotMap<EntityId, Entity>,
    order: Vec<EntityId>,
}

impl EntityArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) -> EntityId {
        let id = self.slots.insert(entity);
        self.order.push(id);
        id
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let removed = self.slots.remove(id);
        if removed.is_some() {
            self.order.retain(|&slot| slot != id);
        }
        removed
    }

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.slots.get(id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.slots.get_mut(id)
    }

    /// Mutable access to two distinct entities at once.
    #[must_use]
    pub fn get_pair_mut(
        &mut self,
        a: EntityId,
        b: EntityId,
    ) -> Option<(&mut Entity, &mut Entity)> {
        let [first, second] = self.slots.get_disjoint_mut([a, b])?;
        Some((first, second))
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.slots.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Live handles in insertion order.
    pub fn iter_handles(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter().copied()
    }

    /// Snapshot of the handle list, for loops that mutate the arena.
    #[must_use]
    pub fn handles_snapshot(&self) -> Vec<EntityId> {
        self.order.clone()
    }

    /// Entities in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.order
            .iter()
            .filter_map(move |&id| self.slots.get(id).map(|entity| (id, entity)))
    }

    /// Walk owner links to the root body an attachment belongs to. Returns the
    /// input id for root entities. The hop cap guards against a corrupted
    /// ownership cycle.
    #[must_use]
    pub fn root_owner(&self, id: EntityId) -> EntityId {
        let mut current = id;
        for _ in 0..8 {
            match self.slots.get(current).and_then(|entity| entity.owner) {
                Some(owner) => current = owner,
                None => break,
            }
        }
        current
    }
}
