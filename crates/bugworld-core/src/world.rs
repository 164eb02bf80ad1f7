//! World orchestration: entity lifecycle and the per-tick pipeline.
//!
//! A tick runs in fixed stages: movement, detection, physical and visual
//! dispatch, the death sweep, then reproduction when the countdown lands.
//! Detection snapshots contacts before any reaction mutates the arena, and
//! the sweep collects the dead before tearing anything down, so no stage
//! ever removes entities from a list it is iterating.

use crate::brain::{Brain, BrainFactory, WanderBrain};
use crate::collision::{Channel, Collisions, RegistryError, Role};
use crate::config::{ConfigError, SpeciesLibrary, WorldConfig};
use crate::entity::{AgentState, Entity, EntityArena, EntityId, EntityKind, EyeSide};
use crate::matrix::{apply_physical, apply_visual, FoodLedger};
use crate::population::{Genome, PopulationRegistry};
use crate::pose::Pose;
use crate::Tick;
use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use tracing::{debug, info, warn};

/// Ratio of eye hitbox radius to body radius.
const EYE_RADIUS_SCALE: f32 = 2.5;

/// Point-in-time summary of what the world holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Census {
    pub tick: u64,
    pub bugs: usize,
    pub plants: usize,
    pub meat: usize,
    pub obstacles: usize,
    pub plant_food: f32,
    pub meat_food: f32,
    pub births: u64,
    pub deaths: u64,
}

/// The arena simulation. Owns every entity, the collision registry, and the
/// species populations.
pub struct World {
    config: WorldConfig,
    rng: SmallRng,
    arena: EntityArena,
    collisions: Collisions,
    populations: PopulationRegistry,
    ledger: FoodLedger,
    brain_factory: Option<Box<dyn BrainFactory>>,
    tick: Tick,
    reproduction_countdown: u64,
    spawn_counter: u64,
    births: u64,
    deaths: u64,
}

impl World {
    /// Build a world and seed it with the configured starting entities.
    pub fn new(config: WorldConfig, library: &SpeciesLibrary) -> Result<Self, ConfigError> {
        config.validate()?;
        library.validate()?;
        let rng = config.seeded_rng();
        let populations = PopulationRegistry::new(library)?;
        let reproduction_countdown = config.reproduction_interval;
        let mut world = Self {
            config,
            rng,
            arena: EntityArena::new(),
            collisions: Collisions::new(),
            populations,
            ledger: FoodLedger::default(),
            brain_factory: None,
            tick: Tick::zero(),
            reproduction_countdown,
            spawn_counter: 0,
            births: 0,
            deaths: 0,
        };
        world.seed_initial_entities();
        Ok(world)
    }

    /// Install the controller factory used for every bug spawned from here
    /// on. Without one, bugs fall back to [`WanderBrain`].
    pub fn set_brain_factory(&mut self, factory: Box<dyn BrainFactory>) {
        self.brain_factory = Some(factory);
    }

    fn seed_initial_entities(&mut self) {
        let counts = [
            (EntityKind::Obstacle, self.config.num_obstacles),
            (EntityKind::Plant, self.config.num_plants),
            (EntityKind::Meat, self.config.num_meat),
            (EntityKind::Herbivore, self.config.num_herbivores),
            (EntityKind::Omnivore, self.config.num_omnivores),
            (EntityKind::Carnivore, self.config.num_carnivores),
        ];
        for (kind, count) in counts {
            for _ in 0..count {
                let pose = self.random_pose();
                self.spawn(kind, pose, None, None);
            }
        }
        info!(entities = self.arena.len(), "world seeded");
    }

    fn random_pose(&mut self) -> Pose {
        Pose::new(
            self.rng.random_range(0.0..self.config.width),
            self.rng.random_range(0.0..self.config.height),
            self.rng.random_range(0.0..TAU),
        )
    }

    fn next_name(&mut self, kind: EntityKind) -> String {
        let serial = self.spawn_counter;
        self.spawn_counter += 1;
        format!("{}-{serial}", kind.name_prefix())
    }

    /// Spawn an entity of the given kind at a pose.
    ///
    /// Eye hitboxes cannot be spawned directly; they are created alongside
    /// their body. Passing a genome for a passive kind is logged and the
    /// genome dropped.
    pub fn spawn(
        &mut self,
        kind: EntityKind,
        pose: Pose,
        name: Option<String>,
        genome: Option<Genome>,
    ) -> Option<EntityId> {
        match kind {
            EntityKind::EyeHitbox => {
                warn!("eye hitboxes are spawned with their body, ignoring");
                None
            }
            kind if kind.is_bug() => self.spawn_bug(kind, pose, name, genome),
            kind => {
                if genome.is_some() {
                    warn!(kind = kind.tag(), "genome supplied for a passive kind, dropped");
                }
                Some(self.spawn_passive(kind, pose, name))
            }
        }
    }

    /// Spawn by string type tag, for external callers. Unknown tags fail
    /// without side effects.
    pub fn spawn_by_tag(
        &mut self,
        tag: &str,
        pose: Pose,
        name: Option<String>,
        genome: Option<Genome>,
    ) -> Result<Option<EntityId>, RegistryError> {
        let kind = EntityKind::from_tag(tag)?;
        Ok(self.spawn(kind, pose, name, genome))
    }

    fn spawn_bug(
        &mut self,
        kind: EntityKind,
        pose: Pose,
        name: Option<String>,
        genome: Option<Genome>,
    ) -> Option<EntityId> {
        let name = name.unwrap_or_else(|| self.next_name(kind));
        let genome = match genome {
            Some(genome) => genome,
            None => self.populations.fresh_genome(kind, &mut self.rng)?,
        };
        let brain: Box<dyn Brain> = match self.brain_factory.as_ref() {
            Some(factory) => factory.build(&genome),
            None => Box::new(WanderBrain::new(self.rng.random())),
        };

        let mut entity = Entity::new(
            name,
            kind,
            pose,
            self.config.bug_radius,
            self.config.bug_health,
        );
        entity.agent = Some(AgentState::new(self.config.bug_energy, brain));
        entity.genome = Some(genome);
        let id = self.arena.insert(entity);

        self.register(id, Channel::Physical, Role::Emitter);
        self.register(id, Channel::Physical, Role::Detector);
        self.register(id, Channel::Visual, Role::Emitter);
        self.populations.register(kind, id);
        for side in EyeSide::ALL {
            self.spawn_eye(id, side);
        }
        debug!(id = ?id, kind = kind.tag(), "bug spawned");
        self.births += 1;
        Some(id)
    }

    /// Mount one eye hitbox on a body: angled off the heading, pushed far
    /// enough forward that it never overlaps the body itself.
    fn spawn_eye(&mut self, body: EntityId, side: EyeSide) {
        let Some(body_entity) = self.arena.get(body) else {
            warn!(?body, "eye mount target missing");
            return;
        };
        let body_radius = body_entity.radius;
        let body_abs = body_entity.abs_pose;
        let body_name = body_entity.name.clone();

        let hitbox_radius = body_radius * EYE_RADIUS_SCALE;
        let reach = body_radius + hitbox_radius + 1.0;
        let mount = Pose::new(0.0, 0.0, side.mount_angle());
        let local = mount.compose(Pose::new(reach, 0.0, 0.0));

        let mut eye = Entity::new(
            format!("{body_name}-eye-{}", side.tag()),
            EntityKind::EyeHitbox,
            local,
            hitbox_radius,
            1.0,
        );
        eye.owner = Some(body);
        eye.eye = Some(side);
        eye.abs_pose = body_abs.compose(local);
        let eye_id = self.arena.insert(eye);

        self.register(eye_id, Channel::Visual, Role::Detector);
        if let Some(body_entity) = self.arena.get_mut(body) {
            body_entity.children.push(eye_id);
        }
    }

    fn spawn_passive(&mut self, kind: EntityKind, pose: Pose, name: Option<String>) -> EntityId {
        let name = name.unwrap_or_else(|| self.next_name(kind));
        let (radius, health) = match kind {
            EntityKind::Plant => (self.config.plant_radius, self.config.plant_health),
            EntityKind::Meat => (self.config.meat_radius, self.config.meat_health),
            _ => (self.config.obstacle_radius, self.config.obstacle_health),
        };
        let id = self.arena.insert(Entity::new(name, kind, pose, radius, health));
        self.register(id, Channel::Physical, Role::Emitter);
        self.register(id, Channel::Visual, Role::Emitter);
        if kind.is_food() {
            self.ledger.credit(kind, health);
        }
        id
    }

    fn register(&mut self, id: EntityId, channel: Channel, role: Role) {
        if let Some(entity) = self.arena.get_mut(id) {
            self.collisions.register(id, channel, role, &mut entity.ledger);
        }
    }

    /// Register an existing entity on a channel by name. Unknown channel or
    /// role names, and combinations the entity's kind is not allowed to hold,
    /// are logged and ignored.
    pub fn register_entity(&mut self, id: EntityId, channel: &str, role: &str) {
        if let Err(err) = self.try_register_entity(id, channel, role) {
            warn!(%err, ?id, "collision registration rejected");
        }
    }

    fn try_register_entity(
        &mut self,
        id: EntityId,
        channel: &str,
        role: &str,
    ) -> Result<(), RegistryError> {
        let channel: Channel = channel.parse()?;
        let role: Role = role.parse()?;
        let Some(entity) = self.arena.get_mut(id) else {
            warn!(?id, "registration target missing");
            return Ok(());
        };
        if !entity.kind.permits(channel, role) {
            return Err(RegistryError::ChannelNotPermitted {
                kind: entity.kind.tag(),
                channel: channel.name(),
                role: role.name(),
            });
        }
        self.collisions.register(id, channel, role, &mut entity.ledger);
        Ok(())
    }

    /// Remove an entity and everything mounted on it. Calling this on an
    /// already-removed id is a no-op.
    pub fn teardown(&mut self, id: EntityId) {
        let Some(entity) = self.arena.get(id) else {
            return;
        };
        let children = entity.children.clone();
        for child in children {
            self.teardown(child);
        }

        if let Some(entity) = self.arena.get_mut(id) {
            self.collisions.deregister_all(id, &mut entity.ledger);
        }
        if let Some(removed) = self.arena.remove(id) {
            if removed.kind.has_population() {
                self.populations.deregister(removed.kind, id);
            }
            if removed.kind.is_food() {
                self.ledger.debit(removed.kind, removed.health);
            }
            debug!(name = %removed.name, "entity torn down");
        }
    }

    /// Advance the simulation one tick.
    pub fn tick(&mut self) {
        self.stage_update();
        let contacts = self.collisions.detect_all(&self.arena);
        apply_physical(
            &mut self.arena,
            &mut self.ledger,
            &contacts.physical,
            &self.config,
        );
        apply_visual(&mut self.arena, &contacts.visual);
        self.stage_sweep();
        self.stage_reproduction();
        self.tick = self.tick.next();
    }

    /// Run sense, think, and move for every root entity, then refresh the
    /// world-frame poses of attachments.
    fn stage_update(&mut self) {
        for id in self.arena.handles_snapshot() {
            let Some(entity) = self.arena.get_mut(id) else {
                continue;
            };
            if entity.owner.is_some() {
                continue;
            }
            let radius = entity.radius;
            let health = entity.health;
            if let Some(agent) = entity.agent.as_mut() {
                let frame = agent.take_frame(health);
                agent.brain.observe(&frame);
                let wheels = agent.brain.decide();
                agent.wheels = wheels;
                agent.score += self.config.survival_tick_score;
                entity
                    .pose
                    .drive(wheels.0, wheels.1, radius * 0.5, radius * 2.0);
                entity.pose.apply_bounds(
                    self.config.width,
                    self.config.height,
                    self.config.boundary_wrap,
                );
            }
            entity.abs_pose = entity.pose;
            self.propagate_children(id);
        }
    }

    fn propagate_children(&mut self, root: EntityId) {
        let mut stack = vec![root];
        while let Some(parent) = stack.pop() {
            let Some(parent_entity) = self.arena.get(parent) else {
                continue;
            };
            let parent_abs = parent_entity.abs_pose;
            for child in parent_entity.children.clone() {
                if let Some(child_entity) = self.arena.get_mut(child) {
                    child_entity.abs_pose = parent_abs.compose(child_entity.pose);
                    stack.push(child);
                }
            }
        }
    }

    /// Collect everything that died this tick, then tear it down. Dead bugs
    /// leave a carcass behind at their last position.
    fn stage_sweep(&mut self) {
        let mut carcasses: Vec<(EntityId, Pose, String)> = Vec::new();
        let mut expired: Vec<EntityId> = Vec::new();
        for (id, entity) in self.arena.iter() {
            if entity.health > 0.0 {
                continue;
            }
            if entity.kind.is_bug() {
                carcasses.push((id, entity.abs_pose, entity.name.clone()));
            } else if entity.kind != EntityKind::EyeHitbox {
                expired.push(id);
            }
        }
        for id in expired {
            self.teardown(id);
        }
        for (id, pose, name) in carcasses {
            self.teardown(id);
            self.deaths += 1;
            self.spawn_passive(EntityKind::Meat, pose, Some(format!("M-{name}")));
        }
    }

    /// Count the countdown and, when it lands, run a reproduction pass for
    /// every population and reconcile the diffs against the arena.
    fn stage_reproduction(&mut self) {
        self.reproduction_countdown = self.reproduction_countdown.saturating_sub(1);
        if self.reproduction_countdown > 0 {
            return;
        }
        self.reproduction_countdown = self.config.reproduction_interval;

        self.populations.mark_all_due();
        let diffs = self.populations.reproduce_all(&self.arena, &mut self.rng);
        for diff in diffs {
            let Some(species) = diff.species else {
                continue;
            };
            for id in diff.to_remove {
                self.teardown(id);
                self.deaths += 1;
            }
            for genome in diff.to_add {
                let pose = self.random_pose();
                self.spawn(species, pose, None, Some(genome));
            }
            for id in diff.survivors {
                if let Some(agent) = self
                    .arena
                    .get_mut(id)
                    .and_then(|entity| entity.agent.as_mut())
                {
                    agent.score = 0.0;
                }
            }
        }
        self.populations.settle_all();
        self.restock_plants();
    }

    /// Top the plant supply back up to the configured level, one whole plant
    /// at a time.
    fn restock_plants(&mut self) {
        let target = self.config.num_plants as f32 * self.config.plant_health;
        let deficit = target - self.ledger.plant;
        let restock = (deficit / self.config.plant_health).floor() as usize;
        for _ in 0..restock {
            let pose = self.random_pose();
            self.spawn_passive(EntityKind::Plant, pose, None);
        }
        if restock > 0 {
            info!(restock, plant_food = self.ledger.plant, "plants restocked");
        }
    }

    #[must_use]
    pub fn census(&self) -> Census {
        let mut census = Census {
            tick: self.tick.0,
            bugs: 0,
            plants: 0,
            meat: 0,
            obstacles: 0,
            plant_food: self.ledger.plant,
            meat_food: self.ledger.meat,
            births: self.births,
            deaths: self.deaths,
        };
        for (_, entity) in self.arena.iter() {
            match entity.kind {
                kind if kind.is_bug() => census.bugs += 1,
                EntityKind::Plant => census.plants += 1,
                EntityKind::Meat => census.meat += 1,
                EntityKind::Obstacle => census.obstacles += 1,
                _ => {}
            }
        }
        census
    }

    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    #[must_use]
    pub fn arena(&self) -> &EntityArena {
        &self.arena
    }

    /// Read-only walk over every live entity, in insertion order. This is
    /// the boundary a renderer draws from.
    pub fn for_each_entity(&self, mut visitor: impl FnMut(EntityId, &Entity)) {
        for (id, entity) in self.arena.iter() {
            visitor(id, entity);
        }
    }

    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.arena.get(id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.arena.get_mut(id)
    }

    #[must_use]
    pub fn collisions(&self) -> &Collisions {
        &self.collisions
    }

    pub fn collisions_mut(&mut self) -> &mut Collisions {
        &mut self.collisions
    }

    #[must_use]
    pub fn populations(&self) -> &PopulationRegistry {
        &self.populations
    }

    pub fn populations_mut(&mut self) -> &mut PopulationRegistry {
        &mut self.populations
    }

    #[must_use]
    pub fn food_ledger(&self) -> &FoodLedger {
        &self.ledger
    }
}
