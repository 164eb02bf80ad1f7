//! The interaction matrix: what happens when a contact fires.
//!
//! Rules are resolved purely from the (detector kind, emitter kind) pair, so
//! adding a species means adding match arms here rather than scattering
//! callbacks around the codebase.

use crate::brain::SightReading;
use crate::collision::Contact;
use crate::config::WorldConfig;
use crate::entity::{EntityArena, EntityKind};
use crate::pose::distance_squared;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of a physical-channel contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhysicalRule {
    /// Pair has no physical consequence.
    Ignore,
    /// Detector bites the emitter: predation or rivalry.
    MaulEmitter { damage: f32 },
    /// Both sides take damage, possibly asymmetrically.
    Skirmish {
        detector_damage: f32,
        emitter_damage: f32,
    },
    /// Detector feeds on the emitter, transferring health into energy.
    Graze { bite: f32 },
    /// Detector takes damage from a hazard.
    Scrape { damage: f32 },
}

/// Outcome of a visual-channel contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualRule {
    Ignore,
    Sight,
}

/// Resolve the physical reaction for a (detector, emitter) kind pair.
#[must_use]
pub fn physical_rule(
    detector: EntityKind,
    emitter: EntityKind,
    config: &WorldConfig,
) -> PhysicalRule {
    use EntityKind::{Carnivore, Herbivore, Meat, Obstacle, Omnivore, Plant};
    match (detector, emitter) {
        // predators nip herbivores on contact
        (Omnivore | Carnivore, Herbivore) => PhysicalRule::MaulEmitter {
            damage: config.predator_damage,
        },
        // carnivores overpower omnivores, taking a scratch back
        (Carnivore, Omnivore) => PhysicalRule::Skirmish {
            detector_damage: 5.0,
            emitter_damage: 20.0,
        },
        // an omnivore bumping a carnivore is an even exchange
        (Omnivore, Carnivore) => PhysicalRule::Skirmish {
            detector_damage: 5.0,
            emitter_damage: 5.0,
        },
        // two carnivores fight over territory
        (Carnivore, Carnivore) => PhysicalRule::MaulEmitter {
            damage: config.rivalry_damage,
        },
        // feeding, gated on diet
        (Herbivore | Omnivore, Plant) | (Carnivore | Omnivore, Meat) => PhysicalRule::Graze {
            bite: config.graze_bite,
        },
        (kind, Obstacle) if kind.is_bug() => PhysicalRule::Scrape {
            damage: config.obstacle_damage,
        },
        _ => PhysicalRule::Ignore,
    }
}

/// Resolve the visual reaction for a (detector, emitter) kind pair. Only eye
/// hitboxes detect, and obstacles do not register on the retina.
#[must_use]
pub fn visual_rule(detector: EntityKind, emitter: EntityKind) -> VisualRule {
    match (detector, emitter) {
        (EntityKind::EyeHitbox, kind)
            if kind.is_bug() || kind == EntityKind::Plant || kind == EntityKind::Meat =>
        {
            VisualRule::Sight
        }
        _ => VisualRule::Ignore,
    }
}

/// Running total of edible health present in the world, kept in lock-step
/// with graze consumption and spawn/teardown of food entities.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FoodLedger {
    pub plant: f32,
    pub meat: f32,
}

impl FoodLedger {
    pub fn credit(&mut self, kind: EntityKind, amount: f32) {
        match kind {
            EntityKind::Plant => self.plant += amount,
            EntityKind::Meat => self.meat += amount,
            _ => {}
        }
    }

    pub fn debit(&mut self, kind: EntityKind, amount: f32) {
        match kind {
            EntityKind::Plant => self.plant = (self.plant - amount).max(0.0),
            EntityKind::Meat => self.meat = (self.meat - amount).max(0.0),
            _ => {}
        }
    }

    #[must_use]
    pub fn total(&self) -> f32 {
        self.plant + self.meat
    }
}

/// Apply every physical contact collected this tick.
///
/// Contacts referencing entities that vanished mid-pass are logged and
/// skipped; the detection snapshot is allowed to go slightly stale.
pub fn apply_physical(
    arena: &mut EntityArena,
    ledger: &mut FoodLedger,
    contacts: &[Contact],
    config: &WorldConfig,
) {
    for contact in contacts {
        let (Some(det), Some(emi)) = (arena.get(contact.detector), arena.get(contact.emitter))
        else {
            warn!(?contact, "physical contact references a missing entity");
            continue;
        };
        let rule = physical_rule(det.kind, emi.kind, config);
        match rule {
            PhysicalRule::Ignore => {
                debug!(detector = %det.name, emitter = %emi.name, "contact ignored");
            }
            PhysicalRule::MaulEmitter { damage } => {
                if let Some(emitter) = arena.get_mut(contact.emitter) {
                    emitter.health = (emitter.health - damage).max(0.0);
                }
            }
            PhysicalRule::Skirmish {
                detector_damage,
                emitter_damage,
            } => {
                if let Some((det, emi)) = arena.get_pair_mut(contact.detector, contact.emitter) {
                    det.health = (det.health - detector_damage).max(0.0);
                    emi.health = (emi.health - emitter_damage).max(0.0);
                }
            }
            PhysicalRule::Graze { bite } => {
                let Some((eater, food)) = arena.get_pair_mut(contact.detector, contact.emitter)
                else {
                    continue;
                };
                let consumed = bite.min(food.health);
                if consumed <= 0.0 {
                    continue;
                }
                food.health -= consumed;
                if food.radius > 1.0 {
                    food.radius -= 1.0;
                }
                if let Some(agent) = eater.agent.as_mut() {
                    agent.energy += consumed;
                    agent.score += consumed;
                } else {
                    warn!(name = %eater.name, "grazing entity has no agent state");
                }
                ledger.debit(food.kind, consumed);
            }
            PhysicalRule::Scrape { damage } => {
                if let Some(detector) = arena.get_mut(contact.detector) {
                    detector.health = (detector.health - damage).max(0.0);
                }
            }
        }
    }
}

/// Apply every visual contact: flash the hitbox with the emitter's color
/// and route the sighting to the owning agent's sensor buffer, keeping the
/// nearest emitter per eye.
pub fn apply_visual(arena: &mut EntityArena, contacts: &[Contact]) {
    for contact in contacts {
        let (Some(hitbox), Some(emitter)) =
            (arena.get(contact.detector), arena.get(contact.emitter))
        else {
            warn!(?contact, "visual contact references a missing entity");
            continue;
        };
        if visual_rule(hitbox.kind, emitter.kind) != VisualRule::Sight {
            debug!(detector = %hitbox.name, emitter = %emitter.name, "sighting ignored");
            continue;
        }
        let Some(side) = hitbox.eye else {
            warn!(name = %hitbox.name, "eye hitbox missing its side marker");
            continue;
        };
        let seen_color = emitter.color;
        let emitter_pose = emitter.abs_pose;
        let owner = arena.root_owner(contact.detector);
        if let Some(hitbox) = arena.get_mut(contact.detector) {
            hitbox.color = seen_color;
        }
        let Some(body) = arena.get_mut(owner) else {
            warn!(?contact, "sighting hitbox has no live owner");
            continue;
        };
        let dist_sqrd = distance_squared(body.abs_pose, emitter_pose);
        if let Some(agent) = body.agent.as_mut() {
            agent.record_sight(
                side,
                SightReading {
                    color: seen_color,
                    dist_sqrd,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::WanderBrain;
    use crate::entity::{AgentState, Entity, EntityId, EyeSide};
    use crate::pose::Pose;

    fn config() -> WorldConfig {
        WorldConfig::default()
    }

    fn spawn(
        arena: &mut EntityArena,
        kind: EntityKind,
        x: f32,
        health: f32,
    ) -> EntityId {
        let mut entity = Entity::new(
            format!("{}-{}", kind.name_prefix(), arena.len()),
            kind,
            Pose::new(x, 0.0, 0.0),
            10.0,
            health,
        );
        if kind.is_bug() {
            entity.agent = Some(AgentState::new(100.0, Box::new(WanderBrain::new(0))));
        }
        arena.insert(entity)
    }

    #[test]
    fn predation_damages_only_the_prey() {
        let cfg = config();
        assert_eq!(
            physical_rule(EntityKind::Carnivore, EntityKind::Herbivore, &cfg),
            PhysicalRule::MaulEmitter { damage: 1.0 }
        );
        assert_eq!(
            physical_rule(EntityKind::Herbivore, EntityKind::Carnivore, &cfg),
            PhysicalRule::Ignore
        );
    }

    #[test]
    fn brawl_rules_are_asymmetric() {
        let cfg = config();
        assert_eq!(
            physical_rule(EntityKind::Carnivore, EntityKind::Omnivore, &cfg),
            PhysicalRule::Skirmish {
                detector_damage: 5.0,
                emitter_damage: 20.0
            }
        );
        assert_eq!(
            physical_rule(EntityKind::Omnivore, EntityKind::Carnivore, &cfg),
            PhysicalRule::Skirmish {
                detector_damage: 5.0,
                emitter_damage: 5.0
            }
        );
    }

    #[test]
    fn diet_gates_grazing() {
        let cfg = config();
        assert_eq!(
            physical_rule(EntityKind::Herbivore, EntityKind::Plant, &cfg),
            PhysicalRule::Graze { bite: 10.0 }
        );
        assert_eq!(
            physical_rule(EntityKind::Carnivore, EntityKind::Plant, &cfg),
            PhysicalRule::Ignore
        );
        assert_eq!(
            physical_rule(EntityKind::Herbivore, EntityKind::Meat, &cfg),
            PhysicalRule::Ignore
        );
        assert_eq!(
            physical_rule(EntityKind::Omnivore, EntityKind::Meat, &cfg),
            PhysicalRule::Graze { bite: 10.0 }
        );
    }

    #[test]
    fn same_species_herbivores_ignore_each_other() {
        let cfg = config();
        assert_eq!(
            physical_rule(EntityKind::Herbivore, EntityKind::Herbivore, &cfg),
            PhysicalRule::Ignore
        );
        assert_eq!(
            physical_rule(EntityKind::Carnivore, EntityKind::Carnivore, &cfg),
            PhysicalRule::MaulEmitter { damage: 5.0 }
        );
    }

    #[test]
    fn obstacles_are_invisible_but_solid() {
        assert_eq!(
            visual_rule(EntityKind::EyeHitbox, EntityKind::Obstacle),
            VisualRule::Ignore
        );
        assert_eq!(
            visual_rule(EntityKind::EyeHitbox, EntityKind::Plant),
            VisualRule::Sight
        );
        let cfg = config();
        assert_eq!(
            physical_rule(EntityKind::Herbivore, EntityKind::Obstacle, &cfg),
            PhysicalRule::Scrape { damage: 1.0 }
        );
    }

    #[test]
    fn graze_transfers_health_into_energy_and_ledger() {
        let cfg = config();
        let mut arena = EntityArena::new();
        let herb = spawn(&mut arena, EntityKind::Herbivore, 0.0, 100.0);
        let plant = spawn(&mut arena, EntityKind::Plant, 5.0, 100.0);
        let mut ledger = FoodLedger::default();
        ledger.credit(EntityKind::Plant, 100.0);

        let contacts = [Contact {
            detector: herb,
            emitter: plant,
            dist_sqrd: 25.0,
        }];
        apply_physical(&mut arena, &mut ledger, &contacts, &cfg);

        let plant_entity = arena.get(plant).unwrap();
        assert_eq!(plant_entity.health, 90.0);
        assert_eq!(plant_entity.radius, 9.0);
        let agent = arena.get(herb).unwrap().agent.as_ref().unwrap();
        assert_eq!(agent.energy, 110.0);
        assert_eq!(agent.score, 10.0);
        assert_eq!(ledger.plant, 90.0);
    }

    #[test]
    fn graze_bite_is_capped_by_remaining_health() {
        let cfg = config();
        let mut arena = EntityArena::new();
        let herb = spawn(&mut arena, EntityKind::Herbivore, 0.0, 100.0);
        let plant = spawn(&mut arena, EntityKind::Plant, 5.0, 4.0);
        let mut ledger = FoodLedger::default();
        ledger.credit(EntityKind::Plant, 4.0);

        let contacts = [Contact {
            detector: herb,
            emitter: plant,
            dist_sqrd: 25.0,
        }];
        apply_physical(&mut arena, &mut ledger, &contacts, &cfg);

        assert_eq!(arena.get(plant).unwrap().health, 0.0);
        let agent = arena.get(herb).unwrap().agent.as_ref().unwrap();
        assert_eq!(agent.energy, 104.0);
        assert_eq!(ledger.plant, 0.0);
    }

    #[test]
    fn stale_contact_is_skipped() {
        let cfg = config();
        let mut arena = EntityArena::new();
        let herb = spawn(&mut arena, EntityKind::Herbivore, 0.0, 100.0);
        let plant = spawn(&mut arena, EntityKind::Plant, 5.0, 100.0);
        let contacts = [Contact {
            detector: herb,
            emitter: plant,
            dist_sqrd: 25.0,
        }];
        arena.remove(plant);
        let mut ledger = FoodLedger::default();
        apply_physical(&mut arena, &mut ledger, &contacts, &cfg);
        let agent = arena.get(herb).unwrap().agent.as_ref().unwrap();
        assert_eq!(agent.energy, 100.0);
    }

    #[test]
    fn sighting_routes_to_the_owning_agent() {
        let mut arena = EntityArena::new();
        let bug = spawn(&mut arena, EntityKind::Herbivore, 0.0, 100.0);
        let plant = spawn(&mut arena, EntityKind::Plant, 30.0, 100.0);
        let mut eye = Entity::new(
            "H-0-eye-L".to_owned(),
            EntityKind::EyeHitbox,
            Pose::new(20.0, 0.0, 0.0),
            25.0,
            1.0,
        );
        eye.owner = Some(bug);
        eye.eye = Some(EyeSide::Left);
        let eye = arena.insert(eye);

        let contacts = [Contact {
            detector: eye,
            emitter: plant,
            dist_sqrd: 100.0,
        }];
        apply_visual(&mut arena, &contacts);

        assert_eq!(
            arena.get(eye).unwrap().color,
            EntityKind::Plant.base_color(),
            "hitbox flashes what it saw"
        );
        let agent = arena.get_mut(bug).unwrap().agent.as_mut().unwrap();
        let frame = agent.take_frame(100.0);
        let seen = frame.eyes[EyeSide::Left.index()].unwrap();
        assert_eq!(seen.color, EntityKind::Plant.base_color());
        // distance is measured body-to-emitter, not hitbox-to-emitter
        assert!((seen.dist_sqrd - 900.0).abs() < 1e-3);
    }
}
