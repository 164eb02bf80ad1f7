//! Core types and simulation engine shared across the BugWorld workspace.
//!
//! The crate is organised around two tightly coupled subsystems: the
//! collision/sensing engine ([`collision`], [`matrix`]) that decides which
//! entity pairs interact each tick, and the population lifecycle manager
//! ([`population`]) that reconciles each species' next genome generation
//! against the live world. [`world`] owns both and drives the tick pipeline.

use serde::{Deserialize, Serialize};

pub mod brain;
pub mod collision;
pub mod config;
pub mod entity;
pub mod matrix;
pub mod pose;
pub mod population;
pub mod world;

pub use brain::{Brain, BrainFactory, SensorFrame, SightReading, WanderBrain};
pub use collision::{
    Channel, CollisionGroup, Collisions, Contact, RegistrationLedger, RegistryError, Role,
};
pub use config::{ConfigError, SpeciesConfig, SpeciesLibrary, WorldConfig};
pub use entity::{AgentState, Entity, EntityArena, EntityId, EntityKind, EyeSide};
pub use matrix::{FoodLedger, PhysicalRule, VisualRule};
pub use population::{
    Evolver, GenerationDiff, GenerationPhase, Genome, GenomeKey, GenomeKeys, Population,
    PopulationRegistry, SelectionEvolver,
};
pub use world::{Census, World};

/// Number of sensor inputs fed to each agent brain per tick.
pub const INPUT_SIZE: usize = 14;
/// Number of control outputs produced by each agent brain (wheel pair).
pub const OUTPUT_SIZE: usize = 2;
/// Number of eye hitboxes each agent owns.
pub const NUM_EYES: usize = 2;

/// High level simulation clock (ticks processed since world construction).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}
