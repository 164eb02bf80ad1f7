//! Controller seam between the world and whatever drives an agent.
//!
//! The world only knows the [`Brain`] trait: it hands each agent a
//! [`SensorFrame`] at the start of the tick and asks for a wheel pair back.
//! Concrete genome-backed networks live in their own crate; the core ships
//! [`WanderBrain`] as the fallback when no factory is installed.

use crate::entity::EyeSide;
use crate::population::Genome;
use crate::{INPUT_SIZE, NUM_EYES};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A single eye reading: emitter color plus squared distance from the agent
/// body to the emitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SightReading {
    pub color: [f32; 3],
    pub dist_sqrd: f32,
}

/// Sensor bundle assembled once per tick per agent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorFrame {
    /// Nearest sight reading per eye (left, right), if anything was seen.
    pub eyes: [Option<SightReading>; NUM_EYES],
    pub health: f32,
    pub energy: f32,
    /// Wheel velocities applied on the previous tick.
    pub wheels: (f32, f32),
}

impl SensorFrame {
    /// Flatten into the fixed input vector fed to neural controllers.
    ///
    /// Layout: right eye RGB, left eye RGB, health, energy, previous wheel
    /// pair, then four bias inputs. Health and energy are normalised against
    /// the 0..100 scale the world uses.
    #[must_use]
    pub fn to_inputs(&self) -> [f32; INPUT_SIZE] {
        let mut inputs = [0.0; INPUT_SIZE];
        for (slot, side) in [EyeSide::Right, EyeSide::Left].into_iter().enumerate() {
            let color = self.eyes[side.index()].map_or([0.0; 3], |r| r.color);
            inputs[slot * 3] = color[0];
            inputs[slot * 3 + 1] = color[1];
            inputs[slot * 3 + 2] = color[2];
        }
        inputs[6] = (self.health / 100.0).clamp(0.0, 1.0);
        inputs[7] = (self.energy / 100.0).clamp(0.0, 1.0);
        inputs[8] = self.wheels.0;
        inputs[9] = self.wheels.1;
        for bias in &mut inputs[10..] {
            *bias = 1.0;
        }
        inputs
    }
}

/// Behavior controller attached to one agent.
pub trait Brain: Send {
    /// Static identifier of the controller implementation.
    fn kind(&self) -> &'static str;

    /// Ingest this tick's sensor frame.
    fn observe(&mut self, frame: &SensorFrame);

    /// Produce the (left, right) wheel velocities for this tick.
    fn decide(&mut self) -> (f32, f32);
}

/// Builds a brain for a freshly spawned agent from its genome.
pub trait BrainFactory: Send {
    fn build(&self, genome: &Genome) -> Box<dyn Brain>;
}

/// Fallback controller: a biased random walk, forward-leaning like the
/// original wander behavior.
pub struct WanderBrain {
    rng: SmallRng,
}

impl WanderBrain {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl std::fmt::Debug for WanderBrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WanderBrain").finish()
    }
}

impl Brain for WanderBrain {
    fn kind(&self) -> &'static str {
        "wander"
    }

    fn observe(&mut self, _frame: &SensorFrame) {}

    fn decide(&mut self) -> (f32, f32) {
        (
            self.rng.random_range(-0.5..1.0),
            self.rng.random_range(-0.5..1.0),
        )
    }
}
