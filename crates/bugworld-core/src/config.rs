//! World and species configuration.

use crate::entity::EntityKind;
use crate::{INPUT_SIZE, OUTPUT_SIZE};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fatal configuration problems, surfaced at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    #[error("missing species section '{0}'")]
    MissingSpecies(&'static str),
}

/// Tunable parameters for one world. Defaults reproduce the reference
/// arena: a 1000x800 wrapped field seeded with herbivores and plants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f32,
    pub height: f32,
    /// Wrap positions toroidally at the edges; clamp to walls when false.
    pub boundary_wrap: bool,
    pub num_herbivores: usize,
    pub num_omnivores: usize,
    pub num_carnivores: usize,
    pub num_plants: usize,
    pub num_meat: usize,
    pub num_obstacles: usize,
    /// Ticks between reproduction passes.
    pub reproduction_interval: u64,
    /// Fixed seed for reproducible runs; entropy-seeded when absent.
    pub rng_seed: Option<u64>,
    pub graze_bite: f32,
    pub obstacle_damage: f32,
    pub predator_damage: f32,
    pub rivalry_damage: f32,
    pub bug_radius: f32,
    pub plant_radius: f32,
    pub meat_radius: f32,
    pub obstacle_radius: f32,
    pub bug_health: f32,
    pub bug_energy: f32,
    pub plant_health: f32,
    pub meat_health: f32,
    pub obstacle_health: f32,
    /// Score granted per tick survived.
    pub survival_tick_score: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 1000.0,
            height: 800.0,
            boundary_wrap: true,
            num_herbivores: 30,
            num_omnivores: 0,
            num_carnivores: 0,
            num_plants: 30,
            num_meat: 0,
            num_obstacles: 10,
            reproduction_interval: 500,
            rng_seed: None,
            graze_bite: 10.0,
            obstacle_damage: 1.0,
            predator_damage: 1.0,
            rivalry_damage: 5.0,
            bug_radius: 10.0,
            plant_radius: 5.0,
            meat_radius: 10.0,
            obstacle_radius: 7.0,
            bug_health: 100.0,
            bug_energy: 100.0,
            plant_health: 100.0,
            meat_health: 100.0,
            obstacle_health: 100.0,
            survival_tick_score: 0.05,
        }
    }
}

impl WorldConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(ConfigError::Invalid("world dimensions must be positive"));
        }
        if self.reproduction_interval == 0 {
            return Err(ConfigError::Invalid(
                "reproduction_interval must be at least one tick",
            ));
        }
        if self.graze_bite <= 0.0 {
            return Err(ConfigError::Invalid("graze_bite must be positive"));
        }
        if self.bug_radius <= 0.0 || self.plant_radius <= 0.0 || self.obstacle_radius <= 0.0 {
            return Err(ConfigError::Invalid("entity radii must be positive"));
        }
        if self.bug_health <= 0.0 || self.plant_health <= 0.0 {
            return Err(ConfigError::Invalid("entity health must be positive"));
        }
        Ok(())
    }

    /// Build the world RNG, honoring a fixed seed when one is configured.
    #[must_use]
    pub fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_os_rng(),
        }
    }
}

/// Evolution parameters for one species.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesConfig {
    /// Roster size after every reproduction pass.
    pub population_size: usize,
    /// Below this many survivors the species is reseeded from scratch.
    pub population_floor: usize,
    /// Fraction of the roster, by fitness, kept as parents.
    pub survival_fraction: f32,
    /// Per-weight probability of mutation.
    pub mutation_rate: f32,
    /// Magnitude of a single mutation step.
    pub mutation_scale: f32,
    pub hidden_neurons: usize,
}

impl Default for SpeciesConfig {
    fn default() -> Self {
        Self {
            population_size: 30,
            population_floor: 2,
            survival_fraction: 0.3,
            mutation_rate: 0.1,
            mutation_scale: 0.5,
            hidden_neurons: 8,
        }
    }
}

impl SpeciesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::Invalid("population_size must be nonzero"));
        }
        if !(0.0..=1.0).contains(&self.survival_fraction) {
            return Err(ConfigError::Invalid(
                "survival_fraction must lie in 0..=1",
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::Invalid("mutation_rate must lie in 0..=1"));
        }
        if self.hidden_neurons == 0 {
            return Err(ConfigError::Invalid("hidden_neurons must be nonzero"));
        }
        Ok(())
    }

    /// Total weight count of the controller network this species evolves:
    /// input-to-hidden weights and biases plus hidden-to-output weights and
    /// biases.
    #[must_use]
    pub fn weight_count(&self) -> usize {
        let h = self.hidden_neurons;
        INPUT_SIZE * h + h + h * OUTPUT_SIZE + OUTPUT_SIZE
    }
}

/// Per-species configuration sections, keyed by species name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeciesLibrary {
    #[serde(flatten)]
    species: HashMap<String, SpeciesConfig>,
}

impl SpeciesLibrary {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let library: Self = toml::from_str(text)?;
        library.validate()?;
        Ok(library)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for config in self.species.values() {
            config.validate()?;
        }
        Ok(())
    }

    pub fn insert(&mut self, kind: EntityKind, config: SpeciesConfig) {
        self.species.insert(kind.section().to_owned(), config);
    }

    #[must_use]
    pub fn get(&self, kind: EntityKind) -> Option<&SpeciesConfig> {
        self.species.get(kind.section())
    }

    /// Library with the same config for all three bug species.
    #[must_use]
    pub fn uniform(config: SpeciesConfig) -> Self {
        let mut library = Self::default();
        for kind in EntityKind::POPULATION_KINDS {
            library.insert(kind, config.clone());
        }
        library
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        WorldConfig::default().validate().unwrap();
        SpeciesConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = WorldConfig {
            reproduction_interval: 0,
            ..WorldConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn weight_count_matches_network_shape() {
        let config = SpeciesConfig {
            hidden_neurons: 8,
            ..SpeciesConfig::default()
        };
        // 14*8 + 8 + 8*2 + 2
        assert_eq!(config.weight_count(), 138);
    }

    #[test]
    fn library_parses_species_sections() {
        let text = r#"
            [herbivore]
            population_size = 12
            hidden_neurons = 4

            [carnivore]
            population_size = 6
            survival_fraction = 0.5
        "#;
        let library = SpeciesLibrary::from_toml_str(text).unwrap();
        let herb = library.get(EntityKind::Herbivore).unwrap();
        assert_eq!(herb.population_size, 12);
        assert_eq!(herb.hidden_neurons, 4);
        let carn = library.get(EntityKind::Carnivore).unwrap();
        assert_eq!(carn.population_size, 6);
        assert!(library.get(EntityKind::Omnivore).is_none());
    }

    #[test]
    fn library_rejects_bad_fractions() {
        let text = r#"
            [herbivore]
            survival_fraction = 1.5
        "#;
        assert!(SpeciesLibrary::from_toml_str(text).is_err());
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        use rand::Rng;
        let config = WorldConfig {
            rng_seed: Some(99),
            ..WorldConfig::default()
        };
        let mut a = config.seeded_rng();
        let mut b = config.seeded_rng();
        assert_eq!(a.random::<u64>(), b.random::<u64>());
    }
}
