//! Population lifecycle: rosters, fitness, and generational turnover.
//!
//! A reproduction pass never mutates the arena directly. It produces a
//! [`GenerationDiff`] describing who dies, who is born, and who carries over,
//! and the world reconciles that diff against the arena afterwards.

use crate::config::{ConfigError, SpeciesConfig, SpeciesLibrary};
use crate::entity::{EntityArena, EntityId, EntityKind};
use rand::rngs::SmallRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Unique identifier of a genome across the run.
pub type GenomeKey = u64;

/// Heritable controller parameters plus bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub key: GenomeKey,
    pub weights: Vec<f32>,
    pub fitness: f32,
    pub generation: u32,
}

/// Monotonic allocator for genome keys.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GenomeKeys {
    next: GenomeKey,
}

impl GenomeKeys {
    pub fn allocate(&mut self) -> GenomeKey {
        let key = self.next;
        self.next += 1;
        key
    }
}

/// Where a population sits in its reproduction cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationPhase {
    #[default]
    Steady,
    ReproductionDue,
    Reconciling,
}

/// Outcome of one reproduction pass, expressed as a set difference between
/// the outgoing and incoming rosters.
#[derive(Debug, Default)]
pub struct GenerationDiff {
    pub species: Option<EntityKind>,
    /// Entities whose genomes were not selected into the next generation.
    pub to_remove: Vec<EntityId>,
    /// Genomes with no living carrier, to be spawned.
    pub to_add: Vec<Genome>,
    /// Entities whose genomes carry over unchanged.
    pub survivors: Vec<EntityId>,
}

impl GenerationDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

/// Selection strategy seam. The default is truncation selection with
/// mutation; tests swap in scripted strategies.
pub trait Evolver: Send {
    fn next_generation(
        &mut self,
        species: EntityKind,
        current: &[Genome],
        config: &SpeciesConfig,
        keys: &mut GenomeKeys,
        rng: &mut SmallRng,
    ) -> Vec<Genome>;
}

/// Draw a fresh genome with uniform weights in -1..1.
#[must_use]
pub fn random_genome(
    config: &SpeciesConfig,
    keys: &mut GenomeKeys,
    rng: &mut SmallRng,
    generation: u32,
) -> Genome {
    let weights = (0..config.weight_count())
        .map(|_| rng.random_range(-1.0..1.0))
        .collect();
    Genome {
        key: keys.allocate(),
        weights,
        fitness: 0.0,
        generation,
    }
}

/// Clone a parent genome under a new key, perturbing each weight with the
/// configured probability.
#[must_use]
pub fn mutate_genome(
    parent: &Genome,
    config: &SpeciesConfig,
    keys: &mut GenomeKeys,
    rng: &mut SmallRng,
) -> Genome {
    let weights = parent
        .weights
        .iter()
        .map(|&w| {
            if rng.random::<f32>() < config.mutation_rate {
                w + rng.random_range(-config.mutation_scale..config.mutation_scale)
            } else {
                w
            }
        })
        .collect();
    Genome {
        key: keys.allocate(),
        weights,
        fitness: 0.0,
        generation: parent.generation + 1,
    }
}

/// Truncation selection: the fittest fraction carries over unchanged, the
/// rest of the roster is refilled with mutated copies of random survivors.
/// A collapsed population, below the configured floor, is reseeded from
/// scratch.
#[derive(Debug, Default, Clone)]
pub struct SelectionEvolver;

impl Evolver for SelectionEvolver {
    fn next_generation(
        &mut self,
        species: EntityKind,
        current: &[Genome],
        config: &SpeciesConfig,
        keys: &mut GenomeKeys,
        rng: &mut SmallRng,
    ) -> Vec<Genome> {
        let mut ranked: Vec<&Genome> = current.iter().collect();
        ranked.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let survivor_count = ((ranked.len() as f32) * config.survival_fraction).ceil() as usize;
        let survivor_count = survivor_count.min(ranked.len());

        // an empty survivor pool always reseeds, even with a floor of zero
        if survivor_count < config.population_floor.max(1) {
            warn!(
                species = species.tag(),
                survivors = survivor_count,
                floor = config.population_floor,
                "population collapsed, reseeding"
            );
            let generation = current.iter().map(|g| g.generation).max().unwrap_or(0) + 1;
            return (0..config.population_size)
                .map(|_| random_genome(config, keys, rng, generation))
                .collect();
        }

        let mut next: Vec<Genome> = ranked[..survivor_count]
            .iter()
            .map(|genome| (*genome).clone())
            .collect();
        while next.len() < config.population_size {
            let parent = ranked[rng.random_range(0..survivor_count)];
            next.push(mutate_genome(parent, config, keys, rng));
        }
        next
    }
}

/// Roster and evolution state for one species.
pub struct Population {
    kind: EntityKind,
    config: SpeciesConfig,
    roster: Vec<EntityId>,
    phase: GenerationPhase,
    generation: u32,
    keys: GenomeKeys,
    evolver: Box<dyn Evolver>,
}

impl std::fmt::Debug for Population {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Population")
            .field("kind", &self.kind)
            .field("roster", &self.roster.len())
            .field("phase", &self.phase)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Population {
    #[must_use]
    pub fn new(kind: EntityKind, config: SpeciesConfig) -> Self {
        Self {
            kind,
            config,
            roster: Vec::new(),
            phase: GenerationPhase::default(),
            generation: 0,
            keys: GenomeKeys::default(),
            evolver: Box::new(SelectionEvolver),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn config(&self) -> &SpeciesConfig {
        &self.config
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roster.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.roster.contains(&id)
    }

    pub fn set_evolver(&mut self, evolver: Box<dyn Evolver>) {
        self.evolver = evolver;
    }

    /// Draw a genome for a new member of this species.
    pub fn fresh_genome(&mut self, rng: &mut SmallRng) -> Genome {
        random_genome(&self.config, &mut self.keys, rng, self.generation)
    }

    /// Add a member. Registering twice is a no-op.
    pub fn register(&mut self, id: EntityId) {
        if !self.roster.contains(&id) {
            self.roster.push(id);
        }
    }

    /// Remove a member. Absent members are a no-op.
    pub fn deregister(&mut self, id: EntityId) {
        self.roster.retain(|&member| member != id);
    }

    pub fn mark_due(&mut self) {
        if self.phase == GenerationPhase::Steady {
            self.phase = GenerationPhase::ReproductionDue;
        }
    }

    /// Run one reproduction pass and return the roster diff. The arena is
    /// only read; reconciliation is the caller's job, followed by
    /// [`Population::settle`].
    pub fn reproduce(&mut self, arena: &EntityArena, rng: &mut SmallRng) -> GenerationDiff {
        if self.phase != GenerationPhase::ReproductionDue {
            return GenerationDiff::default();
        }
        self.phase = GenerationPhase::Reconciling;

        let mut current = Vec::with_capacity(self.roster.len());
        let mut key_owner: HashMap<GenomeKey, EntityId> = HashMap::new();
        for &id in &self.roster {
            let Some(entity) = arena.get(id) else {
                warn!(species = self.kind.tag(), "roster entry missing from arena");
                continue;
            };
            let Some(genome) = entity.genome.as_ref() else {
                warn!(species = self.kind.tag(), name = %entity.name, "member has no genome");
                continue;
            };
            let mut genome = genome.clone();
            genome.fitness = entity.fitness();
            key_owner.insert(genome.key, id);
            current.push(genome);
        }

        let next = self
            .evolver
            .next_generation(self.kind, &current, &self.config, &mut self.keys, rng);
        let next_keys: HashSet<GenomeKey> = next.iter().map(|g| g.key).collect();

        let mut diff = GenerationDiff {
            species: Some(self.kind),
            ..GenerationDiff::default()
        };
        for genome in &current {
            let id = key_owner[&genome.key];
            if next_keys.contains(&genome.key) {
                diff.survivors.push(id);
            } else {
                diff.to_remove.push(id);
            }
        }
        for genome in next {
            if !key_owner.contains_key(&genome.key) {
                diff.to_add.push(genome);
            }
        }

        self.generation += 1;
        info!(
            species = self.kind.tag(),
            generation = self.generation,
            survivors = diff.survivors.len(),
            births = diff.to_add.len(),
            deaths = diff.to_remove.len(),
            "reproduction pass"
        );
        diff
    }

    /// Mark reconciliation as finished.
    pub fn settle(&mut self) {
        debug!(species = self.kind.tag(), "population settled");
        self.phase = GenerationPhase::Steady;
    }
}

/// All species populations, keyed by kind.
#[derive(Debug)]
pub struct PopulationRegistry {
    populations: HashMap<EntityKind, Population>,
}

impl PopulationRegistry {
    /// Build a registry from the species library. Every bug species must
    /// have a config section.
    pub fn new(library: &SpeciesLibrary) -> Result<Self, ConfigError> {
        let mut populations = HashMap::new();
        for kind in EntityKind::POPULATION_KINDS {
            let config = library
                .get(kind)
                .ok_or(ConfigError::MissingSpecies(kind.section()))?;
            populations.insert(kind, Population::new(kind, config.clone()));
        }
        Ok(Self { populations })
    }

    #[must_use]
    pub fn population(&self, kind: EntityKind) -> Option<&Population> {
        self.populations.get(&kind)
    }

    pub fn population_mut(&mut self, kind: EntityKind) -> Option<&mut Population> {
        self.populations.get_mut(&kind)
    }

    /// Enroll an entity in its species population. Kinds without a
    /// population are logged and ignored.
    pub fn register(&mut self, kind: EntityKind, id: EntityId) {
        match self.populations.get_mut(&kind) {
            Some(population) => population.register(id),
            None => warn!(kind = kind.tag(), "no population for kind"),
        }
    }

    pub fn deregister(&mut self, kind: EntityKind, id: EntityId) {
        if let Some(population) = self.populations.get_mut(&kind) {
            population.deregister(id);
        }
    }

    pub fn fresh_genome(&mut self, kind: EntityKind, rng: &mut SmallRng) -> Option<Genome> {
        self.populations
            .get_mut(&kind)
            .map(|population| population.fresh_genome(rng))
    }

    pub fn mark_all_due(&mut self) {
        for population in self.populations.values_mut() {
            population.mark_due();
        }
    }

    /// Reproduce every due population, in a fixed species order so runs with
    /// the same seed replay identically.
    pub fn reproduce_all(&mut self, arena: &EntityArena, rng: &mut SmallRng) -> Vec<GenerationDiff> {
        let mut diffs = Vec::new();
        for kind in EntityKind::POPULATION_KINDS {
            if let Some(population) = self.populations.get_mut(&kind) {
                diffs.push(population.reproduce(arena, rng));
            }
        }
        diffs
    }

    pub fn settle_all(&mut self) {
        for population in self.populations.values_mut() {
            population.settle();
        }
    }

    pub fn set_evolver(&mut self, kind: EntityKind, evolver: Box<dyn Evolver>) {
        if let Some(population) = self.populations.get_mut(&kind) {
            population.set_evolver(evolver);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::pose::Pose;
    use rand::SeedableRng;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(11)
    }

    fn species_config() -> SpeciesConfig {
        SpeciesConfig {
            population_size: 6,
            population_floor: 1,
            survival_fraction: 0.5,
            hidden_neurons: 2,
            ..SpeciesConfig::default()
        }
    }

    fn seeded_population(
        arena: &mut EntityArena,
        fitnesses: &[f32],
    ) -> (Population, Vec<EntityId>) {
        let mut population = Population::new(EntityKind::Herbivore, species_config());
        let mut rng = rng();
        let mut ids = Vec::new();
        for (idx, &fitness) in fitnesses.iter().enumerate() {
            let genome = population.fresh_genome(&mut rng);
            let mut entity = Entity::new(
                format!("H-{idx}"),
                EntityKind::Herbivore,
                Pose::new(0.0, 0.0, 0.0),
                10.0,
                100.0,
            );
            entity.agent = Some(crate::entity::AgentState::new(
                100.0,
                Box::new(crate::brain::WanderBrain::new(idx as u64)),
            ));
            if let Some(agent) = entity.agent.as_mut() {
                agent.score = fitness;
            }
            entity.genome = Some(genome);
            let id = arena.insert(entity);
            population.register(id);
            ids.push(id);
        }
        (population, ids)
    }

    #[test]
    fn roster_registration_is_idempotent() {
        let mut arena = EntityArena::new();
        let (mut population, ids) = seeded_population(&mut arena, &[0.0]);
        population.register(ids[0]);
        assert_eq!(population.len(), 1);
        population.deregister(ids[0]);
        population.deregister(ids[0]);
        assert!(population.is_empty());
    }

    #[test]
    fn reproduce_requires_being_due() {
        let mut arena = EntityArena::new();
        let (mut population, _) = seeded_population(&mut arena, &[1.0, 2.0]);
        let diff = population.reproduce(&arena, &mut rng());
        assert!(diff.is_empty());
        assert_eq!(population.phase(), GenerationPhase::Steady);
    }

    #[test]
    fn diff_partitions_the_roster() {
        let mut arena = EntityArena::new();
        let (mut population, ids) =
            seeded_population(&mut arena, &[10.0, 1.0, 8.0, 0.5, 0.1, 0.2]);
        population.mark_due();
        let diff = population.reproduce(&arena, &mut rng());

        // survival_fraction 0.5 of 6 keeps the top three
        assert_eq!(diff.survivors.len(), 3);
        assert!(diff.survivors.contains(&ids[0]));
        assert!(diff.survivors.contains(&ids[2]));
        assert_eq!(diff.to_remove.len(), 3);
        assert_eq!(diff.to_add.len(), 3);
        assert_eq!(population.phase(), GenerationPhase::Reconciling);
        assert_eq!(population.generation(), 1);

        population.settle();
        assert_eq!(population.phase(), GenerationPhase::Steady);
    }

    #[test]
    fn collapsed_population_is_reseeded() {
        let mut arena = EntityArena::new();
        let mut config = species_config();
        config.population_floor = 4;
        let mut population = Population::new(EntityKind::Carnivore, config);
        let mut test_rng = rng();
        let genome = population.fresh_genome(&mut test_rng);
        let mut entity = Entity::new(
            "C-0".to_owned(),
            EntityKind::Carnivore,
            Pose::new(0.0, 0.0, 0.0),
            10.0,
            100.0,
        );
        entity.genome = Some(genome.clone());
        let id = arena.insert(entity);
        population.register(id);

        population.mark_due();
        let diff = population.reproduce(&arena, &mut test_rng);
        // the lone member's genome is discarded and a full fresh roster drawn
        assert_eq!(diff.to_remove, vec![id]);
        assert_eq!(diff.to_add.len(), 6);
        assert!(diff.survivors.is_empty());
        assert!(diff.to_add.iter().all(|g| g.key != genome.key));
    }

    #[test]
    fn mutated_children_advance_generation() {
        let config = species_config();
        let mut keys = GenomeKeys::default();
        let mut test_rng = rng();
        let parent = random_genome(&config, &mut keys, &mut test_rng, 3);
        let child = mutate_genome(&parent, &config, &mut keys, &mut test_rng);
        assert_eq!(child.generation, 4);
        assert_ne!(child.key, parent.key);
        assert_eq!(child.weights.len(), parent.weights.len());
        assert_eq!(child.fitness, 0.0);
    }

    #[test]
    fn registry_requires_every_species_section() {
        let library = SpeciesLibrary::uniform(species_config());
        assert!(PopulationRegistry::new(&library).is_ok());

        let mut partial = SpeciesLibrary::default();
        partial.insert(EntityKind::Herbivore, species_config());
        assert!(matches!(
            PopulationRegistry::new(&partial),
            Err(ConfigError::MissingSpecies(_))
        ));
    }

    #[test]
    fn registry_ignores_kinds_without_population() {
        let library = SpeciesLibrary::uniform(species_config());
        let mut registry = PopulationRegistry::new(&library).unwrap();
        let mut arena = EntityArena::new();
        let plant = arena.insert(Entity::new(
            "P-0".to_owned(),
            EntityKind::Plant,
            Pose::new(0.0, 0.0, 0.0),
            5.0,
            100.0,
        ));
        // logged no-op, must not panic or enroll anything
        registry.register(EntityKind::Plant, plant);
        registry.deregister(EntityKind::Plant, plant);
        assert!(registry.fresh_genome(EntityKind::Plant, &mut rng()).is_none());
    }
}
