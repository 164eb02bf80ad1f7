//! Headless simulation runner: seed a world, install the evolved
//! controllers, and let it run.

use anyhow::{Context, Result};
use bugworld_brain::MlpBrainFactory;
use bugworld_core::{SpeciesLibrary, World, WorldConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_SPECIES_PATH: &str = "species.toml";
const RUN_TICKS: u64 = 2000;
const REPORT_EVERY: u64 = 100;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();

    let species_path: PathBuf = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SPECIES_PATH.to_owned())
        .into();
    let library = SpeciesLibrary::load(&species_path)
        .with_context(|| format!("loading species config from {}", species_path.display()))?;

    let config = WorldConfig {
        num_herbivores: 30,
        num_omnivores: 10,
        num_carnivores: 5,
        num_plants: 30,
        num_obstacles: 10,
        ..WorldConfig::default()
    };

    let mut world = World::new(config, &library).context("constructing world")?;
    world.set_brain_factory(Box::new(MlpBrainFactory));

    info!(ticks = RUN_TICKS, "starting run");
    for _ in 0..RUN_TICKS {
        world.tick();
        let census = world.census();
        if census.tick % REPORT_EVERY == 0 {
            info!(
                tick = census.tick,
                bugs = census.bugs,
                plants = census.plants,
                meat = census.meat,
                plant_food = census.plant_food,
                meat_food = census.meat_food,
                births = census.births,
                deaths = census.deaths,
                "census"
            );
        }
    }

    let final_census = world.census();
    info!(
        bugs = final_census.bugs,
        births = final_census.births,
        deaths = final_census.deaths,
        "run complete"
    );
    Ok(())
}
