//! Episode grid construction.

use rand::{Rng, rngs::StdRng, seq::SliceRandom};
use tracing::{debug, warn};

use crate::{
    Color,
    config::{ColorAssignment, EpisodeConfig},
    engine::{CellType, PlacementError, World},
};

/// Sampling budget for every random placement.
pub const MAX_PLACEMENT_TRIES: usize = 100;

pub const MISSION: &str = "pick up objects";

/// A freshly populated episode.
#[derive(Debug, Clone)]
pub struct BuiltGrid {
    pub world: World,
    /// The goal color followed by the distractor colors in play. Indexes
    /// the collected-color counter.
    pub tracked_colors: Vec<Color>,
    pub mission: String,
}

/// Builds the initial world for an episode.
pub trait GridBuilder {
    fn build(&self, config: &EpisodeConfig, rng: &mut StdRng) -> Result<BuiltGrid, PlacementError>;
}

/// Walls, optional battery and hazard strips, goal objects, clutter,
/// distractors, then agents.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatherGridBuilder;

/// Resolves the colors in play: the goal color, then the rest of the
/// palette (shuffled when configured) cut down to `n_colors - 1`.
pub fn tracked_colors<R: Rng + ?Sized>(config: &EpisodeConfig, rng: &mut R) -> Vec<Color> {
    let mut remaining: Vec<Color> = Color::PALETTE
        .into_iter()
        .filter(|color| *color != config.goal_color)
        .collect();
    if config.shuffle_palette {
        remaining.shuffle(rng);
    }
    remaining.truncate(config.n_colors.saturating_sub(1));

    let mut tracked = Vec::with_capacity(remaining.len() + 1);
    tracked.push(config.goal_color);
    tracked.extend(remaining);
    tracked
}

impl GridBuilder for GatherGridBuilder {
    fn build(&self, config: &EpisodeConfig, rng: &mut StdRng) -> Result<BuiltGrid, PlacementError> {
        let mut world = World::new(config.size, config.size);
        world.draw_boundary();

        if config.battery {
            // Fixed coordinates on a fresh grid, always empty
            world.terrain[config.battery_position()] = CellType::Battery;
        }

        if config.hazard {
            let columns = config.hazard_columns();
            let painted: usize = config
                .hazard_rows()
                .into_iter()
                .map(|row| world.horizontal_strip(row, columns.clone(), CellType::Hazard))
                .sum();
            if painted == 0 {
                warn!(
                    size = config.size,
                    gap = config.hazard_gap,
                    "hazard enabled but the strips cover no cells"
                );
            }
        }

        let tracked = tracked_colors(config, rng);

        for _ in 0..config.n_goals {
            world.spawn_object(config.goal_color, rng, MAX_PLACEMENT_TRIES)?;
        }

        for _ in 0..config.n_clutter {
            world.place_clutter(rng, MAX_PLACEMENT_TRIES)?;
        }

        let distractor_colors = &tracked[1..];
        if !distractor_colors.is_empty() {
            let total = distractor_colors.len() * config.distractors_per_color;
            for k in 0..total {
                let color = match config.color_assignment {
                    ColorAssignment::Cyclic => distractor_colors[k % distractor_colors.len()],
                    ColorAssignment::Random => {
                        distractor_colors[rng.random_range(0..distractor_colors.len())]
                    }
                };
                world.spawn_object(color, rng, MAX_PLACEMENT_TRIES)?;
            }
        }

        for _ in 0..config.n_agents {
            world.place_agent(rng, MAX_PLACEMENT_TRIES)?;
        }

        debug!(
            size = config.size,
            objects = world.objects.len(),
            agents = world.agents.len(),
            goal = %config.goal_color,
            "built episode grid"
        );

        Ok(BuiltGrid {
            world,
            tracked_colors: tracked,
            mission: MISSION.to_string(),
        })
    }
}
