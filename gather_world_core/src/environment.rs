use rand::{SeedableRng, rngs::StdRng};
use serde::Serialize;
use tracing::debug;

use crate::{
    Color,
    builder::{GatherGridBuilder, GridBuilder},
    config::{ConfigError, EpisodeConfig, ResetOptions, RewardRule},
    engine::{Action, PlacementError, World},
    resolver::{CarryResolver, CollectedColors, Metrics, ResolveContext, StepResolver},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("placement failed: {0}")]
    Placement(#[from] PlacementError),
    #[error("expected {expected} actions, got {got}")]
    ActionCount { expected: usize, got: usize },
    #[error("episode is not running; call reset first")]
    NeedsReset,
}

/// Bookkeeping returned with every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepInfo {
    pub step_count: u32,
    pub metrics: Metrics,
    pub collected_colors: Vec<u32>,
}

/// Result of an environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// One reward per agent.
    pub rewards: Vec<f32>,
    /// Set once the step budget is used up.
    pub done: bool,
    pub info: StepInfo,
}

/// Multi-agent color gathering environment.
///
/// Grid construction and step resolution are delegated to the injected
/// [`GridBuilder`] and [`StepResolver`]. Metrics survive resets; the
/// collected-color counter does not.
pub struct GatherEnv {
    config: EpisodeConfig,
    builder: Box<dyn GridBuilder>,
    resolver: Box<dyn StepResolver>,
    world: World,
    tracked_colors: Vec<Color>,
    collected: CollectedColors,
    metrics: Metrics,
    step_count: u32,
    running: bool,
    mission: String,
    rng: StdRng,
}

impl GatherEnv {
    /// Validates `config` and creates an environment with the default
    /// builder and resolver. No grid exists until [`GatherEnv::reset`].
    pub fn new(config: EpisodeConfig, seed: u64) -> Result<Self, EnvError> {
        Self::with_strategies(
            config,
            seed,
            Box::new(GatherGridBuilder),
            Box::new(CarryResolver),
        )
    }

    pub fn with_strategies(
        config: EpisodeConfig,
        seed: u64,
        builder: Box<dyn GridBuilder>,
        resolver: Box<dyn StepResolver>,
    ) -> Result<Self, EnvError> {
        config.validate()?;
        Ok(GatherEnv {
            world: World::new(config.size, config.size),
            tracked_colors: vec![config.goal_color],
            collected: CollectedColors::new(config.n_colors),
            config,
            builder,
            resolver,
            metrics: Metrics::default(),
            step_count: 0,
            running: false,
            mission: String::new(),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Starts a new episode: clears the collected-color counter and builds
    /// a fresh grid.
    pub fn reset(&mut self) -> Result<(), EnvError> {
        self.running = false;
        self.step_count = 0;

        let built = self.builder.build(&self.config, &mut self.rng)?;
        self.collected.reset(built.tracked_colors.len());
        self.world = built.world;
        self.tracked_colors = built.tracked_colors;
        self.mission = built.mission;
        self.running = true;

        debug!(
            goal = %self.config.goal_color,
            hazard = self.config.hazard,
            tracked = ?self.tracked_colors,
            "episode reset"
        );
        Ok(())
    }

    /// Applies per-episode overrides, then resets. The overridden
    /// configuration is validated first and kept only if valid.
    pub fn reset_with(&mut self, options: ResetOptions) -> Result<(), EnvError> {
        let next = options.apply(&self.config);
        next.validate()?;
        self.config = next;
        self.reset()
    }

    /// Advances every agent by one action, then resolves what they carry.
    pub fn step(&mut self, actions: &[Action]) -> Result<StepResult, EnvError> {
        if !self.running {
            return Err(EnvError::NeedsReset);
        }
        if actions.len() != self.config.n_agents {
            return Err(EnvError::ActionCount {
                expected: self.config.n_agents,
                got: actions.len(),
            });
        }

        self.step_count += 1;
        self.world.apply_actions(actions, &mut self.rng);

        let ctx = ResolveContext {
            config: &self.config,
            tracked_colors: &self.tracked_colors,
        };
        let resolution =
            self.resolver
                .resolve(&mut self.world, ctx, &mut self.collected, &mut self.rng);
        self.metrics += resolution.delta;
        if let Some(err) = resolution.failure {
            self.running = false;
            return Err(err.into());
        }

        let done = self.step_count >= self.config.max_steps;
        if done {
            self.running = false;
        }

        Ok(StepResult {
            rewards: resolution.rewards,
            done,
            info: StepInfo {
                step_count: self.step_count,
                metrics: self.metrics,
                collected_colors: self.collected.counts().to_vec(),
            },
        })
    }

    /// Colors that would pay `agent` if it picked one up right now.
    pub fn paying_colors(&self, agent: usize) -> Vec<Color> {
        match self.config.reward_rule {
            RewardRule::GoalColor => vec![self.config.goal_color],
            RewardRule::AgentColor => self
                .tracked_colors
                .get(agent % self.tracked_colors.len().max(1))
                .copied()
                .into_iter()
                .collect(),
            RewardRule::MostCollected => {
                let max = self.collected.max();
                self.tracked_colors
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| self.collected.get(*index) + 1 >= max)
                    .map(|(_, color)| *color)
                    .collect()
            }
        }
    }

    pub fn config(&self) -> &EpisodeConfig {
        &self.config
    }
    pub fn world(&self) -> &World {
        &self.world
    }
    /// Mutable access to the world between steps, for scripted setups.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
    pub fn metrics(&self) -> Metrics {
        self.metrics
    }
    pub fn collected_colors(&self) -> &CollectedColors {
        &self.collected
    }
    pub fn tracked_colors(&self) -> &[Color] {
        &self.tracked_colors
    }
    pub fn mission(&self) -> &str {
        &self.mission
    }
    pub fn step_count(&self) -> u32 {
        self.step_count
    }
    pub fn n_agents(&self) -> usize {
        self.config.n_agents
    }
}
