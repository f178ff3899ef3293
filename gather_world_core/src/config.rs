use serde::{Deserialize, Serialize};

use crate::Color;

/// Smallest grid that still has an interior after walls are drawn.
pub const MIN_GRID_SIZE: usize = 4;

/// Hazard strips need room for two bands, the space between them, and the
/// battery row below the lower band.
pub const MIN_HAZARD_GRID_SIZE: usize = 7;

/// How a carried object is judged at resolution time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardRule {
    /// The object's color equals the goal color.
    #[default]
    GoalColor,
    /// The object's tracked color index equals the agent index, modulo the
    /// number of tracked colors.
    AgentColor,
    /// The object's color has been collected at least as often as any other
    /// tracked color this episode, counting this pickup.
    MostCollected,
}

/// What happens to an object that did not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchPolicy {
    #[default]
    Respawn,
    Drop,
}

/// How distractor colors are assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorAssignment {
    /// Walk the remaining-color list in order.
    #[default]
    Cyclic,
    /// Draw each distractor's color uniformly from the remaining colors.
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("too many colors requested: {requested} (palette has {palette})")]
    TooManyColors { requested: usize, palette: usize },
    #[error("at least one color is required")]
    NoColors,
    #[error("at least one agent is required")]
    NoAgents,
    #[error("grid size {size} is below the minimum of {min}")]
    GridTooSmall { size: usize, min: usize },
    #[error("max_steps must be positive")]
    ZeroMaxSteps,
}

/// Parameters of an environment, fixed for the duration of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeConfig {
    /// Width and height of the square grid, walls included.
    pub size: usize,
    pub n_agents: usize,
    /// Objects of the goal color.
    pub n_goals: usize,
    pub n_clutter: usize,
    /// Distinct colors in play, the goal color included.
    pub n_colors: usize,
    pub distractors_per_color: usize,
    pub goal_color: Color,
    pub color_assignment: ColorAssignment,
    /// Pick the distractor colors at random each episode instead of in
    /// palette order.
    pub shuffle_palette: bool,
    pub hazard: bool,
    /// Open cells left at each end of a hazard strip; 0 spans the interior.
    pub hazard_gap: usize,
    pub battery: bool,
    pub reward_rule: RewardRule,
    pub on_mismatch: MismatchPolicy,
    pub max_steps: u32,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        EpisodeConfig {
            size: 15,
            n_agents: 2,
            n_goals: 2,
            n_clutter: 0,
            n_colors: 2,
            distractors_per_color: 1,
            goal_color: Color::Red,
            color_assignment: ColorAssignment::Cyclic,
            shuffle_palette: false,
            hazard: false,
            hazard_gap: 0,
            battery: false,
            reward_rule: RewardRule::GoalColor,
            on_mismatch: MismatchPolicy::Respawn,
            max_steps: 250,
        }
    }
}

impl EpisodeConfig {
    /// Checks the parameter combination. Must pass before any grid is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let palette = Color::PALETTE.len();
        if self.n_colors >= palette {
            return Err(ConfigError::TooManyColors {
                requested: self.n_colors,
                palette,
            });
        }
        if self.n_colors == 0 {
            return Err(ConfigError::NoColors);
        }
        if self.n_agents == 0 {
            return Err(ConfigError::NoAgents);
        }
        let min = if self.hazard {
            MIN_HAZARD_GRID_SIZE
        } else {
            MIN_GRID_SIZE
        };
        if self.size < min {
            return Err(ConfigError::GridTooSmall {
                size: self.size,
                min,
            });
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        Ok(())
    }

    /// Fixed battery location, on the bottom interior row.
    pub fn battery_position(&self) -> crate::Position {
        crate::Position::new(4.min(self.size - 2), self.size - 2)
    }

    /// Rows of the upper and lower hazard strips, two cells in from the
    /// top and bottom walls.
    pub fn hazard_rows(&self) -> [usize; 2] {
        [2, self.size - 3]
    }

    /// Columns covered by each hazard strip.
    pub fn hazard_columns(&self) -> std::ops::Range<usize> {
        let start = 1 + self.hazard_gap;
        let end = (self.size - 1).saturating_sub(self.hazard_gap);
        start..end.max(start)
    }
}

/// Per-reset overrides of the goal color and hazard flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOptions {
    pub goal_color: Option<Color>,
    pub hazard: Option<bool>,
}

impl ResetOptions {
    /// Returns `config` with these overrides applied.
    pub fn apply(&self, config: &EpisodeConfig) -> EpisodeConfig {
        let mut next = config.clone();
        if let Some(color) = self.goal_color {
            next.goal_color = color;
        }
        if let Some(hazard) = self.hazard {
            next.hazard = hazard;
        }
        next
    }
}
