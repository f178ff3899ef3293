//! Named environment presets.

use std::collections::BTreeMap;

use crate::{
    Color,
    config::{EpisodeConfig, MismatchPolicy, RewardRule},
    environment::{EnvError, GatherEnv},
};

/// Produces the configuration registered under an identifier.
pub type ConfigFactory = fn() -> EpisodeConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("no environment registered as '{0}'")]
    UnknownId(String),
    #[error("an environment is already registered as '{0}'")]
    DuplicateId(String),
    #[error(transparent)]
    Env(#[from] EnvError),
}

pub const COLOR_GATHER_8X8: &str = "MultiGrid-Color-Gather-Env-8x8-v0";
pub const LAVA_COLOR_GATHER: &str = "MultiGrid-LavaColor-Gather-Env-8x8-v0";
pub const WATER_GATHER_12X12: &str = "MultiGrid-Water-Gather-Env-12x12-v0";
pub const AGENT_COLOR_GATHER_8X8: &str = "MultiGrid-AgentColor-Gather-Env-8x8-v0";

/// Two agents competing over two colors; whichever color has been collected
/// most pays out.
///
/// Green is always tracked index 0 and only the second color is drawn from
/// the shuffled palette, whereas pick.py draws both tracked colors at random
/// from every palette entry after red.
pub fn color_gather_8x8() -> EpisodeConfig {
    EpisodeConfig {
        size: 8,
        n_agents: 2,
        n_goals: 1,
        n_clutter: 0,
        n_colors: 2,
        distractors_per_color: 1,
        goal_color: Color::Green,
        shuffle_palette: true,
        reward_rule: RewardRule::MostCollected,
        on_mismatch: MismatchPolicy::Respawn,
        ..EpisodeConfig::default()
    }
}

/// A single agent hunting red balls among four distractor colors, with the
/// battery fixture. Published under its original 8x8 name.
pub fn lava_color_gather() -> EpisodeConfig {
    EpisodeConfig {
        size: 12,
        n_agents: 1,
        n_goals: 3,
        n_clutter: 0,
        n_colors: 5,
        distractors_per_color: 3,
        goal_color: Color::Red,
        battery: true,
        reward_rule: RewardRule::GoalColor,
        on_mismatch: MismatchPolicy::Respawn,
        ..EpisodeConfig::default()
    }
}

/// The lava preset with two hazard strips, each leaving two open cells at
/// either end.
pub fn water_gather_12x12() -> EpisodeConfig {
    EpisodeConfig {
        hazard: true,
        hazard_gap: 2,
        ..lava_color_gather()
    }
}

/// Each agent is paid for its own color; everything else is discarded.
pub fn agent_color_gather_8x8() -> EpisodeConfig {
    EpisodeConfig {
        size: 8,
        n_agents: 2,
        n_goals: 2,
        n_colors: 2,
        distractors_per_color: 2,
        goal_color: Color::Green,
        reward_rule: RewardRule::AgentColor,
        on_mismatch: MismatchPolicy::Drop,
        ..EpisodeConfig::default()
    }
}

/// Maps stable identifiers to configuration factories.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: BTreeMap<String, ConfigFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in environment.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let builtin: [(&str, ConfigFactory); 4] = [
            (COLOR_GATHER_8X8, color_gather_8x8),
            (LAVA_COLOR_GATHER, lava_color_gather),
            (WATER_GATHER_12X12, water_gather_12x12),
            (AGENT_COLOR_GATHER_8X8, agent_color_gather_8x8),
        ];
        for (id, factory) in builtin {
            registry.entries.insert(id.to_string(), factory);
        }
        registry
    }

    pub fn register(&mut self, id: &str, factory: ConfigFactory) -> Result<(), RegistryError> {
        if self.entries.contains_key(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        self.entries.insert(id.to_string(), factory);
        Ok(())
    }

    /// The preset configuration for `id`.
    pub fn config(&self, id: &str) -> Result<EpisodeConfig, RegistryError> {
        self.entries
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownId(id.to_string()))
    }

    /// Builds an environment for `id`. It still needs a reset before stepping.
    pub fn make(&self, id: &str, seed: u64) -> Result<GatherEnv, RegistryError> {
        let config = self.config(id)?;
        Ok(GatherEnv::new(config, seed)?)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_presets_are_valid_and_build() {
        let registry = Registry::with_builtin();
        assert_eq!(registry.ids().count(), 4);
        for id in registry.ids() {
            let mut env = registry.make(id, 3).unwrap();
            env.reset().unwrap();
            assert_eq!(env.world().agents.len(), env.n_agents());
        }
    }

    #[test]
    fn unknown_and_duplicate_ids_are_errors() {
        let mut registry = Registry::with_builtin();
        assert!(matches!(
            registry.make("MultiGrid-Nope-v0", 0),
            Err(RegistryError::UnknownId(_))
        ));
        assert_eq!(
            registry.register(COLOR_GATHER_8X8, color_gather_8x8),
            Err(RegistryError::DuplicateId(COLOR_GATHER_8X8.to_string()))
        );
        registry
            .register("MultiGrid-Custom-v0", || EpisodeConfig {
                size: 6,
                ..EpisodeConfig::default()
            })
            .unwrap();
        assert_eq!(registry.config("MultiGrid-Custom-v0").unwrap().size, 6);
    }

    #[test]
    fn invalid_preset_surfaces_config_error() {
        let mut registry = Registry::new();
        registry
            .register("MultiGrid-TooColorful-v0", || EpisodeConfig {
                n_colors: 6,
                ..EpisodeConfig::default()
            })
            .unwrap();
        assert!(matches!(
            registry.make("MultiGrid-TooColorful-v0", 0),
            Err(RegistryError::Env(EnvError::Config(_)))
        ));
    }
}
