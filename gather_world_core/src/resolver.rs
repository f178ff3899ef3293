//! Per-step resolution of carried objects into reward.

use std::ops::AddAssign;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    Color,
    builder::MAX_PLACEMENT_TRIES,
    config::{EpisodeConfig, MismatchPolicy, RewardRule},
    engine::{PlacementError, World},
};

/// How many objects of each tracked color were carried this episode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedColors {
    counts: Vec<u32>,
}

impl CollectedColors {
    pub fn new(n_colors: usize) -> Self {
        CollectedColors {
            counts: vec![0; n_colors],
        }
    }

    pub fn increment(&mut self, index: usize) -> u32 {
        self.counts[index] += 1;
        self.counts[index]
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn get(&self, index: usize) -> u32 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    /// Zeroes every entry, resizing to `n_colors`.
    pub fn reset(&mut self, n_colors: usize) {
        self.counts.clear();
        self.counts.resize(n_colors, 0);
    }
}

/// Delivery counters kept for the lifetime of an environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub max_gathered: u64,
    pub other_gathered: u64,
}

impl AddAssign for Metrics {
    fn add_assign(&mut self, rhs: Self) {
        self.max_gathered += rhs.max_gathered;
        self.other_gathered += rhs.other_gathered;
    }
}

/// Output of one resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// One reward per agent.
    pub rewards: Vec<f32>,
    /// Metric increments produced by this pass.
    pub delta: Metrics,
    /// First object that could not be put back on the grid. Such objects
    /// are taken out of play; everything else in the pass still applies.
    pub failure: Option<PlacementError>,
}

/// Episode facts the resolver reads.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub config: &'a EpisodeConfig,
    pub tracked_colors: &'a [Color],
}

/// Turns carried objects into reward after the engine has moved agents.
pub trait StepResolver {
    fn resolve(
        &self,
        world: &mut World,
        ctx: ResolveContext<'_>,
        collected: &mut CollectedColors,
        rng: &mut StdRng,
    ) -> Resolution;
}

/// Applies the configured [`RewardRule`] and [`MismatchPolicy`].
///
/// Every carried object is counted in [`CollectedColors`] whether or not it
/// matches. Matching objects are always put back on the grid; the carrying
/// slot is empty afterwards in every case, including when re-placement
/// runs out of room.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarryResolver;

impl CarryResolver {
    fn matches(
        rule: RewardRule,
        agent: usize,
        color: Color,
        color_index: Option<usize>,
        ctx: ResolveContext<'_>,
        collected: &CollectedColors,
    ) -> bool {
        match rule {
            RewardRule::GoalColor => color == ctx.config.goal_color,
            RewardRule::AgentColor => {
                color_index == Some(agent % ctx.tracked_colors.len().max(1))
            }
            RewardRule::MostCollected => {
                color_index.is_some_and(|index| collected.get(index) == collected.max())
            }
        }
    }
}

impl StepResolver for CarryResolver {
    fn resolve(
        &self,
        world: &mut World,
        ctx: ResolveContext<'_>,
        collected: &mut CollectedColors,
        rng: &mut StdRng,
    ) -> Resolution {
        let mut rewards = vec![0.0; world.agents.len()];
        let mut delta = Metrics::default();
        let mut failure = None;

        for (agent, slot) in world.carrying().into_iter().enumerate() {
            let Some(object_id) = slot else {
                continue;
            };
            let color = world.objects[object_id].color;
            let color_index = ctx.tracked_colors.iter().position(|c| *c == color);
            if let Some(index) = color_index {
                collected.increment(index);
            }

            let matched = Self::matches(
                ctx.config.reward_rule,
                agent,
                color,
                color_index,
                ctx,
                collected,
            );

            world.agents[agent].carrying = None;
            let replaced = if matched {
                rewards[agent] += 1.0;
                delta.max_gathered += 1;
                world.place_object(object_id, rng, MAX_PLACEMENT_TRIES).map(|_| ())
            } else {
                delta.other_gathered += 1;
                match ctx.config.on_mismatch {
                    MismatchPolicy::Respawn => {
                        world.place_object(object_id, rng, MAX_PLACEMENT_TRIES).map(|_| ())
                    }
                    MismatchPolicy::Drop => {
                        world.remove_object(object_id);
                        Ok(())
                    }
                }
            };
            if let Err(err) = replaced {
                warn!(agent, %color, "no room to put object back, removing it");
                world.remove_object(object_id);
                failure.get_or_insert(err);
            }

            trace!(agent, %color, matched, "resolved carried object");
        }

        Resolution {
            rewards,
            delta,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;
    use crate::{
        ObjectId, Position,
        engine::{ObjectState, PlacedObject},
    };

    /// A walled 6x6 world with `n_agents` agents along row 1.
    fn world_with_agents(n_agents: usize) -> World {
        let mut world = World::new(6, 6);
        world.draw_boundary();
        let mut rng = StdRng::seed_from_u64(0);
        for id in 0..n_agents {
            world.place_agent(&mut rng, 100).unwrap();
            world.teleport_agent(id, Position::new(1 + id, 1)).unwrap();
        }
        world
    }

    fn hand(world: &mut World, agent: usize, color: Color) -> ObjectId {
        let id = world.objects.len();
        world.objects.push(PlacedObject {
            id,
            color,
            state: ObjectState::Carried(agent),
        });
        world.agents[agent].carrying = Some(id);
        id
    }

    fn config(rule: RewardRule, on_mismatch: MismatchPolicy) -> EpisodeConfig {
        EpisodeConfig {
            goal_color: Color::Green,
            n_colors: 3,
            reward_rule: rule,
            on_mismatch,
            ..EpisodeConfig::default()
        }
    }

    const TRACKED: [Color; 3] = [Color::Green, Color::Red, Color::Blue];

    fn resolve(
        world: &mut World,
        config: &EpisodeConfig,
        collected: &mut CollectedColors,
    ) -> Resolution {
        CarryResolver
            .resolve(
                world,
                ResolveContext {
                    config,
                    tracked_colors: &TRACKED,
                },
                collected,
                &mut StdRng::seed_from_u64(7),
            )
    }

    #[test]
    fn empty_slots_change_nothing() {
        let mut world = world_with_agents(2);
        let config = config(RewardRule::GoalColor, MismatchPolicy::Respawn);
        let mut collected = CollectedColors::new(3);
        let resolution = resolve(&mut world, &config, &mut collected);
        assert_eq!(resolution.rewards, vec![0.0, 0.0]);
        assert_eq!(resolution.delta, Metrics::default());
        assert_eq!(resolution.failure, None);
        assert_eq!(collected.total(), 0);
    }

    #[test]
    fn goal_color_is_rewarded_and_respawned() {
        let mut world = world_with_agents(2);
        let config = config(RewardRule::GoalColor, MismatchPolicy::Respawn);
        let mut collected = CollectedColors::new(3);
        let goal = hand(&mut world, 0, Color::Green);

        let resolution = resolve(&mut world, &config, &mut collected);
        assert_eq!(resolution.rewards, vec![1.0, 0.0]);
        assert_eq!(resolution.delta.max_gathered, 1);
        assert_eq!(resolution.delta.other_gathered, 0);
        assert!(matches!(world.objects[goal].state, ObjectState::OnGrid(_)));
        assert_eq!(world.count_on_grid(Color::Green), 1);
        assert_eq!(world.carrying(), vec![None, None]);
        assert_eq!(collected.counts(), &[1, 0, 0]);
    }

    #[test]
    fn mismatch_respawn_versus_drop() {
        let mut collected = CollectedColors::new(3);

        let mut world = world_with_agents(1);
        let config_respawn = config(RewardRule::GoalColor, MismatchPolicy::Respawn);
        let red = hand(&mut world, 0, Color::Red);
        let resolution = resolve(&mut world, &config_respawn, &mut collected);
        assert_eq!(resolution.rewards, vec![0.0]);
        assert_eq!(resolution.delta.other_gathered, 1);
        assert!(world.objects[red].position().is_some());
        assert_eq!(world.agents[0].carrying, None);

        let mut world = world_with_agents(1);
        let config_drop = config(RewardRule::GoalColor, MismatchPolicy::Drop);
        let blue = hand(&mut world, 0, Color::Blue);
        let resolution = resolve(&mut world, &config_drop, &mut collected);
        assert_eq!(resolution.rewards, vec![0.0]);
        assert_eq!(world.objects[blue].state, ObjectState::Removed);
        assert_eq!(world.objects_on_grid().count(), 0);
        assert_eq!(world.agents[0].carrying, None);
        assert_eq!(collected.counts(), &[0, 1, 1]);
    }

    #[test]
    fn agent_color_rule_pairs_agents_with_tracked_indices() {
        let mut world = world_with_agents(3);
        let config = config(RewardRule::AgentColor, MismatchPolicy::Respawn);
        let mut collected = CollectedColors::new(3);
        hand(&mut world, 0, Color::Red);
        hand(&mut world, 1, Color::Red);
        hand(&mut world, 2, Color::Blue);

        let resolution = resolve(&mut world, &config, &mut collected);
        assert_eq!(resolution.rewards, vec![0.0, 1.0, 1.0]);
        assert_eq!(resolution.delta.max_gathered, 2);
        assert_eq!(resolution.delta.other_gathered, 1);
    }

    #[test]
    fn most_collected_rule_rewards_the_leading_color() {
        let mut world = world_with_agents(1);
        let config = config(RewardRule::MostCollected, MismatchPolicy::Respawn);
        let mut collected = CollectedColors::new(3);

        hand(&mut world, 0, Color::Red);
        let first = resolve(&mut world, &config, &mut collected);
        assert_eq!(first.rewards, vec![1.0]);

        // Blue ties red at one each
        hand(&mut world, 0, Color::Blue);
        let second = resolve(&mut world, &config, &mut collected);
        assert_eq!(second.rewards, vec![1.0]);

        hand(&mut world, 0, Color::Red);
        resolve(&mut world, &config, &mut collected);
        hand(&mut world, 0, Color::Blue);
        let trailing = resolve(&mut world, &config, &mut collected);
        assert_eq!(trailing.rewards, vec![1.0]);

        hand(&mut world, 0, Color::Green);
        let behind = resolve(&mut world, &config, &mut collected);
        assert_eq!(behind.rewards, vec![0.0]);
        assert_eq!(behind.delta.other_gathered, 1);
        assert_eq!(collected.counts(), &[1, 2, 2]);
    }

    #[test]
    fn full_grid_still_clears_slots_and_counts_deliveries() {
        // 3x3 interior: two agents, six clutter cells, one free cell
        let mut world = World::new(5, 5);
        world.draw_boundary();
        for (id, x) in [(0, 1), (1, 2)] {
            let position = Position::new(x, 1);
            world.agents.push(crate::engine::AgentState {
                id,
                position,
                carrying: None,
            });
            world.agent_locations[position] = Some(id);
        }
        for (x, y) in [(3, 1), (1, 2), (3, 2), (1, 3), (2, 3), (3, 3)] {
            world.terrain[Position::new(x, y)] = crate::engine::CellType::Clutter;
        }
        let first = hand(&mut world, 0, Color::Green);
        let second = hand(&mut world, 1, Color::Green);
        let config = config(RewardRule::GoalColor, MismatchPolicy::Respawn);
        let mut collected = CollectedColors::new(3);

        let resolution = resolve(&mut world, &config, &mut collected);
        assert!(matches!(
            resolution.failure,
            Some(PlacementError::Exhausted { .. })
        ));
        assert_eq!(resolution.rewards, vec![1.0, 1.0]);
        assert_eq!(resolution.delta.max_gathered, 2);
        assert_eq!(collected.counts(), &[2, 0, 0]);
        assert_eq!(world.carrying(), vec![None, None]);

        let states = [world.objects[first].state, world.objects[second].state];
        assert_eq!(
            states
                .iter()
                .filter(|state| **state == ObjectState::OnGrid(Position::new(2, 2)))
                .count(),
            1
        );
        assert_eq!(
            states
                .iter()
                .filter(|state| **state == ObjectState::Removed)
                .count(),
            1
        );
    }

    #[test]
    fn metrics_accumulate() {
        let mut total = Metrics::default();
        total += Metrics {
            max_gathered: 2,
            other_gathered: 1,
        };
        total += Metrics {
            max_gathered: 0,
            other_gathered: 3,
        };
        assert_eq!(
            total,
            Metrics {
                max_gathered: 2,
                other_gathered: 4
            }
        );
    }

    #[test]
    fn collected_reset_zeroes_and_resizes() {
        let mut collected = CollectedColors::new(2);
        collected.increment(1);
        collected.reset(4);
        assert_eq!(collected.counts(), &[0, 0, 0, 0]);
    }
}
