use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
};

use rand::{SeedableRng, rngs::StdRng};

use crate::{
    Color, EntityId, Position,
    engine::{Action, AgentState, World},
};

/// Read-only view of the world handed to an agent each step.
#[derive(Debug)]
pub struct AgentView<'a> {
    pub agent_state: &'a AgentState,
    pub world: &'a World,
    /// Colors this agent is paid for.
    pub targets: &'a [Color],
}

/// Trait defining the behavior of an agent.
/// Agents decide which action to take based on the [`AgentView`].
pub trait Agent {
    /// Returns the index of the agent this behavior drives.
    fn id(&self) -> EntityId;

    /// Determines the action the agent wants to perform based on its view of the world.
    fn get_action(&mut self, view: &AgentView) -> Action;
}

/// Samples actions uniformly from the discrete action space.
#[derive(Debug)]
pub struct RandomWalker {
    id: EntityId,
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(id: EntityId, seed: u64) -> Self {
        Self {
            id,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Agent for RandomWalker {
    fn id(&self) -> EntityId {
        self.id
    }

    fn get_action(&mut self, _view: &AgentView) -> Action {
        Action::sample(&mut self.rng)
    }
}

/// Walks the shortest path to the nearest object of a target color.
///
/// Replans every step since objects respawn and other agents move.
#[derive(Debug)]
pub struct GatherPlanner {
    id: EntityId,
}

impl GatherPlanner {
    pub fn new(id: EntityId) -> Self {
        Self { id }
    }

    fn manhattan_distance(a: Position, b: Position) -> usize {
        a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
    }

    /// Converts a move between two adjacent positions into an Action
    fn step_towards(src: Position, dst: Position) -> Action {
        let dx = dst.x as isize - src.x as isize;
        let dy = dst.y as isize - src.y as isize;
        match (dx, dy) {
            (0, 0) => Action::Wait,
            (dx, dy) if dx.abs() + dy.abs() == 1 => Action::Move { dx, dy },
            _ => Action::Wait,
        }
    }

    /// Neighbours an agent could step onto: open floor, no agent. Object
    /// cells count only when they are the goal, since entering one picks
    /// it up.
    fn neighbours(world: &World, position: Position, goal: Position) -> Vec<Position> {
        let directions = [(0, 1), (0, -1), (1, 0), (-1, 0)];
        directions
            .iter()
            .filter_map(|(dx, dy)| {
                let x = position.x.checked_add_signed(*dx)?;
                let y = position.y.checked_add_signed(*dy)?;
                Some(Position::new(x, y))
            })
            .filter(|next| {
                *next == goal && world.agent_locations.get(*next) == Some(&None)
                    || world.is_empty(*next)
            })
            .collect()
    }

    /// A* over the four-connected grid.
    fn a_star_path(world: &World, start: Position, goal: Position) -> Option<Vec<Position>> {
        #[derive(Clone, Eq, PartialEq)]
        struct Frontier {
            priority: usize,
            position: Position,
        }

        impl Ord for Frontier {
            fn cmp(&self, other: &Self) -> Ordering {
                // Reverse ordering for min-heap behavior
                other.priority.cmp(&self.priority)
            }
        }

        impl PartialOrd for Frontier {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut frontier = BinaryHeap::new();
        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut cost_so_far: HashMap<Position, usize> = HashMap::new();

        frontier.push(Frontier {
            priority: 0,
            position: start,
        });
        cost_so_far.insert(start, 0);

        while let Some(Frontier {
            position: current, ..
        }) = frontier.pop()
        {
            if current == goal {
                let mut path = vec![goal];
                let mut node = goal;
                while node != start {
                    node = *came_from.get(&node)?;
                    path.push(node);
                }
                path.reverse();
                return Some(path);
            }

            let base = cost_so_far.get(&current).copied().unwrap_or(usize::MAX);
            for next in Self::neighbours(world, current, goal) {
                let new_cost = base.saturating_add(1);
                if cost_so_far.get(&next).is_none_or(|known| new_cost < *known) {
                    cost_so_far.insert(next, new_cost);
                    frontier.push(Frontier {
                        priority: new_cost + Self::manhattan_distance(next, goal),
                        position: next,
                    });
                    came_from.insert(next, current);
                }
            }
        }

        None
    }
}

impl Agent for GatherPlanner {
    fn id(&self) -> EntityId {
        self.id
    }

    fn get_action(&mut self, view: &AgentView) -> Action {
        let start = view.agent_state.position;

        let mut targets: Vec<Position> = view
            .world
            .objects_on_grid()
            .filter(|object| view.targets.contains(&object.color))
            .filter_map(|object| object.position())
            .collect();
        targets.sort_by_key(|target| Self::manhattan_distance(start, *target));

        targets
            .into_iter()
            .filter_map(|target| Self::a_star_path(view.world, start, target))
            .min_by_key(|path| path.len())
            .and_then(|path| path.get(1).copied())
            .map(|next| Self::step_towards(start, next))
            .unwrap_or(Action::Wait)
    }
}
