//! Grid mechanics the gather environments run on: terrain, the object
//! arena, agent slots, bounded random placement, and movement with
//! pickup-on-entry.

use std::ops::Range;

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{Color, EntityId, ObjectId, Position, map::Grid};

/// Represents the static type of a cell in the environment grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    #[default]
    Floor,
    Wall,
    /// Blocking obstacle scattered to make the task harder.
    Clutter,
    /// Terrain strip agents cannot cross.
    Hazard,
    /// Stationary fixture, never pickable.
    Battery,
}

impl CellType {
    /// Whether agents may stand on this terrain.
    #[inline]
    pub fn is_passable(self) -> bool {
        matches!(self, CellType::Floor)
    }
}

/// Represents actions an agent can decide to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Wait,
    Move { dx: isize, dy: isize },
}

impl Action {
    /// Size of the discrete action space.
    pub const COUNT: usize = 5;

    pub const UP: Action = Action::Move { dx: 0, dy: -1 };
    pub const DOWN: Action = Action::Move { dx: 0, dy: 1 };
    pub const LEFT: Action = Action::Move { dx: -1, dy: 0 };
    pub const RIGHT: Action = Action::Move { dx: 1, dy: 0 };

    /// Maps a discrete action index to an action: wait, up, down, left, right.
    pub fn from_index(index: usize) -> Option<Action> {
        match index {
            0 => Some(Action::Wait),
            1 => Some(Action::UP),
            2 => Some(Action::DOWN),
            3 => Some(Action::LEFT),
            4 => Some(Action::RIGHT),
            _ => None,
        }
    }

    /// Samples uniformly from the discrete action space.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Action {
        Self::from_index(rng.random_range(0..Self::COUNT)).unwrap_or(Action::Wait)
    }
}

/// Represents the outcome of processing an agent's action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    Success,
    PickedUp(ObjectId),
    Failure(String),
}

/// Where an object currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectState {
    OnGrid(Position),
    Carried(EntityId),
    /// Taken out of play for the rest of the episode.
    Removed,
}

/// A colored pickable ball.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedObject {
    pub id: ObjectId,
    pub color: Color,
    pub state: ObjectState,
}

impl PlacedObject {
    pub fn position(&self) -> Option<Position> {
        match self.state {
            ObjectState::OnGrid(pos) => Some(pos),
            _ => None,
        }
    }
}

/// Holds the state of an agent within the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: EntityId,
    pub position: Position,
    /// The single carrying slot.
    pub carrying: Option<ObjectId>,
}

/// Raised when bounded random placement cannot find an empty cell.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("no empty cell found for {what} after {tries} tries")]
    Exhausted { what: &'static str, tries: usize },
}

/// The full mutable state of one episode.
///
/// Objects live in an arena indexed by [`ObjectId`]; agents refer to what
/// they carry by id, and the object records who carries it, so there are
/// no references between the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub terrain: Grid<CellType>,
    pub object_locations: Grid<Option<ObjectId>>,
    pub agent_locations: Grid<Option<EntityId>>,
    pub objects: Vec<PlacedObject>,
    pub agents: Vec<AgentState>,
}

impl World {
    /// Creates a world of open floor with no walls, objects or agents.
    pub fn new(width: usize, height: usize) -> Self {
        World {
            terrain: Grid::new(width, height),
            object_locations: Grid::new(width, height),
            agent_locations: Grid::new(width, height),
            objects: Vec::new(),
            agents: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.terrain.width()
    }

    pub fn height(&self) -> usize {
        self.terrain.height()
    }

    /// Surrounds the grid with walls.
    pub fn draw_boundary(&mut self) {
        self.terrain.fill_border(CellType::Wall);
    }

    /// Paints a horizontal band of `cell` terrain on row `y`, returning the
    /// number of cells painted.
    pub fn horizontal_strip(&mut self, y: usize, columns: Range<usize>, cell: CellType) -> usize {
        self.terrain.fill_row(y, columns, cell)
    }

    /// A cell is empty when it is open floor with no object and no agent.
    pub fn is_empty(&self, position: Position) -> bool {
        self.terrain.get(position).is_some_and(|cell| cell.is_passable())
            && self.object_locations[position].is_none()
            && self.agent_locations[position].is_none()
    }

    /// Samples interior cells uniformly, up to `max_tries` times, and returns
    /// the first empty one.
    pub fn find_empty<R: Rng + ?Sized>(&self, rng: &mut R, max_tries: usize) -> Option<Position> {
        let (width, height) = (self.width(), self.height());
        if width < 3 || height < 3 {
            return None;
        }
        (0..max_tries)
            .map(|_| Position::new(rng.random_range(1..width - 1), rng.random_range(1..height - 1)))
            .find(|pos| self.is_empty(*pos))
    }

    fn sample_empty<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        max_tries: usize,
        what: &'static str,
    ) -> Result<Position, PlacementError> {
        self.find_empty(rng, max_tries)
            .ok_or(PlacementError::Exhausted {
                what,
                tries: max_tries,
            })
    }

    /// Creates a new object of `color` at a random empty cell.
    pub fn spawn_object<R: Rng + ?Sized>(
        &mut self,
        color: Color,
        rng: &mut R,
        max_tries: usize,
    ) -> Result<ObjectId, PlacementError> {
        let position = self.sample_empty(rng, max_tries, "object")?;
        let id = self.objects.len();
        self.objects.push(PlacedObject {
            id,
            color,
            state: ObjectState::OnGrid(position),
        });
        self.object_locations[position] = Some(id);
        Ok(id)
    }

    /// Moves an existing object to a random empty cell, detaching it from
    /// its carrier if it has one.
    pub fn place_object<R: Rng + ?Sized>(
        &mut self,
        id: ObjectId,
        rng: &mut R,
        max_tries: usize,
    ) -> Result<Position, PlacementError> {
        let position = self.sample_empty(rng, max_tries, "object")?;
        self.detach(id);
        self.objects[id].state = ObjectState::OnGrid(position);
        self.object_locations[position] = Some(id);
        Ok(position)
    }

    /// Takes an object out of play.
    pub fn remove_object(&mut self, id: ObjectId) {
        self.detach(id);
        self.objects[id].state = ObjectState::Removed;
    }

    fn detach(&mut self, id: ObjectId) {
        match self.objects[id].state {
            ObjectState::OnGrid(old) => {
                if self.object_locations[old] == Some(id) {
                    self.object_locations[old] = None;
                }
            }
            ObjectState::Carried(agent_id) => {
                if let Some(agent) = self.agents.get_mut(agent_id) {
                    if agent.carrying == Some(id) {
                        agent.carrying = None;
                    }
                }
            }
            ObjectState::Removed => {}
        }
    }

    /// Turns a random empty cell into clutter.
    pub fn place_clutter<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        max_tries: usize,
    ) -> Result<Position, PlacementError> {
        let position = self.sample_empty(rng, max_tries, "clutter")?;
        self.terrain[position] = CellType::Clutter;
        Ok(position)
    }

    /// Adds the next agent at a random empty cell.
    pub fn place_agent<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        max_tries: usize,
    ) -> Result<EntityId, PlacementError> {
        let position = self.sample_empty(rng, max_tries, "agent")?;
        let id = self.agents.len();
        self.agents.push(AgentState {
            id,
            position,
            carrying: None,
        });
        self.agent_locations[position] = Some(id);
        Ok(id)
    }

    /// Moves an agent directly to `position`, which must be empty.
    pub fn teleport_agent(&mut self, agent_id: EntityId, position: Position) -> Result<(), String> {
        let current = match self.agents.get(agent_id) {
            Some(agent) => agent.position,
            None => return Err(format!("Agent {} not found.", agent_id)),
        };
        if current == position {
            return Ok(());
        }
        if !self.is_empty(position) {
            return Err(format!("Position {:?} is not empty.", position));
        }
        self.agent_locations[current] = None;
        self.agent_locations[position] = Some(agent_id);
        self.agents[agent_id].position = position;
        Ok(())
    }

    /// One slot per agent: the carried object, if any.
    pub fn carrying(&self) -> Vec<Option<ObjectId>> {
        self.agents.iter().map(|agent| agent.carrying).collect()
    }

    /// Objects currently lying on the grid.
    pub fn objects_on_grid(&self) -> impl Iterator<Item = &PlacedObject> {
        self.objects
            .iter()
            .filter(|object| matches!(object.state, ObjectState::OnGrid(_)))
    }

    pub fn count_on_grid(&self, color: Color) -> usize {
        self.objects_on_grid()
            .filter(|object| object.color == color)
            .count()
    }

    /// Applies one action per agent, visiting agents in a random order.
    /// Results are returned indexed by agent.
    pub fn apply_actions<R: Rng + ?Sized>(
        &mut self,
        actions: &[Action],
        rng: &mut R,
    ) -> Vec<ActionResult> {
        let mut order: Vec<EntityId> = (0..actions.len().min(self.agents.len())).collect();
        order.shuffle(rng);

        let mut results = vec![ActionResult::Success; order.len()];
        for agent_id in order {
            let result = self.process_action(agent_id, actions[agent_id]);
            if let ActionResult::Failure(reason) = &result {
                trace!(agent = agent_id, ?reason, "action rejected");
            }
            results[agent_id] = result;
        }
        results
    }

    /// Processes a single action for a given agent.
    pub fn process_action(&mut self, agent_id: EntityId, action: Action) -> ActionResult {
        let Some(agent_state) = self.agents.get(agent_id) else {
            return ActionResult::Failure(format!("Agent {} not found.", agent_id));
        };

        let (dx, dy) = match action {
            Action::Wait => return ActionResult::Success,
            Action::Move { dx: 0, dy: 0 } => return ActionResult::Success,
            Action::Move { dx, dy } => (dx, dy),
        };

        let current_pos = agent_state.position;
        let carrying = agent_state.carrying;
        let target_pos = match (
            current_pos.x.checked_add_signed(dx),
            current_pos.y.checked_add_signed(dy),
        ) {
            (Some(x), Some(y)) if self.terrain.is_valid(Position::new(x, y)) => Position::new(x, y),
            _ => return ActionResult::Failure("Target position is out of bounds.".to_string()),
        };

        match self.terrain[target_pos] {
            CellType::Floor => {}
            CellType::Wall | CellType::Clutter => {
                return ActionResult::Failure("Cannot move into a wall.".to_string());
            }
            CellType::Hazard => {
                return ActionResult::Failure("Cannot move into hazard terrain.".to_string());
            }
            CellType::Battery => {
                return ActionResult::Failure("Cannot move into the battery.".to_string());
            }
        }

        if self.agent_locations[target_pos].is_some() {
            return ActionResult::Failure(
                "Target position is occupied by another agent.".to_string(),
            );
        }

        let picked = match self.object_locations[target_pos] {
            Some(_) if carrying.is_some() => {
                return ActionResult::Failure(
                    "Target holds an object and the carrying slot is full.".to_string(),
                );
            }
            Some(object_id) => {
                // Pick it up on entry
                self.object_locations[target_pos] = None;
                self.objects[object_id].state = ObjectState::Carried(agent_id);
                self.agents[agent_id].carrying = Some(object_id);
                Some(object_id)
            }
            None => None,
        };

        self.agent_locations[current_pos] = None;
        self.agent_locations[target_pos] = Some(agent_id);
        self.agents[agent_id].position = target_pos;

        match picked {
            Some(object_id) => ActionResult::PickedUp(object_id),
            None => ActionResult::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn walled(size: usize) -> World {
        let mut world = World::new(size, size);
        world.draw_boundary();
        world
    }

    #[test]
    fn find_empty_never_returns_border_or_blocked_cells() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut world = walled(6);
        assert_eq!(world.horizontal_strip(2, 1..5, CellType::Hazard), 4);
        for _ in 0..200 {
            let pos = world.find_empty(&mut rng, 100).unwrap();
            assert!(world.terrain.is_interior(pos));
            assert_eq!(world.terrain[pos], CellType::Floor);
        }
    }

    #[test]
    fn placement_exhausts_on_full_grid() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut world = walled(3);
        world.place_agent(&mut rng, 100).unwrap();
        assert_eq!(
            world.spawn_object(Color::Red, &mut rng, 100),
            Err(PlacementError::Exhausted {
                what: "object",
                tries: 100
            })
        );
    }

    #[test]
    fn moving_onto_object_picks_it_up() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut world = walled(5);
        world.place_agent(&mut rng, 100).unwrap();
        world.teleport_agent(0, Position::new(1, 1)).unwrap();
        let id = world.objects.len();
        world.objects.push(PlacedObject {
            id,
            color: Color::Blue,
            state: ObjectState::OnGrid(Position::new(2, 1)),
        });
        world.object_locations[Position::new(2, 1)] = Some(id);

        assert_eq!(world.process_action(0, Action::RIGHT), ActionResult::PickedUp(id));
        assert_eq!(world.agents[0].position, Position::new(2, 1));
        assert_eq!(world.agents[0].carrying, Some(id));
        assert_eq!(world.objects[id].state, ObjectState::Carried(0));
        assert!(world.object_locations[Position::new(2, 1)].is_none());
        assert_eq!(world.count_on_grid(Color::Blue), 0);
    }

    #[test]
    fn walls_and_agents_block_movement() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut world = walled(5);
        world.place_agent(&mut rng, 100).unwrap();
        world.teleport_agent(0, Position::new(1, 1)).unwrap();
        world.place_agent(&mut rng, 100).unwrap();
        world.teleport_agent(1, Position::new(2, 1)).unwrap();

        assert!(matches!(world.process_action(0, Action::UP), ActionResult::Failure(_)));
        assert!(matches!(world.process_action(0, Action::RIGHT), ActionResult::Failure(_)));
        assert_eq!(world.agents[0].position, Position::new(1, 1));
        assert_eq!(world.process_action(0, Action::DOWN), ActionResult::Success);
        assert_eq!(world.agents[0].position, Position::new(1, 2));
        assert_eq!(world.agent_locations[Position::new(1, 1)], None);
    }

    #[test]
    fn place_object_clears_the_carrying_slot() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut world = walled(6);
        world.place_agent(&mut rng, 100).unwrap();
        let id = world.spawn_object(Color::Green, &mut rng, 100).unwrap();
        let old = world.objects[id].position().unwrap();
        world.object_locations[old] = None;
        world.objects[id].state = ObjectState::Carried(0);
        world.agents[0].carrying = Some(id);

        let new_pos = world.place_object(id, &mut rng, 100).unwrap();
        assert_eq!(world.agents[0].carrying, None);
        assert_eq!(world.objects[id].state, ObjectState::OnGrid(new_pos));
        assert_eq!(world.object_locations[new_pos], Some(id));
    }

    #[test]
    fn action_indices_cover_the_space() {
        let actions: Vec<_> = (0..Action::COUNT).filter_map(Action::from_index).collect();
        assert_eq!(actions.len(), Action::COUNT);
        assert_eq!(Action::from_index(Action::COUNT), None);
    }
}
