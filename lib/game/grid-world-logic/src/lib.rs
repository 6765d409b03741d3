/*
 * Copyright (C) 2023 Asim Ihsan
 * SPDX-License-Identifier: AGPL-3.0-only
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU Affero General Public License as published by the Free
 * Software Foundation, version 3.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A
 * PARTICULAR PURPOSE. See the GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License along
 * with this program. If not, see <https://www.gnu.org/licenses/>
 */

#![warn(missing_docs)]

//! Grid world dynamics.
//!
//! This is a library for a deterministic grid world: walls, per-cell rewards and absorbing
//! terminal cells. It is intended to be used as the fully known model of a dynamic programming
//! solver, and to move a single agent around the grid one step at a time.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

pub mod layout;

pub use layout::{GridWorldLayout, RewardSpec};

/// Grid world error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GridWorldError {
    /// Width or height is zero.
    #[error("grid dimensions must be positive: {0}x{1}")]
    InvalidDimensions(usize, usize),

    /// Coordinate is outside of the grid.
    #[error("coordinate is out of bounds: {0}")]
    OutOfBounds(Coordinate),

    /// Minimum reward is larger than maximum reward.
    #[error("invalid reward range: {0}")]
    InvalidRewardRange(RewardRange),

    /// Reward is outside of the configured range.
    #[error("reward {0} is out of range {1}")]
    RewardOutOfRange(f64, RewardRange),

    /// The agent is standing on the cell.
    #[error("cannot turn the cell containing the agent into a wall: {0}")]
    WallOnAgent(Coordinate),

    /// The cell is where the agent starts an episode.
    #[error("cannot turn the start cell into a wall: {0}")]
    WallOnStart(Coordinate),

    /// The cell is terminal.
    #[error("cannot turn a terminal cell into a wall: {0}")]
    WallOnTerminal(Coordinate),

    /// The cell is a wall.
    #[error("cannot make a wall a terminal cell: {0}")]
    TerminalWall(Coordinate),
}

/// Position in the grid. `x` grows to the right, `y` grows downwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Coordinate {
    /// Column.
    pub x: usize,

    /// Row.
    pub y: usize,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Direction of a single move. The discriminant is the action's ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Towards row 0.
    Up = 0,

    /// Towards the last column.
    Right = 1,

    /// Towards the last row.
    Down = 2,

    /// Towards column 0.
    Left = 3,
}

impl Direction {
    /// All directions, in ordinal order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// Ordinal of the direction, 0 to 3.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Direction for an ordinal, or None if the ordinal is not 0 to 3.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (0, -1),
            Direction::Right => (1, 0),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Right => write!(f, "Right"),
            Direction::Down => write!(f, "Down"),
            Direction::Left => write!(f, "Left"),
        }
    }
}

/// Grid world cell.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    /// Reward for acting in this cell, and for entering it if it is terminal.
    pub reward: f64,

    /// Walls can never be entered.
    pub is_wall: bool,

    /// Terminal cells are absorbing.
    pub is_terminal: bool,
}

/// Inclusive range of rewards that may be assigned to a cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardRange {
    /// Smallest allowed reward.
    pub min: f64,

    /// Largest allowed reward.
    pub max: f64,
}

impl RewardRange {
    /// Create a new reward range.
    pub fn new(min: f64, max: f64) -> Result<Self, GridWorldError> {
        let range = Self { min, max };
        if range.is_valid() {
            Ok(range)
        } else {
            Err(GridWorldError::InvalidRewardRange(range))
        }
    }

    /// Whether the reward is inside the range. NaN never is.
    pub fn contains(&self, reward: f64) -> bool {
        self.min <= reward && reward <= self.max
    }

    fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

impl Default for RewardRange {
    fn default() -> Self {
        Self {
            min: -10.0,
            max: 5.0,
        }
    }
}

impl std::fmt::Display for RewardRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Whether the agent's episode is still going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EpisodeStatus {
    /// The agent is on a non-terminal cell.
    Running,

    /// The agent reached a terminal cell. Only `reset` starts a new episode.
    Done,
}

/// Result of a single step of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// New position of the agent.
    pub state: Coordinate,

    /// Reward for the transition.
    pub reward: f64,

    /// Whether the new position is terminal.
    pub done: bool,
}

/// Deterministic grid world.
///
/// Cells are set up with `make_wall`, `set_reward` and `make_terminal`, after which the dynamics
/// are treated as read-only. The grid world also tracks the position of one real agent, which
/// moves with `step` and returns to the start with `reset`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridWorld {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
    start: Coordinate,
    agent: Coordinate,
    reward_range: RewardRange,
}

// print out cells, and row and column numbers which start at 0.
impl std::fmt::Display for GridWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::with_capacity((self.width * 2 + 4) * (self.height + 1));

        s.push_str("  ");
        for x in 0..self.width {
            s.push_str(&format!("{}", x % 10));
            if x == self.width - 1 {
                s.push('\n');
            } else {
                s.push(' ');
            }
        }

        for y in 0..self.height {
            s.push_str(&format!("{} ", y % 10));
            for x in 0..self.width {
                let coordinate = Coordinate::new(x, y);
                let cell = self.cell_at(coordinate);
                let c = if coordinate == self.agent {
                    'A'
                } else if cell.is_wall {
                    '#'
                } else if cell.is_terminal {
                    'T'
                } else {
                    '.'
                };
                s.push(c);
                if x < self.width - 1 {
                    s.push(' ');
                }
            }
            if y < self.height - 1 {
                s.push('\n');
            }
        }
        write!(f, "{}", s)
    }
}

impl GridWorld {
    /// Create a new grid world with the default reward range. All cells start out as regular
    /// cells with zero reward.
    pub fn new(width: usize, height: usize, start: Coordinate) -> Result<Self, GridWorldError> {
        Self::with_reward_range(width, height, start, RewardRange::default())
    }

    /// Create a new grid world with a custom reward range.
    pub fn with_reward_range(
        width: usize,
        height: usize,
        start: Coordinate,
        reward_range: RewardRange,
    ) -> Result<Self, GridWorldError> {
        if width == 0 || height == 0 {
            return Err(GridWorldError::InvalidDimensions(width, height));
        }
        if !reward_range.is_valid() {
            return Err(GridWorldError::InvalidRewardRange(reward_range));
        }
        if start.x >= width || start.y >= height {
            return Err(GridWorldError::OutOfBounds(start));
        }
        Ok(Self {
            width,
            height,
            cells: vec![Cell::default(); width * height],
            start,
            agent: start,
            reward_range,
        })
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Where the agent starts an episode.
    pub fn start(&self) -> Coordinate {
        self.start
    }

    /// Current position of the agent.
    pub fn agent(&self) -> Coordinate {
        self.agent
    }

    /// Rewards allowed by `set_reward`.
    pub fn reward_range(&self) -> RewardRange {
        self.reward_range
    }

    /// Whether the agent's current episode is over.
    pub fn status(&self) -> EpisodeStatus {
        if self.cell_at(self.agent).is_terminal {
            EpisodeStatus::Done
        } else {
            EpisodeStatus::Running
        }
    }

    /// Whether the coordinate lies inside the grid.
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        coordinate.x < self.width && coordinate.y < self.height
    }

    /// Get a bounds-checked coordinate.
    pub fn coordinate(&self, x: usize, y: usize) -> Result<Coordinate, GridWorldError> {
        let coordinate = Coordinate::new(x, y);
        if self.contains(coordinate) {
            Ok(coordinate)
        } else {
            Err(GridWorldError::OutOfBounds(coordinate))
        }
    }

    /// Get a cell.
    pub fn cell(&self, x: usize, y: usize) -> Result<&Cell, GridWorldError> {
        let coordinate = self.coordinate(x, y)?;
        Ok(self.cell_at(coordinate))
    }

    /// Whether the cell is a wall.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside of the grid.
    pub fn is_wall(&self, coordinate: Coordinate) -> bool {
        self.cell_at(coordinate).is_wall
    }

    /// Whether the cell is terminal.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate is outside of the grid.
    pub fn is_terminal(&self, coordinate: Coordinate) -> bool {
        self.cell_at(coordinate).is_terminal
    }

    /// All coordinates, all rows of column 0 first, then column 1, and so on. Every pass over
    /// the grid uses this order.
    pub fn coordinates(&self) -> impl Iterator<Item = Coordinate> {
        let height = self.height;
        (0..self.width).flat_map(move |x| (0..height).map(move |y| Coordinate::new(x, y)))
    }

    fn index(&self, coordinate: Coordinate) -> usize {
        assert!(
            self.contains(coordinate),
            "coordinate out of bounds: {}",
            coordinate
        );
        coordinate.y * self.width + coordinate.x
    }

    fn cell_at(&self, coordinate: Coordinate) -> &Cell {
        &self.cells[self.index(coordinate)]
    }

    fn cell_at_mut(&mut self, coordinate: Coordinate) -> &mut Cell {
        let index = self.index(coordinate);
        &mut self.cells[index]
    }

    /// Make a cell a wall. Nothing happens if the cell is already a wall.
    ///
    /// The cell the agent is standing on, the start cell and terminal cells can not become
    /// walls.
    pub fn make_wall(&mut self, x: usize, y: usize) -> Result<(), GridWorldError> {
        let coordinate = self.coordinate(x, y)?;
        if coordinate == self.agent {
            return Err(GridWorldError::WallOnAgent(coordinate));
        }
        if coordinate == self.start {
            return Err(GridWorldError::WallOnStart(coordinate));
        }
        let cell = self.cell_at_mut(coordinate);
        if cell.is_wall {
            return Ok(());
        }
        if cell.is_terminal {
            return Err(GridWorldError::WallOnTerminal(coordinate));
        }
        cell.is_wall = true;
        debug!("made wall at {}", coordinate);
        Ok(())
    }

    /// Set the reward of a cell. Rewards can be reassigned any number of times.
    pub fn set_reward(&mut self, x: usize, y: usize, reward: f64) -> Result<(), GridWorldError> {
        let coordinate = self.coordinate(x, y)?;
        if !self.reward_range.contains(reward) {
            return Err(GridWorldError::RewardOutOfRange(reward, self.reward_range));
        }
        self.cell_at_mut(coordinate).reward = reward;
        debug!("set reward at {} to {}", coordinate, reward);
        Ok(())
    }

    /// Make a cell terminal. The cell keeps its reward, which is earned when entering it.
    pub fn make_terminal(&mut self, x: usize, y: usize) -> Result<(), GridWorldError> {
        let coordinate = self.coordinate(x, y)?;
        let cell = self.cell_at_mut(coordinate);
        if cell.is_wall {
            return Err(GridWorldError::TerminalWall(coordinate));
        }
        cell.is_terminal = true;
        debug!("made terminal at {}", coordinate);
        Ok(())
    }

    /// Successor state after moving in a direction from a state.
    ///
    /// Terminal states are absorbing. A move off the edge of the grid is cancelled on that axis
    /// only, and a move into a wall is cancelled entirely.
    ///
    /// # Panics
    ///
    /// Panics if the state is outside of the grid.
    pub fn successor_state(&self, state: Coordinate, direction: Direction) -> Coordinate {
        if self.cell_at(state).is_terminal {
            return state;
        }

        let (dx, dy) = direction.delta();
        let x = state
            .x
            .checked_add_signed(dx)
            .filter(|x| *x < self.width)
            .unwrap_or(state.x);
        let y = state
            .y
            .checked_add_signed(dy)
            .filter(|y| *y < self.height)
            .unwrap_or(state.y);

        let next_state = Coordinate::new(x, y);
        if self.cell_at(next_state).is_wall {
            state
        } else {
            next_state
        }
    }

    /// Reward for moving from one state to another.
    ///
    /// Acting in a terminal state earns nothing. Otherwise the reward of the state being left
    /// is earned, plus the reward of the next state if it is terminal.
    ///
    /// # Panics
    ///
    /// Panics if either state is outside of the grid.
    pub fn reward(&self, from: Coordinate, to: Coordinate) -> f64 {
        let from_cell = self.cell_at(from);
        if from_cell.is_terminal {
            return 0.0;
        }

        let to_cell = self.cell_at(to);
        if to_cell.is_terminal {
            from_cell.reward + to_cell.reward
        } else {
            from_cell.reward
        }
    }

    /// Move the agent one step.
    pub fn step(&mut self, direction: Direction) -> StepResult {
        let old_state = self.agent;
        let new_state = self.successor_state(old_state, direction);
        assert!(
            self.contains(new_state),
            "invalid position of agent after step: {}",
            new_state
        );
        self.agent = new_state;

        let result = StepResult {
            state: new_state,
            reward: self.reward(old_state, new_state),
            done: self.cell_at(new_state).is_terminal,
        };
        trace!(
            "step {} from {} to {}, reward: {}, done: {}",
            direction,
            old_state,
            new_state,
            result.reward,
            result.done
        );
        result
    }

    /// Return the agent to the start cell.
    pub fn reset(&mut self) {
        self.agent = self.start;
        debug!("reset agent to {}", self.start);
    }
}
