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

// Policy iteration for finite, fully known MDPs.
//
// See:
// -  Chapter 17: Making Complex Decisions, section 17.2.2 Policy iteration
// -  Sutton & Barto, section 4.3 Policy Iteration

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

mod agent;
mod table;

pub use agent::{IterationLimits, PolicyIterationAgent, PolicyIterationOutcome};
pub use table::{PolicyTable, Table, ValueTable};

pub type Float = f64;
pub type Rng = rand_pcg::Pcg64;

/// Every state has exactly this many actions. All per-state tables have this width.
pub const NUM_ACTIONS: usize = 4;

/// Probability of each action in a state, indexed in the order of `Action::ALL`.
pub type Distribution = [Float; NUM_ACTIONS];

/// Default threshold on the change of a state's value for a sweep to count as converged.
pub const DEFAULT_DELTA: Float = 1e-3;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyIterationError {
    #[error("grid dimensions must be positive: {0}x{1}")]
    EmptyGrid(usize, usize),

    #[error("state ({x}, {y}) is out of bounds of a {width}x{height} grid")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },

    #[error("discount factor must be in (0, 1): {0}")]
    InvalidDiscount(Float),

    #[error("convergence threshold must be positive: {0}")]
    InvalidDelta(Float),

    #[error("a {width}x{height} table needs {} cells, got {cells}", .width * .height)]
    InvalidTableShape {
        width: usize,
        height: usize,
        cells: usize,
    },

    #[error("model is {model_width}x{model_height} but the tables are {width}x{height}")]
    DimensionMismatch {
        model_width: usize,
        model_height: usize,
        width: usize,
        height: usize,
    },
}

/// A closed set of exactly `NUM_ACTIONS` actions.
pub trait Action: Clone + Copy + PartialEq + Eq + Hash + Debug {
    /// All actions. An action's position here is its index in a `Distribution`.
    const ALL: [Self; NUM_ACTIONS];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    pub x: usize,
    pub y: usize,
}

impl State {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// A finite MDP whose states are the cells of a `width` x `height` grid, with deterministic
/// transitions.
///
/// Implementations must never return a successor outside of the grid, or a successor that is a
/// wall. Walls are never visited by the solver.
pub trait Mdp {
    type Action: Action;

    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn is_wall(&self, state: State) -> bool;
    fn successor(&self, state: State, action: Self::Action) -> State;
    fn reward(&self, from: State, to: State) -> Float;
}
