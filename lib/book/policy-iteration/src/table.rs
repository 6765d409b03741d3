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

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{Distribution, Float, PolicyIterationError, State};

/// One entry per state of a `width` x `height` grid, stored column by column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable<T>")]
pub struct Table<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

#[derive(Deserialize)]
struct RawTable<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> TryFrom<RawTable<T>> for Table<T> {
    type Error = PolicyIterationError;

    fn try_from(raw: RawTable<T>) -> Result<Self, Self::Error> {
        if raw.cells.len() != raw.width * raw.height {
            return Err(PolicyIterationError::InvalidTableShape {
                width: raw.width,
                height: raw.height,
                cells: raw.cells.len(),
            });
        }
        Ok(Self {
            width: raw.width,
            height: raw.height,
            cells: raw.cells,
        })
    }
}

/// State-value function.
pub type ValueTable = Table<Float>;

/// Action probabilities of every state.
pub type PolicyTable = Table<Distribution>;

impl<T: Clone> Table<T> {
    pub fn new(width: usize, height: usize, initial: T) -> Self {
        Self {
            width,
            height,
            cells: vec![initial; width * height],
        }
    }

    pub fn fill(&mut self, value: T) {
        self.cells.iter_mut().for_each(|cell| *cell = value.clone());
    }
}

impl<T> Table<T> {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn contains(&self, state: State) -> bool {
        state.x < self.width && state.y < self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Result<&T, PolicyIterationError> {
        let state = State::new(x, y);
        if self.contains(state) {
            Ok(&self[state])
        } else {
            Err(PolicyIterationError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            })
        }
    }

    /// All states, all rows of column 0 first, then column 1, and so on. Sweeps visit states in
    /// this order.
    pub fn states(&self) -> impl Iterator<Item = State> {
        let height = self.height;
        (0..self.width).flat_map(move |x| (0..height).map(move |y| State::new(x, y)))
    }

    fn offset(&self, state: State) -> usize {
        assert!(
            self.contains(state),
            "state ({}, {}) out of bounds of a {}x{} table",
            state.x,
            state.y,
            self.width,
            self.height
        );
        state.x * self.height + state.y
    }
}

impl<T> Index<State> for Table<T> {
    type Output = T;

    fn index(&self, state: State) -> &T {
        &self.cells[self.offset(state)]
    }
}

impl<T> IndexMut<State> for Table<T> {
    fn index_mut(&mut self, state: State) -> &mut T {
        let offset = self.offset(state);
        &mut self.cells[offset]
    }
}
