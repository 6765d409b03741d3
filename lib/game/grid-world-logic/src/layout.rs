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

//! Declarative grid world setup, e.g. loaded from a config file.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Coordinate, GridWorld, GridWorldError, RewardRange};

/// Reward assigned to a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardSpec {
    /// Column.
    pub x: usize,

    /// Row.
    pub y: usize,

    /// Reward of the cell.
    pub reward: f64,
}

/// Everything needed to build a grid world. `build` applies walls first, then rewards, then
/// terminal cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridWorldLayout {
    /// Number of columns.
    pub width: usize,

    /// Number of rows.
    pub height: usize,

    /// Where the agent starts an episode.
    pub start: Coordinate,

    /// Rewards allowed on cells.
    #[serde(default)]
    pub reward_range: RewardRange,

    /// Wall cells.
    #[serde(default)]
    pub walls: Vec<Coordinate>,

    /// Non-zero rewards.
    #[serde(default)]
    pub rewards: Vec<RewardSpec>,

    /// Terminal cells.
    #[serde(default)]
    pub terminals: Vec<Coordinate>,
}

fn reward(x: usize, y: usize, reward: f64) -> RewardSpec {
    RewardSpec { x, y, reward }
}

// The 10x10 world: a goal at (4, 6) behind a diagonal of walls, with penalties around it.
impl Default for GridWorldLayout {
    fn default() -> Self {
        let walls = [
            (4, 5),
            (3, 6),
            (2, 7),
            (1, 7),
            (1, 6),
            (1, 5),
            (1, 4),
            (5, 5),
            (6, 5),
            (7, 5),
            (7, 2),
            (8, 1),
            (9, 0),
        ]
        .into_iter()
        .map(|(x, y)| Coordinate::new(x, y))
        .collect();

        Self {
            width: 10,
            height: 10,
            start: Coordinate::new(0, 0),
            reward_range: RewardRange::default(),
            walls,
            rewards: vec![
                reward(4, 6, 1.0),
                reward(5, 6, -1.0),
                reward(4, 8, -1.0),
                reward(6, 7, -1.0),
                reward(0, 7, -2.0),
                reward(0, 6, -5.0),
            ],
            terminals: vec![Coordinate::new(4, 6)],
        }
    }
}

impl GridWorldLayout {
    /// Build the grid world, stopping at the first invalid wall, reward or terminal cell.
    pub fn build(&self) -> Result<GridWorld, GridWorldError> {
        let mut world =
            GridWorld::with_reward_range(self.width, self.height, self.start, self.reward_range)?;
        for wall in &self.walls {
            world.make_wall(wall.x, wall.y)?;
        }
        for reward in &self.rewards {
            world.set_reward(reward.x, reward.y, reward.reward)?;
        }
        for terminal in &self.terminals {
            world.make_terminal(terminal.x, terminal.y)?;
        }
        debug!(
            "built {}x{} grid world with {} walls and {} terminal cells",
            self.width,
            self.height,
            self.walls.len(),
            self.terminals.len()
        );
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_builds() {
        let world = GridWorldLayout::default().build().expect("build failed");
        assert_eq!(world.width(), 10);
        assert_eq!(world.height(), 10);
        assert_eq!(world.agent(), Coordinate::new(0, 0));

        let walls = world.coordinates().filter(|c| world.is_wall(*c)).count();
        assert_eq!(walls, 13);

        let terminals: Vec<Coordinate> = world
            .coordinates()
            .filter(|c| world.is_terminal(*c))
            .collect();
        assert_eq!(terminals, vec![Coordinate::new(4, 6)]);
        assert_eq!(world.cell(4, 6).expect("cell failed").reward, 1.0);
        assert_eq!(world.cell(0, 6).expect("cell failed").reward, -5.0);
    }

    #[test]
    fn test_layout_from_json_uses_defaults_for_missing_lists() {
        let json = r#"{
            "width": 3,
            "height": 2,
            "start": { "x": 0, "y": 1 },
            "rewards": [{ "x": 2, "y": 0, "reward": 1.0 }],
            "terminals": [{ "x": 2, "y": 0 }]
        }"#;
        let layout: GridWorldLayout = serde_json::from_str(json).expect("parse failed");
        assert_eq!(layout.reward_range, RewardRange::default());
        assert!(layout.walls.is_empty());

        let world = layout.build().expect("build failed");
        assert_eq!(world.start(), Coordinate::new(0, 1));
        assert!(world.is_terminal(Coordinate::new(2, 0)));
    }

    #[test]
    fn test_layout_with_wall_on_start_fails() {
        let layout = GridWorldLayout {
            walls: vec![Coordinate::new(0, 0)],
            ..GridWorldLayout::default()
        };
        assert_eq!(
            layout.build(),
            Err(GridWorldError::WallOnAgent(Coordinate::new(0, 0)))
        );
    }

    #[test]
    fn test_layout_with_reward_out_of_range_fails() {
        let layout = GridWorldLayout {
            rewards: vec![reward(1, 1, 100.0)],
            ..GridWorldLayout::default()
        };
        assert_eq!(
            layout.build(),
            Err(GridWorldError::RewardOutOfRange(
                100.0,
                RewardRange::default()
            ))
        );
    }
}
