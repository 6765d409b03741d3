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

//! Plain text views of a solver's tables, laid out like the grid world's `Display`.

use grid_world_logic::{Coordinate, GridWorld};
use policy_iteration::{PolicyTable, State, ValueTable};

const ARROWS: [char; 4] = ['^', '>', 'v', '<'];

fn render<F>(world: &GridWorld, cell_width: usize, render_cell: F) -> String
where
    F: Fn(Coordinate) -> String,
{
    let label_width = (world.height() - 1).to_string().len();
    let mut result = String::new();
    result.push_str(&" ".repeat(label_width + 1));
    for x in 0..world.width() {
        result.push_str(&format!(" {:>width$}", x, width = cell_width));
    }
    for y in 0..world.height() {
        result.push_str(&format!("\n{:>width$} ", y, width = label_width));
        for x in 0..world.width() {
            let cell = render_cell(Coordinate::new(x, y));
            result.push_str(&format!(" {:>width$}", cell, width = cell_width));
        }
    }
    result
}

/// Value of every cell, two decimals. Walls are drawn as `#`.
pub fn render_values(world: &GridWorld, values: &ValueTable) -> String {
    render(world, 6, |coordinate| {
        if world.is_wall(coordinate) {
            "#".repeat(6)
        } else {
            format!("{:.2}", values[State::new(coordinate.x, coordinate.y)])
        }
    })
}

/// Supported actions of every cell, one slot per action in `^ > v <` order, `.` for actions the
/// policy never takes. Walls are drawn as `#`, terminal cells as `T`.
pub fn render_policy(world: &GridWorld, policy: &PolicyTable) -> String {
    render(world, 4, |coordinate| {
        if world.is_wall(coordinate) {
            "#".repeat(4)
        } else if world.is_terminal(coordinate) {
            "T".repeat(4)
        } else {
            let distribution = policy[State::new(coordinate.x, coordinate.y)];
            ARROWS
                .iter()
                .zip(distribution)
                .map(|(arrow, p)| if p > 0.0 { *arrow } else { '.' })
                .collect()
        }
    })
}
