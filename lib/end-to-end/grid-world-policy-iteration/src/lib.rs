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

use grid_world_logic::{
    Coordinate, Direction, EpisodeStatus, GridWorld, GridWorldError, GridWorldLayout, StepResult,
};
use log::info;
use policy_iteration::{
    Distribution, Float, IterationLimits, Mdp, PolicyIterationAgent, PolicyIterationError,
    PolicyIterationOutcome, Rng, State, DEFAULT_DELTA, NUM_ACTIONS,
};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

mod render;

pub use render::{render_policy, render_values};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    GridWorld(#[from] GridWorldError),

    #[error(transparent)]
    PolicyIteration(#[from] PolicyIterationError),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action(pub Direction);

impl policy_iteration::Action for Action {
    const ALL: [Self; NUM_ACTIONS] = [
        Action(Direction::Up),
        Action(Direction::Right),
        Action(Direction::Down),
        Action(Direction::Left),
    ];
}

fn to_coordinate(state: State) -> Coordinate {
    Coordinate::new(state.x, state.y)
}

fn to_state(coordinate: Coordinate) -> State {
    State::new(coordinate.x, coordinate.y)
}

/// The grid world's dynamics, as seen by the solver.
pub struct Model<'a>(pub &'a GridWorld);

impl Mdp for Model<'_> {
    type Action = Action;

    fn width(&self) -> usize {
        self.0.width()
    }

    fn height(&self) -> usize {
        self.0.height()
    }

    fn is_wall(&self, state: State) -> bool {
        self.0.is_wall(to_coordinate(state))
    }

    fn successor(&self, state: State, action: Action) -> State {
        to_state(self.0.successor_state(to_coordinate(state), action.0))
    }

    fn reward(&self, from: State, to: State) -> Float {
        self.0.reward(to_coordinate(from), to_coordinate(to))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub gamma: Float,
    pub delta: Float,
    pub max_sweeps_per_evaluation: usize,
    pub max_improvements: usize,
    pub max_steps_per_episode: usize,
    pub seed: u64,
}

impl SolverConfig {
    pub fn limits(&self) -> IterationLimits {
        IterationLimits {
            max_sweeps_per_evaluation: self.max_sweeps_per_evaluation,
            max_improvements: self.max_improvements,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            gamma: 0.9,
            delta: DEFAULT_DELTA,
            max_sweeps_per_evaluation: 10_000,
            max_improvements: 1_000,
            max_steps_per_episode: 100,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: GridWorldLayout,
    pub solver: SolverConfig,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Steps taken by the agent until it reached a terminal cell or ran out of steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Episode {
    pub steps: Vec<StepResult>,
    pub total_reward: Float,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub x: usize,
    pub y: usize,
    pub reward: Float,
    pub is_wall: bool,
    pub is_terminal: bool,
    pub value: Float,
    pub policy: Distribution,
}

/// Read-only view of everything a renderer draws: the cells, the value function, the policy
/// and the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub width: usize,
    pub height: usize,
    pub agent: Coordinate,
    pub status: EpisodeStatus,
    pub cells: Vec<CellSnapshot>,
}

/// Drives a grid world and a policy iteration agent on behalf of a user interface.
///
/// The two halves are independent: sweeping and improving never move the real agent, and the
/// real agent can be stepped with whatever policy the agent currently has. Stopping a running
/// agent is simply not calling `step` again.
pub struct Session {
    world: GridWorld,
    agent: PolicyIterationAgent<Action>,
    config: SolverConfig,
    rng: Rng,
}

impl Session {
    pub fn new(world: GridWorld, config: SolverConfig) -> Result<Self, SessionError> {
        if !(config.delta > 0.0) {
            return Err(PolicyIterationError::InvalidDelta(config.delta).into());
        }
        let agent = PolicyIterationAgent::new(&Model(&world), config.gamma)?;
        let rng = Rng::seed_from_u64(config.seed);
        Ok(Self {
            world,
            agent,
            config,
            rng,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        Self::new(config.layout.build()?, config.solver.clone())
    }

    pub fn world(&self) -> &GridWorld {
        &self.world
    }

    pub fn agent(&self) -> &PolicyIterationAgent<Action> {
        &self.agent
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn policy_sweep(&mut self) -> Result<bool, SessionError> {
        Ok(self
            .agent
            .policy_sweep(&Model(&self.world), self.config.delta)?)
    }

    pub fn policy_improve(&mut self) -> Result<bool, SessionError> {
        Ok(self
            .agent
            .policy_improve(&Model(&self.world), self.config.delta)?)
    }

    pub fn run_to_convergence(&mut self) -> Result<PolicyIterationOutcome, SessionError> {
        Ok(self.agent.run_to_convergence(
            &Model(&self.world),
            self.config.delta,
            self.config.limits(),
        )?)
    }

    /// Move the real agent one step, with an action sampled from the current policy.
    pub fn step(&mut self) -> Result<StepResult, SessionError> {
        let position = self.world.agent();
        let action = self
            .agent
            .get_action(position.x, position.y, &mut self.rng)?;
        Ok(self.world.step(action.0))
    }

    /// Step the real agent until it reaches a terminal cell, giving up after
    /// `max_steps_per_episode` steps.
    pub fn run_episode(&mut self) -> Result<Episode, SessionError> {
        let mut episode = Episode {
            steps: Vec::new(),
            total_reward: 0.0,
            done: self.world.status() == EpisodeStatus::Done,
        };
        while !episode.done && episode.steps.len() < self.config.max_steps_per_episode {
            let result = self.step()?;
            episode.total_reward += result.reward;
            episode.done = result.done;
            episode.steps.push(result);
        }

        if episode.done {
            info!(
                "reached terminal state {} after {} steps, total reward: {}",
                self.world.agent(),
                episode.steps.len(),
                episode.total_reward
            );
        } else {
            info!(
                "did not reach a terminal state in {} steps",
                episode.steps.len()
            );
        }
        Ok(episode)
    }

    /// Return the real agent to the start. The value function and policy are kept.
    pub fn reset(&mut self) {
        self.world.reset();
    }

    /// Start solving from scratch. The real agent stays where it is.
    pub fn reset_solver(&mut self) {
        self.agent.reset();
    }

    pub fn snapshot(&self) -> Result<Snapshot, SessionError> {
        let values = self.agent.values();
        let policy = self.agent.policy_table();
        let cells = self
            .world
            .coordinates()
            .map(|coordinate| -> Result<CellSnapshot, SessionError> {
                let cell = self.world.cell(coordinate.x, coordinate.y)?;
                let state = to_state(coordinate);
                Ok(CellSnapshot {
                    x: coordinate.x,
                    y: coordinate.y,
                    reward: cell.reward,
                    is_wall: cell.is_wall,
                    is_terminal: cell.is_terminal,
                    value: values[state],
                    policy: policy[state],
                })
            })
            .collect::<Result<Vec<_>, SessionError>>()?;

        Ok(Snapshot {
            width: self.world.width(),
            height: self.world.height(),
            agent: self.world.agent(),
            status: self.world.status(),
            cells,
        })
    }

    pub fn snapshot_json(&self) -> Result<String, SessionError> {
        Ok(serde_json::to_string_pretty(&self.snapshot()?)?)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;

    fn three_by_three() -> GridWorld {
        let mut world = GridWorld::new(3, 3, Coordinate::new(0, 0)).expect("new failed");
        world.set_reward(2, 2, 1.0).expect("set_reward failed");
        world.make_terminal(2, 2).expect("make_terminal failed");
        world
    }

    fn manhattan(a: Coordinate, b: Coordinate) -> usize {
        a.x.abs_diff(b.x) + a.y.abs_diff(b.y)
    }

    #[test]
    fn test_actions_follow_direction_ordinals() {
        for (i, action) in <Action as policy_iteration::Action>::ALL.iter().enumerate() {
            assert_eq!(action.0.index(), i);
        }
    }

    #[test]
    fn test_three_by_three_policy_iteration() {
        let terminal = Coordinate::new(2, 2);
        let mut session =
            Session::new(three_by_three(), SolverConfig::default()).expect("new failed");
        let outcome = session.run_to_convergence().expect("run failed");
        assert!(outcome.converged);

        let agent = session.agent();
        assert_abs_diff_eq!(agent.value_function(1, 2).unwrap(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(agent.value_function(2, 1).unwrap(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(agent.value_function(1, 1).unwrap(), 0.9, epsilon = 1e-9);
        assert_abs_diff_eq!(agent.value_function(0, 0).unwrap(), 0.729, epsilon = 1e-9);
        assert_eq!(agent.value_function(2, 2), Ok(0.0));

        let world = session.world();
        for state in world.coordinates().filter(|c| *c != terminal) {
            let distribution = agent.policy(state.x, state.y).unwrap();
            let total: Float = distribution.iter().sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-12);
            for direction in Direction::ALL {
                let next_state = world.successor_state(state, direction);
                let closer = manhattan(next_state, terminal) < manhattan(state, terminal);
                assert_eq!(
                    distribution[direction.index()] > 0.0,
                    closer,
                    "{} in {}",
                    direction,
                    state
                );
            }
        }
    }

    #[test]
    fn test_episode_after_convergence_takes_shortest_path() {
        let mut session =
            Session::new(three_by_three(), SolverConfig::default()).expect("new failed");
        session.run_to_convergence().expect("run failed");

        let episode = session.run_episode().expect("episode failed");
        assert!(episode.done);
        assert_eq!(episode.steps.len(), 4);
        assert_eq!(episode.total_reward, 1.0);
        assert_eq!(session.world().agent(), Coordinate::new(2, 2));

        // A finished episode does not step again until reset.
        let episode = session.run_episode().expect("episode failed");
        assert!(episode.steps.is_empty());

        session.reset();
        assert_eq!(session.world().agent(), Coordinate::new(0, 0));
        assert_eq!(session.world().status(), EpisodeStatus::Running);
        // Resetting the agent keeps what was learned.
        assert_abs_diff_eq!(
            session.agent().value_function(0, 0).unwrap(),
            0.729,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_reference_layout_reaches_goal() {
        let mut session = Session::from_config(&Config::default()).expect("new failed");
        let outcome = session.run_to_convergence().expect("run failed");
        assert!(outcome.converged);

        let episode = session.run_episode().expect("episode failed");
        assert!(episode.done);
        assert_eq!(session.world().agent(), Coordinate::new(4, 6));
        assert!(episode.steps.len() < session.config().max_steps_per_episode);
    }

    #[test]
    fn test_episode_gives_up_after_max_steps() {
        let config = SolverConfig {
            max_steps_per_episode: 3,
            ..SolverConfig::default()
        };
        let mut world = GridWorld::new(10, 1, Coordinate::new(0, 0)).expect("new failed");
        world.make_terminal(9, 0).expect("make_terminal failed");
        let mut session = Session::new(world, config).expect("new failed");

        let episode = session.run_episode().expect("episode failed");
        assert!(!episode.done);
        assert_eq!(episode.steps.len(), 3);
    }

    #[test]
    fn test_sweeping_does_not_move_the_agent() {
        let mut session =
            Session::new(three_by_three(), SolverConfig::default()).expect("new failed");
        session.step().expect("step failed");
        let position = session.world().agent();
        session.policy_sweep().expect("sweep failed");
        session.policy_improve().expect("improve failed");
        assert_eq!(session.world().agent(), position);
    }

    #[test]
    fn test_reset_solver_keeps_agent() {
        let mut session =
            Session::new(three_by_three(), SolverConfig::default()).expect("new failed");
        session.run_to_convergence().expect("run failed");
        session.step().expect("step failed");
        let position = session.world().agent();

        session.reset_solver();
        assert_eq!(session.world().agent(), position);
        assert_eq!(session.agent().value_function(1, 2), Ok(0.0));
        assert_eq!(session.agent().policy(1, 2), Ok([0.25; 4]));
    }

    #[test]
    fn test_invalid_solver_config_is_rejected() {
        let config = SolverConfig {
            gamma: 1.0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            Session::new(three_by_three(), config),
            Err(SessionError::PolicyIteration(
                PolicyIterationError::InvalidDiscount(_)
            ))
        ));

        let config = SolverConfig {
            delta: -1.0,
            ..SolverConfig::default()
        };
        assert!(matches!(
            Session::new(three_by_three(), config),
            Err(SessionError::PolicyIteration(
                PolicyIterationError::InvalidDelta(_)
            ))
        ));
    }

    #[test]
    fn test_config_from_json() {
        let config = Config::from_json(r#"{ "solver": { "gamma": 0.5, "seed": 7 } }"#)
            .expect("parse failed");
        assert_eq!(config.solver.gamma, 0.5);
        assert_eq!(config.solver.seed, 7);
        assert_eq!(config.solver.delta, DEFAULT_DELTA);
        assert_eq!(config.layout, GridWorldLayout::default());

        assert!(matches!(
            Config::from_json("{ \"solver\": 3 }"),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let mut config = Config::default();
        config.layout.terminals.push(Coordinate::new(9, 0));
        assert!(matches!(
            Session::from_config(&config),
            Err(SessionError::GridWorld(GridWorldError::TerminalWall(_)))
        ));
    }

    #[test]
    fn test_snapshot() {
        let mut world = three_by_three();
        world.make_wall(1, 1).expect("make_wall failed");
        let mut session = Session::new(world, SolverConfig::default()).expect("new failed");
        session.policy_sweep().expect("sweep failed");

        let snapshot = session.snapshot().expect("snapshot failed");
        assert_eq!(snapshot.width, 3);
        assert_eq!(snapshot.height, 3);
        assert_eq!(snapshot.agent, Coordinate::new(0, 0));
        assert_eq!(snapshot.status, EpisodeStatus::Running);
        assert_eq!(snapshot.cells.len(), 9);

        let wall = snapshot
            .cells
            .iter()
            .find(|c| c.x == 1 && c.y == 1)
            .unwrap();
        assert!(wall.is_wall);
        let before_terminal = snapshot
            .cells
            .iter()
            .find(|c| c.x == 1 && c.y == 2)
            .unwrap();
        assert_eq!(before_terminal.policy, [0.25; 4]);
        assert_eq!(
            before_terminal.value,
            session.agent().value_function(1, 2).unwrap()
        );

        let json: serde_json::Value =
            serde_json::from_str(&session.snapshot_json().expect("json failed"))
                .expect("parse failed");
        assert_eq!(json["cells"].as_array().map(|cells| cells.len()), Some(9));
        assert_eq!(json["status"], "Running");
    }

    #[test]
    fn test_solving_settles_next_to_a_punishing_terminal() {
        let mut world = GridWorld::new(4, 1, Coordinate::new(0, 0)).expect("new failed");
        world.set_reward(3, 0, -5.0).expect("set_reward failed");
        world.make_terminal(3, 0).expect("make_terminal failed");
        let mut session = Session::new(world, SolverConfig::default()).expect("new failed");

        let outcome = session.run_to_convergence().expect("run failed");
        assert!(outcome.converged, "{:?}", outcome);
        let next_to_terminal = session.agent().policy(2, 0).unwrap();
        assert_eq!(next_to_terminal[Direction::Right.index()], 0.0);

        let episode = session.run_episode().expect("episode failed");
        assert!(!episode.done);
        assert_eq!(episode.total_reward, 0.0);
    }

    fn arbitrary_world() -> impl Strategy<Value = GridWorld> {
        (1..7usize, 1..7usize).prop_flat_map(|(width, height)| {
            (
                Just(width),
                Just(height),
                prop::collection::vec((0..width, 0..height), 0..width * height / 2 + 1),
                prop::collection::vec((0..width, 0..height, -10.0..5.0f64), 0..6),
                prop::collection::vec((0..width, 0..height), 0..3),
            )
                .prop_map(|(width, height, walls, rewards, terminals)| {
                    let mut world = GridWorld::new(width, height, Coordinate::new(0, 0))
                        .expect("new failed");
                    for (x, y) in walls {
                        let _ = world.make_wall(x, y);
                    }
                    for (x, y, reward) in rewards {
                        world.set_reward(x, y, reward).expect("set_reward failed");
                    }
                    for (x, y) in terminals {
                        let _ = world.make_terminal(x, y);
                    }
                    world
                })
        })
    }

    fn q_values(
        agent: &PolicyIterationAgent<Action>,
        model: &Model<'_>,
        state: State,
    ) -> [Float; NUM_ACTIONS] {
        <Action as policy_iteration::Action>::ALL.map(|action| {
            let next_state = model.successor(state, action);
            model.reward(state, next_state) + agent.gamma() * agent.values()[next_state]
        })
    }

    // Holds right after an improvement, before the values move again.
    fn check_greedy(
        world: &GridWorld,
        agent: &PolicyIterationAgent<Action>,
    ) -> Result<(), TestCaseError> {
        let model = Model(world);
        for coordinate in world.coordinates() {
            let state = to_state(coordinate);
            let distribution = agent.policy_table()[state];
            if world.is_wall(coordinate) {
                prop_assert_eq!(agent.values()[state], 0.0);
                prop_assert_eq!(distribution, [0.25; NUM_ACTIONS]);
                continue;
            }

            let total: Float = distribution.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-12, "{} sums to {}", coordinate, total);

            let q = q_values(agent, &model, state);
            let max_q = q.iter().copied().fold(Float::NEG_INFINITY, Float::max);
            for (probability, q_value) in distribution.iter().zip(q) {
                prop_assert_eq!(
                    *probability > 0.0,
                    q_value == max_q,
                    "{}: {:?} for {:?}",
                    coordinate,
                    distribution,
                    q
                );
            }
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_every_improvement_is_greedy(world in arbitrary_world()) {
            let model = Model(&world);
            let mut agent = PolicyIterationAgent::new(&model, 0.9).expect("new failed");
            for _ in 0..3 {
                for _ in 0..200 {
                    if agent.policy_sweep(&model, DEFAULT_DELTA).expect("sweep failed") {
                        break;
                    }
                }
                agent.policy_improve(&model, DEFAULT_DELTA).expect("improve failed");
                check_greedy(&world, &agent)?;
            }
        }

        #[test]
        fn test_policy_iteration_converges_on_arbitrary_worlds(world in arbitrary_world()) {
            let mut session = Session::new(world, SolverConfig::default()).expect("new failed");
            let outcome = session.run_to_convergence().expect("run failed");
            prop_assert!(outcome.converged, "{:?}\n{}", outcome, session.world());
            check_greedy(session.world(), session.agent())?;
        }
    }
}
