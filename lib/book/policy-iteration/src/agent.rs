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

use std::marker::PhantomData;

use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    Action, Distribution, Float, Mdp, PolicyIterationError, PolicyTable, State, ValueTable,
    NUM_ACTIONS,
};

const UNIFORM: Distribution = [1.0 / NUM_ACTIONS as Float; NUM_ACTIONS];

/// Bounds on the outer policy iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationLimits {
    pub max_sweeps_per_evaluation: usize,
    pub max_improvements: usize,
}

impl Default for IterationLimits {
    fn default() -> Self {
        Self {
            max_sweeps_per_evaluation: 10_000,
            max_improvements: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyIterationOutcome {
    pub improvements: usize,
    pub sweeps: usize,
    pub converged: bool,
}

fn support(distribution: &Distribution) -> [bool; NUM_ACTIONS] {
    distribution.map(|probability| probability > 0.0)
}

/// Index of the action chosen by a uniform draw in [0, 1).
///
/// The first action whose cumulative probability exceeds the draw is chosen. If rounding leaves
/// the total just below the draw, the last action with non-zero probability is chosen instead.
pub(crate) fn sample(distribution: &Distribution, draw: Float) -> usize {
    let mut cumulative = 0.0;
    for (i, probability) in distribution.iter().enumerate().take(NUM_ACTIONS - 1) {
        cumulative += probability;
        if draw < cumulative {
            return i;
        }
    }
    distribution
        .iter()
        .rposition(|probability| *probability > 0.0)
        .unwrap_or(NUM_ACTIONS - 1)
}

/// Agent that uses dynamic programming. It requires complete knowledge of the environment's
/// dynamics and only works for finite MDPs.
///
/// The agent owns a value table and a stochastic policy table, both sized to the MDP's grid.
/// Values start at zero and the policy starts out equiprobable in every state. The MDP is passed
/// to every pass rather than owned, so the caller can keep moving a real agent around in it.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyIterationAgent<_Action: Action> {
    gamma: Float,
    values: ValueTable,
    policy: PolicyTable,
    last_max_change: Float,
    phantom_action: PhantomData<_Action>,
}

impl<_Action: Action> PolicyIterationAgent<_Action> {
    pub fn new<_Mdp>(mdp: &_Mdp, gamma: Float) -> Result<Self, PolicyIterationError>
    where
        _Mdp: Mdp<Action = _Action>,
    {
        Self::with_dimensions(mdp.width(), mdp.height(), gamma)
    }

    pub fn with_dimensions(
        width: usize,
        height: usize,
        gamma: Float,
    ) -> Result<Self, PolicyIterationError> {
        if width == 0 || height == 0 {
            return Err(PolicyIterationError::EmptyGrid(width, height));
        }
        if !(gamma > 0.0 && gamma < 1.0) {
            return Err(PolicyIterationError::InvalidDiscount(gamma));
        }
        Ok(Self {
            gamma,
            values: ValueTable::new(width, height, 0.0),
            policy: PolicyTable::new(width, height, UNIFORM),
            last_max_change: 0.0,
            phantom_action: PhantomData,
        })
    }

    pub fn gamma(&self) -> Float {
        self.gamma
    }

    pub fn values(&self) -> &ValueTable {
        &self.values
    }

    pub fn policy_table(&self) -> &PolicyTable {
        &self.policy
    }

    /// Action probabilities in a state, in the order of `Action::ALL`.
    pub fn policy(&self, x: usize, y: usize) -> Result<Distribution, PolicyIterationError> {
        self.policy.get(x, y).copied()
    }

    pub fn value_function(&self, x: usize, y: usize) -> Result<Float, PolicyIterationError> {
        self.values.get(x, y).copied()
    }

    /// Largest absolute change of a state's value during the last sweep.
    pub fn last_max_change(&self) -> Float {
        self.last_max_change
    }

    /// Forget everything: zero values and an equiprobable policy.
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.policy.fill(UNIFORM);
        self.last_max_change = 0.0;
    }

    fn check_dimensions<_Mdp: Mdp>(&self, mdp: &_Mdp) -> Result<(), PolicyIterationError> {
        if mdp.width() == self.values.width() && mdp.height() == self.values.height() {
            Ok(())
        } else {
            Err(PolicyIterationError::DimensionMismatch {
                model_width: mdp.width(),
                model_height: mdp.height(),
                width: self.values.width(),
                height: self.values.height(),
            })
        }
    }

    // r(s, s') + gamma * v(s') for the successor s' of taking the action.
    fn backup<_Mdp>(&self, mdp: &_Mdp, state: State, action: _Action) -> Float
    where
        _Mdp: Mdp<Action = _Action>,
    {
        let next_state = mdp.successor(state, action);
        mdp.reward(state, next_state) + self.gamma * self.values[next_state]
    }

    /// Runs one sweep of iterative policy evaluation for the current policy.
    ///
    /// States are visited in a fixed order and each new value is written back immediately, so
    /// states later in the sweep already see the new values of earlier states. Returns true if
    /// the value of every state changed by less than `delta`.
    pub fn policy_sweep<_Mdp>(
        &mut self,
        mdp: &_Mdp,
        delta: Float,
    ) -> Result<bool, PolicyIterationError>
    where
        _Mdp: Mdp<Action = _Action>,
    {
        if !(delta > 0.0) {
            return Err(PolicyIterationError::InvalidDelta(delta));
        }
        self.check_dimensions(mdp)?;

        let mut max_change: Float = 0.0;
        for state in self.values.states() {
            if mdp.is_wall(state) {
                continue;
            }
            let distribution = self.policy[state];
            let value: Float = _Action::ALL
                .iter()
                .zip(distribution.iter())
                .map(|(action, probability)| probability * self.backup(mdp, state, *action))
                .sum();
            max_change = max_change.max((value - self.values[state]).abs());
            self.values[state] = value;
        }

        self.last_max_change = max_change;
        let converged = max_change < delta;
        debug!(
            "policy sweep: max change: {:.6}, converged: {}",
            max_change, converged
        );
        Ok(converged)
    }

    /// Makes the policy greedy with respect to the current value function.
    ///
    /// In every state the actions with the highest action-value share the probability equally,
    /// all other actions get zero. Returns true if the policy is stable: in every state, each
    /// action the old policy could take has an action-value within `delta` of the best one.
    /// Truly tied actions can differ by the leftovers of an unfinished evaluation, so stability
    /// is not judged on exact ties.
    pub fn policy_improve<_Mdp>(
        &mut self,
        mdp: &_Mdp,
        delta: Float,
    ) -> Result<bool, PolicyIterationError>
    where
        _Mdp: Mdp<Action = _Action>,
    {
        if !(delta > 0.0) {
            return Err(PolicyIterationError::InvalidDelta(delta));
        }
        self.check_dimensions(mdp)?;

        let mut changed_states = 0;
        let mut unstable_states = 0;
        for state in self.policy.states() {
            if mdp.is_wall(state) {
                continue;
            }
            let q_values = _Action::ALL.map(|action| self.backup(mdp, state, action));
            let max_q = q_values
                .iter()
                .copied()
                .fold(Float::NEG_INFINITY, Float::max);
            let best_actions = q_values.iter().filter(|q| **q == max_q).count();
            let probability = 1.0 / best_actions as Float;
            let distribution = q_values.map(|q| if q == max_q { probability } else { 0.0 });

            let previous = self.policy[state];
            let still_greedy = q_values
                .iter()
                .zip(previous)
                .all(|(q, p)| p == 0.0 || max_q - q < delta);
            if !still_greedy {
                unstable_states += 1;
            }
            if support(&distribution) != support(&previous) {
                changed_states += 1;
            }
            self.policy[state] = distribution;
        }

        debug!(
            "policy improvement: {} states changed, {} states had a worse action",
            changed_states, unstable_states
        );
        Ok(unstable_states == 0)
    }

    /// Policy iteration: evaluate the policy with sweeps until they converge, improve it, and
    /// repeat until the policy is stable or a limit is hit.
    pub fn run_to_convergence<_Mdp>(
        &mut self,
        mdp: &_Mdp,
        delta: Float,
        limits: IterationLimits,
    ) -> Result<PolicyIterationOutcome, PolicyIterationError>
    where
        _Mdp: Mdp<Action = _Action>,
    {
        let mut outcome = PolicyIterationOutcome {
            improvements: 0,
            sweeps: 0,
            converged: false,
        };

        while outcome.improvements < limits.max_improvements {
            let mut evaluated = false;
            for _ in 0..limits.max_sweeps_per_evaluation {
                outcome.sweeps += 1;
                if self.policy_sweep(mdp, delta)? {
                    evaluated = true;
                    break;
                }
            }
            if !evaluated {
                warn!(
                    "policy evaluation did not converge within {} sweeps, last max change: {}",
                    limits.max_sweeps_per_evaluation, self.last_max_change
                );
            }

            outcome.improvements += 1;
            if self.policy_improve(mdp, delta)? {
                outcome.converged = true;
                info!(
                    "policy iteration converged after {} improvements and {} sweeps",
                    outcome.improvements, outcome.sweeps
                );
                return Ok(outcome);
            }
        }

        warn!(
            "policy iteration did not converge within {} improvements",
            limits.max_improvements
        );
        Ok(outcome)
    }

    /// Samples an action from the policy in a state, using a uniform draw from `rng`.
    pub fn get_action<R>(
        &self,
        x: usize,
        y: usize,
        rng: &mut R,
    ) -> Result<_Action, PolicyIterationError>
    where
        R: rand::Rng + ?Sized,
    {
        let distribution = self.policy(x, y)?;
        let draw: Float = rng.gen();
        Ok(_Action::ALL[sample(&distribution, draw)])
    }
}
