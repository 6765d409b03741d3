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

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use grid_world_policy_iteration::{render_policy, render_values, Config, Session};
use log::info;

/// Solve a grid world with policy iteration, then let the agent walk it.
#[derive(Parser, Debug)]
#[command(name = "policy-iteration-grid-world")]
struct Args {
    /// JSON file with a `layout` and `solver` settings. Without it the built-in 10x10 world
    /// is used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for action sampling.
    #[arg(long)]
    seed: Option<u64>,

    /// Discount factor, in (0, 1).
    #[arg(long)]
    gamma: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run policy iteration to convergence and print the values and policy.
    Solve,

    /// Solve, then run one episode from the start.
    Play,

    /// Solve, then print the session as JSON.
    Snapshot,

    /// Read commands from stdin: sweep, improve, solve, step, start, reset, show, dump, quit.
    Interactive,
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            info!("loaded config from {}", path.display());
            Config::from_json(&json)?
        }
        None => Config::default(),
    };
    if let Some(seed) = args.seed {
        config.solver.seed = seed;
    }
    if let Some(gamma) = args.gamma {
        config.solver.gamma = gamma;
    }
    Ok(config)
}

fn show<W: Write>(session: &Session, output: &mut W) -> anyhow::Result<()> {
    let world = session.world();
    writeln!(output, "{}\n", world)?;
    writeln!(output, "{}\n", render_values(world, session.agent().values()))?;
    writeln!(
        output,
        "{}",
        render_policy(world, session.agent().policy_table())
    )?;
    Ok(())
}

fn solve<W: Write>(session: &mut Session, output: &mut W) -> anyhow::Result<()> {
    let outcome = session.run_to_convergence()?;
    writeln!(
        output,
        "improvements: {}, sweeps: {}, converged: {}",
        outcome.improvements, outcome.sweeps, outcome.converged
    )?;
    Ok(())
}

fn play<W: Write>(session: &mut Session, output: &mut W) -> anyhow::Result<()> {
    let episode = session.run_episode()?;
    for step in &episode.steps {
        writeln!(output, "{} reward: {}", step.state, step.reward)?;
    }
    if episode.done {
        writeln!(
            output,
            "reached the endpoint in {} steps, total reward: {}",
            episode.steps.len(),
            episode.total_reward
        )?;
    } else {
        writeln!(
            output,
            "did not reach the endpoint in {} steps",
            episode.steps.len()
        )?;
    }
    Ok(())
}

fn interactive<R: BufRead, W: Write>(
    session: &mut Session,
    input: R,
    output: &mut W,
) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line?;
        match line.trim() {
            "" => continue,
            "sweep" => {
                let converged = session.policy_sweep()?;
                writeln!(
                    output,
                    "converged: {}, max change: {}",
                    converged,
                    session.agent().last_max_change()
                )?;
            }
            "improve" => {
                let stable = session.policy_improve()?;
                writeln!(output, "stable: {}", stable)?;
            }
            "solve" => solve(session, output)?,
            "step" => {
                let result = session.step()?;
                writeln!(
                    output,
                    "{} reward: {} done: {}",
                    result.state, result.reward, result.done
                )?;
            }
            "start" => play(session, output)?,
            "reset" => {
                session.reset();
                writeln!(output, "agent at {}", session.world().agent())?;
            }
            "show" => show(session, output)?,
            "dump" => writeln!(output, "{}", session.snapshot_json()?)?,
            "quit" => break,
            unknown => writeln!(output, "unknown command: {}", unknown)?,
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;
    let mut session = Session::from_config(&config)?;

    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    match args.command {
        Command::Solve => {
            solve(&mut session, &mut output)?;
            show(&session, &mut output)?;
        }
        Command::Play => {
            solve(&mut session, &mut output)?;
            play(&mut session, &mut output)?;
        }
        Command::Snapshot => {
            session.run_to_convergence()?;
            writeln!(output, "{}", session.snapshot_json()?)?;
        }
        Command::Interactive => {
            interactive(&mut session, std::io::stdin().lock(), &mut output)?;
        }
    }
    Ok(())
}
