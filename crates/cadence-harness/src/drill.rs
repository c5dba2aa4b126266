// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Determinism drills and the CLI that runs them.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use cadence_config::{ConfigService, ConfigStore, FsConfigStore};
use cadence_core::{DriverConfig, GroupOrder};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::world::{Simulation, WorldSnapshot};

/// Config store key holding the driver settings.
pub const DRIVER_KEY: &str = "driver";

/// Command line of the harness binary.
#[derive(Parser, Debug)]
#[command(name = "cadence-harness")]
#[command(about = "Determinism drills for the cadence scheduler")]
pub struct Cli {
    /// Driver config JSON; overrides the platform config store
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Drill to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available drills.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the world and log its final digest
    Run {
        /// Ticks to run; defaults to the configured count
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Run the world repeatedly and fail on any digest divergence
    Torture {
        /// Ticks per run
        #[arg(long)]
        ticks: Option<u64>,
        /// Number of runs
        #[arg(long, default_value = "8")]
        runs: u32,
        /// Directory for the diverging snapshots on failure
        #[arg(long)]
        emit_repro: Option<PathBuf>,
    },
    /// Snapshot mid-run, rebuild, finish, and compare with an uninterrupted run
    Resume {
        /// Total ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// Tick after which the world is snapshotted and rebuilt
        #[arg(long)]
        split: u64,
        /// Directory for the diverging snapshots on failure
        #[arg(long)]
        emit_repro: Option<PathBuf>,
    },
}

/// Final state of one drill run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Hex BLAKE3 digest of the world snapshot.
    pub digest: String,
    /// Ticks completed.
    pub ticks: u64,
    /// Creatures alive or dormant at the end.
    pub population: usize,
    /// World snapshot the digest was taken over.
    pub snapshot: WorldSnapshot,
}

fn finish(sim: &Simulation) -> Result<RunOutcome> {
    let snapshot = sim.snapshot()?;
    Ok(RunOutcome {
        digest: snapshot.digest()?,
        ticks: sim.current_tick(),
        population: sim.world().population(),
        snapshot,
    })
}

/// Seeds a world and runs it for `ticks` ticks.
pub fn run_world(order: &GroupOrder, ticks: u64) -> Result<RunOutcome> {
    let mut sim = Simulation::seeded(order.clone())?;
    sim.advance(ticks)?;
    finish(&sim)
}

/// Runs `ticks`, snapshotting after `split` and continuing on a rebuilt world.
pub fn run_split(order: &GroupOrder, ticks: u64, split: u64) -> Result<RunOutcome> {
    if split > ticks {
        bail!("split {split} is past the end of a {ticks}-tick run");
    }
    let mut first = Simulation::seeded(order.clone())?;
    first.advance(split)?;
    let bytes = first.snapshot()?.to_cbor()?;
    drop(first);

    let snapshot = WorldSnapshot::from_cbor(&bytes)?;
    let mut second = Simulation::resume(order.clone(), split, &snapshot)?;
    second.advance(ticks - split)?;
    finish(&second)
}

/// First run whose digest differed from the baseline.
#[derive(Debug, Clone)]
pub struct Divergence {
    /// Zero-based index of the diverging run.
    pub run: u32,
    /// Outcome of run zero.
    pub baseline: RunOutcome,
    /// Outcome of the diverging run.
    pub outcome: RunOutcome,
}

/// Repeats [`run_world`] `runs` times and reports the first divergence.
pub fn torture(order: &GroupOrder, ticks: u64, runs: u32) -> Result<Option<Divergence>> {
    let baseline = run_world(order, ticks)?;
    for run in 1..runs {
        let outcome = run_world(order, ticks)?;
        if outcome.digest != baseline.digest {
            return Ok(Some(Divergence {
                run,
                baseline,
                outcome,
            }));
        }
    }
    Ok(None)
}

/// Writes both snapshots as JSON under `dir`.
pub fn emit_repro(dir: &Path, expected: &RunOutcome, actual: &RunOutcome) -> Result<()> {
    std::fs::create_dir_all(dir).context("failed to create repro dir")?;
    for (file, outcome) in [("expected.json", expected), ("actual.json", actual)] {
        let f = File::create(dir.join(file)).with_context(|| format!("failed to create {file}"))?;
        serde_json::to_writer_pretty(f, &outcome.snapshot)?;
    }
    std::fs::write(
        dir.join("diff.txt"),
        format!("expected {}\nactual   {}\n", expected.digest, actual.digest),
    )
    .context("failed to write diff.txt")?;
    Ok(())
}

/// Reads driver settings from `path`, or else from the `driver` key of `service`.
pub fn load_driver_config<S: ConfigStore>(
    path: Option<&Path>,
    service: Option<&ConfigService<S>>,
) -> Result<DriverConfig> {
    if let Some(path) = path {
        let f = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        return serde_json::from_reader(f)
            .with_context(|| format!("invalid driver config in {}", path.display()));
    }
    match service {
        Some(service) => Ok(service.load_or_default(DRIVER_KEY)?),
        None => Ok(DriverConfig::default()),
    }
}

fn platform_config(path: Option<&Path>) -> Result<DriverConfig> {
    if path.is_some() {
        return load_driver_config::<FsConfigStore>(path, None);
    }
    match FsConfigStore::new() {
        Ok(store) => load_driver_config(None, Some(&ConfigService::new(store))),
        Err(err) => {
            warn!(%err, "no platform config dir; using defaults");
            Ok(DriverConfig::default())
        }
    }
}

fn fail_with_repro(
    message: String,
    repro: Option<&Path>,
    expected: &RunOutcome,
    actual: &RunOutcome,
) -> Result<()> {
    if let Some(dir) = repro {
        emit_repro(dir, expected, actual)?;
        bail!("{message}\nRepro bundle emitted to {}", dir.display());
    }
    bail!("{message}")
}

/// Executes a parsed command line.
pub fn execute(cli: Cli) -> Result<()> {
    let config = platform_config(cli.config.as_deref())?;
    let order = GroupOrder::try_from(&config)?;

    match cli.command {
        Commands::Run { ticks } => {
            let outcome = run_world(&order, ticks.unwrap_or(config.ticks))?;
            info!(
                ticks = outcome.ticks,
                population = outcome.population,
                digest = %outcome.digest,
                "run complete"
            );
        }
        Commands::Torture {
            ticks,
            runs,
            emit_repro,
        } => {
            let ticks = ticks.unwrap_or(config.ticks);
            if let Some(diverged) = torture(&order, ticks, runs)? {
                let msg = format!(
                    "digest diverged on run {}: {} vs {}",
                    diverged.run, diverged.baseline.digest, diverged.outcome.digest
                );
                return fail_with_repro(
                    msg,
                    emit_repro.as_deref(),
                    &diverged.baseline,
                    &diverged.outcome,
                );
            }
            info!(runs, ticks, "torture passed");
        }
        Commands::Resume {
            ticks,
            split,
            emit_repro,
        } => {
            let ticks = ticks.unwrap_or(config.ticks);
            let straight = run_world(&order, ticks)?;
            let resumed = run_split(&order, ticks, split)?;
            if resumed.digest != straight.digest {
                let msg = format!(
                    "resume at tick {split} diverged: {} vs {}",
                    straight.digest, resumed.digest
                );
                return fail_with_repro(msg, emit_repro.as_deref(), &straight, &resumed);
            }
            info!(ticks, split, digest = %resumed.digest, "resume matches");
        }
    }
    Ok(())
}

/// Parses the process arguments and runs the selected drill.
pub fn entrypoint() -> Result<()> {
    execute(Cli::parse())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["cadence-harness", "resume", "--split", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Resume {
                ticks: None,
                split: 7,
                emit_repro: None
            }
        ));

        let cli =
            Cli::try_parse_from(["cadence-harness", "torture", "--runs", "3", "--config", "x.json"])
                .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("x.json")));
        assert!(matches!(cli.command, Commands::Torture { runs: 3, .. }));
    }

    #[test]
    fn resume_requires_split() {
        assert!(Cli::try_parse_from(["cadence-harness", "resume"]).is_err());
    }

    #[test]
    fn split_past_end_is_rejected() {
        let order = GroupOrder::try_from(&DriverConfig::default()).unwrap();
        assert!(run_split(&order, 5, 6).is_err());
    }
}
