// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scheduled-task records and the per-record tick algorithm.

use std::cell::Cell;
use std::fmt;

use tracing::trace;

use crate::error::ScheduleError;
use crate::holder::Holder;
use crate::task::Task;

/// Periodic delay value meaning "run once, then cancel".
pub const ONE_SHOT: i32 = -1;

/// Checks the scheduling invariants shared by records and templates.
pub(crate) fn validate(
    group: &str,
    initial_delay: u32,
    periodic_delay: i32,
) -> Result<(), ScheduleError> {
    if group.trim().is_empty() {
        return Err(ScheduleError::BlankGroup);
    }
    if initial_delay == 0 {
        return Err(ScheduleError::InvalidInitialDelay(initial_delay));
    }
    if periodic_delay != ONE_SHOT && periodic_delay <= 0 {
        return Err(ScheduleError::InvalidPeriodicDelay(periodic_delay));
    }
    Ok(())
}

/// Lifecycle phase of a record, derived from its counters and its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordPhase {
    /// Waiting for the initial delay to elapse.
    Pending,
    /// Executed at least once and will repeat.
    ActivePeriodic,
    /// Cancelled (one-shot that fired, or cancelled by a caller); removed on
    /// the scheduler's next scan.
    Done,
}

/// A task registered on a scheduler, with its timing and runtime counters.
///
/// Records are owned by their scheduler and handed out as shared read-only
/// handles. The counters only move inside `Scheduler::update`.
pub struct ScheduledTask {
    name: Option<String>,
    group: String,
    initial_delay: u32,
    periodic_delay: i32,
    task: Box<dyn Task>,
    executed_initially: Cell<bool>,
    ticks_since_last_execution: Cell<u32>,
}

impl ScheduledTask {
    /// Builds a fresh record. `task` must already be a private clone.
    pub(crate) fn new(
        name: Option<String>,
        group: String,
        initial_delay: u32,
        periodic_delay: i32,
        task: Box<dyn Task>,
    ) -> Result<Self, ScheduleError> {
        validate(&group, initial_delay, periodic_delay)?;
        Ok(Self {
            name,
            group,
            initial_delay,
            periodic_delay,
            task,
            executed_initially: Cell::new(false),
            ticks_since_last_execution: Cell::new(0),
        })
    }

    /// Overwrites the runtime counters with persisted values.
    pub(crate) fn with_progress(self, executed_initially: bool, ticks: u32) -> Self {
        self.executed_initially.set(executed_initially);
        self.ticks_since_last_execution.set(ticks);
        self
    }

    /// Optional lookup name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Group key this record ticks in.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Ticks until the first execution (inclusive).
    pub fn initial_delay(&self) -> u32 {
        self.initial_delay
    }

    /// Ticks between repeated executions, or [`ONE_SHOT`].
    pub fn periodic_delay(&self) -> i32 {
        self.periodic_delay
    }

    /// Whether this record repeats after its first execution.
    pub fn is_periodic(&self) -> bool {
        self.periodic_delay > 0
    }

    /// The record's private task instance.
    pub fn task(&self) -> &dyn Task {
        self.task.as_ref()
    }

    /// Whether a periodic record has completed its first execution.
    pub fn executed_initially(&self) -> bool {
        self.executed_initially.get()
    }

    /// Matching ticks observed since the last execution (or registration).
    pub fn ticks_since_last_execution(&self) -> u32 {
        self.ticks_since_last_execution.get()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> RecordPhase {
        if self.task.is_cancelled() {
            RecordPhase::Done
        } else if self.executed_initially.get() {
            RecordPhase::ActivePeriodic
        } else {
            RecordPhase::Pending
        }
    }

    /// Advances the record by one matching tick, executing the task when due.
    ///
    /// The elapsed counter is reset before `execute` runs, so a failing task
    /// is not retried on the next tick. A cancelled record never advances.
    pub(crate) fn advance(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        if self.task.is_cancelled() {
            return Ok(());
        }
        let ticks = self.ticks_since_last_execution.get().saturating_add(1);
        self.ticks_since_last_execution.set(ticks);

        if !self.executed_initially.get() {
            if ticks < self.initial_delay {
                return Ok(());
            }
            if self.is_periodic() {
                self.executed_initially.set(true);
            } else {
                self.task.cancel();
            }
            return self.fire(holder);
        }

        // Periodic records are the only ones that set `executed_initially`.
        let period = u32::try_from(self.periodic_delay).unwrap_or(u32::MAX);
        if ticks >= period {
            return self.fire(holder);
        }
        Ok(())
    }

    fn fire(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        self.ticks_since_last_execution.set(0);
        trace!(
            task = self.name.as_deref().unwrap_or("<anon>"),
            group = %self.group,
            kind = self.task.kind(),
            "executing scheduled task"
        );
        self.task.execute(holder)
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("initial_delay", &self.initial_delay)
            .field("periodic_delay", &self.periodic_delay)
            .field("executed_initially", &self.executed_initially.get())
            .field(
                "ticks_since_last_execution",
                &self.ticks_since_last_execution.get(),
            )
            .field("task", &self.task)
            .finish()
    }
}
