// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Task doubles.
//!
//! The bodies here expect to run on a [`TestHolder`]; on any other holder they
//! fail with an error naming the holder class.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::anyhow;
use cadence_core::{
    downcast_holder, Holder, PersistError, SimpleTask, Task, TaskBody, TaskCodecRegistry,
    ONE_SHOT,
};
use serde::{Deserialize, Serialize};

use crate::holder::TestHolder;

fn test_holder(holder: &dyn Holder) -> anyhow::Result<&TestHolder> {
    downcast_holder::<TestHolder>(holder)
        .ok_or_else(|| anyhow!("expected a TestHolder, got `{}`", holder.holder_class()))
}

/// Appends `entry` to the holder's journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Journal line.
    pub entry: String,
}

impl TaskBody for Record {
    const KIND: &'static str = "dry/record";

    fn run(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        test_holder(holder)?.journal().push(self.entry.clone());
        Ok(())
    }
}

/// Journal-writing task.
pub fn record(entry: impl Into<String>) -> SimpleTask<Record> {
    SimpleTask::new(Record {
        entry: entry.into(),
    })
}

/// Journals `spawn:<entry>` and schedules a one-shot [`Record`] of `entry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spawn {
    /// Entry written by the spawned task.
    pub entry: String,
    /// Group of the spawned task.
    pub group: String,
    /// Initial delay of the spawned task.
    pub delay: u32,
}

impl TaskBody for Spawn {
    const KIND: &'static str = "dry/spawn";

    fn run(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        let holder = test_holder(holder)?;
        holder.journal().push(format!("spawn:{}", self.entry));
        let scheduler = holder
            .scheduler()
            .ok_or_else(|| anyhow!("{} has no scheduler", holder.label()))?;
        scheduler.schedule(
            Some(&self.entry),
            &self.group,
            self.delay,
            ONE_SHOT,
            &record(self.entry.clone()),
        )?;
        Ok(())
    }
}

/// Task scheduling a follow-up from inside its own execution.
pub fn spawn(
    entry: impl Into<String>,
    group: impl Into<String>,
    delay: u32,
) -> SimpleTask<Spawn> {
    SimpleTask::new(Spawn {
        entry: entry.into(),
        group: group.into(),
        delay,
    })
}

/// Cancels the first task named `name` on the holder's scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelNamed {
    /// Name of the task to cancel.
    pub name: String,
}

impl TaskBody for CancelNamed {
    const KIND: &'static str = "dry/cancel-named";

    fn run(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        let holder = test_holder(holder)?;
        if let Some(target) = holder
            .scheduler()
            .and_then(|s| s.get_task_by_name(&self.name))
        {
            target.task().cancel();
            holder.journal().push(format!("cancel:{}", self.name));
        }
        Ok(())
    }
}

/// Task cancelling a sibling by name.
pub fn cancel_named(name: impl Into<String>) -> SimpleTask<CancelNamed> {
    SimpleTask::new(CancelNamed { name: name.into() })
}

/// Always fails with `message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fail {
    /// Error message.
    pub message: String,
}

impl TaskBody for Fail {
    const KIND: &'static str = "dry/fail";

    fn run(&self, _holder: &dyn Holder) -> anyhow::Result<()> {
        Err(anyhow!(self.message.clone()))
    }
}

/// Failing task.
pub fn fail(message: impl Into<String>) -> SimpleTask<Fail> {
    SimpleTask::new(Fail {
        message: message.into(),
    })
}

/// Codec registry knowing every persistable body in this module.
pub fn dry_codecs() -> Result<TaskCodecRegistry, PersistError> {
    let mut codecs = TaskCodecRegistry::new();
    codecs.register_body::<Record>()?;
    codecs.register_body::<Spawn>()?;
    codecs.register_body::<CancelNamed>()?;
    codecs.register_body::<Fail>()?;
    Ok(codecs)
}

/// Task implementing the contract by hand, counting executions.
///
/// Stateless clones share the execution counter but not the cancelled flag,
/// so a test keeps the original and reads how often the scheduled copies ran.
#[derive(Debug, Default)]
pub struct CountingTask {
    runs: Rc<Cell<u32>>,
    cancelled: Cell<bool>,
}

impl CountingTask {
    /// Fresh task with its own counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Executions across this task and all of its clones.
    pub fn runs(&self) -> u32 {
        self.runs.get()
    }
}

impl Task for CountingTask {
    fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    fn cancel(&self) {
        self.cancelled.set(true);
    }

    fn execute(&self, _holder: &dyn Holder) -> anyhow::Result<()> {
        self.runs.set(self.runs.get() + 1);
        Ok(())
    }

    fn clone_stateless(&self) -> Box<dyn Task> {
        Box::new(Self {
            runs: Rc::clone(&self.runs),
            cancelled: Cell::new(false),
        })
    }

    fn kind(&self) -> &'static str {
        "dry/counting"
    }

    fn encode_body(&self) -> Result<Vec<u8>, PersistError> {
        Err(PersistError::Encode(
            "counting tasks share a live counter and cannot be persisted".into(),
        ))
    }
}
