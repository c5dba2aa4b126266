// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scheduler persistence.
//!
//! A scheduler persists as its `active` flag plus its records in order. Each
//! record carries its timing, its runtime counters and a tagged task payload.
//! Task bodies are opaque CBOR blobs; a [`TaskCodecRegistry`] maps the payload
//! kind back to a decoder on restore.
//!
//! The registry of active schedulers is never persisted. After restoring a
//! world, rebuild it with
//! [`SchedulerRegistry::rebuild_from_tree`](crate::SchedulerRegistry::rebuild_from_tree).

use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PersistError;
use crate::function_call::FunctionCall;
use crate::holder::Holder;
use crate::record::{ScheduledTask, ONE_SHOT};
use crate::scheduler::Scheduler;
use crate::task::{SimpleTask, Task, TaskBody};

/// Encodes `value` as CBOR, mapping failures to [`PersistError::Encode`].
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| PersistError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes CBOR produced by [`to_cbor`], mapping failures to [`PersistError::Decode`].
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PersistError> {
    ciborium::from_reader(bytes).map_err(|e| PersistError::Decode(e.to_string()))
}

/// Decoder turning a persisted body back into a task.
pub type TaskDecoder = fn(&[u8]) -> Result<Box<dyn Task>, PersistError>;

/// Lookup from task kind to decoder.
#[derive(Debug, Clone)]
pub struct TaskCodecRegistry {
    decoders: FxHashMap<&'static str, TaskDecoder>,
}

impl TaskCodecRegistry {
    /// Registry with the built-in function-call kind pre-registered.
    pub fn new() -> Self {
        let mut decoders: FxHashMap<&'static str, TaskDecoder> = FxHashMap::default();
        decoders.insert(FunctionCall::KIND, SimpleTask::<FunctionCall>::decode);
        Self { decoders }
    }

    /// Registers a decoder for `kind`.
    pub fn register(
        &mut self,
        kind: &'static str,
        decoder: TaskDecoder,
    ) -> Result<(), PersistError> {
        if self.decoders.contains_key(kind) {
            return Err(PersistError::DuplicateTaskKind(kind));
        }
        self.decoders.insert(kind, decoder);
        Ok(())
    }

    /// Registers the adapter decoder for body type `B`.
    pub fn register_body<B: TaskBody>(&mut self) -> Result<(), PersistError> {
        self.register(B::KIND, SimpleTask::<B>::decode)
    }

    /// Whether `kind` has a decoder.
    pub fn contains(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Rebuilds the task described by `payload`, including its cancelled flag.
    pub fn decode(&self, payload: &TaskPayload) -> Result<Box<dyn Task>, PersistError> {
        let decoder = self
            .decoders
            .get(payload.kind.as_str())
            .ok_or_else(|| PersistError::UnknownTaskKind(payload.kind.clone()))?;
        let task = decoder(&payload.body)?;
        if payload.cancelled {
            task.cancel();
        }
        Ok(task)
    }
}

impl Default for TaskCodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted form of a task instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// Decoder tag from [`Task::kind`].
    pub kind: String,
    /// Cancellation state at snapshot time.
    pub cancelled: bool,
    /// Bytes from [`Task::encode_body`].
    pub body: Vec<u8>,
}

impl TaskPayload {
    /// Captures `task`.
    pub fn capture(task: &dyn Task) -> Result<Self, PersistError> {
        Ok(Self {
            kind: task.kind().to_owned(),
            cancelled: task.is_cancelled(),
            body: task.encode_body()?,
        })
    }
}

/// Persisted form of one scheduled-task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTaskSnapshot {
    /// Optional lookup name.
    pub name: Option<String>,
    /// Group key.
    pub group: String,
    /// Ticks until first execution.
    pub initial_delay: u32,
    /// Repeat period or `-1`.
    pub periodic_delay: i32,
    /// Whether a periodic record has fired at least once.
    pub executed_initially: bool,
    /// Matching ticks since the last execution.
    pub ticks_since_last_execution: u32,
    /// The record's task.
    pub task: TaskPayload,
}

/// Persisted form of a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    /// Whether the scheduler was advancing.
    pub active: bool,
    /// Records in registration order.
    pub tasks: Vec<ScheduledTaskSnapshot>,
}

impl SchedulerSnapshot {
    /// Canonical CBOR encoding.
    pub fn to_cbor(&self) -> Result<Vec<u8>, PersistError> {
        to_cbor(self)
    }

    /// Parses bytes produced by [`SchedulerSnapshot::to_cbor`].
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, PersistError> {
        from_cbor(bytes)
    }
}

impl Scheduler {
    /// Captures the `active` flag and every record, cancelled ones included.
    pub fn snapshot(&self) -> Result<SchedulerSnapshot, PersistError> {
        let tasks = self
            .get_tasks()
            .iter()
            .map(|record| {
                Ok(ScheduledTaskSnapshot {
                    name: record.name().map(str::to_owned),
                    group: record.group().to_owned(),
                    initial_delay: record.initial_delay(),
                    periodic_delay: record.periodic_delay(),
                    executed_initially: record.executed_initially(),
                    ticks_since_last_execution: record.ticks_since_last_execution(),
                    task: TaskPayload::capture(record.task())?,
                })
            })
            .collect::<Result<Vec<_>, PersistError>>()?;
        Ok(SchedulerSnapshot {
            active: self.is_active(),
            tasks,
        })
    }

    /// Rebuilds a scheduler for `holder` from `snapshot`.
    ///
    /// Every record is validated again. The new scheduler is not added to any
    /// registry; call `rebuild_from_tree` once the whole world is restored.
    pub fn restore<H: Holder>(
        holder: Weak<H>,
        snapshot: &SchedulerSnapshot,
        codecs: &TaskCodecRegistry,
    ) -> Result<Rc<Self>, PersistError> {
        let mut records = Vec::with_capacity(snapshot.tasks.len());
        for entry in &snapshot.tasks {
            if entry.executed_initially && entry.periodic_delay == ONE_SHOT {
                return Err(PersistError::OneShotMarkedExecuted(entry.group.clone()));
            }
            let task = codecs.decode(&entry.task)?;
            let record = ScheduledTask::new(
                entry.name.clone(),
                entry.group.clone(),
                entry.initial_delay,
                entry.periodic_delay,
                task,
            )?
            .with_progress(entry.executed_initially, entry.ticks_since_last_execution);
            records.push(Rc::new(record));
        }
        let scheduler = Self::from_parts(holder, snapshot.active, records);
        debug!(scheduler = %scheduler.id(), tasks = scheduler.len(), "scheduler restored");
        Ok(scheduler)
    }
}
