// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Task contract and the cancellation adapter.
//!
//! A [`Task`] is the unit of schedulable work. The engine never stores the
//! caller's instance: every registration goes through
//! [`Task::clone_stateless`], so each scheduled record owns a private copy whose
//! cancellation state is independent of every other copy.
//!
//! All methods take `&self`. Tasks run while their scheduler is mid-update and
//! may reach back into that scheduler (to cancel themselves or to schedule more
//! work), so any mutable task state lives behind interior mutability.

use std::cell::Cell;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PersistError;
use crate::holder::Holder;
use crate::persist::{from_cbor, to_cbor};

/// Unit of schedulable work.
pub trait Task: fmt::Debug {
    /// Whether [`Task::cancel`] has been called on this instance.
    fn is_cancelled(&self) -> bool;

    /// Permanently marks this instance cancelled. Idempotent.
    ///
    /// Cancelling does not interrupt an in-progress `execute`; it prevents
    /// future executions and makes the owning scheduler drop the record on its
    /// next scan.
    fn cancel(&self);

    /// Runs the task against its holder.
    ///
    /// Errors are returned unchanged from `Scheduler::update`.
    fn execute(&self, holder: &dyn Holder) -> anyhow::Result<()>;

    /// Copy of this task with the cancelled flag cleared.
    fn clone_stateless(&self) -> Box<dyn Task>;

    /// Stable tag naming the decoder for [`Task::encode_body`].
    fn kind(&self) -> &'static str;

    /// Serialized task payload, excluding the cancelled flag.
    fn encode_body(&self) -> Result<Vec<u8>, PersistError>;
}

/// Permanent cancellation flag shared by adapter-based tasks.
#[derive(Debug, Default)]
pub struct CancelFlag(Cell<bool>);

impl CancelFlag {
    /// Fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the flag has been raised.
    pub fn is_set(&self) -> bool {
        self.0.get()
    }

    /// Raises the flag. There is no way to lower it again.
    pub fn set(&self) {
        self.0.set(true);
    }
}

/// Behaviour of an adapter-based task.
///
/// Implement this and wrap the value in [`SimpleTask`] to get cancellation,
/// stateless cloning and persistence for free. The body must be plain data:
/// cloning it is the stateless clone, and its serde form is the persisted
/// payload.
pub trait TaskBody: Clone + fmt::Debug + Serialize + DeserializeOwned + 'static {
    /// Persistence tag, unique per body type.
    const KIND: &'static str;

    /// Runs the body against the holder.
    fn run(&self, holder: &dyn Holder) -> anyhow::Result<()>;
}

/// [`Task`] adapter around a [`TaskBody`].
#[derive(Debug)]
pub struct SimpleTask<B> {
    body: B,
    cancelled: CancelFlag,
}

impl<B: TaskBody> SimpleTask<B> {
    /// Wraps `body` in an uncancelled task.
    pub fn new(body: B) -> Self {
        Self {
            body,
            cancelled: CancelFlag::new(),
        }
    }

    /// The wrapped body.
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Decodes a body payload produced by [`Task::encode_body`].
    pub fn decode(bytes: &[u8]) -> Result<Box<dyn Task>, PersistError> {
        let body: B = from_cbor(bytes)?;
        Ok(Box::new(Self::new(body)))
    }
}

impl<B: TaskBody> From<B> for SimpleTask<B> {
    fn from(body: B) -> Self {
        Self::new(body)
    }
}

impl<B: TaskBody> Task for SimpleTask<B> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.is_set()
    }

    fn cancel(&self) {
        self.cancelled.set();
    }

    fn execute(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        self.body.run(holder)
    }

    fn clone_stateless(&self) -> Box<dyn Task> {
        Box::new(Self::new(self.body.clone()))
    }

    fn kind(&self) -> &'static str {
        B::KIND
    }

    fn encode_body(&self) -> Result<Vec<u8>, PersistError> {
        to_cbor(&self.body)
    }
}
