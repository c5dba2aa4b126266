// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! cadence-core: tick-driven task scheduling for holder trees.
//!
//! Holders (nodes of a simulated object tree) own [`Scheduler`]s. A scheduler
//! keeps an ordered list of [`ScheduledTask`] records, each wrapping a private
//! clone of a [`Task`] with an initial delay, an optional repeat period and a
//! group key. A driver advances time by calling `update(group)` once per tick
//! per group on every scheduler in the [`SchedulerRegistry`].
//!
//! [`GlobalTaskDefinition`] declares tasks once per [`HolderClass`] and seeds
//! every new scheduler of that class (or a subclass) with them.
//!
//! ```
//! use std::cell::{Cell, OnceCell};
//! use std::rc::Rc;
//!
//! use cadence_core::{function_call, Holder, HolderClass, Scheduler, SchedulerRegistry, ONE_SHOT};
//!
//! static LAMP: HolderClass = HolderClass::root("Lamp");
//!
//! struct Lamp {
//!     registry: Rc<SchedulerRegistry>,
//!     scheduler: OnceCell<Rc<Scheduler>>,
//!     lit: Cell<bool>,
//! }
//!
//! impl Holder for Lamp {
//!     fn holder_class(&self) -> &'static HolderClass {
//!         &LAMP
//!     }
//!
//!     fn scheduler_registry(&self) -> Option<Rc<SchedulerRegistry>> {
//!         Some(Rc::clone(&self.registry))
//!     }
//!
//!     fn invoke(&self, operation: &str) -> anyhow::Result<()> {
//!         anyhow::ensure!(operation == "toggle", "unknown operation {operation}");
//!         self.lit.set(!self.lit.get());
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let registry = Rc::new(SchedulerRegistry::new());
//! let lamp = Rc::new(Lamp {
//!     registry: Rc::clone(&registry),
//!     scheduler: OnceCell::new(),
//!     lit: Cell::new(false),
//! });
//! let scheduler = Scheduler::new(Rc::downgrade(&lamp));
//! let _ = lamp.scheduler.set(Rc::clone(&scheduler));
//!
//! scheduler.schedule(Some("toggle"), "main", 2, ONE_SHOT, &function_call("toggle"))?;
//! assert_eq!(registry.len(), 1);
//!
//! scheduler.update("main")?;
//! scheduler.update("main")?;
//! assert!(lamp.lit.get());
//!
//! scheduler.update("main")?;
//! assert!(registry.is_empty());
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::option_if_let_else,
    clippy::significant_drop_tightening,
    clippy::manual_let_else
)]

mod class;
/// Reference tick driver and its configuration.
pub mod driver;
mod error;
mod function_call;
mod holder;
/// Snapshot types and the task codec registry.
pub mod persist;
mod record;
mod registry;
mod scheduler;
mod task;
mod template;

pub use class::HolderClass;
pub use driver::{DriverConfig, DriverConfigError, GroupOrder, TickDriver, TickReport};
pub use error::{OperationError, PersistError, ScheduleError};
pub use function_call::{function_call, FunctionCall, FUNCTION_CALL_KIND};
pub use holder::{downcast_holder, walk_tree, Holder};
pub use persist::{
    ScheduledTaskSnapshot, SchedulerSnapshot, TaskCodecRegistry, TaskDecoder, TaskPayload,
};
pub use record::{RecordPhase, ScheduledTask, ONE_SHOT};
pub use registry::{RegistryCursor, SchedulerRegistry};
pub use scheduler::{Scheduler, SchedulerId};
pub use task::{CancelFlag, SimpleTask, Task, TaskBody};
pub use template::{GlobalTaskDefinition, ResolvedTemplates, TaskTemplate, TemplateId};
