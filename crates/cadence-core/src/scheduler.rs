// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Per-holder scheduler.
//!
//! Ordering invariant:
//! - Records are kept in registration order, which is also their execution
//!   order within a group on a given tick.
//! - `update` walks the sequence by index, so records appended by a task while
//!   the pass is running are visited later in the same pass.
//!
//! Registry invariant:
//! - A scheduler is in its holder's registry exactly while it holds at least
//!   one record: it registers on the 0→1 transition in `schedule` and
//!   deregisters when `update` prunes the last record.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use crate::error::ScheduleError;
use crate::holder::Holder;
use crate::record::ScheduledTask;
use crate::registry::SchedulerRegistry;
use crate::task::Task;

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a scheduler, stable for its whole lifetime and never reused.
///
/// The registry keys membership on this value; two schedulers with identical
/// contents are still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchedulerId(u64);

impl SchedulerId {
    fn next() -> Self {
        Self(NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sched#{}", self.0)
    }
}

/// Ordered set of scheduled tasks owned by one holder.
pub struct Scheduler {
    id: SchedulerId,
    this: Weak<Scheduler>,
    holder: Weak<dyn Holder>,
    active: Cell<bool>,
    tasks: RefCell<Vec<Rc<ScheduledTask>>>,
}

impl Scheduler {
    /// Creates an empty, active scheduler for `holder`.
    ///
    /// The holder reference is non-owning; once the holder is gone `update`
    /// does nothing and registration is skipped.
    pub fn new<H: Holder>(holder: Weak<H>) -> Rc<Self> {
        Self::from_parts(holder, true, Vec::new())
    }

    pub(crate) fn from_parts(
        holder: Weak<dyn Holder>,
        active: bool,
        tasks: Vec<Rc<ScheduledTask>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: SchedulerId::next(),
            this: this.clone(),
            holder,
            active: Cell::new(active),
            tasks: RefCell::new(tasks),
        })
    }

    /// Identity used for registry membership.
    pub fn id(&self) -> SchedulerId {
        self.id
    }

    /// The owning holder, if it is still alive.
    pub fn holder(&self) -> Option<Rc<dyn Holder>> {
        self.holder.upgrade()
    }

    /// Whether `update` currently advances this scheduler.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Pauses or resumes the scheduler.
    ///
    /// Ticks delivered while paused are not remembered; countdowns resume
    /// from exactly where they stopped.
    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    /// Registers a private stateless clone of `task`.
    ///
    /// `periodic_delay` is [`ONE_SHOT`](crate::ONE_SHOT) for a task that runs
    /// once, or the number of ticks between repeats. The new record is
    /// appended after every existing one; an `update` already in progress will
    /// reach it later in the same pass.
    pub fn schedule(
        &self,
        name: Option<&str>,
        group: &str,
        initial_delay: u32,
        periodic_delay: i32,
        task: &dyn Task,
    ) -> Result<Rc<ScheduledTask>, ScheduleError> {
        let record = Rc::new(ScheduledTask::new(
            name.map(str::to_owned),
            group.to_owned(),
            initial_delay,
            periodic_delay,
            task.clone_stateless(),
        )?);
        let first = {
            let mut tasks = self.tasks.borrow_mut();
            tasks.push(Rc::clone(&record));
            tasks.len() == 1
        };
        trace!(scheduler = %self.id, group, initial_delay, periodic_delay, "task scheduled");
        if first {
            self.register();
        }
        Ok(record)
    }

    /// Every record, in registration order.
    pub fn get_tasks(&self) -> Vec<Rc<ScheduledTask>> {
        self.tasks.borrow().clone()
    }

    /// First-registered record named `name`.
    pub fn get_task_by_name(&self, name: &str) -> Option<Rc<ScheduledTask>> {
        self.tasks
            .borrow()
            .iter()
            .find(|record| record.name() == Some(name))
            .cloned()
    }

    /// Records in `group`, in registration order.
    pub fn get_tasks_by_group(&self, group: &str) -> Vec<Rc<ScheduledTask>> {
        self.tasks
            .borrow()
            .iter()
            .filter(|record| record.group() == group)
            .cloned()
            .collect()
    }

    /// Number of records, including cancelled ones not yet pruned.
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Whether the scheduler holds no records.
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Cancels every record. They are pruned by the next `update`.
    pub fn cancel_all(&self) {
        for record in self.tasks.borrow().iter() {
            record.task().cancel();
        }
    }

    /// Advances every record of `group` by one tick.
    ///
    /// Cancelled records of any group are pruned as the scan reaches them.
    /// A task failure stops the pass and is returned unchanged; records after
    /// the failing one are not advanced this tick.
    pub fn update(&self, group: &str) -> anyhow::Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        let Some(holder) = self.holder.upgrade() else {
            trace!(scheduler = %self.id, "holder dropped; skipping update");
            return Ok(());
        };

        let mut index = 0;
        loop {
            let next = self.tasks.borrow().get(index).cloned();
            let Some(record) = next else {
                break;
            };
            if record.task().is_cancelled() {
                if self.prune(index, &record) {
                    self.deregister();
                }
                continue;
            }
            if record.group() == group {
                record.advance(holder.as_ref())?;
            }
            index += 1;
        }
        Ok(())
    }

    /// Removes `record` (expected at `index`); returns whether the scheduler
    /// became empty.
    fn prune(&self, index: usize, record: &Rc<ScheduledTask>) -> bool {
        let mut tasks = self.tasks.borrow_mut();
        let position = if tasks.get(index).is_some_and(|r| Rc::ptr_eq(r, record)) {
            Some(index)
        } else {
            tasks.iter().position(|r| Rc::ptr_eq(r, record))
        };
        if let Some(position) = position {
            tasks.remove(position);
            trace!(scheduler = %self.id, group = record.group(), "pruned cancelled task");
        }
        tasks.is_empty()
    }

    fn registry(&self) -> Option<Rc<SchedulerRegistry>> {
        self.holder.upgrade()?.scheduler_registry()
    }

    fn register(&self) {
        let (Some(registry), Some(this)) = (self.registry(), self.this.upgrade()) else {
            return;
        };
        registry.add(&this);
        debug!(scheduler = %self.id, "scheduler registered");
    }

    fn deregister(&self) {
        if let Some(registry) = self.registry() {
            registry.remove(self);
            debug!(scheduler = %self.id, "scheduler deregistered");
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .field("tasks", &self.tasks.borrow())
            .finish_non_exhaustive()
    }
}
