// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Test holders.
//!
//! A [`TestHolder`] is a labelled tree node with one scheduler slot. Every
//! operation it runs and every journal-writing task appends a line to its
//! [`Journal`], so tests assert on execution order by comparing string lists.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use cadence_core::{
    GlobalTaskDefinition, Holder, HolderClass, ScheduleError, Scheduler, SchedulerRegistry,
};

/// Root class of the test hierarchy.
pub static ENTITY: HolderClass = HolderClass::root("Entity");
/// `Process extends Entity`.
pub static PROCESS: HolderClass = HolderClass::extends("Process", &ENTITY);
/// `Daemon extends Process`.
pub static DAEMON: HolderClass = HolderClass::extends("Daemon", &PROCESS);
/// Unrelated root class.
pub static FILE: HolderClass = HolderClass::root("File");

/// Shared, append-only list of execution events.
///
/// Clones share the same underlying list, so one journal can observe several
/// holders.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    /// Copy of every event so far.
    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Removes every event.
    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Labelled holder with an optional registry and one scheduler slot.
#[derive(Debug)]
pub struct TestHolder {
    label: String,
    class: &'static HolderClass,
    registry: Option<Rc<SchedulerRegistry>>,
    scheduler: OnceCell<Rc<Scheduler>>,
    children: RefCell<Vec<Rc<TestHolder>>>,
    journal: Journal,
}

impl TestHolder {
    /// Starts building a holder named `label` of class `class`.
    pub fn builder(label: impl Into<String>, class: &'static HolderClass) -> TestHolderBuilder {
        TestHolderBuilder {
            label: label.into(),
            class,
            registry: None,
            journal: None,
        }
    }

    /// Holder with a fresh empty scheduler, no registry and its own journal.
    pub fn new(label: impl Into<String>, class: &'static HolderClass) -> Rc<Self> {
        Self::builder(label, class).build()
    }

    /// Holder label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The scheduler in the slot, if one was installed.
    pub fn scheduler(&self) -> Option<&Rc<Scheduler>> {
        self.scheduler.get()
    }

    /// Installs `scheduler` into the empty slot; returns `false` if occupied.
    pub fn install_scheduler(&self, scheduler: Rc<Scheduler>) -> bool {
        self.scheduler.set(scheduler).is_ok()
    }

    /// Journal receiving this holder's events.
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Appends `child` to this node's children.
    pub fn add_child(&self, child: Rc<Self>) {
        self.children.borrow_mut().push(child);
    }

    /// Direct children, concretely typed.
    pub fn child_holders(&self) -> Vec<Rc<Self>> {
        self.children.borrow().clone()
    }
}

impl Holder for TestHolder {
    fn holder_class(&self) -> &'static HolderClass {
        self.class
    }

    fn scheduler_registry(&self) -> Option<Rc<SchedulerRegistry>> {
        self.registry.clone()
    }

    fn schedulers(&self) -> Vec<Rc<Scheduler>> {
        self.scheduler.get().cloned().into_iter().collect()
    }

    fn children(&self) -> Vec<Rc<dyn Holder>> {
        self.children
            .borrow()
            .iter()
            .map(|child| Rc::clone(child) as Rc<dyn Holder>)
            .collect()
    }

    /// Records `<label>.<operation>`; the operation `fail` errors instead.
    fn invoke(&self, operation: &str) -> anyhow::Result<()> {
        anyhow::ensure!(operation != "fail", "{} failed on request", self.label);
        self.journal.push(format!("{}.{operation}", self.label));
        Ok(())
    }
}

/// Builder for [`TestHolder`].
#[derive(Debug)]
pub struct TestHolderBuilder {
    label: String,
    class: &'static HolderClass,
    registry: Option<Rc<SchedulerRegistry>>,
    journal: Option<Journal>,
}

impl TestHolderBuilder {
    /// Registry the holder's scheduler registers into.
    pub fn registry(mut self, registry: &Rc<SchedulerRegistry>) -> Self {
        self.registry = Some(Rc::clone(registry));
        self
    }

    /// Journal shared with other holders.
    pub fn journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    /// Holder without a scheduler in its slot.
    pub fn build_empty(self) -> Rc<TestHolder> {
        Rc::new(TestHolder {
            label: self.label,
            class: self.class,
            registry: self.registry,
            scheduler: OnceCell::new(),
            children: RefCell::new(Vec::new()),
            journal: self.journal.unwrap_or_default(),
        })
    }

    /// Holder with a fresh, empty scheduler.
    pub fn build(self) -> Rc<TestHolder> {
        let holder = self.build_empty();
        holder.install_scheduler(Scheduler::new(Rc::downgrade(&holder)));
        holder
    }

    /// Holder whose scheduler is created and seeded by `definition`.
    pub fn build_from(
        self,
        definition: &GlobalTaskDefinition,
    ) -> Result<Rc<TestHolder>, ScheduleError> {
        let holder = self.build_empty();
        let scheduler = definition.create_scheduler_for(&holder)?;
        holder.install_scheduler(scheduler);
        Ok(holder)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cadence_core::walk_tree;

    #[test]
    fn invoke_journals_operation() {
        let holder = TestHolder::new("h", &ENTITY);
        holder.invoke("wave").unwrap();
        assert_eq!(holder.journal().entries(), vec!["h.wave"]);
        assert!(holder.invoke("fail").is_err());
        assert_eq!(holder.journal().len(), 1);
    }

    #[test]
    fn shared_journal_sees_both_holders() {
        let journal = Journal::new();
        let a = TestHolder::builder("a", &ENTITY).journal(&journal).build();
        let b = TestHolder::builder("b", &FILE).journal(&journal).build();
        a.invoke("x").unwrap();
        b.invoke("y").unwrap();
        assert_eq!(journal.entries(), vec!["a.x", "b.y"]);
    }

    #[test]
    fn children_are_walked() {
        let root = TestHolder::new("root", &ENTITY);
        root.add_child(TestHolder::new("kid", &PROCESS));
        let root_dyn: Rc<dyn Holder> = root;
        let mut classes = Vec::new();
        walk_tree(&root_dyn, |h| classes.push(h.holder_class().name()));
        assert_eq!(classes, vec!["Entity", "Process"]);
    }

    #[test]
    fn slot_accepts_one_scheduler() {
        let holder = TestHolder::builder("h", &ENTITY).build_empty();
        assert!(holder.scheduler().is_none());
        assert!(holder.install_scheduler(Scheduler::new(Rc::downgrade(&holder))));
        assert!(!holder.install_scheduler(Scheduler::new(Rc::downgrade(&holder))));
    }
}
