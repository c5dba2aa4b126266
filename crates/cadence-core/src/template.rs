// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Class-scoped task templates.
//!
//! A [`GlobalTaskDefinition`] belongs to one named scheduler slot. Templates
//! are declared against a [`HolderClass`] and apply to every holder whose class
//! is that class or a subclass of it. Resolution results are cached per
//! concrete class descriptor (by address, not by name); any add or remove
//! clears the whole cache.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::class::HolderClass;
use crate::error::ScheduleError;
use crate::holder::Holder;
use crate::record::validate;
use crate::scheduler::Scheduler;
use crate::task::Task;

/// Handle identifying one registered template within its definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemplateId(u64);

/// A task declared once for a whole holder class.
pub struct TaskTemplate {
    id: TemplateId,
    class: &'static HolderClass,
    name: Option<String>,
    group: String,
    initial_delay: u32,
    periodic_delay: i32,
    task: Box<dyn Task>,
}

impl TaskTemplate {
    /// Handle accepted by [`GlobalTaskDefinition::remove_template`].
    pub fn id(&self) -> TemplateId {
        self.id
    }

    /// Class the template was declared for.
    pub fn class(&self) -> &'static HolderClass {
        self.class
    }

    /// Name given to every record seeded from this template.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Group of the seeded records.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Initial delay of the seeded records.
    pub fn initial_delay(&self) -> u32 {
        self.initial_delay
    }

    /// Periodic delay of the seeded records.
    pub fn periodic_delay(&self) -> i32 {
        self.periodic_delay
    }

    /// Prototype task; schedulers receive stateless clones of it.
    pub fn task(&self) -> &dyn Task {
        self.task.as_ref()
    }
}

impl fmt::Debug for TaskTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTemplate")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("name", &self.name)
            .field("group", &self.group)
            .field("initial_delay", &self.initial_delay)
            .field("periodic_delay", &self.periodic_delay)
            .field("task", &self.task)
            .finish()
    }
}

/// Templates resolved for one concrete class, in registration order.
pub type ResolvedTemplates = Rc<[Rc<TaskTemplate>]>;

/// Template list and scheduler factory for one named scheduler slot.
pub struct GlobalTaskDefinition {
    slot: String,
    templates: RefCell<Vec<Rc<TaskTemplate>>>,
    cache: RefCell<FxHashMap<*const HolderClass, ResolvedTemplates>>,
    next_id: Cell<u64>,
}

impl GlobalTaskDefinition {
    /// Empty definition for the scheduler slot named `slot`.
    pub fn new(slot: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            templates: RefCell::new(Vec::new()),
            cache: RefCell::new(FxHashMap::default()),
            next_id: Cell::new(0),
        }
    }

    /// Name of the scheduler slot this definition builds.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Number of registered templates.
    pub fn len(&self) -> usize {
        self.templates.borrow().len()
    }

    /// Whether no templates are registered.
    pub fn is_empty(&self) -> bool {
        self.templates.borrow().is_empty()
    }

    /// Every template, in registration order.
    pub fn templates(&self) -> Vec<Rc<TaskTemplate>> {
        self.templates.borrow().clone()
    }

    /// Declares `task` for every holder of `class` or any subclass.
    ///
    /// Arguments are validated exactly like [`Scheduler::schedule`]. Holders
    /// created before this call are unaffected.
    pub fn schedule_template(
        &self,
        class: &'static HolderClass,
        name: Option<&str>,
        group: &str,
        initial_delay: u32,
        periodic_delay: i32,
        task: &dyn Task,
    ) -> Result<TemplateId, ScheduleError> {
        validate(group, initial_delay, periodic_delay)?;
        let id = TemplateId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.templates.borrow_mut().push(Rc::new(TaskTemplate {
            id,
            class,
            name: name.map(str::to_owned),
            group: group.to_owned(),
            initial_delay,
            periodic_delay,
            task: task.clone_stateless(),
        }));
        self.invalidate();
        debug!(slot = %self.slot, class = %class, group, "template added");
        Ok(id)
    }

    /// Removes the template `id` declared for `class`.
    ///
    /// Returns whether a template was removed.
    pub fn remove_template(&self, class: &HolderClass, id: TemplateId) -> bool {
        self.remove_first(|t| t.id == id && t.class == class)
    }

    /// Removes the first-registered template named `name` declared for `class`.
    pub fn remove_template_by_name(&self, class: &HolderClass, name: &str) -> bool {
        self.remove_first(|t| t.class == class && t.name() == Some(name))
    }

    fn remove_first(&self, matches: impl Fn(&TaskTemplate) -> bool) -> bool {
        let removed = {
            let mut templates = self.templates.borrow_mut();
            templates
                .iter()
                .position(|t| matches(t))
                .map(|index| templates.remove(index))
        };
        let Some(removed) = removed else {
            return false;
        };
        self.invalidate();
        debug!(slot = %self.slot, class = %removed.class, "template removed");
        true
    }

    fn invalidate(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Templates that apply to holders of `class`, in registration order.
    pub fn resolve_for_class(&self, class: &'static HolderClass) -> ResolvedTemplates {
        if let Some(hit) = self.cache.borrow().get(&std::ptr::from_ref(class)) {
            return Rc::clone(hit);
        }
        let resolved: ResolvedTemplates = self
            .templates
            .borrow()
            .iter()
            .filter(|t| class.is_a(t.class))
            .cloned()
            .collect();
        self.cache
            .borrow_mut()
            .insert(std::ptr::from_ref(class), Rc::clone(&resolved));
        resolved
    }

    /// Builds the scheduler for `holder`, seeded from every applicable template.
    ///
    /// Each seeded record gets its own stateless clone of the template task.
    /// The holder must store the returned scheduler; registration happens as
    /// soon as the first template is scheduled.
    pub fn create_scheduler_for<H: Holder>(
        &self,
        holder: &Rc<H>,
    ) -> Result<Rc<Scheduler>, ScheduleError> {
        let class = holder.holder_class();
        let scheduler = Scheduler::new(Rc::downgrade(holder));
        for template in self.resolve_for_class(class).iter() {
            scheduler.schedule(
                template.name(),
                template.group(),
                template.initial_delay,
                template.periodic_delay,
                template.task(),
            )?;
        }
        debug!(
            slot = %self.slot,
            class = %class,
            scheduler = %scheduler.id(),
            seeded = scheduler.len(),
            "scheduler created"
        );
        Ok(scheduler)
    }
}

impl fmt::Debug for GlobalTaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalTaskDefinition")
            .field("slot", &self.slot)
            .field("templates", &self.templates.borrow())
            .field("cached_classes", &self.cache.borrow().len())
            .finish_non_exhaustive()
    }
}
