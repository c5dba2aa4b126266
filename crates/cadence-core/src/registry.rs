// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Weak set of schedulers with pending work.
//!
//! Entries are keyed by [`SchedulerId`] and hold only `Weak` references, so a
//! scheduler whose holder has been dropped disappears from every enumeration
//! without explicit bookkeeping. Dead entries are pruned lazily whenever a
//! walk steps over them.
//!
//! Enumeration order is ascending scheduler id, which is creation order. The
//! ordering is stable across runs that create schedulers in the same order.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::{Rc, Weak};

use tracing::{debug, instrument};

use crate::holder::{walk_tree, Holder};
use crate::scheduler::{Scheduler, SchedulerId};

/// Identity-keyed, non-owning set of schedulers.
#[derive(Debug, Default)]
pub struct SchedulerRegistry {
    entries: RefCell<BTreeMap<SchedulerId, Weak<Scheduler>>>,
}

impl SchedulerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `scheduler`. Adding a member again is a no-op.
    pub fn add(&self, scheduler: &Rc<Scheduler>) {
        self.entries
            .borrow_mut()
            .entry(scheduler.id())
            .or_insert_with(|| Rc::downgrade(scheduler));
    }

    /// Removes `scheduler`. Removing a non-member is a no-op.
    pub fn remove(&self, scheduler: &Scheduler) {
        self.entries.borrow_mut().remove(&scheduler.id());
    }

    /// Whether `scheduler` is a member.
    pub fn contains(&self, scheduler: &Scheduler) -> bool {
        self.entries.borrow().contains_key(&scheduler.id())
    }

    /// Number of live members. Prunes dead entries first.
    pub fn len(&self) -> usize {
        self.prune();
        self.entries.borrow().len()
    }

    /// Whether no live member remains.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries whose scheduler no longer exists; returns how many.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        before - entries.len()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Read-only snapshot of the live members, in id order.
    ///
    /// Later additions and removals do not affect the returned vector.
    pub fn schedulers(&self) -> Vec<Rc<Scheduler>> {
        self.entries
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Mutable walk over the live members, in id order.
    ///
    /// The cursor borrows the registry only between steps, so schedulers may
    /// register or deregister (themselves or others) while the walk is in
    /// progress. A scheduler added ahead of the cursor is visited by the same
    /// walk; one removed ahead of it is not.
    pub fn cursor(&self) -> RegistryCursor<'_> {
        RegistryCursor {
            registry: self,
            current: None,
        }
    }

    /// Re-adds every non-empty scheduler reachable from `root`.
    ///
    /// Used once after bulk restore; the cost is proportional to the whole
    /// tree. Returns the number of schedulers added.
    #[instrument(level = "debug", skip_all)]
    pub fn rebuild_from_tree(&self, root: &Rc<dyn Holder>) -> usize {
        let mut added = 0;
        walk_tree(root, |holder| {
            for scheduler in holder.schedulers() {
                if scheduler.is_empty() || self.contains(&scheduler) {
                    continue;
                }
                self.add(&scheduler);
                added += 1;
            }
        });
        debug!(added, "registry rebuilt from tree");
        added
    }
}

/// Walk over a [`SchedulerRegistry`] that tolerates mutation between steps.
#[derive(Debug)]
pub struct RegistryCursor<'a> {
    registry: &'a SchedulerRegistry,
    current: Option<SchedulerId>,
}

impl RegistryCursor<'_> {
    /// Removes the member most recently returned by the cursor.
    pub fn remove_current(&mut self) {
        if let Some(id) = self.current {
            self.registry.entries.borrow_mut().remove(&id);
        }
    }
}

impl Iterator for RegistryCursor<'_> {
    type Item = Rc<Scheduler>;

    fn next(&mut self) -> Option<Rc<Scheduler>> {
        loop {
            let lower = self.current.map_or(Bound::Unbounded, Bound::Excluded);
            let (id, weak) = {
                let entries = self.registry.entries.borrow();
                let (id, weak) = entries.range((lower, Bound::Unbounded)).next()?;
                (*id, weak.clone())
            };
            self.current = Some(id);
            if let Some(scheduler) = weak.upgrade() {
                return Some(scheduler);
            }
            self.registry.entries.borrow_mut().remove(&id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::class::HolderClass;
    use crate::function_call::function_call;
    use crate::record::ONE_SHOT;
    use std::cell::OnceCell;

    static CELL: HolderClass = HolderClass::root("Cell");

    struct Slot {
        registry: Rc<SchedulerRegistry>,
        scheduler: OnceCell<Rc<Scheduler>>,
        children: Vec<Rc<dyn Holder>>,
    }

    impl Holder for Slot {
        fn holder_class(&self) -> &'static HolderClass {
            &CELL
        }

        fn scheduler_registry(&self) -> Option<Rc<SchedulerRegistry>> {
            Some(Rc::clone(&self.registry))
        }

        fn schedulers(&self) -> Vec<Rc<Scheduler>> {
            self.scheduler.get().cloned().into_iter().collect()
        }

        fn children(&self) -> Vec<Rc<dyn Holder>> {
            self.children.clone()
        }

        fn invoke(&self, _operation: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn slot(registry: &Rc<SchedulerRegistry>, children: Vec<Rc<dyn Holder>>) -> Rc<Slot> {
        let holder = Rc::new(Slot {
            registry: Rc::clone(registry),
            scheduler: OnceCell::new(),
            children,
        });
        holder
            .scheduler
            .set(Scheduler::new(Rc::downgrade(&holder)))
            .unwrap();
        holder
    }

    fn sched(holder: &Slot) -> &Rc<Scheduler> {
        holder.scheduler.get().unwrap()
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let registry = Rc::new(SchedulerRegistry::new());
        let holder = slot(&registry, Vec::new());
        let s = sched(&holder);
        registry.add(s);
        registry.add(s);
        assert_eq!(registry.len(), 1);
        registry.remove(s);
        registry.remove(s);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropped_holder_vanishes() {
        let registry = Rc::new(SchedulerRegistry::new());
        let keep = slot(&registry, Vec::new());
        let gone = slot(&registry, Vec::new());
        sched(&keep).schedule(None, "g", 3, ONE_SHOT, &function_call("x")).unwrap();
        sched(&gone).schedule(None, "g", 3, ONE_SHOT, &function_call("x")).unwrap();
        assert_eq!(registry.len(), 2);

        drop(gone);
        assert_eq!(registry.len(), 1);
        let live = registry.schedulers();
        assert_eq!(live.len(), 1);
        assert!(Rc::ptr_eq(&live[0], sched(&keep)));
    }

    #[test]
    fn cursor_tolerates_removal_mid_walk() {
        let registry = Rc::new(SchedulerRegistry::new());
        let holders: Vec<_> = (0..3).map(|_| slot(&registry, Vec::new())).collect();
        for h in &holders {
            registry.add(sched(h));
        }

        let mut visited = Vec::new();
        let mut cursor = registry.cursor();
        while let Some(s) = cursor.next() {
            visited.push(s.id());
            if s.id() == sched(&holders[0]).id() {
                registry.remove(sched(&holders[1]));
            }
            if s.id() == sched(&holders[2]).id() {
                cursor.remove_current();
            }
        }
        assert_eq!(
            visited,
            vec![sched(&holders[0]).id(), sched(&holders[2]).id()]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cursor_sees_members_added_ahead() {
        let registry = Rc::new(SchedulerRegistry::new());
        let first = slot(&registry, Vec::new());
        let later = slot(&registry, Vec::new());
        registry.add(sched(&first));

        let mut count = 0;
        for s in registry.cursor() {
            count += 1;
            if Rc::ptr_eq(&s, sched(&first)) {
                registry.add(sched(&later));
            }
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn rebuild_finds_non_empty_schedulers_only() {
        let registry = Rc::new(SchedulerRegistry::new());
        let busy_leaf = slot(&registry, Vec::new());
        let idle_leaf = slot(&registry, Vec::new());
        sched(&busy_leaf)
            .schedule(None, "g", 1, 1, &function_call("x"))
            .unwrap();
        let leaves: Vec<Rc<dyn Holder>> = vec![busy_leaf.clone(), idle_leaf.clone()];
        let root = slot(&registry, leaves);
        sched(&root).schedule(None, "g", 1, 1, &function_call("x")).unwrap();

        registry.clear();
        let root_dyn: Rc<dyn Holder> = root.clone();
        assert_eq!(registry.rebuild_from_tree(&root_dyn), 2);
        assert!(registry.contains(sched(&root)));
        assert!(registry.contains(sched(&busy_leaf)));
        assert!(!registry.contains(sched(&idle_leaf)));
        assert_eq!(registry.rebuild_from_tree(&root_dyn), 0);
    }
}
