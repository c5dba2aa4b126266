// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Registry liveness and the reference tick driver.

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::rc::Rc;

use cadence_core::{GroupOrder, SchedulerRegistry, TickDriver, TickReport, ONE_SHOT};
use cadence_dry_tests::{fail, record, Journal, TestHolder, ENTITY, PROCESS};

fn driver(groups: &[&str]) -> TickDriver {
    TickDriver::new(GroupOrder::new(groups.iter().copied()).unwrap())
}

#[test]
fn registry_tracks_pending_work() {
    let registry = Rc::new(SchedulerRegistry::new());
    let holder = TestHolder::builder("h", &ENTITY)
        .registry(&registry)
        .build();
    let before = registry.len();
    let sched = holder.scheduler().unwrap();

    sched
        .schedule(None, "g", 1, ONE_SHOT, &record("once"))
        .unwrap();
    assert_eq!(registry.len(), before + 1);

    sched.update("g").unwrap();
    assert_eq!(registry.len(), before + 1);
    sched.update("g").unwrap();
    assert_eq!(registry.len(), before);
}

#[test]
fn second_task_does_not_register_twice() {
    let registry = Rc::new(SchedulerRegistry::new());
    let holder = TestHolder::builder("h", &ENTITY)
        .registry(&registry)
        .build();
    let sched = holder.scheduler().unwrap();
    sched.schedule(None, "g", 5, 1, &record("a")).unwrap();
    sched.schedule(None, "g", 5, 1, &record("b")).unwrap();
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(sched));
}

#[test]
fn holder_without_registry_still_schedules() {
    let holder = TestHolder::new("loner", &ENTITY);
    let sched = holder.scheduler().unwrap();
    sched.schedule(None, "g", 1, ONE_SHOT, &record("x")).unwrap();
    sched.update("g").unwrap();
    assert_eq!(holder.journal().entries(), vec!["x"]);
}

#[test]
fn dropping_a_holder_removes_it_from_ticks() {
    let registry = Rc::new(SchedulerRegistry::new());
    let journal = Journal::new();
    let keep = TestHolder::builder("keep", &ENTITY)
        .registry(&registry)
        .journal(&journal)
        .build();
    let gone = TestHolder::builder("gone", &ENTITY)
        .registry(&registry)
        .journal(&journal)
        .build();
    for holder in [&keep, &gone] {
        holder
            .scheduler()
            .unwrap()
            .schedule(None, "g", 1, 1, &record(holder.label()))
            .unwrap();
    }

    let mut driver = driver(&["g"]);
    assert_eq!(driver.tick(&registry).unwrap().updates, 2);
    drop(gone);
    assert_eq!(driver.tick(&registry).unwrap().updates, 1);
    assert_eq!(journal.entries(), vec!["keep", "gone", "keep"]);
}

#[test]
fn driver_follows_group_priority_order() {
    let registry = Rc::new(SchedulerRegistry::new());
    let journal = Journal::new();
    let a = TestHolder::builder("a", &ENTITY)
        .registry(&registry)
        .journal(&journal)
        .build();
    let b = TestHolder::builder("b", &PROCESS)
        .registry(&registry)
        .journal(&journal)
        .build();
    a.scheduler()
        .unwrap()
        .schedule(None, "late", 1, ONE_SHOT, &record("a-late"))
        .unwrap();
    b.scheduler()
        .unwrap()
        .schedule(None, "early", 1, ONE_SHOT, &record("b-early"))
        .unwrap();

    let mut driver = driver(&["early", "late"]);
    assert_eq!(
        driver.tick(&registry).unwrap(),
        TickReport { tick: 1, updates: 4 }
    );
    assert_eq!(journal.entries(), vec!["b-early", "a-late"]);

    // `b` pruned its spent one-shot during the `late` pass of tick 1 and left
    // the registry; `a` prunes during the `early` pass of tick 2.
    assert_eq!(registry.len(), 1);
    assert_eq!(
        driver.tick(&registry).unwrap(),
        TickReport { tick: 2, updates: 1 }
    );
    assert!(registry.is_empty());
    assert_eq!(driver.run(&registry, 3).unwrap(), 0);
    assert_eq!(driver.current_tick(), 5);
}

#[test]
fn driver_skips_paused_schedulers_without_losing_them() {
    let registry = Rc::new(SchedulerRegistry::new());
    let holder = TestHolder::builder("h", &ENTITY)
        .registry(&registry)
        .build();
    let sched = holder.scheduler().unwrap();
    sched.schedule(None, "g", 2, ONE_SHOT, &record("x")).unwrap();
    sched.set_active(false);

    let mut driver = driver(&["g"]);
    driver.run(&registry, 10).unwrap();
    assert!(holder.journal().is_empty());
    assert!(registry.contains(sched));

    sched.set_active(true);
    driver.run(&registry, 2).unwrap();
    assert_eq!(holder.journal().entries(), vec!["x"]);
}

#[test]
fn driver_surfaces_task_failure() {
    let registry = Rc::new(SchedulerRegistry::new());
    let holder = TestHolder::builder("h", &ENTITY)
        .registry(&registry)
        .build();
    holder
        .scheduler()
        .unwrap()
        .schedule(None, "g", 2, ONE_SHOT, &fail("broken gear"))
        .unwrap();

    let mut driver = driver(&["g"]);
    driver.tick(&registry).unwrap();
    let err = driver.tick(&registry).unwrap_err();
    assert_eq!(err.to_string(), "broken gear");
    assert_eq!(driver.current_tick(), 2);
}
