// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deterministic creature world used by the determinism drills.
//!
//! A [`WorldRoot`] owns the scheduler registry, the life templates and a flat
//! list of [`Creature`]s. Every creature gets a scheduler seeded from the
//! templates of its class; some also receive ad-hoc tasks. The reproduction
//! task spawns new creatures (and schedules on its own holder) while the tick
//! is running, which is the path the drills care most about.

use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};

use anyhow::{anyhow, Context};
use cadence_core::{
    downcast_holder, function_call, persist, walk_tree, GlobalTaskDefinition, GroupOrder, Holder,
    HolderClass, OperationError, PersistError, ScheduleError, Scheduler, SchedulerRegistry,
    SchedulerSnapshot, SimpleTask, TaskBody, TaskCodecRegistry, TickDriver, ONE_SHOT,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Class of the world root.
pub static WORLD: HolderClass = HolderClass::root("World");
/// Base class of everything alive.
pub static CREATURE: HolderClass = HolderClass::root("Creature");
/// Creatures that forage and burn energy.
pub static ANIMAL: HolderClass = HolderClass::extends("Animal", &CREATURE);
/// Creatures that photosynthesize.
pub static PLANT: HolderClass = HolderClass::extends("Plant", &CREATURE);

/// Population ceiling; reproduction is skipped once reached.
pub const MAX_POPULATION: usize = 48;

const STARVATION: i64 = -6;

fn creature_class(name: &str) -> Option<&'static HolderClass> {
    [&CREATURE, &ANIMAL, &PLANT]
        .into_iter()
        .find(|class| class.name() == name)
}

/// Spawns an offspring once the creature has stored enough energy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reproduce {
    /// Energy required before reproducing.
    pub threshold: i64,
    /// Energy paid per offspring.
    pub cost: i64,
}

impl TaskBody for Reproduce {
    const KIND: &'static str = "harness/reproduce";

    fn run(&self, holder: &dyn Holder) -> anyhow::Result<()> {
        let creature = downcast_holder::<Creature>(holder)
            .ok_or_else(|| anyhow!("reproduce runs on creatures only"))?;
        creature.reproduce(self)
    }
}

/// Codecs for every task kind the world schedules.
pub fn world_codecs() -> Result<TaskCodecRegistry, PersistError> {
    let mut codecs = TaskCodecRegistry::new();
    codecs.register_body::<Reproduce>()?;
    Ok(codecs)
}

fn install_templates(definition: &GlobalTaskDefinition) -> Result<(), ScheduleError> {
    definition.schedule_template(&CREATURE, Some("age"), "late", 1, 1, &function_call("grow"))?;
    definition.schedule_template(
        &CREATURE,
        Some("reproduce"),
        "late",
        5,
        7,
        &SimpleTask::new(Reproduce {
            threshold: 6,
            cost: 4,
        }),
    )?;
    definition.schedule_template(
        &ANIMAL,
        Some("metabolize"),
        "early",
        1,
        1,
        &function_call("metabolize"),
    )?;
    definition.schedule_template(&ANIMAL, Some("forage"), "main", 2, 3, &function_call("forage"))?;
    definition.schedule_template(
        &PLANT,
        Some("photosynthesize"),
        "main",
        1,
        2,
        &function_call("photosynthesize"),
    )?;
    Ok(())
}

/// One living holder.
pub struct Creature {
    name: String,
    class: &'static HolderClass,
    registry: Rc<SchedulerRegistry>,
    world: Weak<WorldRoot>,
    scheduler: OnceCell<Rc<Scheduler>>,
    energy: Cell<i64>,
    age: Cell<u32>,
    offspring: Cell<u32>,
    celebrations: Cell<u32>,
}

impl Creature {
    /// Creature name, unique within its world.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored energy.
    pub fn energy(&self) -> i64 {
        self.energy.get()
    }

    /// Ticks aged.
    pub fn age(&self) -> u32 {
        self.age.get()
    }

    /// Offspring produced so far.
    pub fn offspring(&self) -> u32 {
        self.offspring.get()
    }

    /// The creature's life scheduler.
    pub fn scheduler(&self) -> Option<&Rc<Scheduler>> {
        self.scheduler.get()
    }

    /// Stores the life scheduler; returns `false` if one is already installed.
    fn install_scheduler(&self, scheduler: Rc<Scheduler>) -> bool {
        self.scheduler.set(scheduler).is_ok()
    }

    fn gain(&self, amount: i64) {
        self.energy.set(self.energy.get() + amount);
    }

    fn metabolize(&self) {
        self.gain(-1);
        if self.energy.get() <= STARVATION {
            if let Some(scheduler) = self.scheduler() {
                debug!(creature = %self.name, "starved");
                scheduler.cancel_all();
            }
        }
    }

    fn reproduce(&self, rule: &Reproduce) -> anyhow::Result<()> {
        if self.energy.get() < rule.threshold {
            return Ok(());
        }
        let Some(world) = self.world.upgrade() else {
            return Ok(());
        };
        if world.population() >= MAX_POPULATION {
            return Ok(());
        }
        self.gain(-rule.cost);
        self.offspring.set(self.offspring.get() + 1);
        let child_name = format!("{}.{}", self.name, world.next_serial());
        world.spawn(&child_name, self.class, 2)?;
        self.scheduler()
            .context("creature has no scheduler")?
            .schedule(None, "late", 2, ONE_SHOT, &function_call("celebrate"))?;
        Ok(())
    }
}

impl Holder for Creature {
    fn holder_class(&self) -> &'static HolderClass {
        self.class
    }

    fn scheduler_registry(&self) -> Option<Rc<SchedulerRegistry>> {
        Some(Rc::clone(&self.registry))
    }

    fn schedulers(&self) -> Vec<Rc<Scheduler>> {
        self.scheduler.get().cloned().into_iter().collect()
    }

    fn invoke(&self, operation: &str) -> anyhow::Result<()> {
        match operation {
            "grow" => self.age.set(self.age.get() + 1),
            "metabolize" => self.metabolize(),
            "forage" => self.gain(4),
            "photosynthesize" => self.gain(2),
            "rest" => self.gain(1),
            "celebrate" => self.celebrations.set(self.celebrations.get() + 1),
            _ => {
                return Err(OperationError::Unknown {
                    class: self.class.name(),
                    operation: operation.to_owned(),
                }
                .into())
            }
        }
        Ok(())
    }
}

/// Root of the object tree. Owns the registry and the life templates.
pub struct WorldRoot {
    registry: Rc<SchedulerRegistry>,
    life: GlobalTaskDefinition,
    creatures: RefCell<Vec<Rc<Creature>>>,
    serial: Cell<u32>,
}

impl WorldRoot {
    fn empty() -> Result<Rc<Self>, ScheduleError> {
        let life = GlobalTaskDefinition::new("life");
        install_templates(&life)?;
        Ok(Rc::new(Self {
            registry: Rc::new(SchedulerRegistry::new()),
            life,
            creatures: RefCell::new(Vec::new()),
            serial: Cell::new(0),
        }))
    }

    /// Registry every creature scheduler registers into.
    pub fn registry(&self) -> &Rc<SchedulerRegistry> {
        &self.registry
    }

    /// Living and dormant creatures in tree order.
    pub fn creatures(&self) -> Vec<Rc<Creature>> {
        self.creatures.borrow().clone()
    }

    /// Number of creatures.
    pub fn population(&self) -> usize {
        self.creatures.borrow().len()
    }

    fn next_serial(&self) -> u32 {
        let serial = self.serial.get() + 1;
        self.serial.set(serial);
        serial
    }

    fn creature(
        self: &Rc<Self>,
        name: &str,
        class: &'static HolderClass,
        energy: i64,
    ) -> Rc<Creature> {
        Rc::new(Creature {
            name: name.to_owned(),
            class,
            registry: Rc::clone(&self.registry),
            world: Rc::downgrade(self),
            scheduler: OnceCell::new(),
            energy: Cell::new(energy),
            age: Cell::new(0),
            offspring: Cell::new(0),
            celebrations: Cell::new(0),
        })
    }

    /// Adds a creature whose scheduler is seeded from the life templates.
    pub fn spawn(
        self: &Rc<Self>,
        name: &str,
        class: &'static HolderClass,
        energy: i64,
    ) -> Result<Rc<Creature>, ScheduleError> {
        let creature = self.creature(name, class, energy);
        let installed = creature.install_scheduler(self.life.create_scheduler_for(&creature)?);
        debug_assert!(installed, "fresh creature already had a scheduler");
        self.creatures.borrow_mut().push(Rc::clone(&creature));
        debug!(creature = name, class = %class, "spawned");
        Ok(creature)
    }

    /// Captures every creature in tree order.
    pub fn snapshot(self: &Rc<Self>) -> Result<WorldSnapshot, PersistError> {
        let root: Rc<dyn Holder> = Rc::clone(self) as Rc<dyn Holder>;
        let mut creatures = Vec::new();
        let mut failure = None;
        walk_tree(&root, |node| {
            let Some(creature) = downcast_holder::<Creature>(node.as_ref()) else {
                return;
            };
            if failure.is_some() {
                return;
            }
            match CreatureSnapshot::capture(creature) {
                Ok(snapshot) => creatures.push(snapshot),
                Err(err) => failure = Some(err),
            }
        });
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(WorldSnapshot {
            serial: self.serial.get(),
            creatures,
        })
    }

    /// Rebuilds a world from `snapshot`, then rebuilds its registry from the tree.
    pub fn restore(snapshot: &WorldSnapshot) -> anyhow::Result<Rc<Self>> {
        let codecs = world_codecs()?;
        let world = Self::empty()?;
        world.serial.set(snapshot.serial);
        for entry in &snapshot.creatures {
            let class = creature_class(&entry.class)
                .with_context(|| format!("unknown creature class `{}`", entry.class))?;
            let creature = world.creature(&entry.name, class, entry.energy);
            creature.age.set(entry.age);
            creature.offspring.set(entry.offspring);
            creature.celebrations.set(entry.celebrations);
            let scheduler = Scheduler::restore(Rc::downgrade(&creature), &entry.scheduler, &codecs)?;
            let installed = creature.install_scheduler(scheduler);
            debug_assert!(installed, "restored creature already had a scheduler");
            world.creatures.borrow_mut().push(creature);
        }
        let root: Rc<dyn Holder> = Rc::clone(&world) as Rc<dyn Holder>;
        let registered = world.registry.rebuild_from_tree(&root);
        debug!(registered, population = world.population(), "world restored");
        Ok(world)
    }
}

impl Holder for WorldRoot {
    fn holder_class(&self) -> &'static HolderClass {
        &WORLD
    }

    fn scheduler_registry(&self) -> Option<Rc<SchedulerRegistry>> {
        Some(Rc::clone(&self.registry))
    }

    fn children(&self) -> Vec<Rc<dyn Holder>> {
        self.creatures
            .borrow()
            .iter()
            .map(|c| Rc::clone(c) as Rc<dyn Holder>)
            .collect()
    }
}

/// Persisted creature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureSnapshot {
    /// Creature name.
    pub name: String,
    /// Holder class name.
    pub class: String,
    /// Stored energy.
    pub energy: i64,
    /// Ticks aged.
    pub age: u32,
    /// Offspring produced.
    pub offspring: u32,
    /// Celebrations held.
    pub celebrations: u32,
    /// Life scheduler state.
    pub scheduler: SchedulerSnapshot,
}

impl CreatureSnapshot {
    fn capture(creature: &Creature) -> Result<Self, PersistError> {
        let scheduler = match creature.scheduler() {
            Some(scheduler) => scheduler.snapshot()?,
            None => SchedulerSnapshot {
                active: true,
                tasks: Vec::new(),
            },
        };
        Ok(Self {
            name: creature.name.clone(),
            class: creature.class.name().to_owned(),
            energy: creature.energy(),
            age: creature.age(),
            offspring: creature.offspring(),
            celebrations: creature.celebrations.get(),
            scheduler,
        })
    }
}

/// Persisted world, creatures in tree order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Last offspring serial handed out.
    pub serial: u32,
    /// Every creature in tree order.
    pub creatures: Vec<CreatureSnapshot>,
}

impl WorldSnapshot {
    /// CBOR encoding.
    pub fn to_cbor(&self) -> Result<Vec<u8>, PersistError> {
        persist::to_cbor(self)
    }

    /// Parses bytes produced by [`WorldSnapshot::to_cbor`].
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, PersistError> {
        persist::from_cbor(bytes)
    }

    /// BLAKE3 digest of the CBOR encoding, hex encoded.
    pub fn digest(&self) -> Result<String, PersistError> {
        Ok(hex::encode(blake3::hash(&self.to_cbor()?).as_bytes()))
    }
}

/// A world plus the driver advancing it.
pub struct Simulation {
    world: Rc<WorldRoot>,
    driver: TickDriver,
}

impl Simulation {
    /// Fresh world with the standard starting population.
    pub fn seeded(order: GroupOrder) -> anyhow::Result<Self> {
        let world = WorldRoot::empty()?;
        for (index, name) in ["fox", "hare", "owl"].into_iter().enumerate() {
            let animal = world.spawn(name, &ANIMAL, 4)?;
            let rest_at = u32::try_from(index)? + 2;
            animal
                .scheduler()
                .context("spawned creature has no scheduler")?
                .schedule(Some("nap"), "main", rest_at, ONE_SHOT, &function_call("rest"))?;
        }
        for name in ["fern", "oak", "moss"] {
            world.spawn(name, &PLANT, 2)?;
        }
        world
            .creatures()
            .iter()
            .find(|c| c.name() == "oak")
            .and_then(|oak| oak.scheduler().cloned())
            .context("oak has no scheduler")?
            .schedule(Some("shed"), "early", 3, 5, &function_call("rest"))?;
        Ok(Self {
            world,
            driver: TickDriver::new(order),
        })
    }

    /// Rebuilds a simulation that already completed `tick` ticks.
    pub fn resume(order: GroupOrder, tick: u64, snapshot: &WorldSnapshot) -> anyhow::Result<Self> {
        Ok(Self {
            world: WorldRoot::restore(snapshot)?,
            driver: TickDriver::resume_at(order, tick),
        })
    }

    /// The simulated world.
    pub fn world(&self) -> &Rc<WorldRoot> {
        &self.world
    }

    /// Completed ticks.
    pub fn current_tick(&self) -> u64 {
        self.driver.current_tick()
    }

    /// Runs `ticks` more ticks; returns the number of `update` calls made.
    pub fn advance(&mut self, ticks: u64) -> anyhow::Result<u64> {
        let updates = self.driver.run(self.world.registry(), ticks)?;
        info!(
            tick = self.driver.current_tick(),
            updates,
            population = self.world.population(),
            active = self.world.registry().len(),
            "advanced"
        );
        Ok(updates)
    }

    /// Snapshot of the whole world.
    pub fn snapshot(&self) -> Result<WorldSnapshot, PersistError> {
        self.world.snapshot()
    }

    /// Digest of the current world state.
    pub fn digest(&self) -> Result<String, PersistError> {
        self.snapshot()?.digest()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cadence_core::DriverConfig;

    fn order() -> GroupOrder {
        GroupOrder::try_from(&DriverConfig::default()).unwrap()
    }

    #[test]
    fn seeding_registers_every_creature() {
        let sim = Simulation::seeded(order()).unwrap();
        assert_eq!(sim.world().population(), 6);
        assert_eq!(sim.world().registry().len(), 6);
        let fox = &sim.world().creatures()[0];
        let names: Vec<_> = fox
            .scheduler()
            .unwrap()
            .get_tasks()
            .iter()
            .map(|t| t.name().map(str::to_owned))
            .collect();
        assert_eq!(
            names,
            vec![
                Some("age".into()),
                Some("reproduce".into()),
                Some("metabolize".into()),
                Some("forage".into()),
                Some("nap".into()),
            ]
        );
    }

    #[test]
    fn plants_reproduce_during_ticks() {
        let mut sim = Simulation::seeded(order()).unwrap();
        sim.advance(12).unwrap();
        assert!(sim.world().population() > 6);
        let fern = &sim.world().creatures()[3];
        assert_eq!(fern.name(), "fern");
        assert!(fern.offspring() >= 1);
        assert_eq!(fern.age(), 12);
    }

    #[test]
    fn population_is_capped() {
        let mut sim = Simulation::seeded(order()).unwrap();
        sim.advance(200).unwrap();
        assert!(sim.world().population() <= MAX_POPULATION);
    }

    #[test]
    fn second_scheduler_is_refused() {
        let sim = Simulation::seeded(order()).unwrap();
        let fox = &sim.world().creatures()[0];
        let original = fox.scheduler().unwrap().id();
        let spare = Scheduler::new(Rc::downgrade(fox));
        assert!(!fox.install_scheduler(spare));
        assert_eq!(fox.scheduler().unwrap().id(), original);
    }

    #[test]
    fn unknown_operation_is_reported() {
        let sim = Simulation::seeded(order()).unwrap();
        let fox = &sim.world().creatures()[0];
        let err = fox.invoke("fly").unwrap_err();
        assert!(err.downcast_ref::<OperationError>().is_some());
    }

    #[test]
    fn unknown_class_fails_restore() {
        let sim = Simulation::seeded(order()).unwrap();
        let mut snapshot = sim.snapshot().unwrap();
        snapshot.creatures[0].class = "Fungus".into();
        assert!(WorldRoot::restore(&snapshot).is_err());
    }

    #[test]
    fn snapshot_survives_cbor() {
        let mut sim = Simulation::seeded(order()).unwrap();
        sim.advance(9).unwrap();
        let snapshot = sim.snapshot().unwrap();
        let decoded = WorldSnapshot::from_cbor(&snapshot.to_cbor().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert_eq!(decoded.digest().unwrap(), sim.digest().unwrap());
        assert!(matches!(
            WorldSnapshot::from_cbor(&[0xff, 0x01]),
            Err(PersistError::Decode(_))
        ));
    }
}
