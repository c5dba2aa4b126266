// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference tick driver.
//!
//! One logical tick walks the group priority order; for each group it visits
//! every live scheduler in the registry and calls `update(group)` on it. The
//! registry is walked through a cursor, so schedulers that register or
//! deregister while a group is being processed are handled in place.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::registry::SchedulerRegistry;

/// Serialized driver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Groups in tick priority order, first updated first.
    pub groups: Vec<String>,
    /// Default number of ticks for a run.
    pub ticks: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            groups: vec!["early".into(), "main".into(), "late".into()],
            ticks: 64,
        }
    }
}

/// Rejected driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverConfigError {
    /// The group order was empty.
    #[error("[DRIVER_NO_GROUPS] at least one group is required")]
    NoGroups,
    /// A group name was empty or whitespace only.
    #[error("[DRIVER_BLANK_GROUP] group at position {0} is blank")]
    BlankGroup(usize),
    /// A group name appeared more than once.
    #[error("[DRIVER_DUPLICATE_GROUP] group `{0}` listed more than once")]
    DuplicateGroup(String),
}

/// Validated group priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOrder(Vec<String>);

impl GroupOrder {
    /// Validates `groups` and keeps their order.
    pub fn new<I, S>(groups: I) -> Result<Self, DriverConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let groups: Vec<String> = groups.into_iter().map(Into::into).collect();
        if groups.is_empty() {
            return Err(DriverConfigError::NoGroups);
        }
        let mut seen = BTreeSet::new();
        for (index, group) in groups.iter().enumerate() {
            if group.trim().is_empty() {
                return Err(DriverConfigError::BlankGroup(index));
            }
            if !seen.insert(group.as_str()) {
                return Err(DriverConfigError::DuplicateGroup(group.clone()));
            }
        }
        Ok(Self(groups))
    }

    /// Groups in update order.
    pub fn groups(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<&DriverConfig> for GroupOrder {
    type Error = DriverConfigError;

    fn try_from(config: &DriverConfig) -> Result<Self, Self::Error> {
        Self::new(config.groups.iter().cloned())
    }
}

/// Outcome of one logical tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// 1-based tick number.
    pub tick: u64,
    /// `update` calls made across all groups.
    pub updates: u64,
}

/// Drives a registry through logical ticks.
#[derive(Debug, Clone)]
pub struct TickDriver {
    order: GroupOrder,
    tick: u64,
}

impl TickDriver {
    /// Driver at tick zero.
    pub fn new(order: GroupOrder) -> Self {
        Self { order, tick: 0 }
    }

    /// Driver resuming after `tick` completed ticks.
    pub fn resume_at(order: GroupOrder, tick: u64) -> Self {
        Self { order, tick }
    }

    /// Number of completed ticks.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Group order in use.
    pub fn order(&self) -> &GroupOrder {
        &self.order
    }

    /// Runs one logical tick.
    ///
    /// A task failure aborts the tick immediately and is returned unchanged.
    /// The tick counter still advances so a retry does not repeat the number.
    #[instrument(level = "debug", skip_all, fields(tick = self.tick + 1))]
    pub fn tick(&mut self, registry: &SchedulerRegistry) -> anyhow::Result<TickReport> {
        self.tick += 1;
        let mut updates = 0;
        for group in self.order.groups() {
            for scheduler in registry.cursor() {
                scheduler.update(group)?;
                updates += 1;
            }
        }
        debug!(updates, "tick complete");
        Ok(TickReport {
            tick: self.tick,
            updates,
        })
    }

    /// Runs `ticks` logical ticks; returns the total number of `update` calls.
    pub fn run(&mut self, registry: &SchedulerRegistry, ticks: u64) -> anyhow::Result<u64> {
        let mut updates = 0;
        for _ in 0..ticks {
            updates += self.tick(registry)?.updates;
        }
        Ok(updates)
    }
}
