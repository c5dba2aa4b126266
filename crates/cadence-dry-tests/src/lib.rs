// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for cadence crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`config`] - In-memory config store fake for testing without filesystem
//! - [`holder`] - `TestHolder` tree nodes, class tags and the execution journal
//! - [`tasks`] - Journal-writing task bodies and a hand-written `CountingTask`

pub mod config;
pub mod holder;
pub mod tasks;

// Re-export commonly used items at crate root for convenience
pub use config::InMemoryConfigStore;
pub use holder::{Journal, TestHolder, TestHolderBuilder, DAEMON, ENTITY, FILE, PROCESS};
pub use tasks::{
    cancel_named, dry_codecs, fail, record, spawn, CancelNamed, CountingTask, Fail, Record, Spawn,
};
