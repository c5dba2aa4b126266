// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Config service and storage port for cadence tools.
//! Keeps the harness and other front-ends free of storage details.

mod fs;
mod service;
mod store;

pub use fs::FsConfigStore;
pub use service::ConfigService;
pub use store::{validate_key, ConfigError, ConfigStore};
