// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! cadence determinism harness.
//!
//! Seeds a creature world on top of `cadence-core`, drives it for a number of
//! ticks, and digests the final state so runs can be compared bit for bit,
//! including runs interrupted by a snapshot and rebuild.

pub mod drill;
pub mod world;
