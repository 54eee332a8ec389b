// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sqlrs-engine: the prepare orchestrator (spec.md §1, §2).
//!
//! Wires the normalizer, plan builder, state cache, and persistence layers
//! into the per-job run loop: [`Orchestrator::submit`] normalizes and plans
//! a request, [`Orchestrator::recover`] resumes non-terminal jobs after a
//! restart, and [`Orchestrator::delete`] implements §4.G deletion policy.
//! Retention trimming (§4.G) and event/heartbeat plumbing (§4.E) run
//! underneath every job's terminal transition.

mod cache;
mod config;
mod error;
mod event_log;
mod finalize;
mod heartbeat;
mod mount;
mod plan;
mod retention;
mod runner;
mod service;
#[cfg(test)]
mod test_support;

pub use cache::{BuildLock, CacheLookup, StateCache};
pub use config::{OrchestratorConfig, RunMode};
pub use error::EngineError;
pub use plan::{build_plan, compute_job_signature, compute_state_id, compute_task_hash};
pub use service::{DeleteOptions, DeleteOutcome, Orchestrator, SubmitResult};
