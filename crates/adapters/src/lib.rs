// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! External-collaborator adapters (spec.md §1 non-goals, §4.F): the
//! container runtime, the state filesystem (snapshot drivers), and the
//! subprocess/log-sink plumbing both of those and the psql/Liquibase
//! runners in `sqlrs-engine` are built on.

pub mod liquibase_runner;
pub mod log_sink;
pub mod psql_runner;
pub mod runtime;
pub mod statefs;
pub mod subprocess;

pub use liquibase_runner::{LiquibaseInvocation, LiquibaseRunner, LiquibaseRunnerError, ProcessLiquibaseRunner};
pub use log_sink::{FnLogSink, LogSink, SharedLogSink};
pub use psql_runner::{ContainerPsqlRunner, PsqlInvocation, PsqlRunner, PsqlRunnerError};
pub use runtime::{
    DockerRuntimeAdapter, ExecOutput, ExecSpec, Instance, Mount, RuntimeAdapter, RuntimeError,
    StartSpec,
};
pub use statefs::{CowStateFs, PlainCopyStateFs, StateFs, StateFsError, StateFsKind};

#[cfg(any(test, feature = "test-support"))]
pub use liquibase_runner::{FakeLiquibaseRunner, LiquibaseRunnerCall};
#[cfg(any(test, feature = "test-support"))]
pub use psql_runner::{FakePsqlRunner, PsqlRunnerCall};
#[cfg(any(test, feature = "test-support"))]
pub use runtime::{FakeRuntimeAdapter, RuntimeCall};
#[cfg(any(test, feature = "test-support"))]
pub use statefs::{FakeStateFs, StateFsCall};
