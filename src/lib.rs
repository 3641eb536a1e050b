//! `callguard` issues outbound HTTP calls with bounded retries and
//! exponential backoff, and wraps arbitrary work in a uniform success/failure
//! [`Envelope`].
//!
//! The main entry points are:
//! - [`CallExecutor::execute`] / [`CallExecutor::execute_async`]
//! - [`TaskHarness::run_sync`], [`TaskHarness::run_action`],
//!   [`TaskHarness::run_or_default`] and [`TaskHarness::run_async`]
//! - [`Services`], which owns the shared transport and worker pools

mod envelope;
mod error;
mod executor;
mod harness;
mod options;
mod pool;
mod request;
mod retry;
mod services;

pub use envelope::Envelope;
pub use error::{CallError, ConfigError, PoolError, StartError, TaskError, TaskKind};
pub use executor::CallExecutor;
pub use harness::{BoxError, Task, TaskHarness};
pub use options::{CallOptions, ServicesConfig, DEFAULT_POOL_SIZE};
pub use pool::{JobHandle, WorkerPool};
pub use request::{build_url, CallRequest, Method};
pub use services::Services;
