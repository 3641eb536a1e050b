use std::fmt;

use tracing::info;

use crate::{
    CallExecutor, ServicesConfig, StartError, TaskHarness, TaskKind, WorkerPool,
};

/// Composition root: the shared HTTP transport, the call executor with its
/// pool, and the task harnesses over a second pool.
///
/// Create once at process start with [`Services::start`] and release with
/// [`Services::shutdown`] during teardown.
///
/// ```no_run
/// use callguard::{CallRequest, Services, ServicesConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let services = Services::start(ServicesConfig::default())?;
/// let users = services
///     .calls()
///     .execute(&CallRequest::get("https://api.example.com/users").max_retries(2))
///     .await;
/// println!("{users:?}");
/// services.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct Services {
    calls: CallExecutor,
    api: TaskHarness,
    db: TaskHarness,
    background: TaskHarness,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("calls", &self.calls)
            .field("tasks", self.background.pool())
            .finish()
    }
}

impl Services {
    /// Builds the transport and both pools on the current tokio runtime.
    pub fn start(config: ServicesConfig) -> Result<Self, StartError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.call.timeout())
            .build()?;
        let call_pool = WorkerPool::new("calls", config.call_pool_size)?;
        let task_pool = WorkerPool::new("tasks", config.task_pool_size)?;

        info!(
            call_pool_size = call_pool.size(),
            task_pool_size = task_pool.size(),
            timeout_ms = config.call.timeout_ms,
            "services started"
        );

        Ok(Self {
            calls: CallExecutor::new(http, call_pool).with_options(config.call),
            api: TaskHarness::new(TaskKind::Api, task_pool.clone()),
            db: TaskHarness::new(TaskKind::Db, task_pool.clone()),
            background: TaskHarness::new(TaskKind::Async, task_pool),
        })
    }

    /// [`Services::start`] with [`ServicesConfig::from_env`].
    pub fn from_env() -> Result<Self, StartError> {
        Self::start(ServicesConfig::from_env()?)
    }

    pub fn calls(&self) -> &CallExecutor {
        &self.calls
    }

    pub fn api(&self) -> &TaskHarness {
        &self.api
    }

    pub fn db(&self) -> &TaskHarness {
        &self.db
    }

    pub fn background(&self) -> &TaskHarness {
        &self.background
    }

    /// Interrupts pending call retries and drains both pools. Work submitted
    /// afterwards resolves to a failure envelope.
    pub async fn shutdown(&self) {
        self.calls.shutdown().await;
        self.background.pool().shutdown().await;
        info!("services shut down");
    }
}
