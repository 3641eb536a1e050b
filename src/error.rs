use std::{fmt, time::Duration};

/// Failure of an outbound call, rendered into the failure envelope's message.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// The request could not be built (bad URL, unknown method, bad header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A backoff wait was cut short by shutdown.
    #[error("retry interrupted after attempt {attempt}")]
    Interrupted { attempt: u32 },
    /// The next wait would overrun the overall call deadline.
    #[error("deadline of {deadline:?} exceeded after attempt {attempt}; last error: {last}")]
    DeadlineExceeded {
        deadline: Duration,
        attempt: u32,
        last: Box<CallError>,
    },
    /// The call could not be dispatched onto its worker pool.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Failure of a worker pool job.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool '{pool}' is shut down")]
    Closed { pool: String },
    #[error("job on worker pool '{pool}' panicked: {message}")]
    Panicked { pool: String, message: String },
    #[error("job on worker pool '{pool}' was cancelled")]
    Cancelled { pool: String },
    #[error("no tokio runtime available to host a worker pool")]
    NoRuntime,
}

/// Failure captured by the task harness.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{kind} failed: {message}")]
    Failed { kind: TaskKind, message: String },
    #[error("{kind} panicked: {message}")]
    Panicked { kind: TaskKind, message: String },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Which vocabulary a harness reports in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Business logic behind an API.
    Api,
    /// Data-store queries and commands.
    Db,
    /// Background work dispatched on a pool.
    Async,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Api => "API processing",
            Self::Db => "database operation",
            Self::Async => "async task",
        })
    }
}

/// Invalid configuration, typically read from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is set but empty")]
    Empty { name: &'static str },
    #[error("{name} must be {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Failure while assembling [`Services`](crate::Services).
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to build http client: {0}")]
    Transport(#[from] reqwest::Error),
}
