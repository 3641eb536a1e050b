//! Uniform capture of caller-supplied work into [`Envelope`]s.
//!
//! A [`Task`] bundles an input with an optional validator, the work itself
//! and an optional response builder. [`TaskHarness`] runs tasks on the
//! caller's thread or on its worker pool; either way the same algorithm
//! runs, every fault (including panics) is turned into a failure envelope and
//! one log event is emitted per operation.
//!
//! ```
//! use callguard::{Envelope, Task, TaskHarness, WorkerPool};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let harness = TaskHarness::api(WorkerPool::new("docs", 2).unwrap());
//! let greeting = harness.run_sync(
//!     Task::new("John".to_owned(), |name| Ok::<_, &str>(format!("Hello, {name}!")))
//!         .validate(|name: &String| if name.is_empty() { Err("name is required") } else { Ok(()) })
//!         .respond(Envelope::success),
//! );
//! assert_eq!(greeting.payload().map(String::as_str), Some("Hello, John!"));
//! # }
//! ```

use std::{
    future::Future,
    panic::{self, AssertUnwindSafe},
    time::Instant,
};

use tracing::{error, info, warn};

use crate::{pool::panic_message, Envelope, TaskError, TaskKind, WorkerPool};

/// Boxed error accepted from validators and work functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Validator<'a, I> = Box<dyn FnOnce(&I) -> Result<(), BoxError> + Send + 'a>;
type Work<'a, I, O> = Box<dyn FnOnce(I) -> Result<O, BoxError> + Send + 'a>;
type Responder<'a, O> = Box<dyn FnOnce(O) -> Envelope<O> + Send + 'a>;

/// An input plus the validate / produce / render strategies applied to it.
///
/// Strategies may borrow from the caller for `'a`; only tasks handed to
/// [`TaskHarness::run_async`] need to be `'static`.
pub struct Task<'a, I, O> {
    input: I,
    validator: Option<Validator<'a, I>>,
    work: Work<'a, I, O>,
    responder: Option<Responder<'a, O>>,
}

impl<'a, O: 'a> Task<'a, (), O> {
    /// A task without input.
    pub fn from_fn<F, E>(work: F) -> Self
    where
        F: FnOnce() -> Result<O, E> + Send + 'a,
        E: Into<BoxError> + 'a,
    {
        Self::new((), move |()| work())
    }
}

impl<'a, I: 'a, O: 'a> Task<'a, I, O> {
    /// Creates a task whose work consumes `input`.
    pub fn new<F, E>(input: I, work: F) -> Self
    where
        F: FnOnce(I) -> Result<O, E> + Send + 'a,
        E: Into<BoxError> + 'a,
    {
        let work: Work<'a, I, O> = Box::new(move |input: I| work(input).map_err(Into::into));
        Self {
            input,
            validator: None,
            work,
            responder: None,
        }
    }

    /// Checks the input before the work runs; an error or a panic aborts the
    /// task as a validation failure.
    pub fn validate<V, E>(mut self, validator: V) -> Self
    where
        V: FnOnce(&I) -> Result<(), E> + Send + 'a,
        E: Into<BoxError> + 'a,
    {
        let validator: Validator<'a, I> =
            Box::new(move |input: &I| validator(input).map_err(Into::into));
        self.validator = Some(validator);
        self
    }

    /// Builds the final envelope from the output instead of
    /// [`Envelope::success`].
    pub fn respond<R>(mut self, responder: R) -> Self
    where
        R: FnOnce(O) -> Envelope<O> + Send + 'a,
    {
        self.responder = Some(Box::new(responder));
        self
    }
}

impl<I, O> Task<'_, I, O> {
    fn execute(self, kind: TaskKind) -> Result<Envelope<O>, TaskError> {
        let Self {
            input,
            validator,
            work,
            responder,
        } = self;

        if let Some(validate) = validator {
            panic::catch_unwind(AssertUnwindSafe(|| validate(&input)))
                .unwrap_or_else(|payload| Err(panic_message(payload.as_ref()).into()))
                .map_err(|err| TaskError::Validation(err.to_string()))?;
        }

        let output = work(input).map_err(|err| TaskError::Failed {
            kind,
            message: err.to_string(),
        })?;

        Ok(match responder {
            Some(respond) => respond(output),
            None => Envelope::success(output),
        })
    }
}

/// Runs tasks synchronously or on a worker pool and reports each outcome as
/// an [`Envelope`]. Nothing is retried.
#[derive(Clone, Debug)]
pub struct TaskHarness {
    kind: TaskKind,
    pool: WorkerPool,
}

impl TaskHarness {
    pub fn new(kind: TaskKind, pool: WorkerPool) -> Self {
        Self { kind, pool }
    }

    /// Business-logic vocabulary.
    pub fn api(pool: WorkerPool) -> Self {
        Self::new(TaskKind::Api, pool)
    }

    /// Data-store vocabulary.
    pub fn db(pool: WorkerPool) -> Self {
        Self::new(TaskKind::Db, pool)
    }

    /// Background-job vocabulary.
    pub fn background(pool: WorkerPool) -> Self {
        Self::new(TaskKind::Async, pool)
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs `task` on the calling thread.
    pub fn run_sync<I, O>(&self, task: Task<'_, I, O>) -> Envelope<O> {
        run_task(self.kind, "run_sync", || task.execute(self.kind))
    }

    /// Runs a side-effecting action; a success carries no payload.
    pub fn run_action<F, E>(&self, action: F) -> Envelope<()>
    where
        F: FnOnce() -> Result<(), E>,
        E: Into<BoxError>,
    {
        run_task(self.kind, "run_action", || {
            action()
                .map(|()| Envelope::empty())
                .map_err(|err| self.failed(err))
        })
    }

    /// Runs `work`, substituting `fallback` as a successful payload when it
    /// fails.
    pub fn run_or_default<O, F, E>(&self, work: F, fallback: O) -> Envelope<O>
    where
        F: FnOnce() -> Result<O, E>,
        E: Into<BoxError>,
    {
        let envelope = run_task(self.kind, "run_or_default", || {
            work().map(Envelope::success).map_err(|err| self.failed(err))
        });
        if envelope.is_success() {
            return envelope;
        }
        warn!(
            kind = %self.kind,
            reason = envelope.message().unwrap_or_default(),
            "using fallback value"
        );
        Envelope::success(fallback)
    }

    /// Submits `task` to the worker pool right away and resolves with its
    /// envelope.
    pub fn run_async<I, O>(
        &self,
        task: Task<'static, I, O>,
    ) -> impl Future<Output = Envelope<O>> + Send + 'static
    where
        I: Send + 'static,
        O: Send + 'static,
    {
        let kind = self.kind;
        let job = self
            .pool
            .spawn_blocking(move || run_task(kind, "run_async", || task.execute(kind)));
        async move {
            job.await.unwrap_or_else(|err| {
                let err = TaskError::from(err);
                error!(kind = %kind, error = %err, "task could not run");
                Envelope::failure(err.to_string())
            })
        }
    }

    fn failed(&self, err: impl Into<BoxError>) -> TaskError {
        TaskError::Failed {
            kind: self.kind,
            message: err.into().to_string(),
        }
    }
}

/// Times `operation`, turns faults and panics into a failure envelope and
/// logs the outcome once.
fn run_task<O, F>(kind: TaskKind, operation: &'static str, operation_fn: F) -> Envelope<O>
where
    F: FnOnce() -> Result<Envelope<O>, TaskError>,
{
    let started = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(operation_fn)).unwrap_or_else(|payload| {
        Err(TaskError::Panicked {
            kind,
            message: panic_message(payload.as_ref()),
        })
    });
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(envelope) => {
            info!(
                kind = %kind,
                operation,
                elapsed_ms,
                success = envelope.is_success(),
                "task completed"
            );
            envelope
        }
        Err(err) => {
            error!(kind = %kind, operation, elapsed_ms, error = %err, "task failed");
            Envelope::failure(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        rc::Rc,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::{Task, TaskHarness};
    use crate::{Envelope, WorkerPool};

    fn harness() -> TaskHarness {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime must build");
        TaskHarness::db(WorkerPool::with_handle("sync-only", 1, runtime.handle().clone()))
    }

    #[test]
    fn work_failure_is_prefixed_with_phase() {
        let envelope = harness().run_sync(Task::from_fn(|| Err::<u32, _>("connection reset")));
        assert_eq!(
            envelope.message(),
            Some("database operation failed: connection reset")
        );
    }

    #[test]
    fn validator_failure_skips_work() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let envelope = harness().run_sync(
            Task::new(None::<String>, move |name| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(name)
            })
            .validate(|name: &Option<String>| match name {
                Some(_) => Ok(()),
                None => Err("name is required"),
            }),
        );

        assert_eq!(envelope.message(), Some("validation failed: name is required"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_validator_is_a_validation_failure() {
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);

        let envelope = harness().run_sync(
            Task::new(None::<String>, move |name| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(name)
            })
            .validate(|name: &Option<String>| {
                let name = name.as_ref().unwrap();
                if name.is_empty() {
                    Err("name is required")
                } else {
                    Ok(())
                }
            }),
        );

        let message = envelope.message().expect("failure carries a message");
        assert!(
            message.starts_with("validation failed: called `Option::unwrap()`"),
            "unexpected message: {message}"
        );
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sync_task_may_borrow_from_the_caller() {
        let names = vec!["ada".to_owned(), "kit".to_owned()];
        let prefix = String::from("user:");

        let envelope = harness().run_sync(
            Task::new(&names, |names: &Vec<String>| {
                Ok::<_, &str>(
                    names
                        .iter()
                        .map(|name| format!("{prefix}{name}"))
                        .collect::<Vec<_>>(),
                )
            })
            .validate(|names: &&Vec<String>| if names.is_empty() { Err("empty") } else { Ok(()) }),
        );

        assert_eq!(
            envelope.payload(),
            Some(&vec!["user:ada".to_owned(), "user:kit".to_owned()])
        );
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn actions_and_fallbacks_accept_thread_local_state() {
        let calls = Rc::new(Cell::new(0));

        let counter = Rc::clone(&calls);
        let done = harness().run_action(move || {
            counter.set(counter.get() + 1);
            Ok::<_, &str>(())
        });
        assert_eq!(done, Envelope::empty());

        let counter = Rc::clone(&calls);
        let fallback = harness().run_or_default(
            move || {
                counter.set(counter.get() + 1);
                Err::<u32, _>("cache cold")
            },
            7,
        );
        assert_eq!(fallback.payload(), Some(&7));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn responder_shapes_the_envelope() {
        let envelope = harness().run_sync(
            Task::new(4, |n: i32| Ok::<_, &str>(n * n)).respond(|n| {
                if n > 10 {
                    Envelope::success(n)
                } else {
                    Envelope::failure("too small")
                }
            }),
        );
        assert_eq!(envelope.payload(), Some(&16));
    }

    #[test]
    fn panics_are_captured() {
        let envelope = harness().run_sync(Task::from_fn(|| -> Result<u8, &'static str> {
            panic!("index out of range")
        }));
        assert_eq!(
            envelope.message(),
            Some("database operation panicked: index out of range")
        );
    }

    #[test]
    fn run_or_default_substitutes_fallback() {
        let envelope = harness().run_or_default(|| Err::<Vec<u8>, _>("down"), vec![1, 2]);
        assert!(envelope.is_success());
        assert_eq!(envelope.payload(), Some(&vec![1, 2]));

        let envelope = harness().run_or_default(|| Ok::<_, &str>(vec![9]), Vec::new());
        assert_eq!(envelope.payload(), Some(&vec![9]));
    }
}
