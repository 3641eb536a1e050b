use std::{
    any::Any,
    fmt,
    future::Future,
    pin::{pin, Pin},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use tokio::{
    runtime::Handle,
    sync::{Notify, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::PoolError;

/// A named, fixed-size pool of execution slots.
///
/// Jobs run on the tokio runtime the pool was created on, but never more than
/// `size` at a time: each job holds one semaphore permit for its whole
/// lifetime and further submissions queue in FIFO order. Cloning is cheap and
/// shares the same slots.
///
/// Pools must be released with [`WorkerPool::shutdown`], which lets queued and
/// in-flight jobs finish and rejects anything submitted afterwards.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    size: usize,
    handle: Handle,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    /// Jobs submitted and not yet finished, queued ones included.
    accepted: AtomicUsize,
    drained: Notify,
}

/// Counts one accepted job until dropped.
struct Accepted {
    inner: Arc<Inner>,
}

impl Drop for Accepted {
    fn drop(&mut self) {
        if self.inner.accepted.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("size", &self.inner.size)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl WorkerPool {
    /// Creates a pool on the runtime of the calling context.
    ///
    /// Fails with [`PoolError::NoRuntime`] outside of a tokio runtime.
    pub fn new(name: impl Into<String>, size: usize) -> Result<Self, PoolError> {
        let handle = Handle::try_current().map_err(|_| PoolError::NoRuntime)?;
        Ok(Self::with_handle(name, size, handle))
    }

    /// Creates a pool that runs its jobs on `handle`. A `size` of zero is
    /// raised to one.
    pub fn with_handle(name: impl Into<String>, size: usize, handle: Handle) -> Self {
        let size = size.clamp(1, u32::MAX as usize).min(Semaphore::MAX_PERMITS);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                size,
                handle,
                permits: Arc::new(Semaphore::new(size)),
                closed: AtomicBool::new(false),
                accepted: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Jobs accepted and not yet finished, whether running or queued.
    pub fn pending(&self) -> usize {
        self.inner.accepted.load(Ordering::SeqCst)
    }

    /// Registers a job before the closed flag is checked, so `shutdown`
    /// either rejects it here or waits for it.
    fn accept(&self) -> Option<Accepted> {
        self.inner.accepted.fetch_add(1, Ordering::SeqCst);
        let accepted = Accepted {
            inner: Arc::clone(&self.inner),
        };
        if self.is_closed() {
            return None;
        }
        Some(accepted)
    }

    /// Number of jobs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.inner
            .size
            .saturating_sub(self.inner.permits.available_permits())
    }

    /// Submits an async job.
    pub fn spawn<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let Some(accepted) = self.accept() else {
            return JobHandle::rejected(self.name());
        };
        let permits = Arc::clone(&self.inner.permits);
        let pool = self.inner.name.clone();
        let join = self.inner.handle.spawn(async move {
            let _accepted = accepted;
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Closed { pool })?;
            Ok::<T, PoolError>(job.await)
        });
        JobHandle::running(self.name(), join)
    }

    /// Submits a synchronous job; it runs on the runtime's blocking threads so
    /// it never stalls async workers.
    pub fn spawn_blocking<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let Some(accepted) = self.accept() else {
            return JobHandle::rejected(self.name());
        };
        let permits = Arc::clone(&self.inner.permits);
        let pool = self.inner.name.clone();
        let join = self.inner.handle.spawn(async move {
            let _accepted = accepted;
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Closed { pool: pool.clone() })?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|err| join_error(&pool, err))
        });
        JobHandle::running(self.name(), join)
    }

    /// Stops accepting jobs, then waits until every job accepted before the
    /// call has finished, including jobs still queued for a slot.
    pub async fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        info!(
            pool = %self.inner.name,
            in_flight = self.in_flight(),
            pending = self.pending(),
            "worker pool shutdown requested"
        );

        loop {
            // registered before the count is read, so a drain in between wakes us
            let mut notified = pin!(self.inner.drained.notified());
            notified.as_mut().enable();
            if self.pending() == 0 {
                break;
            }
            notified.await;
        }
        self.inner.permits.close();

        info!(pool = %self.inner.name, "worker pool shut down");
    }
}

/// Completion of a pool job. Resolves to the job's output, or to a
/// [`PoolError`] when the job was rejected, panicked or was cancelled.
///
/// The job runs whether or not the handle is polled.
#[must_use = "dropping a JobHandle detaches the job and discards its result"]
pub struct JobHandle<T> {
    pool: String,
    join: Option<JoinHandle<Result<T, PoolError>>>,
}

impl<T> JobHandle<T> {
    fn running(pool: &str, join: JoinHandle<Result<T, PoolError>>) -> Self {
        Self {
            pool: pool.to_owned(),
            join: Some(join),
        }
    }

    fn rejected(pool: &str) -> Self {
        debug!(pool, "rejecting job on closed worker pool");
        Self {
            pool: pool.to_owned(),
            join: None,
        }
    }
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, PoolError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let Some(join) = this.join.as_mut() else {
            return Poll::Ready(Err(PoolError::Closed {
                pool: this.pool.clone(),
            }));
        };
        match Pin::new(join).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(err)) => Poll::Ready(Err(join_error(&this.pool, err))),
        }
    }
}

fn join_error(pool: &str, err: tokio::task::JoinError) -> PoolError {
    match err.try_into_panic() {
        Ok(payload) => PoolError::Panicked {
            pool: pool.to_owned(),
            message: panic_message(payload.as_ref()),
        },
        Err(_) => PoolError::Cancelled {
            pool: pool.to_owned(),
        },
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
