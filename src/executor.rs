use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{header, StatusCode, Url};
use tokio::{sync::watch, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    request::CallRequest,
    retry::{classify_status, parse_retry_after, Backoff, StatusClass},
    CallError, CallOptions, Envelope, WorkerPool,
};

/// Issues outbound HTTP calls with bounded retries and exponential backoff.
///
/// Every public operation resolves to an [`Envelope`]; failures never escape
/// as errors or panics. Cloning is cheap: clones share the HTTP transport,
/// the worker pool and the interrupt signal.
#[derive(Clone)]
pub struct CallExecutor {
    http: reqwest::Client,
    options: CallOptions,
    pool: WorkerPool,
    interrupt: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for CallExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallExecutor")
            .field("options", &self.options)
            .field("pool", &self.pool)
            .finish()
    }
}

/// A fully read response.
struct Reply {
    status: StatusCode,
    retry_after: Option<Duration>,
    body: String,
}

impl CallExecutor {
    /// Creates an executor over a shared transport; `execute_async` dispatches
    /// onto `pool`.
    pub fn new(http: reqwest::Client, pool: WorkerPool) -> Self {
        let (interrupt, _) = watch::channel(false);
        Self {
            http,
            options: CallOptions::default(),
            pool,
            interrupt: Arc::new(interrupt),
        }
    }

    /// Applies timeout and backoff options.
    pub fn with_options(mut self, opts: CallOptions) -> Self {
        self.options = opts;
        self
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs the call on the caller's task and reports the outcome.
    ///
    /// On success the envelope wraps the raw response body.
    pub async fn execute(&self, request: &CallRequest) -> Envelope<String> {
        let started = Instant::now();
        match self.call_with_retry(request).await {
            Ok(body) => Envelope::success(body),
            Err(err) => {
                error!(
                    url = %request.url,
                    method = %request.method,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "outbound call failed"
                );
                Envelope::failure(err.to_string())
            }
        }
    }

    /// Dispatches [`execute`](Self::execute) onto the worker pool.
    ///
    /// The call is submitted immediately; the returned future only collects
    /// its result.
    pub fn execute_async(
        &self,
        request: CallRequest,
    ) -> impl Future<Output = Envelope<String>> + Send + 'static {
        let executor = self.clone();
        let job = self
            .pool
            .spawn(async move { executor.execute(&request).await });
        async move {
            job.await
                .unwrap_or_else(|err| Envelope::failure(CallError::from(err).to_string()))
        }
    }

    /// Cuts short every backoff wait in progress, and any started later. The
    /// affected calls end with [`CallError::Interrupted`].
    pub fn interrupt(&self) {
        self.interrupt.send_replace(true);
    }

    /// Interrupts pending retries, then drains and closes the worker pool.
    pub async fn shutdown(&self) {
        self.interrupt();
        self.pool.shutdown().await;
    }

    async fn call_with_retry(&self, request: &CallRequest) -> Result<String, CallError> {
        let url = request.full_url()?;
        let started = Instant::now();
        let deadline = self.options.deadline_ms.map(Duration::from_millis);
        let mut backoff = Backoff::new(
            Duration::from_millis(self.options.initial_backoff_ms),
            Duration::from_millis(self.options.max_backoff_ms),
        );
        let mut interrupted = self.interrupt.subscribe();
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);
            let attempt_started = Instant::now();
            info!(attempt, url = %url, method = %request.method, "sending request");

            let (err, wait) = match self.send_once(request, &url).await {
                Ok(reply) => {
                    let class = classify_status(reply.status);
                    info!(
                        attempt,
                        status = reply.status.as_u16(),
                        elapsed_ms = attempt_started.elapsed().as_millis() as u64,
                        "received response"
                    );
                    let wait = match class {
                        StatusClass::Success => return Ok(reply.body),
                        StatusClass::Throttled => reply
                            .retry_after
                            .map(|requested| backoff.clamp(requested))
                            .unwrap_or_else(|| backoff.current()),
                        StatusClass::ServerError => backoff.current(),
                        StatusClass::Terminal => {
                            return Err(CallError::Http {
                                status: reply.status.as_u16(),
                                body: reply.body,
                            })
                        }
                    };
                    let err = CallError::Http {
                        status: reply.status.as_u16(),
                        body: reply.body,
                    };
                    (err, wait)
                }
                Err(err) if err.is_builder() => {
                    return Err(CallError::InvalidRequest(err.to_string()));
                }
                Err(err) => (CallError::Transport(err), backoff.current()),
            };

            if attempt > request.max_retries {
                return Err(err);
            }

            if let Some(deadline) = deadline {
                if started.elapsed() + wait > deadline {
                    return Err(CallError::DeadlineExceeded {
                        deadline,
                        attempt,
                        last: Box::new(err),
                    });
                }
            }

            warn!(
                attempt,
                max_retries = request.max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "transient failure, retrying"
            );

            tokio::select! {
                () = sleep(wait) => {}
                () = wait_for_interrupt(&mut interrupted) => {
                    return Err(CallError::Interrupted { attempt });
                }
            }
            backoff.advance();
        }
    }

    async fn send_once(&self, request: &CallRequest, url: &Url) -> Result<Reply, reqwest::Error> {
        let mut builder = self
            .http
            .request(request.method.to_reqwest(), url.clone())
            .timeout(self.options.timeout());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if request.method.carries_body() {
            if request.content_type().is_none() {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
            }
            builder = builder.body(request.body.clone().unwrap_or_default());
        }

        let response = builder.send().await?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await?;
        debug!(status = status.as_u16(), bytes = body.len(), "read response body");

        Ok(Reply {
            status,
            retry_after,
            body,
        })
    }
}

/// Resolves once an interrupt has been signalled. Never resolves if the
/// sender is gone.
async fn wait_for_interrupt(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
