//! FIFO Admission Queue
//!
//! Requests are type-erased into [`QueuedRequest`] so a single drain loop can
//! own one FIFO channel regardless of what each caller expects back. A
//! request is executed at most once; every request is settled exactly once,
//! either with its outcome or with a rejection.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::error::GateError;
use crate::metrics;

/// Receiver half consumed by the drain loop
pub(crate) type QueueReceiver = mpsc::UnboundedReceiver<QueuedRequest>;

/// A caller's request waiting for admission
pub(crate) struct QueuedRequest {
    /// Request id for logs
    pub id: Uuid,

    /// Model recorded in the ledger once dispatched
    pub model: String,

    /// When the caller submitted
    pub enqueued_at: tokio::time::Instant,

    job: Box<dyn Job>,
}

impl QueuedRequest {
    /// Wrap `execute` and return the receiver its outcome is delivered on
    pub fn new<F, Fut, T>(
        model: impl Into<String>,
        execute: F,
    ) -> (Self, oneshot::Receiver<Result<T, GateError>>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (reply, rx) = oneshot::channel();
        let request = Self {
            id: Uuid::new_v4(),
            model: model.into(),
            enqueued_at: tokio::time::Instant::now(),
            job: Box::new(PendingJob { execute, reply }),
        };
        (request, rx)
    }

    /// Run the request; the caller is not answered until `settle`
    pub async fn execute(self) -> Box<dyn Completion> {
        self.job.run().await
    }

    /// Answer the caller without running the request
    pub fn reject(self, error: GateError) {
        metrics::REQUESTS_REJECTED_TOTAL
            .with_label_values(&[error.reason()])
            .inc();
        tracing::debug!(request_id = %self.id, reason = error.reason(), "Rejecting queued request");
        self.job.reject(error);
    }
}

impl std::fmt::Debug for QueuedRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("id", &self.id)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Executed request whose caller has not been answered yet
pub(crate) trait Completion: Send {
    /// Whether the wrapped call returned successfully
    fn succeeded(&self) -> bool;

    /// Deliver the outcome; `persisted` is false when usage could not be saved
    fn settle(self: Box<Self>, persisted: bool);
}

trait Job: Send {
    fn run(self: Box<Self>) -> BoxFuture<'static, Box<dyn Completion>>;
    fn reject(self: Box<Self>, error: GateError);
}

struct PendingJob<F, T> {
    execute: F,
    reply: oneshot::Sender<Result<T, GateError>>,
}

impl<F, Fut, T> Job for PendingJob<F, T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>) -> BoxFuture<'static, Box<dyn Completion>> {
        let PendingJob { execute, reply } = *self;
        async move {
            let result = match AssertUnwindSafe(async move { execute().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("request execution panicked")),
            };
            Box::new(FinishedJob { result, reply }) as Box<dyn Completion>
        }
        .boxed()
    }

    fn reject(self: Box<Self>, error: GateError) {
        // The caller may have gone away; nothing to do then.
        let _ = self.reply.send(Err(error));
    }
}

struct FinishedJob<T> {
    result: anyhow::Result<T>,
    reply: oneshot::Sender<Result<T, GateError>>,
}

impl<T: Send + 'static> Completion for FinishedJob<T> {
    fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    fn settle(self: Box<Self>, persisted: bool) {
        let outcome = match self.result {
            Err(e) => Err(GateError::Execution(e)),
            Ok(_) if !persisted => Err(GateError::PersistFailed),
            Ok(value) => Ok(value),
        };
        let _ = self.reply.send(outcome);
    }
}

/// Sending half of the FIFO plus its depth counter
#[derive(Debug)]
pub(crate) struct AdmissionQueue {
    tx: mpsc::UnboundedSender<QueuedRequest>,
    depth: AtomicUsize,
}

impl AdmissionQueue {
    /// Create the queue and the receiver the drain loop consumes
    pub fn new() -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                depth: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Append at the tail; gives the request back if the drain loop is gone
    pub fn push(&self, request: QueuedRequest) -> Result<(), QueuedRequest> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        metrics::QUEUE_LENGTH.inc();
        match self.tx.send(request) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(request)) => {
                self.mark_taken();
                Err(request)
            }
        }
    }

    /// Account for a request leaving the queue
    pub fn mark_taken(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        metrics::QUEUE_LENGTH.dec();
    }

    /// Requests waiting for admission, including the head being gated
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
