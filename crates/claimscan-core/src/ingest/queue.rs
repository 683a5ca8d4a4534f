use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::parser::{
    ContentValidator, DocumentFormat, ParseError, ParseResult, ParsedDocument, Parser,
};
use crate::config::QueueConfig;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Extraction failed after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: ParseError },
    #[error("Extraction rejected: {0}")]
    Rejected(ParseError),
    #[error("Processing queue is closed")]
    Closed,
}

pub type QueueResult<T> = Result<T, QueueError>;

/// A unit of extraction work. Lives only inside the queue.
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    pub id: String,
    pub payload: Vec<u8>,
    pub declared_extension: String,
    /// Attempts made so far
    pub attempt: u32,
}

impl ProcessingTask {
    #[must_use]
    pub fn new(payload: Vec<u8>, declared_extension: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            payload,
            declared_extension: declared_extension.into(),
            attempt: 0,
        }
    }
}

struct Job {
    task: ProcessingTask,
    reply: oneshot::Sender<QueueResult<ParsedDocument>>,
}

/// Pending outcome of a submitted task.
pub struct TaskHandle {
    receiver: oneshot::Receiver<QueueResult<ParsedDocument>>,
}

impl TaskHandle {
    pub async fn wait(self) -> QueueResult<ParsedDocument> {
        self.receiver.await.map_err(|_| QueueError::Closed)?
    }
}

/// Delay before the next attempt after `failures` failed ones.
#[must_use]
pub fn backoff_delay(base: Duration, failures: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(failures))
}

/// FIFO extraction queue with a single worker: at most one task runs at a
/// time, in submission order. Must be created inside a tokio runtime.
pub struct SerialQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    #[must_use]
    pub fn new(parser: Arc<dyn Parser>, validator: ContentValidator, config: QueueConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = Worker {
            parser,
            validator,
            config,
        };
        let handle = tokio::spawn(worker.run(receiver));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Queue a task without waiting for it.
    pub fn submit(&self, task: ProcessingTask) -> QueueResult<TaskHandle> {
        let (reply, receiver) = oneshot::channel();
        let task_id = task.id.clone();

        let guard = self.sender.lock().map_err(|_| QueueError::Closed)?;
        let sender = guard.as_ref().ok_or(QueueError::Closed)?;
        sender
            .send(Job { task, reply })
            .map_err(|_| QueueError::Closed)?;

        tracing::debug!(task_id = %task_id, "Task queued");

        Ok(TaskHandle { receiver })
    }

    pub async fn enqueue(&self, task: ProcessingTask) -> QueueResult<ParsedDocument> {
        self.submit(task)?.wait().await
    }

    /// Stop accepting tasks, let queued ones finish, then stop the worker.
    pub async fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }

        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue worker terminated abnormally");
            }
        }
    }
}

struct Worker {
    parser: Arc<dyn Parser>,
    validator: ContentValidator,
    config: QueueConfig,
}

impl Worker {
    async fn run(self, mut receiver: mpsc::UnboundedReceiver<Job>) {
        while let Some(Job { mut task, reply }) = receiver.recv().await {
            let outcome = self.process(&mut task).await;

            if reply.send(outcome).is_err() {
                tracing::debug!(task_id = %task.id, "Caller dropped before task finished");
            }

            tokio::time::sleep(self.config.inter_task_delay()).await;
        }

        tracing::debug!("Queue worker stopped");
    }

    async fn process(&self, task: &mut ProcessingTask) -> QueueResult<ParsedDocument> {
        let max_attempts = self.config.max_attempts.max(1);

        loop {
            task.attempt += 1;

            match self.attempt(task).await {
                Ok(document) => {
                    tracing::info!(
                        task_id = %task.id,
                        attempt = task.attempt,
                        chars = document.full_text.len(),
                        "Extraction succeeded"
                    );
                    return Ok(document);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(task_id = %task.id, error = %e, "Extraction failed permanently");
                    return Err(QueueError::Rejected(e));
                }
                Err(e) if task.attempt >= max_attempts => {
                    tracing::error!(
                        task_id = %task.id,
                        attempts = task.attempt,
                        error = %e,
                        "Extraction retries exhausted"
                    );
                    return Err(QueueError::Exhausted {
                        attempts: task.attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let delay = backoff_delay(self.config.base_delay(), task.attempt);
                    tracing::warn!(
                        task_id = %task.id,
                        attempt = task.attempt,
                        error = %e,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Extraction attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, task: &ProcessingTask) -> ParseResult<ParsedDocument> {
        let ext = task.declared_extension.trim_start_matches('.');
        let format = DocumentFormat::from_extension(ext)
            .ok_or_else(|| ParseError::UnsupportedFormat(ext.to_lowercase()))?;

        let timeout = self.config.task_timeout();
        let document = tokio::time::timeout(timeout, self.parser.parse_bytes(&task.payload, format))
            .await
            .map_err(|_| ParseError::Timeout(timeout))??;

        self.validator.validate(&document.full_text)?;
        Ok(document)
    }
}
