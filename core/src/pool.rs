use crate::enumerator::ImageRef;
use indicatif::ProgressBar;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Shared flag used to stop a run early.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a single reference task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(String),
    /// Not run, or abandoned, because the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult<T> {
    pub reference: ImageRef,
    pub outcome: TaskOutcome<T>,
}

impl<T> TaskResult<T> {
    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Results of a drained pool, in reference order.
#[derive(Debug, Clone)]
pub struct PoolRun<T> {
    pub tasks: Vec<TaskResult<T>>,
    pub cancelled: bool,
}

impl<T> PoolRun<T> {
    pub fn completed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TaskOutcome::Completed(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, TaskOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, TaskOutcome::Skipped))
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome<T>) -> bool) -> usize {
        self.tasks
            .iter()
            .filter(|task| predicate(&task.outcome))
            .count()
    }
}

/// Fixed-size pool running one task per reference image.
///
/// A failing or panicking task is recorded as [`TaskOutcome::Failed`] and
/// never aborts its siblings. [`WorkerPool::run`] returns only once every
/// task has finished.
pub struct WorkerPool {
    pool: ThreadPool,
    cancel: CancelToken,
    progress: ProgressBar,
    finished: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Result<Self, PoolError> {
        if concurrency == 0 {
            return Err(PoolError::InvalidConcurrency);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|index| format!("scorer-{}", index))
            .build()
            .map_err(PoolError::Build)?;
        Ok(Self {
            pool,
            cancel: CancelToken::new(),
            progress: ProgressBar::hidden(),
            finished: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of tasks of the current or last run that have finished.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn run<T, E, F>(&self, references: &[ImageRef], task: F) -> PoolRun<T>
    where
        T: Send,
        E: Display,
        F: Fn(&ImageRef) -> Result<T, E> + Sync,
    {
        let total = references.len();
        self.finished.store(0, Ordering::Relaxed);
        self.progress.set_length(total as u64);
        self.progress.set_position(0);

        let tasks = self.pool.install(|| {
            references
                .par_iter()
                .map(|reference| {
                    let outcome = self.run_one(reference, &task);
                    let finished = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
                    self.progress.inc(1);
                    tracing::debug!(
                        finished,
                        total,
                        reference = %reference.path.display(),
                        "reference task finished"
                    );
                    TaskResult {
                        reference: reference.clone(),
                        outcome,
                    }
                })
                .collect::<Vec<_>>()
        });

        PoolRun {
            tasks,
            cancelled: self.cancel.is_cancelled(),
        }
    }

    fn run_one<T, E, F>(&self, reference: &ImageRef, task: &F) -> TaskOutcome<T>
    where
        E: Display,
        F: Fn(&ImageRef) -> Result<T, E>,
    {
        if self.cancel.is_cancelled() {
            return TaskOutcome::Skipped;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| task(reference))) {
            Ok(Ok(value)) => TaskOutcome::Completed(value),
            Ok(Err(_)) if self.cancel.is_cancelled() => TaskOutcome::Skipped,
            Ok(Err(error)) => {
                tracing::warn!(
                    reference = %reference.path.display(),
                    %error,
                    "reference task failed"
                );
                TaskOutcome::Failed(error.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    reference = %reference.path.display(),
                    %message,
                    "reference task panicked"
                );
                TaskOutcome::Failed(message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("task panicked")
    }
}

#[derive(Debug)]
pub enum PoolError {
    InvalidConcurrency,
    Build(rayon::ThreadPoolBuildError),
}

impl Display for PoolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidConcurrency => write!(f, "concurrency must be at least 1"),
            Self::Build(error) => write!(f, "failed to start worker pool: {}", error),
        }
    }
}

impl Error for PoolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Build(error) => Some(error),
            Self::InvalidConcurrency => None,
        }
    }
}
