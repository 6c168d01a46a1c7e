//! Bounded worker pool for batches of independent jobs.
//!
//! A batch always drains: a failing (or panicking) job never cancels its
//! siblings, and results come back in completion order.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use bdk_util::process::CommandOutput;

use crate::error::EngineError;

/// What a finished job reports: exit status plus captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub success: bool,
    /// `None` when the process never ran or was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl JobStatus {
    /// A successful job with no output.
    pub fn succeeded() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// A job that exited with `code`.
    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            success: false,
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_owned(),
        }
    }

    /// A job whose process could not be started at all.
    pub fn not_started(message: &str) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: message.to_owned(),
        }
    }

    /// Short human-readable description of a failure.
    pub fn describe(&self) -> String {
        match (self.success, self.exit_code) {
            (true, _) => "ok".to_owned(),
            (false, Some(code)) => format!("exit code {code}"),
            (false, None) => "did not run to completion".to_owned(),
        }
    }
}

impl From<CommandOutput> for JobStatus {
    fn from(output: CommandOutput) -> Self {
        Self {
            success: output.success,
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// A unit of work tagged with the identity it reports under.
pub struct Job<'a> {
    identity: String,
    task: Box<dyn FnOnce() -> JobStatus + Send + 'a>,
}

impl<'a> Job<'a> {
    pub fn new(identity: impl Into<String>, task: impl FnOnce() -> JobStatus + Send + 'a) -> Self {
        Self {
            identity: identity.into(),
            task: Box::new(task),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl std::fmt::Debug for Job<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// The `(identity, result)` pair a finished job produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub identity: String,
    pub status: JobStatus,
}

/// A fixed-size pool of worker threads.
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Start a pool with exactly `max_workers` threads.
    ///
    /// # Errors
    /// Returns an error if `max_workers` is zero or the threads cannot be spawned.
    pub fn new(max_workers: usize) -> Result<Self, EngineError> {
        if max_workers == 0 {
            return Err(EngineError::WorkerPool {
                message: "at least one worker is required".to_owned(),
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("bdk-worker-{i}"))
            .build()
            .map_err(|e| EngineError::WorkerPool {
                message: e.to_string(),
            })?;
        Ok(Self {
            pool,
            workers: max_workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `op` inside the pool so that rayon parallel iterators use it.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Run every job and return one report per job, in completion order.
    pub fn run_all(&self, jobs: Vec<Job<'_>>) -> Vec<JobReport> {
        let (tx, rx) = mpsc::channel();
        self.pool.scope(move |scope| {
            for job in jobs {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let Job { identity, task } = job;
                    let status = panic::catch_unwind(AssertUnwindSafe(task))
                        .unwrap_or_else(|payload| {
                            JobStatus::not_started(&format!(
                                "job panicked: {}",
                                panic_message(payload.as_ref())
                            ))
                        });
                    // The receiver outlives the scope, so this cannot fail.
                    let _ = tx.send(JobReport { identity, status });
                });
            }
        });
        rx.into_iter().collect()
    }
}

/// Run a batch on a fresh pool of `max_workers` threads.
///
/// # Errors
/// Returns an error if the pool cannot be created.
pub fn run_all(jobs: Vec<Job<'_>>, max_workers: usize) -> Result<Vec<JobReport>, EngineError> {
    Ok(WorkerPool::new(max_workers)?.run_all(jobs))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
