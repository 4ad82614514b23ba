//! Dispatch stage - paths × checkers on a worker pool
//!
//! A job builder thread expands every path into one `CheckJob` per checker.
//! A fixed pool of workers claims jobs from a shared bounded channel and
//! publishes conflicts into the bounded result channel.
//!
//! The result channel closes once the job builder and every worker have
//! returned: each worker owns one clone of the result sender and the
//! dispatcher keeps none, so the live sender count is the completion barrier.
//! A worker that unwinds still drops its sender.
//!
//! With `Concurrency::Inline` nothing is spawned: the returned stream runs
//! source, checks and emission in lockstep on whichever thread pulls it.

use crate::pipeline::config::{Concurrency, PipelineConfig};
use crate::pipeline::stages::checker::FileChecker;
use crate::pipeline::types::{CheckError, CheckJob, CheckResult, Conflict};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

/// Live counters shared by the dispatch threads.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    paths: AtomicUsize,
    jobs: AtomicUsize,
    conflicts: AtomicUsize,
    job_errors: AtomicUsize,
    panics: AtomicUsize,
}

impl DispatchCounters {
    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            paths: self.paths.load(Ordering::Relaxed),
            jobs: self.jobs.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            job_errors: self.job_errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

/// Statistics from one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Paths taken from the source
    pub paths: usize,
    /// Jobs executed
    pub jobs: usize,
    /// Conflicts published
    pub conflicts: usize,
    /// Jobs whose checker returned an error
    pub job_errors: usize,
    /// Jobs whose checker panicked
    pub panics: usize,
}

/// Expands paths against every checker and runs the jobs.
pub struct Dispatcher {
    checkers: Arc<[Arc<dyn FileChecker>]>,
    concurrency: Concurrency,
    job_channel_size: usize,
    conflict_channel_size: usize,
}

impl Dispatcher {
    /// Create a dispatcher. At least one checker is required.
    pub fn new(
        checkers: Vec<Arc<dyn FileChecker>>,
        config: &PipelineConfig,
    ) -> CheckResult<Self> {
        if checkers.is_empty() {
            return Err(CheckError::NoCheckers);
        }
        Ok(Self {
            checkers: checkers.into(),
            concurrency: config.concurrency,
            job_channel_size: config.job_channel_size.max(1),
            conflict_channel_size: config.conflict_channel_size.max(1),
        })
    }

    pub fn checker_count(&self) -> usize {
        self.checkers.len()
    }

    /// Start checking `paths`. Conflicts are pulled from the returned
    /// `Dispatch`; with a worker pool they arrive in no particular order.
    pub fn dispatch<I>(&self, paths: I) -> Dispatch
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        let counters = Arc::new(DispatchCounters::default());
        let paths = paths.into_iter();

        let stream = match self.concurrency {
            Concurrency::Inline => ConflictStream::Inline(InlineChecks {
                paths: Box::new(paths),
                checkers: Arc::clone(&self.checkers),
                current: None,
                counters: Arc::clone(&counters),
                done: false,
            }),
            Concurrency::Workers(workers) => {
                let conflicts = self.spawn_pool(paths, workers.get(), &counters);
                ConflictStream::Pooled(conflicts.into_iter())
            }
        };

        Dispatch { stream, counters }
    }

    fn spawn_pool<I>(
        &self,
        paths: I,
        workers: usize,
        counters: &Arc<DispatchCounters>,
    ) -> Receiver<Conflict>
    where
        I: Iterator<Item = String> + Send + 'static,
    {
        let (job_tx, job_rx) = bounded(self.job_channel_size);
        let (conflict_tx, conflict_rx) = bounded(self.conflict_channel_size);

        let builder_handle = {
            let checkers = Arc::clone(&self.checkers);
            let counters = Arc::clone(counters);
            thread::spawn(move || build_jobs(paths, &checkers, job_tx, &counters))
        };

        let worker_handles: Vec<_> = (0..workers)
            .map(|id| {
                let rx = job_rx.clone();
                let tx = conflict_tx.clone();
                let counters = Arc::clone(counters);
                thread::spawn(move || run_worker(id, rx, tx, &counters))
            })
            .collect();
        drop(job_rx); // Workers hold the only receivers
        drop(conflict_tx); // Workers hold the only senders

        let counters = Arc::clone(counters);
        let concurrency = self.concurrency;
        thread::spawn(move || supervise(builder_handle, worker_handles, &counters, concurrency));

        conflict_rx
    }
}

/// Emit one job per (path, checker), checkers inner.
fn build_jobs<I>(
    paths: I,
    checkers: &[Arc<dyn FileChecker>],
    jobs: Sender<CheckJob>,
    counters: &DispatchCounters,
) where
    I: Iterator<Item = String>,
{
    for path in paths {
        counters.paths.fetch_add(1, Ordering::Relaxed);
        let path: Arc<str> = Arc::from(path);
        for checker in checkers {
            if jobs.send(CheckJob::new(Arc::clone(&path), Arc::clone(checker))).is_err() {
                // Every worker is gone
                return;
            }
        }
    }
}

fn run_worker(
    id: usize,
    jobs: Receiver<CheckJob>,
    conflicts: Sender<Conflict>,
    counters: &DispatchCounters,
) -> usize {
    let mut handled = 0;
    for job in jobs {
        handled += 1;
        if let Some(conflict) = execute(&job, counters) {
            if conflicts.send(conflict).is_err() {
                tracing::debug!("[dispatch] worker {id}: result channel closed");
                break;
            }
            counters.conflicts.fetch_add(1, Ordering::Relaxed);
        }
    }
    tracing::trace!("[dispatch] worker {id} done after {handled} jobs");
    handled
}

/// Run one job. Errors and panics are logged and yield no conflict.
fn execute(job: &CheckJob, counters: &DispatchCounters) -> Option<Conflict> {
    counters.jobs.fetch_add(1, Ordering::Relaxed);
    match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
        Ok(Ok(conflict)) => conflict,
        Ok(Err(e)) => {
            counters.job_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "[dispatch] checking {} against {}: {e}",
                job.path,
                job.checker.ignore_file().display()
            );
            None
        }
        Err(payload) => {
            counters.panics.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                "[dispatch] checker {} panicked on {}: {}",
                job.checker.ignore_file().display(),
                job.path,
                panic_message(payload.as_ref())
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn supervise(
    builder: JoinHandle<()>,
    workers: Vec<JoinHandle<usize>>,
    counters: &DispatchCounters,
    concurrency: Concurrency,
) {
    if builder.join().is_err() {
        tracing::error!("[dispatch] job builder thread panicked");
    }
    let failed = workers
        .into_iter()
        .map(JoinHandle::join)
        .filter(Result::is_err)
        .count();
    if failed > 0 {
        tracing::error!("[dispatch] {failed} worker threads panicked");
    }
    log_summary(&counters.snapshot(), concurrency);
}

fn log_summary(stats: &DispatchStats, concurrency: Concurrency) {
    tracing::info!(
        "[dispatch] complete ({concurrency}): paths={}, jobs={}, conflicts={}, errors={}, panics={}",
        stats.paths,
        stats.jobs,
        stats.conflicts,
        stats.job_errors,
        stats.panics
    );
}

/// Lockstep execution for `Concurrency::Inline`: paths outer, checkers inner.
struct InlineChecks {
    paths: Box<dyn Iterator<Item = String> + Send>,
    checkers: Arc<[Arc<dyn FileChecker>]>,
    /// Path being expanded and index of the next checker to try
    current: Option<(Arc<str>, usize)>,
    counters: Arc<DispatchCounters>,
    done: bool,
}

impl Iterator for InlineChecks {
    type Item = Conflict;

    fn next(&mut self) -> Option<Conflict> {
        loop {
            let (path, index) = match self.current.take() {
                Some(current) => current,
                None => {
                    if self.done {
                        return None;
                    }
                    match self.paths.next() {
                        Some(path) => {
                            self.counters.paths.fetch_add(1, Ordering::Relaxed);
                            (Arc::from(path), 0)
                        }
                        None => {
                            self.done = true;
                            log_summary(&self.counters.snapshot(), Concurrency::Inline);
                            return None;
                        }
                    }
                }
            };

            let Some(checker) = self.checkers.get(index) else {
                continue;
            };
            let job = CheckJob::new(Arc::clone(&path), Arc::clone(checker));
            self.current = Some((path, index + 1));

            if let Some(conflict) = execute(&job, &self.counters) {
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                return Some(conflict);
            }
        }
    }
}

enum ConflictStream {
    Inline(InlineChecks),
    Pooled(crossbeam_channel::IntoIter<Conflict>),
}

/// A running dispatch: an iterator over its conflicts.
///
/// The iterator ends when every job has been checked.
pub struct Dispatch {
    stream: ConflictStream,
    counters: Arc<DispatchCounters>,
}

impl Dispatch {
    /// Counters so far. Final once the iterator has ended.
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Shared counters, readable after the dispatch has been handed off.
    pub fn counters(&self) -> Arc<DispatchCounters> {
        Arc::clone(&self.counters)
    }
}

impl Iterator for Dispatch {
    type Item = Conflict;

    fn next(&mut self) -> Option<Conflict> {
        match &mut self.stream {
            ConflictStream::Inline(checks) => checks.next(),
            ConflictStream::Pooled(rx) => rx.next(),
        }
    }
}
