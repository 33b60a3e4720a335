//! Batch runner: fans documents out to blocking workers with a per-document timeout.
//!
//! A worker slot belongs to the blocking work, not to the task waiting on it,
//! so a document that hangs past its timeout keeps its slot until it really
//! ends. When every slot is held by such a document, queued documents are
//! reported as problems instead of waiting forever.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::error::ScoringError;
use crate::config::ScoringConfig;
use crate::domain::ProblemDocument;
use crate::observability::metrics;
use crate::pipeline::reference::ReferenceData;
use crate::pipeline::researcher::{DocumentOutcome, ResearcherPipeline, ResearcherReport};

/// How long a runtime waits for abandoned workers when it shuts down.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);
/// How often a queued document rechecks whether every worker is stuck.
const STUCK_POLL: Duration = Duration::from_millis(200);

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Runs `future` on a fresh multi-thread runtime and shuts it down without
/// waiting on workers stuck on timed-out documents past [`SHUTDOWN_GRACE`].
pub fn run_on_runtime<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    Ok(output)
}

/// A worker slot owned by the blocking work; released only when that work ends.
struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
    state: Arc<AtomicU8>,
    stuck: Arc<AtomicUsize>,
}

impl WorkerSlot {
    fn new(permit: OwnedSemaphorePermit, stuck: Arc<AtomicUsize>) -> Self {
        Self {
            _permit: permit,
            state: Arc::new(AtomicU8::new(RUNNING)),
            stuck,
        }
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        if self.state.swap(FINISHED, Ordering::AcqRel) == ABANDONED {
            self.stuck.fetch_sub(1, Ordering::AcqRel);
            debug!("Abandoned worker finished, slot released");
        }
    }
}

/// Everything one batch run produced, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reports: Vec<ResearcherReport>,
    pub problems: Vec<ProblemDocument>,
}

impl BatchReport {
    pub fn document_count(&self) -> usize {
        self.reports.len() + self.problems.len()
    }
}

pub struct BatchRunner {
    pipeline: Arc<ResearcherPipeline>,
    workers: usize,
    timeout: Duration,
}

impl BatchRunner {
    pub fn new(config: &ScoringConfig, references: Arc<ReferenceData>) -> Self {
        Self {
            pipeline: Arc::new(ResearcherPipeline::new(config, references)),
            workers: config.workers.max(1),
            timeout: Duration::from_secs(config.document_timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn pipeline(&self) -> &ResearcherPipeline {
        &self.pipeline
    }

    /// Scores every path. One document failing, hanging or panicking never
    /// stops the batch; it is reported as a problem document instead.
    pub async fn run(&self, paths: Vec<PathBuf>) -> BatchReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(%run_id, documents = paths.len(), workers = self.workers, "Batch started");
        metrics::batch::documents(paths.len() as u64);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let stuck = Arc::new(AtomicUsize::new(0));
        let mut set = JoinSet::new();
        for (index, path) in paths.iter().cloned().enumerate() {
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();
            let stuck = stuck.clone();
            let workers = self.workers;
            let timeout = self.timeout;
            set.spawn(async move {
                let outcome = match acquire_slot(semaphore, &stuck, workers).await {
                    Ok(permit) => {
                        let slot = WorkerSlot::new(permit, stuck.clone());
                        let worker_path = path.clone();
                        run_guarded(path, timeout, slot, move || pipeline.process_path(&worker_path))
                            .await
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Document not started");
                        DocumentOutcome::Problem(ProblemDocument::bare(&path, e.to_string()))
                    }
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<DocumentOutcome>> = vec![None; paths.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => error!(error = %e, "Batch task failed to join"),
            }
        }

        let mut reports = Vec::new();
        let mut problems = Vec::new();
        for (path, outcome) in paths.iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                DocumentOutcome::Problem(ProblemDocument::bare(path, "worker task lost"))
            });
            match outcome {
                DocumentOutcome::Scored(report) => reports.push(*report),
                DocumentOutcome::Problem(problem) => {
                    metrics::batch::problem_document(problem_kind(&problem.reason));
                    problems.push(problem);
                }
            }
        }

        let finished_at = Utc::now();
        metrics::batch::duration(start.elapsed().as_secs_f64());
        info!(
            %run_id,
            scored = reports.len(),
            problems = problems.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch finished"
        );

        BatchReport {
            run_id,
            started_at,
            finished_at,
            reports,
            problems,
        }
    }
}

/// Waits for a free slot, giving up once every slot is held by a timed-out document.
async fn acquire_slot(
    semaphore: Arc<Semaphore>,
    stuck: &AtomicUsize,
    workers: usize,
) -> Result<OwnedSemaphorePermit, ScoringError> {
    loop {
        match tokio::time::timeout(STUCK_POLL, semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => return Ok(permit),
            Ok(Err(e)) => return Err(ScoringError::config(format!("worker pool closed: {}", e))),
            Err(_) if stuck.load(Ordering::Acquire) >= workers => {
                return Err(ScoringError::WorkersExhausted { workers })
            }
            Err(_) => continue,
        }
    }
}

/// Runs `work` on the blocking pool, holding `slot` until the work returns
/// or unwinds. Timeouts and panics become problem documents.
async fn run_guarded<F>(path: PathBuf, timeout: Duration, slot: WorkerSlot, work: F) -> DocumentOutcome
where
    F: FnOnce() -> DocumentOutcome + Send + 'static,
{
    let state = slot.state.clone();
    let stuck = slot.stuck.clone();
    let task = tokio::task::spawn_blocking(move || {
        let _slot = slot;
        work()
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(path = %path.display(), error = %e, "Document worker panicked");
            DocumentOutcome::Problem(ProblemDocument::bare(&path, format!("worker panicked: {}", e)))
        }
        Err(_) => {
            metrics::batch::timeout();
            stuck.fetch_add(1, Ordering::AcqRel);
            if state
                .compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // finished right at the deadline; its slot is already free
                stuck.fetch_sub(1, Ordering::AcqRel);
            }
            let err = ScoringError::DocumentTimeout {
                path: path.clone(),
                secs: timeout.as_secs(),
            };
            error!(error = %err, "Document abandoned");
            DocumentOutcome::Problem(ProblemDocument::bare(&path, err.to_string()))
        }
    }
}

/// Low-cardinality label for the problem counter.
fn problem_kind(reason: &str) -> &'static str {
    if reason.starts_with("parse error") {
        "parse"
    } else if reason.starts_with("missing") {
        "missing_field"
    } else if reason.contains("timed out") {
        "timeout"
    } else if reason.starts_with("No worker available") {
        "workers_exhausted"
    } else if reason.starts_with("worker") {
        "worker"
    } else {
        "io"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn slot(semaphore: &Arc<Semaphore>, stuck: &Arc<AtomicUsize>) -> WorkerSlot {
        WorkerSlot::new(semaphore.clone().try_acquire_owned().unwrap(), stuck.clone())
    }

    #[test]
    fn problem_kinds_are_bounded() {
        assert_eq!(problem_kind("parse error: unexpected end"), "parse");
        assert_eq!(problem_kind("missing NOME-COMPLETO"), "missing_field");
        assert_eq!(problem_kind("worker panicked: boom"), "worker");
        assert_eq!(problem_kind("Document timed out after 1s: a.xml"), "timeout");
        assert_eq!(
            problem_kind(&ScoringError::WorkersExhausted { workers: 2 }.to_string()),
            "workers_exhausted"
        );
        assert_eq!(problem_kind("No such file or directory"), "io");
    }

    #[tokio::test]
    async fn test_panicking_worker_becomes_a_problem_and_frees_its_slot() {
        let semaphore = Arc::new(Semaphore::new(1));
        let stuck = Arc::new(AtomicUsize::new(0));
        let outcome = run_guarded(
            PathBuf::from("cv/1-a.xml"),
            Duration::from_secs(5),
            slot(&semaphore, &stuck),
            || panic!("boom"),
        )
        .await;

        match outcome {
            DocumentOutcome::Problem(p) => {
                assert_eq!(p.path, "cv/1-a.xml");
                assert!(p.reason.starts_with("worker panicked"));
            }
            DocumentOutcome::Scored(_) => panic!("panicking worker was scored"),
        }
        assert_eq!(semaphore.available_permits(), 1);
        assert_eq!(stuck.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn test_timed_out_worker_keeps_its_slot_until_it_ends() {
        let semaphore = Arc::new(Semaphore::new(1));
        let stuck = Arc::new(AtomicUsize::new(0));
        let (release, wait) = std::sync::mpsc::channel::<()>();

        let outcome = run_guarded(
            PathBuf::from("cv/2-b.xml"),
            Duration::from_millis(50),
            slot(&semaphore, &stuck),
            move || {
                wait.recv().ok();
                DocumentOutcome::Problem(ProblemDocument::bare(Path::new("late"), "late"))
            },
        )
        .await;

        match outcome {
            DocumentOutcome::Problem(p) => assert!(p.reason.contains("timed out")),
            DocumentOutcome::Scored(_) => panic!("hung worker was scored"),
        }
        assert_eq!(semaphore.available_permits(), 0);
        assert_eq!(stuck.load(Ordering::Acquire), 1);

        // a queued document gives up instead of waiting on the stuck slot
        let err = acquire_slot(semaphore.clone(), &stuck, 1).await.unwrap_err();
        assert!(matches!(err, ScoringError::WorkersExhausted { workers: 1 }));

        release.send(()).unwrap();
        let permit = tokio::time::timeout(Duration::from_secs(5), semaphore.clone().acquire_owned())
            .await
            .unwrap()
            .unwrap();
        drop(permit);
        assert_eq!(stuck.load(Ordering::Acquire), 0);
    }
}
