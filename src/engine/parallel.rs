//! Bounded worker-pool engine: a dedicated rayon thread pool processes
//! a level's tasks concurrently, with a single mutex-guarded
//! aggregator for the report and progress callback, scoped to this
//! level rather than held globally across the whole build.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::codec::Codec;
use crate::error::BuildError;
use crate::pair::{execute_pair_task, PairTask, TaskOutcome};

use super::{LevelEngine, LevelReport};

/// Advisory-only: if no task completes within this window the
/// watchdog logs a warning and keeps waiting. It never cancels work.
const STALL_WARNING: Duration = Duration::from_secs(60);

pub struct ParallelEngine {
    pub worker_count: usize,
}

impl ParallelEngine {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
        }
    }
}

impl LevelEngine for ParallelEngine {
    fn run_level(
        &self,
        tasks: Vec<PairTask>,
        codec: &Codec,
        output_compression: bool,
        memory_load_ceiling: u32,
        cancel: &CancelToken,
        on_progress: &mut (dyn FnMut(usize) + Send),
    ) -> Result<LevelReport, BuildError> {
        if tasks.is_empty() {
            return Ok(LevelReport::default());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_count)
            .build()
            .map_err(|e| BuildError::Unexpected {
                message: e.to_string(),
            })?;

        let report = Mutex::new(LevelReport::default());
        let progress = Mutex::new(on_progress);
        let last_progress_at = Mutex::new(Instant::now());
        let watchdog_stop = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| watchdog(&last_progress_at, &watchdog_stop));

            let result = pool.install(|| {
                tasks
                    .into_par_iter()
                    .try_for_each(|task| -> Result<(), BuildError> {
                        let outcome =
                            execute_pair_task(&task, codec, output_compression, memory_load_ceiling, cancel)?;
                        let cancelled = matches!(outcome, TaskOutcome::Cancelled { .. });
                        {
                            let mut rep = report.lock();
                            match outcome {
                                TaskOutcome::Done(result) => rep.results.push(result),
                                TaskOutcome::Skipped { index, reason } => {
                                    log::warn!("pair task {index} skipped: {reason}");
                                    rep.skipped.push((index, reason));
                                }
                                TaskOutcome::Cancelled { index } => {
                                    log::debug!("pair task {index} cancelled");
                                    rep.cancelled = true;
                                }
                            }
                        }
                        *last_progress_at.lock() = Instant::now();
                        if !cancelled {
                            (*progress.lock())(1);
                        }
                        Ok(())
                    })
            });

            watchdog_stop.store(true, std::sync::atomic::Ordering::SeqCst);
            result
        })?;

        Ok(report.into_inner())
    }
}

fn watchdog(last_progress_at: &Mutex<Instant>, stop: &std::sync::atomic::AtomicBool) {
    loop {
        std::thread::sleep(Duration::from_secs(5));
        if stop.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let elapsed = last_progress_at.lock().elapsed();
        if elapsed >= STALL_WARNING {
            log::warn!("no pair task has completed in over {}s, level may be stalled", elapsed.as_secs());
        }
    }
}
