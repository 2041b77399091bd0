//! Shared contract for running one pyramid level's pair tasks to
//! completion, with two interchangeable implementations
//! ([`parallel::ParallelEngine`], [`sequential::SequentialEngine`]).
//!
//! One level's worth of tasks in, one report out, so the caller
//! (`orchestrator.rs`) owns level iteration and engine selection is a
//! pure swap.

pub mod parallel;
pub mod sequential;

use crate::cancel::CancelToken;
use crate::codec::Codec;
use crate::error::BuildError;
use crate::pair::{PairResult, PairTask};

/// Outcome of running every task of one level.
#[derive(Debug, Default)]
pub struct LevelReport {
    /// Results for tasks that produced or loaded an output, in no
    /// particular order — callers that need index order should sort
    /// on `PairResult::index`.
    pub results: Vec<PairResult>,
    /// `(index, reason)` for tasks skipped due to a non-fatal input
    /// error.
    pub skipped: Vec<(usize, String)>,
    /// Set once any task observed the cancel token set.
    pub cancelled: bool,
}

/// Runs the pair tasks of a single pyramid level. `on_progress` is
/// called once per task that finishes (regardless of outcome) with
/// the count of units just completed, so callers can drive a weighted
/// progress tracker. `+ Send` is required even by the sequential
/// engine, since both implementations share one signature and the
/// parallel engine must be able to call it from worker threads.
pub trait LevelEngine {
    fn run_level(
        &self,
        tasks: Vec<PairTask>,
        codec: &Codec,
        output_compression: bool,
        memory_load_ceiling: u32,
        cancel: &CancelToken,
        on_progress: &mut (dyn FnMut(usize) + Send),
    ) -> Result<LevelReport, BuildError>;
}
