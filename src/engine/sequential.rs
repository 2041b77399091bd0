//! Single-threaded engine with the same contract as
//! [`super::parallel::ParallelEngine`] — used as the deterministic
//! fallback (`Options::use_parallel = false`) and as the test oracle
//! that parallel output is compared against, per the two-engines
//! one-trait split.

use crate::cancel::CancelToken;
use crate::codec::Codec;
use crate::error::BuildError;
use crate::pair::{execute_pair_task, PairTask, TaskOutcome};

use super::{LevelEngine, LevelReport};

pub struct SequentialEngine;

impl LevelEngine for SequentialEngine {
    fn run_level(
        &self,
        tasks: Vec<PairTask>,
        codec: &Codec,
        output_compression: bool,
        memory_load_ceiling: u32,
        cancel: &CancelToken,
        on_progress: &mut (dyn FnMut(usize) + Send),
    ) -> Result<LevelReport, BuildError> {
        let mut report = LevelReport::default();

        for task in tasks {
            let outcome = execute_pair_task(&task, codec, output_compression, memory_load_ceiling, cancel)?;
            match outcome {
                TaskOutcome::Done(result) => report.results.push(result),
                TaskOutcome::Skipped { index, reason } => {
                    log::warn!("pair task {index} skipped: {reason}");
                    report.skipped.push((index, reason));
                }
                TaskOutcome::Cancelled { index } => {
                    log::debug!("pair task {index} cancelled");
                    report.cancelled = true;
                    break;
                }
            }
            on_progress(1);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PixelBuffer, Slice};

    fn write_u8_tiff(path: &std::path::Path, width: u32, height: u32, value: u8) {
        let codec = Codec;
        let slice = Slice::new(width, height, PixelBuffer::U8(vec![value; (width * height) as usize]));
        codec.write(&slice, path, false).unwrap();
    }

    #[test]
    fn runs_tasks_in_order_and_reports_generated() {
        let dir = tempfile_dir();
        let a = dir.path().join("a.tif");
        let b = dir.path().join("b.tif");
        let out = dir.path().join("out.tif");
        write_u8_tiff(&a, 4, 4, 10);
        write_u8_tiff(&b, 4, 4, 20);

        let engine = SequentialEngine;
        let codec = Codec;
        let cancel = CancelToken::new();
        let mut progressed = 0usize;
        let report = engine
            .run_level(
                vec![PairTask {
                    index: 0,
                    source_a: a,
                    source_b: Some(b),
                    output: out,
                }],
                &codec,
                false,
                512,
                &cancel,
                &mut |n| progressed += n,
            )
            .unwrap();

        assert_eq!(progressed, 1);
        assert_eq!(report.results.len(), 1);
        assert!(report.results[0].was_generated);
    }

    fn tempfile_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }
}
