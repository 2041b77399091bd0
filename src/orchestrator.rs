//! Drives the full build: scans the input directory, plans levels,
//! and runs each level's pair tasks through the selected engine
//! before handing off to the volume loader.
//!
//! Resumes by checking for an already-existing output file per task
//! rather than re-deriving it, and accounts for missing source slices
//! so a gap in the input sequence never aborts the whole level.

use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::codec::Codec;
use crate::engine::{parallel::ParallelEngine, sequential::SequentialEngine, LevelEngine, LevelReport};
use crate::error::{BuildError, Outcome};
use crate::options::Options;
use crate::pair::PairTask;
use crate::path_guard::PathGuard;
use crate::planner::{self, LevelDescriptor};
use crate::progress::ProgressTracker;
use crate::scanner::{self, SlicePattern};
use crate::volume::{LevelMetadata, Volume, VolumeLoader};

/// Output extension used for every generated pyramid level,
/// regardless of the input sequence's extension.
const LEVEL_EXTENSION: &str = "tif";

/// Everything produced by a (possibly partial) build.
#[derive(Debug)]
pub struct BuildReport {
    pub pattern: SlicePattern,
    pub levels: Vec<LevelDescriptor>,
    pub volume: Option<Volume>,
    pub selected_level: Option<u32>,
    pub level_metadata: Vec<LevelMetadata>,
}

/// Runs the complete pipeline over `base`, writing pyramid levels
/// under `<base>/.thumbnail/` and returning the loaded smallest
/// level. Returns `Outcome::Cancelled` with whatever was completed so
/// far if `cancel` is observed set partway through.
///
/// `progress_sink` is called after every completed (non-cancelled)
/// task with `(weighted_done, weighted_total, eta_text)`, so a caller
/// can drive a progress bar without reaching into the tracker itself.
pub fn build(
    base: &Path,
    options: &Options,
    progress_sink: &mut (dyn FnMut(f64, f64, &str) + Send),
    cancel: &CancelToken,
) -> Result<Outcome<BuildReport>, BuildError> {
    let codec = Codec;
    let guard = PathGuard::new(base, options.follow_symlinks);

    let pattern = scanner::scan(base, &codec)?;
    log::info!("detected {}-bit depth from the first slice", pattern.bit_depth);
    let plan = planner::plan(pattern.nominal_count(), pattern.width, pattern.height, options.max_thumbnail_size);

    let level1_count = plan
        .level(1)
        .map(|l| l.count)
        .unwrap_or_else(|| pattern.nominal_count());
    let tracker = ProgressTracker::new(plan.weighted_total_work, level1_count, options.sample_size);

    let engine: Box<dyn LevelEngine> = if options.use_parallel {
        Box::new(ParallelEngine::new(options.resolved_worker_count()))
    } else {
        Box::new(SequentialEngine)
    };

    let thumbnail_base = base.join(".thumbnail");

    for descriptor in &plan.levels {
        let dest_dir = thumbnail_base.join(descriptor.level_index.to_string());
        std::fs::create_dir_all(&dest_dir).map_err(|_| BuildError::DirectoryNotWritable(dest_dir.clone()))?;

        let tasks = if descriptor.level_index == 1 {
            // Triggers the Scanner's bounded missing-file logging;
            // `build_level1_tasks` below does its own presence checks
            // to decide pairing, independently of this list.
            let _ = scanner::dense_file_list(base, &pattern);
            build_level1_tasks(&pattern, base, &dest_dir, &guard)?
        } else {
            let previous_dir = thumbnail_base.join((descriptor.level_index - 1).to_string());
            let source_files = dense_tiff_files(&previous_dir)?;
            build_pair_tasks(&source_files, &dest_dir, &guard)?
        };
        let weight = descriptor.weight;
        let level_index = descriptor.level_index;

        log::info!(
            "level {level_index}: {} tasks ({}x{})",
            tasks.len(),
            descriptor.width,
            descriptor.height
        );

        let mut on_progress = |n: usize| {
            tracker.record_completion(level_index, weight * n as f64);
            progress_sink(tracker.done_weighted(), tracker.total_weighted(), &tracker.eta_text());
        };
        let report: LevelReport = engine.run_level(
            tasks,
            &codec,
            options.output_compression,
            options.memory_load_ceiling,
            cancel,
            &mut on_progress,
        )?;

        if level_index == 1 {
            tracker.finish_level1_early();
        }

        if !report.skipped.is_empty() {
            log_skipped_summary(level_index, &report.skipped);
        }

        if report.cancelled || cancel.is_cancelled() {
            log::warn!("build cancelled during level {level_index}");
            return Ok(Outcome::Cancelled(BuildReport {
                pattern,
                levels: plan.levels,
                volume: None,
                selected_level: None,
                level_metadata: Vec::new(),
            }));
        }
    }

    let (volume, selected_level, level_metadata) = VolumeLoader::new().load(base, options.max_thumbnail_size)?;
    log::info!("volume loaded from level {selected_level}: {}x{}x{}", volume.depth, volume.height, volume.width);

    Ok(Outcome::Completed(BuildReport {
        pattern,
        levels: plan.levels,
        volume: Some(volume),
        selected_level: Some(selected_level),
        level_metadata,
    }))
}

/// Builds level 1's pair tasks directly from the slice pattern's
/// nominal (possibly gappy) sequence, so a missing intermediate input
/// pairs with its surviving neighbor instead of silently shifting
/// every later pair's source by one position.
fn build_level1_tasks(
    pattern: &SlicePattern,
    base: &Path,
    dest_dir: &Path,
    guard: &PathGuard,
) -> Result<Vec<PairTask>, BuildError> {
    let mut tasks = Vec::new();
    let mut output_index = 0usize;
    let mut n = pattern.seq_begin;

    while n <= pattern.seq_end {
        let a_path = pattern.path(base, n);
        let a_exists = a_path.exists();
        let b_n = n + 1;
        let b_path = if b_n <= pattern.seq_end { Some(pattern.path(base, b_n)) } else { None };
        let b_exists = b_path.as_ref().map(|p| p.exists()).unwrap_or(false);

        let (source_a, source_b) = match (a_exists, b_exists) {
            (true, true) => (a_path, b_path),
            (true, false) => (a_path, None),
            (false, true) => (b_path.expect("checked above"), None),
            (false, false) => {
                n += 2;
                continue;
            }
        };

        let output = guard.validate(&dest_dir.join(format!("{:06}.{}", output_index, LEVEL_EXTENSION)))?;
        tasks.push(PairTask {
            index: output_index,
            source_a,
            source_b,
            output,
        });
        output_index += 1;
        n += 2;
    }

    Ok(tasks)
}

fn build_pair_tasks(
    source_files: &[PathBuf],
    dest_dir: &Path,
    guard: &PathGuard,
) -> Result<Vec<PairTask>, BuildError> {
    let pair_count = source_files.len().div_ceil(2);
    let mut tasks = Vec::with_capacity(pair_count);
    for i in 0..pair_count {
        let source_a = source_files[2 * i].clone();
        let source_b = source_files.get(2 * i + 1).cloned();
        let output = guard.validate(&dest_dir.join(format!("{:06}.{}", i, LEVEL_EXTENSION)))?;
        tasks.push(PairTask {
            index: i,
            source_a,
            source_b,
            output,
        });
    }
    Ok(tasks)
}

fn dense_tiff_files(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    if !dir.is_dir() {
        return Err(BuildError::DirectoryNotFound(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.to_string_lossy().to_lowercase() == LEVEL_EXTENSION)
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

const MAX_SKIPPED_LOG: usize = 10;

fn log_skipped_summary(level_index: u32, skipped: &[(usize, String)]) {
    for (index, reason) in skipped.iter().take(MAX_SKIPPED_LOG) {
        log::warn!("level {level_index} task {index} skipped: {reason}");
    }
    if skipped.len() > MAX_SKIPPED_LOG {
        log::warn!("level {level_index}: ... and {} more skipped tasks", skipped.len() - MAX_SKIPPED_LOG);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PixelBuffer, Slice};

    fn write_constant_tiff(path: &Path, width: u32, height: u32, value: u8) {
        let codec = Codec;
        let slice = Slice::new(width, height, PixelBuffer::U8(vec![value; (width * height) as usize]));
        codec.write(&slice, path, false).unwrap();
    }

    #[test]
    fn builds_one_level_for_small_even_input() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            let path = dir.path().join(format!("slice_{:04}.tif", i));
            write_constant_tiff(&path, 256, 256, 100);
        }

        let options = Options::default();
        let cancel = CancelToken::new();
        let outcome = build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();
        assert!(!outcome.is_cancelled());

        let report = outcome.into_inner();
        assert_eq!(report.levels.len(), 1);

        let level1_dir = dir.path().join(".thumbnail").join("1");
        let files = dense_tiff_files(&level1_dir).unwrap();
        assert_eq!(files.len(), 5);

        let volume = report.volume.unwrap();
        assert_eq!((volume.depth, volume.height, volume.width), (5, 128, 128));
        assert!(volume.data.iter().all(|&p| p == 100));
    }

    #[test]
    fn missing_middle_slice_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            if i == 5 {
                continue;
            }
            let path = dir.path().join(format!("slice_{:04}.tif", i));
            write_constant_tiff(&path, 256, 256, 100);
        }

        let options = Options::default();
        let cancel = CancelToken::new();
        let outcome = build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();
        let report = outcome.into_inner();

        let level1_dir = dir.path().join(".thumbnail").join("1");
        let files = dense_tiff_files(&level1_dir).unwrap();
        assert_eq!(files.len(), 5);
        assert!(report.volume.is_some());
    }

    #[test]
    fn rerun_is_idempotent_and_writes_no_new_bytes() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..10 {
            let path = dir.path().join(format!("slice_{:04}.tif", i));
            write_constant_tiff(&path, 256, 256, 100);
        }

        let options = Options::default();
        let cancel = CancelToken::new();
        build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();

        let level1_dir = dir.path().join(".thumbnail").join("1");
        let before: Vec<_> = dense_tiff_files(&level1_dir)
            .unwrap()
            .iter()
            .map(|p| std::fs::read(p).unwrap())
            .collect();

        build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();

        let after: Vec<_> = dense_tiff_files(&level1_dir)
            .unwrap()
            .iter()
            .map(|p| std::fs::read(p).unwrap())
            .collect();

        assert_eq!(before, after);
    }
}
