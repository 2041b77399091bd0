//! Averages two slices and 2x downsamples the result, preserving bit
//! depth.
//!
//! Row-chunked rayon parallelism over a flat buffer. Both the pairwise
//! average and the block-average downsample use a plain truncating
//! integer mean (`⌊(A + B) / 2⌋`, biased toward zero) rather than
//! round-to-nearest.

use std::path::PathBuf;

use rayon::prelude::*;

use crate::codec::{Codec, PixelBuffer, Slice};
use crate::error::BuildError;

/// One unit of work for a level: average `source_a`/`source_b` (or
/// pass `source_a` through alone) and downsample to `output`.
#[derive(Debug, Clone)]
pub struct PairTask {
    pub index: usize,
    pub source_a: PathBuf,
    pub source_b: Option<PathBuf>,
    pub output: PathBuf,
}

/// Outcome of executing one [`PairTask`].
#[derive(Debug, Clone)]
pub struct PairResult {
    pub index: usize,
    /// Present only when the output's longer side is below the
    /// configured memory-load ceiling; otherwise the result is
    /// disk-only and downstream code must re-read it if needed.
    pub pixels: Option<Slice>,
    pub was_generated: bool,
}

/// Computes the elementwise floor-mean of two equal-shape slices.
/// Accumulates in a wider integer type to avoid overflow (u8 sums in
/// u16, u16 sums in u32). When the two slices differ in bit depth —
/// a real possibility across a CT directory with per-file depth
/// variance — the 8-bit side is widened to 16-bit (`v << 8`) before
/// averaging, and the result is 16-bit.
pub fn average(a: &Slice, b: &Slice) -> Slice {
    debug_assert_eq!(a.width, b.width);
    debug_assert_eq!(a.height, b.height);
    let pixels = match (&a.pixels, &b.pixels) {
        (PixelBuffer::U8(pa), PixelBuffer::U8(pb)) => {
            let mut out = vec![0u8; pa.len()];
            out.par_iter_mut().enumerate().for_each(|(i, d)| {
                *d = (((pa[i] as u16) + (pb[i] as u16)) / 2) as u8;
            });
            PixelBuffer::U8(out)
        }
        (PixelBuffer::U16(pa), PixelBuffer::U16(pb)) => {
            let mut out = vec![0u16; pa.len()];
            out.par_iter_mut().enumerate().for_each(|(i, d)| {
                *d = (((pa[i] as u32) + (pb[i] as u32)) / 2) as u16;
            });
            PixelBuffer::U16(out)
        }
        (PixelBuffer::U8(pa), PixelBuffer::U16(pb)) => {
            let mut out = vec![0u16; pb.len()];
            out.par_iter_mut().enumerate().for_each(|(i, d)| {
                let widened_a = (pa[i] as u32) << 8;
                *d = ((widened_a + pb[i] as u32) / 2) as u16;
            });
            PixelBuffer::U16(out)
        }
        (PixelBuffer::U16(pa), PixelBuffer::U8(pb)) => {
            let mut out = vec![0u16; pa.len()];
            out.par_iter_mut().enumerate().for_each(|(i, d)| {
                let widened_b = (pb[i] as u32) << 8;
                *d = ((pa[i] as u32 + widened_b) / 2) as u16;
            });
            PixelBuffer::U16(out)
        }
    };
    Slice::new(a.width, a.height, pixels)
}

/// 2x downsamples `slice` by non-overlapping 2x2 block averaging
/// (floor mean). A trailing odd row or column is dropped.
pub fn downsample_half(slice: &Slice) -> Slice {
    let sw = slice.width as usize;
    let sh = slice.height as usize;
    let dw = sw / 2;
    let dh = sh / 2;

    let pixels = match &slice.pixels {
        PixelBuffer::U8(src) => {
            let mut out = vec![0u8; dw * dh];
            out.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
                let sy0 = y * 2;
                let sy1 = sy0 + 1;
                let base0 = sy0 * sw;
                let base1 = sy1 * sw;
                for (x, dst) in row.iter_mut().enumerate() {
                    let sx0 = x * 2;
                    let sx1 = sx0 + 1;
                    let sum = src[base0 + sx0] as u32
                        + src[base0 + sx1] as u32
                        + src[base1 + sx0] as u32
                        + src[base1 + sx1] as u32;
                    *dst = (sum / 4) as u8;
                }
            });
            PixelBuffer::U8(out)
        }
        PixelBuffer::U16(src) => {
            let mut out = vec![0u16; dw * dh];
            out.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
                let sy0 = y * 2;
                let sy1 = sy0 + 1;
                let base0 = sy0 * sw;
                let base1 = sy1 * sw;
                for (x, dst) in row.iter_mut().enumerate() {
                    let sx0 = x * 2;
                    let sx1 = sx0 + 1;
                    let sum = src[base0 + sx0] as u32
                        + src[base0 + sx1] as u32
                        + src[base1 + sx0] as u32
                        + src[base1 + sx1] as u32;
                    *dst = (sum / 4) as u16;
                }
            });
            PixelBuffer::U16(out)
        }
    };

    Slice::new(dw as u32, dh as u32, pixels)
}

/// Full pair-processing pipeline: average (when both inputs are
/// present) then downsample. `source_b` absent means the last odd
/// slice of a level, whose "average" is itself.
pub fn process_pair(a: &Slice, b: Option<&Slice>) -> Slice {
    let averaged = match b {
        Some(b) => average(a, b),
        None => a.clone(),
    };
    downsample_half(&averaged)
}

/// What happened when a [`PairTask`] was executed.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Produced a new output (or an existing one was loaded back).
    Done(PairResult),
    /// A task-level input error (missing or corrupted source). The
    /// level is still considered complete as long as every submitted
    /// task ends up `Done` or `Skipped` — this is not fatal to the
    /// run.
    Skipped { index: usize, reason: String },
    /// The cancel token was observed set at a checkpoint. No output
    /// was written for this task.
    Cancelled { index: usize },
}

/// Executes one task end to end: load-or-generate, downsample, write.
/// `memory_load_ceiling` controls whether the produced pixels are
/// retained in the result (below threshold) or dropped (disk-only).
///
/// Checks `cancel` at three points (pre-read, pre-compute, pre-write),
/// per the cooperative-cancellation checkpoints. Returns `Err` only
/// for output-side failures, which the engine treats as fatal to the
/// whole run; input-side failures are reported as `Ok(Skipped)`.
pub fn execute_pair_task(
    task: &PairTask,
    codec: &Codec,
    output_compression: bool,
    memory_load_ceiling: u32,
    cancel: &crate::cancel::CancelToken,
) -> Result<TaskOutcome, BuildError> {
    if cancel.is_cancelled() {
        return Ok(TaskOutcome::Cancelled { index: task.index });
    }

    if task.output.exists() {
        return match codec.read(&task.output) {
            Ok(existing) => {
                let keep = std::cmp::max(existing.width, existing.height) < memory_load_ceiling;
                Ok(TaskOutcome::Done(PairResult {
                    index: task.index,
                    pixels: if keep { Some(existing) } else { None },
                    was_generated: false,
                }))
            }
            Err(e) => Ok(TaskOutcome::Skipped {
                index: task.index,
                reason: e.to_string(),
            }),
        };
    }

    let slice_a = match codec.read(&task.source_a) {
        Ok(s) => s,
        Err(e) => {
            return Ok(TaskOutcome::Skipped {
                index: task.index,
                reason: e.to_string(),
            })
        }
    };
    let slice_b = match &task.source_b {
        Some(path) => match codec.read(path) {
            Ok(s) => Some(s),
            Err(e) => {
                return Ok(TaskOutcome::Skipped {
                    index: task.index,
                    reason: e.to_string(),
                })
            }
        },
        None => None,
    };

    if cancel.is_cancelled() {
        return Ok(TaskOutcome::Cancelled { index: task.index });
    }

    let produced = process_pair(&slice_a, slice_b.as_ref());

    if cancel.is_cancelled() {
        return Ok(TaskOutcome::Cancelled { index: task.index });
    }

    let temp_output = temp_path_for(&task.output);
    codec.write(&produced, &temp_output, output_compression)?;

    if cancel.is_cancelled() {
        let _ = std::fs::remove_file(&temp_output);
        return Ok(TaskOutcome::Cancelled { index: task.index });
    }

    std::fs::rename(&temp_output, &task.output).map_err(|e| BuildError::WriteFailed {
        path: task.output.clone(),
        detail: e.to_string(),
    })?;

    let keep = std::cmp::max(produced.width, produced.height) < memory_load_ceiling;
    Ok(TaskOutcome::Done(PairResult {
        index: task.index,
        pixels: if keep { Some(produced) } else { None },
        was_generated: true,
    }))
}

fn temp_path_for(output: &std::path::Path) -> std::path::PathBuf {
    let mut temp = output.as_os_str().to_owned();
    temp.push(".tmp");
    std::path::PathBuf::from(temp)
}
