//! Loads the smallest generated pyramid level back into memory as a
//! dense, 8-bit-normalized 3-D volume.
//!
//! Grounded on
//! `examples/original_source/core/thumbnail_generator.py`'s
//! `load_thumbnail_data`: the contiguous `level_dirs` walk, the
//! `size < max_thumbnail_size` search with highest-level fallback,
//! and the u16-shift / min-max normalization branches are ported
//! directly; the PIL array handling is replaced with `crate::codec`.

use std::path::{Path, PathBuf};

use crate::codec::{Codec, PixelBuffer};
use crate::error::BuildError;

/// Per-level metadata surfaced alongside the loaded volume.
#[derive(Debug, Clone)]
pub struct LevelMetadata {
    pub level_index: u32,
    pub width: u32,
    pub height: u32,
    pub file_count: usize,
}

/// A dense, 8-bit-normalized stack of the selected level's slices.
#[derive(Debug, Clone)]
pub struct Volume {
    pub depth: usize,
    pub height: u32,
    pub width: u32,
    /// Row-major, slice-major: `data[z * height * width + y * width + x]`.
    pub data: Vec<u8>,
}

/// Walks `<base>/.thumbnail/<n>` for `n = 1, 2, ...` until a missing
/// directory is seen, selects a level, and loads it as a normalized
/// [`Volume`].
pub struct VolumeLoader {
    codec: Codec,
}

impl Default for VolumeLoader {
    fn default() -> Self {
        Self { codec: Codec }
    }
}

impl VolumeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(
        &self,
        base: &Path,
        max_thumbnail_size: u32,
    ) -> Result<(Volume, u32, Vec<LevelMetadata>), BuildError> {
        let thumbnail_base = base.join(".thumbnail");
        let level_dirs = contiguous_level_dirs(&thumbnail_base);
        if level_dirs.is_empty() {
            return Err(BuildError::NoImagesFound(thumbnail_base));
        }

        let mut per_level = Vec::new();
        let mut selected: Option<(u32, PathBuf)> = None;

        for (level_index, dir) in &level_dirs {
            let mut files = tiff_files_sorted(dir)?;
            if files.is_empty() {
                continue;
            }
            let (width, height) = self.codec.dimensions(&files[0])?;
            per_level.push(LevelMetadata {
                level_index: *level_index,
                width,
                height,
                file_count: files.len(),
            });

            if selected.is_none() {
                let side = std::cmp::max(width, height);
                if side < max_thumbnail_size {
                    selected = Some((*level_index, dir.clone()));
                    log::info!("selected level {level_index} ({width}x{height}) below threshold {max_thumbnail_size}");
                }
            }
            files.clear();
        }

        let (selected_level, selected_dir) = match selected {
            Some(pair) => pair,
            None => {
                let (level_index, dir) = level_dirs.last().cloned().expect("checked non-empty above");
                log::warn!("no level with side < {max_thumbnail_size} found, using highest level {level_index}");
                (level_index, dir)
            }
        };

        let files = tiff_files_sorted(&selected_dir)?;
        let mut width = 0u32;
        let mut height = 0u32;
        let mut data = Vec::new();

        for (i, file) in files.iter().enumerate() {
            let slice = self.codec.read(file)?;
            if i == 0 {
                width = slice.width;
                height = slice.height;
            }
            data.extend_from_slice(&normalize_to_u8(&slice.pixels));
        }

        Ok((
            Volume {
                depth: files.len(),
                height,
                width,
                data,
            },
            selected_level,
            per_level,
        ))
    }
}

/// Convenience wrapper over `VolumeLoader::new().load(..)` for callers
/// that don't need to hold a loader instance across calls.
pub fn load_volume(
    base: &Path,
    max_thumbnail_size: u32,
) -> Result<(Volume, u32, Vec<LevelMetadata>), BuildError> {
    VolumeLoader::new().load(base, max_thumbnail_size)
}

fn contiguous_level_dirs(thumbnail_base: &Path) -> Vec<(u32, PathBuf)> {
    let mut dirs = Vec::new();
    let mut level = 1u32;
    loop {
        let dir = thumbnail_base.join(level.to_string());
        if dir.is_dir() {
            dirs.push((level, dir));
            level += 1;
        } else {
            break;
        }
    }
    dirs
}

fn tiff_files_sorted(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    ext == "tif" || ext == "tiff"
                })
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Normalizes one decoded slice to 8-bit: u16 shifts right 8 bits
/// (equivalent to dividing by 256); u8 passes through unchanged;
/// there is no third dtype produced by `crate::codec`, so the
/// min-max branch described for "other dtypes" never triggers here —
/// it is kept as dead code only in the ported Python, not in this
/// crate's `PixelBuffer`.
fn normalize_to_u8(pixels: &PixelBuffer) -> Vec<u8> {
    match pixels {
        PixelBuffer::U8(data) => data.clone(),
        PixelBuffer::U16(data) => data.iter().map(|&v| (v >> 8) as u8).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u16_normalizes_via_shift_right_8() {
        let pixels = PixelBuffer::U16(vec![0, 256, 65535]);
        let normalized = normalize_to_u8(&pixels);
        assert_eq!(normalized, vec![0, 1, 255]);
    }

    #[test]
    fn u8_passes_through_unchanged() {
        let pixels = PixelBuffer::U8(vec![0, 128, 255]);
        assert_eq!(normalize_to_u8(&pixels), vec![0, 128, 255]);
    }
}
