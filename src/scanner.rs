//! Infers the `(prefix, digits, extension)` pattern of a directory of
//! CT slices and lists them in dense sequence order.
//!
//! Scans once to vote on the majority prefix/extension, then sorts by
//! the extracted numeric value rather than filename string so gaps in
//! the sequence are detected correctly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::codec::Codec;
use crate::error::BuildError;

/// Supported input extensions, case-folded.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["bmp", "jpg", "jpeg", "png", "tif", "tiff"];

/// Immutable description of an input slice sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlicePattern {
    pub prefix: String,
    pub extension: String,
    pub digits: usize,
    pub seq_begin: u64,
    pub seq_end: u64,
    pub width: u32,
    pub height: u32,
    /// Bit depth of the first slice in the sequence, probed without
    /// a full pixel decode. A representative sample, not a guarantee
    /// that every slice in the directory shares it — `pair::average`
    /// still handles a mismatched pair at task time.
    pub bit_depth: u8,
}

impl SlicePattern {
    /// Total number of slices in the dense logical range
    /// `seq_begin..=seq_end`, including any missing intermediate
    /// numbers.
    pub fn nominal_count(&self) -> u64 {
        self.seq_end - self.seq_begin + 1
    }

    /// Reconstructs the filename for logical index `n`.
    pub fn filename(&self, n: u64) -> String {
        format!("{}{:0width$}.{}", self.prefix, n, self.extension, width = self.digits)
    }

    pub fn path(&self, directory: &Path, n: u64) -> PathBuf {
        directory.join(self.filename(n))
    }
}

struct Candidate {
    file_name: String,
    prefix: String,
    extension: String,
    number: u64,
    digits: usize,
}

fn parse_candidate(file_name: &str) -> Option<(String, u64, usize, String)> {
    // Anchored equivalent of `^(.*?)(\d+)\.([A-Za-z0-9]+)$`, matched
    // lazily on the prefix by scanning for the last run of digits
    // immediately preceding the final extension separator.
    let dot = file_name.rfind('.')?;
    let (stem, ext) = (&file_name[..dot], &file_name[dot + 1..]);
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let digit_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    if digit_start == stem.len() {
        return None;
    }
    let digits_str = &stem[digit_start..];
    if digits_str.is_empty() {
        return None;
    }
    let number: u64 = digits_str.parse().ok()?;
    let prefix = stem[..digit_start].to_string();
    Some((prefix, number, digits_str.len(), ext.to_string()))
}

/// Scans `directory` and infers its slice pattern.
pub fn scan(directory: &Path, codec: &Codec) -> Result<SlicePattern, BuildError> {
    if !directory.exists() {
        return Err(BuildError::DirectoryNotFound(directory.to_path_buf()));
    }
    if !directory.is_dir() {
        return Err(BuildError::DirectoryNotFound(directory.to_path_buf()));
    }

    let entries: Vec<_> = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();

    if entries.is_empty() {
        return Err(BuildError::NoImagesFound(directory.to_path_buf()));
    }

    let mut candidates = Vec::new();
    for entry in &entries {
        let Some(name) = entry.file_name().to_str() else { continue };
        let Some((prefix, number, digits, ext)) = parse_candidate(name) else { continue };
        let ext_lower = ext.to_lowercase();
        if !SUPPORTED_EXTENSIONS.contains(&ext_lower.as_str()) {
            continue;
        }
        candidates.push(Candidate {
            file_name: name.to_string(),
            prefix,
            extension: ext_lower,
            number,
            digits,
        });
    }

    if candidates.is_empty() {
        return Err(BuildError::NoImagesFound(directory.to_path_buf()));
    }

    let chosen_prefix = most_common(candidates.iter().map(|c| c.prefix.clone()))
        .ok_or_else(|| BuildError::NoImagesFound(directory.to_path_buf()))?;
    let chosen_extension = most_common(
        candidates
            .iter()
            .filter(|c| SUPPORTED_EXTENSIONS.contains(&c.extension.as_str()))
            .map(|c| c.extension.clone()),
    )
    .ok_or_else(|| BuildError::InvalidImageFormat(directory.to_path_buf()))?;

    let mut matching: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.prefix == chosen_prefix && c.extension == chosen_extension)
        .collect();

    if matching.is_empty() {
        return Err(BuildError::NoImagesFound(directory.to_path_buf()));
    }

    matching.sort_by_key(|c| c.number);

    let first = matching.first().unwrap();
    let last = matching.last().unwrap();
    let digits = first.digits;
    let seq_begin = first.number;
    let seq_end = last.number;

    let first_path = directory.join(&first.file_name);
    let (width, height) = codec
        .dimensions(&first_path)
        .map_err(|_| BuildError::CorruptedImage(first_path.clone()))?;
    let bit_depth = codec.detect_bit_depth(&first_path)?;

    Ok(SlicePattern {
        prefix: chosen_prefix,
        extension: chosen_extension,
        digits,
        seq_begin,
        seq_end,
        width,
        height,
        bit_depth,
    })
}

fn most_common<I: Iterator<Item = String>>(items: I) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|(a_key, a_count), (b_key, b_count)| {
            a_count.cmp(b_count).then_with(|| b_key.cmp(a_key))
        })
        .map(|(key, _)| key)
}

/// Builds the dense path list for `pattern` within `directory`,
/// skipping (and logging the count of) any missing intermediate
/// files. Mirrors `FileHandler.get_file_list`'s bounded missing-file
/// logging.
pub fn dense_file_list(directory: &Path, pattern: &SlicePattern) -> Vec<PathBuf> {
    const MAX_MISSING_LOG: usize = 10;
    let mut present = Vec::new();
    let mut missing = 0usize;
    for n in pattern.seq_begin..=pattern.seq_end {
        let path = pattern.path(directory, n);
        if path.exists() {
            present.push(path);
        } else {
            missing += 1;
            if missing <= MAX_MISSING_LOG {
                log::warn!("expected slice not found: {:?}", pattern.filename(n));
            }
        }
    }
    if missing > MAX_MISSING_LOG {
        log::warn!("... and {} more missing slices", missing - MAX_MISSING_LOG);
    }
    present
}
