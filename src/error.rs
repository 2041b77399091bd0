use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the pyramid builder, per the kinds enumerated in
/// the component design's error-handling section. `Cancelled` is
/// deliberately not a variant here — cancellation is a flow outcome,
/// not a failure, and is represented by [`crate::Outcome`].
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("directory not readable: {0}")]
    DirectoryNotReadable(PathBuf),

    #[error("no images found in {0}")]
    NoImagesFound(PathBuf),

    #[error("no supported image format found in {0}")]
    InvalidImageFormat(PathBuf),

    #[error("corrupted or unreadable image: {0}")]
    CorruptedImage(PathBuf),

    #[error("directory not writable: {0}")]
    DirectoryNotWritable(PathBuf),

    #[error("disk full while writing {0}")]
    DiskFull(PathBuf),

    #[error("failed to write {path}: {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    #[error("path escapes base directory: {0}")]
    PathEscape(PathBuf),

    #[error("forbidden character in path component: {0}")]
    ForbiddenCharacter(String),

    #[error("path is a symbolic link: {0}")]
    IsSymlink(PathBuf),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("required dependency unavailable: {0}")]
    DependencyMissing(String),

    #[error("unexpected error: {message}")]
    Unexpected { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl BuildError {
    /// A short, user-facing message distinct from the technical detail
    /// carried by `Display`/`Error`, per the propagation policy's
    /// "short actionable message + technical detail field" split.
    pub fn actionable_message(&self) -> &'static str {
        match self {
            BuildError::DirectoryNotFound(_) => "The selected directory could not be found.",
            BuildError::DirectoryNotReadable(_) => "The selected directory could not be read.",
            BuildError::NoImagesFound(_) => "No CT slice images were found in this directory.",
            BuildError::InvalidImageFormat(_) => "No supported image format was detected.",
            BuildError::CorruptedImage(_) => "An image file appears to be corrupted.",
            BuildError::DirectoryNotWritable(_) => "The output directory could not be written to.",
            BuildError::DiskFull(_) => "The disk is full.",
            BuildError::WriteFailed { .. } => "Writing a thumbnail failed.",
            BuildError::PathEscape(_) => "A path escaped the allowed directory.",
            BuildError::ForbiddenCharacter(_) => "A path contained a forbidden character.",
            BuildError::IsSymlink(_) => "Symbolic links are not allowed here.",
            BuildError::OutOfMemory(_) => "The system ran out of memory.",
            BuildError::DependencyMissing(_) => "A required runtime dependency is unavailable.",
            BuildError::Unexpected { .. } => "An unexpected error occurred.",
            BuildError::Io(_) => "An I/O error occurred.",
            BuildError::Image(_) => "An image could not be decoded or encoded.",
        }
    }
}

/// Outcome of a [`crate::build`] call: either a completed report or a
/// cancelled one. Cancellation short-circuits without being an error.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled(T),
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Outcome::Completed(v) | Outcome::Cancelled(v) => v,
        }
    }

    pub fn inner(&self) -> &T {
        match self {
            Outcome::Completed(v) | Outcome::Cancelled(v) => v,
        }
    }
}
