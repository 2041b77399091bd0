//! CT slice directory scanning and multi-resolution thumbnail pyramid
//! generation.
//!
//! A plain Rust library: directory-walk, parallel-downsample, and
//! TIFF-writing, behind an ordinary function API.

pub mod cancel;
pub mod codec;
pub mod engine;
pub mod error;
pub mod options;
pub mod orchestrator;
pub mod pair;
pub mod path_guard;
pub mod planner;
pub mod progress;
pub mod scanner;
pub mod volume;

pub use cancel::CancelToken;
pub use error::{BuildError, Outcome};
pub use options::Options;
pub use orchestrator::{build, BuildReport};
pub use planner::{plan, LevelDescriptor, WorkPlan};
pub use scanner::{scan, SlicePattern};
pub use volume::{load_volume, LevelMetadata, Volume, VolumeLoader};
