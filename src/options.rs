/// Configuration recognized by the pyramid builder, per the external
/// interfaces section's enumerated option list.
#[derive(Debug, Clone)]
pub struct Options {
    /// Level-stop threshold on the longer side.
    pub max_thumbnail_size: u32,

    /// Smallest side below which produced slices are also returned
    /// in memory by the engine (kept in the `PairResult`) rather than
    /// being disk-only.
    pub memory_load_ceiling: u32,

    /// Selects the parallel worker-pool engine vs the single-threaded
    /// fallback.
    pub use_parallel: bool,

    /// Worker count for the parallel engine. Ignored when
    /// `use_parallel` is false. `None` means `min(available_cores, 8)`.
    pub worker_count: Option<usize>,

    /// Base stage size for the three-stage ETA sampler. `None` means
    /// the auto formula `clamp(ceil(0.02 * level1_count), 20, 30)`.
    pub sample_size: Option<usize>,

    /// TIFF compression toggle: deflate when true, none when false.
    pub output_compression: bool,

    /// Path Guard relaxation: follow symlinks instead of rejecting
    /// them.
    pub follow_symlinks: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_thumbnail_size: 512,
            memory_load_ceiling: 512,
            use_parallel: true,
            worker_count: None,
            sample_size: None,
            output_compression: true,
            follow_symlinks: false,
        }
    }
}

impl Options {
    /// Resolved worker count for the parallel engine.
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or_else(|| std::cmp::min(num_available_cores(), 8))
    }
}

fn num_available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
