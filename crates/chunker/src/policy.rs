use vox_stt_interface::ChunkStrategy;

/// Numeric knobs for chunking. Defaults mirror the worker's environment
/// defaults; jobs carry only the strategy, everything else is deployment
/// configuration.
#[derive(Debug, Clone)]
pub struct ChunkPolicy {
    pub strategy: ChunkStrategy,
    /// Window length for fixed-duration chunking and the fallback.
    pub chunk_duration_s: f64,
    /// dBFS level below which a frame counts as silent.
    pub silence_thresh_db: f64,
    /// Shortest run of silence that splits two speech regions.
    pub min_silence_s: f64,
    /// Chunks shorter than this are dropped.
    pub min_chunk_s: f64,
    /// Chunks longer than this are split into contiguous sub-chunks.
    pub max_chunk_s: f64,
    /// Drop or clip speech that falls into the intro/outro zones.
    pub filter_intro_outro: bool,
    pub intro_s: f64,
    pub outro_s: f64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            strategy: ChunkStrategy::SilenceBased,
            chunk_duration_s: 30.0,
            silence_thresh_db: -40.0,
            min_silence_s: 1.0,
            min_chunk_s: 2.0,
            max_chunk_s: 60.0,
            filter_intro_outro: true,
            intro_s: 5.0,
            outro_s: 5.0,
        }
    }
}

impl ChunkPolicy {
    pub fn with_strategy(mut self, strategy: ChunkStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}
