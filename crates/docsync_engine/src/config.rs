//! Configuration for the reconciliation engine.

/// How the normalizer treats messages that contradict the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Contradictions are protocol violations.
    #[default]
    Strict,
    /// Contradictions are absorbed. Only valid on a downstream replica,
    /// never on the authority.
    Soft,
}

impl MergeMode {
    /// Returns the mode name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::Strict => "strict",
            MergeMode::Soft => "soft",
        }
    }

    /// Returns true for soft merging.
    pub fn is_soft(&self) -> bool {
        matches!(self, MergeMode::Soft)
    }
}

impl std::fmt::Display for MergeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the replicator and store registry.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Merge mode for stores created by the registry.
    pub mode: MergeMode,
    /// Capacity of each per-collection worker queue. Zero is treated as one.
    pub worker_queue_capacity: usize,
    /// Queue frames for collections that have no registered store yet.
    pub queue_unknown_collections: bool,
    /// Maximum number of queued frames per unknown collection.
    pub max_pending_per_collection: usize,
}

impl EngineConfig {
    /// Creates a configuration with the given merge mode.
    pub fn new(mode: MergeMode) -> Self {
        Self {
            mode,
            worker_queue_capacity: 64,
            queue_unknown_collections: true,
            max_pending_per_collection: 10_000,
        }
    }

    /// Sets the merge mode.
    pub fn with_mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the per-collection worker queue capacity.
    pub fn with_worker_queue_capacity(mut self, capacity: usize) -> Self {
        self.worker_queue_capacity = capacity.max(1);
        self
    }

    /// Enables or disables queuing for unknown collections.
    pub fn with_queue_unknown_collections(mut self, enabled: bool) -> Self {
        self.queue_unknown_collections = enabled;
        self
    }

    /// Sets the per-collection cap on queued frames.
    pub fn with_max_pending_per_collection(mut self, limit: usize) -> Self {
        self.max_pending_per_collection = limit;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(MergeMode::Strict)
    }
}
