//! Publisher configuration.

/// Configuration for publishing live queries.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Wrap the initial `added` notifications of a publication in
    /// `begin_snapshot` / `end_snapshot` so batching subscribers can
    /// deliver them as one batch.
    pub batch_initial_snapshot: bool,
}

impl PublisherConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            batch_initial_snapshot: true,
        }
    }

    /// Enables or disables snapshot batching.
    pub fn with_batch_initial_snapshot(mut self, enabled: bool) -> Self {
        self.batch_initial_snapshot = enabled;
        self
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publisher_config_builder() {
        assert!(PublisherConfig::default().batch_initial_snapshot);
        let config = PublisherConfig::new().with_batch_initial_snapshot(false);
        assert!(!config.batch_initial_snapshot);
    }
}
