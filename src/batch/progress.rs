use serde::{Deserialize, Serialize};

/// Resumable checkpoint for one database's conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionProgress {
    pub database: String,
    pub total_queries: usize,
    /// Index of the last item in the last fully persisted batch.
    #[serde(default)]
    pub last_processed_index: Option<usize>,
    #[serde(default)]
    pub successful_count: usize,
    #[serde(default)]
    pub failed_count: usize,
}

impl ConversionProgress {
    pub fn new(database: &str, total_queries: usize) -> Self {
        ConversionProgress {
            database: database.to_string(),
            total_queries,
            last_processed_index: None,
            successful_count: 0,
            failed_count: 0,
        }
    }

    /// First index not yet covered by the checkpoint.
    pub fn next_index(&self) -> usize {
        self.last_processed_index.map_or(0, |i| i + 1)
    }

    pub fn is_complete(&self) -> bool {
        self.next_index() >= self.total_queries
    }

    /// Record a persisted batch ending at `last_index`. The index never moves
    /// backwards.
    pub fn record_batch(&mut self, last_index: usize, successful: usize, failed: usize) {
        match self.last_processed_index {
            Some(current) if current >= last_index => {
                log::warn!(
                    "Ignoring checkpoint regression from {} to {}",
                    current,
                    last_index
                );
                return;
            }
            _ => {}
        }
        self.last_processed_index = Some(last_index);
        self.successful_count += successful;
        self.failed_count += failed;
    }
}
