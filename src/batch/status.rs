use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCounts {
    pub total_converted: usize,
    pub successful: usize,
    pub failed: usize,
}

/// `status.json`: schema approval plus the latest conversion counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub database: String,
    #[serde(default)]
    pub approved: bool,
    /// Whether schema conversion produced a schema the engine accepted.
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub attempts: usize,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries: Option<QueryCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn new(database: &str) -> Self {
        StatusRecord {
            database: database.to_string(),
            ..Default::default()
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    pub fn set_query_counts(&mut self, successful: usize, failed: usize) {
        self.queries = Some(QueryCounts {
            total_converted: successful + failed,
            successful,
            failed,
        });
        self.touch();
    }
}
