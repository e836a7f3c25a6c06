//! Per-database output directory: success/failure streams, checkpoint,
//! status record and the converted schema.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::ConversionError;
use super::progress::ConversionProgress;
use super::status::StatusRecord;
use crate::validation::ConvertedQuery;

pub const QUERIES_FILE: &str = "queries.csv";
pub const FAILED_FILE: &str = "failed.csv";
pub const FAILED_RETRIES_FILE: &str = "failed_retries.csv";
pub const PROGRESS_FILE: &str = "conversion_progress.json";
pub const STATUS_FILE: &str = "status.json";
pub const SCHEMA_FILE: &str = "schema.tql";
pub const NEO4J_SCHEMA_FILE: &str = "neo4j_schema.json";

#[derive(Debug, Serialize, Deserialize)]
struct SuccessRow {
    index: usize,
    question: String,
    cypher: String,
    typeql: String,
    attempts: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct FailureRow {
    index: usize,
    question: String,
    cypher: String,
    typeql: String,
    attempts: usize,
    error_message: String,
}

impl From<&ConvertedQuery> for SuccessRow {
    fn from(q: &ConvertedQuery) -> Self {
        SuccessRow {
            index: q.index,
            question: q.question.clone(),
            cypher: q.source_query.clone(),
            typeql: q.target_query.clone(),
            attempts: q.attempts,
        }
    }
}

impl From<&ConvertedQuery> for FailureRow {
    fn from(q: &ConvertedQuery) -> Self {
        FailureRow {
            index: q.index,
            question: q.question.clone(),
            cypher: q.source_query.clone(),
            typeql: q.target_query.clone(),
            attempts: q.attempts,
            error_message: q.error_message.clone().unwrap_or_default(),
        }
    }
}

impl From<FailureRow> for ConvertedQuery {
    fn from(row: FailureRow) -> Self {
        ConvertedQuery {
            index: row.index,
            question: row.question,
            source_query: row.cypher,
            target_query: row.typeql,
            success: false,
            error_message: Some(row.error_message),
            attempts: row.attempts,
        }
    }
}

/// Which failure stream a retry round reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSource {
    Failed,
    FailedRetries,
}

pub struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub fn new(dataset_dir: impl AsRef<Path>, database: &str) -> Self {
        OutputStore {
            dir: dataset_dir.as_ref().join(database),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn failure_path(&self, source: FailureSource) -> PathBuf {
        match source {
            FailureSource::Failed => self.path(FAILED_FILE),
            FailureSource::FailedRetries => self.path(FAILED_RETRIES_FILE),
        }
    }

    pub fn ensure_dir(&self) -> Result<(), ConversionError> {
        fs::create_dir_all(&self.dir).map_err(|e| ConversionError::io(&self.dir, e))
    }

    fn append_rows<R: Serialize>(&self, path: &Path, rows: &[R]) -> Result<(), ConversionError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.ensure_dir()?;
        let exists = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ConversionError::io(path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(!exists)
            .from_writer(file);
        for row in rows {
            writer.serialize(row).map_err(|e| ConversionError::csv(path, e))?;
        }
        writer.flush().map_err(|e| ConversionError::io(path, e))
    }

    fn read_rows<R: DeserializeOwned>(&self, path: &Path) -> Result<Vec<R>, ConversionError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(path).map_err(|e| ConversionError::csv(path, e))?;
        reader
            .deserialize()
            .collect::<Result<Vec<R>, _>>()
            .map_err(|e| ConversionError::csv(path, e))
    }

    pub fn append_successes(&self, queries: &[ConvertedQuery]) -> Result<(), ConversionError> {
        let rows: Vec<SuccessRow> = queries.iter().map(SuccessRow::from).collect();
        self.append_rows(&self.path(QUERIES_FILE), &rows)
    }

    pub fn append_failures(&self, source: FailureSource, queries: &[ConvertedQuery]) -> Result<(), ConversionError> {
        let rows: Vec<FailureRow> = queries.iter().map(FailureRow::from).collect();
        self.append_rows(&self.failure_path(source), &rows)
    }

    /// Replace a failure stream's contents; an empty list removes the file.
    pub fn rewrite_failures(&self, source: FailureSource, queries: &[ConvertedQuery]) -> Result<(), ConversionError> {
        self.remove(&self.failure_path(source))?;
        self.append_failures(source, queries)
    }

    pub fn read_failures(&self, source: FailureSource) -> Result<Vec<ConvertedQuery>, ConversionError> {
        let rows: Vec<FailureRow> = self.read_rows(&self.failure_path(source))?;
        Ok(rows.into_iter().map(ConvertedQuery::from).collect())
    }

    /// Number of data rows in a stream; zero when the file is absent.
    pub fn count_rows(&self, file: &str) -> Result<usize, ConversionError> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(0);
        }
        let mut reader = csv::Reader::from_path(&path).map_err(|e| ConversionError::csv(&path, e))?;
        let mut count = 0;
        for record in reader.records() {
            record.map_err(|e| ConversionError::csv(&path, e))?;
            count += 1;
        }
        Ok(count)
    }

    pub fn remove(&self, path: &Path) -> Result<(), ConversionError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConversionError::io(path, e)),
        }
    }

    fn drop_rows_from<R>(&self, file: &str, next_index: usize, index_of: fn(&R) -> usize) -> Result<usize, ConversionError>
    where
        R: Serialize + DeserializeOwned,
    {
        let path = self.path(file);
        let rows: Vec<R> = self.read_rows(&path)?;
        let total = rows.len();
        let kept: Vec<R> = rows.into_iter().filter(|r| index_of(r) < next_index).collect();
        let dropped = total - kept.len();
        if dropped > 0 {
            self.remove(&path)?;
            self.append_rows(&path, &kept)?;
        }
        Ok(dropped)
    }

    /// Remove rows at or past the checkpoint from the batch streams. They come
    /// from a batch whose checkpoint was never written and will be redone.
    pub fn discard_unrecorded(&self, next_index: usize) -> Result<usize, ConversionError> {
        let successes = self.drop_rows_from::<SuccessRow>(QUERIES_FILE, next_index, |r| r.index)?;
        let failures = self.drop_rows_from::<FailureRow>(FAILED_FILE, next_index, |r| r.index)?;
        Ok(successes + failures)
    }

    /// Drop the success stream, both failure streams and the checkpoint before a
    /// fresh run.
    pub fn reset_streams(&self) -> Result<(), ConversionError> {
        for file in [QUERIES_FILE, FAILED_FILE, FAILED_RETRIES_FILE, PROGRESS_FILE] {
            self.remove(&self.path(file))?;
        }
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<Option<T>, ConversionError> {
        let path = self.path(file);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConversionError::io(&path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ConversionError::json(&path, e))
    }

    /// Write through a temporary file and rename, so a crash never leaves a
    /// truncated record behind.
    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), ConversionError> {
        self.ensure_dir()?;
        let path = self.path(file);
        let tmp = self.path(&format!(".{}.tmp", file));
        let text = serde_json::to_string_pretty(value).map_err(|e| ConversionError::json(&path, e))?;
        fs::write(&tmp, text).map_err(|e| ConversionError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| ConversionError::io(&path, e))
    }

    pub fn load_progress(&self) -> Result<Option<ConversionProgress>, ConversionError> {
        self.read_json(PROGRESS_FILE)
    }

    pub fn save_progress(&self, progress: &ConversionProgress) -> Result<(), ConversionError> {
        self.write_json(PROGRESS_FILE, progress)
    }

    pub fn load_status(&self) -> Result<Option<StatusRecord>, ConversionError> {
        self.read_json(STATUS_FILE)
    }

    pub fn save_status(&self, status: &StatusRecord) -> Result<(), ConversionError> {
        self.write_json(STATUS_FILE, status)
    }

    pub fn read_schema(&self) -> Result<Option<String>, ConversionError> {
        let path = self.path(SCHEMA_FILE);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConversionError::io(&path, e)),
        }
    }

    pub fn write_schema(&self, schema: &str, neo4j_schema_json: &str) -> Result<(), ConversionError> {
        self.ensure_dir()?;
        for (file, text) in [(SCHEMA_FILE, schema), (NEO4J_SCHEMA_FILE, neo4j_schema_json)] {
            let path = self.path(file);
            fs::write(&path, text).map_err(|e| ConversionError::io(&path, e))?;
        }
        Ok(())
    }
}
