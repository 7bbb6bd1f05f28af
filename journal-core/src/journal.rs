//! Mood journal persistence.
//!
//! The journal is a single JSON document holding an array of entries in
//! write order. Appends load the document, push the new record and rewrite
//! the file through a temporary sibling, so existing records are carried
//! over byte-for-byte in meaning and never edited.
//!
//! Older journals were written one JSON object per line. Those files are
//! detected on load and must be converted once with
//! [`JournalStore::migrate_legacy`] before the store will append to them.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Errors from journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt journal record {index}: {reason}")]
    CorruptRecord { index: usize, reason: String },

    #[error("Journal is not a JSON array: {0}")]
    CorruptDocument(String),

    #[error("Journal at {0} uses the legacy line-delimited format and must be migrated first")]
    LegacyFormat(PathBuf),
}

/// A single persisted mood record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// When the entry was written.
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Local>,

    /// The journal text that produced the mood.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// Detected tone, lowercase. Legacy files call this `mood`.
    #[serde(alias = "mood")]
    pub tone: String,

    /// The supportive message generated alongside the tone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affirmation: Option<String>,
}

impl JournalEntry {
    /// Create an entry stamped with the current local time.
    pub fn new(tone: impl Into<String>) -> Self {
        Self::at(Local::now(), tone)
    }

    /// Create an entry with an explicit timestamp.
    pub fn at(timestamp: DateTime<Local>, tone: impl Into<String>) -> Self {
        Self {
            timestamp,
            entry: None,
            tone: tone.into(),
            affirmation: None,
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn with_affirmation(mut self, affirmation: impl Into<String>) -> Self {
        self.affirmation = Some(affirmation.into());
        self
    }
}

/// A record that could not be decoded during a lenient load.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Position of the record in the journal array.
    pub index: usize,
    /// Why decoding failed.
    pub reason: String,
}

/// Result of [`JournalStore::load_lenient`].
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub entries: Vec<JournalEntry>,
    pub skipped: Vec<SkippedRecord>,
}

/// File-backed, append-only mood journal.
#[derive(Debug, Clone)]
pub struct JournalStore {
    path: PathBuf,
}

impl JournalStore {
    /// Point a store at a journal file. Nothing is read until first use.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the journal file exists yet.
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Load every entry in write order.
    ///
    /// Returns an empty list when no journal exists. Fails on the first
    /// record that cannot be decoded.
    pub async fn load_all(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let records = self.read_records().await?;
        records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                serde_json::from_value(record).map_err(|e| JournalError::CorruptRecord {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Load every decodable entry, reporting the ones that were skipped.
    pub async fn load_lenient(&self) -> Result<LoadReport, JournalError> {
        let records = self.read_records().await?;
        let mut report = LoadReport::default();

        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<JournalEntry>(record) {
                Ok(entry) => report.entries.push(entry),
                Err(e) => {
                    tracing::warn!(index, error = %e, path = %self.path.display(), "skipping corrupt journal record");
                    report.skipped.push(SkippedRecord {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Append an entry, keeping all existing records untouched.
    pub async fn append(&self, entry: &JournalEntry) -> Result<(), JournalError> {
        let mut records = self.read_records().await?;
        records.push(serde_json::to_value(entry)?);
        self.write_records(&records).await?;

        tracing::info!(
            tone = %entry.tone,
            total = records.len(),
            path = %self.path.display(),
            "journal entry saved"
        );
        Ok(())
    }

    /// Convert a legacy line-delimited journal into the array format.
    ///
    /// Returns the number of migrated entries, or 0 when there is nothing to
    /// migrate. A malformed line aborts the migration (its 1-based line
    /// number is reported) and leaves the original file as it was.
    pub async fn migrate_legacy(&self) -> Result<usize, JournalError> {
        let Some(content) = self.read_raw().await? else {
            return Ok(0);
        };
        if !is_line_delimited(&content) {
            return Ok(0);
        }

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: JournalEntry =
                serde_json::from_str(line).map_err(|e| JournalError::CorruptRecord {
                    index: line_no + 1,
                    reason: e.to_string(),
                })?;
            records.push(serde_json::to_value(&entry)?);
        }

        self.write_records(&records).await?;
        tracing::info!(migrated = records.len(), path = %self.path.display(), "migrated legacy journal");
        Ok(records.len())
    }

    async fn read_raw(&self) -> Result<Option<String>, JournalError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_records(&self) -> Result<Vec<Value>, JournalError> {
        let Some(content) = self.read_raw().await? else {
            return Ok(Vec::new());
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        if is_line_delimited(&content) {
            return Err(JournalError::LegacyFormat(self.path.clone()));
        }

        serde_json::from_str::<Vec<Value>>(&content)
            .map_err(|e| JournalError::CorruptDocument(e.to_string()))
    }

    async fn write_records(&self, records: &[Value]) -> Result<(), JournalError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(records)?;
        let tmp = temp_path(&self.path);
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// A legacy journal starts with an object rather than an array.
fn is_line_delimited(content: &str) -> bool {
    content.trim_start().starts_with('{')
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Parse an ISO-8601 timestamp, with or without a UTC offset.
///
/// Timestamps without an offset are read as local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Local));
    }
    let naive: NaiveDateTime = raw.parse().ok()?;
    naive.and_local_timezone(Local).earliest()
}

mod iso8601 {
    use chrono::{DateTime, Local};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
