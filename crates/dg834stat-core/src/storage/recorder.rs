//! Persistence of samples to the structured and tabular logs.
//!
//! Each sample is rendered twice by independent pure serializers
//! ([`to_json_line`], [`to_csv_line`]) and appended to two handles that are
//! opened once at startup. Both lines are rendered before anything is
//! written, so a serialization error leaves both sinks untouched. A write
//! failure on either sink is returned to the caller and is fatal to the
//! daemon; the sink written before it may already hold the line.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::storage::model::{Sample, StatField};

/// File name of the structured (JSON Lines) log.
pub const JSON_FILE_NAME: &str = "dg834.json";
/// File name of the tabular (CSV) log.
pub const CSV_FILE_NAME: &str = "dg834.csv";

/// Error writing to one of the output sinks.
#[derive(Debug)]
pub enum RecordError {
    /// Opening an output file failed.
    Open(PathBuf, std::io::Error),
    /// Writing or flushing a sink failed.
    Io(std::io::Error),
    /// JSON serialization failed.
    Serialize(serde_json::Error),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Open(path, e) => write!(f, "cannot open {}: {}", path.display(), e),
            RecordError::Io(e) => write!(f, "I/O error: {}", e),
            RecordError::Serialize(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordError::Open(_, e) | RecordError::Io(e) => Some(e),
            RecordError::Serialize(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for RecordError {
    fn from(e: std::io::Error) -> Self {
        RecordError::Io(e)
    }
}

impl From<serde_json::Error> for RecordError {
    fn from(e: serde_json::Error) -> Self {
        RecordError::Serialize(e)
    }
}

/// Renders a sample as a single JSON object followed by a newline.
///
/// `when` comes first; absent statistics are omitted rather than `null`.
pub fn to_json_line(sample: &Sample) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(sample)?;
    line.push('\n');
    Ok(line)
}

/// Renders a sample as a single CSV line followed by a newline.
///
/// Columns: `when` then every [`StatField`] in order. Absent statistics are
/// rendered as empty cells, never as `0`.
pub fn to_csv_line(sample: &Sample) -> String {
    let mut line = sample.when.to_string();
    for field in StatField::ALL {
        line.push(',');
        if let Some(value) = sample.get(field) {
            line.push_str(&value.to_string());
        }
    }
    line.push('\n');
    line
}

/// Writes samples to a structured sink and a tabular sink.
///
/// Generic over the writer so tests can record into memory; the daemon uses
/// [`SampleRecorder::create`] to get file-backed sinks.
pub struct SampleRecorder<W: Write = File> {
    json: W,
    csv: W,
    recorded: u64,
}

impl SampleRecorder<File> {
    /// Creates `dir` if needed and truncate-creates both output files in it.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, RecordError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| RecordError::Open(dir.to_path_buf(), e))?;

        let json_path = dir.join(JSON_FILE_NAME);
        let json = File::create(&json_path).map_err(|e| RecordError::Open(json_path, e))?;
        let csv_path = dir.join(CSV_FILE_NAME);
        let csv = File::create(&csv_path).map_err(|e| RecordError::Open(csv_path, e))?;

        Ok(Self::new(json, csv))
    }
}

impl<W: Write> SampleRecorder<W> {
    /// Wraps two already-open sinks.
    pub fn new(json: W, csv: W) -> Self {
        Self {
            json,
            csv,
            recorded: 0,
        }
    }

    /// Appends `sample` to both sinks and flushes them.
    pub fn record(&mut self, sample: Sample) -> Result<(), RecordError> {
        let json_line = to_json_line(&sample)?;
        let csv_line = to_csv_line(&sample);

        self.json.write_all(json_line.as_bytes())?;
        self.json.flush()?;
        self.csv.write_all(csv_line.as_bytes())?;
        self.csv.flush()?;

        self.recorded += 1;
        debug!("Recorded sample at {} ({} fields)", sample.when, sample.field_count());
        Ok(())
    }

    /// Number of samples recorded so far.
    pub fn recorded(&self) -> u64 {
        self.recorded
    }

    /// Returns the underlying sinks as `(json, csv)`.
    pub fn into_inner(self) -> (W, W) {
        (self.json, self.csv)
    }
}
