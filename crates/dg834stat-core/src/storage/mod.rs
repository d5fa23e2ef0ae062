//! Sample model and the two output sinks.

pub mod model;
pub mod recorder;

pub use model::{CsvParseError, Sample, StatField};
pub use recorder::{
    CSV_FILE_NAME, JSON_FILE_NAME, RecordError, SampleRecorder, to_csv_line, to_json_line,
};
