//! Data model for a single poll cycle.
//!
//! A [`Sample`] holds the eight line-quality statistics reported by the modem.
//! Every statistic is optional: a field is present only when its pattern
//! matched the modem output, so a missing value is never confused with `0`.

use serde::{Deserialize, Serialize};

/// Identifier of one line-quality statistic.
///
/// The declaration order is the fixed column order of the tabular log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatField {
    /// Downstream connection rate (kbps).
    DsConnRate,
    /// Downstream line attenuation (dB).
    DsLineAttenuation,
    /// Downstream noise margin (dB).
    DsMargin,
    /// Downstream payload rate.
    DsPayload,
    /// Upstream connection rate (kbps).
    UsConnRate,
    /// Upstream line attenuation (dB).
    UsLineAttenuation,
    /// Upstream noise margin (dB).
    UsMargin,
    /// Upstream payload rate.
    UsPayload,
}

impl StatField {
    /// All fields in column order.
    pub const ALL: [StatField; 8] = [
        StatField::DsConnRate,
        StatField::DsLineAttenuation,
        StatField::DsMargin,
        StatField::DsPayload,
        StatField::UsConnRate,
        StatField::UsLineAttenuation,
        StatField::UsMargin,
        StatField::UsPayload,
    ];

    /// Stable snake_case name, used as JSON key and CSV column name.
    pub fn name(self) -> &'static str {
        match self {
            StatField::DsConnRate => "ds_conn_rate",
            StatField::DsLineAttenuation => "ds_line_attenuation",
            StatField::DsMargin => "ds_margin",
            StatField::DsPayload => "ds_payload",
            StatField::UsConnRate => "us_conn_rate",
            StatField::UsLineAttenuation => "us_line_attenuation",
            StatField::UsMargin => "us_margin",
            StatField::UsPayload => "us_payload",
        }
    }
}

impl std::fmt::Display for StatField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One timestamped, partially-populated set of line statistics.
///
/// Field order matches [`StatField::ALL`]; serde skips absent values so the
/// JSON form carries only what was actually extracted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp (seconds) of extraction.
    pub when: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_conn_rate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_line_attenuation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_margin: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ds_payload: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_conn_rate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_line_attenuation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_margin: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_payload: Option<u64>,
}

impl Sample {
    /// Creates an empty sample stamped with `when`.
    pub fn new(when: i64) -> Self {
        Self {
            when,
            ..Self::default()
        }
    }

    /// Returns the value of `field`, if it was extracted.
    pub fn get(&self, field: StatField) -> Option<u64> {
        *self.slot(field)
    }

    /// Stores `value` under `field`.
    pub fn set(&mut self, field: StatField, value: u64) {
        *self.slot_mut(field) = Some(value);
    }

    /// Builder-style variant of [`Sample::set`].
    pub fn with(mut self, field: StatField, value: u64) -> Self {
        self.set(field, value);
        self
    }

    /// Number of fields present.
    pub fn field_count(&self) -> usize {
        StatField::ALL
            .iter()
            .filter(|f| self.get(**f).is_some())
            .count()
    }

    /// Fields that were not extracted, in column order.
    pub fn missing_fields(&self) -> Vec<StatField> {
        StatField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    /// Parses one line of the tabular log back into a sample.
    ///
    /// Expects exactly nine comma-separated cells; empty cells become absent
    /// fields.
    pub fn from_csv_line(line: &str) -> Result<Self, CsvParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != StatField::ALL.len() + 1 {
            return Err(CsvParseError::ColumnCount(cells.len()));
        }

        let when = cells[0]
            .parse::<i64>()
            .map_err(|_| CsvParseError::InvalidCell {
                column: "when",
                value: cells[0].to_string(),
            })?;

        let mut sample = Sample::new(when);
        for (field, cell) in StatField::ALL.into_iter().zip(&cells[1..]) {
            if cell.is_empty() {
                continue;
            }
            let value = cell.parse::<u64>().map_err(|_| CsvParseError::InvalidCell {
                column: field.name(),
                value: cell.to_string(),
            })?;
            sample.set(field, value);
        }
        Ok(sample)
    }

    fn slot(&self, field: StatField) -> &Option<u64> {
        match field {
            StatField::DsConnRate => &self.ds_conn_rate,
            StatField::DsLineAttenuation => &self.ds_line_attenuation,
            StatField::DsMargin => &self.ds_margin,
            StatField::DsPayload => &self.ds_payload,
            StatField::UsConnRate => &self.us_conn_rate,
            StatField::UsLineAttenuation => &self.us_line_attenuation,
            StatField::UsMargin => &self.us_margin,
            StatField::UsPayload => &self.us_payload,
        }
    }

    fn slot_mut(&mut self, field: StatField) -> &mut Option<u64> {
        match field {
            StatField::DsConnRate => &mut self.ds_conn_rate,
            StatField::DsLineAttenuation => &mut self.ds_line_attenuation,
            StatField::DsMargin => &mut self.ds_margin,
            StatField::DsPayload => &mut self.ds_payload,
            StatField::UsConnRate => &mut self.us_conn_rate,
            StatField::UsLineAttenuation => &mut self.us_line_attenuation,
            StatField::UsMargin => &mut self.us_margin,
            StatField::UsPayload => &mut self.us_payload,
        }
    }
}

/// Error returned by [`Sample::from_csv_line`].
#[derive(Debug, Clone, PartialEq)]
pub enum CsvParseError {
    /// Line did not have the expected number of columns.
    ColumnCount(usize),
    /// A cell could not be parsed as a number.
    InvalidCell { column: &'static str, value: String },
}

impl std::fmt::Display for CsvParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CsvParseError::ColumnCount(n) => {
                write!(f, "expected {} columns, got {}", StatField::ALL.len() + 1, n)
            }
            CsvParseError::InvalidCell { column, value } => {
                write!(f, "invalid value '{}' in column {}", value, column)
            }
        }
    }
}

impl std::error::Error for CsvParseError {}
