//! Extraction of line statistics from `avsar_modem_stats` output.
//!
//! The modem prints a free-text report with lines such as
//! `DS Connection Rate: 8128` or `US Margin : 6`. A [`FieldPatternSet`] maps
//! each [`StatField`] to a case-insensitive regex with one capture group;
//! [`extract`] applies every pattern independently.

use chrono::Utc;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::storage::model::{Sample, StatField};

/// Error building a [`FieldPatternSet`].
#[derive(Debug, Clone)]
pub enum PatternError {
    /// Same field listed twice.
    Duplicate(StatField),
    /// Pattern failed to compile.
    Invalid(StatField, regex::Error),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::Duplicate(field) => write!(f, "duplicate pattern for {}", field),
            PatternError::Invalid(field, e) => write!(f, "invalid pattern for {}: {}", field, e),
        }
    }
}

impl std::error::Error for PatternError {}

/// Ordered mapping from statistic to the regex that extracts it.
#[derive(Debug, Clone)]
pub struct FieldPatternSet {
    patterns: Vec<(StatField, Regex)>,
}

impl FieldPatternSet {
    /// Built-in patterns for the DG834 report.
    const DG834_PATTERNS: [(StatField, &'static str); 8] = [
        (StatField::DsConnRate, r"ds\sconnection\srate\s?:\s*([0-9]+)"),
        (StatField::DsLineAttenuation, r"ds\sline\sattenuation\s?:\s*([0-9]+)"),
        (StatField::DsMargin, r"ds\smargin\s?:\s*([0-9]+)"),
        (StatField::DsPayload, r"ds\spayload\s?:\s*([0-9]+)"),
        (StatField::UsConnRate, r"us\sconnection\srate\s?:\s*([0-9]+)"),
        (StatField::UsLineAttenuation, r"us\sline\sattenuation\s?:\s*([0-9]+)"),
        (StatField::UsMargin, r"us\smargin\s?:\s*([0-9]+)"),
        (StatField::UsPayload, r"us\spayload\s?:\s*([0-9]+)"),
    ];

    /// Builds a set from `(field, pattern)` pairs.
    ///
    /// Patterns are compiled case-insensitively and must contain at least one
    /// capture group; the first group is the value.
    pub fn new<'a>(
        pairs: impl IntoIterator<Item = (StatField, &'a str)>,
    ) -> Result<Self, PatternError> {
        let mut patterns: Vec<(StatField, Regex)> = Vec::new();
        for (field, pattern) in pairs {
            if patterns.iter().any(|(f, _)| *f == field) {
                return Err(PatternError::Duplicate(field));
            }
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| PatternError::Invalid(field, e))?;
            patterns.push((field, regex));
        }
        Ok(Self { patterns })
    }

    /// Patterns for the DG834 `avsar_modem_stats` report.
    ///
    /// Each matches `<label> : <digits>` anywhere in the text, with an
    /// optional space before the colon. Only ASCII digits count as a value.
    pub fn dg834() -> Self {
        Self::new(Self::DG834_PATTERNS).expect("built-in DG834 patterns are valid")
    }

    /// Fields covered by this set, in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = StatField> + '_ {
        self.patterns.iter().map(|(f, _)| *f)
    }

    /// Number of patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` if the set has no patterns.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First capture group of `regex` in `text`, as an integer.
    fn capture(regex: &Regex, text: &str) -> Option<u64> {
        regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    }
}

impl Default for FieldPatternSet {
    fn default() -> Self {
        Self::dg834()
    }
}

/// Extracts every field of `patterns` from `text`.
///
/// The sample is stamped with the current time. Fields whose pattern does not
/// match are left absent; a miss is logged at debug level and is not an error.
pub fn extract(text: &str, patterns: &FieldPatternSet) -> Sample {
    let mut sample = Sample::new(Utc::now().timestamp());
    for (field, regex) in &patterns.patterns {
        match FieldPatternSet::capture(regex, text) {
            Some(value) => sample.set(*field, value),
            None => debug!("No match for field: {}", field),
        }
    }
    sample
}
