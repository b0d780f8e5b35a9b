//! Raw job data preparation: derives the `experience_level` tier.
//!
//! Every input column is passed through unchanged and in order; the tier is
//! appended as the last column, or overwrites an existing `experience_level`
//! column in place so re-running over an already transformed file is a no-op.

use crate::error::{DataSourceError, EtlError};
use crate::models::loader;
use crate::schema::{self, ENGINEER_EXPERIENCE_YEARS_FIELD};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::info;

/// Name of the derived column.
pub const EXPERIENCE_LEVEL: &str = "experience_level";

/// Seniority tier derived from years of experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExperienceLevel {
    Junior,
    #[serde(rename = "Mid-level")]
    MidLevel,
    Senior,
}

impl ExperienceLevel {
    pub const ALL: [ExperienceLevel; 3] = [Self::Junior, Self::MidLevel, Self::Senior];

    /// `<3` Junior, `3..10` Mid-level, `>=10` Senior. Fractional and
    /// negative years are tiered like any other value.
    pub fn from_years(years: f64) -> Self {
        if years < 3.0 {
            Self::Junior
        } else if years < 10.0 {
            Self::MidLevel
        } else {
            Self::Senior
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Junior => "Junior",
            Self::MidLevel => "Mid-level",
            Self::Senior => "Senior",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::Junior => 0,
            Self::MidLevel => 1,
            Self::Senior => 2,
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counts of one ETL pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EtlReport {
    pub rows: usize,
    /// Indexed like [`ExperienceLevel::ALL`]
    pub tiers: [usize; 3],
}

impl EtlReport {
    pub fn count(&self, level: ExperienceLevel) -> usize {
        self.tiers[level.index()]
    }
}

/// Stream `reader` to `writer`, adding the experience tier to every row.
pub fn transform<R: Read, W: Write>(reader: R, writer: W) -> Result<EtlReport, DataSourceError> {
    let mut input = csv::Reader::from_reader(reader);
    let mut headers = input.headers()?.clone();

    let years_idx = headers
        .iter()
        .position(|h| h.trim() == schema::ENGINEER_EXPERIENCE_YEARS)
        .ok_or_else(|| DataSourceError::MissingColumn {
            column: schema::ENGINEER_EXPERIENCE_YEARS.to_string(),
        })?;
    let level_idx = headers.iter().position(|h| h.trim() == EXPERIENCE_LEVEL);
    if level_idx.is_none() {
        headers.push_field(EXPERIENCE_LEVEL);
    }

    let mut output = csv::Writer::from_writer(writer);
    output.write_record(&headers)?;

    let mut report = EtlReport::default();
    for (i, record) in input.records().enumerate() {
        let record = record?;
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(i as u64 + 2);

        let years = ENGINEER_EXPERIENCE_YEARS_FIELD
            .parse_number(record.get(years_idx))
            .map_err(|source| DataSourceError::InvalidRow { line, source })?;
        let level = ExperienceLevel::from_years(years);

        let row: csv::StringRecord = match level_idx {
            Some(idx) => record
                .iter()
                .enumerate()
                .map(|(j, cell)| if j == idx { level.as_str() } else { cell })
                .collect(),
            None => record.iter().chain([level.as_str()]).collect(),
        };
        output.write_record(&row)?;

        report.rows += 1;
        report.tiers[level.index()] += 1;
    }

    if report.rows == 0 {
        return Err(DataSourceError::Empty);
    }
    output.flush().map_err(csv::Error::from)?;
    Ok(report)
}

/// Transform the file at `input` and atomically write the result to `output`.
///
/// The output directory is created if needed. On any failure an existing
/// output file is left as it was.
pub fn run(input: &Path, output: &Path) -> Result<EtlReport, EtlError> {
    info!(input = %input.display(), "Fetching raw job data");
    let file = File::open(input).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => DataSourceError::NotFound {
            path: input.to_path_buf(),
        },
        _ => DataSourceError::Io {
            path: input.to_path_buf(),
            source,
        },
    })?;

    let mut buffer = Vec::new();
    let report = transform(file, &mut buffer)?;
    let tiers: Vec<String> = ExperienceLevel::ALL
        .iter()
        .map(|level| format!("{level}={}", report.count(*level)))
        .collect();
    info!(rows = report.rows, tiers = %tiers.join(" "), "Added experience_level column");

    loader::write_atomic(output, |file| file.write_all(&buffer))?;
    info!(output = %output.display(), rows = report.rows, "Transformed job data saved");
    Ok(report)
}
