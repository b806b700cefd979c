// Row deserializers, one per supported export format

pub(crate) mod begaze;
pub(crate) mod generic;
pub(crate) mod gazepoint;
pub(crate) mod ogama;
pub(crate) mod tobii;
pub(crate) mod varjo;

use std::{collections::HashMap, fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    errors::GazeError,
    format::{EyeFileType, EyeSettingsType},
};

/// One gaze event as read from a source file.
///
/// `start` and `end` keep the textual form of the source timestamps so no
/// precision is lost before the writer interprets them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SingleDeserializerOutput {
    pub start: String,
    pub end: String,
    pub stimulus: String,
    pub participant: String,
    pub category: String,
    /// AOIs hit during the event, `None` when the source carries no AOI data
    pub aoi: Option<Vec<String>>,
    pub coordinates: Option<(f64, f64)>,
}

/// Why a row produced no output.
#[derive(Clone, Debug, PartialEq)]
pub enum RowRejection {
    /// Rows that are legitimately not events: blanks, separators, filtered categories
    Ignored(String),
    /// Rows that should have been events but could not be read
    Malformed(String),
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRejection::Ignored(reason) => write!(f, "ignored: {}", reason),
            RowRejection::Malformed(reason) => write!(f, "malformed: {}", reason),
        }
    }
}

/// Column name to position lookup built from a header row.
#[derive(Clone, Debug, Default)]
pub struct HeaderIndexMap {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderIndexMap {
    pub fn from_row(row: &[&str]) -> Self {
        let names: Vec<String> = row
            .iter()
            .map(|c| c.trim().trim_start_matches('\u{feff}').to_string())
            .collect();
        let mut positions = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            // first occurrence wins for duplicated column names
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    pub fn get(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    pub fn require(&self, column: &str, file_name: &str) -> Result<usize, GazeError> {
        self.get(column).ok_or_else(|| GazeError::MissingColumn {
            file_name: file_name.to_string(),
            column: column.to_string(),
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Turns tokenized rows of one file into gaze events.
///
/// Rows arrive in file order. Formats that export one row per gaze sample
/// keep the event under construction and return it once a later row closes
/// it, so a call may return zero or several outputs.
pub trait RowDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection>;

    /// Flushes any event still open at end of input.
    fn finalize(&mut self) -> Vec<SingleDeserializerOutput> {
        Vec::new()
    }
}

/// Selects the deserializer for a file once, before any row is read.
pub fn deserializer_for(
    settings: &EyeSettingsType,
    header: &HeaderIndexMap,
    file_name: &str,
) -> Result<Box<dyn RowDeserializer + Send>, GazeError> {
    let deserializer: Box<dyn RowDeserializer + Send> = match settings.file_type {
        EyeFileType::Tobii => Box::new(tobii::TobiiDeserializer::new(
            header,
            file_name,
            &settings.user_input_setting,
        )?),
        EyeFileType::GazePoint => Box::new(gazepoint::GazePointDeserializer::new(
            header,
            file_name,
            &settings.user_input_setting,
        )?),
        EyeFileType::BeGaze => Box::new(begaze::BeGazeDeserializer::new(header, file_name)?),
        EyeFileType::Ogama => Box::new(ogama::OgamaDeserializer::new(header, file_name)?),
        EyeFileType::Varjo => Box::new(varjo::VarjoDeserializer::new(
            header,
            file_name,
            &settings.user_input_setting,
        )?),
        EyeFileType::Csv => Box::new(generic::CsvDeserializer::new(header, file_name)?),
        EyeFileType::CsvSegmented => {
            Box::new(generic::CsvSegmentedDeserializer::new(header, file_name)?)
        }
        EyeFileType::Unknown => {
            return Err(GazeError::UnknownFormat {
                file_name: file_name.to_string(),
            });
        }
    };
    Ok(deserializer)
}

/// Rejects blank rows and rows whose width does not match the header.
pub(crate) fn check_row_width(row: &[&str], header: &HeaderIndexMap) -> Result<(), RowRejection> {
    if row.iter().all(|c| c.trim().is_empty()) {
        return Err(RowRejection::Ignored("blank row".to_string()));
    }
    if row.len() != header.len() {
        return Err(RowRejection::Malformed(format!(
            "expected {} columns, found {}",
            header.len(),
            row.len()
        )));
    }
    Ok(())
}

pub(crate) fn cell<'a>(row: &[&'a str], idx: usize) -> &'a str {
    row.get(idx).map(|c| c.trim()).unwrap_or("")
}

pub(crate) fn optional_cell<'a>(row: &[&'a str], idx: Option<usize>) -> Option<&'a str> {
    idx.map(|i| cell(row, i)).filter(|c| !c.is_empty())
}

/// Parses a time value, accepting a decimal comma.
pub(crate) fn parse_time(value: &str, field: &str) -> Result<f64, RowRejection> {
    parse_number(value).ok_or_else(|| {
        RowRejection::Malformed(format!("{} '{}' is not a finite number", field, value))
    })
}

pub(crate) fn parse_number(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parsed = if value.contains(',') && !value.contains('.') {
        value.replace(',', ".").parse::<f64>()
    } else {
        value.parse::<f64>()
    };
    parsed.ok().filter(|v| v.is_finite())
}

/// Both coordinates must parse; each is clamped to be non-negative.
pub(crate) fn coordinates(x: Option<&str>, y: Option<&str>) -> Option<(f64, f64)> {
    let x = parse_number(x?)?;
    let y = parse_number(y?)?;
    Some((x.max(0.), y.max(0.)))
}

pub(crate) fn check_span(start: f64, end: f64) -> Result<(), RowRejection> {
    if start > end {
        return Err(RowRejection::Malformed(format!(
            "event ends ({}) before it starts ({})",
            end, start
        )));
    }
    Ok(())
}

pub(crate) fn format_time(value: f64) -> String {
    format!("{}", value)
}

pub(crate) fn push_unique(aois: &mut Vec<String>, name: &str) {
    if !aois.iter().any(|a| a == name) {
        aois.push(name.to_string());
    }
}

/// Splits a multi-AOI cell (`A;B`) into distinct names.
pub(crate) fn split_aoi_cell(value: &str) -> Vec<String> {
    let mut aois = Vec::new();
    for name in value.split(';').map(str::trim).filter(|n| !n.is_empty()) {
        push_unique(&mut aois, name);
    }
    aois
}

/// Folds consecutive identical samples into events for time-sampled formats.
///
/// A run ends when participant, stimulus, category or AOI set changes. When
/// the next sample belongs to the same participant and stimulus, the run
/// extends up to that sample's time so the timeline has no gaps.
#[derive(Default)]
pub(crate) struct SampleRuns {
    open: Option<(SingleDeserializerOutput, f64)>,
}

impl SampleRuns {
    pub(crate) fn push(
        &mut self,
        sample: SingleDeserializerOutput,
        time: f64,
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        let Some((mut run, last)) = self.open.take() else {
            self.open = Some((sample, time));
            return Ok(Vec::new());
        };
        let same_timeline =
            run.participant == sample.participant && run.stimulus == sample.stimulus;
        if same_timeline && time < last {
            self.open = Some((run, last));
            return Err(RowRejection::Malformed(format!(
                "sample time {} precedes previous sample {}",
                time, last
            )));
        }
        if same_timeline && run.category == sample.category && run.aoi == sample.aoi {
            run.end = sample.end;
            self.open = Some((run, time));
            return Ok(Vec::new());
        }
        if same_timeline {
            run.end = sample.start.clone();
        }
        self.open = Some((sample, time));
        Ok(vec![run])
    }

    pub(crate) fn finish(&mut self) -> Vec<SingleDeserializerOutput> {
        self.open.take().map(|(run, _)| run).into_iter().collect()
    }
}

pub(crate) fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}
