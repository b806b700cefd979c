// Format registry: supported eye-tracker exports and their parse settings

pub mod detect;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::GazeError;

pub use detect::{detect, detect_with};

/// Vendor export formats understood by the ingestion pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EyeFileType {
    /// Tobii Pro Lab data export, one row per gaze sample
    Tobii,
    /// GazePoint Analysis fixation export
    GazePoint,
    /// SMI BeGaze event statistics export
    BeGaze,
    /// OGAMA fixation table export
    Ogama,
    /// Varjo Base gaze export with actor hits
    Varjo,
    /// Time-sampled GazePlotter CSV
    Csv,
    /// GazePlotter CSV with explicit segment boundaries
    CsvSegmented,
    Unknown,
}

impl EyeFileType {
    pub const SUPPORTED: [EyeFileType; 7] = [
        EyeFileType::Tobii,
        EyeFileType::GazePoint,
        EyeFileType::BeGaze,
        EyeFileType::Ogama,
        EyeFileType::Varjo,
        EyeFileType::Csv,
        EyeFileType::CsvSegmented,
    ];

    /// Column delimiter the vendor writes by default.
    pub fn default_column_delimiter(&self) -> &'static str {
        match self {
            EyeFileType::Tobii | EyeFileType::BeGaze | EyeFileType::Ogama => "\t",
            _ => ",",
        }
    }

    /// Columns that must all be present in a header for this format to be recognized.
    pub fn signature(&self) -> &'static [&'static str] {
        match self {
            EyeFileType::Tobii => &[
                "Recording timestamp",
                "Participant name",
                "Presented Stimulus name",
                "Eye movement type",
            ],
            EyeFileType::GazePoint => &["MEDIA_NAME", "FPOGS", "FPOGD", "FPOGID"],
            EyeFileType::BeGaze => &[
                "Stimulus",
                "Participant",
                "Category",
                "Event Start Trial Time [ms]",
                "Event End Trial Time [ms]",
            ],
            EyeFileType::Ogama => &["SubjectName", "StartTime", "Length", "TrialID"],
            EyeFileType::Varjo => &["Time", "Actor Label"],
            EyeFileType::Csv => &["Time", "Participant", "Stimulus", "AOI"],
            EyeFileType::CsvSegmented => {
                &["From", "To", "Participant", "Stimulus", "AOI", "Category"]
            }
            EyeFileType::Unknown => &[],
        }
    }

    /// Lines starting with this byte are comments and never reach a deserializer.
    pub fn comment_byte(&self) -> Option<u8> {
        match self {
            EyeFileType::BeGaze => Some(b'#'),
            _ => None,
        }
    }
}

impl fmt::Display for EyeFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EyeFileType::Tobii => write!(f, "tobii"),
            EyeFileType::GazePoint => write!(f, "gazepoint"),
            EyeFileType::BeGaze => write!(f, "begaze"),
            EyeFileType::Ogama => write!(f, "ogama"),
            EyeFileType::Varjo => write!(f, "varjo"),
            EyeFileType::Csv => write!(f, "csv"),
            EyeFileType::CsvSegmented => write!(f, "csv-segmented"),
            EyeFileType::Unknown => write!(f, "unknown"),
        }
    }
}

impl FromStr for EyeFileType {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tobii" => Ok(EyeFileType::Tobii),
            "gazepoint" => Ok(EyeFileType::GazePoint),
            "begaze" => Ok(EyeFileType::BeGaze),
            "ogama" => Ok(EyeFileType::Ogama),
            "varjo" => Ok(EyeFileType::Varjo),
            "csv" => Ok(EyeFileType::Csv),
            "csv-segmented" => Ok(EyeFileType::CsvSegmented),
            other => Err(GazeError::InvalidUserInput {
                field: "file_type".to_string(),
                reason: format!("'{}' is not a supported format", other),
            }),
        }
    }
}

/// User supplied values that take precedence over detected defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverride {
    pub file_type: Option<EyeFileType>,
    pub row_delimiter: Option<String>,
    pub column_delimiter: Option<String>,
    pub header_row_id: Option<usize>,
    pub user_input_setting: Option<String>,
}

impl SettingsOverride {
    /// Fields set on `self` win, unset fields fall back to `other`.
    pub fn or(&self, other: &SettingsOverride) -> SettingsOverride {
        SettingsOverride {
            file_type: self.file_type.or(other.file_type),
            row_delimiter: self
                .row_delimiter
                .clone()
                .or_else(|| other.row_delimiter.clone()),
            column_delimiter: self
                .column_delimiter
                .clone()
                .or_else(|| other.column_delimiter.clone()),
            header_row_id: self.header_row_id.or(other.header_row_id),
            user_input_setting: self
                .user_input_setting
                .clone()
                .or_else(|| other.user_input_setting.clone()),
        }
    }
}

/// Resolved settings for one parse session. Never mutated once parsing starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyeSettingsType {
    pub row_delimiter: String,
    pub column_delimiter: String,
    #[serde(rename = "type")]
    pub file_type: EyeFileType,
    pub user_input_setting: String,
    pub header_row_id: usize,
}

/// Default settings for `file_type` with the user's overrides layered on top.
pub fn settings_for(file_type: EyeFileType, overrides: &SettingsOverride) -> EyeSettingsType {
    EyeSettingsType {
        row_delimiter: overrides
            .row_delimiter
            .clone()
            .unwrap_or_else(|| "\n".to_string()),
        column_delimiter: overrides
            .column_delimiter
            .clone()
            .unwrap_or_else(|| file_type.default_column_delimiter().to_string()),
        file_type,
        user_input_setting: overrides.user_input_setting.clone().unwrap_or_default(),
        header_row_id: overrides.header_row_id.unwrap_or(0),
    }
}

impl EyeSettingsType {
    /// Checks that the settings can drive the tokenizer at all.
    pub fn validate(&self) -> Result<(), GazeError> {
        if self.file_type == EyeFileType::Unknown {
            return Err(GazeError::InvalidSettings {
                reason: "file type must be resolved before parsing".to_string(),
            });
        }
        if self.column_delimiter.is_empty() {
            return Err(GazeError::InvalidSettings {
                reason: "column delimiter is empty".to_string(),
            });
        }
        if self.row_delimiter.is_empty() {
            return Err(GazeError::InvalidSettings {
                reason: "row delimiter is empty".to_string(),
            });
        }
        self.column_byte()?;
        self.terminator()?;
        if self.row_delimiter.trim_start_matches('\r') == self.column_delimiter {
            return Err(GazeError::InvalidSettings {
                reason: "row and column delimiters must differ".to_string(),
            });
        }
        Ok(())
    }

    fn column_byte(&self) -> Result<u8, GazeError> {
        match self.column_delimiter.as_bytes() {
            [b] if b.is_ascii() => Ok(*b),
            _ => Err(GazeError::InvalidSettings {
                reason: format!(
                    "column delimiter {:?} must be a single ASCII character",
                    self.column_delimiter
                ),
            }),
        }
    }

    fn terminator(&self) -> Result<csv::Terminator, GazeError> {
        match self.row_delimiter.as_str() {
            "\n" | "\r\n" => Ok(csv::Terminator::CRLF),
            other => match other.as_bytes() {
                [b] if b.is_ascii() => Ok(csv::Terminator::Any(*b)),
                _ => Err(GazeError::InvalidSettings {
                    reason: format!(
                        "row delimiter {:?} must be a line break or a single ASCII character",
                        other
                    ),
                }),
            },
        }
    }

    /// Tokenizer configured for these settings. Headers are handled by the caller.
    pub fn reader_builder(&self) -> Result<csv::ReaderBuilder, GazeError> {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.column_byte()?)
            .terminator(self.terminator()?)
            .comment(self.file_type.comment_byte());
        Ok(builder)
    }
}
