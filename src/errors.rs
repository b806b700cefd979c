// Error types for gazeplotter

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum GazeError {
    // Detection and settings errors, raised before any data is written
    #[snafu(display("Unknown eye-tracking file format: {file_name}"))]
    UnknownFormat { file_name: String },
    #[snafu(display("Invalid parse settings: {reason}"))]
    InvalidSettings { reason: String },
    #[snafu(display("File {file_name} is missing required column '{column}'"))]
    MissingColumn { file_name: String, column: String },
    #[snafu(display("File {file_name} has no header at row {header_row_id}"))]
    HeaderNotFound {
        file_name: String,
        header_row_id: usize,
    },
    #[snafu(display("File {file_name} is not valid UTF-8 text"))]
    FileEncoding { file_name: String },
    #[snafu(display("Error reading delimited rows"))]
    CsvReadError { source: csv::Error },

    // Gaze writer errors
    #[snafu(display("Invalid gaze segment: {reason}"))]
    InvalidSegment { reason: String },
    #[snafu(display("Unknown stimulus id {stimulus_id}"))]
    UnknownStimulus { stimulus_id: usize },
    #[snafu(display("Unknown participant id {participant_id}"))]
    UnknownParticipant { participant_id: usize },
    #[snafu(display("AOI order for stimulus {stimulus_id} is not a permutation of its AOIs"))]
    InvalidAoiOrder { stimulus_id: usize },

    // AOI visibility errors
    #[snafu(display("Malformed AOI visibility document: {reason}"))]
    MalformedAoiXml { reason: String },
    #[snafu(display("Error parsing AOI visibility XML"))]
    XmlParseError { source: roxmltree::Error },

    // Worker errors
    #[snafu(display("Parsing was cancelled"))]
    Cancelled,
    #[snafu(display("Parse worker stopped without a result"))]
    WorkerDisconnected,
    #[snafu(display("Parse worker failed: {reason}"))]
    WorkerFailed { reason: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error reading or writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },

    // Input and export files
    #[snafu(display("Error reading input file {path}"))]
    InputFileError { path: String, source: io::Error },
    #[snafu(display("Error writing export file"))]
    WriterError { source: io::Error },
    #[snafu(display("Error loading export file"))]
    ExportLoaderError { source: io::Error },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}
