// Batch ingestion: detection, row parsing, ordered merge and visibility overlay

use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use itertools::Itertools;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    deserializer::{HeaderIndexMap, RowRejection, SingleDeserializerOutput, deserializer_for},
    errors::GazeError,
    format::{EyeFileType, EyeSettingsType, SettingsOverride, detect_with, settings_for},
    gaze::{GazeData, GazeWriter},
    visibility::AoiVisibilityParser,
};

const PARSE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A file read fully into memory.
#[derive(Clone, Debug, PartialEq)]
pub struct InputFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, GazeError> {
        let content = fs::read(path).map_err(|e| GazeError::InputFileError {
            path: format!("{:?}", path),
            source: e,
        })?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(Self { name, content })
    }
}

/// AOI keyframe document for a stimulus, optionally for a single participant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AoiVisibilityInput {
    pub stimulus: String,
    pub participant: Option<String>,
    pub xml: String,
}

#[derive(Clone, Debug, Default)]
pub struct IngestOptions {
    pub overrides: SettingsOverride,
    /// Parse files on separate threads before merging them in name order
    pub parallel: bool,
    pub cancel: Option<Arc<AtomicBool>>,
    /// Emit a `RowsRead` progress event every this many rows, 0 disables it
    pub progress_every_rows: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    RowsRead { file_name: String, rows: usize },
    FileParsed(FileReport),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestionStatus {
    Success,
    /// Data was produced but some rows or visibility documents were unusable
    PartialSuccess,
    /// Parsing completed without producing a single segment
    NoUsableData,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file_name: String,
    pub file_type: EyeFileType,
    pub rows: usize,
    pub segments: usize,
    pub skipped_rows: usize,
    pub ignored_rows: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisibilityFailure {
    pub stimulus: String,
    pub participant: Option<String>,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub status: IngestionStatus,
    pub segments_written: usize,
    pub skipped_rows: usize,
    pub ignored_rows: usize,
    pub files: Vec<FileReport>,
    pub visibility_failures: Vec<VisibilityFailure>,
}

/// Summary of one completed ingestion batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub file_names: Vec<String>,
    pub settings: Vec<EyeSettingsType>,
    /// Local time, `YYYY-MM-DD HH:MM:SS`
    pub parse_date: String,
    /// Seconds
    pub parse_duration: f64,
}

#[derive(Clone, Debug)]
pub struct IngestionOutcome {
    pub data: GazeData,
    pub report: IngestionReport,
    pub metadata: FileMetadata,
}

struct PreparedFile<'a> {
    name: &'a str,
    text: &'a str,
    settings: EyeSettingsType,
}

struct ParsedFile {
    outputs: Vec<SingleDeserializerOutput>,
    report: FileReport,
}

/// Ingests a batch of files into one dataset.
///
/// Files are processed in lexicographic name order so stimulus and
/// participant ids are the same on every run. Detection and settings are
/// resolved for every file before anything is parsed; a file that cannot be
/// identified aborts the batch. Malformed rows are counted and skipped.
pub fn ingest(
    files: &[InputFile],
    visibility: &[AoiVisibilityInput],
    options: &IngestOptions,
    progress: &(dyn Fn(ProgressEvent) + Sync),
) -> Result<IngestionOutcome, GazeError> {
    let started = Instant::now();
    let files: Vec<&InputFile> = files.iter().sorted_by(|a, b| a.name.cmp(&b.name)).collect();

    let prepared = files
        .iter()
        .map(|file| prepare(file, &options.overrides))
        .collect::<Result<Vec<_>, _>>()?;

    let parsed: Vec<ParsedFile> = if options.parallel && prepared.len() > 1 {
        thread::scope(|scope| {
            let handles: Vec<_> = prepared
                .iter()
                .map(|file| scope.spawn(move || parse_file(file, options, progress)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(GazeError::WorkerFailed {
                            reason: "file parser thread panicked".to_string(),
                        })
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })?
    } else {
        prepared
            .iter()
            .map(|file| parse_file(file, options, progress))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut writer = GazeWriter::new();
    let mut reports = Vec::with_capacity(parsed.len());
    for ParsedFile {
        outputs,
        mut report,
    } in parsed
    {
        for output in outputs {
            match writer.write(output) {
                Ok(()) => report.segments += 1,
                Err(e) => {
                    debug!("{}: segment rejected by writer: {}", report.file_name, e);
                    report.skipped_rows += 1;
                }
            }
        }
        progress(ProgressEvent::FileParsed(report.clone()));
        reports.push(report);
    }
    let mut data = writer.finish();

    let visibility_failures = apply_visibility(&mut data, visibility);

    let segments_written = data.segment_count();
    let skipped_rows = reports.iter().map(|r| r.skipped_rows).sum();
    let ignored_rows = reports.iter().map(|r| r.ignored_rows).sum();
    let status = if segments_written == 0 {
        IngestionStatus::NoUsableData
    } else if skipped_rows > 0 || !visibility_failures.is_empty() {
        IngestionStatus::PartialSuccess
    } else {
        IngestionStatus::Success
    };

    let metadata = FileMetadata {
        file_names: files.iter().map(|f| f.name.clone()).collect(),
        settings: prepared.iter().map(|p| p.settings.clone()).collect(),
        parse_date: chrono::Local::now().format(PARSE_DATE_FORMAT).to_string(),
        parse_duration: started.elapsed().as_secs_f64(),
    };
    info!(
        "Ingested {} files: {} stimuli, {} participants, {} segments, {} rows skipped ({:?})",
        metadata.file_names.len(),
        data.stimuli.len(),
        data.participants.len(),
        segments_written,
        skipped_rows,
        status
    );

    Ok(IngestionOutcome {
        data,
        report: IngestionReport {
            status,
            segments_written,
            skipped_rows,
            ignored_rows,
            files: reports,
            visibility_failures,
        },
        metadata,
    })
}

fn prepare<'a>(
    file: &'a InputFile,
    overrides: &SettingsOverride,
) -> Result<PreparedFile<'a>, GazeError> {
    let text = std::str::from_utf8(&file.content)
        .map_err(|_| GazeError::FileEncoding {
            file_name: file.name.clone(),
        })?
        .trim_start_matches('\u{feff}');
    let file_type = overrides
        .file_type
        .unwrap_or_else(|| detect_with(&file.name, text, overrides));
    if file_type == EyeFileType::Unknown {
        return Err(GazeError::UnknownFormat {
            file_name: file.name.clone(),
        });
    }
    let settings = settings_for(file_type, overrides);
    settings.validate()?;
    info!("{}: parsing as {}", file.name, file_type);
    Ok(PreparedFile {
        name: &file.name,
        text,
        settings,
    })
}

fn parse_file(
    file: &PreparedFile,
    options: &IngestOptions,
    progress: &(dyn Fn(ProgressEvent) + Sync),
) -> Result<ParsedFile, GazeError> {
    let mut reader = file
        .settings
        .reader_builder()?
        .from_reader(file.text.as_bytes());
    let mut records = reader.records();

    let header_row_id = file.settings.header_row_id;
    let header_record = records
        .nth(header_row_id)
        .ok_or_else(|| GazeError::HeaderNotFound {
            file_name: file.name.to_string(),
            header_row_id,
        })?
        .map_err(|e| GazeError::CsvReadError { source: e })?;
    let header = HeaderIndexMap::from_row(&header_record.iter().collect::<Vec<_>>());
    let mut deserializer = deserializer_for(&file.settings, &header, file.name)?;

    let mut outputs = Vec::new();
    let mut report = FileReport {
        file_name: file.name.to_string(),
        file_type: file.settings.file_type,
        rows: 0,
        segments: 0,
        skipped_rows: 0,
        ignored_rows: 0,
    };
    for record in records {
        if options
            .cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
        {
            return Err(GazeError::Cancelled);
        }
        report.rows += 1;
        if options.progress_every_rows > 0 && report.rows % options.progress_every_rows == 0 {
            progress(ProgressEvent::RowsRead {
                file_name: file.name.to_string(),
                rows: report.rows,
            });
        }

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                debug!("{}: row {} unreadable: {}", file.name, report.rows, e);
                report.skipped_rows += 1;
                continue;
            }
        };
        let row: Vec<&str> = record.iter().collect();
        match deserializer.deserialize_row(&row) {
            Ok(events) => outputs.extend(events),
            Err(RowRejection::Ignored(_)) => report.ignored_rows += 1,
            Err(RowRejection::Malformed(reason)) => {
                let line = record.position().map(|p| p.line()).unwrap_or_default();
                debug!("{}: line {} skipped: {}", file.name, line, reason);
                report.skipped_rows += 1;
            }
        }
    }
    outputs.extend(deserializer.finalize());

    Ok(ParsedFile { outputs, report })
}

/// Applies each visibility document on its own; failures are collected, not propagated.
fn apply_visibility(
    data: &mut GazeData,
    visibility: &[AoiVisibilityInput],
) -> Vec<VisibilityFailure> {
    let mut failures = Vec::new();
    for input in visibility {
        let result = resolve_ids(data, input).and_then(|(stimulus_id, participant_id)| {
            AoiVisibilityParser::new(data).add_vis_info(stimulus_id, participant_id, &input.xml)
        });
        if let Err(e) = result {
            warn!(
                "AOI visibility for stimulus '{}' ({:?}) not applied: {}",
                input.stimulus, input.participant, e
            );
            failures.push(VisibilityFailure {
                stimulus: input.stimulus.clone(),
                participant: input.participant.clone(),
                reason: e.to_string(),
            });
        }
    }
    failures
}

fn resolve_ids(
    data: &GazeData,
    input: &AoiVisibilityInput,
) -> Result<(usize, Option<usize>), GazeError> {
    let stimulus_id = data
        .stimulus_id(&input.stimulus)
        .ok_or_else(|| GazeError::InvalidUserInput {
            field: "stimulus".to_string(),
            reason: format!("no gaze data for stimulus '{}'", input.stimulus),
        })?;
    let participant_id = match &input.participant {
        None => None,
        Some(name) => Some(data.participant_id(name).ok_or_else(|| {
            GazeError::InvalidUserInput {
                field: "participant".to_string(),
                reason: format!("no gaze data for participant '{}'", name),
            }
        })?),
    };
    Ok((stimulus_id, participant_id))
}
