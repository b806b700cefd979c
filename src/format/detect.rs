use std::path::Path;

use log::debug;

use super::{EyeFileType, SettingsOverride};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

/// Detects the export format from the file name and the start of its content.
///
/// The first non-comment line is treated as the header. A format is recognized
/// only when every one of its signature columns is present and no other format
/// also matches; anything else is `Unknown`.
pub fn detect(file_name: &str, sample_content: &str) -> EyeFileType {
    detect_with(file_name, sample_content, &SettingsOverride::default())
}

/// Like `detect`, honouring the user's delimiters and header row.
///
/// A column delimiter override is tried before each format's default, a row
/// delimiter override splits the sample into rows, and a header row override
/// picks that non-empty row as the header when the sample reaches it.
pub fn detect_with(
    file_name: &str,
    sample_content: &str,
    overrides: &SettingsOverride,
) -> EyeFileType {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            debug!("{}: unsupported extension", file_name);
            return EyeFileType::Unknown;
        }
    }

    let Some(header) = header_line(
        sample_content,
        overrides.row_delimiter.as_deref(),
        overrides.header_row_id,
    ) else {
        debug!("{}: no header line found", file_name);
        return EyeFileType::Unknown;
    };

    let matches: Vec<EyeFileType> = EyeFileType::SUPPORTED
        .into_iter()
        .filter(|file_type| {
            overrides
                .column_delimiter
                .as_deref()
                .filter(|d| !d.is_empty())
                .into_iter()
                .chain([file_type.default_column_delimiter()])
                .any(|delimiter| {
                    let columns = split_header(header, delimiter);
                    file_type
                        .signature()
                        .iter()
                        .all(|required| columns.iter().any(|c| c == required))
                })
        })
        .collect();

    match matches.as_slice() {
        [file_type] => *file_type,
        [] => EyeFileType::Unknown,
        several => {
            debug!(
                "{}: header matches several formats {:?}, refusing to guess",
                file_name, several
            );
            EyeFileType::Unknown
        }
    }
}

fn header_line<'a>(
    content: &'a str,
    row_delimiter: Option<&str>,
    header_row_id: Option<usize>,
) -> Option<&'a str> {
    let content = content.trim_start_matches('\u{feff}');
    let rows: Vec<&str> = match row_delimiter {
        Some(d) if !d.is_empty() && d != "\n" && d != "\r\n" => content.split(d).collect(),
        _ => content.lines().collect(),
    };
    let rows: Vec<&str> = rows
        .into_iter()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| !l.trim().is_empty())
        .collect();
    // A missing header row is reported by the parser, not here.
    header_row_id
        .and_then(|id| rows.get(id).copied())
        .or_else(|| rows.iter().copied().find(|l| !l.starts_with('#')))
}

fn split_header(header: &str, delimiter: &str) -> Vec<String> {
    header
        .split(delimiter)
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect()
}
