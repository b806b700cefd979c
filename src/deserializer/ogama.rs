use crate::errors::GazeError;

use super::{
    HeaderIndexMap, RowDeserializer, RowRejection, SingleDeserializerOutput, cell, check_span,
    check_row_width, coordinates, format_time, optional_cell, parse_time, split_aoi_cell,
};

const FIXATION: &str = "Fixation";

/// OGAMA fixation table: one fixation per row starting at `StartTime` and
/// lasting `Length` milliseconds. Stimulus is `TrialName` when exported,
/// else `TrialID`. Coordinates are in pixels.
pub struct OgamaDeserializer {
    header: HeaderIndexMap,
    subject_idx: usize,
    start_idx: usize,
    length_idx: usize,
    trial_id_idx: usize,
    trial_name_idx: Option<usize>,
    aoi_idx: Option<usize>,
    x_idx: Option<usize>,
    y_idx: Option<usize>,
}

impl OgamaDeserializer {
    pub fn new(header: &HeaderIndexMap, file_name: &str) -> Result<Self, GazeError> {
        Ok(Self {
            header: header.clone(),
            subject_idx: header.require("SubjectName", file_name)?,
            start_idx: header.require("StartTime", file_name)?,
            length_idx: header.require("Length", file_name)?,
            trial_id_idx: header.require("TrialID", file_name)?,
            trial_name_idx: header.get("TrialName"),
            aoi_idx: header.get("AOI"),
            x_idx: header.get("PosX"),
            y_idx: header.get("PosY"),
        })
    }
}

impl RowDeserializer for OgamaDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        check_row_width(row, &self.header)?;
        let stimulus = optional_cell(row, self.trial_name_idx)
            .unwrap_or_else(|| cell(row, self.trial_id_idx));
        if stimulus.is_empty() {
            return Err(RowRejection::Malformed("no trial identifier".to_string()));
        }
        let start_raw = cell(row, self.start_idx);
        let start = parse_time(start_raw, "StartTime")?;
        let length = parse_time(cell(row, self.length_idx), "Length")?;
        let end = start + length;
        check_span(start, end)?;

        Ok(vec![SingleDeserializerOutput {
            start: start_raw.to_string(),
            end: format_time(end),
            stimulus: stimulus.to_string(),
            participant: cell(row, self.subject_idx).to_string(),
            category: FIXATION.to_string(),
            aoi: self.aoi_idx.map(|idx| split_aoi_cell(cell(row, idx))),
            coordinates: coordinates(
                optional_cell(row, self.x_idx),
                optional_cell(row, self.y_idx),
            ),
        }])
    }
}
