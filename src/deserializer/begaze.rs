use crate::errors::GazeError;

use super::{
    HeaderIndexMap, RowDeserializer, RowRejection, SingleDeserializerOutput, cell, check_span,
    check_row_width, coordinates, optional_cell, parse_time,
};

/// Event categories BeGaze writes without a meaningful time span.
const UNTIMED_CATEGORIES: [&str; 2] = ["Separator", "User Event"];
/// AOI cell values meaning "no AOI hit".
const NO_AOI: [&str; 2] = ["-", "White Space"];

/// SMI BeGaze event statistics export: one row per event, times in
/// milliseconds of trial time, coordinates in pixels.
pub struct BeGazeDeserializer {
    header: HeaderIndexMap,
    stimulus_idx: usize,
    participant_idx: usize,
    category_idx: usize,
    start_idx: usize,
    end_idx: usize,
    aoi_idx: Option<usize>,
    x_idx: Option<usize>,
    y_idx: Option<usize>,
}

impl BeGazeDeserializer {
    pub fn new(header: &HeaderIndexMap, file_name: &str) -> Result<Self, GazeError> {
        Ok(Self {
            header: header.clone(),
            stimulus_idx: header.require("Stimulus", file_name)?,
            participant_idx: header.require("Participant", file_name)?,
            category_idx: header.require("Category", file_name)?,
            start_idx: header.require("Event Start Trial Time [ms]", file_name)?,
            end_idx: header.require("Event End Trial Time [ms]", file_name)?,
            aoi_idx: header.get("AOI Name"),
            x_idx: header.get("Fixation Position X [px]"),
            y_idx: header.get("Fixation Position Y [px]"),
        })
    }
}

impl RowDeserializer for BeGazeDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        check_row_width(row, &self.header)?;
        let category = cell(row, self.category_idx);
        if category.is_empty() || UNTIMED_CATEGORIES.contains(&category) {
            return Err(RowRejection::Ignored(format!(
                "category '{}' carries no timing",
                category
            )));
        }
        let start_raw = cell(row, self.start_idx);
        let end_raw = cell(row, self.end_idx);
        let start = parse_time(start_raw, "Event Start Trial Time")?;
        let end = parse_time(end_raw, "Event End Trial Time")?;
        check_span(start, end)?;

        let aoi = self.aoi_idx.map(|idx| {
            let value = cell(row, idx);
            if value.is_empty() || NO_AOI.contains(&value) {
                Vec::new()
            } else {
                vec![value.to_string()]
            }
        });

        Ok(vec![SingleDeserializerOutput {
            start: start_raw.to_string(),
            end: end_raw.to_string(),
            stimulus: cell(row, self.stimulus_idx).to_string(),
            participant: cell(row, self.participant_idx).to_string(),
            category: category.to_string(),
            aoi,
            coordinates: coordinates(
                optional_cell(row, self.x_idx),
                optional_cell(row, self.y_idx),
            ),
        }])
    }
}
