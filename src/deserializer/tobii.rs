use crate::errors::GazeError;

use super::{
    HeaderIndexMap, RowDeserializer, RowRejection, SingleDeserializerOutput, cell,
    check_row_width, coordinates, optional_cell, parse_time, push_unique,
};

const AOI_HIT_PREFIX: &str = "AOI hit [";

/// Tobii Pro Lab data export.
///
/// Every row is one gaze sample. Consecutive samples sharing participant,
/// stimulus, eye movement type and eye movement type index form one event
/// spanning from the first to the last sample timestamp. Coordinates are the
/// fixation point in pixels. AOI hits come from the `AOI hit [<stimulus> - <aoi>]`
/// columns; only columns of the sample's own stimulus are considered.
pub struct TobiiDeserializer {
    header: HeaderIndexMap,
    timestamp_idx: usize,
    participant_idx: usize,
    stimulus_idx: usize,
    movement_type_idx: usize,
    movement_index_idx: Option<usize>,
    x_idx: Option<usize>,
    y_idx: Option<usize>,
    aoi_columns: Vec<(String, usize)>,
    accepted_types: Vec<String>,
    open: Option<OpenEvent>,
}

struct OpenEvent {
    movement_index: Option<String>,
    output: SingleDeserializerOutput,
}

impl OpenEvent {
    fn continues_with(
        &self,
        output: &SingleDeserializerOutput,
        movement_index: &Option<String>,
    ) -> bool {
        movement_index.is_some()
            && self.movement_index == *movement_index
            && self.output.participant == output.participant
            && self.output.stimulus == output.stimulus
            && self.output.category == output.category
    }
}

impl TobiiDeserializer {
    /// `user_input_setting` is a comma separated list of eye movement types to keep.
    pub fn new(
        header: &HeaderIndexMap,
        file_name: &str,
        user_input_setting: &str,
    ) -> Result<Self, GazeError> {
        let aoi_columns = header
            .names()
            .iter()
            .enumerate()
            .filter_map(|(idx, name)| {
                name.strip_prefix(AOI_HIT_PREFIX)
                    .and_then(|rest| rest.strip_suffix(']'))
                    .map(|inner| (inner.to_string(), idx))
            })
            .collect();
        Ok(Self {
            header: header.clone(),
            timestamp_idx: header.require("Recording timestamp", file_name)?,
            participant_idx: header.require("Participant name", file_name)?,
            stimulus_idx: header.require("Presented Stimulus name", file_name)?,
            movement_type_idx: header.require("Eye movement type", file_name)?,
            movement_index_idx: header.get("Eye movement type index"),
            x_idx: header.get("Fixation point X"),
            y_idx: header.get("Fixation point Y"),
            aoi_columns,
            accepted_types: user_input_setting
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            open: None,
        })
    }

    fn aoi_hits(&self, row: &[&str], stimulus: &str) -> Option<Vec<String>> {
        if self.aoi_columns.is_empty() {
            return None;
        }
        let prefix = format!("{} - ", stimulus);
        let mut hits = Vec::new();
        for (inner, idx) in &self.aoi_columns {
            if let Some(aoi) = inner.strip_prefix(&prefix) {
                if cell(row, *idx) == "1" {
                    push_unique(&mut hits, aoi);
                }
            }
        }
        Some(hits)
    }
}

impl RowDeserializer for TobiiDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        check_row_width(row, &self.header)?;

        let stimulus = cell(row, self.stimulus_idx);
        let category = cell(row, self.movement_type_idx);
        if stimulus.is_empty() || category.is_empty() {
            return Err(RowRejection::Ignored(
                "sample outside of a stimulus".to_string(),
            ));
        }
        if !self.accepted_types.is_empty() && !self.accepted_types.iter().any(|t| t == category) {
            return Err(RowRejection::Ignored(format!(
                "eye movement type '{}' not selected",
                category
            )));
        }
        let timestamp = cell(row, self.timestamp_idx);
        parse_time(timestamp, "Recording timestamp")?;

        let sample = SingleDeserializerOutput {
            start: timestamp.to_string(),
            end: timestamp.to_string(),
            stimulus: stimulus.to_string(),
            participant: cell(row, self.participant_idx).to_string(),
            category: category.to_string(),
            aoi: self.aoi_hits(row, stimulus),
            coordinates: coordinates(
                optional_cell(row, self.x_idx),
                optional_cell(row, self.y_idx),
            ),
        };
        let movement_index = optional_cell(row, self.movement_index_idx).map(str::to_string);

        if let Some(open) = self.open.as_mut() {
            if open.continues_with(&sample, &movement_index) {
                let start = parse_time(&open.output.start, "Recording timestamp")?;
                let end = parse_time(timestamp, "Recording timestamp")?;
                if end < start {
                    return Err(RowRejection::Malformed(format!(
                        "sample at {} precedes its event start {}",
                        timestamp, open.output.start
                    )));
                }
                open.output.end = sample.end;
                if let (Some(aois), Some(hits)) = (open.output.aoi.as_mut(), sample.aoi) {
                    for hit in hits {
                        push_unique(aois, &hit);
                    }
                }
                if open.output.coordinates.is_none() {
                    open.output.coordinates = sample.coordinates;
                }
                return Ok(Vec::new());
            }
        }

        let closed = self.open.replace(OpenEvent {
            movement_index,
            output: sample,
        });
        Ok(closed.map(|e| e.output).into_iter().collect())
    }

    fn finalize(&mut self) -> Vec<SingleDeserializerOutput> {
        self.open.take().map(|e| e.output).into_iter().collect()
    }
}
