use crate::errors::GazeError;

use super::{
    HeaderIndexMap, RowDeserializer, RowRejection, SampleRuns, SingleDeserializerOutput, cell,
    check_row_width, coordinates, file_stem, optional_cell, parse_time,
};

const DEFAULT_STIMULUS: &str = "Varjo";
const DWELL: &str = "Dwell";

/// Varjo Base gaze export. Each row is a sample with the scene actor hit by
/// the gaze ray; consecutive samples on the same actor form one dwell.
/// The export holds a single participant (the file stem) and a single scene,
/// named by the user input or `Varjo`. Coordinates are normalized.
pub struct VarjoDeserializer {
    header: HeaderIndexMap,
    time_idx: usize,
    actor_idx: usize,
    x_idx: Option<usize>,
    y_idx: Option<usize>,
    participant: String,
    stimulus: String,
    runs: SampleRuns,
}

impl VarjoDeserializer {
    pub fn new(
        header: &HeaderIndexMap,
        file_name: &str,
        user_input_setting: &str,
    ) -> Result<Self, GazeError> {
        let stimulus = match user_input_setting.trim() {
            "" => DEFAULT_STIMULUS.to_string(),
            name => name.to_string(),
        };
        Ok(Self {
            header: header.clone(),
            time_idx: header.require("Time", file_name)?,
            actor_idx: header.require("Actor Label", file_name)?,
            x_idx: header.get("Gaze X"),
            y_idx: header.get("Gaze Y"),
            participant: file_stem(file_name),
            stimulus,
            runs: SampleRuns::default(),
        })
    }
}

impl RowDeserializer for VarjoDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        check_row_width(row, &self.header)?;
        let time_raw = cell(row, self.time_idx);
        let time = parse_time(time_raw, "Time")?;
        let actor = cell(row, self.actor_idx);
        let aoi = if actor.is_empty() {
            Vec::new()
        } else {
            vec![actor.to_string()]
        };
        let sample = SingleDeserializerOutput {
            start: time_raw.to_string(),
            end: time_raw.to_string(),
            stimulus: self.stimulus.clone(),
            participant: self.participant.clone(),
            category: DWELL.to_string(),
            aoi: Some(aoi),
            coordinates: coordinates(
                optional_cell(row, self.x_idx),
                optional_cell(row, self.y_idx),
            ),
        };
        self.runs.push(sample, time)
    }

    fn finalize(&mut self) -> Vec<SingleDeserializerOutput> {
        self.runs.finish()
    }
}
