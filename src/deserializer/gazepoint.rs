use crate::errors::GazeError;

use super::{
    HeaderIndexMap, RowDeserializer, RowRejection, SingleDeserializerOutput, cell, check_span,
    check_row_width, coordinates, file_stem, format_time, optional_cell, parse_time, push_unique,
};

const FIXATION: &str = "Fixation";

/// GazePoint Analysis fixation export.
///
/// GazePoint repeats a fixation on every sample while it lasts, with a
/// growing `FPOGD`. Rows sharing `FPOGID` are folded into one event from
/// `FPOGS` to `FPOGS + FPOGD` (seconds). Coordinates are the normalized
/// fixation point. Participant is the user input when given, else the `USER`
/// column, else the file stem without its `_fixations` suffix.
pub struct GazePointDeserializer {
    header: HeaderIndexMap,
    media_idx: usize,
    start_idx: usize,
    duration_idx: usize,
    fixation_id_idx: usize,
    valid_idx: Option<usize>,
    user_idx: Option<usize>,
    aoi_idx: Option<usize>,
    x_idx: Option<usize>,
    y_idx: Option<usize>,
    participant_override: Option<String>,
    fallback_participant: String,
    open: Option<OpenFixation>,
}

struct OpenFixation {
    fixation_id: String,
    start: f64,
    end: f64,
    output: SingleDeserializerOutput,
}

impl GazePointDeserializer {
    pub fn new(
        header: &HeaderIndexMap,
        file_name: &str,
        user_input_setting: &str,
    ) -> Result<Self, GazeError> {
        let stem = file_stem(file_name);
        let fallback_participant = stem
            .strip_suffix("_fixations")
            .or_else(|| stem.strip_suffix("_all_gaze"))
            .unwrap_or(&stem)
            .to_string();
        let participant_override = Some(user_input_setting.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        Ok(Self {
            header: header.clone(),
            media_idx: header.require("MEDIA_NAME", file_name)?,
            start_idx: header.require("FPOGS", file_name)?,
            duration_idx: header.require("FPOGD", file_name)?,
            fixation_id_idx: header.require("FPOGID", file_name)?,
            valid_idx: header.get("FPOGV"),
            user_idx: header.get("USER"),
            aoi_idx: header.get("AOI"),
            x_idx: header.get("FPOGX"),
            y_idx: header.get("FPOGY"),
            participant_override,
            fallback_participant,
            open: None,
        })
    }

    fn participant(&self, row: &[&str]) -> String {
        self.participant_override
            .clone()
            .or_else(|| optional_cell(row, self.user_idx).map(str::to_string))
            .unwrap_or_else(|| self.fallback_participant.clone())
    }

    fn close(fixation: OpenFixation) -> SingleDeserializerOutput {
        let mut output = fixation.output;
        output.start = format_time(fixation.start);
        output.end = format_time(fixation.end);
        output
    }
}

impl RowDeserializer for GazePointDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        check_row_width(row, &self.header)?;
        if optional_cell(row, self.valid_idx) == Some("0") {
            return Err(RowRejection::Ignored("fixation flagged invalid".to_string()));
        }
        let media = cell(row, self.media_idx);
        if media.is_empty() {
            return Err(RowRejection::Ignored("sample outside of media".to_string()));
        }
        let start = parse_time(cell(row, self.start_idx), "FPOGS")?;
        let duration = parse_time(cell(row, self.duration_idx), "FPOGD")?;
        let end = start + duration;
        check_span(start, end)?;

        let fixation_id = cell(row, self.fixation_id_idx).to_string();
        let participant = self.participant(row);
        let aoi = optional_cell(row, self.aoi_idx);

        if let Some(open) = self.open.as_mut() {
            if open.fixation_id == fixation_id
                && open.output.stimulus == media
                && open.output.participant == participant
            {
                open.end = open.end.max(end);
                if let (Some(aois), Some(hit)) = (open.output.aoi.as_mut(), aoi) {
                    push_unique(aois, hit);
                }
                return Ok(Vec::new());
            }
        }

        let output = SingleDeserializerOutput {
            start: String::new(),
            end: String::new(),
            stimulus: media.to_string(),
            participant,
            category: FIXATION.to_string(),
            aoi: self
                .aoi_idx
                .map(|_| aoi.map(|a| vec![a.to_string()]).unwrap_or_default()),
            coordinates: coordinates(
                optional_cell(row, self.x_idx),
                optional_cell(row, self.y_idx),
            ),
        };
        let closed = self.open.replace(OpenFixation {
            fixation_id,
            start,
            end,
            output,
        });
        Ok(closed.map(Self::close).into_iter().collect())
    }

    fn finalize(&mut self) -> Vec<SingleDeserializerOutput> {
        self.open.take().map(Self::close).into_iter().collect()
    }
}
