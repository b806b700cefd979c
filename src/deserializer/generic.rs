use crate::errors::GazeError;

use super::{
    HeaderIndexMap, RowDeserializer, RowRejection, SampleRuns, SingleDeserializerOutput, cell,
    check_row_width, check_span, optional_cell, parse_time, split_aoi_cell,
};

const DEFAULT_CATEGORY: &str = "Fixation";

/// Time-sampled GazePlotter CSV: `Time,Participant,Stimulus,AOI[,Category]`.
/// Multiple AOIs in one cell are separated by `;`.
pub struct CsvDeserializer {
    header: HeaderIndexMap,
    time_idx: usize,
    participant_idx: usize,
    stimulus_idx: usize,
    aoi_idx: usize,
    category_idx: Option<usize>,
    runs: SampleRuns,
}

impl CsvDeserializer {
    pub fn new(header: &HeaderIndexMap, file_name: &str) -> Result<Self, GazeError> {
        Ok(Self {
            header: header.clone(),
            time_idx: header.require("Time", file_name)?,
            participant_idx: header.require("Participant", file_name)?,
            stimulus_idx: header.require("Stimulus", file_name)?,
            aoi_idx: header.require("AOI", file_name)?,
            category_idx: header.get("Category"),
            runs: SampleRuns::default(),
        })
    }
}

impl RowDeserializer for CsvDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        check_row_width(row, &self.header)?;
        let time_raw = cell(row, self.time_idx);
        let time = parse_time(time_raw, "Time")?;
        let sample = SingleDeserializerOutput {
            start: time_raw.to_string(),
            end: time_raw.to_string(),
            stimulus: required(row, self.stimulus_idx, "Stimulus")?,
            participant: required(row, self.participant_idx, "Participant")?,
            category: optional_cell(row, self.category_idx)
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            aoi: Some(split_aoi_cell(cell(row, self.aoi_idx))),
            coordinates: None,
        };
        self.runs.push(sample, time)
    }

    fn finalize(&mut self) -> Vec<SingleDeserializerOutput> {
        self.runs.finish()
    }
}

/// Segmented GazePlotter CSV: `From,To,Participant,Stimulus,AOI,Category`,
/// one event per row.
pub struct CsvSegmentedDeserializer {
    header: HeaderIndexMap,
    from_idx: usize,
    to_idx: usize,
    participant_idx: usize,
    stimulus_idx: usize,
    aoi_idx: usize,
    category_idx: usize,
}

impl CsvSegmentedDeserializer {
    pub fn new(header: &HeaderIndexMap, file_name: &str) -> Result<Self, GazeError> {
        Ok(Self {
            header: header.clone(),
            from_idx: header.require("From", file_name)?,
            to_idx: header.require("To", file_name)?,
            participant_idx: header.require("Participant", file_name)?,
            stimulus_idx: header.require("Stimulus", file_name)?,
            aoi_idx: header.require("AOI", file_name)?,
            category_idx: header.require("Category", file_name)?,
        })
    }
}

impl RowDeserializer for CsvSegmentedDeserializer {
    fn deserialize_row(
        &mut self,
        row: &[&str],
    ) -> Result<Vec<SingleDeserializerOutput>, RowRejection> {
        check_row_width(row, &self.header)?;
        let from_raw = cell(row, self.from_idx);
        let to_raw = cell(row, self.to_idx);
        check_span(parse_time(from_raw, "From")?, parse_time(to_raw, "To")?)?;
        Ok(vec![SingleDeserializerOutput {
            start: from_raw.to_string(),
            end: to_raw.to_string(),
            stimulus: required(row, self.stimulus_idx, "Stimulus")?,
            participant: required(row, self.participant_idx, "Participant")?,
            category: optional_cell(row, Some(self.category_idx))
                .unwrap_or(DEFAULT_CATEGORY)
                .to_string(),
            aoi: Some(split_aoi_cell(cell(row, self.aoi_idx))),
            coordinates: None,
        }])
    }
}

fn required(row: &[&str], idx: usize, field: &str) -> Result<String, RowRejection> {
    match cell(row, idx) {
        "" => Err(RowRejection::Malformed(format!("{} is empty", field))),
        value => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampled_csv_runs() {
        let header = HeaderIndexMap::from_row(&["Time", "Participant", "Stimulus", "AOI"]);
        let mut d = CsvDeserializer::new(&header, "data.csv").unwrap();
        assert!(d.deserialize_row(&["0", "P1", "S1", "A;B"]).unwrap().is_empty());
        assert!(d.deserialize_row(&["5", "P1", "S1", "A;B"]).unwrap().is_empty());
        let closed = d.deserialize_row(&["9", "P2", "S1", "A"]).unwrap();
        // a new participant does not extend the previous run
        assert_eq!(closed[0].end, "5");
        assert_eq!(
            closed[0].aoi,
            Some(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(closed[0].category, "Fixation");
        assert_eq!(d.finalize().len(), 1);
    }

    #[test]
    fn test_empty_participant_is_malformed() {
        let header = HeaderIndexMap::from_row(&["Time", "Participant", "Stimulus", "AOI"]);
        let mut d = CsvDeserializer::new(&header, "data.csv").unwrap();
        assert!(matches!(
            d.deserialize_row(&["0", "", "S1", "A"]),
            Err(RowRejection::Malformed(_))
        ));
    }

    #[test]
    fn test_segmented_csv() {
        let header = HeaderIndexMap::from_row(&[
            "From",
            "To",
            "Participant",
            "Stimulus",
            "AOI",
            "Category",
        ]);
        let mut d = CsvSegmentedDeserializer::new(&header, "seg.csv").unwrap();
        let out = d
            .deserialize_row(&["0.25", "1.5", "P1", "S1", "", "Saccade"])
            .unwrap();
        assert_eq!(out[0].start, "0.25");
        assert_eq!(out[0].aoi, Some(vec![]));
        assert_eq!(out[0].category, "Saccade");
        assert!(matches!(
            d.deserialize_row(&["2", "1", "P1", "S1", "", "Saccade"]),
            Err(RowRejection::Malformed(_))
        ));
    }
}
