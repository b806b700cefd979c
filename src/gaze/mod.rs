// Normalized gaze dataset and the writer that builds it

pub mod aoi;

use indexmap::IndexSet;
use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    deserializer::{SingleDeserializerOutput, parse_number},
    errors::GazeError,
};

pub use aoi::{AoiData, AoiInfo};

/// One continuous gaze event of a participant on a stimulus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub category: usize,
    /// AOI ids within the segment's stimulus, empty when nothing was hit
    pub aoi: Vec<usize>,
    pub coordinates: Option<(f64, f64)>,
}

/// Stimulus → participant → segments, with ids assigned in first-seen order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GazeData {
    pub stimuli: IndexSet<String>,
    pub participants: IndexSet<String>,
    pub categories: IndexSet<String>,
    pub aois: AoiData,
    /// Whether any source carried AOI information
    pub has_aoi_data: bool,
    segments: Vec<Vec<Vec<Segment>>>,
}

impl GazeData {
    pub fn stimulus_id(&self, name: &str) -> Option<usize> {
        self.stimuli.get_index_of(name)
    }

    pub fn participant_id(&self, name: &str) -> Option<usize> {
        self.participants.get_index_of(name)
    }

    pub fn stimulus_name(&self, stimulus_id: usize) -> Option<&str> {
        self.stimuli.get_index(stimulus_id).map(String::as_str)
    }

    pub fn participant_name(&self, participant_id: usize) -> Option<&str> {
        self.participants.get_index(participant_id).map(String::as_str)
    }

    pub fn category_name(&self, category_id: usize) -> Option<&str> {
        self.categories.get_index(category_id).map(String::as_str)
    }

    /// Segments in file order; empty when the participant never saw the stimulus.
    pub fn segments(&self, stimulus_id: usize, participant_id: usize) -> &[Segment] {
        self.segments
            .get(stimulus_id)
            .and_then(|p| p.get(participant_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Participants with at least one segment on the stimulus.
    pub fn participants_of(&self, stimulus_id: usize) -> Vec<usize> {
        self.segments
            .get(stimulus_id)
            .map(|participants| {
                participants
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !s.is_empty())
                    .map(|(id, _)| id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Latest segment end on the stimulus over all participants.
    pub fn stimulus_end(&self, stimulus_id: usize) -> Option<f64> {
        self.segments
            .get(stimulus_id)?
            .iter()
            .flatten()
            .map(|s| s.end)
            .reduce(f64::max)
    }

    pub fn segment_count(&self) -> usize {
        self.segments.iter().flatten().map(Vec::len).sum()
    }

    /// All segments as `(stimulus_id, participant_id, segment)`.
    pub fn iter_segments(&self) -> impl Iterator<Item = (usize, usize, &Segment)> {
        self.segments.iter().enumerate().flat_map(|(stimulus_id, participants)| {
            participants
                .iter()
                .enumerate()
                .flat_map(move |(participant_id, segments)| {
                    segments.iter().map(move |s| (stimulus_id, participant_id, s))
                })
        })
    }
}

/// Accumulates deserializer output into a `GazeData`.
///
/// Outputs must be written in file order: segments are appended, never sorted.
#[derive(Debug, Default)]
pub struct GazeWriter {
    data: GazeData,
}

impl GazeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, output: SingleDeserializerOutput) -> Result<(), GazeError> {
        let start = parse_bound(&output.start, "start")?;
        let end = parse_bound(&output.end, "end")?;
        if start > end {
            return Err(GazeError::InvalidSegment {
                reason: format!("segment ends ({}) before it starts ({})", end, start),
            });
        }
        if output.stimulus.is_empty() || output.participant.is_empty() {
            return Err(GazeError::InvalidSegment {
                reason: "segment without stimulus or participant".to_string(),
            });
        }

        let stimulus_id = self.stimulus_entry(output.stimulus);
        let data = &mut self.data;
        let (participant_id, _) = data.participants.insert_full(output.participant);
        let (category, _) = data.categories.insert_full(output.category);

        let aoi = match output.aoi {
            Some(names) => {
                data.has_aoi_data = true;
                names
                    .iter()
                    .map(|name| data.aois.intern(stimulus_id, name))
                    .collect()
            }
            None => Vec::new(),
        };

        let participants = &mut data.segments[stimulus_id];
        if participants.len() <= participant_id {
            participants.resize_with(participant_id + 1, Vec::new);
        }
        participants[participant_id].push(Segment {
            start,
            end,
            category,
            aoi,
            coordinates: output.coordinates,
        });
        Ok(())
    }

    fn stimulus_entry(&mut self, name: String) -> usize {
        let (stimulus_id, new_stimulus) = self.data.stimuli.insert_full(name);
        if new_stimulus {
            trace!("new stimulus {}", stimulus_id);
            self.data.segments.push(Vec::new());
            self.data.aois.ensure_stimulus(stimulus_id);
        }
        stimulus_id
    }

    /// Assigns ids ahead of any segment, so a reloaded dataset keeps the ids it
    /// was exported with. Names already seen keep their id.
    pub(crate) fn register_names(
        &mut self,
        stimuli: &[String],
        participants: &[String],
        categories: &[String],
    ) {
        for stimulus in stimuli.iter().filter(|s| !s.is_empty()) {
            self.stimulus_entry(stimulus.clone());
        }
        for participant in participants.iter().filter(|p| !p.is_empty()) {
            self.data.participants.insert(participant.clone());
        }
        for category in categories {
            self.data.categories.insert(category.clone());
        }
    }

    /// Interns an AOI of a stimulus the writer already knows.
    pub(crate) fn register_aoi(&mut self, stimulus: &str, name: &str) -> Option<usize> {
        let stimulus_id = self.data.stimulus_id(stimulus)?;
        Some(self.data.aois.intern(stimulus_id, name))
    }

    pub fn data(&self) -> &GazeData {
        &self.data
    }

    pub fn finish(self) -> GazeData {
        self.data
    }
}

fn parse_bound(value: &str, field: &str) -> Result<f64, GazeError> {
    parse_number(value).ok_or_else(|| GazeError::InvalidSegment {
        reason: format!("{} '{}' is not a finite number", field, value),
    })
}
