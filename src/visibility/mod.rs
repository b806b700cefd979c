// AOI visibility intervals and their sources

pub mod parser;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::gaze::GazeData;

pub use parser::AoiVisibilityParser;

/// Sorted, non-overlapping half-open intervals `[start, end)`.
///
/// Intervals that touch are merged, empty intervals are never stored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibilityIntervals(Vec<(f64, f64)>);

impl VisibilityIntervals {
    /// Pairs up alternating on/off breakpoints. A trailing unpaired value is dropped.
    pub fn from_breakpoints(breakpoints: &[f64]) -> Self {
        let mut intervals = Self::default();
        for pair in breakpoints.chunks_exact(2) {
            intervals.insert(pair[0], pair[1]);
        }
        intervals
    }

    pub fn insert(&mut self, start: f64, end: f64) {
        if !(start < end) {
            return;
        }
        let mut start = start;
        let mut end = end;
        // everything touching [start, end) is absorbed into it
        let first = self.0.partition_point(|&(_, e)| e < start);
        let mut last = first;
        while last < self.0.len() && self.0[last].0 <= end {
            start = start.min(self.0[last].0);
            end = end.max(self.0[last].1);
            last += 1;
        }
        self.0.drain(first..last);
        self.0.insert(first, (start, end));
    }

    pub fn as_slice(&self) -> &[(f64, f64)] {
        &self.0
    }

    pub fn breakpoints(&self) -> Vec<f64> {
        self.0.iter().flat_map(|&(s, e)| [s, e]).collect()
    }

    pub fn is_visible(&self, time: f64) -> bool {
        let idx = self.0.partition_point(|&(_, e)| e <= time);
        self.0.get(idx).is_some_and(|&(s, _)| s <= time)
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(s, e)| e - s).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Visibility of the AOIs of one stimulus.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StimulusVisibility {
    /// AOI id → intervals applying to every participant
    pub shared: BTreeMap<usize, VisibilityIntervals>,
    /// participant id → AOI id → intervals overriding `shared`
    pub participants: BTreeMap<usize, BTreeMap<usize, VisibilityIntervals>>,
}

/// Stimulus → participant → AOI → visibility intervals.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibilityAoiData {
    stimuli: BTreeMap<usize, StimulusVisibility>,
}

impl VisibilityAoiData {
    /// Intervals of an AOI as seen by a participant: the participant's own
    /// definition when present, else the one shared by all participants.
    pub fn intervals(
        &self,
        stimulus_id: usize,
        participant_id: usize,
        aoi_id: usize,
    ) -> Option<&VisibilityIntervals> {
        let stimulus = self.stimuli.get(&stimulus_id)?;
        stimulus
            .participants
            .get(&participant_id)
            .and_then(|aois| aois.get(&aoi_id))
            .or_else(|| stimulus.shared.get(&aoi_id))
    }

    pub fn stimulus(&self, stimulus_id: usize) -> Option<&StimulusVisibility> {
        self.stimuli.get(&stimulus_id)
    }

    pub(crate) fn set(
        &mut self,
        stimulus_id: usize,
        participant_id: Option<usize>,
        aoi_id: usize,
        intervals: VisibilityIntervals,
    ) {
        let stimulus = self.stimuli.entry(stimulus_id).or_default();
        let aois = match participant_id {
            Some(id) => stimulus.participants.entry(id).or_default(),
            None => &mut stimulus.shared,
        };
        aois.insert(aoi_id, intervals);
    }

    fn add(
        &mut self,
        stimulus_id: usize,
        participant_id: usize,
        aoi_id: usize,
        start: f64,
        end: f64,
    ) {
        self.stimuli
            .entry(stimulus_id)
            .or_default()
            .participants
            .entry(participant_id)
            .or_default()
            .entry(aoi_id)
            .or_default()
            .insert(start, end);
    }

    /// Every stored interval set as `(stimulus, participant or None for shared, aoi, intervals)`.
    pub fn entries(&self) -> Vec<(usize, Option<usize>, usize, &VisibilityIntervals)> {
        let mut entries = Vec::new();
        for (&stimulus_id, stimulus) in &self.stimuli {
            for (&aoi_id, intervals) in &stimulus.shared {
                entries.push((stimulus_id, None, aoi_id, intervals));
            }
            for (&participant_id, aois) in &stimulus.participants {
                for (&aoi_id, intervals) in aois {
                    entries.push((stimulus_id, Some(participant_id), aoi_id, intervals));
                }
            }
        }
        entries
    }

    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }
}

/// Visibility implied by the gaze itself: an AOI counts as visible to a
/// participant whenever one of their segments hit it.
pub fn observed_visibility(data: &GazeData) -> VisibilityAoiData {
    let mut visibility = VisibilityAoiData::default();
    for (stimulus_id, participant_id, segment) in data.iter_segments() {
        for &aoi_id in &segment.aoi {
            visibility.add(stimulus_id, participant_id, aoi_id, segment.start, segment.end);
        }
    }
    visibility
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{deserializer::SingleDeserializerOutput, gaze::GazeWriter};
    use proptest::prelude::*;

    #[test]
    fn test_insert_merges_overlapping_and_touching() {
        let mut intervals = VisibilityIntervals::default();
        intervals.insert(10., 20.);
        intervals.insert(30., 40.);
        intervals.insert(0., 5.);
        assert_eq!(intervals.as_slice(), &[(0., 5.), (10., 20.), (30., 40.)]);
        intervals.insert(20., 30.);
        assert_eq!(intervals.as_slice(), &[(0., 5.), (10., 40.)]);
        intervals.insert(3., 12.);
        assert_eq!(intervals.as_slice(), &[(0., 40.)]);
        intervals.insert(7., 7.);
        assert_eq!(intervals.as_slice(), &[(0., 40.)]);
    }

    #[test]
    fn test_half_open_visibility() {
        let intervals = VisibilityIntervals::from_breakpoints(&[10., 20., 30., 40.]);
        assert!(intervals.is_visible(10.));
        assert!(!intervals.is_visible(20.));
        assert!(intervals.is_visible(39.9));
        assert!(!intervals.is_visible(5.));
        assert_eq!(intervals.total(), 20.);
    }

    #[test]
    fn test_participant_override_falls_back_to_shared() {
        let mut visibility = VisibilityAoiData::default();
        visibility.set(0, None, 0, VisibilityIntervals::from_breakpoints(&[0., 10.]));
        visibility.set(0, Some(1), 0, VisibilityIntervals::from_breakpoints(&[5., 6.]));
        assert_eq!(visibility.intervals(0, 0, 0).unwrap().as_slice(), &[(0., 10.)]);
        assert_eq!(visibility.intervals(0, 1, 0).unwrap().as_slice(), &[(5., 6.)]);
        assert!(visibility.intervals(0, 1, 3).is_none());
        assert_eq!(visibility.entries().len(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_observed_visibility_never_overlaps(
            events in prop::collection::vec(
                (0u8..3, 0u32..500, 1u32..80, prop::collection::vec(0u8..4, 0..3)),
                1..80,
            )
        ) {
            let mut outputs: Vec<SingleDeserializerOutput> = events
                .iter()
                .map(|(p, start, len, aois)| SingleDeserializerOutput {
                    start: start.to_string(),
                    end: (start + len).to_string(),
                    stimulus: "S".to_string(),
                    participant: format!("P{}", p),
                    category: "Fixation".to_string(),
                    aoi: Some(aois.iter().map(|a| format!("A{}", a)).collect()),
                    coordinates: None,
                })
                .collect();
            outputs.sort_by_key(|o| o.start.parse::<u32>().unwrap_or(0));

            let mut writer = GazeWriter::new();
            for output in outputs {
                writer.write(output).unwrap();
            }
            let data = writer.finish();
            let visibility = observed_visibility(&data);
            for (_, _, _, intervals) in visibility.entries() {
                for pair in intervals.as_slice().windows(2) {
                    prop_assert!(pair[0].1 < pair[1].0);
                }
                for &(s, e) in intervals.as_slice() {
                    prop_assert!(s < e);
                }
            }
        }
    }
}
