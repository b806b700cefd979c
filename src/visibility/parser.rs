use log::debug;
use roxmltree::Node;

use crate::{errors::GazeError, gaze::GazeData};

use super::VisibilityIntervals;

const AOI_ELEMENT: &str = "DynamicAoi";
const KEY_FRAME_ELEMENT: &str = "KeyFrame";
const MS_PER_SECOND: f64 = 1000.;

/// Reads AOI keyframe exports into the visibility of a `GazeData`.
///
/// Handles the Tobii Pro Lab AOI export:
/// ```xml
/// <ArrayOfDynamicAoi>
///   <DynamicAoi>
///     <Name>Logo</Name>
///     <KeyFrames>
///       <KeyFrame><IsActive>true</IsActive><Seconds>0</Seconds></KeyFrame>
///       <KeyFrame><IsActive>false</IsActive><Seconds>2.5</Seconds></KeyFrame>
///     </KeyFrames>
///   </DynamicAoi>
/// </ArrayOfDynamicAoi>
/// ```
/// `Name`, `IsActive` and `Seconds` may also be attributes. Keyframe times are
/// seconds from stimulus onset and become milliseconds.
pub struct AoiVisibilityParser<'data> {
    data: &'data mut GazeData,
}

impl<'data> AoiVisibilityParser<'data> {
    pub fn new(data: &'data mut GazeData) -> Self {
        Self { data }
    }

    /// Adds the visibility defined in `xml_document` to a stimulus.
    ///
    /// With `participant_id` of `None` the definition applies to every
    /// participant, otherwise it overrides the shared one for that participant.
    /// The document is fully validated before anything is stored, so a
    /// failure leaves the dataset unchanged.
    pub fn add_vis_info(
        &mut self,
        stimulus_id: usize,
        participant_id: Option<usize>,
        xml_document: &str,
    ) -> Result<(), GazeError> {
        if stimulus_id >= self.data.stimuli.len() {
            return Err(GazeError::UnknownStimulus { stimulus_id });
        }
        if let Some(participant_id) = participant_id {
            if participant_id >= self.data.participants.len() {
                return Err(GazeError::UnknownParticipant { participant_id });
            }
        }

        let doc = roxmltree::Document::parse(xml_document)
            .map_err(|e| GazeError::XmlParseError { source: e })?;

        let mut parsed = Vec::new();
        for aoi in doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == AOI_ELEMENT)
        {
            let name = value_of(&aoi, "Name").ok_or_else(|| GazeError::MalformedAoiXml {
                reason: format!("{} without a Name", AOI_ELEMENT),
            })?;
            let key_frames: Vec<Node> = aoi
                .descendants()
                .filter(|n| n.is_element() && n.tag_name().name() == KEY_FRAME_ELEMENT)
                .collect();
            let breakpoints = self.process_key_frames(&key_frames, stimulus_id)?;
            parsed.push((name, breakpoints));
        }
        if parsed.is_empty() {
            return Err(GazeError::MalformedAoiXml {
                reason: format!("no {} elements found", AOI_ELEMENT),
            });
        }

        for (name, breakpoints) in parsed {
            debug!(
                "AOI '{}' on stimulus {} changes visibility {} times",
                name,
                stimulus_id,
                breakpoints.len()
            );
            let aoi_id = self.data.aois.intern(stimulus_id, &name);
            self.data.aois.dynamic_visibility.set(
                stimulus_id,
                participant_id,
                aoi_id,
                VisibilityIntervals::from_breakpoints(&breakpoints),
            );
        }
        Ok(())
    }

    /// Walks the keyframes of one AOI in document order and returns the times
    /// at which it turns visible and invisible, alternating, starting with
    /// visible. Keyframes that do not change the state are coalesced, and an
    /// AOI still visible after its last keyframe is closed at the stimulus end.
    /// An AOI without keyframes is visible from onset to the stimulus end.
    pub fn process_key_frames(
        &self,
        key_frames: &[Node],
        stimulus_id: usize,
    ) -> Result<Vec<f64>, GazeError> {
        let stimulus_end = self.data.stimulus_end(stimulus_id).unwrap_or(0.);
        if key_frames.is_empty() {
            return Ok(if stimulus_end > 0. {
                vec![0., stimulus_end]
            } else {
                Vec::new()
            });
        }

        let mut breakpoints: Vec<f64> = Vec::new();
        let mut visible = false;
        let mut last_time = f64::NEG_INFINITY;
        for (idx, key_frame) in key_frames.iter().enumerate() {
            let seconds = value_of(key_frame, "Seconds").ok_or_else(|| {
                GazeError::MalformedAoiXml {
                    reason: format!("keyframe {} has no Seconds", idx),
                }
            })?;
            let time = seconds
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite() && *t >= 0.)
                .map(|t| t * MS_PER_SECOND)
                .ok_or_else(|| GazeError::MalformedAoiXml {
                    reason: format!("keyframe {} has invalid Seconds '{}'", idx, seconds),
                })?;
            if time < last_time {
                return Err(GazeError::MalformedAoiXml {
                    reason: format!("keyframe {} goes back in time", idx),
                });
            }
            last_time = time;

            let is_active = match value_of(key_frame, "IsActive") {
                None => true,
                Some(flag) => parse_flag(&flag).ok_or_else(|| GazeError::MalformedAoiXml {
                    reason: format!("keyframe {} has invalid IsActive '{}'", idx, flag),
                })?,
            };
            if is_active != visible {
                toggle(&mut breakpoints, time);
                visible = is_active;
            }
        }
        if visible {
            toggle(&mut breakpoints, stimulus_end.max(last_time));
        }
        Ok(breakpoints)
    }
}

/// Records a state change; two changes at the same instant cancel out.
fn toggle(breakpoints: &mut Vec<f64>, time: f64) {
    if breakpoints.last() == Some(&time) {
        breakpoints.pop();
    } else {
        breakpoints.push(time);
    }
}

/// Attribute of the element or text of its child element with that name.
fn value_of(node: &Node, name: &str) -> Option<String> {
    if let Some(value) = node.attribute(name) {
        return Some(value.to_string());
    }
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{deserializer::SingleDeserializerOutput, gaze::GazeWriter};
    use proptest::prelude::*;

    fn dataset() -> GazeData {
        let mut writer = GazeWriter::new();
        for (stimulus, participant, end) in [
            ("Ad", "P1", "4000"),
            ("Ad", "P2", "5000"),
            ("Menu", "P1", "900"),
        ] {
            writer
                .write(SingleDeserializerOutput {
                    start: "0".to_string(),
                    end: end.to_string(),
                    stimulus: stimulus.to_string(),
                    participant: participant.to_string(),
                    category: "Fixation".to_string(),
                    aoi: Some(vec!["Logo".to_string()]),
                    coordinates: None,
                })
                .unwrap();
        }
        writer.finish()
    }

    fn key_frames_xml(frames: &[(&str, &str)]) -> String {
        let frames: String = frames
            .iter()
            .map(|(active, seconds)| {
                format!(
                    "<KeyFrame><IsActive>{}</IsActive><Seconds>{}</Seconds></KeyFrame>",
                    active, seconds
                )
            })
            .collect();
        format!(
            "<ArrayOfDynamicAoi><DynamicAoi><Name>Banner</Name><KeyFrames>{}</KeyFrames></DynamicAoi></ArrayOfDynamicAoi>",
            frames
        )
    }

    #[test]
    fn test_static_visibility_is_shared() {
        let mut data = dataset();
        let xml = key_frames_xml(&[("true", "0.5"), ("false", "1.5"), ("true", "3")]);
        AoiVisibilityParser::new(&mut data).add_vis_info(0, None, &xml).unwrap();

        let banner = data.aois.aoi_id(0, "Banner").unwrap();
        assert_eq!(banner, 1);
        for participant in [0, 1] {
            let intervals = data
                .aois
                .dynamic_visibility
                .intervals(0, participant, banner)
                .unwrap();
            // open interval closes at the latest segment end of the stimulus
            assert_eq!(intervals.as_slice(), &[(500., 1500.), (3000., 5000.)]);
        }
    }

    #[test]
    fn test_participant_definition_overrides_shared() {
        let mut data = dataset();
        let mut parser = AoiVisibilityParser::new(&mut data);
        parser
            .add_vis_info(0, None, &key_frames_xml(&[("true", "0")]))
            .unwrap();
        parser
            .add_vis_info(0, Some(1), &key_frames_xml(&[("true", "1"), ("false", "2")]))
            .unwrap();
        let visibility = &data.aois.dynamic_visibility;
        assert_eq!(visibility.intervals(0, 0, 1).unwrap().as_slice(), &[(0., 5000.)]);
        assert_eq!(visibility.intervals(0, 1, 1).unwrap().as_slice(), &[(1000., 2000.)]);
    }

    #[test]
    fn test_attribute_form_and_coalescing() {
        let mut data = dataset();
        let xml = r#"<Aois><DynamicAoi Name="Logo">
            <KeyFrame IsActive="true" Seconds="0"/>
            <KeyFrame IsActive="true" Seconds="0.2"/>
            <KeyFrame IsActive="false" Seconds="0.4"/>
            <KeyFrame IsActive="false" Seconds="0.6"/>
            <KeyFrame IsActive="true" Seconds="0.6"/>
            <KeyFrame IsActive="false" Seconds="0.8"/>
        </DynamicAoi></Aois>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let frames: Vec<Node> = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "KeyFrame")
            .collect();
        let breakpoints = AoiVisibilityParser::new(&mut data)
            .process_key_frames(&frames, 1)
            .unwrap();
        assert_eq!(breakpoints, vec![0., 400., 600., 800.]);
    }

    #[test]
    fn test_toggles_at_same_instant_cancel() {
        let mut data = dataset();
        let xml = key_frames_xml(&[
            ("true", "0"),
            ("false", "0.5"),
            ("true", "0.5"),
            ("false", "0.7"),
        ]);
        let doc = roxmltree::Document::parse(&xml).unwrap();
        let frames: Vec<Node> = doc
            .descendants()
            .filter(|n| n.tag_name().name() == "KeyFrame")
            .collect();
        let breakpoints = AoiVisibilityParser::new(&mut data)
            .process_key_frames(&frames, 1)
            .unwrap();
        assert_eq!(breakpoints, vec![0., 700.]);
    }

    #[test]
    fn test_missing_seconds_fails_without_changes() {
        let mut data = dataset();
        let xml = "<ArrayOfDynamicAoi><DynamicAoi><Name>Banner</Name><KeyFrames>\
            <KeyFrame><IsActive>true</IsActive><Seconds>0</Seconds></KeyFrame>\
            <KeyFrame><IsActive>false</IsActive></KeyFrame>\
            </KeyFrames></DynamicAoi></ArrayOfDynamicAoi>";
        let before = data.clone();
        let result = AoiVisibilityParser::new(&mut data).add_vis_info(0, None, xml);
        assert!(matches!(result, Err(GazeError::MalformedAoiXml { .. })));
        assert_eq!(data, before);
    }

    #[test]
    fn test_unknown_ids_and_broken_xml() {
        let mut data = dataset();
        let mut parser = AoiVisibilityParser::new(&mut data);
        let xml = key_frames_xml(&[("true", "0")]);
        assert!(matches!(
            parser.add_vis_info(7, None, &xml),
            Err(GazeError::UnknownStimulus { stimulus_id: 7 })
        ));
        assert!(matches!(
            parser.add_vis_info(0, Some(9), &xml),
            Err(GazeError::UnknownParticipant { participant_id: 9 })
        ));
        assert!(matches!(
            parser.add_vis_info(0, None, "<DynamicAoi>"),
            Err(GazeError::XmlParseError { .. })
        ));
        assert!(matches!(
            parser.add_vis_info(0, None, "<Empty/>"),
            Err(GazeError::MalformedAoiXml { .. })
        ));
    }

    #[test]
    fn test_key_frames_going_back_in_time() {
        let mut data = dataset();
        let xml = key_frames_xml(&[("true", "2"), ("false", "1")]);
        assert!(AoiVisibilityParser::new(&mut data)
            .add_vis_info(0, None, &xml)
            .is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_breakpoints_always_change_state(
            frames in prop::collection::vec((any::<bool>(), 0u32..20), 0..30)
        ) {
            let mut time = 0u32;
            let frames: Vec<(String, String)> = frames
                .into_iter()
                .map(|(active, step)| {
                    time += step;
                    (active.to_string(), format!("{}", time as f64 / 10.))
                })
                .collect();
            let refs: Vec<(&str, &str)> =
                frames.iter().map(|(a, s)| (a.as_str(), s.as_str())).collect();
            let xml = key_frames_xml(&refs);
            let doc = roxmltree::Document::parse(&xml).unwrap();
            let nodes: Vec<Node> = doc
                .descendants()
                .filter(|n| n.tag_name().name() == "KeyFrame")
                .collect();

            let mut data = dataset();
            let breakpoints = AoiVisibilityParser::new(&mut data)
                .process_key_frames(&nodes, 0)
                .unwrap();
            prop_assert_eq!(breakpoints.len() % 2, 0);
            for pair in breakpoints.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
