use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    deserializer::SingleDeserializerOutput,
    errors::GazeError,
    gaze::{GazeData, GazeWriter},
    ingest::FileMetadata,
    visibility::VisibilityIntervals,
};

/// One line of an exported dataset. Records refer to stimuli, participants
/// and AOIs by name, ids are assigned again when the file is loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum ExportRecord {
    Metadata(FileMetadata),
    /// Names in id order, so a reloaded dataset keeps its ids
    Catalog {
        stimuli: Vec<String>,
        participants: Vec<String>,
        categories: Vec<String>,
        has_aoi_data: bool,
    },
    Segment {
        stimulus: String,
        participant: String,
        category: String,
        start: f64,
        end: f64,
        aoi: Vec<String>,
        coordinates: Option<(f64, f64)>,
    },
    Aoi {
        stimulus: String,
        original_name: String,
        displayed_name: String,
        color: String,
    },
    AoiOrder {
        stimulus: String,
        order: Vec<String>,
    },
    Visibility {
        stimulus: String,
        participant: Option<String>,
        aoi: String,
        intervals: Vec<(f64, f64)>,
    },
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportedDataset {
    pub data: GazeData,
    pub metadata: Vec<FileMetadata>,
}

/// Flattens a dataset into records: metadata, catalog, segments, AOI info, AOI
/// order, visibility.
pub fn export_records(data: &GazeData, metadata: &[FileMetadata]) -> Vec<ExportRecord> {
    let mut records: Vec<ExportRecord> = metadata
        .iter()
        .cloned()
        .map(ExportRecord::Metadata)
        .collect();
    records.push(ExportRecord::Catalog {
        stimuli: data.stimuli.iter().cloned().collect(),
        participants: data.participants.iter().cloned().collect(),
        categories: data.categories.iter().cloned().collect(),
        has_aoi_data: data.has_aoi_data,
    });

    let name_of = |names: &indexmap::IndexSet<String>, id: usize| {
        names.get_index(id).cloned().unwrap_or_default()
    };
    for (stimulus_id, participant_id, segment) in data.iter_segments() {
        records.push(ExportRecord::Segment {
            stimulus: name_of(&data.stimuli, stimulus_id),
            participant: name_of(&data.participants, participant_id),
            category: name_of(&data.categories, segment.category),
            start: segment.start,
            end: segment.end,
            aoi: segment
                .aoi
                .iter()
                .filter_map(|&id| data.aois.aois(stimulus_id).get(id))
                .map(|info| info.original_name.clone())
                .collect(),
            coordinates: segment.coordinates,
        });
    }

    for (stimulus_id, stimulus) in data.stimuli.iter().enumerate() {
        let aois = data.aois.aois(stimulus_id);
        for info in aois {
            records.push(ExportRecord::Aoi {
                stimulus: stimulus.clone(),
                original_name: info.original_name.clone(),
                displayed_name: info.displayed_name.clone(),
                color: info.color.clone(),
            });
        }
        if data
            .aois
            .order_vector
            .get(stimulus_id)
            .is_some_and(|order| !order.is_empty())
        {
            records.push(ExportRecord::AoiOrder {
                stimulus: stimulus.clone(),
                order: data
                    .aois
                    .ordered(stimulus_id)
                    .into_iter()
                    .filter_map(|id| aois.get(id))
                    .map(|info| info.original_name.clone())
                    .collect(),
            });
        }
    }

    for (stimulus_id, participant_id, aoi_id, intervals) in data.aois.dynamic_visibility.entries() {
        records.push(ExportRecord::Visibility {
            stimulus: name_of(&data.stimuli, stimulus_id),
            participant: participant_id.map(|id| name_of(&data.participants, id)),
            aoi: data
                .aois
                .aois(stimulus_id)
                .get(aoi_id)
                .map(|info| info.original_name.clone())
                .unwrap_or_default(),
            intervals: intervals.as_slice().to_vec(),
        });
    }
    records
}

/// Rebuilds a dataset from records.
///
/// Names from the catalog and AOI records are registered before any segment is
/// replayed, so stimulus, participant, category and AOI ids match the exported
/// dataset. Without a catalog ids follow first sighting in the file.
pub fn import_records(
    records: impl IntoIterator<Item = ExportRecord>,
) -> Result<ExportedDataset, GazeError> {
    let records: Vec<ExportRecord> = records.into_iter().collect();
    let mut writer = GazeWriter::new();
    let mut has_aoi_data = false;
    for record in &records {
        if let ExportRecord::Catalog {
            stimuli,
            participants,
            categories,
            has_aoi_data: flag,
        } = record
        {
            writer.register_names(stimuli, participants, categories);
            has_aoi_data |= *flag;
        }
    }
    for record in &records {
        if let ExportRecord::Aoi {
            stimulus,
            original_name,
            ..
        } = record
        {
            writer.register_aoi(stimulus, original_name);
        }
    }

    let mut metadata = Vec::new();
    let mut rest = Vec::new();
    for record in records {
        match record {
            ExportRecord::Metadata(m) => metadata.push(m),
            ExportRecord::Catalog { .. } => {}
            ExportRecord::Segment {
                stimulus,
                participant,
                category,
                start,
                end,
                aoi,
                coordinates,
            } => writer.write(SingleDeserializerOutput {
                start: start.to_string(),
                end: end.to_string(),
                stimulus,
                participant,
                category,
                aoi: (!aoi.is_empty()).then_some(aoi),
                coordinates,
            })?,
            other => rest.push(other),
        }
    }

    let mut data = writer.finish();
    data.has_aoi_data |= has_aoi_data;
    for record in rest {
        match record {
            ExportRecord::Aoi {
                stimulus,
                original_name,
                displayed_name,
                color,
            } => {
                let stimulus_id = known_stimulus(&data, &stimulus)?;
                let aoi_id = data.aois.intern(stimulus_id, &original_name);
                data.aois.rename(stimulus_id, aoi_id, &displayed_name);
                if let Some(info) = data
                    .aois
                    .data
                    .get_mut(stimulus_id)
                    .and_then(|aois| aois.get_mut(aoi_id))
                {
                    info.color = color;
                }
            }
            ExportRecord::AoiOrder { stimulus, order } => {
                let stimulus_id = known_stimulus(&data, &stimulus)?;
                let ids = order
                    .iter()
                    .map(|name| {
                        data.aois
                            .aoi_id(stimulus_id, name)
                            .ok_or(GazeError::InvalidAoiOrder { stimulus_id })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                data.aois.set_order(stimulus_id, ids)?;
            }
            ExportRecord::Visibility {
                stimulus,
                participant,
                aoi,
                intervals,
            } => {
                let stimulus_id = known_stimulus(&data, &stimulus)?;
                let participant_id = match participant {
                    Some(name) => Some(data.participant_id(&name).ok_or_else(|| {
                        GazeError::InvalidUserInput {
                            field: "participant".to_string(),
                            reason: format!(
                                "exported visibility names unknown participant '{}'",
                                name
                            ),
                        }
                    })?),
                    None => None,
                };
                let aoi_id = data.aois.intern(stimulus_id, &aoi);
                let mut merged = VisibilityIntervals::default();
                for (start, end) in intervals {
                    merged.insert(start, end);
                }
                data.aois
                    .dynamic_visibility
                    .set(stimulus_id, participant_id, aoi_id, merged);
            }
            ExportRecord::Metadata(_)
            | ExportRecord::Catalog { .. }
            | ExportRecord::Segment { .. } => {}
        }
    }
    Ok(ExportedDataset { data, metadata })
}

fn known_stimulus(data: &GazeData, stimulus: &str) -> Result<usize, GazeError> {
    data.stimulus_id(stimulus)
        .ok_or_else(|| GazeError::InvalidUserInput {
            field: "stimulus".to_string(),
            reason: format!("exported record names unknown stimulus '{}'", stimulus),
        })
}

pub fn write_segments_jsonl(
    file: &Path,
    data: &GazeData,
    metadata: &[FileMetadata],
) -> Result<(), GazeError> {
    let records = export_records(data, metadata);
    serde_jsonlines::write_json_lines(file, &records)
        .map_err(|e| GazeError::WriterError { source: e })?;
    info!("Exported {} records to {:?}", records.len(), file);
    Ok(())
}

pub fn read_segments_jsonl(source_file: &Path) -> Result<ExportedDataset, GazeError> {
    let records = serde_jsonlines::json_lines(source_file)
        .map_err(|e| GazeError::ExportLoaderError { source: e })?
        .collect::<Result<Vec<ExportRecord>, std::io::Error>>()
        .map_err(|e| GazeError::ExportLoaderError { source: e })?;
    import_records(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(start: u32, end: u32, participant: &str, aoi: &[&str]) -> SingleDeserializerOutput {
        on("Kitchen", start, end, participant, aoi)
    }

    fn on(
        stimulus: &str,
        start: u32,
        end: u32,
        participant: &str,
        aoi: &[&str],
    ) -> SingleDeserializerOutput {
        SingleDeserializerOutput {
            start: start.to_string(),
            end: end.to_string(),
            stimulus: stimulus.to_string(),
            participant: participant.to_string(),
            category: "Fixation".to_string(),
            aoi: Some(aoi.iter().map(|a| a.to_string()).collect()),
            coordinates: Some((1.5, 2.0)),
        }
    }

    fn dataset() -> GazeData {
        let mut writer = GazeWriter::new();
        writer.write(output(0, 100, "P1", &["Sink"])).unwrap();
        writer.write(output(100, 150, "P1", &["Sink", "Oven"])).unwrap();
        writer.write(output(10, 40, "P2", &[])).unwrap();
        let mut data = writer.finish();
        data.aois.rename(0, 1, "Stove");
        data.aois.set_order(0, vec![1, 0]).unwrap();
        data.aois.dynamic_visibility.set(
            0,
            Some(1),
            0,
            VisibilityIntervals::from_breakpoints(&[0., 50., 60., 90.]),
        );
        data
    }

    #[test]
    fn test_records_are_name_based() {
        let records = export_records(&dataset(), &[]);
        assert!(records.contains(&ExportRecord::AoiOrder {
            stimulus: "Kitchen".to_string(),
            order: vec!["Oven".to_string(), "Sink".to_string()],
        }));
        assert!(records.contains(&ExportRecord::Visibility {
            stimulus: "Kitchen".to_string(),
            participant: Some("P2".to_string()),
            aoi: "Sink".to_string(),
            intervals: vec![(0., 50.), (60., 90.)],
        }));
    }

    #[test]
    fn test_import_restores_dataset() {
        let data = dataset();
        let restored = import_records(export_records(&data, &[])).unwrap().data;
        assert_eq!(restored.segment_count(), 3);
        assert_eq!(restored.aois.aois(0)[1].displayed_name, "Stove");
        assert_eq!(restored.aois.ordered(0), vec![1, 0]);
        assert_eq!(
            restored.aois.dynamic_visibility.intervals(0, 1, 0).unwrap().as_slice(),
            &[(0., 50.), (60., 90.)]
        );
        assert_eq!(restored.segments(0, 1)[0].aoi, Vec::<usize>::new());
    }

    #[test]
    fn test_import_keeps_first_seen_aoi_order() {
        let mut writer = GazeWriter::new();
        writer.write(output(0, 10, "P1", &["A"])).unwrap();
        writer.write(output(0, 10, "P2", &["B"])).unwrap();
        writer.write(output(10, 20, "P1", &["C"])).unwrap();
        let data = writer.finish();
        let names = |data: &GazeData| -> Vec<String> {
            data.aois
                .ordered(0)
                .into_iter()
                .map(|id| data.aois.aois(0)[id].original_name.clone())
                .collect()
        };
        assert_eq!(names(&data), vec!["A", "B", "C"]);

        let restored = import_records(export_records(&data, &[])).unwrap().data;
        assert_eq!(names(&restored), vec!["A", "B", "C"]);
        assert_eq!(restored.segments(0, 1)[0].aoi, vec![1]);
        assert_eq!(restored.segments(0, 0)[1].aoi, vec![2]);
    }

    #[test]
    fn test_import_keeps_participant_and_category_ids() {
        let mut writer = GazeWriter::new();
        writer.write(on("S1", 0, 10, "P1", &[])).unwrap();
        let mut saccade = on("S2", 0, 10, "P2", &[]);
        saccade.category = "Saccade".to_string();
        writer.write(saccade).unwrap();
        writer.write(on("S1", 10, 20, "P3", &[])).unwrap();
        let data = writer.finish();

        let restored = import_records(export_records(&data, &[])).unwrap().data;
        let in_order =
            |names: &indexmap::IndexSet<String>| names.iter().cloned().collect::<Vec<_>>();
        assert_eq!(in_order(&restored.participants), vec!["P1", "P2", "P3"]);
        assert_eq!(in_order(&restored.categories), vec!["Fixation", "Saccade"]);
        assert_eq!(in_order(&restored.stimuli), vec!["S1", "S2"]);
        assert_eq!(restored.participant_id("P2"), Some(1));
    }

    #[test]
    fn test_import_keeps_aoi_flag_without_hits() {
        let mut writer = GazeWriter::new();
        writer.write(output(0, 10, "P1", &[])).unwrap();
        let data = writer.finish();
        assert!(data.has_aoi_data);

        let restored = import_records(export_records(&data, &[])).unwrap().data;
        assert!(restored.has_aoi_data);
        assert_eq!(restored.segment_count(), 1);
    }

    #[test]
    fn test_unknown_stimulus_is_rejected() {
        let records = vec![ExportRecord::AoiOrder {
            stimulus: "Nowhere".to_string(),
            order: vec![],
        }];
        assert!(matches!(
            import_records(records),
            Err(GazeError::InvalidUserInput { .. })
        ));
    }
}
