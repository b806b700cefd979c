use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gazeplotter::{
    GazeWriter, IngestOptions, InputFile, PlotAxisBreaks, deserializer::SingleDeserializerOutput,
    ingest, ingest::ProgressEvent, visibility::observed_visibility,
};
use std::{fmt::Write, time::Duration};

const TOBII_HEADER: &str = "Recording timestamp\tParticipant name\tPresented Stimulus name\tEye movement type\tEye movement type index\tFixation point X\tFixation point Y\tAOI hit [Kitchen - Sink]\tAOI hit [Kitchen - Oven]\n";

fn create_tobii_file(participant: usize, samples: usize) -> InputFile {
    let mut content = String::from(TOBII_HEADER);
    for sample in 0..samples {
        let event = sample / 12;
        let movement = if event % 3 == 2 { "Saccade" } else { "Fixation" };
        let sink = (event % 2 == 0) as u8;
        let _ = writeln!(
            content,
            "{}\tP{:02}\tKitchen\t{}\t{}\t{}\t{}\t{}\t{}",
            sample * 8,
            participant,
            movement,
            event,
            400 + event % 500,
            300 + event % 200,
            sink,
            1 - sink
        );
    }
    InputFile::new(format!("p{:02}.tsv", participant), content)
}

fn create_segments(count: usize) -> Vec<SingleDeserializerOutput> {
    (0..count)
        .map(|i| SingleDeserializerOutput {
            start: (i * 100).to_string(),
            end: (i * 100 + 80).to_string(),
            stimulus: format!("S{}", i % 4),
            participant: format!("P{}", i % 20),
            category: "Fixation".to_string(),
            aoi: Some(vec![format!("A{}", i % 7)]),
            coordinates: Some((i as f64 % 1920., i as f64 % 1080.)),
        })
        .collect()
}

fn quiet(_: ProgressEvent) {}

fn bench_ingestion(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingestion");

    let single = vec![create_tobii_file(1, 10_000)];
    group.bench_function("tobii_10000_samples", |b| {
        b.iter(|| black_box(ingest(&single, &[], &IngestOptions::default(), &quiet).unwrap()));
    });

    let batch: Vec<InputFile> = (0..8).map(|p| create_tobii_file(p, 5_000)).collect();
    group.bench_function("tobii_batch_sequential", |b| {
        b.iter(|| black_box(ingest(&batch, &[], &IngestOptions::default(), &quiet).unwrap()));
    });

    let parallel = IngestOptions {
        parallel: true,
        ..Default::default()
    };
    group.bench_function("tobii_batch_parallel", |b| {
        b.iter(|| black_box(ingest(&batch, &[], &parallel, &quiet).unwrap()));
    });

    group.finish();
}

fn bench_gaze_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaze_writer");

    let segments = create_segments(10_000);
    group.bench_function("write_10000_segments", |b| {
        b.iter(|| {
            let mut writer = GazeWriter::new();
            for segment in segments.iter().cloned() {
                writer.write(segment).unwrap();
            }
            black_box(writer.finish())
        });
    });

    let mut writer = GazeWriter::new();
    for segment in segments {
        writer.write(segment).unwrap();
    }
    let data = writer.finish();
    group.bench_function("observed_visibility", |b| {
        b.iter(|| black_box(observed_visibility(&data)));
    });

    group.finish();
}

fn bench_axis(c: &mut Criterion) {
    c.bench_function("plot_axis_breaks", |b| {
        b.iter(|| black_box(PlotAxisBreaks::new(black_box(73_250.), black_box(7))));
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(50);
    targets = bench_ingestion, bench_gaze_writer, bench_axis
}
criterion_main!(benches);
