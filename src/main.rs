use std::{
    fs,
    path::{Path, PathBuf},
    process,
    sync::atomic::Ordering,
};

use clap::{Parser, Subcommand, arg};
use gazeplotter::{
    AoiVisibilityInput, AppConfig, EyeFileType, GazeData, GazeError, InputFile, ParseRequest,
    ParseWorker, PlotAxisBreaks, SettingsOverride, Workspace,
    export::{read_segments_jsonl, write_segments_jsonl},
    format::detect,
    ingest::ProgressEvent,
    visibility::observed_visibility,
};
use log::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Parse eye-tracker exports into one dataset and print a summary
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Skip detection and parse every file as this format
        #[arg(long)]
        file_type: Option<EyeFileType>,

        #[arg(long)]
        column_delimiter: Option<String>,

        #[arg(long)]
        row_delimiter: Option<String>,

        /// Zero based row holding the column names
        #[arg(long)]
        header_row: Option<usize>,

        /// Format specific value: Tobii eye movement types, GazePoint participant or Varjo stimulus
        #[arg(long)]
        user_input: Option<String>,

        /// AOI keyframe XML as STIMULUS[:PARTICIPANT]=FILE
        #[arg(long)]
        aoi: Vec<String>,

        /// Write the parsed dataset as JSON lines
        #[arg(short, long)]
        export: Option<PathBuf>,
    },
    /// Print the detected format of each file
    Detect {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print nice axis breaks for a time extent
    Axis {
        #[arg(short, long)]
        extent: f64,

        #[arg(short, long)]
        steps: Option<usize>,
    },
    /// Print the summary of a previously exported dataset
    Load {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn load_config() -> AppConfig {
    match AppConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => AppConfig::default(),
        Err(e) => {
            warn!("Ignoring config file: {}", e);
            AppConfig::default()
        }
    }
}

fn parse_aoi_arg(arg: &str) -> Result<AoiVisibilityInput, GazeError> {
    let invalid = |reason: &str| GazeError::InvalidUserInput {
        field: "aoi".to_string(),
        reason: format!("'{}' {}", arg, reason),
    };
    let (target, file) = arg
        .split_once('=')
        .ok_or_else(|| invalid("is not STIMULUS[:PARTICIPANT]=FILE"))?;
    let (stimulus, participant) = match target.split_once(':') {
        Some((stimulus, participant)) => (stimulus, Some(participant.to_string())),
        None => (target, None),
    };
    if stimulus.is_empty() || file.is_empty() {
        return Err(invalid("needs a stimulus and a file"));
    }
    let xml = fs::read_to_string(file).map_err(|e| GazeError::InputFileError {
        path: file.to_string(),
        source: e,
    })?;
    Ok(AoiVisibilityInput {
        stimulus: stimulus.to_string(),
        participant,
        xml,
    })
}

fn parse(
    files: &[PathBuf],
    overrides: SettingsOverride,
    aoi: &[String],
    export: Option<&Path>,
) -> Result<(), GazeError> {
    let config = load_config();
    let request = ParseRequest {
        files: files
            .iter()
            .map(|f| InputFile::from_path(f))
            .collect::<Result<Vec<_>, _>>()?,
        visibility: aoi
            .iter()
            .map(|a| parse_aoi_arg(a))
            .collect::<Result<Vec<_>, _>>()?,
        overrides,
    };

    let worker = ParseWorker::spawn(request, &config);
    let cancel = worker.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || {
        println!("Cancelling...");
        cancel.store(true, Ordering::Relaxed);
    }) {
        warn!("Could not set Ctrl-C handler: {}", e);
    }

    let outcome = worker.wait(|event| match event {
        ProgressEvent::RowsRead { file_name, rows } => debug!("{}: {} rows read", file_name, rows),
        ProgressEvent::FileParsed(report) => info!(
            "{}: {} rows, {} segments, {} skipped",
            report.file_name, report.rows, report.segments, report.skipped_rows
        ),
    })?;

    let mut workspace = Workspace::new();
    let report = workspace.load(outcome);
    println!("Status: {:?}", report.status);
    for file in &report.files {
        println!(
            "  {} ({}): {} rows, {} segments, {} skipped, {} ignored",
            file.file_name,
            file.file_type,
            file.rows,
            file.segments,
            file.skipped_rows,
            file.ignored_rows
        );
    }
    for failure in &report.visibility_failures {
        println!(
            "  AOI visibility for {}{} not applied: {}",
            failure.stimulus,
            failure
                .participant
                .as_ref()
                .map(|p| format!(":{}", p))
                .unwrap_or_default(),
            failure.reason
        );
    }

    if let Some(data) = workspace.data() {
        print_summary(&data, config.axis_steps);
        if let Some(export) = export {
            write_segments_jsonl(export, &data, workspace.metadata())?;
            println!("Exported dataset to {:?}", export);
        }
    }
    workspace.clear();
    Ok(())
}

fn print_summary(data: &GazeData, axis_steps: usize) {
    let visibility = if data.aois.dynamic_visibility.is_empty() {
        observed_visibility(data)
    } else {
        data.aois.dynamic_visibility.clone()
    };
    for (stimulus_id, stimulus) in data.stimuli.iter().enumerate() {
        let participants = data.participants_of(stimulus_id);
        let segments: usize = participants
            .iter()
            .map(|&p| data.segments(stimulus_id, p).len())
            .sum();
        let end = data.stimulus_end(stimulus_id).unwrap_or(0.);
        println!(
            "{}: {} participants, {} segments, {} ms",
            stimulus,
            participants.len(),
            segments,
            end
        );
        println!("  axis: {:?}", PlotAxisBreaks::new(end, axis_steps).breaks);
        let aois = data.aois.aois(stimulus_id);
        for aoi_id in data.aois.ordered(stimulus_id) {
            let Some(info) = aois.get(aoi_id) else {
                continue;
            };
            let visible: f64 = participants
                .iter()
                .filter_map(|&p| visibility.intervals(stimulus_id, p, aoi_id))
                .map(|intervals| intervals.total())
                .sum();
            println!(
                "  {} ({}): visible {} ms over {} participants",
                info.displayed_name,
                info.color,
                visible,
                participants.len()
            );
        }
    }
}

fn detect_files(files: &[PathBuf]) -> Result<(), GazeError> {
    for path in files {
        let file = InputFile::from_path(path)?;
        let file_type = detect(&file.name, &String::from_utf8_lossy(&file.content));
        println!("{}: {}", file.name, file_type);
    }
    Ok(())
}

fn load(input: &Path) -> Result<(), GazeError> {
    if !input.exists() {
        return Err(GazeError::InvalidUserInput {
            field: "input".to_string(),
            reason: format!("{:?} does not exist", input),
        });
    }
    let exported = read_segments_jsonl(input)?;
    for metadata in &exported.metadata {
        println!(
            "Parsed {} on {} in {:.3}s",
            metadata.file_names.join(", "),
            metadata.parse_date,
            metadata.parse_duration
        );
    }
    print_summary(&exported.data, load_config().axis_steps);
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    let result = match &cli.command {
        Commands::Parse {
            files,
            file_type,
            column_delimiter,
            row_delimiter,
            header_row,
            user_input,
            aoi,
            export,
        } => parse(
            files,
            SettingsOverride {
                file_type: *file_type,
                row_delimiter: row_delimiter.clone(),
                column_delimiter: column_delimiter.clone(),
                header_row_id: *header_row,
                user_input_setting: user_input.clone(),
            },
            aoi,
            export.as_deref(),
        ),
        Commands::Detect { files } => detect_files(files),
        Commands::Axis { extent, steps } => {
            let steps = steps.unwrap_or_else(|| load_config().axis_steps);
            let axis = PlotAxisBreaks::new(*extent, steps);
            println!("step {}: {:?}", axis.step, axis.breaks);
            Ok(())
        }
        Commands::Load { input } => load(input),
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
