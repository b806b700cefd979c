// Library interface for gazeplotter
// This allows integration tests and benches to access internal modules

pub mod axis;
pub mod config;
pub mod deserializer;
pub mod errors;
pub mod export;
pub mod format;
pub mod gaze;
pub mod ingest;
pub mod store;
pub mod visibility;
pub mod worker;
pub mod workspace;

// Re-export commonly used types
pub use axis::PlotAxisBreaks;
pub use config::AppConfig;
pub use errors::GazeError;
pub use format::{EyeFileType, EyeSettingsType, SettingsOverride};
pub use gaze::{GazeData, GazeWriter, Segment};
pub use ingest::{
    AoiVisibilityInput, FileMetadata, IngestOptions, IngestionOutcome, IngestionReport,
    IngestionStatus, InputFile, ingest,
};
pub use visibility::{AoiVisibilityParser, VisibilityAoiData, VisibilityIntervals};
pub use worker::{ParseRequest, ParseWorker, WorkerMessage};
pub use workspace::Workspace;
