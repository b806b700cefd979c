// Read-only dataset and batch metadata handed out after ingestion

use std::sync::Arc;

use log::info;

use crate::{
    gaze::GazeData,
    ingest::{FileMetadata, IngestionOutcome, IngestionReport},
    store::{Store, SubscriptionId},
};

/// Holds the completed dataset and one metadata record per ingestion batch.
///
/// Created at application start and passed explicitly to whoever needs it.
/// Loading a new outcome replaces the dataset and appends its metadata.
#[derive(Default)]
pub struct Workspace {
    data: Store<Option<Arc<GazeData>>>,
    metadata: Store<Vec<FileMetadata>>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes ownership of an outcome's dataset and returns its report.
    pub fn load(&mut self, outcome: IngestionOutcome) -> IngestionReport {
        let IngestionOutcome {
            data,
            report,
            metadata,
        } = outcome;
        info!(
            "Workspace loaded {} files parsed at {}",
            metadata.file_names.len(),
            metadata.parse_date
        );
        self.data.set(Some(Arc::new(data)));
        self.metadata.update(|records| records.push(metadata));
        report
    }

    pub fn data(&self) -> Option<Arc<GazeData>> {
        self.data.get().clone()
    }

    pub fn metadata(&self) -> &[FileMetadata] {
        self.metadata.get()
    }

    pub fn subscribe_data(
        &mut self,
        subscriber: impl Fn(&Option<Arc<GazeData>>) + Send + 'static,
    ) -> SubscriptionId {
        self.data.subscribe(subscriber)
    }

    pub fn unsubscribe_data(&mut self, id: SubscriptionId) -> bool {
        self.data.unsubscribe(id)
    }

    pub fn subscribe_metadata(
        &mut self,
        subscriber: impl Fn(&Vec<FileMetadata>) + Send + 'static,
    ) -> SubscriptionId {
        self.metadata.subscribe(subscriber)
    }

    pub fn unsubscribe_metadata(&mut self, id: SubscriptionId) -> bool {
        self.metadata.unsubscribe(id)
    }

    /// Drops the dataset and metadata; subscribers see the empty state.
    pub fn clear(&mut self) {
        self.data.set(None);
        self.metadata.set(Vec::new());
    }
}
