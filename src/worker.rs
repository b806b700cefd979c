// Background parse worker with message passing and cancellation

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender, TryRecvError},
    },
    thread,
};

use log::{debug, error};

use crate::{
    config::AppConfig,
    errors::GazeError,
    format::SettingsOverride,
    ingest::{AoiVisibilityInput, IngestOptions, IngestionOutcome, InputFile, ProgressEvent, ingest},
};

#[derive(Clone, Debug, Default)]
pub struct ParseRequest {
    pub files: Vec<InputFile>,
    pub visibility: Vec<AoiVisibilityInput>,
    pub overrides: SettingsOverride,
}

#[derive(Debug)]
pub enum WorkerMessage {
    Progress(ProgressEvent),
    /// Success, partial success and "no usable data" all arrive here
    Done(Box<IngestionOutcome>),
    Cancelled,
    Failed(String),
}

/// A parse running on its own thread.
///
/// The worker owns everything it builds until it sends `Done`. After
/// `terminate` the handle yields no further messages; whatever the thread
/// had built is dropped with it.
pub struct ParseWorker {
    receiver: Receiver<WorkerMessage>,
    cancel: Arc<AtomicBool>,
    terminated: bool,
}

impl ParseWorker {
    pub fn spawn(request: ParseRequest, config: &AppConfig) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let options = IngestOptions {
            overrides: request.overrides.or(&config.default_override),
            parallel: config.parallel_file_parsing,
            cancel: Some(cancel.clone()),
            progress_every_rows: config.progress_every_rows,
        };
        let (tx, rx) = mpsc::channel::<WorkerMessage>();
        thread::spawn(move || run(request, options, tx));

        Self {
            receiver: rx,
            cancel,
            terminated: false,
        }
    }

    /// Blocks for the next message. `None` once terminated or after the worker has finished.
    pub fn recv(&self) -> Option<WorkerMessage> {
        if self.terminated {
            return None;
        }
        self.receiver.recv().ok()
    }

    pub fn try_recv(&self) -> Option<WorkerMessage> {
        if self.terminated {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Flag that stops the worker when set, e.g. from a signal handler.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn terminate(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Waits for the final message, passing progress events to `on_progress`.
    pub fn wait(
        self,
        mut on_progress: impl FnMut(ProgressEvent),
    ) -> Result<IngestionOutcome, GazeError> {
        while let Some(message) = self.recv() {
            match message {
                WorkerMessage::Progress(event) => on_progress(event),
                WorkerMessage::Done(outcome) => return Ok(*outcome),
                WorkerMessage::Cancelled => return Err(GazeError::Cancelled),
                WorkerMessage::Failed(reason) => return Err(GazeError::WorkerFailed { reason }),
            }
        }
        if self.terminated || self.cancel.load(Ordering::Relaxed) {
            Err(GazeError::Cancelled)
        } else {
            Err(GazeError::WorkerDisconnected)
        }
    }
}

impl Drop for ParseWorker {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

fn run(request: ParseRequest, options: IngestOptions, tx: Sender<WorkerMessage>) {
    let progress_tx = tx.clone();
    let on_progress = move |event: ProgressEvent| {
        // receiver gone means the caller stopped listening
        let _ = progress_tx.send(WorkerMessage::Progress(event));
    };
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        ingest(&request.files, &request.visibility, &options, &on_progress)
    }));

    let message = match result {
        Ok(Ok(outcome)) => WorkerMessage::Done(Box::new(outcome)),
        Ok(Err(GazeError::Cancelled)) => {
            debug!("Parse worker cancelled");
            WorkerMessage::Cancelled
        }
        Ok(Err(e)) => {
            error!("Parse worker failed: {}", e);
            WorkerMessage::Failed(e.to_string())
        }
        Err(_) => {
            error!("Parse worker panicked");
            WorkerMessage::Failed("parser panicked".to_string())
        }
    };
    let _ = tx.send(message);
}
