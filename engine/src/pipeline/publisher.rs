// Presentation hand-off. The last published value is overwritten wholesale.
use shared::{ErrorKind, FeatureField, PipelineFailure, PipelineState, PresentationUpdate};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub trait Publisher: Send + Sync {
    /// Called after every state transition of a refresh loop.
    fn publish(&self, state: &PipelineState);
}

/// Outcome of the latest completed cycle as seen by presentation.
pub type CycleUpdate = Result<PresentationUpdate, PipelineFailure>;

/// Keeps the outcome of the latest cycle in a watch channel. `None` until
/// the first cycle completes.
pub struct WatchPublisher {
    overlay_fields: Vec<FeatureField>,
    tx: watch::Sender<Option<CycleUpdate>>,
}

impl WatchPublisher {
    pub fn new(overlay_fields: Vec<FeatureField>) -> Self {
        let (tx, _) = watch::channel(None);
        Self { overlay_fields, tx }
    }

    pub fn latest(&self) -> Option<CycleUpdate> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CycleUpdate>> {
        self.tx.subscribe()
    }

    pub fn updates(&self) -> WatchStream<Option<CycleUpdate>> {
        WatchStream::new(self.tx.subscribe())
    }
}

impl Publisher for WatchPublisher {
    fn publish(&self, state: &PipelineState) {
        // Terminal transitions re-send the last result; only completed cycles publish.
        let (Some(result), false) = (&state.last_result, state.status.is_terminal()) else {
            tracing::debug!(symbol = %state.symbol, interval = %state.interval, status = ?state.status, "State change");
            return;
        };
        let update = match &result.error {
            Some(error) => {
                tracing::warn!(
                    symbol = %state.symbol,
                    interval = %state.interval,
                    cycle = state.cycle,
                    error_detail = %error,
                    "Refresh cycle failed"
                );
                Err(error.clone())
            }
            None => PresentationUpdate::from_result(result, &self.overlay_fields).ok_or_else(|| {
                PipelineFailure::new(ErrorKind::Internal, "successful result without a current price")
            }),
        };
        self.tx.send_replace(Some(update));
    }
}
