use crate::backend::ChatBackend;
use crate::form::CustomizeRecord;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Stored(String),
    Rejected(String),
    Failed,
}

/// Post the record and log the result. Never surfaces an error to the user:
/// the thank-you message has already been shown by the time this runs.
pub async fn submit_customize_data(
    backend: &dyn ChatBackend,
    record: &CustomizeRecord,
) -> SubmissionOutcome {
    match backend.submit_customize(record).await {
        Ok(ack) => match (ack.message, ack.error) {
            (Some(message), _) => {
                info!(%message, "customize data stored");
                SubmissionOutcome::Stored(message)
            }
            (None, error) => {
                let error = error.unwrap_or_else(|| "empty response".to_string());
                error!(%error, "backend rejected customize data");
                SubmissionOutcome::Rejected(error)
            }
        },
        Err(err) => {
            error!(?err, "customize data submission failed");
            SubmissionOutcome::Failed
        }
    }
}

pub fn spawn_submission(
    backend: Arc<dyn ChatBackend>,
    record: CustomizeRecord,
    session_id: uuid::Uuid,
) -> JoinHandle<()> {
    let span = tracing::info_span!("customize_submit", %session_id);
    tokio::spawn(
        async move {
            submit_customize_data(backend.as_ref(), &record).await;
        }
        .instrument(span),
    )
}
