//! Batch inference session: the asset set, the submit lifecycle and the
//! results bound back onto the assets they came from.
//!
//! `status` doubles as the lock for the single in-flight submission. The
//! mutex around the state is only ever held for short, synchronous sections
//! and never across an `.await`, so the asset set stays editable while a
//! request is pending.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::asset::{AssetId, AssetSet, FileInput, ImageAsset};
use crate::classifier::{BatchItem, ClassifyError, Classifier, PredictionResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Submitting,
    Succeeded,
    /// Carries the user-facing message.
    Failed(String),
}

/// A prediction tied to the asset it was made for.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundResult {
    pub asset_id: AssetId,
    pub prediction: PredictionResult,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("no images selected")]
    EmptyBatch,

    #[error("a submission is already in progress")]
    AlreadyInProgress,

    #[error("response does not match the submitted batch: {0}")]
    ContractMismatch(String),

    #[error("network failure: {0}")]
    Transport(String),

    #[error("server rejected the batch with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid batch request: {0}")]
    InvalidRequest(String),
}

impl SessionError {
    /// The single status line shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::EmptyBatch => "Please select one or more image files.".to_string(),
            SessionError::AlreadyInProgress => {
                "A prediction is already running. Please wait for it to finish.".to_string()
            }
            SessionError::ContractMismatch(_) => {
                "Failed to get prediction: the server returned an unexpected response.".to_string()
            }
            SessionError::Transport(_) => {
                "Failed to get prediction. Is the backend server running?".to_string()
            }
            SessionError::Rejected { status, .. } => {
                format!("The server rejected the batch (HTTP {status}).")
            }
            SessionError::InvalidRequest(_) => {
                "Failed to prepare the images for upload.".to_string()
            }
        }
    }
}

impl From<ClassifyError> for SessionError {
    fn from(err: ClassifyError) -> Self {
        match err {
            ClassifyError::Transport(detail) => SessionError::Transport(detail),
            ClassifyError::Rejected { status, body } => SessionError::Rejected { status, body },
            ClassifyError::Malformed(detail) => SessionError::ContractMismatch(detail),
            ClassifyError::InvalidRequest(detail) => SessionError::InvalidRequest(detail),
        }
    }
}

const ABANDONED_MESSAGE: &str = "The prediction was interrupted before it finished.";

#[derive(Debug)]
struct SessionState {
    assets: AssetSet,
    status: SessionStatus,
    results: Option<Vec<BoundResult>>,
    /// Bumped on every asset-set mutation.
    revision: u64,
    /// Asset revision the current `results` were computed from.
    results_revision: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            assets: AssetSet::new(),
            status: SessionStatus::Idle,
            results: None,
            revision: 0,
            results_revision: 0,
        }
    }
}

impl SessionState {
    fn touch(&mut self) {
        self.revision += 1;
    }
}

/// Cheaply clonable handle; clones share one session.
#[derive(Debug, Clone, Default)]
pub struct InferenceSession {
    state: Arc<Mutex<SessionState>>,
}

impl InferenceSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_from_files(&self, files: impl IntoIterator<Item = FileInput>) -> Vec<AssetId> {
        let mut state = self.lock();
        let ids = state.assets.add_from_files(files);
        if !ids.is_empty() {
            state.touch();
        }
        ids
    }

    pub fn add_from_capture(&self, bytes: Vec<u8>) -> AssetId {
        let mut state = self.lock();
        state.touch();
        state.assets.add_from_capture(bytes)
    }

    /// Returns whether an asset was removed.
    pub fn remove(&self, id: AssetId) -> bool {
        let mut state = self.lock();
        let removed = state.assets.remove(id).is_some();
        if removed {
            state.touch();
        }
        removed
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        if !state.assets.is_empty() {
            state.assets.clear();
            state.touch();
        }
    }

    /// Snapshot of the current assets, in submission order.
    pub fn assets(&self) -> Vec<ImageAsset> {
        self.lock().assets.as_slice().to_vec()
    }

    pub fn asset_count(&self) -> usize {
        self.lock().assets.len()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status.clone()
    }

    /// Results of the last successful submission, even if the asset set or a
    /// later failed attempt has made them stale.
    pub fn results(&self) -> Option<Vec<BoundResult>> {
        self.lock().results.clone()
    }

    /// True once the asset set has changed since the results were computed.
    pub fn is_stale(&self) -> bool {
        let state = self.lock();
        state.results.is_some() && state.revision != state.results_revision
    }

    /// Results that still describe the current asset set.
    pub fn displayed_results(&self) -> Option<Vec<BoundResult>> {
        let state = self.lock();
        if state.revision != state.results_revision {
            return None;
        }
        state.results.clone()
    }

    /// Submits every current asset as one batch.
    ///
    /// Fails without contacting the service when the set is empty or another
    /// submission is pending. A transport failure, a rejection or a response
    /// whose length differs from the batch leaves the previous results in
    /// place and moves the session to `Failed`.
    pub async fn submit<C: Classifier>(
        &self,
        classifier: &C,
    ) -> Result<Vec<BoundResult>, SessionError> {
        let (ids, names, batch, revision) = {
            let mut state = self.lock();
            if state.status == SessionStatus::Submitting {
                return Err(SessionError::AlreadyInProgress);
            }
            if state.assets.is_empty() {
                return Err(SessionError::EmptyBatch);
            }
            state.status = SessionStatus::Submitting;

            let assets = state.assets.as_slice();
            let ids: Vec<AssetId> = assets.iter().map(ImageAsset::id).collect();
            let names: Vec<String> = assets
                .iter()
                .map(|asset| asset.display_name().to_string())
                .collect();
            let batch: Vec<BatchItem> = assets.iter().map(BatchItem::from).collect();
            (ids, names, batch, state.revision)
        };

        let in_flight = InFlight {
            session: self,
            settled: false,
        };
        info!("Submitting batch of {} images", ids.len());
        let outcome = classifier.classify(batch).await;
        in_flight.settle(&ids, &names, revision, outcome)
    }
}

/// Marks the one pending submission. If the submit future is dropped before
/// the response arrives, dropping this moves the session out of `Submitting`.
struct InFlight<'a> {
    session: &'a InferenceSession,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(
        mut self,
        ids: &[AssetId],
        names: &[String],
        revision: u64,
        outcome: Result<Vec<PredictionResult>, ClassifyError>,
    ) -> Result<Vec<BoundResult>, SessionError> {
        self.settled = true;
        let mut state = self.session.lock();

        let predictions = match outcome {
            Ok(predictions) if predictions.len() != ids.len() => {
                error!(
                    "Contract mismatch: submitted {} images, service returned {} results",
                    ids.len(),
                    predictions.len()
                );
                Err(SessionError::ContractMismatch(format!(
                    "expected {} results, received {}",
                    ids.len(),
                    predictions.len()
                )))
            }
            Ok(predictions) => Ok(predictions),
            Err(err) => {
                let err = SessionError::from(err);
                match &err {
                    SessionError::ContractMismatch(detail) => {
                        error!("Contract mismatch: {detail}")
                    }
                    other => warn!("Batch submission failed: {other}"),
                }
                Err(err)
            }
        };

        match predictions {
            Ok(predictions) => {
                for (name, prediction) in names.iter().zip(&predictions) {
                    if *name != prediction.file_name {
                        warn!(
                            "Result for {:?} is labelled {:?}; binding by position",
                            name, prediction.file_name
                        );
                    }
                }
                let bound: Vec<BoundResult> = ids
                    .iter()
                    .zip(predictions)
                    .map(|(&asset_id, prediction)| BoundResult {
                        asset_id,
                        prediction,
                    })
                    .collect();
                info!("Batch classified: {} results", bound.len());
                state.results = Some(bound.clone());
                state.results_revision = revision;
                state.status = SessionStatus::Succeeded;
                Ok(bound)
            }
            Err(err) => {
                state.status = SessionStatus::Failed(err.user_message());
                Err(err)
            }
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut state = self.session.lock();
        if state.status == SessionStatus::Submitting {
            warn!("Batch submission dropped before completion");
            state.status = SessionStatus::Failed(ABANDONED_MESSAGE.to_string());
        }
    }
}
