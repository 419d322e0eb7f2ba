//! Lazy model initialization
//!
//! A model is too expensive to load per call, so a deployed unit holds
//! one [`LazyModel`] and loads on first use. The slot is mutex-guarded:
//! exactly one caller performs the reassembly and load while concurrent
//! callers wait, then every later call clones the shared handle. A failed
//! load leaves the slot empty, so the next call retries.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::artifact::reassemble;
use crate::resource::ResourceLocator;

use super::{FlightRecord, Model, Prediction, ScoreError, ScoringBackend};

/// Lazily constructed, shared model handle.
pub struct LazyModel {
    backend: Box<dyn ScoringBackend>,
    locator: Arc<dyn ResourceLocator>,
    artifact_name: String,
    slot: Mutex<Option<Arc<dyn Model>>>,
}

impl LazyModel {
    /// Create an unloaded handle for the named artifact.
    pub fn new(
        backend: Box<dyn ScoringBackend>,
        locator: Arc<dyn ResourceLocator>,
        artifact_name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            locator,
            artifact_name: artifact_name.into(),
            slot: Mutex::new(None),
        }
    }

    /// The model, loading it on first use.
    pub fn get_or_load(&self) -> Result<Arc<dyn Model>, ScoreError> {
        let mut slot = self.slot.lock().unwrap();
        if let Some(model) = slot.as_ref() {
            return Ok(Arc::clone(model));
        }

        let artifact = reassemble(self.locator.as_ref(), &self.artifact_name)?;
        info!(
            artifact = %self.artifact_name,
            entries = artifact.len(),
            "loading model from reassembled artifact"
        );
        let model: Arc<dyn Model> = Arc::from(self.backend.load_model(artifact)?);
        *slot = Some(Arc::clone(&model));
        Ok(model)
    }

    /// True once a load has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }

    /// Predict through the lazily loaded model.
    pub fn predict(&self, record: &FlightRecord) -> Result<Prediction, ScoreError> {
        self.get_or_load()?.predict(record)
    }
}
