//! Scoring engine boundary
//!
//! The prediction model is a black box behind two traits: a
//! [`ScoringBackend`] turns a reassembled artifact into a [`Model`], and
//! a model turns a [`FlightRecord`] into a label. The field set of a
//! record is fixed by convention with the trained model and is not
//! validated structurally here.

mod lazy;

pub use lazy::LazyModel;

use std::collections::BTreeMap;

use crate::artifact::{ArtifactError, ReassembledArtifact};

/// One scoring request: the full flight tuple, all values as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlightRecord {
    pub origin: String,
    pub dest: String,
    pub crs_dep_time: String,
    pub year: String,
    pub month: String,
    pub day_of_month: String,
    pub day_of_week: String,
    pub unique_carrier: String,
}

impl FlightRecord {
    /// Field map in the naming convention the trained model expects.
    pub fn to_fields(&self) -> BTreeMap<&'static str, &str> {
        BTreeMap::from([
            ("Year", self.year.as_str()),
            ("Month", self.month.as_str()),
            ("DayofMonth", self.day_of_month.as_str()),
            ("DayOfWeek", self.day_of_week.as_str()),
            ("CRSDepTime", self.crs_dep_time.as_str()),
            ("UniqueCarrier", self.unique_carrier.as_str()),
            ("Origin", self.origin.as_str()),
            ("Dest", self.dest.as_str()),
        ])
    }
}

/// A model's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Predicted class label
    pub label: String,
}

/// Errors for model loading and prediction
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Prediction failed: {0}")]
    Predict(String),
}

/// A loaded, queryable model.
pub trait Model: Send + Sync {
    /// Predict the label for one record.
    fn predict(&self, record: &FlightRecord) -> Result<Prediction, ScoreError>;
}

/// Turns a reassembled model artifact into a queryable model.
pub trait ScoringBackend: Send + Sync {
    /// Load a model from its artifact entries.
    fn load_model(&self, artifact: ReassembledArtifact) -> Result<Box<dyn Model>, ScoreError>;
}
