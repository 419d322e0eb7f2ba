//! Mock grid engine
//!
//! In-process stand-in for a remote grid node. It accepts the same three
//! operations as a real node and models the behavior the lane depends
//! on: procedures are
//! unknown until a statement creates them, duplicate objects fail with
//! "already exists", uploaded bundle entries become resources visible to
//! the deployed scoring unit, and the scoring unit reassembles the model
//! artifact lazily on first call.

mod failure;
mod state;

pub use failure::FailureInjector;
pub use state::{CacheRow, EngineState};

use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

use crate::artifact::ReassembledArtifact;
use crate::bundle::MANIFEST_PATH;
use crate::engine::{procedure_not_found_text, Operation, RpcRequest, RpcResponse, Row};
use crate::resource::MemoryLocator;
use crate::schema;
use crate::scoring::{FlightRecord, LazyModel, Model, Prediction, ScoreError, ScoringBackend};

/// Configurable mock engine
pub struct MockEngine {
    state: Mutex<EngineState>,
    failures: Mutex<FailureInjector>,
    /// Deployed scoring unit, created on first scoring call
    unit: Mutex<Option<Arc<LazyModel>>>,
    /// Times the unit's backend loaded a model
    model_loads: Arc<AtomicUsize>,
    /// Entry path of the model artifact inside uploaded bundles
    model_artifact_entry: String,
}

impl MockEngine {
    /// Create a mock engine with the reference deployment's artifact path.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::new()),
            failures: Mutex::new(FailureInjector::new()),
            unit: Mutex::new(None),
            model_loads: Arc::new(AtomicUsize::new(0)),
            model_artifact_entry: format!(
                "{}/{}",
                schema::RESOURCE_NAMESPACE,
                schema::MODEL_ARTIFACT
            ),
        }
    }

    /// Override the model artifact entry path the scoring unit loads.
    pub fn with_model_artifact_entry(mut self, entry: impl Into<String>) -> Self {
        self.model_artifact_entry = entry.into();
        self
    }

    // === Test configuration ===

    /// Queue a one-shot failure for the next occurrence of an operation.
    pub fn inject_failure(&self, op: Operation, message: impl Into<String>) {
        self.failures.lock().unwrap().inject(op, message);
    }

    /// Drop all queued failures.
    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    // === Test observation ===

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().call_count
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().upload_count
    }

    pub fn ad_hoc_count(&self) -> usize {
        self.state.lock().unwrap().ad_hoc_count
    }

    pub fn bundle_count(&self) -> usize {
        self.state.lock().unwrap().bundle_count
    }

    /// Applied statement texts in application order.
    pub fn applied_statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Names of resources received through bundle uploads.
    pub fn resource_names(&self) -> Vec<String> {
        self.state.lock().unwrap().resources.keys().cloned().collect()
    }

    /// Bytes of one uploaded resource.
    pub fn resource(&self, name: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().resources.get(name).cloned()
    }

    /// Registered procedure names.
    pub fn procedures(&self) -> Vec<String> {
        self.state.lock().unwrap().procedures.iter().cloned().collect()
    }

    /// Times the deployed unit loaded a model.
    pub fn model_loads(&self) -> usize {
        self.model_loads.load(Ordering::SeqCst)
    }

    /// Number of cached scoring results.
    pub fn cache_len(&self) -> usize {
        self.state.lock().unwrap().cache.len()
    }

    // === Request handling ===

    /// Handle one envelope the way a grid node would.
    pub fn handle_request(&self, request: &RpcRequest) -> RpcResponse {
        if let Some(message) = self.failures.lock().unwrap().take(request.op) {
            return RpcResponse::failure(request.request_id.clone(), message);
        }

        match request.op {
            Operation::Call => self.handle_call(request),
            Operation::UpdateClasses => self.handle_update_classes(request),
            Operation::AdHoc => self.handle_ad_hoc(request),
        }
    }

    fn handle_call(&self, request: &RpcRequest) -> RpcResponse {
        let request_id = request.request_id.clone();
        let procedure = match request.payload.get("procedure").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return RpcResponse::failure(request_id, "Call without procedure name"),
        };
        let args: Vec<String> = request
            .payload
            .get("args")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        {
            let mut state = self.state.lock().unwrap();
            state.call_count += 1;

            if !state.procedures.contains(&procedure) {
                return RpcResponse::failure(request_id, procedure_not_found_text(&procedure));
            }

            if procedure == schema::CACHE_CHECK_PROCEDURE {
                let rows: Vec<Row> = state
                    .cache_stats()
                    .into_iter()
                    .map(|(usage_count, hits)| {
                        Row::from([
                            ("usage_count".to_string(), usage_count.to_string()),
                            ("hits".to_string(), hits.to_string()),
                        ])
                    })
                    .collect();
                return RpcResponse::success(request_id, json!({ "rows": rows }));
            }
        }

        if args.len() == 8 {
            return self.handle_scoring_call(request_id, &args);
        }

        RpcResponse::success(request_id, json!({ "rows": [] }))
    }

    /// Run the deployed scoring unit: cache lookup, lazy model load,
    /// predict, cache fill.
    fn handle_scoring_call(&self, request_id: String, args: &[String]) -> RpcResponse {
        let record = FlightRecord {
            origin: args[0].clone(),
            crs_dep_time: args[1].clone(),
            year: args[2].clone(),
            month: args[3].clone(),
            day_of_month: args[4].clone(),
            day_of_week: args[5].clone(),
            unique_carrier: args[6].clone(),
            dest: args[7].clone(),
        };

        if let Some(label) = self.cached_label(&record) {
            return RpcResponse::success(request_id, json!({ "rows": [{ "LABEL": label }] }));
        }

        let prediction = match self.scoring_unit().predict(&record) {
            Ok(p) => p,
            Err(e) => return RpcResponse::failure(request_id, format!("Scoring failed: {}", e)),
        };

        let mut state = self.state.lock().unwrap();
        state.cache.entry(record).or_insert_with(|| CacheRow {
            delayed: prediction.label.clone(),
            usage_count: 1,
        });
        RpcResponse::success(request_id, json!({ "rows": [{ "LABEL": prediction.label }] }))
    }

    fn cached_label(&self, record: &FlightRecord) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        state.cache.get_mut(record).map(|row| {
            row.usage_count += 1;
            row.delayed.clone()
        })
    }

    fn scoring_unit(&self) -> Arc<LazyModel> {
        let mut unit = self.unit.lock().unwrap();
        if let Some(existing) = unit.as_ref() {
            return Arc::clone(existing);
        }

        let resources = self.state.lock().unwrap().resources.clone();
        let locator: MemoryLocator = resources.into_iter().collect();
        let lazy = Arc::new(LazyModel::new(
            Box::new(HeuristicBackend {
                loads: Arc::clone(&self.model_loads),
            }),
            Arc::new(locator),
            self.model_artifact_entry.clone(),
        ));
        *unit = Some(Arc::clone(&lazy));
        lazy
    }

    fn handle_update_classes(&self, request: &RpcRequest) -> RpcResponse {
        let request_id = request.request_id.clone();
        let encoded = match request.payload.get("bundle_base64").and_then(|v| v.as_str()) {
            Some(e) => e,
            None => return RpcResponse::failure(request_id, "Upload without bundle payload"),
        };
        let bytes = match BASE64.decode(encoded) {
            Ok(b) => b,
            Err(e) => {
                return RpcResponse::failure(request_id, format!("Bundle rejected: {}", e));
            }
        };

        let mut entries = Vec::new();
        let mut archive = tar::Archive::new(Cursor::new(&bytes));
        let iter = match archive.entries() {
            Ok(iter) => iter,
            Err(e) => {
                return RpcResponse::failure(request_id, format!("Bundle rejected: {}", e));
            }
        };
        for entry in iter {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    return RpcResponse::failure(request_id, format!("Bundle rejected: {}", e));
                }
            };
            let path = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(e) => {
                    return RpcResponse::failure(request_id, format!("Bundle rejected: {}", e));
                }
            };
            let mut content = Vec::new();
            if let Err(e) = entry.read_to_end(&mut content) {
                return RpcResponse::failure(request_id, format!("Bundle rejected: {}", e));
            }
            entries.push((path, content));
        }

        let mut state = self.state.lock().unwrap();
        state.upload_count += 1;
        state.bundle_count += 1;
        for (path, content) in entries {
            if path != MANIFEST_PATH {
                state.resources.insert(path, content);
            }
        }
        RpcResponse::success(request_id, json!({}))
    }

    fn handle_ad_hoc(&self, request: &RpcRequest) -> RpcResponse {
        let request_id = request.request_id.clone();
        let statement = match request.payload.get("statement").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => return RpcResponse::failure(request_id, "AdHoc without statement"),
        };

        let mut state = self.state.lock().unwrap();
        state.ad_hoc_count += 1;

        if let Some((key, name, is_procedure)) = created_object(&statement) {
            if state.objects.contains(&key) {
                return RpcResponse::failure(
                    request_id,
                    format!("Object name '{}' already exists", name),
                );
            }
            state.objects.insert(key);
            if is_procedure {
                state.procedures.insert(name);
            }
        }

        state.statements.push(statement);
        RpcResponse::success(request_id, json!({}))
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Recognize the object a statement creates.
///
/// Returns (dedup key, object name, is-procedure). Only the statement
/// forms the lane emits are understood; anything else applies without
/// object tracking.
fn created_object(statement: &str) -> Option<(String, String, bool)> {
    let tokens: Vec<&str> = statement.split_whitespace().collect();
    let word = |i: usize| tokens.get(i).map(|t| t.to_ascii_lowercase());

    let name_at = |i: usize| -> Option<String> {
        tokens
            .get(i)
            .map(|t| t.trim_end_matches(&[';', ',', '('][..]).to_string())
    };

    match (word(0).as_deref(), word(1).as_deref()) {
        (Some("create"), Some(kind @ ("table" | "index" | "view" | "procedure"))) => {
            let name = name_at(2)?;
            let key = format!("{}:{}", kind, name.to_ascii_lowercase());
            Some((key, name, kind == "procedure"))
        }
        (Some("partition"), Some("table")) => {
            let name = name_at(2)?;
            let key = format!("partition:{}", name.to_ascii_lowercase());
            Some((key, name, false))
        }
        _ => None,
    }
}

/// Deterministic stand-in scoring backend.
///
/// Refuses empty artifacts so tests catch a model that never made it to
/// the engine; predictions hash the record so identical requests agree.
struct HeuristicBackend {
    loads: Arc<AtomicUsize>,
}

impl ScoringBackend for HeuristicBackend {
    fn load_model(&self, artifact: ReassembledArtifact) -> Result<Box<dyn Model>, ScoreError> {
        if artifact.is_empty() {
            return Err(ScoreError::Load("artifact has no entries".to_string()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HeuristicModel))
    }
}

struct HeuristicModel;

impl Model for HeuristicModel {
    fn predict(&self, record: &FlightRecord) -> Result<Prediction, ScoreError> {
        let sum: u64 = record
            .to_fields()
            .values()
            .flat_map(|v| v.bytes())
            .map(u64::from)
            .sum();
        let label = if sum % 3 == 0 { "YES" } else { "NO" };
        Ok(Prediction {
            label: label.to_string(),
        })
    }
}
