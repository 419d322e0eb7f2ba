//! Deployment coordination
//!
//! Drives one deployment attempt through the state machine
//!
//! ```text
//! ABSENT ──probe success──▶ PRESENT (terminal, no-op)
//! ABSENT ──probe fails──▶ SPLITTING ─▶ BUNDLING ─▶ UPLOADING ─▶ SCHEMA_APPLYING ─▶ PRESENT
//! any state ──unrecoverable remote error──▶ FAILED (terminal)
//! ```
//!
//! Idempotency is protocol, not locking: the probe runs before anything
//! is uploaded, and an "already exists" failure while applying statements
//! means another writer finished first and is treated as success. Within
//! one process a mutex serializes the active sequence (double-checked
//! against the probe); across processes duplicate upload work may happen,
//! but the remote schema converges to a single definition.

mod plan;

pub use plan::{PlanError, ProbeSpec, SchemaDeploymentPlan, SchemaStatement};

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::artifact::{fragment_name, is_oversized, split_resource, ArtifactError};
use crate::bundle::{BundleError, DeployableBundle, SealedBundle};
use crate::engine::{procedure_not_found_text, EngineClient, RemoteCallError};
use crate::resource::ResourceLocator;

/// Substring of the engine's status text that identifies a concurrent
/// writer having created the object first.
const ALREADY_EXISTS: &str = "already exists";

/// States of one deployment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployState {
    /// Probe did not find the schema
    Absent,
    /// Cutting oversized resources into chunks
    Splitting,
    /// Packing bundles
    Bundling,
    /// Shipping bundles to the engine
    Uploading,
    /// Applying schema statements in order
    SchemaApplying,
    /// Schema exists on the engine (terminal)
    Present,
    /// Unrecoverable error (terminal)
    Failed,
}

impl DeployState {
    /// True for states that end the attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Present | DeployState::Failed)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: DeployState) -> bool {
        match (self, target) {
            (DeployState::Absent, DeployState::Splitting) => true,
            // Double-checked probe can conclude another writer finished.
            (DeployState::Absent, DeployState::Present) => true,
            (DeployState::Splitting, DeployState::Bundling) => true,
            (DeployState::Bundling, DeployState::Uploading) => true,
            (DeployState::Uploading, DeployState::SchemaApplying) => true,
            (DeployState::SchemaApplying, DeployState::Present) => true,
            (_, DeployState::Failed) => !self.is_terminal(),
            _ => false,
        }
    }
}

/// How a deployment attempt concluded successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The probe (or a concurrent writer) showed the schema present;
    /// nothing was changed by this caller beyond possible upload work.
    AlreadyPresent,
    /// This caller uploaded the bundles and applied the schema.
    Deployed,
}

/// Errors for deployment
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    RemoteCall(#[from] RemoteCallError),

    #[error("Attempt to upload bundle {bundle_id} failed: {status_text}")]
    BundleUpload {
        bundle_id: String,
        /// The engine's literal status text
        status_text: String,
    },

    #[error("Attempt to execute '{statement}' failed: {status_text}")]
    SchemaApply {
        statement: String,
        /// The engine's literal status text
        status_text: String,
    },

    #[error("Deployment verification failed: probe {procedure} still does not succeed")]
    Verification { procedure: String },
}

/// Deployment knobs.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Resources that fill a read window of this many bytes are
    /// classified oversized and split before upload.
    pub max_chunk_bytes: usize,

    /// Ceiling for one serialized bundle upload, in bytes (0 = no limit).
    /// Must leave headroom above `max_chunk_bytes` for archive framing
    /// and the embedded manifest.
    pub max_transfer_bytes: u64,
}

/// Headroom for tar framing and the manifest entry on top of a full chunk.
const TRANSFER_HEADROOM: u64 = 64 * 1024;

impl Default for DeployConfig {
    fn default() -> Self {
        Self::with_max_chunk_bytes(10 * 1024 * 1024)
    }
}

impl DeployConfig {
    /// Config with the given chunk ceiling and a matching transfer limit.
    pub fn with_max_chunk_bytes(max_chunk_bytes: usize) -> Self {
        Self {
            max_chunk_bytes,
            max_transfer_bytes: max_chunk_bytes as u64 + TRANSFER_HEADROOM,
        }
    }
}

/// Coordinates at-most-once-effective schema deployment against one
/// remote engine.
pub struct DeploymentCoordinator {
    engine: Arc<EngineClient>,
    locator: Arc<dyn ResourceLocator>,
    config: DeployConfig,
    /// Serializes the SPLITTING → SCHEMA_APPLYING sequence in-process.
    deploy_guard: Mutex<()>,
}

impl DeploymentCoordinator {
    /// Create a coordinator with default configuration.
    pub fn new(engine: Arc<EngineClient>, locator: Arc<dyn ResourceLocator>) -> Self {
        Self::with_config(engine, locator, DeployConfig::default())
    }

    /// Create a coordinator with custom configuration.
    pub fn with_config(
        engine: Arc<EngineClient>,
        locator: Arc<dyn ResourceLocator>,
        config: DeployConfig,
    ) -> Self {
        Self {
            engine,
            locator,
            config,
            deploy_guard: Mutex::new(()),
        }
    }

    /// See if the target schema already exists.
    ///
    /// Success of the probe call means present. The engine's exact
    /// not-found text means absent. Anything else, including transport
    /// failure, is logged and treated as absent; the steps that follow
    /// are themselves guarded, so the worst case is redundant upload
    /// work, not divergence.
    pub fn schema_present(&self, probe: &ProbeSpec) -> bool {
        match self.engine.call(&probe.procedure, &probe.args) {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                if response.status_text != procedure_not_found_text(&probe.procedure) {
                    warn!(
                        procedure = %probe.procedure,
                        status = %response.status_text,
                        "unexpected probe failure, treating schema as absent"
                    );
                }
                false
            }
            Err(e) => {
                warn!(
                    procedure = %probe.procedure,
                    error = %e,
                    "probe call failed, treating schema as absent"
                );
                false
            }
        }
    }

    /// Deploy the plan if the target schema does not already exist.
    ///
    /// Safe to invoke repeatedly and from multiple processes; at most one
    /// caller's upload sequence takes effect against a fresh target.
    pub fn deploy(&self, plan: &SchemaDeploymentPlan) -> Result<DeployOutcome, DeployError> {
        plan.validate()?;

        if self.schema_present(&plan.probe) {
            info!(probe = %plan.probe.procedure, "schema already present, deployment is a no-op");
            return Ok(DeployOutcome::AlreadyPresent);
        }

        let _guard = self.deploy_guard.lock().unwrap();

        // Another thread may have finished while we waited on the guard.
        if self.schema_present(&plan.probe) {
            info!(probe = %plan.probe.procedure, "schema appeared while waiting, deployment is a no-op");
            return Ok(DeployOutcome::AlreadyPresent);
        }

        let mut state = DeployState::Absent;
        match self.run_deployment(plan, &mut state) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.advance(&mut state, DeployState::Failed);
                error!(error = %e, "deployment failed");
                Err(e)
            }
        }
    }

    fn run_deployment(
        &self,
        plan: &SchemaDeploymentPlan,
        state: &mut DeployState,
    ) -> Result<DeployOutcome, DeployError> {
        // SPLITTING: cut oversized resources into chunk bundles; small
        // resources ride along in the main bundle.
        self.advance(state, DeployState::Splitting);
        let mut chunk_bundles: Vec<SealedBundle> = Vec::new();
        let mut inline_resources: Vec<&str> = Vec::new();

        for resource in &plan.data_resources {
            if is_oversized(self.locator.as_ref(), resource, self.config.max_chunk_bytes)? {
                let chunks =
                    split_resource(self.locator.as_ref(), resource, self.config.max_chunk_bytes)?;
                info!(
                    resource = %resource,
                    chunks = chunks.len(),
                    "splitting oversized resource"
                );

                for (index, chunk) in chunks.into_iter().enumerate() {
                    let fragment = fragment_name(resource, index);
                    let bundle =
                        DeployableBundle::single(&fragment, plan.entry_path(&fragment), chunk);
                    chunk_bundles.push(bundle.seal(self.config.max_transfer_bytes)?);
                }
            } else {
                inline_resources.push(resource);
            }
        }

        // BUNDLING: one multi-entry package for code, small resources, and
        // the manifest.
        self.advance(state, DeployState::Bundling);
        let mut main = DeployableBundle::new(&plan.main_bundle_id);
        for name in plan.code_resources.iter().map(String::as_str).chain(inline_resources) {
            main.push_entry(plan.entry_path(name), self.read_resource(name)?);
        }
        let main_sealed = main.seal(self.config.max_transfer_bytes)?;

        // UPLOADING: chunk bundles first (resource order, then chunk
        // order), then the main bundle.
        self.advance(state, DeployState::Uploading);
        for sealed in chunk_bundles.iter().chain(std::iter::once(&main_sealed)) {
            info!(
                bundle = %sealed.bundle_id,
                bytes = sealed.size(),
                sha256 = %sealed.sha256,
                "uploading bundle"
            );
            let response = self.engine.update_classes(&sealed.tar_bytes)?;
            if !response.is_success() {
                return Err(DeployError::BundleUpload {
                    bundle_id: sealed.bundle_id.clone(),
                    status_text: response.status_text,
                });
            }
        }

        // SCHEMA_APPLYING: statements in plan order. "already exists"
        // means another writer won the race; that is success.
        self.advance(state, DeployState::SchemaApplying);
        for statement in &plan.statements {
            info!(statement = %statement.text, "applying schema statement");
            let response = self.engine.ad_hoc(&statement.text)?;
            if !response.is_success() {
                if response.status_text.contains(ALREADY_EXISTS) {
                    info!(
                        statement = %statement.text,
                        status = %response.status_text,
                        "object already exists, another writer completed deployment"
                    );
                    self.advance(state, DeployState::Present);
                    return Ok(DeployOutcome::AlreadyPresent);
                }
                return Err(DeployError::SchemaApply {
                    statement: statement.text.clone(),
                    status_text: response.status_text,
                });
            }
        }

        // Confirm the schema actually answers before reporting success.
        if !self.schema_present(&plan.probe) {
            return Err(DeployError::Verification {
                procedure: plan.probe.procedure.clone(),
            });
        }

        self.advance(state, DeployState::Present);
        info!("deployment complete");
        Ok(DeployOutcome::Deployed)
    }

    fn read_resource(&self, name: &str) -> Result<Vec<u8>, DeployError> {
        use std::io::Read;

        let mut stream = self
            .locator
            .try_open(name)
            .ok_or_else(|| ArtifactError::NotFound {
                name: name.to_string(),
            })?;
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .map_err(|e| ArtifactError::io(name, e))?;
        Ok(bytes)
    }

    fn advance(&self, state: &mut DeployState, to: DeployState) {
        debug_assert!(
            state.can_transition_to(to),
            "invalid deployment transition {:?} -> {:?}",
            state,
            to
        );
        info!(from = ?state, to = ?to, "deployment state");
        *state = to;
    }
}
