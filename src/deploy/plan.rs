//! Schema deployment plan
//!
//! A plan is data: the ordered schema statements, the resources to pack,
//! and the probe that decides whether any of it is needed. Each statement
//! carries the bundle ids it depends on instead of having them re-derived
//! from the statement text at deploy time.

use serde::{Deserialize, Serialize};

/// The probe operation used to test whether target schema already exists.
///
/// Must be cheap, side-effect-free, and callable with the same fixed
/// arguments forever; the coordinator re-runs it before and after
/// deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSpec {
    /// Procedure to invoke
    pub procedure: String,
    /// Fixed test arguments
    pub args: Vec<String>,
}

/// One declarative schema statement plus its bundle dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaStatement {
    /// Statement text, applied verbatim via the ad-hoc operation
    pub text: String,

    /// Ids of bundles that must be uploaded before this statement runs.
    /// Empty for statements that reference no uploaded code or data.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub referenced_bundles: Vec<String>,
}

impl SchemaStatement {
    /// Statement with no bundle dependencies.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            referenced_bundles: Vec::new(),
        }
    }

    /// Statement depending on the given bundle ids.
    pub fn with_bundles(text: impl Into<String>, bundles: &[&str]) -> Self {
        Self {
            text: text.into(),
            referenced_bundles: bundles.iter().map(|b| b.to_string()).collect(),
        }
    }
}

/// Errors for plan validation
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Statement '{statement}' references unknown bundle {bundle_id}")]
    UnknownBundleReference {
        statement: String,
        bundle_id: String,
    },

    #[error("Plan has no schema statements")]
    NoStatements,
}

/// Everything one deployment session needs, constructed once and
/// discarded after use.
#[derive(Debug, Clone)]
pub struct SchemaDeploymentPlan {
    /// Schema statements in application order
    pub statements: Vec<SchemaStatement>,

    /// Compiled code resources packed into the main bundle
    pub code_resources: Vec<String>,

    /// Named binary resources to embed; oversized ones are split and
    /// shipped as their own numbered bundles
    pub data_resources: Vec<String>,

    /// Path prefix entries get inside bundles; the deployed unit resolves
    /// its resources under the same prefix at runtime
    pub resource_namespace: String,

    /// Id of the main code/resource bundle
    pub main_bundle_id: String,

    /// Probe deciding whether the schema is already present
    pub probe: ProbeSpec,
}

impl SchemaDeploymentPlan {
    /// Path the named resource gets inside a bundle.
    pub fn entry_path(&self, name: &str) -> String {
        if self.resource_namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.resource_namespace, name)
        }
    }

    /// Check that every statement's bundle references are satisfiable by
    /// this plan before anything is uploaded.
    ///
    /// Valid references are the main bundle id and the data resource
    /// names (a reference to a split resource means its chunk bundles).
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.statements.is_empty() {
            return Err(PlanError::NoStatements);
        }

        for statement in &self.statements {
            for bundle_id in &statement.referenced_bundles {
                let known = *bundle_id == self.main_bundle_id
                    || self.data_resources.iter().any(|r| r == bundle_id);
                if !known {
                    return Err(PlanError::UnknownBundleReference {
                        statement: statement.text.clone(),
                        bundle_id: bundle_id.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}
