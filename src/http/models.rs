//! Request/response bodies for the HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{DeploymentRow, FunctionRow};

/// Body of `POST /invoke`.
#[derive(Debug, Deserialize)]
pub struct InvokeSourceRequest {
    /// ES module source to compile and invoke ad hoc.
    pub source: String,
    /// Argument passed to the module's default export; absent or `null`
    /// becomes `undefined`.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Body of `POST /functions`.
#[derive(Debug, Deserialize, Default)]
pub struct CreateFunctionRequest {
    /// Function name; a generated id is used when omitted.
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `POST /functions/{id}/deployments`.
#[derive(Debug, Deserialize)]
pub struct CreateDeploymentRequest {
    /// ES module source for the new deployment.
    pub source: String,
}

/// Response body wrapping a single [`FunctionRow`].
#[derive(Debug, Serialize)]
pub struct FunctionResponse {
    /// The function.
    pub function: FunctionRow,
}

/// Response body wrapping a list of [`FunctionRow`]s.
#[derive(Debug, Serialize)]
pub struct FunctionListResponse {
    /// All known functions, most recently created first.
    pub functions: Vec<FunctionRow>,
}

/// Response body wrapping a single [`DeploymentSummary`].
#[derive(Debug, Serialize)]
pub struct DeploymentResponse {
    /// The deployment just created.
    pub deployment: DeploymentSummary,
}

/// Deployment fields exposed over the HTTP surface.
#[derive(Debug, Serialize)]
pub struct DeploymentSummary {
    /// Deployment id.
    pub id: String,
    /// Id of the function this deployment belongs to.
    pub function_id: String,
    /// The deployed ES module source.
    pub source: String,
}

impl From<DeploymentRow> for DeploymentSummary {
    fn from(row: DeploymentRow) -> Self {
        Self {
            id: row.id,
            function_id: row.function_id,
            source: row.source,
        }
    }
}
