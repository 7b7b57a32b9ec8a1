//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use serde::{Deserialize, Serialize};

/// transfer.create.v1 - Create a portability job
#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub export_service: String,
    pub import_service: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTransferResponse {
    pub job_id: String,
    pub state: String,
    /// base64url job id, the value of the id cookie the callback expects
    pub encoded_job_id: String,
}

/// auth.initiate.v1 - Start authorization for one side of a job
#[derive(Debug, Deserialize)]
pub struct InitiateAuthRequest {
    pub job_id: String,
    /// EXPORT or IMPORT
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateAuthResponse {
    pub job_id: String,
    pub mode: String,
    pub auth_url: String,
    pub state: String,
}

/// job.get.v1 - Get job status
#[derive(Debug, Deserialize)]
pub struct GetJobRequest {
    pub job_id: String,
}

/// job.cancel.v1 - Cancel a job
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub state: String,
    pub cancel_requested: bool,
}
