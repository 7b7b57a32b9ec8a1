//! RPC Method Handlers
//!
//! Thin translation between wire types and the job lifecycle service.

use crate::error::to_rpc_error;
use crate::types::{
    CancelRequest, CancelResponse, CreateTransferRequest, CreateTransferResponse, GetJobRequest,
    InitiateAuthRequest, InitiateAuthResponse,
};
use jsonrpsee::types::ErrorObjectOwned;
use portability_core::application::callback::encode_job_id;
use portability_core::application::{JobLifecycleService, JobStatus};
use portability_core::domain::{AuthMode, DataVertical};
use portability_core::error::AppError;
use std::sync::Arc;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    lifecycle: Arc<JobLifecycleService>,
}

impl RpcHandler {
    pub fn new(lifecycle: Arc<JobLifecycleService>) -> Self {
        Self { lifecycle }
    }

    /// transfer.create.v1
    pub async fn create_transfer(
        &self,
        params: CreateTransferRequest,
    ) -> Result<CreateTransferResponse, ErrorObjectOwned> {
        let data_type: DataVertical = params
            .data_type
            .parse::<DataVertical>()
            .map_err(|e| to_rpc_error(AppError::InvalidArgument(e.to_string())))?;

        let job = self
            .lifecycle
            .create_job(&params.export_service, &params.import_service, data_type)
            .await
            .map_err(to_rpc_error)?;

        Ok(CreateTransferResponse {
            encoded_job_id: encode_job_id(&job.id),
            state: job.state().to_string(),
            job_id: job.id,
        })
    }

    /// auth.initiate.v1
    pub async fn initiate_auth(
        &self,
        params: InitiateAuthRequest,
    ) -> Result<InitiateAuthResponse, ErrorObjectOwned> {
        let mode: AuthMode = params
            .mode
            .parse()
            .map_err(|_| {
                to_rpc_error(AppError::InvalidArgument(format!(
                    "Unknown auth mode: {}",
                    params.mode
                )))
            })?;

        let request = self
            .lifecycle
            .initiate_auth(&params.job_id, mode)
            .await
            .map_err(to_rpc_error)?;
        let status = self
            .lifecycle
            .status(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(InitiateAuthResponse {
            job_id: request.job_id,
            mode: request.mode.to_string(),
            auth_url: request.auth_url,
            state: status.state.to_string(),
        })
    }

    /// job.get.v1
    pub async fn get_job(&self, params: GetJobRequest) -> Result<JobStatus, ErrorObjectOwned> {
        self.lifecycle
            .status(&params.job_id)
            .await
            .map_err(to_rpc_error)
    }

    /// job.cancel.v1
    pub async fn cancel(&self, params: CancelRequest) -> Result<CancelResponse, ErrorObjectOwned> {
        let status = self
            .lifecycle
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;

        Ok(CancelResponse {
            job_id: status.job_id,
            state: status.state.to_string(),
            cancel_requested: status.cancel_requested,
        })
    }
}
