//! Merge request lookup and acceptance.

use crate::client::{parse_json, to_json_body, Context};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{MergeRequest, MergeRequestAccept};

#[derive(Clone, Copy)]
pub struct MergeRequestsClient<'c> {
    ctx: Context<'c>,
}

impl<'c> MergeRequestsClient<'c> {
    pub(crate) fn new(ctx: Context<'c>) -> Self {
        Self { ctx }
    }

    pub fn build_get_merge_request(&self, project_id: u64, iid: u64) -> HttpRequest {
        self.ctx.request(
            HttpMethod::Get,
            &format!("/projects/{project_id}/merge_requests/{iid}"),
        )
    }

    pub fn build_accept_merge_request(
        &self,
        project_id: u64,
        iid: u64,
        accept: &MergeRequestAccept,
    ) -> Result<HttpRequest, ApiError> {
        let body = to_json_body(accept)?;
        Ok(self
            .ctx
            .request(
                HttpMethod::Put,
                &format!("/projects/{project_id}/merge_requests/{iid}/merge"),
            )
            .with_json_body(body))
    }

    pub fn parse_get_merge_request(&self, response: &HttpResponse) -> Result<MergeRequest, ApiError> {
        parse_json(response)
    }

    /// 405 (not mergeable), 406 (conflicts) and 409 (SHA mismatch) all mean
    /// the merge request's current state forbids the merge, so they map to
    /// `Conflict`.
    pub fn parse_accept_merge_request(
        &self,
        response: &HttpResponse,
    ) -> Result<MergeRequest, ApiError> {
        match parse_json(response) {
            Err(ApiError::Http(payload)) if matches!(payload.status, 405 | 406) => {
                Err(ApiError::Conflict(payload))
            }
            other => other,
        }
    }

    pub fn get(&self, project_id: u64, iid: u64) -> Result<MergeRequest, ApiError> {
        let request = self.build_get_merge_request(project_id, iid);
        let response = self.ctx.execute(&request)?;
        self.parse_get_merge_request(&response)
    }

    /// Merge the merge request `iid` of project `project_id`.
    pub fn accept(
        &self,
        project_id: u64,
        iid: u64,
        accept: &MergeRequestAccept,
    ) -> Result<MergeRequest, ApiError> {
        let request = self.build_accept_merge_request(project_id, iid, accept)?;
        let response = self.ctx.execute(&request)?;
        let merged = self.parse_accept_merge_request(&response)?;
        tracing::info!(project_id, iid, state = %merged.state, "merge request accepted");
        Ok(merged)
    }
}
