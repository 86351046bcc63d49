//! Groups API: lookup, listing, creation and the soft-delete lifecycle.
//!
//! # Design
//! Each operation comes as a `build_*` method producing an `HttpRequest`, a
//! `parse_*` method consuming the matching `HttpResponse`, and a convenience
//! method that runs both through the client's transport. Hosts that want to
//! drive the I/O themselves use the first two; everyone else uses the third.
//!
//! # Consistency
//! GitLab deletes groups asynchronously and, on instances with delayed
//! deletion, only marks them with a purge date. `delete` returning `Ok` says
//! nothing about what the next `get`/`search` will show, and a `get_by_id`
//! right after `create` or `restore` may still report the previous deletion
//! marker for a short while. Use [`GroupsClient::wait_for_deletion`] when the
//! caller needs to observe the deletion.

use crate::client::{check_status, parse_json, to_json_body, Context};
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::pagination::Pages;
use crate::poll::{poll_until, PollOptions, PollState};
use crate::query::{GroupProjectsQuery, GroupQuery, ToQuery};
use crate::types::{Group, GroupCreate, GroupRef, Project};

/// What `wait_for_deletion` observed when it stopped polling.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletionOutcome {
    /// No group matches the name anymore.
    Removed,
    /// The only match is scheduled for deletion.
    MarkedForDeletion(Group),
}

/// Stateless view over the groups endpoints.
#[derive(Clone, Copy)]
pub struct GroupsClient<'c> {
    ctx: Context<'c>,
}

impl<'c> GroupsClient<'c> {
    pub(crate) fn new(ctx: Context<'c>) -> Self {
        Self { ctx }
    }

    // -- request builders ---------------------------------------------------

    pub fn build_get_group(&self, group: impl Into<GroupRef>) -> HttpRequest {
        let group = group.into();
        self.ctx
            .request(HttpMethod::Get, &format!("/groups/{}", group.to_path_segment()))
    }

    /// The page-less listing request; pagination parameters are added per page.
    pub fn build_list_groups(&self, query: &GroupQuery) -> Result<HttpRequest, ApiError> {
        let mut request = self.ctx.request(HttpMethod::Get, "/groups");
        request.query = query.to_query()?;
        Ok(request)
    }

    pub fn build_create_group(&self, payload: &GroupCreate) -> Result<HttpRequest, ApiError> {
        let body = to_json_body(payload)?;
        Ok(self
            .ctx
            .request(HttpMethod::Post, "/groups")
            .with_json_body(body))
    }

    pub fn build_delete_group(&self, group: impl Into<GroupRef>) -> HttpRequest {
        let group = group.into();
        self.ctx
            .request(HttpMethod::Delete, &format!("/groups/{}", group.to_path_segment()))
    }

    /// GitLab only purges a group that is already marked for deletion, and
    /// requires its full path as confirmation.
    pub fn build_delete_group_permanently(&self, id: u64, full_path: &str) -> HttpRequest {
        let mut request = self.build_delete_group(id);
        request.query = vec![
            ("permanently_remove".to_string(), "true".to_string()),
            ("full_path".to_string(), full_path.to_string()),
        ];
        request
    }

    pub fn build_restore_group(&self, id: u64) -> HttpRequest {
        self.ctx
            .request(HttpMethod::Post, &format!("/groups/{id}/restore"))
    }

    pub fn build_list_projects(
        &self,
        group: impl Into<GroupRef>,
        query: &GroupProjectsQuery,
    ) -> Result<HttpRequest, ApiError> {
        let group = group.into();
        let mut request = self.ctx.request(
            HttpMethod::Get,
            &format!("/groups/{}/projects", group.to_path_segment()),
        );
        request.query = query.to_query()?;
        Ok(request)
    }

    // -- response parsers ---------------------------------------------------

    pub fn parse_get_group(&self, response: &HttpResponse) -> Result<Group, ApiError> {
        parse_json(response)
    }

    pub fn parse_create_group(&self, response: &HttpResponse) -> Result<Group, ApiError> {
        parse_json(response)
    }

    /// Any 2xx counts; GitLab answers 202 when the deletion was scheduled.
    pub fn parse_delete_group(&self, response: &HttpResponse) -> Result<(), ApiError> {
        check_status(response)
    }

    /// A group that no longer exists was purged and cannot come back, so 404
    /// is reported as `Conflict` along with 409.
    pub fn parse_restore_group(&self, response: &HttpResponse) -> Result<Group, ApiError> {
        match parse_json(response) {
            Err(ApiError::NotFound(payload)) | Err(ApiError::Conflict(payload)) => {
                Err(ApiError::Conflict(payload))
            }
            other => other,
        }
    }

    // -- operations -----------------------------------------------------------

    /// Fetch one group by id or full path, including its embedded projects.
    pub fn get_by_id(&self, group: impl Into<GroupRef>) -> Result<Group, ApiError> {
        let request = self.build_get_group(group);
        let response = self.ctx.execute(&request)?;
        self.parse_get_group(&response)
    }

    /// Lazily list groups matching `query`. A default query lists whatever the
    /// server returns without filters.
    pub fn get(&self, query: &GroupQuery) -> Result<Pages<'c, Group>, ApiError> {
        let request = self.build_list_groups(query)?;
        Ok(self.ctx.pages(request))
    }

    /// Every group visible to the caller.
    pub fn accessible(&self) -> Result<Pages<'c, Group>, ApiError> {
        self.get(&GroupQuery::default())
    }

    /// Groups whose name or path contains `term`, case-insensitively.
    pub fn search(&self, term: &str) -> Result<Pages<'c, Group>, ApiError> {
        self.get(&GroupQuery::new().with_search(term))
    }

    pub fn create(&self, payload: &GroupCreate) -> Result<Group, ApiError> {
        let request = self.build_create_group(payload)?;
        let response = self.ctx.execute(&request)?;
        let group = self.parse_create_group(&response)?;
        tracing::info!(
            id = group.id,
            path = %group.full_path,
            visibility = group.visibility.as_str(),
            "group created"
        );
        Ok(group)
    }

    /// Schedule deletion. See the module docs for what callers can observe
    /// afterwards.
    pub fn delete(&self, group: impl Into<GroupRef>) -> Result<(), ApiError> {
        let group = group.into();
        let request = self.build_delete_group(group.clone());
        let response = self.ctx.execute(&request)?;
        self.parse_delete_group(&response)?;
        tracing::info!(%group, "group deletion requested");
        Ok(())
    }

    /// Purge a group that is already marked for deletion.
    pub fn delete_permanently(&self, id: u64, full_path: &str) -> Result<(), ApiError> {
        let request = self.build_delete_group_permanently(id, full_path);
        let response = self.ctx.execute(&request)?;
        self.parse_delete_group(&response)
    }

    /// Cancel a pending deletion. Fails with `Conflict` once the group is
    /// purged.
    pub fn restore(&self, id: u64) -> Result<Group, ApiError> {
        let request = self.build_restore_group(id);
        let response = self.ctx.execute(&request)?;
        let group = self.parse_restore_group(&response)?;
        tracing::info!(id, "group restored");
        Ok(group)
    }

    /// Lazily list the projects of a group.
    pub fn projects(
        &self,
        group: impl Into<GroupRef>,
        query: &GroupProjectsQuery,
    ) -> Result<Pages<'c, Project>, ApiError> {
        let request = self.build_list_projects(group, query)?;
        Ok(self.ctx.pages(request))
    }

    /// Poll `search(name)` until the deletion is visible.
    ///
    /// Terminal states are "no match" and "exactly one match, marked for
    /// deletion". Several matches, or a single unmarked one, keep polling.
    /// Returns `ApiError::Timeout` once `options.timeout` has elapsed.
    pub fn wait_for_deletion(
        &self,
        name: &str,
        options: &PollOptions,
    ) -> Result<DeletionOutcome, ApiError> {
        poll_until(options, || {
            let groups = self.search(name)?.collect::<Result<Vec<_>, _>>()?;
            Ok(match groups.as_slice() {
                [] => PollState::Done(DeletionOutcome::Removed),
                [group] if group.is_marked_for_deletion() => {
                    PollState::Done(DeletionOutcome::MarkedForDeletion(group.clone()))
                }
                _ => PollState::Pending,
            })
        })
    }
}
