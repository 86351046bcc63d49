//! Entry point tying configuration and transport to the resource clients.
//!
//! # Design
//! `GitLabClient` owns an immutable `ClientConfig` and a `Transport`; it has
//! no interior mutability, so one instance can be shared across threads as
//! long as the transport can. Resource clients such as `GroupsClient` are
//! cheap borrowed views created per use. Every operation builds its own
//! `HttpRequest`, sends it, and parses the `HttpResponse` it got back.

use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::groups::GroupsClient;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::merge_requests::MergeRequestsClient;
use crate::pagination::Pages;

/// Client for the GitLab v4 REST API over a caller-supplied transport.
#[derive(Debug, Clone)]
pub struct GitLabClient<T> {
    config: ClientConfig,
    transport: T,
}

impl<T: Transport> GitLabClient<T> {
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn groups(&self) -> GroupsClient<'_> {
        GroupsClient::new(self.context())
    }

    pub fn merge_requests(&self) -> MergeRequestsClient<'_> {
        MergeRequestsClient::new(self.context())
    }

    fn context(&self) -> Context<'_> {
        Context {
            config: &self.config,
            transport: &self.transport,
        }
    }
}

/// Borrowed configuration and transport shared by the resource clients.
#[derive(Clone, Copy)]
pub(crate) struct Context<'c> {
    pub(crate) config: &'c ClientConfig,
    pub(crate) transport: &'c dyn Transport,
}

impl<'c> Context<'c> {
    /// A request for `base_url` + `path`, carrying the configured deadline.
    pub(crate) fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        let mut request = HttpRequest::new(method, format!("{}{path}", self.config.base_url));
        request.timeout = self.config.request_timeout;
        request
    }

    pub(crate) fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(
            method = request.method.as_str(),
            path = %request.path,
            params = request.query.len(),
            "sending request"
        );
        let response = self.transport.send(request)?;
        tracing::debug!(path = %request.path, status = response.status, "response received");
        Ok(response)
    }

    pub(crate) fn pages<E: DeserializeOwned>(&self, request: HttpRequest) -> Pages<'c, E> {
        Pages::new(self.transport, request, self.config.per_page)
    }
}

/// Map a non-2xx response to its `ApiError`.
pub(crate) fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    tracing::warn!(status = response.status, "request rejected by server");
    Err(ApiError::from_response(response))
}

pub(crate) fn parse_json<E: DeserializeOwned>(response: &HttpResponse) -> Result<E, ApiError> {
    check_status(response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

pub(crate) fn to_json_body<B: serde::Serialize>(body: &B) -> Result<String, ApiError> {
    serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))
}
