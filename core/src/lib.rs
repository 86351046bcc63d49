//! Synchronous client core for the GitLab v4 REST API.
//!
//! # Overview
//! Typed operations for groups, group projects and merge requests, built on
//! three shared pieces: query objects that serialize to query-string pairs,
//! a lazy page iterator, and status-code-aware response mapping. The HTTP
//! round-trip itself is delegated to a caller-supplied [`Transport`].
//!
//! # Design
//! - `GitLabClient` holds only configuration and the transport; resource
//!   clients are borrowed, stateless views created per use.
//! - Every operation is also available as a `build_*` / `parse_*` pair, so a
//!   host can execute requests itself.
//! - List operations return [`Pages`], which fetches one page at a time and
//!   only when the previous one has been consumed.
//! - Entity types are defined independently from the mock-server crate;
//!   integration tests catch schema drift.
//!
//! ```ignore
//! let client = GitLabClient::new(ClientConfig::from_env(), my_transport);
//! for group in client.groups().search("example")? {
//!     println!("{}", group?.full_path);
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod groups;
pub mod http;
pub mod merge_requests;
pub mod pagination;
pub mod poll;
pub mod query;
pub mod types;

pub use client::GitLabClient;
pub use config::ClientConfig;
pub use error::{ApiError, ErrorPayload};
pub use groups::{DeletionOutcome, GroupsClient};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use merge_requests::MergeRequestsClient;
pub use pagination::Pages;
pub use poll::{PollOptions, PollState};
pub use query::{GroupOrderBy, GroupProjectsQuery, GroupQuery, ProjectOrderBy, SortOrder, ToQuery};
pub use types::{
    AccessLevel, Group, GroupCreate, GroupRef, GroupStatistics, MergeRequest, MergeRequestAccept,
    Project, Visibility,
};
