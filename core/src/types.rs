//! Wire DTOs for the GitLab v4 API.
//!
//! # Design
//! Read entities and write payloads are separate types: payloads carry only
//! what the server accepts on write, and every optional payload field is
//! skipped when unset so the server applies its own default. These types are
//! defined independently from the mock-server crate; integration tests catch
//! schema drift between the two.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Visibility of a group or project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Internal => "internal",
            Visibility::Public => "public",
        }
    }
}

/// Membership access level; travels as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
}

impl AccessLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            AccessLevel::Guest => 10,
            AccessLevel::Reporter => 20,
            AccessLevel::Developer => 30,
            AccessLevel::Maintainer => 40,
            AccessLevel::Owner => 50,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            10 => Some(AccessLevel::Guest),
            20 => Some(AccessLevel::Reporter),
            30 => Some(AccessLevel::Developer),
            40 => Some(AccessLevel::Maintainer),
            50 => Some(AccessLevel::Owner),
            _ => None,
        }
    }
}

impl Serialize for AccessLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for AccessLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        AccessLevel::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown access level {value}")))
    }
}

/// A group identified either by numeric id or by its full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupRef {
    Id(u64),
    Path(String),
}

impl GroupRef {
    /// The form used as a single URL path segment.
    pub fn to_path_segment(&self) -> String {
        match self {
            GroupRef::Id(id) => id.to_string(),
            GroupRef::Path(path) => urlencoding::encode(path).into_owned(),
        }
    }
}

impl From<u64> for GroupRef {
    fn from(id: u64) -> Self {
        GroupRef::Id(id)
    }
}

impl From<&str> for GroupRef {
    fn from(path: &str) -> Self {
        GroupRef::Path(path.to_string())
    }
}

impl From<String> for GroupRef {
    fn from(path: String) -> Self {
        GroupRef::Path(path)
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRef::Id(id) => write!(f, "{id}"),
            GroupRef::Path(path) => f.write_str(path),
        }
    }
}

/// A group as returned by the API.
///
/// `projects` is only populated by `GET /groups/:id`; listings leave it empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub full_path: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub web_url: String,
    /// Scheduled purge date of a soft-deleted group.
    #[serde(default, deserialize_with = "blank_date_as_none")]
    pub marked_for_deletion_on: Option<NaiveDate>,
    #[serde(default)]
    pub statistics: Option<GroupStatistics>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Group {
    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion_on.is_some()
    }
}

/// Storage statistics, present when a listing asked for `statistics=true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStatistics {
    #[serde(default)]
    pub storage_size: u64,
    #[serde(default)]
    pub repository_size: u64,
    #[serde(default)]
    pub wiki_size: u64,
    #[serde(default)]
    pub lfs_objects_size: u64,
    #[serde(default)]
    pub job_artifacts_size: u64,
}

/// Payload for `POST /groups`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCreate {
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lfs_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_access_enabled: Option<bool>,
}

impl GroupCreate {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            description: None,
            visibility: None,
            parent_id: None,
            lfs_enabled: None,
            request_access_enabled: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// A project as embedded in a group or listed under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    #[serde(default)]
    pub web_url: String,
    #[serde(default)]
    pub archived: bool,
}

/// A merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: u64,
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    /// `opened`, `closed`, `locked` or `merged`.
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    pub sha: Option<String>,
    pub merge_commit_sha: Option<String>,
}

/// Payload for `PUT /projects/:id/merge_requests/:iid/merge`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestAccept {
    /// Custom merge commit message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_remove_source_branch: Option<bool>,
    /// Merge once the pipeline succeeds instead of immediately.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_when_build_succeeds: Option<bool>,
    /// When set, must match the source branch HEAD or the merge is refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

fn blank_date_as_none<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => {
            // Some instances send a full timestamp here.
            let date = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}
