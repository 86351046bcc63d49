//! Query objects for list endpoints and their query-string serializer.
//!
//! # Design
//! A query object is a plain `Serialize` struct whose fields are all
//! `Option`s marked `skip_serializing_if = "Option::is_none"`. The serde
//! attributes are the field-to-wire-name table; [`serialize_query`] walks the
//! serialized object and flattens it into ordered `(key, value)` pairs.
//! `None` never reaches the output, while `Some(false)` or `Some(0)` always
//! does. List values are emitted as repeated `key[]=value` pairs.

use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::types::{AccessLevel, Visibility};

/// Flatten a query object into query-string pairs in field declaration order.
pub fn serialize_query<Q: Serialize + ?Sized>(query: &Q) -> Result<Vec<(String, String)>, ApiError> {
    let value = serde_json::to_value(query).map_err(|e| ApiError::Serialization(e.to_string()))?;
    let fields = match value {
        Value::Object(fields) => fields,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ApiError::Serialization(format!(
                "query must serialize to an object, got {other}"
            )))
        }
    };

    let mut pairs = Vec::with_capacity(fields.len());
    for (key, value) in fields {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                let array_key = format!("{key}[]");
                for item in items {
                    pairs.push((array_key.clone(), scalar(&key, item)?));
                }
            }
            other => pairs.push((key.clone(), scalar(&key, other)?)),
        }
    }
    Ok(pairs)
}

fn scalar(key: &str, value: Value) -> Result<String, ApiError> {
    match value {
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        other => Err(ApiError::Serialization(format!(
            "query field `{key}` is not a scalar: {other}"
        ))),
    }
}

/// Implemented by every query object a resource client accepts.
pub trait ToQuery: Serialize {
    fn to_query(&self) -> Result<Vec<(String, String)>, ApiError> {
        serialize_query(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOrderBy {
    Name,
    Path,
    Id,
    Similarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectOrderBy {
    Id,
    Name,
    Path,
    CreatedAt,
    UpdatedAt,
    LastActivityAt,
}

/// Filters for `GET /groups`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupQuery {
    /// Group ids to leave out of the listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_groups: Option<Vec<u64>>,
    /// Include every group the caller can see, not just memberships.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<GroupOrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_custom_attributes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_access_level: Option<AccessLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_level_only: Option<bool>,
}

impl ToQuery for GroupQuery {}

impl GroupQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn with_skip_groups(mut self, ids: impl IntoIterator<Item = u64>) -> Self {
        self.skip_groups = Some(ids.into_iter().collect());
        self
    }

    pub fn with_all_available(mut self, all_available: bool) -> Self {
        self.all_available = Some(all_available);
        self
    }

    pub fn with_order_by(mut self, order_by: GroupOrderBy) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_statistics(mut self, statistics: bool) -> Self {
        self.statistics = Some(statistics);
        self
    }

    pub fn with_custom_attributes(mut self, with_custom_attributes: bool) -> Self {
        self.with_custom_attributes = Some(with_custom_attributes);
        self
    }

    pub fn with_owned(mut self, owned: bool) -> Self {
        self.owned = Some(owned);
        self
    }

    pub fn with_min_access_level(mut self, level: AccessLevel) -> Self {
        self.min_access_level = Some(level);
        self
    }

    pub fn with_top_level_only(mut self, top_level_only: bool) -> Self {
        self.top_level_only = Some(top_level_only);
        self
    }
}

/// Filters for `GET /groups/:id/projects`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupProjectsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<ProjectOrderBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_subgroups: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owned: Option<bool>,
}

impl ToQuery for GroupProjectsQuery {}
