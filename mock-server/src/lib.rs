//! In-memory stand-in for the GitLab v4 groups, projects and merge request
//! endpoints, with GitLab's pagination headers, delayed (soft) deletion and
//! `{"message": ...}` error bodies.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};

/// Days between a soft delete and the scheduled purge.
pub const DELETION_DELAY_DAYS: u64 = 7;
pub const DEFAULT_PER_PAGE: usize = 20;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroupStatistics {
    pub storage_size: u64,
    pub repository_size: u64,
    pub wiki_size: u64,
    pub lfs_objects_size: u64,
    pub job_artifacts_size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub full_name: String,
    pub full_path: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub parent_id: Option<u64>,
    pub web_url: String,
    pub marked_for_deletion_on: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<GroupStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path: String,
    pub path_with_namespace: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub web_url: String,
    pub archived: bool,
    #[serde(skip)]
    pub namespace_id: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeRequest {
    pub id: u64,
    pub iid: u64,
    pub project_id: u64,
    pub title: String,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    pub sha: Option<String>,
    pub merge_commit_sha: Option<String>,
}

/// Body of `POST /groups`. Missing strings default to blank so they are
/// reported as field errors instead of an extractor rejection.
#[derive(Deserialize)]
pub struct CreateGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub path: String,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub parent_id: Option<u64>,
}

#[derive(Deserialize)]
pub struct AcceptMergeRequest {
    pub merge_commit_message: Option<String>,
    pub should_remove_source_branch: Option<bool>,
    pub merge_when_build_succeeds: Option<bool>,
    pub sha: Option<String>,
}

/// Server state. Seed it through the `add_*` methods before handing it to
/// [`app_with`].
#[derive(Debug)]
pub struct Store {
    groups: BTreeMap<u64, Group>,
    projects: BTreeMap<u64, Project>,
    merge_requests: BTreeMap<(u64, u64), MergeRequest>,
    next_id: u64,
    /// When false, `DELETE /groups/:id` removes the group at once.
    pub delayed_deletion: bool,
    /// Hold back `GET /groups` pages numbered at or above `.0` for `.1`.
    pub slow_pages: Option<(usize, Duration)>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
            projects: BTreeMap::new(),
            merge_requests: BTreeMap::new(),
            next_id: 1,
            delayed_deletion: true,
            slow_pages: None,
        }
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_group(&mut self, name: &str, path: &str, visibility: Visibility) -> u64 {
        self.insert_group(name, path, None, visibility, None).id
    }

    pub fn add_subgroup(&mut self, parent_id: u64, name: &str, path: &str) -> Option<u64> {
        self.groups.get(&parent_id)?;
        Some(
            self.insert_group(name, path, None, Visibility::Private, Some(parent_id))
                .id,
        )
    }

    fn insert_group(
        &mut self,
        name: &str,
        path: &str,
        description: Option<String>,
        visibility: Visibility,
        parent_id: Option<u64>,
    ) -> Group {
        let (full_name, full_path) = match parent_id.and_then(|id| self.groups.get(&id)) {
            Some(parent) => (
                format!("{} / {name}", parent.full_name),
                format!("{}/{path}", parent.full_path),
            ),
            None => (name.to_string(), path.to_string()),
        };
        let id = self.allocate_id();
        let group = Group {
            id,
            name: name.to_string(),
            path: path.to_string(),
            full_name,
            web_url: format!("http://localhost/groups/{full_path}"),
            full_path,
            description,
            visibility,
            parent_id,
            marked_for_deletion_on: None,
            statistics: None,
            projects: None,
        };
        self.groups.insert(id, group.clone());
        group
    }

    pub fn add_project(&mut self, group_id: u64, name: &str) -> Option<u64> {
        let namespace = self.groups.get(&group_id)?.full_path.clone();
        let id = self.allocate_id();
        let path = name.to_lowercase().replace(' ', "-");
        self.projects.insert(
            id,
            Project {
                id,
                name: name.to_string(),
                path_with_namespace: format!("{namespace}/{path}"),
                web_url: format!("http://localhost/{namespace}/{path}"),
                path,
                description: None,
                visibility: Visibility::Private,
                archived: false,
                namespace_id: group_id,
            },
        );
        Some(id)
    }

    /// Open a merge request on `project_id`; returns its iid.
    pub fn add_merge_request(
        &mut self,
        project_id: u64,
        title: &str,
        source_branch: &str,
        sha: &str,
    ) -> Option<u64> {
        self.projects.get(&project_id)?;
        let iid = self
            .merge_requests
            .keys()
            .filter(|(project, _)| *project == project_id)
            .count() as u64
            + 1;
        let id = self.allocate_id();
        self.merge_requests.insert(
            (project_id, iid),
            MergeRequest {
                id,
                iid,
                project_id,
                title: title.to_string(),
                state: "opened".to_string(),
                source_branch: source_branch.to_string(),
                target_branch: "main".to_string(),
                sha: Some(sha.to_string()),
                merge_commit_sha: None,
            },
        );
        Some(iid)
    }

    fn find_group(&self, id_or_path: &str) -> Option<&Group> {
        match id_or_path.parse::<u64>() {
            Ok(id) => self.groups.get(&id),
            Err(_) => self.groups.values().find(|g| g.full_path == id_or_path),
        }
    }

    fn group_with_projects(&self, group: &Group) -> Group {
        let mut group = group.clone();
        group.projects = Some(
            self.projects
                .values()
                .filter(|p| p.namespace_id == group.id)
                .cloned()
                .collect(),
        );
        group
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with(Store::default())
}

pub fn app_with(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    Router::new()
        .route("/api/v4/groups", get(list_groups).post(create_group))
        .route("/api/v4/groups/{id}", get(get_group).delete(delete_group))
        .route("/api/v4/groups/{id}/restore", post(restore_group))
        .route("/api/v4/groups/{id}/projects", get(list_group_projects))
        .route(
            "/api/v4/projects/{id}/merge_requests/{iid}",
            get(get_merge_request),
        )
        .route(
            "/api/v4/projects/{id}/merge_requests/{iid}/merge",
            put(accept_merge_request),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, store: Store) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(store)).await
}

/// Raw query pairs; keeps repeated `key[]` entries that a struct extractor
/// would collapse.
struct Params(Vec<(String, String)>);

impl Params {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| v == "true")
    }
}

fn message(status: StatusCode, message: serde_json::Value) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn not_found(what: &str) -> Response {
    message(StatusCode::NOT_FOUND, json!(format!("404 {what} Not Found")))
}

/// Slice `items` according to `page`/`per_page` and attach GitLab's
/// pagination headers.
fn paginate<T: Serialize>(items: Vec<T>, params: &Params) -> Response {
    let per_page = params
        .get("per_page")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_PER_PAGE)
        .clamp(1, MAX_PER_PAGE);
    let page = params
        .get("page")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(1)
        .max(1);

    let total = items.len();
    let total_pages = total.div_ceil(per_page).max(1);
    let next_page = if page < total_pages {
        (page + 1).to_string()
    } else {
        String::new()
    };
    let prev_page = if page > 1 {
        (page - 1).to_string()
    } else {
        String::new()
    };
    let body: Vec<T> = items
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("x-page", page.to_string()),
        ("x-per-page", per_page.to_string()),
        ("x-total", total.to_string()),
        ("x-total-pages", total_pages.to_string()),
        ("x-next-page", next_page),
        ("x-prev-page", prev_page),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    (headers, Json(body)).into_response()
}

fn matches_search(term: Option<&str>, fields: &[&str]) -> bool {
    match term {
        None => true,
        Some(term) => {
            let term = term.to_lowercase();
            fields.iter().any(|f| f.to_lowercase().contains(&term))
        }
    }
}

async fn list_groups(State(db): State<Db>, Query(raw): Query<Vec<(String, String)>>) -> Response {
    let params = Params(raw);
    let skipped: Vec<u64> = params
        .all("skip_groups[]")
        .filter_map(|v| v.parse().ok())
        .collect();
    let top_level_only = params.flag("top_level_only").unwrap_or(false);
    let with_statistics = params.flag("statistics").unwrap_or(false);

    let store = db.read().await;
    let mut groups: Vec<Group> = store
        .groups
        .values()
        .filter(|g| !skipped.contains(&g.id))
        .filter(|g| !top_level_only || g.parent_id.is_none())
        .filter(|g| matches_search(params.get("search"), &[g.name.as_str(), g.path.as_str()]))
        .cloned()
        .map(|mut g| {
            if with_statistics {
                g.statistics = Some(GroupStatistics::default());
            }
            g
        })
        .collect();
    let slow_pages = store.slow_pages;
    drop(store);

    if let Some((from, pause)) = slow_pages {
        let page = params
            .get("page")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1);
        if page >= from {
            tracing::debug!(page, ?pause, "holding back group page");
            tokio::time::sleep(pause).await;
        }
    }

    match params.get("order_by").unwrap_or("name") {
        "name" => groups.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
        "path" => groups.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id))),
        "id" | "similarity" => groups.sort_by_key(|g| g.id),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "order_by does not have a valid value"})),
            )
                .into_response()
        }
    }
    match params.get("sort").unwrap_or("asc") {
        "asc" => {}
        "desc" => groups.reverse(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "sort does not have a valid value"})),
            )
                .into_response()
        }
    }

    paginate(groups, &params)
}

async fn get_group(State(db): State<Db>, Path(id): Path<String>) -> Response {
    let store = db.read().await;
    match store.find_group(&id) {
        Some(group) => Json(store.group_with_projects(group)).into_response(),
        None => not_found("Group"),
    }
}

async fn create_group(State(db): State<Db>, Json(input): Json<CreateGroup>) -> Response {
    let mut store = db.write().await;

    let mut errors = serde_json::Map::new();
    if input.name.trim().is_empty() {
        errors.insert("name".into(), json!(["can't be blank"]));
    }
    if input.path.trim().is_empty() {
        errors.insert("path".into(), json!(["can't be blank"]));
    } else if store
        .groups
        .values()
        .any(|g| g.parent_id == input.parent_id && g.path.eq_ignore_ascii_case(&input.path))
    {
        errors.insert("path".into(), json!(["has already been taken"]));
    }
    if !errors.is_empty() {
        return message(StatusCode::BAD_REQUEST, serde_json::Value::Object(errors));
    }
    if let Some(parent_id) = input.parent_id {
        if !store.groups.contains_key(&parent_id) {
            return not_found("Parent Group");
        }
    }

    let group = store.insert_group(
        &input.name,
        &input.path,
        input.description,
        input.visibility.unwrap_or(Visibility::Private),
        input.parent_id,
    );
    tracing::info!(id = group.id, path = %group.full_path, "group created");
    (StatusCode::CREATED, Json(group)).into_response()
}

async fn delete_group(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(raw): Query<Vec<(String, String)>>,
) -> Response {
    let params = Params(raw);
    let mut store = db.write().await;
    let Some(group) = store.find_group(&id).cloned() else {
        return not_found("Group");
    };

    if params.flag("permanently_remove").unwrap_or(false) {
        if group.marked_for_deletion_on.is_none() {
            return message(
                StatusCode::BAD_REQUEST,
                json!("Group must be marked for deletion first."),
            );
        }
        if params.get("full_path") != Some(group.full_path.as_str()) {
            return message(
                StatusCode::BAD_REQUEST,
                json!("`full_path` is incorrect. You must enter the complete path for the group."),
            );
        }
        store.groups.remove(&group.id);
        tracing::info!(id = group.id, "group purged");
        return message(StatusCode::ACCEPTED, json!("202 Accepted"));
    }

    if !store.delayed_deletion {
        store.groups.remove(&group.id);
        tracing::info!(id = group.id, "group removed");
        return message(StatusCode::ACCEPTED, json!("202 Accepted"));
    }
    if group.marked_for_deletion_on.is_some() {
        return message(
            StatusCode::BAD_REQUEST,
            json!("Group has been already marked for deletion"),
        );
    }
    let purge_on = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(DELETION_DELAY_DAYS));
    if let Some(stored) = store.groups.get_mut(&group.id) {
        stored.marked_for_deletion_on = purge_on;
    }
    tracing::info!(id = group.id, ?purge_on, "group marked for deletion");
    message(StatusCode::ACCEPTED, json!("202 Accepted"))
}

async fn restore_group(State(db): State<Db>, Path(id): Path<String>) -> Response {
    let mut store = db.write().await;
    let Some(group_id) = store.find_group(&id).map(|g| g.id) else {
        return not_found("Group");
    };
    let Some(group) = store.groups.get_mut(&group_id) else {
        return not_found("Group");
    };
    if group.marked_for_deletion_on.is_none() {
        return message(
            StatusCode::BAD_REQUEST,
            json!("Group has not been marked for deletion"),
        );
    }
    group.marked_for_deletion_on = None;
    let group = group.clone();
    tracing::info!(id = group.id, "group restored");
    (StatusCode::CREATED, Json(group)).into_response()
}

async fn list_group_projects(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(raw): Query<Vec<(String, String)>>,
) -> Response {
    let params = Params(raw);
    let store = db.read().await;
    let Some(group) = store.find_group(&id) else {
        return not_found("Group");
    };
    let include_subgroups = params.flag("include_subgroups").unwrap_or(false);
    let namespaces: Vec<u64> = store
        .groups
        .values()
        .filter(|g| {
            g.id == group.id
                || (include_subgroups && g.full_path.starts_with(&format!("{}/", group.full_path)))
        })
        .map(|g| g.id)
        .collect();
    let visibility = params.get("visibility");
    let archived = params.flag("archived");

    let projects: Vec<Project> = store
        .projects
        .values()
        .filter(|p| namespaces.contains(&p.namespace_id))
        .filter(|p| archived.is_none_or(|a| p.archived == a))
        .filter(|p| {
            visibility.is_none_or(|v| serde_json::to_value(&p.visibility).ok() == Some(json!(v)))
        })
        .filter(|p| matches_search(params.get("search"), &[p.name.as_str(), p.path.as_str()]))
        .cloned()
        .collect();

    paginate(projects, &params)
}

async fn get_merge_request(
    State(db): State<Db>,
    Path((project_id, iid)): Path<(u64, u64)>,
) -> Response {
    let store = db.read().await;
    match store.merge_requests.get(&(project_id, iid)) {
        Some(mr) => Json(mr.clone()).into_response(),
        None => not_found("Merge Request"),
    }
}

async fn accept_merge_request(
    State(db): State<Db>,
    Path((project_id, iid)): Path<(u64, u64)>,
    Json(input): Json<AcceptMergeRequest>,
) -> Response {
    let mut store = db.write().await;
    let Some(mr) = store.merge_requests.get_mut(&(project_id, iid)) else {
        return not_found("Merge Request");
    };
    if mr.state != "opened" {
        return message(StatusCode::METHOD_NOT_ALLOWED, json!("405 Method Not Allowed"));
    }
    if let Some(expected) = &input.sha {
        if mr.sha.as_ref() != Some(expected) {
            return message(
                StatusCode::CONFLICT,
                json!("SHA does not match HEAD of source branch"),
            );
        }
    }
    if input.merge_when_build_succeeds == Some(true) {
        // No pipelines here; the merge happens right away.
        tracing::debug!(project_id, iid, "merge_when_build_succeeds ignored");
    }
    mr.state = "merged".to_string();
    mr.merge_commit_sha = Some(format!("{:040x}", mr.id));
    tracing::info!(
        project_id,
        iid,
        commit_message = input.merge_commit_message.as_deref().unwrap_or(""),
        remove_source = input.should_remove_source_branch.unwrap_or(false),
        "merge request merged"
    );
    Json(mr.clone()).into_response()
}
