//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port with its own seeded
//! store, then drives the core over real HTTP through a ureq-backed
//! `Transport`. Validates that request building, query serialization,
//! pagination and response mapping line up with the server's behavior.

use std::time::Duration;

use gitlab_core::{
    ApiError, ClientConfig, DeletionOutcome, GitLabClient, Group, GroupCreate, GroupOrderBy,
    GroupProjectsQuery, GroupQuery, HttpMethod, HttpRequest, HttpResponse, MergeRequestAccept,
    PollOptions, SortOrder, Transport, TransportError, Visibility,
};
use mock_server::Store;

/// Deadline used when a request carries none of its own.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking `Transport` over ureq. Error statuses come back as ordinary
/// responses; mapping them is the client's job.
struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

/// Attach the query pairs and the request's own deadline.
fn prepare<B>(
    mut builder: ureq::RequestBuilder<B>,
    req: &HttpRequest,
    deadline: Duration,
) -> ureq::RequestBuilder<B> {
    for (key, value) in &req.query {
        builder = builder.query(key, value);
    }
    builder.config().timeout_global(Some(deadline)).build()
}

impl Transport for UreqTransport {
    fn send(&self, req: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let deadline = req.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let result = match (req.method, req.body.as_deref()) {
            (HttpMethod::Get, _) => prepare(self.agent.get(&req.path), req, deadline).call(),
            (HttpMethod::Delete, _) => prepare(self.agent.delete(&req.path), req, deadline).call(),
            (HttpMethod::Post, Some(body)) => prepare(self.agent.post(&req.path), req, deadline)
                .content_type("application/json")
                .send(body.as_bytes()),
            (HttpMethod::Post, None) => {
                prepare(self.agent.post(&req.path), req, deadline).send_empty()
            }
            (HttpMethod::Put, Some(body)) => prepare(self.agent.put(&req.path), req, deadline)
                .content_type("application/json")
                .send(body.as_bytes()),
            (HttpMethod::Put, None) => {
                prepare(self.agent.put(&req.path), req, deadline).send_empty()
            }
        };

        let mut response = result.map_err(|e| match e {
            ureq::Error::Timeout(_) => TransportError::TimedOut(deadline),
            other => TransportError::Connection(other.to_string()),
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.body_mut().read_to_string().map_err(|e| match e {
            ureq::Error::Timeout(_) => TransportError::TimedOut(deadline),
            other => TransportError::Protocol(format!("reading body: {other}")),
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Start the mock server on a random port and return its API root.
fn start_server(store: Store) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with(listener, store).await
        })
        .unwrap();
    });

    format!("http://{addr}/api/v4")
}

fn client_for(store: Store, per_page: u32) -> GitLabClient<UreqTransport> {
    let config = ClientConfig::new(&start_server(store)).with_per_page(per_page);
    GitLabClient::new(config, UreqTransport::new())
}

fn client_with_config(store: Store, configure: impl FnOnce(ClientConfig) -> ClientConfig) -> GitLabClient<UreqTransport> {
    let config = configure(ClientConfig::new(&start_server(store)));
    GitLabClient::new(config, UreqTransport::new())
}

fn collect(pages: gitlab_core::Pages<'_, Group>) -> Vec<Group> {
    pages.collect::<Result<_, _>>().unwrap()
}

fn seeded() -> Store {
    let mut store = Store::new();
    let example = store.add_group("example", "example", mock_server::Visibility::Public);
    store.add_group("Example Tools", "example-tools", mock_server::Visibility::Internal);
    store.add_group("other", "other", mock_server::Visibility::Private);
    store.add_project(example, "Example Project").unwrap();
    store
}

fn fast_poll() -> PollOptions {
    PollOptions::new(Duration::from_secs(5), Duration::from_millis(20))
}

#[test]
fn create_delete_restore_lifecycle() {
    let client = client_for(Store::new(), 20);
    let groups = client.groups();

    // Step 1: create.
    let payload = GroupCreate::new("NewGroup1234", "NewGroupPath1234").with_visibility(Visibility::Internal);
    let created = groups.create(&payload).unwrap();
    assert_eq!(created.name, payload.name);
    assert_eq!(created.path, payload.path);
    assert_eq!(created.visibility, Visibility::Internal);

    // Step 2: read back by id; payload-covered fields match.
    let fetched = groups.get_by_id(created.id).unwrap();
    assert_eq!(fetched.name, payload.name);
    assert_eq!(fetched.path, payload.path);
    assert_eq!(Some(fetched.visibility), payload.visibility);
    assert_eq!(fetched, groups.get_by_id(created.id).unwrap());

    // Step 3: search finds exactly this group.
    let found = collect(groups.search("NewGroup1234").unwrap());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, created.id);

    // Step 4: delete, then wait for the deletion to become visible.
    groups.delete(created.id).unwrap();
    match groups.wait_for_deletion("NewGroup1234", &fast_poll()).unwrap() {
        DeletionOutcome::MarkedForDeletion(group) => assert_eq!(group.id, created.id),
        DeletionOutcome::Removed => panic!("delayed deletion should keep the group listed"),
    }

    // Step 5: restore; the marker is gone and the id is unchanged.
    let restored = groups.restore(created.id).unwrap();
    assert!(!restored.is_marked_for_deletion());
    let found = collect(groups.search("NewGroup1234").unwrap());
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, created.id);
    assert!(!found[0].is_marked_for_deletion());
}

#[test]
fn immediate_deletion_is_observed_as_removed() {
    let mut store = seeded();
    store.delayed_deletion = false;
    let client = client_for(store, 20);
    let groups = client.groups();

    let other = collect(groups.search("other").unwrap()).remove(0);
    groups.delete(other.id).unwrap();
    let outcome = groups.wait_for_deletion("other", &fast_poll()).unwrap();
    assert_eq!(outcome, DeletionOutcome::Removed);
    assert!(groups.get_by_id(other.id).unwrap_err().is_not_found());
}

#[test]
fn purged_group_cannot_be_restored() {
    let client = client_for(seeded(), 20);
    let groups = client.groups();

    let group = groups.get_by_id("other").unwrap();
    groups.delete(group.id).unwrap();
    groups.delete_permanently(group.id, &group.full_path).unwrap();
    let err = groups.restore(group.id).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(ref p) if p.status == 404), "{err:?}");
}

#[test]
fn default_query_lists_groups() {
    let client = client_for(seeded(), 20);
    let all = collect(client.groups().get(&GroupQuery::default()).unwrap());
    assert_eq!(all.len(), 3);
    assert_eq!(collect(client.groups().accessible().unwrap()).len(), 3);
}

#[test]
fn search_example_matches_one_exact_name() {
    let client = client_for(seeded(), 20);
    let query = GroupQuery::new().with_search("example");
    let exact = collect(client.groups().get(&query).unwrap())
        .iter()
        .filter(|g| g.name.eq_ignore_ascii_case("example"))
        .count();
    assert_eq!(exact, 1);
}

#[test]
fn skip_groups_excludes_ids() {
    let client = client_for(seeded(), 20);
    let skipped = [1, 3];
    for id in skipped {
        client.groups().get_by_id(id).unwrap();
    }
    let result = collect(
        client
            .groups()
            .get(&GroupQuery::new().with_skip_groups(skipped))
            .unwrap(),
    );
    assert!(!result.is_empty());
    for id in skipped {
        assert!(!result.iter().any(|g| g.id == id), "group {id} found in results");
    }
}

#[test]
fn filters_and_ordering_are_accepted() {
    let client = client_for(seeded(), 20);
    let groups = client.groups();
    let queries = [
        GroupQuery::new().with_order_by(GroupOrderBy::Name),
        GroupQuery::new().with_order_by(GroupOrderBy::Path),
        GroupQuery::new().with_order_by(GroupOrderBy::Id).with_sort(SortOrder::Desc),
        GroupQuery::new().with_sort(SortOrder::Asc),
        GroupQuery::new().with_statistics(true),
        GroupQuery::new().with_custom_attributes(true),
        GroupQuery::new().with_owned(true),
        GroupQuery::new().with_all_available(true),
        GroupQuery::new().with_min_access_level(gitlab_core::AccessLevel::Guest),
        GroupQuery::new().with_min_access_level(gitlab_core::AccessLevel::Owner),
    ];
    for query in &queries {
        let result = collect(groups.get(query).unwrap());
        assert!(!result.is_empty(), "{query:?} returned nothing");
    }

    let stats = collect(groups.get(&GroupQuery::new().with_statistics(true)).unwrap());
    assert!(stats.iter().all(|g| g.statistics.is_some()));

    let desc = collect(
        groups
            .get(&GroupQuery::new().with_order_by(GroupOrderBy::Id).with_sort(SortOrder::Desc))
            .unwrap(),
    );
    let ids: Vec<u64> = desc.iter().map(|g| g.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
}

#[test]
fn two_n_plus_one_groups_take_three_pages() {
    const N: u32 = 2;
    let mut store = Store::new();
    for i in 0..(2 * N + 1) {
        store.add_group(&format!("team-{i}"), &format!("team-{i}"), mock_server::Visibility::Private);
    }
    let client = client_for(store, N);

    let query = GroupQuery::new().with_order_by(GroupOrderBy::Id);
    let mut pages = client.groups().get(&query).unwrap();
    let ids: Vec<u64> = pages.by_ref().map(|g| g.unwrap().id).collect();

    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(pages.pages_fetched(), 3);
}

#[test]
fn group_by_id_and_full_path_embeds_projects() {
    let client = client_for(seeded(), 20);
    let by_id = client.groups().get_by_id(1u64).unwrap();
    assert!(!by_id.projects.is_empty());
    let by_path = client.groups().get_by_id(by_id.full_path.as_str()).unwrap();
    assert_eq!(by_path.id, by_id.id);
    assert!(!by_path.projects.is_empty());
}

#[test]
fn group_projects_are_paginated() {
    let mut store = Store::new();
    let group = store.add_group("big", "big", mock_server::Visibility::Public);
    for i in 0..5 {
        store.add_project(group, &format!("Repo {i}")).unwrap();
    }
    let client = client_for(store, 2);

    let mut pages = client
        .groups()
        .projects("big", &GroupProjectsQuery::default())
        .unwrap();
    let names: Vec<String> = pages.by_ref().map(|p| p.unwrap().name).collect();
    assert_eq!(names.len(), 5);
    assert_eq!(pages.pages_fetched(), 3);
}

#[test]
fn errors_keep_the_remote_payload() {
    let client = client_for(seeded(), 20);
    let groups = client.groups();

    let err = groups.get_by_id(999u64).unwrap_err();
    match err {
        ApiError::NotFound(payload) => {
            assert_eq!(payload.status, 404);
            assert!(payload.message.contains("404 Group Not Found"));
        }
        other => panic!("expected not found, got {other:?}"),
    }

    let err = groups.create(&GroupCreate::new("", "example")).unwrap_err();
    match err {
        ApiError::Validation { payload, fields } => {
            assert_eq!(payload.status, 400);
            assert_eq!(fields["name"], vec!["can't be blank"]);
            assert_eq!(fields["path"], vec!["has already been taken"]);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn accept_merge_request() {
    let mut store = Store::new();
    let group = store.add_group("g", "g", mock_server::Visibility::Private);
    let project = store.add_project(group, "Repo").unwrap();
    let iid = store.add_merge_request(project, "Feature", "feature", "abc").unwrap();
    let client = client_for(store, 20);
    let mrs = client.merge_requests();

    let mismatch = MergeRequestAccept {
        sha: Some("zzz".into()),
        ..Default::default()
    };
    assert!(matches!(
        mrs.accept(project, iid, &mismatch).unwrap_err(),
        ApiError::Conflict(_)
    ));

    let accept = MergeRequestAccept {
        merge_commit_message: Some("Merge feature".into()),
        should_remove_source_branch: Some(true),
        sha: Some("abc".into()),
        ..Default::default()
    };
    let merged = mrs.accept(project, iid, &accept).unwrap();
    assert_eq!(merged.state, "merged");
    assert_eq!(mrs.get(project, iid).unwrap(), merged);

    let err = mrs.accept(project, iid, &MergeRequestAccept::default()).unwrap_err();
    assert!(matches!(err, ApiError::Conflict(ref p) if p.status == 405));
}

#[test]
fn request_deadline_aborts_a_slow_page() {
    let mut store = Store::new();
    for name in ["a", "b", "c"] {
        store.add_group(name, name, mock_server::Visibility::Public);
    }
    store.slow_pages = Some((2, Duration::from_secs(3)));
    let deadline = Duration::from_millis(300);
    let client = client_with_config(store, |config| {
        config.with_per_page(2).with_request_timeout(deadline)
    });

    let mut pages = client
        .groups()
        .get(&GroupQuery::new().with_order_by(GroupOrderBy::Id))
        .unwrap();
    assert_eq!(pages.next().unwrap().unwrap().id, 1);
    assert_eq!(pages.next().unwrap().unwrap().id, 2);
    match pages.next() {
        Some(Err(ApiError::Timeout(after))) => assert_eq!(after, deadline),
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert!(pages.next().is_none());
    assert_eq!(pages.pages_fetched(), 2);
}
