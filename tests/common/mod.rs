use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use github_graph_scraper::domain::{NodeLabel, RelKind, RelationshipEnd};
use github_graph_scraper::github::{FetchError, ResourceFetcher};
use github_graph_scraper::neo4j::Neo4jError;
use github_graph_scraper::store::{GraphStore, StoreError};

pub const BASE_URL: &str = "https://api.test";

#[derive(Clone, Debug)]
pub enum StubResponse {
    Page(Vec<Value>),
    RateLimited,
    Broken,
}

/// Scripted page responses keyed by full URL. The last scripted response
/// for a URL repeats, so a stub can model a stream that never dries up;
/// unscripted URLs yield empty pages.
#[derive(Default)]
pub struct StubFetcher {
    responses: Mutex<HashMap<String, VecDeque<StubResponse>>>,
    requests: AtomicU64,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stub(&self, url: &str, response: StubResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn stub_page(&self, url: &str, entities: Vec<Value>) {
        self.stub(url, StubResponse::Page(entities));
    }
}

#[async_trait]
impl ResourceFetcher for StubFetcher {
    async fn get(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let mut responses = self.responses.lock().unwrap();
        let response = match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(StubResponse::Page(Vec::new())),
            None => StubResponse::Page(Vec::new()),
        };
        drop(responses);

        match response {
            StubResponse::Page(page) => Ok(page),
            StubResponse::RateLimited => Err(FetchError::RateLimitExceeded),
            StubResponse::Broken => Err(FetchError::Status {
                url: url.to_string(),
                status: 500,
            }),
        }
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Node {
        label: &'static str,
        match_value: String,
    },
    Relationship {
        kind: &'static str,
        source: String,
        target: String,
    },
    Bookmark(i64),
}

/// In-memory store double. Records every write, tracks which nodes exist so
/// that an edge referencing an unwritten endpoint fails (and is counted as
/// an ordering violation), and can be told to fail specific node writes.
#[derive(Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<Call>>,
    nodes: Mutex<HashSet<(String, String)>>,
    failing_node_values: Mutex<HashSet<String>>,
    ordering_violations: Mutex<Vec<Call>>,
    max_repo_id: Mutex<i64>,
    bookmark: Mutex<i64>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node write whose match value equals `value` fails.
    pub fn fail_node_writes_for(&self, value: &str) {
        self.failing_node_values
            .lock()
            .unwrap()
            .insert(value.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_node(&self, label: &str, value: &str) -> bool {
        self.calls().iter().any(|c| {
            matches!(c, Call::Node { label: l, match_value } if *l == label && match_value == value)
        })
    }

    pub fn has_relationship(&self, kind: &str, source: &str, target: &str) -> bool {
        self.calls().iter().any(|c| {
            matches!(c, Call::Relationship { kind: k, source: s, target: t }
                if *k == kind && s == source && t == target)
        })
    }

    pub fn relationship_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Relationship { .. }))
            .count()
    }

    pub fn ordering_violations(&self) -> usize {
        self.ordering_violations.lock().unwrap().len()
    }

    pub fn bookmark(&self) -> i64 {
        *self.bookmark.lock().unwrap()
    }
}

/// Any constructible store error works as an injected write failure.
fn injected_write_failure() -> StoreError {
    StoreError::Neo4j(Neo4jError::ConnectTimeout(Duration::from_millis(0)))
}

#[async_trait]
impl GraphStore for RecordingStore {
    async fn write_node(
        &self,
        label: NodeLabel,
        properties: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let spec = label.spec();
        let match_value = properties
            .get(spec.match_property)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(StoreError::MissingMatchProperty {
                label: label.as_str(),
                property: spec.match_property,
            })?;

        if self.failing_node_values.lock().unwrap().contains(&match_value) {
            return Err(injected_write_failure());
        }

        if label == NodeLabel::Repo {
            if let Some(id) = properties.get("external_id").and_then(Value::as_i64) {
                let mut max = self.max_repo_id.lock().unwrap();
                *max = (*max).max(id);
            }
        }

        self.nodes
            .lock()
            .unwrap()
            .insert((label.as_str().to_string(), match_value.clone()));
        self.calls.lock().unwrap().push(Call::Node {
            label: label.as_str(),
            match_value,
        });
        Ok(())
    }

    async fn write_relationship(
        &self,
        source: &RelationshipEnd,
        target: &RelationshipEnd,
        kind: RelKind,
    ) -> Result<(), StoreError> {
        let nodes = self.nodes.lock().unwrap();
        let source_exists =
            nodes.contains(&(source.label.as_str().to_string(), source.value.clone()));
        let target_exists =
            nodes.contains(&(target.label.as_str().to_string(), target.value.clone()));
        drop(nodes);

        let call = Call::Relationship {
            kind: kind.as_str(),
            source: source.value.clone(),
            target: target.value.clone(),
        };

        if !source_exists || !target_exists {
            self.ordering_violations.lock().unwrap().push(call);
            return Err(StoreError::EndpointNotMatched {
                kind: kind.as_str(),
                source_value: source.value.clone(),
                target_value: target.value.clone(),
            });
        }

        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    async fn max_repo_external_id(&self) -> i64 {
        *self.max_repo_id.lock().unwrap()
    }

    async fn user_bookmark(&self) -> i64 {
        *self.bookmark.lock().unwrap()
    }

    async fn update_user_bookmark(&self, external_id: i64) -> Result<(), StoreError> {
        *self.bookmark.lock().unwrap() = external_id;
        self.calls.lock().unwrap().push(Call::Bookmark(external_id));
        Ok(())
    }
}
