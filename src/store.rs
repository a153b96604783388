use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use neo4rs::Graph;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{NodeLabel, RelKind, RelationshipEnd};
use crate::neo4j::{self, Neo4jError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Neo4j(#[from] Neo4jError),
    #[error("{label} properties are missing match property {property}")]
    MissingMatchProperty {
        label: &'static str,
        property: &'static str,
    },
    #[error("no matched endpoints for {kind} relationship ({source_value} -> {target_value})")]
    EndpointNotMatched {
        kind: &'static str,
        source_value: String,
        target_value: String,
    },
}

/// Write side of the crawl. Node upserts are keyed by the label's match
/// property; an edge upsert assumes both endpoints were already written.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn write_node(
        &self,
        label: NodeLabel,
        properties: Map<String, Value>,
    ) -> Result<(), StoreError>;

    async fn write_relationship(
        &self,
        source: &RelationshipEnd,
        target: &RelationshipEnd,
        kind: RelKind,
    ) -> Result<(), StoreError>;

    /// Max `external_id` among written `Repo` nodes; 0 when the store is
    /// empty or the read fails.
    async fn max_repo_external_id(&self) -> i64;

    /// Last processed user `external_id`; 0 when no bookmark exists or the
    /// read fails.
    async fn user_bookmark(&self) -> i64;

    async fn update_user_bookmark(&self, external_id: i64) -> Result<(), StoreError>;
}

pub type DynGraphStore = Arc<dyn GraphStore>;

const MAX_REPO_EXTERNAL_ID: &str =
    "MATCH (r:Repo) RETURN r.external_id AS external_id ORDER BY r.external_id DESC LIMIT 1";
const USER_BOOKMARK: &str =
    "MATCH (b:UserBookmark) RETURN b.external_id AS external_id LIMIT 1";
const UPDATE_USER_BOOKMARK: &str = "MERGE (b:UserBookmark) SET b.external_id = $external_id";

pub struct Neo4jGraphStore {
    graph: Graph,
    upsert_statements: HashMap<NodeLabel, String>,
}

impl Neo4jGraphStore {
    pub fn new(graph: Graph) -> Self {
        let upsert_statements = [NodeLabel::User, NodeLabel::Repo]
            .into_iter()
            .map(|label| (label, upsert_statement(label)))
            .collect();
        Self {
            graph,
            upsert_statements,
        }
    }
}

/// MERGE on the match key only, then overlay the rest of the properties.
/// Merging on the full property map would mint a new node whenever any
/// incidental property changed.
fn upsert_statement(label: NodeLabel) -> String {
    let spec = label.spec();
    assert!(
        spec.properties.contains(&spec.match_property),
        "{} node spec must list its match property {}",
        spec.label.as_str(),
        spec.match_property
    );
    format!(
        "MERGE (n:{} {{{}: $match_value}}) SET n += $props SET n.scraped_at = $scraped_at",
        label.as_str(),
        spec.match_property
    )
}

/// MATCH does not create; when an endpoint is missing the trailing MERGE
/// consumes zero rows, which the caller reports as a missing endpoint.
fn relationship_statement(
    source: &RelationshipEnd,
    target: &RelationshipEnd,
    kind: RelKind,
) -> String {
    format!(
        "MATCH (s:{} {{{}: ${}}}) MATCH (t:{} {{{}: ${}}}) MERGE (s)-[:{}]->(t) RETURN 1",
        source.label.as_str(),
        source.match_property,
        source.param,
        target.label.as_str(),
        target.match_property,
        target.param,
        kind.as_str()
    )
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
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

        debug!(label = label.as_str(), value = %match_value, "upserting node");

        let params = HashMap::from([
            ("match_value".to_string(), Value::String(match_value)),
            ("props".to_string(), Value::Object(properties)),
            (
                "scraped_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            ),
        ]);
        neo4j::execute_write(&self.graph, &self.upsert_statements[&label], params).await?;
        Ok(())
    }

    async fn write_relationship(
        &self,
        source: &RelationshipEnd,
        target: &RelationshipEnd,
        kind: RelKind,
    ) -> Result<(), StoreError> {
        debug!(
            kind = kind.as_str(),
            source = %source.value,
            target = %target.value,
            "upserting relationship"
        );

        let statement = relationship_statement(source, target, kind);
        let params = HashMap::from([
            (source.param.to_string(), Value::String(source.value.clone())),
            (target.param.to_string(), Value::String(target.value.clone())),
        ]);

        let rows = neo4j::execute_write(&self.graph, &statement, params).await?;
        if rows == 0 {
            return Err(StoreError::EndpointNotMatched {
                kind: kind.as_str(),
                source_value: source.value.clone(),
                target_value: target.value.clone(),
            });
        }
        Ok(())
    }

    async fn max_repo_external_id(&self) -> i64 {
        match neo4j::read_single_i64(&self.graph, MAX_REPO_EXTERNAL_ID, "external_id").await {
            Ok(Some(id)) => id,
            Ok(None) => 0,
            Err(err) => {
                warn!(error = %err, "failed to read repo high-water mark, defaulting to 0");
                0
            }
        }
    }

    async fn user_bookmark(&self) -> i64 {
        match neo4j::read_single_i64(&self.graph, USER_BOOKMARK, "external_id").await {
            Ok(Some(id)) => id,
            Ok(None) => 0,
            Err(err) => {
                warn!(error = %err, "failed to read user bookmark, defaulting to 0");
                0
            }
        }
    }

    async fn update_user_bookmark(&self, external_id: i64) -> Result<(), StoreError> {
        debug!(external_id, "advancing user bookmark");
        let params = HashMap::from([(
            "external_id".to_string(),
            Value::Number(external_id.into()),
        )]);
        neo4j::execute_write(&self.graph, UPDATE_USER_BOOKMARK, params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{REPO_SPEC, USER_SPEC};

    #[test]
    fn node_upsert_merges_on_the_match_key_only() {
        assert_eq!(
            upsert_statement(NodeLabel::User),
            "MERGE (n:User {username: $match_value}) SET n += $props SET n.scraped_at = $scraped_at"
        );
        assert_eq!(
            upsert_statement(NodeLabel::Repo),
            "MERGE (n:Repo {name: $match_value}) SET n += $props SET n.scraped_at = $scraped_at"
        );
    }

    #[test]
    fn relationship_statement_matches_both_endpoints_before_merging() {
        let source = RelationshipEnd {
            label: NodeLabel::User,
            match_property: USER_SPEC.match_property,
            param: "follower_username",
            value: "carol".to_string(),
        };
        let target = RelationshipEnd {
            label: NodeLabel::User,
            match_property: USER_SPEC.match_property,
            param: "followed_username",
            value: "alice".to_string(),
        };
        assert_eq!(
            relationship_statement(&source, &target, RelKind::Follows),
            "MATCH (s:User {username: $follower_username}) \
             MATCH (t:User {username: $followed_username}) \
             MERGE (s)-[:FOLLOWS]->(t) RETURN 1"
        );
    }

    #[test]
    fn owns_statement_spans_both_labels() {
        let source = RelationshipEnd {
            label: NodeLabel::User,
            match_property: USER_SPEC.match_property,
            param: "owner_username",
            value: "alice".to_string(),
        };
        let target = RelationshipEnd {
            label: NodeLabel::Repo,
            match_property: REPO_SPEC.match_property,
            param: "repo_name",
            value: "r1".to_string(),
        };
        let statement = relationship_statement(&source, &target, RelKind::Owns);
        assert!(statement.starts_with("MATCH (s:User {username: $owner_username})"));
        assert!(statement.contains("MATCH (t:Repo {name: $repo_name})"));
        assert!(statement.contains("MERGE (s)-[:OWNS]->(t)"));
    }
}
