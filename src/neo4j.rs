use std::collections::HashMap;

use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltNull, BoltString, BoltType,
    ConfigBuilder, Graph, query,
};
use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum Neo4jError {
    #[error("neo4j error: {0}")]
    Neo4rs(#[from] neo4rs::Error),
    #[error("neo4j connect timeout after {0:?}")]
    ConnectTimeout(std::time::Duration),
}

pub async fn connect(cfg: &Config) -> Result<Graph, Neo4jError> {
    let config = ConfigBuilder::default()
        .uri(cfg.neo4j_uri.clone())
        .user(cfg.neo4j_username.clone())
        .password(cfg.neo4j_password.clone())
        .db(cfg.neo4j_database.clone())
        .max_connections(cfg.neo4j_max_connections)
        .build()?;

    match tokio::time::timeout(cfg.neo4j_connect_timeout, Graph::connect(config)).await {
        Ok(graph) => Ok(graph?),
        Err(_) => Err(Neo4jError::ConnectTimeout(cfg.neo4j_connect_timeout)),
    }
}

pub async fn healthcheck(graph: &Graph) -> Result<(), Neo4jError> {
    let mut result = graph.execute(query("RETURN 1 AS n")).await?;
    while let Some(_row) = result.next().await? {}
    Ok(())
}

/// Runs a write statement and returns the number of result rows consumed.
/// neo4rs does not expose MERGE summary counters, so callers that need to
/// know whether a statement matched anything count rows instead.
pub async fn execute_write(
    graph: &Graph,
    cypher: &str,
    params: HashMap<String, Value>,
) -> Result<u64, Neo4jError> {
    let mut q = query(cypher);
    for (k, v) in params {
        q = q.param(k.as_str(), json_to_bolt(&v));
    }

    let mut result = graph.execute(q).await?;
    let mut rows = 0u64;
    while let Some(_row) = result.next().await? {
        rows += 1;
    }
    Ok(rows)
}

/// Reads one integer column from the first result row, if any.
pub async fn read_single_i64(
    graph: &Graph,
    cypher: &str,
    field: &str,
) -> Result<Option<i64>, Neo4jError> {
    let mut result = graph.execute(query(cypher)).await?;
    let value = match result.next().await? {
        Some(row) => row.get::<Value>(field).ok().and_then(|v| v.as_i64()),
        None => None,
    };
    // Drain the stream so the connection returns to the pool.
    while let Some(_row) = result.next().await? {}
    Ok(value)
}

fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::Boolean(BoltBoolean::new(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(BoltInteger::new(i)),
            None => BoltType::Float(BoltFloat::new(n.as_f64().unwrap_or(0.0))),
        },
        Value::String(s) => BoltType::String(BoltString::from(s.clone())),
        Value::Array(items) => BoltType::List(BoltList::from(
            items.iter().map(json_to_bolt).collect::<Vec<_>>(),
        )),
        Value::Object(map) => BoltType::Map(
            map.iter()
                .map(|(k, v)| (BoltString::from(k.clone()), json_to_bolt(v)))
                .collect::<BoltMap>(),
        ),
    }
}
