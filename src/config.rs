use std::{env, time::Duration};

/// Requests GitHub allows per rolling hour without credentials.
const UNAUTHENTICATED_BUDGET: u64 = 60;
/// Requests GitHub allows per rolling hour with basic auth.
const AUTHENTICATED_BUDGET: u64 = 5000;

#[derive(Clone, Debug)]
pub struct Config {
    pub mode: String,
    pub log_file: String,
    pub github_base_url: String,
    pub github_basic_auth_token: Option<String>,
    pub neo4j_uri: String,
    pub neo4j_username: String,
    pub neo4j_password: String,
    pub neo4j_database: String,
    pub neo4j_max_connections: usize,
    pub neo4j_connect_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let mode = env::var("APP_MODE").unwrap_or_else(|_| "dev".to_string());
        let log_file =
            env::var("LOG_FILE").unwrap_or_else(|_| "github_graph_scraper.log".to_string());

        let github_base_url = env::var("GITHUB_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_string())
            .trim_end_matches('/')
            .to_string();
        let github_basic_auth_token = env::var("GITHUB_BASIC_AUTH_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        let neo4j_uri = env::var("NEO4J_URI").unwrap_or_else(|_| "bolt://localhost:7687".to_string());
        let neo4j_username = env::var("NEO4J_USERNAME").unwrap_or_else(|_| "neo4j".to_string());
        let neo4j_password = env::var("NEO4J_PASSWORD").unwrap_or_else(|_| "neo4j".to_string());
        let neo4j_database = env::var("NEO4J_DATABASE").unwrap_or_else(|_| "neo4j".to_string());

        let neo4j_max_connections: usize = env::var("NEO4J_MAX_CONNECTION_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let neo4j_connect_timeout = Duration::from_millis(
            env::var("NEO4J_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30_000),
        );

        Self {
            mode,
            log_file,
            github_base_url,
            github_basic_auth_token,
            neo4j_uri,
            neo4j_username,
            neo4j_password,
            neo4j_database,
            neo4j_max_connections,
            neo4j_connect_timeout,
        }
    }

    pub fn is_dev(&self) -> bool {
        self.mode == "dev"
    }

    /// The hourly request ceiling the scraper may spend before stopping.
    pub fn request_budget(&self) -> u64 {
        if self.github_basic_auth_token.is_some() {
            AUTHENTICATED_BUDGET
        } else {
            UNAUTHENTICATED_BUDGET
        }
    }
}
