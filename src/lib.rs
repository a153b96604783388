pub mod config;
pub mod domain;
pub mod github;
pub mod neo4j;
pub mod scraper;
pub mod store;
