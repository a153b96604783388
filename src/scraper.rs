use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{DecodeError, NodeLabel, RelKind, RepositoryRecord, UserRecord};
use crate::github::{DynFetcher, FetchError};
use crate::store::{DynGraphStore, StoreError};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl ScrapeError {
    fn is_rate_limit(&self) -> bool {
        matches!(self, ScrapeError::Fetch(FetchError::RateLimitExceeded))
    }
}

/// How a run ended. All three are clean stops; hard failures surface as
/// `ScrapeError` instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    BudgetExhausted,
    RateLimited,
    UsersExhausted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanOutcome {
    Progressed,
    Exhausted,
}

pub struct Scraper {
    fetcher: DynFetcher,
    store: DynGraphStore,
    budget: u64,
}

impl Scraper {
    pub fn new(fetcher: DynFetcher, store: DynGraphStore, budget: u64) -> Self {
        Self {
            fetcher,
            store,
            budget,
        }
    }

    /// Alternates repository and user scan passes until the request budget
    /// runs out, the upstream rate limit trips, or the user stream is
    /// exhausted.
    pub async fn run(&self) -> Result<RunOutcome, ScrapeError> {
        while self.fetcher.request_count() <= self.budget {
            match self.scan_repositories().await {
                Ok(ScanOutcome::Progressed) => {}
                Ok(ScanOutcome::Exhausted) => {
                    info!("no more repositories to scan, continuing with users");
                }
                Err(err) if err.is_rate_limit() => return Ok(RunOutcome::RateLimited),
                Err(err) => return Err(err),
            }

            match self.scan_users().await {
                Ok(ScanOutcome::Progressed) => {}
                Ok(ScanOutcome::Exhausted) => {
                    info!("user stream exhausted");
                    return Ok(RunOutcome::UsersExhausted);
                }
                Err(err) if err.is_rate_limit() => return Ok(RunOutcome::RateLimited),
                Err(err) => return Err(err),
            }
        }
        Ok(RunOutcome::BudgetExhausted)
    }

    /// One page of repositories past the stored high-water mark, with the
    /// owner/contributor/follower fan-out per repository.
    async fn scan_repositories(&self) -> Result<ScanOutcome, ScrapeError> {
        let since = self.store.max_repo_external_id().await;
        let url = format!("{}/repositories?since={}", self.fetcher.base_url(), since);

        let page = self.fetcher.get(&url).await?;
        if page.is_empty() {
            return Ok(ScanOutcome::Exhausted);
        }

        for raw in &page {
            let repo = match RepositoryRecord::decode(raw) {
                Ok(repo) => repo,
                Err(err) => {
                    warn!(error = %err, "skipping repository entity");
                    continue;
                }
            };
            if let Err(err) = self.ingest_repository(&repo).await {
                if err.is_rate_limit() {
                    return Err(err);
                }
                warn!(repo = %repo.name, error = %err, "skipping repository");
            }
        }

        Ok(ScanOutcome::Progressed)
    }

    /// One page of users past the persisted bookmark; the bookmark advances
    /// once per processed page.
    async fn scan_users(&self) -> Result<ScanOutcome, ScrapeError> {
        let since = self.store.user_bookmark().await;
        let url = format!("{}/users?since={}", self.fetcher.base_url(), since);

        let page = self.fetcher.get(&url).await?;
        if page.is_empty() {
            return Ok(ScanOutcome::Exhausted);
        }

        let mut last_seen = since;
        for raw in &page {
            let user = match UserRecord::decode(raw) {
                Ok(user) => user,
                Err(err) => {
                    warn!(error = %err, "skipping user entity");
                    continue;
                }
            };
            last_seen = last_seen.max(user.external_id);
            if let Err(err) = self.ingest_user(&user).await {
                if err.is_rate_limit() {
                    return Err(err);
                }
                warn!(user = %user.username, error = %err, "skipping user");
            }
        }

        if last_seen > since {
            // Skipped entities are not retried; reprocessing after a missed
            // bookmark write is safe because every write is an upsert.
            if let Err(err) = self.store.update_user_bookmark(last_seen).await {
                warn!(error = %err, "failed to advance user bookmark");
            }
        }

        Ok(ScanOutcome::Progressed)
    }

    async fn ingest_repository(&self, repo: &RepositoryRecord) -> Result<(), ScrapeError> {
        self.store
            .write_node(NodeLabel::Repo, repo.node_properties())
            .await?;
        self.create_owner(&repo.owner, repo).await?;

        self.ingest_contributors(repo).await?;
        self.ingest_followers(&repo.owner).await?;
        self.ingest_following(&repo.owner).await?;
        Ok(())
    }

    async fn ingest_user(&self, user: &UserRecord) -> Result<(), ScrapeError> {
        self.store
            .write_node(NodeLabel::User, user.node_properties())
            .await?;

        self.ingest_followers(user).await?;
        self.ingest_following(user).await?;
        Ok(())
    }

    async fn ingest_contributors(&self, repo: &RepositoryRecord) -> Result<(), ScrapeError> {
        let contributors = self.fetch_related(&repo.contributors_url, "contributors").await?;
        for raw in &contributors {
            if let Err(err) = self.create_contributor(raw, repo).await {
                if err.is_rate_limit() {
                    return Err(err);
                }
                warn!(repo = %repo.name, error = %err, "skipping contributor");
            }
        }
        Ok(())
    }

    async fn ingest_followers(&self, user: &UserRecord) -> Result<(), ScrapeError> {
        let followers = self.fetch_related(&user.followers_url, "followers").await?;
        for raw in &followers {
            if let Err(err) = self.create_follower(raw, user).await {
                if err.is_rate_limit() {
                    return Err(err);
                }
                warn!(user = %user.username, error = %err, "skipping follower");
            }
        }
        Ok(())
    }

    async fn ingest_following(&self, user: &UserRecord) -> Result<(), ScrapeError> {
        let following = self.fetch_related(&user.following_url, "following").await?;
        for raw in &following {
            if let Err(err) = self.create_followee(user, raw).await {
                if err.is_rate_limit() {
                    return Err(err);
                }
                warn!(user = %user.username, error = %err, "skipping followee");
            }
        }
        Ok(())
    }

    /// Fetches a sub-resource page. A failure other than the rate limit is
    /// logged and yields an empty page, so only this fan-out step is lost.
    async fn fetch_related(&self, url: &str, what: &'static str) -> Result<Vec<Value>, ScrapeError> {
        match self.fetcher.get(url).await {
            Ok(page) => Ok(page),
            Err(FetchError::RateLimitExceeded) => Err(FetchError::RateLimitExceeded.into()),
            Err(err) => {
                warn!(url, what, error = %err, "skipping related page");
                Ok(Vec::new())
            }
        }
    }

    /// Node-before-edge: the owner node must be durable before OWNS. The
    /// repo node was written by the caller.
    async fn create_owner(
        &self,
        owner: &UserRecord,
        repo: &RepositoryRecord,
    ) -> Result<(), ScrapeError> {
        self.store
            .write_node(NodeLabel::User, owner.node_properties())
            .await?;
        self.store
            .write_relationship(
                &owner.endpoint("owner_username"),
                &repo.endpoint("repo_name"),
                RelKind::Owns,
            )
            .await?;
        Ok(())
    }

    async fn create_contributor(
        &self,
        raw: &Value,
        repo: &RepositoryRecord,
    ) -> Result<(), ScrapeError> {
        let contributor = UserRecord::decode(raw)?;
        self.store
            .write_node(NodeLabel::User, contributor.node_properties())
            .await?;
        self.store
            .write_relationship(
                &contributor.endpoint("contributor_username"),
                &repo.endpoint("repo_name"),
                RelKind::Contributor,
            )
            .await?;
        Ok(())
    }

    /// `followed` is already durable when this runs; the newly discovered
    /// follower is upserted before the edge pointing at `followed`.
    async fn create_follower(&self, raw: &Value, followed: &UserRecord) -> Result<(), ScrapeError> {
        let follower = UserRecord::decode(raw)?;
        self.store
            .write_node(NodeLabel::User, follower.node_properties())
            .await?;
        self.store
            .write_relationship(
                &follower.endpoint("follower_username"),
                &followed.endpoint("followed_username"),
                RelKind::Follows,
            )
            .await?;
        Ok(())
    }

    /// Mirror of `create_follower` for the following page: the newly
    /// discovered node is the edge target.
    async fn create_followee(&self, follower: &UserRecord, raw: &Value) -> Result<(), ScrapeError> {
        let followee = UserRecord::decode(raw)?;
        self.store
            .write_node(NodeLabel::User, followee.node_properties())
            .await?;
        self.store
            .write_relationship(
                &follower.endpoint("follower_username"),
                &followee.endpoint("followed_username"),
                RelKind::Follows,
            )
            .await?;
        Ok(())
    }
}
