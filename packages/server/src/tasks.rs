use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mq::{ChangeBus, ChangingRecord, normalize_source_link};
use store::{NewCommit, Store, TrackingRecord};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::source_host::{RepoCommit, SourceHost, SourceHostError};

/// Batch workers running concurrently within one poller tick. Bounds the
/// fan-out so a large fleet cannot overwhelm the source host.
const POLL_WORKER_CONCURRENCY: usize = 8;

/// Fixed-interval loop with a compare-and-set re-entrancy guard: when the
/// previous tick is still executing, the new tick is skipped, never queued.
pub async fn run_scheduler<F, Fut>(
    name: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    task: F,
) where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let running = Arc::new(AtomicBool::new(false));

    info!(scheduler = name, period_secs = period.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(scheduler = name, "scheduler stopped");
                return;
            }
            _ = interval.tick() => {
                if running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!(scheduler = name, "previous tick still running, skipping");
                    continue;
                }
                let task = task.clone();
                let running = running.clone();
                tokio::spawn(async move {
                    task().await;
                    running.store(false, Ordering::SeqCst);
                });
            }
        }
    }
}

/// Tracked-repository poller (C10): fans out over all enabled tracking
/// records, discovers new commits, persists them, and publishes change
/// records keyed by the owning user's chat id.
#[derive(Clone)]
pub struct Poller {
    store: Arc<dyn Store>,
    source_host: Arc<dyn SourceHost>,
    bus: Arc<dyn ChangeBus>,
    batch_size: u64,
}

impl Poller {
    pub fn new(
        store: Arc<dyn Store>,
        source_host: Arc<dyn SourceHost>,
        bus: Arc<dyn ChangeBus>,
        batch_size: u64,
    ) -> Self {
        Self {
            store,
            source_host,
            bus,
            batch_size: batch_size.max(1),
        }
    }

    /// One full pass over the tracking fleet.
    pub async fn tick(&self) {
        let count = match self.store.count_tracking().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "counting tracking records failed");
                return;
            }
        };
        if count == 0 {
            return;
        }

        let permits = Arc::new(Semaphore::new(POLL_WORKER_CONCURRENCY));
        let mut workers = JoinSet::new();
        let mut offset = 0u64;
        while offset < count {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let poller = self.clone();
            workers.spawn(async move {
                let _permit = permit;
                poller.process_batch(offset).await;
            });
            offset += self.batch_size;
        }
        while workers.join_next().await.is_some() {}
    }

    async fn process_batch(&self, offset: u64) {
        let records = match self.store.list_tracking(offset, self.batch_size).await {
            Ok(records) => records,
            Err(e) => {
                warn!(offset, limit = self.batch_size, error = %e, "listing tracking records failed");
                return;
            }
        };
        for record in records {
            self.process_record(record).await;
        }
    }

    async fn process_record(&self, record: TrackingRecord) {
        let token = match self.store.get_user_token(&record.user.chat_id).await {
            Ok(token) => token,
            Err(e) => {
                warn!(user_id = record.user.id, error = %e, "token lookup failed, skipping record");
                return;
            }
        };

        match self.source_host.repo_exists(&token, &record.repo.url).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = self.store.disable_tracking(record.id).await {
                    warn!(record_id = record.id, error = %e, "disabling tracking failed");
                }
                self.publish_system_notice(
                    &record,
                    "Repository deleted or access lost, tracking disabled",
                )
                .await;
                return;
            }
            Err(SourceHostError::InvalidToken) => {
                self.disable_user_tracking(&record).await;
                return;
            }
            Err(e) => {
                warn!(repo = %record.repo.url, error = %e, "repository probe failed, skipping record");
                return;
            }
        }

        let cursor = record
            .cursor_commit
            .as_ref()
            .map(|c| c.created_at)
            .unwrap_or(record.created_at);

        let commits = match self
            .source_host
            .commits_since(&token, &record.repo.url, cursor)
            .await
        {
            Ok(commits) => commits,
            Err(SourceHostError::InvalidToken) => {
                self.disable_user_tracking(&record).await;
                return;
            }
            Err(e) => {
                warn!(repo = %record.repo.url, %cursor, error = %e, "commit listing failed");
                return;
            }
        };

        debug!(
            repo = %record.repo.url,
            %cursor,
            count = commits.len(),
            "commit listing finished"
        );
        if commits.is_empty() {
            return;
        }

        let new_commits: Vec<NewCommit> = commits.iter().map(to_new_commit).collect();
        if let Err(e) = self.store.save_commits_and_advance_cursor(&new_commits).await {
            warn!(repo = %record.repo.url, error = %e, "saving commits failed");
        }

        for commit in &commits {
            let change = ChangingRecord {
                link: normalize_source_link(commit.link()),
                author: commit.author_login.clone().unwrap_or_default(),
                title: commit.message.clone().unwrap_or_default(),
                updated_at: commit.committed_at,
            };
            if let Err(e) = self.bus.publish(&record.user.chat_id, &change).await {
                warn!(
                    repo = %record.repo.url,
                    sha = %commit.sha,
                    error = %e,
                    "publishing change record failed"
                );
            }
        }
    }

    async fn disable_user_tracking(&self, record: &TrackingRecord) {
        if let Err(e) = self.store.disable_tracking_for_user(record.user.id).await {
            warn!(user_id = record.user.id, error = %e, "disabling user tracking failed");
        }
        self.publish_system_notice(record, "Invalid token, tracking disabled")
            .await;
    }

    async fn publish_system_notice(&self, record: &TrackingRecord, title: &str) {
        let notice = ChangingRecord::system(record.repo.url.clone(), title);
        if let Err(e) = self.bus.publish(&record.user.chat_id, &notice).await {
            warn!(user_id = record.user.id, error = %e, "publishing system notice failed");
        }
    }
}

fn to_new_commit(commit: &RepoCommit) -> NewCommit {
    NewCommit {
        owner: commit.owner.clone(),
        name: commit.name.clone(),
        sha: commit.sha.clone(),
        message: commit.message.clone(),
        author_login: commit.author_login.clone(),
        committed_at: commit.committed_at,
    }
}
