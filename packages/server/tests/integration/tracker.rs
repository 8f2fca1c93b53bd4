use std::sync::atomic::Ordering;

use chrono::{Duration, Utc};
use mq::SYSTEM_AUTHOR;
use store::Store;

use server::source_host::RepoCommit;
use server::tasks::Poller;

use crate::common::{fixture, gateway_settings};

fn commit(sha: &str, minutes_ago: i64, message: &str) -> RepoCommit {
    RepoCommit {
        owner: "acme".into(),
        name: "proj".into(),
        sha: sha.into(),
        message: Some(message.into()),
        author_login: Some("alice".into()),
        html_url: None,
        api_url: Some(format!(
            "https://api.github.com/repos/acme/proj/commits/{sha}"
        )),
        committed_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}

#[tokio::test]
async fn a_tick_persists_new_commits_and_publishes_per_commit() {
    let fx = fixture(gateway_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    fx.source_host.add_repo("https://github.com/acme/proj");
    fx.store
        .add_tracking("u1", "https://github.com/acme/proj")
        .await
        .unwrap();
    fx.source_host
        .set_commits(vec![commit("c1", 2, "first"), commit("c2", 1, "second")]);

    let poller = Poller::new(
        fx.store.clone(),
        fx.source_host.clone(),
        fx.bus.clone(),
        10,
    );
    poller.tick().await;

    // Both commits inserted, cursor on the newest one.
    let commits = fx.store.commits();
    assert_eq!(commits.len(), 2);
    let newest = commits.iter().max_by_key(|c| c.created_at).unwrap();
    assert_eq!(newest.hash, "c2");
    let notifications = fx.store.notifications();
    assert_eq!(notifications[0].last_commit, Some(newest.id));

    // Two change records keyed by the owner, links rewritten to web form.
    let published = fx.bus.records();
    assert_eq!(published.len(), 2);
    for (chat_id, record) in &published {
        assert_eq!(chat_id, "u1");
        assert_eq!(record.author, "alice");
        assert!(
            record
                .link
                .starts_with("https://github.com/acme/proj/commit/"),
            "unexpected link: {}",
            record.link
        );
    }
    assert_eq!(published[0].1.title, "first");
    assert_eq!(published[1].1.title, "second");
}

#[tokio::test]
async fn redelivered_commits_are_not_duplicated() {
    let fx = fixture(gateway_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    fx.source_host.add_repo("https://github.com/acme/proj");
    fx.store
        .add_tracking("u1", "https://github.com/acme/proj")
        .await
        .unwrap();
    fx.source_host
        .set_commits(vec![commit("c1", 2, "first"), commit("c2", 1, "second")]);

    let poller = Poller::new(
        fx.store.clone(),
        fx.source_host.clone(),
        fx.bus.clone(),
        10,
    );
    poller.tick().await;
    poller.tick().await;

    assert_eq!(fx.store.commits().len(), 2);
}

#[tokio::test]
async fn an_invalid_token_disables_the_user_and_notifies_once() {
    let fx = fixture(gateway_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    fx.source_host.add_repo("https://github.com/acme/proj");
    fx.store
        .add_tracking("u1", "https://github.com/acme/proj")
        .await
        .unwrap();
    fx.source_host.reject_token.store(true, Ordering::SeqCst);

    let poller = Poller::new(
        fx.store.clone(),
        fx.source_host.clone(),
        fx.bus.clone(),
        10,
    );
    poller.tick().await;

    let notifications = fx.store.notifications();
    assert!(notifications.iter().all(|n| !n.enabled));

    let published = fx.bus.records();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "u1");
    assert_eq!(published[0].1.author, SYSTEM_AUTHOR);
    assert_eq!(published[0].1.title, "Invalid token, tracking disabled");
    assert_eq!(published[0].1.link, "https://github.com/acme/proj");
}

#[tokio::test]
async fn a_lost_repository_disables_only_that_record() {
    let fx = fixture(gateway_settings());
    let user_id = fx.store.seed_user("u1");
    fx.store.seed_token(user_id, "gh-token");
    // Tracked, but the source host no longer knows it.
    fx.store
        .add_tracking("u1", "https://github.com/acme/gone")
        .await
        .unwrap();
    fx.source_host.add_repo("https://github.com/acme/proj");
    fx.store
        .add_tracking("u1", "https://github.com/acme/proj")
        .await
        .unwrap();

    let poller = Poller::new(
        fx.store.clone(),
        fx.source_host.clone(),
        fx.bus.clone(),
        10,
    );
    poller.tick().await;

    let notifications = fx.store.notifications();
    let gone = notifications
        .iter()
        .find(|n| fx.store.repo_url(n.repo_id).as_deref() == Some("https://github.com/acme/gone"))
        .unwrap();
    let kept = notifications
        .iter()
        .find(|n| fx.store.repo_url(n.repo_id).as_deref() == Some("https://github.com/acme/proj"))
        .unwrap();
    assert!(!gone.enabled);
    assert!(kept.enabled);

    let published = fx.bus.records();
    let notice = published
        .iter()
        .find(|(_, r)| r.author == SYSTEM_AUTHOR)
        .expect("a system notice should be published");
    assert_eq!(
        notice.1.title,
        "Repository deleted or access lost, tracking disabled"
    );
}

#[tokio::test]
async fn an_empty_fleet_is_a_no_op() {
    let fx = fixture(gateway_settings());
    let poller = Poller::new(
        fx.store.clone(),
        fx.source_host.clone(),
        fx.bus.clone(),
        10,
    );
    poller.tick().await;
    assert!(fx.bus.records().is_empty());
    assert!(fx.store.commits().is_empty());
}
