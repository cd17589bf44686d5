mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{eventually, handle, FakeGraph};
use suggest_engine::{Credentials, FollowAction, FollowControl, FollowError, ToggleOutcome};

fn credentials() -> Credentials {
    Credentials::new(handle("me.bsky.social"), "app-password").unwrap()
}

#[tokio::test]
async fn toggle_follows_then_unfollows_the_created_record() {
    let graph = FakeGraph::new();
    let action = FollowAction::new(graph.clone());
    let control = FollowControl::new();
    let target = handle("them.bsky.social");
    let creds = credentials();

    let outcome = action.toggle(&control, &target, Some(&creds)).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Followed);
    assert!(control.is_following());

    let outcome = action.toggle(&control, &target, Some(&creds)).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Unfollowed);
    assert!(!control.is_following());

    assert_eq!(graph.logins.load(Ordering::SeqCst), 2);
    assert_eq!(
        graph.last_unfollowed.lock().unwrap().as_deref(),
        Some("at://did:plc:me/app.bsky.graph.follow/them-0")
    );
}

#[tokio::test]
async fn bad_credentials_leave_state_unchanged() {
    let graph = FakeGraph::new();
    graph.reject_login.store(true, Ordering::SeqCst);
    let action = FollowAction::new(graph.clone());
    let control = FollowControl::new();

    let err = action
        .toggle(&control, &handle("them.bsky.social"), Some(&credentials()))
        .await
        .unwrap_err();

    assert!(matches!(err, FollowError::Login(_)));
    assert!(!control.is_following());
    assert!(!control.is_busy());
    assert_eq!(graph.follows.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn follow_failure_is_not_retried() {
    let graph = FakeGraph::new();
    graph.fail_follow.store(true, Ordering::SeqCst);
    let action = FollowAction::new(graph.clone());
    let control = FollowControl::new();

    let err = action
        .toggle(&control, &handle("them.bsky.social"), Some(&credentials()))
        .await
        .unwrap_err();

    assert!(matches!(err, FollowError::Follow(_)));
    assert_eq!(graph.logins.load(Ordering::SeqCst), 1);
    assert!(!control.is_following());
}

#[tokio::test]
async fn second_toggle_while_in_flight_is_ignored() {
    let graph = FakeGraph::new();
    let gate = graph.gate_follows();
    let action = FollowAction::new(graph.clone());
    let control = Arc::new(FollowControl::new());
    let target = handle("them.bsky.social");

    let first = {
        let action = action.clone();
        let control = control.clone();
        let target = target.clone();
        tokio::spawn(async move { action.toggle(&control, &target, Some(&credentials())).await })
    };
    assert!(eventually(|| control.is_busy()).await);

    let second = action.toggle(&control, &target, Some(&credentials())).await.unwrap();
    assert_eq!(second, ToggleOutcome::Ignored);

    gate.send_replace(true);
    assert_eq!(first.await.unwrap().unwrap(), ToggleOutcome::Followed);
    assert!(!control.is_busy());
    assert_eq!(graph.follows.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cannot_follow_yourself_or_without_a_secret() {
    let graph = FakeGraph::new();
    let action = FollowAction::new(graph.clone());
    let control = FollowControl::new();

    let me = handle("me.bsky.social");
    let err = action.toggle(&control, &me, Some(&credentials())).await.unwrap_err();
    assert_eq!(err, FollowError::NotOffered);

    let err = action
        .toggle(&control, &handle("them.bsky.social"), None)
        .await
        .unwrap_err();
    assert_eq!(err, FollowError::NotOffered);
    assert_eq!(graph.logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn existing_follow_is_adopted_instead_of_duplicated() {
    let graph = FakeGraph::new();
    *graph.existing.lock().unwrap() = Some("at://did:plc:me/app.bsky.graph.follow/old".to_string());
    let action = FollowAction::new(graph.clone());
    let control = FollowControl::new();
    let target = handle("them.bsky.social");
    let creds = credentials();

    let outcome = action.toggle(&control, &target, Some(&creds)).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Followed);
    assert!(control.is_following());
    assert_eq!(graph.follows.load(Ordering::SeqCst), 0);

    // unfollowing removes the adopted record
    let outcome = action.toggle(&control, &target, Some(&creds)).await.unwrap();
    assert_eq!(outcome, ToggleOutcome::Unfollowed);
    assert_eq!(
        graph.last_unfollowed.lock().unwrap().as_deref(),
        Some("at://did:plc:me/app.bsky.graph.follow/old")
    );
}
