//! End-to-end sync tests: the real router on an ephemeral port, driven by
//! the reconciliation controller over HTTP.

use std::sync::Arc;
use std::time::Duration;

use jobboard::client::controller::SyncEvent;
use jobboard::client::{
    FailurePolicy, HttpTransport, ReconciliationController, SyncOutcome, SyncTransport,
    TransportError,
};
use jobboard::config::AuthSection;
use jobboard::dashboard::api::AppState;
use jobboard::dashboard::auth::UserProfile;
use jobboard::dashboard::db::{DbHandle, JobDb};
use jobboard::dashboard::server::{build_router, identity_provider};
use jobboard_common::protocol::{AddJobRequest, EditJobRequest};
use jobboard_common::{Dashboard, Location};

struct TestServer {
    url: String,
    db: DbHandle,
}

impl TestServer {
    async fn start() -> Self {
        let db = DbHandle::new(JobDb::new_in_memory().unwrap());
        let auth = AuthSection::default();
        let state = Arc::new(AppState {
            db: db.clone(),
            identity: identity_provider(&auth),
            auth,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, build_router(state, None)).await.unwrap();
        });
        Self {
            url: format!("http://{}", addr),
            db,
        }
    }

    fn token_for(&self, name: &str) -> String {
        let user = UserProfile::local(name);
        let db = self.db.lock_sync().unwrap();
        db.upsert_user(&user).unwrap();
        db.create_session(&user, chrono::Duration::hours(1))
            .unwrap()
            .token
    }

    fn transport(&self, token: &str) -> HttpTransport {
        HttpTransport::with_timeout(&self.url, Some(token.to_string()), Duration::from_secs(5))
            .unwrap()
    }

    async fn controller(
        &self,
        token: &str,
        policy: FailurePolicy,
    ) -> ReconciliationController<HttpTransport> {
        let controller = ReconciliationController::new(self.transport(token))
            .with_policy(policy)
            .with_timeout(Some(Duration::from_secs(5)));
        controller.refresh().await.unwrap();
        controller
    }

    async fn truth(&self, token: &str) -> Dashboard {
        self.transport(token).fetch().await.unwrap()
    }
}

fn job(title: &str, status: &str) -> AddJobRequest {
    AddJobRequest {
        title: title.to_string(),
        company: "Acme".to_string(),
        status: status.to_string(),
        description: None,
    }
}

/// Same cards, same columns, same order. `addedAt` of a card added locally
/// is the client's clock until the next fetch, so it is not compared.
fn assert_converged(local: &Dashboard, truth: &Dashboard) {
    let layout = |board: &Dashboard| {
        board
            .columns
            .iter()
            .filter(|(_, column)| !column.tasks.is_empty())
            .map(|(key, column)| {
                let cards: Vec<_> = column
                    .tasks
                    .iter()
                    .map(|t| (t.id.clone(), t.content.clone(), t.company.clone(), t.description.clone()))
                    .collect();
                (key.clone(), cards)
            })
            .collect::<std::collections::BTreeMap<_, _>>()
    };
    assert_eq!(layout(local), layout(truth));
}

async fn added_id(controller: &ReconciliationController<HttpTransport>, req: AddJobRequest) -> String {
    match controller.add(req).await.unwrap() {
        SyncOutcome::Confirmed { task_id } => task_id,
        other => panic!("add not confirmed: {other:?}"),
    }
}

#[tokio::test]
async fn optimistic_drag_converges_with_server() {
    let server = TestServer::start().await;
    let token = server.token_for("alice");
    let controller = server.controller(&token, FailurePolicy::Refetch).await;
    let t1 = added_id(&controller, job("T1", "applied")).await;

    let outcome = controller
        .drag(Location::new("applied", 0), Location::new("interview", 0))
        .await
        .unwrap();
    assert!(outcome.is_confirmed());
    assert_eq!(controller.dashboard().task_ids("interview"), vec![t1.clone()]);

    let truth = server.truth(&token).await;
    assert_eq!(truth.task_ids("interview"), vec![t1]);
    assert!(truth.task_ids("applied").is_empty());
    assert_converged(&controller.dashboard(), &truth);
}

#[tokio::test]
async fn reorder_within_column_is_durable() {
    let server = TestServer::start().await;
    let token = server.token_for("alice");
    let controller = server.controller(&token, FailurePolicy::Refetch).await;
    let a = added_id(&controller, job("A", "applied")).await;
    let b = added_id(&controller, job("B", "applied")).await;
    let c = added_id(&controller, job("C", "applied")).await;

    controller
        .drag(Location::new("applied", 2), Location::new("applied", 0))
        .await
        .unwrap();
    assert_eq!(controller.dashboard().task_ids("applied"), vec![c.clone(), a.clone(), b.clone()]);

    // A fresh client sees the same order.
    let fresh = server.controller(&token, FailurePolicy::Refetch).await;
    assert_eq!(fresh.dashboard().task_ids("applied"), vec![c, a, b]);
}

#[tokio::test]
async fn failed_move_resyncs_stale_client() {
    let server = TestServer::start().await;
    let token = server.token_for("alice");
    let stale = server.controller(&token, FailurePolicy::Refetch).await;
    let t1 = added_id(&stale, job("T1", "applied")).await;
    let t2 = added_id(&stale, job("T2", "interview")).await;

    // Another client deletes T1 behind the stale client's back.
    let other = server.controller(&token, FailurePolicy::Refetch).await;
    assert!(other.delete(&t1).await.unwrap().is_confirmed());

    let mut events = stale.subscribe();
    let outcome = stale
        .drag(Location::new("applied", 0), Location::new("interview", 0))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        SyncOutcome::Resynced {
            error: TransportError::NotFound(_)
        }
    ));

    // The optimistic guess (T1 first in "interview") is gone.
    assert_eq!(stale.dashboard().task_ids("interview"), vec![t2]);
    assert_eq!(stale.dashboard(), server.truth(&token).await);

    let mut saw_failure = false;
    while let Ok(event) = events.try_recv() {
        saw_failure |= matches!(event, SyncEvent::Failed { .. });
    }
    assert!(saw_failure);
}

#[tokio::test]
async fn unreachable_server_rolls_back() {
    let server = TestServer::start().await;
    let token = server.token_for("alice");
    let seeded = server.controller(&token, FailurePolicy::Refetch).await;
    added_id(&seeded, job("T1", "applied")).await;

    // Port 9 (discard) is closed, so the call and the resync both fail.
    let offline = ReconciliationController::new(HttpTransport::new(
        "http://127.0.0.1:9",
        Some(token.clone()),
    ))
    .with_policy(FailurePolicy::Refetch)
    .with_timeout(Some(Duration::from_secs(2)));
    let mut events = offline.subscribe();

    let outcome = offline.add(job("Never lands", "offered")).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::RolledBack { .. }));
    assert_eq!(offline.dashboard().task_count(), 0);
    assert_eq!(server.truth(&token).await.task_count(), 1);

    let mut saw_resync_failed = false;
    while let Ok(event) = events.try_recv() {
        saw_resync_failed |= matches!(event, SyncEvent::ResyncFailed { .. });
    }
    assert!(saw_resync_failed);
}

#[tokio::test]
async fn edit_and_delete_round_trip() {
    let server = TestServer::start().await;
    let token = server.token_for("alice");
    let controller = server.controller(&token, FailurePolicy::Refetch).await;
    let id = added_id(&controller, job("Old", "applied")).await;

    let outcome = controller
        .edit(
            &id,
            EditJobRequest {
                title: "New".to_string(),
                company: "Globex".to_string(),
                status: "offered".to_string(),
                description: Some("Signed".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(outcome.is_confirmed());
    assert_converged(&controller.dashboard(), &server.truth(&token).await);

    assert!(controller.delete(&id).await.unwrap().is_confirmed());
    let truth = server.truth(&token).await;
    assert!(truth.find(&id).is_none());
    assert_eq!(truth.task_count(), 0);
}

#[tokio::test]
async fn oversized_title_is_rejected_before_sending() {
    let server = TestServer::start().await;
    let token = server.token_for("alice");
    let controller = server.controller(&token, FailurePolicy::Rollback).await;
    let long_title = "x".repeat(500);
    // Local validation catches it before anything is sent.
    assert!(controller.add(job(&long_title, "applied")).await.is_err());
    assert_eq!(controller.dashboard().task_count(), 0);
    assert_eq!(server.truth(&token).await.task_count(), 0);
}

#[tokio::test]
async fn users_never_see_each_other() {
    let server = TestServer::start().await;
    let alice = server.token_for("alice");
    let bob = server.token_for("bob");
    let alice_ctl = server.controller(&alice, FailurePolicy::Refetch).await;
    let id = added_id(&alice_ctl, job("Secret", "interview")).await;

    let bob_transport = server.transport(&bob);
    assert_eq!(bob_transport.fetch().await.unwrap().task_count(), 0);
    let err = bob_transport
        .delete(&jobboard_common::protocol::DeleteTaskRequest { task_id: id.clone() })
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::NotFound(_)));
    assert_eq!(server.truth(&alice).await.task_ids("interview"), vec![id]);
}

#[tokio::test]
async fn expired_or_missing_session_is_unauthorized() {
    let server = TestServer::start().await;
    let transport = HttpTransport::new(&server.url, None);
    assert_eq!(transport.fetch().await.unwrap_err(), TransportError::Unauthorized);

    let user = UserProfile::local("late");
    let token = {
        let db = server.db.lock_sync().unwrap();
        db.upsert_user(&user).unwrap();
        db.create_session(&user, chrono::Duration::seconds(-1))
            .unwrap()
            .token
    };
    let transport = server.transport(&token);
    assert_eq!(transport.fetch().await.unwrap_err(), TransportError::Unauthorized);
}

#[tokio::test]
async fn concurrent_gestures_converge() {
    let server = TestServer::start().await;
    let token = server.token_for("alice");
    let controller = Arc::new(server.controller(&token, FailurePolicy::Refetch).await);
    for i in 0..4 {
        added_id(&controller, job(&format!("T{i}"), "applied")).await;
    }
    let last = controller.dashboard().task_ids("applied")[3].clone();

    let drag = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .drag(Location::new("applied", 0), Location::new("offered", 0))
                .await
        })
    };
    let delete = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.delete(&last).await })
    };
    assert!(drag.await.unwrap().unwrap().is_confirmed());
    assert!(delete.await.unwrap().unwrap().is_confirmed());
    assert_eq!(controller.pending(), 0);
    assert_converged(&controller.dashboard(), &server.truth(&token).await);
}
