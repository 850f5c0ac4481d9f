// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Connection request lifecycle integration tests.
//!
//! These tests require the Firestore emulator to be running
//! (FIRESTORE_EMULATOR_HOST set). Identities are generated per test for
//! isolation within a shared emulator instance.

use confab::error::AppError;
use confab::models::RequestStatus;
use confab::services::ConnectionService;

mod common;
use common::{test_db, unique_uid};

// ═══════════════════════════════════════════════════════════════════════════
// LEDGER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_send_request_creates_pending_record() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    let request = service
        .send_request(&alice, &bob, "hi bob")
        .await
        .expect("send should succeed");

    assert!(request.id.is_some(), "Created request should carry its id");
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.initial_message, "hi bob");

    let pending = service.list_pending(&bob).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].from_uid, alice);
}

#[tokio::test]
async fn test_duplicate_request_rejected_in_both_directions() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    service.send_request(&alice, &bob, "").await.unwrap();

    // Resend in the same direction
    let err = service.send_request(&alice, &bob, "").await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateRequest));

    // And in the reverse direction
    let err = service.send_request(&bob, &alice, "").await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateRequest));
}

#[tokio::test]
async fn test_accept_creates_connection_visible_to_both() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    let request_id = request.id.unwrap();

    let connection = service.accept_request(&request_id, &bob).await.unwrap();
    assert_eq!(connection.user1_uid, alice);
    assert_eq!(connection.user2_uid, bob);

    // Each side sees exactly one connection naming the other party.
    let for_alice = service.list_connections(&alice).await.unwrap();
    assert_eq!(for_alice.len(), 1);
    assert_eq!(for_alice[0].other_party(&alice), Some(bob.as_str()));

    let for_bob = service.list_connections(&bob).await.unwrap();
    assert_eq!(for_bob.len(), 1);
    assert_eq!(for_bob[0].other_party(&bob), Some(alice.as_str()));

    // The pending list drains.
    assert!(service.list_pending(&bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_after_accept_reports_already_connected() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    service
        .accept_request(&request.id.unwrap(), &bob)
        .await
        .unwrap();

    let err = service.send_request(&alice, &bob, "").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyConnected));

    let err = service.send_request(&bob, &alice, "").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyConnected));
}

#[tokio::test]
async fn test_reject_leaves_no_connection() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db.clone());
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    let request_id = request.id.unwrap();

    service.reject_request(&request_id, &bob).await.unwrap();

    // Status is observably rejected and no connection record exists.
    let stored = db.get_request(&request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Rejected);

    assert!(service.list_connections(&alice).await.unwrap().is_empty());
    assert!(service.list_connections(&bob).await.unwrap().is_empty());
    assert!(db.get_connection(&request_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_request_does_not_block_resubmission() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    service
        .reject_request(&request.id.unwrap(), &bob)
        .await
        .unwrap();

    // A new request between the same pair goes through.
    let second = service.send_request(&alice, &bob, "second try").await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn test_accept_unknown_request_is_not_found() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let bob = unique_uid("bob");

    let err = service
        .accept_request("no-such-request", &bob)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_reject_unknown_request_is_silent() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let bob = unique_uid("bob");

    // Unlike accept, reject of an absent request succeeds silently.
    let result = service.reject_request("no-such-request", &bob).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_second_accept_does_not_create_second_connection() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    let request_id = request.id.unwrap();

    service.accept_request(&request_id, &bob).await.unwrap();

    // The request is terminal now; a second accept backs off.
    let err = service.accept_request(&request_id, &bob).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let for_alice = service.list_connections(&alice).await.unwrap();
    assert_eq!(for_alice.len(), 1, "Exactly one connection must exist");
}

#[tokio::test]
async fn test_only_recipient_can_transition_request() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");
    let carol = unique_uid("carol");

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    let request_id = request.id.unwrap();

    let err = service.accept_request(&request_id, &carol).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = service.reject_request(&request_id, &alice).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

// ═══════════════════════════════════════════════════════════════════════════
// REGISTRY TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_delete_connection_unfriends_both_sides() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    let connection = service
        .accept_request(&request.id.unwrap(), &bob)
        .await
        .unwrap();
    let connection_id = connection.id.unwrap();

    service.delete_connection(&connection_id, &alice).await.unwrap();

    assert!(service.list_connections(&alice).await.unwrap().is_empty());
    assert!(service.list_connections(&bob).await.unwrap().is_empty());

    // Deleting again treats absence as success.
    assert!(service.delete_connection(&connection_id, &alice).await.is_ok());
}

#[tokio::test]
async fn test_list_connections_unions_both_participant_fields() {
    require_emulator!();

    let db = test_db().await;
    let service = ConnectionService::new(db);
    let me = unique_uid("me");
    let requester = unique_uid("requester");
    let acceptor = unique_uid("acceptor");

    // One connection where `me` was the requester, one where `me` accepted.
    let outgoing = service.send_request(&me, &acceptor, "").await.unwrap();
    service
        .accept_request(&outgoing.id.unwrap(), &acceptor)
        .await
        .unwrap();

    let incoming = service.send_request(&requester, &me, "").await.unwrap();
    service
        .accept_request(&incoming.id.unwrap(), &me)
        .await
        .unwrap();

    let connections = service.list_connections(&me).await.unwrap();
    assert_eq!(connections.len(), 2);
}
