// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Message channel integration tests (Firestore emulator).

use confab::error::AppError;
use confab::models::UserProfile;
use confab::services::{ConnectionService, MessageService};

mod common;
use common::{test_db, unique_uid};

async fn seed_profile(db: &confab::db::FirestoreDb, uid: &str, display_name: &str) {
    let profile = UserProfile {
        uid: uid.to_string(),
        display_name: display_name.to_string(),
        photo_url: Some(format!("/uploads/{uid}.png")),
        active_status: true,
        created_at: chrono::Utc::now(),
    };
    db.upsert_user(&profile).await.unwrap();
}

/// Connect two fresh identities and return (alice, bob, chat_id).
async fn connected_pair(db: &confab::db::FirestoreDb) -> (String, String, String) {
    let service = ConnectionService::new(db.clone());
    let alice = unique_uid("alice");
    let bob = unique_uid("bob");

    seed_profile(db, &alice, &format!("Alice-{alice}")).await;
    seed_profile(db, &bob, &format!("Bob-{bob}")).await;

    let request = service.send_request(&alice, &bob, "").await.unwrap();
    let connection = service
        .accept_request(&request.id.unwrap(), &bob)
        .await
        .unwrap();

    (alice, bob, connection.id.unwrap())
}

#[tokio::test]
async fn test_empty_message_appends_nothing() {
    require_emulator!();

    let db = test_db().await;
    let messages = MessageService::new(db.clone());
    let (alice, _bob, chat_id) = connected_pair(&db).await;

    for text in ["", "   ", "\t\n"] {
        let err = messages.send(&chat_id, &alice, text).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "text {text:?}");
    }

    assert!(
        messages.history(&chat_id).await.unwrap().is_empty(),
        "Channel message count must be unchanged"
    );
}

#[tokio::test]
async fn test_sender_without_profile_is_rejected() {
    require_emulator!();

    let db = test_db().await;
    let connections = ConnectionService::new(db.clone());
    let messages = MessageService::new(db.clone());

    // Connected, but the sender never saved a profile.
    let ghost = unique_uid("ghost");
    let bob = unique_uid("bob");
    seed_profile(&db, &bob, &format!("Bob-{bob}")).await;

    let request = connections.send_request(&ghost, &bob, "").await.unwrap();
    let connection = connections
        .accept_request(&request.id.unwrap(), &bob)
        .await
        .unwrap();
    let chat_id = connection.id.unwrap();

    let err = messages.send(&chat_id, &ghost, "hello").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(messages.history(&chat_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_channel_is_rejected() {
    require_emulator!();

    let db = test_db().await;
    let messages = MessageService::new(db.clone());
    let alice = unique_uid("alice");
    seed_profile(&db, &alice, &format!("Alice-{alice}")).await;

    let err = messages
        .send("no-such-channel", &alice, "hello")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_non_participant_cannot_post() {
    require_emulator!();

    let db = test_db().await;
    let messages = MessageService::new(db.clone());
    let (_alice, _bob, chat_id) = connected_pair(&db).await;

    let eve = unique_uid("eve");
    seed_profile(&db, &eve, &format!("Eve-{eve}")).await;

    let err = messages.send(&chat_id, &eve, "let me in").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_messages_round_trip_in_timestamp_order() {
    require_emulator!();

    let db = test_db().await;
    let messages = MessageService::new(db.clone());
    let (alice, bob, chat_id) = connected_pair(&db).await;

    messages.send(&chat_id, &alice, "one").await.unwrap();
    messages.send(&chat_id, &bob, "two").await.unwrap();
    messages.send(&chat_id, &alice, "three").await.unwrap();

    let history = messages.history(&chat_id).await.unwrap();
    let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["one", "two", "three"]);

    // Timestamps are non-decreasing.
    for pair in history.windows(2) {
        assert!(pair[0].created_at <= pair[1].created_at);
    }

    // A fresh read replays the same history: nothing lost, nothing doubled.
    let replay = messages.history(&chat_id).await.unwrap();
    assert_eq!(replay.len(), history.len());
    let ids: std::collections::HashSet<_> =
        replay.iter().filter_map(|m| m.id.as_deref()).collect();
    assert_eq!(ids.len(), replay.len(), "Message ids must be unique");
}

#[tokio::test]
async fn test_message_carries_send_time_profile_snapshot() {
    require_emulator!();

    let db = test_db().await;
    let messages = MessageService::new(db.clone());
    let (alice, _bob, chat_id) = connected_pair(&db).await;

    messages.send(&chat_id, &alice, "hello").await.unwrap();

    // Rename after sending: the stored record keeps the old snapshot.
    let old_profile = db.get_user(&alice).await.unwrap().unwrap();
    let old_name = old_profile.display_name.clone();
    let renamed = UserProfile {
        display_name: format!("Renamed-{alice}"),
        ..old_profile
    };
    db.upsert_user(&renamed).await.unwrap();

    let history = messages.history(&chat_id).await.unwrap();
    assert_eq!(history[0].display_name, old_name);
    assert_eq!(history[0].photo_url, Some(format!("/uploads/{alice}.png")));
}
