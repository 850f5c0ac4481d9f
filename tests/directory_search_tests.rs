// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User directory search integration tests (Firestore emulator).

use confab::models::UserProfile;
use confab::services::DirectoryService;

mod common;
use common::{test_db, unique_uid};

async fn seed_profile(db: &confab::db::FirestoreDb, uid: &str, display_name: &str) {
    let profile = UserProfile {
        uid: uid.to_string(),
        display_name: display_name.to_string(),
        photo_url: None,
        active_status: true,
        created_at: chrono::Utc::now(),
    };
    db.upsert_user(&profile).await.unwrap();
}

#[tokio::test]
async fn test_prefix_search_matches_exact_prefix_only() {
    require_emulator!();

    let db = test_db().await;
    let service = DirectoryService::new(db.clone());

    // Run-unique name prefix keeps this test isolated on a shared emulator.
    let ns = unique_uid("ns");
    seed_profile(&db, &unique_uid("u"), &format!("{ns}-Alice")).await;
    seed_profile(&db, &unique_uid("u"), &format!("{ns}-Albert")).await;
    seed_profile(&db, &unique_uid("u"), &format!("{ns}-Bob")).await;

    let results = service.search(&format!("{ns}-Al")).await;
    let mut names: Vec<String> = results.into_iter().map(|r| r.display_name).collect();
    names.sort();

    assert_eq!(names, vec![format!("{ns}-Albert"), format!("{ns}-Alice")]);
}

#[tokio::test]
async fn test_prefix_search_is_case_sensitive() {
    require_emulator!();

    let db = test_db().await;
    let service = DirectoryService::new(db.clone());

    let ns = unique_uid("ns");
    seed_profile(&db, &unique_uid("u"), &format!("{ns}-alice")).await;

    // Uppercase prefix does not match the lowercase name.
    let results = service.search(&format!("{ns}-ALICE")).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_exact_display_name_lookup_backs_uniqueness_check() {
    require_emulator!();

    let db = test_db().await;
    let service = DirectoryService::new(db.clone());

    let ns = unique_uid("ns");
    let owner = unique_uid("owner");
    let name = format!("{ns}-Taken");
    seed_profile(&db, &owner, &name).await;

    // Taken for anyone else, free for the current holder.
    assert!(service
        .is_display_name_taken(&name, &unique_uid("other"))
        .await
        .unwrap());
    assert!(!service.is_display_name_taken(&name, &owner).await.unwrap());
    assert!(!service
        .is_display_name_taken(&format!("{ns}-Free"), &owner)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_search_failure_degrades_to_empty() {
    // Offline store: the search component swallows the backing-store
    // failure and returns no results instead of surfacing an error.
    let service = DirectoryService::new(common::test_db_offline());
    let results = service.search("anything").await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_profile_lookup_failure_degrades_to_none() {
    let service = DirectoryService::new(common::test_db_offline());
    assert!(service.lookup_profile("u1").await.is_none());
}
