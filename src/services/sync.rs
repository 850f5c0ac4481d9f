// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live sync layer.
//!
//! Per user session this maintains one Firestore listener with three
//! targets: pending requests addressed to the user, connections where the
//! user is participant 1, and connections where the user is participant 2.
//! The two connection targets are folded into independent keyed maps and
//! merged by record id on every emission, so out-of-order emissions from
//! one target never clobber the other's contributions.
//!
//! Raw listener events are per-document changes; this layer folds them
//! into the full-snapshot view the UI consumes, enriching every record
//! with the counterpart identity's profile via a point read per emission
//! (deduplicated within the batch, not cached across emissions — a
//! counterpart's rename shows up on the next emission, not immediately).

use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::{Connection, ConnectionRequest, Message, RequestStatus, UserProfile};
use firestore::{FirestoreListenEvent, FirestoreListenerTarget};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

const PENDING_REQUESTS_TARGET: u32 = 1;
const CONNECTIONS_USER1_TARGET: u32 = 2;
const CONNECTIONS_USER2_TARGET: u32 = 3;
const CHANNEL_MESSAGES_TARGET: u32 = 7;

/// Snapshot channel depth per subscriber. A slow consumer back-pressures
/// the listener callback rather than growing without bound.
const SNAPSHOT_BUFFER: usize = 16;

/// Display-name fallback when the counterpart has no live profile.
pub const UNKNOWN_USER: &str = "Unknown User";

type CallbackError = Box<dyn std::error::Error + Send + Sync>;

// ─── Views ───────────────────────────────────────────────────────

/// Pending request enriched with the sender's profile.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PendingRequestView {
    pub id: String,
    pub from_uid: String,
    pub from_display_name: String,
    pub initial_message: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Connection enriched with the counterpart's profile.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ConnectionView {
    pub id: String,
    pub other_uid: String,
    pub other_display_name: String,
    pub other_photo_url: Option<String>,
    pub other_active_status: bool,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Full enriched snapshot pushed to a user session.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncSnapshot {
    pub pending_requests: Vec<PendingRequestView>,
    pub connections: Vec<ConnectionView>,
}

/// Message with the live-profile join applied over the denormalized
/// snapshot fields.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MessageView {
    pub id: String,
    pub chat_id: String,
    pub uid: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub text: String,
    #[cfg_attr(feature = "binding-generation", ts(type = "string"))]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// ─── Snapshot fold ───────────────────────────────────────────────

/// Locally held state folded from the three per-user listener targets.
#[derive(Debug, Default)]
pub struct SyncState {
    requests: HashMap<String, ConnectionRequest>,
    conns_user1: HashMap<String, Connection>,
    conns_user2: HashMap<String, Connection>,
}

impl SyncState {
    pub fn apply_request(&mut self, request: ConnectionRequest) {
        if let Some(id) = request.id.clone() {
            self.requests.insert(id, request);
        }
    }

    pub fn apply_connection(&mut self, target: u32, connection: Connection) {
        let Some(id) = connection.id.clone() else {
            return;
        };
        match target {
            CONNECTIONS_USER1_TARGET => {
                self.conns_user1.insert(id, connection);
            }
            CONNECTIONS_USER2_TARGET => {
                self.conns_user2.insert(id, connection);
            }
            _ => {}
        }
    }

    /// Remove a document from the maps owned by `targets`; an empty target
    /// list applies to all of them.
    pub fn remove_doc(&mut self, targets: &[u32], doc_id: &str) {
        let all = targets.is_empty();
        if all || targets.contains(&PENDING_REQUESTS_TARGET) {
            self.requests.remove(doc_id);
        }
        if all || targets.contains(&CONNECTIONS_USER1_TARGET) {
            self.conns_user1.remove(doc_id);
        }
        if all || targets.contains(&CONNECTIONS_USER2_TARGET) {
            self.conns_user2.remove(doc_id);
        }
    }

    /// Pending requests currently held. The target filter is server-side,
    /// but a just-transitioned request may still be in flight, so the
    /// status is re-checked here.
    pub fn pending_requests(&self) -> Vec<&ConnectionRequest> {
        self.requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .collect()
    }

    /// Union of both connection maps keyed by record id.
    pub fn connections(&self) -> Vec<&Connection> {
        let mut merged: HashMap<&str, &Connection> = HashMap::new();
        for conn in self.conns_user1.values().chain(self.conns_user2.values()) {
            if let Some(id) = conn.id.as_deref() {
                merged.insert(id, conn);
            }
        }
        merged.into_values().collect()
    }

    /// Counterpart identities that the enrichment pass must resolve.
    pub fn counterpart_uids(&self, uid: &str) -> Vec<String> {
        let mut uids: Vec<String> = self
            .pending_requests()
            .iter()
            .map(|r| r.from_uid.clone())
            .collect();
        uids.extend(
            self.connections()
                .iter()
                .filter_map(|c| c.other_party(uid))
                .map(str::to_string),
        );
        uids
    }
}

/// Build the enriched snapshot for `uid` from folded state and a batch of
/// point-read profiles. Records whose counterpart has no live profile fall
/// back to [`UNKNOWN_USER`].
pub fn build_snapshot(
    uid: &str,
    state: &SyncState,
    profiles: &HashMap<String, UserProfile>,
) -> SyncSnapshot {
    let mut pending_requests: Vec<PendingRequestView> = state
        .pending_requests()
        .into_iter()
        .filter_map(|request| {
            let id = request.id.clone()?;
            let from_profile = profiles.get(&request.from_uid);
            Some(PendingRequestView {
                id,
                from_uid: request.from_uid.clone(),
                from_display_name: from_profile
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                initial_message: request.initial_message.clone(),
                created_at: request.created_at,
            })
        })
        .collect();
    pending_requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut connections: Vec<ConnectionView> = state
        .connections()
        .into_iter()
        .filter_map(|connection| {
            let id = connection.id.clone()?;
            let other_uid = connection.other_party(uid)?.to_string();
            let other_profile = profiles.get(&other_uid);
            Some(ConnectionView {
                id,
                other_display_name: other_profile
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                other_photo_url: other_profile.and_then(|p| p.photo_url.clone()),
                other_active_status: other_profile.map(|p| p.active_status).unwrap_or(false),
                other_uid,
                created_at: connection.created_at,
            })
        })
        .collect();
    connections.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    SyncSnapshot {
        pending_requests,
        connections,
    }
}

/// Join live profiles over the denormalized message snapshots: live values
/// win, the write-time snapshot is the fallback.
pub fn enrich_messages(
    messages: Vec<Message>,
    profiles: &HashMap<String, UserProfile>,
) -> Vec<MessageView> {
    let mut views: Vec<MessageView> = messages
        .into_iter()
        .filter_map(|message| {
            let id = message.id.clone()?;
            let live = profiles.get(&message.uid);
            Some(MessageView {
                id,
                chat_id: message.chat_id,
                display_name: live
                    .filter(|p| p.has_display_name())
                    .map(|p| p.display_name.clone())
                    .unwrap_or(message.display_name),
                photo_url: live
                    .and_then(|p| p.photo_url.clone())
                    .or(message.photo_url),
                uid: message.uid,
                text: message.text,
                created_at: message.created_at,
            })
        })
        .collect();
    views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    views
}

// ─── Event fold ──────────────────────────────────────────────────

fn doc_id_from_path(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn to_u32_targets(raw: &[i32]) -> Vec<u32> {
    raw.iter().map(|t| *t as u32).collect()
}

/// Fold one raw listener event into the per-user state. Returns whether
/// anything changed (and a new snapshot should be emitted).
fn apply_user_event(state: &mut SyncState, event: &FirestoreListenEvent) -> Result<bool, CallbackError> {
    match event {
        FirestoreListenEvent::DocumentChange(change) => {
            let Some(doc) = &change.document else {
                return Ok(false);
            };

            let mut changed = false;

            // Targets the document no longer matches, e.g. a request that
            // just left the pending state.
            let removed = to_u32_targets(&change.removed_target_ids);
            if !removed.is_empty() {
                state.remove_doc(&removed, doc_id_from_path(&doc.name));
                changed = true;
            }

            // An empty target list means the change applies to every
            // registered target.
            let mut targets = to_u32_targets(&change.target_ids);
            if targets.is_empty() && removed.is_empty() {
                targets = vec![
                    PENDING_REQUESTS_TARGET,
                    CONNECTIONS_USER1_TARGET,
                    CONNECTIONS_USER2_TARGET,
                ];
            }

            // A record that fails to decode is skipped rather than
            // killing the whole listener.
            for target in targets {
                match target {
                    PENDING_REQUESTS_TARGET => {
                        match firestore::FirestoreDb::deserialize_doc_to::<ConnectionRequest>(doc) {
                            Ok(request) => {
                                state.apply_request(request);
                                changed = true;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, doc = %doc.name, "Skipping undecodable request")
                            }
                        }
                    }
                    CONNECTIONS_USER1_TARGET | CONNECTIONS_USER2_TARGET => {
                        match firestore::FirestoreDb::deserialize_doc_to::<Connection>(doc) {
                            Ok(connection) => {
                                state.apply_connection(target, connection);
                                changed = true;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, doc = %doc.name, "Skipping undecodable connection")
                            }
                        }
                    }
                    _ => {}
                }
            }

            Ok(changed)
        }
        FirestoreListenEvent::DocumentDelete(delete) => {
            state.remove_doc(
                &to_u32_targets(&delete.removed_target_ids),
                doc_id_from_path(&delete.document),
            );
            Ok(true)
        }
        FirestoreListenEvent::DocumentRemove(remove) => {
            state.remove_doc(
                &to_u32_targets(&remove.removed_target_ids),
                doc_id_from_path(&remove.document),
            );
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Fold one raw listener event into a channel's message map.
fn apply_channel_event(
    messages: &mut HashMap<String, Message>,
    event: &FirestoreListenEvent,
) -> Result<bool, CallbackError> {
    match event {
        FirestoreListenEvent::DocumentChange(change) => {
            let Some(doc) = &change.document else {
                return Ok(false);
            };
            let message = match firestore::FirestoreDb::deserialize_doc_to::<Message>(doc) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, doc = %doc.name, "Skipping undecodable message");
                    return Ok(false);
                }
            };
            let Some(id) = message.id.clone() else {
                return Ok(false);
            };
            messages.insert(id, message);
            Ok(true)
        }
        // Messages are append-only; deletes are not expected, but folding
        // them keeps the view honest if one happens out-of-band.
        FirestoreListenEvent::DocumentDelete(delete) => {
            Ok(messages.remove(doc_id_from_path(&delete.document)).is_some())
        }
        FirestoreListenEvent::DocumentRemove(remove) => {
            Ok(messages.remove(doc_id_from_path(&remove.document)).is_some())
        }
        _ => Ok(false),
    }
}

// ─── Subscriptions ───────────────────────────────────────────────

/// Live subscription fan-out over the backing store's listeners.
#[derive(Clone)]
pub struct SyncService {
    db: FirestoreDb,
}

impl SyncService {
    pub fn new(db: FirestoreDb) -> Self {
        Self { db }
    }

    /// Subscribe to a user's pending requests and connections.
    ///
    /// The subscription ends when the returned receiver is dropped; the
    /// underlying listener is then shut down and its resources released.
    pub async fn subscribe_user(
        &self,
        uid: &str,
    ) -> Result<mpsc::Receiver<SyncSnapshot>, AppError> {
        let (tx, rx) = mpsc::channel::<SyncSnapshot>(SNAPSHOT_BUFFER);

        let mut listener = self.db.create_live_listener().await?;
        self.db.listen_pending_requests(
            &mut listener,
            uid,
            FirestoreListenerTarget::new(PENDING_REQUESTS_TARGET),
        )?;
        self.db.listen_connections_by_field(
            &mut listener,
            "user1_uid",
            uid,
            FirestoreListenerTarget::new(CONNECTIONS_USER1_TARGET),
        )?;
        self.db.listen_connections_by_field(
            &mut listener,
            "user2_uid",
            uid,
            FirestoreListenerTarget::new(CONNECTIONS_USER2_TARGET),
        )?;

        let state = Arc::new(Mutex::new(SyncState::default()));
        let db = self.db.clone();
        let uid = uid.to_string();
        let cb_tx = tx.clone();

        listener
            .start(move |event| {
                let state = state.clone();
                let db = db.clone();
                let tx = cb_tx.clone();
                let uid = uid.clone();
                async move {
                    let changed = {
                        let mut st = state.lock().map_err(|_| "sync state poisoned")?;
                        apply_user_event(&mut st, &event)?
                    };
                    if !changed {
                        return Ok(());
                    }

                    let counterparts = {
                        let st = state.lock().map_err(|_| "sync state poisoned")?;
                        st.counterpart_uids(&uid)
                    };

                    // Non-live point reads, deduplicated for this batch.
                    let profiles = match db.get_users_by_ids(counterparts).await {
                        Ok(profiles) => profiles,
                        Err(e) => {
                            tracing::warn!(error = %e, "Sync enrichment degraded to snapshots");
                            HashMap::new()
                        }
                    };

                    let snapshot = {
                        let st = state.lock().map_err(|_| "sync state poisoned")?;
                        build_snapshot(&uid, &st, &profiles)
                    };

                    // Receiver gone: the watchdog below is tearing us down.
                    let _ = tx.send(snapshot).await;
                    Ok(())
                }
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to start listener: {}", e)))?;

        tokio::spawn(async move {
            tx.closed().await;
            if let Err(e) = listener.shutdown().await {
                tracing::debug!(error = %e, "User sync listener shutdown failed");
            }
        });

        Ok(rx)
    }

    /// Subscribe to one channel's message log.
    ///
    /// Every emission is the full ordered history with the live-profile
    /// join applied; a resubscribe replays everything from scratch.
    pub async fn subscribe_channel(
        &self,
        chat_id: &str,
    ) -> Result<mpsc::Receiver<Vec<MessageView>>, AppError> {
        let (tx, rx) = mpsc::channel::<Vec<MessageView>>(SNAPSHOT_BUFFER);

        let mut listener = self.db.create_live_listener().await?;
        self.db.listen_channel_messages(
            &mut listener,
            chat_id,
            FirestoreListenerTarget::new(CHANNEL_MESSAGES_TARGET),
        )?;

        let messages = Arc::new(Mutex::new(HashMap::<String, Message>::new()));
        let db = self.db.clone();
        let cb_tx = tx.clone();

        listener
            .start(move |event| {
                let messages = messages.clone();
                let db = db.clone();
                let tx = cb_tx.clone();
                async move {
                    let changed = {
                        let mut map = messages.lock().map_err(|_| "channel state poisoned")?;
                        apply_channel_event(&mut map, &event)?
                    };
                    if !changed {
                        return Ok(());
                    }

                    let (batch, sender_uids) = {
                        let map = messages.lock().map_err(|_| "channel state poisoned")?;
                        let batch: Vec<Message> = map.values().cloned().collect();
                        let uids: Vec<String> = batch.iter().map(|m| m.uid.clone()).collect();
                        (batch, uids)
                    };

                    let profiles = match db.get_users_by_ids(sender_uids).await {
                        Ok(profiles) => profiles,
                        Err(e) => {
                            tracing::warn!(error = %e, "Message enrichment degraded to snapshots");
                            HashMap::new()
                        }
                    };

                    let _ = tx.send(enrich_messages(batch, &profiles)).await;
                    Ok(())
                }
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to start listener: {}", e)))?;

        tokio::spawn(async move {
            tx.closed().await;
            if let Err(e) = listener.shutdown().await {
                tracing::debug!(error = %e, "Channel listener shutdown failed");
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(id: &str, user1: &str, user2: &str, secs: i64) -> Connection {
        Connection {
            id: Some(id.to_string()),
            user1_uid: user1.to_string(),
            user2_uid: user2.to_string(),
            created_at: chrono::DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    fn request(id: &str, from: &str, to: &str, status: RequestStatus) -> ConnectionRequest {
        ConnectionRequest {
            id: Some(id.to_string()),
            from_uid: from.to_string(),
            to_uid: to.to_string(),
            status,
            initial_message: String::new(),
            created_at: chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    fn profile(uid: &str, name: &str) -> UserProfile {
        UserProfile {
            uid: uid.to_string(),
            display_name: name.to_string(),
            photo_url: None,
            active_status: true,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn connection_targets_merge_without_clobbering() {
        let mut state = SyncState::default();

        // The same record arriving on both targets stays one record, and
        // records unique to one target survive emissions from the other.
        state.apply_connection(CONNECTIONS_USER1_TARGET, connection("c1", "me", "alice", 1));
        state.apply_connection(CONNECTIONS_USER2_TARGET, connection("c1", "me", "alice", 1));
        state.apply_connection(CONNECTIONS_USER2_TARGET, connection("c2", "bob", "me", 2));

        let ids: Vec<&str> = state
            .connections()
            .iter()
            .filter_map(|c| c.id.as_deref())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"c1"));
        assert!(ids.contains(&"c2"));
    }

    #[test]
    fn removal_honors_target_ownership() {
        let mut state = SyncState::default();
        state.apply_connection(CONNECTIONS_USER1_TARGET, connection("c1", "me", "alice", 1));
        state.apply_connection(CONNECTIONS_USER2_TARGET, connection("c2", "bob", "me", 2));

        state.remove_doc(&[CONNECTIONS_USER2_TARGET], "c2");
        assert_eq!(state.connections().len(), 1);

        // Empty target list removes everywhere.
        state.remove_doc(&[], "c1");
        assert!(state.connections().is_empty());
    }

    #[test]
    fn non_pending_requests_are_filtered_from_snapshots() {
        let mut state = SyncState::default();
        state.apply_request(request("r1", "alice", "me", RequestStatus::Pending));
        state.apply_request(request("r2", "bob", "me", RequestStatus::Accepted));

        let snapshot = build_snapshot("me", &state, &HashMap::new());
        assert_eq!(snapshot.pending_requests.len(), 1);
        assert_eq!(snapshot.pending_requests[0].id, "r1");
    }

    #[test]
    fn snapshot_enriches_with_counterpart_profile() {
        let mut state = SyncState::default();
        state.apply_request(request("r1", "alice", "me", RequestStatus::Pending));
        state.apply_connection(CONNECTIONS_USER1_TARGET, connection("c1", "me", "bob", 1));

        let mut profiles = HashMap::new();
        profiles.insert("alice".to_string(), profile("alice", "Alice"));

        let snapshot = build_snapshot("me", &state, &profiles);

        assert_eq!(snapshot.pending_requests[0].from_display_name, "Alice");
        // No live profile for bob: fall back to the placeholder.
        assert_eq!(snapshot.connections[0].other_display_name, UNKNOWN_USER);
        assert_eq!(snapshot.connections[0].other_uid, "bob");
    }

    #[test]
    fn message_join_prefers_live_profile_and_falls_back_to_snapshot() {
        let old = Message {
            id: Some("m1".to_string()),
            chat_id: "c1".to_string(),
            uid: "alice".to_string(),
            display_name: "Alice (old)".to_string(),
            photo_url: Some("/uploads/alice.png".to_string()),
            text: "hi".to_string(),
            created_at: chrono::DateTime::from_timestamp(1, 0).unwrap(),
        };
        let orphan = Message {
            id: Some("m2".to_string()),
            chat_id: "c1".to_string(),
            uid: "ghost".to_string(),
            display_name: "Ghost".to_string(),
            photo_url: None,
            text: "boo".to_string(),
            created_at: chrono::DateTime::from_timestamp(2, 0).unwrap(),
        };

        let mut profiles = HashMap::new();
        profiles.insert("alice".to_string(), profile("alice", "Alice"));

        let views = enrich_messages(vec![orphan, old], &profiles);

        assert_eq!(views[0].display_name, "Alice");
        assert_eq!(views[0].photo_url, Some("/uploads/alice.png".to_string()));
        assert_eq!(views[1].display_name, "Ghost");
    }

    #[test]
    fn message_views_are_ordered_by_timestamp() {
        let mk = |id: &str, secs: i64| Message {
            id: Some(id.to_string()),
            chat_id: "c1".to_string(),
            uid: "alice".to_string(),
            display_name: "Alice".to_string(),
            photo_url: None,
            text: "x".to_string(),
            created_at: chrono::DateTime::from_timestamp(secs, 0).unwrap(),
        };

        let views = enrich_messages(vec![mk("m3", 30), mk("m1", 10), mk("m2", 20)], &HashMap::new());
        let ids: Vec<&str> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[test]
    fn counterpart_uids_cover_requests_and_connections() {
        let mut state = SyncState::default();
        state.apply_request(request("r1", "alice", "me", RequestStatus::Pending));
        state.apply_connection(CONNECTIONS_USER1_TARGET, connection("c1", "me", "bob", 1));
        state.apply_connection(CONNECTIONS_USER2_TARGET, connection("c2", "carol", "me", 2));

        let mut uids = state.counterpart_uids("me");
        uids.sort();
        assert_eq!(uids, vec!["alice", "bob", "carol"]);
    }
}
