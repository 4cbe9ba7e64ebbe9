//! RFID tag bridge
//!
//! Tracks which tags are currently on the reader, turns tag events into
//! sign-ins and sign-outs, and pushes every change to the live-view sockets.
//!
//! A student tag scanned while no mentor tag is present is a sign-in; the
//! same scan with a mentor tag present is a sign-out attributed to the first
//! mentor on the reader.
//!
//! All state sits behind one lock. Each event runs its whole body, store
//! calls included, under that lock and collects outgoing messages in an
//! outbox that is flushed to the registered clients once the body is done.

pub mod socket;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::{Serialize, Serializer};
use tokio::sync::mpsc::UnboundedSender;

use crate::db::{queries, Database, DbError};
use crate::models::lab_session::{format_hours, hours_between, NewLabSession, SignOutBy};
use crate::models::mentor::Mentor;
use crate::models::student::Student;
use crate::models::tag::TagOwner;

/// Minimum time between a student's last sign-out and an RFID sign-in
pub const DEBOUNCE_WINDOW_SECS: i64 = 60;

/// Owner of a scanned tag
#[derive(Debug, Clone, PartialEq)]
pub enum TagUser {
    Unassigned,
    Student(Student),
    Mentor(Mentor),
}

/// Wire form of a [`TagUser`]
#[derive(Serialize)]
struct UserDescriptor {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

impl Serialize for TagUser {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let descriptor = match self {
            TagUser::Unassigned => UserDescriptor {
                kind: "unassigned",
                id: None,
                name: None,
            },
            TagUser::Student(student) => UserDescriptor {
                kind: "student",
                id: Some(student.id),
                name: Some(student.full_name()),
            },
            TagUser::Mentor(mentor) => UserDescriptor {
                kind: "mentor",
                id: Some(mentor.id),
                name: Some(mentor.full_name()),
            },
        };
        descriptor.serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagState {
    In,
    Out,
}

/// Messages sent to live-view clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WsMessage {
    Status {
        status: &'static str,
    },
    Presence {
        user: TagUser,
        state: TagState,
        tag: String,
    },
    SignIn {
        signin: String,
    },
}

impl WsMessage {
    pub fn opened() -> Self {
        WsMessage::Status {
            status: "Connection Opened",
        }
    }

    pub fn closed() -> Self {
        WsMessage::Status {
            status: "Connection Closed",
        }
    }

    fn presence(user: TagUser, state: TagState, tag: &str) -> Self {
        WsMessage::Presence {
            user,
            state,
            tag: tag.to_string(),
        }
    }

    fn signin(message: String) -> Self {
        WsMessage::SignIn { signin: message }
    }

    fn to_json(&self) -> Option<String> {
        serde_json::to_string(self)
            .map_err(|e| tracing::error!("Failed to encode websocket message: {}", e))
            .ok()
    }
}

/// Look up who a tag belongs to
pub fn resolve_tag(conn: &Connection, tag_id: &str) -> Result<TagUser, DbError> {
    let Some(tag) = queries::get_tag(conn, tag_id)? else {
        return Ok(TagUser::Unassigned);
    };

    let user = match tag.owner() {
        TagOwner::Student(id) => queries::get_student(conn, id)?.map(TagUser::Student),
        TagOwner::Mentor(id) => queries::get_mentor(conn, id)?.map(TagUser::Mentor),
        TagOwner::Neither => None,
    };

    Ok(user.unwrap_or(TagUser::Unassigned))
}

/// Tags currently on the reader
#[derive(Debug, Default)]
pub struct Presence {
    /// Last resolution of every tag in, in first-seen order
    tags: Vec<(String, TagUser)>,
    mentor_tags: Vec<String>,
    student_tags: Vec<String>,
}

impl Presence {
    pub fn mentor_tags(&self) -> &[String] {
        &self.mentor_tags
    }

    pub fn student_tags(&self) -> &[String] {
        &self.student_tags
    }

    fn record(&mut self, tag_id: &str, user: TagUser) {
        match self.tags.iter_mut().find(|(tag, _)| tag == tag_id) {
            Some(entry) => entry.1 = user,
            None => self.tags.push((tag_id.to_string(), user)),
        }
    }

    fn forget(&mut self, tag_id: &str) -> Option<TagUser> {
        let index = self.tags.iter().position(|(tag, _)| tag == tag_id)?;
        Some(self.tags.remove(index).1)
    }

    /// Presence events replaying every known tag
    pub fn replay(&self) -> Vec<WsMessage> {
        self.tags
            .iter()
            .map(|(tag, user)| WsMessage::presence(user.clone(), TagState::In, tag))
            .collect()
    }

    /// Handle a tag arriving at the reader
    pub fn tag_in(
        &mut self,
        conn: &Connection,
        tag_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<WsMessage>, DbError> {
        let user = resolve_tag(conn, tag_id)?;
        self.record(tag_id, user.clone());

        let mut outbox = Vec::new();
        match &user {
            TagUser::Mentor(_) => self.mentor_tags.push(tag_id.to_string()),
            TagUser::Student(student) => {
                self.student_tags.push(tag_id.to_string());

                let reply = if self.mentor_tags.is_empty() {
                    sign_in(conn, student, now)?
                } else {
                    self.sign_out(conn, student, now)?
                };
                outbox.extend(reply.map(WsMessage::signin));
            }
            TagUser::Unassigned => {}
        }

        outbox.push(WsMessage::presence(user, TagState::In, tag_id));
        Ok(outbox)
    }

    /// Handle a tag leaving the reader.
    ///
    /// The presence event is always queued; a returned error is reported to
    /// the caller only after it has been broadcast.
    pub fn tag_out(
        &mut self,
        conn: &Connection,
        tag_id: &str,
    ) -> Result<(Vec<WsMessage>, Option<&'static str>), DbError> {
        let previous = self.forget(tag_id);
        let tag = queries::get_tag(conn, tag_id)?;

        let error = match tag.as_ref().map(|t| t.owner()) {
            None => Some("No such tag."),
            Some(TagOwner::Student(_)) => {
                self.student_tags.retain(|t| t != tag_id);
                None
            }
            Some(TagOwner::Mentor(_)) => {
                self.mentor_tags.retain(|t| t != tag_id);
                None
            }
            Some(TagOwner::Neither) => Some("Tag does not reference a student or mentor."),
        };

        let user = match previous {
            Some(user) => user,
            None => resolve_tag(conn, tag_id)?,
        };

        Ok((vec![WsMessage::presence(user, TagState::Out, tag_id)], error))
    }

    fn sign_out(
        &self,
        conn: &Connection,
        student: &Student,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, DbError> {
        let Some(open) = queries::open_session_for_student(conn, student.id)? else {
            return Ok(Some(format!("Error: {} is not signed in.", student.full_name())));
        };

        let Some(mentor_tag) = self.mentor_tags.first() else {
            return Ok(None);
        };
        let mentor = match queries::get_tag(conn, mentor_tag)?.map(|t| t.owner()) {
            Some(TagOwner::Mentor(id)) => queries::get_mentor(conn, id)?,
            _ => None,
        };
        let Some(mentor) = mentor else {
            tracing::warn!(tag = %mentor_tag, "Present mentor tag no longer resolves to a mentor");
            return Ok(Some(format!("Error: No mentor found for tag {}.", mentor_tag)));
        };

        queries::sign_out_lab_session(conn, open.id, now, &SignOutBy::Mentor(mentor.id))?;
        tracing::info!(student_id = student.id, mentor_id = mentor.id, "RFID sign-out");

        Ok(Some(format!(
            "{} signed out after {} hours by {}",
            student.full_name(),
            format_hours(hours_between(open.time_in, now)),
            mentor.full_name()
        )))
    }
}

/// Sign a student in, unless already in or inside the debounce window.
///
/// `None` means the scan was debounced and nothing should be reported.
fn sign_in(conn: &Connection, student: &Student, now: DateTime<Utc>) -> Result<Option<String>, DbError> {
    if queries::open_session_for_student(conn, student.id)?.is_some() {
        return Ok(Some(format!("Error: {} is already signed in.", student.first_name)));
    }

    let last_time_out = queries::last_session_for_student(conn, student.id)?.and_then(|s| s.time_out);
    if let Some(time_out) = last_time_out {
        if now - time_out <= Duration::seconds(DEBOUNCE_WINDOW_SECS) {
            tracing::debug!(student_id = student.id, "Debounced RFID sign-in");
            return Ok(None);
        }
    }

    queries::insert_lab_session(
        conn,
        student.id,
        &NewLabSession {
            time_in: now,
            ..Default::default()
        },
    )?;
    tracing::info!(student_id = student.id, "RFID sign-in");

    Ok(Some(format!("Signed in {}!", student.full_name())))
}

/// Connected live-view clients
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<u64, UnboundedSender<String>>,
    next_id: u64,
}

impl ClientRegistry {
    pub fn register(&mut self, sender: UnboundedSender<String>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.clients.insert(id, sender);
        id
    }

    pub fn deregister(&mut self, id: u64) -> Option<UnboundedSender<String>> {
        self.clients.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send every message to every client, dropping clients whose channel closed
    pub fn broadcast(&mut self, outbox: &[WsMessage]) {
        for message in outbox {
            let Some(json) = message.to_json() else {
                continue;
            };

            self.clients.retain(|id, sender| {
                let delivered = sender.send(json.clone()).is_ok();
                if !delivered {
                    tracing::debug!(client_id = id, "Dropping disconnected live-view client");
                }
                delivered
            });
        }
    }
}

#[derive(Debug, Default)]
struct BridgeState {
    presence: Presence,
    clients: ClientRegistry,
}

/// Shared tag bridge: presence state plus the socket registry under one lock
#[derive(Debug, Default)]
pub struct TagBridge {
    state: Mutex<BridgeState>,
}

impl TagBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `GET /tag/events/in/:id`
    pub fn tag_in(&self, db: &Database, tag_id: &str, now: DateTime<Utc>) -> Result<(), DbError> {
        let mut state = self.lock();
        let outbox = db.with_connection(|conn| state.presence.tag_in(conn, tag_id, now))?;
        state.clients.broadcast(&outbox);
        Ok(())
    }

    /// `GET /tag/events/out/:id`; returns the error to report after broadcasting
    pub fn tag_out(&self, db: &Database, tag_id: &str) -> Result<Option<&'static str>, DbError> {
        let mut state = self.lock();
        let (outbox, error) = db.with_connection(|conn| state.presence.tag_out(conn, tag_id))?;
        state.clients.broadcast(&outbox);
        Ok(error)
    }

    /// Register a live-view client and replay the current tags to everyone
    pub fn connect(&self, sender: UnboundedSender<String>) -> u64 {
        if let Some(json) = WsMessage::opened().to_json() {
            let _ = sender.send(json);
        }

        let mut state = self.lock();
        let id = state.clients.register(sender);
        let replay = state.presence.replay();
        state.clients.broadcast(&replay);
        tracing::info!(client_id = id, clients = state.clients.len(), "Live-view client connected");
        id
    }

    pub fn disconnect(&self, id: u64) {
        let sender = self.lock().clients.deregister(id);
        if let (Some(sender), Some(json)) = (sender, WsMessage::closed().to_json()) {
            let _ = sender.send(json);
        }
        tracing::info!(client_id = id, "Live-view client disconnected");
    }

    /// Snapshot of the present mentor and student tags
    pub fn present_tags(&self) -> (Vec<String>, Vec<String>) {
        let state = self.lock();
        (
            state.presence.mentor_tags().to_vec(),
            state.presence.student_tags().to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mentor::NewMentor;
    use chrono::TimeZone;
    use serde_json::{json, Value};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    const STUDENT_TAG: &str = "S-0001";
    const MENTOR_TAG: &str = "M-0001";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 5, 18, 0, 0).unwrap()
    }

    /// Database with one student (254, Ada Lovelace) and one mentor
    /// (Pat Fairbank), each owning a tag
    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let mentor_id = db
            .with_connection(|conn| {
                queries::upsert_student(
                    conn,
                    &Student {
                        id: 254,
                        first_name: "Ada".to_string(),
                        last_name: "Lovelace".to_string(),
                    },
                )?;
                let mentor_id = queries::insert_mentor(
                    conn,
                    &NewMentor {
                        first_name: "Pat".to_string(),
                        last_name: "Fairbank".to_string(),
                        phone_number: "5551234567".to_string(),
                    },
                )?;
                queries::insert_tag(conn, STUDENT_TAG, TagOwner::Student(254))?;
                queries::insert_tag(conn, MENTOR_TAG, TagOwner::Mentor(mentor_id))?;
                Ok::<_, DbError>(mentor_id)
            })
            .unwrap();
        (db, mentor_id)
    }

    fn listen(bridge: &TagBridge) -> UnboundedReceiver<String> {
        let (tx, mut rx) = unbounded_channel();
        bridge.connect(tx);
        // Connection Opened
        rx.try_recv().unwrap();
        rx
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(text) = rx.try_recv() {
            messages.push(serde_json::from_str(&text).unwrap());
        }
        messages
    }

    fn open_session_count(db: &Database) -> usize {
        db.with_connection(|conn| queries::open_sessions(conn, false))
            .unwrap()
            .len()
    }

    fn open_session_at(db: &Database, time_in: DateTime<Utc>) {
        db.with_connection(|conn| {
            queries::insert_lab_session(
                conn,
                254,
                &NewLabSession {
                    time_in,
                    ..Default::default()
                },
            )
        })
        .unwrap();
    }

    #[test]
    fn test_mentor_tag_in_only_updates_presence() {
        let (db, mentor_id) = setup();
        let bridge = TagBridge::new();
        let mut rx = listen(&bridge);

        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();

        assert_eq!(bridge.present_tags(), (vec![MENTOR_TAG.to_string()], vec![]));
        assert_eq!(open_session_count(&db), 0);
        assert_eq!(
            drain(&mut rx),
            vec![json!({
                "user": {"type": "mentor", "id": mentor_id, "name": "Pat Fairbank"},
                "state": "in",
                "tag": MENTOR_TAG,
            })]
        );
    }

    #[test]
    fn test_student_tag_in_without_mentor_signs_in() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        let mut rx = listen(&bridge);

        bridge.tag_in(&db, STUDENT_TAG, now()).unwrap();

        assert_eq!(open_session_count(&db), 1);
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], json!({"signin": "Signed in Ada Lovelace!"}));
        assert_eq!(messages[1]["state"], "in");
        assert_eq!(messages[1]["user"]["type"], "student");
    }

    #[test]
    fn test_student_already_signed_in() {
        let (db, _) = setup();
        open_session_at(&db, now() - Duration::hours(1));
        let bridge = TagBridge::new();
        let mut rx = listen(&bridge);

        bridge.tag_in(&db, STUDENT_TAG, now()).unwrap();

        assert_eq!(open_session_count(&db), 1);
        let messages = drain(&mut rx);
        assert_eq!(messages[0], json!({"signin": "Error: Ada is already signed in."}));
    }

    #[test]
    fn test_sign_in_debounce_window() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        let mut rx = listen(&bridge);

        db.with_connection(|conn| {
            queries::insert_lab_session(
                conn,
                254,
                &NewLabSession {
                    time_in: now() - Duration::hours(2),
                    time_out: Some(now() - Duration::seconds(30)),
                    ..Default::default()
                },
            )
        })
        .unwrap();

        bridge.tag_in(&db, STUDENT_TAG, now()).unwrap();
        assert_eq!(open_session_count(&db), 0);
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1, "debounced scan only reports presence");
        assert_eq!(messages[0]["state"], "in");

        bridge.tag_out(&db, STUDENT_TAG).unwrap();
        bridge.tag_in(&db, STUDENT_TAG, now() + Duration::seconds(31)).unwrap();
        assert_eq!(open_session_count(&db), 1);
    }

    #[test]
    fn test_sign_in_debounce_window_is_inclusive() {
        let (db, _) = setup();
        let bridge = TagBridge::new();

        db.with_connection(|conn| {
            queries::insert_lab_session(
                conn,
                254,
                &NewLabSession {
                    time_in: now() - Duration::hours(2),
                    time_out: Some(now() - Duration::seconds(DEBOUNCE_WINDOW_SECS)),
                    ..Default::default()
                },
            )
        })
        .unwrap();

        bridge.tag_in(&db, STUDENT_TAG, now()).unwrap();
        assert_eq!(open_session_count(&db), 0);

        bridge.tag_out(&db, STUDENT_TAG).unwrap();
        bridge.tag_in(&db, STUDENT_TAG, now() + Duration::seconds(1)).unwrap();
        assert_eq!(open_session_count(&db), 1);
    }

    #[test]
    fn test_mentor_tag_in_leaves_open_session_alone() {
        let (db, _) = setup();
        open_session_at(&db, now() - Duration::hours(1));
        let bridge = TagBridge::new();

        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();

        assert_eq!(open_session_count(&db), 1);
        let last = db
            .with_connection(|conn| queries::last_session_for_student(conn, 254))
            .unwrap()
            .unwrap();
        assert_eq!(last.mentor_id, None);
        assert_eq!(last.time_out, None);
    }

    #[test]
    fn test_student_tag_in_with_mentor_signs_out() {
        let (db, mentor_id) = setup();
        open_session_at(&db, now() - Duration::minutes(90));
        let bridge = TagBridge::new();

        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();
        let mut rx = listen(&bridge);
        drain(&mut rx);

        bridge.tag_in(&db, STUDENT_TAG, now()).unwrap();

        assert_eq!(open_session_count(&db), 0);
        let last = db
            .with_connection(|conn| queries::last_session_for_student(conn, 254))
            .unwrap()
            .unwrap();
        assert_eq!(last.mentor_id, Some(mentor_id));
        assert_eq!(last.time_out, Some(now()));

        let messages = drain(&mut rx);
        assert_eq!(
            messages[0],
            json!({"signin": "Ada Lovelace signed out after 1.5 hours by Pat Fairbank"})
        );
    }

    #[test]
    fn test_student_not_signed_in_with_mentor_present() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();
        let mut rx = listen(&bridge);
        drain(&mut rx);

        bridge.tag_in(&db, STUDENT_TAG, now()).unwrap();

        assert_eq!(open_session_count(&db), 0);
        assert_eq!(
            drain(&mut rx)[0],
            json!({"signin": "Error: Ada Lovelace is not signed in."})
        );
    }

    #[test]
    fn test_unassigned_tag_in() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        let mut rx = listen(&bridge);

        bridge.tag_in(&db, "UNKNOWN", now()).unwrap();

        assert_eq!(bridge.present_tags(), (vec![], vec![]));
        assert_eq!(
            drain(&mut rx),
            vec![json!({"user": {"type": "unassigned"}, "state": "in", "tag": "UNKNOWN"})]
        );
    }

    #[test]
    fn test_tag_out_removes_presence() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();
        let mut rx = listen(&bridge);
        drain(&mut rx);

        let error = bridge.tag_out(&db, MENTOR_TAG).unwrap();

        assert_eq!(error, None);
        assert_eq!(bridge.present_tags(), (vec![], vec![]));
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["state"], "out");
        assert_eq!(messages[0]["user"]["name"], "Pat Fairbank");
    }

    #[test]
    fn test_tag_out_unknown_tag_broadcasts_before_error() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        let mut rx = listen(&bridge);

        let error = bridge.tag_out(&db, "UNKNOWN").unwrap();

        assert_eq!(error, Some("No such tag."));
        assert_eq!(
            drain(&mut rx),
            vec![json!({"user": {"type": "unassigned"}, "state": "out", "tag": "UNKNOWN"})]
        );
    }

    #[test]
    fn test_tag_out_ownerless_tag() {
        let (db, _) = setup();
        db.with_connection(|conn| queries::insert_tag(conn, "EMPTY", TagOwner::Neither))
            .unwrap();
        let bridge = TagBridge::new();

        let error = bridge.tag_out(&db, "EMPTY").unwrap();
        assert_eq!(error, Some("Tag does not reference a student or mentor."));
    }

    #[test]
    fn test_connect_replays_present_tags() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();
        bridge.tag_in(&db, "UNKNOWN", now()).unwrap();

        let (tx, mut rx) = unbounded_channel();
        bridge.connect(tx);

        let messages = drain(&mut rx);
        assert_eq!(messages[0], json!({"status": "Connection Opened"}));
        assert_eq!(messages[1]["tag"], MENTOR_TAG);
        assert_eq!(messages[2]["tag"], "UNKNOWN");
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn test_disconnect_acknowledges_and_deregisters() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        let (tx, mut rx) = unbounded_channel();
        let id = bridge.connect(tx);
        drain(&mut rx);

        bridge.disconnect(id);
        assert_eq!(drain(&mut rx), vec![json!({"status": "Connection Closed"})]);

        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_closed_clients_are_dropped_on_broadcast() {
        let (db, _) = setup();
        let bridge = TagBridge::new();
        let (tx, rx) = unbounded_channel();
        bridge.connect(tx);
        drop(rx);

        bridge.tag_in(&db, MENTOR_TAG, now()).unwrap();
        assert!(bridge.lock().clients.is_empty());
    }
}
