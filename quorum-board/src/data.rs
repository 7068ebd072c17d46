use chrono::{DateTime, Utc};
use quorum_core::CollectionRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The organization-wide role of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

/// A user's profile as stored, distinct from their identity-provider
/// account. Profiles are never hard-deleted by this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub uid: String,
    pub email: String,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl UserProfile {
    pub const COLLECTION: &'static str = "profiles";

    pub fn collection() -> CollectionRef {
        CollectionRef::new(Self::COLLECTION)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn full_name(&self) -> String {
        if self.last_name.is_empty() {
            self.first_name.clone()
        } else {
            format!("{} {}", self.first_name, self.last_name)
        }
    }

    pub fn initials(&self) -> String {
        [&self.first_name, &self.last_name]
            .iter()
            .filter_map(|name| name.chars().next())
            .collect::<String>()
            .to_uppercase()
    }
}

/// A named workspace grouping members, tasks, attendance and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The short human-shareable code used to join without an invite.
    /// Always stored uppercase.
    pub room_code: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub const COLLECTION: &'static str = "rooms";

    pub fn collection() -> CollectionRef {
        CollectionRef::new(Self::COLLECTION)
    }

    pub fn members_of(room_id: &str) -> CollectionRef {
        CollectionRef::new(format!("{}/{}/members", Self::COLLECTION, room_id))
    }

    pub fn tasks_of(room_id: &str) -> CollectionRef {
        CollectionRef::new(format!("{}/{}/tasks", Self::COLLECTION, room_id))
    }

    pub fn attendance_of(room_id: &str) -> CollectionRef {
        CollectionRef::new(format!("{}/{}/attendance", Self::COLLECTION, room_id))
    }
}

/// A user's membership in one room, keyed by their uid.
///
/// Name, email and photo are copied from the profile at join time and are
/// not kept in sync afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub uid: String,
    /// The room this membership belongs to, duplicated into the document
    /// so cross-room group queries can resolve the parent.
    pub room_id: String,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub role: Role,
}

pub const MEMBERS_GROUP: &str = "members";

/// Urgency of a room-scoped task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Where a task stands relative to its proof-of-completion flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofState {
    /// Not completed, no proof on record.
    Pending,
    /// Completed through the member path, all proof fields present.
    CompletedWithProof,
    /// Completed directly by an admin, proof fields untouched.
    CompletedWithoutProof,
}

/// A task whose proof fields are partially written. The member-facing
/// flow writes and clears all three as one update, so this shape only
/// arises from writes outside this client.
#[derive(Debug, Error)]
#[error("task {id} has a partially written proof")]
pub struct TornProof {
    pub id: String,
}

/// A task scoped to one room, with the proof-of-completion fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomTask {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    /// Free text, not validated as a date.
    #[serde(default)]
    pub due_date: String,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, rename = "proof_url")]
    pub proof_url: Option<String>,
    #[serde(default, rename = "proof_submitted_at")]
    pub proof_submitted_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "proof_submitted_by")]
    pub proof_submitted_by: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl RoomTask {
    /// Classifies the proof fields, rejecting shapes where only one or
    /// two of them are set.
    ///
    /// An open task can still carry a full proof trio: the admin toggle
    /// flips `completed` without touching proof, so un-completing a
    /// proof-completed task leaves the stale proof behind. That shape
    /// counts as [ProofState::Pending].
    pub fn proof_state(&self) -> Result<ProofState, TornProof> {
        let present = [
            self.proof_url.is_some(),
            self.proof_submitted_at.is_some(),
            self.proof_submitted_by.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        match (self.completed, present) {
            (_, 1) | (_, 2) => Err(TornProof {
                id: self.id.clone(),
            }),
            (false, _) => Ok(ProofState::Pending),
            (true, 0) => Ok(ProofState::CompletedWithoutProof),
            _ => Ok(ProofState::CompletedWithProof),
        }
    }
}

/// Lifecycle of an organization-wide task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// A task outside any room, used by the organization-wide tab flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgTask {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    pub assignee_uid: String,
    /// The assignee's display name as it was when the task was written.
    /// A deliberate cache: it goes stale if the profile is renamed and is
    /// only refreshed when the task itself is rewritten.
    pub assignee_name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl OrgTask {
    pub const COLLECTION: &'static str = "tasks";

    pub fn collection() -> CollectionRef {
        CollectionRef::new(Self::COLLECTION)
    }

    /// Percentage of checklist items done. `None` when there is no
    /// checklist to derive it from.
    pub fn progress(&self) -> Option<u8> {
        if self.checklist.is_empty() {
            return None;
        }

        let done = self.checklist.iter().filter(|item| item.completed).count();

        Some((done * 100 / self.checklist.len()) as u8)
    }
}

/// The fixed set of announcement tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncementTag {
    #[default]
    General,
    Event,
    Urgent,
    Reminder,
    Achievement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tag: AnnouncementTag,
    pub author_uid: String,
    pub author_name: String,
    #[serde(default)]
    pub author_initials: String,
    #[serde(default)]
    pub author_role: Role,
    #[serde(default)]
    pub pinned: bool,
    /// Grows only, incremented once per first view by a non-author.
    #[serde(default)]
    pub views: i64,
    /// Grows only, array-union of uids that have opened the detail view.
    #[serde(default)]
    pub read_by: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Announcement {
    pub const COLLECTION: &'static str = "announcements";

    pub fn collection() -> CollectionRef {
        CollectionRef::new(Self::COLLECTION)
    }

    pub fn has_read(&self, uid: &str) -> bool {
        self.read_by.iter().any(|reader| reader == uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

/// One member's attendance on one calendar day in one room.
///
/// Keyed by `{date}:{uid}` so a day and member pair always resolves to
/// the same document, making repeated marks overwrites rather than
/// duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    /// Calendar day as `YYYY-MM-DD`.
    pub date: String,
    pub uid: String,
    #[serde(default)]
    pub status: Option<AttendanceStatus>,
    pub marked_by: String,
    pub marked_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn record_id(date: &str, uid: &str) -> String {
        format!("{date}:{uid}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Calendar day as `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub color: String,
    pub room_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl CalendarEvent {
    pub const COLLECTION: &'static str = "events";

    pub fn collection() -> CollectionRef {
        CollectionRef::new(Self::COLLECTION)
    }
}

/// What a notification is about, which decides where tapping it leads.
///
/// Unknown tags decode instead of failing so old clients survive new
/// notification kinds, they just can't navigate from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Announcement,
    Task,
    Event,
    #[serde(other)]
    Unknown,
}

/// A best-effort message to one user. Written once, then only its read
/// flag ever changes. There is no deletion path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub recipient_uid: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Id of the entity to open when tapped.
    #[serde(default)]
    pub action_id: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub const COLLECTION: &'static str = "notifications";

    pub fn collection() -> CollectionRef {
        CollectionRef::new(Self::COLLECTION)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn task(completed: bool) -> RoomTask {
        RoomTask {
            id: "t1".to_string(),
            title: "Prepare agenda".to_string(),
            description: String::new(),
            priority: Priority::Medium,
            due_date: String::new(),
            assignees: vec![],
            completed,
            proof_url: None,
            proof_submitted_at: None,
            proof_submitted_by: None,
            created_by: "u1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn proof_states_classify() {
        assert_eq!(task(false).proof_state().unwrap(), ProofState::Pending);
        assert_eq!(
            task(true).proof_state().unwrap(),
            ProofState::CompletedWithoutProof
        );

        let mut with_proof = task(true);
        with_proof.proof_url = Some("https://media/x.jpg".to_string());
        with_proof.proof_submitted_at = Some(Utc::now());
        with_proof.proof_submitted_by = Some("u1".to_string());

        assert_eq!(
            with_proof.proof_state().unwrap(),
            ProofState::CompletedWithProof
        );
    }

    #[test]
    fn torn_proof_is_rejected() {
        let mut torn = task(true);
        torn.proof_url = Some("https://media/x.jpg".to_string());

        assert!(torn.proof_state().is_err());

        let mut two_of_three = task(false);
        two_of_three.proof_url = Some("https://media/x.jpg".to_string());
        two_of_three.proof_submitted_by = Some("u1".to_string());

        assert!(two_of_three.proof_state().is_err());
    }

    #[test]
    fn proof_field_names_stay_snake_cased() {
        let mut with_proof = task(true);
        with_proof.proof_url = Some("https://media/x.jpg".to_string());
        with_proof.proof_submitted_at = Some(Utc::now());
        with_proof.proof_submitted_by = Some("u1".to_string());

        let value = serde_json::to_value(&with_proof).unwrap();

        assert!(value.get("proof_url").is_some());
        assert!(value.get("proof_submitted_at").is_some());
        assert!(value.get("proof_submitted_by").is_some());
        assert!(value.get("dueDate").is_some(), "other fields are camelCase");
    }

    #[test]
    fn checklist_progress_is_derived() {
        let mut task = OrgTask {
            id: "g1".to_string(),
            name: "Fundraiser".to_string(),
            description: String::new(),
            priority: Priority::High,
            status: TaskStatus::InProgress,
            assignee_uid: "u1".to_string(),
            assignee_name: "Dana Reyes".to_string(),
            category: "events".to_string(),
            checklist: vec![],
            created_by: "admin".to_string(),
            created_at: Utc::now(),
        };

        assert_eq!(task.progress(), None, "no checklist, no percentage");

        task.checklist = vec![
            ChecklistItem {
                id: "c1".to_string(),
                text: "Book venue".to_string(),
                completed: true,
            },
            ChecklistItem {
                id: "c2".to_string(),
                text: "Print flyers".to_string(),
                completed: false,
            },
            ChecklistItem {
                id: "c3".to_string(),
                text: "Invite speakers".to_string(),
                completed: true,
            },
        ];

        assert_eq!(task.progress(), Some(66));
    }

    #[test]
    fn unknown_notification_kinds_decode() {
        let kind: NotificationKind = serde_json::from_str("\"poll\"").unwrap();
        assert_eq!(kind, NotificationKind::Unknown);

        let known: NotificationKind = serde_json::from_str("\"announcement\"").unwrap();
        assert_eq!(known, NotificationKind::Announcement);
    }

    #[test]
    fn notification_kind_serializes_under_type() {
        let notification = Notification {
            id: String::new(),
            recipient_uid: "u1".to_string(),
            title: "New announcement".to_string(),
            message: "Dana posted an announcement".to_string(),
            kind: NotificationKind::Announcement,
            action_id: Some("a1".to_string()),
            read: false,
            created_at: Utc::now(),
        };

        let value = serde_json::to_value(&notification).unwrap();

        assert_eq!(value["type"], "announcement");
        assert_eq!(value["actionId"], "a1");
        assert_eq!(value["recipientUid"], "u1");
    }

    #[test]
    fn initials_come_from_both_names() {
        let profile = UserProfile {
            id: String::new(),
            uid: "u1".to_string(),
            email: "dana@example.org".to_string(),
            first_name: "dana".to_string(),
            last_name: "reyes".to_string(),
            role: Role::Member,
            position: String::new(),
            photo_url: None,
        };

        assert_eq!(profile.initials(), "DR");
        assert_eq!(profile.full_name(), "dana reyes");
    }

    #[test]
    fn subcollection_paths_nest_under_the_room() {
        assert_eq!(Room::members_of("r1").path(), "rooms/r1/members");
        assert_eq!(Room::tasks_of("r1").path(), "rooms/r1/tasks");
        assert_eq!(Room::attendance_of("r1").path(), "rooms/r1/attendance");
        assert_eq!(AttendanceRecord::record_id("2024-05-01", "u1"), "2024-05-01:u1");
    }
}
