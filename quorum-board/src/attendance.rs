use chrono::Utc;
use quorum_core::{fan_out, BatchReport, DocumentStore, LiveList, OptimisticCell};
use serde_json::json;

use crate::{
    AttendanceRecord, AttendanceStatus, BoardContext, BoardError, BoardResult, Room, UserProfile,
};

/// Per-day attendance marking within a room.
///
/// Members may only mark their own record; admins may mark anyone's.
/// Every mark is a whole-document upsert keyed by day and uid.
pub struct Attendance<S> {
    context: BoardContext<S>,
}

/// What came out of a mark-all fan-out.
#[derive(Debug)]
pub struct MarkAllOutcome {
    pub report: BatchReport<String>,
    /// The authoritative records for the day, refetched after a partial
    /// failure so local state can be reconciled with server truth.
    /// `None` when everything committed.
    pub refetched: Option<Vec<AttendanceRecord>>,
}

impl<S> Attendance<S>
where
    S: DocumentStore,
{
    pub fn new(context: &BoardContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Marks one member's attendance for one day, optimistically.
    pub async fn mark(
        &self,
        actor: &UserProfile,
        room_id: &str,
        date: &str,
        uid: &str,
        status: Option<AttendanceStatus>,
        cell: &OptimisticCell<Option<AttendanceStatus>>,
    ) -> BoardResult<()> {
        if uid != actor.uid && !actor.is_admin() {
            return Err(BoardError::NotYourRecord);
        }

        let store = self.context.store.clone();
        let doc = Room::attendance_of(room_id).doc(AttendanceRecord::record_id(date, uid));
        let fields = record_fields(date, uid, status, &actor.uid);

        self.context
            .optimistic(cell, status, "Attendance", async move {
                store.set(&doc, fields).await
            })
            .await
    }

    /// Marks every given member with the same status, one independent
    /// write per member. A failure stops the batch: members after it
    /// keep whatever status the server already had. On a partial result
    /// the day's records are refetched so callers can reconcile instead
    /// of trusting their optimistic view.
    pub async fn mark_all(
        &self,
        actor: &UserProfile,
        room_id: &str,
        date: &str,
        member_uids: Vec<String>,
        status: Option<AttendanceStatus>,
    ) -> BoardResult<MarkAllOutcome> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let store = self.context.store.clone();
        let total = member_uids.len();

        let report = fan_out(member_uids, |uid| {
            let store = store.clone();
            let doc = Room::attendance_of(room_id).doc(AttendanceRecord::record_id(date, uid));
            let fields = record_fields(date, uid, status, &actor.uid);

            async move { store.set(&doc, fields).await }
        })
        .await;

        if report.is_complete() {
            return Ok(MarkAllOutcome {
                report,
                refetched: None,
            });
        }

        let failure = BoardError::PartialBatch {
            committed: report.committed().count(),
            total,
        };

        self.context.alert("Attendance", failure.to_string());

        let refetched = self.records_on(room_id, date).await?;

        Ok(MarkAllOutcome {
            report,
            refetched: Some(refetched),
        })
    }

    /// The day's records as the server has them right now.
    pub async fn records_on(
        &self,
        room_id: &str,
        date: &str,
    ) -> BoardResult<Vec<AttendanceRecord>> {
        let query = Room::attendance_of(room_id)
            .query()
            .filter("date", json!(date));

        let docs = self.context.store.fetch(&query).await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<AttendanceRecord>() {
                Ok(record) => Some(record),
                Err(error) => {
                    log::warn!("skipping attendance record: {error}");
                    None
                }
            })
            .collect())
    }

    /// Live view of one day's records in a room.
    pub fn watch(&self, room_id: &str, date: &str) -> LiveList<AttendanceRecord> {
        let query = Room::attendance_of(room_id)
            .query()
            .filter("date", json!(date));

        self.context.live_list(query, "attendance")
    }
}

fn record_fields(
    date: &str,
    uid: &str,
    status: Option<AttendanceStatus>,
    marked_by: &str,
) -> serde_json::Value {
    let record = AttendanceRecord {
        id: String::new(),
        date: date.to_string(),
        uid: uid.to_string(),
        status,
        marked_by: marked_by.to_string(),
        marked_at: Utc::now(),
    };

    serde_json::to_value(&record).expect("records serialize")
}
