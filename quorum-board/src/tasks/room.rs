use chrono::Utc;
use quorum_core::{
    fan_out, BatchReport, Direction, DocumentStore, LiveList, OptimisticCell, Update,
};
use serde_json::json;

use crate::{
    BoardContext, BoardError, BoardResult, NotificationKind, Notifications, Priority, Room,
    RoomTask, UserProfile,
};

/// Tasks scoped to one room, including the proof-of-completion flow.
///
/// There are two ways a task gets completed. Members go through the
/// proof path: an image is uploaded and the completion flag plus all
/// three proof fields land in one atomic update. Admins flip the flag
/// directly from the management screen, leaving proof fields untouched
/// in both directions.
pub struct RoomTasks<S> {
    context: BoardContext<S>,
}

#[derive(Debug, Clone)]
pub struct NewRoomTask {
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub due_date: String,
    pub assignees: Vec<String>,
}

/// A task edit from the management screen. `None` fields are left as
/// they are.
#[derive(Debug, Clone, Default)]
pub struct RoomTaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
}

impl<S> RoomTasks<S>
where
    S: DocumentStore,
{
    pub fn new(context: &BoardContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn create(
        &self,
        actor: &UserProfile,
        room_id: &str,
        new: NewRoomTask,
    ) -> BoardResult<RoomTask> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let mut task = RoomTask {
            id: String::new(),
            title: new.title,
            description: new.description,
            priority: new.priority,
            due_date: new.due_date,
            assignees: new.assignees,
            completed: false,
            proof_url: None,
            proof_submitted_at: None,
            proof_submitted_by: None,
            created_by: actor.uid.clone(),
            created_at: Utc::now(),
        };

        let doc = self
            .context
            .store
            .add(
                &Room::tasks_of(room_id),
                serde_json::to_value(&task).expect("tasks serialize"),
            )
            .await?;

        task.id = doc.id().to_string();

        self.notify_assignees(actor, &task).await;

        Ok(task)
    }

    pub async fn delete(
        &self,
        actor: &UserProfile,
        room_id: &str,
        task_id: &str,
    ) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        self.context
            .store
            .delete(&Room::tasks_of(room_id).doc(task_id))
            .await?;

        Ok(())
    }

    pub async fn edit(
        &self,
        actor: &UserProfile,
        room_id: &str,
        task_id: &str,
        changes: RoomTaskChanges,
    ) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let mut update = Update::new();

        if let Some(title) = changes.title {
            update = update.set("title", json!(title));
        }
        if let Some(description) = changes.description {
            update = update.set("description", json!(description));
        }
        if let Some(priority) = changes.priority {
            update = update.set(
                "priority",
                serde_json::to_value(priority).expect("priorities serialize"),
            );
        }
        if let Some(due_date) = changes.due_date {
            update = update.set("dueDate", json!(due_date));
        }

        if update.is_empty() {
            return Ok(());
        }

        self.context
            .store
            .update(&Room::tasks_of(room_id).doc(task_id), update)
            .await?;

        Ok(())
    }

    /// Overwrites the assignee list and notifies everyone now on it.
    pub async fn assign(
        &self,
        actor: &UserProfile,
        room_id: &str,
        task_id: &str,
        assignees: Vec<String>,
    ) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let task = self.fetch(room_id, task_id).await?;

        self.context
            .store
            .update(
                &Room::tasks_of(room_id).doc(task_id),
                Update::new().set("assignees", json!(assignees)),
            )
            .await?;

        let task = RoomTask { assignees, ..task };
        self.notify_assignees(actor, &task).await;

        Ok(())
    }

    /// Reassigns several tasks to the same uids, one independent write
    /// per task. A failure stops the batch and is surfaced as a single
    /// alert covering the whole set.
    pub async fn bulk_assign(
        &self,
        actor: &UserProfile,
        room_id: &str,
        task_ids: Vec<String>,
        assignees: Vec<String>,
    ) -> BoardResult<BatchReport<String>> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let store = self.context.store.clone();
        let total = task_ids.len();

        let report = fan_out(task_ids, |task_id| {
            let store = store.clone();
            let doc = Room::tasks_of(room_id).doc(task_id.as_str());
            let update = Update::new().set("assignees", json!(assignees.clone()));

            async move { store.update(&doc, update).await }
        })
        .await;

        if !report.is_complete() {
            let failure = BoardError::PartialBatch {
                committed: report.committed().count(),
                total,
            };

            self.context.alert("Reassignment", failure.to_string());
        }

        Ok(report)
    }

    /// The admin completion toggle. Only the flag changes; whatever
    /// proof fields the task carries stay exactly as they are.
    pub async fn toggle_completed(
        &self,
        actor: &UserProfile,
        room_id: &str,
        task_id: &str,
        completed: bool,
        cell: &OptimisticCell<bool>,
    ) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let store = self.context.store.clone();
        let doc = Room::tasks_of(room_id).doc(task_id);

        self.context
            .optimistic(cell, completed, "Task", async move {
                store
                    .update(&doc, Update::new().set("completed", json!(completed)))
                    .await
            })
            .await
    }

    /// The member completion path: uploads the proof image, then writes
    /// the completion flag and all three proof fields as one update.
    pub async fn submit_proof(
        &self,
        actor: &UserProfile,
        room_id: &str,
        task_id: &str,
        image: Vec<u8>,
        filename: &str,
        content_type: &str,
    ) -> BoardResult<String> {
        let uploaded = self
            .context
            .uploads
            .upload(image, filename, content_type)
            .await?;

        self.context
            .store
            .update(
                &Room::tasks_of(room_id).doc(task_id),
                Update::new()
                    .set("completed", json!(true))
                    .set("proof_url", json!(uploaded.url))
                    .set("proof_submitted_at", json!(Utc::now()))
                    .set("proof_submitted_by", json!(actor.uid)),
            )
            .await?;

        Ok(uploaded.url)
    }

    /// The member reopen path: clears the completion flag and all three
    /// proof fields as one update.
    pub async fn reopen(&self, room_id: &str, task_id: &str) -> BoardResult<()> {
        self.context
            .store
            .update(
                &Room::tasks_of(room_id).doc(task_id),
                Update::new()
                    .set("completed", json!(false))
                    .set("proof_url", json!(null))
                    .set("proof_submitted_at", json!(null))
                    .set("proof_submitted_by", json!(null)),
            )
            .await?;

        Ok(())
    }

    /// One room's tasks, newest first.
    pub fn watch(&self, room_id: &str) -> LiveList<RoomTask> {
        let query = Room::tasks_of(room_id)
            .query()
            .order_by("createdAt", Direction::Descending);

        self.context.live_list(query, "tasks")
    }

    pub async fn fetch(&self, room_id: &str, task_id: &str) -> BoardResult<RoomTask> {
        let doc = self
            .context
            .store
            .get(&Room::tasks_of(room_id).doc(task_id))
            .await?
            .ok_or(BoardError::Missing)?;

        Ok(doc.decode::<RoomTask>().map_err(|error| {
            log::warn!("{error}");
            BoardError::Missing
        })?)
    }

    async fn notify_assignees(&self, actor: &UserProfile, task: &RoomTask) {
        if task.assignees.is_empty() {
            return;
        }

        let title = task.title.clone();

        Notifications::new(&self.context)
            .dispatch(
                actor,
                &task.assignees,
                NotificationKind::Task,
                Some(&task.id),
                "Task assigned",
                |label| format!("{label} assigned you: {title}"),
            )
            .await;
    }
}

#[cfg(test)]
mod test {
    use quorum_core::ItemOutcome;
    use quorum_impls::MemoryStore;

    use super::*;
    use crate::support::{admin, member, test_context};
    use crate::{BoardEvent, Notification, ProofState};

    fn new_task(assignees: Vec<&str>) -> NewRoomTask {
        NewRoomTask {
            title: "Collect signatures".to_string(),
            description: String::new(),
            priority: Priority::High,
            due_date: "2024-06-01".to_string(),
            assignees: assignees.into_iter().map(str::to_string).collect(),
        }
    }

    #[tokio::test]
    async fn member_proof_submission_writes_the_trio_together() {
        let (context, _events) = test_context(MemoryStore::new());
        let tasks = RoomTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let doer = member("u1", "Sam", "Ortiz");

        let task = tasks
            .create(&boss, "r1", new_task(vec!["u1"]))
            .await
            .expect("task created");

        assert_eq!(task.proof_state().unwrap(), ProofState::Pending);

        let url = tasks
            .submit_proof(
                &doer,
                "r1",
                &task.id,
                vec![1, 2, 3],
                "proof.jpg",
                "image/jpeg",
            )
            .await
            .expect("proof submitted");

        let task = tasks.fetch("r1", &task.id).await.expect("fetches");

        assert!(task.completed);
        assert_eq!(task.proof_url.as_deref(), Some(url.as_str()));
        assert_eq!(task.proof_submitted_by.as_deref(), Some("u1"));
        assert!(task.proof_submitted_at.is_some());
        assert_eq!(
            task.proof_state().unwrap(),
            ProofState::CompletedWithProof
        );
    }

    #[tokio::test]
    async fn reopening_clears_the_trio_together() {
        let (context, _events) = test_context(MemoryStore::new());
        let tasks = RoomTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let doer = member("u1", "Sam", "Ortiz");

        let task = tasks
            .create(&boss, "r1", new_task(vec!["u1"]))
            .await
            .expect("task created");

        tasks
            .submit_proof(&doer, "r1", &task.id, vec![1], "proof.jpg", "image/jpeg")
            .await
            .expect("proof submitted");

        tasks.reopen("r1", &task.id).await.expect("reopened");

        let task = tasks.fetch("r1", &task.id).await.expect("fetches");

        assert!(!task.completed);
        assert_eq!(task.proof_url, None);
        assert_eq!(task.proof_submitted_at, None);
        assert_eq!(task.proof_submitted_by, None);
        assert_eq!(task.proof_state().unwrap(), ProofState::Pending);
    }

    #[tokio::test]
    async fn admin_toggle_never_touches_proof_fields() {
        let (context, _events) = test_context(MemoryStore::new());
        let tasks = RoomTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let doer = member("u1", "Sam", "Ortiz");

        let task = tasks
            .create(&boss, "r1", new_task(vec!["u1"]))
            .await
            .expect("task created");

        // Direct completion leaves proof null.
        let cell = OptimisticCell::new(false);
        tasks
            .toggle_completed(&boss, "r1", &task.id, true, &cell)
            .await
            .expect("toggled");

        let fetched = tasks.fetch("r1", &task.id).await.expect("fetches");
        assert_eq!(
            fetched.proof_state().unwrap(),
            ProofState::CompletedWithoutProof
        );

        // Now complete with proof, then un-toggle as admin: the stale
        // proof stays behind.
        tasks
            .submit_proof(&doer, "r1", &task.id, vec![1], "proof.jpg", "image/jpeg")
            .await
            .expect("proof submitted");
        tasks
            .toggle_completed(&boss, "r1", &task.id, false, &cell)
            .await
            .expect("toggled back");

        let fetched = tasks.fetch("r1", &task.id).await.expect("fetches");
        assert!(!fetched.completed);
        assert!(fetched.proof_url.is_some(), "proof is left untouched");
        assert_eq!(fetched.proof_state().unwrap(), ProofState::Pending);

        let denied = tasks
            .toggle_completed(&doer, "r1", &task.id, true, &cell)
            .await
            .expect_err("members don't get the direct toggle");
        assert!(matches!(denied, BoardError::AdminOnly));
    }

    #[tokio::test]
    async fn failed_toggle_rolls_back_and_alerts_once() {
        let store = MemoryStore::new();
        let (context, events) = test_context(store.clone());
        let tasks = RoomTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let task = tasks
            .create(&boss, "r1", new_task(vec![]))
            .await
            .expect("task created");

        store.reject_next_write(&task.id, "simulated outage");

        let cell = OptimisticCell::new(false);
        let error = tasks
            .toggle_completed(&boss, "r1", &task.id, true, &cell)
            .await
            .expect_err("write fails");

        assert!(matches!(error, BoardError::Mutation(_)));
        assert!(!cell.get(), "rolled back to the pre-toggle value");

        let fetched = tasks.fetch("r1", &task.id).await.expect("fetches");
        assert!(!fetched.completed, "the server never saw the toggle");

        let alerts = events
            .try_iter()
            .filter(|event| matches!(event, BoardEvent::Alert { .. }))
            .count();
        assert_eq!(alerts, 1);
    }

    #[tokio::test]
    async fn edits_only_touch_given_fields() {
        let (context, _events) = test_context(MemoryStore::new());
        let tasks = RoomTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let task = tasks
            .create(&boss, "r1", new_task(vec!["u1"]))
            .await
            .expect("task created");

        tasks
            .edit(
                &boss,
                "r1",
                &task.id,
                RoomTaskChanges {
                    due_date: Some("2024-07-01".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("edited");

        let fetched = tasks.fetch("r1", &task.id).await.expect("fetches");

        assert_eq!(fetched.due_date, "2024-07-01");
        assert_eq!(fetched.title, "Collect signatures", "untouched");
        assert_eq!(fetched.assignees, vec!["u1"], "untouched");

        let denied = tasks
            .edit(
                &member("u1", "Sam", "Ortiz"),
                "r1",
                &task.id,
                RoomTaskChanges::default(),
            )
            .await
            .expect_err("admin only");
        assert!(matches!(denied, BoardError::AdminOnly));
    }

    #[tokio::test]
    async fn assignment_notifies_every_assignee() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let tasks = RoomTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let task = tasks
            .create(&boss, "r1", new_task(vec!["u1", "u2"]))
            .await
            .expect("task created");

        let docs = store
            .fetch(&Notification::collection().query())
            .await
            .expect("fetch works");
        assert_eq!(docs.len(), 2);

        for doc in docs {
            let notification: Notification = doc.decode().expect("decodes");
            assert_eq!(notification.kind, NotificationKind::Task);
            assert_eq!(notification.action_id.as_deref(), Some(task.id.as_str()));
        }
    }

    #[tokio::test]
    async fn bulk_assignment_stops_at_the_first_failure() {
        let store = MemoryStore::new();
        let (context, events) = test_context(store.clone());
        let tasks = RoomTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");

        let mut ids = vec![];
        for _ in 0..3 {
            let task = tasks
                .create(&boss, "r1", new_task(vec![]))
                .await
                .expect("task created");
            ids.push(task.id);
        }

        store.reject_next_write(&ids[1], "simulated outage");

        let report = tasks
            .bulk_assign(&boss, "r1", ids.clone(), vec!["u1".to_string()])
            .await
            .expect("report comes back");

        assert!(report.is_partial());
        assert_eq!(report.committed().collect::<Vec<_>>(), vec![&ids[0]]);
        assert!(matches!(
            report.outcomes()[1].1,
            ItemOutcome::Failed(_)
        ));
        assert_eq!(report.skipped().collect::<Vec<_>>(), vec![&ids[2]]);

        let first = tasks.fetch("r1", &ids[0]).await.expect("fetches");
        assert_eq!(first.assignees, vec!["u1"]);

        let third = tasks.fetch("r1", &ids[2]).await.expect("fetches");
        assert!(third.assignees.is_empty(), "skipped tasks are untouched");

        let alerts = events
            .try_iter()
            .filter(|event| matches!(event, BoardEvent::Alert { .. }))
            .count();
        assert_eq!(alerts, 1, "one generic alert for the whole batch");
    }
}
