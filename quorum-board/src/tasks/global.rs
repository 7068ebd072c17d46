use chrono::Utc;
use quorum_core::{Direction, DocumentStore, LiveList, OptimisticCell, Update};
use serde_json::json;

use crate::{
    BoardContext, BoardError, BoardResult, ChecklistItem, NotificationKind, Notifications,
    OrgTask, Priority, TaskStatus, UserProfile,
};

/// Organization-wide tasks, outside any room.
///
/// The assignee's display name is snapshotted onto the task when it is
/// written and never invalidated: a later profile rename leaves it stale
/// until the task itself is rewritten. There is no mechanism to join it
/// back to the live profile, and none is attempted.
pub struct OrgTasks<S> {
    context: BoardContext<S>,
}

#[derive(Debug, Clone)]
pub struct NewOrgTask {
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub category: String,
    pub checklist: Vec<ChecklistItem>,
}

impl<S> OrgTasks<S>
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
        assignee: &UserProfile,
        new: NewOrgTask,
    ) -> BoardResult<OrgTask> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let mut task = OrgTask {
            id: String::new(),
            name: new.name,
            description: new.description,
            priority: new.priority,
            status: TaskStatus::Todo,
            assignee_uid: assignee.uid.clone(),
            assignee_name: assignee.full_name(),
            category: new.category,
            checklist: new.checklist,
            created_by: actor.uid.clone(),
            created_at: Utc::now(),
        };

        let doc = self
            .context
            .store
            .add(
                &OrgTask::collection(),
                serde_json::to_value(&task).expect("tasks serialize"),
            )
            .await?;

        task.id = doc.id().to_string();

        let name = task.name.clone();

        Notifications::new(&self.context)
            .dispatch(
                actor,
                std::slice::from_ref(&task.assignee_uid),
                NotificationKind::Task,
                Some(&task.id),
                "Task assigned",
                |label| format!("{label} assigned you: {name}"),
            )
            .await;

        Ok(task)
    }

    pub async fn delete(&self, actor: &UserProfile, task_id: &str) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        self.context
            .store
            .delete(&OrgTask::collection().doc(task_id))
            .await?;

        Ok(())
    }

    /// Moves a task between the todo/in-progress/done columns.
    pub async fn move_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        cell: &OptimisticCell<TaskStatus>,
    ) -> BoardResult<()> {
        let store = self.context.store.clone();
        let doc = OrgTask::collection().doc(task_id);

        self.context
            .optimistic(cell, status, "Task", async move {
                store
                    .update(
                        &doc,
                        Update::new()
                            .set("status", serde_json::to_value(status).expect("serializes")),
                    )
                    .await
            })
            .await
    }

    /// Flips one checklist item and writes the whole list back. The
    /// checklist is always overwritten as one array, never patched.
    pub async fn toggle_checklist_item(
        &self,
        task: &OrgTask,
        item_id: &str,
        cell: &OptimisticCell<Vec<ChecklistItem>>,
    ) -> BoardResult<()> {
        let checklist: Vec<ChecklistItem> = task
            .checklist
            .iter()
            .map(|item| {
                let mut item = item.clone();

                if item.id == item_id {
                    item.completed = !item.completed;
                }

                item
            })
            .collect();

        let store = self.context.store.clone();
        let doc = OrgTask::collection().doc(&task.id);
        let fields = serde_json::to_value(&checklist).expect("checklists serialize");

        self.context
            .optimistic(cell, checklist, "Checklist", async move {
                store
                    .update(&doc, Update::new().set("checklist", fields))
                    .await
            })
            .await
    }

    /// Every organization-wide task, newest first.
    pub fn watch(&self) -> LiveList<OrgTask> {
        let query = OrgTask::collection()
            .query()
            .order_by("createdAt", Direction::Descending);

        self.context.live_list(query, "tasks")
    }

    /// One user's assigned tasks, newest first.
    pub fn watch_for(&self, uid: &str) -> LiveList<OrgTask> {
        let query = OrgTask::collection()
            .query()
            .filter("assigneeUid", json!(uid))
            .order_by("createdAt", Direction::Descending);

        self.context.live_list(query, "tasks")
    }

    pub async fn fetch(&self, task_id: &str) -> BoardResult<OrgTask> {
        let doc = self
            .context
            .store
            .get(&OrgTask::collection().doc(task_id))
            .await?
            .ok_or(BoardError::Missing)?;

        Ok(doc.decode::<OrgTask>().map_err(|error| {
            log::warn!("{error}");
            BoardError::Missing
        })?)
    }
}

#[cfg(test)]
mod test {
    use quorum_impls::MemoryStore;

    use super::*;
    use crate::support::{admin, member, store_profile, test_context};
    use crate::Notification;

    fn new_task(checklist: Vec<ChecklistItem>) -> NewOrgTask {
        NewOrgTask {
            name: "Plan fundraiser".to_string(),
            description: String::new(),
            priority: Priority::Medium,
            category: "events".to_string(),
            checklist,
        }
    }

    fn item(id: &str, text: &str) -> ChecklistItem {
        ChecklistItem {
            id: id.to_string(),
            text: text.to_string(),
            completed: false,
        }
    }

    #[tokio::test]
    async fn the_assignee_name_is_a_snapshot() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let tasks = OrgTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let mut assignee = member("u1", "Sam", "Ortiz");
        store_profile(&store, &assignee).await;

        let task = tasks
            .create(&boss, &assignee, new_task(vec![]))
            .await
            .expect("task created");

        assert_eq!(task.assignee_name, "Sam Ortiz");

        // Renaming the profile afterwards does not reach back into the
        // task document.
        assignee.last_name = "Rivera".to_string();
        store_profile(&store, &assignee).await;

        let fetched = tasks.fetch(&task.id).await.expect("fetches");
        assert_eq!(fetched.assignee_name, "Sam Ortiz", "stale on purpose");
    }

    #[tokio::test]
    async fn creation_notifies_the_assignee() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let tasks = OrgTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let assignee = member("u1", "Sam", "Ortiz");

        let task = tasks
            .create(&boss, &assignee, new_task(vec![]))
            .await
            .expect("task created");

        let docs = store
            .fetch(&Notification::collection().query())
            .await
            .expect("fetch works");
        assert_eq!(docs.len(), 1);

        let notification: Notification = docs[0].decode().expect("decodes");
        assert_eq!(notification.recipient_uid, "u1");
        assert_eq!(notification.action_id.as_deref(), Some(task.id.as_str()));
    }

    #[tokio::test]
    async fn status_moves_are_optimistic() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let tasks = OrgTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let assignee = member("u1", "Sam", "Ortiz");

        let task = tasks
            .create(&boss, &assignee, new_task(vec![]))
            .await
            .expect("task created");

        let cell = OptimisticCell::new(TaskStatus::Todo);

        tasks
            .move_status(&task.id, TaskStatus::InProgress, &cell)
            .await
            .expect("moved");
        assert_eq!(cell.get(), TaskStatus::InProgress);

        let fetched = tasks.fetch(&task.id).await.expect("fetches");
        assert_eq!(fetched.status, TaskStatus::InProgress);

        // A failing move rolls the cell back to what it replaced.
        store.reject_next_write(&task.id, "simulated outage");

        tasks
            .move_status(&task.id, TaskStatus::Done, &cell)
            .await
            .expect_err("write fails");
        assert_eq!(cell.get(), TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn checklist_toggles_overwrite_the_whole_array() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let tasks = OrgTasks::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let assignee = member("u1", "Sam", "Ortiz");

        let task = tasks
            .create(
                &boss,
                &assignee,
                new_task(vec![item("c1", "Book venue"), item("c2", "Print flyers")]),
            )
            .await
            .expect("task created");

        let cell = OptimisticCell::new(task.checklist.clone());

        tasks
            .toggle_checklist_item(&task, "c1", &cell)
            .await
            .expect("toggled");

        let fetched = tasks.fetch(&task.id).await.expect("fetches");

        assert!(fetched.checklist[0].completed);
        assert!(!fetched.checklist[1].completed);
        assert_eq!(fetched.progress(), Some(50));
    }
}
