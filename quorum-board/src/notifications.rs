use chrono::Utc;
use log::warn;
use quorum_core::{Direction, DocumentStore, LiveList, Update};
use serde_json::json;

use crate::{
    BoardContext, BoardEvent, BoardResult, Notification, NotificationKind, UserProfile,
};

/// The cross-user notification side channel.
///
/// Dispatch is strictly best-effort: it runs after the primary write has
/// already succeeded, and a failed notification write is logged and
/// forgotten. It never rolls the primary action back, never blocks it,
/// and never retries.
pub struct Notifications<S> {
    context: BoardContext<S>,
}

impl<S> Notifications<S>
where
    S: DocumentStore,
{
    pub fn new(context: &BoardContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Writes one notification per recipient. The message builder
    /// receives the acting user's label, which becomes "You" when the
    /// recipient is the acting user themselves.
    pub async fn dispatch(
        &self,
        acting: &UserProfile,
        recipients: &[String],
        kind: NotificationKind,
        action_id: Option<&str>,
        title: &str,
        message: impl Fn(&str) -> String,
    ) -> usize {
        let mut count = 0;

        for uid in recipients {
            let label = if *uid == acting.uid {
                "You".to_string()
            } else {
                acting.full_name()
            };

            let notification = Notification {
                id: String::new(),
                recipient_uid: uid.clone(),
                title: title.to_string(),
                message: message(&label),
                kind,
                action_id: action_id.map(str::to_string),
                read: false,
                created_at: Utc::now(),
            };

            let fields =
                serde_json::to_value(&notification).expect("notifications serialize");

            match self
                .context
                .store
                .add(&Notification::collection(), fields)
                .await
            {
                Ok(_) => count += 1,
                Err(error) => warn!("notification to {uid} was not delivered: {error}"),
            }
        }

        self.context
            .events
            .send(BoardEvent::NotificationsDispatched { count })
            .ok();

        count
    }

    /// One user's notifications, newest first.
    pub fn watch_for(&self, uid: &str) -> LiveList<Notification> {
        let query = Notification::collection()
            .query()
            .filter("recipientUid", json!(uid))
            .order_by("createdAt", Direction::Descending);

        self.context.live_list(query, "notifications")
    }

    pub async fn mark_read(&self, notification_id: &str) -> BoardResult<()> {
        self.context
            .store
            .update(
                &Notification::collection().doc(notification_id),
                Update::new().set("read", json!(true)),
            )
            .await?;

        Ok(())
    }

    pub async fn unread_count(&self, uid: &str) -> BoardResult<usize> {
        let query = Notification::collection()
            .query()
            .filter("recipientUid", json!(uid))
            .filter("read", json!(false));

        Ok(self.context.store.fetch(&query).await?.len())
    }
}

/// Where tapping a notification should navigate, as a string path keyed
/// by the entity id. Unknown kinds are a logged no-op.
pub fn deep_link(notification: &Notification) -> Option<String> {
    let action_id = notification.action_id.as_deref()?;

    match notification.kind {
        NotificationKind::Announcement => Some(format!("/announcements/{action_id}")),
        NotificationKind::Task => Some(format!("/tasks/{action_id}")),
        NotificationKind::Event => Some(format!("/calendar/{action_id}")),
        NotificationKind::Unknown => {
            warn!(
                "notification {} has an unrecognized type, not navigating",
                notification.id
            );

            None
        }
    }
}

#[cfg(test)]
mod test {
    use quorum_impls::MemoryStore;

    use super::*;
    use crate::support::{admin as profile, test_context as context};

    fn notification(kind: NotificationKind, action_id: Option<&str>) -> Notification {
        Notification {
            id: "n1".to_string(),
            recipient_uid: "u1".to_string(),
            title: "title".to_string(),
            message: "message".to_string(),
            kind,
            action_id: action_id.map(str::to_string),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dispatch_substitutes_you_for_the_acting_user() {
        let store = MemoryStore::new();
        let (context, _events) = context(store.clone());

        let acting = profile("u1", "Dana", "Reyes");
        let recipients = vec!["u1".to_string(), "u2".to_string()];

        let count = Notifications::new(&context)
            .dispatch(
                &acting,
                &recipients,
                NotificationKind::Task,
                Some("t1"),
                "Task assigned",
                |label| format!("{label} assigned a task"),
            )
            .await;

        assert_eq!(count, 2);

        let docs = store
            .fetch(&Notification::collection().query())
            .await
            .expect("fetch works");

        let messages: Vec<(String, String)> = docs
            .iter()
            .map(|doc| {
                let n: Notification = doc.decode().expect("decodes");
                (n.recipient_uid, n.message)
            })
            .collect();

        assert!(messages.contains(&("u1".to_string(), "You assigned a task".to_string())));
        assert!(messages.contains(&(
            "u2".to_string(),
            "Dana Reyes assigned a task".to_string()
        )));
    }

    #[tokio::test]
    async fn failed_dispatches_are_swallowed() {
        let store = MemoryStore::new();
        let (context, events) = context(store.clone());

        store.reject_next_write(Notification::COLLECTION, "quota exceeded");

        let acting = profile("u1", "Dana", "Reyes");
        let recipients = vec!["u2".to_string(), "u3".to_string()];

        let count = Notifications::new(&context)
            .dispatch(
                &acting,
                &recipients,
                NotificationKind::Announcement,
                Some("a1"),
                "New announcement",
                |label| format!("{label} posted"),
            )
            .await;

        assert_eq!(count, 1, "the failed write is skipped, the rest land");
        assert_eq!(store.count(Notification::COLLECTION), 1);

        let alerts = events
            .try_iter()
            .filter(|event| matches!(event, BoardEvent::Alert { .. }))
            .count();
        assert_eq!(alerts, 0, "side-channel failures never alert");
    }

    #[tokio::test]
    async fn read_flags_and_unread_counts() {
        let store = MemoryStore::new();
        let (context, _events) = context(store.clone());
        let notifications = Notifications::new(&context);

        let acting = profile("u1", "Dana", "Reyes");

        notifications
            .dispatch(
                &acting,
                &["u2".to_string()],
                NotificationKind::Event,
                Some("e1"),
                "New event",
                |label| format!("{label} scheduled an event"),
            )
            .await;

        assert_eq!(notifications.unread_count("u2").await.expect("counts"), 1);

        let docs = store
            .fetch(&Notification::collection().query())
            .await
            .expect("fetch works");

        notifications
            .mark_read(docs[0].id())
            .await
            .expect("marks read");

        assert_eq!(notifications.unread_count("u2").await.expect("counts"), 0);
    }

    #[test]
    fn deep_links_resolve_by_kind() {
        assert_eq!(
            deep_link(&notification(NotificationKind::Announcement, Some("a1"))),
            Some("/announcements/a1".to_string())
        );
        assert_eq!(
            deep_link(&notification(NotificationKind::Task, Some("t1"))),
            Some("/tasks/t1".to_string())
        );
        assert_eq!(
            deep_link(&notification(NotificationKind::Event, Some("e1"))),
            Some("/calendar/e1".to_string())
        );
    }

    #[test]
    fn unknown_kinds_and_missing_action_ids_go_nowhere() {
        assert_eq!(
            deep_link(&notification(NotificationKind::Unknown, Some("x1"))),
            None
        );
        assert_eq!(
            deep_link(&notification(NotificationKind::Announcement, None)),
            None
        );
    }
}
