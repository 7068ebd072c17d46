use chrono::Utc;
use log::warn;
use quorum_core::{Direction, DocumentStore, LiveList, OptimisticCell, Update};
use serde_json::json;

use crate::{
    Announcement, AnnouncementTag, BoardContext, BoardError, BoardResult, NotificationKind,
    Notifications, UserProfile,
};

/// Publishing and reading announcements.
pub struct Announcements<S> {
    context: BoardContext<S>,
}

#[derive(Debug, Clone)]
pub struct NewAnnouncement {
    pub title: String,
    pub body: String,
    pub tag: AnnouncementTag,
}

impl<S> Announcements<S>
where
    S: DocumentStore,
{
    pub fn new(context: &BoardContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Publishes an announcement, then notifies every profile except the
    /// author. The notifications are best-effort; the announcement stays
    /// published even if none of them land.
    pub async fn publish(
        &self,
        actor: &UserProfile,
        new: NewAnnouncement,
    ) -> BoardResult<Announcement> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let mut announcement = Announcement {
            id: String::new(),
            title: new.title,
            body: new.body,
            tag: new.tag,
            author_uid: actor.uid.clone(),
            author_name: actor.full_name(),
            author_initials: actor.initials(),
            author_role: actor.role,
            pinned: false,
            views: 0,
            read_by: vec![],
            created_at: Utc::now(),
        };

        let doc = self
            .context
            .store
            .add(
                &Announcement::collection(),
                serde_json::to_value(&announcement).expect("announcements serialize"),
            )
            .await?;

        announcement.id = doc.id().to_string();

        let recipients = self.recipients_besides(&actor.uid).await;
        let title = announcement.title.clone();

        Notifications::new(&self.context)
            .dispatch(
                actor,
                &recipients,
                NotificationKind::Announcement,
                Some(&announcement.id),
                "New announcement",
                |label| format!("{label} posted: {title}"),
            )
            .await;

        Ok(announcement)
    }

    /// Pins or unpins, optimistically.
    pub async fn toggle_pin(
        &self,
        announcement_id: &str,
        pinned: bool,
        cell: &OptimisticCell<bool>,
    ) -> BoardResult<()> {
        let store = self.context.store.clone();
        let doc = Announcement::collection().doc(announcement_id);

        self.context
            .optimistic(cell, pinned, "Announcement", async move {
                store
                    .update(&doc, Update::new().set("pinned", json!(pinned)))
                    .await
            })
            .await
    }

    /// Every announcement, newest first, with pinned ones lifted to the
    /// top. The lift is a stable re-sort: within the pinned and unpinned
    /// partitions the delivered order is kept.
    pub fn watch(&self) -> LiveList<Announcement> {
        let query = Announcement::collection()
            .query()
            .order_by("createdAt", Direction::Descending);

        self.context.live_list_sorted(
            query,
            "announcements",
            Some(Box::new(|items: &mut Vec<Announcement>| {
                items.sort_by_key(|announcement| !announcement.pinned)
            })),
        )
    }

    /// Counts a detail-view open. The author's own opens and repeat
    /// opens count for nothing; a first open by anyone else appends them
    /// to `readBy` and bumps `views`, in one write. Returns whether the
    /// view was counted.
    pub async fn record_view(&self, actor: &UserProfile, announcement_id: &str) -> BoardResult<bool> {
        // A fresh read, not a cached list entry, so the exactly-once
        // check runs against the latest readBy.
        let doc = self
            .context
            .store
            .get(&Announcement::collection().doc(announcement_id))
            .await?
            .ok_or(BoardError::Missing)?;

        let announcement = doc.decode::<Announcement>().map_err(|error| {
            warn!("{error}");
            BoardError::Missing
        })?;

        if announcement.author_uid == actor.uid || announcement.has_read(&actor.uid) {
            return Ok(false);
        }

        self.context
            .store
            .update(
                &Announcement::collection().doc(announcement_id),
                Update::new()
                    .array_union("readBy", vec![json!(actor.uid)])
                    .increment("views", 1),
            )
            .await?;

        Ok(true)
    }

    pub async fn fetch(&self, announcement_id: &str) -> BoardResult<Announcement> {
        let doc = self
            .context
            .store
            .get(&Announcement::collection().doc(announcement_id))
            .await?
            .ok_or(BoardError::Missing)?;

        Ok(doc.decode::<Announcement>().map_err(|error| {
            warn!("{error}");
            BoardError::Missing
        })?)
    }

    /// Every profile's uid except the given one.
    async fn recipients_besides(&self, author_uid: &str) -> Vec<String> {
        let docs = match self
            .context
            .store
            .fetch(&UserProfile::collection().query())
            .await
        {
            Ok(docs) => docs,
            Err(error) => {
                // Recipients are part of the best-effort side channel:
                // an unreadable profile list means nobody gets notified.
                warn!("could not list notification recipients: {error}");
                return vec![];
            }
        };

        docs.iter()
            .filter_map(|doc| doc.decode::<UserProfile>().ok())
            .filter(|profile| profile.uid != author_uid)
            .map(|profile| profile.uid)
            .collect()
    }
}
