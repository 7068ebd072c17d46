use chrono::Utc;
use log::warn;
use quorum_core::{Direction, DocumentStore, LiveList, Update};
use serde_json::json;

use crate::{
    BoardContext, BoardError, BoardResult, CalendarEvent, NotificationKind, Notifications, Room,
    RoomMember, UserProfile,
};

/// Room-scoped calendar events.
pub struct Calendar<S> {
    context: BoardContext<S>,
}

#[derive(Debug, Clone)]
pub struct NewCalendarEvent {
    pub title: String,
    pub description: String,
    /// Calendar day as `YYYY-MM-DD`.
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub color: String,
}

impl<S> Calendar<S>
where
    S: DocumentStore,
{
    pub fn new(context: &BoardContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates an event, then notifies the room's members besides the
    /// creator. The notifications are best-effort; the event stands even
    /// if none of them land.
    pub async fn create(
        &self,
        actor: &UserProfile,
        room_id: &str,
        new: NewCalendarEvent,
    ) -> BoardResult<CalendarEvent> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let mut event = CalendarEvent {
            id: String::new(),
            title: new.title,
            description: new.description,
            date: new.date,
            start_time: new.start_time,
            end_time: new.end_time,
            color: new.color,
            room_id: room_id.to_string(),
            created_by: actor.uid.clone(),
            created_at: Utc::now(),
        };

        let doc = self
            .context
            .store
            .add(
                &CalendarEvent::collection(),
                serde_json::to_value(&event).expect("events serialize"),
            )
            .await?;

        event.id = doc.id().to_string();

        self.notify_members(actor, &event).await;

        Ok(event)
    }

    pub async fn reschedule(
        &self,
        actor: &UserProfile,
        event_id: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
    ) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        self.context
            .store
            .update(
                &CalendarEvent::collection().doc(event_id),
                Update::new()
                    .set("date", json!(date))
                    .set("startTime", json!(start_time))
                    .set("endTime", json!(end_time)),
            )
            .await?;

        Ok(())
    }

    pub async fn delete(&self, actor: &UserProfile, event_id: &str) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        self.context
            .store
            .delete(&CalendarEvent::collection().doc(event_id))
            .await?;

        Ok(())
    }

    /// One room's events in day order.
    pub fn watch(&self, room_id: &str) -> LiveList<CalendarEvent> {
        let query = CalendarEvent::collection()
            .query()
            .filter("roomId", json!(room_id))
            .order_by("date", Direction::Ascending);

        self.context.live_list(query, "events")
    }

    /// One room's events on one day.
    pub async fn events_on(&self, room_id: &str, date: &str) -> BoardResult<Vec<CalendarEvent>> {
        let query = CalendarEvent::collection()
            .query()
            .filter("roomId", json!(room_id))
            .filter("date", json!(date));

        let docs = self.context.store.fetch(&query).await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<CalendarEvent>() {
                Ok(event) => Some(event),
                Err(error) => {
                    warn!("skipping event: {error}");
                    None
                }
            })
            .collect())
    }

    /// Notifies every member of the event's room except its creator.
    async fn notify_members(&self, actor: &UserProfile, event: &CalendarEvent) {
        let docs = match self
            .context
            .store
            .fetch(&Room::members_of(&event.room_id).query())
            .await
        {
            Ok(docs) => docs,
            Err(error) => {
                // Recipients are part of the best-effort side channel:
                // an unreadable member list means nobody gets notified.
                warn!("could not list event notification recipients: {error}");
                return;
            }
        };

        let recipients: Vec<String> = docs
            .iter()
            .filter_map(|doc| doc.decode::<RoomMember>().ok())
            .filter(|member| member.uid != actor.uid)
            .map(|member| member.uid)
            .collect();

        if recipients.is_empty() {
            return;
        }

        let title = event.title.clone();
        let date = event.date.clone();

        Notifications::new(&self.context)
            .dispatch(
                actor,
                &recipients,
                NotificationKind::Event,
                Some(&event.id),
                "New event",
                |label| format!("{label} scheduled: {title} on {date}"),
            )
            .await;
    }
}
