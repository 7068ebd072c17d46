mod announcements;
mod attendance;
mod auth;
mod calendar;
mod data;
mod error;
mod events;
mod notifications;
mod profiles;
mod rooms;
mod tasks;

pub mod logging;

#[cfg(test)]
pub(crate) mod support;

use std::future::Future;
use std::sync::Arc;

pub use announcements::*;
pub use attendance::*;
pub use auth::*;
pub use calendar::*;
pub use data::*;
pub use error::*;
pub use events::*;
pub use notifications::*;
pub use profiles::*;
pub use rooms::*;
pub use tasks::*;

use quorum_core::{
    DocumentStore, IdentityProvider, LiveList, MediaUpload, MutationTicket, OptimisticCell, Query,
    ResortFn, StoreResult,
};
use serde::de::DeserializeOwned;

/// The quorum board system: rooms, tasks, attendance, announcements and
/// notifications over an external document store and identity provider.
pub struct Board<S, P> {
    provider: Arc<P>,
    context: BoardContext<S>,
    receiver: EventReceiver,

    pub auth: Arc<AuthContext<S>>,
    pub profiles: Profiles<S>,
    pub rooms: Rooms<S>,
    pub room_tasks: RoomTasks<S>,
    pub org_tasks: OrgTasks<S>,
    pub attendance: Attendance<S>,
    pub announcements: Announcements<S>,
    pub notifications: Notifications<S>,
    pub calendar: Calendar<S>,
}

/// A type passed to every board service, to access the store, emit
/// events, and read the session.
pub struct BoardContext<S> {
    pub store: Arc<S>,
    pub uploads: Arc<dyn MediaUpload>,
    pub events: EventSender,
    pub auth: Arc<AuthContext<S>>,
}

impl<S, P> Board<S, P>
where
    S: DocumentStore,
    P: IdentityProvider,
{
    pub fn new(store: S, provider: P, uploads: impl MediaUpload) -> Self {
        let store = Arc::new(store);
        let provider = Arc::new(provider);

        let (events, receiver) = event_channel();
        let auth = AuthContext::spawn(store.clone(), provider.clone(), events.clone());

        let context = BoardContext {
            store,
            uploads: Arc::new(uploads),
            events,
            auth: auth.clone(),
        };

        Self {
            provider,
            auth,
            profiles: Profiles::new(&context),
            rooms: Rooms::new(&context),
            room_tasks: RoomTasks::new(&context),
            org_tasks: OrgTasks::new(&context),
            attendance: Attendance::new(&context),
            announcements: Announcements::new(&context),
            notifications: Notifications::new(&context),
            calendar: Calendar::new(&context),
            context,
            receiver,
        }
    }

    /// The events emitted by the board, consumed by the embedding shell.
    pub fn events(&self) -> EventReceiver {
        self.receiver.clone()
    }

    pub fn context(&self) -> &BoardContext<S> {
        &self.context
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }
}

impl<S: DocumentStore> BoardContext<S> {
    /// Emits a user-facing alert.
    pub fn alert(&self, title: impl Into<String>, message: impl Into<String>) {
        self.events
            .send(BoardEvent::Alert {
                title: title.into(),
                message: message.into(),
            })
            .ok();
    }

    /// Binds a live list whose failure surfaces as a single alert, per
    /// the screen-subscription contract.
    pub fn live_list<T>(&self, query: Query, what: &str) -> LiveList<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.live_list_sorted(query, what, None)
    }

    /// Same as [BoardContext::live_list], with a stable client-side
    /// resort applied over every delivered snapshot.
    pub fn live_list_sorted<T>(
        &self,
        query: Query,
        what: &str,
        resort: Option<ResortFn<T>>,
    ) -> LiveList<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let events = self.events.clone();
        let title = format!("Couldn't load {what}");

        LiveList::bind_with(
            self.store.as_ref(),
            query,
            |doc| doc.decode::<T>(),
            resort,
            Some(Box::new(move |error: &quorum_core::StoreError| {
                events
                    .send(BoardEvent::Alert {
                        title,
                        message: error.to_string(),
                    })
                    .ok();
            })),
        )
    }

    /// Runs one optimistic mutation: the cell flips immediately, the
    /// write settles later, and a failure rolls the cell back (unless a
    /// newer mutation owns it by then) and raises one alert.
    pub async fn optimistic<T, Fut>(
        &self,
        cell: &OptimisticCell<T>,
        value: T,
        what: &str,
        write: Fut,
    ) -> BoardResult<()>
    where
        T: Clone,
        Fut: Future<Output = StoreResult<()>>,
    {
        let ticket = cell.begin(value);

        self.settle(cell, ticket, what, write).await
    }

    /// The second half of [BoardContext::optimistic], for callers that
    /// need to begin the mutation themselves.
    pub async fn settle<T, Fut>(
        &self,
        cell: &OptimisticCell<T>,
        ticket: MutationTicket<T>,
        what: &str,
        write: Fut,
    ) -> BoardResult<()>
    where
        T: Clone,
        Fut: Future<Output = StoreResult<()>>,
    {
        match write.await {
            Ok(()) => Ok(()),
            Err(error) => {
                cell.rollback(ticket);

                let failure = BoardError::Mutation(error);
                self.alert(what, failure.to_string());

                Err(failure)
            }
        }
    }
}

impl<S> Clone for BoardContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            uploads: self.uploads.clone(),
            events: self.events.clone(),
            auth: self.auth.clone(),
        }
    }
}
