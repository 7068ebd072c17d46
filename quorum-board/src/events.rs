use crossbeam::channel::{unbounded, Receiver, Sender};

pub type EventSender = Sender<BoardEvent>;
pub type EventReceiver = Receiver<BoardEvent>;

/// Events emitted by the board for the embedding shell to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum BoardEvent {
    /// Something the user must be told about, shown as a native alert.
    /// Every user-visible failure produces exactly one of these.
    Alert { title: String, message: String },
    /// The signed-in user changed, including to nobody.
    SessionChanged { uid: Option<String> },
    /// A notification fan-out finished, with how many writes landed.
    NotificationsDispatched { count: usize },
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    unbounded()
}
