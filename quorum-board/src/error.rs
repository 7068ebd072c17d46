use quorum_core::{IdentityError, StoreError, UploadError};
use thiserror::Error;

pub type BoardResult<T> = Result<T, BoardError>;

/// Failures surfaced to callers of the board services.
///
/// Messages are worded for end users, since the embedding shell shows
/// them in alert dialogs as-is. Side-channel failures (notification
/// dispatch) have no variant here on purpose: they are logged and
/// swallowed, never returned.
#[derive(Debug, Error)]
pub enum BoardError {
    /// An authenticated account in an invalid state, e.g. one without a
    /// profile record.
    #[error("{0}")]
    Session(String),

    /// A single write failed after local state was already flipped. The
    /// rollback has been applied by the time this is returned.
    #[error("Couldn't save your change. Please try again.")]
    Mutation(#[source] StoreError),

    /// Part of a fan-out went through and part did not. Callers refetch
    /// authoritative state instead of undoing committed writes.
    #[error("Only {committed} of {total} updates went through. Pull to refresh.")]
    PartialBatch { committed: usize, total: usize },

    #[error("You have already joined this room.")]
    AlreadyJoined,

    #[error("No room matches that code.")]
    UnknownRoomCode,

    #[error("Only admins can do that.")]
    AdminOnly,

    #[error("Only the room's creator can do that.")]
    CreatorOnly,

    #[error("Admins can't remove themselves from a room.")]
    SelfRemoval,

    #[error("You can only change your own attendance.")]
    NotYourRecord,

    #[error("That no longer exists. It may have been deleted.")]
    Missing,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}
