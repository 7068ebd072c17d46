use chrono::Utc;
use lazy_static::lazy_static;
use log::warn;
use quorum_core::{Direction, DocumentStore, LiveList, Query, Update};
use rand::{thread_rng, Rng};
use regex::Regex;
use serde_json::json;

use crate::{
    BoardContext, BoardError, BoardResult, Room, RoomMember, UserProfile, MEMBERS_GROUP,
};

const CODE_LENGTH: usize = 6;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many times a colliding join code is regenerated before the last
/// one is used anyway. Uniqueness is best-effort only.
const CODE_ATTEMPTS: usize = 5;

lazy_static! {
    static ref CODE_SHAPE: Regex =
        Regex::new("^[A-Z0-9]{6}$").expect("code pattern compiles");
}

/// Room management and membership.
pub struct Rooms<S> {
    context: BoardContext<S>,
}

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub description: String,
}

impl<S> Rooms<S>
where
    S: DocumentStore,
{
    pub fn new(context: &BoardContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Creates a room with a fresh join code and the creator as its
    /// first member.
    pub async fn create(&self, actor: &UserProfile, new: NewRoom) -> BoardResult<Room> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let mut room = Room {
            id: String::new(),
            name: new.name,
            description: new.description,
            room_code: self.fresh_code().await,
            created_by: actor.uid.clone(),
            created_at: Utc::now(),
        };

        let doc = self
            .context
            .store
            .add(
                &Room::collection(),
                serde_json::to_value(&room).expect("rooms serialize"),
            )
            .await?;

        room.id = doc.id().to_string();

        self.insert_member(&room.id, actor).await?;

        Ok(room)
    }

    pub async fn rename(
        &self,
        actor: &UserProfile,
        room_id: &str,
        name: &str,
        description: &str,
    ) -> BoardResult<()> {
        self.require_creator(actor, room_id).await?;

        self.context
            .store
            .update(
                &Room::collection().doc(room_id),
                Update::new()
                    .set("name", json!(name))
                    .set("description", json!(description)),
            )
            .await?;

        Ok(())
    }

    /// Deletes the room document. Its members, tasks and attendance
    /// subcollections are left behind as orphans: nothing in the client
    /// cleans them up.
    pub async fn delete(&self, actor: &UserProfile, room_id: &str) -> BoardResult<()> {
        self.require_creator(actor, room_id).await?;

        self.context
            .store
            .delete(&Room::collection().doc(room_id))
            .await?;

        warn!(
            "room {room_id} deleted, its members/tasks/attendance subcollections are orphaned"
        );

        Ok(())
    }

    /// Looks a room up by its join code. The code is normalized here, at
    /// the query boundary, so a lowercased entry still finds the room.
    pub async fn find_by_code(&self, code: &str) -> BoardResult<Room> {
        let code = normalize_code(code);

        if !CODE_SHAPE.is_match(&code) {
            return Err(BoardError::UnknownRoomCode);
        }

        let query = Room::collection()
            .query()
            .filter("roomCode", json!(code))
            .limit(1);

        let doc = self
            .context
            .store
            .fetch(&query)
            .await?
            .into_iter()
            .next()
            .ok_or(BoardError::UnknownRoomCode)?;

        Ok(doc.decode::<Room>().map_err(|error| {
            warn!("{error}");
            BoardError::UnknownRoomCode
        })?)
    }

    /// Redeems a join code. The membership check and the write are two
    /// separate operations, so two racing joins can both pass the check;
    /// they write the same document, which makes the race harmless.
    pub async fn join_by_code(&self, actor: &UserProfile, code: &str) -> BoardResult<Room> {
        let room = self.find_by_code(code).await?;

        let existing = self
            .context
            .store
            .get(&Room::members_of(&room.id).doc(&actor.uid))
            .await?;

        if existing.is_some() {
            return Err(BoardError::AlreadyJoined);
        }

        self.insert_member(&room.id, actor).await?;

        Ok(room)
    }

    /// Adds a member directly, without a code.
    pub async fn add_member(
        &self,
        actor: &UserProfile,
        room_id: &str,
        joining: &UserProfile,
    ) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        let existing = self
            .context
            .store
            .get(&Room::members_of(room_id).doc(&joining.uid))
            .await?;

        if existing.is_some() {
            return Err(BoardError::AlreadyJoined);
        }

        self.insert_member(room_id, joining).await
    }

    /// Removes a member. Admins cannot remove their own membership, so a
    /// room can't lose its management by accident; the guard runs before
    /// any write is issued.
    pub async fn remove_member(
        &self,
        actor: &UserProfile,
        room_id: &str,
        uid: &str,
    ) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        if uid == actor.uid {
            return Err(BoardError::SelfRemoval);
        }

        self.context
            .store
            .delete(&Room::members_of(room_id).doc(uid))
            .await?;

        Ok(())
    }

    /// The live member list of one room.
    pub fn members(&self, room_id: &str) -> LiveList<RoomMember> {
        self.context
            .live_list(Room::members_of(room_id).query(), "members")
    }

    /// Every room the uid is a member of, resolved through the
    /// cross-room membership group query.
    pub async fn rooms_of(&self, uid: &str) -> BoardResult<Vec<Room>> {
        let memberships = self
            .context
            .store
            .fetch(&Query::group(MEMBERS_GROUP).filter("uid", json!(uid)))
            .await?;

        let mut rooms = vec![];

        for doc in memberships {
            let member = match doc.decode::<RoomMember>() {
                Ok(member) => member,
                Err(error) => {
                    warn!("skipping membership: {error}");
                    continue;
                }
            };

            match self
                .context
                .store
                .get(&Room::collection().doc(&member.room_id))
                .await?
            {
                Some(doc) => match doc.decode::<Room>() {
                    Ok(room) => rooms.push(room),
                    Err(error) => warn!("skipping room: {error}"),
                },
                // A membership orphaned by a room deletion.
                None => warn!("membership {} points at a deleted room", doc.path()),
            }
        }

        Ok(rooms)
    }

    /// Every room, newest first.
    pub fn watch_all(&self) -> LiveList<Room> {
        let query = Room::collection()
            .query()
            .order_by("createdAt", Direction::Descending);

        self.context.live_list(query, "rooms")
    }

    async fn require_creator(&self, actor: &UserProfile, room_id: &str) -> BoardResult<Room> {
        let doc = self
            .context
            .store
            .get(&Room::collection().doc(room_id))
            .await?
            .ok_or(BoardError::Missing)?;

        let room = doc.decode::<Room>().map_err(|error| {
            warn!("{error}");
            BoardError::Missing
        })?;

        if room.created_by != actor.uid {
            return Err(BoardError::CreatorOnly);
        }

        Ok(room)
    }

    async fn insert_member(&self, room_id: &str, profile: &UserProfile) -> BoardResult<()> {
        let member = RoomMember {
            id: profile.uid.clone(),
            uid: profile.uid.clone(),
            room_id: room_id.to_string(),
            name: profile.full_name(),
            email: profile.email.clone(),
            photo_url: profile.photo_url.clone(),
            role: profile.role,
        };

        self.context
            .store
            .set(
                &Room::members_of(room_id).doc(&profile.uid),
                serde_json::to_value(&member).expect("members serialize"),
            )
            .await?;

        Ok(())
    }

    /// Generates a code and regenerates on collision a few times. After
    /// that the last candidate is used as-is.
    async fn fresh_code(&self) -> String {
        for _ in 0..CODE_ATTEMPTS {
            let code = random_code();

            let query = Room::collection()
                .query()
                .filter("roomCode", json!(code))
                .limit(1);

            match self.context.store.fetch(&query).await {
                Ok(existing) if existing.is_empty() => return code,
                Ok(_) => continue,
                Err(error) => {
                    warn!("join code uniqueness check failed: {error}");
                    return code;
                }
            }
        }

        random_code()
    }
}

/// Uppercases and trims a user-entered join code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn random_code() -> String {
    let mut rng = thread_rng();

    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
