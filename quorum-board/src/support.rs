//! Shared fixtures for the service tests.

use std::sync::Arc;

use quorum_impls::{FixedUpload, MemoryIdentity, MemoryStore};

use crate::{event_channel, AuthContext, BoardContext, EventReceiver, Role, UserProfile};

/// A context over a fresh in-memory stack. The store is returned
/// separately so tests can inject faults and inspect documents.
pub fn test_context(store: MemoryStore) -> (BoardContext<MemoryStore>, EventReceiver) {
    let (events, receiver) = event_channel();
    let store = Arc::new(store);

    let auth = AuthContext::spawn(
        store.clone(),
        Arc::new(MemoryIdentity::new()),
        events.clone(),
    );

    let context = BoardContext {
        store,
        uploads: Arc::new(FixedUpload::default()),
        events,
        auth,
    };

    (context, receiver)
}

pub fn admin(uid: &str, first: &str, last: &str) -> UserProfile {
    profile(uid, first, last, Role::Admin)
}

pub fn member(uid: &str, first: &str, last: &str) -> UserProfile {
    profile(uid, first, last, Role::Member)
}

fn profile(uid: &str, first: &str, last: &str, role: Role) -> UserProfile {
    UserProfile {
        id: uid.to_string(),
        uid: uid.to_string(),
        email: format!("{}@example.org", first.to_lowercase()),
        first_name: first.to_string(),
        last_name: last.to_string(),
        role,
        position: String::new(),
        photo_url: None,
    }
}

/// Writes a profile document so store-side recipient lookups can see it.
pub async fn store_profile(store: &MemoryStore, profile: &UserProfile) {
    use quorum_core::DocumentStore;

    store
        .set(
            &UserProfile::collection().doc(&profile.uid),
            serde_json::to_value(profile).expect("profiles serialize"),
        )
        .await
        .expect("profile stored");
}
