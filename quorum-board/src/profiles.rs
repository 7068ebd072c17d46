use log::warn;
use quorum_core::{DocumentStore, LiveList, Update};
use serde_json::json;

use crate::{BoardContext, BoardError, BoardResult, Role, UserProfile};

/// Profile reads and edits.
///
/// There is deliberately no delete here: removing an account is handled
/// out of band by an administrator, the client never hard-deletes a
/// profile document.
pub struct Profiles<S> {
    context: BoardContext<S>,
}

/// A self-service profile edit. `None` fields are left as they are.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub position: Option<String>,
    pub photo_url: Option<String>,
}

impl<S> Profiles<S>
where
    S: DocumentStore,
{
    pub fn new(context: &BoardContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn get(&self, uid: &str) -> BoardResult<Option<UserProfile>> {
        let doc = self
            .context
            .store
            .get(&UserProfile::collection().doc(uid))
            .await?;

        Ok(doc.and_then(|doc| match doc.decode::<UserProfile>() {
            Ok(profile) => Some(profile),
            Err(error) => {
                warn!("{error}");
                None
            }
        }))
    }

    pub async fn all(&self) -> BoardResult<Vec<UserProfile>> {
        let docs = self
            .context
            .store
            .fetch(&UserProfile::collection().query())
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match doc.decode::<UserProfile>() {
                Ok(profile) => Some(profile),
                Err(error) => {
                    warn!("skipping profile: {error}");
                    None
                }
            })
            .collect())
    }

    /// Edits the actor's own profile.
    pub async fn update_self(
        &self,
        actor: &UserProfile,
        changes: ProfileChanges,
    ) -> BoardResult<()> {
        let mut update = Update::new();

        if let Some(first_name) = changes.first_name {
            update = update.set("firstName", json!(first_name));
        }
        if let Some(last_name) = changes.last_name {
            update = update.set("lastName", json!(last_name));
        }
        if let Some(position) = changes.position {
            update = update.set("position", json!(position));
        }
        if let Some(photo_url) = changes.photo_url {
            update = update.set("photoUrl", json!(photo_url));
        }

        if update.is_empty() {
            return Ok(());
        }

        self.context
            .store
            .update(&UserProfile::collection().doc(&actor.uid), update)
            .await?;

        Ok(())
    }

    /// Changes another user's organization-wide role.
    pub async fn set_role(&self, actor: &UserProfile, uid: &str, role: Role) -> BoardResult<()> {
        if !actor.is_admin() {
            return Err(BoardError::AdminOnly);
        }

        self.context
            .store
            .update(
                &UserProfile::collection().doc(uid),
                Update::new().set("role", serde_json::to_value(role).expect("roles serialize")),
            )
            .await?;

        Ok(())
    }

    pub fn watch(&self) -> LiveList<UserProfile> {
        self.context
            .live_list(UserProfile::collection().query(), "profiles")
    }
}

#[cfg(test)]
mod test {
    use quorum_impls::MemoryStore;

    use super::*;
    use crate::support::{admin, member, store_profile, test_context};

    #[tokio::test]
    async fn self_edits_only_touch_given_fields() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let profiles = Profiles::new(&context);

        let me = member("u1", "Sam", "Ortiz");
        store_profile(&store, &me).await;

        profiles
            .update_self(
                &me,
                ProfileChanges {
                    position: Some("Treasurer".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("updated");

        let fetched = profiles.get("u1").await.expect("fetches").expect("exists");

        assert_eq!(fetched.position, "Treasurer");
        assert_eq!(fetched.first_name, "Sam", "untouched");
    }

    #[tokio::test]
    async fn role_changes_are_admin_only() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let profiles = Profiles::new(&context);

        let boss = admin("a1", "Dana", "Reyes");
        let target = member("u1", "Sam", "Ortiz");
        store_profile(&store, &target).await;

        let denied = profiles
            .set_role(&target, "a1", Role::Member)
            .await
            .expect_err("members can't change roles");
        assert!(matches!(denied, BoardError::AdminOnly));

        profiles
            .set_role(&boss, "u1", Role::Admin)
            .await
            .expect("promoted");

        let fetched = profiles.get("u1").await.expect("fetches").expect("exists");
        assert_eq!(fetched.role, Role::Admin);
    }

    #[tokio::test]
    async fn listing_skips_malformed_documents() {
        let store = MemoryStore::new();
        let (context, _events) = test_context(store.clone());
        let profiles = Profiles::new(&context);

        store_profile(&store, &member("u1", "Sam", "Ortiz")).await;

        store
            .set(
                &UserProfile::collection().doc("broken"),
                serde_json::json!({ "uid": 42 }),
            )
            .await
            .expect("written");

        let all = profiles.all().await.expect("fetches");

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].uid, "u1");
    }
}
