use std::sync::Arc;

use log::warn;
use quorum_core::{DocumentStore, IdentityProvider, Principal};
use tokio::sync::watch;

use crate::{BoardError, BoardEvent, BoardResult, EventSender, Role, UserProfile};

/// Where the session currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthPhase {
    /// The first session resolution hasn't finished yet. Role-based
    /// routing waits here so the wrong role's screens never flash.
    Pending,
    SignedIn(UserProfile),
    SignedOut,
}

/// Everything needed to open an account and its profile together.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub position: String,
}

/// The session-wide view of who is signed in.
///
/// A single pump task consumes the identity provider's session stream and
/// is the only writer of the phase. On every new principal the matching
/// profile document is fetched; an authenticated account without one is
/// an invalid state and gets signed back out, not treated as a new user.
/// A profile fetch failure is logged and counts as no user, there is no
/// retry.
pub struct AuthContext<S> {
    store: Arc<S>,
    provider: Arc<dyn IdentityProvider>,
    phase: Arc<watch::Sender<AuthPhase>>,
    ready: Arc<watch::Sender<bool>>,
}

impl<S: DocumentStore> AuthContext<S> {
    /// Creates the context and starts its pump task.
    pub fn spawn(
        store: Arc<S>,
        provider: Arc<dyn IdentityProvider>,
        events: EventSender,
    ) -> Arc<Self> {
        let (phase, _) = watch::channel(AuthPhase::Pending);
        let (ready, _) = watch::channel(false);

        let context = Arc::new(Self {
            store,
            provider,
            phase: Arc::new(phase),
            ready: Arc::new(ready),
        });

        let pump = context.clone();

        tokio::spawn(async move {
            let mut changes = pump.provider.subscribe();

            while let Some(principal) = changes.next().await {
                pump.resolve(principal, &events).await;
            }
        });

        context
    }

    /// Turns a session-provider state into a phase, fetching the profile
    /// when someone is signed in.
    async fn resolve(&self, principal: Option<Principal>, events: &EventSender) {
        let phase = match principal {
            None => AuthPhase::SignedOut,
            Some(principal) => match self.fetch_profile(&principal.uid).await {
                Ok(Some(profile)) => AuthPhase::SignedIn(profile),
                Ok(None) => {
                    warn!(
                        "authenticated uid {} has no profile record, signing out",
                        principal.uid
                    );

                    self.provider.sign_out().await.ok();
                    AuthPhase::SignedOut
                }
                Err(error) => {
                    warn!("profile fetch for {} failed: {}", principal.uid, error);
                    AuthPhase::SignedOut
                }
            },
        };

        let uid = match &phase {
            AuthPhase::SignedIn(profile) => Some(profile.uid.clone()),
            _ => None,
        };

        self.phase.send_replace(phase);

        events.send(BoardEvent::SessionChanged { uid }).ok();

        // Readiness flips on the first resolution and never unflips.
        if !*self.ready.borrow() {
            self.ready.send_replace(true);
        }
    }

    async fn fetch_profile(&self, uid: &str) -> BoardResult<Option<UserProfile>> {
        let doc = self
            .store
            .get(&UserProfile::collection().doc(uid))
            .await?;

        match doc {
            None => Ok(None),
            Some(doc) => match doc.decode::<UserProfile>() {
                Ok(profile) => Ok(Some(profile)),
                Err(error) => {
                    warn!("{}", error);
                    Ok(None)
                }
            },
        }
    }

    /// Creates the account and its profile document together. The new
    /// account starts as a plain member; only an existing admin can
    /// promote it later.
    pub async fn sign_up(&self, new: NewAccount) -> BoardResult<UserProfile> {
        let principal = self
            .provider
            .create_account(&new.email, &new.password)
            .await?;

        let profile = UserProfile {
            id: principal.uid.clone(),
            uid: principal.uid.clone(),
            email: principal.email,
            first_name: new.first_name,
            last_name: new.last_name,
            role: Role::Member,
            position: new.position,
            photo_url: None,
        };

        self.store
            .set(
                &UserProfile::collection().doc(&profile.uid),
                serde_json::to_value(&profile).expect("profiles serialize"),
            )
            .await?;

        Ok(profile)
    }

    /// Signs in and enforces the profile-must-exist precondition.
    pub async fn sign_in(&self, email: &str, password: &str) -> BoardResult<UserProfile> {
        let principal = self.provider.sign_in(email, password).await?;

        match self.fetch_profile(&principal.uid).await? {
            Some(profile) => Ok(profile),
            None => {
                self.provider.sign_out().await.ok();

                Err(BoardError::Session(
                    "No profile exists for this account. Contact an administrator.".to_string(),
                ))
            }
        }
    }

    pub async fn sign_out(&self) -> BoardResult<()> {
        self.provider.sign_out().await?;
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> BoardResult<()> {
        self.provider.send_password_reset(email).await?;
        Ok(())
    }

    pub async fn send_verification(&self) -> BoardResult<()> {
        self.provider.send_verification().await?;
        Ok(())
    }

    pub async fn check_verification(&self) -> BoardResult<bool> {
        Ok(self.provider.check_verification().await?)
    }
}

impl<S> AuthContext<S> {
    pub fn phase(&self) -> AuthPhase {
        self.phase.borrow().clone()
    }

    /// The signed-in profile, if any.
    pub fn profile(&self) -> Option<UserProfile> {
        match &*self.phase.borrow() {
            AuthPhase::SignedIn(profile) => Some(profile.clone()),
            _ => None,
        }
    }

    /// Whether the first session resolution has finished.
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Waits until the first session resolution has finished.
    pub async fn wait_ready(&self) {
        let mut ready = self.ready.subscribe();

        ready.wait_for(|ready| *ready).await.ok();
    }

    /// Subscribes to phase changes, seeded with the current phase.
    pub fn watch(&self) -> watch::Receiver<AuthPhase> {
        self.phase.subscribe()
    }
}
