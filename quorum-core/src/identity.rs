use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// The authenticated account as reported by the identity provider.
///
/// This is identity only. Everything else about a user, name, role and so
/// on, lives in their profile document in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
}

/// Identity provider failures, already worded for showing to users. The
/// provider reports a fixed set of codes and this is their mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("The email address is badly formatted.")]
    InvalidEmail,
    #[error("No account matches this email.")]
    UnknownUser,
    #[error("Incorrect password.")]
    WrongPassword,
    #[error("An account with this email already exists.")]
    EmailInUse,
    #[error("The password must be at least 6 characters.")]
    WeakPassword,
    #[error("Too many attempts. Try again later.")]
    RateLimited,
    #[error("No user is currently signed in.")]
    NoSession,
    #[error("A network error interrupted the request.")]
    Network,
    #[error("{0}")]
    Other(String),
}

/// Receives the current session state and every change after it.
pub struct AuthStateChanges {
    receiver: mpsc::UnboundedReceiver<Option<Principal>>,
}

impl AuthStateChanges {
    /// The next session state. `None` means the provider went away.
    pub async fn next(&mut self) -> Option<Option<Principal>> {
        self.receiver.recv().await
    }
}

pub type AuthStateSender = mpsc::UnboundedSender<Option<Principal>>;

/// Creates a connected session-state channel, seeded with the current
/// state so a new subscriber always observes something immediately.
pub fn auth_state_channel(current: Option<Principal>) -> (AuthStateSender, AuthStateChanges) {
    let (sender, receiver) = mpsc::unbounded_channel();

    sender.send(current).ok();

    (sender, AuthStateChanges { receiver })
}

/// The identity seam. Accounts, sessions and identity-side emails live
/// behind this trait.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Creates an account and signs it in.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, IdentityError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, IdentityError>;

    /// Ends the current session. Signing out without one is fine.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    /// Sends a verification email to the signed-in account.
    async fn send_verification(&self) -> Result<(), IdentityError>;

    /// Re-checks whether the signed-in account has verified its email.
    async fn check_verification(&self) -> Result<bool, IdentityError>;

    /// The session as currently known, without waiting for a change.
    fn current(&self) -> Option<Principal>;

    /// Subscribes to session changes. The current state arrives first,
    /// then every transition after it.
    fn subscribe(&self) -> AuthStateChanges;
}
