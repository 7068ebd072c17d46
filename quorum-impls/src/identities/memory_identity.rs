use argon2::{
    password_hash::{Encoding, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::OsRng;

use quorum_core::{
    auth_state_channel, random_string, AuthStateChanges, AuthStateSender, IdentityError,
    IdentityProvider, Principal,
};

/// An in-memory [IdentityProvider].
///
/// Accounts live in process memory with argon2-hashed passwords. Session
/// changes broadcast to every subscriber, and each new subscriber is
/// seeded with the state at subscription time. Identity-side emails
/// (password reset, verification) are recorded instead of sent.
pub struct MemoryIdentity {
    argon: Argon2<'static>,
    state: Mutex<IdentityState>,
}

#[derive(Default)]
struct IdentityState {
    accounts: Vec<Account>,
    session: Option<Principal>,
    subscribers: Vec<AuthStateSender>,
    /// Emails that asked for a password reset, oldest first.
    reset_requests: Vec<String>,
    /// Uids that were sent a verification email, oldest first.
    verification_requests: Vec<String>,
}

struct Account {
    uid: String,
    email: String,
    password_hash: String,
    verified: bool,
}

impl Account {
    fn principal(&self) -> Principal {
        Principal {
            uid: self.uid.clone(),
            email: self.email.clone(),
            email_verified: self.verified,
        }
    }
}

impl IdentityState {
    fn account_index(&self, email: &str) -> Option<usize> {
        self.accounts.iter().position(|account| account.email == email)
    }

    fn broadcast(&mut self) {
        let session = self.session.clone();

        self.subscribers
            .retain(|sender| sender.send(session.clone()).is_ok());
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        Self {
            argon: Argon2::default(),
            state: Default::default(),
        }
    }

    /// Marks an account's email as verified, as if the link in the
    /// verification email had been followed.
    pub fn mark_verified(&self, email: &str) {
        let mut state = self.state.lock();

        if let Some(index) = state.account_index(email) {
            state.accounts[index].verified = true;
        }
    }

    /// Password reset requests received so far, oldest first.
    pub fn reset_requests(&self) -> Vec<String> {
        self.state.lock().reset_requests.clone()
    }

    /// Uids that were sent a verification email, oldest first.
    pub fn verification_requests(&self) -> Vec<String> {
        self.state.lock().verification_requests.clone()
    }

    fn hash_password(&self, password: &str) -> Result<String, IdentityError> {
        let salt = SaltString::generate(&mut OsRng);

        Ok(self
            .argon
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| IdentityError::Other(e.to_string()))?
            .to_string())
    }
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, IdentityError> {
        let email = normalize_email(email)?;

        if password.len() < 6 {
            return Err(IdentityError::WeakPassword);
        }

        let password_hash = self.hash_password(password)?;

        let mut state = self.state.lock();

        if state.account_index(&email).is_some() {
            return Err(IdentityError::EmailInUse);
        }

        let account = Account {
            uid: random_string(28),
            email,
            password_hash,
            verified: false,
        };

        let principal = account.principal();

        state.accounts.push(account);
        state.session = Some(principal.clone());
        state.broadcast();

        Ok(principal)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, IdentityError> {
        let email = normalize_email(email)?;

        let mut state = self.state.lock();

        let index = state
            .account_index(&email)
            .ok_or(IdentityError::UnknownUser)?;

        let stored = PasswordHash::parse(&state.accounts[index].password_hash, Encoding::default())
            .map_err(|e| IdentityError::Other(e.to_string()))?;

        self.argon
            .verify_password(password.as_bytes(), &stored)
            .map_err(|_| IdentityError::WrongPassword)?;

        let principal = state.accounts[index].principal();

        state.session = Some(principal.clone());
        state.broadcast();

        Ok(principal)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let mut state = self.state.lock();

        if state.session.take().is_some() {
            state.broadcast();
        }

        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError> {
        let email = normalize_email(email)?;

        let mut state = self.state.lock();

        if state.account_index(&email).is_none() {
            return Err(IdentityError::UnknownUser);
        }

        state.reset_requests.push(email);
        Ok(())
    }

    async fn send_verification(&self) -> Result<(), IdentityError> {
        let mut state = self.state.lock();

        let uid = state
            .session
            .as_ref()
            .map(|principal| principal.uid.clone())
            .ok_or(IdentityError::NoSession)?;

        state.verification_requests.push(uid);
        Ok(())
    }

    async fn check_verification(&self) -> Result<bool, IdentityError> {
        let state = self.state.lock();

        let session = state.session.as_ref().ok_or(IdentityError::NoSession)?;

        Ok(state
            .accounts
            .iter()
            .find(|account| account.uid == session.uid)
            .map(|account| account.verified)
            .unwrap_or(false))
    }

    fn current(&self) -> Option<Principal> {
        self.state.lock().session.clone()
    }

    fn subscribe(&self) -> AuthStateChanges {
        let mut state = self.state.lock();

        let (sender, changes) = auth_state_channel(state.session.clone());
        state.subscribers.push(sender);

        changes
    }
}

fn normalize_email(email: &str) -> Result<String, IdentityError> {
    let email = email.trim().to_lowercase();

    let (local, domain) = email.split_once('@').ok_or(IdentityError::InvalidEmail)?;

    if local.is_empty() || domain.is_empty() {
        return Err(IdentityError::InvalidEmail);
    }

    Ok(email)
}
