use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::api::{AuthResponse, Credentials, Registration, Role, UserId, UserProfile};
use crate::identity::{IdentityError, IdentityProvider};

const SALT_LENGTH: usize = 16;

/// Account created when the provider starts, always with the admin role
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SeedAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

struct Account {
    profile: UserProfile,
    salt: String,
    password_digest: String,
}

impl Account {
    /// Usernames and emails share one login namespace
    fn answers_to(&self, login_name: &str) -> bool {
        self.profile.username == login_name || self.profile.email == login_name
    }

    fn password_matches(&self, password: &str) -> bool {
        digest_password(&self.salt, password) == self.password_digest
    }
}

/// Development stand-in for an external identity provider.
/// Sessions never expire and are lost on restart.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    accounts: parking_lot::RwLock<HashMap<UserId, Account>>,
    sessions: parking_lot::RwLock<HashMap<String, UserId>>,
    user_sequence_generator: AtomicI32,
}

fn digest_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

fn require(value: &str, field: &'static str) -> Result<(), IdentityError> {
    if value.trim().is_empty() {
        Err(IdentityError::MissingField(field))
    } else {
        Ok(())
    }
}

impl InMemoryIdentityProvider {
    pub fn with_admin(seed: SeedAccount) -> Self {
        let provider = Self::default();
        provider.create_account(
            &mut provider.accounts.write(),
            &seed.username,
            &seed.email,
            &seed.password,
            Role::Admin,
        );
        tracing::info!("Seeded admin account {}", seed.username);
        provider
    }

    fn create_account(
        &self,
        accounts: &mut HashMap<UserId, Account>,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> UserProfile {
        let id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed) + 1;
        let salt = generate_salt();
        let profile = UserProfile {
            id,
            username: username.to_string(),
            email: email.to_string(),
            role,
        };
        accounts.insert(
            id,
            Account {
                profile: profile.clone(),
                password_digest: digest_password(&salt, password),
                salt,
            },
        );
        profile
    }

    fn open_session(&self, user: UserProfile) -> AuthResponse {
        let token = uuid::Uuid::new_v4().to_string();
        self.sessions.write().insert(token.clone(), user.id);
        AuthResponse { token, user }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn login(&self, credentials: Credentials) -> Result<AuthResponse, IdentityError> {
        let login_name = credentials
            .login_name()
            .ok_or(IdentityError::MissingField("username"))?;
        require(&credentials.password, "password")?;

        let user = self
            .accounts
            .read()
            .values()
            .filter(|account| account.answers_to(login_name))
            .find(|account| account.password_matches(&credentials.password))
            .map(|account| account.profile.clone())
            .ok_or(IdentityError::InvalidCredentials)?;

        Ok(self.open_session(user))
    }

    async fn register(&self, registration: Registration) -> Result<AuthResponse, IdentityError> {
        require(&registration.email, "email")?;
        require(&registration.password, "password")?;
        let username = registration.username();

        // uniqueness check and insert happen under one write lock
        let user = {
            let mut accounts = self.accounts.write();
            let taken = accounts.values().any(|account| {
                account.answers_to(username) || account.answers_to(&registration.email)
            });
            if taken {
                return Err(IdentityError::AlreadyRegistered(username.to_string()));
            }
            self.create_account(
                &mut accounts,
                username,
                &registration.email,
                &registration.password,
                Role::User,
            )
        };

        Ok(self.open_session(user))
    }

    async fn identify(&self, token: &str) -> Result<UserProfile, IdentityError> {
        let user_id = self
            .sessions
            .read()
            .get(token)
            .copied()
            .ok_or(IdentityError::InvalidToken)?;
        self.accounts
            .read()
            .get(&user_id)
            .map(|account| account.profile.clone())
            .ok_or(IdentityError::InvalidToken)
    }
}
