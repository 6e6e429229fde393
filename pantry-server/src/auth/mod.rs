use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use pantry::basic_models::{LoginRequest, SignupRequest};
use session::{Sessions, UserSession};

pub mod route;
pub mod session;

pub type AuthResult<X> = Result<X, AuthError>;

use crate::config::AuthConfig;
use crate::database::Database;
use crate::errors::WebError;
use crate::models::{self, AccountConflict};

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password.")]
    BadCredentials,
    #[error("Session error: {0}")]
    Session(&'static str),
    #[error("{0}")]
    Signup(String),
    #[error("{0}")]
    Conflict(#[from] AccountConflict),
    #[error("Password hashing error: {0}")]
    Hashing(argon2::password_hash::Error),
    #[error("Account storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<AuthError> for WebError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::BadCredentials => WebError::AuthFailure(e.to_string()),
            AuthError::Session(msg) => WebError::AuthFailure(msg.into()),
            AuthError::Signup(msg) => WebError::BadRequest(msg),
            AuthError::Conflict(conflict) => WebError::Conflict(conflict.to_string()),
            AuthError::Hashing(e) => {
                WebError::Internal(anyhow::anyhow!("Password hashing failed: {e}"))
            }
            AuthError::Storage(e) => WebError::Internal(e),
        }
    }
}

/// Signs people up and in, and owns the live sessions.
#[derive(Clone)]
pub struct Authenticator {
    pub sessions: Arc<Sessions>,
    config: AuthConfig,
    secure_cookies: bool,
}

impl Authenticator {
    pub fn new_from_config(conf: &AuthConfig) -> Self {
        if conf.insecure_password_hashing {
            tracing::warn!("Insecure password hashing is enabled");
        }
        Self {
            sessions: Sessions::new(),
            config: conf.clone(),
            secure_cookies: false,
        }
    }

    /// Mark session cookies `Secure`. Set this when the server terminates TLS.
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    fn argon2(&self) -> AuthResult<Argon2<'static>> {
        if self.config.insecure_password_hashing {
            // Minimal cost, for tests and local development only
            let params = Params::new(1024, 1, 1, None).map_err(|e| AuthError::Hashing(e.into()))?;
            Ok(Argon2::new(
                argon2::Algorithm::Argon2id,
                argon2::Version::V0x13,
                params,
            ))
        } else {
            Ok(Argon2::default())
        }
    }

    pub fn hash_password(&self, password: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(AuthError::Hashing)?;
        Ok(hash.to_string())
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(hash) else {
            return false;
        };
        let Ok(argon2) = self.argon2() else {
            return false;
        };
        argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Create the profile and log it straight in.
    pub fn signup(&self, db: &Database, mut request: SignupRequest) -> AuthResult<UserSession> {
        request.username = request.username.trim().to_string();
        request.email = request.email.trim().to_lowercase();
        if request.username.is_empty() {
            return Err(AuthError::Signup("Username is required.".into()));
        }
        if request.email.is_empty() || !request.email.contains('@') {
            return Err(AuthError::Signup("A valid email is required.".into()));
        }
        if request.password.chars().count() < self.config.min_password_length {
            return Err(AuthError::Signup(format!(
                "Password must be at least {} characters.",
                self.config.min_password_length
            )));
        }
        let password_hash = self.hash_password(&request.password)?;
        let profile = models::create_account(db, &request, &password_hash).map_err(|e| {
            match e.downcast::<AccountConflict>() {
                Ok(conflict) => AuthError::Conflict(conflict),
                Err(e) => AuthError::Storage(e),
            }
        })?;
        tracing::info!("New profile {} ({})", profile.profile_id, profile.username);
        Ok(self.sessions.open(profile))
    }

    pub fn login(&self, db: &Database, request: LoginRequest) -> AuthResult<UserSession> {
        let email = request.email.trim().to_lowercase();
        let credential =
            models::find_credential(db, &email)?.ok_or(AuthError::BadCredentials)?;
        if !self.verify_password(&request.password, &credential.password_hash) {
            return Err(AuthError::BadCredentials);
        }
        let profile = models::get_profile(db, credential.profile_id)?
            .ok_or(AuthError::Session("Profile for this login is missing"))?;
        Ok(self.sessions.open(profile))
    }

    pub fn logout(&self, session: &UserSession) {
        self.sessions.close(&session.id);
    }
}
