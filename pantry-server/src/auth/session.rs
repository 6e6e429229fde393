use axum::extract::FromRef;
use axum_extra::extract::CookieJar;
use crypto_bigint::{Random, U256};
use dashmap::DashMap;
use pantry::basic_models::Profile;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::errors::WebError;

use super::Authenticator;

pub type SessionID = U256;

/// Information about the connected user, and proof that they are authenticated.
/// Use this as a request guard to get the user's session.
#[derive(Clone, Debug)]
pub struct UserSession {
    pub id: SessionID,
    pub profile: Profile,
}

impl UserSession {
    /// The token handed to clients, either as a cookie or a bearer token
    pub fn token(&self) -> String {
        self.id.to_string()
    }
}

/// Announced whenever someone signs in or out
#[derive(Clone, Debug, PartialEq)]
pub enum AuthEvent {
    SignedIn { profile_id: i64, username: String },
    SignedOut { profile_id: i64 },
}

pub struct Sessions {
    sessions: DashMap<SessionID, UserSession>,
    events: broadcast::Sender<AuthEvent>,
}

impl Sessions {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            sessions: DashMap::new(),
            events,
        })
    }

    pub fn open(&self, profile: Profile) -> UserSession {
        let id = SessionID::random(&mut rand::thread_rng());
        let session = UserSession { id, profile };
        self.sessions.insert(id, session.clone());
        // No subscribers is fine
        let _ = self.events.send(AuthEvent::SignedIn {
            profile_id: session.profile.profile_id,
            username: session.profile.username.clone(),
        });
        session
    }

    pub fn get(&self, id: &SessionID) -> Option<UserSession> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn close(&self, id: &SessionID) -> Option<UserSession> {
        let (_, session) = self.sessions.remove(id)?;
        let _ = self.events.send(AuthEvent::SignedOut {
            profile_id: session.profile.profile_id,
        });
        Some(session)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Log sign-ins and sign-outs until the sessions are dropped.
pub async fn log_auth_events(mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(AuthEvent::SignedIn {
                profile_id,
                username,
            }) => tracing::info!(profile_id, username, "Signed in"),
            Ok(AuthEvent::SignedOut { profile_id }) => tracing::info!(profile_id, "Signed out"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} auth events", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub fn parse_session_id(text: &str) -> Option<SessionID> {
    let bytes = hex::decode(text.trim()).ok()?;
    if bytes.len() != U256::BYTES {
        return None;
    }
    Some(U256::from_be_slice(&bytes))
}

/// The session token from the `session_id` cookie, or failing that a bearer token
fn presented_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get("session_id") {
        return Some(cookie.value().to_string());
    }
    parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for UserSession
where
    Authenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let no = |msg: &str| WebError::AuthFailure(msg.to_string());
        let token = presented_token(parts).ok_or_else(|| no("Not signed in"))?;
        let session_id = parse_session_id(&token).ok_or_else(|| no("Invalid session ID"))?;
        Authenticator::from_ref(state)
            .sessions
            .get(&session_id)
            .ok_or_else(|| no("Session not found"))
    }
}

/// The session if there is a valid one, for pages anyone can see
pub struct MaybeUser(pub Option<UserSession>);

impl MaybeUser {
    pub fn profile_id(&self) -> Option<i64> {
        self.0.as_ref().map(|session| session.profile.profile_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    Authenticator: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            UserSession::from_request_parts(parts, state).await.ok(),
        ))
    }
}
