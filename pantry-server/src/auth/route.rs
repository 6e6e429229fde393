use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::{
    cookie::{Cookie, SameSite},
    CookieJar,
};
use pantry::basic_models::{LoginRequest, Profile, SessionInfo, SignupRequest};

use crate::database::Database;
use crate::errors::WebResult;

use super::session::{MaybeUser, UserSession};
use super::Authenticator;

/// `secure` is set only when the server terminates TLS.
fn session_cookie(session: &UserSession, secure: bool) -> Cookie<'static> {
    Cookie::build(("session_id", session.token()))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn session_info(session: UserSession) -> SessionInfo {
    SessionInfo {
        token: session.token(),
        profile: session.profile,
    }
}

pub async fn signup(
    State(db): State<Database>,
    State(auth): State<Authenticator>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> WebResult<(StatusCode, CookieJar, Json<SessionInfo>)> {
    let session = auth.signup(&db, request)?;
    let jar = jar.add(session_cookie(&session, auth.secure_cookies()));
    Ok((StatusCode::CREATED, jar, Json(session_info(session))))
}

pub async fn login(
    State(db): State<Database>,
    State(auth): State<Authenticator>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> WebResult<(CookieJar, Json<SessionInfo>)> {
    let session = auth.login(&db, request)?;
    let jar = jar.add(session_cookie(&session, auth.secure_cookies()));
    Ok((jar, Json(session_info(session))))
}

pub async fn logout(
    State(auth): State<Authenticator>,
    user: MaybeUser,
    jar: CookieJar,
) -> (CookieJar, StatusCode) {
    if let Some(session) = user.0 {
        auth.logout(&session);
    }
    let jar = jar.remove(Cookie::build("session_id").path("/"));
    (jar, StatusCode::NO_CONTENT)
}

pub async fn me(session: UserSession) -> Json<Profile> {
    Json(session.profile)
}
