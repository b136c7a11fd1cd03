use std::future::Future;
use std::pin::Pin;

use actix_session::config::PersistentSession;
use actix_session::storage::CookieSessionStore;
use actix_session::{SessionExt, SessionMiddleware};
use actix_web::cookie::{time, Cookie, Key, SameSite};
use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::AppError;
use crate::model::UserSummary;
use crate::sessions::{self, SESSION_LIFETIME_DAYS};
use crate::AppState;

/// Name of the encrypted session cookie.
pub const SESSION_COOKIE: &str = "session_id";
/// Key inside the session state that holds the opaque token.
pub const SESSION_TOKEN_KEY: &str = "token";
pub const USER_NAME_COOKIE: &str = "user_name";
pub const USER_ID_COOKIE: &str = "user_id";

const TOKEN_LENGTH: usize = 64;

pub fn generate_session_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Cookie-backed session middleware. The cookie only transports the token;
/// who it belongs to is always looked up in the sessions table.
pub fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE.to_string())
        .cookie_secure(secure)
        .cookie_http_only(true)
        .cookie_same_site(SameSite::Lax)
        .session_lifecycle(
            PersistentSession::default().session_ttl(time::Duration::days(SESSION_LIFETIME_DAYS)),
        )
        .build()
}

/// Client-readable cookies the front end uses to greet the user. The server
/// never reads them back.
pub fn display_cookies(user: &UserSummary, secure: bool) -> [Cookie<'static>; 2] {
    [
        display_cookie(USER_NAME_COOKIE, user.name.to_string(), secure),
        display_cookie(USER_ID_COOKIE, user.id.clone(), secure),
    ]
}

pub fn expired_display_cookies() -> [Cookie<'static>; 2] {
    [USER_NAME_COOKIE, USER_ID_COOKIE].map(|name| {
        let mut cookie = Cookie::build(name, "").path("/").finish();
        cookie.make_removal();
        cookie
    })
}

fn display_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(false)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_LIFETIME_DAYS))
        .finish()
}

/// The authenticated caller, resolved from the session token on every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub UserSummary);

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let session = req.get_session();
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let state =
                state.ok_or_else(|| AppError::Internal("application state missing".to_string()))?;
            let token = session
                .get::<String>(SESSION_TOKEN_KEY)
                .map_err(|e| AppError::Internal(e.to_string()))?
                .ok_or_else(AppError::unauthenticated)?;

            match sessions::authenticate(&state.db, &token, Utc::now()).await? {
                Some(user) => Ok(CurrentUser(user)),
                None => {
                    session.purge();
                    Err(AppError::unauthenticated())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn display_cookies_are_readable_by_scripts() {
        let user = UserSummary {
            id: "42".to_string(),
            name: crate::model::Partner::Daniel,
        };
        let [name, id] = display_cookies(&user, true);
        assert_eq!(name.value(), "Daniel");
        assert_eq!(id.value(), "42");
        assert_eq!(name.http_only(), Some(false));
        assert_eq!(name.secure(), Some(true));
        assert_eq!(name.max_age(), Some(time::Duration::days(7)));
    }
}
