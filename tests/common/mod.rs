use std::sync::Arc;

use async_trait::async_trait;

use couple_memory::inference::{CompletionClient, InferenceError, Unconfigured};
use couple_memory::model::ChatTurn;
use couple_memory::{db, AppState};

pub const CANNED_REPLY: &str = "Oui, Daniel a noté qu'il aime le jazz.";

/// Always answers with the same text.
pub struct CannedReply;

#[async_trait]
impl CompletionClient for CannedReply {
    async fn complete(&self, _: &str, _: &[ChatTurn]) -> Result<String, InferenceError> {
        Ok(CANNED_REPLY.to_string())
    }
}

/// Fails like an endpoint that is up but refusing the call.
pub struct FailingUpstream;

#[async_trait]
impl CompletionClient for FailingUpstream {
    async fn complete(&self, _: &str, _: &[ChatTurn]) -> Result<String, InferenceError> {
        Err(InferenceError::Upstream {
            status: 503,
            body: "overloaded".to_string(),
        })
    }
}

pub async fn state_with(client: Arc<dyn CompletionClient>) -> AppState {
    let pool = db::in_memory().await.expect("in-memory database");
    AppState::new(pool, client)
}

pub async fn state() -> AppState {
    state_with(Arc::new(CannedReply)).await
}

pub async fn unconfigured_state() -> AppState {
    state_with(Arc::new(Unconfigured)).await
}

/// Builds the full application around `state`, with a throwaway cookie key.
macro_rules! app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state))
                .configure(couple_memory::configure)
                .wrap(couple_memory::auth::session_middleware(
                    actix_web::cookie::Key::generate(),
                    false,
                )),
        )
        .await
    };
}

/// Logs in and returns the session cookie to replay on later requests.
macro_rules! login {
    ($app:expr, $user:expr, $password:expr) => {{
        let response = actix_web::test::call_service(
            &$app,
            actix_web::test::TestRequest::post()
                .uri("/api/auth/login")
                .set_json(serde_json::json!({ "username": $user, "password": $password }))
                .to_request(),
        )
        .await;
        assert_eq!(response.status(), actix_web::http::StatusCode::OK);
        response
            .response()
            .cookies()
            .find(|cookie| cookie.name() == couple_memory::auth::SESSION_COOKIE)
            .expect("login sets the session cookie")
            .into_owned()
    }};
}
