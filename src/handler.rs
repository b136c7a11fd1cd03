use actix_session::Session;
use actix_web::{delete, get, post, web, FromRequest, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::auth::{display_cookies, expired_display_cookies, CurrentUser, SESSION_TOKEN_KEY};
use crate::chat::{self, ChatRequest};
use crate::error::{AppError, AppResult};
use crate::model::{
    ChatModelRequest, ChatModelResponse, ConversationModelSave, IdQuery, LoginModel,
    NoteModelCreate,
};
use crate::{conversations, credentials, notes, sessions, AppState};

/// Mounts the JSON API under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| {
        log::debug!("rejected JSON body: {err}");
        AppError::validation("Requête invalide").into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _| {
        log::debug!("rejected query string: {err}");
        AppError::validation("Requête invalide").into()
    }))
    .service(
        web::scope("/api")
            .service(login)
            .service(logout)
            .service(me)
            .service(chat_reply)
            .service(note_load)
            .service(note_create)
            .service(note_delete)
            .service(conversation_list)
            .service(conversation_save)
            .service(conversation_delete)
            .service(conversation_messages),
    );
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[post("/auth/login")]
pub async fn login(
    data: web::Data<AppState>,
    login_info: web::Json<LoginModel>,
    session: Session,
) -> AppResult<HttpResponse> {
    // The username is matched exactly, padding included.
    let (Some(username), Some(password)) = (
        login_info.username.as_deref().filter(|u| !u.is_empty()),
        login_info.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::validation("Nom d'utilisateur et mot de passe requis"));
    };

    let user = match credentials::verify(&data.db, &data.bootstrap, username, password).await {
        Ok(user) => user,
        Err(e) => {
            log::warn!("login refused for {username:?}: {e}");
            return Err(e.into());
        }
    };

    let issued = sessions::create(&data.db, &user.id, Utc::now()).await?;
    session.renew();
    session
        .insert(SESSION_TOKEN_KEY, &issued.id)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    log::info!("{} logged in, session valid until {}", user.name, issued.expires_at);

    let mut response = HttpResponse::Ok();
    for cookie in display_cookies(&user, data.cookie_secure) {
        response.cookie(cookie);
    }
    Ok(response.json(json!({ "success": true, "user": user })))
}

#[post("/auth/logout")]
pub async fn logout(data: web::Data<AppState>, session: Session) -> AppResult<HttpResponse> {
    let token = session
        .get::<String>(SESSION_TOKEN_KEY)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if let Some(token) = token {
        sessions::revoke(&data.db, &token).await?;
    }
    session.purge();

    let mut response = HttpResponse::Ok();
    for cookie in expired_display_cookies() {
        response.cookie(cookie);
    }
    Ok(response.json(json!({ "success": true })))
}

#[get("/auth/me")]
pub async fn me(CurrentUser(user): CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "user": user }))
}

#[post("/chat")]
pub async fn chat_reply(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<ChatModelRequest>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let (Some(message), Some(claimed)) = (non_empty(&body.message), non_empty(&body.current_user))
    else {
        return Err(AppError::validation("Message et utilisateur requis"));
    };
    let CurrentUser(user) = CurrentUser::extract(&req).await?;

    // The session decides who is asking; the body only says who the client thinks it is.
    if claimed != user.name.as_str() {
        log::warn!("chat request claims {claimed:?} but the session belongs to {}", user.name);
    }

    let outcome = chat::ask(
        &data.db,
        data.inference.as_ref(),
        &data.chat,
        &user,
        ChatRequest {
            question: message,
            notes_context: body.notes_context.as_deref(),
            history: body.conversation_history.as_deref().unwrap_or_default(),
            save: body.save_to_db.unwrap_or(false),
            conversation_id: non_empty(&body.conversation_id),
        },
    )
    .await?;

    Ok(HttpResponse::Ok().json(ChatModelResponse {
        response: outcome.reply,
        conversation_id: outcome.conversation_id,
    }))
}

#[get("/notes")]
pub async fn note_load(data: web::Data<AppState>, _user: CurrentUser) -> AppResult<HttpResponse> {
    let notes = notes::list(&data.db, Utc::now()).await?;
    Ok(HttpResponse::Ok().json(json!({ "notes": notes })))
}

#[post("/notes")]
pub async fn note_create(
    data: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    note: web::Json<NoteModelCreate>,
) -> AppResult<HttpResponse> {
    let content = note
        .content
        .as_deref()
        .ok_or_else(|| AppError::validation("Contenu requis"))?;

    let note = notes::create(&data.db, &user, content, note.expires_at, Utc::now()).await?;
    Ok(HttpResponse::Created().json(json!({ "note": note })))
}

#[delete("/notes")]
pub async fn note_delete(
    data: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    query: web::Query<IdQuery>,
) -> AppResult<HttpResponse> {
    let note_id = non_empty(&query.id).ok_or_else(|| AppError::validation("ID de note requis"))?;

    notes::delete(&data.db, note_id, &user).await?;
    log::info!("{} deleted note {note_id}", user.name);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[get("/conversations")]
pub async fn conversation_list(
    data: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<HttpResponse> {
    let conversations = conversations::list_for_user(&data.db, &user.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "conversations": conversations })))
}

#[post("/conversations")]
pub async fn conversation_save(
    data: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    body: web::Json<ConversationModelSave>,
) -> AppResult<HttpResponse> {
    let conversation_id = conversations::upsert_and_append(
        &data.db,
        non_empty(&body.conversation_id),
        &user.id,
        body.title.as_deref(),
        &body.messages,
        Utc::now(),
    )
    .await?;

    Ok(HttpResponse::Ok().json(json!({ "conversationId": conversation_id })))
}

#[delete("/conversations")]
pub async fn conversation_delete(
    data: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    query: web::Query<IdQuery>,
) -> AppResult<HttpResponse> {
    let conversation_id =
        non_empty(&query.id).ok_or_else(|| AppError::validation("ID de conversation manquant"))?;

    conversations::delete(&data.db, conversation_id, &user.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[get("/conversations/{id}")]
pub async fn conversation_messages(
    data: web::Data<AppState>,
    CurrentUser(user): CurrentUser,
    path: web::Path<String>,
) -> AppResult<HttpResponse> {
    let messages = conversations::get_messages(&data.db, &path, &user.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "messages": messages })))
}
