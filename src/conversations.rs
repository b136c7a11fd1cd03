use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{ChatTurn, ConversationModel, MessageModel, Role};

pub const DEFAULT_TITLE: &str = "Nouvelle conversation";
const TITLE_MAX_CHARS: usize = 50;

fn not_found() -> AppError {
    AppError::not_found("Conversation non trouvée")
}

pub async fn list_for_user(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<ConversationModel>, sqlx::Error> {
    sqlx::query_as::<_, ConversationModel>(
        r#"
        SELECT id, user_id, title, created_at, updated_at
        FROM chat_conversations
        WHERE user_id = ?
        ORDER BY updated_at DESC, rowid DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn find(
    db: &SqlitePool,
    conversation_id: &str,
    user_id: &str,
) -> Result<Option<ConversationModel>, sqlx::Error> {
    sqlx::query_as::<_, ConversationModel>(
        r#"
        SELECT id, user_id, title, created_at, updated_at
        FROM chat_conversations
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// Messages of one of `user_id`'s conversations, in the order they were written.
pub async fn get_messages(
    db: &SqlitePool,
    conversation_id: &str,
    user_id: &str,
) -> AppResult<Vec<MessageModel>> {
    if find(db, conversation_id, user_id).await?.is_none() {
        return Err(not_found());
    }

    let messages = sqlx::query_as::<_, MessageModel>(
        r#"
        SELECT id, conversation_id, role, content, created_at
        FROM chat_messages
        WHERE conversation_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(conversation_id)
    .fetch_all(db)
    .await?;

    Ok(messages)
}

/// Creates a conversation when `conversation_id` is `None`, otherwise bumps the
/// existing one, then appends `messages` in order. All of it commits or none of it.
pub async fn upsert_and_append(
    db: &SqlitePool,
    conversation_id: Option<&str>,
    user_id: &str,
    title: Option<&str>,
    messages: &[ChatTurn],
    now: DateTime<Utc>,
) -> AppResult<String> {
    let mut tx = db.begin().await?;

    let conversation_id = match conversation_id {
        Some(id) => {
            let touched = sqlx::query(
                r#"UPDATE chat_conversations SET updated_at = ? WHERE id = ? AND user_id = ?"#,
            )
            .bind(now)
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

            if touched.rows_affected() == 0 {
                return Err(not_found());
            }
            id.to_owned()
        }
        None => {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO chat_conversations
                (id, user_id, title, created_at, updated_at)
                VALUES
                (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(user_id)
            .bind(derive_title(title, messages))
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            id
        }
    };

    for message in messages {
        sqlx::query(
            r#"
            INSERT INTO chat_messages
            (id, conversation_id, role, content, created_at)
            VALUES
            (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&conversation_id)
        .bind(message.role)
        .bind(&message.content)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(conversation_id)
}

/// Deletes one of `user_id`'s conversations along with its messages.
pub async fn delete(db: &SqlitePool, conversation_id: &str, user_id: &str) -> AppResult<()> {
    let result = sqlx::query(r#"DELETE FROM chat_conversations WHERE id = ? AND user_id = ?"#)
        .bind(conversation_id)
        .bind(user_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found());
    }
    Ok(())
}

/// Explicit title if any, else the opening user message cut to fifty characters.
pub fn derive_title(explicit: Option<&str>, messages: &[ChatTurn]) -> String {
    if let Some(title) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_owned();
    }

    let first = messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.trim())
        .filter(|c| !c.is_empty());

    match first {
        Some(text) if text.chars().count() > TITLE_MAX_CHARS => {
            let cut: String = text.chars().take(TITLE_MAX_CHARS).collect();
            format!("{}…", cut.trim_end())
        }
        Some(text) => text.to_owned(),
        None => DEFAULT_TITLE.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::config::BootstrapPasswords;
    use crate::model::UserSummary;
    use crate::{credentials, db};

    async fn setup() -> (SqlitePool, UserSummary, UserSummary) {
        let pool = db::in_memory().await.unwrap();
        let bootstrap = BootstrapPasswords::default();
        let wendy = credentials::verify(&pool, &bootstrap, "Wendy", "wendy123")
            .await
            .unwrap();
        let daniel = credentials::verify(&pool, &bootstrap, "Daniel", "daniel123")
            .await
            .unwrap();
        (pool, wendy, daniel)
    }

    #[actix_web::test]
    async fn reusing_an_id_appends_and_bumps_updated_at() {
        let (pool, wendy, _) = setup().await;
        let start = Utc::now();

        let id = upsert_and_append(
            &pool,
            None,
            &wendy.id,
            None,
            &[ChatTurn::user("Bonjour"), ChatTurn::assistant("Salut Wendy")],
            start,
        )
        .await
        .unwrap();

        let later = start + Duration::minutes(5);
        let same = upsert_and_append(
            &pool,
            Some(&id),
            &wendy.id,
            None,
            &[ChatTurn::user("Et ensuite ?"), ChatTurn::assistant("Rien d'autre")],
            later,
        )
        .await
        .unwrap();
        assert_eq!(same, id);

        let conversations = list_for_user(&pool, &wendy.id).await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].created_at, start);
        assert_eq!(conversations[0].updated_at, later);
        assert_eq!(conversations[0].title.as_deref(), Some("Bonjour"));

        let contents: Vec<String> = get_messages(&pool, &id, &wendy.id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(
            contents,
            vec!["Bonjour", "Salut Wendy", "Et ensuite ?", "Rien d'autre"]
        );
    }

    #[actix_web::test]
    async fn conversations_are_private_to_their_owner() {
        let (pool, wendy, daniel) = setup().await;
        let id = upsert_and_append(&pool, None, &daniel.id, Some("Cadeaux"), &[], Utc::now())
            .await
            .unwrap();

        assert!(list_for_user(&pool, &wendy.id).await.unwrap().is_empty());
        assert!(matches!(
            get_messages(&pool, &id, &wendy.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            upsert_and_append(&pool, Some(&id), &wendy.id, None, &[ChatTurn::user("hi")], Utc::now())
                .await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete(&pool, &id, &wendy.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(get_messages(&pool, &id, &daniel.id).await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn list_is_most_recently_updated_first() {
        let (pool, wendy, _) = setup().await;
        let now = Utc::now();
        let older = upsert_and_append(&pool, None, &wendy.id, Some("a"), &[], now).await.unwrap();
        let newer = upsert_and_append(&pool, None, &wendy.id, Some("b"), &[], now + Duration::seconds(1))
            .await
            .unwrap();

        let ids: Vec<String> =
            list_for_user(&pool, &wendy.id).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![newer.clone(), older.clone()]);

        upsert_and_append(&pool, Some(&older), &wendy.id, None, &[], now + Duration::seconds(2))
            .await
            .unwrap();
        let ids: Vec<String> =
            list_for_user(&pool, &wendy.id).await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![older, newer]);
    }

    #[actix_web::test]
    async fn delete_cascades_to_messages() {
        let (pool, wendy, _) = setup().await;
        let id = upsert_and_append(
            &pool,
            None,
            &wendy.id,
            None,
            &[ChatTurn::user("q"), ChatTurn::assistant("r")],
            Utc::now(),
        )
        .await
        .unwrap();

        delete(&pool, &id, &wendy.id).await.unwrap();

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE conversation_id = ?")
                .bind(&id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(remaining, 0);
        assert!(find(&pool, &id, &wendy.id).await.unwrap().is_none());
    }

    #[test]
    fn titles_prefer_explicit_then_first_question() {
        let messages = [ChatTurn::assistant("Bonjour"), ChatTurn::user("  Qu'aime Daniel ?  ")];
        assert_eq!(derive_title(Some("Vacances"), &messages), "Vacances");
        assert_eq!(derive_title(Some("   "), &messages), "Qu'aime Daniel ?");
        assert_eq!(derive_title(None, &[]), DEFAULT_TITLE);

        let long = "é".repeat(60);
        let title = derive_title(None, &[ChatTurn::user(long)]);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 1);
        assert!(title.ends_with('…'));
    }
}
