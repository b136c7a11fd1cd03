use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::auth::generate_session_token;
use crate::model::{SessionModel, UserSummary};

pub const SESSION_LIFETIME_DAYS: i64 = 7;

pub fn session_lifetime() -> Duration {
    Duration::days(SESSION_LIFETIME_DAYS)
}

/// Issues a new session for `user_id`, valid for seven days from `now`.
pub async fn create(
    db: &SqlitePool,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<SessionModel, sqlx::Error> {
    let session = SessionModel {
        id: generate_session_token(),
        user_id: user_id.to_owned(),
        expires_at: now + session_lifetime(),
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO sessions
        (id, user_id, expires_at, created_at)
        VALUES
        (?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(db)
    .await?;

    Ok(session)
}

/// Resolves a token to its owner. Unknown and expired tokens resolve to `None`.
pub async fn authenticate(
    db: &SqlitePool,
    token: &str,
    now: DateTime<Utc>,
) -> Result<Option<UserSummary>, sqlx::Error> {
    sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT users.id, users.name
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        WHERE sessions.id = ? AND sessions.expires_at > ?
        "#,
    )
    .bind(token)
    .bind(now)
    .fetch_optional(db)
    .await
}

pub async fn revoke(db: &SqlitePool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"DELETE FROM sessions WHERE id = ?"#)
        .bind(token)
        .execute(db)
        .await?;
    Ok(())
}

/// Deletes every session that expired before `now`, returning how many went.
pub async fn purge_expired(db: &SqlitePool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM sessions WHERE expires_at <= ?"#)
        .bind(now)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BootstrapPasswords;
    use crate::{credentials, db};

    async fn pool_with_wendy() -> (SqlitePool, UserSummary) {
        let pool = db::in_memory().await.unwrap();
        let bootstrap = BootstrapPasswords::default();
        let wendy = credentials::verify(&pool, &bootstrap, "Wendy", "wendy123")
            .await
            .unwrap();
        (pool, wendy)
    }

    #[actix_web::test]
    async fn sessions_last_seven_days() {
        let (pool, wendy) = pool_with_wendy().await;
        let now = Utc::now();
        let session = create(&pool, &wendy.id, now).await.unwrap();

        assert_eq!(session.expires_at - session.created_at, Duration::days(7));
        assert_eq!(session.id.len(), 64);

        let just_before = session.expires_at - Duration::seconds(1);
        assert_eq!(
            authenticate(&pool, &session.id, just_before).await.unwrap(),
            Some(wendy)
        );
        assert_eq!(
            authenticate(&pool, &session.id, session.expires_at).await.unwrap(),
            None
        );
    }

    #[actix_web::test]
    async fn unknown_and_revoked_tokens_do_not_authenticate() {
        let (pool, wendy) = pool_with_wendy().await;
        let now = Utc::now();
        assert_eq!(authenticate(&pool, "nope", now).await.unwrap(), None);

        let session = create(&pool, &wendy.id, now).await.unwrap();
        revoke(&pool, &session.id).await.unwrap();
        assert_eq!(authenticate(&pool, &session.id, now).await.unwrap(), None);
    }

    #[actix_web::test]
    async fn purge_only_removes_expired_sessions() {
        let (pool, wendy) = pool_with_wendy().await;
        let now = Utc::now();
        let old = create(&pool, &wendy.id, now - Duration::days(8)).await.unwrap();
        let fresh = create(&pool, &wendy.id, now).await.unwrap();

        assert_eq!(purge_expired(&pool, now).await.unwrap(), 1);
        assert_eq!(authenticate(&pool, &old.id, now - Duration::days(7)).await.unwrap(), None);
        assert!(authenticate(&pool, &fresh.id, now).await.unwrap().is_some());
    }
}
